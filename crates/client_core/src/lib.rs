use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use dp_shared::{
    domain::{Mode, MlField, MlJobConfig, NoiseField, NoiseJobConfig},
    error::FieldError,
};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

pub mod artifact;
pub mod builder;
pub mod download;
pub mod error;
pub mod mode;
pub mod response;
pub mod settings;
pub mod transport;

pub use artifact::{FileHolder, InputArtifact};
pub use builder::{MlConfigBuilder, NoiseConfigBuilder};
pub use download::{DirectoryDownloadSink, DownloadSink};
pub use error::{SubmitError, TransportError};
pub use mode::ModeSelector;
pub use response::{ResponseHandler, ResultSet, SubmissionOutcome};
pub use settings::Settings;
pub use transport::{HttpTransport, JobPayload, JobTransport, TransportResponse};

#[derive(Debug, Clone, Default, PartialEq)]
pub enum SubmissionState {
    #[default]
    Idle,
    InFlight,
    Succeeded,
    Failed(String),
}

/// Moves an abandoned in-flight submission to `Failed` when dropped armed.
struct InFlightReset {
    inner: Arc<Mutex<SessionState>>,
    armed: bool,
}

impl InFlightReset {
    fn new(inner: Arc<Mutex<SessionState>>) -> Self {
        Self { inner, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

fn mark_abandoned(state: &mut SessionState) {
    if state.submission == SubmissionState::InFlight {
        let message = error::GENERIC_FAILURE_MESSAGE.to_string();
        state.submission = SubmissionState::Failed(message.clone());
        state.last_error = Some(message);
    }
}

impl Drop for InFlightReset {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!("submission dropped before completion; marking it failed");
        if let Ok(mut guard) = self.inner.try_lock() {
            mark_abandoned(&mut guard);
            return;
        }
        let inner = Arc::clone(&self.inner);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    mark_abandoned(&mut *inner.lock().await);
                });
            }
            Err(_) => error!("no runtime to reset abandoned submission; session stays busy"),
        }
    }
}

#[derive(Default)]
struct SessionState {
    files: FileHolder,
    mode: ModeSelector,
    noise: NoiseConfigBuilder,
    ml: MlConfigBuilder,
    submission: SubmissionState,
    last_error: Option<String>,
    results: Option<ResultSet>,
}

/// One user session: the held file, both job builders, the mode switch and
/// the single in-flight submission.
///
/// At most one request is outstanding at a time; a second `submit` while one
/// is in flight fails with [`SubmitError::AlreadyInFlight`] without touching
/// the network. Dropping an unfinished `submit` future marks the submission
/// failed so the session can be used again.
pub struct JobSession {
    transport: Arc<dyn JobTransport>,
    responses: ResponseHandler,
    request_timeout: Duration,
    inner: Arc<Mutex<SessionState>>,
}

impl JobSession {
    pub fn new(
        transport: Arc<dyn JobTransport>,
        downloads: Arc<dyn DownloadSink>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            responses: ResponseHandler::new(downloads),
            request_timeout,
            inner: Arc::new(Mutex::new(SessionState::default())),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        settings.validate().context("invalid client settings")?;
        let endpoint = settings.validated_endpoint()?;
        let transport = HttpTransport::new(endpoint, settings.request_timeout())
            .context("failed to build http client")?;
        let downloads = DirectoryDownloadSink::new(settings.download_dir.clone());
        Ok(Self::new(
            Arc::new(transport),
            Arc::new(downloads),
            settings.request_timeout(),
        ))
    }

    pub async fn select_files(&self, selection: Vec<InputArtifact>) -> bool {
        let mut guard = self.inner.lock().await;
        let accepted = guard.files.select(selection);
        if accepted {
            guard.last_error = None;
        }
        accepted
    }

    pub async fn current_file_name(&self) -> Option<String> {
        let guard = self.inner.lock().await;
        guard.files.current().map(|a| a.name.clone())
    }

    pub async fn set_mode(&self, mode: Mode) {
        self.inner.lock().await.mode.set_mode(mode);
    }

    pub async fn mode(&self) -> Mode {
        self.inner.lock().await.mode.current()
    }

    pub async fn set_noise_field(&self, field: NoiseField, raw: impl Into<String>) {
        self.inner.lock().await.noise.set_field(field, raw);
    }

    pub async fn set_ml_field(
        &self,
        field: MlField,
        raw: impl Into<String>,
    ) -> Result<(), FieldError> {
        self.inner.lock().await.ml.set_field(field, raw)
    }

    /// Sets a field of the active mode's builder by its wire key.
    pub async fn set_field(&self, name: &str, raw: impl Into<String>) -> Result<(), FieldError> {
        let mut guard = self.inner.lock().await;
        match guard.mode.current() {
            Mode::Noise => guard.noise.set_named(name, raw),
            Mode::Ml => guard.ml.set_named(name, raw),
        }
    }

    pub async fn noise_snapshot(&self) -> NoiseJobConfig {
        self.inner.lock().await.noise.snapshot()
    }

    pub async fn ml_snapshot(&self) -> MlJobConfig {
        self.inner.lock().await.ml.snapshot()
    }

    pub async fn state(&self) -> SubmissionState {
        self.inner.lock().await.submission.clone()
    }

    pub async fn is_busy(&self) -> bool {
        self.inner.lock().await.submission == SubmissionState::InFlight
    }

    pub async fn last_error(&self) -> Option<String> {
        self.inner.lock().await.last_error.clone()
    }

    pub async fn results(&self) -> Option<ResultSet> {
        self.inner.lock().await.results
    }

    pub async fn submit(&self) -> Result<SubmissionOutcome, SubmitError> {
        let payload = {
            let mut guard = self.inner.lock().await;
            if guard.submission == SubmissionState::InFlight {
                warn!("submit rejected: a submission is already in flight");
                return Err(SubmitError::AlreadyInFlight);
            }
            let Some(artifact) = guard.files.current().cloned() else {
                warn!("submit rejected: no input file selected");
                guard.last_error = Some(SubmitError::MissingInput.user_message().to_string());
                return Err(SubmitError::MissingInput);
            };

            let payload = match guard.mode.current() {
                Mode::Noise => {
                    let config = guard.noise.snapshot();
                    for finding in builder::preflight_noise(&config) {
                        warn!(mode = %Mode::Noise, "preflight: {finding}");
                    }
                    JobPayload::noise(artifact, &config)
                }
                Mode::Ml => {
                    let config = guard.ml.snapshot();
                    for finding in builder::preflight_ml(&config) {
                        warn!(mode = %Mode::Ml, "preflight: {finding}");
                    }
                    JobPayload::ml(artifact, &config)
                }
            };

            guard.submission = SubmissionState::InFlight;
            guard.last_error = None;
            payload
        };
        let reset = InFlightReset::new(Arc::clone(&self.inner));

        let mode = payload.mode;
        let file_name = payload.artifact.name.clone();
        info!(
            mode = %mode,
            file_name = %file_name,
            bytes = payload.artifact.bytes.len(),
            "submitting job"
        );

        let result = self.dispatch(payload).await;

        let mut guard = self.inner.lock().await;
        reset.disarm();
        match result {
            Ok(outcome) => {
                if let SubmissionOutcome::Scored(results) = &outcome {
                    guard.results = Some(*results);
                }
                guard.submission = SubmissionState::Succeeded;
                info!(mode = %mode, file_name = %file_name, "job succeeded");
                Ok(outcome)
            }
            Err(err) => {
                error!(mode = %mode, file_name = %file_name, error = %err, "job failed");
                let message = err.user_message().to_string();
                guard.submission = SubmissionState::Failed(message.clone());
                guard.last_error = Some(message);
                Err(err)
            }
        }
    }

    /// Sends the payload and interprets the reply under the payload's mode,
    /// whatever the session's mode is by the time the reply arrives.
    async fn dispatch(&self, payload: JobPayload) -> Result<SubmissionOutcome, SubmitError> {
        let mode = payload.mode;
        let file_name = payload.artifact.name.clone();
        let response = tokio::time::timeout(self.request_timeout, self.transport.send(payload))
            .await
            .map_err(|_| SubmitError::Timeout(self.request_timeout))??;
        self.responses.handle(mode, &file_name, response).await
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
