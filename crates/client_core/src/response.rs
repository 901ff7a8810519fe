use std::{path::PathBuf, sync::Arc};

use dp_shared::{
    domain::Mode,
    protocol::{download_name, AccuracyResponse},
};
use tracing::{info, warn};

use crate::{download::DownloadSink, error::SubmitError, transport::TransportResponse};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResultSet {
    pub non_private_accuracy: f64,
    pub private_accuracy: f64,
}

impl ResultSet {
    /// Both scores as `xx.xx%`.
    pub fn percentages(&self) -> (String, String) {
        (
            format!("{:.2}%", self.non_private_accuracy * 100.0),
            format!("{:.2}%", self.private_accuracy * 100.0),
        )
    }
}

impl From<AccuracyResponse> for ResultSet {
    fn from(value: AccuracyResponse) -> Self {
        Self {
            non_private_accuracy: value.accuracy1,
            private_accuracy: value.accuracy2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    Downloaded { file_name: String, path: PathBuf },
    Scored(ResultSet),
}

/// Interprets a successful response under the mode that was active when the
/// request was sent.
pub struct ResponseHandler {
    downloads: Arc<dyn DownloadSink>,
}

impl ResponseHandler {
    pub fn new(downloads: Arc<dyn DownloadSink>) -> Self {
        Self { downloads }
    }

    pub async fn handle(
        &self,
        mode: Mode,
        artifact_name: &str,
        response: TransportResponse,
    ) -> Result<SubmissionOutcome, SubmitError> {
        match mode {
            Mode::Noise => {
                let file_name = download_name(artifact_name);
                let path = self
                    .downloads
                    .save(&file_name, &response.body)
                    .await
                    .map_err(SubmitError::Save)?;
                info!(
                    file_name = %file_name,
                    path = %path.display(),
                    content_type = response.content_type.as_deref().unwrap_or("unknown"),
                    bytes = response.body.len(),
                    "processed file saved"
                );
                Ok(SubmissionOutcome::Downloaded { file_name, path })
            }
            Mode::Ml => {
                let parsed = AccuracyResponse::from_json_bytes(&response.body)
                    .map_err(|e| SubmitError::MalformedResponse(e.to_string()))?;
                for (label, score) in [
                    ("non_private", parsed.accuracy1),
                    ("private", parsed.accuracy2),
                ] {
                    if !(0.0..=1.0).contains(&score) {
                        warn!(score, label, "accuracy outside [0, 1]");
                    }
                }
                let results = ResultSet::from(parsed);
                info!(
                    non_private = results.non_private_accuracy,
                    private = results.private_accuracy,
                    "accuracy comparison received"
                );
                Ok(SubmissionOutcome::Scored(results))
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/response_tests.rs"]
mod tests;
