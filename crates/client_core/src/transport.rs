use std::time::Duration;

use async_trait::async_trait;
use dp_shared::{
    domain::{Mode, MlJobConfig, NoiseJobConfig},
    error::ServiceErrorBody,
    protocol::ARTIFACT_FIELD,
};
use reqwest::{
    header::CONTENT_TYPE,
    multipart::{Form, Part},
    Client,
};
use tracing::debug;
use url::Url;

use crate::{artifact::InputArtifact, error::TransportError};

const ERROR_BODY_PREVIEW_LEN: usize = 256;

/// Everything one request carries, captured when `submit` is called so later
/// edits to the session cannot leak into a dispatched job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobPayload {
    pub mode: Mode,
    pub artifact: InputArtifact,
    pub fields: Vec<(&'static str, String)>,
}

impl JobPayload {
    pub fn noise(artifact: InputArtifact, config: &NoiseJobConfig) -> Self {
        Self {
            mode: Mode::Noise,
            artifact,
            fields: config.form_fields(),
        }
    }

    pub fn ml(artifact: InputArtifact, config: &MlJobConfig) -> Self {
        Self {
            mode: Mode::Ml,
            artifact,
            fields: config.form_fields(),
        }
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Issues exactly one request per call. Non-success statuses are errors.
#[async_trait]
pub trait JobTransport: Send + Sync {
    async fn send(&self, payload: JobPayload) -> Result<TransportResponse, TransportError>;
}

pub struct HttpTransport {
    http: Client,
    endpoint: Url,
}

impl HttpTransport {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, TransportError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, endpoint })
    }
}

fn multipart_form(payload: JobPayload) -> Result<Form, TransportError> {
    let JobPayload {
        artifact, fields, ..
    } = payload;
    let part = Part::bytes(artifact.bytes)
        .file_name(artifact.name)
        .mime_str(&artifact.media_type)
        .map_err(|e| TransportError::Build(format!("invalid media type: {e}")))?;

    let mut form = Form::new().part(ARTIFACT_FIELD, part);
    for (key, value) in fields {
        form = form.text(key, value);
    }
    Ok(form)
}

fn service_error_message(body: &[u8]) -> String {
    if let Ok(parsed) = serde_json::from_slice::<ServiceErrorBody>(body) {
        return parsed.error;
    }
    let preview = &body[..body.len().min(ERROR_BODY_PREVIEW_LEN)];
    String::from_utf8_lossy(preview).into_owned()
}

#[async_trait]
impl JobTransport for HttpTransport {
    async fn send(&self, payload: JobPayload) -> Result<TransportResponse, TransportError> {
        debug!(
            mode = %payload.mode,
            endpoint = %self.endpoint,
            fields = ?payload.fields,
            "posting multipart job"
        );
        let form = multipart_form(payload)?;
        let response = self
            .http
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                message: service_error_message(&body),
            });
        }

        Ok(TransportResponse {
            content_type,
            body,
        })
    }
}
