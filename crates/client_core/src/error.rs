use std::time::Duration;

use thiserror::Error;

pub const MISSING_INPUT_MESSAGE: &str = "Please select a file first";
pub const BUSY_MESSAGE: &str = "A submission is already in progress";
pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to process the file. Please try again.";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to encode request payload: {0}")]
    Build(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("service returned status {status}: {message}")]
    Status { status: u16, message: String },
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("no input file selected")]
    MissingInput,
    #[error("a submission is already in flight")]
    AlreadyInFlight,
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("failed to save processed file: {0:#}")]
    Save(anyhow::Error),
}

impl SubmitError {
    /// Text safe to show the user. Post-dispatch causes stay in the log.
    pub fn user_message(&self) -> &'static str {
        match self {
            SubmitError::MissingInput => MISSING_INPUT_MESSAGE,
            SubmitError::AlreadyInFlight => BUSY_MESSAGE,
            SubmitError::Transport(_)
            | SubmitError::Timeout(_)
            | SubmitError::MalformedResponse(_)
            | SubmitError::Save(_) => GENERIC_FAILURE_MESSAGE,
        }
    }

    /// Precondition failures never reach the network.
    pub fn is_precondition(&self) -> bool {
        matches!(self, SubmitError::MissingInput | SubmitError::AlreadyInFlight)
    }
}
