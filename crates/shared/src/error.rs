use serde::Deserialize;
use thiserror::Error;

use crate::domain::Mode;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("unknown {mode} field '{name}'")]
    UnknownField { mode: Mode, name: String },
    #[error("unknown ml algorithm '{0}' (expected 1, 2, 3 or classification, regression, clustering)")]
    UnknownAlgorithm(String),
    #[error("unknown mode '{0}' (expected noise or ml)")]
    UnknownMode(String),
}

/// Error body the processing service sends alongside a non-success status.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseShapeError {
    #[error("response body is not valid json: {0}")]
    NotJson(String),
    #[error("response body is not a json object")]
    NotObject,
    #[error("response is missing field '{0}'")]
    MissingField(&'static str),
    #[error("response field '{0}' is not a finite number")]
    NotNumeric(&'static str),
}
