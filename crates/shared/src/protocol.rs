use serde_json::Value;

use crate::error::ResponseShapeError;

/// Multipart key carrying the tabular file.
pub const ARTIFACT_FIELD: &str = "csvfile";
pub const CSV_MEDIA_TYPE: &str = "text/csv";
pub const DOWNLOAD_PREFIX: &str = "private_";

pub const NON_PRIVATE_ACCURACY_KEY: &str = "accuracy1";
pub const PRIVATE_ACCURACY_KEY: &str = "accuracy2";

pub fn download_name(original_name: &str) -> String {
    format!("{DOWNLOAD_PREFIX}{original_name}")
}

/// Accuracy-comparison result as returned by the service.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccuracyResponse {
    pub accuracy1: f64,
    pub accuracy2: f64,
}

impl AccuracyResponse {
    /// Validates the untrusted body before reading either score.
    pub fn from_json_bytes(body: &[u8]) -> Result<Self, ResponseShapeError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| ResponseShapeError::NotJson(e.to_string()))?;
        let object = value.as_object().ok_or(ResponseShapeError::NotObject)?;

        let score = |key: &'static str| -> Result<f64, ResponseShapeError> {
            let raw = object
                .get(key)
                .ok_or(ResponseShapeError::MissingField(key))?;
            raw.as_f64()
                .filter(|v| v.is_finite())
                .ok_or(ResponseShapeError::NotNumeric(key))
        };

        Ok(Self {
            accuracy1: score(NON_PRIVATE_ACCURACY_KEY)?,
            accuracy2: score(PRIVATE_ACCURACY_KEY)?,
        })
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
