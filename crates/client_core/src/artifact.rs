use std::path::Path;

use anyhow::{anyhow, Context, Result};
use dp_shared::protocol::CSV_MEDIA_TYPE;
use tracing::{info, warn};

/// The user-supplied tabular file. Replaced wholesale, never edited in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputArtifact {
    pub name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl InputArtifact {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes,
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("path '{}' has no usable file name", path.display()))?;
        let media_type = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read '{}'", path.display()))?;
        Ok(Self::new(name, media_type, bytes))
    }

    pub fn is_tabular(&self) -> bool {
        let essence = self
            .media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        essence == CSV_MEDIA_TYPE || self.name.to_ascii_lowercase().ends_with(".csv")
    }
}

/// Holds zero or one selected artifact.
#[derive(Debug, Default)]
pub struct FileHolder {
    current: Option<InputArtifact>,
}

impl FileHolder {
    /// Accepts a selection only if it is exactly one tabular file; anything
    /// else is ignored and the held artifact stays as it was.
    pub fn select(&mut self, mut selection: Vec<InputArtifact>) -> bool {
        if selection.len() != 1 {
            warn!(
                count = selection.len(),
                "file selection ignored: exactly one file is accepted"
            );
            return false;
        }
        let Some(artifact) = selection.pop() else {
            return false;
        };
        if !artifact.is_tabular() {
            warn!(
                file_name = %artifact.name,
                media_type = %artifact.media_type,
                "file selection ignored: not a csv file"
            );
            return false;
        }
        info!(
            file_name = %artifact.name,
            bytes = artifact.bytes.len(),
            "input file selected"
        );
        self.current = Some(artifact);
        true
    }

    pub fn current(&self) -> Option<&InputArtifact> {
        self.current.as_ref()
    }
}
