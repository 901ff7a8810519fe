use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

const MAX_NAME_ATTEMPTS: usize = 1000;

/// Where a processed file ends up once the service returns it.
#[async_trait]
pub trait DownloadSink: Send + Sync {
    /// Writes `bytes` as a new file named after `file_name` and returns its path.
    async fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf>;
}

pub struct DirectoryDownloadSink {
    dir: PathBuf,
}

impl DirectoryDownloadSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

fn candidate_name(file_name: &str, attempt: usize) -> String {
    if attempt == 0 {
        return file_name.to_string();
    }
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem} ({attempt}).{ext}"),
        None => format!("{stem} ({attempt})"),
    }
}

#[async_trait]
impl DownloadSink for DirectoryDownloadSink {
    async fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let file_name = Path::new(file_name)
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("download name '{file_name}' is not a plain file name"))?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create '{}'", self.dir.display()))?;

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let path = self.dir.join(candidate_name(file_name, attempt));
            let mut file = match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(err) => {
                    return Err(err).with_context(|| format!("failed to create '{}'", path.display()))
                }
            };
            file.write_all(bytes)
                .await
                .with_context(|| format!("failed to write '{}'", path.display()))?;
            file.flush().await?;
            return Ok(path);
        }

        Err(anyhow!(
            "no free name for '{file_name}' in '{}'",
            self.dir.display()
        ))
    }
}

#[cfg(test)]
#[path = "tests/download_tests.rs"]
mod tests;
