use std::{collections::HashMap, fs, path::Path, path::PathBuf, time::Duration};

use serde::Deserialize;
use thiserror::Error;
use url::Url;

pub const SETTINGS_FILE: &str = "dp_client.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub endpoint_url: String,
    pub request_timeout_secs: u64,
    pub download_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint_url: "http://localhost:5000/".into(),
            request_timeout_secs: 120,
            download_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid endpoint url '{url}': {source}")]
    InvalidEndpoint {
        url: String,
        source: url::ParseError,
    },
    #[error("endpoint url must use http or https, got '{0}'")]
    UnsupportedScheme(String),
    #[error("request timeout must be at least one second")]
    ZeroTimeout,
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validated_endpoint(&self) -> Result<Url, SettingsError> {
        let url = Url::parse(self.endpoint_url.trim()).map_err(|source| {
            SettingsError::InvalidEndpoint {
                url: self.endpoint_url.clone(),
                source,
            }
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(SettingsError::UnsupportedScheme(other.to_string())),
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.request_timeout_secs == 0 {
            return Err(SettingsError::ZeroTimeout);
        }
        self.validated_endpoint().map(|_| ())
    }
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

/// Defaults, then the TOML file if present, then environment overrides.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, toml::Value>>(&raw) {
            if let Some(v) = file_cfg.get("endpoint_url").and_then(|v| v.as_str()) {
                settings.endpoint_url = v.to_string();
            }
            if let Some(v) = file_cfg.get("request_timeout_secs") {
                let parsed = match v {
                    toml::Value::Integer(n) => u64::try_from(*n).ok(),
                    toml::Value::String(s) => s.trim().parse::<u64>().ok(),
                    _ => None,
                };
                if let Some(secs) = parsed {
                    settings.request_timeout_secs = secs;
                }
            }
            if let Some(v) = file_cfg.get("download_dir").and_then(|v| v.as_str()) {
                settings.download_dir = PathBuf::from(v);
            }
        }
    }

    if let Some(v) = env("DP_ENDPOINT_URL") {
        settings.endpoint_url = v;
    }
    if let Some(v) = env("APP__ENDPOINT_URL") {
        settings.endpoint_url = v;
    }

    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = v.trim().parse::<u64>() {
            settings.request_timeout_secs = parsed;
        }
    }

    if let Some(v) = env("APP__DOWNLOAD_DIR") {
        settings.download_dir = PathBuf::from(v);
    }

    settings
}

#[cfg(test)]
#[path = "tests/settings_tests.rs"]
mod tests;
