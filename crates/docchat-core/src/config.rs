use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::poller::PollPolicy;

/// Core configuration, loadable from a camelCase JSON file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoreConfig {
    /// Base URL every gateway path is appended to
    pub api_base: String,
    pub request_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub poll_max_interval_ms: u64,
    /// Multiplier applied to the poll delay after each non-terminal status (1.0 = fixed)
    pub poll_backoff: f64,
    /// `None` polls until the job is terminal
    pub poll_max_attempts: Option<u32>,
    pub sweep_interval_ms: u64,
    pub upload_chunk_bytes: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            api_base: constants::DEFAULT_API_BASE.to_string(),
            request_timeout_secs: constants::REQUEST_TIMEOUT_SECS,
            poll_interval_ms: constants::POLL_INTERVAL_MS,
            poll_max_interval_ms: constants::POLL_MAX_INTERVAL_MS,
            poll_backoff: 1.0,
            poll_max_attempts: Some(constants::POLL_MAX_ATTEMPTS),
            sweep_interval_ms: constants::SWEEP_INTERVAL_MS,
            upload_chunk_bytes: constants::UPLOAD_CHUNK_BYTES,
        }
    }
}

impl CoreConfig {
    /// Load config from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: CoreConfig =
            serde_json::from_str(json).context("Failed to deserialize config")?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve configuration: explicit file, else the per-user default file if it
    /// exists, else defaults. `DOCCHAT_API_BASE` wins over whatever was loaded.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::load(&path)?,
                None => Self::default(),
            },
        };

        if let Ok(api_base) = std::env::var(constants::env::API_BASE) {
            if !api_base.trim().is_empty() {
                config.api_base = api_base;
            }
        }
        config.api_base = normalize_api_base(&config.api_base)?;
        Ok(config)
    }

    /// `<config_dir>/docchat/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("docchat").join("config.json"))
    }

    pub fn validate(&self) -> Result<()> {
        normalize_api_base(&self.api_base)?;
        if self.poll_interval_ms == 0 {
            anyhow::bail!("pollIntervalMs must be greater than zero");
        }
        if self.sweep_interval_ms == 0 {
            anyhow::bail!("sweepIntervalMs must be greater than zero");
        }
        if self.upload_chunk_bytes == 0 {
            anyhow::bail!("uploadChunkBytes must be greater than zero");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("requestTimeoutSecs must be greater than zero");
        }
        if !(1.0..=constants::POLL_MAX_BACKOFF).contains(&self.poll_backoff) {
            anyhow::bail!(
                "pollBackoff must be between 1.0 and {}",
                constants::POLL_MAX_BACKOFF
            );
        }
        Ok(())
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_interval: Duration::from_millis(self.poll_max_interval_ms.max(self.poll_interval_ms)),
            backoff: self.poll_backoff,
            max_attempts: self.poll_max_attempts,
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Require an http(s) scheme and strip trailing slashes.
pub fn normalize_api_base(api_base: &str) -> Result<String> {
    let trimmed = api_base.trim();
    if trimmed.is_empty() {
        anyhow::bail!("API base URL cannot be empty");
    }
    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        anyhow::bail!("API base URL must start with http:// or https://");
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_config_minimal() {
        let config = CoreConfig::from_json("{}").unwrap();
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.poll_policy().interval, Duration::from_millis(2_000));
        assert_eq!(config.sweep_interval(), Duration::from_millis(5_000));
    }

    #[test]
    fn test_parse_config_overrides() {
        let json = r#"{
            "apiBase": "https://chat.example.com/api/",
            "pollIntervalMs": 500,
            "pollBackoff": 2.0,
            "pollMaxAttempts": null
        }"#;
        let config = CoreConfig::from_json(json).unwrap();
        assert_eq!(config.api_base, "https://chat.example.com/api/");
        let policy = config.poll_policy();
        assert_eq!(policy.interval, Duration::from_millis(500));
        assert_eq!(policy.backoff, 2.0);
        assert!(policy.max_attempts.is_none());
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(CoreConfig::from_json(r#"{"apiBase": "ftp://x"}"#).is_err());
        assert!(CoreConfig::from_json(r#"{"pollIntervalMs": 0}"#).is_err());
        assert!(CoreConfig::from_json(r#"{"pollBackoff": 0.5}"#).is_err());
        assert!(CoreConfig::from_json(r#"{"pollBackoff": 1e300}"#).is_err());
        assert!(CoreConfig::from_json(r#"{"requestTimeoutSecs": 0}"#).is_err());
        assert!(CoreConfig::from_json(r#"{"pollBackoff": 10.0}"#).is_ok());
    }

    #[test]
    fn test_load_from_file_normalizes_base() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"apiBase": "http://127.0.0.1:9000/api//"}}"#).unwrap();

        let config = CoreConfig::resolve(Some(file.path())).unwrap();
        if std::env::var(constants::env::API_BASE).is_err() {
            assert_eq!(config.api_base, "http://127.0.0.1:9000/api");
        }
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(CoreConfig::load(&missing).is_err());
    }

    #[test]
    fn test_normalize_api_base() {
        assert_eq!(normalize_api_base(" http://a/b/ ").unwrap(), "http://a/b");
        assert!(normalize_api_base("").is_err());
        assert!(normalize_api_base("localhost:5050").is_err());
    }
}
