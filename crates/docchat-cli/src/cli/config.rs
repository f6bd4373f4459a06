use std::path::Path;

use anyhow::{Context, Result};
use docchat_core::config::normalize_api_base;
use docchat_core::constants::env;
use docchat_core::CoreConfig;
use serde::{Deserialize, Serialize};

/// CLI configuration: the core settings plus CLI-only defaults, in one
/// camelCase JSON file
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CliConfig {
    #[serde(flatten)]
    pub core: CoreConfig,

    /// Session used when `--session` is not given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_session: Option<String>,
}

impl CliConfig {
    /// Load config from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize config")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: CliConfig =
            serde_json::from_str(json).context("Failed to deserialize config")?;
        config.core.validate()?;
        Ok(config)
    }

    /// Explicit file, else `<config_dir>/docchat/config.json` when it exists,
    /// else defaults. `DOCCHAT_API_BASE` then `api_base` override the base URL.
    pub fn resolve(explicit: Option<&Path>, api_base: Option<&str>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => match CoreConfig::default_path().filter(|p| p.exists()) {
                Some(path) => Self::load(&path)?,
                None => Self::default(),
            },
        };

        let env_base = std::env::var(env::API_BASE)
            .ok()
            .filter(|v| !v.trim().is_empty());
        if let Some(base) = api_base.map(str::to_string).or(env_base) {
            config.core.api_base = base;
        }
        config.core.api_base = normalize_api_base(&config.core.api_base)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_config_minimal() {
        let config = CliConfig::from_json("{}").unwrap();
        assert_eq!(config.core, CoreConfig::default());
        assert!(config.default_session.is_none());
    }

    #[test]
    fn test_parse_config_with_core_fields() {
        let json = r#"{
            "apiBase": "https://docs.example.com/api",
            "pollIntervalMs": 500,
            "defaultSession": "c42"
        }"#;
        let config = CliConfig::from_json(json).unwrap();
        assert_eq!(config.core.api_base, "https://docs.example.com/api");
        assert_eq!(config.core.poll_interval_ms, 500);
        assert_eq!(config.core.sweep_interval_ms, 5_000);
        assert_eq!(config.default_session.as_deref(), Some("c42"));
    }

    #[test]
    fn test_invalid_core_fields_are_rejected() {
        assert!(CliConfig::from_json(r#"{"pollIntervalMs": 0}"#).is_err());
        assert!(CliConfig::from_json(r#"{"apiBase": "ftp://nope"}"#).is_err());
    }

    #[test]
    fn test_round_trip_through_json() {
        let config = CliConfig {
            default_session: Some("c1".into()),
            ..CliConfig::default()
        };
        let restored = CliConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn test_resolve_explicit_file_and_flag_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"apiBase": "http://files.local/api/", "defaultSession": "c7"}}"#).unwrap();

        let from_file = CliConfig::resolve(Some(file.path()), None).unwrap();
        assert_eq!(from_file.default_session.as_deref(), Some("c7"));
        if std::env::var(env::API_BASE).is_err() {
            assert_eq!(from_file.core.api_base, "http://files.local/api");
        }

        let flagged = CliConfig::resolve(Some(file.path()), Some("http://flag.local/")).unwrap();
        assert_eq!(flagged.core.api_base, "http://flag.local");
    }

    #[test]
    fn test_resolve_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        assert!(CliConfig::resolve(Some(&missing), None).is_err());
    }
}
