//! Engine configuration
//!
//! Layered: built-in defaults, then an optional JSON file, then environment
//! variables. Everything has a usable default except the Gemini API key, whose
//! absence only surfaces when an analysis is actually requested.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_LOG_RETENTION_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub gemini_api_key: Option<String>,
    pub model: String,
    pub api_base: String,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub log_retention_days: i64,
    /// Fixed login challenge code; a random one is drawn when unset
    pub challenge_code: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        let base = PathBuf::from(home).join(".career-compass");
        Self {
            gemini_api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            data_dir: base.clone(),
            log_dir: base.join("logs"),
            log_retention_days: DEFAULT_LOG_RETENTION_DAYS,
            challenge_code: None,
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Read a JSON config file (missing keys fall back to defaults), then apply
    /// environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EngineError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut config: EngineConfig = serde_json::from_str(&raw).map_err(|e| {
            EngineError::config(format!("cannot parse {}: {}", path.display(), e))
        })?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("GEMINI_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.gemini_api_key = Some(key);
        }
        if let Some(model) = lookup("CAREER_COMPASS_MODEL") {
            self.model = model;
        }
        if let Some(secs) = lookup("CAREER_COMPASS_TIMEOUT_SECS") {
            self.request_timeout_secs = secs.trim().parse().map_err(|_| {
                EngineError::config(format!("CAREER_COMPASS_TIMEOUT_SECS is not a number: {}", secs))
            })?;
        }
        if let Some(dir) = lookup("CAREER_COMPASS_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("CAREER_COMPASS_LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }
        if let Some(code) = lookup("CAREER_COMPASS_CHALLENGE_CODE") {
            self.challenge_code = Some(code);
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            return Err(EngineError::config("request timeout must be at least one second"));
        }
        if self.model.trim().is_empty() {
            return Err(EngineError::config("model name is empty"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Location of the SQLite database inside the data directory.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("career-compass.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.model, DEFAULT_MODEL);
        assert!(config.gemini_api_key.is_none());
        assert!(config.database_path().ends_with("career-compass.db"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = EngineConfig::default();
        config
            .apply_env(lookup_from(&[
                ("GEMINI_API_KEY", "secret"),
                ("CAREER_COMPASS_TIMEOUT_SECS", "45"),
                ("CAREER_COMPASS_CHALLENGE_CODE", "123456"),
            ]))
            .unwrap();
        assert_eq!(config.gemini_api_key.as_deref(), Some("secret"));
        assert_eq!(config.request_timeout_secs, 45);
        assert_eq!(config.challenge_code.as_deref(), Some("123456"));
    }

    #[test]
    fn test_bad_timeout_is_config_error() {
        let mut config = EngineConfig::default();
        let err = config
            .apply_env(lookup_from(&[("CAREER_COMPASS_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"model": "gemini-2.5-pro", "request_timeout_secs": 20}"#).unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.model, "gemini-2.5-pro");
        assert_eq!(config.request_timeout_secs, 20);
        assert_eq!(config.api_base, DEFAULT_API_BASE);
    }
}
