//! Configuration from drover.toml and DROVER_* environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

use crate::client::{DEFAULT_BASE_URL, DEFAULT_TOKEN_URL};
use crate::retry::RetryConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// API key presented during token exchange
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_secs: default_base_delay_secs(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_token_url() -> String {
    DEFAULT_TOKEN_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_secs() -> u64 {
    30
}

impl Config {
    /// Load configuration: drover.toml if present, then environment
    /// overrides. A missing API key is a fatal configuration error.
    pub fn load() -> Result<Self> {
        let mut config = match Self::find_config_path() {
            Ok(path) => Self::load_from(path)?,
            Err(_) => Self::default_minimal(),
        };
        config.apply_env_overrides();
        if config.api_key.is_empty() {
            anyhow::bail!("api key missing: set DROVER_API_KEY or api_key in drover.toml");
        }
        Ok(config)
    }

    /// Defaults with no API key; callers must provide one via env.
    pub fn default_minimal() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            token_url: default_token_url(),
            retry: RetrySettings::default(),
            request_timeout_secs: default_timeout_secs(),
        }
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read {}", path.as_ref().display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.as_ref().display()))
    }

    /// Find drover.toml by searching the current directory and parents.
    pub fn find_config_path() -> Result<PathBuf> {
        let mut current = std::env::current_dir()?;

        for _ in 0..10 {
            let candidate = current.join("drover.toml");
            if candidate.exists() {
                return Ok(candidate);
            }
            if !current.pop() {
                break;
            }
        }

        anyhow::bail!("drover.toml not found in current directory or parents")
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("DROVER_API_KEY") {
            self.api_key = key;
        }
        if let Ok(url) = std::env::var("DROVER_BASE_URL") {
            self.base_url = url;
        }
        if let Ok(url) = std::env::var("DROVER_TOKEN_URL") {
            self.token_url = url;
        }
        if let Ok(raw) = std::env::var("DROVER_MAX_RETRIES") {
            match raw.parse() {
                Ok(n) => self.retry.max_retries = n,
                Err(_) => warn!(value = %raw, "Ignoring unparsable DROVER_MAX_RETRIES"),
            }
        }
        if let Ok(raw) = std::env::var("DROVER_BASE_DELAY_SECS") {
            match raw.parse() {
                Ok(n) => self.retry.base_delay_secs = n,
                Err(_) => warn!(value = %raw, "Ignoring unparsable DROVER_BASE_DELAY_SECS"),
            }
        }
    }

    /// Bridge to the retry policy.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(
            self.retry.max_retries,
            Duration::from_secs(self.retry.base_delay_secs),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml = r#"
api_key = "sk-test"
base_url = "https://decisions.example.com/v2"

[retry]
max_retries = 5
base_delay_secs = 10
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.api_key, "sk-test");
        assert_eq!(config.base_url, "https://decisions.example.com/v2");
        assert_eq!(config.token_url, DEFAULT_TOKEN_URL);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry_config().base_delay, Duration::from_secs(10));
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_defaults_when_sections_absent() {
        let config: Config = toml::from_str(r#"api_key = "sk-test""#).unwrap();
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_delay_secs, 30);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_load_from_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("drover.toml");
        assert!(Config::load_from(&missing).is_err());
    }

    // Single test for every env-var path: these share process globals, so
    // splitting them would race under the parallel test runner.
    #[test]
    fn test_env_overrides_take_precedence() {
        let mut config: Config = toml::from_str(r#"api_key = "sk-file""#).unwrap();
        std::env::set_var("DROVER_API_KEY", "sk-env");
        std::env::set_var("DROVER_MAX_RETRIES", "7");
        config.apply_env_overrides();
        assert_eq!(config.api_key, "sk-env");
        assert_eq!(config.retry.max_retries, 7);

        // Unparsable numeric overrides keep the previous value.
        std::env::set_var("DROVER_MAX_RETRIES", "many");
        std::env::set_var("DROVER_BASE_DELAY_SECS", "soon");
        config.apply_env_overrides();
        std::env::remove_var("DROVER_API_KEY");
        std::env::remove_var("DROVER_MAX_RETRIES");
        std::env::remove_var("DROVER_BASE_DELAY_SECS");
        assert_eq!(config.retry.max_retries, 7);
        assert_eq!(config.retry.base_delay_secs, 30);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drover.toml");
        std::fs::write(&path, "api_key = \"sk-file\"\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.api_key, "sk-file");
    }
}
