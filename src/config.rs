use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ImageGenError, Result};

pub const DEFAULT_API_URL: &str = "https://api.apicore.ai/v1/images/generations";
pub const DEFAULT_CONFIG_FILE: &str = ".apikey";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_MAX_PARALLEL: usize = 5;

const PLACEHOLDER_API_KEY: &str = "your-api-key-here";

/// What actually lands in the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub api_url: String,
    pub timeout: Duration,
    pub max_parallel: usize,
    pub config_file: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            api_key: None,
            api_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_parallel: DEFAULT_MAX_PARALLEL,
            config_file: PathBuf::from(DEFAULT_CONFIG_FILE),
            output_dir: default_output_dir(),
        }
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the JSON config file. A missing file is not an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = AppConfig {
            config_file: path.to_path_buf(),
            ..Default::default()
        };

        if !path.exists() {
            log::info!("Config file {} not found, using defaults", path.display());
            return Ok(config);
        }

        let raw = fs::read_to_string(path).map_err(|e| ImageGenError::io(path, e))?;
        let stored: StoredConfig = serde_json::from_str(&raw).map_err(|e| {
            ImageGenError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;

        config.api_key = stored.api_key;
        if let Some(url) = stored.api_url {
            config.api_url = url;
        }
        log::info!("Loaded config file: {}", path.display());
        Ok(config)
    }

    pub fn from_env() -> Self {
        Self::default().merge_env()
    }

    /// Environment values take precedence over whatever is already set.
    pub fn merge_env(mut self) -> Self {
        if let Some(key) = non_empty_env("IMAGEGEN_API_KEY").or_else(|| non_empty_env("OPENAI_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(url) = non_empty_env("IMAGEGEN_API_URL") {
            self.api_url = url;
        }
        if let Some(secs) = non_empty_env("IMAGEGEN_TIMEOUT_SECS").and_then(|s| s.parse::<u64>().ok()) {
            self.timeout = Duration::from_secs(secs);
        }
        if let Some(n) = non_empty_env("IMAGEGEN_MAX_PARALLEL").and_then(|s| s.parse::<usize>().ok()) {
            if n > 0 {
                self.max_parallel = n;
            }
        }
        if let Some(dir) = non_empty_env("IMAGEGEN_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = path.into();
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn save(&self) -> Result<()> {
        let stored = StoredConfig {
            api_key: self.api_key.clone(),
            api_url: Some(self.api_url.clone()),
        };
        let json = serde_json::to_string_pretty(&stored)?;

        if let Some(parent) = self.config_file.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| ImageGenError::io(parent, e))?;
            }
        }
        fs::write(&self.config_file, json).map_err(|e| ImageGenError::io(&self.config_file, e))?;
        log::info!("Config saved: {}", self.config_file.display());
        Ok(())
    }

    pub fn set_api_key(&mut self, api_key: impl Into<String>) -> Result<()> {
        self.api_key = Some(api_key.into());
        self.save()
    }

    pub fn set_api_url(&mut self, api_url: impl Into<String>) -> Result<()> {
        self.api_url = api_url.into();
        self.save()
    }

    /// Forgets the stored key and URL and rewrites the file empty.
    pub fn clear(&mut self) -> Result<()> {
        self.api_key = None;
        self.api_url = DEFAULT_API_URL.to_string();
        let json = serde_json::to_string_pretty(&StoredConfig::default())?;
        fs::write(&self.config_file, json).map_err(|e| ImageGenError::io(&self.config_file, e))
    }

    pub fn is_api_key_valid(&self) -> bool {
        match self.api_key.as_deref() {
            Some(key) => !key.trim().is_empty() && key != PLACEHOLDER_API_KEY,
            None => false,
        }
    }

    pub fn masked_api_key(&self) -> String {
        match self.api_key.as_deref() {
            Some(key) if key.chars().count() > 12 => {
                let chars: Vec<char> = key.chars().collect();
                let head: String = chars[..8].iter().collect();
                let tail: String = chars[chars.len() - 4..].iter().collect();
                format!("{}...{}", head, tail)
            }
            Some(_) => "***".to_string(),
            None => "<unset>".to_string(),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn default_output_dir() -> PathBuf {
    env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .map(|home| PathBuf::from(home).join("Pictures"))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(dir.path().join(".apikey")).unwrap();
        assert!(config.api_key().is_none());
        assert_eq!(config.api_url(), DEFAULT_API_URL);
        assert_eq!(config.timeout, Duration::from_secs(300));
        assert_eq!(config.max_parallel, 5);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(".apikey");

        let mut config = AppConfig::new().with_config_file(&path);
        config.set_api_key("sk-test-1234567890").unwrap();
        config.set_api_url("https://example.com/v1/images/generations").unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.api_key(), Some("sk-test-1234567890"));
        assert_eq!(loaded.api_url(), "https://example.com/v1/images/generations");
    }

    #[test]
    fn clear_forgets_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".apikey");
        let mut config = AppConfig::new().with_config_file(&path).with_api_key("sk-abcdefghijk");
        config.save().unwrap();
        config.clear().unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert!(loaded.api_key().is_none());
        assert_eq!(loaded.api_url(), DEFAULT_API_URL);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".apikey");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(ImageGenError::Config(_))));
    }

    #[test]
    fn api_key_validity_and_masking() {
        assert!(!AppConfig::new().is_api_key_valid());
        assert!(!AppConfig::new().with_api_key("   ").is_api_key_valid());
        assert!(!AppConfig::new().with_api_key("your-api-key-here").is_api_key_valid());
        assert!(AppConfig::new().with_api_key("sk-real-key").is_api_key_valid());

        let config = AppConfig::new().with_api_key("sk-1234567890abcdef");
        assert_eq!(config.masked_api_key(), "sk-12345...cdef");
        assert_eq!(AppConfig::new().with_api_key("short").masked_api_key(), "***");
    }
}
