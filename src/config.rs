//! Configuration management for tracelens
//!
//! Stores settings in ~/.config/tracelens/config.json. API keys never live in
//! the file: they come from the environment or the system keychain.

use crate::diagnose::{GenerationSettings, PipelineSettings, Provider};
use anyhow::{bail, Context, Result};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

const KEYRING_SERVICE: &str = "tracelens";

/// Fallback env var consulted after the provider-specific one
pub const GENERIC_KEY_ENV: &str = "TRACELENS_API_KEY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: Provider,
    /// Model id; the provider default is used when unset
    pub model: Option<String>,
    /// Endpoint override (proxies, self-hosted gateways)
    pub api_base: Option<String>,
    pub request_timeout_secs: u64,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Stack used when the repository gives no hints
    pub default_tech_stack: Vec<String>,
    /// Maximum entries kept in the local history file
    pub history_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: None,
            api_base: None,
            request_timeout_secs: 60,
            temperature: 0.2,
            max_output_tokens: 4096,
            default_tech_stack: Vec::new(),
            history_limit: 50,
        }
    }
}

fn keyring_disabled() -> bool {
    if cfg!(test) {
        return true;
    }
    matches!(
        std::env::var("TRACELENS_DISABLE_KEYRING")
            .unwrap_or_default()
            .to_lowercase()
            .as_str(),
        "1" | "true" | "yes"
    )
}

fn keyring_entry(provider: Provider) -> Result<Entry, keyring::Error> {
    Entry::new(KEYRING_SERVICE, provider.name())
}

fn read_keyring_key(provider: Provider) -> Result<Option<String>, keyring::Error> {
    if keyring_disabled() {
        return Ok(None);
    }
    let entry = keyring_entry(provider)?;
    match entry.get_password() {
        Ok(key) => Ok(Some(key)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(err) => Err(err),
    }
}

fn write_keyring_key(provider: Provider, key: &str) -> Result<(), keyring::Error> {
    keyring_entry(provider)?.set_password(key)
}

fn env_key(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tracelens"))
    }

    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load config from the default location, or return defaults
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load config from `path`. A missing file yields defaults; a corrupt one
    /// is moved aside and defaults are used.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                preserve_corrupt_config(path, &content);
                warn!(
                    path = %path.display(),
                    "config file was corrupted ({}); a backup was saved and defaults were loaded",
                    err
                );
                Self::default()
            }
        }
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().context("Could not determine config directory")?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory {}", dir.display()))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Err(e) = fs::set_permissions(dir, fs::Permissions::from_mode(0o700)) {
                    warn!("failed to set config directory permissions: {}", e);
                }
            }
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        write_config_atomic(path, &content)
            .with_context(|| format!("Failed to write config {}", path.display()))
    }

    /// Model id to send, falling back to the provider default
    pub fn model_id(&self) -> String {
        self.model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }

    /// Resolve the API key: provider env var, generic env var, then keychain.
    pub fn api_key(&self) -> Option<String> {
        if let Some(key) = env_key(self.provider.key_env_var()).or_else(|| env_key(GENERIC_KEY_ENV)) {
            return Some(key);
        }

        match read_keyring_key(self.provider) {
            Ok(key) => key,
            Err(err) => {
                warn!(
                    "failed to read API key from system keychain: {}. Set {} as a workaround.",
                    err,
                    self.provider.key_env_var()
                );
                None
            }
        }
    }

    /// Store the API key for the configured provider in the system keychain
    pub fn set_api_key(&self, key: &str) -> Result<()> {
        let key = key.trim();
        if key.is_empty() {
            bail!("No API key provided");
        }
        write_keyring_key(self.provider, key).with_context(|| {
            format!(
                "Failed to store API key in system keychain. You can set {} instead",
                self.provider.key_env_var()
            )
        })?;

        match read_keyring_key(self.provider) {
            Ok(Some(stored)) if stored == key => Ok(()),
            Ok(_) => bail!(
                "API key verification failed: key was not persisted to keychain. \
                 You can set {} instead.",
                self.provider.key_env_var()
            ),
            Err(err) => bail!(
                "API key verification failed: couldn't read back from keychain ({}).",
                err
            ),
        }
    }

    /// Freeze the settings the pipeline runs with. Called once per process.
    pub fn pipeline_settings(&self) -> Result<PipelineSettings> {
        let api_base = match self.api_base.as_deref().map(str::trim) {
            Some(base) if !base.is_empty() => {
                let parsed = url::Url::parse(base)
                    .with_context(|| format!("Invalid api_base URL: {}", base))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    bail!("api_base must be an http(s) URL, got {}", base);
                }
                Some(base.to_string())
            }
            _ => None,
        };

        if !(0.0..=2.0).contains(&self.temperature) {
            bail!("temperature must be between 0.0 and 2.0, got {}", self.temperature);
        }

        Ok(PipelineSettings {
            provider: self.provider,
            api_key: self.api_key(),
            api_base,
            generation: GenerationSettings {
                model: self.model_id(),
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
                timeout_secs: self.request_timeout_secs.max(1),
            },
        })
    }

    /// Get the config file location for display
    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/tracelens/config.json".to_string())
    }
}

fn preserve_corrupt_config(path: &Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}

fn write_config_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    use std::fs::OpenOptions;

    let tmp_path = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = file.set_permissions(fs::Permissions::from_mode(0o600)) {
            warn!("failed to set temp config file permissions: {}", e);
        }
    }

    file.write_all(content.as_bytes())?;

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.provider, Provider::OpenRouter);
        assert_eq!(config.history_limit, 50);
        assert_eq!(config.model_id(), Provider::OpenRouter.default_model());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            provider: Provider::Gemini,
            model: Some("gemini-1.5-pro".to_string()),
            default_tech_stack: vec!["Django".to_string()],
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path), config);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"provider":"gemini"}"#).unwrap();
        let config = Config::load_from(&path);
        assert_eq!(config.provider, Provider::Gemini);
        assert_eq!(config.request_timeout_secs, 60);
    }

    #[test]
    fn test_corrupt_config_is_preserved() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        let config = Config::load_from(&path);
        assert_eq!(config, Config::default());
        assert!(dir.path().join("config.json.corrupt").exists());
        assert!(!path.exists());
    }

    #[test]
    fn test_pipeline_settings_rejects_bad_api_base() {
        let config = Config {
            api_base: Some("not a url".to_string()),
            ..Config::default()
        };
        assert!(config.pipeline_settings().is_err());

        let config = Config {
            api_base: Some("ftp://example.com".to_string()),
            ..Config::default()
        };
        assert!(config.pipeline_settings().is_err());
    }

    #[test]
    fn test_pipeline_settings_carries_generation() {
        let config = Config {
            api_base: Some("http://localhost:8080/v1/chat".to_string()),
            temperature: 0.5,
            ..Config::default()
        };
        let settings = config.pipeline_settings().unwrap();
        assert_eq!(settings.api_base.as_deref(), Some("http://localhost:8080/v1/chat"));
        assert_eq!(settings.generation.temperature, 0.5);
        assert_eq!(settings.generation.model, Provider::OpenRouter.default_model());
    }
}
