use std::path::{Path, PathBuf};
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::audio::engine::EngineSettings;
use crate::error::ConfigError;

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8000/tts/stream";

const MAX_FADE_MS: u64 = 1_000;
const MAX_FINAL_SILENCE_MS: u64 = 10_000;
const MIN_STATUS_INTERVAL_MS: u64 = 10;

/// Player configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub endpoint: String,
    pub preferred_device: Option<String>,
    pub default_voice: Option<String>,
    pub fade_duration_ms: u64,
    pub final_silence_ms: u64,
    pub status_interval_ms: u64,
    pub debug_status: bool,
    pub request_timeout_secs: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            preferred_device: None,
            default_voice: None,
            fade_duration_ms: 20,
            final_silence_ms: 500,
            status_interval_ms: 250,
            debug_status: false,
            request_timeout_secs: 30,
        }
    }
}

impl PlayerConfig {
    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_endpoint(&self.endpoint)?;
        if self.fade_duration_ms > MAX_FADE_MS {
            return Err(ConfigError::InvalidValue {
                key: "fade_duration_ms".to_string(),
                reason: format!("must be at most {} ms", MAX_FADE_MS),
            });
        }
        if self.final_silence_ms > MAX_FINAL_SILENCE_MS {
            return Err(ConfigError::InvalidValue {
                key: "final_silence_ms".to_string(),
                reason: format!("must be at most {} ms", MAX_FINAL_SILENCE_MS),
            });
        }
        if self.status_interval_ms < MIN_STATUS_INTERVAL_MS {
            return Err(ConfigError::InvalidValue {
                key: "status_interval_ms".to_string(),
                reason: format!("must be at least {} ms", MIN_STATUS_INTERVAL_MS),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "request_timeout_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Runtime subset handed to the engine
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            endpoint: self.endpoint.clone(),
            preferred_device: self.preferred_device.clone(),
            fade_duration: Duration::from_millis(self.fade_duration_ms),
            final_silence: Duration::from_millis(self.final_silence_ms),
            status_interval: Duration::from_millis(self.status_interval_ms.max(MIN_STATUS_INTERVAL_MS)),
            debug_status: self.debug_status,
            request_timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
        }
    }
}

fn validate_endpoint(endpoint: &str) -> Result<(), ConfigError> {
    let url = reqwest::Url::parse(endpoint).map_err(|e| ConfigError::InvalidValue {
        key: "endpoint".to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidValue {
            key: "endpoint".to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    config: PlayerConfig,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Load from the default location; unreadable files fall back to defaults
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;
        Ok(Self::with_path(config_path))
    }

    pub fn with_path(config_path: PathBuf) -> Self {
        let config = match Self::load_config(&config_path) {
            Ok(config) => config,
            Err(err) => {
                warn!(
                    "Ignoring configuration at {}: {}; using defaults",
                    config_path.display(),
                    err
                );
                PlayerConfig::default()
            }
        };
        Self { config, config_path }
    }

    pub fn get_config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Apply a change, validate it and save; the old config is kept on error
    pub fn update_config<F>(&mut self, updater: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut PlayerConfig),
    {
        let mut updated = self.config.clone();
        updater(&mut updated);
        updated.validate()?;
        self.config = updated;
        self.save_config()
    }

    pub fn set_endpoint(&mut self, endpoint: &str) -> Result<(), ConfigError> {
        let endpoint = endpoint.trim().to_string();
        self.update_config(|config| config.endpoint = endpoint)
    }

    /// `None` (or the name "default") clears the preference
    pub fn set_preferred_device(&mut self, device: Option<String>) -> Result<(), ConfigError> {
        let device = device.filter(|name| !name.is_empty() && !name.eq_ignore_ascii_case("default"));
        self.update_config(|config| config.preferred_device = device)
    }

    pub fn set_default_voice(&mut self, voice: Option<String>) -> Result<(), ConfigError> {
        self.update_config(|config| config.default_voice = voice)
    }

    pub fn reset_to_defaults(&mut self) -> Result<(), ConfigError> {
        self.config = PlayerConfig::default();
        self.save_config()
    }

    fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::home_dir()
            .ok_or(ConfigError::ConfigDirNotFound)?
            .join(".config")
            .join("tts-stream-player");
        Ok(config_dir.join("config.toml"))
    }

    fn load_config(path: &Path) -> Result<PlayerConfig, ConfigError> {
        if !path.exists() {
            return Ok(PlayerConfig::default());
        }

        let config_content = std::fs::read_to_string(path).map_err(ConfigError::IoError)?;
        let config: PlayerConfig = toml::from_str(&config_content).map_err(ConfigError::DeserializationError)?;
        config.validate()?;
        Ok(config)
    }

    fn save_config(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::IoError)?;
        }

        let config_content = toml::to_string_pretty(&self.config).map_err(ConfigError::SerializationError)?;
        std::fs::write(&self.config_path, config_content).map_err(ConfigError::IoError)?;
        Ok(())
    }
}
