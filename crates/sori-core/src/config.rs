//! Configuration management for sori.
//!
//! This module provides core configuration that doesn't depend on
//! platform-specific audio or UI libraries.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{APP_NAME, DEFAULT_LOCALE};

/// Base URL of the quiz service when nothing else is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Core configuration structure for the application.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Base URL of the quiz service that hosts the `/stt` endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Recognition locale (BCP 47)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,

    /// Keep one recognition session running and restart it when the
    /// platform stops it. When false, each session captures one utterance.
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub continuous: bool,

    /// Base delay before restarting recognition after it ends (milliseconds)
    #[serde(
        default = "default_restart_delay_ms",
        skip_serializing_if = "is_default_restart_delay_ms"
    )]
    pub restart_delay_ms: u64,

    /// Upper bound for the restart backoff (milliseconds)
    #[serde(
        default = "default_max_restart_delay_ms",
        skip_serializing_if = "is_default_max_restart_delay_ms"
    )]
    pub max_restart_delay_ms: u64,

    /// Length of each fallback clip (in seconds)
    #[serde(
        default = "default_clip_duration",
        skip_serializing_if = "is_default_clip_duration"
    )]
    pub clip_duration: f32,

    /// Keep the fallback microphone stream open between clips
    #[serde(default, skip_serializing_if = "is_false")]
    pub keep_mic_warm: bool,

    /// Timeout for the transcription upload (in seconds)
    #[serde(
        default = "default_upload_timeout_secs",
        skip_serializing_if = "is_default_upload_timeout_secs"
    )]
    pub upload_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn is_true(v: &bool) -> bool {
    *v
}

fn is_false(v: &bool) -> bool {
    !*v
}

fn default_restart_delay_ms() -> u64 {
    200
}

fn is_default_restart_delay_ms(v: &u64) -> bool {
    *v == default_restart_delay_ms()
}

fn default_max_restart_delay_ms() -> u64 {
    5000
}

fn is_default_max_restart_delay_ms(v: &u64) -> bool {
    *v == default_max_restart_delay_ms()
}

fn default_clip_duration() -> f32 {
    3.5
}

/// Longest clip worth uploading, in seconds
const MAX_CLIP_DURATION: f32 = 30.0;

fn is_default_clip_duration(v: &f32) -> bool {
    (*v - default_clip_duration()).abs() < f32::EPSILON
}

fn default_upload_timeout_secs() -> u64 {
    15
}

fn is_default_upload_timeout_secs(v: &u64) -> bool {
    *v == default_upload_timeout_secs()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: None,
            locale: None,
            continuous: true,
            restart_delay_ms: default_restart_delay_ms(),
            max_restart_delay_ms: default_max_restart_delay_ms(),
            clip_duration: default_clip_duration(),
            keep_mic_warm: false,
            upload_timeout_secs: default_upload_timeout_secs(),
        }
    }
}

impl Config {
    /// Get the service base URL, falling back to the default
    pub fn api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }

    /// Get the recognition locale
    pub fn locale(&self) -> &str {
        self.locale.as_deref().unwrap_or(DEFAULT_LOCALE)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    /// The backoff cap, never below the base delay
    pub fn max_restart_delay(&self) -> Duration {
        Duration::from_millis(self.max_restart_delay_ms.max(self.restart_delay_ms))
    }

    /// Get the fallback clip length as a Duration. Values that are not a
    /// positive length of at most 30 seconds fall back to the default.
    pub fn clip_duration(&self) -> Duration {
        let secs = self.clip_duration;
        match Duration::try_from_secs_f32(secs) {
            Ok(duration) if secs > 0.0 && secs <= MAX_CLIP_DURATION => duration,
            _ => {
                warn!(clip_duration = secs, "invalid clip_duration, using the default");
                Duration::from_secs_f32(default_clip_duration())
            }
        }
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }
}

/// Manages loading and saving configuration files.
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Creates a new ConfigManager with the default configuration directory.
    pub fn new() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Ok(Self { config_path })
    }

    /// Creates a new ConfigManager with a specified configuration directory.
    pub fn with_config_dir<P: AsRef<std::path::Path>>(dir: P) -> Self {
        let config_path = dir.as_ref().join(format!("{}.toml", APP_NAME));
        Self { config_path }
    }

    /// Returns the default path to the configuration file.
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to retrieve configuration directory")?;
        Ok(config_dir.join(APP_NAME).join(format!("{}.toml", APP_NAME)))
    }

    /// Loads the configuration from the config file or returns default.
    pub fn load(&self) -> Result<Config> {
        if !self.config_path.exists() {
            debug!(path = ?self.config_path, "No config file, using defaults");
            return Ok(Config::default());
        }

        let config_content = fs::read_to_string(&self.config_path)
            .with_context(|| format!("Failed to read config file at {:?}", self.config_path))?;

        let config: Config = toml::from_str(&config_content)
            .with_context(|| format!("Failed to parse config file at {:?}", self.config_path))?;

        Ok(config)
    }

    /// Saves the configuration to the config file.
    pub fn save(&self, config: &Config) -> Result<()> {
        let config_dir = self
            .config_path
            .parent()
            .with_context(|| format!("Failed to get parent directory of {:?}", self.config_path))?;

        fs::create_dir_all(config_dir)
            .with_context(|| format!("Failed to create config directory at {:?}", config_dir))?;

        let serialized =
            toml::to_string_pretty(&config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, serialized)
            .with_context(|| format!("Failed to write config file at {:?}", self.config_path))?;

        Ok(())
    }

    /// Returns the path to the configuration file.
    pub fn config_path(&self) -> &std::path::Path {
        &self.config_path
    }
}
