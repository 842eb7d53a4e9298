//! Daemon settings loading
//!
//! Settings live in `settings.toml` inside the config directory and can be
//! overridden via environment variables. Every field has a default so a
//! missing file or section is never an error.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for settings operations.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Encoder-process settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncoderSettings {
    /// Global cap on simultaneous encoder processes (0 = derive from cores).
    #[serde(default)]
    pub max_concurrent_encodes: u32,
    /// Per-job cap on queued + running tasks; eligible files beyond this
    /// defer to the next scan tick.
    #[serde(default = "default_max_in_flight_per_job")]
    pub max_in_flight_per_job: u32,
    /// Directory holding a provisioned ffmpeg binary, searched before PATH.
    #[serde(default)]
    pub bin_dir: Option<PathBuf>,
}

fn default_max_in_flight_per_job() -> u32 {
    4
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            max_concurrent_encodes: 0,
            max_in_flight_per_job: default_max_in_flight_per_job(),
            bin_dir: None,
        }
    }
}

/// Watch-folder settings shared by all jobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchSettings {
    /// Seconds a file's size must stay unchanged before it is dispatched.
    #[serde(default = "default_stability_window_secs")]
    pub stability_window_secs: u64,
}

fn default_stability_window_secs() -> u64 {
    10
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            stability_window_secs: default_stability_window_secs(),
        }
    }
}

/// Status-endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusSettings {
    /// Listen address for the read-only status HTTP endpoint.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_listen_addr() -> String {
    "127.0.0.1:7878".to_string()
}

impl Default for StatusSettings {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

/// Main settings structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub encoder: EncoderSettings,
    #[serde(default)]
    pub watch: WatchSettings,
    #[serde(default)]
    pub status: StatusSettings,
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse settings from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        Ok(settings)
    }

    /// Apply environment variable overrides.
    ///
    /// - `AUTOTRANSCODE_MAX_CONCURRENT_ENCODES` -> encoder.max_concurrent_encodes
    /// - `AUTOTRANSCODE_MAX_IN_FLIGHT_PER_JOB` -> encoder.max_in_flight_per_job
    /// - `AUTOTRANSCODE_BIN_DIR` -> encoder.bin_dir
    /// - `AUTOTRANSCODE_STABILITY_WINDOW_SECS` -> watch.stability_window_secs
    /// - `AUTOTRANSCODE_STATUS_ADDR` -> status.listen_addr
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("AUTOTRANSCODE_MAX_CONCURRENT_ENCODES") {
            if let Ok(n) = val.parse::<u32>() {
                self.encoder.max_concurrent_encodes = n;
            }
        }

        if let Ok(val) = env::var("AUTOTRANSCODE_MAX_IN_FLIGHT_PER_JOB") {
            if let Ok(n) = val.parse::<u32>() {
                self.encoder.max_in_flight_per_job = n;
            }
        }

        if let Ok(val) = env::var("AUTOTRANSCODE_BIN_DIR") {
            if !val.is_empty() {
                self.encoder.bin_dir = Some(PathBuf::from(val));
            }
        }

        if let Ok(val) = env::var("AUTOTRANSCODE_STABILITY_WINDOW_SECS") {
            if let Ok(n) = val.parse::<u64>() {
                self.watch.stability_window_secs = n;
            }
        }

        if let Ok(val) = env::var("AUTOTRANSCODE_STATUS_ADDR") {
            if !val.is_empty() {
                self.status.listen_addr = val;
            }
        }
    }

    /// Load settings from file and apply environment overrides.
    ///
    /// A missing file yields the defaults; a present-but-malformed file is
    /// an error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let mut settings = if path.as_ref().exists() {
            Self::load_from_file(path)?
        } else {
            Self::default()
        };
        settings.apply_env_overrides();
        Ok(settings)
    }
}
