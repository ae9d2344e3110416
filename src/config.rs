use crate::defaults;
use crate::error::{Result, VoxtaskError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub rewrite: RewriteConfig,
    pub tasks: TasksConfig,
}

/// Audio capture and VAD configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device name (None = system default)
    pub device: Option<String>,
    /// Probability threshold for committing to voice start
    pub voice_start_probability: f32,
    /// Probability threshold for committing to voice end
    pub voice_end_probability: f32,
    /// Consecutive speech frames required to confirm voice start
    pub start_confirm_frames: usize,
    /// Silence before an utterance ends (seconds, clamped 1.0–10.0)
    pub silence_timeout_seconds: f64,
}

/// Rewrite stage configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct RewriteConfig {
    /// OpenRouter API key; None disables the network rewriter
    pub openrouter_api_key: Option<String>,
}

/// Task destination configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct TasksConfig {
    /// Identifier of the destination task list
    pub selected_list_id: Option<String>,
    /// Display name of the destination task list (UI convenience)
    pub selected_list_name: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            voice_start_probability: defaults::VOICE_START_PROBABILITY,
            voice_end_probability: defaults::VOICE_END_PROBABILITY,
            start_confirm_frames: defaults::START_CONFIRM_FRAMES,
            silence_timeout_seconds: defaults::SILENCE_TIMEOUT_SECONDS,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file is missing, contains invalid TOML, or
    /// carries out-of-range thresholds. Missing fields use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                VoxtaskError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                VoxtaskError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Thresholds must be probabilities. The silence timeout is clamped on
    /// use instead, so a stale file keeps working.
    fn validate(&self) -> Result<()> {
        let thresholds = [
            ("audio.voice_start_probability", self.audio.voice_start_probability),
            ("audio.voice_end_probability", self.audio.voice_end_probability),
        ];
        for (key, value) in thresholds {
            if !(0.0..=1.0).contains(&value) {
                return Err(VoxtaskError::ConfigInvalidValue {
                    key: key.to_string(),
                    message: format!("{value} is not a probability between 0.0 and 1.0"),
                });
            }
        }
        Ok(())
    }

    /// Default config file path: `$XDG_CONFIG_HOME/voxtask/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("voxtask").join("config.toml"))
    }

    /// Silence timeout clamped to the supported range.
    ///
    /// Out-of-range values are accepted from disk but clamped on use,
    /// with a warning so the user can fix the file.
    pub fn silence_timeout_seconds(&self) -> f64 {
        let raw = self.audio.silence_timeout_seconds;
        let clamped = raw.clamp(
            defaults::MIN_SILENCE_TIMEOUT_SECONDS,
            defaults::MAX_SILENCE_TIMEOUT_SECONDS,
        );
        if raw != clamped {
            tracing::warn!(
                raw,
                clamped,
                "silence_timeout_seconds out of range, clamping"
            );
        }
        clamped
    }
}
