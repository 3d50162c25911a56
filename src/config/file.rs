//! TOML configuration file loading
//!
//! Supports `~/.config/helmsman/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HelmsmanConfigFile {
    /// Audio capture configuration
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// CAN bus configuration
    #[serde(default)]
    pub can: CanFileConfig,

    /// Wake word configuration
    #[serde(default)]
    pub wake: WakeFileConfig,

    /// Command recognizer configuration
    #[serde(default)]
    pub recognizer: RecognizerFileConfig,
}

/// Audio capture configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AudioFileConfig {
    /// Replay this WAV file instead of the microphone
    pub input_wav: Option<PathBuf>,

    /// Input device name
    pub device: Option<String>,

    /// Capture sample rate in Hz
    pub sample_rate: Option<u32>,

    /// Samples per classifier frame
    pub frame_len: Option<usize>,

    /// Attempts to open the input device
    pub open_attempts: Option<u32>,

    /// Delay between open attempts, in milliseconds
    pub open_retry_delay_ms: Option<u64>,
}

/// CAN bus configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CanFileConfig {
    /// Send frames on a real interface
    pub enabled: Option<bool>,

    /// Interface name (e.g. "can0")
    pub interface: Option<String>,
}

/// Wake word configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WakeFileConfig {
    /// Classifier label that triggers command capture
    pub label: Option<String>,
}

/// Command recognizer configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecognizerFileConfig {
    /// Vosk model directory
    pub model: Option<PathBuf>,
}

/// Load the TOML config file from the standard path
///
/// Returns `HelmsmanConfigFile::default()` if the file doesn't exist or can't be parsed.
#[must_use]
pub fn load_config_file() -> HelmsmanConfigFile {
    let Some(path) = config_file_path() else {
        return HelmsmanConfigFile::default();
    };

    if !path.exists() {
        return HelmsmanConfigFile::default();
    }

    match read_config_file(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            HelmsmanConfigFile::default()
        }
    }
}

/// Read and parse a config file
///
/// # Errors
///
/// Returns error if the file cannot be read or is not valid TOML for this schema
pub fn read_config_file(path: &Path) -> Result<HelmsmanConfigFile> {
    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Return the config file path: `~/.config/helmsman/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("helmsman").join("config.toml"))
}
