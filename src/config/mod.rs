//! Configuration management for helmsman
//!
//! Values are layered: environment variable over config file over default.
//! Command-line flags are applied on top by the binary.

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::voice::capture::{FRAME_LEN, SAMPLE_RATE};
use crate::voice::wake_word::DEFAULT_WAKE_LABEL;
use crate::{Error, Result};

use self::file::HelmsmanConfigFile;

/// Default Vosk model directory
pub const DEFAULT_VOSK_MODEL: &str = "vosk-models/vosk-model-small-pt-0.3";

/// Default CAN interface
pub const DEFAULT_CAN_INTERFACE: &str = "can0";

/// Helmsman configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Audio capture configuration
    pub audio: AudioConfig,

    /// CAN bus configuration
    pub can: CanConfig,

    /// Wake word configuration
    pub wake: WakeConfig,

    /// Command recognizer configuration
    pub recognizer: RecognizerConfig,
}

/// Audio capture configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioConfig {
    /// Replay this WAV file instead of the microphone
    pub input_wav: Option<PathBuf>,

    /// Input device name (default device when unset)
    pub device: Option<String>,

    /// Capture sample rate in Hz
    pub sample_rate: u32,

    /// Samples per classifier frame; recognizer chunks are half this
    pub frame_len: usize,

    /// Attempts to open the input device
    pub open_attempts: u32,

    /// Delay between open attempts
    pub open_retry_delay: Duration,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_wav: None,
            device: None,
            sample_rate: SAMPLE_RATE,
            frame_len: FRAME_LEN,
            open_attempts: 10,
            open_retry_delay: Duration::from_millis(5000),
        }
    }
}

/// CAN bus configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanConfig {
    /// Send frames on a real interface (otherwise frames are only logged)
    pub enabled: bool,

    /// Interface name
    pub interface: String,
}

impl Default for CanConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interface: DEFAULT_CAN_INTERFACE.to_string(),
        }
    }
}

/// Wake word configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeConfig {
    /// Classifier label that triggers command capture
    pub label: String,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            label: DEFAULT_WAKE_LABEL.to_string(),
        }
    }
}

/// Command recognizer configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizerConfig {
    /// Vosk model directory
    pub model: PathBuf,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            model: PathBuf::from(DEFAULT_VOSK_MODEL),
        }
    }
}

impl Config {
    /// Load configuration from the environment and a config file
    ///
    /// With `path` the file must exist and parse. Without it the standard
    /// location is tried and any problem there falls back to defaults.
    ///
    /// # Errors
    ///
    /// Returns error if an explicit file cannot be read or an environment
    /// value cannot be parsed. Call [`Config::validate`] once every override
    /// is applied.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let fc = match path {
            Some(path) => file::read_config_file(path)?,
            None => file::load_config_file(),
        };
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Merge a parsed config file with environment lookups
    ///
    /// # Errors
    ///
    /// Returns error if an environment value cannot be parsed
    pub fn from_sources<E>(fc: HelmsmanConfigFile, env: E) -> Result<Self>
    where
        E: Fn(&str) -> Option<String>,
    {
        let defaults = AudioConfig::default();

        let frame_len = match env("HELMSMAN_FRAME_LEN") {
            Some(v) => v
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("HELMSMAN_FRAME_LEN is not a sample count: {v:?}")))?,
            None => fc.audio.frame_len.unwrap_or(defaults.frame_len),
        };

        let audio = AudioConfig {
            input_wav: env("HELMSMAN_INPUT_WAV")
                .map(PathBuf::from)
                .or(fc.audio.input_wav),
            device: env("HELMSMAN_AUDIO_DEVICE").or(fc.audio.device),
            sample_rate: fc.audio.sample_rate.unwrap_or(defaults.sample_rate),
            frame_len,
            open_attempts: fc.audio.open_attempts.unwrap_or(defaults.open_attempts),
            open_retry_delay: fc
                .audio
                .open_retry_delay_ms
                .map_or(defaults.open_retry_delay, Duration::from_millis),
        };

        let can = CanConfig {
            enabled: env("HELMSMAN_CAN_ENABLED")
                .map(|v| parse_flag(&v))
                .or(fc.can.enabled)
                .unwrap_or(false),
            interface: env("CAN_INTERFACE")
                .or(fc.can.interface)
                .unwrap_or_else(|| DEFAULT_CAN_INTERFACE.to_string()),
        };

        let wake = WakeConfig {
            label: env("HELMSMAN_WAKE_LABEL")
                .or(fc.wake.label)
                .unwrap_or_else(|| DEFAULT_WAKE_LABEL.to_string()),
        };

        let recognizer = RecognizerConfig {
            model: env("HELMSMAN_VOSK_MODEL")
                .map(PathBuf::from)
                .or(fc.recognizer.model)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_VOSK_MODEL)),
        };

        Ok(Self {
            audio,
            can,
            wake,
            recognizer,
        })
    }

    /// Check values the pipeline cannot run with
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first invalid value
    pub fn validate(&self) -> Result<()> {
        if self.audio.frame_len < 2 {
            return Err(Error::Config(format!(
                "audio.frame_len must be at least 2 samples, got {}",
                self.audio.frame_len
            )));
        }
        if self.audio.sample_rate == 0 {
            return Err(Error::Config("audio.sample_rate must be positive".to_string()));
        }
        if self.wake.label.trim().is_empty() {
            return Err(Error::Config("wake.label must not be empty".to_string()));
        }
        if self.can.enabled && self.can.interface.trim().is_empty() {
            return Err(Error::Config(
                "can.interface must be set when CAN is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
