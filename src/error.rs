//! Error types for helmsman

use thiserror::Error;

/// Result type alias for helmsman operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice control pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio capture error
    #[error("audio error: {0}")]
    Audio(String),

    /// Model load error (wake word or recognizer)
    #[error("model error: {0}")]
    Model(String),

    /// CAN interface setup error
    #[error("CAN error: {0}")]
    Can(String),

    /// Classifier or recognizer invocation failed
    #[error("inference error: {0}")]
    Inference(String),

    /// A replayed audio source has no more frames
    #[error("end of audio input")]
    EndOfInput,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// WAV decoding error
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),
}
