//! Voice front end
//!
//! Audio capture, the frame validity filter, wake word classification and
//! grammar-constrained command recognition.

pub mod capture;
pub mod filter;
pub mod recognizer;
pub mod wake_word;

pub use capture::{
    AudioFrame, AudioSource, CaptureBuffer, FRAME_LEN, SAMPLE_RATE, WavSource, open_with_retry,
};
pub use recognizer::{RecognizerFactory, SpeechRecognizer};
pub use wake_word::{Classification, WAKE_THRESHOLD, WakeWordClassifier, wake_confidence};

#[cfg(feature = "microphone")]
pub use capture::MicrophoneSource;
#[cfg(feature = "vosk")]
pub use recognizer::{VoskRecognizerFactory, load_model};
#[cfg(feature = "vosk")]
pub use wake_word::VoskKeywordClassifier;
