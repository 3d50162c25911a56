//! Wake word detection
//!
//! A classifier scores each audio frame against its labels. The pipeline
//! wakes up when the designated label scores strictly above
//! [`WAKE_THRESHOLD`].

use crate::Result;

/// Confidence the wake label must exceed to trigger command capture
pub const WAKE_THRESHOLD: f32 = 0.8;

/// Default wake label
pub const DEFAULT_WAKE_LABEL: &str = "Zenira";

/// One (label, confidence) pair from a classifier run
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Class label
    pub label: String,
    /// Confidence in [0, 1]
    pub confidence: f32,
}

impl Classification {
    /// Build a classification
    #[must_use]
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Scores audio frames against a fixed set of labels
pub trait WakeWordClassifier {
    /// Classify one frame
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Inference`] if the classifier could not run
    fn classify(&mut self, frame: &[f32]) -> Result<Vec<Classification>>;
}

impl<C: WakeWordClassifier + ?Sized> WakeWordClassifier for Box<C> {
    fn classify(&mut self, frame: &[f32]) -> Result<Vec<Classification>> {
        (**self).classify(frame)
    }
}

/// Confidence of `label` if it exceeds [`WAKE_THRESHOLD`]
///
/// Label comparison is exact. When the label appears more than once the
/// first entry above the threshold wins.
#[must_use]
pub fn wake_confidence(results: &[Classification], label: &str) -> Option<f32> {
    results
        .iter()
        .find(|c| c.label == label && c.confidence > WAKE_THRESHOLD)
        .map(|c| c.confidence)
}

#[cfg(feature = "vosk")]
pub use keyword::VoskKeywordClassifier;

#[cfg(feature = "vosk")]
mod keyword {
    use vosk::{DecodingState, Model, Recognizer};

    use super::{Classification, WakeWordClassifier};
    use crate::voice::capture::float_to_pcm;
    use crate::{Error, Result};

    /// Keyword spotter built on a Vosk recognizer restricted to the wake word
    ///
    /// Each finalized utterance yields one classification per word with the
    /// word's confidence. Words matching the wake word (case-insensitively)
    /// are reported under the configured label.
    pub struct VoskKeywordClassifier {
        recognizer: Recognizer,
        label: String,
    }

    impl VoskKeywordClassifier {
        /// Create a spotter for `label`
        ///
        /// # Errors
        ///
        /// Returns error if the model rejects the keyword grammar
        pub fn new(model: &Model, sample_rate: u32, label: &str) -> Result<Self> {
            let keyword = label.to_lowercase();
            #[allow(clippy::cast_precision_loss)]
            let rate = sample_rate as f32;
            let mut recognizer = Recognizer::new_with_grammar(model, rate, &[keyword.as_str(), "[unk]"])
                .ok_or_else(|| Error::Model(format!("cannot build keyword spotter for {label:?}")))?;
            recognizer.set_words(true);

            tracing::debug!(label, "wake word spotter initialized");

            Ok(Self {
                recognizer,
                label: label.to_string(),
            })
        }
    }

    impl WakeWordClassifier for VoskKeywordClassifier {
        fn classify(&mut self, frame: &[f32]) -> Result<Vec<Classification>> {
            let pcm: Vec<i16> = frame.iter().copied().map(float_to_pcm).collect();

            let state = self
                .recognizer
                .accept_waveform(&pcm)
                .map_err(|e| Error::Inference(format!("keyword decoding rejected audio: {e}")))?;

            match state {
                DecodingState::Running => Ok(Vec::new()),
                DecodingState::Failed => Err(Error::Inference("keyword decoding failed".to_string())),
                DecodingState::Finalized => {
                    let result = self.recognizer.final_result();
                    let words = result.single().map(|r| r.result).unwrap_or_default();
                    Ok(words
                        .into_iter()
                        .map(|w| {
                            let label = if w.word.eq_ignore_ascii_case(&self.label) {
                                self.label.clone()
                            } else {
                                w.word.to_string()
                            };
                            Classification::new(label, w.conf)
                        })
                        .collect())
                }
            }
        }
    }
}
