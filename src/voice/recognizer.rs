//! Grammar-constrained speech recognition
//!
//! A fresh recognizer is created from the command grammar for every command
//! window and dropped when the window closes.

use crate::Result;
use crate::grammar::CommandGrammar;

/// Incremental recognizer fed with audio chunks
pub trait SpeechRecognizer {
    /// Feed one chunk of normalized samples
    ///
    /// Returns `Some(transcript)` once an utterance is finalized (the
    /// transcript may be empty) and `None` while decoding continues.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Inference`] if decoding failed
    fn accept(&mut self, chunk: &[f32]) -> Result<Option<String>>;
}

impl<R: SpeechRecognizer + ?Sized> SpeechRecognizer for Box<R> {
    fn accept(&mut self, chunk: &[f32]) -> Result<Option<String>> {
        (**self).accept(chunk)
    }
}

/// Creates recognizers restricted to a grammar
pub trait RecognizerFactory {
    /// Build a recognizer for `grammar`
    ///
    /// # Errors
    ///
    /// Returns error if the recognizer cannot be created
    fn create(&self, grammar: &CommandGrammar) -> Result<Box<dyn SpeechRecognizer>>;
}

impl<F: RecognizerFactory + ?Sized> RecognizerFactory for Box<F> {
    fn create(&self, grammar: &CommandGrammar) -> Result<Box<dyn SpeechRecognizer>> {
        (**self).create(grammar)
    }
}

#[cfg(feature = "vosk")]
pub use backend::{VoskRecognizerFactory, load_model};

#[cfg(feature = "vosk")]
mod backend {
    use std::path::Path;

    use vosk::{DecodingState, LogLevel, Model, Recognizer};

    use super::{RecognizerFactory, SpeechRecognizer};
    use crate::grammar::CommandGrammar;
    use crate::voice::capture::float_to_pcm;
    use crate::{Error, Result};

    /// Load a Vosk model directory
    ///
    /// # Errors
    ///
    /// Returns error if the model cannot be loaded
    pub fn load_model(path: &Path) -> Result<Model> {
        vosk::set_log_level(LogLevel::Error);
        tracing::info!(path = %path.display(), "loading Vosk model");
        Model::new(path.to_string_lossy().into_owned())
            .ok_or_else(|| Error::Model(format!("failed to load Vosk model from {}", path.display())))
    }

    /// Builds Vosk recognizers over one loaded model
    pub struct VoskRecognizerFactory {
        model: Model,
        sample_rate: u32,
    }

    impl VoskRecognizerFactory {
        /// Wrap a loaded model
        #[must_use]
        pub const fn new(model: Model, sample_rate: u32) -> Self {
            Self { model, sample_rate }
        }
    }

    impl RecognizerFactory for VoskRecognizerFactory {
        fn create(&self, grammar: &CommandGrammar) -> Result<Box<dyn SpeechRecognizer>> {
            #[allow(clippy::cast_precision_loss)]
            let rate = self.sample_rate as f32;
            let recognizer = Recognizer::new_with_grammar(&self.model, rate, grammar.phrases())
                .ok_or_else(|| Error::Inference("failed to create command recognizer".to_string()))?;
            tracing::debug!(phrases = grammar.phrases().len(), "command recognizer created");
            Ok(Box::new(VoskCommandRecognizer { recognizer }))
        }
    }

    struct VoskCommandRecognizer {
        recognizer: Recognizer,
    }

    impl SpeechRecognizer for VoskCommandRecognizer {
        fn accept(&mut self, chunk: &[f32]) -> Result<Option<String>> {
            let pcm: Vec<i16> = chunk.iter().copied().map(float_to_pcm).collect();

            let state = self
                .recognizer
                .accept_waveform(&pcm)
                .map_err(|e| Error::Inference(format!("command decoding rejected audio: {e}")))?;

            match state {
                DecodingState::Running => Ok(None),
                DecodingState::Failed => Err(Error::Inference("command decoding failed".to_string())),
                DecodingState::Finalized => {
                    let text = self
                        .recognizer
                        .result()
                        .single()
                        .map(|r| r.text.to_string())
                        .unwrap_or_default();
                    Ok(Some(text))
                }
            }
        }
    }
}
