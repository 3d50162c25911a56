//! Shared test utilities
//!
//! Scripted stand-ins for the audio, classifier, recognizer and CAN
//! collaborators so the pipeline runs without hardware or models.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, Instant};

use helmsman::can::{CanFrame, CanTransport, TransportError};
use helmsman::dispatch::Clock;
use helmsman::grammar::CommandGrammar;
use helmsman::voice::{AudioFrame, AudioSource, Classification, RecognizerFactory, SpeechRecognizer, WakeWordClassifier};
use helmsman::{Error, Result};

/// Wake label used throughout the tests
pub const LABEL: &str = "Zenira";

/// Samples per classifier frame in tests
pub const FRAME_LEN: usize = 32;

/// A frame of varying samples that passes the validity filter
#[allow(clippy::cast_precision_loss)]
pub fn tone(len: usize) -> AudioFrame {
    (0..len).map(|i| ((i % 7) as f32 - 3.0) / 10.0).collect()
}

/// One scripted read
#[derive(Debug, Clone)]
pub enum Read {
    /// Deliver a varying frame of the requested length
    Tone,
    /// Deliver a constant frame of the requested length
    Flat,
    /// Fail this read
    Fail,
}

/// Audio source replaying a script, then reporting end of input
#[derive(Debug, Default)]
pub struct ScriptedSource {
    script: VecDeque<Read>,
    /// Lengths requested so far, in order
    pub requested: Vec<usize>,
}

impl ScriptedSource {
    pub fn new(script: impl IntoIterator<Item = Read>) -> Self {
        Self {
            script: script.into_iter().collect(),
            requested: Vec::new(),
        }
    }

    /// `n` good reads
    pub fn tones(n: usize) -> Self {
        Self::new(std::iter::repeat_n(Read::Tone, n))
    }
}

impl AudioSource for ScriptedSource {
    fn read_frame(&mut self, len: usize) -> Result<AudioFrame> {
        self.requested.push(len);
        match self.script.pop_front() {
            Some(Read::Tone) => Ok(tone(len)),
            Some(Read::Flat) => Ok(vec![0.25; len]),
            Some(Read::Fail) => Err(Error::Audio("device hiccup".to_string())),
            None => Err(Error::EndOfInput),
        }
    }
}

/// Classifier returning one scripted wake confidence per call
///
/// `None` in the script makes that call fail. Past the end of the script
/// every frame scores zero.
#[derive(Debug, Clone, Default)]
pub struct ScriptedClassifier {
    script: Rc<RefCell<VecDeque<Option<f32>>>>,
    /// Number of frames classified
    pub calls: Rc<Cell<usize>>,
}

impl ScriptedClassifier {
    pub fn new(script: impl IntoIterator<Item = Option<f32>>) -> Self {
        Self {
            script: Rc::new(RefCell::new(script.into_iter().collect())),
            calls: Rc::new(Cell::new(0)),
        }
    }
}

impl WakeWordClassifier for ScriptedClassifier {
    fn classify(&mut self, _frame: &[f32]) -> Result<Vec<Classification>> {
        self.calls.set(self.calls.get() + 1);
        match self.script.borrow_mut().pop_front() {
            Some(Some(confidence)) => Ok(vec![
                Classification::new("_background_noise_", 1.0 - confidence),
                Classification::new(LABEL, confidence),
            ]),
            Some(None) => Err(Error::Inference("classifier crashed".to_string())),
            None => Ok(vec![Classification::new(LABEL, 0.0)]),
        }
    }
}

/// One scripted recognizer response
#[derive(Debug, Clone)]
pub enum Heard {
    /// Still decoding
    Pending,
    /// Utterance finalized with this transcript
    Final(&'static str),
    /// Decoding failed
    Fail,
}

/// Factory handing out recognizers that replay one script each
#[derive(Debug, Clone, Default)]
pub struct ScriptedRecognizerFactory {
    scripts: Rc<RefCell<VecDeque<Vec<Heard>>>>,
    /// Recognizers created so far
    pub created: Rc<Cell<usize>>,
    /// Chunks accepted across all recognizers
    pub accepted: Rc<Cell<usize>>,
    /// Make `create` fail
    pub fail_create: bool,
}

impl ScriptedRecognizerFactory {
    /// One script per command window
    pub fn new(scripts: impl IntoIterator<Item = Vec<Heard>>) -> Self {
        Self {
            scripts: Rc::new(RefCell::new(scripts.into_iter().collect())),
            ..Self::default()
        }
    }

    /// Factory whose `create` always fails
    pub fn failing() -> Self {
        Self {
            fail_create: true,
            ..Self::default()
        }
    }
}

struct ScriptedRecognizer {
    script: VecDeque<Heard>,
    accepted: Rc<Cell<usize>>,
}

impl SpeechRecognizer for ScriptedRecognizer {
    fn accept(&mut self, _chunk: &[f32]) -> Result<Option<String>> {
        self.accepted.set(self.accepted.get() + 1);
        match self.script.pop_front() {
            Some(Heard::Final(text)) => Ok(Some(text.to_string())),
            Some(Heard::Fail) => Err(Error::Inference("decoder crashed".to_string())),
            Some(Heard::Pending) | None => Ok(None),
        }
    }
}

impl RecognizerFactory for ScriptedRecognizerFactory {
    fn create(&self, grammar: &CommandGrammar) -> Result<Box<dyn SpeechRecognizer>> {
        if self.fail_create {
            return Err(Error::Model("recognizer unavailable".to_string()));
        }
        assert!(!grammar.phrases().is_empty());
        self.created.set(self.created.get() + 1);
        let script = self.scripts.borrow_mut().pop_front().unwrap_or_default();
        Ok(Box::new(ScriptedRecognizer {
            script: script.into(),
            accepted: Rc::clone(&self.accepted),
        }))
    }
}

/// Transport recording every frame it is asked to send
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    /// Frames sent successfully
    pub frames: Rc<RefCell<Vec<CanFrame>>>,
    /// Reject every send with a short write
    pub fail: bool,
}

impl RecordingTransport {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<CanFrame> {
        self.frames.borrow().clone()
    }
}

impl CanTransport for RecordingTransport {
    fn send(&mut self, frame: &CanFrame) -> std::result::Result<(), TransportError> {
        if self.fail {
            return Err(TransportError::ShortWrite {
                written: 0,
                expected: 16,
            });
        }
        self.frames.borrow_mut().push(*frame);
        Ok(())
    }
}

/// Clock that only moves when told to
#[derive(Debug, Clone)]
pub struct ManualClock(Rc<Cell<Instant>>);

impl ManualClock {
    pub fn new() -> Self {
        Self(Rc::new(Cell::new(Instant::now())))
    }

    pub fn advance(&self, by: Duration) {
        self.0.set(self.0.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.0.get()
    }
}
