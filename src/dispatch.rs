//! Command dispatch state machine
//!
//! One call to [`CommandDispatcher::step`] pulls one unit of audio from the
//! source and advances the cycle:
//!
//! ```text
//! Listening --wake word--> AwaitingCommand --transcript--> Dispatched --+
//!     ^                          |                                      |
//!     |                          +---------- 5s elapsed --> TimedOut ---+
//!     +-----------------------------------------------------------------+
//! ```
//!
//! Errors from the capture, classifier or recognizer collaborators never
//! change state; the step reports a skip and the next call retries.

use std::time::{Duration, Instant};

use crate::actuator::{Ack, ActuatorClient};
use crate::can::{CanTransport, TransportError};
use crate::grammar::{ActuatorOperation, CommandGrammar};
use crate::voice::capture::{AudioFrame, AudioSource};
use crate::voice::filter;
use crate::voice::recognizer::{RecognizerFactory, SpeechRecognizer};
use crate::voice::wake_word::{WakeWordClassifier, wake_confidence};
use crate::{Error, Result};

/// How long a command may take to finalize after the wake word
pub const COMMAND_WINDOW: Duration = Duration::from_secs(5);

/// Time source for the command window
pub trait Clock {
    /// Current instant
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Where the dispatcher is in a command cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// Feeding full frames to the wake word classifier
    Listening,
    /// Feeding half frames to the command recognizer
    AwaitingCommand {
        /// When the wake word was confirmed
        started_at: Instant,
    },
}

/// Why a step did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The audio read failed
    Capture,
    /// The frame failed the validity filter
    InvalidFrame,
    /// The classifier or recognizer failed
    Inference,
}

/// How a command cycle ended
#[derive(Debug)]
pub enum CycleOutcome {
    /// A known command was routed to the actuator
    ///
    /// `delivery` carries the transport result. A failed delivery still
    /// completes the cycle.
    Dispatched {
        /// Finalized transcript
        transcript: String,
        /// Operation it mapped to
        operation: ActuatorOperation,
        /// Transport result
        delivery: std::result::Result<Ack, TransportError>,
    },
    /// A transcript outside the grammar; nothing was sent
    Unrecognized {
        /// Finalized transcript
        transcript: String,
    },
    /// No command finalized inside [`COMMAND_WINDOW`]
    TimedOut,
}

/// Result of one dispatcher step
#[derive(Debug)]
pub enum StepOutcome {
    /// Nothing happened this step
    Skipped(SkipReason),
    /// Still listening, no wake word in this frame
    Listening,
    /// Wake word confirmed, command window opened
    WakeWordDetected {
        /// Wake label confidence
        confidence: f32,
    },
    /// Command window still open, no transcript yet
    AwaitingCommand,
    /// The cycle ended and the dispatcher is listening again
    Completed(CycleOutcome),
}

/// Drives the listen, recognize and actuate cycle
pub struct CommandDispatcher<C, F, T, K = SystemClock> {
    classifier: C,
    factory: F,
    actuator: ActuatorClient<T>,
    grammar: CommandGrammar,
    wake_label: String,
    frame_len: usize,
    clock: K,
    state: DispatchState,
    recognizer: Option<Box<dyn SpeechRecognizer>>,
}

impl<C, F, T> CommandDispatcher<C, F, T, SystemClock>
where
    C: WakeWordClassifier,
    F: RecognizerFactory,
    T: CanTransport,
{
    /// Create a dispatcher using the standard grammar and the wall clock
    #[must_use]
    pub fn new(
        classifier: C,
        factory: F,
        actuator: ActuatorClient<T>,
        wake_label: impl Into<String>,
        frame_len: usize,
    ) -> Self {
        Self {
            classifier,
            factory,
            actuator,
            grammar: CommandGrammar::standard(),
            wake_label: wake_label.into(),
            frame_len,
            clock: SystemClock,
            state: DispatchState::Listening,
            recognizer: None,
        }
    }
}

impl<C, F, T, K> CommandDispatcher<C, F, T, K>
where
    C: WakeWordClassifier,
    F: RecognizerFactory,
    T: CanTransport,
    K: Clock,
{
    /// Replace the command grammar
    #[must_use]
    pub fn with_grammar(mut self, grammar: CommandGrammar) -> Self {
        self.grammar = grammar;
        self
    }

    /// Replace the clock
    #[must_use]
    pub fn with_clock<K2: Clock>(self, clock: K2) -> CommandDispatcher<C, F, T, K2> {
        CommandDispatcher {
            classifier: self.classifier,
            factory: self.factory,
            actuator: self.actuator,
            grammar: self.grammar,
            wake_label: self.wake_label,
            frame_len: self.frame_len,
            clock,
            state: self.state,
            recognizer: self.recognizer,
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> DispatchState {
        self.state
    }

    /// The command grammar
    #[must_use]
    pub const fn grammar(&self) -> &CommandGrammar {
        &self.grammar
    }

    /// The actuator client
    #[must_use]
    pub const fn actuator(&self) -> &ActuatorClient<T> {
        &self.actuator
    }

    /// Samples per classifier frame
    #[must_use]
    pub const fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Samples per recognizer chunk
    #[must_use]
    pub const fn chunk_len(&self) -> usize {
        self.frame_len / 2
    }

    /// Run one iteration of the cycle
    ///
    /// # Errors
    ///
    /// Returns [`Error::EndOfInput`] once the source is exhausted. Every
    /// other failure is contained in the returned [`StepOutcome`].
    pub fn step<S: AudioSource + ?Sized>(&mut self, source: &mut S) -> Result<StepOutcome> {
        match self.state {
            DispatchState::Listening => self.listen(source),
            DispatchState::AwaitingCommand { started_at } => self.await_command(source, started_at),
        }
    }

    fn listen<S: AudioSource + ?Sized>(&mut self, source: &mut S) -> Result<StepOutcome> {
        let Some(frame) = read_valid(source, self.frame_len)? else {
            return Ok(StepOutcome::Skipped(SkipReason::Capture));
        };
        if !filter::is_valid(&frame) {
            tracing::trace!("degenerate frame dropped");
            return Ok(StepOutcome::Skipped(SkipReason::InvalidFrame));
        }

        let results = match self.classifier.classify(&frame) {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(error = %e, "wake word classification failed");
                return Ok(StepOutcome::Skipped(SkipReason::Inference));
            }
        };
        for result in &results {
            tracing::trace!(label = %result.label, confidence = result.confidence, "classification");
        }

        let Some(confidence) = wake_confidence(&results, &self.wake_label) else {
            return Ok(StepOutcome::Listening);
        };

        let recognizer = match self.factory.create(&self.grammar) {
            Ok(recognizer) => recognizer,
            Err(e) => {
                tracing::error!(error = %e, "failed to create command recognizer");
                return Ok(StepOutcome::Skipped(SkipReason::Inference));
            }
        };

        tracing::info!(label = %self.wake_label, confidence, "wake word detected, awaiting command");
        self.recognizer = Some(recognizer);
        self.state = DispatchState::AwaitingCommand {
            started_at: self.clock.now(),
        };
        Ok(StepOutcome::WakeWordDetected { confidence })
    }

    fn await_command<S: AudioSource + ?Sized>(
        &mut self,
        source: &mut S,
        started_at: Instant,
    ) -> Result<StepOutcome> {
        let elapsed = self.clock.now().saturating_duration_since(started_at);
        if elapsed > COMMAND_WINDOW {
            tracing::info!(elapsed_ms = elapsed.as_millis(), "command window expired");
            return Ok(self.finish(CycleOutcome::TimedOut));
        }

        let Some(chunk) = read_valid(source, self.chunk_len())? else {
            return Ok(StepOutcome::Skipped(SkipReason::Capture));
        };
        if !filter::is_valid(&chunk) {
            tracing::trace!("degenerate chunk dropped");
            return Ok(StepOutcome::Skipped(SkipReason::InvalidFrame));
        }

        let Some(recognizer) = self.recognizer.as_mut() else {
            tracing::error!("command window open without a recognizer");
            return Ok(self.finish(CycleOutcome::TimedOut));
        };

        let transcript = match recognizer.accept(&chunk) {
            Ok(Some(transcript)) => transcript,
            Ok(None) => return Ok(StepOutcome::AwaitingCommand),
            Err(e) => {
                tracing::warn!(error = %e, "command recognition failed");
                return Ok(StepOutcome::Skipped(SkipReason::Inference));
            }
        };

        let Some(operation) = self.grammar.lookup(&transcript) else {
            tracing::debug!("empty transcript, still awaiting command");
            return Ok(StepOutcome::AwaitingCommand);
        };

        if operation != ActuatorOperation::NoOp {
            tracing::info!(transcript = %transcript, ?operation, "command recognized");
        }
        let outcome = match self.actuator.execute(operation) {
            Some(delivery) => CycleOutcome::Dispatched {
                transcript,
                operation,
                delivery,
            },
            None => CycleOutcome::Unrecognized { transcript },
        };
        Ok(self.finish(outcome))
    }

    fn finish(&mut self, outcome: CycleOutcome) -> StepOutcome {
        self.recognizer = None;
        self.state = DispatchState::Listening;
        tracing::debug!("cycle complete, listening");
        StepOutcome::Completed(outcome)
    }
}

/// Read `len` samples, turning a transient failure into `None`
fn read_valid<S: AudioSource + ?Sized>(source: &mut S, len: usize) -> Result<Option<AudioFrame>> {
    match source.read_frame(len) {
        Ok(frame) => Ok(Some(frame)),
        Err(Error::EndOfInput) => Err(Error::EndOfInput),
        Err(e) => {
            tracing::warn!(error = %e, "audio read failed, skipping");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    use super::*;
    use crate::can::CanFrame;
    use crate::voice::wake_word::Classification;

    const LEN: usize = 8;

    #[derive(Clone)]
    struct ManualClock(Rc<Cell<Instant>>);

    impl ManualClock {
        fn new() -> Self {
            Self(Rc::new(Cell::new(Instant::now())))
        }

        fn advance(&self, by: Duration) {
            self.0.set(self.0.get() + by);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.0.get()
        }
    }

    /// Endless source of varying samples
    struct Tone;

    impl AudioSource for Tone {
        #[allow(clippy::cast_precision_loss)]
        fn read_frame(&mut self, len: usize) -> Result<AudioFrame> {
            Ok((0..len).map(|i| i as f32 / 100.0).collect())
        }
    }

    struct Scores(VecDeque<f32>);

    impl WakeWordClassifier for Scores {
        fn classify(&mut self, _frame: &[f32]) -> Result<Vec<Classification>> {
            let confidence = self.0.pop_front().unwrap_or(0.0);
            Ok(vec![
                Classification::new("noise", 1.0 - confidence),
                Classification::new("Zenira", confidence),
            ])
        }
    }

    struct Transcripts(RefCell<VecDeque<Option<String>>>);

    struct Replay(VecDeque<Option<String>>);

    impl SpeechRecognizer for Replay {
        fn accept(&mut self, _chunk: &[f32]) -> Result<Option<String>> {
            Ok(self.0.pop_front().flatten())
        }
    }

    impl RecognizerFactory for Transcripts {
        fn create(&self, _grammar: &CommandGrammar) -> Result<Box<dyn SpeechRecognizer>> {
            Ok(Box::new(Replay(self.0.take())))
        }
    }

    #[derive(Default)]
    struct Sent(Vec<CanFrame>);

    impl CanTransport for Sent {
        fn send(&mut self, frame: &CanFrame) -> std::result::Result<(), TransportError> {
            self.0.push(*frame);
            Ok(())
        }
    }

    fn dispatcher(
        scores: &[f32],
        transcripts: &[Option<&str>],
        clock: &ManualClock,
    ) -> CommandDispatcher<Scores, Transcripts, Sent, ManualClock> {
        let transcripts = transcripts.iter().map(|t| t.map(str::to_string)).collect();
        CommandDispatcher::new(
            Scores(scores.iter().copied().collect()),
            Transcripts(RefCell::new(transcripts)),
            ActuatorClient::new(Sent::default()),
            "Zenira",
            LEN,
        )
        .with_clock(clock.clone())
    }

    #[test]
    fn threshold_confidence_does_not_wake() {
        let clock = ManualClock::new();
        let mut d = dispatcher(&[0.80], &[], &clock);
        assert!(matches!(d.step(&mut Tone).unwrap(), StepOutcome::Listening));
        assert_eq!(d.state(), DispatchState::Listening);
    }

    #[test]
    fn confidence_above_threshold_wakes() {
        let clock = ManualClock::new();
        let mut d = dispatcher(&[0.81], &[], &clock);
        let outcome = d.step(&mut Tone).unwrap();
        assert!(matches!(outcome, StepOutcome::WakeWordDetected { confidence } if (confidence - 0.81).abs() < f32::EPSILON));
        assert_eq!(
            d.state(),
            DispatchState::AwaitingCommand {
                started_at: clock.now()
            }
        );
    }

    #[test]
    fn window_expiry_times_out_without_actuation() {
        let clock = ManualClock::new();
        let mut d = dispatcher(&[0.9], &[None, None], &clock);
        d.step(&mut Tone).unwrap();

        clock.advance(Duration::from_secs(2));
        assert!(matches!(d.step(&mut Tone).unwrap(), StepOutcome::AwaitingCommand));

        clock.advance(Duration::from_millis(3001));
        assert!(matches!(
            d.step(&mut Tone).unwrap(),
            StepOutcome::Completed(CycleOutcome::TimedOut)
        ));
        assert_eq!(d.state(), DispatchState::Listening);
        assert!(d.actuator().transport().0.is_empty());
    }

    #[test]
    fn transcript_at_window_boundary_still_dispatches() {
        let clock = ManualClock::new();
        let mut d = dispatcher(&[0.9], &[Some("seguir reto")], &clock);
        d.step(&mut Tone).unwrap();

        clock.advance(COMMAND_WINDOW);
        let outcome = d.step(&mut Tone).unwrap();
        assert!(matches!(
            outcome,
            StepOutcome::Completed(CycleOutcome::Dispatched {
                operation: ActuatorOperation::SetTailAngle(0),
                ..
            })
        ));
        assert_eq!(d.actuator().transport().0.len(), 1);
    }

    #[test]
    fn empty_transcript_keeps_waiting() {
        let clock = ManualClock::new();
        let mut d = dispatcher(&[0.9], &[Some(""), Some("ligar motor")], &clock);
        d.step(&mut Tone).unwrap();

        assert!(matches!(d.step(&mut Tone).unwrap(), StepOutcome::AwaitingCommand));
        let outcome = d.step(&mut Tone).unwrap();
        assert!(matches!(
            outcome,
            StepOutcome::Completed(CycleOutcome::Dispatched {
                operation: ActuatorOperation::SetMotor(5),
                delivery: Ok(_),
                ..
            })
        ));
    }

    #[test]
    fn unknown_phrase_completes_without_actuation() {
        let clock = ManualClock::new();
        let mut d = dispatcher(&[0.9], &[Some("abrir a porta")], &clock);
        d.step(&mut Tone).unwrap();

        let outcome = d.step(&mut Tone).unwrap();
        assert!(matches!(
            outcome,
            StepOutcome::Completed(CycleOutcome::Unrecognized { ref transcript }) if transcript == "abrir a porta"
        ));
        assert_eq!(d.state(), DispatchState::Listening);
        assert!(d.actuator().transport().0.is_empty());
    }

    #[test]
    fn unknown_phrase_is_not_logged_as_recognized() {
        #[derive(Clone, Default)]
        struct Logs(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

        impl std::io::Write for Logs {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let logs = Logs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let clock = ManualClock::new();
            let mut d = dispatcher(&[0.9], &[Some("abrir a porta")], &clock);
            d.step(&mut Tone).unwrap();
            d.step(&mut Tone).unwrap();
        });

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("command not recognized"));
        assert!(!output.contains("command recognized"));
    }

    #[test]
    fn custom_grammar_replaces_the_standard_table() {
        let grammar = CommandGrammar::new(
            vec![("avante".to_string(), ActuatorOperation::SetMotor(50))],
            Vec::new(),
        );
        let clock = ManualClock::new();
        let mut d = dispatcher(&[0.9, 0.9], &[Some("avante")], &clock).with_grammar(grammar);
        assert_eq!(d.grammar().phrases(), ["avante".to_string()]);

        d.step(&mut Tone).unwrap();
        assert!(matches!(
            d.step(&mut Tone).unwrap(),
            StepOutcome::Completed(CycleOutcome::Dispatched {
                operation: ActuatorOperation::SetMotor(50),
                ..
            })
        ));

        // standard phrases are no longer commands
        let clock = ManualClock::new();
        let grammar = CommandGrammar::new(Vec::new(), Vec::new());
        let mut d = dispatcher(&[0.9], &[Some("ligar motor")], &clock).with_grammar(grammar);
        d.step(&mut Tone).unwrap();
        assert!(matches!(
            d.step(&mut Tone).unwrap(),
            StepOutcome::Completed(CycleOutcome::Unrecognized { .. })
        ));
    }

    #[test]
    fn degenerate_frames_never_reach_the_classifier() {
        struct Flat;
        impl AudioSource for Flat {
            fn read_frame(&mut self, len: usize) -> Result<AudioFrame> {
                Ok(vec![0.0; len])
            }
        }

        let clock = ManualClock::new();
        let mut d = dispatcher(&[0.99], &[], &clock);
        assert!(matches!(
            d.step(&mut Flat).unwrap(),
            StepOutcome::Skipped(SkipReason::InvalidFrame)
        ));
        // score still queued for the next valid frame
        assert!(matches!(
            d.step(&mut Tone).unwrap(),
            StepOutcome::WakeWordDetected { .. }
        ));
    }

    #[test]
    fn chunks_are_half_a_frame() {
        struct Lengths(Vec<usize>);
        impl AudioSource for Lengths {
            fn read_frame(&mut self, len: usize) -> Result<AudioFrame> {
                self.0.push(len);
                Tone.read_frame(len)
            }
        }

        let clock = ManualClock::new();
        let mut d = dispatcher(&[0.9], &[None], &clock);
        let mut source = Lengths(Vec::new());
        d.step(&mut source).unwrap();
        d.step(&mut source).unwrap();
        assert_eq!(source.0, vec![LEN, LEN / 2]);
    }
}
