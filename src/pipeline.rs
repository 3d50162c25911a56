//! Pipeline runner
//!
//! Owns the audio source and the dispatcher and steps them on the calling
//! thread until the source runs dry or a stop is requested.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::can::CanTransport;
use crate::dispatch::{Clock, CommandDispatcher, CycleOutcome, StepOutcome};
use crate::voice::capture::AudioSource;
use crate::voice::recognizer::RecognizerFactory;
use crate::voice::wake_word::WakeWordClassifier;
use crate::{Error, Result};

/// Counters for one pipeline run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Steps taken
    pub steps: u64,
    /// Steps skipped by a capture, filter or inference failure
    pub skipped: u64,
    /// Wake words confirmed
    pub wake_words: u64,
    /// Commands handed to the actuator
    pub dispatched: u64,
    /// Of those, commands the transport failed to deliver
    pub delivery_failures: u64,
    /// Transcripts outside the grammar
    pub unrecognized: u64,
    /// Command windows that expired
    pub timeouts: u64,
}

impl PipelineStats {
    fn record(&mut self, outcome: &StepOutcome) {
        self.steps += 1;
        match outcome {
            StepOutcome::Skipped(_) => self.skipped += 1,
            StepOutcome::WakeWordDetected { .. } => self.wake_words += 1,
            StepOutcome::Completed(CycleOutcome::Dispatched { delivery, .. }) => {
                self.dispatched += 1;
                if delivery.is_err() {
                    self.delivery_failures += 1;
                }
            }
            StepOutcome::Completed(CycleOutcome::Unrecognized { .. }) => self.unrecognized += 1,
            StepOutcome::Completed(CycleOutcome::TimedOut) => self.timeouts += 1,
            StepOutcome::Listening | StepOutcome::AwaitingCommand => {}
        }
    }
}

/// Audio source plus dispatcher, run as one cooperative loop
pub struct Pipeline<S, C, F, T, K> {
    source: S,
    dispatcher: CommandDispatcher<C, F, T, K>,
    stats: PipelineStats,
}

impl<S, C, F, T, K> Pipeline<S, C, F, T, K>
where
    S: AudioSource,
    C: WakeWordClassifier,
    F: RecognizerFactory,
    T: CanTransport,
    K: Clock,
{
    /// Pair a source with a dispatcher
    #[must_use]
    pub fn new(source: S, dispatcher: CommandDispatcher<C, F, T, K>) -> Self {
        Self {
            source,
            dispatcher,
            stats: PipelineStats::default(),
        }
    }

    /// Run until the source ends or `stop` is set
    ///
    /// `stop` is checked between steps; a step blocked in the audio source
    /// finishes first.
    ///
    /// # Errors
    ///
    /// Returns error only for failures the dispatcher cannot contain. A
    /// source that runs out is a normal end.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<PipelineStats> {
        tracing::info!(
            frame_len = self.dispatcher.frame_len(),
            phrases = self.dispatcher.grammar().phrases().len(),
            "voice pipeline running"
        );

        while !stop.load(Ordering::Relaxed) {
            match self.step() {
                Ok(_) => {}
                Err(Error::EndOfInput) => {
                    tracing::info!("audio input exhausted");
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        let stats = self.stats;
        tracing::info!(
            steps = stats.steps,
            wake_words = stats.wake_words,
            dispatched = stats.dispatched,
            delivery_failures = stats.delivery_failures,
            unrecognized = stats.unrecognized,
            timeouts = stats.timeouts,
            skipped = stats.skipped,
            "voice pipeline stopped"
        );
        Ok(stats)
    }

    /// Take one step and count its outcome
    ///
    /// # Errors
    ///
    /// Returns [`Error::EndOfInput`] once the source is exhausted
    pub fn step(&mut self) -> Result<StepOutcome> {
        let outcome = self.dispatcher.step(&mut self.source)?;
        self.stats.record(&outcome);
        Ok(outcome)
    }

    /// Counters so far
    #[must_use]
    pub const fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// The audio source
    #[must_use]
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// The dispatcher
    #[must_use]
    pub const fn dispatcher(&self) -> &CommandDispatcher<C, F, T, K> {
        &self.dispatcher
    }
}
