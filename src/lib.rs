//! Helmsman - Voice-command control front-end for a motor and tail driven craft
//!
//! This library provides the pieces of the voice control pipeline:
//! - Audio capture and the frame validity filter
//! - Wake word classification and grammar-constrained recognition
//! - The command grammar and the dispatch state machine
//! - The actuator client and the CAN codec and transports
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Audio source                         │
//! │        Microphone (cpal)  │  WAV replay (hound)      │
//! └────────────────────┬────────────────────────────────┘
//!                      │ frames
//! ┌────────────────────▼────────────────────────────────┐
//! │              Command dispatcher                      │
//! │  Filter  │  Wake word  │  Recognizer  │  Grammar     │
//! └────────────────────┬────────────────────────────────┘
//!                      │ ActuatorOperation
//! ┌────────────────────▼────────────────────────────────┐
//! │              Actuator client                         │
//! │   Motor / tail codec  │  SocketCAN  │  No-op         │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod actuator;
pub mod can;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod grammar;
pub mod pipeline;
pub mod voice;

pub use actuator::{Ack, ActuatorClient};
pub use config::Config;
pub use dispatch::{CommandDispatcher, CycleOutcome, DispatchState, StepOutcome};
pub use error::{Error, Result};
pub use grammar::{ActuatorOperation, CommandGrammar};
pub use pipeline::{Pipeline, PipelineStats};
