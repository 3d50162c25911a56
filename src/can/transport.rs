//! Outbound CAN transport seam

use thiserror::Error;

use super::CanFrame;

/// Errors raised while moving a frame onto the bus
#[derive(Debug, Error)]
pub enum TransportError {
    /// Socket level failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The kernel accepted fewer bytes than a full frame
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite {
        /// Bytes written
        written: usize,
        /// Bytes in a frame
        expected: usize,
    },

    /// A received frame could not be represented
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

/// Something that can put one frame on the bus
///
/// `send` is blocking and fire-and-forget: callers never retry.
pub trait CanTransport {
    /// Transmit a single frame
    ///
    /// # Errors
    ///
    /// Returns error if the frame was not fully written
    fn send(&mut self, frame: &CanFrame) -> Result<(), TransportError>;
}

impl<T: CanTransport + ?Sized> CanTransport for Box<T> {
    fn send(&mut self, frame: &CanFrame) -> Result<(), TransportError> {
        (**self).send(frame)
    }
}

/// Transport used when CAN is disabled; accepts frames without sending them
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTransport;

impl CanTransport for NoopTransport {
    fn send(&mut self, frame: &CanFrame) -> Result<(), TransportError> {
        tracing::info!(frame = %frame, "CAN disabled, frame not sent");
        Ok(())
    }
}
