//! Actuator command client
//!
//! Clamps motor and tail requests, encodes them and hands exactly one frame
//! to the transport. Failures are reported and logged but never retried: a
//! motor or tail command resent after an unknown delay may no longer be safe.

use crate::can::protocol::{self, PERCENT_MAX, TAIL_LIMIT};
use crate::can::{CanFrame, CanTransport, TransportError};
use crate::grammar::ActuatorOperation;

/// Soft start used for every motor command
pub const SOFT_START_PERCENT: u8 = 100;

/// Acknowledgement that a frame left through the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// The frame that was sent
    pub frame: CanFrame,
}

/// Sends motor and tail commands through a CAN transport
#[derive(Debug)]
pub struct ActuatorClient<T> {
    transport: T,
}

impl<T: CanTransport> ActuatorClient<T> {
    /// Wrap a transport
    #[must_use]
    pub const fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Set motor duty cycle, clamped to 0..=100 percent
    ///
    /// # Errors
    ///
    /// Returns error if the transport fails to send the frame
    pub fn send_motor(&mut self, duty_percent: i32) -> Result<Ack, TransportError> {
        let duty = clamp_percent(duty_percent);
        if i32::from(duty) != duty_percent {
            tracing::warn!(requested = duty_percent, duty, "duty cycle clamped");
        }

        let frame = protocol::encode_motor(duty, SOFT_START_PERCENT);
        match self.transmit(frame) {
            Ok(ack) => {
                tracing::info!(duty, "motor speed set");
                Ok(ack)
            }
            Err(e) => {
                tracing::error!(error = %e, duty, "failed to send motor command");
                Err(e)
            }
        }
    }

    /// Set tail position in centi-degrees, clamped to ±45.00°
    ///
    /// # Errors
    ///
    /// Returns error if the transport fails to send the frame
    pub fn send_tail(&mut self, position: i32) -> Result<Ack, TransportError> {
        let limit = i32::from(TAIL_LIMIT);
        if !(-limit..=limit).contains(&position) {
            tracing::warn!(requested = position, "tail position clamped");
        }

        let frame = protocol::encode_tail(position);
        let sent = protocol::decode_tail(&frame).map_or(0, |t| t.position);
        match self.transmit(frame) {
            Ok(ack) => {
                tracing::info!(degrees = f32::from(sent) / 100.0, "tail direction set");
                Ok(ack)
            }
            Err(e) => {
                tracing::error!(error = %e, position = sent, "failed to send tail command");
                Err(e)
            }
        }
    }

    /// Carry out a grammar operation
    ///
    /// Returns `None` for [`ActuatorOperation::NoOp`], which sends nothing.
    pub fn execute(
        &mut self,
        operation: ActuatorOperation,
    ) -> Option<Result<Ack, TransportError>> {
        match operation {
            ActuatorOperation::SetMotor(duty) => Some(self.send_motor(i32::from(duty))),
            ActuatorOperation::SetTailAngle(position) => Some(self.send_tail(i32::from(position))),
            ActuatorOperation::NoOp => None,
        }
    }

    /// Borrow the underlying transport
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Consume the client and return its transport
    #[must_use]
    pub fn into_transport(self) -> T {
        self.transport
    }

    fn transmit(&mut self, frame: CanFrame) -> Result<Ack, TransportError> {
        self.transport.send(&frame)?;
        Ok(Ack { frame })
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_percent(value: i32) -> u8 {
    value.clamp(0, i32::from(PERCENT_MAX)) as u8
}
