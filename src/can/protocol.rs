//! Actuator message layouts for the motor controller and the tail drive
//!
//! Both messages start with the protocol signature byte. Layouts are fixed:
//!
//! ```text
//! Motor (MOTOR_ID, 4 bytes): [signature, flags, duty %, soft start %]
//! Tail  (TAIL_ID,  3 bytes): [signature, position lo, position hi]
//! ```
//!
//! Tail position is a little-endian `i16` in centi-degrees, limited to
//! ±45.00 degrees. Encoding never fails: out-of-range inputs are clamped.

use std::ops::BitOr;

use thiserror::Error;

use super::CanFrame;

/// Signature byte leading every actuator message
pub const SIGNATURE: u8 = 0xF0;

/// Motor controller message identifier
pub const MOTOR_ID: u32 = 0x130;

/// Motor message payload length
pub const MOTOR_LEN: usize = 4;

/// Tail drive message identifier
pub const TAIL_ID: u32 = 0x140;

/// Tail message payload length
pub const TAIL_LEN: usize = 3;

/// Tail travel limit in centi-degrees (±45.00°)
pub const TAIL_LIMIT: i16 = 4500;

/// Upper bound for duty cycle and soft start percentages
pub const PERCENT_MAX: u8 = 100;

const SIGNATURE_BYTE: usize = 0;
const MOTOR_FLAGS_BYTE: usize = 1;
const MOTOR_DUTY_BYTE: usize = 2;
const MOTOR_SOFT_START_BYTE: usize = 3;
const TAIL_POSITION_LO_BYTE: usize = 1;
const TAIL_POSITION_HI_BYTE: usize = 2;

/// Motor status bits carried in byte 1 of the motor message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct MotorFlags(u8);

impl MotorFlags {
    /// Motor enabled
    pub const MOTOR_ON: Self = Self(1 << 0);
    /// Dead-man switch engaged
    pub const DMS_ON: Self = Self(1 << 1);
    /// Reverse direction
    pub const REVERSE: Self = Self(1 << 2);
    /// Forward drive: motor and dead-man switch on, reverse off
    pub const FORWARD: Self = Self(Self::MOTOR_ON.0 | Self::DMS_ON.0);

    /// Wrap raw bits as received on the wire
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw bits
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether every bit of `other` is set
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for MotorFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Decoded motor message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorCommand {
    /// Status bits
    pub flags: MotorFlags,
    /// Duty cycle, percent
    pub duty_percent: u8,
    /// Soft start ramp, percent
    pub soft_start_percent: u8,
}

/// Decoded tail message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailCommand {
    /// Tail position in centi-degrees
    pub position: i16,
}

/// Any actuator message this protocol knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorMessage {
    /// Motor controller message
    Motor(MotorCommand),
    /// Tail drive message
    Tail(TailCommand),
}

/// Reasons a received frame is not a valid actuator message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Identifier is neither the motor nor the tail message
    #[error("unknown message id 0x{0:03X}")]
    UnknownId(u32),

    /// Payload length differs from the fixed layout
    #[error("message 0x{id:03X} has {actual} bytes, expected {expected}")]
    Length {
        /// Frame identifier
        id: u32,
        /// Fixed layout length
        expected: usize,
        /// Received length
        actual: usize,
    },

    /// First byte is not the protocol signature
    #[error("bad signature byte 0x{0:02X}")]
    Signature(u8),
}

impl MotorCommand {
    /// Forward drive at the given duty cycle and soft start, both clamped to 100
    #[must_use]
    pub fn forward(duty_percent: u8, soft_start_percent: u8) -> Self {
        Self {
            flags: MotorFlags::FORWARD,
            duty_percent: duty_percent.min(PERCENT_MAX),
            soft_start_percent: soft_start_percent.min(PERCENT_MAX),
        }
    }

    /// Lay the command out as a motor frame
    #[must_use]
    pub fn to_frame(self) -> CanFrame {
        let mut payload = [0u8; MOTOR_LEN];
        payload[SIGNATURE_BYTE] = SIGNATURE;
        payload[MOTOR_FLAGS_BYTE] = self.flags.bits();
        payload[MOTOR_DUTY_BYTE] = self.duty_percent;
        payload[MOTOR_SOFT_START_BYTE] = self.soft_start_percent;
        fixed_frame(MOTOR_ID, &payload)
    }
}

impl TailCommand {
    /// Tail position clamped to ±[`TAIL_LIMIT`]
    #[must_use]
    pub fn clamped(position: i32) -> Self {
        let limit = i32::from(TAIL_LIMIT);
        #[allow(clippy::cast_possible_truncation)]
        let position = position.clamp(-limit, limit) as i16;
        Self { position }
    }

    /// Lay the command out as a tail frame
    #[must_use]
    pub fn to_frame(self) -> CanFrame {
        let [lo, hi] = self.position.to_le_bytes();
        let mut payload = [0u8; TAIL_LEN];
        payload[SIGNATURE_BYTE] = SIGNATURE;
        payload[TAIL_POSITION_LO_BYTE] = lo;
        payload[TAIL_POSITION_HI_BYTE] = hi;
        fixed_frame(TAIL_ID, &payload)
    }
}

/// Encode a forward motor command
#[must_use]
pub fn encode_motor(duty_percent: u8, soft_start_percent: u8) -> CanFrame {
    MotorCommand::forward(duty_percent, soft_start_percent).to_frame()
}

/// Encode a tail position, clamping to ±45.00°
#[must_use]
pub fn encode_tail(position_centi_degrees: i32) -> CanFrame {
    TailCommand::clamped(position_centi_degrees).to_frame()
}

/// Decode a motor frame
///
/// # Errors
///
/// Returns error if the id, length or signature do not match the motor layout
pub fn decode_motor(frame: &CanFrame) -> Result<MotorCommand, DecodeError> {
    let payload = check_layout(frame, MOTOR_ID, MOTOR_LEN)?;
    Ok(MotorCommand {
        flags: MotorFlags::from_bits(payload[MOTOR_FLAGS_BYTE]),
        duty_percent: payload[MOTOR_DUTY_BYTE],
        soft_start_percent: payload[MOTOR_SOFT_START_BYTE],
    })
}

/// Decode a tail frame
///
/// # Errors
///
/// Returns error if the id, length or signature do not match the tail layout
pub fn decode_tail(frame: &CanFrame) -> Result<TailCommand, DecodeError> {
    let payload = check_layout(frame, TAIL_ID, TAIL_LEN)?;
    let position = i16::from_le_bytes([
        payload[TAIL_POSITION_LO_BYTE],
        payload[TAIL_POSITION_HI_BYTE],
    ]);
    Ok(TailCommand { position })
}

/// Decode any actuator frame by identifier
///
/// # Errors
///
/// Returns error if the frame is not a well-formed motor or tail message
pub fn decode(frame: &CanFrame) -> Result<ActuatorMessage, DecodeError> {
    match frame.id() {
        MOTOR_ID => decode_motor(frame).map(ActuatorMessage::Motor),
        TAIL_ID => decode_tail(frame).map(ActuatorMessage::Tail),
        other => Err(DecodeError::UnknownId(other)),
    }
}

fn check_layout(frame: &CanFrame, id: u32, len: usize) -> Result<&[u8], DecodeError> {
    if frame.id() != id {
        return Err(DecodeError::UnknownId(frame.id()));
    }
    if frame.len() != len {
        return Err(DecodeError::Length {
            id,
            expected: len,
            actual: frame.len(),
        });
    }
    let payload = frame.payload();
    if payload[SIGNATURE_BYTE] != SIGNATURE {
        return Err(DecodeError::Signature(payload[SIGNATURE_BYTE]));
    }
    Ok(payload)
}

fn fixed_frame(id: u32, payload: &[u8]) -> CanFrame {
    // Layout constants keep both ids standard and payloads within 8 bytes
    CanFrame::new(id, payload).unwrap_or_else(|| unreachable!("fixed layout 0x{id:03X}"))
}
