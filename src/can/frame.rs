//! Classic CAN data frame

use std::fmt;

/// Maximum payload of a classic CAN frame
pub const MAX_PAYLOAD: usize = 8;

/// Largest standard (11-bit) identifier
pub const SFF_MAX_ID: u32 = 0x7FF;

/// Largest extended (29-bit) identifier
pub const EFF_MAX_ID: u32 = 0x1FFF_FFFF;

/// A CAN frame: identifier, payload length and a fixed 8-byte buffer
///
/// Only the first `len` bytes of the buffer are meaningful; the rest are
/// always zero so two frames with equal payloads compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CanFrame {
    id: u32,
    len: u8,
    data: [u8; MAX_PAYLOAD],
}

impl CanFrame {
    /// Build a frame from an identifier and payload
    ///
    /// Returns `None` if the identifier needs more than 29 bits or the
    /// payload is longer than 8 bytes.
    #[must_use]
    pub fn new(id: u32, payload: &[u8]) -> Option<Self> {
        if id > EFF_MAX_ID || payload.len() > MAX_PAYLOAD {
            return None;
        }

        let mut data = [0u8; MAX_PAYLOAD];
        data[..payload.len()].copy_from_slice(payload);

        #[allow(clippy::cast_possible_truncation)]
        let len = payload.len() as u8;

        Some(Self { id, len, data })
    }

    /// Frame identifier
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// Number of meaningful payload bytes (the DLC)
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len as usize
    }

    /// Whether the frame carries no payload
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The meaningful payload bytes
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len()]
    }

    /// The full 8-byte buffer, zero-padded past `len`
    #[must_use]
    pub const fn data(&self) -> &[u8; MAX_PAYLOAD] {
        &self.data
    }

    /// Whether the identifier needs the extended (29-bit) format
    #[must_use]
    pub const fn is_extended(&self) -> bool {
        self.id > SFF_MAX_ID
    }
}

impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:03X} [{}]", self.id, self.len)?;
        for byte in self.payload() {
            write!(f, " {byte:02X}")?;
        }
        Ok(())
    }
}
