//! Message definitions
//!
//! One request or response exchanged over either transport.

use bytes::Bytes;

use crate::error::{Result, WireError};

/// Opcodes carried in the fifth byte of every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Ping = 0x00,
    Echo = 0x01,
    Incr = 0x02,
    Get = 0x03,
    Error = 0x04,
}

impl Opcode {
    /// Parse an opcode byte
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0x00 => Ok(Opcode::Ping),
            0x01 => Ok(Opcode::Echo),
            0x02 => Ok(Opcode::Incr),
            0x03 => Ok(Opcode::Get),
            0x04 => Ok(Opcode::Error),
            other => Err(WireError::MalformedFrame(format!(
                "Unknown opcode: 0x{:02x}",
                other
            ))),
        }
    }
}

/// A decoded message
///
/// Immutable once built; the payload is a cheaply clonable `Bytes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    opcode: Opcode,
    payload: Bytes,
}

impl Message {
    /// Build a message from an opcode and payload
    pub fn new(opcode: Opcode, payload: impl Into<Bytes>) -> Self {
        Self {
            opcode,
            payload: payload.into(),
        }
    }

    /// PING request, or the empty acknowledgment sent back for one
    pub fn ping() -> Self {
        Self::new(Opcode::Ping, Bytes::new())
    }

    pub fn echo(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Echo, payload)
    }

    pub fn incr() -> Self {
        Self::new(Opcode::Incr, Bytes::new())
    }

    pub fn get() -> Self {
        Self::new(Opcode::Get, Bytes::new())
    }

    /// ERROR message carrying UTF-8 text
    pub fn error(message: &str) -> Self {
        Self::new(Opcode::Error, Bytes::copy_from_slice(message.as_bytes()))
    }

    /// Counter reply: the value as 8 bytes big-endian
    pub fn counter_value(opcode: Opcode, value: i64) -> Self {
        Self::new(opcode, Bytes::copy_from_slice(&value.to_be_bytes()))
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Interpret the payload as a counter value
    ///
    /// Returns `None` unless the payload is exactly 8 bytes.
    pub fn as_counter_value(&self) -> Option<i64> {
        let bytes: [u8; 8] = self.payload.as_ref().try_into().ok()?;
        Some(i64::from_be_bytes(bytes))
    }

    /// Interpret an ERROR payload as text
    pub fn error_text(&self) -> Option<String> {
        match self.opcode {
            Opcode::Error => Some(String::from_utf8_lossy(&self.payload).into_owned()),
            _ => None,
        }
    }
}
