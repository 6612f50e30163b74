//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Wire Format
//!
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Len (4)  │ Op (1)   │   Payload (Len - 1 bytes)   │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! `Len` is big-endian and counts the opcode byte plus the payload.

use std::io::Write;

use bytes::{BufMut, Bytes, BytesMut};

use super::{Message, Opcode};
use crate::error::{Result, WireError};

/// Size of the length prefix
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Header size: 4 bytes length + 1 byte opcode
pub const HEADER_SIZE: usize = 5;

/// Maximum payload size
pub const MAX_PAYLOAD_SIZE: usize = 60_000;

/// Largest frame that can appear on the wire
pub const MAX_FRAME_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD_SIZE;

// =============================================================================
// Encoding
// =============================================================================

/// Encode a message to bytes
///
/// Fails only when the payload is larger than [`MAX_PAYLOAD_SIZE`].
pub fn encode(message: &Message) -> Result<Bytes> {
    let payload = message.payload();
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(WireError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }

    let mut frame = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    frame.put_u32((1 + payload.len()) as u32);
    frame.put_u8(message.opcode() as u8);
    frame.put_slice(payload);

    Ok(frame.freeze())
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode exactly one frame
///
/// The slice must hold one complete frame and nothing else; trailing bytes
/// mean the declared length disagrees with what is present.
pub fn decode(bytes: &[u8]) -> Result<Message> {
    let (message, consumed) = decode_prefix(bytes)?;
    if consumed != bytes.len() {
        return Err(WireError::MalformedFrame(format!(
            "Declared length {} but {} bytes follow the prefix",
            consumed - LENGTH_PREFIX_SIZE,
            bytes.len() - LENGTH_PREFIX_SIZE
        )));
    }
    Ok(message)
}

/// Decode the first frame of a byte stream
///
/// Returns the message and the number of bytes consumed. Bytes after the
/// frame are left untouched for the next call.
pub fn decode_prefix(bytes: &[u8]) -> Result<(Message, usize)> {
    if bytes.len() < LENGTH_PREFIX_SIZE {
        return Err(WireError::Truncated {
            needed: LENGTH_PREFIX_SIZE,
            available: bytes.len(),
        });
    }

    let declared = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;

    if declared == 0 {
        return Err(WireError::MalformedFrame(
            "Declared length 0 leaves no room for an opcode".to_string(),
        ));
    }
    if declared > 1 + MAX_PAYLOAD_SIZE {
        return Err(WireError::MalformedFrame(format!(
            "Declared length {} exceeds maximum {}",
            declared,
            1 + MAX_PAYLOAD_SIZE
        )));
    }

    // The opcode can be checked as soon as it arrives
    let opcode = match bytes.get(LENGTH_PREFIX_SIZE) {
        Some(&byte) => Opcode::from_byte(byte)?,
        None => {
            return Err(WireError::Truncated {
                needed: LENGTH_PREFIX_SIZE + declared,
                available: bytes.len(),
            })
        }
    };

    let total_len = LENGTH_PREFIX_SIZE + declared;
    if bytes.len() < total_len {
        return Err(WireError::Truncated {
            needed: total_len,
            available: bytes.len(),
        });
    }

    let payload = Bytes::copy_from_slice(&bytes[HEADER_SIZE..total_len]);
    Ok((Message::new(opcode, payload), total_len))
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Write a message to a stream and flush it
pub fn write_message<W: Write>(writer: &mut W, message: &Message) -> Result<()> {
    let bytes = encode(message)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}
