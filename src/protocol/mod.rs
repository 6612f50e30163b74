//! Protocol Module
//!
//! Defines the wire protocol shared by the TCP and UDP transports.
//!
//! ## Frame Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Len (4)  │ Op (1)   │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Opcodes
//! - 0x00: PING  - Payload: empty (reply: empty ack)
//! - 0x01: ECHO  - Payload: any bytes (reply: same bytes)
//! - 0x02: INCR  - Payload: empty (reply: new value, i64 BE)
//! - 0x03: GET   - Payload: empty (reply: value, i64 BE)
//! - 0x04: ERROR - Payload: UTF-8 reason
//!
//! A frame on TCP may arrive in pieces; [`FrameReader`] keeps reading until
//! it is whole. A datagram is decoded exactly once with [`decode`].

mod message;
mod codec;
mod reader;

pub use message::{Message, Opcode};
pub use codec::{
    decode, decode_prefix, encode, write_message, HEADER_SIZE, LENGTH_PREFIX_SIZE,
    MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE,
};
pub use reader::FrameReader;
