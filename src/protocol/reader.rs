//! Buffered frame reader
//!
//! The one buffered-read abstraction per stream. Bytes accumulate in a
//! bounded buffer until a whole frame is present; a short read is never
//! surfaced as a message.

use std::io::{ErrorKind, Read};

use bytes::{Buf, BytesMut};

use super::codec::{decode_prefix, MAX_FRAME_SIZE};
use super::Message;
use crate::error::{Result, WireError};

/// Bytes requested from the stream per read call
const READ_CHUNK: usize = 8 * 1024;

/// Reads whole frames from a byte stream
pub struct FrameReader<R> {
    inner: R,
    buffer: BytesMut,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    /// Read the next complete message
    ///
    /// Returns `Ok(None)` when the stream ends cleanly between frames.
    /// End-of-stream in the middle of a frame is an `UnexpectedEof` I/O error.
    /// Timeouts configured on the underlying stream surface as I/O errors.
    pub fn read_message(&mut self) -> Result<Option<Message>> {
        loop {
            match decode_prefix(&self.buffer) {
                Ok((message, consumed)) => {
                    self.buffer.advance(consumed);
                    return Ok(Some(message));
                }
                Err(WireError::Truncated { .. }) => {
                    if self.fill()? == 0 {
                        if self.buffer.is_empty() {
                            return Ok(None);
                        }
                        return Err(WireError::Io(std::io::Error::new(
                            ErrorKind::UnexpectedEof,
                            format!("stream ended with {} bytes of a partial frame", self.buffer.len()),
                        )));
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Pull one chunk from the stream into the buffer
    fn fill(&mut self) -> Result<usize> {
        debug_assert!(self.buffer.len() < MAX_FRAME_SIZE);

        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(n) => {
                    self.buffer.extend_from_slice(&chunk[..n]);
                    return Ok(n);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Bytes received but not yet returned as a message
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }
}
