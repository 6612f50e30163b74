//! Connection Handler
//!
//! Handles individual TCP client sessions.
//!
//! ## Session States
//! ```text
//! ACCEPTED → READING → PROCESSING → WRITING ─┐
//!               ▲                            │
//!               └────────────────────────────┘
//!            (end-of-stream / timeout / error) → CLOSED
//! ```

use std::io::{BufWriter, ErrorKind};
use std::net::TcpStream;
use std::time::Duration;

use crate::error::{Result, WireError};
use crate::protocol::{write_message, FrameReader, Message};
use crate::service::Service;

/// Where a session is in its request/response cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Accepted,
    Reading,
    Processing,
    Writing,
    Closed,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer closed its side between frames
    EndOfStream,

    /// No bytes moved within the idle timeout
    IdleTimeout,

    /// Peer reset, aborted, or hung up mid-frame
    PeerDisconnected,

    /// Peer sent a malformed frame; one ERROR frame was sent back
    MalformedFrame,

    /// Any other I/O failure; no reply attempted
    IoError,
}

/// Handles a single client session
pub struct Connection {
    /// Frame-assembling reader over the stream
    reader: FrameReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    /// Request processor backed by the shared counter
    service: Service,

    /// Peer address for logging
    peer_addr: String,

    /// Completed request/response exchanges
    sequence: u64,

    state: SessionState,
}

impl Connection {
    /// Create a new connection handler
    ///
    /// Sets up buffered I/O over a freshly accepted stream
    pub fn new(stream: TcpStream, service: Service) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;
        let write_stream = stream;

        Ok(Self {
            reader: FrameReader::new(read_stream),
            writer: BufWriter::new(write_stream),
            service,
            peer_addr,
            sequence: 0,
            state: SessionState::Accepted,
        })
    }

    /// Bound how long a read or a write may block on a silent peer
    pub fn set_idle_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.reader.get_ref().set_read_timeout(Some(timeout))?;
        self.writer.get_ref().set_write_timeout(Some(timeout))?;
        Ok(())
    }

    /// Serve the session until it closes
    ///
    /// Reads requests in a loop and writes one response per request.
    /// Never fails: every way a session can end is reported as a [`CloseReason`].
    pub fn handle(&mut self) -> CloseReason {
        tracing::debug!("Session established with {}", self.peer_addr);

        loop {
            self.state = SessionState::Reading;
            let request = match self.reader.read_message() {
                Ok(Some(message)) => message,
                Ok(None) => {
                    tracing::debug!("Client {} disconnected", self.peer_addr);
                    return self.close(CloseReason::EndOfStream);
                }
                Err(WireError::MalformedFrame(reason)) => {
                    tracing::debug!("Malformed frame from {}: {}", self.peer_addr, reason);
                    self.state = SessionState::Writing;
                    if let Err(e) = self.send(&Message::error(&reason)) {
                        tracing::debug!("Could not report error to {}: {}", self.peer_addr, e);
                    }
                    return self.close(CloseReason::MalformedFrame);
                }
                Err(WireError::Io(ref e)) => {
                    let reason = classify_io_error(e);
                    match reason {
                        CloseReason::IdleTimeout => {
                            tracing::debug!("Idle timeout for client {}", self.peer_addr)
                        }
                        CloseReason::PeerDisconnected => {
                            tracing::debug!("Client {} went away: {}", self.peer_addr, e)
                        }
                        _ => tracing::warn!("Error reading from {}: {}", self.peer_addr, e),
                    }
                    return self.close(reason);
                }
                Err(e) => {
                    tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                    return self.close(CloseReason::IoError);
                }
            };

            tracing::trace!(
                "Request #{} from {}: {:?}",
                self.sequence,
                self.peer_addr,
                request.opcode()
            );

            self.state = SessionState::Processing;
            let response = self.service.process(&request);

            self.state = SessionState::Writing;
            if let Err(e) = self.send(&response) {
                let reason = match e {
                    WireError::Io(ref io_err) => classify_io_error(io_err),
                    _ => CloseReason::IoError,
                };
                if reason == CloseReason::IoError {
                    tracing::warn!("Error writing to {}: {}", self.peer_addr, e);
                } else {
                    tracing::debug!(
                        "Client {} unreachable before response could be sent: {}",
                        self.peer_addr,
                        e
                    );
                }
                return self.close(reason);
            }

            self.sequence += 1;
        }
    }

    fn send(&mut self, message: &Message) -> Result<()> {
        write_message(&mut self.writer, message)
    }

    fn close(&mut self, reason: CloseReason) -> CloseReason {
        self.state = SessionState::Closed;
        tracing::debug!(
            "Session with {} closed after {} exchanges: {:?}",
            self.peer_addr,
            self.sequence,
            reason
        );
        reason
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    /// Number of completed exchanges
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn state(&self) -> SessionState {
        self.state
    }
}

fn classify_io_error(e: &std::io::Error) -> CloseReason {
    match e.kind() {
        // Unix reports an expired socket timeout as WouldBlock, Windows as TimedOut
        ErrorKind::WouldBlock | ErrorKind::TimedOut => CloseReason::IdleTimeout,
        ErrorKind::UnexpectedEof
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe => CloseReason::PeerDisconnected,
        _ => CloseReason::IoError,
    }
}
