//! Datagram Handler
//!
//! Handles one UDP exchange: decode, process, reply once. A datagram that
//! does not hold exactly one well-formed frame gets no reply at all; there
//! is no retry, ordering or acknowledgment on this transport.

use std::net::{SocketAddr, UdpSocket};

use bytes::Bytes;

use crate::protocol::{decode, encode};
use crate::service::Service;

/// One received datagram awaiting a worker
#[derive(Debug, Clone)]
pub struct Exchange {
    /// Listener-local request identity, for logging
    pub id: u64,

    /// Where the datagram came from and where the reply goes
    pub peer: SocketAddr,

    pub datagram: Bytes,
}

/// Processes datagrams against the shared service
#[derive(Debug, Clone)]
pub struct DatagramHandler {
    service: Service,
}

impl DatagramHandler {
    pub fn new(service: Service) -> Self {
        Self { service }
    }

    /// Compute the reply for an exchange, if it deserves one
    ///
    /// Malformed or truncated datagrams yield `None`.
    pub fn reply_for(&self, exchange: &Exchange) -> Option<Bytes> {
        let request = match decode(&exchange.datagram) {
            Ok(request) => request,
            Err(e) => {
                tracing::trace!(
                    "Dropping datagram #{} from {}: {}",
                    exchange.id,
                    exchange.peer,
                    e
                );
                return None;
            }
        };

        tracing::trace!(
            "Datagram #{} from {}: {:?}",
            exchange.id,
            exchange.peer,
            request.opcode()
        );

        let response = self.service.process(&request);
        match encode(&response) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!("Cannot encode reply to #{}: {}", exchange.id, e);
                None
            }
        }
    }

    /// Handle an exchange, sending at most one reply to its origin
    ///
    /// Returns whether a reply was sent. Send failures only affect this
    /// exchange.
    pub fn handle(&self, socket: &UdpSocket, exchange: &Exchange) -> bool {
        let Some(reply) = self.reply_for(exchange) else {
            return false;
        };

        match socket.send_to(&reply, exchange.peer) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(
                    "Reply to #{} for {} not sent: {}",
                    exchange.id,
                    exchange.peer,
                    e
                );
                false
            }
        }
    }
}
