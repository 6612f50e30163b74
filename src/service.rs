//! Request processing
//!
//! Opcode dispatch shared by the TCP and UDP handlers. Given one decoded
//! request it produces exactly one response; transports decide what to do
//! with malformed input before a request ever gets here.

use std::sync::Arc;

use crate::counter::SharedCounter;
use crate::protocol::{Message, Opcode};

/// Turns requests into responses against the shared counter
#[derive(Debug, Clone)]
pub struct Service {
    counter: Arc<SharedCounter>,
}

impl Service {
    pub fn new(counter: Arc<SharedCounter>) -> Self {
        Self { counter }
    }

    /// Process one request
    ///
    /// - PING: empty acknowledgment
    /// - ECHO: payload returned unchanged
    /// - INCR: new counter value
    /// - GET: current counter value
    /// - ERROR: not a request; answered with an ERROR
    pub fn process(&self, request: &Message) -> Message {
        match request.opcode() {
            Opcode::Ping => Message::ping(),
            Opcode::Echo => Message::echo(request.payload().clone()),
            Opcode::Incr => Message::counter_value(Opcode::Incr, self.counter.increment()),
            Opcode::Get => Message::counter_value(Opcode::Get, self.counter.get()),
            Opcode::Error => Message::error("unexpected opcode: ERROR is not a request"),
        }
    }
}
