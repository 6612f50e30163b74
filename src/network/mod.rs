//! Network Module
//!
//! TCP and UDP serving.
//!
//! ## Architecture
//! - TCP: single acceptor thread, one handler thread per session, bounded
//!   by a [`ConcurrencyLimiter`]
//! - UDP: single receive thread, bounded queue, fixed worker pool
//! - Both transports process requests through the same `Service`

mod connection;
mod datagram;
mod limiter;
mod listener;
mod server;

pub use connection::{CloseReason, Connection, SessionState};
pub use datagram::{DatagramHandler, Exchange};
pub use limiter::{ConcurrencyLimiter, Permit};
pub use listener::{StatsSnapshot, TcpDispatcher, UdpDispatcher, POLL_INTERVAL};
pub use server::{start, stop, Server, ServerHandle};
