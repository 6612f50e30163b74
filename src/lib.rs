//! # dualwire
//!
//! A concurrent request/response service with:
//! - A reliable transport (TCP) with keep-alive sessions
//! - A best-effort transport (UDP) with one reply per datagram
//! - One length-prefixed frame format shared by both
//! - A single mutex-guarded counter shared by every handler
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────┐      ┌──────────────────────────┐
//! │      TCP Dispatcher      │      │      UDP Dispatcher      │
//! │  acceptor + session per  │      │  receiver → queue →      │
//! │  thread (bounded)        │      │  worker pool (bounded)   │
//! └────────────┬─────────────┘      └────────────┬─────────────┘
//!              │                                 │
//!              ▼                                 ▼
//!   ┌─────────────────────┐           ┌─────────────────────┐
//!   │ Connection Handler  │           │  Datagram Handler   │
//!   └──────────┬──────────┘           └──────────┬──────────┘
//!              └───────────────┬─────────────────┘
//!                              ▼
//!                   ┌─────────────────────┐
//!                   │  Service (opcodes)  │
//!                   └──────────┬──────────┘
//!                              ▼
//!                   ┌─────────────────────┐
//!                   │   SharedCounter     │
//!                   │      (Mutex)        │
//!                   └─────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod counter;
pub mod service;
pub mod network;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, Transport, WireError};
pub use config::Config;
pub use counter::SharedCounter;
pub use network::{Server, ServerHandle};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of dualwire
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
