//! Configuration for dualwire
//!
//! Centralized configuration with sensible defaults.

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use crate::error::{Result, WireError};

/// Main configuration for a dualwire server
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// Host both listeners bind to
    pub host: String,

    /// TCP (reliable transport) port. 0 lets the OS pick one.
    pub tcp_port: u16,

    /// UDP (unreliable transport) port. 0 lets the OS pick one.
    pub udp_port: u16,

    // -------------------------------------------------------------------------
    // Concurrency Configuration
    // -------------------------------------------------------------------------
    /// Ceiling on concurrently active handlers, applied per transport
    pub max_concurrent_handlers: usize,

    /// Datagrams allowed to wait for a free UDP worker before load shedding
    pub udp_queue_capacity: usize,

    // -------------------------------------------------------------------------
    // Timeouts
    // -------------------------------------------------------------------------
    /// How long a TCP session may sit idle on a read or write (milliseconds)
    pub idle_timeout_ms: u64,

    /// How long `stop` waits for in-flight handlers (milliseconds)
    pub stop_grace_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            tcp_port: 7878,
            udp_port: 7879,
            max_concurrent_handlers: 64,
            udp_queue_capacity: 1024,
            idle_timeout_ms: 30_000,
            stop_grace_ms: 5_000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_handlers == 0 {
            return Err(WireError::Config(
                "max_concurrent_handlers must be at least 1".to_string(),
            ));
        }
        if self.udp_queue_capacity == 0 {
            return Err(WireError::Config(
                "udp_queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.idle_timeout_ms == 0 {
            return Err(WireError::Config(
                "idle_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolved TCP bind address
    pub fn tcp_addr(&self) -> Result<SocketAddr> {
        resolve(&self.host, self.tcp_port)
    }

    /// Resolved UDP bind address
    pub fn udp_addr(&self) -> Result<SocketAddr> {
        resolve(&self.host, self.udp_port)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| WireError::Config(format!("Cannot resolve {}:{}: {}", host, port, e)))?
        .next()
        .ok_or_else(|| WireError::Config(format!("No address for {}:{}", host, port)))
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the host both listeners bind to
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the TCP port
    pub fn tcp_port(mut self, port: u16) -> Self {
        self.config.tcp_port = port;
        self
    }

    /// Set the UDP port
    pub fn udp_port(mut self, port: u16) -> Self {
        self.config.udp_port = port;
        self
    }

    /// Set the per-transport handler ceiling
    pub fn max_concurrent_handlers(mut self, count: usize) -> Self {
        self.config.max_concurrent_handlers = count;
        self
    }

    /// Set the pending datagram queue capacity
    pub fn udp_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.udp_queue_capacity = capacity;
        self
    }

    /// Set the idle timeout (in milliseconds)
    pub fn idle_timeout_ms(mut self, ms: u64) -> Self {
        self.config.idle_timeout_ms = ms;
        self
    }

    /// Set the stop grace period (in milliseconds)
    pub fn stop_grace_ms(mut self, ms: u64) -> Self {
        self.config.stop_grace_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
