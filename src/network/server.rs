//! Server Core
//!
//! Owns the shared counter and both dispatchers, and ties their lifecycles
//! together.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::listener::{StatsSnapshot, TcpDispatcher, UdpDispatcher};
use crate::config::Config;
use crate::counter::SharedCounter;
use crate::error::Result;
use crate::service::Service;

/// A configured server that has not been started yet
pub struct Server {
    config: Config,
    counter: Arc<SharedCounter>,
}

impl Server {
    /// Create a new server with the given config and a zeroed counter
    pub fn new(config: Config) -> Self {
        Self::with_counter(config, Arc::new(SharedCounter::new()))
    }

    /// Create a server around an existing counter
    pub fn with_counter(config: Config, counter: Arc<SharedCounter>) -> Self {
        Self { config, counter }
    }

    /// Bind both transports and start serving
    ///
    /// All or nothing: if either bind fails, whatever was already started is
    /// torn down and the bind error is returned.
    pub fn start(self) -> Result<ServerHandle> {
        self.config.validate()?;
        let service = Service::new(Arc::clone(&self.counter));

        let udp_addr = self.config.udp_addr()?;
        let tcp_addr = self.config.tcp_addr()?;

        let mut udp = UdpDispatcher::start(
            udp_addr,
            service.clone(),
            self.config.max_concurrent_handlers,
            self.config.udp_queue_capacity,
        )?;

        let tcp = match TcpDispatcher::start(
            tcp_addr,
            service,
            self.config.max_concurrent_handlers,
            self.config.idle_timeout(),
        ) {
            Ok(tcp) => tcp,
            Err(e) => {
                tracing::error!("Startup failed, tearing down UDP listener: {}", e);
                udp.stop();
                udp.drain(Instant::now() + self.config.stop_grace());
                return Err(e);
            }
        };

        tracing::info!(
            "dualwire v{} serving tcp={} udp={}",
            crate::VERSION,
            tcp.local_addr(),
            udp.local_addr()
        );

        Ok(ServerHandle {
            tcp,
            udp,
            counter: self.counter,
            grace: self.config.stop_grace(),
            stopped: false,
        })
    }
}

/// Start a server with `config`
pub fn start(config: Config) -> Result<ServerHandle> {
    Server::new(config).start()
}

/// Stop a running server
pub fn stop(handle: ServerHandle) {
    handle.stop();
}

/// A running server
///
/// Dropping the handle stops the server.
pub struct ServerHandle {
    tcp: TcpDispatcher,
    udp: UdpDispatcher,
    counter: Arc<SharedCounter>,
    grace: Duration,
    stopped: bool,
}

impl ServerHandle {
    pub fn tcp_addr(&self) -> std::net::SocketAddr {
        self.tcp.local_addr()
    }

    pub fn udp_addr(&self) -> std::net::SocketAddr {
        self.udp.local_addr()
    }

    /// Current counter value, read through the guard
    pub fn counter_value(&self) -> i64 {
        self.counter.get()
    }

    pub fn tcp_stats(&self) -> StatsSnapshot {
        self.tcp.stats()
    }

    pub fn udp_stats(&self) -> StatsSnapshot {
        self.udp.stats()
    }

    /// Stop both listeners, wait out the grace period, then force-close
    /// whatever is still running
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        tracing::info!("Stopping server (grace {:?})", self.grace);
        self.udp.stop();
        self.tcp.stop();

        let deadline = Instant::now() + self.grace;
        let forced = self.tcp.drain(deadline);
        let lingering = self.udp.drain(deadline);

        tracing::info!(
            "Server stopped ({} sessions force-closed, {} workers detached)",
            forced,
            lingering
        );
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
