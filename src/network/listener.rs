//! Listener/Dispatcher
//!
//! Each transport gets one dispatcher that owns its socket, enforces the
//! handler ceiling, and hands work to handler threads.
//!
//! ## TCP
//! - One acceptor thread; one handler thread per session.
//! - The acceptor takes a permit *before* accepting, so a saturated pool
//!   leaves new connections in the OS accept backlog.
//!
//! ## UDP
//! - One receive thread feeding a bounded queue; a fixed pool of workers
//!   drains it.
//! - The receive thread never waits on workers. When the queue is full the
//!   newest datagram is dropped.
//!
//! Blocking accept/receive calls are bounded by [`POLL_INTERVAL`] so that a
//! stop request is observed promptly.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::Mutex;

use super::connection::Connection;
use super::datagram::{DatagramHandler, Exchange};
use super::limiter::{ConcurrencyLimiter, Permit};
use crate::error::{Result, Transport, WireError};
use crate::service::Service;

/// Longest a blocked accept/receive waits before re-checking for stop
pub const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Largest datagram the receive loop reads
const MAX_DATAGRAM: usize = 64 * 1024;

// =============================================================================
// Statistics
// =============================================================================

/// Counters kept by a dispatcher
#[derive(Debug, Default)]
struct ListenerStats {
    accepted: AtomicU64,
    active: AtomicUsize,
    replied: AtomicU64,
    dropped: AtomicU64,
}

impl ListenerStats {
    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            replied: self.replied.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Counts one running handler until dropped, including on unwind
struct ActiveGuard<'a>(&'a AtomicUsize);

impl<'a> ActiveGuard<'a> {
    fn enter(active: &'a AtomicUsize) -> Self {
        active.fetch_add(1, Ordering::Relaxed);
        Self(active)
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Point-in-time view of a dispatcher's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Connections accepted (TCP) or datagrams received (UDP)
    pub accepted: u64,

    /// Handlers currently running a session or datagram
    ///
    /// The TCP acceptor's reserved slot is not counted.
    pub active: usize,

    /// Datagrams answered with a reply (UDP only)
    pub replied: u64,

    /// Datagrams shed because the pending queue was full
    pub dropped: u64,
}

/// Wait until every handle has finished or the deadline passes
///
/// Returns how many are still running.
fn wait_until(handles: &[JoinHandle<()>], deadline: Instant) -> usize {
    loop {
        let running = handles.iter().filter(|h| !h.is_finished()).count();
        if running == 0 || Instant::now() >= deadline {
            return running;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

// =============================================================================
// TCP Dispatcher
// =============================================================================

struct TcpShared {
    shutdown: AtomicBool,
    limiter: ConcurrencyLimiter,
    service: Service,
    idle_timeout: Duration,
    /// Clones of live session sockets, for forced closure on stop
    sessions: Mutex<HashMap<u64, TcpStream>>,
    handlers: Mutex<Vec<JoinHandle<()>>>,
    next_session: AtomicU64,
    stats: ListenerStats,
}

/// Accepts TCP connections and runs one handler thread per session
pub struct TcpDispatcher {
    local_addr: SocketAddr,
    shared: Arc<TcpShared>,
    acceptor: Option<JoinHandle<()>>,
}

impl TcpDispatcher {
    /// Bind `addr` and start accepting
    ///
    /// Fails with a `Bind` error if the address cannot be bound.
    pub fn start(
        addr: SocketAddr,
        service: Service,
        max_handlers: usize,
        idle_timeout: Duration,
    ) -> Result<Self> {
        let listener =
            TcpListener::bind(addr).map_err(|e| WireError::bind(Transport::Reliable, addr, e))?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let shared = Arc::new(TcpShared {
            shutdown: AtomicBool::new(false),
            limiter: ConcurrencyLimiter::new(max_handlers),
            service,
            idle_timeout,
            sessions: Mutex::new(HashMap::new()),
            handlers: Mutex::new(Vec::new()),
            next_session: AtomicU64::new(0),
            stats: ListenerStats::default(),
        });

        let acceptor = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("dualwire-tcp-accept".to_string())
                .spawn(move || accept_loop(listener, shared))?
        };

        tracing::info!(
            "TCP listener on {} ({} handler slots)",
            local_addr,
            shared.limiter.capacity()
        );

        Ok(Self {
            local_addr,
            shared,
            acceptor: Some(acceptor),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Close the listening socket
    ///
    /// Returns once the acceptor thread has exited. Sessions already running
    /// are left alone; see [`TcpDispatcher::drain`].
    pub fn stop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.limiter.close();

        if let Some(acceptor) = self.acceptor.take() {
            if acceptor.join().is_err() {
                tracing::error!("TCP acceptor thread panicked");
            }
            tracing::debug!("TCP listener on {} closed", self.local_addr);
        }
    }

    /// Wait for sessions to finish, forcing them closed at the deadline
    ///
    /// Returns how many sessions had to be forcibly closed.
    pub fn drain(&mut self, deadline: Instant) -> usize {
        let handlers = std::mem::take(&mut *self.shared.handlers.lock());
        let lingering = wait_until(&handlers, deadline);

        let forced = if lingering > 0 {
            let sessions = std::mem::take(&mut *self.shared.sessions.lock());
            for stream in sessions.values() {
                let _ = stream.shutdown(Shutdown::Both);
            }
            tracing::warn!("Forcibly closed {} TCP sessions", sessions.len());
            sessions.len()
        } else {
            0
        };

        for handler in handlers {
            if handler.join().is_err() {
                tracing::error!("TCP session thread panicked");
            }
        }
        forced
    }
}

impl Drop for TcpDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(listener: TcpListener, shared: Arc<TcpShared>) {
    while !shared.shutdown.load(Ordering::Acquire) {
        // A full pool parks here; pending connections wait in the backlog
        let Some(permit) = shared.limiter.acquire() else {
            break;
        };

        let Some((stream, peer)) = accept_one(&listener, &shared) else {
            break;
        };

        shared.stats.accepted.fetch_add(1, Ordering::Relaxed);
        spawn_session(&shared, stream, peer, permit);
    }
    // Dropping the listener closes the socket
}

/// Poll the non-blocking listener until a connection arrives or stop is requested
fn accept_one(listener: &TcpListener, shared: &TcpShared) -> Option<(TcpStream, SocketAddr)> {
    loop {
        if shared.shutdown.load(Ordering::Acquire) {
            return None;
        }
        match listener.accept() {
            Ok(accepted) => return Some(accepted),
            Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(POLL_INTERVAL),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                // e.g. out of file descriptors; back off and keep serving
                tracing::warn!("Accept failed: {}", e);
                thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

fn spawn_session(shared: &Arc<TcpShared>, stream: TcpStream, peer: SocketAddr, permit: Permit) {
    let id = shared.next_session.fetch_add(1, Ordering::Relaxed);

    // Accepted sockets may inherit non-blocking mode from the listener
    if let Err(e) = stream.set_nonblocking(false) {
        tracing::warn!("Dropping connection from {}: {}", peer, e);
        return;
    }
    match stream.try_clone() {
        Ok(clone) => {
            shared.sessions.lock().insert(id, clone);
        }
        Err(e) => {
            tracing::warn!("Dropping connection from {}: {}", peer, e);
            return;
        }
    }

    let session_shared = Arc::clone(shared);
    let spawned = thread::Builder::new()
        .name(format!("dualwire-tcp-{}", id))
        .spawn(move || {
            let _permit = permit;
            let _active = ActiveGuard::enter(&session_shared.stats.active);
            run_session(&session_shared, stream);
            session_shared.sessions.lock().remove(&id);
        });

    match spawned {
        Ok(handle) => {
            let mut handlers = shared.handlers.lock();
            handlers.retain(|h| !h.is_finished());
            handlers.push(handle);
        }
        Err(e) => {
            tracing::warn!("Cannot spawn session for {}: {}", peer, e);
            shared.sessions.lock().remove(&id);
        }
    }
}

fn run_session(shared: &TcpShared, stream: TcpStream) {
    let mut connection = match Connection::new(stream, shared.service.clone()) {
        Ok(connection) => connection,
        Err(e) => {
            tracing::warn!("Failed to set up session: {}", e);
            return;
        }
    };
    if let Err(e) = connection.set_idle_timeout(shared.idle_timeout) {
        tracing::warn!("Failed to configure session {}: {}", connection.peer_addr(), e);
        return;
    }
    connection.handle();
}

// =============================================================================
// UDP Dispatcher
// =============================================================================

struct UdpShared {
    shutdown: AtomicBool,
    stats: ListenerStats,
}

/// Receives UDP datagrams and spreads them over a fixed worker pool
pub struct UdpDispatcher {
    local_addr: SocketAddr,
    shared: Arc<UdpShared>,
    receiver: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl UdpDispatcher {
    /// Bind `addr` and start receiving
    ///
    /// `workers` threads process datagrams; at most `queue_capacity`
    /// datagrams wait for them. Fails with a `Bind` error if the address
    /// cannot be bound.
    pub fn start(
        addr: SocketAddr,
        service: Service,
        workers: usize,
        queue_capacity: usize,
    ) -> Result<Self> {
        let socket =
            UdpSocket::bind(addr).map_err(|e| WireError::bind(Transport::Unreliable, addr, e))?;
        socket.set_read_timeout(Some(POLL_INTERVAL))?;
        let local_addr = socket.local_addr()?;

        let shared = Arc::new(UdpShared {
            shutdown: AtomicBool::new(false),
            stats: ListenerStats::default(),
        });

        let mut dispatcher = Self {
            local_addr,
            shared: Arc::clone(&shared),
            receiver: None,
            workers: Vec::with_capacity(workers),
        };

        // On any early return the sender drops and spawned workers exit
        let (tx, rx) = channel::bounded::<Exchange>(queue_capacity);
        let handler = DatagramHandler::new(service);

        for index in 0..workers {
            let socket = socket.try_clone()?;
            let rx = rx.clone();
            let handler = handler.clone();
            let shared = Arc::clone(&shared);
            let worker = thread::Builder::new()
                .name(format!("dualwire-udp-{}", index))
                .spawn(move || worker_loop(socket, rx, handler, shared))?;
            dispatcher.workers.push(worker);
        }

        let receiver = thread::Builder::new()
            .name("dualwire-udp-recv".to_string())
            .spawn(move || receive_loop(socket, tx, shared))?;
        dispatcher.receiver = Some(receiver);

        tracing::info!(
            "UDP listener on {} ({} workers, queue {})",
            local_addr,
            workers,
            queue_capacity
        );

        Ok(dispatcher)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Stop receiving
    ///
    /// Returns once the receive thread has exited. Queued datagrams are
    /// still processed by the workers.
    pub fn stop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);

        if let Some(receiver) = self.receiver.take() {
            if receiver.join().is_err() {
                tracing::error!("UDP receive thread panicked");
            }
            tracing::debug!("UDP listener on {} closed", self.local_addr);
        }
    }

    /// Wait for workers to finish the queue
    ///
    /// Workers still busy at the deadline are detached. Returns how many.
    /// Each worker owns a clone of the socket, so the UDP port stays bound
    /// until the last detached worker exits; a restart on the same port can
    /// fail with a `Bind` error in the meantime.
    pub fn drain(&mut self, deadline: Instant) -> usize {
        let workers = std::mem::take(&mut self.workers);
        let lingering = wait_until(&workers, deadline);

        if lingering > 0 {
            tracing::warn!("{} UDP workers still busy after grace period", lingering);
            return lingering;
        }
        for worker in workers {
            if worker.join().is_err() {
                tracing::error!("UDP worker thread panicked");
            }
        }
        0
    }
}

impl Drop for UdpDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn receive_loop(socket: UdpSocket, tx: Sender<Exchange>, shared: Arc<UdpShared>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    let mut next_id: u64 = 0;

    while !shared.shutdown.load(Ordering::Acquire) {
        let (len, peer) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                // ICMP errors from earlier replies surface here on some platforms
                tracing::debug!("UDP receive error: {}", e);
                continue;
            }
        };

        shared.stats.accepted.fetch_add(1, Ordering::Relaxed);
        let exchange = Exchange {
            id: next_id,
            peer,
            datagram: Bytes::copy_from_slice(&buf[..len]),
        };
        next_id += 1;

        match tx.try_send(exchange) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                shared.stats.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("Queue full, shedding datagram #{} from {}", dropped.id, dropped.peer);
            }
            Err(TrySendError::Disconnected(_)) => break,
        }
    }
    // Dropping the sender lets workers finish the queue and exit
}

fn worker_loop(
    socket: UdpSocket,
    rx: Receiver<Exchange>,
    handler: DatagramHandler,
    shared: Arc<UdpShared>,
) {
    for exchange in rx.iter() {
        let _active = ActiveGuard::enter(&shared.stats.active);
        if handler.handle(&socket, &exchange) {
            shared.stats.replied.fetch_add(1, Ordering::Relaxed);
        }
    }
}
