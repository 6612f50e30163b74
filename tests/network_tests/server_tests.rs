//! Server Core Tests
//!
//! These tests verify:
//! - Concurrent clients never lose counter updates
//! - Startup is all-or-nothing when a port is taken
//! - Stop closes listeners and force-closes stuck sessions

use std::io::Read;
use std::net::{TcpListener, TcpStream, UdpSocket};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use dualwire::client::{Client, DatagramClient};
use dualwire::{Config, Server, ServerHandle, SharedCounter, Transport, WireError};

// =============================================================================
// Helper Functions
// =============================================================================

fn config() -> dualwire::config::ConfigBuilder {
    Config::builder().tcp_port(0).udp_port(0).stop_grace_ms(500)
}

fn start(config: Config) -> ServerHandle {
    dualwire::network::start(config).unwrap()
}

/// A UDP port that was free a moment ago
fn free_udp_port() -> u16 {
    UdpSocket::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_two_clients_500_incr_each() {
    let handle = start(config().build());
    let addr = handle.tcp_addr();
    let barrier = Arc::new(Barrier::new(2));

    let workers: Vec<_> = (0..2)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut client = Client::connect(addr).unwrap();
                barrier.wait();
                for _ in 0..500 {
                    client.incr().unwrap();
                }
                client
            })
        })
        .collect();

    let mut clients: Vec<Client> = workers.into_iter().map(|w| w.join().unwrap()).collect();

    assert_eq!(clients[0].get().unwrap(), 1000);
    assert_eq!(clients[1].get().unwrap(), 1000);
}

#[test]
fn test_many_clients_both_transports() {
    let handle = start(config().build());
    let tcp_addr = handle.tcp_addr();
    let udp_addr = handle.udp_addr();

    let mut workers = Vec::new();
    for _ in 0..16 {
        workers.push(thread::spawn(move || {
            let mut client = Client::connect(tcp_addr).unwrap();
            for _ in 0..100 {
                client.incr().unwrap();
            }
        }));
    }
    for _ in 0..4 {
        workers.push(thread::spawn(move || {
            let client = DatagramClient::connect(udp_addr, Duration::from_secs(2)).unwrap();
            // Loopback does not lose datagrams at this rate; one request in flight at a time
            for _ in 0..100 {
                client.incr().unwrap();
            }
        }));
    }
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(handle.counter_value(), 2000);
}

#[test]
fn test_server_around_existing_counter() {
    let counter = Arc::new(SharedCounter::with_value(100));
    let handle = Server::with_counter(config().build(), Arc::clone(&counter))
        .start()
        .unwrap();

    let mut client = Client::connect(handle.tcp_addr()).unwrap();
    assert_eq!(client.incr().unwrap(), 101);
    assert_eq!(counter.get(), 101);
}

// =============================================================================
// Startup Tests
// =============================================================================

#[test]
fn test_tcp_port_taken_fails_and_releases_udp() {
    let blocker = TcpListener::bind("127.0.0.1:0").unwrap();
    let tcp_port = blocker.local_addr().unwrap().port();
    let udp_port = free_udp_port();

    let result = Server::new(
        config().tcp_port(tcp_port).udp_port(udp_port).build(),
    )
    .start();

    match result {
        Err(WireError::Bind { transport, .. }) => assert_eq!(transport, Transport::Reliable),
        Err(e) => panic!("expected Bind error, got {}", e),
        Ok(_) => panic!("expected Bind error, server started"),
    }

    // The UDP listener was torn down, so its port is free again
    UdpSocket::bind(("127.0.0.1", udp_port)).unwrap();
}

#[test]
fn test_udp_port_taken_fails() {
    let blocker = UdpSocket::bind("127.0.0.1:0").unwrap();
    let udp_port = blocker.local_addr().unwrap().port();

    let result = Server::new(config().udp_port(udp_port).build()).start();
    assert!(matches!(
        result,
        Err(WireError::Bind { transport: Transport::Unreliable, .. })
    ));
}

#[test]
fn test_invalid_config_rejected() {
    let result = Server::new(config().udp_queue_capacity(0).build()).start();
    assert!(matches!(result, Err(WireError::Config(_))));
}

// =============================================================================
// Stop Tests
// =============================================================================

#[test]
fn test_stop_closes_listeners() {
    let handle = start(config().build());
    let tcp_addr = handle.tcp_addr();
    let udp_addr = handle.udp_addr();

    dualwire::network::stop(handle);

    assert!(TcpStream::connect(tcp_addr).is_err());
    UdpSocket::bind(udp_addr).unwrap();
}

#[test]
fn test_stop_force_closes_idle_sessions() {
    let handle = start(config().idle_timeout_ms(60_000).stop_grace_ms(200).build());

    let mut client = Client::connect(handle.tcp_addr()).unwrap();
    client.ping().unwrap();

    let mut raw = TcpStream::connect(handle.tcp_addr()).unwrap();
    raw.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    // Let the acceptor pick the second session up
    thread::sleep(Duration::from_millis(100));

    let started = Instant::now();
    handle.stop();
    assert!(started.elapsed() < Duration::from_secs(3));

    let mut buf = [0u8; 8];
    assert!(matches!(raw.read(&mut buf), Ok(0) | Err(_)));
    assert!(client.ping().is_err());
}

#[test]
fn test_stop_waits_for_quiet_server_quickly() {
    let handle = start(config().stop_grace_ms(5_000).build());
    {
        let mut client = Client::connect(handle.tcp_addr()).unwrap();
        client.ping().unwrap();
    }
    // Give the session a moment to see end-of-stream
    thread::sleep(Duration::from_millis(100));

    let started = Instant::now();
    handle.stop();
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_stats_track_sessions() {
    let handle = start(config().build());
    let mut client = Client::connect(handle.tcp_addr()).unwrap();
    client.ping().unwrap();

    let stats = handle.tcp_stats();
    assert_eq!(stats.accepted, 1);
    assert_eq!(stats.active, 1);
    assert_eq!(handle.udp_stats().accepted, 0);
}

#[test]
fn test_active_counts_only_running_sessions() {
    let handle = start(config().build());

    // The acceptor already holds a handler slot while it waits
    thread::sleep(Duration::from_millis(100));
    assert_eq!(handle.tcp_stats().active, 0);

    let mut client = Client::connect(handle.tcp_addr()).unwrap();
    client.ping().unwrap();
    assert_eq!(handle.tcp_stats().active, 1);

    drop(client);
    let deadline = Instant::now() + Duration::from_secs(2);
    while handle.tcp_stats().active != 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    let stats = handle.tcp_stats();
    assert_eq!(stats.active, 0);
    assert_eq!(stats.accepted, 1);
    assert_eq!(stats.replied, 0);
}
