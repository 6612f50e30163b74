//! Connection Handler Tests
//!
//! These tests drive a running server over real TCP sockets and verify:
//! - Keep-alive request/response cycles
//! - Short reads never complete a message
//! - Malformed frames get one ERROR frame, then the session closes
//! - Idle sessions are closed, including peers that stop reading replies
//! - The handler ceiling holds new connections in the backlog

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use dualwire::client::Client;
use dualwire::protocol::{decode, encode, FrameReader, Message, Opcode};
use dualwire::{Config, Server, ServerHandle};

// =============================================================================
// Helper Functions
// =============================================================================

fn config() -> dualwire::config::ConfigBuilder {
    Config::builder()
        .tcp_port(0)
        .udp_port(0)
        .idle_timeout_ms(5_000)
        .stop_grace_ms(500)
}

fn start(config: Config) -> ServerHandle {
    Server::new(config).start().unwrap()
}

fn connect(handle: &ServerHandle) -> TcpStream {
    let stream = TcpStream::connect(handle.tcp_addr()).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream
}

/// Read one whole frame from a raw stream
fn read_frame(stream: &mut TcpStream) -> Message {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).unwrap();
    let len = u32::from_be_bytes(header) as usize;
    let mut frame = header.to_vec();
    frame.resize(4 + len, 0);
    stream.read_exact(&mut frame[4..]).unwrap();
    decode(&frame).unwrap()
}

/// Assert the peer closes the stream within the read timeout
fn assert_closed(stream: &mut TcpStream) {
    let mut buf = [0u8; 16];
    match stream.read(&mut buf) {
        Ok(0) => {}
        Ok(n) => panic!("expected close, got {} more bytes", n),
        Err(e) => assert!(
            matches!(e.kind(), ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted),
            "expected close, got {:?}",
            e
        ),
    }
}

// =============================================================================
// Request/Response Tests
// =============================================================================

#[test]
fn test_ping_answered_quickly() {
    let handle = start(config().build());
    let mut client = Client::connect(handle.tcp_addr()).unwrap();

    let started = Instant::now();
    client.ping().unwrap();
    assert!(started.elapsed() < Duration::from_millis(100));
}

#[test]
fn test_keep_alive_session() {
    let handle = start(config().build());
    let mut client = Client::connect(handle.tcp_addr()).unwrap();

    assert_eq!(client.echo(&b"one"[..]).unwrap().as_ref(), b"one");
    assert_eq!(client.incr().unwrap(), 1);
    assert_eq!(client.incr().unwrap(), 2);
    assert_eq!(client.get().unwrap(), 2);
    client.ping().unwrap();
}

#[test]
fn test_pipelined_requests_answered_in_order() {
    let handle = start(config().build());
    let mut stream = connect(&handle);

    let mut batch = Vec::new();
    batch.extend_from_slice(&encode(&Message::incr()).unwrap());
    batch.extend_from_slice(&encode(&Message::echo(&b"mid"[..])).unwrap());
    batch.extend_from_slice(&encode(&Message::get()).unwrap());
    stream.write_all(&batch).unwrap();

    assert_eq!(read_frame(&mut stream).as_counter_value(), Some(1));
    assert_eq!(read_frame(&mut stream), Message::echo(&b"mid"[..]));
    let get = read_frame(&mut stream);
    assert_eq!(get.opcode(), Opcode::Get);
    assert_eq!(get.as_counter_value(), Some(1));
}

#[test]
fn test_client_sent_error_gets_error_and_session_continues() {
    let handle = start(config().build());
    let mut client = Client::connect(handle.tcp_addr()).unwrap();

    let reply = client.request(&Message::error("not a request")).unwrap();
    assert_eq!(reply.opcode(), Opcode::Error);
    client.ping().unwrap();
}

// =============================================================================
// Partial Frame Tests
// =============================================================================

#[test]
fn test_short_read_keeps_session_reading() {
    let handle = start(config().build());
    let mut stream = connect(&handle);
    let frame = encode(&Message::echo(&b"split across writes"[..])).unwrap();

    // Header plus a few payload bytes only
    stream.write_all(&frame[..8]).unwrap();
    stream.flush().unwrap();

    stream.set_read_timeout(Some(Duration::from_millis(200))).unwrap();
    let mut buf = [0u8; 1];
    let err = stream.read(&mut buf).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut));

    stream.write_all(&frame[8..]).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    assert_eq!(read_frame(&mut stream), Message::echo(&b"split across writes"[..]));
}

#[test]
fn test_byte_at_a_time_frame() {
    let handle = start(config().build());
    let mut stream = connect(&handle);
    stream.set_nodelay(true).unwrap();

    for byte in encode(&Message::incr()).unwrap().iter() {
        stream.write_all(&[*byte]).unwrap();
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(read_frame(&mut stream).as_counter_value(), Some(1));
}

// =============================================================================
// Malformed Frame Tests
// =============================================================================

#[test]
fn test_unknown_opcode_gets_error_then_close() {
    let handle = start(config().build());
    let mut stream = connect(&handle);

    stream.write_all(&[0x00, 0x00, 0x00, 0x01, 0x7F]).unwrap();

    let reply = read_frame(&mut stream);
    assert_eq!(reply.opcode(), Opcode::Error);
    assert!(reply.error_text().unwrap().contains("Unknown opcode"));
    assert_closed(&mut stream);
}

#[test]
fn test_oversized_declaration_gets_error_then_close() {
    let handle = start(config().build());
    let mut stream = connect(&handle);

    stream.write_all(&u32::MAX.to_be_bytes()).unwrap();

    assert_eq!(read_frame(&mut stream).opcode(), Opcode::Error);
    assert_closed(&mut stream);
}

#[test]
fn test_malformed_session_does_not_affect_others() {
    let handle = start(config().build());
    let mut healthy = Client::connect(handle.tcp_addr()).unwrap();
    healthy.incr().unwrap();

    let mut broken = connect(&handle);
    broken.write_all(&[0x00, 0x00, 0x00, 0x00]).unwrap();
    assert_eq!(read_frame(&mut broken).opcode(), Opcode::Error);

    assert_eq!(healthy.incr().unwrap(), 2);
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_idle_session_is_closed() {
    let handle = start(config().idle_timeout_ms(150).build());
    let mut stream = connect(&handle);

    let started = Instant::now();
    assert_closed(&mut stream);
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[test]
fn test_peer_that_stops_reading_is_closed() {
    let handle = start(config().idle_timeout_ms(200).build());
    let mut stream = connect(&handle);
    stream.write_all(&encode(&Message::ping()).unwrap()).unwrap();
    assert_eq!(read_frame(&mut stream), Message::ping());
    assert_eq!(handle.tcp_stats().active, 1);

    // Pipeline large echoes and never read the replies, so the server's
    // writes back up until they block
    let frame = encode(&Message::echo(vec![0x42; 60_000])).unwrap();
    stream.set_write_timeout(Some(Duration::from_millis(50))).unwrap();
    let started = Instant::now();
    while handle.tcp_stats().active != 0 && started.elapsed() < Duration::from_secs(10) {
        match stream.write_all(&frame) {
            Ok(()) => {}
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            // Reset by the server once it gives up on the session
            Err(_) => break,
        }
    }

    let deadline = Instant::now() + Duration::from_secs(2);
    while handle.tcp_stats().active != 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(handle.tcp_stats().active, 0);
    assert!(started.elapsed() < Duration::from_secs(8));
}

#[test]
fn test_mid_frame_disconnect_is_harmless() {
    let handle = start(config().build());
    {
        let mut stream = connect(&handle);
        stream.write_all(&[0x00, 0x00, 0x00, 0x09, 0x01]).unwrap();
    }

    let mut client = Client::connect(handle.tcp_addr()).unwrap();
    client.ping().unwrap();
}

#[test]
fn test_saturated_pool_defers_new_sessions() {
    let handle = start(config().max_concurrent_handlers(1).build());

    let mut first = Client::connect(handle.tcp_addr()).unwrap();
    first.ping().unwrap();

    // Connects via the backlog, but no handler runs for it yet
    let mut second = connect(&handle);
    second.write_all(&encode(&Message::ping()).unwrap()).unwrap();
    second.set_read_timeout(Some(Duration::from_millis(300))).unwrap();
    let mut buf = [0u8; 1];
    let err = second.read(&mut buf).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut));

    drop(first);

    second.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut reader = FrameReader::new(second);
    let reply = reader.read_message().unwrap().unwrap();
    assert_eq!(reply, Message::ping());
}
