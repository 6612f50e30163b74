//! Clients
//!
//! Blocking clients for both transports. [`Client`] keeps one TCP session
//! open across requests; [`DatagramClient`] sends one datagram per request
//! and waits for a single reply, without retrying.

use std::io::BufWriter;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use bytes::Bytes;

use crate::error::{Result, WireError};
use crate::protocol::{decode, encode, write_message, FrameReader, Message, Opcode};

/// Datagram receive buffer size
const MAX_DATAGRAM: usize = 64 * 1024;

fn resolve(addr: impl ToSocketAddrs) -> Result<SocketAddr> {
    addr.to_socket_addrs()?
        .next()
        .ok_or_else(|| WireError::Config("address resolved to nothing".to_string()))
}

/// Check a reply's opcode, turning ERROR replies into errors
fn expect(response: Message, opcode: Opcode) -> Result<Message> {
    if let Some(text) = response.error_text() {
        return Err(WireError::UnexpectedResponse(format!("server error: {}", text)));
    }
    if response.opcode() != opcode {
        return Err(WireError::UnexpectedResponse(format!(
            "expected {:?}, got {:?}",
            opcode,
            response.opcode()
        )));
    }
    Ok(response)
}

fn expect_counter(response: Message, opcode: Opcode) -> Result<i64> {
    let response = expect(response, opcode)?;
    response.as_counter_value().ok_or_else(|| {
        WireError::UnexpectedResponse(format!(
            "counter payload must be 8 bytes, got {}",
            response.payload().len()
        ))
    })
}

// =============================================================================
// TCP Client
// =============================================================================

/// A keep-alive TCP session
pub struct Client {
    reader: FrameReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl Client {
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        let read_stream = stream.try_clone()?;

        Ok(Self {
            reader: FrameReader::new(read_stream),
            writer: BufWriter::new(stream),
        })
    }

    /// Bound how long a request may wait on the server
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.reader.get_ref().set_read_timeout(Some(timeout))?;
        self.writer.get_ref().set_write_timeout(Some(timeout))?;
        Ok(())
    }

    /// Send one request and wait for its response
    pub fn request(&mut self, message: &Message) -> Result<Message> {
        write_message(&mut self.writer, message)?;
        self.reader.read_message()?.ok_or(WireError::UnexpectedResponse(
            "server closed the connection".to_string(),
        ))
    }

    pub fn ping(&mut self) -> Result<()> {
        let response = self.request(&Message::ping())?;
        expect(response, Opcode::Ping).map(|_| ())
    }

    pub fn echo(&mut self, payload: impl Into<Bytes>) -> Result<Bytes> {
        let response = self.request(&Message::echo(payload))?;
        Ok(expect(response, Opcode::Echo)?.payload().clone())
    }

    pub fn incr(&mut self) -> Result<i64> {
        let response = self.request(&Message::incr())?;
        expect_counter(response, Opcode::Incr)
    }

    pub fn get(&mut self) -> Result<i64> {
        let response = self.request(&Message::get())?;
        expect_counter(response, Opcode::Get)
    }
}

// =============================================================================
// UDP Client
// =============================================================================

/// A UDP client bound to one server address
pub struct DatagramClient {
    socket: UdpSocket,
}

impl DatagramClient {
    /// Bind an ephemeral local port and fix the server as the only peer
    ///
    /// `timeout` bounds how long a request waits for its reply.
    pub fn connect(server: impl ToSocketAddrs, timeout: Duration) -> Result<Self> {
        let server = resolve(server)?;
        let local: SocketAddr = if server.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };

        let socket = UdpSocket::bind(local)?;
        socket.connect(server)?;
        socket.set_read_timeout(Some(timeout))?;

        Ok(Self { socket })
    }

    /// Send one request datagram and wait for one reply
    ///
    /// A lost request or reply surfaces as a timeout I/O error.
    pub fn request(&self, message: &Message) -> Result<Message> {
        let frame = encode(message)?;
        self.socket.send(&frame)?;

        let mut buf = vec![0u8; MAX_DATAGRAM];
        let len = self.socket.recv(&mut buf)?;
        decode(&buf[..len])
    }

    pub fn ping(&self) -> Result<()> {
        let response = self.request(&Message::ping())?;
        expect(response, Opcode::Ping).map(|_| ())
    }

    pub fn echo(&self, payload: impl Into<Bytes>) -> Result<Bytes> {
        let response = self.request(&Message::echo(payload))?;
        Ok(expect(response, Opcode::Echo)?.payload().clone())
    }

    pub fn incr(&self) -> Result<i64> {
        let response = self.request(&Message::incr())?;
        expect_counter(response, Opcode::Incr)
    }

    pub fn get(&self) -> Result<i64> {
        let response = self.request(&Message::get())?;
        expect_counter(response, Opcode::Get)
    }
}
