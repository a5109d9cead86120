//! Node-side multiplexer
//!
//! Owns one socket to the coordinator and the node's ring pair. The
//! connection cycles `Disconnected -> Connected -> Disconnected`; the retry
//! timer lives in the caller's loop, not here, so the loop keeps control of
//! cancellation while the server is down. The expected cadence while
//! disconnected is one `try_connect` per update interval.

use crate::config::NetworkConfig;
use crate::error::{Error, Result};
use crate::message::{InboundHandler, MESSAGE_SIZE};
use crate::ring::{MessageRing, PushOutcome};
use crate::server::{write_message, FlushStats};
use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token};
use std::io::Read;
use std::net::SocketAddr;
use std::time::Duration;

/// Registration token for the single server socket
const SERVER: Token = Token(0);

/// Result of a connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Socket connected and registered for readiness
    Connected,
    /// Server not reachable yet; expected while it is still coming up, back
    /// off one update interval and retry
    NotYet,
}

/// Connection state as observed by the last poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    /// Session is up
    Connected,
    /// Server went away (or was never connected); re-enter the reconnect
    /// cycle
    Disconnected,
}

/// Node endpoint: one socket to the coordinator plus inbound/outbound rings
pub struct ClientMultiplexer {
    poll: Poll,
    events: Events,
    server_addr: SocketAddr,
    server_ip: String,
    stream: Option<TcpStream>,
    inbound: MessageRing,
    outbound: MessageRing,
}

impl ClientMultiplexer {
    /// Create the readiness context; does not connect yet
    pub fn new(config: &NetworkConfig) -> Result<Self> {
        config.validate()?;
        let server_addr = config.server_socket_addr()?;
        Ok(Self {
            poll: Poll::new().map_err(Error::Socket)?,
            events: Events::with_capacity(8),
            server_addr,
            server_ip: server_addr.ip().to_string(),
            stream: None,
            inbound: MessageRing::new(),
            outbound: MessageRing::new(),
        })
    }

    /// Attempt one connection to the coordinator
    ///
    /// Connection refusal or timeout means the server is not listening yet
    /// and maps to `NotYet`; the caller retries next interval. A failure to
    /// register the connected socket is fatal and not retried.
    pub fn try_connect(&mut self) -> Result<ConnectOutcome> {
        if self.stream.is_some() {
            return Ok(ConnectOutcome::Connected);
        }

        let std_stream = match std::net::TcpStream::connect(self.server_addr) {
            Ok(stream) => stream,
            Err(e) => {
                log::debug!("Server {} not reachable: {}", self.server_addr, e);
                return Ok(ConnectOutcome::NotYet);
            }
        };
        std_stream.set_nonblocking(true).map_err(Error::Socket)?;
        if let Err(e) = std_stream.set_nodelay(true) {
            log::debug!("Failed to disable Nagle: {}", e);
        }

        let mut stream = TcpStream::from_std(std_stream);
        self.poll
            .registry()
            .register(&mut stream, SERVER, Interest::READABLE)
            .map_err(Error::Socket)?;

        log::info!("Connected to server {}", self.server_addr);
        self.stream = Some(stream);
        Ok(ConnectOutcome::Connected)
    }

    /// Wait up to `timeout` for server bytes and read them into the inbound
    /// ring
    ///
    /// A zero-byte read means the server closed the session: the socket is
    /// deregistered and closed, and `Disconnected` is returned so the
    /// caller's loop re-enters the reconnect cycle.
    pub fn poll_once(&mut self, timeout: Duration) -> Result<ServerStatus> {
        if self.stream.is_none() {
            return Ok(ServerStatus::Disconnected);
        }

        if let Err(e) = self.poll.poll(&mut self.events, Some(timeout)) {
            if e.kind() == std::io::ErrorKind::Interrupted {
                return Ok(ServerStatus::Connected);
            }
            return Err(Error::Poll(e));
        }

        if self.events.is_empty() {
            return Ok(ServerStatus::Connected);
        }
        self.read_ready()
    }

    /// Pop one inbound message and hand it to the handler; same single-step
    /// contract as the server side
    pub fn process_inbound(&mut self, handler: &mut dyn InboundHandler) {
        match self.inbound.pop() {
            Some(msg) => handler.on_message(&msg),
            None => handler.on_empty(),
        }
    }

    /// Queue a message for the coordinator
    pub fn enqueue_outbound(&mut self, payload: &[u8]) -> PushOutcome {
        // The peer field of an outbound message records the server address
        self.outbound.push(payload, self.server_ip.as_str())
    }

    /// Drain the outbound ring to the server socket
    ///
    /// While disconnected every queued message is a delivery failure:
    /// logged, counted, discarded.
    pub fn flush_outbound(&mut self) -> FlushStats {
        let mut stats = FlushStats::default();

        while let Some(msg) = self.outbound.pop() {
            let Some(stream) = self.stream.as_mut() else {
                log::warn!(
                    "Delivery failure: not connected to {}, message discarded ({} bytes)",
                    self.server_ip,
                    msg.len()
                );
                stats.failed += 1;
                continue;
            };
            if write_message(stream, &msg, &self.server_ip) {
                stats.sent += 1;
            } else {
                stats.failed += 1;
            }
        }
        stats
    }

    /// True while a session to the coordinator is up
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Close the server socket; safe to call repeatedly
    pub fn shutdown(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = self.poll.registry().deregister(&mut stream) {
                log::debug!("Deregistration during shutdown failed: {}", e);
            }
            log::info!("Client shut down");
        }
    }

    /// Read everything the server socket has pending
    fn read_ready(&mut self) -> Result<ServerStatus> {
        let mut scratch = [0u8; MESSAGE_SIZE];
        loop {
            let Some(stream) = self.stream.as_mut() else {
                return Ok(ServerStatus::Disconnected);
            };
            match stream.read(&mut scratch[..MESSAGE_SIZE - 1]) {
                Ok(0) => {
                    self.disconnect();
                    return Ok(ServerStatus::Disconnected);
                }
                Ok(n) => {
                    self.inbound.push(&scratch[..n], self.server_ip.as_str());
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    return Ok(ServerStatus::Connected)
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::warn!("Read from server failed: {}", e);
                    self.disconnect();
                    return Ok(ServerStatus::Disconnected);
                }
            }
        }
    }

    /// Deregister and close the server socket, returning to `Disconnected`
    fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = self.poll.registry().deregister(&mut stream) {
                log::debug!("Deregistration failed: {}", e);
            }
            log::info!("Server {} disconnected", self.server_addr);
        }
    }
}

impl Drop for ClientMultiplexer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
