//! Coordinator-side multiplexer
//!
//! Owns the listening socket, the peer table, and one inbound/outbound ring
//! pair. Driven by a single control loop: `poll_once` waits for readiness
//! and services every ready socket, `process_inbound` hands the application
//! one message, `flush_outbound` drains the send queue. No internal threads
//! and no locks; the bounded poll timeout is the loop's only tick source,
//! and the caller checks its own run flag between iterations.
//!
//! Ordering: messages from one peer reach the inbound ring in the order the
//! socket delivered them. No ordering holds across peers beyond the order
//! readiness happened to report them.

use crate::config::NetworkConfig;
use crate::error::{Error, Result};
use crate::message::{InboundHandler, Message, MESSAGE_SIZE};
use crate::peers::PeerTable;
use crate::ring::{MessageRing, PushOutcome};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use std::io::{Read, Write};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Registration token for the listening socket (peer table slot 0)
const LISTENER: Token = Token(0);

/// Readiness events serviced per poll cycle
const EVENTS_CAPACITY: usize = 64;

/// Outcome of one outbound flush
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushStats {
    /// Messages written to a connected peer
    pub sent: usize,
    /// Messages discarded because the destination was not connected or the
    /// write failed
    pub failed: usize,
}

/// Write one message to a destination, reporting whether the whole payload
/// went out
///
/// A short write would leave the tail silently lost, so it counts as a
/// delivery failure just like a write error; the message is discarded
/// either way.
pub(crate) fn write_message<W: Write>(writer: &mut W, msg: &Message, dest: &str) -> bool {
    match writer.write(msg.payload_bytes()) {
        Ok(n) if n == msg.len() => true,
        Ok(n) => {
            log::warn!(
                "Delivery failure: short write to {} ({} of {} bytes), message discarded",
                dest,
                n,
                msg.len()
            );
            false
        }
        Err(e) => {
            log::warn!("Delivery failure: write to {} failed: {}", dest, e);
            false
        }
    }
}

/// Coordinator endpoint: accepts fixed-address peers and shuttles messages
/// between its rings and their sockets
pub struct ServerMultiplexer {
    poll: Poll,
    events: Events,
    listener: Option<TcpListener>,
    peers: PeerTable,
    inbound: MessageRing,
    outbound: MessageRing,
}

impl ServerMultiplexer {
    /// Bind the listening socket and register it for readiness
    ///
    /// Setup is transactional: every resource acquired before a failure is
    /// released when the partially built endpoint drops.
    pub fn bind(config: &NetworkConfig) -> Result<Self> {
        let peers = PeerTable::new(config)?;

        let addr: SocketAddr = format!("0.0.0.0:{}", config.port)
            .parse()
            .map_err(|e| Error::Config(format!("Invalid bind address: {}", e)))?;
        let mut listener = TcpListener::bind(addr).map_err(Error::Socket)?;

        let poll = Poll::new().map_err(Error::Socket)?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
            .map_err(Error::Socket)?;

        log::info!(
            "Listening on {} for peers .{}-.{}",
            listener.local_addr().map_err(Error::Socket)?,
            config.min_peer_octet,
            config.max_peer_octet
        );

        Ok(Self {
            poll,
            events: Events::with_capacity(EVENTS_CAPACITY),
            listener: Some(listener),
            peers,
            inbound: MessageRing::new(),
            outbound: MessageRing::new(),
        })
    }

    /// Wait up to `timeout` for socket readiness and service every ready
    /// socket: accept new peers, read peer bytes into the inbound ring,
    /// drop disconnected peers
    ///
    /// Returns the connected-peer count. A multiplexing failure is fatal to
    /// the server role; per-connection failures are logged and isolated.
    pub fn poll_once(&mut self, timeout: Duration) -> Result<usize> {
        if let Err(e) = self.poll.poll(&mut self.events, Some(timeout)) {
            if e.kind() == std::io::ErrorKind::Interrupted {
                return Ok(self.peers.connected());
            }
            return Err(Error::Poll(e));
        }

        let ready: Vec<Token> = self.events.iter().map(|event| event.token()).collect();
        for token in ready {
            if token == LISTENER {
                self.accept_ready();
            } else {
                self.read_ready(token.0);
            }
        }
        Ok(self.peers.connected())
    }

    /// Pop one inbound message and hand it to the handler; single-step so
    /// one peer cannot starve the rest of the caller's loop
    pub fn process_inbound(&mut self, handler: &mut dyn InboundHandler) {
        match self.inbound.pop() {
            Some(msg) => handler.on_message(&msg),
            None => handler.on_empty(),
        }
    }

    /// Queue a message for a peer; ring overflow drops the oldest queued
    /// message and reports it
    pub fn enqueue_outbound(&mut self, payload: &[u8], destination: &str) -> PushOutcome {
        self.outbound.push(payload, destination)
    }

    /// Drain the outbound ring, writing each message to its destination
    ///
    /// A destination that is not currently connected is a delivery failure:
    /// logged, counted, and the message discarded. Nothing is requeued.
    pub fn flush_outbound(&mut self) -> FlushStats {
        let mut stats = FlushStats::default();

        while let Some(msg) = self.outbound.pop() {
            let dest = msg.peer_addr();
            let slot = dest
                .parse::<IpAddr>()
                .ok()
                .and_then(|ip| self.peers.resolve_slot(ip).ok());

            let stream = match slot.and_then(|s| self.peers.get_mut(s)) {
                Some(stream) => stream,
                None => {
                    log::warn!(
                        "Delivery failure: {} is not connected, message discarded ({} bytes)",
                        dest,
                        msg.len()
                    );
                    stats.failed += 1;
                    continue;
                }
            };

            if write_message(stream, &msg, dest) {
                stats.sent += 1;
            } else {
                stats.failed += 1;
            }
        }
        stats
    }

    /// Number of currently connected peers
    pub fn connected_peers(&self) -> usize {
        self.peers.connected()
    }

    /// Address the listener is bound to, until shutdown
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref()?.local_addr().ok()
    }

    /// Close every peer socket and the listener; safe to call repeatedly
    pub fn shutdown(&mut self) {
        for mut stream in self.peers.drain() {
            if let Err(e) = self.poll.registry().deregister(&mut stream) {
                log::debug!("Peer deregistration during shutdown failed: {}", e);
            }
        }
        if let Some(mut listener) = self.listener.take() {
            if let Err(e) = self.poll.registry().deregister(&mut listener) {
                log::debug!("Listener deregistration during shutdown failed: {}", e);
            }
            log::info!("Server shut down");
        }
    }

    /// Accept pending connections until the listener would block
    fn accept_ready(&mut self) {
        loop {
            let accepted = match self.listener.as_ref() {
                Some(listener) => listener.accept(),
                None => return,
            };
            match accepted {
                Ok((stream, addr)) => self.admit_peer(stream, addr),
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // Isolated to this accept attempt; the listener stays up
                    log::error!("Accept failed: {}", e);
                    break;
                }
            }
        }
    }

    /// Place an accepted connection in its reserved slot, or reject it
    fn admit_peer(&mut self, mut stream: TcpStream, addr: SocketAddr) {
        let slot = match self.peers.resolve_slot(addr.ip()) {
            Ok(slot) => slot,
            Err(e) => {
                log::warn!("Rejecting connection from {}: {}", addr, e);
                return;
            }
        };
        if self.peers.is_occupied(slot) {
            log::warn!(
                "Rejecting connection from {}: slot {} already occupied",
                addr,
                slot
            );
            return;
        }
        if let Err(e) = self
            .poll
            .registry()
            .register(&mut stream, Token(slot), Interest::READABLE)
        {
            log::error!("Failed to register peer {}: {}", addr, e);
            return;
        }
        log::info!("New connection from {} (slot {})", addr, slot);
        if let Err(e) = self.peers.register(slot, stream) {
            log::error!("Failed to install peer {}: {}", addr, e);
        }
    }

    /// Read everything a ready peer socket has pending
    fn read_ready(&mut self, slot: usize) {
        let peer_ip = match self.peers.get(slot).map(|s| s.peer_addr()) {
            Some(Ok(addr)) => addr.ip().to_string(),
            // getpeername can fail once the peer is gone; the slot still
            // names the address it was reserved for
            Some(Err(_)) => self.peers.addr_for_slot(slot).unwrap_or_default(),
            None => return,
        };

        let mut scratch = [0u8; MESSAGE_SIZE];
        loop {
            let Some(stream) = self.peers.get_mut(slot) else {
                return;
            };
            // One byte stays reserved so consumers always see a zero tail
            match stream.read(&mut scratch[..MESSAGE_SIZE - 1]) {
                Ok(0) => {
                    self.drop_peer(slot, &peer_ip);
                    return;
                }
                Ok(n) => {
                    self.inbound.push(&scratch[..n], &peer_ip);
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => return,
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::warn!("Read from {} failed: {}", peer_ip, e);
                    self.drop_peer(slot, &peer_ip);
                    return;
                }
            }
        }
    }

    /// Deregister and close a disconnected peer, freeing its slot
    fn drop_peer(&mut self, slot: usize, peer_ip: &str) {
        if let Some(mut stream) = self.peers.deregister(slot) {
            if let Err(e) = self.poll.registry().deregister(&mut stream) {
                log::debug!("Peer deregistration failed: {}", e);
            }
            log::info!(
                "Peer disconnected: {} (slot {}, {} still connected)",
                peer_ip,
                slot,
                self.peers.connected()
            );
        }
    }
}

impl Drop for ServerMultiplexer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts at most `cap` bytes per write
    struct ShortWriter {
        cap: usize,
        written: Vec<u8>,
    }

    impl Write for ShortWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let n = buf.len().min(self.cap);
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Refuses every write
    struct FailWriter;

    impl Write for FailWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::WouldBlock.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_message_full_write_is_sent() {
        let msg = Message::new(b"heartbeat 7", "192.168.1.10");
        let mut writer = ShortWriter {
            cap: MESSAGE_SIZE,
            written: Vec::new(),
        };
        assert!(write_message(&mut writer, &msg, "192.168.1.10"));
        assert_eq!(writer.written.as_slice(), b"heartbeat 7");
    }

    #[test]
    fn test_write_message_short_write_is_delivery_failure() {
        let msg = Message::new(b"heartbeat 7", "192.168.1.10");
        let mut writer = ShortWriter {
            cap: 4,
            written: Vec::new(),
        };
        assert!(!write_message(&mut writer, &msg, "192.168.1.10"));
    }

    #[test]
    fn test_write_message_error_is_delivery_failure() {
        let msg = Message::new(b"heartbeat 7", "192.168.1.10");
        assert!(!write_message(&mut FailWriter, &msg, "192.168.1.10"));
    }
}
