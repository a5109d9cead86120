//! Fixed-size message type exchanged between peers
//!
//! A message is an opaque payload of at most `MESSAGE_SIZE - 1` bytes plus
//! the dotted-decimal address of the peer it came from (inbound) or goes to
//! (outbound). Both buffers are always zero-padded to their full length, so
//! consumers receive the fixed-size buffer with trailing zero bytes for
//! unused tail space.
//!
//! There is no framing on the wire: each socket read produces one message
//! from whatever bytes that read returned. Small writes sent back-to-back
//! may coalesce into one message and large writes may split across several.
//! This is part of the link's contract, not a defect.

/// Payload buffer length, one byte always reserved as zero padding
pub const MESSAGE_SIZE: usize = 256;

/// Dotted-decimal address string length, one byte reserved as zero padding
pub const PEER_ADDR_SIZE: usize = 16;

/// One payload/peer pair held in a message ring slot
#[derive(Clone, Copy)]
pub struct Message {
    payload: [u8; MESSAGE_SIZE],
    peer: [u8; PEER_ADDR_SIZE],
    len: usize,
}

impl Message {
    /// Cleared slot value
    pub(crate) const EMPTY: Message = Message {
        payload: [0u8; MESSAGE_SIZE],
        peer: [0u8; PEER_ADDR_SIZE],
        len: 0,
    };

    /// Build a message, truncating payload and peer address to their
    /// maximum meaningful lengths
    pub(crate) fn new(payload: &[u8], peer: &str) -> Self {
        let mut msg = Message::EMPTY;
        let plen = payload.len().min(MESSAGE_SIZE - 1);
        msg.payload[..plen].copy_from_slice(&payload[..plen]);
        msg.len = plen;

        let peer_bytes = peer.as_bytes();
        let alen = peer_bytes.len().min(PEER_ADDR_SIZE - 1);
        msg.peer[..alen].copy_from_slice(&peer_bytes[..alen]);
        msg
    }

    /// Reset the slot to all-zero
    pub(crate) fn clear(&mut self) {
        *self = Message::EMPTY;
    }

    /// Full fixed-size payload buffer, zero-padded past the meaningful bytes
    pub fn payload(&self) -> &[u8; MESSAGE_SIZE] {
        &self.payload
    }

    /// The meaningful payload prefix as received from (or queued for) the wire
    pub fn payload_bytes(&self) -> &[u8] {
        &self.payload[..self.len]
    }

    /// Meaningful payload length
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the payload carries no bytes
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Peer address in dotted-decimal form
    pub fn peer_addr(&self) -> &str {
        let end = self
            .peer
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(PEER_ADDR_SIZE - 1);
        std::str::from_utf8(&self.peer[..end]).unwrap_or("")
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("peer", &self.peer_addr())
            .field("len", &self.len)
            .finish()
    }
}

/// Consumer of inbound messages, invoked one step at a time
///
/// `process_inbound` on either endpoint pops at most one message per call
/// so no peer can starve the caller's loop; implementors decide what a
/// message means and what to do on an empty ring (nothing, by default).
pub trait InboundHandler {
    /// Called with the oldest unconsumed inbound message
    fn on_message(&mut self, message: &Message);

    /// Called when the inbound ring is empty
    fn on_empty(&mut self) {}
}
