//! Fixed-capacity circular message buffer
//!
//! Each endpoint owns two rings, one inbound and one outbound, each with
//! independent cursors. A ring decouples socket readiness handling from
//! application-level consumption: the poll loop produces into the inbound
//! ring, the application drains it on its own schedule, and the reverse
//! holds for outbound messages.
//!
//! The ring is accessed by exactly one producer and one consumer running
//! cooperatively in the same control loop, so there is no internal locking.
//! Moving producer and consumer onto different threads requires wrapping
//! the ring in a mutex or replacing it with an SPSC queue that preserves
//! these semantics.

use crate::message::Message;

/// Number of slots in a message ring; `RING_SIZE - 1` are usable
pub const RING_SIZE: usize = 8;

/// Result of a ring push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Message stored without displacing anything
    Stored,
    /// Ring was full: the oldest unread message was dropped to make room
    DroppedOldest,
}

/// Circular buffer of `RING_SIZE` message slots with `processing` (oldest
/// unconsumed) and `new` (next write) cursors
///
/// `processing == new` means empty. A push that would make the cursors meet
/// advances `processing` past the oldest unread message instead, so fullness
/// is never confused with emptiness; the displaced message is gone and the
/// overflow is reported.
pub struct MessageRing {
    slots: [Message; RING_SIZE],
    processing: usize,
    new: usize,
}

impl MessageRing {
    /// Create an empty ring with all slots cleared
    pub fn new() -> Self {
        Self {
            slots: [Message::EMPTY; RING_SIZE],
            processing: 0,
            new: 0,
        }
    }

    /// Store a message at the `new` cursor, truncating payload and peer
    /// address to their maximum lengths
    ///
    /// On overflow the oldest unread message is dropped and one event is
    /// reported, per push.
    pub fn push(&mut self, payload: &[u8], peer: &str) -> PushOutcome {
        self.slots[self.new] = Message::new(payload, peer);
        self.new = (self.new + 1) % RING_SIZE;

        if self.new == self.processing {
            self.processing = (self.processing + 1) % RING_SIZE;
            log::warn!(
                "Message ring full, dropped oldest unread message (capacity {})",
                self.capacity()
            );
            PushOutcome::DroppedOldest
        } else {
            PushOutcome::Stored
        }
    }

    /// Take the oldest unconsumed message, clearing its slot
    pub fn pop(&mut self) -> Option<Message> {
        if self.is_empty() {
            return None;
        }
        let msg = self.slots[self.processing];
        self.slots[self.processing].clear();
        self.processing = (self.processing + 1) % RING_SIZE;
        Some(msg)
    }

    /// True when all pushes have been consumed
    pub fn is_empty(&self) -> bool {
        self.processing == self.new
    }

    /// Number of unconsumed messages
    pub fn len(&self) -> usize {
        (self.new + RING_SIZE - self.processing) % RING_SIZE
    }

    /// Usable slot count
    pub const fn capacity(&self) -> usize {
        RING_SIZE - 1
    }
}

impl Default for MessageRing {
    fn default() -> Self {
        Self::new()
    }
}
