//! Setu-Link - point-to-many-point TCP messaging for robot controller nodes
//!
//! A closed local network has one coordinator ("server") and several
//! fixed-address nodes ("clients"); each node's identity is the last octet
//! of its address within a pre-declared contiguous range. Socket I/O is
//! multiplexed with bounded readiness polls and decoupled from the
//! application through fixed-capacity message rings: the application drains
//! inbound messages on its own schedule and queues outbound messages the
//! same way.
//!
//! ## Control loop
//!
//! Both roles are single-threaded and poll-driven. One iteration is:
//!
//! ```text
//! poll_once(timeout)   bounded wait, accept/read/disconnect handling
//! process_inbound(..)  exactly one inbound message (or the empty hook)
//! flush_outbound()     drain the send queue
//! ```
//!
//! The poll timeout is `1000 / update_hz` ms and is the loop's only tick
//! source; the caller checks its run flag between iterations.
//!
//! ## Wire contract
//!
//! There is no framing: one socket read yields one message of up to
//! `MESSAGE_SIZE - 1` bytes. Back-to-back small writes may coalesce and
//! large writes may split. Ring overflow drops the oldest unread message
//! and reports it; delivery to a peer that is not connected is reported and
//! the message discarded.

pub mod client;
pub mod config;
pub mod error;
pub mod message;
pub mod peers;
pub mod ring;
pub mod server;

// Re-export commonly used types
pub use client::{ClientMultiplexer, ConnectOutcome, ServerStatus};
pub use config::{LinkConfig, LoggingConfig, NetworkConfig};
pub use error::{Error, Result};
pub use message::{InboundHandler, Message, MESSAGE_SIZE, PEER_ADDR_SIZE};
pub use peers::PeerTable;
pub use ring::{MessageRing, PushOutcome, RING_SIZE};
pub use server::{FlushStats, ServerMultiplexer};
