//! Error types for setu-link

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// setu-link error types
#[derive(Debug, Error)]
pub enum Error {
    /// Socket create/bind/listen/accept failure.
    ///
    /// Fatal during endpoint setup. During operation, accept-level failures
    /// are isolated to the offending connection and logged instead.
    #[error("Socket error: {0}")]
    Socket(std::io::Error),

    /// Readiness multiplexing failure, fatal to the owning control loop
    #[error("Poll error: {0}")]
    Poll(std::io::Error),

    /// Peer address does not map to a reserved slot.
    ///
    /// The connection must be rejected; indexing with an unchecked slot is
    /// never permitted.
    #[error("Address {addr} outside configured peer range .{min}-.{max}")]
    AddressOutOfRange { addr: String, min: u8, max: u8 },

    /// A live socket already occupies the slot
    #[error("Peer slot {0} already occupied")]
    SlotOccupied(usize),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::Config(e.to_string())
    }
}
