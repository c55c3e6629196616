//! Error types for the BusT4 protocol engine.
//!
//! The bus is shared with other devices and breaks can collide, so none of
//! these errors are fatal. Receive-side problems are recorded as [`Fault`]s
//! and the engine keeps running; only host-facing calls (raw commands,
//! cover control) return them as `Err`.

use std::time::Instant;

use thiserror::Error;

/// Errors produced by the BusT4 protocol engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Bust4Error {
    /// Start byte, length field or checksum did not match.
    #[error("malformed frame: {reason}")]
    MalformedFrame { reason: String },

    /// A message type, submenu or command code with no known meaning.
    #[error("unknown code 0x{code:02X} in {context}")]
    UnknownCode { context: &'static str, code: u8 },

    /// The actuator answered with a non-zero error byte.
    #[error("device error 0x{code:02X} (submenu 0x{submenu:02X})")]
    DeviceError { code: u8, submenu: u8 },

    /// The in-flight command got no response in time and was dropped.
    #[error("no response within {timeout_ms} ms, command dropped")]
    ResponseTimeout { timeout_ms: u64 },

    /// The configured actuator cannot do what the host asked for.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    /// Operator-supplied hex text could not be parsed.
    #[error("invalid hex command: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Operator-supplied command is empty or missing a required byte.
    #[error("invalid command argument: {0}")]
    InvalidArgument(&'static str),

    /// The transmit queue is at capacity.
    #[error("transmit queue full ({0} frames)")]
    QueueFull(usize),

    /// The serial collaborator failed to send.
    #[error("transport error: {0}")]
    Transport(String),
}

impl Bust4Error {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Bust4Error::MalformedFrame {
            reason: reason.into(),
        }
    }
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Bust4Error>;

/// A non-fatal problem observed while running the engine.
#[derive(Debug, Clone)]
pub struct Fault {
    pub error: Bust4Error,
    pub at: Instant,
}

impl Fault {
    pub fn new(error: Bust4Error, at: Instant) -> Self {
        Self { error, at }
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}
