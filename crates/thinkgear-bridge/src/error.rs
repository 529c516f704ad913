//! # Error Types
//!
//! Semantic error types for the ThinkGear bridge reader. The taxonomy
//! separates per-line failures ([`BridgeError::Decode`]), which the read
//! loop logs and skips, from connection-level failures, which end a session.

use thiserror::Error;

/// Convenient Result alias for bridge operations.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

/// All errors that can occur when talking to the ThinkGear Connector.
#[derive(Error, Debug)]
pub enum BridgeError {
    // ─── Connection ─────────────────────────────────────────────────
    /// Failed to open a TCP connection to the bridge.
    #[error("Failed to connect to ThinkGear Connector at {addr}: {reason}. Is the connector running?")]
    ConnectionFailed { addr: String, reason: String },

    /// The packet stream ended, the socket failed, or the session was closed locally.
    #[error("Connection to ThinkGear Connector closed: {reason}")]
    ConnectionClosed { reason: String },

    // ─── Handshake ──────────────────────────────────────────────────
    /// No valid packet arrived after the format request within the deadline.
    #[error("No valid packet received {seconds}s after the format request")]
    HandshakeTimeout { seconds: u64 },

    // ─── Decoding ───────────────────────────────────────────────────
    /// A single line was malformed or matched none of the known packet shapes.
    #[error("Failed to decode packet: {reason}")]
    Decode { reason: String },

    // ─── Reader ─────────────────────────────────────────────────────
    /// [`start`](crate::reader::PacketStreamReader::start) was called on a reader that already left `Idle`.
    #[error("Packet reader was already started")]
    AlreadyStarted,

    /// A recording was cancelled before it finished.
    #[error("Recording cancelled")]
    Cancelled,

    // ─── Config ─────────────────────────────────────────────────────
    /// Configuration file error (missing, malformed, or invalid values).
    #[error("Configuration error: {reason}")]
    ConfigError { reason: String },

    // ─── I/O ────────────────────────────────────────────────────────
    /// Filesystem or socket I/O error outside the packet stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV output error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl BridgeError {
    /// Returns `true` if this error means the session is unusable.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            BridgeError::ConnectionFailed { .. } | BridgeError::ConnectionClosed { .. }
        )
    }

    /// Returns `true` for a per-line decode failure the stream can recover from.
    pub fn is_decode_error(&self) -> bool {
        matches!(self, BridgeError::Decode { .. })
    }

    pub(crate) fn closed(reason: impl Into<String>) -> Self {
        BridgeError::ConnectionClosed {
            reason: reason.into(),
        }
    }

    pub(crate) fn decode(reason: impl Into<String>) -> Self {
        BridgeError::Decode {
            reason: reason.into(),
        }
    }
}

// ─── From impls for external error types ────────────────────────────────

#[cfg(feature = "config-toml")]
impl From<toml::de::Error> for BridgeError {
    fn from(err: toml::de::Error) -> Self {
        BridgeError::ConfigError {
            reason: err.to_string(),
        }
    }
}
