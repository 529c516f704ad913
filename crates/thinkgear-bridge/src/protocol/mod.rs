//! ThinkGear Connector protocol domain modules.
//!
//! - [`constants`]: default endpoint and the packet dispatch keys.
//! - [`packets`]: the typed packet model decoded from the JSON stream.
//! - [`handshake`]: the format request sent right after connecting.

pub mod constants;
pub mod handshake;
pub mod packets;

pub use constants::{DEFAULT_HOST, DEFAULT_PORT, DISPATCH_KEYS, POOR_SIGNAL_THRESHOLD};
pub use handshake::FormatRequest;
pub use packets::{
    BlinkStrength, EegPower, ESense, Familiarity, MentalEffort, Packet, PacketKind, ProcessedData,
    RawData, StatusReport,
};
