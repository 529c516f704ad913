//! Protocol constants for the ThinkGear Connector socket.

use super::packets::PacketKind;

/// Host the ThinkGear Connector listens on.
pub const DEFAULT_HOST: &str = "localhost";

/// TCP port of the ThinkGear Connector JSON socket.
pub const DEFAULT_PORT: u16 = 13854;

/// Format name requested in the handshake.
pub const FORMAT_JSON: &str = "Json";

/// Poor signal levels above this mean the headset is badly fitted.
pub const POOR_SIGNAL_THRESHOLD: u8 = 50;

/// Substrings that identify each packet shape, in dispatch priority order.
///
/// A line is decoded against the schema of the first key it contains.
/// The order is part of the wire contract: malformed lines can carry more
/// than one key, and must always resolve the same way.
pub const DISPATCH_KEYS: [(&str, PacketKind); 6] = [
    ("status", PacketKind::Status),
    ("eSense", PacketKind::Processed),
    ("blink", PacketKind::Blink),
    ("mental", PacketKind::MentalEffort),
    ("familiarity", PacketKind::Familiarity),
    ("raw", PacketKind::Raw),
];
