//! Packet types emitted by the ThinkGear Connector.
//!
//! Every line of the JSON stream carries exactly one of six shapes. Field
//! names follow the connector's camelCase wire names; unknown extra fields
//! are ignored, missing or mistyped required fields are decode errors.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Tag identifying a [`Packet`] variant.
///
/// Used as the key of the latest-value table in
/// [`PacketStreamReader`](crate::reader::PacketStreamReader).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PacketKind {
    Status,
    Processed,
    Blink,
    MentalEffort,
    Familiarity,
    Raw,
}

impl PacketKind {
    /// Every kind, in dispatch priority order.
    pub const ALL: [PacketKind; 6] = [
        PacketKind::Status,
        PacketKind::Processed,
        PacketKind::Blink,
        PacketKind::MentalEffort,
        PacketKind::Familiarity,
        PacketKind::Raw,
    ];

    /// Stable position of this kind within [`PacketKind::ALL`].
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            PacketKind::Status => 0,
            PacketKind::Processed => 1,
            PacketKind::Blink => 2,
            PacketKind::MentalEffort => 3,
            PacketKind::Familiarity => 4,
            PacketKind::Raw => 5,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PacketKind::Status => "status",
            PacketKind::Processed => "processed",
            PacketKind::Blink => "blink",
            PacketKind::MentalEffort => "mental_effort",
            PacketKind::Familiarity => "familiarity",
            PacketKind::Raw => "raw",
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connector is idle or searching: no headset attached, or no signal yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// 0 = good contact, 200 = no contact at all.
    pub poor_signal_level: u8,
    /// Connector state, e.g. `"scanning"` or `"notscanning"`.
    pub status: String,
}

/// eSense meters, 0–100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ESense {
    pub attention: u8,
    pub meditation: u8,
}

/// Relative band powers (unitless, 24-bit on the device).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EegPower {
    pub delta: u32,
    pub theta: u32,
    pub low_alpha: u32,
    pub high_alpha: u32,
    pub low_beta: u32,
    pub high_beta: u32,
    pub low_gamma: u32,
    pub high_gamma: u32,
}

/// Derived metrics, emitted at most once per second.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedData {
    #[serde(rename = "eSense")]
    pub e_sense: ESense,
    pub eeg_power: EegPower,
    pub poor_signal_level: u8,
}

impl ProcessedData {
    #[must_use]
    pub fn attention(&self) -> u8 {
        self.e_sense.attention
    }

    #[must_use]
    pub fn meditation(&self) -> u8 {
        self.e_sense.meditation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlinkStrength {
    pub blink_strength: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MentalEffort {
    pub mental_effort: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Familiarity {
    pub familiarity: f64,
}

/// One raw EEG sample; only streamed when raw output was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawData {
    pub raw_eeg: i16,
}

/// A single decoded line of the connector's JSON stream.
///
/// Serializes to the same single-line JSON shape the connector emits.
/// Decoding goes through [`codec::decode`](crate::codec::decode), which
/// applies the dispatch priority order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Packet {
    Status(StatusReport),
    Processed(ProcessedData),
    Blink(BlinkStrength),
    MentalEffort(MentalEffort),
    Familiarity(Familiarity),
    Raw(RawData),
}

impl Packet {
    #[must_use]
    pub fn kind(&self) -> PacketKind {
        match self {
            Packet::Status(_) => PacketKind::Status,
            Packet::Processed(_) => PacketKind::Processed,
            Packet::Blink(_) => PacketKind::Blink,
            Packet::MentalEffort(_) => PacketKind::MentalEffort,
            Packet::Familiarity(_) => PacketKind::Familiarity,
            Packet::Raw(_) => PacketKind::Raw,
        }
    }

    /// Signal quality carried by status and processed packets.
    #[must_use]
    pub fn poor_signal_level(&self) -> Option<u8> {
        match self {
            Packet::Status(s) => Some(s.poor_signal_level),
            Packet::Processed(p) => Some(p.poor_signal_level),
            _ => None,
        }
    }

    /// `true` for anything but a [`StatusReport`], i.e. a headset is streaming.
    #[must_use]
    pub fn is_headset_data(&self) -> bool {
        !matches!(self, Packet::Status(_))
    }
}

impl From<StatusReport> for Packet {
    fn from(value: StatusReport) -> Self {
        Packet::Status(value)
    }
}

impl From<ProcessedData> for Packet {
    fn from(value: ProcessedData) -> Self {
        Packet::Processed(value)
    }
}

impl From<BlinkStrength> for Packet {
    fn from(value: BlinkStrength) -> Self {
        Packet::Blink(value)
    }
}

impl From<MentalEffort> for Packet {
    fn from(value: MentalEffort) -> Self {
        Packet::MentalEffort(value)
    }
}

impl From<Familiarity> for Packet {
    fn from(value: Familiarity) -> Self {
        Packet::Familiarity(value)
    }
}

impl From<RawData> for Packet {
    fn from(value: RawData) -> Self {
        Packet::Raw(value)
    }
}
