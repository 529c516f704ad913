//! # Packet Codec
//!
//! Turns one line of the connector's JSON stream into a [`Packet`].
//!
//! Classification is a substring test against [`DISPATCH_KEYS`] in priority
//! order (`status` → `eSense` → `blink` → `mental` → `familiarity` → `raw`);
//! the line is then parsed strictly against the schema of the first match.
//! A line that is not JSON, or does not fit the chosen schema, is a
//! [`BridgeError::Decode`]. No other variant is ever tried as a fallback.
//!
//! [`LineDecoder`] frames the socket byte stream into those lines.

use bytes::BytesMut;
use serde::de::DeserializeOwned;
use tokio_util::codec::Decoder;

use crate::error::{BridgeError, BridgeResult};
use crate::protocol::constants::DISPATCH_KEYS;
use crate::protocol::packets::{
    BlinkStrength, Familiarity, MentalEffort, Packet, PacketKind, ProcessedData, RawData,
    StatusReport,
};

/// Pick the packet kind a line should be parsed as, if any.
#[must_use]
pub fn classify(line: &str) -> Option<PacketKind> {
    DISPATCH_KEYS
        .iter()
        .find(|(key, _)| line.contains(key))
        .map(|(_, kind)| *kind)
}

/// Decode one line into a packet.
///
/// # Errors
/// Returns [`BridgeError::Decode`] when the line contains none of the
/// dispatch keys or does not parse as the selected packet shape.
pub fn decode(line: &str) -> BridgeResult<Packet> {
    let line = line.trim();
    let kind = classify(line).ok_or_else(|| {
        BridgeError::decode(format!("unrecognized packet: {}", truncate(line)))
    })?;

    let packet = match kind {
        PacketKind::Status => Packet::Status(parse::<StatusReport>(line, kind)?),
        PacketKind::Processed => Packet::Processed(parse::<ProcessedData>(line, kind)?),
        PacketKind::Blink => Packet::Blink(parse::<BlinkStrength>(line, kind)?),
        PacketKind::MentalEffort => Packet::MentalEffort(parse::<MentalEffort>(line, kind)?),
        PacketKind::Familiarity => Packet::Familiarity(parse::<Familiarity>(line, kind)?),
        PacketKind::Raw => Packet::Raw(parse::<RawData>(line, kind)?),
    };
    Ok(packet)
}

/// Encode a packet as the single JSON line the connector would send
/// (without the trailing newline).
///
/// # Errors
/// Returns [`BridgeError::Json`] if a float field is not finite.
pub fn encode(packet: &Packet) -> BridgeResult<String> {
    Ok(serde_json::to_string(packet)?)
}

fn parse<T: DeserializeOwned>(line: &str, kind: PacketKind) -> BridgeResult<T> {
    serde_json::from_str(line).map_err(|e| {
        BridgeError::decode(format!("invalid {kind} packet ({e}): {}", truncate(line)))
    })
}

// ─── Framing ────────────────────────────────────────────────────────────

/// Longest line kept by [`LineDecoder`]; a processed packet is ~250 bytes.
pub const MAX_LINE_LENGTH: usize = 8 * 1024;

/// Newline framing for the connector socket.
///
/// Splits on `\r`, `\n` or `\r\n` and skips empty lines.
/// Unlike `LinesCodec`, this never fails: bytes that are not UTF-8 (the
/// connector's binary format before the switch) are decoded lossily, and
/// over-long lines are dropped up to the next newline. A framing error
/// would end a `FramedRead` stream, and the stream must survive garbage.
#[derive(Debug)]
pub struct LineDecoder {
    max_length: usize,
    next_index: usize,
    discarding: bool,
}

impl LineDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_LENGTH)
    }

    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: false,
        }
    }
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineDecoder {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        loop {
            let start = self.next_index.min(buf.len());
            let Some(offset) = buf[start..].iter().position(|b| is_terminator(*b)) else {
                if buf.len() > self.max_length {
                    if !self.discarding {
                        tracing::warn!(
                            max_length = self.max_length,
                            "Dropping over-long line from connector"
                        );
                    }
                    buf.clear();
                    self.discarding = true;
                    self.next_index = 0;
                } else {
                    self.next_index = buf.len();
                }
                return Ok(None);
            };

            let line = buf.split_to(start + offset + 1);
            self.next_index = 0;
            if self.discarding {
                self.discarding = false;
                continue;
            }
            let content = &line[..line.len() - 1];
            // `\r\n` leaves an empty line behind the `\r`.
            if content.is_empty() {
                continue;
            }
            if content.len() > self.max_length {
                tracing::warn!(
                    max_length = self.max_length,
                    "Dropping over-long line from connector"
                );
                continue;
            }
            return Ok(Some(String::from_utf8_lossy(content).into_owned()));
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if buf.is_empty() || self.discarding {
            buf.clear();
            self.discarding = false;
            return Ok(None);
        }
        let rest = buf.split();
        Ok(Some(String::from_utf8_lossy(&rest).into_owned()))
    }
}

/// The connector ends lines with `\r`; `\n` and `\r\n` are accepted too.
fn is_terminator(byte: u8) -> bool {
    byte == b'\n' || byte == b'\r'
}

/// Keep log and error messages bounded when the connector sends garbage.
fn truncate(line: &str) -> &str {
    const MAX: usize = 120;
    if line.len() <= MAX {
        return line;
    }
    let mut end = MAX;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    &line[..end]
}
