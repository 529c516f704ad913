//! Latest-value table: the most recent packet of each kind.

use std::sync::{PoisonError, RwLock};

use crate::protocol::{Packet, PacketKind};

/// A packet tagged with its position in the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct SequencedPacket {
    pub packet: Packet,
    /// Strictly increasing across the whole stream, starting at 1.
    pub sequence: u64,
}

/// One slot per [`PacketKind`], each holding the highest-sequence packet seen.
///
/// Reads never block on the read loop for longer than a slot copy, and
/// always observe a complete entry.
#[derive(Debug, Default)]
pub struct LatestPacketTable {
    slots: RwLock<[Option<SequencedPacket>; 6]>,
}

impl LatestPacketTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `packet` in its kind's slot unless a newer one is already there.
    ///
    /// Returns `false` when the write was stale and ignored.
    pub fn update(&self, packet: Packet, sequence: u64) -> bool {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let slot = &mut slots[packet.kind().index()];
        if slot.as_ref().is_some_and(|current| current.sequence >= sequence) {
            return false;
        }
        *slot = Some(SequencedPacket { packet, sequence });
        true
    }

    /// The latest packet of `kind`, or `None` if that kind never arrived.
    #[must_use]
    pub fn get(&self, kind: PacketKind) -> Option<SequencedPacket> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots[kind.index()].clone()
    }

    /// Kinds observed so far.
    #[must_use]
    pub fn kinds(&self) -> Vec<PacketKind> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        PacketKind::ALL
            .into_iter()
            .filter(|kind| slots[kind.index()].is_some())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{BlinkStrength, RawData};

    fn raw(value: i16) -> Packet {
        Packet::Raw(RawData { raw_eeg: value })
    }

    #[test]
    fn test_latest_returns_highest_sequence() {
        let table = LatestPacketTable::new();
        assert!(table.update(raw(1), 1));
        assert!(table.update(raw(2), 2));
        assert!(table.update(raw(3), 3));

        let latest = table.get(PacketKind::Raw).unwrap();
        assert_eq!(latest.sequence, 3);
        assert_eq!(latest.packet, raw(3));
        assert_eq!(table.get(PacketKind::Blink), None);
    }

    #[test]
    fn test_stale_write_is_ignored() {
        let table = LatestPacketTable::new();
        assert!(table.update(raw(5), 5));
        assert!(!table.update(raw(4), 4));
        assert!(!table.update(raw(9), 5));
        assert_eq!(table.get(PacketKind::Raw).unwrap().packet, raw(5));
    }

    #[test]
    fn test_kinds_are_independent() {
        let table = LatestPacketTable::new();
        table.update(raw(1), 1);
        table.update(Packet::Blink(BlinkStrength { blink_strength: 60 }), 2);
        table.update(raw(2), 3);

        assert_eq!(table.get(PacketKind::Blink).unwrap().sequence, 2);
        assert_eq!(table.get(PacketKind::Raw).unwrap().sequence, 3);
        assert_eq!(table.kinds(), vec![PacketKind::Blink, PacketKind::Raw]);
    }

    #[test]
    fn test_concurrent_readers_never_go_backwards() {
        use std::sync::Arc;

        let table = Arc::new(LatestPacketTable::new());
        let writer = {
            let table = Arc::clone(&table);
            std::thread::spawn(move || {
                for seq in 1..=2_000_u64 {
                    table.update(raw(i16::try_from(seq % 1000).unwrap()), seq);
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let table = Arc::clone(&table);
                std::thread::spawn(move || {
                    let mut last = 0;
                    for _ in 0..2_000 {
                        if let Some(entry) = table.get(PacketKind::Raw) {
                            assert!(entry.sequence >= last);
                            last = entry.sequence;
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(table.get(PacketKind::Raw).unwrap().sequence, 2_000);
    }
}
