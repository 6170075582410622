//! Raw MIDI packets.
//!
//! A [`Packet`] stores its payload inline so it can be copied into and out
//! of a [`PacketQueue`](crate::PacketQueue) without touching the heap on the
//! callback thread.

use crate::{Error, Result};
use smallvec::SmallVec;
use std::fmt;

/// Inline payload capacity of one packet, matching a single platform MIDI packet.
pub const PACKET_CAPACITY: usize = 256;

#[derive(Clone, Copy)]
pub struct Packet {
    timestamp: u64,
    len: u16,
    data: [u8; PACKET_CAPACITY],
}

impl Packet {
    /// Fails if `bytes` does not fit in [`PACKET_CAPACITY`].
    pub fn new(timestamp: u64, bytes: &[u8]) -> Result<Self> {
        if bytes.len() > PACKET_CAPACITY {
            return Err(Error::PacketTooLarge {
                len: bytes.len(),
                capacity: PACKET_CAPACITY,
            });
        }
        Ok(Self::from_chunk(timestamp, bytes))
    }

    /// Caller guarantees `chunk.len() <= PACKET_CAPACITY`.
    fn from_chunk(timestamp: u64, chunk: &[u8]) -> Self {
        let mut data = [0u8; PACKET_CAPACITY];
        data[..chunk.len()].copy_from_slice(chunk);
        Self {
            timestamp,
            len: chunk.len() as u16,
            data,
        }
    }

    /// Platform timestamp. Zero means "as soon as possible" on the send path.
    #[inline]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl PartialEq for Packet {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp && self.bytes() == other.bytes()
    }
}

impl Eq for Packet {}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("timestamp", &self.timestamp)
            .field("bytes", &self.bytes())
            .finish()
    }
}

/// Ordered list of packets, as delivered by one platform callback or handed
/// to one send call.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct PacketList {
    packets: SmallVec<[Packet; 1]>,
}

impl PacketList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Splits `bytes` into as many packets as needed, all sharing `timestamp`.
    ///
    /// Long SysEx streams therefore span several packets; an empty slice
    /// yields an empty list.
    pub fn from_bytes(timestamp: u64, bytes: &[u8]) -> Self {
        bytes
            .chunks(PACKET_CAPACITY)
            .map(|chunk| Packet::from_chunk(timestamp, chunk))
            .collect()
    }

    pub fn push(&mut self, packet: Packet) {
        self.packets.push(packet);
    }

    /// Appends a packet built from `bytes`.
    pub fn push_bytes(&mut self, timestamp: u64, bytes: &[u8]) -> Result<()> {
        self.packets.push(Packet::new(timestamp, bytes)?);
        Ok(())
    }

    #[inline]
    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Packet> {
        self.packets.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.packets.iter().map(Packet::len).sum()
    }
}

impl From<Packet> for PacketList {
    fn from(packet: Packet) -> Self {
        let mut list = Self::new();
        list.push(packet);
        list
    }
}

impl FromIterator<Packet> for PacketList {
    fn from_iter<I: IntoIterator<Item = Packet>>(iter: I) -> Self {
        Self {
            packets: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a PacketList {
    type Item = &'a Packet;
    type IntoIter = std::slice::Iter<'a, Packet>;

    fn into_iter(self) -> Self::IntoIter {
        self.packets.iter()
    }
}

impl fmt::Debug for PacketList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.packets.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_holds_bytes() {
        let packet = Packet::new(42, &[0x90, 60, 100]).unwrap();
        assert_eq!(packet.timestamp(), 42);
        assert_eq!(packet.bytes(), &[0x90, 60, 100]);
        assert_eq!(packet.len(), 3);
        assert!(!packet.is_empty());
    }

    #[test]
    fn test_packet_rejects_oversized_payload() {
        let bytes = vec![0xF0; PACKET_CAPACITY + 1];
        assert_eq!(
            Packet::new(0, &bytes),
            Err(Error::PacketTooLarge {
                len: PACKET_CAPACITY + 1,
                capacity: PACKET_CAPACITY,
            })
        );

        // Exactly at capacity is fine
        assert!(Packet::new(0, &bytes[..PACKET_CAPACITY]).is_ok());
    }

    #[test]
    fn test_packet_equality_ignores_unused_storage() {
        let a = Packet::new(1, &[0xF8]).unwrap();
        let b = Packet::new(1, &[0xF8]).unwrap();
        let c = Packet::new(2, &[0xF8]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_from_bytes_splits_long_streams() {
        let mut sysex = vec![0xF0];
        sysex.extend(std::iter::repeat(0x11).take(600));
        sysex.push(0xF7);

        let list = PacketList::from_bytes(7, &sysex);
        assert_eq!(list.len(), 3);
        assert_eq!(list.packets()[0].len(), PACKET_CAPACITY);
        assert_eq!(list.packets()[1].len(), PACKET_CAPACITY);
        assert_eq!(list.packets()[2].len(), sysex.len() - 2 * PACKET_CAPACITY);
        assert!(list.iter().all(|p| p.timestamp() == 7));
        assert_eq!(list.total_bytes(), sysex.len());

        let rejoined: Vec<u8> = list.iter().flat_map(|p| p.bytes().to_vec()).collect();
        assert_eq!(rejoined, sysex);
    }

    #[test]
    fn test_from_bytes_empty() {
        assert!(PacketList::from_bytes(0, &[]).is_empty());
    }

    #[test]
    fn test_push_bytes() {
        let mut list = PacketList::new();
        list.push_bytes(0, &[0xFA]).unwrap();
        list.push_bytes(10, &[0xF8]).unwrap();
        assert!(list.push_bytes(0, &[0; PACKET_CAPACITY + 1]).is_err());
        assert_eq!(list.len(), 2);
        assert_eq!(list.packets()[1].timestamp(), 10);
    }
}
