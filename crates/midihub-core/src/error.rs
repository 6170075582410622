//! Error types for midihub-core.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Packet payload of {len} bytes exceeds capacity of {capacity} bytes")]
    PacketTooLarge { len: usize, capacity: usize },
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Packet, PACKET_CAPACITY};

    #[test]
    fn test_oversized_packet_is_the_only_core_failure() {
        let err = Packet::new(0, &vec![0xF0; PACKET_CAPACITY + 1]).unwrap_err();
        match err {
            Error::PacketTooLarge { len, capacity } => {
                assert_eq!(len, PACKET_CAPACITY + 1);
                assert_eq!(capacity, PACKET_CAPACITY);
            }
        }
        assert_eq!(
            err.to_string(),
            format!(
                "Packet payload of {} bytes exceeds capacity of {} bytes",
                PACKET_CAPACITY + 1,
                PACKET_CAPACITY
            )
        );
    }
}
