//! Integrity primitives shared by both ends of the link.
//!
//! The CRC parameters are an interoperability contract - both boards must be
//! built with the same algorithm or no header will ever validate.  The link
//! uses CRC-8/SMBUS (polynomial `0x07`, initial value `0x00`, no reflection,
//! no final XOR).
//!
//! Both functions are table/bit-count based and visit every byte, with no
//! early exit.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use crc::{CRC_8_SMBUS, Crc};

const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// Calculate the link CRC-8 over `bytes`.
///
/// The CRC of an empty slice is `0x00`.
pub fn crc8(bytes: &[u8]) -> u8 {
    CRC8.checksum(bytes)
}

/// Returns true if `byte` has an odd number of set bits, i.e. setting one
/// more bit would give it even parity.
pub const fn parity(byte: u8) -> bool {
    byte.count_ones() & 1 == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc8_check_value() {
        // Catalogue check value for CRC-8/SMBUS
        assert_eq!(crc8(b"123456789"), 0xF4);
    }

    #[test]
    fn crc8_matches_companion_firmware() {
        // Header of an empty frame as emitted by the existing display board
        assert_eq!(crc8(&[0x41, 0x00]), 0x4E);
    }

    #[test]
    fn crc8_of_nothing_is_zero() {
        assert_eq!(crc8(&[]), 0);
    }

    #[test]
    fn parity_counts_bits() {
        assert!(!parity(0x00));
        assert!(parity(0x01));
        assert!(parity(0x40));
        assert!(!parity(0x41));
        assert!(!parity(0xFF));
        assert!(parity(0x7F));
    }
}
