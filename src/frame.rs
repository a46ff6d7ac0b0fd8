//! Frame layout, header construction and validation.
//!
//! See [`crate`] for the wire layout.  A [`Frame`] owns a buffer large enough
//! for the largest frame plus the one trailing byte the Host clocks when it
//! completes a partial receive.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use crate::codec::{crc8, parity};
use crate::{Error, Result};

/// Length of the frame header
pub const HEADER_LEN: usize = 4;

/// Shift of the 12-bit size field within the first two header bytes
pub const SIZE_SHIFT: u32 = 4;

/// Largest frame size (header + payload) the 12-bit size field can carry
pub const MAX_FRAME_LEN: usize = 0xFFF;

/// Largest payload a single frame can carry
pub const MAX_PAYLOAD_LEN: usize = MAX_FRAME_LEN - HEADER_LEN;

/// Size of a frame buffer - the largest frame plus one trailing byte
pub const FRAME_BUFFER_LEN: usize = MAX_FRAME_LEN + 1;

/// Sent by a Device with nothing new to transmit
pub const BUSY_BYTE: u8 = 0xFF;

/// Sent by either side to fill bytes beyond its own frame
pub const PAD_BYTE: u8 = 0x00;

const PARITY_BIT: u8 = 1 << 0;
const HEADER_ERROR_BIT: u8 = 1 << 1;
const PAYLOAD_ERROR_BIT: u8 = 1 << 2;
const RESERVED_BIT: u8 = 1 << 3;
const ERROR_FLAGS: u8 = HEADER_ERROR_BIT | PAYLOAD_ERROR_BIT;

/// Error flag a side raises against the frame it received from its peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorFlag {
    /// Status byte or header CRC of the received frame was bad
    Header,
    /// Payload CRC of the received frame was bad
    Payload,
}

impl ErrorFlag {
    const fn bit(self) -> u8 {
        match self {
            ErrorFlag::Header => HEADER_ERROR_BIT,
            ErrorFlag::Payload => PAYLOAD_ERROR_BIT,
        }
    }
}

/// The first header byte, which doubles as the 1-byte status each side sends
/// during status exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(pub u8);

impl Status {
    /// Even parity and reserved bit clear.  Busy and corrupt bytes fail this.
    pub const fn is_valid(self) -> bool {
        !parity(self.0) && self.0 & RESERVED_BIT == 0
    }

    pub const fn is_busy(self) -> bool {
        self.0 == BUSY_BYTE
    }

    pub const fn header_error(self) -> bool {
        self.0 & HEADER_ERROR_BIT != 0
    }

    pub const fn payload_error(self) -> bool {
        self.0 & PAYLOAD_ERROR_BIT != 0
    }

    pub const fn any_error(self) -> bool {
        self.0 & ERROR_FLAGS != 0
    }
}

/// A frame buffer, either outbound or inbound.
pub struct Frame {
    buf: [u8; FRAME_BUFFER_LEN],
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

impl Frame {
    /// Create a zeroed frame buffer.
    pub const fn new() -> Self {
        Self {
            buf: [0; FRAME_BUFFER_LEN],
        }
    }

    /// Copy `payload` into the frame and write its header, preserving any
    /// error flags already set.
    ///
    /// Returns the total frame length.
    pub fn load(&mut self, payload: &[u8]) -> Result<usize> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(Error::PayloadTooLarge);
        }
        self.buf[HEADER_LEN..HEADER_LEN + payload.len()].copy_from_slice(payload);
        self.write_header(payload.len())?;
        Ok(payload.len() + HEADER_LEN)
    }

    /// Write size, parity and both CRCs for a payload of `payload_len` bytes
    /// already in place.
    ///
    /// Error flags are preserved, so a pending error report survives a reframe
    /// of the same buffer.  The byte following the frame is zeroed, as it may
    /// get clocked out.
    ///
    /// Returns `Err(Error::PayloadTooLarge)`, leaving the frame untouched, if
    /// `payload_len` exceeds [`MAX_PAYLOAD_LEN`].
    pub fn write_header(&mut self, payload_len: usize) -> Result<()> {
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(Error::PayloadTooLarge);
        }
        let size = (payload_len + HEADER_LEN) as u16;

        let word = (size << SIZE_SHIFT) | (self.buf[0] & ERROR_FLAGS) as u16;
        let [lo, hi] = word.to_le_bytes();
        self.buf[0] = lo | parity(lo) as u8;
        self.buf[1] = hi;
        self.buf[2] = crc8(&self.buf[..2]);
        self.buf[3] = crc8(&self.buf[HEADER_LEN..HEADER_LEN + payload_len]);
        self.buf[HEADER_LEN + payload_len] = PAD_BYTE;
        Ok(())
    }

    /// Raise an error flag and fix up parity.
    ///
    /// The header CRC is deliberately left alone - the modified first byte is
    /// the report, and is not expected to validate against it.
    pub fn set_error_flag(&mut self, flag: ErrorFlag) {
        self.buf[0] |= flag.bit();
        self.fix_parity();
    }

    /// Clear both error flags and fix up parity.
    pub fn clear_error_flags(&mut self) {
        self.buf[0] &= !ERROR_FLAGS;
        self.fix_parity();
    }

    /// The first header byte.
    pub fn status(&self) -> Status {
        Status(self.buf[0])
    }

    pub fn validate_status(&self) -> bool {
        self.status().is_valid()
    }

    /// Status is valid, the declared size is either zero or at least a header,
    /// and the header CRC matches.
    ///
    /// A zero size with matching CRC is an all-pad header, sent by a peer with
    /// nothing to say, and reads as an empty frame.
    pub fn validate_header(&self) -> bool {
        let len = self.declared_len();
        self.validate_status()
            && (len == 0 || len >= HEADER_LEN)
            && self.buf[2] == crc8(&self.buf[..2])
    }

    /// Header is valid and the payload CRC matches.  An empty payload is
    /// always valid.
    pub fn validate_payload(&self) -> bool {
        if !self.validate_header() {
            return false;
        }
        let payload = self.payload();
        payload.is_empty() || self.buf[3] == crc8(payload)
    }

    /// Total frame length declared by a valid header, or 0 if the header does
    /// not validate.
    pub fn msg_len(&self) -> usize {
        if self.validate_header() {
            self.declared_len()
        } else {
            0
        }
    }

    /// Payload length declared by a valid header, or 0 if the header does not
    /// validate.
    pub fn payload_len(&self) -> usize {
        self.msg_len().saturating_sub(HEADER_LEN)
    }

    /// The payload region implied by the header.  Empty if the header does not
    /// validate, so check [`Self::validate_payload()`] before trusting it.
    pub fn payload(&self) -> &[u8] {
        &self.buf[HEADER_LEN..HEADER_LEN + self.payload_len()]
    }

    /// Whole buffer, including anything beyond the frame.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Whole buffer, including anything beyond the frame.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /// Zero the whole buffer.
    pub fn reset(&mut self) {
        self.buf.fill(0);
    }
}

// Internal functions
impl Frame {
    fn declared_len(&self) -> usize {
        (u16::from_le_bytes([self.buf[0], self.buf[1]]) >> SIZE_SHIFT) as usize
    }

    fn fix_parity(&mut self) {
        self.buf[0] &= !PARITY_BIT;
        self.buf[0] |= parity(self.buf[0]) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn framed(payload: &[u8]) -> Frame {
        let mut frame = Frame::new();
        frame.load(payload).unwrap();
        frame
    }

    #[test]
    fn empty_frame_matches_companion_firmware() {
        let frame = framed(&[]);
        assert_eq!(&frame.as_bytes()[..4], &[0x41, 0x00, 0x4E, 0x00]);
        assert!(frame.validate_header());
        assert!(frame.validate_payload());
        assert_eq!(frame.msg_len(), 4);
        assert!(frame.payload().is_empty());
    }

    #[test]
    fn two_byte_payload() {
        let mut frame = framed(&[0x01, 0x02]);
        assert_eq!(&frame.as_bytes()[..6], &[0x60, 0x00, 0xF5, 0x1B, 0x01, 0x02]);
        assert_eq!(frame.msg_len(), 6);
        assert!(frame.validate_header());
        assert!(frame.validate_payload());

        frame.as_bytes_mut()[3] ^= 0x01;
        assert!(frame.validate_header());
        assert!(!frame.validate_payload());
        assert_eq!(frame.payload(), &[0x01, 0x02]);
    }

    #[test]
    fn oversized_payload_rejected() {
        let mut frame = Frame::new();
        let payload = vec![0u8; MAX_PAYLOAD_LEN + 1];
        assert_eq!(frame.load(&payload), Err(Error::PayloadTooLarge));
    }

    #[test]
    fn largest_payload_fits() {
        let payload = vec![0xA5u8; MAX_PAYLOAD_LEN];
        let frame = framed(&payload);
        assert_eq!(frame.msg_len(), MAX_FRAME_LEN);
        assert!(frame.validate_payload());
        assert_eq!(frame.as_bytes()[MAX_FRAME_LEN], PAD_BYTE);
    }

    #[test]
    fn busy_is_noise_and_pad_is_empty() {
        let mut frame = Frame::new();
        frame.as_bytes_mut()[..4].fill(BUSY_BYTE);
        assert!(!frame.validate_status());
        assert!(frame.status().is_busy());

        // All-pad is a valid, empty, frame
        frame.as_bytes_mut()[..4].fill(PAD_BYTE);
        assert!(frame.validate_status());
        assert!(frame.validate_header());
        assert!(frame.validate_payload());
        assert_eq!(frame.msg_len(), 0);
        assert_eq!(frame.payload_len(), 0);
        assert!(frame.payload().is_empty());
    }

    #[test]
    fn sizes_below_header_rejected() {
        let mut frame = Frame::new();
        for size in 1u16..HEADER_LEN as u16 {
            let [lo, hi] = (size << SIZE_SHIFT).to_le_bytes();
            frame.as_bytes_mut()[0] = lo | parity(lo) as u8;
            frame.as_bytes_mut()[1] = hi;
            frame.as_bytes_mut()[2] = crc8(&frame.as_bytes()[..2]);
            assert!(frame.validate_status());
            assert!(!frame.validate_header(), "size {size}");
            assert_eq!(frame.msg_len(), 0);
        }
    }

    #[test]
    fn write_header_rejects_oversized_length() {
        let mut frame = framed(&[1, 2, 3]);
        assert_eq!(
            frame.write_header(MAX_PAYLOAD_LEN + 1),
            Err(Error::PayloadTooLarge)
        );
        assert_eq!(frame.msg_len(), 7);
        assert!(frame.validate_payload());

        assert_eq!(frame.write_header(1), Ok(()));
        assert_eq!(frame.payload(), &[1]);
        assert!(frame.validate_payload());
    }

    #[test]
    fn reserved_bit_invalidates() {
        let mut frame = framed(&[1, 2, 3]);
        // Keep parity even while setting the reserved bit
        frame.as_bytes_mut()[0] ^= RESERVED_BIT | PARITY_BIT;
        assert!(!frame.validate_status());
        assert!(!frame.validate_header());
    }

    #[test]
    fn set_error_flag_keeps_parity_and_breaks_crc() {
        let mut frame = framed(&[9, 8, 7]);
        let crc = frame.as_bytes()[2];

        frame.set_error_flag(ErrorFlag::Payload);
        assert!(frame.status().payload_error());
        assert!(!frame.status().header_error());
        assert!(frame.validate_status());
        assert!(!frame.validate_header());
        assert_eq!(frame.as_bytes()[2], crc);

        frame.set_error_flag(ErrorFlag::Header);
        assert!(frame.status().header_error());
        assert!(frame.validate_status());

        frame.clear_error_flags();
        assert!(!frame.status().any_error());
        assert!(frame.validate_header());
        assert!(frame.validate_payload());
    }

    #[test]
    fn write_header_preserves_error_flags() {
        let mut frame = framed(&[1, 2]);
        frame.set_error_flag(ErrorFlag::Header);
        frame.load(&[1, 2, 3, 4]).unwrap();
        assert!(frame.status().header_error());
        assert!(!frame.status().payload_error());
        // Reframed with the flag included in the CRC
        assert!(frame.validate_header());
        assert_eq!(frame.msg_len(), 8);
    }

    proptest! {
        #[test]
        fn framing_round_trip(payload in proptest::collection::vec(any::<u8>(), 0..=MAX_PAYLOAD_LEN)) {
            let frame = framed(&payload);
            prop_assert!(frame.validate_header());
            prop_assert!(frame.validate_payload());
            prop_assert_eq!(frame.payload(), &payload[..]);
        }

        #[test]
        fn header_bit_flip_detected(
            payload in proptest::collection::vec(any::<u8>(), 0..64),
            bit in 0usize..24,
        ) {
            let mut frame = framed(&payload);
            frame.as_bytes_mut()[bit / 8] ^= 1 << (bit % 8);
            prop_assert!(!frame.validate_header());
        }
    }
}
