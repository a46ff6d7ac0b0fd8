//! Async SPI trait for clocking the link.
//!
//! This module contains the raw full-duplex transfer primitive the async
//! driver is built on.  Implement it over your HAL's SPI controller (for
//! example an embassy `Spi` in DMA mode), and wrap it in
//! [`crate::link::SpiDuplexBus`] to use it with [`crate::link::AsyncLink`].
//!
//! # Bus configuration
//!
//! Both boards must agree on the wire settings.  The existing boards use
//! SPI mode 1, 8 MHz, LSb first, with the controller's over-read character
//! set to [`crate::frame::PAD_BYTE`].

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

/// Full-duplex SPI controller trait.
pub trait Spi {
    /// The error type returned by transfers.
    ///
    /// This allows implementations to use their own error types
    /// (e.g. a HAL's SPI error, or `std::io::Error` for a simulated link).
    type Error: core::fmt::Debug;

    /// Clock `max(tx.len(), rx.len())` bytes with chip select asserted.
    ///
    /// # Arguments
    ///
    /// * `tx` - Bytes to transmit.  Clock the pad byte once exhausted.
    /// * `rx` - Buffer for received bytes.  Discard any received beyond its
    ///   length.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying transfer fails.  The link abandons
    /// the transaction in progress.
    fn transfer(
        &mut self,
        tx: &[u8],
        rx: &mut [u8],
    ) -> impl core::future::Future<Output = Result<(), Self::Error>>;
}
