//! Reliable messaging between two boards over a synchronous, full-duplex SPI
//! link.
//!
//! One board is always the Host (SPI controller) and clocks every byte.  The
//! other is the Device (SPI peripheral) and can only answer with whatever it
//! has loaded when the Host clocks it.  Bytes can be dropped or corrupted, and
//! the Device is not always ready with a reply, so this crate layers framing,
//! integrity checking and a retry protocol on top of raw byte clocking.
//!
//! `no_std`.  Requires `alloc` for the async driver and client, typically used
//! on the Host side.
//!
//! ## Architecture
//!
//! Every transaction exchanges exactly one outbound frame and at most one
//! inbound frame.  Each frame is a 4 byte header followed by a payload:
//!
//! ```text
//! byte 0, bit 0:      parity bit (even parity over byte 0)
//! byte 0, bit 1:      header-error flag
//! byte 0, bit 2:      payload-error flag
//! byte 0, bit 3:      reserved, 0
//! bytes 0-1, 4-15:    total frame size (header + payload), Uint12LE
//! byte 2:             CRC-8 over bytes 0-1
//! byte 3:             CRC-8 over the payload
//! bytes 4-N:          payload
//! ```
//!
//! A Device with nothing new to send answers with busy bytes (`0xFF`).  Either
//! side fills bytes beyond its own frame with pad bytes (`0x00`).
//!
//! The Host clocks its complete frame, receiving the start of the Device's frame
//! at the same time.  If the Device's frame is longer, the Host clocks the
//! remainder plus one trailing byte.  Both sides then swap a single status byte
//! carrying the error flags they raised against the frame they received, and
//! each reaches the same decision - delivered, resend, re-receive or restart -
//! from the flags it can see.  There is no separate acknowledgement channel.
//!
//! ## Modules
//!
//! - [`codec`] - CRC-8 and parity primitives shared by both boards
//! - [`frame`] - Frame header construction and validation
//! - [`link`] - The Host transaction state machine, send gate and drivers
//! - [`io`] - Async SPI trait, for plugging a HAL's duplex transfer into the
//!   async driver
//! - [`client`] - Request/poll client built on the async driver
//!
//! ## Getting Started
//!
//! For interrupt-driven firmware, own a [`link::LinkHost`] and:
//! 1. Call [`link::LinkHost::init()`] once the SPI peripheral is configured
//! 2. Call [`link::LinkHost::send()`] to admit a payload
//! 3. Start a DMA transfer over the slices from [`link::LinkHost::buffers()`]
//! 4. In the transfer-complete handler call [`link::LinkHost::complete()`] and
//!    either start the next transfer or, on [`link::Step::Delivered`], hand
//!    [`link::LinkHost::received()`] to your dispatcher
//!
//! For blocking or async code, implement [`link::DuplexBus`] or
//! [`link::AsyncDuplexBus`] (or [`io::Spi`]) and use [`link::Link`] or
//! [`link::AsyncLink`], which run the same state machine to completion.
//!
//! Periodically send an empty message with `poll()` - the Device can never
//! start a transfer itself, so this is how its messages reach the Host.
//!
//! ## Features
//!
//! Default features:
//! - `async` - Enable the async driver and client (requires `alloc`).
//!
//! Compile with `--no-default-features` for a target with no async executor.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#![no_std]

#[cfg(feature = "async")]
extern crate alloc;

#[cfg(test)]
#[macro_use]
extern crate std;

#[cfg(feature = "async")]
pub mod client;
pub mod codec;
pub mod frame;
#[cfg(feature = "async")]
pub mod io;
pub mod link;

/// Link errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A transaction is already in flight
    Busy,
    /// Payload too large for a frame
    PayloadTooLarge,
    /// Link has not been initialized
    NotReady,
    /// Invalid operation for the current link state
    InvalidOperation,
    /// Underlying bus error
    Io,
    /// Peer stayed busy for too many consecutive transfers, or the client
    /// gave up waiting for a response
    Timeout,
    /// Peer could not be brought to agreement within the recovery limit
    LinkFailure,
}

/// Type to represent the result of a link operation
pub type Result<T> = core::result::Result<T, Error>;
