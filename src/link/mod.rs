//! Host side of the board-to-board link - transaction state machine, send
//! gate and drivers.
//!
//! See [`crate`] for a description of the protocol.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#[cfg(feature = "async")]
pub mod futures;
pub mod host;
pub mod sync;

#[cfg(feature = "async")]
pub use futures::{AsyncDuplexBus, AsyncLink, SpiDuplexBus};
pub use host::{LinkHost, reconcile};
pub use sync::{DuplexBus, Link};

/// Where the Host is within a transaction.
///
/// The `Exchange`, `ContinueRx` and `StatusExchange` variants carry the
/// dimensions of the transfer currently being clocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No transaction pending
    Idle,
    /// Clock the Host's frame, receiving `rx_len` bytes from offset 0
    Exchange { tx_len: usize, rx_len: usize },
    /// Peer declared a longer frame than was clocked - receive the shortfall
    /// plus one trailing byte at `offset`
    ContinueRx {
        tx_len: usize,
        offset: usize,
        len: usize,
    },
    /// Swap one status byte each way
    StatusExchange,
}

impl LinkState {
    /// The transfer this state clocks, if any.
    pub fn transfer(&self) -> Option<Xfer> {
        match *self {
            LinkState::Idle => None,
            LinkState::Exchange { tx_len, rx_len } => Some(Xfer::Frame {
                tx_len,
                rx_offset: 0,
                rx_len,
            }),
            LinkState::ContinueRx {
                tx_len,
                offset,
                len,
            } => Some(Xfer::Frame {
                tx_len,
                rx_offset: offset,
                rx_len: len,
            }),
            LinkState::StatusExchange => Some(Xfer::Status),
        }
    }
}

/// A single duplex transfer.  The number of bytes clocked is the larger of the
/// transmit and receive lengths; the bus pads the transmit side with
/// [`crate::frame::PAD_BYTE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Xfer {
    /// Transmit the start of the outbound frame, receive into the inbound
    /// frame at `rx_offset`
    Frame {
        tx_len: usize,
        rx_offset: usize,
        rx_len: usize,
    },
    /// Transmit the outbound status byte, receive the peer's status byte
    Status,
}

impl Xfer {
    /// Number of bytes clocked in each direction.
    pub fn clocked(&self) -> usize {
        match *self {
            Xfer::Frame { tx_len, rx_len, .. } => tx_len.max(rx_len),
            Xfer::Status => 1,
        }
    }
}

/// What to do after a transfer completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Issue this transfer next
    Transfer(Xfer),
    /// Both sides agree the exchange succeeded.  The received payload is
    /// available from [`LinkHost::received()`] and the gate is idle again.
    ///
    /// [`LinkHost`] does not dispatch.  Interrupt-driven callers must pass a
    /// non-empty `received()` to their [`Dispatcher`] themselves, before the
    /// next send.  [`Link`] and `AsyncLink` do this for theirs.
    Delivered,
}

/// Outcome of comparing the status byte the Host sent against the one it
/// received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Host reported a header error - the peer's state is unknown, so start
    /// over with a full exchange
    Restart,
    /// Re-receive the peer's frame and/or resend the Host's own
    Retransmit {
        resend_own: bool,
        rereceive_peer: bool,
    },
    /// Neither side reported an error
    Delivered,
}

/// Limits on how long a transaction may spin before it is abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    /// Consecutive busy repeats of one transfer before giving up with
    /// [`crate::Error::Timeout`]
    pub max_busy_retries: u32,
    /// Restarts and retransmits within one transaction before giving up with
    /// [`crate::Error::LinkFailure`]
    pub max_recoveries: u32,
}

impl LinkConfig {
    pub const DEFAULT_MAX_BUSY_RETRIES: u32 = 1024;
    pub const DEFAULT_MAX_RECOVERIES: u32 = 16;

    pub const fn new() -> Self {
        Self {
            max_busy_retries: Self::DEFAULT_MAX_BUSY_RETRIES,
            max_recoveries: Self::DEFAULT_MAX_RECOVERIES,
        }
    }

    pub const fn with_max_busy_retries(mut self, max: u32) -> Self {
        self.max_busy_retries = max;
        self
    }

    pub const fn with_max_recoveries(mut self, max: u32) -> Self {
        self.max_recoveries = max;
        self
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer of delivered payloads.
///
/// Called from whatever context completes the transaction - often an
/// interrupt handler - so it must not block.
pub trait Dispatcher {
    fn dispatch(&mut self, payload: &[u8]);
}

impl<F: FnMut(&[u8])> Dispatcher for F {
    fn dispatch(&mut self, payload: &[u8]) {
        self(payload)
    }
}
