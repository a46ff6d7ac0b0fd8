//! Host transaction state machine and send gate.
//!
//! [`LinkHost`] owns both frame buffers for the lifetime of the link.  Each
//! transfer it asks for is described by [`LinkHost::buffers()`], and once the
//! bus has clocked it, [`LinkHost::complete()`] evaluates what arrived and
//! decides the next transfer.  That is the only way the state advances, so the
//! buffers can never be touched by anything else mid-transaction.
//!
//! In interrupt-driven firmware, keep the `LinkHost` in a critical-section
//! protected cell and call `complete()` from the SPI transfer-complete handler.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::frame::{
    BUSY_BYTE, ErrorFlag, Frame, HEADER_LEN, MAX_PAYLOAD_LEN, PAD_BYTE, Status,
};
use crate::link::{LinkConfig, LinkState, Reconciliation, Step, Xfer};
use crate::{Error, Result};

/// Decide the outcome of a status exchange from the status byte the Host
/// sent and the one it received.
///
/// The Device runs the mirror of this on its own view, so both sides land on
/// the same outcome.
pub fn reconcile(sent: Status, received: Status) -> Reconciliation {
    if sent.header_error() {
        return Reconciliation::Restart;
    }

    let rereceive_peer = sent.payload_error();
    let resend_own = received.any_error();
    if rereceive_peer || resend_own {
        Reconciliation::Retransmit {
            resend_own,
            rereceive_peer,
        }
    } else {
        Reconciliation::Delivered
    }
}

/// Host end of the link.
pub struct LinkHost {
    config: LinkConfig,
    state: LinkState,
    initialized: bool,
    delivered: bool,
    tx: Frame,
    rx: Frame,
    peer_status: u8,
    own_len: usize,
    peer_len_hint: usize,
    busy_retries: u32,
    recoveries: u32,
}

impl LinkHost {
    /// Create a new, uninitialized, link.
    ///
    /// `const` so it can live in a `static`:
    ///
    /// ```rust
    /// use board_link::link::{LinkConfig, LinkHost};
    /// static mut LINK: LinkHost = LinkHost::new(LinkConfig::new());
    /// ```
    pub const fn new(config: LinkConfig) -> Self {
        Self {
            config,
            state: LinkState::Idle,
            initialized: false,
            delivered: false,
            tx: Frame::new(),
            rx: Frame::new(),
            peer_status: 0,
            own_len: 0,
            peer_len_hint: 0,
            busy_retries: 0,
            recoveries: 0,
        }
    }

    /// Clear both buffers and open the send gate.  Call once the bus is
    /// configured.
    pub fn init(&mut self) {
        self.tx.reset();
        self.rx.reset();
        self.peer_status = 0;
        self.own_len = 0;
        self.peer_len_hint = 0;
        self.state = LinkState::Idle;
        self.delivered = false;
        self.busy_retries = 0;
        self.recoveries = 0;
        self.initialized = true;
        info!("Link initialized");
    }

    /// Admit `payload` and start a transaction.
    ///
    /// On success the first transfer is available from [`Self::buffers()`].
    ///
    /// Returns:
    /// - `Err(Error::NotReady)` if [`Self::init()`] has not been called
    /// - `Err(Error::PayloadTooLarge)` if `payload` exceeds
    ///   [`MAX_PAYLOAD_LEN`]
    /// - `Err(Error::Busy)` if a transaction is in flight.  Its buffers are
    ///   left untouched - callers wanting best-effort delivery must retry
    ///   later themselves.
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        if !self.initialized {
            return Err(Error::NotReady);
        }
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(Error::PayloadTooLarge);
        }
        if self.in_flight() {
            return Err(Error::Busy);
        }

        // A fresh send never carries a stale error report
        self.tx.clear_error_flags();
        self.own_len = self.tx.load(payload)?;
        self.delivered = false;
        self.recoveries = 0;

        let rx_len = self.own_len.max(self.peer_len_hint);
        if !payload.is_empty() {
            debug!("Sending {} byte payload", payload.len());
        }
        self.issue(LinkState::Exchange {
            tx_len: self.own_len,
            rx_len,
        })?;
        Ok(())
    }

    /// Send an empty message to pull any pending message from the Device,
    /// which cannot start a transfer itself.
    pub fn poll(&mut self) -> Result<()> {
        self.send(&[])
    }

    /// Transmit and receive buffers for the current transfer.  Both are empty
    /// when idle.
    ///
    /// The transmit slice may be shorter than the receive slice, in which case
    /// the bus must clock [`PAD_BYTE`] for the remainder.  Bytes received
    /// beyond the receive slice are discarded.
    pub fn buffers(&mut self) -> (&[u8], &mut [u8]) {
        match self.state.transfer() {
            None => (Default::default(), Default::default()),
            Some(Xfer::Frame {
                tx_len,
                rx_offset,
                rx_len,
            }) => (
                &self.tx.as_bytes()[..tx_len],
                &mut self.rx.as_bytes_mut()[rx_offset..rx_offset + rx_len],
            ),
            Some(Xfer::Status) => (
                &self.tx.as_bytes()[..1],
                core::slice::from_mut(&mut self.peer_status),
            ),
        }
    }

    /// Evaluate the transfer the bus just clocked and decide what happens
    /// next.
    ///
    /// Returns:
    /// - `Ok(Step::Transfer(_))` - issue the transfer now in
    ///   [`Self::buffers()`]
    /// - `Ok(Step::Delivered)` - transaction complete, payload in
    ///   [`Self::received()`]
    /// - `Err(Error::Timeout)` / `Err(Error::LinkFailure)` - retry limits
    ///   exceeded; the transaction has been abandoned and the gate is idle
    /// - `Err(Error::InvalidOperation)` - no transaction was in flight
    pub fn complete(&mut self) -> Result<Step> {
        if !self.is_idle_poll() {
            trace!("Completed {:?}", self.state);
        }

        match self.state {
            LinkState::Idle => Err(Error::InvalidOperation),
            LinkState::Exchange { rx_len, .. } => self.exchange_done(rx_len),
            LinkState::ContinueRx { offset, len, .. } => self.continue_rx_done(offset, len),
            LinkState::StatusExchange => self.status_done(),
        }
    }

    /// Payload delivered by the last completed transaction.  Empty if the
    /// peer sent nothing, or no transaction has completed since the last
    /// send.
    pub fn received(&self) -> &[u8] {
        if self.delivered {
            self.rx.payload()
        } else {
            &[]
        }
    }

    /// Abandon any transaction in flight and return the gate to idle.
    ///
    /// The last peer frame size seen is kept, so the next transaction clocks
    /// enough bytes for it.
    pub fn abort(&mut self) {
        if self.in_flight() {
            warn!("Aborting transaction in {:?}", self.state);
        }
        self.state = LinkState::Idle;
        self.tx.clear_error_flags();
        self.delivered = false;
        self.busy_retries = 0;
        self.recoveries = 0;
    }

    /// True when a send would be admitted.
    pub fn ready(&self) -> bool {
        self.initialized && !self.in_flight()
    }

    /// True while a transaction is in flight.
    pub fn in_flight(&self) -> bool {
        self.state != LinkState::Idle
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// The transfer currently awaiting the bus, if any.
    pub fn transfer(&self) -> Option<Xfer> {
        self.state.transfer()
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Outbound frame, as last framed and flagged.
    pub fn outbound(&self) -> &Frame {
        &self.tx
    }

    /// Inbound frame, as last received.
    pub fn inbound(&self) -> &Frame {
        &self.rx
    }
}

// Internal functions
impl LinkHost {
    fn exchange_done(&mut self, rx_len: usize) -> Result<Step> {
        if rx_len == 0 {
            // Resend only - the peer's frame from the previous exchange stands
            return self.begin_status();
        }

        let status = self.rx.status();
        if !status.is_valid() {
            if status.is_busy() {
                return self.repeat();
            }
            debug!("Bad first header byte: {:#04X}", status.0);
            return self.report_header_error();
        }
        if !self.rx.validate_header() {
            debug!(
                "Bad CRC ({:#04X}) for header: {:02X?}",
                self.rx.as_bytes()[2],
                &self.rx.as_bytes()[..2]
            );
            return self.report_header_error();
        }

        let msg_len = self.rx.msg_len();
        self.peer_len_hint = msg_len;
        if msg_len > rx_len {
            // One extra byte, which should be padding, shows up a busy peer
            let len = msg_len - rx_len + 1;
            trace!("Partial message received, awaiting {len} more bytes");
            return self.issue(LinkState::ContinueRx {
                tx_len: len.min(self.own_len),
                offset: rx_len,
                len,
            });
        }

        self.check_payload();
        self.begin_status()
    }

    fn continue_rx_done(&mut self, offset: usize, len: usize) -> Result<Step> {
        if self.rx.as_bytes()[offset + len - 1] == BUSY_BYTE {
            return self.repeat();
        }

        self.check_payload();
        self.begin_status()
    }

    fn status_done(&mut self) -> Result<Step> {
        let received = Status(self.peer_status);
        if received.is_busy() {
            return self.repeat();
        }

        match reconcile(self.tx.status(), received) {
            Reconciliation::Restart => {
                // Impossible to know the peer's state, so start over sized to
                // the one frame both sides know was clocked
                debug!("Reported header error, reset transfer");
                self.recover()?;
                self.tx.clear_error_flags();
                self.issue(LinkState::Exchange {
                    tx_len: self.own_len,
                    rx_len: self.own_len,
                })
            }
            Reconciliation::Retransmit {
                resend_own,
                rereceive_peer,
            } => {
                self.recover()?;
                let mut rx_len = 0;
                if rereceive_peer {
                    rx_len = self.rx.msg_len();
                    debug!("Payload CRC error, valid header; re-receive {rx_len} bytes");
                    self.tx.clear_error_flags();
                }
                let mut tx_len = 0;
                if resend_own {
                    tx_len = self.own_len;
                    debug!("Peer reported error {:#04X}, resend {tx_len} bytes", received.0);
                }
                self.issue(LinkState::Exchange { tx_len, rx_len })
            }
            Reconciliation::Delivered => {
                self.state = LinkState::Idle;
                self.delivered = true;
                self.peer_len_hint = 0;
                if self.rx.payload_len() > 0 {
                    debug!("Received {} byte payload", self.rx.payload_len());
                }
                Ok(Step::Delivered)
            }
        }
    }

    fn report_header_error(&mut self) -> Result<Step> {
        self.tx.set_error_flag(ErrorFlag::Header);
        self.begin_status()
    }

    fn check_payload(&mut self) {
        if !self.rx.validate_payload() {
            debug!(
                "Bad CRC ({:#04X}) for {} byte payload",
                self.rx.as_bytes()[3],
                self.rx.payload_len()
            );
            self.tx.set_error_flag(ErrorFlag::Payload);
        }
    }

    fn begin_status(&mut self) -> Result<Step> {
        self.issue(LinkState::StatusExchange)
    }

    fn issue(&mut self, state: LinkState) -> Result<Step> {
        self.state = state;
        self.busy_retries = 0;
        self.current()
    }

    fn current(&self) -> Result<Step> {
        self.state
            .transfer()
            .map(Step::Transfer)
            .ok_or(Error::InvalidOperation)
    }

    fn repeat(&mut self) -> Result<Step> {
        self.busy_retries += 1;
        let max = self.config.max_busy_retries;
        if self.busy_retries > max {
            error!("Peer busy for {max} consecutive transfers, abandoning transaction");
            self.abort();
            return Err(Error::Timeout);
        }
        if max >= 2 && self.busy_retries == max / 2 {
            warn!("Peer busy for {} consecutive transfers", self.busy_retries);
        }
        self.current()
    }

    fn recover(&mut self) -> Result<()> {
        self.recoveries += 1;
        let max = self.config.max_recoveries;
        if self.recoveries > max {
            error!("No agreement with peer after {max} recoveries, abandoning transaction");
            self.abort();
            return Err(Error::LinkFailure);
        }
        if max >= 2 && self.recoveries == max / 2 {
            warn!("{} recoveries in this transaction", self.recoveries);
        }
        Ok(())
    }

    // An empty frame answered only by busy or pad bytes.  Happens constantly
    // while polling, so is kept out of the logs.
    fn is_idle_poll(&self) -> bool {
        if self.own_len != HEADER_LEN || self.tx.status().any_error() {
            return false;
        }
        let rx = match self.state {
            LinkState::Exchange { rx_len, .. } => &self.rx.as_bytes()[..rx_len],
            LinkState::StatusExchange => core::slice::from_ref(&self.peer_status),
            _ => return false,
        };
        rx.iter().all(|&b| b == BUSY_BYTE) || rx.iter().all(|&b| b == PAD_BYTE)
    }
}
