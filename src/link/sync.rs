//! Synchronous link driver - for a blocking SPI bus.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::link::{Dispatcher, LinkHost, Step};
use crate::Result;

/// Trait for the full-duplex transfer primitive.
///
/// Sync version, typically a blocking SPI peripheral.
pub trait DuplexBus {
    /// Clock `max(tx.len(), rx.len())` bytes.
    ///
    /// Transmit `tx`, then [`crate::frame::PAD_BYTE`] for any remaining bytes.
    /// Received bytes fill `rx`, and any beyond its length are discarded.
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<()>;
}

/// Synchronous driver, running each transaction to completion.
///
/// Delivered, non-empty, payloads are handed to the dispatcher.
pub struct Link<'a, B: DuplexBus, D: Dispatcher> {
    bus: &'a mut B,
    host: &'a mut LinkHost,
    dispatcher: D,
}

impl<'a, B: DuplexBus, D: Dispatcher> Link<'a, B, D> {
    /// Create new driver.
    ///
    /// Calls [`LinkHost::init()`] on `host` if it is neither initialized nor
    /// in flight, so sends through the driver never see
    /// [`crate::Error::NotReady`].  A `host` that is already initialized is
    /// left as is, keeping any peer size it has learned.
    ///
    /// Arguments:
    /// - `bus` - Object implementing [`DuplexBus`] to clock the link
    /// - `host` - The link state machine and its buffers
    /// - `dispatcher` - Consumer of delivered payloads
    pub fn new(bus: &'a mut B, host: &'a mut LinkHost, dispatcher: D) -> Self {
        if !host.ready() && !host.in_flight() {
            host.init();
        }
        Self {
            bus,
            host,
            dispatcher,
        }
    }

    /// Send `payload`, dispatching any payload received in return.
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        let len = self.exchange(payload)?.len();
        if len > 0 {
            self.dispatcher.dispatch(self.host.received());
        }
        Ok(())
    }

    /// Send an empty message, dispatching any payload the Device had pending.
    pub fn poll(&mut self) -> Result<()> {
        self.send(&[])
    }

    /// Send `payload` and return the payload received in return, without
    /// dispatching it.
    pub fn exchange(&mut self, payload: &[u8]) -> Result<&[u8]> {
        self.host.send(payload)?;
        self.run()?;
        Ok(self.host.received())
    }

    /// Ready to send
    pub fn ready(&self) -> bool {
        self.host.ready()
    }

    /// Release the bus, host and dispatcher.
    pub fn into_inner(self) -> (&'a mut B, &'a mut LinkHost, D) {
        (self.bus, self.host, self.dispatcher)
    }
}

// Internal functions
impl<B: DuplexBus, D: Dispatcher> Link<'_, B, D> {
    fn run(&mut self) -> Result<()> {
        loop {
            let (tx, rx) = self.host.buffers();
            if let Err(e) = self.bus.transfer(tx, rx) {
                warn!("Transfer failed: {e:?}");
                self.host.abort();
                return Err(e);
            }
            match self.host.complete()? {
                Step::Transfer(_) => continue,
                Step::Delivered => return Ok(()),
            }
        }
    }
}
