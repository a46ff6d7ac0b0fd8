//! Asynchronous link driver - typically used with a DMA driven SPI bus.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use alloc::boxed::Box;
use async_trait::async_trait;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::io::Spi;
use crate::link::{Dispatcher, LinkHost, Step};
use crate::{Error, Result};

/// Trait for the full-duplex transfer primitive.
///
/// Async version of [`crate::link::DuplexBus`].
#[async_trait(?Send)]
pub trait AsyncDuplexBus {
    /// Clock `max(tx.len(), rx.len())` bytes, padding `tx` with
    /// [`crate::frame::PAD_BYTE`] and discarding anything received beyond
    /// `rx`.
    async fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<()>;
}

/// Asynchronous driver, running each transaction to completion.
pub struct AsyncLink<'a, B: AsyncDuplexBus, D: Dispatcher> {
    bus: &'a mut B,
    host: &'a mut LinkHost,
    dispatcher: D,
}

impl<'a, B: AsyncDuplexBus, D: Dispatcher> AsyncLink<'a, B, D> {
    /// Create new driver.
    ///
    /// Calls [`LinkHost::init()`] on `host` if it is neither initialized nor
    /// in flight, so sends through the driver never see
    /// [`crate::Error::NotReady`].  A `host` that is already initialized is
    /// left as is, keeping any peer size it has learned.
    ///
    /// Arguments:
    /// - `bus` - Object implementing [`AsyncDuplexBus`] to clock the link
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
    pub async fn send(&mut self, payload: &[u8]) -> Result<()> {
        let len = self.exchange(payload).await?.len();
        if len > 0 {
            self.dispatcher.dispatch(self.host.received());
        }
        Ok(())
    }

    /// Send an empty message, dispatching any payload the Device had pending.
    pub async fn poll(&mut self) -> Result<()> {
        self.send(&[]).await
    }

    /// Send `payload` and return the payload received in return, without
    /// dispatching it.
    pub async fn exchange(&mut self, payload: &[u8]) -> Result<&[u8]> {
        self.host.send(payload)?;
        self.run().await?;
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
impl<B: AsyncDuplexBus, D: Dispatcher> AsyncLink<'_, B, D> {
    async fn run(&mut self) -> Result<()> {
        loop {
            let (tx, rx) = self.host.buffers();
            if let Err(e) = self.bus.transfer(tx, rx).await {
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

/// Async SPI bus type, adapting an [`Spi`] implementation.
pub struct SpiDuplexBus<'a, S: Spi> {
    spi: &'a mut S,
}

impl<'a, S: Spi> SpiDuplexBus<'a, S> {
    /// Create new instance
    pub fn new(spi: &'a mut S) -> Self {
        Self { spi }
    }
}

#[async_trait(?Send)]
impl<S: Spi> AsyncDuplexBus for SpiDuplexBus<'_, S> {
    async fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<()> {
        self.spi.transfer(tx, rx).await.map_err(|e| {
            debug!("SPI error: {e:?}");
            Error::Io
        })
    }
}
