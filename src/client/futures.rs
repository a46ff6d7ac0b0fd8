//! Asynchronous Client - typically used by a Host.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use alloc::vec::Vec;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::client::ClientConfig;
use crate::link::{AsyncDuplexBus, AsyncLink, LinkHost};
use crate::{Error, Result};

/// Yield delay between polls.
///
/// Application must provide an implementation of this trait in order for the
/// client to be able to yield while waiting for the Device to prepare a
/// response.
///
/// This trait keeps `board-link` free of any specific async runtime.
///
/// Example:
///
/// ```ignore
/// use embassy_time::{Duration, Timer};
/// struct Delay;
/// impl AsyncDelay for Delay {
///     async fn delay() {
///         Timer::after(Duration::from_millis(5)).await;
///     }
/// }
/// ```
pub trait AsyncDelay {
    fn delay() -> impl Future<Output = ()>;
}

/// Async client for command/response exchanges.
///
/// See [`AsyncDelay`] for required delay trait.
///
/// Example usage:
///
/// ```ignore
/// use board_link::client::{AsyncDelay, AsyncLinkClient, ClientConfig};
/// use board_link::link::{LinkConfig, LinkHost, SpiDuplexBus};
///
/// let mut spi = ...; // implement board_link::io::Spi
/// let mut bus = SpiDuplexBus::new(&mut spi);
/// let mut host = LinkHost::new(LinkConfig::new());
/// let mut client = AsyncLinkClient::<_, Delay>::new(&mut bus, &mut host, ClientConfig::new());
/// let command = [0x01, 0x02, 0x03, 0x04];
/// let response = client.request(&command).await?;
/// // Process response...
/// ```
pub struct AsyncLinkClient<'a, B: AsyncDuplexBus, D: AsyncDelay> {
    bus: &'a mut B,
    host: &'a mut LinkHost,
    config: ClientConfig,
    _delay: core::marker::PhantomData<D>,
}

impl<'a, B: AsyncDuplexBus, D: AsyncDelay> AsyncLinkClient<'a, B, D> {
    /// Create a new AsyncLinkClient
    ///
    /// Arguments:
    /// - `bus`: Object implementing [`AsyncDuplexBus`] to clock the link
    /// - `host`: The link state machine and its buffers
    /// - `config`: Configuration for the client
    pub fn new(bus: &'a mut B, host: &'a mut LinkHost, config: ClientConfig) -> Self {
        Self {
            bus,
            host,
            config,
            _delay: core::marker::PhantomData,
        }
    }

    /// Send a command and wait for the Device's response.
    ///
    /// The format of the command and response data is application-specific.
    ///
    /// Returns:
    /// - `Ok(response_data)`: First non-empty payload received from the
    ///   Device
    /// - `Err(Error::Timeout)`: No response within
    ///   [`ClientConfig::max_polls`] polls
    /// - `Err(error)`: Link error during any exchange
    pub async fn request(&mut self, command: &[u8]) -> Result<Vec<u8>> {
        debug!("Starting request ({} bytes)", command.len());

        let max_polls = self.config.max_polls;
        let mut link = AsyncLink::new(&mut *self.bus, &mut *self.host, |_: &[u8]| {});

        // The response may come back in the same transaction
        let response = link.exchange(command).await?;
        if !response.is_empty() {
            debug!("Request completed ({} bytes received)", response.len());
            return Ok(response.to_vec());
        }

        for _ in 0..max_polls {
            D::delay().await;
            let response = link.exchange(&[]).await?;
            if !response.is_empty() {
                debug!("Request completed ({} bytes received)", response.len());
                return Ok(response.to_vec());
            }
        }

        warn!("No response after {max_polls} polls");
        Err(Error::Timeout)
    }

    /// Poll once for a pending Device message.
    pub async fn poll(&mut self) -> Result<Option<Vec<u8>>> {
        let mut link = AsyncLink::new(&mut *self.bus, &mut *self.host, |_: &[u8]| {});
        let response = link.exchange(&[]).await?;
        if response.is_empty() {
            Ok(None)
        } else {
            Ok(Some(response.to_vec()))
        }
    }
}
