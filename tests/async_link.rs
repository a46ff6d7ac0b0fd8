//! Async driver and client against a simulated Device.

use std::collections::VecDeque;

use board_link::Error;
use board_link::client::{AsyncDelay, AsyncLinkClient, ClientConfig};
use board_link::frame::{BUSY_BYTE, Frame};
use board_link::io::Spi;
use board_link::link::{AsyncLink, LinkConfig, LinkHost, SpiDuplexBus};

/// Device answering with one queued payload per transaction (empty frames
/// once the queue runs dry), busy for the first `busy` transfers.
struct Device {
    replies: VecDeque<Vec<u8>>,
    reply: Frame,
    pos: usize,
    busy: usize,
    transfers: Vec<Vec<u8>>,
}

impl Device {
    fn new(replies: &[&[u8]]) -> Self {
        let mut device = Self {
            replies: replies.iter().map(|r| r.to_vec()).collect(),
            reply: Frame::new(),
            pos: 0,
            busy: 0,
            transfers: Vec::new(),
        };
        device.load_next();
        device
    }

    fn load_next(&mut self) {
        let payload = self.replies.pop_front().unwrap_or_default();
        self.reply.load(&payload).unwrap();
    }

    /// Completed transactions, counted by their status exchange
    fn transactions(&self) -> usize {
        self.transfers.iter().filter(|tx| tx.len() == 1).count()
    }
}

impl Spi for Device {
    type Error = ();

    async fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), ()> {
        self.transfers.push(tx.to_vec());
        if self.busy > 0 {
            self.busy -= 1;
            rx.fill(BUSY_BYTE);
        } else if tx.len() == 1 && rx.len() == 1 {
            // Status exchange - this transaction is over
            rx[0] = self.reply.status().0;
            self.pos = 0;
            self.load_next();
        } else {
            let end = self.pos + rx.len();
            rx.copy_from_slice(&self.reply.as_bytes()[self.pos..end]);
            self.pos = end;
        }
        Ok(())
    }
}

struct Yield;

impl AsyncDelay for Yield {
    async fn delay() {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn busy_device_then_reply() {
    let mut device = Device::new(&[&[0x10, 0x20, 0x30]]);
    device.busy = 3;
    let mut bus = SpiDuplexBus::new(&mut device);
    let mut host = LinkHost::new(LinkConfig::new());
    let mut got = Vec::new();
    let mut link = AsyncLink::new(&mut bus, &mut host, |p: &[u8]| got.extend_from_slice(p));

    link.send(&[0xAB, 0xCD, 0xEF]).await.unwrap();
    assert!(link.ready());
    drop(link);
    drop(bus);

    assert_eq!(got, vec![0x10, 0x20, 0x30]);
    // Four identical exchanges, then one status byte
    assert_eq!(device.transfers.len(), 5);
    assert!(device.transfers[..4].iter().all(|tx| tx == &device.transfers[0]));
    assert_eq!(device.transfers[0].len(), 7);
    assert_eq!(device.transfers[4].len(), 1);
}

#[tokio::test]
async fn spi_error_is_io() {
    struct Broken;

    impl Spi for Broken {
        type Error = &'static str;

        async fn transfer(&mut self, _tx: &[u8], _rx: &mut [u8]) -> Result<(), Self::Error> {
            Err("no clock")
        }
    }

    let mut spi = Broken;
    let mut bus = SpiDuplexBus::new(&mut spi);
    let mut host = LinkHost::new(LinkConfig::new());
    let mut link = AsyncLink::new(&mut bus, &mut host, |_: &[u8]| {});
    assert_eq!(link.poll().await, Err(Error::Io));
    assert!(link.ready());
}

#[tokio::test]
async fn request_polls_for_late_response() {
    let mut device = Device::new(&[&[], &[], &[0x42, 0x43]]);
    let mut bus = SpiDuplexBus::new(&mut device);
    let mut host = LinkHost::new(LinkConfig::new());
    host.init();
    let mut client = AsyncLinkClient::<_, Yield>::new(&mut bus, &mut host, ClientConfig::new());

    let response = client.request(&[0x01]).await.unwrap();
    assert_eq!(response, vec![0x42, 0x43]);
    drop(client);
    drop(bus);

    // Command, then two polls
    assert_eq!(device.transactions(), 3);
}

#[tokio::test]
async fn request_answered_in_same_transaction() {
    let mut device = Device::new(&[&[0x99; 40]]);
    let mut bus = SpiDuplexBus::new(&mut device);
    let mut host = LinkHost::new(LinkConfig::new());
    let mut client = AsyncLinkClient::<_, Yield>::new(&mut bus, &mut host, ClientConfig::new());

    let response = client.request(&[0x01, 0x02]).await.unwrap();
    assert_eq!(response, vec![0x99; 40]);
}

#[tokio::test]
async fn request_times_out() {
    let mut device = Device::new(&[]);
    let mut bus = SpiDuplexBus::new(&mut device);
    let mut host = LinkHost::new(LinkConfig::new());
    let config = ClientConfig { max_polls: 3 };
    let mut client = AsyncLinkClient::<_, Yield>::new(&mut bus, &mut host, config);

    assert_eq!(client.request(&[0x01]).await, Err(Error::Timeout));
    assert_eq!(client.poll().await, Ok(None));
    drop(client);
    drop(bus);

    assert_eq!(device.transactions(), 5);
}
