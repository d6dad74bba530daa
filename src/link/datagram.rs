//! Connectionless peer-to-peer link carrying one fixed-size record per frame.

use portable_atomic::{AtomicBool, AtomicU32, Ordering};

use super::{LinkError, WirePacket};
use crate::ipc::Producer;

/// Radio MAC address of a datagram peer.
pub type PeerAddress = [u8; 6];

/// Radio that can address single peers.
pub trait DatagramRadio {
    fn bring_up(&mut self) -> Result<(), LinkError>;

    fn add_peer(&mut self, peer: &PeerAddress) -> Result<(), LinkError>;

    fn transmit(&mut self, peer: &PeerAddress, data: &[u8]) -> Result<(), LinkError>;
}

pub struct DatagramLink<R> {
    radio: R,
    initialized: AtomicBool,
    peer: Option<PeerAddress>,
}

impl<R: DatagramRadio> DatagramLink<R> {
    pub const fn new(radio: R) -> Self {
        Self {
            radio,
            initialized: AtomicBool::new(false),
            peer: None,
        }
    }

    pub fn is_started(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn peer(&self) -> Option<&PeerAddress> {
        self.peer.as_ref()
    }

    /// Brings the radio up once. Enough for a node that only receives.
    pub fn start(&mut self) -> Result<(), LinkError> {
        if self
            .initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        if let Err(e) = self.radio.bring_up() {
            self.initialized.store(false, Ordering::Release);
            error!("datagram radio bring-up failed: {:?}", e);
            return Err(LinkError::InitFailed);
        }
        info!("datagram radio up");
        Ok(())
    }

    /// Starts the radio and registers `peer` as the send target. Repeating the
    /// call with the same peer does nothing; a different peer replaces it.
    pub fn begin(&mut self, peer: PeerAddress) -> Result<(), LinkError> {
        self.start()?;

        if self.peer == Some(peer) {
            return Ok(());
        }
        self.radio.add_peer(&peer).map_err(|_| LinkError::InitFailed)?;
        self.peer = Some(peer);
        info!(
            "datagram peer {:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            peer[0], peer[1], peer[2], peer[3], peer[4], peer[5]
        );
        Ok(())
    }

    pub fn send<P: WirePacket>(&mut self, packet: &P) -> Result<(), LinkError> {
        if !self.is_started() {
            return Err(LinkError::NotStarted);
        }
        let peer = self.peer.ok_or(LinkError::NotStarted)?;
        self.radio
            .transmit(&peer, packet.as_bytes())
            .map_err(|_| LinkError::SendFailed)
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }
}

/// Receive-side counters, shared with whoever reports them.
#[derive(Debug, Default)]
pub struct LinkStats {
    accepted: AtomicU32,
    malformed: AtomicU32,
}

impl LinkStats {
    pub const fn new() -> Self {
        Self {
            accepted: AtomicU32::new(0),
            malformed: AtomicU32::new(0),
        }
    }

    pub fn accepted(&self) -> u32 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn malformed(&self) -> u32 {
        self.malformed.load(Ordering::Relaxed)
    }
}

/// Receive callback side of a datagram link: validates frames and hands
/// records to the main loop through a mailbox.
pub struct DatagramInbox<'a, P: WirePacket> {
    producer: Producer<'a, P>,
    stats: &'a LinkStats,
}

impl<'a, P: WirePacket> DatagramInbox<'a, P> {
    pub fn new(producer: Producer<'a, P>, stats: &'a LinkStats) -> Self {
        Self { producer, stats }
    }

    /// Returns whether the frame was accepted. Frames of the wrong length are
    /// dropped whole and counted.
    pub fn on_receive(&mut self, sender: &PeerAddress, bytes: &[u8]) -> bool {
        match P::from_frame(bytes) {
            Ok(record) => {
                self.producer.write(record);
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => {
                self.stats.malformed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "dropped {}-byte frame from {:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}, want {}",
                    bytes.len(),
                    sender[0],
                    sender[1],
                    sender[2],
                    sender[3],
                    sender[4],
                    sender[5],
                    P::SIZE
                );
                false
            }
        }
    }
}
