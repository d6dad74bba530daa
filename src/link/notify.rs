//! Connection-oriented notification link: one central subscribed to one
//! characteristic that carries the latest record.

use portable_atomic::{AtomicBool, AtomicU32, Ordering};

use super::{LinkError, WirePacket};

/// Peripheral-role stack exposing a single notify characteristic.
pub trait NotifyStack {
    /// Start the stack and register the service. Called once per link.
    fn start(&mut self) -> Result<(), LinkError>;

    fn start_advertising(&mut self) -> Result<(), LinkError>;

    /// Set the characteristic value and notify the subscriber.
    fn publish(&mut self, data: &[u8]) -> Result<(), LinkError>;
}

/// Connection flags written by the stack's event callbacks and read by the
/// main loop.
#[derive(Debug, Default)]
pub struct ConnectionState {
    connected: AtomicBool,
    readvertise: AtomicBool,
    connections: AtomicU32,
}

impl ConnectionState {
    pub const fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            readvertise: AtomicBool::new(false),
            connections: AtomicU32::new(0),
        }
    }

    /// A new connection supersedes any re-advertise request still pending
    /// from an earlier disconnect.
    pub fn on_connect(&self) {
        self.readvertise.store(false, Ordering::Release);
        self.connected.store(true, Ordering::Release);
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Advertising stops when a central connects, so losing it means
    /// advertising has to be armed again.
    pub fn on_disconnect(&self) {
        self.connected.store(false, Ordering::Release);
        self.readvertise.store(true, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Number of connections seen since boot.
    pub fn connections(&self) -> u32 {
        self.connections.load(Ordering::Relaxed)
    }

    fn take_readvertise(&self) -> bool {
        self.readvertise.swap(false, Ordering::AcqRel)
    }
}

pub struct NotificationLink<'a, S> {
    stack: S,
    state: &'a ConnectionState,
    started: bool,
}

impl<'a, S: NotifyStack> NotificationLink<'a, S> {
    pub fn new(stack: S, state: &'a ConnectionState) -> Self {
        Self {
            stack,
            state,
            started: false,
        }
    }

    /// Starts the stack and arms advertising. Later calls do nothing.
    pub fn begin(&mut self) -> Result<(), LinkError> {
        if self.started {
            return Ok(());
        }
        self.stack.start().map_err(|_| LinkError::InitFailed)?;
        self.stack
            .start_advertising()
            .map_err(|_| LinkError::InitFailed)?;
        self.started = true;
        info!("notification link advertising");
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Re-arms advertising after a disconnect. A failed re-arm is retried on
    /// the next call.
    pub fn poll(&mut self) -> Result<(), LinkError> {
        if !self.started || !self.state.take_readvertise() {
            return Ok(());
        }
        if let Err(e) = self.stack.start_advertising() {
            // put the request back so the next poll tries again
            self.state.readvertise.store(true, Ordering::Release);
            warn!("re-advertising failed: {:?}", e);
            return Err(LinkError::SendFailed);
        }
        info!("central disconnected, advertising again");
        Ok(())
    }

    /// Publishes `packet` if a central is connected. `Ok(false)` means nobody
    /// was listening and nothing was sent. A failed re-arm of advertising
    /// stays queued for the next call and never blocks the publish.
    pub fn notify<P: WirePacket>(&mut self, packet: &P) -> Result<bool, LinkError> {
        if !self.started {
            return Err(LinkError::NotStarted);
        }
        let _ = self.poll();
        if !self.state.is_connected() {
            return Ok(false);
        }
        self.stack
            .publish(packet.as_bytes())
            .map_err(|_| LinkError::SendFailed)?;
        Ok(true)
    }

    pub fn stack(&self) -> &S {
        &self.stack
    }

    pub fn state(&self) -> &'a ConnectionState {
        self.state
    }
}
