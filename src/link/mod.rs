pub mod bridge;
pub mod datagram;
pub mod notify;
pub mod packet;

pub use datagram::{DatagramInbox, DatagramLink, DatagramRadio, LinkStats, PeerAddress};
pub use notify::{ConnectionState, NotificationLink, NotifyStack};
pub use packet::{SensorPacket, ThreePhaseCurrentPacket, WirePacket};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError {
    /// Radio or stack bring-up failed; `begin` may be called again.
    InitFailed,
    /// Send attempted before a successful `begin`.
    NotStarted,
    SendFailed,
    /// Frame length or kind did not match what the receiver expects.
    MalformedFrame,
    ChecksumMismatch,
}
