//! UART framing to the radio coprocessor.
//!
//! ```text
//! 0xAA 0x55 | kind | len | payload[len] | crc_lo crc_hi
//! ```
//!
//! The CRC is CRC-16/CCITT-FALSE over everything before it, stored
//! little-endian. Both radios (datagram and notification) share one UART, so
//! the host-side transports here only ever produce frames and hand them to a
//! [`FrameSink`].
//!
//! The decoder does not backtrack: a stray `0xAA 0x55` in line noise followed
//! by a large length byte swallows up to a full frame of real traffic before
//! the CRC rejects it. Those bytes are not rescanned for a header.

use crc16::{State, CCITT_FALSE};
use heapless::Vec;

use super::datagram::{DatagramRadio, PeerAddress};
use super::notify::NotifyStack;
use super::LinkError;

pub const HEADER: [u8; 2] = [0xAA, 0x55];
pub const MAX_PAYLOAD: usize = 248;
const OVERHEAD: usize = HEADER.len() + 2 + 2;
pub const MAX_FRAME: usize = MAX_PAYLOAD + OVERHEAD;

const PEER_LEN: usize = 6;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameKind {
    RadioUp = 0x01,
    AddPeer = 0x02,
    DatagramTx = 0x03,
    DatagramRx = 0x04,
    NotifyUp = 0x10,
    Advertise = 0x11,
    Notify = 0x12,
    Connected = 0x20,
    Disconnected = 0x21,
}

impl TryFrom<u8> for FrameKind {
    type Error = LinkError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x01 => Self::RadioUp,
            0x02 => Self::AddPeer,
            0x03 => Self::DatagramTx,
            0x04 => Self::DatagramRx,
            0x10 => Self::NotifyUp,
            0x11 => Self::Advertise,
            0x12 => Self::Notify,
            0x20 => Self::Connected,
            0x21 => Self::Disconnected,
            _ => return Err(LinkError::MalformedFrame),
        })
    }
}

pub type FrameBuf = Vec<u8, MAX_FRAME>;

/// Encodes one frame whose payload is the concatenation of `parts`.
pub fn encode_parts(kind: FrameKind, parts: &[&[u8]], out: &mut FrameBuf) -> Result<(), LinkError> {
    let len: usize = parts.iter().map(|p| p.len()).sum();
    if len > MAX_PAYLOAD {
        return Err(LinkError::MalformedFrame);
    }

    out.clear();
    // Capacity is MAX_FRAME and len was checked, so the pushes cannot fail.
    let _ = out.extend_from_slice(&HEADER);
    let _ = out.push(kind as u8);
    let _ = out.push(len as u8);
    for part in parts {
        let _ = out.extend_from_slice(part);
    }
    let crc = State::<CCITT_FALSE>::calculate(out.as_slice());
    let _ = out.extend_from_slice(&crc.to_le_bytes());
    Ok(())
}

pub fn encode(kind: FrameKind, payload: &[u8], out: &mut FrameBuf) -> Result<(), LinkError> {
    encode_parts(kind, &[payload], out)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub payload: Vec<u8, MAX_PAYLOAD>,
}

impl Frame {
    /// Sender address and data of a received datagram.
    pub fn datagram(&self) -> Option<(PeerAddress, &[u8])> {
        if self.kind != FrameKind::DatagramRx || self.payload.len() < PEER_LEN {
            return None;
        }
        let mut sender = [0u8; PEER_LEN];
        sender.copy_from_slice(&self.payload[..PEER_LEN]);
        Some((sender, &self.payload[PEER_LEN..]))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Sync0,
    Sync1,
    Kind,
    Len,
    Payload,
    CrcLo,
    CrcHi,
}

/// Byte-at-a-time frame decoder. Anything before a `0xAA 0x55` header is
/// skipped, so the decoder picks the stream up again after garbage or a
/// dropped frame.
pub struct FrameDecoder {
    state: DecodeState,
    kind: u8,
    len: u8,
    crc_lo: u8,
    payload: Vec<u8, MAX_PAYLOAD>,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub const fn new() -> Self {
        Self {
            state: DecodeState::Sync0,
            kind: 0,
            len: 0,
            crc_lo: 0,
            payload: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.state = DecodeState::Sync0;
        self.payload.clear();
    }

    /// Feeds one byte. Returns a result once a whole frame has been seen.
    pub fn push(&mut self, byte: u8) -> Option<Result<Frame, LinkError>> {
        match self.state {
            DecodeState::Sync0 => {
                if byte == HEADER[0] {
                    self.state = DecodeState::Sync1;
                }
            }
            DecodeState::Sync1 => {
                self.state = match byte {
                    b if b == HEADER[1] => DecodeState::Kind,
                    b if b == HEADER[0] => DecodeState::Sync1,
                    _ => DecodeState::Sync0,
                };
            }
            DecodeState::Kind => {
                self.kind = byte;
                self.state = DecodeState::Len;
            }
            DecodeState::Len => {
                if byte as usize > MAX_PAYLOAD {
                    self.reset();
                    return Some(Err(LinkError::MalformedFrame));
                }
                self.len = byte;
                self.payload.clear();
                self.state = if byte == 0 {
                    DecodeState::CrcLo
                } else {
                    DecodeState::Payload
                };
            }
            DecodeState::Payload => {
                let _ = self.payload.push(byte);
                if self.payload.len() == self.len as usize {
                    self.state = DecodeState::CrcLo;
                }
            }
            DecodeState::CrcLo => {
                self.crc_lo = byte;
                self.state = DecodeState::CrcHi;
            }
            DecodeState::CrcHi => {
                self.state = DecodeState::Sync0;
                return Some(self.finish(u16::from_le_bytes([self.crc_lo, byte])));
            }
        }
        None
    }

    fn finish(&mut self, received: u16) -> Result<Frame, LinkError> {
        let mut crc = State::<CCITT_FALSE>::new();
        crc.update(&HEADER);
        crc.update(&[self.kind, self.len]);
        crc.update(&self.payload);
        let calculated = crc.get();

        let payload = core::mem::take(&mut self.payload);
        if calculated != received {
            return Err(LinkError::ChecksumMismatch);
        }
        let kind = FrameKind::try_from(self.kind)?;
        Ok(Frame { kind, payload })
    }
}

/// Byte transport to the coprocessor, one whole frame per call.
pub trait FrameSink {
    fn send_frame(&mut self, frame: &[u8]) -> Result<(), LinkError>;
}

fn send<T: FrameSink>(sink: &mut T, kind: FrameKind, parts: &[&[u8]]) -> Result<(), LinkError> {
    let mut frame = FrameBuf::new();
    encode_parts(kind, parts, &mut frame)?;
    sink.send_frame(&frame)
}

/// Datagram radio on the coprocessor.
pub struct BridgeRadio<T> {
    sink: T,
}

impl<T: FrameSink> BridgeRadio<T> {
    pub const fn new(sink: T) -> Self {
        Self { sink }
    }
}

impl<T: FrameSink> DatagramRadio for BridgeRadio<T> {
    fn bring_up(&mut self) -> Result<(), LinkError> {
        send(&mut self.sink, FrameKind::RadioUp, &[])
    }

    fn add_peer(&mut self, peer: &PeerAddress) -> Result<(), LinkError> {
        send(&mut self.sink, FrameKind::AddPeer, &[peer.as_slice()])
    }

    fn transmit(&mut self, peer: &PeerAddress, data: &[u8]) -> Result<(), LinkError> {
        send(&mut self.sink, FrameKind::DatagramTx, &[peer.as_slice(), data])
    }
}

/// Advertised name and GATT identity of the notification service.
#[derive(Debug, Clone, Copy)]
pub struct NotifyIdentity {
    pub device_name: &'static str,
    pub service_uuid: &'static str,
    pub characteristic_uuid: &'static str,
}

/// Notification stack on the coprocessor.
pub struct BridgeNotify<T> {
    sink: T,
    identity: NotifyIdentity,
}

impl<T: FrameSink> BridgeNotify<T> {
    pub const fn new(sink: T, identity: NotifyIdentity) -> Self {
        Self { sink, identity }
    }
}

impl<T: FrameSink> NotifyStack for BridgeNotify<T> {
    fn start(&mut self) -> Result<(), LinkError> {
        let id = &self.identity;
        let fields = [id.device_name, id.service_uuid, id.characteristic_uuid];
        if fields.iter().any(|f| f.len() > u8::MAX as usize) {
            return Err(LinkError::MalformedFrame);
        }
        let lens = fields.map(|f| [f.len() as u8]);
        send(
            &mut self.sink,
            FrameKind::NotifyUp,
            &[
                lens[0].as_slice(),
                fields[0].as_bytes(),
                lens[1].as_slice(),
                fields[1].as_bytes(),
                lens[2].as_slice(),
                fields[2].as_bytes(),
            ],
        )
    }

    fn start_advertising(&mut self) -> Result<(), LinkError> {
        send(&mut self.sink, FrameKind::Advertise, &[])
    }

    fn publish(&mut self, data: &[u8]) -> Result<(), LinkError> {
        send(&mut self.sink, FrameKind::Notify, &[data])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn decode_all(bytes: &[u8]) -> std::vec::Vec<Result<Frame, LinkError>> {
        let mut decoder = FrameDecoder::new();
        bytes.iter().filter_map(|&b| decoder.push(b)).collect()
    }

    fn frame(kind: FrameKind, payload: &[u8]) -> FrameBuf {
        let mut out = FrameBuf::new();
        encode(kind, payload, &mut out).unwrap();
        out
    }

    #[test]
    fn empty_frame_layout() {
        let f = frame(FrameKind::RadioUp, &[]);
        let crc = State::<CCITT_FALSE>::calculate(&[0xAA, 0x55, 0x01, 0x00]);
        let [lo, hi] = crc.to_le_bytes();
        assert_eq!(f.as_slice(), &[0xAA, 0x55, 0x01, 0x00, lo, hi]);
    }

    #[test]
    fn known_crc_vector() {
        // CRC-16/CCITT-FALSE check value
        assert_eq!(State::<CCITT_FALSE>::calculate(b"123456789"), 0x29B1);
    }

    #[test]
    fn oversize_payload_is_refused() {
        let mut out = FrameBuf::new();
        assert_eq!(
            encode(FrameKind::Notify, &[0u8; MAX_PAYLOAD + 1], &mut out),
            Err(LinkError::MalformedFrame)
        );
        assert!(encode(FrameKind::Notify, &[0u8; MAX_PAYLOAD], &mut out).is_ok());
        assert_eq!(out.len(), MAX_FRAME);
    }

    #[test]
    fn corrupted_crc_is_a_checksum_mismatch() {
        let mut f = frame(FrameKind::Notify, &[1, 2, 3]);
        let last = f.len() - 1;
        f[last] ^= 0xFF;
        assert_eq!(decode_all(&f), [Err(LinkError::ChecksumMismatch)]);
    }

    #[test]
    fn corrupted_payload_is_a_checksum_mismatch() {
        let mut f = frame(FrameKind::Notify, &[1, 2, 3]);
        f[5] ^= 0x01;
        assert_eq!(decode_all(&f), [Err(LinkError::ChecksumMismatch)]);
    }

    #[test]
    fn unknown_kind_is_malformed() {
        let mut f = FrameBuf::new();
        f.extend_from_slice(&[0xAA, 0x55, 0x7E, 0x00]).unwrap();
        let crc = State::<CCITT_FALSE>::calculate(&f);
        f.extend_from_slice(&crc.to_le_bytes()).unwrap();
        assert_eq!(decode_all(&f), [Err(LinkError::MalformedFrame)]);
    }

    #[test]
    fn oversize_length_is_malformed() {
        assert_eq!(
            decode_all(&[0xAA, 0x55, 0x12, 249]),
            [Err(LinkError::MalformedFrame)]
        );
    }

    #[test]
    fn decoder_resyncs_after_garbage() {
        let mut stream = std::vec![0x00, 0xAA, 0x13, 0xAA, 0xAA];
        stream.extend_from_slice(&frame(FrameKind::Connected, &[]));
        stream.extend_from_slice(&[0x55, 0x42]);
        stream.extend_from_slice(&frame(FrameKind::Disconnected, &[]));

        let kinds: std::vec::Vec<_> = decode_all(&stream)
            .into_iter()
            .map(|r| r.map(|f| f.kind))
            .collect();
        assert_eq!(kinds, [Ok(FrameKind::Connected), Ok(FrameKind::Disconnected)]);
    }

    #[test]
    fn false_header_swallows_the_frame_inside_its_length() {
        // noise that looks like a header claiming five payload bytes
        let mut stream = std::vec![0xAA, 0x55, 0x03, 0x05];
        stream.extend_from_slice(&frame(FrameKind::Connected, &[]));
        stream.extend_from_slice(&[0x00, 0x00]);
        stream.extend_from_slice(&frame(FrameKind::Disconnected, &[]));

        let kinds: std::vec::Vec<_> = decode_all(&stream)
            .into_iter()
            .map(|r| r.map(|f| f.kind))
            .collect();
        assert_eq!(
            kinds,
            [Err(LinkError::ChecksumMismatch), Ok(FrameKind::Disconnected)]
        );
    }

    #[test]
    fn datagram_rx_splits_sender_and_data() {
        let sender = [1, 2, 3, 4, 5, 6];
        let mut f = FrameBuf::new();
        encode_parts(FrameKind::DatagramRx, &[sender.as_slice(), &[9, 9]], &mut f).unwrap();
        let decoded = decode_all(&f).pop().unwrap().unwrap();
        let (from, data) = decoded.datagram().unwrap();
        assert_eq!(from, sender);
        assert_eq!(data, &[9, 9]);

        let short = Frame {
            kind: FrameKind::DatagramRx,
            payload: Vec::from_slice(&[1, 2, 3]).unwrap(),
        };
        assert_eq!(short.datagram(), None);
    }

    #[derive(Default)]
    struct Captured(std::vec::Vec<std::vec::Vec<u8>>);

    impl FrameSink for &mut Captured {
        fn send_frame(&mut self, frame: &[u8]) -> Result<(), LinkError> {
            self.0.push(frame.to_vec());
            Ok(())
        }
    }

    #[test]
    fn radio_transmit_prefixes_peer() {
        let mut captured = Captured::default();
        let mut radio = BridgeRadio::new(&mut captured);
        radio.transmit(&[6, 5, 4, 3, 2, 1], &[0xEE]).unwrap();

        let decoded = decode_all(&captured.0[0]).pop().unwrap().unwrap();
        assert_eq!(decoded.kind, FrameKind::DatagramTx);
        assert_eq!(decoded.payload.as_slice(), &[6, 5, 4, 3, 2, 1, 0xEE]);
    }

    #[test]
    fn notify_up_carries_length_prefixed_identity() {
        let mut captured = Captured::default();
        let mut stack = BridgeNotify::new(
            &mut captured,
            NotifyIdentity {
                device_name: "ab",
                service_uuid: "c",
                characteristic_uuid: "",
            },
        );
        stack.start().unwrap();

        let decoded = decode_all(&captured.0[0]).pop().unwrap().unwrap();
        assert_eq!(decoded.kind, FrameKind::NotifyUp);
        assert_eq!(decoded.payload.as_slice(), &[2, b'a', b'b', 1, b'c', 0]);
    }

    proptest! {
        #[test]
        fn encoded_frames_decode_unchanged(
            payload in proptest::collection::vec(any::<u8>(), 0..=MAX_PAYLOAD),
            noise in proptest::collection::vec(0u8..0xAA, 0..16),
        ) {
            let mut stream = noise.clone();
            stream.extend_from_slice(&frame(FrameKind::Notify, &payload));
            let frames = decode_all(&stream);
            prop_assert_eq!(frames.len(), 1);
            let f = frames[0].clone().unwrap();
            prop_assert_eq!(f.kind, FrameKind::Notify);
            prop_assert_eq!(f.payload.as_slice(), payload.as_slice());
        }
    }
}
