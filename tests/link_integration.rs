//! Current node -> radio coprocessor -> hub, with the coprocessor replaced by
//! an in-memory relay that turns outgoing datagram frames into incoming ones.

use std::cell::RefCell;
use std::rc::Rc;

use motorlink::ipc::Mailbox;
use motorlink::link::bridge::{
    encode, encode_parts, BridgeNotify, BridgeRadio, FrameBuf, FrameDecoder, FrameKind,
    FrameSink, NotifyIdentity,
};
use motorlink::link::{
    ConnectionState, DatagramInbox, DatagramLink, LinkError, LinkStats, NotificationLink,
    SensorPacket, ThreePhaseCurrentPacket, WirePacket,
};

type Wire = Rc<RefCell<Vec<u8>>>;

/// Appends every frame to a shared byte stream.
#[derive(Clone)]
struct WireSink(Wire);

impl FrameSink for WireSink {
    fn send_frame(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        self.0.borrow_mut().extend_from_slice(frame);
        Ok(())
    }
}

fn decode(bytes: &[u8]) -> Vec<motorlink::link::bridge::Frame> {
    let mut decoder = FrameDecoder::new();
    bytes
        .iter()
        .filter_map(|&b| decoder.push(b))
        .map(|r| r.expect("clean stream"))
        .collect()
}

const NODE_ADDRESS: [u8; 6] = [0x24, 0x6F, 0x28, 0x99, 0x88, 0x77];
const HUB_ADDRESS: [u8; 6] = [0x24, 0x6F, 0x28, 0x1A, 0x2B, 0x3C];

/// What the coprocessor does with host frames: datagrams come out at the
/// other radio as `DatagramRx` stamped with the sender's address.
fn relay(node_wire: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for frame in decode(node_wire) {
        if frame.kind != FrameKind::DatagramTx {
            continue;
        }
        let data = &frame.payload[6..];
        let mut rx = FrameBuf::new();
        encode_parts(FrameKind::DatagramRx, &[&NODE_ADDRESS[..], data], &mut rx).unwrap();
        out.extend_from_slice(&rx);
    }
    out
}

#[test]
fn currents_reach_the_hub_mailbox() {
    let node_wire: Wire = Rc::default();
    let mut node = DatagramLink::new(BridgeRadio::new(WireSink(node_wire.clone())));
    node.begin(HUB_ADDRESS).unwrap();
    node.begin(HUB_ADDRESS).unwrap();

    let sent = ThreePhaseCurrentPacket {
        ia: 1.5,
        ib: -2.25,
        ic: 0.0,
    };
    node.send(&sent).unwrap();

    let kinds: Vec<_> = decode(&node_wire.borrow()).iter().map(|f| f.kind).collect();
    assert_eq!(
        kinds,
        [FrameKind::RadioUp, FrameKind::AddPeer, FrameKind::DatagramTx]
    );

    let stats = LinkStats::new();
    let mut mailbox = Mailbox::new(ThreePhaseCurrentPacket::default());
    let (tx, mut rx) = mailbox.split();
    let mut inbox = DatagramInbox::new(tx, &stats);

    let hub_wire = relay(&node_wire.borrow());
    for frame in decode(&hub_wire) {
        let (sender, data) = frame.datagram().unwrap();
        assert_eq!(sender, NODE_ADDRESS);
        inbox.on_receive(&sender, data);
    }

    let got = rx.try_take().unwrap();
    assert_eq!(got.ia.to_bits(), sent.ia.to_bits());
    assert_eq!(got.ib.to_bits(), sent.ib.to_bits());
    assert_eq!(got.ic.to_bits(), sent.ic.to_bits());
    assert_eq!(rx.try_take(), None);
    assert_eq!(stats.accepted(), 1);
}

#[test]
fn short_datagrams_never_reach_the_mailbox() {
    let stats = LinkStats::new();
    let mut mailbox = Mailbox::new(ThreePhaseCurrentPacket::default());
    let (tx, mut rx) = mailbox.split();
    let mut inbox = DatagramInbox::new(tx, &stats);

    let mut wire = FrameBuf::new();
    encode_parts(FrameKind::DatagramRx, &[&NODE_ADDRESS[..], &[0u8; 11][..]], &mut wire).unwrap();
    let mut long = FrameBuf::new();
    encode_parts(FrameKind::DatagramRx, &[&NODE_ADDRESS[..], &[0u8; 13][..]], &mut long).unwrap();

    let mut stream = wire.to_vec();
    stream.extend_from_slice(&long);
    for frame in decode(&stream) {
        let (sender, data) = frame.datagram().unwrap();
        assert!(!inbox.on_receive(&sender, data));
    }

    assert_eq!(rx.try_take(), None);
    assert_eq!(stats.malformed(), 2);
    assert_eq!(stats.accepted(), 0);
}

#[test]
fn hub_publishes_only_while_a_central_is_connected() {
    let wire: Wire = Rc::default();
    let state = ConnectionState::new();
    let mut link = NotificationLink::new(
        BridgeNotify::new(
            WireSink(wire.clone()),
            NotifyIdentity {
                device_name: "motorlink",
                service_uuid: "4fafc201-1fb5-459e-8fcc-c5c9c331914b",
                characteristic_uuid: "488147e4-8512-4bca-b218-0b84f2f76853",
            },
        ),
        &state,
    );
    link.begin().unwrap();

    let packet = SensorPacket {
        ax: 0.01,
        ay: -0.02,
        az: 1.0,
        temp: 22.0,
        ia: 1.0,
        ib: 1.0,
        ic: 1.0,
    };
    assert_eq!(link.notify(&packet), Ok(false));

    // The coprocessor reports a connection the way the rx task would see it.
    let mut event = FrameBuf::new();
    encode(FrameKind::Connected, &[], &mut event).unwrap();
    for frame in decode(&event) {
        assert_eq!(frame.kind, FrameKind::Connected);
        state.on_connect();
    }
    assert_eq!(link.notify(&packet), Ok(true));

    state.on_disconnect();
    assert_eq!(link.notify(&packet), Ok(false));

    let frames = decode(&wire.borrow());
    let kinds: Vec<_> = frames.iter().map(|f| f.kind).collect();
    assert_eq!(
        kinds,
        [
            FrameKind::NotifyUp,
            FrameKind::Advertise,
            FrameKind::Notify,
            FrameKind::Advertise,
        ]
    );
    assert_eq!(frames[2].payload.as_slice(), packet.as_bytes());
    assert_eq!(frames[2].payload.len(), SensorPacket::SIZE);
}
