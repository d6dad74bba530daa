#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_time::Delay;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use motorlink::{
    config::{
        NOTIFY_CHARACTERISTIC_UUID, NOTIFY_DEVICE_NAME, NOTIFY_SERVICE_UUID,
    },
    drivers::{thermal::ThermalDescriptor, ImuModel, Inertial, Thermal},
    ipc::Mailbox,
    link::{
        bridge::{BridgeNotify, BridgeRadio, NotifyIdentity},
        ConnectionState, DatagramInbox, DatagramLink, LinkStats, NotificationLink,
        ThreePhaseCurrentPacket,
    },
    tasks::{bridge_rx_task, hub_task},
    Board,
};

const NO_CURRENT: ThreePhaseCurrentPacket = ThreePhaseCurrentPacket {
    ia: 0.0,
    ib: 0.0,
    ic: 0.0,
};

static CURRENT_MAILBOX: StaticCell<Mailbox<ThreePhaseCurrentPacket>> = StaticCell::new();
static LINK_STATS: LinkStats = LinkStats::new();
static CONNECTION: ConnectionState = ConnectionState::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Starting motorlink hub");
    let board = Board::init();

    let imu = Inertial::new(board.i2c, Delay, ImuModel::Mpu6050);
    let thermal = Thermal::new(board.i2c, Delay, ThermalDescriptor::SHT30);

    let radio = DatagramLink::new(BridgeRadio::new(board.bridge_tx));
    let notify = NotificationLink::new(
        BridgeNotify::new(
            board.bridge_tx,
            NotifyIdentity {
                device_name: NOTIFY_DEVICE_NAME,
                service_uuid: NOTIFY_SERVICE_UUID,
                characteristic_uuid: NOTIFY_CHARACTERISTIC_UUID,
            },
        ),
        &CONNECTION,
    );

    let (producer, consumer) = CURRENT_MAILBOX.init(Mailbox::new(NO_CURRENT)).split();
    let inbox = DatagramInbox::new(producer, &LINK_STATS);

    spawner
        .spawn(bridge_rx_task(board.bridge_rx, inbox, &CONNECTION))
        .unwrap();
    info!("Bridge rx task spawned");

    spawner
        .spawn(hub_task(imu, thermal, radio, notify, consumer, &LINK_STATS))
        .unwrap();
    info!("Hub task spawned");

    core::future::pending::<()>().await;
}
