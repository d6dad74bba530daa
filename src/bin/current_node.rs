#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_time::Delay;
use {defmt_rtt as _, panic_probe as _};

use motorlink::{
    config::CT_VOLTS_PER_AMP,
    drivers::{CurrentChannel, ThreePhaseMeter},
    link::{bridge::BridgeRadio, DatagramLink},
    tasks::current_node_task,
    Board,
};

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Starting motorlink current node");
    let board = Board::init();

    let [a, b, c] = board.current_pins;
    let meter = ThreePhaseMeter::new([
        CurrentChannel::new(a, Delay, CT_VOLTS_PER_AMP),
        CurrentChannel::new(b, Delay, CT_VOLTS_PER_AMP),
        CurrentChannel::new(c, Delay, CT_VOLTS_PER_AMP),
    ]);
    let link = DatagramLink::new(BridgeRadio::new(board.bridge_tx));

    spawner.spawn(current_node_task(meter, link)).unwrap();
    info!("Current node task spawned");

    core::future::pending::<()>().await;
}
