use defmt::Format;
use embassy_time::{Delay, Duration, Timer};

use crate::board::{AdcPin, BridgePort, SharedI2c};
use crate::config::{INIT_ATTEMPTS, INIT_BACKOFF_BASE_MS};
use crate::drivers::{Inertial, Thermal, ThreePhaseMeter};
use crate::link::bridge::{BridgeNotify, BridgeRadio};
use crate::link::{DatagramLink, NotificationLink};

pub mod bridge_rx;
pub mod current_node;
pub mod hub;

pub use bridge_rx::bridge_rx_task;
pub use current_node::current_node_task;
pub use hub::hub_task;

pub type HubImu = Inertial<SharedI2c, Delay>;
pub type HubThermal = Thermal<SharedI2c, Delay>;
pub type CurrentMeter = ThreePhaseMeter<AdcPin, Delay>;
pub type RadioLink = DatagramLink<BridgeRadio<BridgePort>>;
pub type NotifyLink = NotificationLink<'static, BridgeNotify<BridgePort>>;

/// Runs `attempt` until it succeeds or `INIT_ATTEMPTS` are used up, waiting
/// `INIT_BACKOFF_BASE_MS * n` after the n-th failure.
pub async fn with_backoff<T, E: Format>(
    what: &str,
    mut attempt: impl FnMut() -> Result<T, E>,
) -> Option<T> {
    for n in 1..=INIT_ATTEMPTS {
        match attempt() {
            Ok(v) => return Some(v),
            Err(e) => {
                warn!("{} failed (attempt {}/{}): {:?}", what, n, INIT_ATTEMPTS, e);
                if n < INIT_ATTEMPTS {
                    Timer::after(Duration::from_millis(INIT_BACKOFF_BASE_MS * n as u64)).await;
                }
            }
        }
    }
    error!("{} gave up after {} attempts", what, INIT_ATTEMPTS);
    None
}
