use embassy_executor::task;
use embassy_time::{Duration, Ticker};

use super::{with_backoff, CurrentMeter, RadioLink};
use crate::config::{CURRENT_CALIBRATION_PASSES, CURRENT_NODE_PERIOD_MS, HUB_RADIO_ADDRESS};
use crate::drivers::Sensor;

#[task]
pub async fn current_node_task(mut meter: CurrentMeter, mut link: RadioLink) {
    info!("current node started - one packet every {}ms", CURRENT_NODE_PERIOD_MS);

    if with_backoff("ADC", || meter.initialize()).await.is_none() {
        return;
    }
    // Conductors must be unloaded at power-up for the noise floor to mean anything.
    meter.calibrate(CURRENT_CALIBRATION_PASSES);

    let mut ticker = Ticker::every(Duration::from_millis(CURRENT_NODE_PERIOD_MS));
    let mut send_errors = 0u32;

    loop {
        ticker.next().await;

        if link.peer().is_none() && link.begin(HUB_RADIO_ADDRESS).is_err() {
            continue;
        }

        let packet = match meter.read_calibrated() {
            Ok(p) => p,
            Err(e) => {
                warn!("current read failed: {:?}", e);
                continue;
            }
        };

        match link.send(&packet) {
            Ok(()) => {
                if send_errors > 0 {
                    info!("datagram link recovered after {} errors", send_errors);
                    send_errors = 0;
                }
                trace!("sent {} {} {} A", packet.ia, packet.ib, packet.ic);
            }
            Err(e) => {
                send_errors += 1;
                if send_errors % 50 == 1 {
                    warn!("datagram send error #{}: {:?}", send_errors, e);
                }
            }
        }
    }
}
