use embassy_executor::task;
use embassy_time::{Duration, Ticker};

use super::{with_backoff, HubImu, HubThermal, NotifyLink, RadioLink};
use crate::config::{
    HUB_SAMPLE_PERIOD_MS, HUB_SAMPLE_RATE_HZ, IMU_CALIBRATION_SAMPLES, ROOM_TEMPERATURE_C,
    THERMAL_CALIBRATION_SAMPLES,
};
use crate::drivers::{Sensor, Vector3};
use crate::ipc::Consumer;
use crate::link::{LinkStats, SensorPacket, ThreePhaseCurrentPacket};

// Report link health every ten seconds.
const STATS_EVERY_TICKS: u32 = 10 * HUB_SAMPLE_RATE_HZ;

/// Hub main loop: samples the local sensors, merges in the latest currents
/// from the node and publishes the combined packet.
#[task]
pub async fn hub_task(
    mut imu: HubImu,
    mut thermal: HubThermal,
    mut radio: RadioLink,
    mut notify: NotifyLink,
    mut currents: Consumer<'static, ThreePhaseCurrentPacket>,
    stats: &'static LinkStats,
) {
    info!("hub task started - sampling every {}ms", HUB_SAMPLE_PERIOD_MS);

    let imu_ok = with_backoff("IMU init", || imu.initialize()).await.is_some();
    if imu_ok {
        imu.calibrate(IMU_CALIBRATION_SAMPLES);
    }
    let thermal_ok = with_backoff("thermal init", || thermal.initialize())
        .await
        .is_some();
    if thermal_ok {
        thermal.calibrate(THERMAL_CALIBRATION_SAMPLES);
    }

    // Receive-only: the node addresses us, we never send datagrams back.
    with_backoff("datagram radio", || radio.start()).await;
    with_backoff("notification link", || notify.begin()).await;

    let mut accel = Vector3 { x: 0.0, y: 0.0, z: 1.0 };
    let mut temp = ROOM_TEMPERATURE_C;
    let mut latest = ThreePhaseCurrentPacket::default();

    let mut ticker = Ticker::every(Duration::from_millis(HUB_SAMPLE_PERIOD_MS));
    let mut ticks = 0u32;
    let mut imu_errors = 0u32;
    let mut published = 0u32;

    loop {
        ticker.next().await;
        ticks = ticks.wrapping_add(1);

        if imu_ok {
            match imu.read_calibrated() {
                Ok(r) => {
                    accel = r.accel;
                    imu_errors = 0;
                }
                Err(e) => {
                    imu_errors += 1;
                    if imu_errors % 50 == 1 {
                        warn!("IMU read error #{}: {:?}", imu_errors, e);
                    }
                }
            }
        }

        if thermal_ok {
            if let Ok(t) = thermal.read_calibrated() {
                temp = t;
            }
        }

        if let Some(packet) = currents.try_take() {
            latest = packet;
            debug!(
                "currents: {} {} {} A, park modulus {}",
                packet.ia,
                packet.ib,
                packet.ic,
                packet.park_modulus()
            );
        }

        if !radio.is_started() && ticks % STATS_EVERY_TICKS == 0 && radio.start().is_err() {
            warn!("datagram radio still down");
        }

        if !notify.is_started() {
            // bring-up gave up earlier; keep trying at the stats cadence
            if ticks % STATS_EVERY_TICKS == 0 && notify.begin().is_err() {
                warn!("notification link still down");
            }
            continue;
        }

        let packet = SensorPacket::new([accel.x, accel.y, accel.z], temp, latest);
        match notify.notify(&packet) {
            Ok(true) => published += 1,
            Ok(false) => {}
            Err(e) => warn!("notify failed: {:?}", e),
        }

        if ticks % STATS_EVERY_TICKS == 0 {
            info!(
                "link: {} datagrams ok, {} malformed, {} notifications, {} centrals seen",
                stats.accepted(),
                stats.malformed(),
                published,
                notify.state().connections()
            );
        }
    }
}
