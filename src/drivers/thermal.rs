use crc::{Crc, CRC_8_NRSC_5};
use embedded_hal::blocking::delay::DelayMs;

use super::{RegisterBus, Sensor, SensorError};
use crate::calibration::{Calibration, CalibrationReport};
use crate::config::{ROOM_TEMPERATURE_C, THERMAL_FILTER_ALPHA, THERMAL_SETTLE_MS};
use crate::filter::Ema;

pub const SHT30_ADDRESS: u8 = 0x44;

// Single shot, high repeatability, clock stretching enabled
const SHT30_MEASURE_SINGLE_SHOT: [u8; 2] = [0x2C, 0x06];

// temp MSB, temp LSB, temp CRC, humidity MSB, humidity LSB, humidity CRC
const SHT30_FRAME_LEN: usize = 6;

// Sensirion's checksum: poly 0x31, init 0xFF, no reflection, no final xor.
const SENSIRION_CRC: Crc<u8> = Crc::<u8>::new(&CRC_8_NRSC_5);

/// Command-addressed temperature sensor.
#[derive(Debug, Clone, Copy)]
pub struct ThermalDescriptor {
    pub address: u8,
    pub measure_command: [u8; 2],
    pub conversion_ms: u32,
    /// Check the CRC-8 that follows the temperature word.
    pub verify_crc: bool,
}

impl ThermalDescriptor {
    pub const SHT30: Self = Self {
        address: SHT30_ADDRESS,
        measure_command: SHT30_MEASURE_SINGLE_SHOT,
        conversion_ms: 15,
        verify_crc: true,
    };
}

/// CRC-8 Sensirion appends to every 16-bit word.
pub fn crc8(data: &[u8]) -> u8 {
    SENSIRION_CRC.checksum(data)
}

fn raw_to_celsius(raw: u16) -> f32 {
    -45.0 + 175.0 * (raw as f32) / 65535.0
}

/// Single-channel temperature in °C.
pub struct Thermal<B, D> {
    bus: B,
    delay: D,
    desc: ThermalDescriptor,
    calibration: Calibration<1>,
    filter: Ema,
}

impl<B: RegisterBus, D: DelayMs<u32>> Thermal<B, D> {
    pub fn new(bus: B, delay: D, desc: ThermalDescriptor) -> Self {
        Self {
            bus,
            delay,
            desc,
            calibration: Calibration::new(),
            filter: Ema::new(THERMAL_FILTER_ALPHA),
        }
    }

    pub fn bias(&self) -> f32 {
        self.calibration.bias()[0]
    }

    pub fn release(self) -> (B, D) {
        (self.bus, self.delay)
    }

    fn read_uncalibrated(
        bus: &mut B,
        delay: &mut D,
        desc: &ThermalDescriptor,
    ) -> Result<f32, SensorError> {
        bus.write_command(desc.address, &desc.measure_command)?;
        delay.delay_ms(desc.conversion_ms);

        let mut frame = [0u8; SHT30_FRAME_LEN];
        bus.read(desc.address, &mut frame)?;

        if desc.verify_crc && crc8(&frame[0..2]) != frame[2] {
            warn!("thermal: CRC mismatch, reading dropped");
            return Err(SensorError::ChecksumMismatch);
        }

        Ok(raw_to_celsius(u16::from_be_bytes([frame[0], frame[1]])))
    }
}

impl<B: RegisterBus, D: DelayMs<u32>> Sensor for Thermal<B, D> {
    type Reading = f32;

    /// Probes the device with one conversion; the part needs no configuration.
    fn initialize(&mut self) -> Result<(), SensorError> {
        Self::read_uncalibrated(&mut self.bus, &mut self.delay, &self.desc)
            .map_err(|_| SensorError::Init)?;
        info!("thermal sensor at {:#x} initialized", self.desc.address);
        Ok(())
    }

    fn read_calibrated(&mut self) -> Result<f32, SensorError> {
        let celsius = Self::read_uncalibrated(&mut self.bus, &mut self.delay, &self.desc)?;
        let [calibrated] = self.calibration.apply([celsius]);
        Ok(self.filter.update(calibrated))
    }

    fn calibrate(&mut self, samples: u32) -> CalibrationReport {
        let bus = &mut self.bus;
        let desc = &self.desc;
        let report = self.calibration.calibrate(
            samples,
            [ROOM_TEMPERATURE_C],
            &mut self.delay,
            THERMAL_SETTLE_MS,
            |delay| Self::read_uncalibrated(bus, delay, desc).ok().map(|c| [c]),
        );

        if report.applied() {
            self.filter.reset();
            info!(
                "thermal calibrated ({}/{}): bias {} C",
                report.accepted,
                report.requested,
                self.bias()
            );
        }
        report
    }
}
