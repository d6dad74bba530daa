use embedded_hal::blocking::delay::DelayMs;

use super::{RegisterBus, Sensor, SensorError};
use crate::calibration::{Calibration, CalibrationReport};
use crate::config::{IMU_SETTLE_MS, INERTIAL_FILTER_ALPHA};
use crate::filter::Ema;

// InvenSense MPU-family I2C addresses
pub const MPU_ADDRESS_A: u8 = 0x68;
pub const MPU_ADDRESS_B: u8 = 0x69;

const MPU_PWR_MGMT_1_ADDR: u8 = 0x6B;
const MPU_ACCEL_CONFIG_ADDR: u8 = 0x1C;
const MPU_ACCEL_CONFIG_2_ADDR: u8 = 0x1D;
const MPU_ACCEL_XOUT_H_ADDR: u8 = 0x3B;
const MPU_WHO_AM_I_ADDR: u8 = 0x75;

// accel (6) + die temperature (2) + gyro (6)
const BURST_WITH_GYRO: usize = 14;
const BURST_ACCEL_ONLY: usize = 6;
const GYRO_OFFSET: usize = 8;

/// Axes of one burst, in channel order `ax ay az gx gy gz`.
const CHANNELS: usize = 6;

/// Calibration reference with the board stationary and level: +1 g on Z.
const LEVEL_REFERENCE: [f32; CHANNELS] = [0.0, 0.0, 1.0, 0.0, 0.0, 0.0];

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Accelerometer in g, gyroscope in °/s when the part has one.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InertialReading {
    pub accel: Vector3,
    pub gyro: Option<Vector3>,
}

/// Register map and scale of one inertial part.
#[derive(Debug, Clone, Copy)]
pub struct ImuDescriptor {
    pub address: u8,
    pub who_am_i: Option<u8>,
    /// `(register, value)` writes applied in order by `initialize`.
    pub init_sequence: &'static [(u8, u8)],
    pub accel_lsb_per_g: f32,
    pub gyro_lsb_per_dps: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ImuModel {
    /// Accelerometer only, ±2 g, DLPF 0x03.
    Mpu6500,
    /// Accelerometer only, ±2 g.
    Mpu9250,
    /// Accelerometer and gyroscope, power-on ranges (±2 g, ±250 °/s).
    Mpu6050,
}

impl ImuModel {
    pub const fn descriptor(self) -> ImuDescriptor {
        match self {
            Self::Mpu6500 => ImuDescriptor {
                address: MPU_ADDRESS_A,
                who_am_i: Some(0x70),
                init_sequence: &[
                    (MPU_PWR_MGMT_1_ADDR, 0x00),
                    (MPU_ACCEL_CONFIG_ADDR, 0x00),
                    (MPU_ACCEL_CONFIG_2_ADDR, 0x03),
                ],
                accel_lsb_per_g: 16384.0,
                gyro_lsb_per_dps: None,
            },
            Self::Mpu9250 => ImuDescriptor {
                address: MPU_ADDRESS_A,
                who_am_i: Some(0x71),
                init_sequence: &[(MPU_PWR_MGMT_1_ADDR, 0x00), (MPU_ACCEL_CONFIG_ADDR, 0x00)],
                accel_lsb_per_g: 16384.0,
                gyro_lsb_per_dps: None,
            },
            Self::Mpu6050 => ImuDescriptor {
                address: MPU_ADDRESS_A,
                who_am_i: Some(0x68),
                init_sequence: &[(MPU_PWR_MGMT_1_ADDR, 0x00)],
                accel_lsb_per_g: 16384.0,
                gyro_lsb_per_dps: Some(131.0),
            },
        }
    }
}

pub struct Inertial<B, D> {
    bus: B,
    delay: D,
    desc: ImuDescriptor,
    calibration: Calibration<CHANNELS>,
    filters: [Ema; CHANNELS],
}

impl<B: RegisterBus, D: DelayMs<u32>> Inertial<B, D> {
    pub fn new(bus: B, delay: D, model: ImuModel) -> Self {
        Self::with_descriptor(bus, delay, model.descriptor())
    }

    pub fn with_descriptor(bus: B, delay: D, desc: ImuDescriptor) -> Self {
        Self {
            bus,
            delay,
            desc,
            calibration: Calibration::new(),
            filters: [Ema::new(INERTIAL_FILTER_ALPHA); CHANNELS],
        }
    }

    pub fn descriptor(&self) -> &ImuDescriptor {
        &self.desc
    }

    /// Accelerometer bias (g) followed by gyroscope bias (°/s).
    pub fn bias(&self) -> [f32; CHANNELS] {
        self.calibration.bias()
    }

    pub fn release(self) -> (B, D) {
        (self.bus, self.delay)
    }

    /// One burst read converted to physical units, before bias and smoothing.
    fn read_uncalibrated(bus: &mut B, desc: &ImuDescriptor) -> Result<[f32; CHANNELS], SensorError> {
        let mut raw = [0u8; BURST_WITH_GYRO];
        let len = if desc.gyro_lsb_per_dps.is_some() {
            BURST_WITH_GYRO
        } else {
            BURST_ACCEL_ONLY
        };
        bus.read_registers(desc.address, MPU_ACCEL_XOUT_H_ADDR, &mut raw[..len])?;

        let word = |i: usize| i16::from_be_bytes([raw[i], raw[i + 1]]) as f32;
        let mut out = [0.0f32; CHANNELS];
        for axis in 0..3 {
            out[axis] = word(axis * 2) / desc.accel_lsb_per_g;
        }
        if let Some(gyro_scale) = desc.gyro_lsb_per_dps {
            for axis in 0..3 {
                out[3 + axis] = word(GYRO_OFFSET + axis * 2) / gyro_scale;
            }
        }
        Ok(out)
    }
}

impl<B: RegisterBus, D: DelayMs<u32>> Sensor for Inertial<B, D> {
    type Reading = InertialReading;

    fn initialize(&mut self) -> Result<(), SensorError> {
        let addr = self.desc.address;

        if let Some(expected) = self.desc.who_am_i {
            let id = self
                .bus
                .read_register(addr, MPU_WHO_AM_I_ADDR)
                .map_err(|_| SensorError::Init)?;
            if id != expected {
                error!(
                    "IMU at {:#x}: WHO_AM_I {:#x}, expected {:#x}",
                    addr, id, expected
                );
                return Err(SensorError::UnexpectedDevice(id));
            }
        }

        for &(reg, value) in self.desc.init_sequence {
            self.bus
                .write_register(addr, reg, value)
                .map_err(|_| SensorError::Init)?;
        }

        info!("IMU at {:#x} initialized", addr);
        Ok(())
    }

    fn read_calibrated(&mut self) -> Result<InertialReading, SensorError> {
        let raw = Self::read_uncalibrated(&mut self.bus, &self.desc)?;
        let calibrated = self.calibration.apply(raw);

        let mut smoothed = [0.0f32; CHANNELS];
        for ((out, filter), value) in smoothed
            .iter_mut()
            .zip(self.filters.iter_mut())
            .zip(calibrated)
        {
            *out = filter.update(value);
        }

        Ok(InertialReading {
            accel: Vector3 {
                x: smoothed[0],
                y: smoothed[1],
                z: smoothed[2],
            },
            gyro: self.desc.gyro_lsb_per_dps.map(|_| Vector3 {
                x: smoothed[3],
                y: smoothed[4],
                z: smoothed[5],
            }),
        })
    }

    fn calibrate(&mut self, samples: u32) -> CalibrationReport {
        let bus = &mut self.bus;
        let desc = &self.desc;
        let report = self.calibration.calibrate(
            samples,
            LEVEL_REFERENCE,
            &mut self.delay,
            IMU_SETTLE_MS,
            |_| Self::read_uncalibrated(bus, desc).ok(),
        );

        if report.applied() {
            // Smoothed history predates the new bias.
            self.filters.iter_mut().for_each(Ema::reset);
            let b = self.calibration.bias();
            info!(
                "IMU calibrated ({}/{}): accel bias {} {} {} g",
                report.accepted, report.requested, b[0], b[1], b[2]
            );
        }
        report
    }
}
