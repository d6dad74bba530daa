pub mod bus;
pub mod current;
pub mod imu;
pub mod thermal;

pub use bus::RegisterBus;
pub use current::{AdcChannel, CurrentChannel, ThreePhaseMeter};
pub use imu::{ImuModel, Inertial, InertialReading, Vector3};
pub use thermal::{Thermal, ThermalDescriptor};

use crate::calibration::CalibrationReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    /// Bring-up failed; the caller decides when to retry `initialize`.
    Init,
    /// A single bus or ADC transaction did not complete.
    Transaction,
    /// The transport carried an integrity check and it did not match.
    ChecksumMismatch,
    /// The identity register answered with an unexpected value.
    UnexpectedDevice(u8),
}

/// Capability set shared by every sensor variant.
///
/// `read_calibrated` either yields a fresh calibrated, smoothed value or an
/// error; on error no internal state (filters, bias) is touched, so the caller
/// keeps whatever it last had.
pub trait Sensor {
    type Reading: Copy;

    fn initialize(&mut self) -> Result<(), SensorError>;

    fn read_calibrated(&mut self) -> Result<Self::Reading, SensorError>;

    /// Run one calibration pass of `samples` reads against the variant's
    /// reference. Must not run while the same channel is being read elsewhere.
    fn calibrate(&mut self, samples: u32) -> CalibrationReport;
}
