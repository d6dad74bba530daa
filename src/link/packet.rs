//! Fixed-size wire records.
//!
//! Records are sent as their in-memory bytes: packed little-endian `f32`
//! fields, no header, no length prefix. Both ends build from this module, so a
//! frame whose length differs from the record is malformed by definition.

use bytemuck::{Pod, Zeroable};

use super::LinkError;

#[cfg(target_endian = "big")]
compile_error!("wire records are sent in native byte order and must be little-endian");

/// Fixed-size record that travels as raw bytes.
pub trait WirePacket: Pod {
    const SIZE: usize = core::mem::size_of::<Self>();

    fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Copies a received frame into a record. Only an exact-length frame is
    /// accepted; nothing is parsed out of a short or long one.
    fn from_frame(frame: &[u8]) -> Result<Self, LinkError> {
        if frame.len() != Self::SIZE {
            return Err(LinkError::MalformedFrame);
        }
        Ok(bytemuck::pod_read_unaligned(frame))
    }
}

/// Phase currents in amperes RMS, sent by the current node.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ThreePhaseCurrentPacket {
    pub ia: f32,
    pub ib: f32,
    pub ic: f32,
}

/// Everything the hub publishes in one notification.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorPacket {
    /// Acceleration in g.
    pub ax: f32,
    pub ay: f32,
    pub az: f32,
    /// Temperature in °C.
    pub temp: f32,
    /// Phase currents in amperes RMS.
    pub ia: f32,
    pub ib: f32,
    pub ic: f32,
}

const _: () = assert!(core::mem::size_of::<ThreePhaseCurrentPacket>() == 12);
const _: () = assert!(core::mem::size_of::<SensorPacket>() == 28);

impl WirePacket for ThreePhaseCurrentPacket {}
impl WirePacket for SensorPacket {}

const SQRT_2_3: f32 = 0.816_496_6;
const INV_SQRT_6: f32 = 0.408_248_3;

impl ThreePhaseCurrentPacket {
    /// Direct axis of the current Park vector.
    pub fn i_d(&self) -> f32 {
        SQRT_2_3 * self.ia - INV_SQRT_6 * self.ib - INV_SQRT_6 * self.ic
    }

    /// Quadrature axis of the current Park vector.
    pub fn i_q(&self) -> f32 {
        core::f32::consts::FRAC_1_SQRT_2 * (self.ib - self.ic)
    }

    /// Park vector modulus. Constant for a healthy balanced machine; ripple
    /// points at an unbalanced or faulty phase.
    pub fn park_modulus(&self) -> f32 {
        let (d, q) = (self.i_d(), self.i_q());
        libm::sqrtf(d * d + q * q)
    }
}

impl SensorPacket {
    pub fn new(accel: [f32; 3], temp: f32, currents: ThreePhaseCurrentPacket) -> Self {
        Self {
            ax: accel[0],
            ay: accel[1],
            az: accel[2],
            temp,
            ia: currents.ia,
            ib: currents.ib,
            ic: currents.ic,
        }
    }

    pub fn currents(&self) -> ThreePhaseCurrentPacket {
        ThreePhaseCurrentPacket {
            ia: self.ia,
            ib: self.ib,
            ic: self.ic,
        }
    }
}
