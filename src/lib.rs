#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod calibration;
pub mod config;
pub mod drivers;
pub mod filter;
pub mod ipc;
pub mod link;

#[cfg(feature = "firmware")]
pub mod board;
#[cfg(feature = "firmware")]
pub mod tasks;

#[cfg(feature = "firmware")]
pub use board::Board;
pub use drivers::{Sensor, SensorError};
pub use link::{LinkError, SensorPacket, ThreePhaseCurrentPacket};
