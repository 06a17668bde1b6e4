//! AM2321 Sensor Driver for Embedded Rust
//!
//! This crate provides a platform-agnostic driver for the AM2321 temperature
//! and humidity sensor, built on top of the [`embedded-hal`] traits.
//!
//! The AM2321 talks an I2C-like protocol with its own timing and a wake-up
//! quirk: the sleeping sensor must see its address frame held for at least
//! 1.5 ms before it answers anything. The driver bit-bangs that protocol over
//! two GPIO lines.
//!
//! # Features
//! - Blocking synchronous API using `embedded-hal` traits
//! - Designed for `no_std` environments
//! - CRC-16/MODBUS validation of measurement frames
//! - Optional logging support via `defmt`
//!
//! # Dependencies
//! This driver depends on the following `embedded-hal` traits:
//! - [`InputPin`] and [`OutputPin`] for GPIO access
//! - [`DelayNs`] for accurate timing
//!
//! # Optional Features
//! - `defmt`: Implements `defmt::Format` for logging support and logs
//!   acknowledge and CRC failures
//!
//! # Example
//!
//! ```ignore
//! use am2321_sensor::{Am2321, OpenDrain};
//!
//! let mut sensor = Am2321::new(OpenDrain::new(sda), scl, delay);
//! sensor.begin()?;
//! let reading = sensor.read()?;
//! ```
//!
//! [`embedded-hal`]: https://docs.rs/embedded-hal
//! [`InputPin`]: embedded_hal::digital::InputPin
//! [`OutputPin`]: embedded_hal::digital::OutputPin
//! [`DelayNs`]: embedded_hal::delay::DelayNs

#![cfg_attr(not(test), no_std)]

pub mod am2321;
pub mod checksum;
pub mod error;
pub mod line;

#[cfg(test)]
mod sim;

pub use am2321::{
    Am2321, BUFFER_LEN, DEVICE_ADDRESS, DEVICE_ID_ERROR, MEASUREMENT_ERROR, READ_ALL_ERROR, Reading,
};
pub use checksum::{crc16, verify_crc};
pub use error::{Am2321Error, WriteStatus};
pub use line::{DataPin, Direction, OpenDrain};
