//! Hardware Driver Subsystem
//!
//! # Module Organization
//!
//! - [`hal`]: Platform-independent trait definitions
//! - [`platform`]: Platform-specific back-ends (SoC level) and the simulated
//!   bank used on hosts without real hardware
//!
//! Drivers never own a GPIO controller. They lease single lines from a shared
//! [`GpioChip`] through a [`PinLease`], which hands the line back when dropped.
//!
//! # Usage Example
//!
//! ```
//! use std::sync::Arc;
//! use drivers::hal::gpio::{GpioChip, PinLease, PinLevel};
//! use drivers::platform::sim::SimGpio;
//!
//! let chip: Arc<dyn GpioChip> = Arc::new(SimGpio::new(32));
//! let mut led = PinLease::request(chip, 21, "led").unwrap();
//! led.direction_output(PinLevel::High).unwrap();
//! assert_eq!(led.level().unwrap(), PinLevel::High);
//! ```

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod hal;
pub mod platform;

// Re-export commonly used types
pub use hal::gpio::{Direction, GpioChip, GpioError, PinLease, PinLevel};
