//! Character-device subsystem.
//!
//! Device numbers are handed out by [`DeviceNumberRegistry`], bound to file
//! operations in the [`CdevMap`] dispatch table and published by name in
//! [`DevFs`]. [`MiscDevices`] strings the three together for single-minor
//! devices, and [`gpio_demo`](fs::dev::gpio_demo) is a misc driver exposing
//! one GPIO line as `/dev/gpio_demo`.
//!
//! ```
//! use std::sync::Arc;
//! use drivers::hal::gpio::GpioChip;
//! use drivers::platform::sim::SimGpio;
//! use kernel::fs::dev::CharDevices;
//! use kernel::fs::dev::gpio_demo::{GpioDemoModule, GpioDemoParams};
//! use kernel::fs::file::OpenFlags;
//!
//! let chardevs = CharDevices::new();
//! let chip: Arc<dyn GpioChip> = Arc::new(SimGpio::new(32));
//! let params = GpioDemoParams::parse("gpio=21 initial_value=1").unwrap();
//! let module = GpioDemoModule::init(&chardevs, chip, &params).unwrap();
//!
//! let mut file = chardevs.open("/dev/gpio_demo", OpenFlags::RDWR).unwrap();
//! let mut buf = [0u8; 8];
//! assert_eq!(file.read(&mut buf).unwrap(), 2);
//! assert_eq!(&buf[..2], b"1\n");
//! assert_eq!(file.read(&mut buf).unwrap(), 0);
//! drop(file);
//! module.exit();
//! ```

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod error;
pub mod fs;

pub use error::{DevError, Result};
pub use fs::dev::cdev::CdevMap;
pub use fs::dev::devfs::DevFs;
pub use fs::dev::devnum::DeviceNumberRegistry;
pub use fs::dev::misc::MiscDevices;
