//! Hardware Abstraction Layer (HAL) - Platform-Independent Traits
//!
//! These traits are implemented by the platform back-ends, so that driver
//! logic above them is written once and tested against the simulated bank.
//!
//! # Available Interfaces
//!
//! - [`gpio`]: General Purpose Input/Output lines

pub mod gpio;
