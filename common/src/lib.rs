//! Shared building blocks for the driver and kernel crates.
//!
//! - [`bitmap`]: fixed-capacity bit-set used for number and lease bookkeeping

#![cfg_attr(not(test), no_std)]

pub mod bitmap;

pub use bitmap::{Bitmap, words_for};
