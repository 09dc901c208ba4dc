//! BCM2835 (Raspberry Pi 1 / Zero) back-ends.

pub mod gpio;

pub use gpio::Bcm2835Gpio;
