//! GPIO (General Purpose Input/Output) Hardware Abstraction Layer.
//!
//! A [`GpioChip`] is the controller-wide capability: it knows which line
//! numbers exist, who holds each line and how to drive or sense it. Drivers
//! talk to it through a [`PinLease`], the exclusive hold on one line.

use alloc::sync::Arc;
use core::fmt;

/// Pin logic level.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PinLevel {
    /// Logic low (0V or ground).
    Low,
    /// Logic high (VDD or 3.3V/5V depending on system).
    High,
}

impl PinLevel {
    /// The level as a bit value, `0` or `1`.
    pub const fn as_bit(self) -> u8 {
        match self {
            PinLevel::Low => 0,
            PinLevel::High => 1,
        }
    }

    /// The level as an ASCII digit, `b'0'` or `b'1'`.
    pub const fn as_ascii(self) -> u8 {
        b'0' + self.as_bit()
    }
}

impl From<bool> for PinLevel {
    fn from(value: bool) -> Self {
        if value {
            PinLevel::High
        } else {
            PinLevel::Low
        }
    }
}

impl From<PinLevel> for bool {
    fn from(level: PinLevel) -> bool {
        matches!(level, PinLevel::High)
    }
}

/// Whether a line senses (`Input`) or drives (`Output`) its signal.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::Input => "in",
            Direction::Output => "out",
        }
    }
}

/// GPIO errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GpioError {
    /// The line number does not name a line of this controller.
    InvalidPin,
    /// The line is already leased.
    Busy,
    /// The operation needs a leased line.
    NotRequested,
    /// The controller failed to apply the change.
    Io,
}

impl fmt::Display for GpioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            GpioError::InvalidPin => "invalid gpio line",
            GpioError::Busy => "gpio line already requested",
            GpioError::NotRequested => "gpio line not requested",
            GpioError::Io => "gpio controller i/o failure",
        };
        f.write_str(msg)
    }
}

/// GPIO controller capability.
///
/// Every method takes `&self`; implementations serialize register access
/// internally so one controller can be shared by several drivers.
pub trait GpioChip: Send + Sync {
    /// Controller name for diagnostics.
    fn name(&self) -> &str;

    /// Whether `pin` names a real line of this controller.
    fn is_valid(&self, pin: u32) -> bool;

    /// Mark `pin` as held by `label`.
    fn request(&self, pin: u32, label: &str) -> Result<(), GpioError>;

    /// Release a line taken with [`GpioChip::request`].
    fn free(&self, pin: u32);

    /// Configure `pin` as an input.
    fn direction_input(&self, pin: u32) -> Result<(), GpioError>;

    /// Configure `pin` as an output driving `level`, in a single step.
    fn direction_output(&self, pin: u32, level: PinLevel) -> Result<(), GpioError>;

    /// Current level seen on `pin`.
    fn get(&self, pin: u32) -> Result<PinLevel, GpioError>;

    /// Drive `pin` to `level`.
    fn set(&self, pin: u32, level: PinLevel) -> Result<(), GpioError>;
}

/// Exclusive hold on one GPIO line.
///
/// Created by [`PinLease::request`]; the line goes back to the controller
/// exactly once, when the lease is dropped or [`released`](PinLease::release).
/// The type is deliberately not `Clone`.
pub struct PinLease {
    chip: Arc<dyn GpioChip>,
    pin: u32,
}

impl PinLease {
    /// Lease `pin` from `chip` under `label`.
    pub fn request(chip: Arc<dyn GpioChip>, pin: u32, label: &str) -> Result<Self, GpioError> {
        if !chip.is_valid(pin) {
            return Err(GpioError::InvalidPin);
        }
        chip.request(pin, label)?;
        log::debug!("gpio: {} leased line {} to {}", chip.name(), pin, label);
        Ok(Self { chip, pin })
    }

    /// The leased line number.
    pub fn pin(&self) -> u32 {
        self.pin
    }

    /// Whether the line is still backed by the controller.
    pub fn is_valid(&self) -> bool {
        self.chip.is_valid(self.pin)
    }

    pub fn direction_input(&mut self) -> Result<(), GpioError> {
        self.chip.direction_input(self.pin)
    }

    pub fn direction_output(&mut self, level: PinLevel) -> Result<(), GpioError> {
        self.chip.direction_output(self.pin, level)
    }

    pub fn level(&self) -> Result<PinLevel, GpioError> {
        self.chip.get(self.pin)
    }

    pub fn set_level(&mut self, level: PinLevel) -> Result<(), GpioError> {
        self.chip.set(self.pin, level)
    }

    /// Hand the line back now instead of at scope end.
    pub fn release(self) {}
}

impl Drop for PinLease {
    fn drop(&mut self) {
        log::debug!("gpio: {} released line {}", self.chip.name(), self.pin);
        self.chip.free(self.pin);
    }
}

impl fmt::Debug for PinLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinLease")
            .field("chip", &self.chip.name())
            .field("pin", &self.pin)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::sim::SimGpio;

    fn chip() -> (Arc<SimGpio>, Arc<dyn GpioChip>) {
        let sim = Arc::new(SimGpio::new(8));
        let dyn_chip: Arc<dyn GpioChip> = sim.clone();
        (sim, dyn_chip)
    }

    #[test]
    fn level_digits() {
        assert_eq!(PinLevel::Low.as_ascii(), b'0');
        assert_eq!(PinLevel::High.as_ascii(), b'1');
        assert_eq!(PinLevel::from(true), PinLevel::High);
        assert!(!bool::from(PinLevel::Low));
    }

    #[test]
    fn lease_is_exclusive() {
        let (_, chip) = chip();
        let first = PinLease::request(chip.clone(), 3, "first").unwrap();
        assert_eq!(
            PinLease::request(chip.clone(), 3, "second").unwrap_err(),
            GpioError::Busy
        );
        drop(first);
        assert!(PinLease::request(chip, 3, "second").is_ok());
    }

    #[test]
    fn invalid_line_is_rejected_before_request() {
        let (sim, chip) = chip();
        assert_eq!(
            PinLease::request(chip, 8, "nope").unwrap_err(),
            GpioError::InvalidPin
        );
        assert_eq!(sim.leased_count(), 0);
    }

    #[test]
    fn release_frees_exactly_once() {
        let (sim, chip) = chip();
        let lease = PinLease::request(chip, 1, "once").unwrap();
        assert_eq!(sim.label(1).as_deref(), Some("once"));
        lease.release();
        assert_eq!(sim.label(1), None);
        assert_eq!(sim.free_count(1), 1);
    }
}
