//! Simulated GPIO bank.
//!
//! Behaves like a controller whose lines are wired to a test bench: an output
//! line reads back what it drives, an input line reads whatever the bench
//! applies with [`SimGpio::drive_input`]. Every direction or level change is
//! recorded so tests can check for glitches.

use crate::hal::gpio::{Direction, GpioChip, GpioError, PinLevel};
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};
use spin::Mutex;

#[derive(Debug)]
struct Line {
    label: Option<String>,
    direction: Direction,
    driven: PinLevel,
    external: PinLevel,
    frees: usize,
    history: Vec<(Direction, PinLevel)>,
}

impl Line {
    fn new() -> Self {
        Self {
            label: None,
            direction: Direction::Input,
            driven: PinLevel::Low,
            external: PinLevel::Low,
            frees: 0,
            history: Vec::new(),
        }
    }

    fn level(&self) -> PinLevel {
        match self.direction {
            Direction::Output => self.driven,
            Direction::Input => self.external,
        }
    }

    fn record(&mut self) {
        let entry = (self.direction, self.level());
        self.history.push(entry);
    }
}

/// In-memory GPIO controller with `lines` lines numbered from zero.
pub struct SimGpio {
    lines: Mutex<Vec<Line>>,
    fail_next_direction: AtomicBool,
}

impl SimGpio {
    pub fn new(lines: usize) -> Self {
        Self {
            lines: Mutex::new((0..lines).map(|_| Line::new()).collect()),
            fail_next_direction: AtomicBool::new(false),
        }
    }

    fn with_line<R>(
        &self,
        pin: u32,
        f: impl FnOnce(&mut Line) -> Result<R, GpioError>,
    ) -> Result<R, GpioError> {
        let mut lines = self.lines.lock();
        let line = lines
            .get_mut(pin as usize)
            .ok_or(GpioError::InvalidPin)?;
        f(line)
    }

    fn with_requested<R>(
        &self,
        pin: u32,
        f: impl FnOnce(&mut Line) -> Result<R, GpioError>,
    ) -> Result<R, GpioError> {
        self.with_line(pin, |line| {
            if line.label.is_none() {
                return Err(GpioError::NotRequested);
            }
            f(line)
        })
    }

    fn take_fault(&self) -> Result<(), GpioError> {
        if self.fail_next_direction.swap(false, Ordering::AcqRel) {
            Err(GpioError::Io)
        } else {
            Ok(())
        }
    }

    /// Apply an external signal to `pin`; visible while it is an input.
    pub fn drive_input(&self, pin: u32, level: PinLevel) -> Result<(), GpioError> {
        self.with_line(pin, |line| {
            line.external = level;
            Ok(())
        })
    }

    /// Make the next direction change fail with [`GpioError::Io`].
    pub fn inject_fault(&self) {
        self.fail_next_direction.store(true, Ordering::Release);
    }

    /// Holder of `pin`, if leased.
    pub fn label(&self, pin: u32) -> Option<String> {
        self.with_line(pin, |line| Ok(line.label.clone())).ok().flatten()
    }

    pub fn direction(&self, pin: u32) -> Option<Direction> {
        self.with_line(pin, |line| Ok(line.direction)).ok()
    }

    /// The level the line currently presents.
    pub fn level(&self, pin: u32) -> Option<PinLevel> {
        self.with_line(pin, |line| Ok(line.level())).ok()
    }

    /// Every (direction, level) state `pin` went through, oldest first.
    pub fn history(&self, pin: u32) -> Vec<(Direction, PinLevel)> {
        self.with_line(pin, |line| Ok(line.history.clone()))
            .unwrap_or_default()
    }

    /// How many times `pin` has been freed.
    pub fn free_count(&self, pin: u32) -> usize {
        self.with_line(pin, |line| Ok(line.frees)).unwrap_or(0)
    }

    /// Number of lines currently leased.
    pub fn leased_count(&self) -> usize {
        self.lines
            .lock()
            .iter()
            .filter(|line| line.label.is_some())
            .count()
    }
}

impl GpioChip for SimGpio {
    fn name(&self) -> &str {
        "sim-gpio"
    }

    fn is_valid(&self, pin: u32) -> bool {
        (pin as usize) < self.lines.lock().len()
    }

    fn request(&self, pin: u32, label: &str) -> Result<(), GpioError> {
        self.with_line(pin, |line| {
            if line.label.is_some() {
                return Err(GpioError::Busy);
            }
            line.label = Some(label.to_string());
            Ok(())
        })
    }

    fn free(&self, pin: u32) {
        let freed = self.with_line(pin, |line| {
            line.frees += 1;
            Ok(line.label.take())
        });
        if !matches!(freed, Ok(Some(_))) {
            log::warn!("sim-gpio: free of unrequested line {}", pin);
        }
    }

    fn direction_input(&self, pin: u32) -> Result<(), GpioError> {
        self.with_requested(pin, |line| {
            self.take_fault()?;
            line.direction = Direction::Input;
            line.record();
            Ok(())
        })
    }

    fn direction_output(&self, pin: u32, level: PinLevel) -> Result<(), GpioError> {
        self.with_requested(pin, |line| {
            self.take_fault()?;
            line.driven = level;
            line.direction = Direction::Output;
            line.record();
            Ok(())
        })
    }

    fn get(&self, pin: u32) -> Result<PinLevel, GpioError> {
        self.with_line(pin, |line| Ok(line.level()))
    }

    fn set(&self, pin: u32, level: PinLevel) -> Result<(), GpioError> {
        self.with_requested(pin, |line| {
            line.driven = level;
            if line.direction == Direction::Output {
                line.record();
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_reads_external_signal() {
        let gpio = SimGpio::new(4);
        gpio.request(2, "t").unwrap();
        gpio.direction_input(2).unwrap();
        assert_eq!(gpio.get(2), Ok(PinLevel::Low));
        gpio.drive_input(2, PinLevel::High).unwrap();
        assert_eq!(gpio.get(2), Ok(PinLevel::High));
    }

    #[test]
    fn output_reads_back_driven_level() {
        let gpio = SimGpio::new(4);
        gpio.request(0, "t").unwrap();
        gpio.drive_input(0, PinLevel::High).unwrap();
        gpio.direction_output(0, PinLevel::Low).unwrap();
        assert_eq!(gpio.get(0), Ok(PinLevel::Low));
        gpio.set(0, PinLevel::High).unwrap();
        assert_eq!(gpio.level(0), Some(PinLevel::High));
        assert_eq!(
            gpio.history(0),
            [
                (Direction::Output, PinLevel::Low),
                (Direction::Output, PinLevel::High)
            ]
        );
    }

    #[test]
    fn unrequested_line_cannot_change_direction() {
        let gpio = SimGpio::new(4);
        assert_eq!(gpio.direction_input(1), Err(GpioError::NotRequested));
        assert_eq!(gpio.get(9), Err(GpioError::InvalidPin));
        assert_eq!(gpio.drive_input(4, PinLevel::High), Err(GpioError::InvalidPin));
        assert!(!gpio.is_valid(4));
    }

    #[test]
    fn injected_fault_hits_one_transition() {
        let gpio = SimGpio::new(4);
        gpio.request(1, "t").unwrap();
        gpio.inject_fault();
        assert_eq!(gpio.direction_output(1, PinLevel::High), Err(GpioError::Io));
        assert_eq!(gpio.direction(1), Some(Direction::Input));
        assert!(gpio.direction_output(1, PinLevel::High).is_ok());
    }
}
