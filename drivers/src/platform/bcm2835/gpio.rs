//! BCM2835 GPIO Controller Driver
//!
//! Raw register access plus the [`GpioChip`] implementation used by drivers.

use crate::hal::gpio::{GpioChip, GpioError, PinLevel};
use common::bitmap::{Bitmap, words_for};
use core::ptr::{addr_of, addr_of_mut, read_volatile, write_volatile};
use spin::Mutex;

/// GPIO base address.
pub const GPIO_BASE: usize = 0x2020_0000;

/// The BCM2835 exposes GPIO lines 0–53.
pub const NUM_LINES: u32 = 54;

/// GPIO function selection.
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Function {
    Input = 0b000,
    Output = 0b001,
}

/// Memory-mapped register layout.
#[repr(C)]
struct Registers {
    gpfsel: [u32; 6],
    _r0: u32,
    gpset: [u32; 2],
    _r1: u32,
    gpclr: [u32; 2],
    _r2: u32,
    gplev: [u32; 2],
}

fn pin_reg_and_bit(pin: u32) -> (usize, u32) {
    ((pin / 32) as usize, 1u32 << (pin % 32))
}

/// BCM2835 GPIO controller.
pub struct Bcm2835Gpio {
    regs: *mut Registers,
    /// Register writes and lease bookkeeping share this lock.
    leases: Mutex<Bitmap<{ words_for(NUM_LINES as usize) }>>,
}

// SAFETY: every register access happens with `leases` held.
unsafe impl Send for Bcm2835Gpio {}
unsafe impl Sync for Bcm2835Gpio {}

impl Bcm2835Gpio {
    /// Create a new GPIO controller.
    ///
    /// # Safety
    ///
    /// `base` must be the mapped address of the GPIO register block, valid for
    /// the lifetime of this object, and no other code may drive the block.
    pub const unsafe fn new(base: usize) -> Self {
        Self {
            regs: base as *mut Registers,
            leases: Mutex::new(Bitmap::new(NUM_LINES as usize)),
        }
    }

    fn check_pin(pin: u32) -> Result<(), GpioError> {
        if pin < NUM_LINES {
            Ok(())
        } else {
            Err(GpioError::InvalidPin)
        }
    }

    /// Caller holds `leases`.
    fn set_function(&self, pin: u32, func: Function) {
        let reg = (pin / 10) as usize;
        let shift = (pin % 10) * 3;
        let mask = 0b111 << shift;

        unsafe {
            let fsel = addr_of_mut!((*self.regs).gpfsel).cast::<u32>().add(reg);
            let val = read_volatile(fsel);
            write_volatile(fsel, (val & !mask) | ((func as u32) << shift));
        }
    }

    /// Caller holds `leases`.
    fn write_level(&self, pin: u32, level: PinLevel) {
        let (reg, bit) = pin_reg_and_bit(pin);

        unsafe {
            let target = match level {
                PinLevel::High => addr_of_mut!((*self.regs).gpset).cast::<u32>().add(reg),
                PinLevel::Low => addr_of_mut!((*self.regs).gpclr).cast::<u32>().add(reg),
            };
            write_volatile(target, bit);
        }
    }

    fn read_level(&self, pin: u32) -> PinLevel {
        let (reg, bit) = pin_reg_and_bit(pin);

        unsafe {
            let val = read_volatile(addr_of!((*self.regs).gplev).cast::<u32>().add(reg));
            PinLevel::from(val & bit != 0)
        }
    }

    fn with_leased<R>(&self, pin: u32, f: impl FnOnce() -> R) -> Result<R, GpioError> {
        Self::check_pin(pin)?;
        let leases = self.leases.lock();
        if !leases.is_set(pin as usize) {
            return Err(GpioError::NotRequested);
        }
        Ok(f())
    }
}

impl GpioChip for Bcm2835Gpio {
    fn name(&self) -> &str {
        "bcm2835-gpio"
    }

    fn is_valid(&self, pin: u32) -> bool {
        Self::check_pin(pin).is_ok()
    }

    fn request(&self, pin: u32, _label: &str) -> Result<(), GpioError> {
        Self::check_pin(pin)?;
        if self.leases.lock().set(pin as usize) {
            return Err(GpioError::Busy);
        }
        Ok(())
    }

    fn free(&self, pin: u32) {
        if !self.leases.lock().clear(pin as usize) {
            log::warn!("bcm2835-gpio: free of unrequested line {}", pin);
        }
    }

    fn direction_input(&self, pin: u32) -> Result<(), GpioError> {
        self.with_leased(pin, || self.set_function(pin, Function::Input))
    }

    fn direction_output(&self, pin: u32, level: PinLevel) -> Result<(), GpioError> {
        // Latch the level before switching the driver on.
        self.with_leased(pin, || {
            self.write_level(pin, level);
            self.set_function(pin, Function::Output);
        })
    }

    fn get(&self, pin: u32) -> Result<PinLevel, GpioError> {
        Self::check_pin(pin)?;
        let _guard = self.leases.lock();
        Ok(self.read_level(pin))
    }

    fn set(&self, pin: u32, level: PinLevel) -> Result<(), GpioError> {
        self.with_leased(pin, || self.write_level(pin, level))
    }
}
