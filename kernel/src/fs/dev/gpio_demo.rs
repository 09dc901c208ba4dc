//! `/dev/gpio_demo`: one GPIO line as a misc char device.
//!
//! - read: the current level as `"0\n"` or `"1\n"`, once per open; later
//!   reads on the same open return end-of-file
//! - write: the first byte, `'0'` or `'1'`, sets the level; an input line is
//!   switched to output at that level
//! - ioctl: [`GPIODEMO_SET_DIR_OUT`] / [`GPIODEMO_SET_DIR_IN`] switch direction
//!
//! The line's lease and direction are shared by every open of the device and
//! guarded by one lock, so a direction change and a level change are never
//! seen half-applied.

use crate::error::{DevError, Result};
use crate::fs::dev::CharDevices;
use crate::fs::dev::devfs::Mode;
use crate::fs::dev::devnum::DeviceNumber;
use crate::fs::dev::misc::{MiscDevice, MiscDeviceDescriptor};
use crate::fs::file::{FileOperations, OpenFile};
use crate::fs::ioctl;
use alloc::sync::Arc;
use drivers::hal::gpio::{Direction, GpioChip, PinLease, PinLevel};
use spin::Mutex;

/// Device and lease label.
pub const DEVICE_NAME: &str = "gpio_demo";

pub const GPIODEMO_IOC_MAGIC: u8 = b'G';
/// Switch to output, keeping the current level.
pub const GPIODEMO_SET_DIR_OUT: u32 = ioctl::io(GPIODEMO_IOC_MAGIC, 0);
/// Switch to input.
pub const GPIODEMO_SET_DIR_IN: u32 = ioctl::io(GPIODEMO_IOC_MAGIC, 1);

/// Size of the write staging buffer; one byte is kept for the terminator.
const WRITE_STAGING: usize = 8;

/// Load-time parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpioDemoParams {
    /// Line to control (required, `-1` when unset).
    pub gpio: i32,
    /// Start as an output.
    pub initial_is_output: bool,
    /// Output level when starting as an output; non-zero means high.
    pub initial_value: i32,
}

impl Default for GpioDemoParams {
    fn default() -> Self {
        Self {
            gpio: -1,
            initial_is_output: true,
            initial_value: 0,
        }
    }
}

impl GpioDemoParams {
    /// Parse `key=value` pairs separated by whitespace, as given at load time:
    ///
    /// ```
    /// use kernel::fs::dev::gpio_demo::GpioDemoParams;
    ///
    /// let params = GpioDemoParams::parse("gpio=21 initial_is_output=n").unwrap();
    /// assert_eq!(params.gpio, 21);
    /// assert!(!params.initial_is_output);
    /// assert_eq!(params.initial_value, 0);
    /// ```
    pub fn parse(args: &str) -> Result<Self> {
        let mut params = Self::default();

        for arg in args.split_whitespace() {
            let (key, value) = arg.split_once('=').ok_or(DevError::InvalidArgument)?;
            match key {
                "gpio" => params.gpio = parse_int(value)?,
                "initial_is_output" => params.initial_is_output = parse_bool(value)?,
                "initial_value" => params.initial_value = parse_int(value)?,
                _ => {
                    log::warn!("gpio_demo: unknown parameter '{}'", key);
                    return Err(DevError::InvalidArgument);
                }
            }
        }

        Ok(params)
    }

    /// Level to drive when starting as an output.
    pub fn initial_level(&self) -> PinLevel {
        PinLevel::from(self.initial_value != 0)
    }
}

fn parse_int(value: &str) -> Result<i32> {
    value.parse().map_err(|_| DevError::InvalidArgument)
}

fn parse_bool(value: &str) -> Result<bool> {
    match value {
        "1" | "y" | "Y" | "true" => Ok(true),
        "0" | "n" | "N" | "false" => Ok(false),
        _ => Err(DevError::InvalidArgument),
    }
}

struct GpioState {
    /// `None` once the module has let go of the line.
    lease: Option<PinLease>,
    direction: Direction,
}

impl GpioState {
    fn lease(&mut self) -> Result<&mut PinLease> {
        self.lease.as_mut().ok_or(DevError::NoDevice)
    }

    /// Direction is only recorded once the hardware accepted it.
    fn set_output(&mut self, level: PinLevel) -> Result<()> {
        self.lease()?.direction_output(level)?;
        self.direction = Direction::Output;
        Ok(())
    }

    fn set_input(&mut self) -> Result<()> {
        self.lease()?.direction_input()?;
        self.direction = Direction::Input;
        Ok(())
    }
}

/// The GPIO line driver behind `/dev/gpio_demo`.
pub struct GpioDemo {
    gpio: u32,
    state: Mutex<GpioState>,
}

impl GpioDemo {
    /// Lease the configured line and put it in its initial direction.
    ///
    /// On failure the line is handed back before returning.
    pub fn new(chip: Arc<dyn GpioChip>, params: &GpioDemoParams) -> Result<Self> {
        let gpio = u32::try_from(params.gpio)
            .ok()
            .filter(|gpio| chip.is_valid(*gpio))
            .ok_or_else(|| {
                log::error!(
                    "gpio_demo: invalid gpio={}, please load with gpio=<num>",
                    params.gpio
                );
                DevError::InvalidArgument
            })?;

        let lease = PinLease::request(chip, gpio, DEVICE_NAME).map_err(|err| {
            log::error!("gpio_demo: request of gpio {} failed: {}", gpio, err);
            DevError::from(err)
        })?;

        let driver = Self {
            gpio,
            state: Mutex::new(GpioState {
                lease: Some(lease),
                direction: Direction::Input,
            }),
        };

        {
            let mut state = driver.state.lock();
            let initial = if params.initial_is_output {
                state.set_output(params.initial_level())
            } else {
                state.set_input()
            };
            initial.inspect_err(|err| {
                log::error!("gpio_demo: set initial direction failed: {}", err);
            })?;
        }

        Ok(driver)
    }

    pub fn gpio(&self) -> u32 {
        self.gpio
    }

    pub fn direction(&self) -> Direction {
        self.state.lock().direction
    }

    /// Whether the driver still holds its line.
    pub fn is_attached(&self) -> bool {
        self.state.lock().lease.is_some()
    }

    /// Hand the line back. Later calls, and file operations, find it gone.
    ///
    /// Returns whether this call released the lease.
    pub fn shutdown(&self) -> bool {
        let lease = self.state.lock().lease.take();
        match lease {
            Some(lease) => {
                lease.release();
                true
            }
            None => false,
        }
    }
}

impl FileOperations for GpioDemo {
    fn open(&self, file: &mut OpenFile) -> Result<()> {
        let attached = self
            .state
            .lock()
            .lease
            .as_ref()
            .is_some_and(PinLease::is_valid);
        if !attached {
            return Err(DevError::NoDevice);
        }
        file.pos = 0;
        log::trace!("gpio_demo: open {}", file.dev());
        Ok(())
    }

    fn read(&self, file: &mut OpenFile, buf: &mut [u8]) -> Result<usize> {
        let level = {
            let mut state = self.state.lock();
            let lease = state.lease()?;
            // One snapshot per open; reopen to read again.
            if file.pos > 0 {
                return Ok(0);
            }
            lease.level()?
        };

        let snapshot = [level.as_ascii(), b'\n'];
        let len = snapshot.len().min(buf.len());
        buf[..len].copy_from_slice(&snapshot[..len]);
        file.pos += len as u64;
        Ok(len)
    }

    fn write(&self, _file: &mut OpenFile, buf: &[u8]) -> Result<usize> {
        let mut state = self.state.lock();
        state.lease()?;

        let Some(&first) = buf.first() else {
            return Ok(0);
        };
        let count = buf.len().min(WRITE_STAGING - 1);

        let level = match first {
            b'0' => PinLevel::Low,
            b'1' => PinLevel::High,
            _ => return Err(DevError::InvalidArgument),
        };

        let direction = state.direction;
        match direction {
            Direction::Input => state.set_output(level).map_err(|err| match err {
                DevError::NoDevice => err,
                _ => DevError::IoFailure,
            })?,
            Direction::Output => state.lease()?.set_level(level)?,
        }
        log::trace!("gpio_demo: gpio {} <- {}", self.gpio, level.as_bit());

        Ok(count)
    }

    fn ioctl(&self, _file: &mut OpenFile, cmd: u32, _arg: usize) -> Result<usize> {
        if ioctl::ioc_type(cmd) != GPIODEMO_IOC_MAGIC {
            return Err(DevError::NotSupported);
        }

        let mut state = self.state.lock();
        match cmd {
            GPIODEMO_SET_DIR_OUT => {
                let level = state.lease()?.level()?;
                state.set_output(level)?;
            }
            GPIODEMO_SET_DIR_IN => state.set_input()?,
            _ => return Err(DevError::NotSupported),
        }
        log::debug!("gpio_demo: gpio {} direction {}", self.gpio, state.direction.as_str());

        Ok(0)
    }

    fn release(&self, file: &mut OpenFile) -> Result<()> {
        log::trace!("gpio_demo: release {}", file.dev());
        Ok(())
    }
}

/// A loaded `gpio_demo` module: the driver plus its `/dev` registration.
///
/// Unloads on drop; [`exit`](Self::exit) does the same explicitly.
pub struct GpioDemoModule<'a> {
    chardevs: &'a CharDevices,
    driver: Arc<GpioDemo>,
    device: Option<MiscDevice>,
    dev: DeviceNumber,
}

impl<'a> GpioDemoModule<'a> {
    /// Build the driver and publish it as `/dev/gpio_demo`.
    pub fn init(
        chardevs: &'a CharDevices,
        chip: Arc<dyn GpioChip>,
        params: &GpioDemoParams,
    ) -> Result<Self> {
        let driver = Arc::new(GpioDemo::new(chip, params)?);

        let desc = MiscDeviceDescriptor::new(DEVICE_NAME, driver.clone()).mode(Mode::from_octal(0o666));
        let device = chardevs.misc().register(desc).map_err(|err| {
            log::error!("gpio_demo: misc_register failed: {}", err);
            driver.shutdown();
            err
        })?;

        log::info!(
            "gpio_demo: loaded. gpio={}, dir={}, /dev/{} ready",
            driver.gpio(),
            driver.direction().as_str(),
            device.name()
        );

        Ok(Self {
            chardevs,
            driver,
            dev: device.dev(),
            device: Some(device),
        })
    }

    pub fn driver(&self) -> &Arc<GpioDemo> {
        &self.driver
    }

    /// Number the device was registered under.
    pub fn dev(&self) -> DeviceNumber {
        self.dev
    }

    /// Unpublish the device, then release the line.
    pub fn exit(self) {}

    fn teardown(&mut self) {
        if let Some(device) = self.device.take() {
            self.chardevs.misc().deregister(device);
        }
        if self.driver.shutdown() {
            log::info!("gpio_demo: unloaded");
        }
    }
}

impl GpioDemoModule<'static> {
    /// Load into the process-wide subsystem with `key=value` parameters.
    pub fn load(chip: Arc<dyn GpioChip>, args: &str) -> Result<Self> {
        let params = GpioDemoParams::parse(args)?;
        Self::init(super::chardevs(), chip, &params)
    }
}

impl Drop for GpioDemoModule<'_> {
    fn drop(&mut self) {
        self.teardown();
    }
}
