//! Character devices.
//!
//! [`CharDevices`] bundles the layers a char device passes through:
//!
//! ```text
//! open("/dev/name")
//!        ↓
//! DevFs           name → device number
//!        ↓
//! CdevMap         device number → file operations
//!        ↓
//! FileOperations  driver (e.g. gpio_demo)
//! ```

pub mod cdev;
pub mod devfs;
pub mod devnum;
pub mod gpio_demo;
pub mod misc;

use crate::error::{DevError, Result};
use crate::fs::file::{File, OpenFlags};
use alloc::sync::Arc;
use cdev::CdevMap;
use devfs::DevFs;
use devnum::{DeviceNumber, DeviceNumberRegistry};
use misc::MiscDevices;

/// Number registry, dispatch table, `/dev` and the misc class, wired together.
pub struct CharDevices {
    numbers: Arc<DeviceNumberRegistry>,
    cdev_map: Arc<CdevMap>,
    devfs: Arc<DevFs>,
    misc: MiscDevices,
}

impl CharDevices {
    pub fn new() -> Self {
        let numbers = Arc::new(DeviceNumberRegistry::new());
        let cdev_map = Arc::new(CdevMap::new());
        let devfs = Arc::new(DevFs::new());
        let misc = MiscDevices::new(numbers.clone(), cdev_map.clone(), devfs.clone());

        Self {
            numbers,
            cdev_map,
            devfs,
            misc,
        }
    }

    pub fn numbers(&self) -> &DeviceNumberRegistry {
        &self.numbers
    }

    pub fn cdev_map(&self) -> &CdevMap {
        &self.cdev_map
    }

    pub fn devfs(&self) -> &DevFs {
        &self.devfs
    }

    pub fn misc(&self) -> &MiscDevices {
        &self.misc
    }

    /// Open a device by `/dev` path or bare name.
    pub fn open(&self, path: &str, flags: OpenFlags) -> Result<File> {
        let name = path.strip_prefix("/dev/").unwrap_or(path);
        let node = self.devfs.lookup(name).ok_or(DevError::NotFound)?;
        self.open_dev(node.dev, flags)
    }

    /// Open a device by number.
    pub fn open_dev(&self, dev: DeviceNumber, flags: OpenFlags) -> Result<File> {
        let ops = self.cdev_map.resolve(dev)?;
        log::trace!("chrdev: open {}", dev);
        File::open(ops, dev, flags)
    }
}

impl Default for CharDevices {
    fn default() -> Self {
        Self::new()
    }
}

static CHAR_DEVICES: spin::Lazy<CharDevices> = spin::Lazy::new(CharDevices::new);

/// The process-wide char-device subsystem.
pub fn chardevs() -> &'static CharDevices {
    &CHAR_DEVICES
}
