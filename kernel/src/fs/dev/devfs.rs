//! Device namespace.
//!
//! Names under `/dev` pointing at device numbers. Creating an entry does not
//! make a device reachable by itself; opens still go through the dispatch
//! table with the number the entry carries.

use crate::error::{DevError, Result};
use crate::fs::dev::devnum::DeviceNumber;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use spin::Mutex;

bitflags::bitflags! {
    /// Permission bits of a namespace entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Mode: u16 {
        const OWNER_READ = 0o400;
        const OWNER_WRITE = 0o200;
        const OWNER_EXEC = 0o100;
        const GROUP_READ = 0o040;
        const GROUP_WRITE = 0o020;
        const GROUP_EXEC = 0o010;
        const OTHER_READ = 0o004;
        const OTHER_WRITE = 0o002;
        const OTHER_EXEC = 0o001;
    }
}

impl Mode {
    /// Octal permission bits, e.g. `0o666`.
    pub const fn from_octal(bits: u16) -> Self {
        Self::from_bits_truncate(bits)
    }
}

impl Default for Mode {
    fn default() -> Self {
        Mode::OWNER_READ | Mode::OWNER_WRITE
    }
}

/// Publishes devices under a name.
pub trait DeviceNamespace: Send + Sync {
    /// Create entry `name` for `dev` with permissions `mode`.
    fn create(&self, name: &str, dev: DeviceNumber, mode: Mode) -> Result<()>;

    /// Remove entry `name`.
    fn destroy(&self, name: &str) -> Result<()>;
}

/// One `/dev` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevNode {
    pub name: String,
    pub dev: DeviceNumber,
    pub mode: Mode,
}

/// In-memory `/dev`.
pub struct DevFs {
    nodes: Mutex<BTreeMap<String, DevNode>>,
}

impl DevFs {
    pub const fn new() -> Self {
        Self {
            nodes: Mutex::new(BTreeMap::new()),
        }
    }

    fn validate_name(name: &str) -> Result<()> {
        if name.is_empty() || name.contains('/') || name == "." || name == ".." {
            Err(DevError::InvalidArgument)
        } else {
            Ok(())
        }
    }

    pub fn lookup(&self, name: &str) -> Option<DevNode> {
        self.nodes.lock().get(name).cloned()
    }

    /// Entry names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.nodes.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DeviceNamespace for DevFs {
    fn create(&self, name: &str, dev: DeviceNumber, mode: Mode) -> Result<()> {
        Self::validate_name(name)?;

        let mut nodes = self.nodes.lock();
        if nodes.contains_key(name) {
            return Err(DevError::Conflict);
        }
        nodes.insert(
            name.into(),
            DevNode {
                name: name.into(),
                dev,
                mode,
            },
        );
        log::debug!("devfs: created /dev/{} -> {} ({:o})", name, dev, mode.bits());
        Ok(())
    }

    fn destroy(&self, name: &str) -> Result<()> {
        if self.nodes.lock().remove(name).is_none() {
            return Err(DevError::NotFound);
        }
        log::debug!("devfs: removed /dev/{}", name);
        Ok(())
    }
}

impl Default for DevFs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::dev::devnum::Major;

    fn dev(minor: u32) -> DeviceNumber {
        DeviceNumber::new(Major::MISC, minor)
    }

    #[test]
    fn create_lookup_destroy() {
        let devfs = DevFs::new();
        devfs.create("gpio_demo", dev(128), Mode::from_octal(0o666)).unwrap();

        let node = devfs.lookup("gpio_demo").unwrap();
        assert_eq!(node.dev, dev(128));
        assert_eq!(node.mode.bits(), 0o666);
        assert_eq!(devfs.names(), ["gpio_demo"]);

        devfs.destroy("gpio_demo").unwrap();
        assert!(devfs.lookup("gpio_demo").is_none());
        assert_eq!(devfs.destroy("gpio_demo"), Err(DevError::NotFound));
    }

    #[test]
    fn duplicate_names_conflict() {
        let devfs = DevFs::new();
        devfs.create("a", dev(1), Mode::default()).unwrap();
        assert_eq!(devfs.create("a", dev(2), Mode::default()), Err(DevError::Conflict));
        assert_eq!(devfs.lookup("a").unwrap().dev, dev(1));
    }

    #[test]
    fn bad_names_are_rejected() {
        let devfs = DevFs::new();
        for name in ["", "a/b", ".", ".."] {
            assert_eq!(
                devfs.create(name, dev(1), Mode::default()),
                Err(DevError::InvalidArgument)
            );
        }
        assert!(devfs.is_empty());
    }

    #[test]
    fn octal_mode_drops_unknown_bits() {
        assert_eq!(Mode::from_octal(0o4755).bits(), 0o755);
        assert_eq!(Mode::default().bits(), 0o600);
    }
}
