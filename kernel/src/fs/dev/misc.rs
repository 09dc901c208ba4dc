//! Miscellaneous devices.
//!
//! A misc device is a single minor under major 10. Registration runs three
//! reversible steps:
//!
//! 1. take a minor (allocated from the dynamic pool, or the caller's static one)
//! 2. bind it to the device's file operations in the [`CdevMap`]
//! 3. publish the name in the device namespace
//!
//! If any step fails the ones already done are undone in reverse order.
//! Deregistration walks the same steps backwards: the name goes first so no
//! new open can find the device, then the binding, and the number is freed
//! last so it cannot be reused while still bound.

use crate::error::{DevError, Result};
use crate::fs::dev::cdev::{BindingId, CdevMap, DeviceRecord};
use crate::fs::dev::devfs::{DeviceNamespace, Mode};
use crate::fs::dev::devnum::{DeviceNumber, DeviceNumberRegistry, MISC_DYNAMIC_MINOR_BASE, Major};
use crate::fs::file::FileOperations;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

/// Minors reserved for the misc class, static and dynamic together.
const MISC_MINORS: u32 = 256;

/// How a misc device gets its minor.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MiscMinor {
    /// Take the first free minor from the dynamic pool.
    Dynamic,
    /// A fixed minor below [`MISC_DYNAMIC_MINOR_BASE`].
    Static(u32),
}

/// What a driver hands to [`MiscDevices::register`].
pub struct MiscDeviceDescriptor {
    pub name: String,
    pub minor: MiscMinor,
    pub ops: Arc<dyn FileOperations>,
    pub mode: Mode,
}

impl MiscDeviceDescriptor {
    /// Descriptor with a dynamic minor and default permissions.
    pub fn new(name: impl Into<String>, ops: Arc<dyn FileOperations>) -> Self {
        Self {
            name: name.into(),
            minor: MiscMinor::Dynamic,
            ops,
            mode: Mode::default(),
        }
    }

    pub fn minor(mut self, minor: MiscMinor) -> Self {
        self.minor = minor;
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }
}

/// A registered misc device. Give it back with [`MiscDevices::deregister`].
pub struct MiscDevice {
    name: String,
    record: DeviceRecord,
    dynamic: bool,
}

impl MiscDevice {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dev(&self) -> DeviceNumber {
        self.record.dev()
    }

    /// Whether the minor came from the dynamic pool.
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }
}

impl fmt::Debug for MiscDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiscDevice")
            .field("name", &self.name)
            .field("dev", &self.dev())
            .field("dynamic", &self.dynamic)
            .finish()
    }
}

enum Undo {
    FreeMinor(DeviceNumber),
    Unbind(BindingId),
}

/// Completed registration steps, undone on drop unless committed.
struct Rollback<'a> {
    misc: &'a MiscDevices,
    done: Vec<Undo>,
}

impl<'a> Rollback<'a> {
    fn new(misc: &'a MiscDevices) -> Self {
        Self {
            misc,
            done: Vec::new(),
        }
    }

    fn push(&mut self, step: Undo) {
        self.done.push(step);
    }

    fn commit(mut self) {
        self.done.clear();
    }
}

impl Drop for Rollback<'_> {
    fn drop(&mut self) {
        while let Some(step) = self.done.pop() {
            match step {
                Undo::Unbind(id) => self.misc.cdev_map.unbind_id(id),
                Undo::FreeMinor(dev) => self.misc.numbers.free(dev, 1),
            }
        }
    }
}

/// The misc device class.
pub struct MiscDevices {
    numbers: Arc<DeviceNumberRegistry>,
    cdev_map: Arc<CdevMap>,
    namespace: Arc<dyn DeviceNamespace>,
}

impl MiscDevices {
    /// Set up the misc class on top of the given layers and reserve its major.
    pub fn new(
        numbers: Arc<DeviceNumberRegistry>,
        cdev_map: Arc<CdevMap>,
        namespace: Arc<dyn DeviceNamespace>,
    ) -> Self {
        if let Err(err) = numbers.register_region(DeviceNumber::new(Major::MISC, 0), MISC_MINORS, "misc") {
            log::error!("misc: unable to get major {} for misc devices: {}", Major::MISC.get(), err);
        }

        Self {
            numbers,
            cdev_map,
            namespace,
        }
    }

    /// Make the device described by `desc` reachable under its name.
    pub fn register(&self, desc: MiscDeviceDescriptor) -> Result<MiscDevice> {
        let MiscDeviceDescriptor {
            name,
            minor,
            ops,
            mode,
        } = desc;
        let mut rollback = Rollback::new(self);

        let (dev, dynamic) = match minor {
            MiscMinor::Dynamic => {
                let dev = self.numbers.allocate(1, &name)?;
                rollback.push(Undo::FreeMinor(dev));
                (dev, true)
            }
            MiscMinor::Static(minor) => {
                if minor >= MISC_DYNAMIC_MINOR_BASE {
                    return Err(DevError::InvalidArgument);
                }
                let dev = DeviceNumber::new(Major::MISC, minor);
                if self.cdev_map.is_bound(dev) {
                    return Err(DevError::Conflict);
                }
                (dev, false)
            }
        };

        let record = self.cdev_map.bind(dev, 1, ops).inspect_err(|err| {
            log::warn!("misc: binding {} for {} failed: {}", dev, name, err);
        })?;
        rollback.push(Undo::Unbind(record.id()));

        self.namespace.create(&name, dev, mode).inspect_err(|err| {
            log::warn!("misc: creating /dev/{} failed: {}", name, err);
        })?;

        rollback.commit();
        log::info!("misc: registered /dev/{} as {}", name, dev);
        Ok(MiscDevice {
            name,
            record,
            dynamic,
        })
    }

    /// Tear down a device registered with [`register`](Self::register).
    pub fn deregister(&self, device: MiscDevice) {
        let MiscDevice {
            name,
            record,
            dynamic,
        } = device;
        let dev = record.dev();

        if let Err(err) = self.namespace.destroy(&name) {
            log::warn!("misc: /dev/{} already gone: {}", name, err);
        }
        self.cdev_map.unbind(record);
        if dynamic {
            self.numbers.free(dev, 1);
        }
        log::info!("misc: deregistered /dev/{} ({})", name, dev);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::dev::devfs::DevFs;
    use crate::fs::dev::devnum::DYNAMIC_MINORS;
    use crate::fs::file::OpenFile;

    struct Null;

    impl FileOperations for Null {
        fn read(&self, _file: &mut OpenFile, _buf: &mut [u8]) -> Result<usize> {
            Ok(0)
        }

        fn write(&self, _file: &mut OpenFile, buf: &[u8]) -> Result<usize> {
            Ok(buf.len())
        }
    }

    /// Namespace whose `create` always fails.
    struct Refusing;

    impl DeviceNamespace for Refusing {
        fn create(&self, _name: &str, _dev: DeviceNumber, _mode: Mode) -> Result<()> {
            Err(DevError::IoFailure)
        }

        fn destroy(&self, _name: &str) -> Result<()> {
            Err(DevError::NotFound)
        }
    }

    struct Fixture {
        numbers: Arc<DeviceNumberRegistry>,
        cdev_map: Arc<CdevMap>,
        devfs: Arc<DevFs>,
        misc: MiscDevices,
    }

    fn fixture() -> Fixture {
        let numbers = Arc::new(DeviceNumberRegistry::new());
        let cdev_map = Arc::new(CdevMap::new());
        let devfs = Arc::new(DevFs::new());
        let misc = MiscDevices::new(numbers.clone(), cdev_map.clone(), devfs.clone());
        Fixture {
            numbers,
            cdev_map,
            devfs,
            misc,
        }
    }

    fn null(name: &str) -> MiscDeviceDescriptor {
        MiscDeviceDescriptor::new(name, Arc::new(Null))
    }

    #[test]
    fn dynamic_registration_publishes_all_layers() {
        let fx = fixture();
        let device = fx
            .misc
            .register(null("null0").mode(Mode::from_octal(0o666)))
            .unwrap();

        assert!(device.is_dynamic());
        assert_eq!(device.dev(), DeviceNumber::new(Major::MISC, MISC_DYNAMIC_MINOR_BASE));
        assert!(fx.numbers.is_allocated(device.dev()));
        assert!(fx.cdev_map.resolve(device.dev()).is_ok());
        let node = fx.devfs.lookup("null0").unwrap();
        assert_eq!(node.dev, device.dev());
        assert_eq!(node.mode.bits(), 0o666);
    }

    #[test]
    fn misc_major_is_reserved() {
        let fx = fixture();
        assert!(fx.numbers.proc_devices().contains(" 10 misc\n"));
        assert_eq!(
            fx.numbers
                .register_region(DeviceNumber::new(Major::MISC, 5), 1, "other"),
            Err(DevError::Conflict)
        );
    }

    #[test]
    fn static_minor_is_used_as_given() {
        let fx = fixture();
        let device = fx.misc.register(null("watchdog").minor(MiscMinor::Static(63))).unwrap();
        assert!(!device.is_dynamic());
        assert_eq!(device.dev(), DeviceNumber::new(Major::MISC, 63));
        assert_eq!(fx.numbers.dynamic_in_use(), 0);
    }

    #[test]
    fn taken_static_minor_conflicts() {
        let fx = fixture();
        let _first = fx.misc.register(null("a").minor(MiscMinor::Static(1))).unwrap();
        let err = fx.misc.register(null("b").minor(MiscMinor::Static(1))).unwrap_err();
        assert_eq!(err, DevError::Conflict);
        assert!(fx.devfs.lookup("b").is_none());
    }

    #[test]
    fn static_minor_in_dynamic_range_is_rejected() {
        let fx = fixture();
        let err = fx
            .misc
            .register(null("a").minor(MiscMinor::Static(MISC_DYNAMIC_MINOR_BASE)))
            .unwrap_err();
        assert_eq!(err, DevError::InvalidArgument);
        assert!(fx.cdev_map.is_empty());
    }

    #[test]
    fn bind_conflict_returns_the_minor() {
        let fx = fixture();
        let squatter = DeviceNumber::new(Major::MISC, MISC_DYNAMIC_MINOR_BASE);
        let _record = fx.cdev_map.bind(squatter, 1, Arc::new(Null)).unwrap();

        assert_eq!(fx.misc.register(null("late")).unwrap_err(), DevError::Conflict);
        assert_eq!(fx.numbers.dynamic_in_use(), 0);
        assert_eq!(fx.cdev_map.len(), 1);
        assert!(fx.devfs.is_empty());
    }

    #[test]
    fn namespace_failure_unwinds_binding_and_minor() {
        let numbers = Arc::new(DeviceNumberRegistry::new());
        let cdev_map = Arc::new(CdevMap::new());
        let misc = MiscDevices::new(numbers.clone(), cdev_map.clone(), Arc::new(Refusing));

        assert_eq!(misc.register(null("x")).unwrap_err(), DevError::IoFailure);
        assert_eq!(numbers.dynamic_in_use(), 0);
        assert!(cdev_map.is_empty());
    }

    #[test]
    fn duplicate_name_unwinds() {
        let fx = fixture();
        let first = fx.misc.register(null("dup")).unwrap();
        assert_eq!(fx.misc.register(null("dup")).unwrap_err(), DevError::Conflict);
        assert_eq!(fx.numbers.dynamic_in_use(), 1);
        assert_eq!(fx.cdev_map.len(), 1);
        assert_eq!(fx.devfs.lookup("dup").unwrap().dev, first.dev());
    }

    #[test]
    fn deregister_unpublishes_and_frees() {
        let fx = fixture();
        let device = fx.misc.register(null("gone")).unwrap();
        let dev = device.dev();

        fx.misc.deregister(device);
        assert!(fx.devfs.lookup("gone").is_none());
        assert_eq!(fx.cdev_map.resolve(dev).err(), Some(DevError::NotFound));
        assert!(!fx.numbers.is_allocated(dev));

        let again = fx.misc.register(null("again")).unwrap();
        assert_eq!(again.dev(), dev);
    }

    #[test]
    fn deregister_keeps_static_minor_out_of_pool() {
        let fx = fixture();
        let dynamic = fx.misc.register(null("d")).unwrap();
        let fixed = fx.misc.register(null("s").minor(MiscMinor::Static(7))).unwrap();
        fx.misc.deregister(fixed);
        assert!(fx.numbers.is_allocated(dynamic.dev()));
        assert_eq!(fx.numbers.dynamic_in_use(), 1);
    }

    #[test]
    fn pool_exhaustion_leaves_nothing_behind() {
        let fx = fixture();
        let devices: Vec<_> = (0..DYNAMIC_MINORS)
            .map(|i| fx.misc.register(null(&std::format!("d{}", i))).unwrap())
            .collect();
        assert_eq!(
            fx.misc.register(null("overflow")).unwrap_err(),
            DevError::ResourceExhausted
        );
        assert_eq!(fx.devfs.len(), DYNAMIC_MINORS);
        assert_eq!(fx.cdev_map.len(), DYNAMIC_MINORS);
        for device in devices {
            fx.misc.deregister(device);
        }
        assert_eq!(fx.numbers.dynamic_in_use(), 0);
    }
}
