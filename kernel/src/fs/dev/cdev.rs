//! Dispatch from device numbers to file operations.
//!
//! Each binding pairs a number range with a [`CdevProbe`]. Lookup asks the
//! probes whether they own the number and then takes a reference to the
//! winner's handler, so an open keeps working after the binding is gone.

use crate::error::{DevError, Result};
use crate::fs::dev::devnum::DeviceNumber;
use crate::fs::file::FileOperations;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use spin::Mutex;

/// Ownership test and handler accessor for one bound range.
pub trait CdevProbe: Send + Sync {
    /// Whether `dev` belongs to this binding.
    fn matches(&self, dev: DeviceNumber) -> bool;

    /// Take a reference to the handler.
    ///
    /// The reference outlives the binding, so an open that got one keeps
    /// working after unbind. `None` declines the open.
    fn lock(&self) -> Option<Arc<dyn FileOperations>>;
}

/// A range of device numbers served by one handler.
pub struct Cdev {
    dev: DeviceNumber,
    count: u32,
    ops: Arc<dyn FileOperations>,
}

impl Cdev {
    pub fn new(dev: DeviceNumber, count: u32, ops: Arc<dyn FileOperations>) -> Self {
        Self { dev, count, ops }
    }
}

impl CdevProbe for Cdev {
    fn matches(&self, dev: DeviceNumber) -> bool {
        dev.within(self.dev, self.count)
    }

    fn lock(&self) -> Option<Arc<dyn FileOperations>> {
        Some(self.ops.clone())
    }
}

/// Opaque identity of a binding.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BindingId(u64);

struct Binding {
    id: BindingId,
    first: DeviceNumber,
    count: u32,
    probe: Arc<dyn CdevProbe>,
}

/// Proof of a live binding, returned by [`CdevMap::bind`].
///
/// Not `Clone`: the record is consumed by [`CdevMap::unbind`].
pub struct DeviceRecord {
    id: BindingId,
    dev: DeviceNumber,
    count: u32,
    cdev: Arc<Cdev>,
}

impl DeviceRecord {
    pub fn id(&self) -> BindingId {
        self.id
    }

    pub fn dev(&self) -> DeviceNumber {
        self.dev
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn ops(&self) -> &Arc<dyn FileOperations> {
        &self.cdev.ops
    }
}

impl fmt::Debug for DeviceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRecord")
            .field("id", &self.id)
            .field("dev", &self.dev)
            .field("count", &self.count)
            .finish()
    }
}

struct Inner {
    bindings: Vec<Binding>,
    next_id: u64,
}

/// The number-to-handler dispatch table.
pub struct CdevMap {
    inner: Mutex<Inner>,
}

impl CdevMap {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                bindings: Vec::new(),
                next_id: 0,
            }),
        }
    }

    /// Bind `count` numbers starting at `dev` to `ops`.
    pub fn bind(
        &self,
        dev: DeviceNumber,
        count: u32,
        ops: Arc<dyn FileOperations>,
    ) -> Result<DeviceRecord> {
        if count == 0 || dev.minor() as u64 + count as u64 > DeviceNumber::MINOR_MASK as u64 + 1 {
            return Err(DevError::InvalidArgument);
        }

        let mut inner = self.inner.lock();
        let overlaps = inner.bindings.iter().any(|b| {
            b.first.major() == dev.major()
                && (b.first.minor() as u64) < dev.minor() as u64 + count as u64
                && (dev.minor() as u64) < b.first.minor() as u64 + b.count as u64
        });
        if overlaps {
            return Err(DevError::Conflict);
        }

        let id = BindingId(inner.next_id);
        inner.next_id += 1;

        let cdev = Arc::new(Cdev::new(dev, count, ops));
        inner.bindings.push(Binding {
            id,
            first: dev,
            count,
            probe: cdev.clone(),
        });
        log::debug!("chrdev: bound {} (+{})", dev, count);

        Ok(DeviceRecord {
            id,
            dev,
            count,
            cdev,
        })
    }

    /// Handler owning `dev`.
    pub fn resolve(&self, dev: DeviceNumber) -> Result<Arc<dyn FileOperations>> {
        let inner = self.inner.lock();
        inner
            .bindings
            .iter()
            .rev()
            .find(|b| b.probe.matches(dev))
            .and_then(|b| b.probe.lock())
            .ok_or(DevError::NotFound)
    }

    /// Remove the binding described by `record`.
    pub fn unbind(&self, record: DeviceRecord) {
        self.unbind_id(record.id);
    }

    pub(crate) fn unbind_id(&self, id: BindingId) {
        let mut inner = self.inner.lock();
        match inner.bindings.iter().position(|b| b.id == id) {
            Some(idx) => {
                let binding = inner.bindings.remove(idx);
                log::debug!("chrdev: unbound {} (+{})", binding.first, binding.count);
            }
            None => log::warn!("chrdev: unbind of unknown binding {:?}", id),
        }
    }

    /// Whether some binding owns `dev`.
    pub fn is_bound(&self, dev: DeviceNumber) -> bool {
        self.inner.lock().bindings.iter().any(|b| b.probe.matches(dev))
    }

    /// Number of live bindings.
    pub fn len(&self) -> usize {
        self.inner.lock().bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CdevMap {
    fn default() -> Self {
        Self::new()
    }
}
