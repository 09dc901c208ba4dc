//! Device numbers and their registry.
//!
//! Two kinds of reservations live here: dynamic misc minors, handed out from a
//! bitmap one at a time, and char-device regions, contiguous minor ranges
//! under a major (`register_chrdev_region` style) that are what
//! `/proc/devices` reports.

use crate::error::{DevError, Result};
use alloc::string::String;
use alloc::vec::Vec;
use common::bitmap::{Bitmap, words_for};
use core::fmt;
use core::fmt::Write;
use core::ops::RangeInclusive;
use spin::Mutex;

/// Major (class) part of a device number.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Major(u32);

impl Major {
    /// Miscellaneous single-minor devices.
    pub const MISC: Self = Self::new(10);

    pub const fn new(x: u32) -> Self {
        Major(x)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

/// Composite (major, minor) device number.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceNumber {
    data: u32,
}

impl DeviceNumber {
    pub const MINOR_BITS: u32 = 20;
    pub const MINOR_MASK: u32 = (1 << Self::MINOR_BITS) - 1;

    pub const fn new(major: Major, minor: u32) -> Self {
        Self {
            data: (major.get() << Self::MINOR_BITS) | (minor & Self::MINOR_MASK),
        }
    }

    pub const fn major(self) -> Major {
        Major::new(self.data >> Self::MINOR_BITS)
    }

    pub const fn minor(self) -> u32 {
        self.data & Self::MINOR_MASK
    }

    pub const fn data(self) -> u32 {
        self.data
    }

    /// Whether `self` lies in the `count` minors starting at `first`.
    pub const fn within(self, first: DeviceNumber, count: u32) -> bool {
        self.major().get() == first.major().get()
            && self.minor() >= first.minor()
            && (self.minor() - first.minor()) < count
    }
}

impl fmt::Display for DeviceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.major().get(), self.minor())
    }
}

impl fmt::Debug for DeviceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceNumber({}:{})", self.major().get(), self.minor())
    }
}

/// First misc minor handed out dynamically.
pub const MISC_DYNAMIC_MINOR_BASE: u32 = 128;

/// Number of dynamically assignable misc minors.
pub const DYNAMIC_MINORS: usize = 128;

/// Majors searched, highest first, by [`DeviceNumberRegistry::alloc_region`].
const DYNAMIC_MAJORS: RangeInclusive<u32> = 234..=254;

/// Whether two minor ranges under the same major intersect.
fn ranges_overlap(a: DeviceNumber, a_count: u32, b: DeviceNumber, b_count: u32) -> bool {
    let a_end = a.minor() as u64 + a_count as u64;
    let b_end = b.minor() as u64 + b_count as u64;
    a.major() == b.major() && (a.minor() as u64) < b_end && (b.minor() as u64) < a_end
}

/// A reserved char-device region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub first: DeviceNumber,
    pub count: u32,
    pub name: String,
}

struct Inner {
    minors: Bitmap<{ words_for(DYNAMIC_MINORS) }>,
    regions: Vec<Region>,
}

/// Allocator for device numbers.
pub struct DeviceNumberRegistry {
    inner: Mutex<Inner>,
}

impl DeviceNumberRegistry {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                minors: Bitmap::new(DYNAMIC_MINORS),
                regions: Vec::new(),
            }),
        }
    }

    /// Reserve `count` contiguous dynamic misc minors.
    ///
    /// The scan and the marking happen under one lock, so concurrent callers
    /// never receive the same minor.
    pub fn allocate(&self, count: u32, label: &str) -> Result<DeviceNumber> {
        if count == 0 {
            return Err(DevError::InvalidArgument);
        }

        let start = self
            .inner
            .lock()
            .minors
            .acquire_zero_area(count as usize)
            .ok_or(DevError::ResourceExhausted)?;

        let dev = DeviceNumber::new(Major::MISC, MISC_DYNAMIC_MINOR_BASE + start as u32);
        log::debug!("chrdev: allocated {} (+{}) for {}", dev, count, label);
        Ok(dev)
    }

    /// Return minors obtained from [`allocate`](Self::allocate).
    ///
    /// Freeing minors that are not allocated is a caller bug; it is logged and
    /// otherwise ignored.
    pub fn free(&self, first: DeviceNumber, count: u32) {
        if first.major() != Major::MISC || first.minor() < MISC_DYNAMIC_MINOR_BASE {
            log::warn!("chrdev: free of non-dynamic number {}", first);
            return;
        }

        let start = (first.minor() - MISC_DYNAMIC_MINOR_BASE) as usize;
        if !self.inner.lock().minors.release_area(start, count as usize) {
            log::warn!("chrdev: free of unallocated range {} (+{})", first, count);
        }
    }

    /// Whether `dev` is a dynamic misc minor currently handed out.
    pub fn is_allocated(&self, dev: DeviceNumber) -> bool {
        dev.major() == Major::MISC
            && dev.minor() >= MISC_DYNAMIC_MINOR_BASE
            && self
                .inner
                .lock()
                .minors
                .is_set((dev.minor() - MISC_DYNAMIC_MINOR_BASE) as usize)
    }

    /// Number of dynamic misc minors in use.
    pub fn dynamic_in_use(&self) -> usize {
        self.inner.lock().minors.count_ones()
    }

    /// Reserve `count` minors starting at `first` under `name`.
    pub fn register_region(&self, first: DeviceNumber, count: u32, name: &str) -> Result<()> {
        if count == 0 || first.minor() as u64 + count as u64 > DeviceNumber::MINOR_MASK as u64 + 1 {
            return Err(DevError::InvalidArgument);
        }

        let mut inner = self.inner.lock();
        if inner
            .regions
            .iter()
            .any(|r| ranges_overlap(r.first, r.count, first, count))
        {
            return Err(DevError::Conflict);
        }

        inner.regions.push(Region {
            first,
            count,
            name: name.into(),
        });
        log::debug!("chrdev: registered region {} (+{}) {}", first, count, name);
        Ok(())
    }

    /// Reserve `count` minors from `baseminor` under a free dynamic major.
    pub fn alloc_region(&self, baseminor: u32, count: u32, name: &str) -> Result<DeviceNumber> {
        if count == 0 || baseminor as u64 + count as u64 > DeviceNumber::MINOR_MASK as u64 + 1 {
            return Err(DevError::InvalidArgument);
        }

        let mut inner = self.inner.lock();
        let major = DYNAMIC_MAJORS
            .rev()
            .map(Major::new)
            .find(|major| inner.regions.iter().all(|r| r.first.major() != *major))
            .ok_or(DevError::ResourceExhausted)?;

        let first = DeviceNumber::new(major, baseminor);
        inner.regions.push(Region {
            first,
            count,
            name: name.into(),
        });
        log::debug!("chrdev: allocated region {} (+{}) {}", first, count, name);
        Ok(first)
    }

    /// Drop the region registered at exactly `first` / `count`.
    pub fn unregister_region(&self, first: DeviceNumber, count: u32) -> Result<()> {
        let mut inner = self.inner.lock();
        let idx = inner
            .regions
            .iter()
            .position(|r| r.first == first && r.count == count)
            .ok_or(DevError::NotFound)?;

        inner.regions.remove(idx);
        Ok(())
    }

    /// Snapshot of the registered regions, ordered by major then minor.
    pub fn regions(&self) -> Vec<Region> {
        let mut regions = self.inner.lock().regions.clone();
        regions.sort_by_key(|r| r.first);
        regions
    }

    /// `/proc/devices`-style report: one line per (major, name).
    pub fn proc_devices(&self) -> String {
        let mut out = String::from("Character devices:\n");
        let mut last: Option<(Major, &str)> = None;
        let regions = self.regions();
        for region in &regions {
            let key = (region.first.major(), region.name.as_str());
            if last != Some(key) {
                let _ = writeln!(out, "{:3} {}", key.0.get(), key.1);
                last = Some(key);
            }
        }
        out
    }
}

impl Default for DeviceNumberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn number_packing() {
        let dev = DeviceNumber::new(Major::MISC, 130);
        assert_eq!(dev.major(), Major::MISC);
        assert_eq!(dev.minor(), 130);
        assert_eq!(dev.data(), (10 << 20) | 130);
        assert_eq!(std::format!("{}", dev), "10:130");
        assert!(dev.within(DeviceNumber::new(Major::MISC, 128), 3));
        assert!(!dev.within(DeviceNumber::new(Major::MISC, 128), 2));
        assert!(!dev.within(DeviceNumber::new(Major::new(11), 128), 8));
    }

    #[test]
    fn dynamic_minors_start_at_base() {
        let registry = DeviceNumberRegistry::new();
        let a = registry.allocate(1, "a").unwrap();
        let b = registry.allocate(1, "b").unwrap();
        assert_eq!(a, DeviceNumber::new(Major::MISC, MISC_DYNAMIC_MINOR_BASE));
        assert_eq!(b.minor(), MISC_DYNAMIC_MINOR_BASE + 1);
        assert!(registry.is_allocated(a));
        assert_eq!(registry.dynamic_in_use(), 2);
    }

    #[test]
    fn freed_minor_is_reused() {
        let registry = DeviceNumberRegistry::new();
        let a = registry.allocate(1, "a").unwrap();
        let _b = registry.allocate(1, "b").unwrap();
        registry.free(a, 1);
        assert!(!registry.is_allocated(a));
        assert_eq!(registry.allocate(1, "c").unwrap(), a);
    }

    #[test]
    fn contiguous_allocation() {
        let registry = DeviceNumberRegistry::new();
        let _a = registry.allocate(1, "a").unwrap();
        let run = registry.allocate(4, "run").unwrap();
        assert_eq!(run.minor(), MISC_DYNAMIC_MINOR_BASE + 1);
        assert_eq!(registry.dynamic_in_use(), 5);
        registry.free(run, 4);
        assert_eq!(registry.dynamic_in_use(), 1);
        assert_eq!(registry.allocate(0, "zero"), Err(DevError::InvalidArgument));
    }

    #[test]
    fn exhaustion_reports_resource_exhausted() {
        let registry = DeviceNumberRegistry::new();
        for _ in 0..DYNAMIC_MINORS {
            registry.allocate(1, "fill").unwrap();
        }
        assert_eq!(registry.allocate(1, "one more"), Err(DevError::ResourceExhausted));
    }

    #[test]
    fn concurrent_allocations_are_distinct() {
        let registry = Arc::new(DeviceNumberRegistry::new());
        let threads = 8;
        let per_thread = DYNAMIC_MINORS / threads;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let registry = registry.clone();
                thread::spawn(move || {
                    (0..per_thread)
                        .map(|_| registry.allocate(1, "race").unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = BTreeSet::new();
        for handle in handles {
            for dev in handle.join().unwrap() {
                assert!(seen.insert(dev), "minor {} handed out twice", dev);
            }
        }
        assert_eq!(seen.len(), DYNAMIC_MINORS);
        assert_eq!(registry.allocate(1, "late"), Err(DevError::ResourceExhausted));
    }

    #[test]
    fn regions_conflict_on_overlap() {
        let registry = DeviceNumberRegistry::new();
        let first = DeviceNumber::new(Major::new(42), 0);
        registry.register_region(first, 4, "foo").unwrap();
        assert_eq!(
            registry.register_region(DeviceNumber::new(Major::new(42), 3), 2, "bar"),
            Err(DevError::Conflict)
        );
        registry
            .register_region(DeviceNumber::new(Major::new(42), 4), 2, "bar")
            .unwrap();
        assert_eq!(registry.register_region(first, 0, "empty"), Err(DevError::InvalidArgument));
    }

    #[test]
    fn dynamic_majors_count_down() {
        let registry = DeviceNumberRegistry::new();
        let a = registry.alloc_region(0, 1, "mychardev").unwrap();
        let b = registry.alloc_region(0, 2, "other").unwrap();
        assert_eq!(a.major(), Major::new(254));
        assert_eq!(b.major(), Major::new(253));

        registry.unregister_region(a, 1).unwrap();
        assert_eq!(registry.unregister_region(a, 1), Err(DevError::NotFound));
        assert_eq!(registry.alloc_region(0, 1, "again").unwrap().major(), Major::new(254));
    }

    #[test]
    fn dynamic_majors_exhaust() {
        let registry = DeviceNumberRegistry::new();
        for _ in DYNAMIC_MAJORS {
            registry.alloc_region(0, 1, "fill").unwrap();
        }
        assert_eq!(registry.alloc_region(0, 1, "late"), Err(DevError::ResourceExhausted));
    }

    #[test]
    fn proc_devices_lists_each_major_once() {
        let registry = DeviceNumberRegistry::new();
        registry
            .register_region(DeviceNumber::new(Major::MISC, 0), 256, "misc")
            .unwrap();
        registry
            .register_region(DeviceNumber::new(Major::new(4), 0), 64, "tty")
            .unwrap();
        registry
            .register_region(DeviceNumber::new(Major::new(4), 64), 64, "tty")
            .unwrap();
        assert_eq!(
            registry.proc_devices(),
            "Character devices:\n  4 tty\n 10 misc\n"
        );
    }
}
