//! Core Registry
//!
//! Maps logical core indices to hardware identifiers and bring-up
//! strategies, and tracks the possible/present/online/active state of
//! every core.
//!
//! Identifiers and strategies are written single-threaded during
//! enumeration (through `&mut Registry`) and are read-only once the
//! registry is handed to the SMP core. The four state flags keep
//! changing afterwards; each is an atomic with exactly one writer phase,
//! so no lock is involved. They form a lattice:
//! `active => online => present => possible`.

use crate::error::{RegistryError, RegistryResult};
use crate::ops::{BringUpOps, OpsFeatures};
use alloc::boxed::Box;
use arcus_common::{CpuMask, INVALID_HWID, MAX_CPUS, hwid};
use core::sync::atomic::{AtomicBool, Ordering};

/// One logical core.
pub struct CoreRecord {
    hwid: u64,
    node: Option<u32>,
    ops: Option<Box<dyn BringUpOps>>,
    possible: AtomicBool,
    present: AtomicBool,
    online: AtomicBool,
    active: AtomicBool,
}

impl CoreRecord {
    fn empty() -> Self {
        Self {
            hwid: INVALID_HWID,
            node: None,
            ops: None,
            possible: AtomicBool::new(false),
            present: AtomicBool::new(false),
            online: AtomicBool::new(false),
            active: AtomicBool::new(false),
        }
    }

    /// Hardware identifier (MPIDR affinity), or `INVALID_HWID`.
    #[must_use]
    pub fn hwid(&self) -> u64 {
        self.hwid
    }

    /// NUMA node hint from the enumeration source, passed through as-is.
    #[must_use]
    pub fn node(&self) -> Option<u32> {
        self.node
    }

    /// Bring-up strategy, if one was bound.
    #[must_use]
    pub fn ops(&self) -> Option<&dyn BringUpOps> {
        self.ops.as_deref()
    }

    /// Optional operations of the bound strategy (empty without one).
    #[must_use]
    pub fn features(&self) -> OpsFeatures {
        self.ops().map_or(OpsFeatures::empty(), |ops| ops.features())
    }

    #[must_use]
    pub fn is_assigned(&self) -> bool {
        self.hwid != INVALID_HWID
    }

    #[must_use]
    pub fn is_possible(&self) -> bool {
        self.possible.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_present(&self) -> bool {
        self.present.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Logical-to-hardware core map with per-core state.
pub struct Registry {
    cores: [CoreRecord; MAX_CPUS],
    capacity: usize,
}

impl Registry {
    /// An empty registry accepting logical indices `0..capacity`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            cores: core::array::from_fn(|_| CoreRecord::empty()),
            capacity: capacity.clamp(1, MAX_CPUS),
        }
    }

    /// A registry holding only the boot core, for when enumeration
    /// could not validate it.
    #[must_use]
    pub fn boot_only(boot_hwid: u64) -> Self {
        let mut registry = Self::new(1);
        registry.cores[0].hwid = boot_hwid;
        registry.mark_possible(0, true);
        registry
    }

    /// Number of logical indices this registry can hold.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bind `hwid` to logical index `cpu`.
    ///
    /// Fails if the identifier is invalid or already bound to a lower index.
    pub fn assign(&mut self, cpu: usize, hwid: u64) -> RegistryResult<()> {
        if cpu >= self.capacity {
            return Err(RegistryError::OutOfRange);
        }
        if !hwid::is_valid(hwid) {
            return Err(RegistryError::InvalidHardwareId);
        }
        if self.cores[..cpu].iter().any(|core| core.hwid == hwid) {
            return Err(RegistryError::DuplicateHardwareId);
        }
        self.cores[cpu].hwid = hwid;
        Ok(())
    }

    /// Whether `hwid` is bound to a secondary index below `cpu`.
    ///
    /// Index 0 is deliberately not scanned; the boot core is matched
    /// separately.
    #[must_use]
    pub fn is_duplicate(&self, cpu: usize, hwid: u64) -> bool {
        self.cores
            .iter()
            .take(cpu.min(self.capacity))
            .skip(1)
            .any(|core| core.hwid == hwid)
    }

    /// Forget the identifier bound to `cpu`; the index becomes unassigned.
    pub fn invalidate(&mut self, cpu: usize) {
        if let Some(core) = self.cores.get_mut(cpu) {
            core.hwid = INVALID_HWID;
        }
    }

    pub fn set_node(&mut self, cpu: usize, node: Option<u32>) {
        if let Some(core) = self.cores.get_mut(cpu) {
            core.node = node;
        }
    }

    pub fn set_ops(&mut self, cpu: usize, ops: Box<dyn BringUpOps>) {
        if let Some(core) = self.cores.get_mut(cpu) {
            core.ops = Some(ops);
        }
    }

    /// Record for `cpu` if it has an assigned identifier.
    #[must_use]
    pub fn lookup(&self, cpu: usize) -> Option<&CoreRecord> {
        self.cores[..self.capacity]
            .get(cpu)
            .filter(|core| core.is_assigned())
    }

    /// Hardware identifier of `cpu`, or `INVALID_HWID`.
    #[must_use]
    pub fn hwid(&self, cpu: usize) -> u64 {
        self.lookup(cpu).map_or(INVALID_HWID, CoreRecord::hwid)
    }

    /// Logical index bound to `hwid`.
    #[must_use]
    pub fn logical_of(&self, hwid: u64) -> Option<usize> {
        if !hwid::is_valid(hwid) {
            return None;
        }
        self.cores[..self.capacity].iter().position(|core| core.hwid == hwid)
    }

    #[must_use]
    pub fn ops(&self, cpu: usize) -> Option<&dyn BringUpOps> {
        self.cores.get(cpu).and_then(CoreRecord::ops)
    }

    #[must_use]
    pub fn features(&self, cpu: usize) -> OpsFeatures {
        self.cores.get(cpu).map_or(OpsFeatures::empty(), CoreRecord::features)
    }

    pub fn mark_possible(&self, cpu: usize, value: bool) {
        if let Some(core) = self.cores.get(cpu) {
            core.possible.store(value, Ordering::Release);
        }
    }

    pub fn mark_present(&self, cpu: usize, value: bool) {
        if let Some(core) = self.cores.get(cpu) {
            core.present.store(value, Ordering::Release);
        }
    }

    pub fn mark_online(&self, cpu: usize, value: bool) {
        if let Some(core) = self.cores.get(cpu) {
            core.online.store(value, Ordering::Release);
        }
    }

    pub fn mark_active(&self, cpu: usize, value: bool) {
        if let Some(core) = self.cores.get(cpu) {
            core.active.store(value, Ordering::Release);
        }
    }

    #[must_use]
    pub fn is_possible(&self, cpu: usize) -> bool {
        self.cores.get(cpu).is_some_and(CoreRecord::is_possible)
    }

    #[must_use]
    pub fn is_present(&self, cpu: usize) -> bool {
        self.cores.get(cpu).is_some_and(CoreRecord::is_present)
    }

    #[must_use]
    pub fn is_online(&self, cpu: usize) -> bool {
        self.cores.get(cpu).is_some_and(CoreRecord::is_online)
    }

    #[must_use]
    pub fn is_active(&self, cpu: usize) -> bool {
        self.cores.get(cpu).is_some_and(CoreRecord::is_active)
    }

    fn mask_of(&self, pred: impl Fn(&CoreRecord) -> bool) -> CpuMask {
        self.cores[..self.capacity]
            .iter()
            .enumerate()
            .filter(|(_, core)| pred(core))
            .map(|(cpu, _)| cpu)
            .collect()
    }

    #[must_use]
    pub fn possible_mask(&self) -> CpuMask {
        self.mask_of(CoreRecord::is_possible)
    }

    #[must_use]
    pub fn present_mask(&self) -> CpuMask {
        self.mask_of(CoreRecord::is_present)
    }

    #[must_use]
    pub fn online_mask(&self) -> CpuMask {
        self.mask_of(CoreRecord::is_online)
    }

    #[must_use]
    pub fn active_mask(&self) -> CpuMask {
        self.mask_of(CoreRecord::is_active)
    }

    #[must_use]
    pub fn num_possible(&self) -> usize {
        self.possible_mask().weight()
    }

    #[must_use]
    pub fn num_online(&self) -> usize {
        self.online_mask().weight()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeOps;

    #[test]
    fn test_assign_and_lookup() {
        let mut registry = Registry::new(4);
        registry.assign(0, 0x0).unwrap();
        registry.assign(1, 0x100).unwrap();
        assert_eq!(registry.hwid(1), 0x100);
        assert_eq!(registry.logical_of(0x100), Some(1));
        assert!(registry.lookup(2).is_none());
        assert!(registry.lookup(7).is_none());
    }

    #[test]
    fn test_assign_rejects_duplicate_below() {
        let mut registry = Registry::new(4);
        registry.assign(0, 0xA).unwrap();
        registry.assign(1, 0xB).unwrap();
        assert_eq!(registry.assign(2, 0xB), Err(RegistryError::DuplicateHardwareId));
        assert_eq!(registry.assign(2, 0xA), Err(RegistryError::DuplicateHardwareId));
        assert_eq!(registry.hwid(2), INVALID_HWID);
    }

    #[test]
    fn test_assign_rejects_invalid() {
        let mut registry = Registry::new(4);
        assert_eq!(registry.assign(1, INVALID_HWID), Err(RegistryError::InvalidHardwareId));
        assert_eq!(registry.assign(1, 1 << 31), Err(RegistryError::InvalidHardwareId));
        assert_eq!(registry.assign(4, 0x1), Err(RegistryError::OutOfRange));
    }

    #[test]
    fn test_is_duplicate_skips_boot_index() {
        let mut registry = Registry::new(4);
        registry.assign(0, 0xA).unwrap();
        registry.assign(1, 0xB).unwrap();
        assert!(!registry.is_duplicate(2, 0xA));
        assert!(registry.is_duplicate(2, 0xB));
        assert!(!registry.is_duplicate(1, 0xB));
    }

    #[test]
    fn test_invalidate() {
        let mut registry = Registry::new(2);
        registry.assign(1, 0x1).unwrap();
        registry.invalidate(1);
        assert!(registry.lookup(1).is_none());
        assert_eq!(registry.logical_of(0x1), None);
    }

    #[test]
    fn test_state_masks() {
        let mut registry = Registry::new(4);
        for cpu in 0..3 {
            registry.assign(cpu, cpu as u64).unwrap();
            registry.mark_possible(cpu, true);
        }
        registry.mark_present(1, true);
        registry.mark_online(1, true);
        assert_eq!(registry.possible_mask(), CpuMask::first(3));
        assert_eq!(registry.online_mask(), CpuMask::of(1));
        assert_eq!(registry.num_online(), 1);
        registry.mark_online(1, false);
        assert!(!registry.is_online(1));
        assert!(registry.is_present(1));
    }

    #[test]
    fn test_features_follow_ops() {
        let mut registry = Registry::new(2);
        registry.assign(1, 0x1).unwrap();
        assert!(registry.features(1).is_empty());
        registry.set_ops(1, Box::new(FakeOps::new().with_features(OpsFeatures::DIE)));
        assert!(registry.features(1).contains(OpsFeatures::DIE));
        assert_eq!(registry.ops(1).map(|ops| ops.name()), Some("fake"));
    }

    #[test]
    fn test_boot_only() {
        let registry = Registry::boot_only(0x80);
        assert_eq!(registry.capacity(), 1);
        assert_eq!(registry.hwid(0), 0x80);
        assert!(registry.is_possible(0));
    }
}
