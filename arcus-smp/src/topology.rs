//! Topology Enumerator
//!
//! Turns the core records an external walker found in the device tree or
//! the firmware's interrupt-controller table into a [`Registry`]. Runs
//! once, single-threaded, before any secondary exists.
//!
//! Bad records are dropped one at a time and never abort the walk. The
//! boot core keeps logical index 0 and must appear exactly once; without
//! it no secondary is started at all.

use crate::config::SmpConfig;
use crate::enable_method::{EnableMethod, OpsFactory};
use crate::error::EnumError;
use crate::registry::Registry;
use arcus_common::{INVALID_HWID, MAX_CPUS, hwid};

/// Where the records come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Device-tree `cpu` nodes; every node is enabled.
    DeviceTree,
    /// Firmware-table (MADT GICC) entries, each with an enabled flag.
    Firmware,
}

impl Source {
    const fn table(self) -> &'static str {
        match self {
            Self::DeviceTree => "DT",
            Self::Firmware => "MADT",
        }
    }
}

/// One core as described by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformRecord {
    pub hwid: u64,
    /// Ignored for device-tree records.
    pub enabled: bool,
    pub node: Option<u32>,
    /// `None` when the platform named no usable enable method.
    pub method: Option<EnableMethod>,
}

impl PlatformRecord {
    pub const fn new(hwid: u64, method: Option<EnableMethod>) -> Self {
        Self {
            hwid,
            enabled: true,
            node: None,
            method,
        }
    }

    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    #[must_use]
    pub const fn with_node(mut self, node: u32) -> Self {
        self.node = Some(node);
        self
    }
}

/// What became of an accepted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// The record describes the boot core (index 0).
    BootCpu,
    /// The record got this logical index.
    Assigned(usize),
    /// The record is disabled in firmware.
    Skipped,
}

/// Incremental enumeration state.
pub struct Enumerator {
    registry: Registry,
    source: Source,
    /// Records counted so far, starting at 1 for the boot core.
    cpu_count: usize,
    bootcpu_valid: bool,
    methods: [Option<EnableMethod>; MAX_CPUS],
}

impl Enumerator {
    /// Start enumerating with the boot core's identifier in index 0.
    pub fn new(config: &SmpConfig, boot_hwid: u64, source: Source) -> Self {
        let mut registry = Registry::new(config.capacity());
        if let Err(err) = registry.assign(0, hwid::from_mpidr(boot_hwid)) {
            log::error!("boot CPU MPIDR {boot_hwid:#x}: {err}");
        }
        Self {
            registry,
            source,
            cpu_count: 1,
            bootcpu_valid: false,
            methods: [const { None }; MAX_CPUS],
        }
    }

    /// Whether a record matched the boot core.
    #[must_use]
    pub fn bootcpu_valid(&self) -> bool {
        self.bootcpu_valid
    }

    /// Records counted so far, including clipped ones and the boot core.
    #[must_use]
    pub fn cpu_count(&self) -> usize {
        self.cpu_count
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Consume one record.
    ///
    /// An error means the record was dropped; enumeration continues.
    pub fn add(&mut self, record: &PlatformRecord) -> Result<Placement, EnumError> {
        let hwid = record.hwid;
        let table = self.source.table();

        if self.source == Source::Firmware && !record.enabled {
            log::debug!("skipping disabled CPU entry with {hwid:#x} MPIDR");
            return Ok(Placement::Skipped);
        }

        if !hwid::is_valid(hwid) {
            log::error!("skipping CPU entry with invalid MPIDR {hwid:#x}");
            return Err(EnumError::InvalidHardwareId);
        }

        let capacity = self.registry.capacity();
        if self.registry.is_duplicate(self.cpu_count.min(capacity), hwid) {
            log::error!("duplicate CPU MPIDR {hwid:#x} in {table}");
            return Err(EnumError::DuplicateHardwareId);
        }

        if hwid == self.registry.hwid(0) {
            if self.bootcpu_valid {
                log::error!("duplicate boot CPU MPIDR: {hwid:#x} in {table}");
                return Err(EnumError::DuplicateBootCpu);
            }
            self.bootcpu_valid = true;
            self.registry.set_node(0, record.node);
            self.methods[0] = record.method;
            return Ok(Placement::BootCpu);
        }

        let cpu = self.cpu_count;
        self.cpu_count += 1;
        if cpu >= capacity {
            return Err(EnumError::CapacityExceeded);
        }

        log::debug!("cpu logical map {hwid:#x}");
        if let Err(err) = self.registry.assign(cpu, hwid) {
            log::error!("CPU{cpu}: {err}");
            return Err(EnumError::InvalidHardwareId);
        }
        self.registry.set_node(cpu, record.node);
        self.methods[cpu] = record.method;
        Ok(Placement::Assigned(cpu))
    }

    /// Finish enumeration and build each core's bring-up strategy.
    ///
    /// Secondaries whose strategy cannot be built or refuses to
    /// initialize are unassigned again; the rest become possible.
    pub fn finish(mut self, factory: &dyn OpsFactory) -> Result<Registry, EnumError> {
        let capacity = self.registry.capacity();
        if self.cpu_count > capacity {
            log::warn!(
                "Number of cores ({}) exceeds configured maximum of {} - clipping",
                self.cpu_count,
                capacity
            );
        }

        if !self.bootcpu_valid {
            log::error!("missing boot CPU MPIDR, not enabling secondaries");
            return Err(EnumError::MissingBootCpu);
        }

        // The boot core is already running: its strategy is only needed
        // for hotplug, so it is built but not initialized.
        let boot_hwid = self.registry.hwid(0);
        if let Some(method) = self.methods[0] {
            if let Some(ops) = factory.build(0, boot_hwid, &method) {
                self.registry.set_ops(0, ops);
            }
        }
        self.registry.mark_possible(0, true);

        for cpu in 1..capacity {
            if self.registry.hwid(cpu) == INVALID_HWID {
                continue;
            }
            if !self.setup_cpu(cpu, factory) {
                self.registry.invalidate(cpu);
            }
        }

        Ok(self.registry)
    }

    fn setup_cpu(&mut self, cpu: usize, factory: &dyn OpsFactory) -> bool {
        let hwid = self.registry.hwid(cpu);
        let Some(method) = self.methods[cpu] else {
            log::error!("CPU{cpu}: missing enable-method property");
            return false;
        };
        let Some(ops) = factory.build(cpu, hwid, &method) else {
            log::warn!("CPU{cpu}: unsupported enable-method property: {}", method.name());
            return false;
        };
        if let Err(err) = ops.init(cpu) {
            log::error!("CPU{cpu}: {} init failed: {err}", ops.name());
            return false;
        }
        self.registry.set_ops(cpu, ops);
        self.registry.mark_possible(cpu, true);
        true
    }
}

/// Enumerate `records` in order and build the registry.
///
/// Per-record drops are logged and skipped; only a missing boot core is
/// reported.
pub fn enumerate<'a>(
    config: &SmpConfig,
    boot_hwid: u64,
    source: Source,
    records: impl IntoIterator<Item = &'a PlatformRecord>,
    factory: &dyn OpsFactory,
) -> Result<Registry, EnumError> {
    let mut enumerator = Enumerator::new(config, boot_hwid, source);
    for record in records {
        // Dropped records were already logged.
        let _ = enumerator.add(record);
    }
    enumerator.finish(factory)
}
