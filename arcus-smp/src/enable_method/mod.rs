//! Enable methods
//!
//! Firmware describes, per core, how the OS is expected to release it.
//! Each [`EnableMethod`] maps onto one [`BringUpOps`] implementation:
//!
//! | Method | Release | Park/power-off | Death confirmation |
//! |--------|---------|----------------|--------------------|
//! | `psci` | `CPU_ON` | `CPU_OFF` | `AFFINITY_INFO` polling |
//! | `spin-table` | write release address + `SEV` | - | - |
//! | `parking-protocol` | mailbox write + wake-up SGI | - | - |
//!
//! Strategies never touch caches, events or interrupts directly; they go
//! through [`BootServices`] so they can be exercised off-target.

mod parking;
mod psci;
mod spin_table;

pub use parking::ParkingProtocol;
pub use psci::{KillPolicy, PsciOps};
pub use spin_table::SpinTable;

use crate::ops::BringUpOps;
use alloc::boxed::Box;
use arcus_pal::{Psci, PsciConduit};
use core::time::Duration;

/// How a core is released, as described by the enumeration source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableMethod {
    /// Firmware power management calls
    Psci,
    /// Core spins on `release_addr` (physical) until a non-zero entry appears
    SpinTable { release_addr: Option<u64> },
    /// Core polls an ACPI parking-protocol mailbox (physical address)
    ParkingProtocol {
        mailbox: Option<u64>,
        cpu_interface: u32,
    },
}

impl EnableMethod {
    /// Name as spelled in firmware tables.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Psci => "psci",
            Self::SpinTable { .. } => "spin-table",
            Self::ParkingProtocol { .. } => "parking-protocol",
        }
    }
}

/// Machine services the strategies need besides their firmware interface.
pub trait BootServices: Send + Sync {
    /// Kernel virtual address of a physical firmware location.
    fn phys_to_virt(&self, phys: u64) -> usize;

    /// Clean `addr..addr + len` to the point of coherency.
    fn clean_dcache_range(&self, addr: usize, len: usize);

    /// Wake cores waiting in WFE.
    fn send_event(&self);

    /// Send a wake-up IPI to one core.
    fn send_wakeup(&self, cpu: usize, hwid: u64);

    /// Busy-wait for at least `duration`.
    fn delay(&self, duration: Duration);
}

/// Builds the strategy for a core from its described enable method.
pub trait OpsFactory {
    /// `None` means the method is not usable on this system.
    fn build(&self, cpu: usize, hwid: u64, method: &EnableMethod) -> Option<Box<dyn BringUpOps>>;
}

impl<F> OpsFactory for F
where
    F: Fn(usize, u64, &EnableMethod) -> Option<Box<dyn BringUpOps>>,
{
    fn build(&self, cpu: usize, hwid: u64, method: &EnableMethod) -> Option<Box<dyn BringUpOps>> {
        self(cpu, hwid, method)
    }
}

/// Standard factory for the three firmware enable methods.
pub struct MethodFactory<C, S> {
    psci: Option<Psci<C>>,
    services: S,
    entry: u64,
    kill: KillPolicy,
}

impl<C, S> MethodFactory<C, S>
where
    C: PsciConduit + Clone + 'static,
    S: BootServices + Clone + 'static,
{
    /// Create a factory releasing cores at physical address `entry`.
    ///
    /// `psci` is `None` when firmware has no PSCI implementation; cores
    /// describing the `psci` method are then rejected.
    ///
    /// # Safety
    /// `services.phys_to_virt` must yield mapped, writable memory for every
    /// release address and mailbox the enumeration source reports, and
    /// `entry` must be the physical address of the secondary entry
    /// trampoline.
    pub unsafe fn new(psci: Option<Psci<C>>, services: S, entry: u64) -> Self {
        Self {
            psci,
            services,
            entry,
            kill: KillPolicy::default(),
        }
    }

    /// Override how long PSCI kill confirmation polls.
    #[must_use]
    pub fn with_kill_policy(mut self, kill: KillPolicy) -> Self {
        self.kill = kill;
        self
    }
}

impl<C, S> OpsFactory for MethodFactory<C, S>
where
    C: PsciConduit + Clone + 'static,
    S: BootServices + Clone + 'static,
{
    fn build(&self, cpu: usize, hwid: u64, method: &EnableMethod) -> Option<Box<dyn BringUpOps>> {
        match *method {
            EnableMethod::Psci => {
                let Some(psci) = self.psci.clone() else {
                    log::warn!("CPU{cpu}: psci enable-method without PSCI firmware");
                    return None;
                };
                Some(Box::new(PsciOps::new(
                    psci,
                    self.services.clone(),
                    hwid,
                    self.entry,
                    self.kill,
                )))
            }
            EnableMethod::SpinTable { release_addr } => {
                // SAFETY: MethodFactory::new's contract covers release addresses.
                Some(Box::new(unsafe {
                    SpinTable::new(self.services.clone(), release_addr, self.entry)
                }))
            }
            EnableMethod::ParkingProtocol {
                mailbox,
                cpu_interface,
            } => {
                // SAFETY: MethodFactory::new's contract covers mailboxes.
                Some(Box::new(unsafe {
                    ParkingProtocol::new(
                        self.services.clone(),
                        hwid,
                        mailbox,
                        cpu_interface,
                        self.entry,
                    )
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::OpsFeatures;
    use crate::testing::{FakeFirmware, FakeServices};

    fn factory(psci: bool) -> MethodFactory<FakeFirmware, FakeServices> {
        let psci = psci.then(|| Psci::new(FakeFirmware::new()));
        // SAFETY: no enable method built here is ever booted
        unsafe { MethodFactory::new(psci, FakeServices::new(), 0x4000_0000) }
    }

    #[test]
    fn test_builds_each_method() {
        let factory = factory(true);
        let psci = factory.build(1, 0x1, &EnableMethod::Psci).unwrap();
        assert_eq!(psci.name(), "psci");
        assert!(psci.features().contains(OpsFeatures::DIE | OpsFeatures::KILL));

        let spin = factory
            .build(2, 0x2, &EnableMethod::SpinTable { release_addr: Some(0x8000) })
            .unwrap();
        assert_eq!(spin.name(), "spin-table");
        assert!(!spin.features().contains(OpsFeatures::DIE));

        let parking = factory
            .build(
                3,
                0x3,
                &EnableMethod::ParkingProtocol {
                    mailbox: Some(0x9000),
                    cpu_interface: 3,
                },
            )
            .unwrap();
        assert_eq!(parking.name(), "parking-protocol");
    }

    #[test]
    fn test_psci_method_without_firmware() {
        assert!(factory(false).build(1, 0x1, &EnableMethod::Psci).is_none());
    }

    #[test]
    fn test_closure_factory() {
        let build = |_cpu: usize, _hwid: u64, method: &EnableMethod| -> Option<Box<dyn BringUpOps>> {
            if *method == EnableMethod::Psci {
                Some(Box::new(crate::testing::FakeOps::new()))
            } else {
                None
            }
        };
        assert!(build.build(1, 1, &EnableMethod::Psci).is_some());
        assert!(
            build
                .build(1, 1, &EnableMethod::SpinTable { release_addr: None })
                .is_none()
        );
    }
}
