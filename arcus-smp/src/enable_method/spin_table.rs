//! Spin-table enable method
//!
//! Firmware parks each secondary in a WFE loop polling a 64-bit release
//! address. Writing the entry point there (and making it visible to a
//! core that reads with caches off) releases the core. There is no way
//! back: a released core cannot be parked again or confirmed dead.

use super::BootServices;
use crate::error::{OpsError, OpsResult};
use crate::ops::BringUpOps;
use arcus_pal::release;

pub struct SpinTable<S> {
    services: S,
    release_addr: Option<u64>,
    entry: u64,
}

impl<S: BootServices> SpinTable<S> {
    /// # Safety
    /// `services.phys_to_virt(release_addr)` must be mapped and writable.
    pub unsafe fn new(services: S, release_addr: Option<u64>, entry: u64) -> Self {
        Self {
            services,
            release_addr,
            entry,
        }
    }
}

impl<S: BootServices> BringUpOps for SpinTable<S> {
    fn name(&self) -> &'static str {
        "spin-table"
    }

    fn init(&self, cpu: usize) -> OpsResult<()> {
        if self.release_addr.is_none() {
            log::error!("CPU{cpu}: missing cpu-release-addr property");
            return Err(OpsError::NoReleaseAddress);
        }
        Ok(())
    }

    fn prepare(&self, cpu: usize) -> OpsResult<()> {
        match self.release_addr {
            Some(addr) if addr % 8 == 0 => Ok(()),
            Some(addr) => {
                log::error!("CPU{cpu}: misaligned cpu-release-addr {addr:#x}");
                Err(OpsError::InvalidAddress)
            }
            None => Err(OpsError::NoReleaseAddress),
        }
    }

    fn boot(&self, _cpu: usize) -> OpsResult<()> {
        let addr = self.release_addr.ok_or(OpsError::NoReleaseAddress)?;
        let virt = self.services.phys_to_virt(addr);

        // SAFETY: SpinTable::new's contract; alignment checked in prepare
        unsafe { release::write_release_addr(virt as *mut u64, self.entry) };

        // The parked core reads the release address with its caches off.
        self.services.clean_dcache_range(virt, core::mem::size_of::<u64>());
        self.services.send_event();
        Ok(())
    }
}
