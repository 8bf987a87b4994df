//! PSCI enable method

use super::BootServices;
use crate::error::{OpsError, OpsResult};
use crate::ops::{BringUpOps, OpsFeatures};
use arcus_pal::{AffinityState, Psci, PsciConduit};
use core::time::Duration;

/// How long to poll `AFFINITY_INFO` before giving up on a kill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KillPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for KillPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval: Duration::from_millis(10),
        }
    }
}

/// Releases, powers off and confirms cores through PSCI firmware calls.
pub struct PsciOps<C, S> {
    psci: Psci<C>,
    services: S,
    hwid: u64,
    entry: u64,
    kill: KillPolicy,
}

impl<C: PsciConduit, S: BootServices> PsciOps<C, S> {
    pub fn new(psci: Psci<C>, services: S, hwid: u64, entry: u64, kill: KillPolicy) -> Self {
        Self {
            psci,
            services,
            hwid,
            entry,
            kill,
        }
    }
}

impl<C: PsciConduit, S: BootServices> BringUpOps for PsciOps<C, S> {
    fn name(&self) -> &'static str {
        "psci"
    }

    fn features(&self) -> OpsFeatures {
        OpsFeatures::DIE | OpsFeatures::KILL
    }

    fn init(&self, _cpu: usize) -> OpsResult<()> {
        if self.psci.is_available() {
            Ok(())
        } else {
            Err(OpsError::NotSupported)
        }
    }

    fn prepare(&self, _cpu: usize) -> OpsResult<()> {
        Ok(())
    }

    fn boot(&self, cpu: usize) -> OpsResult<()> {
        // SAFETY: `entry` is the secondary trampoline (MethodFactory::new contract)
        unsafe { self.psci.cpu_on(self.hwid, self.entry, 0) }.map_err(|err| {
            log::error!("psci: failed to boot CPU{cpu} ({err})");
            OpsError::from(err)
        })
    }

    fn die(&self, cpu: usize) -> OpsError {
        // SAFETY: only called on the dying core with interrupts masked
        let err = unsafe { self.psci.cpu_off() };
        log::error!("psci: unable to power off CPU{cpu} ({err})");
        OpsError::from(err)
    }

    fn kill(&self, cpu: usize) -> OpsResult<()> {
        let mut last = None;
        for _ in 0..self.kill.attempts {
            match self.psci.affinity_info(self.hwid) {
                Ok(AffinityState::Off) => {
                    log::info!("CPU{cpu} killed.");
                    return Ok(());
                }
                state => last = Some(state),
            }
            self.services.delay(self.kill.interval);
            log::debug!("Retrying again to check for CPU kill");
        }

        log::warn!("CPU{cpu} may not have shut down cleanly (AFFINITY_INFO reports {last:?})");
        Err(OpsError::Timeout)
    }
}
