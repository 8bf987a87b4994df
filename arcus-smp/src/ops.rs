//! Bring-up strategy interface
//!
//! A [`BringUpOps`] is the per-core capability set that knows how to
//! release, park and confirm the death of one core on this platform
//! (PSCI firmware calls, a spin-table release address, an ACPI parking
//! mailbox...). Each [`CoreRecord`](crate::registry::CoreRecord) owns one,
//! chosen at enumeration time and never replaced.
//!
//! Optional operations are advertised through [`OpsFeatures`]; callers
//! check the flag and apply their documented fallback instead of calling
//! an operation the strategy does not provide.

use crate::error::{OpsError, OpsResult};
use bitflags::bitflags;

bitflags! {
    /// Optional operations a strategy implements.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpsFeatures: u8 {
        /// `disable` can veto taking the core offline.
        const DISABLE = 1 << 0;
        /// `die` can power down or park the calling core.
        const DIE = 1 << 1;
        /// `kill` can confirm with firmware that a core is inert.
        const KILL = 1 << 2;
        /// `postboot` has work to do on the new core.
        const POSTBOOT = 1 << 3;
    }
}

/// Per-core bring-up and teardown strategy.
pub trait BringUpOps: Send + Sync {
    /// Name of the enable method, as firmware spells it.
    fn name(&self) -> &'static str;

    /// Which optional operations this strategy provides.
    fn features(&self) -> OpsFeatures {
        OpsFeatures::empty()
    }

    /// Validate that the core described at enumeration can be driven.
    fn init(&self, cpu: usize) -> OpsResult<()>;

    /// Idempotent setup before the core is released.
    fn prepare(&self, cpu: usize) -> OpsResult<()>;

    /// Release or wake the core.
    fn boot(&self, cpu: usize) -> OpsResult<()>;

    /// Runs on the new core itself during secondary entry.
    fn postboot(&self) {}

    /// Last chance to refuse taking `cpu` offline.
    fn disable(&self, _cpu: usize) -> OpsResult<()> {
        Ok(())
    }

    /// Power down or park the calling core.
    ///
    /// Never returns on success; the returned value says why it failed.
    fn die(&self, _cpu: usize) -> OpsError {
        OpsError::NotSupported
    }

    /// Confirm that a dead or parked `cpu` has really left the kernel.
    fn kill(&self, _cpu: usize) -> OpsResult<()> {
        Err(OpsError::NotSupported)
    }
}
