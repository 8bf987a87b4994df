//! Error types for enumeration, bring-up and hotplug
//!
//! Every per-core failure is a value the caller can log and move past.
//! The few conditions that are fatal to the whole system (privilege-level
//! mismatch on a secondary, a `PanicKernel` boot status, a core returning
//! from its die operation) panic instead and never appear here.

use arcus_pal::PsciError;
use core::fmt;

/// A platform bring-up strategy refused or failed an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[must_use = "bring-up operation errors must be handled"]
pub enum OpsError {
    /// The strategy does not implement this operation.
    NotSupported,
    /// Firmware rejected the arguments (bad MPIDR or entry point).
    InvalidParameters,
    /// Firmware denied the request.
    Denied,
    /// The core is already running.
    AlreadyOn,
    /// A previous power-on request is still in flight.
    OnPending,
    /// Firmware reported an internal failure.
    InternalFailure,
    /// Firmware knows no such core.
    NotPresent,
    /// The core is disabled in firmware.
    Disabled,
    /// The entry point is not acceptable to firmware.
    InvalidAddress,
    /// The core never reached the expected power state.
    Timeout,
    /// No parking-protocol mailbox was described for the core.
    NoMailbox,
    /// No spin-table release address was described for the core.
    NoReleaseAddress,
}

impl OpsError {
    /// Get a short description of the error.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotSupported => "operation not supported",
            Self::InvalidParameters => "invalid parameters",
            Self::Denied => "denied by firmware",
            Self::AlreadyOn => "core already on",
            Self::OnPending => "core power-on pending",
            Self::InternalFailure => "firmware internal failure",
            Self::NotPresent => "core not present",
            Self::Disabled => "core disabled",
            Self::InvalidAddress => "invalid entry address",
            Self::Timeout => "timed out waiting for core",
            Self::NoMailbox => "missing parking protocol mailbox",
            Self::NoReleaseAddress => "missing cpu-release-addr",
        }
    }
}

impl fmt::Display for OpsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<PsciError> for OpsError {
    fn from(err: PsciError) -> Self {
        match err {
            PsciError::NotSupported => Self::NotSupported,
            PsciError::InvalidParameters => Self::InvalidParameters,
            PsciError::Denied => Self::Denied,
            PsciError::AlreadyOn => Self::AlreadyOn,
            PsciError::OnPending => Self::OnPending,
            PsciError::InternalFailure => Self::InternalFailure,
            PsciError::NotPresent => Self::NotPresent,
            PsciError::Disabled => Self::Disabled,
            PsciError::InvalidAddress => Self::InvalidAddress,
        }
    }
}

/// Result type for bring-up strategy operations.
pub type OpsResult<T> = Result<T, OpsError>;

/// Errors from assigning hardware identifiers in the core registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[must_use = "registry errors must be handled"]
pub enum RegistryError {
    /// The identifier is already bound to a lower logical index.
    DuplicateHardwareId,
    /// The identifier is the sentinel or has non-affinity bits set.
    InvalidHardwareId,
    /// The logical index is beyond the registry's capacity.
    OutOfRange,
}

impl RegistryError {
    /// Get a short description of the error.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DuplicateHardwareId => "duplicate hardware id",
            Self::InvalidHardwareId => "invalid hardware id",
            Self::OutOfRange => "logical index out of range",
        }
    }
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Topology enumeration outcomes.
///
/// All but [`EnumError::MissingBootCpu`] describe a single dropped
/// record; enumeration continues past them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[must_use = "enumeration errors must be handled"]
pub enum EnumError {
    /// The record's identifier is the sentinel or has non-affinity bits set.
    InvalidHardwareId,
    /// The record repeats an identifier already assigned.
    DuplicateHardwareId,
    /// A second record matched the boot core.
    DuplicateBootCpu,
    /// Every logical index is taken.
    CapacityExceeded,
    /// No record matched the boot core; no secondary may be started.
    MissingBootCpu,
}

impl EnumError {
    /// Get a short description of the error.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidHardwareId => "invalid MPIDR",
            Self::DuplicateHardwareId => "duplicate MPIDR",
            Self::DuplicateBootCpu => "duplicate boot CPU MPIDR",
            Self::CapacityExceeded => "exceeds configured maximum",
            Self::MissingBootCpu => "missing boot CPU MPIDR",
        }
    }
}

impl fmt::Display for EnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a secondary core did not come online.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[must_use = "bring-up errors must be handled"]
pub enum BringUpError {
    /// The logical index has no assigned hardware identifier or ops.
    InvalidCpu,
    /// The core was never made present.
    NotPresent,
    /// The core is already online.
    AlreadyOnline,
    /// The platform refused to release the core.
    BootRefused(OpsError),
    /// The core asked to be killed and firmware confirmed it is off.
    DiedDuringBoot,
    /// The core asked to be killed but firmware could not confirm it.
    MayNotHaveShutDownCleanly,
    /// The core is alive but never reached the scheduler.
    StuckInKernel,
    /// The core failed with a status the orchestrator cannot interpret.
    UnknownFailureState(i64),
}

impl BringUpError {
    /// Get a short description of the error.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidCpu => "no such cpu",
            Self::NotPresent => "cpu not present",
            Self::AlreadyOnline => "cpu already online",
            Self::BootRefused(_) => "failed to boot",
            Self::DiedDuringBoot => "died during early boot",
            Self::MayNotHaveShutDownCleanly => "may not have shut down cleanly",
            Self::StuckInKernel => "is stuck in kernel",
            Self::UnknownFailureState(_) => "failed in unknown state",
        }
    }
}

impl fmt::Display for BringUpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BootRefused(err) => write!(f, "{}: {}", self.as_str(), err),
            Self::UnknownFailureState(status) => write!(f, "{} : {:#x}", self.as_str(), status),
            _ => write!(f, "{}", self.as_str()),
        }
    }
}

/// Result type for bring-up.
pub type BringUpResult<T> = Result<T, BringUpError>;

/// Errors from taking a core offline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[must_use = "hotplug errors must be handled"]
pub enum HotplugError {
    /// The logical index has no assigned core.
    InvalidCpu,
    /// The core's strategy cannot power it down; it must stay online.
    UnsupportedHotplug,
    /// The strategy's pre-disable hook refused.
    Refused(OpsError),
    /// The core never reported death within the timeout.
    DidNotDie,
}

impl HotplugError {
    /// Get a short description of the error.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidCpu => "no such cpu",
            Self::UnsupportedHotplug => "cpu hotplug not supported",
            Self::Refused(_) => "disable refused",
            Self::DidNotDie => "cpu didn't die",
        }
    }
}

impl fmt::Display for HotplugError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Refused(err) => write!(f, "{}: {}", self.as_str(), err),
            _ => write!(f, "{}", self.as_str()),
        }
    }
}

/// Result type for hotplug operations.
pub type HotplugResult<T> = Result<T, HotplugError>;

/// A secondary-entry step that failed before the core went online.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SecondaryError {
    /// The core lacks a capability the system already relies on.
    CapabilityMismatch,
    /// A starting notifier (interrupt controller, timer) failed.
    StartingFailed,
}

impl SecondaryError {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CapabilityMismatch => "missing required capability",
            Self::StartingFailed => "starting notifier failed",
        }
    }
}

impl fmt::Display for SecondaryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::format;

    #[test]
    fn test_psci_error_conversion() {
        assert_eq!(OpsError::from(PsciError::AlreadyOn), OpsError::AlreadyOn);
        assert_eq!(OpsError::from(PsciError::InvalidAddress), OpsError::InvalidAddress);
    }

    #[test]
    fn test_bringup_display() {
        assert_eq!(
            format!("{}", BringUpError::BootRefused(OpsError::Denied)),
            "failed to boot: denied by firmware"
        );
        assert_eq!(
            format!("{}", BringUpError::UnknownFailureState(-1)),
            "failed in unknown state : 0xffffffffffffffff"
        );
        assert_eq!(format!("{}", BringUpError::StuckInKernel), "is stuck in kernel");
    }
}
