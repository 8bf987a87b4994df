//! PSCI (Power State Coordination Interface) Driver
//!
//! Implements the subset of ARM PSCI v0.2+ used for CPU power management:
//! starting a secondary core, powering the calling core down, and asking
//! firmware whether a core has really left the kernel.
//!
//! Calls go through a [`PsciConduit`], so the same driver issues SMC on
//! machines with EL3 firmware and HVC under a hypervisor.
//!
//! Reference: ARM DEN0022D - Power State Coordination Interface

use core::fmt;

// -- PSCI Function IDs (SMC64 convention for 64-bit calls)

/// Get PSCI version
pub const PSCI_VERSION: u32 = 0x8400_0000;

/// CPU_OFF - Power down the calling CPU
pub const CPU_OFF: u32 = 0x8400_0002;

/// CPU_ON - Start a CPU at a given entry point
pub const CPU_ON_64: u32 = 0xC400_0003;

/// AFFINITY_INFO - Query power state of a CPU
pub const AFFINITY_INFO_64: u32 = 0xC400_0004;

// -- PSCI Return Codes

/// PSCI error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum PsciError {
    /// Operation not supported
    NotSupported = -1,
    /// Invalid parameters
    InvalidParameters = -2,
    /// Operation denied
    Denied = -3,
    /// CPU already on
    AlreadyOn = -4,
    /// CPU on pending
    OnPending = -5,
    /// Internal failure
    InternalFailure = -6,
    /// CPU not present
    NotPresent = -7,
    /// CPU disabled
    Disabled = -8,
    /// Invalid address
    InvalidAddress = -9,
}

impl PsciError {
    /// Decode a non-zero firmware return value.
    ///
    /// Codes outside the architected range map to `InternalFailure`.
    #[must_use]
    pub const fn from_raw(value: i64) -> Self {
        match value {
            -1 => Self::NotSupported,
            -2 => Self::InvalidParameters,
            -3 => Self::Denied,
            -4 => Self::AlreadyOn,
            -5 => Self::OnPending,
            -7 => Self::NotPresent,
            -8 => Self::Disabled,
            -9 => Self::InvalidAddress,
            _ => Self::InternalFailure,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotSupported => "not supported",
            Self::InvalidParameters => "invalid parameters",
            Self::Denied => "denied",
            Self::AlreadyOn => "already on",
            Self::OnPending => "on pending",
            Self::InternalFailure => "internal failure",
            Self::NotPresent => "not present",
            Self::Disabled => "disabled",
            Self::InvalidAddress => "invalid address",
        }
    }
}

impl fmt::Display for PsciError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PSCI: {} ({})", self.as_str(), *self as i32)
    }
}

/// Affinity level states returned by AFFINITY_INFO
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AffinityState {
    /// CPU is on
    On = 0,
    /// CPU is off
    Off = 1,
    /// CPU on is pending
    OnPending = 2,
}

/// Transport for PSCI function calls.
pub trait PsciConduit: Send + Sync {
    /// Issue a PSCI call and return the firmware's x0.
    ///
    /// # Safety
    /// The function ID and arguments must be valid for the firmware; for
    /// CPU_ON the entry point must be executable code prepared to run on
    /// a freshly reset core.
    unsafe fn call(&self, func: u32, arg0: u64, arg1: u64, arg2: u64) -> i64;
}

/// The conduit firmware advertised (DT `/psci` `method` or ACPI FADT flags).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PsciMethod {
    /// Secure Monitor Call, serviced at EL3
    Smc,
    /// Hypervisor Call, serviced at EL2
    Hvc,
}

#[cfg(target_arch = "aarch64")]
impl PsciConduit for PsciMethod {
    #[inline]
    unsafe fn call(&self, func: u32, arg0: u64, arg1: u64, arg2: u64) -> i64 {
        match self {
            // SAFETY: Caller upholds the PSCI argument contract.
            Self::Smc => unsafe { psci_call_smc(func, arg0, arg1, arg2) },
            // SAFETY: Caller upholds the PSCI argument contract.
            Self::Hvc => unsafe { psci_call_hvc(func, arg0, arg1, arg2) },
        }
    }
}

/// Issue a PSCI call via HVC (Hypervisor Call).
///
/// # Safety
/// This issues an HVC instruction.
#[cfg(target_arch = "aarch64")]
#[inline]
unsafe fn psci_call_hvc(func: u32, arg0: u64, arg1: u64, arg2: u64) -> i64 {
    let result: i64;
    // SAFETY: Caller guarantees the call is valid for the firmware.
    unsafe {
        core::arch::asm!(
            "hvc #0",
            inout("x0") func as u64 => result,
            inout("x1") arg0 => _,
            inout("x2") arg1 => _,
            inout("x3") arg2 => _,
            options(nomem, nostack)
        );
    }
    result
}

/// Issue a PSCI call via SMC (Secure Monitor Call).
///
/// # Safety
/// This issues an SMC instruction.
#[cfg(target_arch = "aarch64")]
#[inline]
unsafe fn psci_call_smc(func: u32, arg0: u64, arg1: u64, arg2: u64) -> i64 {
    let result: i64;
    // SAFETY: Caller guarantees the call is valid for the firmware.
    unsafe {
        core::arch::asm!(
            "smc #0",
            inout("x0") func as u64 => result,
            inout("x1") arg0 => _,
            inout("x2") arg1 => _,
            inout("x3") arg2 => _,
            options(nomem, nostack)
        );
    }
    result
}

/// PSCI firmware interface bound to a conduit.
#[derive(Debug, Clone, Copy)]
pub struct Psci<C> {
    conduit: C,
}

impl<C: PsciConduit> Psci<C> {
    pub const fn new(conduit: C) -> Self {
        Self { conduit }
    }

    /// Get the PSCI version supported by firmware.
    ///
    /// Returns (major, minor) version tuple.
    pub fn version(&self) -> (u16, u16) {
        // SAFETY: PSCI_VERSION takes no arguments and has no side effects
        let v = unsafe { self.conduit.call(PSCI_VERSION, 0, 0, 0) };
        if v < 0 {
            return (0, 0);
        }
        let major = ((v >> 16) & 0xFFFF) as u16;
        let minor = (v & 0xFFFF) as u16;
        (major, minor)
    }

    /// Check if PSCI is available and working.
    ///
    /// Version 0.0 (or an error) means no usable firmware.
    pub fn is_available(&self) -> bool {
        self.version() != (0, 0)
    }

    /// Start a CPU at the specified entry point.
    ///
    /// # Arguments
    /// * `target_cpu` - MPIDR_EL1 affinity value of the target CPU
    /// * `entry_point` - Physical address of the entry point
    /// * `context_id` - Value passed to the target CPU in x0
    ///
    /// # Safety
    /// - `entry_point` must be a valid physical address of executable code
    /// - The entry point code must be prepared to run on a fresh CPU
    pub unsafe fn cpu_on(
        &self,
        target_cpu: u64,
        entry_point: u64,
        context_id: u64,
    ) -> Result<(), PsciError> {
        // SAFETY: Caller guarantees entry_point is valid executable code
        let result = unsafe { self.conduit.call(CPU_ON_64, target_cpu, entry_point, context_id) };

        if result == 0 {
            Ok(())
        } else {
            Err(PsciError::from_raw(result))
        }
    }

    /// Power down the calling CPU.
    ///
    /// Only returns if firmware refused the request.
    ///
    /// # Safety
    /// The CPU must be in a state where it's safe to power down: interrupts
    /// masked, no locks held, nothing left that other cores depend on.
    pub unsafe fn cpu_off(&self) -> PsciError {
        // SAFETY: Caller guarantees the CPU is ready to power down
        let result = unsafe { self.conduit.call(CPU_OFF, 0, 0, 0) };

        PsciError::from_raw(result)
    }

    /// Query the power state of a CPU.
    ///
    /// # Arguments
    /// * `target_cpu` - MPIDR_EL1 affinity value of the target CPU
    pub fn affinity_info(&self, target_cpu: u64) -> Result<AffinityState, PsciError> {
        // SAFETY: AFFINITY_INFO only reads firmware state
        let result = unsafe { self.conduit.call(AFFINITY_INFO_64, target_cpu, 0, 0) };

        match result {
            0 => Ok(AffinityState::On),
            1 => Ok(AffinityState::Off),
            2 => Ok(AffinityState::OnPending),
            _ => Err(PsciError::from_raw(result)),
        }
    }
}
