//! Platform Abstraction Layer
//!
//! Firmware and interrupt-controller interfaces used to release and
//! signal secondary cores:
//! - [`psci`]: PSCI CPU_ON / CPU_OFF / AFFINITY_INFO over an SMC or HVC conduit
//! - [`gic`]: GICv3 SGI generation through `ICC_SGI1R_EL1`
//! - [`release`]: spin-table release address and ACPI parking-protocol mailbox writes
//!
//! The conduit and the SGI register write only exist on `aarch64`; the
//! encoding logic around them is target-independent.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod gic;
pub mod psci;
pub mod release;

pub use psci::{AffinityState, Psci, PsciConduit, PsciError, PsciMethod};
