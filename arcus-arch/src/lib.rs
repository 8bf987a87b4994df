//! # arcus-arch
//!
//! ARM64 CPU primitives used by the SMP core:
//! - [`cpu`]: identity (MPIDR, CurrentEL), interrupt masking, WFI/SEV, barriers
//! - [`cache`]: data cache maintenance by virtual address range
//! - [`mmu`]: identity-map teardown on a freshly booted secondary
//! - [`counter`]: generic timer counter for bounded waits
//!
//! Everything that touches system registers or issues barrier/cache
//! instructions only exists on `aarch64`. The register-decoding helpers
//! are plain functions and build on any target.
//!
//! # Safety
//!
//! All unsafe operations are documented with `// SAFETY:` comments
//! explaining the invariants that must be maintained.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod cache;
pub mod counter;
pub mod cpu;
#[cfg(target_arch = "aarch64")]
pub mod mmu;
