//! # arcus-common
//!
//! Shared types and constants for the SMP core and the secondary entry
//! trampoline.
//!
//! This crate defines the ABI seen by code that runs before a secondary
//! core has its own addressing context:
//! - [`HandoffBlock`](boot::HandoffBlock): task/stack/status handed to a released core
//! - [`BootStatus`](boot::BootStatus): progress and failure values of the status word
//! - [`ParkingMailbox`](boot::ParkingMailbox): ACPI parking-protocol mailbox layout
//! - [`hwid`]: MPIDR hardware identifier helpers
//! - [`CpuMask`](cpumask::CpuMask): fixed-width set of logical core indices
//!
//! All shared-memory types use `#[repr(C)]` for stable ABI across
//! compilation units.
//!
//! # no_std
//!
//! This crate is `#![no_std]` and has zero dependencies.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod boot;
pub mod cpumask;
pub mod hwid;

pub use boot::{BootStatus, HandoffBlock, ParkingMailbox};
pub use cpumask::{CpuMask, MAX_CPUS};
pub use hwid::{INVALID_HWID, MPIDR_HWID_BITMASK};
