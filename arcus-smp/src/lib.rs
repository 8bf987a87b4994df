//! # arcus-smp
//!
//! Symmetric multiprocessing for ARM64: discovering the cores a platform
//! exposes, starting them, taking them offline again, and signalling
//! between them.
//!
//! - [`registry`]: logical index ↔ MPIDR map and the possible/present/online/active sets
//! - [`topology`]: validates platform core records into a [`Registry`]
//! - [`enable_method`]: PSCI, spin-table and parking-protocol bring-up strategies
//! - `bringup`: releases secondaries one at a time and classifies failures
//! - `secondary`: the Rust entry point of a released core
//! - `hotplug`: disable/die/kill rendezvous and early death
//! - [`ipi`]: message broadcast, dispatch, stop and backtrace
//!
//! All hardware is reached through the [`Platform`] trait, so everything
//! except the [`arch`] glue runs and is tested on the host.
//!
//! # Usage
//!
//! ```ignore
//! let registry = topology::enumerate(&config, boot_mpidr, Source::DeviceTree, &records, &factory)?;
//! let smp = SMP.init(platform, config, registry);
//! smp.prepare_boot_cpu();
//! smp.prepare_cpus(max_cpus);
//! for cpu in smp.registry().present_mask().iter().skip(1) {
//!     if let Err(err) = smp.bring_up(cpu) {
//!         log::error!("CPU{cpu}: {err}");
//!     }
//! }
//! smp.cpus_done();
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

#[cfg(target_arch = "aarch64")]
pub mod arch;
mod bringup;
pub mod completion;
pub mod config;
pub mod enable_method;
pub mod error;
pub mod global;
pub mod handoff;
mod hotplug;
pub mod ipi;
pub mod ops;
pub mod platform;
pub mod registry;
mod secondary;
pub mod smp;
pub mod topology;
pub mod wait;

#[cfg(test)]
pub(crate) mod testing;

pub use config::SmpConfig;
pub use error::{BringUpError, EnumError, HotplugError, OpsError, RegistryError, SecondaryError};
pub use global::GlobalSmp;
pub use ipi::IpiKind;
pub use ops::{BringUpOps, OpsFeatures};
pub use platform::{IdleContext, Platform};
pub use registry::Registry;
pub use smp::{DeathState, RunMode, SmpCore, SystemState};
pub use topology::{PlatformRecord, Source};
pub use wait::Clock;
