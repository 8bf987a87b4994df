//! Hotplug Controller
//!
//! Taking a core offline is a rendezvous between two cores:
//!
//! 1. the target runs [`SmpCore::cpu_disable`], leaves the online set and
//!    moves its interrupts away;
//! 2. the target's idle loop calls [`SmpCore::cpu_die`], reports death and
//!    hands itself to its strategy's `die`, which never returns;
//! 3. a surviving core waits in [`SmpCore::wait_for_death`] for the report
//!    and then asks firmware to confirm the target is really off.
//!
//! Death reporting is the only synchronization point, so a target that
//! never reports is left `Broken` and counted as stuck.
//!
//! Early death ([`SmpCore::cpu_die_early`]) is the failure path of
//! secondary entry and exists with or without the `hotplug` feature.

use crate::error::{HotplugError, HotplugResult, OpsError, OpsResult};
use crate::ops::OpsFeatures;
use crate::platform::Platform;
use crate::smp::SmpCore;
#[cfg(feature = "hotplug")]
use crate::smp::DeathState;
#[cfg(feature = "hotplug")]
use crate::wait::poll_with_timeout;
use arcus_common::BootStatus;

#[cfg(feature = "hotplug")]
impl<P: Platform> SmpCore<P> {
    /// Take the calling core offline.
    ///
    /// Refused unless the core's strategy can make it die; the strategy's
    /// own `disable` hook gets the last word.
    pub fn cpu_disable(&self) -> HotplugResult<()> {
        let cpu = self.platform.current_cpu();
        if self.registry.lookup(cpu).is_none() {
            return Err(HotplugError::InvalidCpu);
        }
        // No strategy at all means no way to die either.
        let Some(ops) = self.registry.ops(cpu) else {
            return Err(HotplugError::UnsupportedHotplug);
        };
        let features = ops.features();
        if !features.contains(OpsFeatures::DIE) {
            return Err(HotplugError::UnsupportedHotplug);
        }
        if features.contains(OpsFeatures::DISABLE) {
            ops.disable(cpu).map_err(HotplugError::Refused)?;
        }

        self.registry.mark_active(cpu, false);
        self.registry.mark_online(cpu, false);
        self.set_death_state(cpu, DeathState::Dying);
        self.platform.migrate_irqs_away(cpu);
        log::debug!("CPU{cpu}: offline");
        Ok(())
    }

    /// Wait for `cpu` to report death, then confirm it with firmware.
    ///
    /// Runs on a surviving core. A failed confirmation only warns: the
    /// core already left the kernel's control when it reported death.
    pub fn wait_for_death(&self, cpu: usize) -> HotplugResult<()> {
        if self.registry.lookup(cpu).is_none() {
            return Err(HotplugError::InvalidCpu);
        }

        let dead = poll_with_timeout(
            &self.platform,
            self.config.die_timeout,
            self.config.poll_interval,
            || self.death_state(cpu) == DeathState::Dead,
        );
        if !dead {
            log::error!("CPU{cpu}: cpu didn't die");
            self.set_death_state(cpu, DeathState::Broken);
            self.mark_stuck();
            return Err(HotplugError::DidNotDie);
        }
        log::debug!("CPU{cpu}: shutdown");

        if let Err(err) = self.op_cpu_kill(cpu) {
            log::warn!("CPU{cpu} may not have shut down cleanly: {err}");
        }
        Ok(())
    }

    /// Final act of an offlined core, called from its idle loop.
    ///
    /// # Panics
    /// If the strategy's `die` returns; there is nowhere left to go.
    pub fn cpu_die(&self) -> ! {
        let cpu = self.platform.current_cpu();
        self.platform.idle_task_exit(cpu);
        self.platform.local_irq_disable();

        // Past this store the surviving core may tear down our resources.
        self.set_death_state(cpu, DeathState::Dead);

        let err = match self.registry.ops(cpu) {
            Some(ops) => ops.die(cpu),
            None => OpsError::NotSupported,
        };
        panic!("CPU{cpu}: cpu_die returned ({err})");
    }

    /// Whether every possible core can be taken down through `die`.
    #[must_use]
    pub fn have_cpu_die(&self) -> bool {
        self.registry
            .possible_mask()
            .iter()
            .all(|cpu| self.registry.features(cpu).contains(OpsFeatures::DIE))
    }
}

#[cfg(not(feature = "hotplug"))]
impl<P: Platform> SmpCore<P> {
    /// Offlining is compiled out; every core stays online.
    pub fn cpu_disable(&self) -> HotplugResult<()> {
        Err(HotplugError::UnsupportedHotplug)
    }

    /// Without hotplug no core can ever be taken down.
    #[must_use]
    pub fn have_cpu_die(&self) -> bool {
        false
    }
}

impl<P: Platform> SmpCore<P> {
    /// Give up on the calling core before it went online.
    ///
    /// Leaves the present set, asks to be killed and tries to die through
    /// its strategy; if that is impossible, reports itself stuck and
    /// parks.
    pub fn cpu_die_early(&self) -> ! {
        let cpu = self.platform.current_cpu();
        log::error!("CPU{cpu}: will not boot");

        self.registry.mark_present(cpu, false);

        #[cfg(feature = "hotplug")]
        {
            self.handoff.set_status(BootStatus::KillMe);
            if let Some(ops) = self.registry.ops(cpu) {
                if ops.features().contains(OpsFeatures::DIE) {
                    let err = ops.die(cpu);
                    log::error!("CPU{cpu}: die failed: {err}");
                }
            }
        }

        self.handoff.set_status(BootStatus::StuckInKernel);
        self.platform.park()
    }

    /// Ask firmware whether `cpu` has really left the kernel.
    ///
    /// A strategy with no way to ask is taken at its word.
    pub(crate) fn op_cpu_kill(&self, cpu: usize) -> OpsResult<()> {
        if !cfg!(feature = "hotplug") {
            return Err(OpsError::NotSupported);
        }
        match self.registry.ops(cpu) {
            Some(ops) if ops.features().contains(OpsFeatures::KILL) => ops.kill(cpu),
            _ => Ok(()),
        }
    }
}

#[cfg(all(test, feature = "hotplug"))]
mod tests {
    extern crate std;

    use super::*;
    use crate::config::SmpConfig;
    use crate::registry::Registry;
    use crate::testing::{FakeOps, FakePlatform, Hook, set_current_cpu};
    use alloc::boxed::Box;
    use core::time::Duration;
    use std::thread;
    use std::vec;

    fn online_pair(ops: FakeOps, platform: FakePlatform) -> &'static SmpCore<FakePlatform> {
        let mut registry = Registry::new(2);
        registry.assign(0, 0x0).unwrap();
        registry.assign(1, 0x1).unwrap();
        registry.set_ops(0, Box::new(FakeOps::new().with_features(OpsFeatures::DIE)));
        registry.set_ops(1, Box::new(ops));
        registry.mark_possible(1, true);
        let core = Box::leak(Box::new(SmpCore::new(
            platform,
            SmpConfig::with_cpus(2),
            registry,
        )));
        core.prepare_boot_cpu();
        core.registry.mark_present(1, true);
        core.registry.mark_online(1, true);
        core.registry.mark_active(1, true);
        core
    }

    #[test]
    fn test_disable_requires_die() {
        let core = online_pair(FakeOps::new(), FakePlatform::new());
        set_current_cpu(1);
        assert_eq!(core.cpu_disable(), Err(HotplugError::UnsupportedHotplug));
        assert!(core.registry.is_online(1));
    }

    #[test]
    fn test_disable_core_without_ops() {
        let mut registry = Registry::new(2);
        registry.assign(0, 0x0).unwrap();
        registry.assign(1, 0x1).unwrap();
        registry.set_ops(1, Box::new(FakeOps::new().with_features(OpsFeatures::DIE)));
        registry.mark_possible(1, true);
        let core = Box::leak(Box::new(SmpCore::new(
            FakePlatform::new(),
            SmpConfig::with_cpus(2),
            registry,
        )));
        core.prepare_boot_cpu();

        set_current_cpu(0);
        assert_eq!(core.cpu_disable(), Err(HotplugError::UnsupportedHotplug));
        assert!(core.registry.is_online(0));

        set_current_cpu(5);
        assert_eq!(core.cpu_disable(), Err(HotplugError::InvalidCpu));
    }

    #[test]
    fn test_disable_hook_can_refuse() {
        let ops = FakeOps::new().with_features(OpsFeatures::DIE | OpsFeatures::DISABLE);
        ops.control().disable_result(Err(OpsError::Denied));
        let core = online_pair(ops, FakePlatform::new());
        set_current_cpu(1);
        assert_eq!(
            core.cpu_disable(),
            Err(HotplugError::Refused(OpsError::Denied))
        );
        assert!(core.registry.is_online(1));
    }

    #[test]
    fn test_disable_takes_core_offline() {
        let core = online_pair(
            FakeOps::new().with_features(OpsFeatures::DIE),
            FakePlatform::new(),
        );
        set_current_cpu(1);
        assert_eq!(core.cpu_disable(), Ok(()));
        assert!(!core.registry.is_online(1) && !core.registry.is_active(1));
        assert!(core.registry.is_present(1));
        assert_eq!(core.death_state(1), DeathState::Dying);
        assert_eq!(core.platform.hooks(1), vec![Hook::MigrateIrqs]);
    }

    #[test]
    fn test_full_offline_rendezvous() {
        let ops = FakeOps::new().with_features(OpsFeatures::DIE | OpsFeatures::KILL);
        let control = ops.control();
        let core = online_pair(ops, FakePlatform::realtime());

        thread::spawn(move || {
            set_current_cpu(1);
            core.cpu_disable().unwrap();
            core.cpu_die();
        });

        assert_eq!(core.wait_for_death(1), Ok(()));
        assert_eq!(core.death_state(1), DeathState::Dead);
        assert!(!core.registry.is_online(1));
        assert_eq!(control.kills(), 1);
        assert!(!core.cpus_are_stuck_in_kernel());
    }

    #[test]
    fn test_failed_kill_only_warns() {
        let ops = FakeOps::new().with_features(OpsFeatures::DIE | OpsFeatures::KILL);
        ops.control().kill_result(Err(OpsError::Timeout));
        let core = online_pair(ops, FakePlatform::new());
        core.set_death_state(1, DeathState::Dead);
        assert_eq!(core.wait_for_death(1), Ok(()));
        assert_eq!(core.stuck_count(), 0);
    }

    #[test]
    fn test_core_that_never_dies_is_broken() {
        let core = online_pair(
            FakeOps::new().with_features(OpsFeatures::DIE),
            FakePlatform::new(),
        );
        set_current_cpu(1);
        core.cpu_disable().unwrap();
        set_current_cpu(0);

        assert_eq!(core.wait_for_death(1), Err(HotplugError::DidNotDie));
        assert_eq!(core.death_state(1), DeathState::Broken);
        assert!(core.cpus_are_stuck_in_kernel());
        assert!(core.platform.now() >= Duration::from_secs(5));
    }

    #[test]
    #[should_panic(expected = "cpu_die returned")]
    fn test_die_returning_is_fatal() {
        let ops = FakeOps::new().with_features(OpsFeatures::DIE);
        ops.control().die_result(Some(OpsError::Denied));
        let core = online_pair(ops, FakePlatform::new());
        set_current_cpu(1);
        core.cpu_die();
    }

    #[test]
    fn test_kill_without_support_is_trusted() {
        let core = online_pair(FakeOps::new(), FakePlatform::new());
        assert_eq!(core.op_cpu_kill(1), Ok(()));
    }

    #[test]
    fn test_early_death_parks_through_die() {
        let ops = FakeOps::new().with_features(OpsFeatures::DIE);
        let control = ops.control();
        let core = online_pair(ops, FakePlatform::realtime());
        core.registry.mark_online(1, false);

        thread::spawn(move || {
            set_current_cpu(1);
            core.cpu_die_early();
        });
        while control.dies() == 0 {
            thread::yield_now();
        }
        assert_eq!(core.handoff.status(), BootStatus::KillMe.as_raw());
        assert!(!core.registry.is_present(1));
    }
}
