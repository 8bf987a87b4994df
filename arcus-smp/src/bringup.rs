//! Bring-Up Orchestrator
//!
//! Runs on an already-online core and starts secondaries one at a time:
//! publish the idle context, release the core through its strategy, wait
//! a bounded time for it to come online, and classify the failure from
//! the status word if it does not.

use crate::error::{BringUpError, BringUpResult};
use crate::platform::Platform;
use crate::smp::{DeathState, RunMode, SmpCore};
use arcus_common::BootStatus;

impl<P: Platform> SmpCore<P> {
    /// Register the calling core as the running boot core.
    ///
    /// Its exception level becomes the reference secondaries must match.
    pub fn prepare_boot_cpu(&self) {
        let cpu = self.platform.current_cpu();
        self.platform.set_per_cpu_offset(cpu);
        self.platform.store_cpu_info(cpu);

        let el = self.platform.current_el();
        self.boot_el.store(el, core::sync::atomic::Ordering::Release);
        self.record_el(cpu, el);

        self.registry.mark_possible(cpu, true);
        self.registry.mark_present(cpu, true);
        self.registry.mark_online(cpu, true);
        self.registry.mark_active(cpu, true);
        self.set_death_state(cpu, DeathState::Alive);
        log::debug!("CPU{cpu}: boot CPU at EL{el}");
    }

    /// Make every possible secondary that its strategy can prepare present.
    ///
    /// `max_cpus == 0` leaves the system uniprocessor.
    pub fn prepare_cpus(&self, max_cpus: usize) {
        let this = self.platform.current_cpu();
        self.platform.store_topology(this);

        if max_cpus == 0 {
            return;
        }

        for cpu in self.registry.possible_mask().iter() {
            if cpu == this {
                continue;
            }
            let Some(ops) = self.registry.ops(cpu) else {
                continue;
            };
            if let Err(err) = ops.prepare(cpu) {
                log::debug!("CPU{cpu}: {} prepare failed: {err}", ops.name());
                continue;
            }
            self.registry.mark_present(cpu, true);
        }
    }

    /// Bring `cpu` online.
    ///
    /// Returns once the core has registered itself online, or with the
    /// classified failure once the boot timeout has expired.
    ///
    /// # Panics
    /// If the core reports a configuration that is fatal to the whole
    /// system.
    pub fn bring_up(&self, cpu: usize) -> BringUpResult<()> {
        let record = self.registry.lookup(cpu).ok_or(BringUpError::InvalidCpu)?;
        let ops = record.ops().ok_or(BringUpError::InvalidCpu)?;
        if !record.is_present() {
            return Err(BringUpError::NotPresent);
        }
        if record.is_online() {
            return Err(BringUpError::AlreadyOnline);
        }

        let _guard = self.bringup_lock.lock();

        let idle = self.platform.idle_context(cpu);
        self.running.reinit();
        self.set_death_state(cpu, DeathState::Alive);
        self.handoff.publish(idle.task, idle.stack_top, |addr, len| {
            self.platform.clean_dcache_range(addr, len);
        });

        if let Err(err) = ops.boot(cpu) {
            log::error!("CPU{cpu}: failed to boot: {err}");
            self.handoff.clear_context();
            return Err(BringUpError::BootRefused(err));
        }

        self.running.wait_timeout(
            &self.platform,
            self.config.boot_timeout,
            self.config.poll_interval,
        );
        let online = self.registry.is_online(cpu);
        self.handoff.clear_context();
        if online {
            return Ok(());
        }

        log::error!("CPU{cpu}: failed to come online");
        let mut status = self.handoff.status();
        if status == BootStatus::MmuOff.as_raw() {
            status = self.handoff.early_status();
        }
        Err(self.classify_failure(cpu, status))
    }

    fn classify_failure(&self, cpu: usize, status: i64) -> BringUpError {
        match BootStatus::from_raw(status) {
            Some(BootStatus::KillMe) => match self.op_cpu_kill(cpu) {
                Ok(()) => {
                    log::error!("CPU{cpu}: died during early boot");
                    BringUpError::DiedDuringBoot
                }
                Err(err) => {
                    log::error!("CPU{cpu}: may not have shut down cleanly: {err}");
                    log::error!("CPU{cpu}: is stuck in kernel");
                    self.mark_stuck();
                    BringUpError::MayNotHaveShutDownCleanly
                }
            },
            Some(BootStatus::StuckInKernel) => {
                log::error!("CPU{cpu}: is stuck in kernel");
                self.mark_stuck();
                BringUpError::StuckInKernel
            }
            Some(BootStatus::PanicKernel) => {
                panic!("CPU{cpu} detected unsupported configuration");
            }
            _ => {
                log::error!("CPU{cpu}: failed in unknown state : {status:#x}");
                BringUpError::UnknownFailureState(status)
            }
        }
    }

    /// Report the outcome of boot-time bring-up.
    pub fn cpus_done(&self) -> RunMode {
        log::info!(
            "SMP: Total of {} processors activated.",
            self.registry.num_online()
        );
        let mode = self.run_mode();
        match mode {
            RunMode::AllEl2 => log::info!("CPU: All CPU(s) started at EL2"),
            RunMode::AllEl1 => log::info!("CPU: All CPU(s) started at EL1"),
            RunMode::Mismatched => log::warn!("CPU: CPUs started in inconsistent modes"),
        }
        mode
    }

    /// Whether some core may still be executing kernel text outside the
    /// kernel's control.
    ///
    /// True once any core got stuck, or when there are secondaries but
    /// not every one of them can be taken down through `die`. Kexec-style
    /// handover must refuse to proceed while this holds.
    #[must_use]
    pub fn cpus_are_stuck_in_kernel(&self) -> bool {
        self.stuck_count() > 0 || (self.registry.num_possible() > 1 && !self.have_cpu_die())
    }
}
