//! Secondary Entry Handler
//!
//! First Rust code a released core runs, reached from the entry
//! trampoline with the MMU on and the idle stack installed. It finishes
//! per-core setup, reports success through the handoff status word,
//! marks itself online and never returns.

use crate::platform::Platform;
use crate::smp::SmpCore;
use arcus_common::BootStatus;

impl<P: Platform> SmpCore<P> {
    /// Entry point of a released secondary core.
    ///
    /// Ordering matters: the core only reports [`BootStatus::BootSuccess`]
    /// and goes online after every setup step has completed, and only
    /// enables interrupts after the orchestrator has been signalled.
    pub fn secondary_start(&self) -> ! {
        let cpu = self.platform.current_cpu();

        self.platform.set_per_cpu_offset(cpu);
        self.platform.enter_kernel_mm(cpu);
        self.platform.uninstall_idmap(cpu);

        self.verify_run_el(cpu);
        if let Err(err) = self.platform.check_local_capabilities(cpu) {
            log::error!("CPU{cpu}: {err}");
            self.cpu_die_early();
        }

        if let Some(ops) = self.registry.ops(cpu) {
            ops.postboot();
        }

        self.platform.store_cpu_info(cpu);
        self.record_el(cpu, self.platform.current_el());

        if let Err(err) = self.platform.notify_cpu_starting(cpu) {
            log::error!("CPU{cpu}: {err}");
            self.cpu_die_early();
        }

        self.platform.store_topology(cpu);
        log::info!("CPU{cpu}: Booted secondary processor");

        self.handoff.set_status(BootStatus::BootSuccess);
        self.registry.mark_online(cpu, true);
        self.registry.mark_active(cpu, true);
        self.running.complete();

        self.platform.local_irq_enable();
        self.platform.local_async_enable();
        self.platform.idle_loop(cpu)
    }

    /// A core entering at a different exception level than the boot core
    /// makes the whole system unsupportable; it reports that and parks,
    /// and the orchestrator turns the report into a panic.
    fn verify_run_el(&self, cpu: usize) {
        let el = self.platform.current_el();
        let boot = self.boot_el();
        if el != boot {
            log::error!("CPU{cpu}: mismatched Exception Level(EL{el}) with boot CPU(EL{boot})");
            self.cpu_panic_kernel();
        }
    }

    fn cpu_panic_kernel(&self) -> ! {
        self.handoff.set_status(BootStatus::PanicKernel);
        self.platform.park()
    }
}
