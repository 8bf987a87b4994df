//! Platform seam
//!
//! Everything the SMP core needs from the rest of the kernel: the
//! identity of the calling core, interrupt masking, the interrupt
//! controller's cross-call primitive, cache maintenance, the idle task
//! and the per-core setup steps of secondary entry. The kernel provides
//! one implementation; tests provide a fake.

use crate::error::SecondaryError;
use crate::ipi::IpiKind;
use crate::wait::Clock;
use arcus_common::CpuMask;

/// Idle task and stack handed to a core being released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleContext {
    /// Opaque task pointer the new core adopts.
    pub task: u64,
    /// Initial stack pointer (top of the idle stack).
    pub stack_top: u64,
}

/// Kernel services the SMP core is built on.
///
/// Methods taking `cpu` are always called on that core, except
/// [`Platform::idle_context`] which runs on the orchestrating core.
pub trait Platform: Clock + Send + Sync {
    /// Register state of an interrupted context, kept for stop diagnostics.
    type Regs: Clone + Send;

    /// Logical index of the calling core.
    fn current_cpu(&self) -> usize;

    /// Exception level the calling core runs at.
    fn current_el(&self) -> u8;

    /// Raise `kind` on every core in `targets`.
    ///
    /// Called with an empty mask when a broadcast has nobody to reach; the
    /// implementation decides whether that touches the hardware.
    fn cross_call(&self, targets: CpuMask, kind: IpiKind);

    /// Whether [`Platform::cross_call`] is wired up yet.
    fn cross_call_ready(&self) -> bool {
        true
    }

    fn local_irq_disable(&self);

    fn local_irq_enable(&self);

    /// Unmask asynchronous aborts on the calling core.
    fn local_async_enable(&self) {}

    /// Spin-loop hint.
    fn cpu_relax(&self) {
        core::hint::spin_loop();
    }

    /// Low-power loop the calling core never leaves.
    fn park(&self) -> !;

    /// Clean `[addr, addr + len)` to the point of coherency.
    fn clean_dcache_range(&self, addr: usize, len: usize);

    /// Write back and invalidate the calling core's caches before it stops.
    fn flush_cache_all(&self) {}

    /// Idle task and stack for `cpu`, created on first use.
    fn idle_context(&self, cpu: usize) -> IdleContext;

    /// Point per-core data accessors of the calling core at `cpu`'s area.
    fn set_per_cpu_offset(&self, cpu: usize);

    /// Adopt the kernel's shared address space on the calling core.
    fn enter_kernel_mm(&self, cpu: usize);

    /// Drop the identity mapping the core booted through.
    fn uninstall_idmap(&self, cpu: usize);

    /// Check the calling core against capabilities the system already uses.
    fn check_local_capabilities(&self, cpu: usize) -> Result<(), SecondaryError>;

    /// Record identification registers of the calling core.
    fn store_cpu_info(&self, cpu: usize);

    /// Run the starting notifiers (interrupt controller, timers).
    fn notify_cpu_starting(&self, cpu: usize) -> Result<(), SecondaryError>;

    /// Record the calling core's place in the cache and cluster topology.
    fn store_topology(&self, cpu: usize);

    /// Enter the idle loop of the calling core.
    fn idle_loop(&self, cpu: usize) -> !;

    /// Retarget interrupts routed to `cpu` to the remaining online cores.
    fn migrate_irqs_away(&self, cpu: usize);

    /// Release the idle task's hold on the user address space.
    fn idle_task_exit(&self, cpu: usize);

    fn scheduler_ipi(&self);

    fn call_function_interrupt(&self);

    fn tick_broadcast_receive(&self);

    fn irq_work_run(&self);

    fn show_regs(&self, cpu: usize, regs: &Self::Regs);

    fn dump_stack(&self, cpu: usize);
}
