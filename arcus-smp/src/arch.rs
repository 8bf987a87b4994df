//! aarch64 building blocks
//!
//! Pieces a kernel's [`Platform`](crate::Platform) implementation and
//! [`MethodFactory`](crate::enable_method::MethodFactory) are assembled
//! from: the generic timer as [`Clock`], cache and event primitives as
//! [`BootServices`], and SGI-based cross calls addressed through the
//! registry.

use crate::enable_method::BootServices;
use crate::ipi::IpiKind;
use crate::registry::Registry;
use crate::wait::Clock;
use arcus_arch::{cache, counter, cpu};
use arcus_common::{CpuMask, hwid};
use arcus_pal::gic;
use core::time::Duration;

fn duration_ns(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// The generic timer's virtual counter.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchClock;

impl Clock for ArchClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(counter::now_ns())
    }

    fn delay(&self, duration: Duration) {
        counter::delay_ns(duration_ns(duration));
    }
}

/// Boot services over the kernel's linear map.
#[derive(Debug, Clone, Copy)]
pub struct ArchServices {
    linear_offset: usize,
}

impl ArchServices {
    /// # Safety
    /// Physical address `p` must be mapped at `p + linear_offset` for every
    /// release address and mailbox handed to the enable methods.
    pub const unsafe fn new(linear_offset: usize) -> Self {
        Self { linear_offset }
    }
}

impl BootServices for ArchServices {
    fn phys_to_virt(&self, phys: u64) -> usize {
        (phys as usize).wrapping_add(self.linear_offset)
    }

    fn clean_dcache_range(&self, addr: usize, len: usize) {
        // SAFETY: strategies only clean what phys_to_virt gave them, which
        // ArchServices::new's contract says is mapped.
        unsafe { cache::clean_range(addr, len) };
    }

    fn send_event(&self) {
        cpu::send_event();
    }

    fn send_wakeup(&self, _cpu: usize, hwid: u64) {
        gic::raise_sgi(IpiKind::Wakeup.sgi(), [hwid]);
    }

    fn delay(&self, duration: Duration) {
        counter::delay_ns(duration_ns(duration));
    }
}

/// Raise `kind` on `targets` by hardware identifier.
///
/// Suitable as the body of [`Platform::cross_call`](crate::Platform::cross_call).
pub fn raise_ipi(registry: &Registry, targets: CpuMask, kind: IpiKind) {
    if targets.is_empty() {
        return;
    }
    gic::raise_sgi(kind.sgi(), targets.iter().map(|cpu| registry.hwid(cpu)));
}

/// Logical index of the calling core, looked up by its MPIDR.
#[must_use]
pub fn this_cpu(registry: &Registry) -> Option<usize> {
    registry.logical_of(hwid::from_mpidr(cpu::mpidr()))
}

/// Exception level of the calling core.
#[must_use]
pub fn current_el() -> u8 {
    cpu::current_el()
}

/// Mask IRQ and FIQ on the calling core.
pub fn local_irq_disable() {
    cpu::mask_interrupts();
}

/// Unmask IRQ and FIQ on the calling core.
pub fn local_irq_enable() {
    cpu::enable_interrupts();
}

/// Unmask SError on the calling core.
pub fn local_async_enable() {
    cpu::enable_async_abort();
}

/// WFI loop with interrupts masked.
pub fn park() -> ! {
    local_irq_disable();
    cpu::park_loop()
}

/// Drop the boot identity map on the calling core.
///
/// # Safety
/// `empty_table` must be the physical address of a zeroed translation
/// table, and nothing on this core may still run from the identity map.
pub unsafe fn uninstall_idmap(empty_table: u64) {
    // SAFETY: forwarded contract
    unsafe { arcus_arch::mmu::uninstall_idmap(empty_table) };
}

/// Write back and invalidate `addr..addr + len` before a core stops.
///
/// # Safety
/// The range must be mapped.
pub unsafe fn flush_dcache_range(addr: usize, len: usize) {
    // SAFETY: forwarded contract
    unsafe { cache::flush_range(addr, len) };
}
