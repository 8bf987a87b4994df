//! CPU Control and Information
//!
//! Low-level CPU operations and information retrieval.

/// Decode the exception level from a raw `CurrentEL` value.
#[must_use]
pub const fn el_from_current_el(raw: u64) -> u8 {
    ((raw >> 2) & 0x3) as u8
}

#[cfg(target_arch = "aarch64")]
pub use hw::*;

#[cfg(target_arch = "aarch64")]
mod hw {
    use aarch64_cpu::registers::*;
    use core::arch::asm;

    /// Read MPIDR_EL1 (raw, including MT/U/RES1 bits)
    #[must_use]
    pub fn mpidr() -> u64 {
        MPIDR_EL1.get()
    }

    /// Get the current exception level
    #[must_use]
    pub fn current_el() -> u8 {
        super::el_from_current_el(CurrentEL.get())
    }

    /// Wait for interrupt (WFI instruction)
    #[inline]
    pub fn wait_for_interrupt() {
        // SAFETY: WFI is always safe to call
        unsafe {
            asm!("wfi", options(nomem, nostack));
        }
    }

    /// Send event (SEV instruction)
    ///
    /// Wakes cores spinning in WFE on a spin-table release address.
    #[inline]
    pub fn send_event() {
        // SAFETY: SEV is always safe to call
        unsafe {
            asm!("sev", options(nomem, nostack));
        }
    }

    /// Park the calling CPU forever.
    ///
    /// The core stays interruptible (WFI wakes on any pending interrupt)
    /// so a debugger or a later firmware kill can still reach it.
    #[inline]
    pub fn park_loop() -> ! {
        loop {
            wait_for_interrupt();
        }
    }

    /// Inner-shareable store barrier
    ///
    /// Orders prior stores before a following SGI or firmware call.
    #[inline]
    pub fn dsb_ishst() {
        // SAFETY: Memory barrier is always safe
        unsafe {
            asm!("dsb ishst", options(nostack));
        }
    }

    /// Instruction synchronization barrier
    #[inline]
    pub fn isb() {
        // SAFETY: ISB is always safe
        unsafe {
            asm!("isb", options(nostack));
        }
    }

    /// Mask IRQ and FIQ
    ///
    /// Nothing is restored afterwards; callers are on their way to park or
    /// die.
    #[inline]
    pub fn mask_interrupts() {
        // SAFETY: Modifying DAIF is safe in kernel mode
        unsafe {
            asm!("msr daifset, #3", options(nomem, nostack));
        }
    }

    /// Unmask IRQ and FIQ
    #[inline]
    pub fn enable_interrupts() {
        // SAFETY: Modifying DAIF is safe in kernel mode
        unsafe {
            asm!("msr daifclr, #3", options(nomem, nostack));
        }
    }

    /// Unmask SError (asynchronous aborts)
    #[inline]
    pub fn enable_async_abort() {
        // SAFETY: Modifying DAIF is safe in kernel mode
        unsafe {
            asm!("msr daifclr, #4", options(nomem, nostack));
        }
    }
}
