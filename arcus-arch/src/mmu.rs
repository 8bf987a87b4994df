//! Identity Map Teardown
//!
//! A secondary core comes up through an identity mapping installed in
//! TTBR0. Once it runs from the kernel's TTBR1 mapping, TTBR0 is pointed
//! at a zeroed table so speculative walks cannot pick up stale
//! physical-address translations.

use aarch64_cpu::registers::*;
use core::arch::asm;

/// Replace TTBR0 with `empty_table` and drop all cached translations
///
/// # Safety
/// - Must run after the caller has stopped executing from the identity map
/// - `empty_table` must be the physical address of a zeroed 4 KiB table
pub unsafe fn uninstall_idmap(empty_table: u64) {
    TTBR0_EL1.set(empty_table);

    // SAFETY: TLB invalidation of the local core is safe
    unsafe {
        asm!(
            "tlbi vmalle1",
            "dsb nsh",
            "isb",
            options(nostack)
        );
    }
}
