//! ARM64 Cache Maintenance
//!
//! Cleans data cache lines to the point of coherency so a core running
//! with its MMU and caches off observes what the releasing core wrote.
//!
//! The cache line size is read from `CTR_EL0.DminLine` at runtime and
//! cached.

/// Decode the minimum data cache line size in bytes from a raw CTR_EL0.
///
/// `DminLine` (bits [19:16]) is log2 of the number of 4-byte words.
#[must_use]
pub const fn dminline_bytes(ctr: u64) -> usize {
    4 << ((ctr >> 16) & 0xF) as usize
}

/// Cache-line aligned span `[start, end)` covering `addr..addr + size`.
#[must_use]
pub const fn line_span(addr: usize, size: usize, line: usize) -> (usize, usize) {
    let start = addr & !(line - 1);
    let end = (addr + size + line - 1) & !(line - 1);
    (start, end)
}

#[cfg(target_arch = "aarch64")]
pub use hw::*;

#[cfg(target_arch = "aarch64")]
mod hw {
    use core::arch::asm;
    use core::sync::atomic::{AtomicUsize, Ordering};

    /// Cached line size; 0 means not yet read.
    static CACHE_LINE_SIZE: AtomicUsize = AtomicUsize::new(0);

    /// Get the data cache minimum line size from CTR_EL0.
    #[inline]
    #[must_use]
    pub fn cache_line_size() -> usize {
        let cached = CACHE_LINE_SIZE.load(Ordering::Relaxed);
        if cached != 0 {
            return cached;
        }

        let ctr: u64;
        // SAFETY: Reading CTR_EL0 is always safe and has no side effects.
        unsafe {
            asm!("mrs {}, ctr_el0", out(reg) ctr, options(nomem, nostack, preserves_flags));
        }

        let line_size = super::dminline_bytes(ctr);
        CACHE_LINE_SIZE.store(line_size, Ordering::Relaxed);
        line_size
    }

    /// Clean data cache lines covering `vaddr..vaddr + size` to the PoC
    ///
    /// Uses DC CVAC followed by DSB so the clean has completed before the
    /// caller releases another core.
    ///
    /// # Safety
    /// `vaddr..vaddr + size` must be mapped.
    pub unsafe fn clean_range(vaddr: usize, size: usize) {
        if size == 0 {
            return;
        }

        let line = cache_line_size();
        let (start, end) = super::line_span(vaddr, size, line);
        let mut addr = start;
        while addr < end {
            // SAFETY: Caller guarantees the range is mapped.
            unsafe {
                asm!("dc cvac, {addr}", addr = in(reg) addr, options(nostack));
            }
            addr += line;
        }

        // SAFETY: Memory barrier is always safe
        unsafe {
            asm!("dsb sy", options(nostack));
        }
    }

    /// Clean and invalidate data cache lines covering a range (DC CIVAC)
    ///
    /// # Safety
    /// `vaddr..vaddr + size` must be mapped.
    pub unsafe fn flush_range(vaddr: usize, size: usize) {
        if size == 0 {
            return;
        }

        let line = cache_line_size();
        let (start, end) = super::line_span(vaddr, size, line);
        let mut addr = start;
        while addr < end {
            // SAFETY: Caller guarantees the range is mapped.
            unsafe {
                asm!("dc civac, {addr}", addr = in(reg) addr, options(nostack));
            }
            addr += line;
        }

        // SAFETY: Memory barrier is always safe
        unsafe {
            asm!("dsb sy", options(nostack));
        }
    }
}
