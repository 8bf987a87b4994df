//! Generic Timer Counter
//!
//! The SMP core only needs a monotonic clock for its bounded waits, so
//! this reads the virtual counter directly instead of programming a
//! timer.

/// Convert counter ticks to nanoseconds without overflowing for
/// realistic uptimes.
#[must_use]
pub const fn ticks_to_nanos(ticks: u64, freq: u64) -> u64 {
    if freq == 0 {
        return 0;
    }
    let secs = ticks / freq;
    let frac = ticks % freq;
    secs * 1_000_000_000 + (frac * 1_000_000_000) / freq
}

/// Convert nanoseconds to counter ticks, rounding up.
#[must_use]
pub const fn nanos_to_ticks(nanos: u64, freq: u64) -> u64 {
    let secs = nanos / 1_000_000_000;
    let frac = nanos % 1_000_000_000;
    secs * freq + (frac * freq).div_ceil(1_000_000_000)
}

#[cfg(target_arch = "aarch64")]
pub use hw::*;

#[cfg(target_arch = "aarch64")]
mod hw {
    use aarch64_cpu::registers::{CNTFRQ_EL0, CNTVCT_EL0, Readable};

    /// Counter frequency in Hz
    #[must_use]
    pub fn frequency() -> u64 {
        CNTFRQ_EL0.get()
    }

    /// Current virtual counter value
    #[must_use]
    pub fn read_counter() -> u64 {
        CNTVCT_EL0.get()
    }

    /// Nanoseconds since the counter started
    #[must_use]
    pub fn now_ns() -> u64 {
        super::ticks_to_nanos(read_counter(), frequency())
    }

    /// Spin for at least `nanos` nanoseconds
    pub fn delay_ns(nanos: u64) {
        let freq = frequency();
        if freq == 0 {
            for _ in 0..nanos / 10 {
                core::hint::spin_loop();
            }
            return;
        }

        let ticks = super::nanos_to_ticks(nanos, freq);
        let start = read_counter();
        while read_counter().wrapping_sub(start) < ticks {
            core::hint::spin_loop();
        }
    }
}
