//! SMP configuration

use arcus_common::MAX_CPUS;
use core::time::Duration;

/// How long the orchestrator waits for a released core to come online.
pub const BOOT_TIMEOUT: Duration = Duration::from_secs(1);

/// How long a hotplug caller waits for a dying core to report death.
pub const DIE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long `stop_all` waits for other cores to go inactive.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// How long `backtrace_all` waits for other cores to dump.
pub const BACKTRACE_TIMEOUT: Duration = Duration::from_secs(10);

/// Runtime configuration of the SMP core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmpConfig {
    /// Configured maximum number of logical cores (clipped to `MAX_CPUS`)
    pub nr_cpu_ids: usize,
    /// Bring-up completion wait
    pub boot_timeout: Duration,
    /// Hotplug death wait
    pub die_timeout: Duration,
    /// Stop broadcast wait
    pub stop_timeout: Duration,
    /// Backtrace broadcast wait
    pub backtrace_timeout: Duration,
    /// Polling step for the death and backtrace waits
    pub poll_interval: Duration,
    /// Polling step for the stop wait
    pub stop_poll_interval: Duration,
}

impl SmpConfig {
    /// Configuration with `nr_cpu_ids` cores and the default timeouts.
    #[must_use]
    pub const fn with_cpus(nr_cpu_ids: usize) -> Self {
        Self {
            nr_cpu_ids: if nr_cpu_ids > MAX_CPUS { MAX_CPUS } else { nr_cpu_ids },
            boot_timeout: BOOT_TIMEOUT,
            die_timeout: DIE_TIMEOUT,
            stop_timeout: STOP_TIMEOUT,
            backtrace_timeout: BACKTRACE_TIMEOUT,
            poll_interval: Duration::from_millis(1),
            stop_poll_interval: Duration::from_micros(1),
        }
    }

    /// Number of usable logical indices, never zero.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        match self.nr_cpu_ids {
            0 => 1,
            n if n > MAX_CPUS => MAX_CPUS,
            n => n,
        }
    }
}

impl Default for SmpConfig {
    fn default() -> Self {
        Self::with_cpus(MAX_CPUS)
    }
}
