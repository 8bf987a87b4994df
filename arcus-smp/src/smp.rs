//! SMP core state
//!
//! [`SmpCore`] owns the registry, the handoff area and every piece of
//! shared bring-up, hotplug and IPI state. Its operations are spread over
//! the `bringup`, `secondary`, `hotplug` and [`ipi`](crate::ipi) modules.

use crate::completion::Completion;
use crate::config::SmpConfig;
use crate::handoff::HandoffArea;
use crate::ipi::IpiState;
use crate::platform::Platform;
use crate::registry::Registry;
use arcus_common::MAX_CPUS;
use core::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use spin::Mutex;

/// Coarse system lifecycle, consulted by the stop handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SystemState {
    Booting = 0,
    Running = 1,
    Halted = 2,
    PowerOff = 3,
    Restart = 4,
}

impl SystemState {
    const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Booting,
            1 => Self::Running,
            2 => Self::Halted,
            3 => Self::PowerOff,
            _ => Self::Restart,
        }
    }
}

/// Where a core is on its way out of the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DeathState {
    /// Running, or never started.
    Alive = 0,
    /// Offlined and expected to report death.
    Dying = 1,
    /// Reported death from its own die path.
    Dead = 2,
    /// Never reported death; its state is unknown.
    Broken = 3,
}

impl DeathState {
    const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Alive,
            1 => Self::Dying,
            2 => Self::Dead,
            _ => Self::Broken,
        }
    }
}

/// Exception levels the online cores were started at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Every core entered the kernel at EL2.
    AllEl2,
    /// Every core entered the kernel at EL1.
    AllEl1,
    /// Cores disagree; hypervisor features are unusable.
    Mismatched,
}

/// SMP bring-up, hotplug and IPI engine for one system.
pub struct SmpCore<P: Platform> {
    pub(crate) platform: P,
    pub(crate) config: SmpConfig,
    pub(crate) registry: Registry,
    pub(crate) handoff: HandoffArea,
    /// Signalled by the secondary being brought up.
    pub(crate) running: Completion,
    /// Serializes bring-up attempts; there is one handoff area.
    pub(crate) bringup_lock: Mutex<()>,
    pub(crate) boot_el: AtomicU8,
    pub(crate) cpu_el: [AtomicU8; MAX_CPUS],
    /// Cores that may still be executing kernel text while not online.
    pub(crate) stuck: AtomicUsize,
    pub(crate) system_state: AtomicU8,
    pub(crate) death: [AtomicU8; MAX_CPUS],
    pub(crate) ipi: IpiState<P::Regs>,
}

impl<P: Platform> SmpCore<P> {
    /// Build the SMP core around an enumerated registry.
    pub fn new(platform: P, config: SmpConfig, registry: Registry) -> Self {
        Self {
            platform,
            config,
            registry,
            handoff: HandoffArea::new(),
            running: Completion::new(),
            bringup_lock: Mutex::new(()),
            boot_el: AtomicU8::new(0),
            cpu_el: [const { AtomicU8::new(0) }; MAX_CPUS],
            stuck: AtomicUsize::new(0),
            system_state: AtomicU8::new(SystemState::Booting as u8),
            death: [const { AtomicU8::new(DeathState::Alive as u8) }; MAX_CPUS],
            ipi: IpiState::new(),
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn config(&self) -> &SmpConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Shared memory the entry trampoline reads.
    pub fn handoff(&self) -> &HandoffArea {
        &self.handoff
    }

    #[must_use]
    pub fn system_state(&self) -> SystemState {
        SystemState::from_raw(self.system_state.load(Ordering::Acquire))
    }

    pub fn set_system_state(&self, state: SystemState) {
        self.system_state.store(state as u8, Ordering::Release);
    }

    /// Number of cores counted as stuck in the kernel.
    #[must_use]
    pub fn stuck_count(&self) -> usize {
        self.stuck.load(Ordering::Acquire)
    }

    pub(crate) fn mark_stuck(&self) {
        self.stuck.fetch_add(1, Ordering::AcqRel);
    }

    #[must_use]
    pub fn death_state(&self, cpu: usize) -> DeathState {
        match self.death.get(cpu) {
            Some(state) => DeathState::from_raw(state.load(Ordering::Acquire)),
            None => DeathState::Alive,
        }
    }

    pub(crate) fn set_death_state(&self, cpu: usize, state: DeathState) {
        if let Some(slot) = self.death.get(cpu) {
            slot.store(state as u8, Ordering::Release);
        }
    }

    pub(crate) fn record_el(&self, cpu: usize, el: u8) {
        if let Some(slot) = self.cpu_el.get(cpu) {
            slot.store(el, Ordering::Release);
        }
    }

    /// Exception level the boot core entered the kernel at.
    #[must_use]
    pub fn boot_el(&self) -> u8 {
        self.boot_el.load(Ordering::Acquire)
    }

    /// Compare the entry exception level of every online core.
    #[must_use]
    pub fn run_mode(&self) -> RunMode {
        let mut levels = self
            .registry
            .online_mask()
            .iter()
            .map(|cpu| self.cpu_el[cpu].load(Ordering::Acquire));
        let Some(first) = levels.next() else {
            return RunMode::AllEl1;
        };
        if levels.any(|el| el != first) {
            RunMode::Mismatched
        } else if first == 2 {
            RunMode::AllEl2
        } else {
            RunMode::AllEl1
        }
    }
}
