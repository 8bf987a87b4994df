//! IPI Dispatch Engine
//!
//! Inter-processor interrupts are a fixed set of message kinds, one SGI
//! number each. A sender marks every target pending and raises the
//! message once for the whole mask; the receiving core counts it,
//! dispatches it and clears its pending flag.
//!
//! Two kinds are diagnostic and serialize their output across responders:
//! `CpuStop` dumps under the stop lock and then parks the core for good,
//! `Backtrace` dumps under the backtrace lock once per session.

use crate::platform::Platform;
use crate::smp::{SmpCore, SystemState};
use crate::wait::poll_with_timeout;
use arcus_common::{CpuMask, MAX_CPUS};
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use spin::Mutex;

/// Number of message kinds.
pub const NR_IPI: usize = 7;

/// IPI message kinds, numbered as they are raised (SGI 0..7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IpiKind {
    Reschedule = 0,
    CallFunction = 1,
    CpuStop = 2,
    TimerBroadcast = 3,
    /// Wakes the deferred-work runner on the target.
    IrqWork = 4,
    /// Arrival alone is the signal; the handler does nothing.
    Wakeup = 5,
    Backtrace = 6,
}

impl IpiKind {
    pub const ALL: [Self; NR_IPI] = [
        Self::Reschedule,
        Self::CallFunction,
        Self::CpuStop,
        Self::TimerBroadcast,
        Self::IrqWork,
        Self::Wakeup,
        Self::Backtrace,
    ];

    /// Decode a raw IPI number.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Reschedule),
            1 => Some(Self::CallFunction),
            2 => Some(Self::CpuStop),
            3 => Some(Self::TimerBroadcast),
            4 => Some(Self::IrqWork),
            5 => Some(Self::Wakeup),
            6 => Some(Self::Backtrace),
            _ => None,
        }
    }

    /// SGI number this kind is raised as.
    #[must_use]
    pub const fn sgi(self) -> u8 {
        self as u8
    }

    /// Row label in the statistics listing.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Reschedule => "Rescheduling interrupts",
            Self::CallFunction => "Function call interrupts",
            Self::CpuStop => "CPU stop interrupts",
            Self::TimerBroadcast => "Timer broadcast interrupts",
            Self::IrqWork => "IRQ work interrupts",
            Self::Wakeup => "CPU wake-up interrupts",
            Self::Backtrace => "CPU backtrace",
        }
    }
}

pub(crate) struct IpiState<R> {
    stats: [[AtomicU32; NR_IPI]; MAX_CPUS],
    pending: [AtomicBool; MAX_CPUS],
    backtrace_busy: AtomicBool,
    backtrace_outstanding: AtomicU64,
    stop_lock: Mutex<()>,
    backtrace_lock: Mutex<()>,
    regs_before_stop: [Mutex<Option<R>>; MAX_CPUS],
}

impl<R> IpiState<R> {
    pub(crate) fn new() -> Self {
        Self {
            stats: [const { [const { AtomicU32::new(0) }; NR_IPI] }; MAX_CPUS],
            pending: [const { AtomicBool::new(false) }; MAX_CPUS],
            backtrace_busy: AtomicBool::new(false),
            backtrace_outstanding: AtomicU64::new(0),
            stop_lock: Mutex::new(()),
            backtrace_lock: Mutex::new(()),
            regs_before_stop: [const { Mutex::new(None) }; MAX_CPUS],
        }
    }
}

impl<P: Platform> SmpCore<P> {
    /// Raise `kind` on every core in `targets`.
    ///
    /// Each target is marked pending first. An empty mask still reaches the
    /// platform exactly once.
    pub fn broadcast(&self, targets: CpuMask, kind: IpiKind) {
        for cpu in targets.iter() {
            self.ipi.pending[cpu].store(true, Ordering::Release);
        }
        log::trace!("IPI {kind:?} -> {targets}");
        self.platform.cross_call(targets, kind);
    }

    /// Handle IPI number `ipinr` on the calling core.
    ///
    /// Called from the interrupt handler with the interrupted context.
    pub fn handle_ipi(&self, ipinr: u32, regs: &P::Regs) {
        let cpu = self.platform.current_cpu();
        let Some(kind) = IpiKind::from_raw(ipinr) else {
            log::error!("CPU{cpu}: Unknown IPI message {ipinr:#x}");
            self.clear_pending(cpu);
            return;
        };

        if let Some(counter) = self.ipi.stats.get(cpu).map(|row| &row[kind as usize]) {
            counter.fetch_add(1, Ordering::Relaxed);
        }

        match kind {
            IpiKind::Reschedule => self.platform.scheduler_ipi(),
            IpiKind::CallFunction => self.platform.call_function_interrupt(),
            IpiKind::CpuStop => self.local_stop(cpu, regs),
            IpiKind::TimerBroadcast => self.platform.tick_broadcast_receive(),
            IpiKind::IrqWork => self.platform.irq_work_run(),
            IpiKind::Wakeup => {}
            IpiKind::Backtrace => self.backtrace_response(cpu, regs),
        }

        self.clear_pending(cpu);
    }

    fn clear_pending(&self, cpu: usize) {
        if let Some(flag) = self.ipi.pending.get(cpu) {
            flag.store(false, Ordering::Release);
        }
    }

    /// Whether a message sent to `cpu` has not been handled yet.
    #[must_use]
    pub fn ipi_pending(&self, cpu: usize) -> bool {
        self.ipi
            .pending
            .get(cpu)
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    fn local_stop(&self, cpu: usize, regs: &P::Regs) -> ! {
        if matches!(
            self.system_state(),
            SystemState::Booting | SystemState::Running
        ) {
            if let Some(slot) = self.ipi.regs_before_stop.get(cpu) {
                *slot.lock() = Some(regs.clone());
            }
            let _guard = self.ipi.stop_lock.lock();
            log::error!("CPU{cpu}: stopping");
            self.platform.show_regs(cpu, regs);
            self.platform.dump_stack(cpu);
        }

        self.registry.mark_active(cpu, false);
        self.platform.flush_cache_all();
        self.platform.local_irq_disable();
        self.platform.park()
    }

    /// Register state `cpu` saved when it was stopped.
    #[must_use]
    pub fn regs_before_stop(&self, cpu: usize) -> Option<P::Regs> {
        self.ipi.regs_before_stop.get(cpu)?.lock().clone()
    }

    fn backtrace_response(&self, cpu: usize, regs: &P::Regs) {
        let bit = CpuMask::of(cpu).bits();
        if self.ipi.backtrace_outstanding.load(Ordering::Acquire) & bit == 0 {
            return;
        }
        {
            let _guard = self.ipi.backtrace_lock.lock();
            log::warn!("IPI backtrace for cpu {cpu}");
            self.platform.show_regs(cpu, regs);
        }
        self.ipi
            .backtrace_outstanding
            .fetch_and(!bit, Ordering::AcqRel);
    }

    /// Stop every other online core.
    ///
    /// Best effort: returns whether all of them went inactive within the
    /// stop timeout.
    pub fn stop_all(&self) -> bool {
        let this = self.platform.current_cpu();
        let others = self.registry.online_mask().without(this);
        if !others.is_empty() {
            if matches!(
                self.system_state(),
                SystemState::Booting | SystemState::Running
            ) {
                log::error!("SMP: stopping secondary CPUs");
            }
            self.broadcast(others, IpiKind::CpuStop);
        }

        let stopped = poll_with_timeout(
            &self.platform,
            self.config.stop_timeout,
            self.config.stop_poll_interval,
            || self.registry.active_mask().without(this).is_empty(),
        );
        if !stopped {
            let left = self.registry.active_mask().without(this);
            log::warn!("SMP: failed to stop secondary CPUs {left}");
        }
        stopped
    }

    /// Dump the registers of every online core.
    ///
    /// Returns `None` if another backtrace session is already running,
    /// otherwise the cores that did not respond in time (empty when all
    /// did).
    pub fn backtrace_all(&self) -> Option<CpuMask> {
        if self.ipi.backtrace_busy.swap(true, Ordering::AcqRel) {
            return None;
        }

        let this = self.platform.current_cpu();
        let others = self.registry.online_mask().without(this);
        self.ipi
            .backtrace_outstanding
            .store(others.bits(), Ordering::Release);

        {
            let _guard = self.ipi.backtrace_lock.lock();
            log::warn!("Backtrace for cpu {this} (current):");
            self.platform.dump_stack(this);
        }

        if !others.is_empty() {
            log::info!("sending IPI to all other CPUs:");
            self.broadcast(others, IpiKind::Backtrace);
        }

        poll_with_timeout(
            &self.platform,
            self.config.backtrace_timeout,
            self.config.poll_interval,
            || self.ipi.backtrace_outstanding.load(Ordering::Acquire) == 0,
        );
        let left = CpuMask::from_bits(
            self.ipi
                .backtrace_outstanding
                .swap(0, Ordering::AcqRel),
        );
        if !left.is_empty() {
            log::warn!("SMP: no backtrace from CPUs {left}");
        }

        self.ipi.backtrace_busy.store(false, Ordering::Release);
        Some(left)
    }

    /// Whether a backtrace session holds the single-flight token.
    #[must_use]
    pub fn backtrace_in_progress(&self) -> bool {
        self.ipi.backtrace_busy.load(Ordering::Acquire)
    }

    /// Ask `cpu` to run its scheduler.
    ///
    /// # Panics
    /// If `cpu` is offline; the scheduler never targets such a core.
    pub fn send_reschedule(&self, cpu: usize) {
        assert!(
            self.registry.is_online(cpu),
            "reschedule IPI to offline CPU{cpu}"
        );
        self.broadcast(CpuMask::of(cpu), IpiKind::Reschedule);
    }

    pub fn send_call_function_mask(&self, targets: CpuMask) {
        self.broadcast(targets, IpiKind::CallFunction);
    }

    pub fn send_call_function_single(&self, cpu: usize) {
        self.broadcast(CpuMask::of(cpu), IpiKind::CallFunction);
    }

    pub fn send_wakeup_mask(&self, targets: CpuMask) {
        self.broadcast(targets, IpiKind::Wakeup);
    }

    /// Kick deferred work on the calling core.
    ///
    /// Does nothing until the cross-call primitive is wired up; the work
    /// then runs from the next tick.
    pub fn irq_work_raise(&self) {
        if self.platform.cross_call_ready() {
            self.broadcast(CpuMask::of(self.platform.current_cpu()), IpiKind::IrqWork);
        }
    }

    pub fn tick_broadcast(&self, targets: CpuMask) {
        self.broadcast(targets, IpiKind::TimerBroadcast);
    }

    /// Messages of `kind` handled by `cpu` so far.
    #[must_use]
    pub fn ipi_count(&self, cpu: usize, kind: IpiKind) -> u32 {
        self.ipi
            .stats
            .get(cpu)
            .map_or(0, |row| row[kind as usize].load(Ordering::Relaxed))
    }

    /// All IPIs handled by `cpu`.
    #[must_use]
    pub fn irq_stat_cpu(&self, cpu: usize) -> u64 {
        IpiKind::ALL
            .iter()
            .map(|&kind| u64::from(self.ipi_count(cpu, kind)))
            .sum()
    }

    /// Render the per-kind, per-online-core statistics table.
    ///
    /// `prec` is the width of the row-name column, as for the rest of the
    /// interrupt listing.
    pub fn show_ipi_list(&self, out: &mut dyn fmt::Write, prec: usize) -> fmt::Result {
        let online = self.registry.online_mask();
        for kind in IpiKind::ALL {
            write!(
                out,
                "{:>width$}{}:{}",
                "IPI",
                kind as u8,
                if prec >= 4 { " " } else { "" },
                width = prec.saturating_sub(1),
            )?;
            for cpu in online.iter() {
                write!(out, "{:>10} ", self.ipi_count(cpu, kind))?;
            }
            writeln!(out, "      {}", kind.label())?;
        }
        Ok(())
    }
}
