//! Host-side doubles for the hardware, firmware and kernel services the
//! SMP core is built on.
//!
//! Each test thread plays one core; [`set_current_cpu`] says which.
//! Cores that would never return (idle loop, park, successful `die`)
//! park the thread forever.

extern crate std;

use crate::enable_method::BootServices;
use crate::error::{OpsError, OpsResult, SecondaryError};
use crate::ipi::IpiKind;
use crate::ops::{BringUpOps, OpsFeatures};
use crate::platform::{IdleContext, Platform};
use crate::registry::Registry;
use crate::config::SmpConfig;
use crate::smp::SmpCore;
use crate::wait::Clock;
use alloc::boxed::Box;
use arcus_common::{CpuMask, MAX_CPUS};
use arcus_pal::PsciConduit;
use arcus_pal::psci::{AFFINITY_INFO_64, CPU_OFF, CPU_ON_64, PSCI_VERSION};
use core::cell::Cell;
use core::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, AtomicU64, AtomicUsize, Ordering};
use core::time::Duration;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use std::vec::Vec;

std::thread_local! {
    static CURRENT_CPU: Cell<usize> = const { Cell::new(0) };
}

/// Make the calling thread act as logical core `cpu`.
pub(crate) fn set_current_cpu(cpu: usize) {
    CURRENT_CPU.with(|current| current.set(cpu));
}

fn current_cpu() -> usize {
    CURRENT_CPU.with(Cell::get)
}

fn park_forever() -> ! {
    loop {
        std::thread::park();
    }
}

/// Virtual time that only moves when someone delays.
#[derive(Debug, Default)]
pub(crate) struct FakeClock {
    nanos: AtomicU64,
}

impl FakeClock {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Duration {
        FakeClock::now(self)
    }

    fn delay(&self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.fetch_add(nanos, Ordering::SeqCst);
    }
}

/// Platform callbacks recorded per core, in call order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Hook {
    SetPerCpuOffset,
    EnterKernelMm,
    UninstallIdmap,
    CheckCapabilities,
    StoreCpuInfo,
    NotifyStarting,
    StoreTopology,
    IrqEnable,
    IrqDisable,
    IdleLoop,
    Park,
    FlushCache,
    MigrateIrqs,
    IdleTaskExit,
    SchedulerIpi,
    CallFunction,
    TickBroadcast,
    IrqWork,
    ShowRegs,
    DumpStack,
}

/// In-memory machine.
///
/// Runs on virtual time by default; [`FakePlatform::realtime`] switches to
/// the host clock for tests where several threads play cores.
pub(crate) struct FakePlatform {
    start: Option<Instant>,
    clock: FakeClock,
    el: [AtomicU8; MAX_CPUS],
    cross_call_ready: AtomicBool,
    capability_failures: Mutex<HashMap<usize, SecondaryError>>,
    starting_failures: Mutex<HashMap<usize, SecondaryError>>,
    cross_calls: Mutex<Vec<(CpuMask, IpiKind)>>,
    hooks: Mutex<Vec<(usize, Hook)>>,
    cleaned: Mutex<Vec<(usize, usize)>>,
}

impl FakePlatform {
    pub(crate) fn new() -> Self {
        Self {
            start: None,
            clock: FakeClock::new(),
            el: [const { AtomicU8::new(1) }; MAX_CPUS],
            cross_call_ready: AtomicBool::new(true),
            capability_failures: Mutex::new(HashMap::new()),
            starting_failures: Mutex::new(HashMap::new()),
            cross_calls: Mutex::new(Vec::new()),
            hooks: Mutex::new(Vec::new()),
            cleaned: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn realtime() -> Self {
        Self {
            start: Some(Instant::now()),
            ..Self::new()
        }
    }

    pub(crate) fn is_realtime(&self) -> bool {
        self.start.is_some()
    }

    pub(crate) fn now(&self) -> Duration {
        match self.start {
            Some(start) => start.elapsed(),
            None => self.clock.now(),
        }
    }

    /// Exception level `cpu` reports.
    pub(crate) fn set_el(&self, cpu: usize, el: u8) {
        self.el[cpu].store(el, Ordering::SeqCst);
    }

    pub(crate) fn set_cross_call_ready(&self, ready: bool) {
        self.cross_call_ready.store(ready, Ordering::SeqCst);
    }

    pub(crate) fn fail_capabilities(&self, cpu: usize, err: SecondaryError) {
        self.capability_failures.lock().unwrap().insert(cpu, err);
    }

    pub(crate) fn fail_starting(&self, cpu: usize, err: SecondaryError) {
        self.starting_failures.lock().unwrap().insert(cpu, err);
    }

    pub(crate) fn cross_calls(&self) -> Vec<(CpuMask, IpiKind)> {
        self.cross_calls.lock().unwrap().clone()
    }

    /// Callbacks made on `cpu`, oldest first.
    pub(crate) fn hooks(&self, cpu: usize) -> Vec<Hook> {
        self.hooks
            .lock()
            .unwrap()
            .iter()
            .filter(|(on, _)| *on == cpu)
            .map(|&(_, hook)| hook)
            .collect()
    }

    pub(crate) fn cleaned(&self) -> Vec<(usize, usize)> {
        self.cleaned.lock().unwrap().clone()
    }

    fn record(&self, hook: Hook) {
        self.hooks.lock().unwrap().push((current_cpu(), hook));
    }
}

impl Clock for FakePlatform {
    fn now(&self) -> Duration {
        FakePlatform::now(self)
    }

    fn delay(&self, duration: Duration) {
        if self.is_realtime() {
            std::thread::sleep(duration);
        } else {
            self.clock.delay(duration);
        }
    }
}

impl Platform for FakePlatform {
    /// Stand-in for a trap frame: the interrupted PC.
    type Regs = u64;

    fn current_cpu(&self) -> usize {
        current_cpu()
    }

    fn current_el(&self) -> u8 {
        self.el[current_cpu()].load(Ordering::SeqCst)
    }

    fn cross_call(&self, targets: CpuMask, kind: IpiKind) {
        self.cross_calls.lock().unwrap().push((targets, kind));
    }

    fn cross_call_ready(&self) -> bool {
        self.cross_call_ready.load(Ordering::SeqCst)
    }

    fn local_irq_disable(&self) {
        self.record(Hook::IrqDisable);
    }

    fn local_irq_enable(&self) {
        self.record(Hook::IrqEnable);
    }

    fn park(&self) -> ! {
        self.record(Hook::Park);
        park_forever()
    }

    fn clean_dcache_range(&self, addr: usize, len: usize) {
        self.cleaned.lock().unwrap().push((addr, len));
    }

    fn flush_cache_all(&self) {
        self.record(Hook::FlushCache);
    }

    fn idle_context(&self, cpu: usize) -> IdleContext {
        IdleContext {
            task: 0x1000 * (cpu as u64 + 1),
            stack_top: 0x10_0000 + 0x4000 * (cpu as u64 + 1),
        }
    }

    fn set_per_cpu_offset(&self, _cpu: usize) {
        self.record(Hook::SetPerCpuOffset);
    }

    fn enter_kernel_mm(&self, _cpu: usize) {
        self.record(Hook::EnterKernelMm);
    }

    fn uninstall_idmap(&self, _cpu: usize) {
        self.record(Hook::UninstallIdmap);
    }

    fn check_local_capabilities(&self, cpu: usize) -> Result<(), SecondaryError> {
        self.record(Hook::CheckCapabilities);
        match self.capability_failures.lock().unwrap().get(&cpu) {
            Some(&err) => Err(err),
            None => Ok(()),
        }
    }

    fn store_cpu_info(&self, _cpu: usize) {
        self.record(Hook::StoreCpuInfo);
    }

    fn notify_cpu_starting(&self, cpu: usize) -> Result<(), SecondaryError> {
        self.record(Hook::NotifyStarting);
        match self.starting_failures.lock().unwrap().get(&cpu) {
            Some(&err) => Err(err),
            None => Ok(()),
        }
    }

    fn store_topology(&self, _cpu: usize) {
        self.record(Hook::StoreTopology);
    }

    fn idle_loop(&self, _cpu: usize) -> ! {
        self.record(Hook::IdleLoop);
        park_forever()
    }

    fn migrate_irqs_away(&self, _cpu: usize) {
        self.record(Hook::MigrateIrqs);
    }

    fn idle_task_exit(&self, _cpu: usize) {
        self.record(Hook::IdleTaskExit);
    }

    fn scheduler_ipi(&self) {
        self.record(Hook::SchedulerIpi);
    }

    fn call_function_interrupt(&self) {
        self.record(Hook::CallFunction);
    }

    fn tick_broadcast_receive(&self) {
        self.record(Hook::TickBroadcast);
    }

    fn irq_work_run(&self) {
        self.record(Hook::IrqWork);
    }

    fn show_regs(&self, _cpu: usize, _regs: &u64) {
        self.record(Hook::ShowRegs);
    }

    fn dump_stack(&self, _cpu: usize) {
        self.record(Hook::DumpStack);
    }
}

/// `cpus` cores with hardware ids `0..cpus`, all possible, driven by
/// feature-less [`FakeOps`]. Leaked so core threads can borrow it.
pub(crate) fn fake_core(
    cpus: usize,
    platform: FakePlatform,
    config: SmpConfig,
) -> &'static SmpCore<FakePlatform> {
    let mut registry = Registry::new(cpus);
    for cpu in 0..cpus {
        registry.assign(cpu, cpu as u64).unwrap();
        registry.set_ops(cpu, Box::new(FakeOps::new()));
        registry.mark_possible(cpu, true);
    }
    Box::leak(Box::new(SmpCore::new(platform, config, registry)))
}

type BootHook = Arc<dyn Fn(usize) + Send + Sync>;

/// Scripted results and call counts shared between a test and the
/// [`FakeOps`] it handed to the registry.
pub(crate) struct FakeOpsControl {
    init: Mutex<OpsResult<()>>,
    prepare: Mutex<OpsResult<()>>,
    boot: Mutex<OpsResult<()>>,
    disable: Mutex<OpsResult<()>>,
    kill: Mutex<OpsResult<()>>,
    die: Mutex<Option<OpsError>>,
    on_boot: Mutex<Option<BootHook>>,
    inits: AtomicUsize,
    boots: AtomicUsize,
    postboots: AtomicUsize,
    dies: AtomicUsize,
    kills: AtomicUsize,
}

impl Default for FakeOpsControl {
    fn default() -> Self {
        Self {
            init: Mutex::new(Ok(())),
            prepare: Mutex::new(Ok(())),
            boot: Mutex::new(Ok(())),
            disable: Mutex::new(Ok(())),
            kill: Mutex::new(Ok(())),
            die: Mutex::new(None),
            on_boot: Mutex::new(None),
            inits: AtomicUsize::new(0),
            boots: AtomicUsize::new(0),
            postboots: AtomicUsize::new(0),
            dies: AtomicUsize::new(0),
            kills: AtomicUsize::new(0),
        }
    }
}

impl FakeOpsControl {
    pub(crate) fn init_result(&self, result: OpsResult<()>) {
        *self.init.lock().unwrap() = result;
    }

    pub(crate) fn prepare_result(&self, result: OpsResult<()>) {
        *self.prepare.lock().unwrap() = result;
    }

    pub(crate) fn boot_result(&self, result: OpsResult<()>) {
        *self.boot.lock().unwrap() = result;
    }

    pub(crate) fn disable_result(&self, result: OpsResult<()>) {
        *self.disable.lock().unwrap() = result;
    }

    pub(crate) fn kill_result(&self, result: OpsResult<()>) {
        *self.kill.lock().unwrap() = result;
    }

    /// `Some` makes `die` return that error instead of parking.
    pub(crate) fn die_result(&self, result: Option<OpsError>) {
        *self.die.lock().unwrap() = result;
    }

    /// Run `hook` after every successful `boot`, standing in for the
    /// released hardware.
    pub(crate) fn on_boot(&self, hook: impl Fn(usize) + Send + Sync + 'static) {
        *self.on_boot.lock().unwrap() = Some(Arc::new(hook));
    }

    pub(crate) fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    pub(crate) fn boots(&self) -> usize {
        self.boots.load(Ordering::SeqCst)
    }

    pub(crate) fn postboots(&self) -> usize {
        self.postboots.load(Ordering::SeqCst)
    }

    pub(crate) fn dies(&self) -> usize {
        self.dies.load(Ordering::SeqCst)
    }

    pub(crate) fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }
}

/// Scriptable bring-up strategy.
pub(crate) struct FakeOps {
    features: OpsFeatures,
    control: Arc<FakeOpsControl>,
}

impl FakeOps {
    pub(crate) fn new() -> Self {
        Self {
            features: OpsFeatures::empty(),
            control: Arc::default(),
        }
    }

    pub(crate) fn with_features(mut self, features: OpsFeatures) -> Self {
        self.features = features;
        self
    }

    pub(crate) fn control(&self) -> Arc<FakeOpsControl> {
        Arc::clone(&self.control)
    }
}

impl BringUpOps for FakeOps {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn features(&self) -> OpsFeatures {
        self.features
    }

    fn init(&self, _cpu: usize) -> OpsResult<()> {
        self.control.inits.fetch_add(1, Ordering::SeqCst);
        *self.control.init.lock().unwrap()
    }

    fn prepare(&self, _cpu: usize) -> OpsResult<()> {
        *self.control.prepare.lock().unwrap()
    }

    fn boot(&self, cpu: usize) -> OpsResult<()> {
        self.control.boots.fetch_add(1, Ordering::SeqCst);
        let result = *self.control.boot.lock().unwrap();
        if result.is_ok() {
            let hook = self.control.on_boot.lock().unwrap().clone();
            if let Some(hook) = hook {
                hook(cpu);
            }
        }
        result
    }

    fn postboot(&self) {
        self.control.postboots.fetch_add(1, Ordering::SeqCst);
    }

    fn disable(&self, _cpu: usize) -> OpsResult<()> {
        *self.control.disable.lock().unwrap()
    }

    fn die(&self, _cpu: usize) -> OpsError {
        self.control.dies.fetch_add(1, Ordering::SeqCst);
        let result = *self.control.die.lock().unwrap();
        match result {
            Some(err) => err,
            None => park_forever(),
        }
    }

    fn kill(&self, _cpu: usize) -> OpsResult<()> {
        self.control.kills.fetch_add(1, Ordering::SeqCst);
        *self.control.kill.lock().unwrap()
    }
}

struct FirmwareState {
    version: AtomicI64,
    cpu_on: AtomicI64,
    cpu_off: AtomicI64,
    affinity: AtomicI64,
    calls: Mutex<Vec<(u32, u64, u64)>>,
}

/// PSCI firmware answering from fixed values; clones share state.
#[derive(Clone)]
pub(crate) struct FakeFirmware(Arc<FirmwareState>);

impl FakeFirmware {
    /// PSCI 1.1 that turns cores on and reports them off.
    pub(crate) fn new() -> Self {
        Self(Arc::new(FirmwareState {
            version: AtomicI64::new(0x0001_0001),
            cpu_on: AtomicI64::new(0),
            cpu_off: AtomicI64::new(-3),
            affinity: AtomicI64::new(1),
            calls: Mutex::new(Vec::new()),
        }))
    }

    pub(crate) fn set_version(&self, raw: i64) {
        self.0.version.store(raw, Ordering::SeqCst);
    }

    pub(crate) fn set_cpu_on_result(&self, raw: i64) {
        self.0.cpu_on.store(raw, Ordering::SeqCst);
    }

    pub(crate) fn set_cpu_off_result(&self, raw: i64) {
        self.0.cpu_off.store(raw, Ordering::SeqCst);
    }

    pub(crate) fn set_affinity(&self, raw: i64) {
        self.0.affinity.store(raw, Ordering::SeqCst);
    }

    /// `(function, arg0, arg1)` of every call so far.
    pub(crate) fn calls(&self) -> Vec<(u32, u64, u64)> {
        self.0.calls.lock().unwrap().clone()
    }
}

impl PsciConduit for FakeFirmware {
    unsafe fn call(&self, func: u32, arg0: u64, arg1: u64, _arg2: u64) -> i64 {
        self.0.calls.lock().unwrap().push((func, arg0, arg1));
        let answer = match func {
            PSCI_VERSION => &self.0.version,
            CPU_ON_64 => &self.0.cpu_on,
            CPU_OFF => &self.0.cpu_off,
            AFFINITY_INFO_64 => &self.0.affinity,
            _ => return -1,
        };
        answer.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct ServicesState {
    delays: AtomicUsize,
    events: AtomicUsize,
    cleaned: Mutex<Vec<(usize, usize)>>,
    wakeups: Mutex<Vec<(usize, u64)>>,
}

/// Identity-mapped boot services that record what they were asked to do.
#[derive(Clone, Default)]
pub(crate) struct FakeServices(Arc<ServicesState>);

impl FakeServices {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn delays(&self) -> usize {
        self.0.delays.load(Ordering::SeqCst)
    }

    pub(crate) fn events(&self) -> usize {
        self.0.events.load(Ordering::SeqCst)
    }

    pub(crate) fn cleaned(&self) -> Vec<(usize, usize)> {
        self.0.cleaned.lock().unwrap().clone()
    }

    pub(crate) fn wakeups(&self) -> Vec<(usize, u64)> {
        self.0.wakeups.lock().unwrap().clone()
    }
}

impl BootServices for FakeServices {
    fn phys_to_virt(&self, phys: u64) -> usize {
        phys as usize
    }

    fn clean_dcache_range(&self, addr: usize, len: usize) {
        self.0.cleaned.lock().unwrap().push((addr, len));
    }

    fn send_event(&self) {
        self.0.events.fetch_add(1, Ordering::SeqCst);
    }

    fn send_wakeup(&self, cpu: usize, hwid: u64) {
        self.0.wakeups.lock().unwrap().push((cpu, hwid));
    }

    fn delay(&self, _duration: Duration) {
        self.0.delays.fetch_add(1, Ordering::SeqCst);
    }
}
