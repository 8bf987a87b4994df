//! Process-wide SMP instance
//!
//! The exception vectors and the secondary entry trampoline have no way
//! to be handed a reference, so the kernel keeps its [`SmpCore`] in a
//! static:
//!
//! ```ignore
//! static SMP: GlobalSmp<Board> = GlobalSmp::new();
//! ```

use crate::config::SmpConfig;
use crate::platform::Platform;
use crate::registry::Registry;
use crate::smp::SmpCore;
use spin::Once;

pub struct GlobalSmp<P: Platform>(Once<SmpCore<P>>);

impl<P: Platform> GlobalSmp<P> {
    pub const fn new() -> Self {
        Self(Once::new())
    }

    /// Install the instance; later calls return the first one unchanged.
    pub fn init(&self, platform: P, config: SmpConfig, registry: Registry) -> &SmpCore<P> {
        self.0.call_once(|| SmpCore::new(platform, config, registry))
    }

    /// The instance, once installed.
    #[must_use]
    pub fn get(&self) -> Option<&SmpCore<P>> {
        self.0.get()
    }

    /// Entry point for a released secondary core.
    ///
    /// # Panics
    /// If no instance was installed; nothing could have released the core.
    pub fn secondary_start(&self) -> ! {
        match self.get() {
            Some(smp) => smp.secondary_start(),
            None => panic!("secondary core entered before SMP init"),
        }
    }

    /// IPI entry from the interrupt controller driver.
    ///
    /// IPIs raised before the instance exists are dropped.
    pub fn handle_ipi(&self, ipinr: u32, regs: &P::Regs) {
        if let Some(smp) = self.get() {
            smp.handle_ipi(ipinr, regs);
        }
    }
}

impl<P: Platform> Default for GlobalSmp<P> {
    fn default() -> Self {
        Self::new()
    }
}
