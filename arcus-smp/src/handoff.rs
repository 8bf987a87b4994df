//! Shared handoff memory
//!
//! The [`HandoffBlock`] and the early status word are the only memory a
//! released core touches before its MMU is on, so they are read and
//! written by two cores with different cacheability views. Every access
//! goes through this module.
//!
//! Ownership alternates by phase: the orchestrator owns the task and stack
//! fields from `publish` until the attempt concludes and it clears them;
//! the released core owns the status words from release until it reports.
//! The status words are accessed atomically because the orchestrator may
//! read one while a slow core is still writing it after a timeout.

use arcus_common::{BootStatus, HandoffBlock};
use core::cell::UnsafeCell;
use core::mem::size_of;
use core::ptr;
use core::sync::atomic::{AtomicI64, Ordering, fence};

/// Keeps each shared word on its own cache line so cleaning one never
/// writes back a stale copy of the other.
#[repr(C, align(64))]
struct CacheLine<T>(T);

/// Handoff block plus the status word written before the MMU is enabled.
pub struct HandoffArea {
    block: CacheLine<UnsafeCell<HandoffBlock>>,
    early_status: CacheLine<AtomicI64>,
}

// SAFETY: the task and stack fields have a single writer per phase (see
// the module docs) and the status words are only accessed atomically.
unsafe impl Sync for HandoffArea {}

impl HandoffArea {
    pub const fn new() -> Self {
        Self {
            block: CacheLine(UnsafeCell::new(HandoffBlock::empty())),
            early_status: CacheLine(AtomicI64::new(BootStatus::NotStarted.as_raw())),
        }
    }

    fn status_word(&self) -> &AtomicI64 {
        // SAFETY: the block lives as long as `self`, `status` is an aligned
        // i64 and is never accessed non-atomically.
        unsafe { AtomicI64::from_ptr(&raw mut (*self.block.0.get()).status) }
    }

    /// Arm the area for one attempt.
    ///
    /// Stores the idle context, sets the status to [`BootStatus::MmuOff`],
    /// resets the early status and hands both lines to `clean` so they are
    /// visible to a core running with caches off.
    pub fn publish(&self, task: u64, stack: u64, mut clean: impl FnMut(usize, usize)) {
        let block = self.block.0.get();
        // SAFETY: the orchestrator owns task/stack until the attempt ends.
        unsafe {
            ptr::write_volatile(&raw mut (*block).task, task);
            ptr::write_volatile(&raw mut (*block).stack, stack);
        }
        self.status_word().store(BootStatus::MmuOff.as_raw(), Ordering::SeqCst);
        self.early_status
            .0
            .store(BootStatus::NotStarted.as_raw(), Ordering::SeqCst);
        fence(Ordering::SeqCst);
        clean(self.block_addr(), size_of::<HandoffBlock>());
        clean(self.early_status_addr(), size_of::<i64>());
    }

    /// Forget the idle context once the attempt has concluded.
    pub fn clear_context(&self) {
        let block = self.block.0.get();
        // SAFETY: the released core has either consumed the context or
        // will never run far enough to read it.
        unsafe {
            ptr::write_volatile(&raw mut (*block).task, 0);
            ptr::write_volatile(&raw mut (*block).stack, 0);
        }
    }

    /// Raw value of the status word.
    #[must_use]
    pub fn status(&self) -> i64 {
        self.status_word().load(Ordering::SeqCst)
    }

    /// Report progress from the released core.
    pub fn set_status(&self, status: BootStatus) {
        self.status_word().store(status.as_raw(), Ordering::SeqCst);
        fence(Ordering::SeqCst);
    }

    /// Raw value of the early status word.
    #[must_use]
    pub fn early_status(&self) -> i64 {
        self.early_status.0.load(Ordering::SeqCst)
    }

    /// Report a failure from before the MMU came on.
    ///
    /// The trampoline normally stores this word itself, by address.
    pub fn set_early_status(&self, raw: i64) {
        self.early_status.0.store(raw, Ordering::SeqCst);
    }

    /// Copy of the block as it is now.
    #[must_use]
    pub fn snapshot(&self) -> HandoffBlock {
        let block = self.block.0.get();
        // SAFETY: volatile reads of plain integers; status goes through
        // the atomic view.
        unsafe {
            HandoffBlock {
                task: ptr::read_volatile(&raw const (*block).task),
                stack: ptr::read_volatile(&raw const (*block).stack),
                status: self.status(),
            }
        }
    }

    /// Address of the block, for the entry trampoline.
    #[must_use]
    pub fn block_addr(&self) -> usize {
        self.block.0.get() as usize
    }

    /// Address of the early status word, for the entry trampoline.
    #[must_use]
    pub fn early_status_addr(&self) -> usize {
        self.early_status.0.as_ptr() as usize
    }
}

impl Default for HandoffArea {
    fn default() -> Self {
        Self::new()
    }
}
