//! Secondary Boot Handoff Protocol
//!
//! Defines the data a releasing core hands to a secondary core that has
//! not yet enabled its MMU, and the status values the secondary reports
//! back through shared memory.
//!
//! Both sides of this ABI are read by code running with caches off, so
//! every structure here is `#[repr(C)]` and its field offsets are
//! exported as constants for the entry trampoline.

/// Boot progress of a secondary core, as stored in the status word.
///
/// The releasing core writes [`BootStatus::MmuOff`] before release. From
/// then on only the secondary writes the word, and only the releasing core
/// reads it back after its bounded wait expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum BootStatus {
    /// Word not yet armed for an attempt.
    NotStarted = -2,
    /// Armed by the releasing core; the secondary has not reported yet.
    MmuOff = -1,
    /// The secondary registered itself and is about to go online.
    BootSuccess = 0,
    /// The secondary failed validation and asks to be parked.
    KillMe = 1,
    /// The secondary is alive but looping in kernel text.
    StuckInKernel = 2,
    /// The secondary found a mismatch fatal to the whole system.
    PanicKernel = 3,
}

impl BootStatus {
    /// Decode a raw status word.
    ///
    /// Returns `None` for values no core should ever write.
    #[must_use]
    pub const fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            -2 => Some(Self::NotStarted),
            -1 => Some(Self::MmuOff),
            0 => Some(Self::BootSuccess),
            1 => Some(Self::KillMe),
            2 => Some(Self::StuckInKernel),
            3 => Some(Self::PanicKernel),
            _ => None,
        }
    }

    /// Raw value stored in the status word.
    #[must_use]
    pub const fn as_raw(self) -> i64 {
        self as i64
    }
}

/// Data handed to a secondary core for one bring-up attempt.
///
/// Written by the releasing core and cleaned to the point of coherency
/// before release; read by the secondary's entry trampoline with the MMU
/// off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct HandoffBlock {
    /// Idle task (execution context) the secondary adopts
    pub task: u64,
    /// Initial stack pointer (top of the idle task's stack)
    pub stack: u64,
    /// Raw [`BootStatus`] word
    pub status: i64,
}

impl HandoffBlock {
    /// A block with no context and a [`BootStatus::NotStarted`] status.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            task: 0,
            stack: 0,
            status: BootStatus::NotStarted.as_raw(),
        }
    }
}

impl Default for HandoffBlock {
    fn default() -> Self {
        Self::empty()
    }
}

/// ACPI multiprocessor parking-protocol mailbox (one 4 KiB page per core).
///
/// The OS writes `entry_point` and then `cpu_id`; firmware, polling the
/// mailbox, jumps to the entry point when `cpu_id` matches its own
/// processor id. The released core clears `entry_point` to acknowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct ParkingMailbox {
    /// GIC CPU interface number of the core to release
    pub cpu_id: u32,
    pub reserved: u32,
    /// Physical address the released core jumps to
    pub entry_point: u64,
}

/// Size of the mailbox page.
pub const PARKING_MAILBOX_SIZE: usize = 4096;

// -- Field offsets for assembly code (secondary entry trampoline)
// These must be kept in sync with the struct layouts above.

/// Offset of `task` in HandoffBlock
pub const HANDOFF_TASK_OFFSET: usize = 0;

/// Offset of `stack` in HandoffBlock
pub const HANDOFF_STACK_OFFSET: usize = 8;

/// Offset of `status` in HandoffBlock
pub const HANDOFF_STATUS_OFFSET: usize = 16;

/// Offset of `cpu_id` in ParkingMailbox
pub const MAILBOX_CPU_ID_OFFSET: usize = 0;

/// Offset of `entry_point` in ParkingMailbox
pub const MAILBOX_ENTRY_POINT_OFFSET: usize = 8;

// Compile-time verification of offsets
const _: () = {
    assert!(
        core::mem::offset_of!(HandoffBlock, task) == HANDOFF_TASK_OFFSET,
        "HANDOFF_TASK_OFFSET mismatch"
    );
    assert!(
        core::mem::offset_of!(HandoffBlock, stack) == HANDOFF_STACK_OFFSET,
        "HANDOFF_STACK_OFFSET mismatch"
    );
    assert!(
        core::mem::offset_of!(HandoffBlock, status) == HANDOFF_STATUS_OFFSET,
        "HANDOFF_STATUS_OFFSET mismatch"
    );
    assert!(
        core::mem::offset_of!(ParkingMailbox, cpu_id) == MAILBOX_CPU_ID_OFFSET,
        "MAILBOX_CPU_ID_OFFSET mismatch"
    );
    assert!(
        core::mem::offset_of!(ParkingMailbox, entry_point) == MAILBOX_ENTRY_POINT_OFFSET,
        "MAILBOX_ENTRY_POINT_OFFSET mismatch"
    );
};
