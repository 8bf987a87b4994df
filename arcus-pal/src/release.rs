//! Secondary Release Mailboxes
//!
//! Two firmware-defined ways of releasing a core that firmware keeps
//! parked in a polling loop:
//!
//! - **spin-table**: the core spins in WFE on a 64-bit release address and
//!   jumps to whatever non-zero value appears there.
//! - **ACPI parking protocol**: the core polls a per-core [`ParkingMailbox`]
//!   and jumps once its processor id shows up next to an entry point.
//!
//! Only the stores live here. Cache maintenance and the wake-up event are
//! the caller's, because the parked core reads memory with its caches off.

use arcus_common::ParkingMailbox;
use core::ptr;
use core::sync::atomic::{Ordering, fence};

/// Publish `entry` at a spin-table release address.
///
/// # Safety
/// `release_addr` must be a valid, mapped, 8-byte aligned address that
/// firmware designated as this core's release address.
pub unsafe fn write_release_addr(release_addr: *mut u64, entry: u64) {
    // SAFETY: Caller guarantees the address is valid for writes
    unsafe { ptr::write_volatile(release_addr, entry.to_le()) };
}

/// Release a parked core through its mailbox.
///
/// The entry point is written before the processor id, with a barrier in
/// between, so firmware never sees a matching id next to a stale entry.
///
/// # Safety
/// `mailbox` must point to the mapped mailbox page firmware assigned to
/// the core being released.
pub unsafe fn write_mailbox(mailbox: *mut ParkingMailbox, cpu_id: u32, entry: u64) {
    // SAFETY: Caller guarantees the mailbox is mapped
    unsafe {
        ptr::write_volatile(&raw mut (*mailbox).entry_point, entry.to_le());
        fence(Ordering::Release);
        ptr::write_volatile(&raw mut (*mailbox).cpu_id, cpu_id.to_le());
    }
}

/// Read the processor id field of a mailbox.
///
/// Firmware leaves it at `u32::MAX` while the mailbox is free.
///
/// # Safety
/// `mailbox` must point to a mapped mailbox page.
pub unsafe fn read_mailbox_cpu_id(mailbox: *const ParkingMailbox) -> u32 {
    // SAFETY: Caller guarantees the mailbox is mapped
    u32::from_le(unsafe { ptr::read_volatile(&raw const (*mailbox).cpu_id) })
}

/// Acknowledge a mailbox release from the released core.
///
/// Returns the entry point that was found (0 if the mailbox was already
/// clear).
///
/// # Safety
/// `mailbox` must point to the calling core's mapped mailbox page.
pub unsafe fn ack_mailbox(mailbox: *mut ParkingMailbox) -> u64 {
    // SAFETY: Caller guarantees the mailbox is mapped
    unsafe {
        let entry = u64::from_le(ptr::read_volatile(&raw const (*mailbox).entry_point));
        if entry != 0 {
            ptr::write_volatile(&raw mut (*mailbox).entry_point, 0);
        }
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_addr_written() {
        let mut slot = 0u64;
        // SAFETY: slot is a live local
        unsafe { write_release_addr(&mut slot, 0x4008_0000) };
        assert_eq!(u64::from_le(slot), 0x4008_0000);
    }

    #[test]
    fn test_mailbox_release_and_ack() {
        let mut mailbox = ParkingMailbox {
            cpu_id: u32::MAX,
            reserved: 0,
            entry_point: 0,
        };
        // SAFETY: mailbox is a live local
        assert_eq!(unsafe { read_mailbox_cpu_id(&mailbox) }, u32::MAX);
        // SAFETY: mailbox is a live local
        unsafe { write_mailbox(&mut mailbox, 3, 0x8000) };
        assert_eq!(u32::from_le(mailbox.cpu_id), 3);
        assert_eq!(u64::from_le(mailbox.entry_point), 0x8000);

        // SAFETY: mailbox is a live local
        assert_eq!(unsafe { ack_mailbox(&mut mailbox) }, 0x8000);
        assert_eq!(mailbox.entry_point, 0);
        // SAFETY: mailbox is a live local
        assert_eq!(unsafe { ack_mailbox(&mut mailbox) }, 0);
    }
}
