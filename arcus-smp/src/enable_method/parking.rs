//! ACPI parking-protocol enable method
//!
//! Firmware keeps each secondary polling its own mailbox page. The OS
//! writes the entry point, then the core's GIC CPU interface number, and
//! kicks the core with a wake-up IPI. The released core clears the entry
//! point from its `postboot` hook to acknowledge.

use super::BootServices;
use crate::error::{OpsError, OpsResult};
use crate::ops::{BringUpOps, OpsFeatures};
use arcus_common::ParkingMailbox;
use arcus_pal::release;

pub struct ParkingProtocol<S> {
    services: S,
    hwid: u64,
    mailbox: Option<u64>,
    cpu_interface: u32,
    entry: u64,
}

impl<S: BootServices> ParkingProtocol<S> {
    /// # Safety
    /// `services.phys_to_virt(mailbox)` must map the core's whole mailbox page.
    pub unsafe fn new(
        services: S,
        hwid: u64,
        mailbox: Option<u64>,
        cpu_interface: u32,
        entry: u64,
    ) -> Self {
        Self {
            services,
            hwid,
            mailbox,
            cpu_interface,
            entry,
        }
    }

    fn mailbox_ptr(&self) -> Option<*mut ParkingMailbox> {
        self.mailbox
            .map(|phys| self.services.phys_to_virt(phys) as *mut ParkingMailbox)
    }
}

impl<S: BootServices> BringUpOps for ParkingProtocol<S> {
    fn name(&self) -> &'static str {
        "parking-protocol"
    }

    fn features(&self) -> OpsFeatures {
        OpsFeatures::POSTBOOT
    }

    fn init(&self, cpu: usize) -> OpsResult<()> {
        if self.mailbox.is_none() {
            log::error!("CPU{cpu}: no parking protocol mailbox");
            return Err(OpsError::NoMailbox);
        }
        Ok(())
    }

    fn prepare(&self, _cpu: usize) -> OpsResult<()> {
        self.mailbox.map(|_| ()).ok_or(OpsError::NoMailbox)
    }

    fn boot(&self, cpu: usize) -> OpsResult<()> {
        let mailbox = self.mailbox_ptr().ok_or(OpsError::NoMailbox)?;

        // SAFETY: ParkingProtocol::new's contract
        let owner = unsafe { release::read_mailbox_cpu_id(mailbox) };
        if owner != u32::MAX {
            log::error!("CPU{cpu}: mailbox not free (cpu_id {owner:#x})");
            return Err(OpsError::Denied);
        }

        // SAFETY: ParkingProtocol::new's contract
        unsafe { release::write_mailbox(mailbox, self.cpu_interface, self.entry) };
        self.services
            .clean_dcache_range(mailbox as usize, core::mem::size_of::<ParkingMailbox>());
        self.services.send_wakeup(cpu, self.hwid);
        Ok(())
    }

    fn postboot(&self) {
        if let Some(mailbox) = self.mailbox_ptr() {
            // SAFETY: ParkingProtocol::new's contract; runs on the released core
            unsafe { release::ack_mailbox(mailbox) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeServices;
    use alloc::boxed::Box;

    fn leaked_mailbox(cpu_id: u32) -> u64 {
        let mailbox = Box::leak(Box::new(ParkingMailbox {
            cpu_id,
            reserved: 0,
            entry_point: 0,
        }));
        mailbox as *mut ParkingMailbox as u64
    }

    #[test]
    fn test_boot_then_postboot_ack() {
        let addr = leaked_mailbox(u32::MAX);
        let services = FakeServices::new();
        // SAFETY: FakeServices maps one-to-one; the mailbox is leaked
        let ops = unsafe { ParkingProtocol::new(services.clone(), 0x2, Some(addr), 2, 0x8000) };

        ops.init(2).unwrap();
        ops.boot(2).unwrap();
        // SAFETY: leaked mailbox
        let mailbox = unsafe { &*(addr as *const ParkingMailbox) };
        assert_eq!(u32::from_le(mailbox.cpu_id), 2);
        assert_eq!(u64::from_le(mailbox.entry_point), 0x8000);
        assert_eq!(services.wakeups(), [(2, 0x2)]);

        ops.postboot();
        // SAFETY: leaked mailbox
        let entry = unsafe { core::ptr::read_volatile(&raw const (*(addr as *const ParkingMailbox)).entry_point) };
        assert_eq!(entry, 0);
    }

    #[test]
    fn test_busy_mailbox_refused() {
        let addr = leaked_mailbox(5);
        let services = FakeServices::new();
        // SAFETY: FakeServices maps one-to-one; the mailbox is leaked
        let ops = unsafe { ParkingProtocol::new(services.clone(), 0x2, Some(addr), 2, 0x8000) };
        assert_eq!(ops.boot(2), Err(OpsError::Denied));
        assert!(services.wakeups().is_empty());
    }

    #[test]
    fn test_missing_mailbox() {
        // SAFETY: never booted
        let ops = unsafe { ParkingProtocol::new(FakeServices::new(), 0x2, None, 2, 0) };
        assert_eq!(ops.init(2), Err(OpsError::NoMailbox));
        assert_eq!(ops.boot(2), Err(OpsError::NoMailbox));
    }
}
