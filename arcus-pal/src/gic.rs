//! GICv3 Software Generated Interrupts
//!
//! Inter-processor interrupts are SGIs raised by writing `ICC_SGI1R_EL1`:
//!
//! ```text
//! Aff3[55:48] | RS[47:44] | IRM[40] | Aff2[39:32] | INTID[27:24] | Aff1[23:16] | TargetList[15:0]
//! ```
//!
//! One write reaches every core of a cluster whose Aff0 falls in the same
//! 16-wide range, so consecutive targets sharing Aff3/Aff2/Aff1 and the
//! range selector are folded into a single write.

use arcus_common::hwid;

/// Affinity bits of a target that must match for two targets to share a write.
const fn cluster_key(mpidr: u64) -> u64 {
    (mpidr & hwid::MPIDR_HWID_BITMASK) & !0xF
}

/// Build an `ICC_SGI1R_EL1` value for `sgi` targeting `target_list` in the
/// cluster of `mpidr`.
#[must_use]
pub const fn sgi1r_value(sgi: u8, mpidr: u64, target_list: u16) -> u64 {
    let aff3 = hwid::affinity(mpidr, 3) as u64;
    let aff2 = hwid::affinity(mpidr, 2) as u64;
    let aff1 = hwid::affinity(mpidr, 1) as u64;
    let rs = (hwid::affinity(mpidr, 0) >> 4) as u64;

    (aff3 << 48)
        | (rs << 44)
        | (aff2 << 32)
        | (((sgi & 0xF) as u64) << 24)
        | (aff1 << 16)
        | target_list as u64
}

/// Compute the register writes needed to send `sgi` to every core in
/// `targets` (hardware identifiers), calling `emit` once per write.
pub fn for_each_sgi1r(sgi: u8, targets: impl IntoIterator<Item = u64>, mut emit: impl FnMut(u64)) {
    let mut pending: Option<(u64, u16)> = None;

    for mpidr in targets {
        let bit = 1u16 << (hwid::affinity(mpidr, 0) & 0xF);
        match pending {
            Some((base, list)) if cluster_key(base) == cluster_key(mpidr) => {
                pending = Some((base, list | bit));
            }
            Some((base, list)) => {
                emit(sgi1r_value(sgi, base, list));
                pending = Some((mpidr, bit));
            }
            None => pending = Some((mpidr, bit)),
        }
    }

    if let Some((base, list)) = pending {
        emit(sgi1r_value(sgi, base, list));
    }
}

/// Send `sgi` to every core in `targets`.
///
/// Prior stores are made visible to the targets before the SGI is raised.
#[cfg(target_arch = "aarch64")]
pub fn raise_sgi(sgi: u8, targets: impl IntoIterator<Item = u64>) {
    arcus_arch::cpu::dsb_ishst();

    for_each_sgi1r(sgi, targets, |value| {
        // SAFETY: Writing to ICC_SGI1R_EL1 sends an SGI
        unsafe {
            core::arch::asm!(
                "msr ICC_SGI1R_EL1, {0}",
                in(reg) value,
                options(nomem, nostack)
            );
        }
    });

    arcus_arch::cpu::isb();
}
