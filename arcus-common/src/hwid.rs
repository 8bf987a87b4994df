//! MPIDR Hardware Identifiers
//!
//! A core's hardware identifier is the affinity part of its `MPIDR_EL1`
//! value (Aff3:Aff2:Aff1:Aff0). Firmware tables and the device tree report
//! it verbatim; anything outside the affinity fields must be zero.

/// Affinity bits of MPIDR_EL1 (Aff3 at [39:32], Aff2..Aff0 at [23:0]).
pub const MPIDR_HWID_BITMASK: u64 = 0xFF_00FF_FFFF;

/// Sentinel for an unassigned logical core.
pub const INVALID_HWID: u64 = u64::MAX;

/// Check whether a raw identifier can name a real core.
///
/// Rejects the sentinel and any value with bits set outside the
/// affinity fields.
#[must_use]
pub const fn is_valid(hwid: u64) -> bool {
    hwid != INVALID_HWID && hwid & !MPIDR_HWID_BITMASK == 0
}

/// Extract affinity level `level` (0..=3) from an MPIDR value.
#[must_use]
pub const fn affinity(mpidr: u64, level: u32) -> u8 {
    let shift = match level {
        0 => 0,
        1 => 8,
        2 => 16,
        _ => 32,
    };
    ((mpidr >> shift) & 0xFF) as u8
}

/// Strip the non-affinity bits (MT, U, RES1) from a raw MPIDR_EL1 read.
#[must_use]
pub const fn from_mpidr(mpidr: u64) -> u64 {
    mpidr & MPIDR_HWID_BITMASK
}
