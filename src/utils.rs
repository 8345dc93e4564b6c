//! Utility functions.

/// Aligns an address or size up to the next multiple of `align`.
/// `align` must be a power of two.
pub fn align_up(addr: u32, align: u32) -> u32 {
    if align == 0 {
        return addr;
    }
    debug_assert!(align.is_power_of_two());
    addr.wrapping_add(align - 1) & !(align - 1)
}

/// Returns the size or offset `>= addr` that sits on a 32-bit boundary.
///
/// Every record and packet in a DOFF stream starts on such a boundary.
pub fn doff_align(addr: u32) -> u32 {
    align_up(addr, 4)
}
