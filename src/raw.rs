//! Byte-level helpers shared by the buddy and first-fit cores.
//!
//! Both cores store their bookkeeping *inside* the caller-supplied region as
//! 32-bit pseudo-pointers (byte offsets from the region's base address, see
//! the crate-level docs). Nothing guarantees that a given pseudo-pointer
//! lands on a 4-byte boundary of the real address space (the region's own
//! base address might not be 4-aligned), so every multi-byte field is read
//! and written through the unaligned primitives rather than through a typed
//! reference.

use core::ptr;

/// Sentinel pseudo-pointer meaning "no block" (`NULL` for pseudo-pointers).
pub(crate) const NOBLOCK: u32 = 0xFFFF_FFFF;

/// Read a little-endian `u32` at byte offset `offset` from `base`.
///
/// # Safety
/// `base..base+offset+4` must be valid, initialized, readable memory.
#[inline]
pub(crate) unsafe fn read_u32(base: *mut u8, offset: u32) -> u32 {
    ptr::read_unaligned(base.add(offset as usize).cast::<u32>())
}

/// Write a little-endian `u32` at byte offset `offset` from `base`.
///
/// # Safety
/// `base..base+offset+4` must be valid, writable memory.
#[inline]
pub(crate) unsafe fn write_u32(base: *mut u8, offset: u32, value: u32) {
    ptr::write_unaligned(base.add(offset as usize).cast::<u32>(), value);
}

/// Read a single byte at `offset` from `base`.
///
/// # Safety
/// `base + offset` must be valid, initialized, readable memory.
#[inline]
pub(crate) unsafe fn read_u8(base: *mut u8, offset: u32) -> u8 {
    ptr::read(base.add(offset as usize))
}

/// Write a single byte at `offset` from `base`.
///
/// # Safety
/// `base + offset` must be valid, writable memory.
#[inline]
pub(crate) unsafe fn write_u8(base: *mut u8, offset: u32, value: u8) {
    ptr::write(base.add(offset as usize), value);
}

/// Floor of base-2 logarithm, `31 - clz(n)`, mirroring the original
/// `buddy_log2`. `n` must be non-zero.
#[inline]
pub(crate) const fn log2_floor(n: u32) -> u8 {
    (31 - n.leading_zeros()) as u8
}

/// Round `n` up to the next power of two (`n` itself if already one).
/// `0` rounds up to `1`, matching the original `nextpow2`.
#[inline]
pub(crate) fn next_pow2(n: u32) -> u32 {
    n.next_power_of_two()
}

/// `n mod d` for a power-of-two `d`.
#[inline]
pub(crate) const fn mod_pow2(n: u32, d: u32) -> u32 {
    n & (d - 1)
}
