//! Error taxonomy shared by the buddy and first-fit cores.
//!
//! Extends a plain not-found/double-free split with the `Internal` kind
//! that the original C allocator reports as `-1` (as opposed to "address
//! unknown", reported as `4`).

use core::fmt;

/// Why a `free` or `extend` call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeError {
    /// The pointer does not refer to a currently-allocated block (unknown
    /// address, or a block that was already freed).
    AllocationNotFound,
    /// The pointer refers to a block that is already free: a double free.
    DoubleFreeDetected,
    /// An invariant of the free-list or size-table bookkeeping was
    /// violated. This should never happen in a correct caller and indicates
    /// either heap corruption or a bug in this crate.
    Internal,
}

impl fmt::Display for FreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            FreeError::AllocationNotFound => "pointer does not refer to an allocated block",
            FreeError::DoubleFreeDetected => "block is already free",
            FreeError::Internal => "heap bookkeeping is inconsistent",
        };
        f.write_str(msg)
    }
}

/// Outcome of an `extend` call, carried alongside the `Option<pointer>`
/// return value exactly like the original `int *rc` out-parameter.
///
/// Kept distinct from [`FreeError`] because `extend` can fail to grow a
/// block (no contiguous space, no free block large enough) without that
/// being an error: it is reported as `Ok` with a `None` pointer, mirroring
/// `buddy_extend_block`/`ffit_extend_block` leaving `*rc` untouched when the
/// allocator is simply out of memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtendStatus {
    /// No bookkeeping error occurred. A `None` pointer alongside this
    /// status still means "allocation failed", not "error".
    Ok,
    /// The pointer passed in does not refer to an allocated block.
    NotFound,
    /// Heap bookkeeping was found to be inconsistent while growing.
    Internal,
}

impl From<Result<(), FreeError>> for ExtendStatus {
    fn from(r: Result<(), FreeError>) -> Self {
        match r {
            Ok(()) => ExtendStatus::Ok,
            Err(FreeError::Internal) => ExtendStatus::Internal,
            Err(_) => ExtendStatus::NotFound,
        }
    }
}

/// Legacy status code compatible with the original C ABI
/// (`BUDDY_HEAP_OK` / `BUDDY_HEAP_NOTFOUND` / `BUDDY_HEAP_INTERNAL`).
///
/// Exists only as a thin conversion at the crate boundary for callers
/// porting code from `buddy.h`/`ffit.h`; internal code uses [`FreeError`]
/// and [`ExtendStatus`] directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode(pub i32);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(0x0);
    pub const NOTFOUND: StatusCode = StatusCode(0x4);
    pub const INTERNAL: StatusCode = StatusCode(-1);
}

impl From<FreeError> for StatusCode {
    fn from(e: FreeError) -> Self {
        match e {
            FreeError::AllocationNotFound | FreeError::DoubleFreeDetected => StatusCode::NOTFOUND,
            FreeError::Internal => StatusCode::INTERNAL,
        }
    }
}

impl From<ExtendStatus> for StatusCode {
    fn from(s: ExtendStatus) -> Self {
        match s {
            ExtendStatus::Ok => StatusCode::OK,
            ExtendStatus::NotFound => StatusCode::NOTFOUND,
            ExtendStatus::Internal => StatusCode::INTERNAL,
        }
    }
}

impl From<Result<(), FreeError>> for StatusCode {
    fn from(r: Result<(), FreeError>) -> Self {
        match r {
            Ok(()) => StatusCode::OK,
            Err(e) => e.into(),
        }
    }
}

/// Why [`crate::Allocator::new`]'s underlying heap layout could not be
/// computed for the requested size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    /// The region is too small to hold even one minimum-size block plus the
    /// buddy bookkeeping areas (free-list heads, packed size table).
    RegionTooSmall,
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("region too small for the buddy heap layout")
    }
}
