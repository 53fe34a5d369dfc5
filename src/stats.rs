//! Heap usage statistics (`buddy_get_stats`/`ffit_get_stats` equivalent).

/// Byte-granular usage snapshot of a heap.
///
/// `used + free` is not required to equal `total`: bookkeeping overhead
/// (free-list heads, the packed size table, block headers/trailers) is
/// counted in neither, exactly as in the original `buddy_get_stats`, which
/// documents watermark and step counters as deliberately unimplemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapStats {
    /// Total size of the region usable for allocations.
    pub total: u32,
    /// Bytes currently handed out to callers.
    pub used: u32,
    /// Bytes currently available for allocation.
    pub free: u32,
}
