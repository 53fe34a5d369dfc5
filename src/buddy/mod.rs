//! Buddy allocator core (Knuth, TAOCP Vol. 1, Sec. 2.5), ported from
//! `buddy.c`.
//!
//! The region `[base, base + msize)` is split recursively into power-of-two
//! blocks. Each block's size class is tracked in a [`sizetable::SizeTable`]
//! packed 6 bits per block-slot; free blocks of a given class form an
//! in-band doubly-linked list ([`freelist`]) whose heads live in the `ah`
//! array right after the main heap, followed by the packed size table
//! itself:
//!
//! ```text
//! [ main heap: msize bytes ][ emergency heap: esize ][ ah: asize ][ sh: ssize ]
//! ```
//!
//! All addresses used by this module are pseudo-pointers: `u32` byte
//! offsets from `base`, not real pointers (see the crate-level docs).

mod freelist;
mod sizetable;

use crate::error::FreeError;
use crate::raw::{log2_floor, mod_pow2, next_pow2, NOBLOCK};
use freelist::FreeLists;
use sizetable::SizeTable;

/// Minimum block size the buddy core ever hands out.
pub(crate) const MINSIZE: u32 = 8;

/// Computed geometry of a buddy heap over a region of `2 * msize` bytes.
///
/// Mirrors `buddy_init`'s layout computation in `buddy.c` exactly (same
/// formulas, same order of operations, so the same split for a given
/// region size).
pub(crate) struct Buddy {
    msize: u32,
    esize: u32,
    asize: u32,
    ssize: u32,
    amax: u8,
}

impl Buddy {
    /// Lay out a buddy heap (plus, if `with_emergency`, room for an
    /// embedded first-fit emergency heap) over `total` bytes.
    pub(crate) const fn layout(total: u32) -> Self {
        let msize = total / 2;
        let amax = log2_floor(msize);
        let asize = (amax as u32 + 1) * 4;
        let mut ssize = msize / 8;
        ssize += 1;
        ssize *= 6;
        ssize /= 8;
        let esize = msize - (asize + ssize);
        Buddy {
            msize,
            esize,
            asize,
            ssize,
            amax,
        }
    }

    pub(crate) const fn msize(&self) -> u32 {
        self.msize
    }

    pub(crate) const fn esize(&self) -> u32 {
        self.esize
    }

    fn ah_offset(&self) -> u32 {
        self.msize + self.esize
    }

    fn sh_offset(&self) -> u32 {
        self.msize + self.esize + self.asize
    }

    unsafe fn size_table(&self, base: *mut u8) -> SizeTable {
        SizeTable::new(base.add(self.sh_offset() as usize))
    }

    unsafe fn free_lists(&self, base: *mut u8) -> FreeLists {
        FreeLists::new(base.add(self.ah_offset() as usize))
    }

    /// Initialize bookkeeping: whole heap marked free, one block covering
    /// the entire `msize` region on the top-level free list.
    pub(crate) unsafe fn init(&self, base: *mut u8) {
        core::ptr::write_bytes(base, 0xff, self.msize as usize);
        self.size_table(base).init(self.ssize);
        let lists = self.free_lists(base);
        lists.init(self.asize);
        freelist::insert(base, &lists, self.amax, 0);
    }

    fn findbuddy(block: u32, class: u8) -> u32 {
        let k = 1u32 << class;
        if mod_pow2(block, k << 1) == 0 {
            block + k
        } else {
            block - k
        }
    }

    /// Split the free block `block` (known size class `class`) in half,
    /// pushing the lower half onto `class - 1`'s list (`bsplit`).
    unsafe fn split(&self, base: *mut u8, block: u32, class: u8) {
        let lists = self.free_lists(base);
        freelist::remove(base, &lists, class, block);
        freelist::insert(base, &lists, class - 1, block);
        let buddy = Self::findbuddy(block, class - 1);
        freelist::insert(base, &lists, class - 1, buddy);
    }

    /// Repeatedly coalesce `block` (just freed, known size class `sz`)
    /// with its buddy, climbing size classes until no buddy is free or the
    /// top class is reached (`bjoin`). Returns whether any join happened.
    unsafe fn join(&self, base: *mut u8, add: u32, sz: u8) -> bool {
        let lists = self.free_lists(base);
        let mut joined = false;
        let mut block = add;
        let mut class = sz;
        while class < self.amax {
            let buddy = Self::findbuddy(block, class);
            if freelist::contains(base, &lists, class, buddy) {
                freelist::remove(base, &lists, class, buddy);
                if joined {
                    freelist::remove(base, &lists, class, block);
                }
                block = block.min(buddy);
                freelist::insert(base, &lists, class + 1, block);
                joined = true;
                class += 1;
            } else {
                break;
            }
        }
        joined
    }

    /// Grow a block in place from class `c` to class `s` by absorbing
    /// already-free buddies, dry-run first so a failed attempt leaves the
    /// heap untouched (`bextend`).
    unsafe fn extend_in_place(&self, base: *mut u8, block: u32, c: u8, s: u8) -> bool {
        let lists = self.free_lists(base);
        let mut i = c;
        while i < s {
            let buddy = Self::findbuddy(block, i);
            if buddy < block || !freelist::contains(base, &lists, i, buddy) {
                break;
            }
            i += 1;
        }
        if i != s {
            return false;
        }
        let mut i = c;
        while i < s {
            let buddy = Self::findbuddy(block, i);
            freelist::remove(base, &lists, i, buddy);
            i += 1;
        }
        let index = block / MINSIZE;
        let table = self.size_table(base);
        table.erase(index);
        table.put(index, s);
        true
    }

    /// Shrink a block in place from class `c` down to class `s`, re-filing
    /// the remainder as a series of power-of-two free blocks (`bshrink`).
    unsafe fn shrink_in_place(&self, base: *mut u8, block: u32, c: u8, s: u8) {
        let index = block / MINSIZE;
        let table = self.size_table(base);
        table.erase(index);
        table.put(index, s);

        let lists = self.free_lists(base);
        let sz = 1u32 << s;
        let mut cursor = block + sz;
        freelist::insert(base, &lists, s, cursor);
        cursor += sz;

        let mut remaining = (1u32 << c) - (sz << 1);
        while remaining > 0 {
            let mut k = next_pow2(remaining);
            if remaining != k {
                // Mirrors `bshrink`'s `k >>= 2` (a quarter-block step
                // rather than a half-block step when `remaining` isn't
                // itself a power of two); kept verbatim from the source.
                k >>= 2;
            }
            debug_assert!(k >= MINSIZE, "shrink remainder decomposed below MINSIZE");
            freelist::insert(base, &lists, log2_floor(k), cursor);
            remaining -= k;
            cursor += k;
        }
    }

    /// Allocate a block of at least `sz` bytes, rounding up to a power of
    /// two and splitting down from the smallest sufficient free class
    /// (`getblock`). Returns `NOBLOCK` if no free block is large enough.
    pub(crate) unsafe fn alloc(&self, base: *mut u8, sz: u32) -> Option<u32> {
        if sz == 0 || sz > self.msize {
            return None;
        }
        let want = next_pow2(sz);
        // Classes below MINSIZE's own class can't be split down to: a
        // sub-MINSIZE block has no room for a free-list node, so the
        // request class is floored at `log2(MINSIZE)` (`buddy_get_block`
        // clamps the byte size itself the same way before rounding).
        let s = log2_floor(want).max(log2_floor(MINSIZE));
        if s >= self.amax {
            return None;
        }
        let lists = self.free_lists(base);

        let mut i = s;
        let mut block = NOBLOCK;
        while i <= self.amax {
            let head = lists.head(i);
            if head != NOBLOCK {
                block = head;
                break;
            }
            i += 1;
        }
        if i <= self.amax {
            while i > s {
                block = lists.head(i);
                if block == NOBLOCK {
                    break;
                }
                self.split(base, block, i);
                i -= 1;
            }
        }
        if i == s && block != NOBLOCK {
            let index = block / MINSIZE;
            debug_assert_eq!(self.size_table(base).get(index), 0);
            freelist::remove(base, &lists, s, block);
            self.size_table(base).put(index, s);
            Some(block)
        } else {
            None
        }
    }

    /// Release a previously-allocated block (`freeblock`).
    pub(crate) unsafe fn free(&self, base: *mut u8, block: u32) -> Result<(), FreeError> {
        if mod_pow2(block, MINSIZE) != 0 {
            return Err(FreeError::AllocationNotFound);
        }
        let index = block / MINSIZE;
        let table = self.size_table(base);
        let class = table.get(index);
        if class == 0 {
            return Err(FreeError::AllocationNotFound);
        }
        table.erase(index);
        if !self.join(base, block, class) {
            let lists = self.free_lists(base);
            freelist::insert(base, &lists, class, block);
        }
        Ok(())
    }

    /// Grow, shrink, or no-op a block to `sz` bytes in place, or fall back
    /// to alloc+copy+free when in-place growth is impossible
    /// (`extendblock`). Returns `(new_block, status)`: `new_block` is
    /// `None` only when no memory is available, which is not an error.
    pub(crate) unsafe fn extend(
        &self,
        base: *mut u8,
        block: u32,
        sz: u32,
    ) -> (Option<u32>, Result<(), FreeError>) {
        if mod_pow2(block, MINSIZE) != 0 {
            return (None, Err(FreeError::AllocationNotFound));
        }
        let index = block / MINSIZE;
        let cs = self.size_table(base).get(index);
        if cs == 0 {
            return (None, Err(FreeError::AllocationNotFound));
        }
        let csz = 1u32 << cs;
        let want = next_pow2(sz.max(1));
        // Same class floor as `alloc`: a request can never be shrunk or
        // grown to below MINSIZE's own class.
        let s = log2_floor(want).max(log2_floor(MINSIZE));
        if s >= self.amax {
            return (None, Ok(()));
        }
        let want = 1u32 << s;
        if csz == want {
            return (Some(block), Ok(()));
        }
        if csz < want {
            if self.extend_in_place(base, block, cs, s) {
                return (Some(block), Ok(()));
            }
            let new_block = match self.alloc(base, want) {
                Some(b) => b,
                None => return (None, Ok(())),
            };
            core::ptr::copy_nonoverlapping(
                base.add(block as usize),
                base.add(new_block as usize),
                csz as usize,
            );
            match self.free(base, block) {
                Ok(()) => (Some(new_block), Ok(())),
                Err(_) => (Some(new_block), Err(FreeError::Internal)),
            }
        } else {
            self.shrink_in_place(base, block, cs, s);
            (Some(block), Ok(()))
        }
    }

    pub(crate) unsafe fn used_bytes(&self, base: *mut u8) -> u32 {
        let table = self.size_table(base);
        let mut used = 0u32;
        let slots = self.msize / MINSIZE;
        let mut index = 0u32;
        while index < slots {
            let class = table.get(index);
            if class != 0 {
                used += 1u32 << class;
            }
            index += 1;
        }
        used
    }

    /// Which free list, if any, currently holds the free block starting at
    /// `block`. Every address the heap ever hands back from [`Buddy::alloc`]
    /// is either marked used in the size table or is the head/member of
    /// exactly one class's free list; this is only ever consulted by the
    /// debug walker below, so a linear class scan is fine.
    unsafe fn free_class_of(&self, base: *mut u8, block: u32) -> u8 {
        let lists = self.free_lists(base);
        let mut class = 0u8;
        while class <= self.amax {
            if freelist::contains(base, &lists, class, block) {
                return class;
            }
            class += 1;
        }
        // A consistent heap never reaches this: `block` is the start of
        // some in-use or free block, and free blocks are always filed.
        0
    }

    /// Walk the heap left to right, calling `f(used, size)` once per block
    /// in address order (`printBlocks`'s traversal, adapted since blocks
    /// here don't carry an in-band size tag the way first-fit's do).
    pub(crate) unsafe fn for_each_block(&self, base: *mut u8, mut f: impl FnMut(bool, u32)) {
        let table = self.size_table(base);
        let mut addr = 0u32;
        while addr < self.msize {
            let index = addr / MINSIZE;
            let class = table.get(index);
            if class != 0 {
                f(true, 1u32 << class);
                addr += 1u32 << class;
            } else {
                let class = self.free_class_of(base, addr);
                f(false, 1u32 << class);
                addr += 1u32 << class;
            }
        }
    }
}
