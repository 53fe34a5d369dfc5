//! Composition layer: a buddy heap as primary allocator, with an optional
//! first-fit "emergency" heap carved out of the buddy region's tail for
//! requests the buddy heap cannot place (e.g. right after the buddy side
//! has fragmented down to odd-sized leftovers). Ported from the dispatch
//! logic in `buddy_get_block`/`buddy_free_block`/`buddy_extend_block`,
//! which hands off to `ffit_*` once a pointer falls at or past `eh`.

use crate::buddy::Buddy;
use crate::error::{ExtendStatus, FreeError, InitError};
use crate::ffit::FirstFit;
use crate::stats::HeapStats;

/// A buddy heap with an embedded first-fit emergency heap.
///
/// All pseudo-pointers this type hands back or accepts are offsets from
/// the region's base address, spanning `[0, msize + esize)`: `[0, msize)`
/// is buddy territory, `[msize, msize + esize)` is the emergency heap.
pub(crate) struct Heap {
    buddy: Buddy,
    emergency: Option<FirstFit>,
}

impl Heap {
    /// Lay out a heap over `total` bytes. `with_emergency` mirrors
    /// `buddy_heap_t.e`: when false, the tail of the region that would
    /// otherwise back the emergency heap goes unused, matching the
    /// original's "with emergency heap, 0/1" flag.
    pub(crate) const fn new(total: u32, with_emergency: bool) -> Result<Self, InitError> {
        if total < 2 * crate::buddy::MINSIZE {
            return Err(InitError::RegionTooSmall);
        }
        let buddy = Buddy::layout(total);
        let emergency = if with_emergency {
            Some(FirstFit::new(buddy.esize()))
        } else {
            None
        };
        Ok(Heap { buddy, emergency })
    }

    fn msize(&self) -> u32 {
        self.buddy.msize()
    }

    fn esize(&self) -> u32 {
        self.buddy.esize()
    }

    /// # Safety
    /// `base` must point to at least `msize + esize` valid, writable
    /// bytes for the lifetime of every subsequent call passing this same
    /// `base`.
    pub(crate) unsafe fn init(&mut self, base: *mut u8) {
        unsafe { self.buddy.init(base) };
        if let Some(ref mut ff) = self.emergency {
            unsafe { ff.init(base.add(self.msize() as usize)) };
        }
    }

    fn emergency_base(&self, base: *mut u8) -> *mut u8 {
        unsafe { base.add(self.msize() as usize) }
    }

    /// # Safety
    /// `base` must be the same pointer passed to [`Heap::init`], with the
    /// same lifetime guarantee.
    pub(crate) unsafe fn alloc(&mut self, base: *mut u8, n: u32) -> Option<u32> {
        if let Some(block) = unsafe { self.buddy.alloc(base, n) } {
            return Some(block);
        }
        let msize = self.msize();
        let eh = self.emergency_base(base);
        unsafe { self.emergency.as_mut()?.alloc(eh, n) }.map(|offset| msize + offset)
    }

    /// # Safety
    /// Same contract as [`Heap::alloc`].
    pub(crate) unsafe fn free(&mut self, base: *mut u8, p: u32) -> Result<(), FreeError> {
        let msize = self.msize();
        if p < msize {
            return unsafe { self.buddy.free(base, p) };
        }
        if p >= msize + self.esize() {
            return Err(FreeError::AllocationNotFound);
        }
        let eh = self.emergency_base(base);
        match &mut self.emergency {
            Some(ff) => unsafe { ff.free(eh, p - msize) },
            None => Err(FreeError::AllocationNotFound),
        }
    }

    /// # Safety
    /// Same contract as [`Heap::alloc`].
    pub(crate) unsafe fn extend(
        &mut self,
        base: *mut u8,
        p: Option<u32>,
        n: u32,
    ) -> (Option<u32>, ExtendStatus) {
        let p = match p {
            None => return (unsafe { self.alloc(base, n) }, ExtendStatus::Ok),
            Some(p) => p,
        };
        if n == 0 {
            return (None, unsafe { self.free(base, p) }.into());
        }
        let msize = self.msize();
        if p < msize {
            let (new_block, status) = unsafe { self.buddy.extend(base, p, n) };
            return (new_block, status.into());
        }
        if p >= msize + self.esize() {
            return (None, ExtendStatus::NotFound);
        }
        let eh = self.emergency_base(base);
        match &mut self.emergency {
            Some(ff) => {
                let (new_block, status) = unsafe { ff.extend(eh, p - msize, n) };
                (new_block.map(|b| b + msize), status.into())
            }
            None => (None, ExtendStatus::NotFound),
        }
    }

    /// Write a human-readable block-by-block dump of the heap to `w`, one
    /// run of `U<size>`/`F<size>` tokens per block in address order, used
    /// blocks in red and free blocks in green (`buddy_print_heap`/
    /// `ffit_print_heap`'s ANSI convention, collapsed into a single
    /// stream across both cores).
    ///
    /// # Safety
    /// Same contract as [`Heap::alloc`].
    pub(crate) unsafe fn print_heap(
        &self,
        base: *mut u8,
        w: &mut dyn core::fmt::Write,
    ) -> core::fmt::Result {
        const USED: &str = "\x1b[31m";
        const FREE: &str = "\x1b[32m";
        const RESET: &str = "\x1b[0m";
        write!(w, "buddy ")?;
        unsafe {
            self.buddy.for_each_block(base, |used, size| {
                let color = if used { USED } else { FREE };
                let _ = write!(w, "{color}{}{size}{RESET} ", if used { "U" } else { "F" });
            });
        }
        if let Some(ff) = &self.emergency {
            write!(w, "\nemergency ")?;
            let eh = self.emergency_base(base);
            unsafe {
                ff.for_each_block(eh, |used, size| {
                    let color = if used { USED } else { FREE };
                    let _ = write!(w, "{color}{}{size}{RESET} ", if used { "U" } else { "F" });
                });
            }
        }
        writeln!(w)
    }

    /// # Safety
    /// Same contract as [`Heap::alloc`].
    pub(crate) unsafe fn stats(&self, base: *mut u8) -> HeapStats {
        let buddy_used = unsafe { self.buddy.used_bytes(base) };
        let (emergency_total, emergency_used) = match &self.emergency {
            Some(ff) => (
                self.esize(),
                unsafe { ff.used_bytes(self.emergency_base(base)) },
            ),
            None => (0, 0),
        };
        let total = self.msize() + emergency_total;
        let used = buddy_used + emergency_used;
        HeapStats {
            total,
            used,
            free: total - used,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Region<const N: usize> {
        buf: [u8; N],
        heap: Heap,
    }

    impl<const N: usize> Region<N> {
        fn new(with_emergency: bool) -> Self {
            let mut heap = Heap::new(N as u32, with_emergency).unwrap();
            let mut buf = [0u8; N];
            unsafe { heap.init(buf.as_mut_ptr()) };
            Region { buf, heap }
        }

        fn base(&mut self) -> *mut u8 {
            self.buf.as_mut_ptr()
        }
    }

    #[test]
    fn buddy_path_round_trips() {
        let mut region = Region::<4096>::new(true);
        let base = region.base();
        let p = unsafe { region.heap.alloc(base, 64) }.unwrap();
        assert!(p < region.heap.msize());
        unsafe { region.heap.free(base, p) }.unwrap();
    }

    #[test]
    fn falls_back_to_emergency_heap_when_buddy_is_exhausted() {
        let mut region = Region::<4096>::new(true);
        let base = region.base();
        let msize = region.heap.msize();
        // a full-`msize` request is always rejected (it would be the whole
        // top-level block), so exhaust the buddy heap with two half-size
        // allocations instead
        let half = msize / 2;
        let a = unsafe { region.heap.alloc(base, half) }.unwrap();
        assert!(a < msize);
        let b = unsafe { region.heap.alloc(base, half) }.unwrap();
        assert!(b < msize);
        // buddy heap now has nothing free; this request must fall
        // through to the emergency heap
        let emergency = unsafe { region.heap.alloc(base, 16) }.unwrap();
        assert!(emergency >= msize);
        unsafe {
            region.heap.free(base, a).unwrap();
            region.heap.free(base, b).unwrap();
            region.heap.free(base, emergency).unwrap();
        }
    }

    #[test]
    fn emergency_pointer_is_notfound_when_disabled() {
        let mut region = Region::<4096>::new(false);
        let base = region.base();
        let msize = region.heap.msize();
        let err = unsafe { region.heap.free(base, msize) }.unwrap_err();
        assert_eq!(err, FreeError::AllocationNotFound);
    }

    /// A fixed-capacity `core::fmt::Write` sink, since this crate has no
    /// `alloc` dependency even in its own tests.
    struct FixedWriter {
        buf: [u8; 512],
        len: usize,
    }

    impl FixedWriter {
        fn new() -> Self {
            FixedWriter {
                buf: [0; 512],
                len: 0,
            }
        }

        fn as_str(&self) -> &str {
            core::str::from_utf8(&self.buf[..self.len]).unwrap()
        }
    }

    impl core::fmt::Write for FixedWriter {
        fn write_str(&mut self, s: &str) -> core::fmt::Result {
            let bytes = s.as_bytes();
            self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
            self.len += bytes.len();
            Ok(())
        }
    }

    #[test]
    fn print_heap_mentions_every_live_allocation() {
        let mut region = Region::<4096>::new(true);
        let base = region.base();
        let p = unsafe { region.heap.alloc(base, 64) }.unwrap();
        let mut out = FixedWriter::new();
        unsafe { region.heap.print_heap(base, &mut out) }.unwrap();
        assert!(out.as_str().contains("buddy"));
        assert!(out.as_str().contains("emergency"));
        unsafe { region.heap.free(base, p) }.unwrap();
    }

    #[test]
    fn stats_reflect_allocations() {
        let mut region = Region::<4096>::new(true);
        let base = region.base();
        let before = unsafe { region.heap.stats(base) };
        assert_eq!(before.used, 0);
        let p = unsafe { region.heap.alloc(base, 64) }.unwrap();
        let after = unsafe { region.heap.stats(base) };
        assert!(after.used > before.used);
        unsafe { region.heap.free(base, p) }.unwrap();
    }
}
