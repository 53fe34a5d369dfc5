//! Buddy-system allocator with a first-fit emergency fallback, for
//! `#![no_std]` targets.
//!
//! This crate provides a single type, [`Allocator`], implementing
//! [`core::alloc::GlobalAlloc`] so it can back the [`alloc`][alloc] crate on
//! targets without an operating system. Two allocation strategies
//! (Knuth, TAOCP Vol. 1, Sec. 2.5) are combined:
//!
//! - A **buddy allocator** ([`buddy`]) covers the bulk of the heap. It
//!   splits and rejoins power-of-two blocks, which keeps allocation and
//!   free both fast and (unlike a plain first-fit scan) bounded by the
//!   number of size classes rather than the number of live blocks.
//! - A **first-fit allocator** ([`ffit`]) is carved out of the tail of the
//!   region as an "emergency heap". The buddy side's power-of-two rounding
//!   wastes up to half a block per allocation; when fragmentation or
//!   rounding waste leaves the buddy side unable to place a request, it is
//!   retried here instead of failing outright.
//!
//! [`heap`] composes the two into a single pseudo-pointer address space and
//! is the only module that knows both cores exist; from the outside, an
//! [`Allocator`] just looks like a heap.
//!
//! # Usage
//! Copy the following into your binary crate, adjusting the heap size (here
//! 64K) to your needs:
//! ```no_run
//! #[global_allocator]
//! static ALLOCATOR: buddyfit::Allocator<65536> = buddyfit::Allocator::new();
//!
//! extern crate alloc;
//! ```
//! Afterwards you don't need to interact with the crate or the static
//! `ALLOCATOR` directly. `alloc::vec::Vec`, `alloc::collections::BTreeMap`
//! and friends will all route through it.
//!
//! The minimum buffer size is 16 bytes; realistic heaps are measured in
//! kilobytes. As with any fixed-size heap, size it from a worst-case
//! calculation of your live allocations plus headroom, since there is no
//! growing it at runtime.
//!
//! Note to users with an MPU/MMU: this crate does not use either. If you
//! want write or execute protection on the heap region, take the address of
//! the static and the known size `N` and apply it yourself.
//!
//! # Implementation
//! The heap region is split at construction time into a buddy region of
//! `N / 2` bytes (plus its own bookkeeping: free-list heads and a packed
//! per-block size table) and, when the emergency heap is enabled, a
//! first-fit region carved from what's left. An allocation request first
//! tries the buddy side (`buddy_get_block`-equivalent): the request is
//! rounded up to a power of two, the smallest free class at least that
//! large is found, and is split down one class at a time until a block of
//! exactly the right size exists. Freeing walks back up, repeatedly joining
//! a block with its buddy while the buddy is also free.
//!
//! When the buddy side has no free block large enough — either because the
//! heap is genuinely full, or because rounding to a power of two would
//! waste more than is left — the request falls through to the first-fit
//! heap. That side keeps one doubly-linked free list sorted by ascending
//! size, so the first block that fits is also the smallest that fits.
//! Freed blocks store their size and a "used" tag inline (header and
//! trailer byte), which lets neighbors on both sides be coalesced in
//! constant time without a separate bookkeeping table.
//!
//! Pointers handed out by [`Allocator`] are real pointers into the backing
//! buffer; internally, both cores address blocks by 32-bit byte offset from
//! the region's base ("pseudo-pointers"), which is what lets the same
//! offset arithmetic work whether the bytes in question happen to be
//! 4-byte aligned relative to the real base pointer or not.
//!
//! [alloc]: https://doc.rust-lang.org/alloc/index.html

#![no_std]

mod buddy;
mod error;
mod ffit;
mod heap;
mod raw;
mod stats;

use core::alloc::{GlobalAlloc, Layout};
use core::mem::MaybeUninit;

use spin::Mutex;

pub use error::{ExtendStatus, FreeError, InitError};
pub use stats::HeapStats;

use heap::Heap;

/// Lazily-initialized heap state: the backing bytes plus the bookkeeping
/// [`Heap`] once it has been laid out over them.
///
/// Laying out and zeroing a multi-kilobyte region is not something we want
/// to do inside a `const fn` (it would make every `Allocator::new()` call a
/// compile-time loop over `N` bytes); instead the region stays untouched
/// until the first allocation request.
struct Inner<const N: usize> {
    memory: [MaybeUninit<u8>; N],
    heap: Option<Heap>,
}

impl<const N: usize> Inner<N> {
    const fn new() -> Self {
        Inner {
            memory: [MaybeUninit::uninit(); N],
            heap: None,
        }
    }

    fn base(&mut self) -> *mut u8 {
        self.memory.as_mut_ptr().cast()
    }

    /// Ensure the heap bookkeeping has been laid out and initialized over
    /// `memory`, then return it.
    fn ensure_init(&mut self, with_emergency: bool) -> &mut Heap {
        if self.heap.is_none() {
            let mut heap = Heap::new(N as u32, with_emergency)
                .expect("heap layout should have been validated in Allocator::new");
            let base = self.base();
            // SAFETY: `memory` is `N` bytes of valid, writable storage
            // owned by this `Inner`, and `heap` has not been initialized
            // before (we're inside the `is_none()` branch).
            unsafe { heap.init(base) };
            self.heap = Some(heap);
        }
        self.heap.as_mut().unwrap()
    }
}

/// A buddy-system allocator with a first-fit emergency heap, both backed by
/// a fixed `N`-byte buffer embedded in the type itself.
///
/// This is the core type of the crate: an allocator with a predefined heap
/// size, so heap memory usage is statically bounded and counted towards
/// static memory (e.g. the `.bss` section) rather than competing with the
/// stack at runtime.
///
/// `EMERGENCY` toggles the first-fit fallback described in the
/// [crate-level](crate) documentation. With it disabled, any request the
/// buddy side cannot place fails outright rather than retrying on the
/// first-fit side; the bytes that would have backed the emergency heap are
/// simply left unused.
///
/// ```no_run
/// #[global_allocator]
/// static ALLOCATOR: buddyfit::Allocator<65536> = buddyfit::Allocator::new();
/// ```
pub struct Allocator<const N: usize, const EMERGENCY: bool = true> {
    inner: Mutex<Inner<N>>,
}

impl<const N: usize, const EMERGENCY: bool> Allocator<N, EMERGENCY> {
    /// Create a new [`Allocator`].
    ///
    /// This is a `const fn`, so it can be called directly in a `static`
    /// initializer; no heap bytes are touched until the first allocation.
    ///
    /// # Panics
    /// Panics if `N` is too small to hold a minimal buddy layout (less
    /// than 16 bytes).
    #[must_use = "assign the allocator to a static variable and apply the `#[global_allocator]`-attribute to make it the global allocator"]
    pub const fn new() -> Self {
        assert!(
            N >= 2 * buddy::MINSIZE as usize,
            "too small heap memory: minimum size is 16"
        );
        Allocator {
            inner: Mutex::new(Inner::new()),
        }
    }

    /// Allocate `n` bytes, returning `None` if the request cannot be
    /// placed on either the buddy or (if enabled) the emergency heap.
    ///
    /// This is the byte-counted counterpart to [`GlobalAlloc::alloc`],
    /// exposed for callers that want to manage raw bytes without going
    /// through `Layout`.
    pub fn alloc_bytes(&self, n: u32) -> Option<*mut u8> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let heap = inner.ensure_init(EMERGENCY);
        let base = inner.base();
        // SAFETY: `base` points at `inner.memory`, which `heap` was
        // initialized over, and lives at least as long as `self`.
        let offset = unsafe { heap.alloc(base, n) }?;
        Some(unsafe { base.add(offset as usize) })
    }

    /// Free a pointer previously returned by [`Allocator::alloc_bytes`] or
    /// [`GlobalAlloc::alloc`].
    ///
    /// # Safety
    /// `ptr` must be a pointer this allocator itself handed out, and must
    /// not already have been freed.
    pub unsafe fn free_bytes(&self, ptr: *mut u8) -> Result<(), FreeError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let heap = inner.ensure_init(EMERGENCY);
        let base = inner.base();
        let offset = (ptr as usize - base as usize) as u32;
        unsafe { heap.free(base, offset) }
    }

    /// Grow, shrink, or no-op `ptr` to `n` bytes, returning the
    /// (possibly moved) pointer. Passing `ptr = None` behaves like
    /// [`Allocator::alloc_bytes`]; passing `n = 0` behaves like
    /// [`Allocator::free_bytes`].
    ///
    /// # Safety
    /// `ptr`, if present, must be a pointer this allocator itself handed
    /// out and not already freed.
    pub unsafe fn extend_bytes(
        &self,
        ptr: Option<*mut u8>,
        n: u32,
    ) -> (Option<*mut u8>, ExtendStatus) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let heap = inner.ensure_init(EMERGENCY);
        let base = inner.base();
        let offset = ptr.map(|p| (p as usize - base as usize) as u32);
        let (new_offset, status) = unsafe { heap.extend(base, offset, n) };
        (new_offset.map(|o| unsafe { base.add(o as usize) }), status)
    }

    /// Current usage totals across both the buddy heap and (if enabled)
    /// the emergency heap.
    pub fn stats(&self) -> HeapStats {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let heap = inner.ensure_init(EMERGENCY);
        let base = inner.base();
        unsafe { heap.stats(base) }
    }

    /// Write a block-by-block dump of the heap to `w`, for debugging.
    /// Used blocks are written in red, free blocks in green.
    pub fn print_heap(&self, w: &mut dyn core::fmt::Write) -> core::fmt::Result {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let heap = inner.ensure_init(EMERGENCY);
        let base = inner.base();
        unsafe { heap.print_heap(base, w) }
    }
}

impl<const N: usize, const EMERGENCY: bool> Default for Allocator<N, EMERGENCY> {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: `Allocator` only ever hands out pointers into its own `memory`
// buffer, which is valid for the allocator's entire lifetime; `Mutex`
// provides the exclusion `GlobalAlloc` requires for concurrent callers.
unsafe impl<const N: usize, const EMERGENCY: bool> GlobalAlloc for Allocator<N, EMERGENCY> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.alloc_bytes(layout.size() as u32)
            .unwrap_or(core::ptr::null_mut())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        // A double-free or foreign pointer here is undefined behavior per
        // `GlobalAlloc`'s own contract, so silently ignoring the error
        // (rather than panicking) matches what every other `GlobalAlloc`
        // impl does: the caller has already violated the contract.
        let _ = unsafe { self.free_bytes(ptr) };
    }

    unsafe fn realloc(&self, ptr: *mut u8, _layout: Layout, new_size: usize) -> *mut u8 {
        let (new_ptr, _status) = unsafe { self.extend_bytes(Some(ptr), new_size as u32) };
        new_ptr.unwrap_or(core::ptr::null_mut())
    }
}
