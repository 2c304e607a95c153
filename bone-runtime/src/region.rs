//! Region-based memory: mmap-backed block pools, a region stack, and bump
//! allocation.
//!
//! This replaces a tracing or incremental collector entirely: a region owns
//! a chain of fixed-size blocks and is freed in bulk, in `O(1)`, by
//! splicing its block chain onto a process-wide free list. There is no
//! marking, no finalization, and (per spec) no cycle detection — pairs are
//! built in strict left-to-right order by the reader and compiler, so
//! nothing reachable is ever cyclic.
//!
//! Blocks are whole OS pages. The first word of a block is either a link to
//! the next block on the free list (while the block is free) or a link to
//! the *previous* block allocated into the same region (while the block is
//! in use) — the same word serves both purposes at different times, as in
//! the original interpreter.

use bone_core::{Tag, TypeError, Value};
use std::ptr;

/// Blocks are obtained from the OS in batches this large.
const ALLOC_BLOCKS_AT_ONCE: usize = 16;

/// The region stack never needs more entries than this: it mirrors the
/// nesting depth of `call`/`let`-like forms, which is bounded in practice
/// by the call stack's own 256-frame cap.
pub const REGION_STACK_CAPACITY: usize = 64;

/// A region's identity: the (untagged) address of its two-word header,
/// which lives immediately after the link word of the region's first
/// block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionHandle(*mut u64);

impl RegionHandle {
    pub fn to_value(self) -> Value {
        Value::tag(self.0 as u64, Tag::Reg)
    }

    pub fn from_value(v: Value) -> Result<RegionHandle, TypeError> {
        Ok(RegionHandle(v.untag_checked(Tag::Reg)? as *mut u64))
    }

    /// `#reg(0x...)`, the printer's opaque rendering.
    pub fn debug_addr(self) -> usize {
        self.0 as usize
    }

    #[inline(always)]
    unsafe fn current_block(self) -> *mut u64 {
        unsafe { *(self.0 as *mut *mut u64) }
    }

    #[inline(always)]
    unsafe fn set_current_block(self, b: *mut u64) {
        unsafe {
            *(self.0 as *mut *mut u64) = b;
        }
    }

    #[inline(always)]
    unsafe fn allocp(self) -> *mut u64 {
        unsafe { *(self.0.add(1) as *mut *mut u64) }
    }

    #[inline(always)]
    unsafe fn set_allocp(self, p: *mut u64) {
        unsafe {
            *(self.0.add(1) as *mut *mut u64) = p;
        }
    }
}

/// Number of words occupied by a region's header (`current_block` +
/// `allocp`), not counting the block's own leading link word.
const HEADER_WORDS: usize = 2;

/// A scoped handle returned by [`RegionAllocator::enter`]; popping the
/// region back off the stack happens in `Drop`, giving the spec's "scoped
/// acquisition with guaranteed release on all exit paths" invariant for
/// free, including across early returns and `?`.
pub struct RegionGuard<'a> {
    regions: &'a mut RegionAllocator,
    popped: bool,
}

impl Drop for RegionGuard<'_> {
    fn drop(&mut self) {
        if !self.popped {
            self.regions.pop();
        }
    }
}

impl RegionGuard<'_> {
    /// Pop early and return the handle, e.g. to free it immediately.
    pub fn pop(mut self) -> RegionHandle {
        self.popped = true;
        self.regions.pop()
    }
}

impl std::ops::Deref for RegionGuard<'_> {
    type Target = RegionAllocator;
    fn deref(&self) -> &RegionAllocator {
        self.regions
    }
}

impl std::ops::DerefMut for RegionGuard<'_> {
    fn deref_mut(&mut self) -> &mut RegionAllocator {
        self.regions
    }
}

pub struct RegionAllocator {
    blocksize: usize,
    blockwords: usize,
    blockmask: u64,
    free_block: *mut u64,
    stack: Vec<RegionHandle>,
    permanent: RegionHandle,
    allocp: *mut u64,
    current_block: *mut u64,
}

/// Live-region / cache snapshot, for diagnostics and tests — not part of
/// the language surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionStats {
    pub live_regions: usize,
    pub blocks_cached: usize,
}

impl RegionAllocator {
    pub fn new() -> RegionAllocator {
        let blocksize = page_size();
        let blockwords = blocksize / std::mem::size_of::<u64>();
        let blockmask = !(blocksize as u64 - 1);

        let mut this = RegionAllocator {
            blocksize,
            blockwords,
            blockmask,
            free_block: ptr::null_mut(),
            stack: Vec::with_capacity(REGION_STACK_CAPACITY),
            permanent: RegionHandle(ptr::null_mut()),
            allocp: ptr::null_mut(),
            current_block: ptr::null_mut(),
        };
        this.ensure_free_block();
        let permanent = this.new_region();
        this.permanent = permanent;
        this.stack.push(permanent);
        this.load(permanent);
        this
    }

    fn block_of(&self, addr: *mut u64) -> *mut u64 {
        ((addr as u64) & self.blockmask) as *mut u64
    }

    fn blocks_alloc(&self, n: usize) -> *mut u64 {
        unsafe {
            let p = libc::mmap(
                ptr::null_mut(),
                self.blocksize * n,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            );
            assert!(p != libc::MAP_FAILED, "mmap failed for region blocks");
            p as *mut u64
        }
    }

    fn blocks_init(&self, p: *mut u64, n: usize) {
        for i in 0..n - 1 {
            unsafe {
                let here = p.add(i * self.blockwords);
                let next = p.add((i + 1) * self.blockwords);
                *here = next as u64;
            }
        }
        unsafe {
            *p.add((n - 1) * self.blockwords) = 0;
        }
    }

    fn fresh_blocks(&self) -> *mut u64 {
        let p = self.blocks_alloc(ALLOC_BLOCKS_AT_ONCE);
        self.blocks_init(p, ALLOC_BLOCKS_AT_ONCE);
        p
    }

    fn ensure_free_block(&mut self) {
        if self.free_block.is_null() {
            self.free_block = self.fresh_blocks();
        }
    }

    /// Take a block off the free list and link it to `next`.
    fn block_new(&mut self, next: *mut u64) -> *mut u64 {
        self.ensure_free_block();
        let block = self.free_block;
        unsafe {
            self.free_block = *block as *mut u64;
            *block = next as u64;
        }
        block
    }

    fn new_region(&mut self) -> RegionHandle {
        let block = self.block_new(ptr::null_mut());
        let header = unsafe { block.add(1) };
        let region = RegionHandle(header);
        unsafe {
            region.set_current_block(block);
            region.set_allocp(block.add(1 + HEADER_WORDS));
        }
        region
    }

    fn load(&mut self, r: RegionHandle) {
        unsafe {
            self.allocp = r.allocp();
            self.current_block = r.current_block();
        }
    }

    fn store(&mut self, r: RegionHandle) {
        unsafe {
            r.set_allocp(self.allocp);
            r.set_current_block(self.current_block);
        }
    }

    /// The region currently receiving allocations.
    pub fn active(&self) -> RegionHandle {
        *self.stack.last().expect("region stack is never empty")
    }

    pub fn permanent(&self) -> RegionHandle {
        self.permanent
    }

    /// Push a new, freshly created region and enter it, returning a guard
    /// that pops it back off on drop.
    pub fn enter_new(&mut self) -> RegionGuard<'_> {
        let r = self.new_region();
        self.enter(r)
    }

    /// Push an existing region (e.g. the permanent one) and enter it.
    pub fn enter(&mut self, r: RegionHandle) -> RegionGuard<'_> {
        assert!(
            self.stack.len() < REGION_STACK_CAPACITY,
            "region stack overflow"
        );
        self.store(self.active());
        self.stack.push(r);
        self.load(r);
        RegionGuard {
            regions: self,
            popped: false,
        }
    }

    fn pop(&mut self) -> RegionHandle {
        self.store(self.active());
        let r = self
            .stack
            .pop()
            .expect("pop() called with no region pushed beyond the permanent one");
        self.load(self.active());
        r
    }

    /// Bump-allocate `n` words from the active region, fetching a fresh
    /// block when the bump pointer would cross a block boundary.
    pub fn alloc(&mut self, n: usize) -> *mut Value {
        let res = self.allocp;
        let next = unsafe { self.allocp.add(n) };
        if self.block_of(next) == self.current_block {
            self.allocp = next;
            return res.cast();
        }
        // `next` spilled past the current block's boundary (or landed
        // exactly on the next one): link a new block on and retry from a
        // clean bump pointer, re-checking for blocks too small to ever hold
        // `n` words would be a caller bug, not something to recover from.
        let new_block = self.block_new(self.current_block);
        self.current_block = new_block;
        self.allocp = unsafe { new_block.add(1) };
        self.alloc(n)
    }

    /// Release a region's entire block chain back to the free list. This
    /// is an `O(1)` pointer splice: the region's most-recently-allocated
    /// block becomes the new free-list head, and its chain's tail (the
    /// first block, found by masking the region header's own address) is
    /// rewired to point at the old free-list head.
    pub fn free(&mut self, r: RegionHandle) {
        let first_block = self.block_of(r.0);
        unsafe {
            *first_block = self.free_block as u64;
            self.free_block = r.current_block();
        }
    }

    pub fn stats(&self) -> RegionStats {
        let mut cached = 0usize;
        let mut p = self.free_block;
        while !p.is_null() {
            cached += 1;
            p = unsafe { *p as *mut u64 };
        }
        RegionStats {
            live_regions: self.stack.len(),
            blocks_cached: cached,
        }
    }
}

impl Default for RegionAllocator {
    fn default() -> Self {
        Self::new()
    }
}

fn page_size() -> usize {
    let n = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    assert!(n > 0, "sysconf(_SC_PAGESIZE) failed");
    n as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_pop_restores_active_region() {
        let mut regions = RegionAllocator::new();
        let before = regions.active();
        {
            let _guard = regions.enter_new();
            assert_ne!(regions.active(), before);
        }
        assert_eq!(regions.active(), before);
    }

    #[test]
    fn alloc_crosses_block_boundaries() {
        let mut regions = RegionAllocator::new();
        // Allocate enough two-word cells to certainly need more than one
        // page-sized block.
        let cells = regions.blocksize / 8;
        for _ in 0..cells {
            let p = regions.alloc(2);
            unsafe {
                *p = Value::of_int(1);
                *p.add(1) = Value::of_int(2);
            }
        }
    }

    #[test]
    fn region_handle_round_trips_through_value() {
        let regions = RegionAllocator::new();
        let v = regions.permanent().to_value();
        assert_eq!(RegionHandle::from_value(v).unwrap(), regions.permanent());
    }
}
