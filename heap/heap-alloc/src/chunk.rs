//! # Chunk acquisition
//!
//! The operating system is modeled by a monotone program-break over an
//! injected memory region: every extension returns bytes contiguous with
//! the previous one, like `sbrk`. Fresh chunks are bracketed with fencepost
//! headers so coalescing can never walk off the edge of a chunk.

use crate::config::{ALLOC_HEADER_SIZE, ARENA_SIZE};
use crate::header::{BlockState, Header};
use core::ptr::{NonNull, null_mut};

/// Monotone break pointer over the region handed to [`init`](Self::init).
pub(crate) struct ProgramBreak {
    /// First byte of the region (kept for diagnostics).
    base: *mut u8,
    /// Current break; everything below is owned by the allocator.
    brk: *mut u8,
    /// One past the last usable byte.
    end: *mut u8,
}

impl ProgramBreak {
    pub(crate) const fn new() -> Self {
        Self {
            base: null_mut(),
            brk: null_mut(),
            end: null_mut(),
        }
    }

    /// Install the backing region.
    ///
    /// # Safety
    /// `[start, start + len)` must be valid, writable, exclusive to this
    /// break, and `start` must be 16-aligned. Must be called at most once.
    pub(crate) unsafe fn init(&mut self, start: *mut u8, len: usize) {
        debug_assert!(start.addr().is_multiple_of(ALLOC_HEADER_SIZE));
        self.base = start;
        self.brk = start;
        self.end = unsafe { start.byte_add(len) };
    }

    /// First byte of the region.
    pub(crate) const fn base(&self) -> *mut u8 {
        self.base
    }

    /// Extend the break by `size` bytes and return the previous break, or
    /// `None` when the region is exhausted (the "OS refusal" case).
    pub(crate) fn extend(&mut self, size: usize) -> Option<NonNull<u8>> {
        let remaining = self.end.addr() - self.brk.addr();
        if size > remaining {
            return None;
        }
        let prev = self.brk;
        // Safety: `prev + size` stays within the injected region.
        self.brk = unsafe { prev.byte_add(size) };
        NonNull::new(prev)
    }
}

/// Write a fencepost header at `fp`.
///
/// Fenceposts are permanently reserved, header-sized blocks; `left_size`
/// keeps the boundary-tag mirror intact across the chunk edge.
///
/// # Safety
/// `fp` must point at `ALLOC_HEADER_SIZE` writable bytes.
pub(crate) unsafe fn initialize_fencepost(fp: *mut Header, left_size: usize) {
    unsafe {
        let mut h = Header::empty();
        h.set_state(BlockState::Fencepost);
        h.set_block_size(ALLOC_HEADER_SIZE);
        h.set_left_size(left_size);
        fp.write(h);
    }
}

/// Shape `[mem, mem + size)` into a chunk: a left fencepost, one unallocated
/// block spanning the middle, and a right fencepost. Returns the middle
/// block; the left fencepost sits at `mem` itself.
///
/// # Safety
/// `[mem, mem + size)` must be valid, writable, exclusive, and 8-aligned;
/// `size` must be a multiple of 8 and large enough for two fenceposts plus
/// a minimum block.
pub(crate) unsafe fn carve_chunk(mem: *mut u8, size: usize) -> *mut Header {
    unsafe {
        let left_post = mem.cast::<Header>();
        initialize_fencepost(left_post, ALLOC_HEADER_SIZE);

        let right_post = mem.byte_add(size - ALLOC_HEADER_SIZE).cast::<Header>();
        initialize_fencepost(right_post, size - 2 * ALLOC_HEADER_SIZE);

        let block = mem.byte_add(ALLOC_HEADER_SIZE).cast::<Header>();
        block.write(Header::empty());
        (*block).set_state(BlockState::Unallocated);
        (*block).set_block_size(size - 2 * ALLOC_HEADER_SIZE);
        (*block).set_left_size(ALLOC_HEADER_SIZE);
        block
    }
}

const _: () = {
    assert!(ARENA_SIZE > 2 * ALLOC_HEADER_SIZE);
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header;

    #[repr(align(16))]
    struct Arena([u8; 2 * ARENA_SIZE]);

    fn arena() -> &'static mut Arena {
        Box::leak(Box::new(Arena([0; 2 * ARENA_SIZE])))
    }

    #[test]
    fn break_is_monotone_and_contiguous() {
        let region = arena();
        let mut brk = ProgramBreak::new();
        unsafe { brk.init(region.0.as_mut_ptr(), 2 * ARENA_SIZE) };

        let first = brk.extend(ARENA_SIZE).unwrap();
        let second = brk.extend(ARENA_SIZE).unwrap();
        assert_eq!(first.addr().get() + ARENA_SIZE, second.addr().get());
        assert!(brk.extend(8).is_none(), "region is exhausted");
    }

    #[test]
    fn carved_chunk_has_mirrored_tags() {
        let region = arena();
        let mem = region.0.as_mut_ptr();

        unsafe {
            let block = carve_chunk(mem, ARENA_SIZE);

            let left_post = mem.cast::<Header>();
            assert_eq!((*left_post).state(), BlockState::Fencepost);
            assert_eq!((*left_post).block_size(), ALLOC_HEADER_SIZE);
            assert_eq!(header::right_of(left_post), block);

            assert_eq!((*block).state(), BlockState::Unallocated);
            assert_eq!((*block).block_size(), ARENA_SIZE - 2 * ALLOC_HEADER_SIZE);
            assert_eq!(header::left_of(block), left_post);

            let right_post = header::right_of(block);
            assert_eq!((*right_post).state(), BlockState::Fencepost);
            assert_eq!((*right_post).left_size(), (*block).block_size());
            assert_eq!(
                right_post.cast::<u8>(),
                mem.byte_add(ARENA_SIZE - ALLOC_HEADER_SIZE)
            );
        }
    }
}
