//! # Allocator core
//!
//! [`Heap`] owns the whole allocator state: the emulated program break, the
//! segregated free-list index, the registry of non-adjacent OS chunks, and
//! the rightmost fencepost used for chunk-adjacency detection. The global
//! facade wraps one static instance behind a spinlock; tests embed private
//! instances over private regions.

use crate::chunk::{self, ProgramBreak};
use crate::config::{ALLOC_HEADER_SIZE, ARENA_SIZE, MAX_OS_CHUNKS, MIN_ALLOCATION, N_LISTS};
use crate::free_list::{FreeLists, Slot};
use crate::header::{self, BlockState, Header};
use core::ptr::{self, NonNull};

/// Reasons the allocator core can refuse a request.
///
/// The C-style facade flattens every variant to a null pointer; the variants
/// exist so embedded users and tests can tell the cases apart.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum AllocError {
    /// [`Heap::init`] has not run yet.
    #[error("allocator is not initialized")]
    Uninitialized,
    /// Zero-byte request.
    #[error("request for zero bytes")]
    InvalidSize,
    /// The break region cannot be extended any further.
    #[error("program break exhausted")]
    OutOfMemory,
}

/// The block manager.
///
/// After [`init`](Self::init) the value is self-referential (the free-list
/// sentinels link to themselves), so it must stay pinned at its address for
/// its whole life. The global facade keeps it in a static; tests leak a box.
pub struct Heap {
    /// Emulated `sbrk`.
    brk: ProgramBreak,
    /// Segregated free-list index.
    pub(crate) lists: FreeLists,
    /// Left fenceposts of non-adjacent OS chunks, in acquisition order.
    pub(crate) os_chunks: [*mut Header; MAX_OS_CHUNKS],
    pub(crate) num_os_chunks: usize,
    /// Right fencepost of the most recently acquired chunk.
    last_fence_post: *mut Header,
    initialized: bool,
}

// Safety: the heap is only ever mutated behind a lock (or exclusive borrow);
// the raw pointers all target the region injected into `init`.
unsafe impl Send for Heap {}

impl Heap {
    /// An empty, uninitialized heap. Usable in statics.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            brk: ProgramBreak::new(),
            lists: FreeLists::new(),
            os_chunks: [ptr::null_mut(); MAX_OS_CHUNKS],
            num_os_chunks: 0,
            last_fence_post: ptr::null_mut(),
            initialized: false,
        }
    }

    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// One-shot initializer: install `[start, start + len)` as the break
    /// region, acquire the first chunk, and seed the catch-all list with it.
    /// Idempotent; repeated calls are no-ops.
    ///
    /// # Safety
    /// - The region must be valid, writable, exclusive to this heap, and
    ///   16-aligned.
    /// - `self` must already live at its final address and must not move
    ///   afterwards.
    ///
    /// # Panics
    /// Panics if `len` cannot hold even one chunk.
    pub unsafe fn init(&mut self, start: *mut u8, len: usize) {
        if self.initialized {
            return;
        }
        assert!(len >= ARENA_SIZE, "break region smaller than one chunk");

        unsafe {
            self.brk.init(start, len);
            self.lists.init();

            // Never fails: the assert above guarantees the first extension.
            let mem = self.brk.extend(ARENA_SIZE).expect("asserted above");
            let block = chunk::carve_chunk(mem.as_ptr(), ARENA_SIZE);

            self.insert_os_chunk(mem.as_ptr().cast::<Header>());
            self.last_fence_post = header::right_of(block);
            self.lists.push_front(N_LISTS - 1, block);
        }
        self.initialized = true;
    }

    /// Start of the first chunk; diagnostics print offsets from here.
    pub(crate) const fn base(&self) -> *mut u8 {
        self.brk.base()
    }

    /// Number of registered (non-adjacent) OS chunks.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.num_os_chunks
    }

    /// `(blocks, bytes)` currently on the free lists; bytes count whole
    /// blocks, headers included.
    fn free_list_totals(&self) -> (usize, usize) {
        let mut blocks = 0;
        let mut bytes = 0;
        for class in 0..N_LISTS {
            let sentinel = self.lists.sentinel(class);
            // Safety: list links are maintained under exclusive access and
            // always target live headers.
            unsafe {
                let mut cur = (*sentinel).next;
                while !ptr::eq(cur, sentinel) {
                    blocks += 1;
                    bytes += (*cur).block_size();
                    cur = (*cur).next;
                }
            }
        }
        (blocks, bytes)
    }

    /// Number of blocks currently on the free lists.
    #[must_use]
    pub fn free_block_count(&self) -> usize {
        self.free_list_totals().0
    }

    /// Total bytes (headers included) currently on the free lists.
    #[must_use]
    pub fn free_total(&self) -> usize {
        self.free_list_totals().1
    }

    /// Allocate a payload of at least `raw_size` bytes.
    ///
    /// The payload is 8-aligned and stays valid until passed to
    /// [`deallocate`](Self::deallocate).
    pub fn allocate(&mut self, raw_size: usize) -> Result<NonNull<u8>, AllocError> {
        if !self.initialized {
            return Err(AllocError::Uninitialized);
        }
        if raw_size == 0 {
            return Err(AllocError::InvalidSize);
        }

        // Round the body up to the minimum, then to the alignment quantum.
        let body = usize::max(raw_size, MIN_ALLOCATION).next_multiple_of(8);
        let need = body + ALLOC_HEADER_SIZE;

        loop {
            if let Some((block, slot)) = self.take_fit(need) {
                // Safety: `take_fit` returned a live unlinked block of at
                // least `need` bytes.
                return Ok(unsafe { self.place(block, need, slot) });
            }
            self.grow()?;
        }
    }

    /// Scan the classes upward from the smallest that could fit, unlink the
    /// winner, and return it with the list slot it vacated.
    fn take_fit(&mut self, need: usize) -> Option<(*mut Header, Slot)> {
        let start = FreeLists::class_of(need - ALLOC_HEADER_SIZE);
        for class in start..N_LISTS {
            if self.lists.is_empty(class) {
                continue;
            }
            let sentinel = self.lists.sentinel(class);
            // Safety: the index is initialized and all links are live.
            unsafe {
                let mut cur = (*sentinel).next;
                if class == N_LISTS - 1 {
                    // Catch-all: first fit; a miss means no free block in
                    // the whole index can satisfy the request.
                    while !ptr::eq(cur, sentinel) && (*cur).block_size() < need {
                        cur = (*cur).next;
                    }
                    if ptr::eq(cur, sentinel) {
                        continue;
                    }
                }
                let slot = FreeLists::unlink(cur);
                return Some((cur, slot));
            }
        }
        None
    }

    /// Carve `need` bytes out of `block` and hand out the payload.
    ///
    /// When the surplus can still hold a linkable free block, the *left*
    /// part stays free and the right part is allocated; a surplus that stays
    /// in the catch-all reoccupies the vacated `slot` so the first-fit scan
    /// order is undisturbed.
    ///
    /// # Safety
    /// `block` must be a live, unlinked, unallocated block with
    /// `block_size() >= need`; `slot` must be the pair it vacated.
    unsafe fn place(&mut self, block: *mut Header, need: usize, slot: Slot) -> NonNull<u8> {
        unsafe {
            let mut block = block;
            let extra = (*block).block_size() - need;

            if extra >= ALLOC_HEADER_SIZE + MIN_ALLOCATION {
                let residue = block;
                block = residue.cast::<u8>().byte_add(extra).cast::<Header>();

                (*residue).set_block_size(extra);
                (*residue).set_state(BlockState::Unallocated);
                let class = FreeLists::class_of(extra - ALLOC_HEADER_SIZE);
                if class == N_LISTS - 1 {
                    FreeLists::splice(residue, slot);
                } else {
                    self.lists.push_front(class, residue);
                }

                block.write(Header::empty());
                (*block).set_block_size(need);
                (*block).set_left_size(extra);
            }

            (*block).set_state(BlockState::Allocated);
            let right = header::right_of(block);
            (*right).set_left_size((*block).block_size());

            // Safety: payloads are strictly inside the injected region.
            NonNull::new_unchecked(header::payload_of(block))
        }
    }

    /// Return the block owning `ptr` to the free pool, coalescing with both
    /// neighbors.
    ///
    /// A block that absorbs a catch-all neighbor takes over that neighbor's
    /// list position (left neighbor wins when both qualify); everything else
    /// is pushed at the head of its class.
    ///
    /// # Safety
    /// `ptr` must be null or a payload pointer previously returned by
    /// [`allocate`](Self::allocate) on this heap and not freed since.
    ///
    /// # Panics
    /// Panics with `"Double Free Detected"` when the block is already free.
    pub unsafe fn deallocate(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        unsafe {
            let mut block = header::from_payload(ptr);
            match (*block).state() {
                BlockState::Allocated => {}
                BlockState::Unallocated => panic!("Double Free Detected"),
                // Corrupted input; refuse to touch chunk boundaries.
                BlockState::Fencepost => return,
            }

            (*block).set_state(BlockState::Unallocated);
            let mut right = header::right_of(block);
            let left = header::left_of(block);

            // Vacated catch-all slots, captured at unlink time. The right
            // neighbor is unlinked first so the left neighbor's slot can
            // never reference it.
            let mut right_slot: Option<Slot> = None;
            let mut left_slot: Option<Slot> = None;

            if (*right).state() == BlockState::Unallocated {
                let in_catch_all = FreeLists::class_of((*right).body_size()) == N_LISTS - 1;
                let slot = FreeLists::unlink(right);
                if in_catch_all {
                    right_slot = Some(slot);
                }
                (*block).set_block_size((*block).block_size() + (*right).block_size());
                (*header::right_of(right)).set_left_size((*block).block_size());
            }

            if (*left).state() == BlockState::Unallocated {
                let in_catch_all = FreeLists::class_of((*left).body_size()) == N_LISTS - 1;
                let slot = FreeLists::unlink(left);
                if in_catch_all {
                    left_slot = Some(slot);
                }
                (*left).set_block_size((*left).block_size() + (*block).block_size());
                block = left;
                right = header::right_of(block);
                (*right).set_left_size((*block).block_size());
            }

            if let Some(slot) = left_slot {
                FreeLists::splice(block, slot);
            } else if let Some(slot) = right_slot {
                FreeLists::splice(block, slot);
            } else {
                let class = FreeLists::class_of((*block).body_size());
                self.lists.push_front(class, block);
            }
        }
    }

    /// No free block fits: pull one more chunk from the break and absorb it.
    fn grow(&mut self) -> Result<(), AllocError> {
        let mem = self.brk.extend(ARENA_SIZE).ok_or(AllocError::OutOfMemory)?;
        log::debug!("growing heap by {ARENA_SIZE} bytes");
        // Safety: the break handed us an exclusive, writable region.
        unsafe { self.absorb_chunk(mem.as_ptr(), ARENA_SIZE) };
        Ok(())
    }

    /// Bracket a fresh chunk and splice its usable space into the catch-all.
    ///
    /// When the chunk starts exactly where the previous chunk ended, the
    /// fencepost pair between them is retired: either the previous chunk's
    /// trailing free block is extended across it, or the old right fencepost
    /// itself is reinterpreted as the merged block's header. Non-adjacent
    /// chunks are registered instead.
    ///
    /// # Safety
    /// `[mem, mem + size)` must be a fresh, exclusive, writable, 8-aligned
    /// region; the heap must be initialized (or mid-`init`).
    pub(crate) unsafe fn absorb_chunk(&mut self, mem: *mut u8, size: usize) {
        unsafe {
            let mut block = chunk::carve_chunk(mem, size);
            let left_post = mem.cast::<Header>();
            let right_post = header::right_of(block);

            let prev_post = left_post.cast::<u8>().wrapping_byte_sub(ALLOC_HEADER_SIZE);
            if ptr::eq(prev_post.cast::<Header>(), self.last_fence_post) {
                let prev_last = header::left_of(self.last_fence_post);
                if (*prev_last).state() == BlockState::Unallocated {
                    // The old chunk ends in a free block: stretch it across
                    // both retired fenceposts and the new body.
                    FreeLists::unlink(prev_last);
                    let merged =
                        (*prev_last).block_size() + 2 * ALLOC_HEADER_SIZE + (*block).block_size();
                    (*prev_last).set_block_size(merged);
                    block = prev_last;
                } else {
                    // Reinterpret the retired fencepost pair as the header
                    // of the merged block.
                    let merged = 2 * ALLOC_HEADER_SIZE + (*block).block_size();
                    let post = self.last_fence_post;
                    (*post).set_state(BlockState::Unallocated);
                    (*post).set_block_size(merged);
                    block = post;
                }
                (*right_post).set_left_size((*block).block_size());
            } else {
                self.insert_os_chunk(left_post);
            }

            // The merged (or fresh) body is always catch-all sized.
            self.lists.push_front(N_LISTS - 1, block);
            self.last_fence_post = right_post;
        }
    }

    /// Record the left fencepost of a non-adjacent chunk. A full registry
    /// drops the entry; the chunk still serves allocations but becomes
    /// invisible to the verifier walk.
    fn insert_os_chunk(&mut self, left_post: *mut Header) {
        if self.num_os_chunks < MAX_OS_CHUNKS {
            self.os_chunks[self.num_os_chunks] = left_post;
            self.num_os_chunks += 1;
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}
