//! # Structural verifier
//!
//! Walks the free-list index and the boundary tags of every registered chunk
//! and checks the invariants the allocator maintains. Not invoked on the hot
//! path; tests call it after every public operation.

use crate::config::N_LISTS;
use crate::header::{self, BlockState, Header};
use crate::heap::Heap;
use core::ptr;

/// Structural corruption found by [`Heap::verify`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum VerifyError {
    /// Floyd's tortoise and hare met inside a free list.
    #[error("cycle detected in free list class {class}")]
    Cycle { class: usize },
    /// A node whose neighbors do not point back at it.
    #[error("invalid prev/next links in class {class} at block {node:#x}")]
    BrokenLinks { class: usize, node: usize },
    /// A free-list node that is not in the unallocated state.
    #[error("free list class {class} holds a non-free block at {node:#x}")]
    NotFree { class: usize, node: usize },
    /// A registered chunk that does not start with a fencepost.
    #[error("invalid fencepost at chunk start {chunk:#x}")]
    BadFencepost { chunk: usize },
    /// A block whose size is not mirrored by its right neighbor.
    #[error("invalid sizes at block {block:#x}: size {size} but right neighbor records {mirror}")]
    SizeMismatch {
        block: usize,
        size: usize,
        mirror: usize,
    },
    /// Two neighboring blocks both unallocated — coalescing was missed.
    #[error("adjacent unallocated blocks at {block:#x}")]
    AdjacentFree { block: usize },
    /// The chunk walks and the free lists disagree about the free blocks.
    #[error("chunk walks found {walked} free blocks but the lists hold {listed}")]
    CountMismatch { walked: usize, listed: usize },
}

impl Heap {
    /// `true` iff the free-list and boundary-tag invariants hold.
    ///
    /// On failure the offending structure is logged and `false` returned;
    /// the heap is left untouched.
    #[must_use]
    pub fn verify(&self) -> bool {
        match self.check_structure() {
            Ok(()) => true,
            Err(error) => {
                log::error!("heap verification failed: {error}");
                false
            }
        }
    }

    fn check_structure(&self) -> Result<(), VerifyError> {
        let listed = self.verify_free_lists()?;
        let walked = self.verify_tags()?;
        if walked == listed {
            Ok(())
        } else {
            Err(VerifyError::CountMismatch { walked, listed })
        }
    }

    /// Check every list for cycles, link symmetry, and node state; returns
    /// the total node count.
    fn verify_free_lists(&self) -> Result<usize, VerifyError> {
        let mut listed = 0;
        for class in 0..N_LISTS {
            if let Some(meet) = self.detect_cycle(class) {
                // Safety: `meet` is a node of a (cyclic) list; the sublist
                // logger only follows next links up to the meeting point.
                unsafe { crate::debug::log_sublist((*meet).next, meet) };
                return Err(VerifyError::Cycle { class });
            }
            listed += self.verify_links(class)?;
        }
        Ok(listed)
    }

    /// Floyd's tortoise and hare over the circular list of `class`.
    ///
    /// Returns a node inside the cycle, or `None` for a well-formed list.
    fn detect_cycle(&self, class: usize) -> Option<*mut Header> {
        let sentinel = self.lists.sentinel(class);
        // Safety: links target live headers; the hare only dereferences
        // after the sentinel check.
        unsafe {
            let mut slow = (*sentinel).next;
            let mut fast = (*slow).next;
            while !ptr::eq(fast, sentinel) {
                if ptr::eq(slow, fast) {
                    return Some(slow);
                }
                slow = (*slow).next;
                fast = (*(*fast).next).next;
            }
            None
        }
    }

    /// Check `next.prev`/`prev.next` symmetry and the unallocated state for
    /// every node of `class`; returns the node count.
    fn verify_links(&self, class: usize) -> Result<usize, VerifyError> {
        let sentinel = self.lists.sentinel(class);
        let mut count = 0;
        // Safety: the list is cycle-free (checked first) and links are live.
        unsafe {
            let mut cur = (*sentinel).next;
            while !ptr::eq(cur, sentinel) {
                if !ptr::eq((*(*cur).next).prev, cur) || !ptr::eq((*(*cur).prev).next, cur) {
                    return Err(VerifyError::BrokenLinks {
                        class,
                        node: cur.addr(),
                    });
                }
                if (*cur).state() != BlockState::Unallocated {
                    return Err(VerifyError::NotFree {
                        class,
                        node: cur.addr(),
                    });
                }
                count += 1;
                cur = (*cur).next;
            }
        }
        Ok(count)
    }

    /// Walk the boundary tags of every registered chunk; returns the number
    /// of unallocated blocks seen.
    fn verify_tags(&self) -> Result<usize, VerifyError> {
        let mut walked = 0;
        for i in 0..self.num_os_chunks {
            walked += self.verify_chunk(self.os_chunks[i])?;
        }
        Ok(walked)
    }

    /// Walk one chunk from its left fencepost to its right fencepost,
    /// checking the size mirror at every step and that no two unallocated
    /// blocks touch; returns the number of unallocated blocks.
    fn verify_chunk(&self, chunk: *mut Header) -> Result<usize, VerifyError> {
        let mut free_blocks = 0;
        // Safety: registered chunks point at live fencepost headers; the
        // walk stays inside the chunk as long as the mirrors it validates
        // hold, and aborts on the first mismatch.
        unsafe {
            if (*chunk).state() != BlockState::Fencepost {
                return Err(VerifyError::BadFencepost {
                    chunk: chunk.addr(),
                });
            }

            let mut cur = chunk;
            let mut prev_free = false;
            loop {
                let right = header::right_of(cur);
                if (*cur).block_size() != (*right).left_size() {
                    return Err(VerifyError::SizeMismatch {
                        block: cur.addr(),
                        size: (*cur).block_size(),
                        mirror: (*right).left_size(),
                    });
                }

                cur = right;
                match (*cur).state() {
                    BlockState::Fencepost => return Ok(free_blocks),
                    BlockState::Unallocated => {
                        if prev_free {
                            return Err(VerifyError::AdjacentFree { block: cur.addr() });
                        }
                        prev_free = true;
                        free_blocks += 1;
                    }
                    BlockState::Allocated => prev_free = false,
                }
            }
        }
    }
}
