//! # Debug dumps
//!
//! Human-readable views of the allocator state, logged through the `log`
//! facade at debug level. Block addresses are printed as offsets from the
//! heap base so runs are comparable. All output goes through `log` — no
//! buffered I/O happens inside the allocator lock.

use crate::config::N_LISTS;
use crate::header::{BlockState, Header, right_of};
use crate::heap::Heap;
use core::ptr;

const fn state_tag(state: BlockState) -> &'static str {
    match state {
        BlockState::Unallocated => "free",
        BlockState::Allocated => "used",
        BlockState::Fencepost => "post",
    }
}

impl Heap {
    /// Offset of `p` from the heap base, for stable diagnostics.
    fn off(&self, p: *const Header) -> usize {
        p.addr().wrapping_sub(self.base().addr())
    }

    /// Log every non-empty free list, one line per node.
    pub fn dump_free_lists(&self) {
        log::debug!("freelist dump ({N_LISTS} classes)");
        for class in 0..N_LISTS {
            if self.lists.is_empty(class) {
                continue;
            }
            let sentinel = self.lists.sentinel(class);
            // Safety: links are maintained under the allocator lock and
            // target live headers.
            unsafe {
                let mut cur = (*sentinel).next;
                while !ptr::eq(cur, sentinel) {
                    log::debug!(
                        "  [{class:2}] block@{:#06x} size {} left {}",
                        self.off(cur),
                        (*cur).block_size(),
                        (*cur).left_size(),
                    );
                    cur = (*cur).next;
                }
            }
        }
    }

    /// Log the boundary tags of every registered chunk, fenceposts included.
    pub fn dump_chunks(&self) {
        log::debug!("chunk dump ({} registered)", self.chunk_count());
        for i in 0..self.num_os_chunks {
            let mut cur = self.os_chunks[i];
            // Safety: registered chunks start at live fencepost headers and
            // the tag walk ends at the terminating fencepost.
            unsafe {
                loop {
                    log::debug!(
                        "  chunk {i}: block@{:#06x} size {:4} left {:4} {}",
                        self.off(cur),
                        (*cur).block_size(),
                        (*cur).left_size(),
                        state_tag((*cur).state()),
                    );
                    let next = right_of(cur);
                    if (*next).state() == BlockState::Fencepost {
                        log::debug!(
                            "  chunk {i}: block@{:#06x} size {:4} left {:4} {}",
                            self.off(next),
                            (*next).block_size(),
                            (*next).left_size(),
                            state_tag((*next).state()),
                        );
                        break;
                    }
                    cur = next;
                }
            }
        }
    }
}

/// Log the nodes from `start` up to and including `end`, following `next`
/// links. Used by the verifier to show the sublist that forms a cycle.
///
/// # Safety
/// Every `next` link from `start` must reach `end` through live headers.
pub(crate) unsafe fn log_sublist(start: *mut Header, end: *mut Header) {
    unsafe {
        let mut cur = start;
        loop {
            log::error!(
                "  cycle member @{:#x} size {} {}",
                cur.addr(),
                (*cur).block_size(),
                state_tag((*cur).state()),
            );
            if ptr::eq(cur, end) {
                break;
            }
            cur = (*cur).next;
        }
    }
}
