//! # Block headers and boundary-tag navigation
//!
//! Every block — allocated, free, or fencepost — is described by a [`Header`]
//! placed at its first byte. The header has two interpretations selected by
//! the state tag: while a block is allocated, the bytes after the 16-byte
//! prefix belong to the caller; while it is free, the first two payload words
//! are reused as the intrusive free-list links.

use crate::config::{ALLOC_HEADER_SIZE, MIN_ALLOCATION};
use bitfield_struct::bitfield;
use core::ptr::null_mut;

/// Lifecycle tag of a block, co-encoded in the low bits of the size word.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub(crate) enum BlockState {
    /// On exactly one free list; payload words hold the list links.
    Unallocated = 0,
    /// Payload is on loan to the caller.
    Allocated = 1,
    /// Permanently reserved chunk boundary; terminates coalescing walks.
    Fencepost = 2,
}

impl BlockState {
    /// Construct from the raw tag bits (no validation; unknown tags read as
    /// fenceposts, which every hot path treats as "hands off").
    #[inline]
    #[must_use]
    pub(crate) const fn from_bits(bits: u8) -> Self {
        match bits {
            0 => Self::Unallocated,
            1 => Self::Allocated,
            _ => Self::Fencepost,
        }
    }

    /// Extract the raw tag bits.
    #[inline]
    #[must_use]
    pub(crate) const fn into_bits(self) -> u8 {
        self as u8
    }
}

/// Packed size-and-state machine word.
///
/// Block sizes are always multiples of 8, so the size is stored as a count
/// of 8-byte units in the upper 61 bits while the state tag occupies the
/// freed-up low 3 bits. The raw word is therefore exactly `size | state`.
#[bitfield(u64)]
pub(crate) struct SizeWord {
    /// State tag (bits 0..3); see [`BlockState`].
    #[bits(3)]
    state_bits: u8,
    /// Total block size in 8-byte units (bits 3..64).
    #[bits(61)]
    size_units: u64,
}

/// In-band block header.
///
/// `next`/`prev` overlay the payload region and are meaningful only while
/// the state is [`BlockState::Unallocated`]; the allocator never reads them
/// otherwise. The struct is crate-private — external callers only ever see
/// payload pointers.
#[repr(C)]
pub(crate) struct Header {
    /// Packed total size and state.
    word: SizeWord,
    /// Total size of the block immediately to the left (the boundary tag).
    left_size: u64,
    /// Next block on the free list.
    pub(crate) next: *mut Header,
    /// Previous block on the free list.
    pub(crate) prev: *mut Header,
}

const _: () = {
    assert!(core::mem::offset_of!(Header, next) == ALLOC_HEADER_SIZE);
    assert!(size_of::<Header>() == ALLOC_HEADER_SIZE + MIN_ALLOCATION);
    assert!(align_of::<Header>() <= ALLOC_HEADER_SIZE);
};

impl Header {
    /// A zeroed header: unallocated, size 0, unlinked.
    pub(crate) const fn empty() -> Self {
        Self {
            word: SizeWord::new(),
            left_size: 0,
            next: null_mut(),
            prev: null_mut(),
        }
    }

    /// Total byte length of this block, header included.
    #[inline]
    pub(crate) fn block_size(&self) -> usize {
        (self.word.size_units() as usize) << 3
    }

    /// Set the total byte length, preserving the state tag.
    #[inline]
    pub(crate) fn set_block_size(&mut self, size: usize) {
        debug_assert!(size.is_multiple_of(8));
        self.word.set_size_units((size >> 3) as u64);
    }

    /// Body bytes available to a caller (or to the list links when free).
    #[inline]
    pub(crate) fn body_size(&self) -> usize {
        self.block_size() - ALLOC_HEADER_SIZE
    }

    #[inline]
    pub(crate) fn state(&self) -> BlockState {
        BlockState::from_bits(self.word.state_bits())
    }

    /// Set the state tag, preserving the size.
    #[inline]
    pub(crate) fn set_state(&mut self, state: BlockState) {
        self.word.set_state_bits(state.into_bits());
    }

    /// Total size of the block immediately to the left.
    #[inline]
    pub(crate) fn left_size(&self) -> usize {
        self.left_size as usize
    }

    #[inline]
    pub(crate) fn set_left_size(&mut self, size: usize) {
        self.left_size = size as u64;
    }
}

/// Header of the block immediately to the right of `h`.
///
/// # Safety
/// `h` must point at a live header that is not the rightmost fencepost of
/// its chunk, and its size must be intact.
#[inline]
pub(crate) unsafe fn right_of(h: *mut Header) -> *mut Header {
    unsafe { h.byte_add((*h).block_size()) }
}

/// Header of the block immediately to the left of `h`.
///
/// # Safety
/// `h` must point at a live header that is not the leftmost fencepost of
/// its chunk, and its boundary tag must be intact.
#[inline]
pub(crate) unsafe fn left_of(h: *mut Header) -> *mut Header {
    unsafe { h.byte_sub((*h).left_size()) }
}

/// Recover the header from a payload pointer handed out by the allocator.
///
/// # Safety
/// `p` must be a payload pointer previously produced by [`payload_of`].
#[inline]
pub(crate) unsafe fn from_payload(p: *mut u8) -> *mut Header {
    unsafe { p.byte_sub(ALLOC_HEADER_SIZE).cast() }
}

/// Payload pointer for a block header.
///
/// # Safety
/// `h` must point at a live header of a non-fencepost block.
#[inline]
pub(crate) unsafe fn payload_of(h: *mut Header) -> *mut u8 {
    unsafe { h.cast::<u8>().byte_add(ALLOC_HEADER_SIZE) }
}
