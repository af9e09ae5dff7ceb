//! # Allocator configuration
//!
//! Compile-time constants for the block manager. Changing these requires no
//! other source changes; the assertions below pin the relationships the
//! block layout depends on.

/// Bytes requested from the emulated OS per chunk.
pub const ARENA_SIZE: usize = 4096;

/// Number of segregated free-list classes, the catch-all included.
///
/// Class `i < N_LISTS - 1` holds blocks whose body is exactly `(i + 1) * 8`
/// bytes; the last class holds everything larger.
pub const N_LISTS: usize = 59;

/// Capacity of the registry of non-adjacent OS chunks.
pub const MAX_OS_CHUNKS: usize = 1024;

/// Bytes of header that precede every payload.
///
/// This is the header prefix only — the packed size/state word and the left
/// neighbor size. The free-list links that follow overlay the payload.
pub const ALLOC_HEADER_SIZE: usize = 16;

/// Smallest body ever carved out.
///
/// A freed body must be able to hold the two intrusive list links, so the
/// minimum total block size is `ALLOC_HEADER_SIZE + MIN_ALLOCATION`.
pub const MIN_ALLOCATION: usize = 16;

/// Strongest alignment the allocator guarantees for payload pointers.
pub const MAX_SUPPORTED_ALIGN: usize = 8;

/// Backing capacity of the global heap's emulated program break.
pub const HEAP_CAPACITY: usize = MAX_OS_CHUNKS * ARENA_SIZE;

const _: () = {
    assert!(ARENA_SIZE.is_multiple_of(8));
    assert!(ARENA_SIZE >= 2 * ALLOC_HEADER_SIZE + ALLOC_HEADER_SIZE + MIN_ALLOCATION);
    assert!(ALLOC_HEADER_SIZE.is_power_of_two());
    assert!(MIN_ALLOCATION.is_multiple_of(8));
    assert!(MAX_SUPPORTED_ALIGN.is_power_of_two());
    assert!(N_LISTS >= 2);
    assert!(HEAP_CAPACITY.is_multiple_of(ARENA_SIZE));
};
