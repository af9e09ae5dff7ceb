//! # Global facade
//!
//! The process-wide allocator: one static [`Heap`] over a statically
//! reserved break region, guarded by a single [`SpinLock`]. Every public
//! entry point acquires the lock, so callers see the memory-ordering
//! guarantees of the lock and nothing weaker.
//!
//! The C-style functions mirror `malloc`/`free`/`calloc`/`realloc`;
//! [`HeapAllocator`] adapts the same heap to [`GlobalAlloc`] for callers
//! that want to install it as the Rust allocator of a binary.

use crate::config::{HEAP_CAPACITY, MAX_SUPPORTED_ALIGN};
use crate::header;
use crate::heap::{AllocError, Heap};
use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, null_mut};
use core::sync::atomic::{AtomicBool, Ordering};
use heap_sync::SpinLock;

/// Backing storage for the global heap's emulated program break, aligned to
/// the header prefix.
#[repr(align(16))]
struct HeapMem([u8; HEAP_CAPACITY]);

static mut HEAP_MEM: HeapMem = HeapMem([0; HEAP_CAPACITY]);

/// Global allocator state protected by a spinlock.
static HEAP: SpinLock<Heap> = SpinLock::new(Heap::new());

/// One-time heap initialization flag.
static DID_INIT: AtomicBool = AtomicBool::new(false);

/// Ensure the global heap is initialized (idempotent).
///
/// The first caller acquires the initial chunk; everyone else sees the flag
/// and returns without taking the lock.
fn ensure_init() {
    if !DID_INIT.load(Ordering::Acquire) {
        HEAP.with_lock(|heap| {
            if !heap.is_initialized() {
                // Safety: the static region is exclusive to the global heap,
                // 16-aligned, and the heap lives in a static (pinned).
                unsafe {
                    let start = (&raw mut HEAP_MEM.0).cast::<u8>();
                    heap.init(start, HEAP_CAPACITY);
                }
                DID_INIT.store(true, Ordering::Release);
            }
        });
    }
}

/// Allocate `size` bytes and return an 8-aligned payload pointer.
///
/// Returns null for a zero `size` and when the break region is exhausted;
/// never fails otherwise.
#[must_use]
pub fn my_malloc(size: usize) -> *mut u8 {
    ensure_init();
    // The failure report happens after the lock is released.
    match HEAP.with_lock(|heap| heap.allocate(size)) {
        Ok(payload) => payload.as_ptr(),
        Err(error @ AllocError::OutOfMemory) => {
            log::error!("my_malloc({size}) failed: {error}");
            null_mut()
        }
        Err(_) => null_mut(),
    }
}

/// Release a pointer obtained from [`my_malloc`], [`my_calloc`], or
/// [`my_realloc`]. Null is a no-op.
///
/// # Safety
/// `ptr` must be null or a live payload pointer from this allocator.
///
/// # Panics
/// Panics with `"Double Free Detected"` when the block is already free.
pub unsafe fn my_free(ptr: *mut u8) {
    if ptr.is_null() {
        return;
    }
    ensure_init();
    HEAP.with_lock(|heap| unsafe { heap.deallocate(ptr) });
}

/// Allocate zeroed storage for `count` items of `size` bytes each.
///
/// Returns null when the multiplication overflows or allocation fails.
#[must_use]
pub fn my_calloc(count: usize, size: usize) -> *mut u8 {
    let Some(total) = count.checked_mul(size) else {
        return null_mut();
    };
    let payload = my_malloc(total);
    if !payload.is_null() {
        // Safety: a non-null payload covers `total` writable bytes.
        unsafe { ptr::write_bytes(payload, 0, total) };
    }
    payload
}

/// Resize an allocation, preserving `min(old_size, size)` bytes of content.
///
/// A null `ptr` behaves like [`my_malloc`]. On failure the old block is
/// left untouched and null is returned, except that `size == 0` releases
/// the old block.
///
/// # Safety
/// `ptr` must be null or a live payload pointer from this allocator.
pub unsafe fn my_realloc(ptr: *mut u8, size: usize) -> *mut u8 {
    if ptr.is_null() {
        return my_malloc(size);
    }
    let fresh = my_malloc(size);
    if fresh.is_null() {
        if size == 0 {
            // Safety: caller guarantees `ptr` is live.
            unsafe { my_free(ptr) };
        }
        return fresh;
    }
    // Safety: the size word of a block on loan is never written by other
    // threads (coalescing only touches neighbors' boundary tags), and both
    // payloads cover the copied range.
    unsafe {
        let old_body = (*header::from_payload(ptr)).body_size();
        ptr::copy_nonoverlapping(ptr, fresh, usize::min(old_body, size));
        my_free(ptr);
    }
    fresh
}

/// `true` iff the global heap's free-list and boundary-tag invariants hold.
#[must_use]
pub fn verify() -> bool {
    ensure_init();
    HEAP.with_lock(|heap| heap.verify())
}

/// [`GlobalAlloc`] adapter over the global heap.
///
/// The allocator guarantees 8-byte alignment only, so layouts demanding
/// more are refused with a null return. Not installed by the library; a
/// binary may opt in with `#[global_allocator]`.
pub struct HeapAllocator;

unsafe impl GlobalAlloc for HeapAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > MAX_SUPPORTED_ALIGN {
            return null_mut();
        }
        my_malloc(layout.size())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        // Safety: the GlobalAlloc contract guarantees `ptr` came from
        // `alloc` on this allocator.
        unsafe { my_free(ptr) };
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let payload = unsafe { self.alloc(layout) };
        if !payload.is_null() {
            // Safety: a non-null payload covers `layout.size()` bytes.
            unsafe { ptr::write_bytes(payload, 0, layout.size()) };
        }
        payload
    }
}
