//! Exercises the global C-style facade.
//!
//! These tests share one process-wide heap, so they assert behavior — round
//! trips, contents, invariants — rather than exact byte totals.

use core::alloc::{GlobalAlloc, Layout};
use heap_alloc::{HeapAllocator, my_calloc, my_free, my_malloc, my_realloc, verify};
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn malloc_round_trip() {
    let p = my_malloc(32);
    assert!(!p.is_null());
    assert_eq!(p.addr() % 8, 0);

    unsafe {
        p.write_bytes(0xa5, 32);
        assert_eq!(p.read(), 0xa5);
        assert_eq!(p.add(31).read(), 0xa5);
        my_free(p);
    }
    assert!(verify());
}

#[test]
fn zero_size_returns_null() {
    assert!(my_malloc(0).is_null());
}

#[test]
fn null_free_is_a_no_op() {
    unsafe { my_free(core::ptr::null_mut()) };
    assert!(verify());
}

#[test]
fn calloc_zeroes_every_byte() {
    let p = my_calloc(12, 9);
    assert!(!p.is_null());
    for i in 0..12 * 9 {
        assert_eq!(unsafe { p.add(i).read() }, 0);
    }
    unsafe { my_free(p) };
}

#[test]
fn calloc_overflow_returns_null() {
    assert!(my_calloc(usize::MAX, 2).is_null());
    assert!(verify());
}

#[test]
fn realloc_preserves_contents_both_ways() {
    unsafe {
        let p = my_malloc(64);
        assert!(!p.is_null());
        for i in 0..64 {
            p.add(i).write(i as u8);
        }

        // grow: the old 64 bytes must survive
        let bigger = my_realloc(p, 256);
        assert!(!bigger.is_null());
        for i in 0..64 {
            assert_eq!(bigger.add(i).read(), i as u8);
        }

        // shrink: the first 16 bytes must survive
        let smaller = my_realloc(bigger, 16);
        assert!(!smaller.is_null());
        for i in 0..16 {
            assert_eq!(smaller.add(i).read(), i as u8);
        }
        my_free(smaller);
    }
    assert!(verify());
}

#[test]
fn realloc_of_null_allocates() {
    unsafe {
        let p = my_realloc(core::ptr::null_mut(), 40);
        assert!(!p.is_null());
        my_free(p);
    }
}

#[test]
fn realloc_to_zero_releases() {
    unsafe {
        let p = my_malloc(40);
        assert!(!p.is_null());
        assert!(my_realloc(p, 0).is_null());
        // `p` was freed by the realloc; the structure must still be sound
    }
    assert!(verify());
}

#[test]
fn global_alloc_adapter() {
    let alloc = HeapAllocator;

    unsafe {
        let layout = Layout::from_size_align(96, 8).unwrap();
        let p = alloc.alloc(layout);
        assert!(!p.is_null());
        alloc.dealloc(p, layout);

        let z = alloc.alloc_zeroed(layout);
        assert!(!z.is_null());
        for i in 0..96 {
            assert_eq!(z.add(i).read(), 0);
        }
        alloc.dealloc(z, layout);

        // stronger alignment than the allocator guarantees is refused
        let over_aligned = Layout::from_size_align(64, 64).unwrap();
        assert!(alloc.alloc(over_aligned).is_null());
    }
    assert!(verify());
}

#[test]
fn concurrent_round_trips_keep_the_heap_sound() {
    let threads = 8;
    let iters = 500;
    let start = Arc::new(Barrier::new(threads));

    let mut handles = Vec::with_capacity(threads);
    for t in 0..threads {
        let start = Arc::clone(&start);
        handles.push(thread::spawn(move || {
            start.wait();
            let mut held: Vec<(*mut u8, usize, u8)> = Vec::new();
            for i in 0..iters {
                let size = 1 + (t * 131 + i * 17) % 700;
                let p = my_malloc(size);
                assert!(!p.is_null());
                let fill = (t * 31 + i) as u8;
                unsafe { p.write_bytes(fill, size) };
                held.push((p, size, fill));

                // free every other allocation immediately, the rest later
                if i % 2 == 0 {
                    let (p, size, fill) = held.swap_remove(0);
                    for off in 0..size {
                        assert_eq!(unsafe { p.add(off).read() }, fill);
                    }
                    unsafe { my_free(p) };
                }
            }
            for (p, size, fill) in held {
                for off in 0..size {
                    assert_eq!(unsafe { p.add(off).read() }, fill);
                }
                unsafe { my_free(p) };
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }
    assert!(verify());
}
