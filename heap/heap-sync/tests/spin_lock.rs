use heap_sync::SpinLock;
use std::panic;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn guard_unlocks_on_drop() {
    let l = SpinLock::new(0_usize);

    {
        let mut g = l.lock();
        *g = 7;
    }

    // lock again; previous drop must have unlocked
    {
        let mut g = l.lock();
        *g *= 6;
        assert_eq!(*g, 42);
    }
}

#[test]
fn try_lock_fails_while_held() {
    let l = SpinLock::new('x');

    let g1 = l.try_lock();
    assert!(g1.is_some());

    // while held, try_lock must fail
    assert!(l.try_lock().is_none());

    drop(g1);
    assert!(l.try_lock().is_some());
}

#[test]
fn with_lock_returns_closure_result() {
    let l = SpinLock::new(vec![1_u32, 2]);
    let sum = l.with_lock(|v| {
        v.push(3);
        v.iter().sum::<u32>()
    });
    assert_eq!(sum, 6);

    // lock must be free now
    assert_eq!(l.with_lock(|v| v.len()), 3);
}

#[test]
fn get_mut_bypasses_locking() {
    let mut l = SpinLock::new(String::from("he"));
    l.get_mut().push_str("ap");
    assert_eq!(*l.lock(), "heap");
}

#[test]
fn contention_is_mutually_exclusive() {
    let threads = 8;
    let iters = 5_000;

    let lock = Arc::new(SpinLock::new(0_usize));
    let in_cs = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(threads));

    let mut handles = Vec::with_capacity(threads);
    for _ in 0..threads {
        let lock = Arc::clone(&lock);
        let in_cs = Arc::clone(&in_cs);
        let start = Arc::clone(&start);
        handles.push(thread::spawn(move || {
            start.wait();
            for _ in 0..iters {
                let mut g = lock.lock();
                let prev = in_cs.fetch_add(1, Ordering::SeqCst);
                assert_eq!(prev, 0, "mutual exclusion violated");
                *g += 1;
                in_cs.fetch_sub(1, Ordering::SeqCst);
                drop(g);

                // yield only after releasing the lock to reduce convoy effects
                thread::yield_now();
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(*lock.lock(), threads * iters);
    assert_eq!(in_cs.load(Ordering::SeqCst), 0);
}

#[test]
fn lock_is_released_when_critical_section_panics() {
    let l = SpinLock::new(0_u32);

    let res = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        l.with_lock(|v| {
            *v = 123;
            panic!("boom");
        });
    }));
    assert!(res.is_err(), "expected panic");

    // We should be able to lock again right away.
    assert_eq!(l.with_lock(|v| *v), 123);
}

/// Spot-check a concrete instantiation compiles as Sync.
#[test]
fn spinlock_is_sync_for_send_t() {
    fn takes_sync<S: Sync>(_s: &S) {}
    let l = SpinLock::new(0_u8);
    takes_sync(&l);
}
