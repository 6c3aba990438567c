//! IPC object tests: semaphore handoff, mutex priority boost, queue
//! rendezvous, event-group ALL+CLEAR, destroy-wakes-waiters.
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rtos_kernel::{Config, Kernel, TaskOptions, WaitFlags, MAX_TIMEOUT};

fn settle() {
    thread::sleep(Duration::from_millis(20));
}

/// A `give` with a waiter already parked hands off directly: count stays
/// at zero and the waiter wakes (S2).
#[test]
fn semaphore_give_wakes_a_waiter_without_incrementing() {
    let _ = env_logger::try_init();
    let kernel = Kernel::new(Config::default());
    let sem = kernel.semaphore_create(0, 1).unwrap();
    let woke = Arc::new(AtomicU8::new(0));

    {
        let kernel = kernel.clone();
        let woke = woke.clone();
        kernel
            .task_create("waiter", TaskOptions::new(4), move || {
                kernel.semaphore_take(sem, MAX_TIMEOUT).unwrap();
                woke.store(1, Ordering::Relaxed);
            })
            .unwrap();
    }
    kernel.start().unwrap();
    settle();

    kernel.semaphore_give(sem).unwrap();
    settle();

    assert_eq!(woke.load(Ordering::Relaxed), 1);
    assert_eq!(kernel.semaphore_get_count(sem).unwrap(), 0);
}

/// A non-blocking `take` against an empty semaphore fails immediately.
#[test]
fn semaphore_take_zero_timeout_does_not_block() {
    let _ = env_logger::try_init();
    let kernel = Kernel::new(Config::default());
    let sem = kernel.semaphore_create(0, 1).unwrap();
    let result = Arc::new(Mutex::new(None));

    {
        let kernel = kernel.clone();
        let result = result.clone();
        kernel
            .task_create("t", TaskOptions::new(4), move || {
                *result.lock().unwrap() = Some(kernel.semaphore_take(sem, 0));
            })
            .unwrap();
    }
    kernel.start().unwrap();
    settle();

    assert!(result.lock().unwrap().as_ref().unwrap().is_err());
}

/// Locking a mutex held by a lower-priority task boosts that task's
/// priority until it unlocks (S3, dynamic inheritance).
#[test]
fn mutex_lock_boosts_owner_priority() {
    let _ = env_logger::try_init();
    let kernel = Kernel::new(Config::default());
    let mtx = kernel.mutex_create().unwrap();
    let hold_gate = kernel.semaphore_create(0, 1).unwrap();
    let release_gate = kernel.semaphore_create(0, 1).unwrap();

    let low = {
        let kernel = kernel.clone();
        kernel
            .task_create("low", TaskOptions::new(10), move || {
                kernel.mutex_lock(mtx, MAX_TIMEOUT).unwrap();
                kernel.semaphore_give(hold_gate).unwrap();
                kernel.semaphore_take(release_gate, MAX_TIMEOUT).unwrap();
                kernel.mutex_unlock(mtx).unwrap();
            })
            .unwrap()
    };
    {
        let kernel = kernel.clone();
        kernel
            .task_create("high", TaskOptions::new(1), move || {
                kernel.semaphore_take(hold_gate, MAX_TIMEOUT).unwrap();
                kernel.mutex_lock(mtx, MAX_TIMEOUT).unwrap();
                kernel.mutex_unlock(mtx).unwrap();
            })
            .unwrap();
    }

    kernel.start().unwrap();
    settle();
    // `low` now owns the mutex and `high` is blocked waiting for it.
    assert_eq!(kernel.task_get_priority(low).unwrap(), 1, "owner should be boosted to waiter's priority");

    kernel.semaphore_give(release_gate).unwrap();
    settle();
    assert_eq!(kernel.task_get_priority(low).unwrap(), 10, "priority restored after unlock");
}

/// A `receive` already parked is handed a message directly by `send`,
/// bypassing the ring buffer (S4).
#[test]
fn queue_rendezvous_fast_path() {
    let _ = env_logger::try_init();
    let kernel = Kernel::new(Config::default());
    let queue = kernel.queue_create(4, 1).unwrap();
    let received = Arc::new(Mutex::new(None));

    {
        let kernel = kernel.clone();
        let received = received.clone();
        kernel
            .task_create("receiver", TaskOptions::new(4), move || {
                let msg = kernel.queue_receive(queue, MAX_TIMEOUT).unwrap();
                *received.lock().unwrap() = Some(msg);
            })
            .unwrap();
    }
    kernel.start().unwrap();
    settle();

    kernel.queue_send(queue, vec![42], MAX_TIMEOUT).unwrap();
    settle();

    assert_eq!(received.lock().unwrap().as_ref(), Some(&vec![42]));
    assert_eq!(kernel.queue_get_count(queue).unwrap(), 0);
}

/// A full queue's non-blocking `send` fails immediately instead of parking.
#[test]
fn queue_send_zero_timeout_fails_when_full() {
    let _ = env_logger::try_init();
    let kernel = Kernel::new(Config::default());
    let queue = kernel.queue_create(1, 1).unwrap();
    let result = Arc::new(Mutex::new(None));

    {
        let kernel = kernel.clone();
        let result = result.clone();
        kernel
            .task_create("t", TaskOptions::new(4), move || {
                kernel.queue_send(queue, vec![1], MAX_TIMEOUT).unwrap();
                *result.lock().unwrap() = Some(kernel.queue_send(queue, vec![2], 0));
            })
            .unwrap();
    }
    kernel.start().unwrap();
    settle();

    assert_eq!(
        result.lock().unwrap().as_ref(),
        Some(&Err(rtos_kernel::KernelError::Timeout))
    );
}

/// `event_wait` with `ALL` only succeeds once every requested bit is set;
/// `CLEAR` consumes them atomically with the wait (S5).
#[test]
fn event_group_wait_all_then_clear() {
    let _ = env_logger::try_init();
    let kernel = Kernel::new(Config::default());
    let group = kernel.event_group_create(0).unwrap();
    let observed = Arc::new(Mutex::new(None));

    {
        let kernel = kernel.clone();
        let observed = observed.clone();
        kernel
            .task_create("waiter", TaskOptions::new(4), move || {
                let flags = kernel
                    .event_group_wait(group, 0b11, WaitFlags::ALL | WaitFlags::CLEAR, MAX_TIMEOUT)
                    .unwrap();
                *observed.lock().unwrap() = Some(flags);
            })
            .unwrap();
    }
    kernel.start().unwrap();
    settle();

    kernel.event_group_set(group, 0b01).unwrap();
    settle();
    assert!(observed.lock().unwrap().is_none(), "ALL wait must not wake on a partial match");

    kernel.event_group_set(group, 0b10).unwrap();
    settle();
    assert!(observed.lock().unwrap().is_some());
    assert_eq!(kernel.event_group_get(group).unwrap() & 0b11, 0, "CLEAR should consume both bits");
}

/// The flags returned by a wait are masked against the bits that were
/// actually requested — an unrelated bit set elsewhere in the group must
/// not leak into the caller's result.
#[test]
fn event_group_wait_returns_only_the_requested_bits() {
    let _ = env_logger::try_init();
    let kernel = Kernel::new(Config::default());
    let group = kernel.event_group_create(0).unwrap();
    let observed = Arc::new(Mutex::new(None));

    {
        let kernel = kernel.clone();
        let observed = observed.clone();
        kernel
            .task_create("waiter", TaskOptions::new(4), move || {
                let flags = kernel.event_group_wait(group, 0b001, WaitFlags::ALL, MAX_TIMEOUT).unwrap();
                *observed.lock().unwrap() = Some(flags);
            })
            .unwrap();
    }
    kernel.start().unwrap();
    settle();

    // Sets an unrelated bit alongside the requested one.
    kernel.event_group_set(group, 0b101).unwrap();
    settle();

    assert_eq!(observed.lock().unwrap().as_ref(), Some(&0b001), "result must be masked to the requested bit");
    assert_eq!(kernel.event_group_get(group).unwrap(), 0b101, "the unrelated bit is untouched in the group itself");
}

/// A non-blocking check against a mixed flag set is masked the same way a
/// blocking wait is.
#[test]
fn event_group_try_wait_masks_the_returned_flags() {
    let _ = env_logger::try_init();
    let kernel = Kernel::new(Config::default());
    let group = kernel.event_group_create(0b110).unwrap();

    let flags = kernel
        .event_group_wait(group, 0b010, WaitFlags::empty(), 0)
        .unwrap();
    assert_eq!(flags, 0b010);
}

/// Deleting an object with waiters wakes them with an error instead of
/// leaving them parked forever.
#[test]
fn deleting_semaphore_wakes_waiters_with_error() {
    let _ = env_logger::try_init();
    let kernel = Kernel::new(Config::default());
    let sem = kernel.semaphore_create(0, 1).unwrap();
    let result = Arc::new(Mutex::new(None));

    {
        let kernel = kernel.clone();
        let result = result.clone();
        kernel
            .task_create("waiter", TaskOptions::new(4), move || {
                *result.lock().unwrap() = Some(kernel.semaphore_take(sem, MAX_TIMEOUT));
            })
            .unwrap();
    }
    kernel.start().unwrap();
    settle();

    kernel.semaphore_delete(sem).unwrap();
    settle();

    assert_eq!(result.lock().unwrap().as_ref(), Some(&Err(rtos_kernel::KernelError::Destroyed)));
}
