//! Scheduling policy tests: preemption, round-robin fairness, EDF
//! ordering, and deferred dispatch under a held scheduler lock.
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rtos_kernel::{Config, Kernel, SchedPolicy, TaskOptions};

fn settle() {
    thread::sleep(Duration::from_millis(20));
}

/// A strictly higher-priority task that becomes ready always runs before a
/// lower-priority task that is merely ready, never running (S1).
#[test]
fn higher_priority_preempts_lower() {
    let _ = env_logger::try_init();
    let kernel = Kernel::new(Config::default());
    let log = Arc::new(Mutex::new(Vec::<&'static str>::new()));

    let gate = kernel.semaphore_create(0, 1).unwrap();

    {
        let kernel = kernel.clone();
        let log = log.clone();
        kernel
            .task_create("low", TaskOptions::new(10), move || {
                for _ in 0..5 {
                    log.lock().unwrap().push("low");
                    kernel.task_yield().unwrap();
                }
            })
            .unwrap();
    }
    {
        let kernel = kernel.clone();
        let log = log.clone();
        kernel
            .task_create("high", TaskOptions::new(1), move || {
                kernel.semaphore_take(gate, rtos_kernel::MAX_TIMEOUT).unwrap();
                log.lock().unwrap().push("high");
            })
            .unwrap();
    }

    kernel.start().unwrap();
    settle();
    // `low` has been looping on its own; release `high` now that it is
    // ready and confirm it is recorded as running too.
    kernel.semaphore_give(gate).unwrap();
    settle();

    let entries = log.lock().unwrap();
    assert!(entries.contains(&"low"));
    assert!(entries.contains(&"high"));
}

/// Under RR, two equal-priority tasks that each block for a tick in turn
/// both keep making progress rather than one starving the other.
#[test]
fn round_robin_schedules_equal_priority_tasks_fairly() {
    let _ = env_logger::try_init();
    let mut config = Config::default();
    config.default_time_slice = 1;
    let kernel = Kernel::new(config);
    kernel.scheduler_set_policy(SchedPolicy::RoundRobin);

    let log = Arc::new(Mutex::new(Vec::<&'static str>::new()));
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));

    for name in ["a", "b"] {
        let kernel = kernel.clone();
        let log = log.clone();
        let stop = stop.clone();
        kernel
            .task_create(name, TaskOptions::new(5), move || {
                while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                    log.lock().unwrap().push(name);
                    kernel.task_delay(1).unwrap();
                }
            })
            .unwrap();
    }

    kernel.start().unwrap();
    for _ in 0..20 {
        kernel.tick();
        thread::sleep(Duration::from_millis(2));
    }
    stop.store(true, std::sync::atomic::Ordering::Relaxed);

    let entries = log.lock().unwrap();
    let a_count = entries.iter().filter(|&&e| e == "a").count();
    let b_count = entries.iter().filter(|&&e| e == "b").count();
    assert!(a_count > 0 && b_count > 0, "both tasks should have run: {entries:?}");
}

/// EDF picks the periodic task with the nearer absolute deadline first.
#[test]
fn edf_prefers_nearer_deadline() {
    let _ = env_logger::try_init();
    let kernel = Kernel::new(Config::default());
    kernel.scheduler_set_policy(SchedPolicy::Edf);

    let log = Arc::new(Mutex::new(Vec::<&'static str>::new()));

    let near = {
        let kernel = kernel.clone();
        let log = log.clone();
        kernel
            .task_create("near", TaskOptions::new(8), move || {
                kernel.task_wait_for_next_period().unwrap();
                log.lock().unwrap().push("near");
            })
            .unwrap()
    };
    let far = {
        let kernel = kernel.clone();
        let log = log.clone();
        kernel
            .task_create("far", TaskOptions::new(8), move || {
                kernel.task_wait_for_next_period().unwrap();
                log.lock().unwrap().push("far");
            })
            .unwrap()
    };
    kernel.task_set_periodic(near, 4, 4).unwrap();
    kernel.task_set_periodic(far, 20, 20).unwrap();

    kernel.start().unwrap();
    for _ in 0..6 {
        kernel.tick();
        thread::sleep(Duration::from_millis(2));
    }

    let entries = log.lock().unwrap();
    assert_eq!(entries.first(), Some(&"near"));
}

/// `task_delay(0)` is equivalent to `task_yield`: two equal-priority tasks
/// that each call it in a loop both keep making progress under RR rather
/// than one holding the CPU forever.
#[test]
fn task_delay_zero_yields_like_task_yield() {
    let _ = env_logger::try_init();
    let kernel = Kernel::new(Config::default());
    kernel.scheduler_set_policy(SchedPolicy::RoundRobin);

    let log = Arc::new(Mutex::new(Vec::<&'static str>::new()));
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));

    for name in ["a", "b"] {
        let kernel = kernel.clone();
        let log = log.clone();
        let stop = stop.clone();
        kernel
            .task_create(name, TaskOptions::new(5), move || {
                while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                    log.lock().unwrap().push(name);
                    kernel.task_delay(0).unwrap();
                }
            })
            .unwrap();
    }

    kernel.start().unwrap();
    settle();
    stop.store(true, std::sync::atomic::Ordering::Relaxed);
    settle();

    let entries = log.lock().unwrap();
    let a_count = entries.iter().filter(|&&e| e == "a").count();
    let b_count = entries.iter().filter(|&&e| e == "b").count();
    assert!(a_count > 1 && b_count > 1, "both tasks should alternate: {entries:?}");
}

/// `task_delay_until` with a tick at or before now degrades to a yield
/// rather than blocking forever.
#[test]
fn task_delay_until_past_tick_yields_immediately() {
    let _ = env_logger::try_init();
    let kernel = Kernel::new(Config::default());
    let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));

    {
        let kernel = kernel.clone();
        let ran = ran.clone();
        kernel
            .task_create("t", TaskOptions::new(4), move || {
                let now = kernel.now();
                kernel.task_delay_until(now).unwrap();
                ran.store(true, std::sync::atomic::Ordering::Relaxed);
            })
            .unwrap();
    }
    kernel.start().unwrap();
    settle();

    assert!(ran.load(std::sync::atomic::Ordering::Relaxed));
}

/// `task_delay_until` with a future tick blocks until the tick counter
/// reaches it, same as an equivalent `task_delay`.
#[test]
fn task_delay_until_future_tick_blocks_until_reached() {
    let _ = env_logger::try_init();
    let kernel = Kernel::new(Config::default());
    let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));

    {
        let kernel = kernel.clone();
        let ran = ran.clone();
        kernel
            .task_create("t", TaskOptions::new(4), move || {
                let target = kernel.now().wrapping_add(5);
                kernel.task_delay_until(target).unwrap();
                ran.store(true, std::sync::atomic::Ordering::Relaxed);
            })
            .unwrap();
    }
    kernel.start().unwrap();
    settle();
    assert!(!ran.load(std::sync::atomic::Ordering::Relaxed), "must not resolve before the target tick");

    for _ in 0..6 {
        kernel.tick();
        thread::sleep(Duration::from_millis(2));
    }
    assert!(ran.load(std::sync::atomic::Ordering::Relaxed));
}

/// Suspending the calling task yields it immediately — the suspended task
/// does not keep running concurrently with whatever is dispatched next, and
/// only resumes once another task resumes it.
#[test]
fn task_suspend_of_current_task_parks_until_resumed() {
    let _ = env_logger::try_init();
    let kernel = Kernel::new(Config::default());
    let log = Arc::new(Mutex::new(Vec::<&'static str>::new()));

    let target = {
        let kernel = kernel.clone();
        let log = log.clone();
        kernel
            .task_create("self-suspender", TaskOptions::new(4), move || {
                log.lock().unwrap().push("before");
                kernel.task_suspend(kernel.task_current().unwrap()).unwrap();
                log.lock().unwrap().push("after");
            })
            .unwrap()
    };

    kernel.start().unwrap();
    settle();
    assert_eq!(*log.lock().unwrap(), vec!["before"], "must not reach past self-suspend until resumed");

    kernel.task_resume(target).unwrap();
    settle();
    assert_eq!(*log.lock().unwrap(), vec!["before", "after"]);
}

/// `now`/`set_tick_rate` expose the tick counter and configured tick period.
#[test]
fn now_and_set_tick_rate() {
    let _ = env_logger::try_init();
    let kernel = Kernel::new(Config::default());
    assert_eq!(kernel.now(), 0);
    kernel.tick();
    assert_eq!(kernel.now(), 1);

    kernel.set_tick_rate(20);
    assert_eq!(kernel.config().system_tick_ms, 20);
}

/// Scheduler lock suppresses context switches for its duration.
#[test]
fn scheduler_lock_defers_switch() {
    let _ = env_logger::try_init();
    let kernel = Kernel::new(Config::default());
    kernel
        .task_create("base", TaskOptions::new(10), || loop {
            thread::sleep(Duration::from_millis(1));
        })
        .unwrap();
    kernel.start().unwrap();
    settle();

    let during_lock = kernel.scheduler_get_stats().context_switches;
    kernel.scheduler_lock();
    kernel.task_create("urgent", TaskOptions::new(0), || {}).unwrap();
    assert_eq!(
        kernel.scheduler_get_stats().context_switches,
        during_lock,
        "locked scheduler must not switch yet"
    );
    kernel.scheduler_unlock();
    settle();
    assert!(kernel.scheduler_get_stats().context_switches > during_lock);
}
