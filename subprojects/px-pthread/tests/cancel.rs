use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread::sleep,
    time::{Duration, Instant},
};

use parking_lot::Mutex as Log;
use px_pthread::{
    CancelState, CancelType, Condvar, Error, ExitStatus, Mutex, Value, cancel, cleanup_pop,
    cleanup_push, create, current, exit, join, set_cancel_state, set_cancel_type, test_cancel,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn wait_until(done: impl Fn() -> bool) {
    let start = Instant::now();
    while !done() {
        assert!(start.elapsed() < Duration::from_secs(5), "timed out");
        sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_deferred_without_cancellation_point_keeps_running() {
    init_logger();

    let stop = Arc::new(AtomicBool::new(false));
    let spins = Arc::new(AtomicUsize::new(0));

    let (flag, counter) = (Arc::clone(&stop), Arc::clone(&spins));
    let handle = create(None, move || {
        while !flag.load(Ordering::Acquire) {
            counter.fetch_add(1, Ordering::Relaxed);
            sleep(Duration::from_millis(1));
        }
        Value::new(5)
    })
    .unwrap();

    wait_until(|| spins.load(Ordering::Relaxed) > 0);
    cancel(handle).unwrap();
    sleep(Duration::from_millis(20));
    stop.store(true, Ordering::Release);

    assert_eq!(join(handle), Ok(ExitStatus::Exited(Value::new(5))));
}

#[test]
fn test_cancel_in_cond_wait_runs_cleanup_in_reverse() {
    init_logger();

    struct Shared {
        mutex: Mutex,
        cond: Condvar,
        log: Log<Vec<u32>>,
    }

    let shared = Arc::new(Shared {
        mutex: Mutex::new(),
        cond: Condvar::new(),
        log: Log::new(Vec::new()),
    });

    let other = Arc::clone(&shared);
    let handle = create(None, move || {
        other.mutex.lock().unwrap();

        let first = Arc::clone(&other);
        cleanup_push(move || {
            first.log.lock().push(1);
            first.mutex.unlock().unwrap();
        })
        .unwrap();
        for step in [2, 3] {
            let next = Arc::clone(&other);
            cleanup_push(move || next.log.lock().push(step)).unwrap();
        }

        loop {
            other.cond.wait(&other.mutex).unwrap();
        }
    })
    .unwrap();

    wait_until(|| shared.cond.waiter_count() == 1);
    cancel(handle).unwrap();

    assert_eq!(join(handle), Ok(ExitStatus::Canceled));
    assert_eq!(*shared.log.lock(), vec![3, 2, 1]);

    // The last handler released the mutex
    shared.mutex.try_lock().unwrap();
    shared.mutex.unlock().unwrap();
    assert_eq!(shared.cond.waiter_count(), 0);
}

#[test]
fn test_cancel_in_join_leaves_target_joinable() {
    init_logger();

    let release = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&release);
    let target = create(None, move || {
        while !flag.load(Ordering::Acquire) {
            sleep(Duration::from_millis(1));
        }
        Value::new(9)
    })
    .unwrap();

    let joiner = create(None, move || {
        let _ = join(target);
        Value::NULL
    })
    .unwrap();

    sleep(Duration::from_millis(20));
    cancel(joiner).unwrap();
    assert_eq!(join(joiner), Ok(ExitStatus::Canceled));

    release.store(true, Ordering::Release);
    assert_eq!(join(target), Ok(ExitStatus::Exited(Value::new(9))));
}

#[test]
fn test_disabled_request_stays_pending() {
    init_logger();

    let armed = Arc::new(AtomicBool::new(false));
    let reached = Arc::new(AtomicUsize::new(0));

    let (flag, progress) = (Arc::clone(&armed), Arc::clone(&reached));
    let handle = create(None, move || {
        assert_eq!(
            set_cancel_state(CancelState::Disabled),
            Ok(CancelState::Enabled)
        );
        progress.store(1, Ordering::Release);
        while !flag.load(Ordering::Acquire) {
            sleep(Duration::from_millis(1));
        }

        // Ignored while disabled
        test_cancel();
        progress.store(2, Ordering::Release);

        assert_eq!(
            set_cancel_state(CancelState::Enabled),
            Ok(CancelState::Disabled)
        );
        test_cancel();
        progress.store(3, Ordering::Release);
        Value::NULL
    })
    .unwrap();

    wait_until(|| reached.load(Ordering::Acquire) == 1);
    cancel(handle).unwrap();
    armed.store(true, Ordering::Release);

    assert_eq!(join(handle), Ok(ExitStatus::Canceled));
    assert_eq!(reached.load(Ordering::Acquire), 2);
}

#[test]
fn test_asynchronous_cancel() {
    init_logger();

    let started = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&started);
    let handle = create(None, move || {
        assert_eq!(
            set_cancel_type(CancelType::Asynchronous),
            Ok(CancelType::Deferred)
        );
        flag.store(true, Ordering::Release);
        loop {
            px_exec::sched::yield_now();
        }
    })
    .unwrap();

    wait_until(|| started.load(Ordering::Acquire));
    cancel(handle).unwrap();
    assert_eq!(join(handle), Ok(ExitStatus::Canceled));
}

#[test]
fn test_self_cancel_is_deferred() {
    init_logger();

    let reached = Arc::new(AtomicUsize::new(0));
    let progress = Arc::clone(&reached);
    let handle = create(None, move || {
        cancel(current()).unwrap();
        progress.store(1, Ordering::Release);
        test_cancel();
        progress.store(2, Ordering::Release);
        Value::NULL
    })
    .unwrap();

    assert_eq!(join(handle), Ok(ExitStatus::Canceled));
    assert_eq!(reached.load(Ordering::Acquire), 1);
}

#[test]
fn test_exit_runs_cleanup() {
    init_logger();

    let log = Arc::new(Log::new(Vec::new()));
    let other = Arc::clone(&log);
    let handle = create(None, move || {
        for step in [1, 2] {
            let log = Arc::clone(&other);
            cleanup_push(move || log.lock().push(step)).unwrap();
        }
        let log = Arc::clone(&other);
        cleanup_push(move || log.lock().push(99)).unwrap();
        cleanup_pop(false).unwrap();

        exit(Value::new(3));
    })
    .unwrap();

    assert_eq!(join(handle), Ok(ExitStatus::Exited(Value::new(3))));
    assert_eq!(*log.lock(), vec![2, 1]);
}

#[test]
fn test_cleanup_pop_runs_handler() {
    init_logger();

    let handle = create(None, || {
        assert_eq!(cleanup_pop(true), Err(Error::InvalidArgument));

        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        cleanup_push(move || flag.store(true, Ordering::Release)).unwrap();
        cleanup_pop(true).unwrap();
        Value::new(usize::from(ran.load(Ordering::Acquire)))
    })
    .unwrap();

    assert_eq!(join(handle), Ok(ExitStatus::Exited(Value::new(1))));
}

#[test]
fn test_cancel_unknown_thread() {
    init_logger();

    let handle = create(None, || Value::NULL).unwrap();
    join(handle).unwrap();
    assert_eq!(cancel(handle), Err(Error::NoSuchThread));
}
