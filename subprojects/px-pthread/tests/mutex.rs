use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use px_pthread::{Deadline, Error, Mutex, MutexAttr, MutexKind, Value, create, join};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_contended_counter() {
    init_logger();

    static LOCK: Mutex = Mutex::new();
    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            create(None, || {
                for _ in 0..1000 {
                    LOCK.lock().unwrap();
                    // Deliberately not a read-modify-write
                    let seen = COUNTER.load(Ordering::Relaxed);
                    px_exec::sched::yield_now();
                    COUNTER.store(seen + 1, Ordering::Relaxed);
                    LOCK.unlock().unwrap();
                }
                Value::NULL
            })
            .unwrap()
        })
        .collect();

    for handle in handles {
        join(handle).unwrap();
    }

    assert_eq!(COUNTER.load(Ordering::Relaxed), 4000);
}

#[test]
fn test_error_check_rules() {
    init_logger();

    let mut attr = MutexAttr::new();
    attr.set_kind(MutexKind::ErrorCheck);
    let mutex = Arc::new(Mutex::new());
    mutex.init(Some(&attr)).unwrap();
    assert_eq!(mutex.kind(), MutexKind::ErrorCheck);
    assert_eq!(mutex.init(None), Err(Error::Busy));

    mutex.lock().unwrap();
    assert_eq!(mutex.lock(), Err(Error::Deadlock));
    assert_eq!(mutex.try_lock(), Err(Error::Busy));

    let other = Arc::clone(&mutex);
    let handle = create(None, move || {
        let unlocked = other.unlock() == Err(Error::NotOwner);
        let busy = other.try_lock() == Err(Error::Busy);
        Value::new(usize::from(unlocked && busy))
    })
    .unwrap();
    assert_eq!(join(handle).unwrap().value(), Some(Value::new(1)));

    mutex.unlock().unwrap();
    assert_eq!(mutex.unlock(), Err(Error::NotOwner));
}

#[test]
fn test_recursive_nesting() {
    init_logger();

    let mutex = Arc::new(Mutex::with_kind(MutexKind::Recursive));
    mutex.lock().unwrap();
    mutex.lock().unwrap();
    mutex.try_lock().unwrap();

    mutex.unlock().unwrap();
    mutex.unlock().unwrap();
    assert!(mutex.is_locked_by_current());

    let other = Arc::clone(&mutex);
    let handle = create(None, move || {
        Value::new(usize::from(other.try_lock() == Err(Error::Busy)))
    })
    .unwrap();
    assert_eq!(join(handle).unwrap().value(), Some(Value::new(1)));

    mutex.unlock().unwrap();
    assert!(!mutex.is_locked_by_current());
    assert_eq!(mutex.unlock(), Err(Error::NotOwner));
}

#[test]
fn test_timed_lock() {
    init_logger();

    let mutex = Arc::new(Mutex::new());
    let held = Arc::new(AtomicUsize::new(0));

    let (other, flag) = (Arc::clone(&mutex), Arc::clone(&held));
    let holder = create(None, move || {
        other.lock().unwrap();
        flag.store(1, Ordering::Release);
        while flag.load(Ordering::Acquire) != 2 {
            px_exec::sched::yield_now();
        }
        other.unlock().unwrap();
        Value::NULL
    })
    .unwrap();

    while held.load(Ordering::Acquire) != 1 {
        px_exec::sched::yield_now();
    }

    let start = Instant::now();
    assert_eq!(
        mutex.timed_lock(Duration::from_millis(30)),
        Err(Error::TimedOut)
    );
    assert!(start.elapsed() >= Duration::from_millis(25));

    // A deadline in the past still takes a free lock, and fails fast otherwise
    assert_eq!(
        mutex.timed_lock(Deadline::Relative(Duration::ZERO)),
        Err(Error::TimedOut)
    );

    held.store(2, Ordering::Release);
    mutex.timed_lock(Deadline::after(Duration::from_secs(5))).unwrap();
    mutex.unlock().unwrap();
    join(holder).unwrap();

    mutex.timed_lock(Deadline::Relative(Duration::ZERO)).unwrap();
    mutex.unlock().unwrap();
}

#[test]
fn test_destroy() {
    init_logger();

    let mutex = Mutex::new();
    mutex.lock().unwrap();
    assert_eq!(mutex.destroy(), Err(Error::Busy));
    mutex.unlock().unwrap();

    mutex.destroy().unwrap();
    assert_eq!(mutex.lock(), Err(Error::InvalidArgument));
    assert_eq!(mutex.destroy(), Err(Error::InvalidArgument));

    mutex.init(None).unwrap();
    mutex.lock().unwrap();
    mutex.unlock().unwrap();
}

#[test]
fn test_normal_self_relock_times_out() {
    init_logger();

    let mutex = Mutex::new();
    mutex.lock().unwrap();
    assert_eq!(mutex.try_lock(), Err(Error::Busy));

    let start = Instant::now();
    assert_eq!(
        mutex.timed_lock(Duration::from_millis(20)),
        Err(Error::TimedOut)
    );
    assert!(start.elapsed() >= Duration::from_millis(15));

    // Still held once
    mutex.unlock().unwrap();
    assert_eq!(mutex.unlock(), Err(Error::NotOwner));
}
