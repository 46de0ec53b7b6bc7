use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use px_pthread::{Once, Value, create, join};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_many_threads_one_run() {
    init_logger();

    static ONCE: Once = Once::new();
    let runs = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let runs = Arc::clone(&runs);
            create(None, move || {
                ONCE.call_once(|| {
                    px_exec::sched::delay(std::time::Duration::from_millis(10));
                    runs.fetch_add(1, Ordering::AcqRel);
                })
                .unwrap();
                // Every caller returns after the routine finished
                Value::new(runs.load(Ordering::Acquire))
            })
            .unwrap()
        })
        .collect();

    for handle in handles {
        assert_eq!(join(handle).unwrap().value(), Some(Value::new(1)));
    }
    assert!(ONCE.is_completed());
}

#[test]
fn test_exited_routine_lets_another_thread_run_it() {
    init_logger();

    static ONCE: Once = Once::new();

    let first = create(None, || {
        ONCE.call_once(|| px_pthread::exit(Value::new(1))).unwrap();
        Value::NULL
    })
    .unwrap();
    assert_eq!(join(first).unwrap().value(), Some(Value::new(1)));
    assert!(!ONCE.is_completed());

    let runs = AtomicUsize::new(0);
    ONCE.call_once(|| {
        runs.fetch_add(1, Ordering::Relaxed);
    })
    .unwrap();
    assert_eq!(runs.load(Ordering::Relaxed), 1);
    assert!(ONCE.is_completed());
}
