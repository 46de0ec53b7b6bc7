use std::time::Duration;

use px_pthread::{Config, Error, InitError, Mutex, Value, create, init, join, shutdown};

#[test]
fn test_thread_table_exhaustion() {
    let _ = env_logger::builder().is_test(true).try_init();

    init(Config {
        max_threads: 8,
        ..Config::default()
    })
    .unwrap();
    assert!(matches!(
        init(Config::default()),
        Err(InitError::AlreadyInitialized)
    ));

    static GATE: Mutex = Mutex::new();
    GATE.lock().unwrap();

    // Slot 0 belongs to the initial thread
    let handles: Vec<_> = (1..8)
        .map(|n| {
            create(None, move || {
                GATE.lock().unwrap();
                GATE.unlock().unwrap();
                Value::new(n)
            })
            .unwrap()
        })
        .collect();

    assert_eq!(create(None, || Value::NULL), Err(Error::Again));

    GATE.unlock().unwrap();
    for (n, handle) in (1..8).zip(handles) {
        assert_eq!(join(handle).unwrap().value(), Some(Value::new(n)));
    }

    // Joined slots are reusable
    let handle = create(None, || Value::new(42)).unwrap();
    assert_eq!(join(handle).unwrap().value(), Some(Value::new(42)));

    let detached = create(None, || {
        px_exec::sched::delay(Duration::from_millis(10));
        Value::NULL
    })
    .unwrap();
    px_pthread::detach(detached).unwrap();
    create(None, || Value::NULL).unwrap();

    assert_eq!(shutdown(), 1);
}
