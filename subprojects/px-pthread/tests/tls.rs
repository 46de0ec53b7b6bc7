use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use px_pthread::{
    Error, Key, Value, create, get_specific, join, key_create, key_create_with, key_delete,
    set_specific,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_values_are_per_thread() {
    init_logger();

    let key = key_create().unwrap();
    assert_eq!(get_specific(key), Value::NULL);

    set_specific(key, Value::new(0xA)).unwrap();
    assert_eq!(get_specific(key), Value::new(0xA));

    let handle = create(None, move || {
        let unset = get_specific(key).is_null();
        set_specific(key, Value::new(0xB)).unwrap();
        let own = get_specific(key) == Value::new(0xB);
        Value::new(usize::from(unset && own))
    })
    .unwrap();
    assert_eq!(join(handle).unwrap().value(), Some(Value::new(1)));

    assert_eq!(get_specific(key), Value::new(0xA));
    key_delete(key).unwrap();
}

#[test]
fn test_destructor_runs_at_exit() {
    init_logger();

    let seen = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&seen);
    let key = key_create_with(move |value| {
        sink.fetch_add(value.get(), Ordering::AcqRel);
    })
    .unwrap();

    let handle = create(None, move || {
        set_specific(key, Value::new(40)).unwrap();
        Value::NULL
    })
    .unwrap();
    join(handle).unwrap();

    // Null values are skipped
    let handle = create(None, move || {
        set_specific(key, Value::NULL).unwrap();
        Value::NULL
    })
    .unwrap();
    join(handle).unwrap();

    assert_eq!(seen.load(Ordering::Acquire), 40);
    key_delete(key).unwrap();
}

#[test]
fn test_destructor_passes_are_bounded() {
    init_logger();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let key = Arc::new(parking_lot::Mutex::new(None::<Key>));
    let slot = Arc::clone(&key);
    let created = key_create_with(move |value| {
        counter.fetch_add(1, Ordering::AcqRel);
        if let Some(key) = *slot.lock() {
            let _ = set_specific(key, value);
        }
    })
    .unwrap();
    *key.lock() = Some(created);

    let handle = create(None, move || {
        set_specific(created, Value::new(1)).unwrap();
        Value::NULL
    })
    .unwrap();
    join(handle).unwrap();

    assert_eq!(
        calls.load(Ordering::Acquire),
        px_pthread::Config::default().destructor_iterations
    );
    key_delete(created).unwrap();
}

#[test]
fn test_deleted_key_values_are_inert() {
    init_logger();

    let key = key_create().unwrap();
    set_specific(key, Value::new(7)).unwrap();
    key_delete(key).unwrap();

    assert_eq!(get_specific(key), Value::NULL);
    assert_eq!(set_specific(key, Value::new(8)), Err(Error::InvalidArgument));
    assert_eq!(key_delete(key), Err(Error::InvalidArgument));

    let fresh = key_create().unwrap();
    assert_ne!(fresh, key);
    assert_eq!(get_specific(fresh), Value::NULL);
    key_delete(fresh).unwrap();
}

#[test]
fn test_exit_from_destructor_keeps_status() {
    init_logger();

    let seen = Arc::new(AtomicUsize::new(0));
    let leaving = key_create_with(|_| px_pthread::exit(Value::new(99))).unwrap();
    let sink = Arc::clone(&seen);
    let counting = key_create_with(move |value| {
        sink.fetch_add(value.get(), Ordering::AcqRel);
    })
    .unwrap();

    let handle = create(None, move || {
        set_specific(leaving, Value::new(1)).unwrap();
        set_specific(counting, Value::new(5)).unwrap();
        Value::new(3)
    })
    .unwrap();

    assert_eq!(join(handle).unwrap().value(), Some(Value::new(3)));
    assert_eq!(seen.load(Ordering::Acquire), 5);

    key_delete(leaving).unwrap();
    key_delete(counting).unwrap();
}
