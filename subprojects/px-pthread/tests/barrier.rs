use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread::sleep,
    time::Duration,
};

use px_pthread::{Barrier, Error, Value, create, join};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_one_serial_thread_per_round() {
    init_logger();

    const PARTIES: u32 = 4;
    const ROUNDS: usize = 3;

    let barrier = Arc::new(Barrier::new(PARTIES).unwrap());
    let serial = Arc::new(AtomicUsize::new(0));
    let arrived = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..PARTIES)
        .map(|_| {
            let (barrier, serial, arrived) =
                (Arc::clone(&barrier), Arc::clone(&serial), Arc::clone(&arrived));
            create(None, move || {
                let mut ok = true;
                for round in 0..ROUNDS {
                    arrived.fetch_add(1, Ordering::AcqRel);
                    if barrier.wait().unwrap().is_serial() {
                        serial.fetch_add(1, Ordering::AcqRel);
                    }
                    // Nobody leaves a round before everyone entered it
                    ok &= arrived.load(Ordering::Acquire) >= (round + 1) * PARTIES as usize;
                }
                Value::new(usize::from(ok))
            })
            .unwrap()
        })
        .collect();

    for handle in handles {
        assert_eq!(join(handle).unwrap().value(), Some(Value::new(1)));
    }
    assert_eq!(serial.load(Ordering::Acquire), ROUNDS);
    barrier.destroy().unwrap();
}

#[test]
fn test_single_party_is_always_serial() {
    init_logger();

    let barrier = Barrier::new(1).unwrap();
    assert!(barrier.wait().unwrap().is_serial());
    assert!(barrier.wait().unwrap().is_serial());
}

#[test]
fn test_zero_parties_rejected() {
    init_logger();

    assert!(matches!(Barrier::new(0), Err(Error::InvalidArgument)));
}

#[test]
fn test_destroy_mid_cycle_is_busy() {
    init_logger();

    let barrier = Arc::new(Barrier::new(2).unwrap());
    let entering = Arc::new(AtomicUsize::new(0));

    let (other, flag) = (Arc::clone(&barrier), Arc::clone(&entering));
    let handle = create(None, move || {
        flag.store(1, Ordering::Release);
        other.wait().unwrap();
        Value::NULL
    })
    .unwrap();

    while entering.load(Ordering::Acquire) == 0 {
        px_exec::sched::yield_now();
    }
    sleep(Duration::from_millis(20));
    assert_eq!(barrier.destroy(), Err(Error::Busy));

    barrier.wait().unwrap();
    join(handle).unwrap();

    barrier.destroy().unwrap();
    assert_eq!(barrier.wait(), Err(Error::InvalidArgument));
}
