//! Scheduler entry points

use std::{thread, time::Duration};

use crate::{signal, task, timer::TimerRequest};

/// Gives up the rest of the current time slice.
///
/// Pending exceptions of the current task are delivered first.
pub fn yield_now() {
    task::current().poll_exceptions();
    thread::yield_now();
}

/// Suspends the current task for at least `duration`.
///
/// The delay is a signal wait on a timer request, so exceptions arriving in
/// the meantime are delivered. A task without a free signal bit falls back to
/// an uninterruptible sleep.
pub fn delay(duration: Duration) {
    let mut timer = match TimerRequest::open() {
        Ok(timer) => timer,
        Err(err) => {
            log::warn!("delay without timer request: {err}");
            task::current().poll_exceptions();
            thread::sleep(duration);
            return;
        }
    };

    if timer.arm(duration).is_err() {
        return;
    }

    // Exceptions may unwind out of the wait; the request's drop drains it
    while !timer.check() {
        signal::wait(timer.mask());
    }
    timer.wait();
}
