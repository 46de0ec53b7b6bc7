//! Asynchronous timer requests
//!
//! A [`TimerRequest`] owns one signal bit of the task that opened it. Arming the
//! request queues it with the timer service, which raises the bit once the
//! requested time has elapsed. An armed request must be completed before it can
//! be re-armed or closed: either it fires, or it is aborted with
//! [`TimerRequest::abort`]. In both cases [`TimerRequest::wait`] drains the
//! completion and clears the bit, so a late completion can never leak into a
//! later user of the same bit.
//!
//! The service is a single background thread started on first use.

use std::{
    cmp::Ordering,
    collections::BinaryHeap,
    sync::{Arc, OnceLock},
    thread,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

use crate::{
    signal::{SignalBit, SignalSet},
    task::{self, TaskRef},
};

static SERVICE: OnceLock<Option<Arc<TimerService>>> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestState {
    Idle,
    Pending,
    /// Completed by the service or by an abort; the bit has been raised.
    Done { aborted: bool },
}

struct RequestShared {
    task: TaskRef,
    bit: SignalBit,
    state: Mutex<(RequestState, u64)>,
}

impl RequestShared {
    /// Completes the request if `generation` is still the armed one.
    ///
    /// The signal is raised under the state lock so that a waiter observing
    /// `Done` also observes the bit.
    fn complete(&self, generation: u64, aborted: bool) -> bool {
        let mut state = self.state.lock();
        if state.0 != RequestState::Pending || state.1 != generation {
            return false;
        }
        state.0 = RequestState::Done { aborted };
        self.task.signal(self.bit.mask());
        true
    }
}

struct Entry {
    due: Instant,
    generation: u64,
    request: Arc<RequestShared>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Reversed: the heap pops the earliest deadline first
    fn cmp(&self, other: &Self) -> Ordering {
        other.due.cmp(&self.due)
    }
}

struct TimerService {
    queue: Mutex<BinaryHeap<Entry>>,
    changed: Condvar,
}

impl TimerService {
    fn get() -> Result<&'static TimerService, TimerError> {
        SERVICE
            .get_or_init(|| {
                let service = Arc::new(TimerService {
                    queue: Mutex::new(BinaryHeap::new()),
                    changed: Condvar::new(),
                });

                let runner = Arc::clone(&service);
                match thread::Builder::new()
                    .name("px-exec timer".into())
                    .spawn(move || runner.run())
                {
                    Ok(_) => {
                        log::debug!("timer service started");
                        Some(service)
                    }
                    Err(err) => {
                        log::error!("failed to start the timer service: {err}");
                        None
                    }
                }
            })
            .as_deref()
            .ok_or(TimerError::Unavailable)
    }

    fn submit(&self, entry: Entry) {
        let mut queue = self.queue.lock();
        queue.push(entry);
        self.changed.notify_one();
    }

    fn run(&self) {
        let mut queue = self.queue.lock();
        loop {
            let now = Instant::now();
            match queue.peek() {
                None => self.changed.wait(&mut queue),
                Some(entry) if entry.due > now => {
                    let due = entry.due;
                    let _ = self.changed.wait_until(&mut queue, due);
                }
                Some(_) => {
                    let Some(entry) = queue.pop() else {
                        continue;
                    };
                    // Complete outside the queue lock
                    drop(queue);
                    entry.request.complete(entry.generation, false);
                    queue = self.queue.lock();
                }
            }
        }
    }
}

/// An asynchronous one-shot timer owned by the task that opened it
pub struct TimerRequest {
    shared: Arc<RequestShared>,
    service: &'static TimerService,
}

impl TimerRequest {
    /// Opens a timer request bound to a newly allocated signal bit of the
    /// current task.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::NoSignal`] when the task has no free signal bit,
    /// or [`TimerError::Unavailable`] if the timer service could not be
    /// started.
    pub fn open() -> Result<Self, TimerError> {
        let service = TimerService::get()?;
        let task = task::current();
        let bit = task.alloc_signal().ok_or(TimerError::NoSignal)?;

        Ok(Self {
            shared: Arc::new(RequestShared {
                task,
                bit,
                state: Mutex::new((RequestState::Idle, 0)),
            }),
            service,
        })
    }

    /// Returns the signal raised when the request completes.
    pub fn mask(&self) -> SignalSet {
        self.shared.bit.mask()
    }

    /// Arms the request to complete after `duration`.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::Busy`] if the request is still pending.
    pub fn arm(&mut self, duration: Duration) -> Result<(), TimerError> {
        let generation = {
            let mut state = self.shared.state.lock();
            if state.0 == RequestState::Pending {
                return Err(TimerError::Busy);
            }
            state.0 = RequestState::Pending;
            state.1 += 1;
            state.1
        };

        // A previous completion's bit must not be mistaken for this one
        self.shared
            .task
            .set_signals(SignalSet::empty(), self.shared.bit.mask());

        if duration.is_zero() {
            self.shared.complete(generation, false);
            return Ok(());
        }

        // Beyond the clock's range the request can only end by abort
        if let Some(due) = Instant::now().checked_add(duration) {
            self.service.submit(Entry {
                due,
                generation,
                request: Arc::clone(&self.shared),
            });
        }

        Ok(())
    }

    /// Returns `true` once the armed request has completed or been aborted.
    pub fn check(&self) -> bool {
        matches!(self.shared.state.lock().0, RequestState::Done { .. })
    }

    /// Returns `true` if the request completed because its time elapsed.
    pub fn expired(&self) -> bool {
        self.shared.state.lock().0 == RequestState::Done { aborted: false }
    }

    /// Aborts a pending request.
    ///
    /// The request completes immediately as aborted and its bit is raised, the
    /// same as a normal completion. Aborting a request that is not pending has
    /// no effect.
    pub fn abort(&mut self) {
        let generation = self.shared.state.lock().1;
        if self.shared.complete(generation, true) {
            log::trace!("timer request aborted");
        }
    }

    /// Waits for the armed request to complete and clears its signal bit.
    ///
    /// Returns immediately if the request is not armed.
    pub fn wait(&mut self) {
        loop {
            match self.shared.state.lock().0 {
                RequestState::Idle => return,
                RequestState::Done { .. } => break,
                RequestState::Pending => {}
            }
            self.shared.task.wait_signals(self.shared.bit.mask(), false);
        }

        self.shared
            .task
            .set_signals(SignalSet::empty(), self.shared.bit.mask());
    }
}

impl Drop for TimerRequest {
    fn drop(&mut self) {
        self.abort();
        self.wait();
        self.shared.task.free_signal(self.shared.bit);
    }
}

/// Timer request errors
#[derive(Debug, thiserror::Error)]
pub enum TimerError {
    /// The opening task has no free signal bit.
    #[error("no free signal bit for the timer request")]
    NoSignal,
    /// The request is still pending.
    #[error("timer request already pending")]
    Busy,
    /// The timer service thread could not be started.
    #[error("timer service unavailable")]
    Unavailable,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal;

    #[test]
    fn test_timer_fires() {
        let mut timer = TimerRequest::open().unwrap();
        let start = Instant::now();

        timer.arm(Duration::from_millis(30)).unwrap();
        let fired = signal::wait(timer.mask());

        assert_eq!(fired, timer.mask());
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert!(timer.check());
        assert!(timer.expired());
        timer.wait();
    }

    #[test]
    fn test_abort_completes_without_expiring() {
        let mut timer = TimerRequest::open().unwrap();
        timer.arm(Duration::from_secs(60)).unwrap();
        assert!(!timer.check());

        timer.abort();
        timer.wait();

        assert!(timer.check());
        assert!(!timer.expired());
        let pending = signal::set(SignalSet::empty(), SignalSet::empty());
        assert!(!pending.intersects(timer.mask()));
    }

    #[test]
    fn test_rearm_while_pending_is_busy() {
        let mut timer = TimerRequest::open().unwrap();
        timer.arm(Duration::from_secs(60)).unwrap();
        assert!(matches!(timer.arm(Duration::from_secs(1)), Err(TimerError::Busy)));
    }

    #[test]
    fn test_zero_duration_completes_at_once() {
        let mut timer = TimerRequest::open().unwrap();
        timer.arm(Duration::ZERO).unwrap();
        assert!(timer.expired());
        timer.wait();
    }

    #[test]
    fn test_close_frees_signal_bit() {
        let bits: Vec<_> = std::iter::from_fn(signal::alloc).collect();
        assert!(matches!(TimerRequest::open(), Err(TimerError::NoSignal)));

        let last = bits[bits.len() - 1];
        signal::free(last);
        {
            let _timer = TimerRequest::open().unwrap();
            assert!(signal::alloc().is_none());
        }
        let again = signal::alloc().unwrap();
        assert_eq!(again, last);

        signal::free(again);
        for bit in &bits[..bits.len() - 1] {
            signal::free(*bit);
        }
    }
}
