//! Tasks
//!
//! A task is the executive's unit of execution. Every task is backed by one OS
//! thread. Threads that were not started through [`spawn`] are adopted the first
//! time they call [`current`], and are flagged dead when the OS thread exits.

use std::{
    cell::OnceCell,
    fmt,
    marker::PhantomData,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicI8, AtomicU32, AtomicU64, Ordering},
    },
    thread,
};

use parking_lot::{Condvar, Mutex};

use crate::signal::{SignalBit, SignalSet, USER_SIGNAL_MASK};

/// Native stack size recorded for adopted tasks and used when a spawn request
/// does not name one.
pub const DEFAULT_STACK_SIZE: usize = 2 * 1024 * 1024;

/// Lowest task priority.
pub const PRIORITY_MIN: i8 = i8::MIN;

/// Highest task priority.
pub const PRIORITY_MAX: i8 = i8::MAX;

/// Shared reference to a task.
pub type TaskRef = Arc<Task>;

/// Exception handler callback.
///
/// Receives the subset of the exception mask that triggered it.
pub type ExceptionHandler = Arc<dyn Fn(SignalSet) + Send + Sync>;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: OnceCell<CurrentTask> = const { OnceCell::new() };
}

/// Unique task identifier
///
/// Identifiers are never reused during the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw identifier value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Parameters of a task to be spawned
#[derive(Debug, Clone)]
pub struct TaskSpec {
    /// Task name, also used as the native thread name
    pub name: String,
    /// Initial priority
    pub priority: i8,
    /// Native stack size, `None` for the executive default
    pub stack_size: Option<usize>,
}

impl TaskSpec {
    /// Creates a task description with default priority and stack size.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            stack_size: None,
        }
    }

    /// Sets the initial priority.
    pub fn priority(mut self, priority: i8) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the native stack size.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }
}

struct SignalState {
    received: SignalSet,
    allocated: u32,
}

struct Exception {
    mask: SignalSet,
    handler: ExceptionHandler,
}

/// Task control block
pub struct Task {
    id: TaskId,
    name: Mutex<String>,
    priority: AtomicI8,
    stack_size: usize,
    adopted: bool,
    alive: AtomicBool,
    signals: Mutex<SignalState>,
    wakeup: Condvar,
    exception: Mutex<Option<Exception>>,
    exception_hold: AtomicU32,
}

impl Task {
    fn new(name: String, priority: i8, stack_size: usize, adopted: bool) -> Self {
        Self {
            id: TaskId::next(),
            name: Mutex::new(name),
            priority: AtomicI8::new(priority),
            stack_size,
            adopted,
            alive: AtomicBool::new(true),
            signals: Mutex::new(SignalState {
                received: SignalSet::empty(),
                allocated: 0,
            }),
            wakeup: Condvar::new(),
            exception: Mutex::new(None),
            exception_hold: AtomicU32::new(0),
        }
    }

    fn adopt() -> TaskRef {
        let native = thread::current();
        let task = Self::new(String::new(), 0, DEFAULT_STACK_SIZE, true);
        match native.name() {
            Some(name) => task.set_name(name),
            None => task.set_name(&format!("adopted {}", task.id)),
        }

        log::trace!("adopting native thread {:?} as {}", native.id(), task.id);

        Arc::new(task)
    }

    /// Returns the task identifier.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Returns a copy of the task name.
    pub fn name(&self) -> String {
        self.name.lock().clone()
    }

    /// Replaces the task name.
    ///
    /// The native thread name is fixed at spawn time and is not updated.
    pub fn set_name(&self, name: &str) {
        let mut current = self.name.lock();
        current.clear();
        current.push_str(name);
    }

    /// Returns the task priority.
    pub fn priority(&self) -> i8 {
        self.priority.load(Ordering::Relaxed)
    }

    /// Sets the task priority and returns the previous one.
    ///
    /// Priorities are bookkeeping only: the host scheduler does not expose
    /// per-thread priorities, so runnable tasks are scheduled by the OS.
    pub fn set_priority(&self, priority: i8) -> i8 {
        self.priority.swap(priority, Ordering::Relaxed)
    }

    /// Returns the native stack size of the task.
    pub fn stack_size(&self) -> usize {
        self.stack_size
    }

    /// Returns `true` until the backing OS thread has exited.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Returns `true` if the task was adopted rather than spawned.
    pub fn is_adopted(&self) -> bool {
        self.adopted
    }

    /// Raises `set` on this task, waking it if it waits on any of the bits.
    pub fn signal(&self, set: SignalSet) {
        let mut state = self.signals.lock();
        state.received.insert(set);
        self.wakeup.notify_all();
    }

    /// Installs an exception handler for the signal bits in `mask`.
    ///
    /// Any previously installed handler is replaced. The handler runs on this
    /// task at its next executive entry point after a masked bit arrives, and
    /// consumes the bits that triggered it.
    pub fn set_exception(&self, mask: SignalSet, handler: ExceptionHandler) {
        *self.exception.lock() = Some(Exception { mask, handler });

        // Re-evaluate a wait that may already be parked on pending bits
        let _state = self.signals.lock();
        self.wakeup.notify_all();
    }

    /// Removes the exception handler, if any.
    pub fn clear_exception(&self) {
        *self.exception.lock() = None;
    }

    pub(crate) fn alloc_signal(&self) -> Option<SignalBit> {
        let mut state = self.signals.lock();

        let free = !state.allocated & USER_SIGNAL_MASK;
        if free == 0 {
            return None;
        }

        let number = free.trailing_zeros() as u8;
        let bit = SignalBit::from_number(number);

        state.allocated |= 1 << number;
        state.received.remove(bit.mask());

        Some(bit)
    }

    pub(crate) fn free_signal(&self, bit: SignalBit) {
        let mut state = self.signals.lock();
        state.allocated &= !(1 << bit.number());
        state.received.remove(bit.mask());
    }

    pub(crate) fn set_signals(&self, new: SignalSet, mask: SignalSet) -> SignalSet {
        let mut state = self.signals.lock();
        let old = state.received;
        state.received = (old & !mask) | (new & mask);
        old
    }

    /// Blocks the calling task until a bit in `mask` is raised.
    ///
    /// Must only be called by the task itself. With `exceptions` set, pending
    /// exceptions are delivered before and while waiting.
    pub(crate) fn wait_signals(&self, mask: SignalSet, exceptions: bool) -> SignalSet {
        loop {
            if exceptions {
                self.poll_exceptions();
            }

            let mut state = self.signals.lock();
            loop {
                if exceptions && self.exception_due(state.received) {
                    break;
                }

                let fired = state.received & mask;
                if !fired.is_empty() {
                    state.received.remove(fired);
                    return fired;
                }

                self.wakeup.wait(&mut state);
            }
        }
    }

    /// Runs the exception handler if one of its bits is pending and exceptions
    /// are not held.
    ///
    /// Must only be called by the task itself, with no executive lock held: the
    /// handler is allowed to unwind.
    pub(crate) fn poll_exceptions(&self) {
        if self.exception_hold.load(Ordering::Relaxed) > 0 {
            return;
        }

        let Some((mask, handler)) = self
            .exception
            .lock()
            .as_ref()
            .map(|exc| (exc.mask, Arc::clone(&exc.handler)))
        else {
            return;
        };

        let fired = {
            let mut state = self.signals.lock();
            let fired = state.received & mask;
            state.received.remove(fired);
            fired
        };

        if !fired.is_empty() {
            handler(fired);
        }
    }

    fn exception_due(&self, received: SignalSet) -> bool {
        if self.exception_hold.load(Ordering::Relaxed) > 0 {
            return false;
        }

        self.exception
            .lock()
            .as_ref()
            .is_some_and(|exc| received.intersects(exc.mask))
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &*self.name.lock())
            .field("priority", &self.priority())
            .field("adopted", &self.adopted)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

/// Owner of the thread-local task reference.
///
/// Dropped when the OS thread exits, which marks the task dead.
struct CurrentTask(TaskRef);

impl Drop for CurrentTask {
    fn drop(&mut self) {
        self.0.alive.store(false, Ordering::Release);
    }
}

/// Returns the calling task, adopting the OS thread if needed.
pub fn current() -> TaskRef {
    CURRENT.with(|cell| Arc::clone(&cell.get_or_init(|| CurrentTask(Task::adopt())).0))
}

/// Returns the calling task's identifier.
pub fn current_id() -> TaskId {
    CURRENT.with(|cell| cell.get_or_init(|| CurrentTask(Task::adopt())).0.id)
}

/// Starts a new task running `entry`.
///
/// # Errors
///
/// Returns [`SpawnError::InvalidName`] if the name contains a NUL byte, and
/// [`SpawnError::Os`] if the OS refuses to start a thread.
pub fn spawn<F>(spec: TaskSpec, entry: F) -> Result<TaskRef, SpawnError>
where
    F: FnOnce() + Send + 'static,
{
    if spec.name.contains('\0') {
        return Err(SpawnError::InvalidName);
    }

    let stack_size = spec.stack_size.unwrap_or(DEFAULT_STACK_SIZE);
    let task = Arc::new(Task::new(spec.name.clone(), spec.priority, stack_size, false));

    let child = Arc::clone(&task);
    thread::Builder::new()
        .name(spec.name)
        .stack_size(stack_size)
        .spawn(move || {
            CURRENT.with(|cell| {
                let _ = cell.set(CurrentTask(child));
            });
            entry();
        })
        .map_err(SpawnError::Os)?;

    log::trace!("spawned {}", task.id);

    Ok(task)
}

/// Defers exception delivery on the current task until the returned guard is
/// dropped.
///
/// Holds nest. Bits that arrive while held stay pending and are delivered at
/// the next entry point after the last hold is released.
pub fn hold_exceptions() -> ExceptionHold {
    let task = current();
    task.exception_hold.fetch_add(1, Ordering::Relaxed);
    ExceptionHold {
        task,
        _marker: PhantomData,
    }
}

/// Guard returned by [`hold_exceptions`].
#[must_use = "if unused exceptions are released immediately"]
pub struct ExceptionHold {
    task: TaskRef,
    _marker: PhantomData<*const ()>,
}

impl Drop for ExceptionHold {
    fn drop(&mut self) {
        self.task.exception_hold.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Error returned by [`spawn`]
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    /// The task name contains an interior NUL byte.
    #[error("task name contains an interior NUL byte")]
    InvalidName,
    /// The OS refused to start the backing thread.
    #[error("failed to start native thread: {0}")]
    Os(std::io::Error),
}
