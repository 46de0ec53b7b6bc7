//! Mailboxes
//!
//! A [`Port`] is a FIFO of messages with at most one bound task. Putting a
//! message raises the bound task's signal mask. The binding is independent of
//! the port's creator, so the task that ends up receiving can bind itself
//! lazily right before it starts waiting.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::{signal::SignalSet, task::TaskRef};

struct PortState<T> {
    messages: VecDeque<T>,
    receiver: Option<(TaskRef, SignalSet)>,
}

/// A message port
pub struct Port<T> {
    state: Mutex<PortState<T>>,
}

impl<T> Port<T> {
    /// Creates an empty, unbound port.
    pub const fn new() -> Self {
        Self {
            state: parking_lot::const_mutex(PortState {
                messages: VecDeque::new(),
                receiver: None,
            }),
        }
    }

    /// Binds `task` as the receiver, signalled with `mask` on every put.
    ///
    /// If messages are already queued the task is signalled at once.
    pub fn bind(&self, task: TaskRef, mask: SignalSet) {
        let mut state = self.state.lock();
        if !state.messages.is_empty() {
            task.signal(mask);
        }
        state.receiver = Some((task, mask));
    }

    /// Removes the receiver binding.
    pub fn unbind(&self) {
        self.state.lock().receiver = None;
    }

    /// Queues a message and signals the bound receiver.
    pub fn put(&self, message: T) {
        let mut state = self.state.lock();
        state.messages.push_back(message);
        if let Some((task, mask)) = &state.receiver {
            task.signal(*mask);
        }
    }

    /// Removes the oldest message, if any.
    pub fn get(&self) -> Option<T> {
        self.state.lock().messages.pop_front()
    }

    /// Returns `true` if no message is queued.
    pub fn is_empty(&self) -> bool {
        self.state.lock().messages.is_empty()
    }
}

impl<T> Default for Port<T> {
    fn default() -> Self {
        Self::new()
    }
}
