use px_exec::task;

use crate::{
    config::MIN_STACK_SIZE,
    error::{Error, Result},
    runtime,
};

/// Whether a new thread can be joined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DetachState {
    /// The thread's slot is kept until it is joined.
    #[default]
    Joinable,
    /// The thread releases its own slot when it exits.
    Detached,
}

/// Scheduling parameters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedParam {
    pub priority: i32,
}

impl SchedParam {
    /// Checks that the priority is representable by the host.
    pub(crate) fn host_priority(self) -> Result<i8> {
        i8::try_from(self.priority).map_err(|_| Error::InvalidArgument)
    }
}

/// Thread creation attributes
///
/// A fresh attribute object inherits the calling thread's priority and stack
/// size. Threads the library did not start use the configured default stack
/// size instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadAttr {
    detach_state: DetachState,
    stack_size: usize,
    stack_addr: Option<usize>,
    sched_param: SchedParam,
}

impl ThreadAttr {
    pub fn new() -> Self {
        let me = task::current();
        let stack_size = if me.is_adopted() {
            runtime::get().config.default_stack_size
        } else {
            me.stack_size()
        };

        Self {
            detach_state: DetachState::Joinable,
            stack_size,
            stack_addr: None,
            sched_param: SchedParam {
                priority: i32::from(me.priority()),
            },
        }
    }

    pub fn detach_state(&self) -> DetachState {
        self.detach_state
    }

    pub fn set_detach_state(&mut self, state: DetachState) -> &mut Self {
        self.detach_state = state;
        self
    }

    pub fn stack_size(&self) -> usize {
        self.stack_size
    }

    /// Sets the stack size of the new thread.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] below [`MIN_STACK_SIZE`].
    pub fn set_stack_size(&mut self, size: usize) -> Result<&mut Self> {
        if size < MIN_STACK_SIZE {
            return Err(Error::InvalidArgument);
        }
        self.stack_size = size;
        Ok(self)
    }

    /// Returns the caller-supplied stack region, if any.
    pub fn stack(&self) -> Option<(usize, usize)> {
        self.stack_addr.map(|addr| (addr, self.stack_size))
    }

    /// Supplies a stack region for the new thread.
    ///
    /// The region only sizes the thread's native stack; the host allocates the
    /// stack memory itself.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for a null address or a region below
    /// [`MIN_STACK_SIZE`].
    pub fn set_stack(&mut self, addr: usize, size: usize) -> Result<&mut Self> {
        if addr == 0 || size < MIN_STACK_SIZE {
            return Err(Error::InvalidArgument);
        }
        self.stack_addr = Some(addr);
        self.stack_size = size;
        Ok(self)
    }

    pub fn sched_param(&self) -> SchedParam {
        self.sched_param
    }

    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for a priority the host cannot
    /// represent.
    pub fn set_sched_param(&mut self, param: SchedParam) -> Result<&mut Self> {
        param.host_priority()?;
        self.sched_param = param;
        Ok(self)
    }
}

impl Default for ThreadAttr {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_size_minimum() {
        let mut attr = ThreadAttr::new();
        assert_eq!(attr.set_stack_size(1024).err(), Some(Error::InvalidArgument));
        assert!(attr.set_stack_size(MIN_STACK_SIZE).is_ok());
        assert_eq!(attr.stack_size(), MIN_STACK_SIZE);
    }

    #[test]
    fn test_set_stack_rejects_null() {
        let mut attr = ThreadAttr::new();
        assert_eq!(
            attr.set_stack(0, 1 << 20).err(),
            Some(Error::InvalidArgument)
        );
        assert!(attr.stack().is_none());

        attr.set_stack(0x1000, 1 << 20).unwrap();
        assert_eq!(attr.stack(), Some((0x1000, 1 << 20)));
    }

    #[test]
    fn test_sched_param_range() {
        let mut attr = ThreadAttr::new();
        let err = attr.set_sched_param(SchedParam { priority: 1000 }).err();
        assert_eq!(err, Some(Error::InvalidArgument));
        assert!(attr.set_sched_param(SchedParam { priority: -5 }).is_ok());
        assert_eq!(attr.sched_param().priority, -5);
    }
}
