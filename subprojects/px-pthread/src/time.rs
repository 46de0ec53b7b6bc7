//! Timeouts for timed operations

use std::time::{Duration, Instant, SystemTime};

/// When a timed operation gives up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    /// A point on the wall clock.
    Absolute(SystemTime),
    /// A span measured from the start of the operation.
    Relative(Duration),
}

impl Deadline {
    /// Deadline `duration` from now, on the wall clock.
    pub fn after(duration: Duration) -> Self {
        match SystemTime::now().checked_add(duration) {
            Some(at) => Deadline::Absolute(at),
            None => Deadline::Relative(duration),
        }
    }

    /// Time left until the deadline, zero if it has passed.
    pub fn remaining(&self) -> Duration {
        match self {
            Deadline::Absolute(at) => at
                .duration_since(SystemTime::now())
                .unwrap_or(Duration::ZERO),
            Deadline::Relative(span) => *span,
        }
    }

    /// Converts the deadline to a monotonic instant, `None` if it lies beyond
    /// the clock's range.
    pub(crate) fn to_instant(self) -> Option<Instant> {
        Instant::now().checked_add(self.remaining())
    }
}

impl From<SystemTime> for Deadline {
    fn from(at: SystemTime) -> Self {
        Deadline::Absolute(at)
    }
}

impl From<Duration> for Deadline {
    fn from(span: Duration) -> Self {
        Deadline::Relative(span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_past_absolute_deadline_has_nothing_left() {
        let past = SystemTime::now() - Duration::from_secs(5);
        assert_eq!(Deadline::Absolute(past).remaining(), Duration::ZERO);
    }

    #[test]
    fn test_relative_deadline_is_constant() {
        let deadline = Deadline::Relative(Duration::from_millis(250));
        assert_eq!(deadline.remaining(), Duration::from_millis(250));
    }

    #[test]
    fn test_after_counts_down() {
        let deadline = Deadline::after(Duration::from_secs(60));
        let left = deadline.remaining();
        assert!(left <= Duration::from_secs(60));
        assert!(left > Duration::from_secs(50));
    }
}
