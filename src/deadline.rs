use crate::loom::thread;
use std::{
    fmt,
    sync::OnceLock,
    time::{Duration, Instant},
};
use upgrade_lock_util::math::{add_with_default, saturating_nanos};

/// The instant by which a lock acquisition must have completed.
///
/// Deadlines are measured in nanoseconds on a process-wide monotonic clock.
/// A deadline that would not fit in an `i64` saturates to [`Deadline::NEVER`]
/// rather than wrapping around into the past.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) struct Deadline {
    nanos: i64,
}

impl Deadline {
    /// A deadline that never elapses.
    pub(crate) const NEVER: Self = Self { nanos: i64::MAX };

    /// Returns a deadline that has already been reached, so that an
    /// acquisition gets exactly one attempt.
    pub(crate) fn now() -> Self {
        Self { nanos: clock() }
    }

    /// Returns a deadline `timeout` from now.
    pub(crate) fn after(timeout: Duration) -> Self {
        Self::starting_at(clock(), timeout)
    }

    fn starting_at(start: i64, timeout: Duration) -> Self {
        Self {
            nanos: add_with_default(i64::MAX, &[start, saturating_nanos(timeout)]),
        }
    }

    pub(crate) fn is_never(&self) -> bool {
        self.nanos == i64::MAX
    }

    /// Returns the time left until this deadline, or [`None`] if it has
    /// elapsed.
    ///
    /// A deadline has elapsed once the clock reads a time greater than or
    /// equal to it.
    pub(crate) fn remaining(&self) -> Option<Duration> {
        self.remaining_at(clock())
    }

    fn remaining_at(&self, now: i64) -> Option<Duration> {
        if now >= self.nanos {
            return None;
        }
        Some(Duration::from_nanos(self.nanos.abs_diff(now)))
    }

    /// Parks the current thread until it is unparked or this deadline
    /// elapses.
    ///
    /// Returns `false` without parking if the deadline had already elapsed.
    /// Like any park, this may return spuriously, so callers must re-check
    /// whatever condition they are waiting for.
    pub(crate) fn park(&self) -> bool {
        if self.is_never() {
            thread::park();
            return true;
        }

        match self.remaining() {
            Some(remaining) => {
                thread::park_timeout(remaining);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Deadline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_never() {
            return f.pad("Deadline(never)");
        }
        write!(f, "Deadline({:?})", Duration::from_nanos(self.nanos.unsigned_abs()))
    }
}

/// Nanoseconds elapsed since the first time any lock read the clock.
fn clock() -> i64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = *EPOCH.get_or_init(Instant::now);
    saturating_nanos(epoch.elapsed())
}
