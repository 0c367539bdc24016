use core::fmt;

/// Which side of an [`UpgradeLock`](crate::UpgradeLock) an operation was
/// performed on.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Access {
    /// The shared, read side of the lock.
    Read,
    /// The exclusive, write side of the lock.
    Write,
}

/// Errors returned by [`ReadLock`](crate::ReadLock) and
/// [`WriteLock`](crate::WriteLock) operations.
///
/// Timing out is not an error: timed acquisitions report it by returning
/// `false` (or [`None`]).
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum LockError {
    /// The calling thread tried to release a grant that it does not hold.
    ///
    /// A read grant that backs a write grant held by the same thread cannot
    /// be released on its own, so this is also returned when a writer tries to
    /// release more read grants than it acquired explicitly.
    #[error("cannot release a {0} lock that is not owned by the current thread")]
    NotOwned(Access),

    /// The calling thread was [interrupted](crate::interrupt) while waiting
    /// to acquire the lock. The lock is left exactly as it was before the
    /// call.
    #[error("thread was interrupted while waiting for the lock")]
    Interrupted,

    /// The operation is not supported by this lock.
    #[error("condition variables are not supported by upgrade locks")]
    Unsupported,
}

/// The result of an [`UpgradeLock`](crate::UpgradeLock) operation.
pub type Result<T, E = LockError> = core::result::Result<T, E>;

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.pad("read"),
            Self::Write => f.pad("write"),
        }
    }
}
