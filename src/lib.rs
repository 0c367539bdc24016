#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg, doc_cfg_hide))]
#![cfg_attr(docsrs, doc(cfg_hide(docsrs, loom)))]
#![warn(missing_docs, missing_debug_implementations)]

pub(crate) mod loom;

#[macro_use]
pub(crate) mod util;

mod deadline;
mod error;
pub mod interrupt;
mod raw;
mod read;
mod thread;
mod wait_queue;
mod write;

#[doc(inline)]
pub use self::error::{Access, LockError, Result};
#[doc(inline)]
pub use self::read::{ReadGuard, ReadLock};
#[doc(inline)]
pub use self::write::{WriteGuard, WriteLock};

use self::raw::RawUpgradeLock;
use crate::loom::sync::Arc;
use core::fmt;

/// A reentrant [readers-writer lock] whose read side can be upgraded to the
/// write side, and whose write side can be downgraded back to the read side,
/// without the calling thread ever holding neither.
///
/// An `UpgradeLock` owns two cached handles, a [`ReadLock`] and a
/// [`WriteLock`], which share one lock core. The core tracks every grant per
/// calling thread, so the handles themselves carry no state: they may be
/// cloned and sent to other threads freely, and any thread may use them.
///
/// # Reentrancy
///
/// A thread may acquire the read lock and the write lock any number of times,
/// in any order, and must release each acquisition once. While a thread holds
/// the write lock it also counts as a reader, which is what makes
/// [downgrading](WriteLock::downgrade) possible.
///
/// # Upgrading
///
/// A reader [upgrades](ReadLock::upgrade) by acquiring the write lock while
/// still holding its read grant. The upgrade waits until every *other* reader
/// has released. A pending upgrade takes priority over writers that hold no
/// read grant of their own, but two threads that both hold read grants and
/// both try to upgrade without a timeout will wait on each other forever; use
/// [`ReadLock::try_upgrade_for`] when that can happen.
///
/// # Fairness
///
/// Waiting threads are woken in roughly the order they started waiting, but
/// admission is decided by a compare-and-swap race, so this is *not* a fair
/// lock.
///
/// # Examples
///
/// ```
/// use upgrade_lock::UpgradeLock;
///
/// let lock = UpgradeLock::new();
/// let read = lock.read_lock();
///
/// let reading = read.scoped()?;
/// {
///     let _writing = reading.upgrade()?;
///     assert!(lock.is_write_locked_by_current_thread());
/// } // dropping the write guard downgrades back to reading.
///
/// assert_eq!(lock.read_hold_count(), 1);
/// drop(reading);
/// assert_eq!(lock.reader_count(), 0);
/// # Ok::<(), upgrade_lock::LockError>(())
/// ```
///
/// [readers-writer lock]: https://en.wikipedia.org/wiki/Readers%E2%80%93writer_lock
pub struct UpgradeLock {
    read: ReadLock,
    write: WriteLock,
}

/// A condition variable bound to an [`UpgradeLock`].
///
/// Condition variables are not supported, so no value of this type can ever
/// exist. [`ReadLock::new_condition`] and [`WriteLock::new_condition`] always
/// return [`LockError::Unsupported`].
#[derive(Debug)]
pub enum Condition {}

// === impl UpgradeLock ===

impl UpgradeLock {
    /// Returns a new, unlocked `UpgradeLock`.
    #[must_use]
    pub fn new() -> Self {
        let raw = Arc::new(RawUpgradeLock::new());
        Self {
            read: ReadLock::new(raw.clone()),
            write: WriteLock::new(raw),
        }
    }

    /// Returns this lock's read handle.
    #[inline]
    #[must_use]
    pub fn read_lock(&self) -> &ReadLock {
        &self.read
    }

    /// Returns this lock's write handle.
    #[inline]
    #[must_use]
    pub fn write_lock(&self) -> &WriteLock {
        &self.write
    }

    /// Returns the total number of read grants currently held, across all
    /// threads.
    ///
    /// A thread holding the write lock counts one read grant per write
    /// acquisition.
    ///
    /// # Note
    ///
    /// This method is not synchronized with attempts to change the reader
    /// count, and its value may become out of date as soon as it is read. This
    /// is **not** intended to be used for synchronization purposes! It is
    /// intended only for debugging purposes or for use as a heuristic.
    #[inline]
    #[must_use]
    pub fn reader_count(&self) -> usize {
        self.raw().reader_count()
    }

    /// Returns `true` if some thread currently owns the admission gate.
    ///
    /// This is normally the thread holding the write lock, but a reader also
    /// owns the gate for a moment while it registers itself.
    ///
    /// # Note
    ///
    /// This method is not synchronized and its value may become out of date as
    /// soon as it is read. It is intended only for debugging purposes or for
    /// use as a heuristic.
    ///
    /// Since a registering reader briefly owns the gate, a `true` result does
    /// not mean the lock is write-locked, and must not be used as a check for
    /// that. To ask whether the calling thread writes, use
    /// [`is_write_locked_by_current_thread`](Self::is_write_locked_by_current_thread).
    #[inline]
    #[must_use]
    pub fn has_writer(&self) -> bool {
        self.raw().has_writer()
    }

    /// Returns `true` if the calling thread holds the write lock.
    #[inline]
    #[must_use]
    pub fn is_write_locked_by_current_thread(&self) -> bool {
        self.raw().write_hold_count() > 0
    }

    /// Returns the number of read grants held by the calling thread.
    #[inline]
    #[must_use]
    pub fn read_hold_count(&self) -> usize {
        self.raw().read_hold_count()
    }

    /// Returns the number of write grants held by the calling thread.
    #[inline]
    #[must_use]
    pub fn write_hold_count(&self) -> usize {
        self.raw().write_hold_count()
    }

    fn raw(&self) -> &RawUpgradeLock {
        self.read.raw()
    }
}

impl Default for UpgradeLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UpgradeLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpgradeLock")
            .field("raw", self.raw())
            .finish()
    }
}
