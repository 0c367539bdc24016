//! Cooperative thread interruption.
//!
//! Any thread can be asked to abandon a blocking lock acquisition. An
//! [`Interrupter`] is a handle to one thread's interrupt flag: calling
//! [`Interrupter::interrupt`] sets the flag and wakes the thread if it is
//! parked waiting for a lock.
//!
//! What happens next depends on how the thread is waiting:
//!
//! - Interruptible acquisitions ([`ReadLock::lock_interruptibly`],
//!   [`ReadLock::try_lock_for`], [`ReadLock::scoped`], [`ReadLock::upgrade`]
//!   and their [`WriteLock`] counterparts) clear the flag, leave the lock
//!   exactly as they found it, and return [`LockError::Interrupted`].
//! - [`ReadLock::try_lock`] and [`WriteLock::try_lock`] report an interrupt
//!   observed while contended as a failed attempt, and set the flag again.
//! - [`ReadLock::lock`] and [`WriteLock::lock`] keep waiting. The interrupt is
//!   set again once the lock has been acquired, so the caller can still
//!   observe it with [`is_interrupted`] or [`interrupted`].
//!
//! An interrupt is only observed while a thread actually waits. Acquiring an
//! uncontended lock succeeds even when the flag is set, and leaves it set.
//!
//! # Examples
//!
//! ```
//! use std::{sync::mpsc, thread};
//! use upgrade_lock::{interrupt::Interrupter, LockError, UpgradeLock};
//!
//! let lock = UpgradeLock::new();
//! let write = lock.write_lock().clone();
//! let read = lock.read_lock().clone();
//!
//! write.lock();
//!
//! let (tx, rx) = mpsc::channel();
//! let reader = thread::spawn(move || {
//!     tx.send(Interrupter::current()).unwrap();
//!     read.lock_interruptibly()
//! });
//!
//! rx.recv().unwrap().interrupt();
//! assert_eq!(reader.join().unwrap(), Err(LockError::Interrupted));
//!
//! write.unlock()?;
//! # Ok::<(), LockError>(())
//! ```
//!
//! [`ReadLock::lock_interruptibly`]: crate::ReadLock::lock_interruptibly
//! [`ReadLock::try_lock_for`]: crate::ReadLock::try_lock_for
//! [`ReadLock::scoped`]: crate::ReadLock::scoped
//! [`ReadLock::upgrade`]: crate::ReadLock::upgrade
//! [`ReadLock::try_lock`]: crate::ReadLock::try_lock
//! [`ReadLock::lock`]: crate::ReadLock::lock
//! [`WriteLock`]: crate::WriteLock
//! [`WriteLock::try_lock`]: crate::WriteLock::try_lock
//! [`WriteLock::lock`]: crate::WriteLock::lock
//! [`LockError::Interrupted`]: crate::LockError::Interrupted
use crate::{
    loom::sync::Arc,
    thread::{self, Context},
};
use core::fmt;

/// A handle that interrupts one particular thread.
///
/// `Interrupter`s are cheap to clone and may be sent to any other thread.
#[derive(Clone)]
pub struct Interrupter {
    cx: Arc<Context>,
}

impl Interrupter {
    /// Returns an `Interrupter` for the calling thread.
    #[must_use]
    pub fn current() -> Self {
        Self {
            cx: thread::current(),
        }
    }

    /// Interrupts the target thread.
    ///
    /// If the thread is parked waiting for a lock, it is woken. Otherwise, the
    /// interrupt stays pending until the thread next waits, or until it clears
    /// it with [`interrupted`].
    pub fn interrupt(&self) {
        debug!(thread.id = %self.cx.id(), "Interrupter::interrupt");
        self.cx.interrupt();
    }

    /// Returns `true` if the target thread has a pending interrupt.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.cx.is_interrupted()
    }
}

impl fmt::Debug for Interrupter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interrupter")
            .field("thread", &self.cx)
            .finish()
    }
}

/// Returns `true` if the calling thread had a pending interrupt, and clears
/// it.
pub fn interrupted() -> bool {
    thread::current().take_interrupt()
}

/// Returns `true` if the calling thread has a pending interrupt, without
/// clearing it.
#[must_use]
pub fn is_interrupted() -> bool {
    thread::current().is_interrupted()
}
