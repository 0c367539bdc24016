use crate::{
    deadline::Deadline,
    error::{Access, LockError, Result},
    loom::sync::Arc,
    raw::RawUpgradeLock,
    read::{release_on_drop, ReadGuard, ReadLock},
    thread, Condition,
};
use core::{fmt, marker::PhantomData, mem, time::Duration};

/// The write side of an [`UpgradeLock`](crate::UpgradeLock).
///
/// At most one thread holds the write lock at a time, and while it does, no
/// other thread holds the read lock. The writing thread may also acquire the
/// read lock, and may acquire the write lock repeatedly; each acquisition must
/// be [unlocked](Self::unlock) once.
///
/// Like [`ReadLock`], a `WriteLock` is a cloneable handle, and the grants it
/// hands out belong to the calling thread.
#[derive(Clone)]
pub struct WriteLock {
    raw: Arc<RawUpgradeLock>,
}

/// An RAII guard for a write grant, returned by [`WriteLock::scoped`] and
/// [`ReadGuard::upgrade`].
///
/// The grant is released when the guard is dropped.
///
/// # Panics
///
/// Dropping a `WriteGuard` panics (unless the thread is already panicking) if
/// its grant was already released by hand with [`WriteLock::unlock`].
#[must_use = "if unused, the write lock is released immediately"]
pub struct WriteGuard<'a> {
    raw: &'a RawUpgradeLock,
    _not_send: PhantomData<*const ()>,
}

// === impl WriteLock ===

impl WriteLock {
    pub(crate) fn new(raw: Arc<RawUpgradeLock>) -> Self {
        Self { raw }
    }

    /// Acquires the write lock, blocking the current thread until no other
    /// thread holds the read or write lock.
    ///
    /// If the current thread holds read grants, this upgrades them (see
    /// [`ReadLock::upgrade`]). An [interrupt](crate::interrupt) received while
    /// waiting does not stop the wait; it is delivered again once the lock has
    /// been acquired.
    pub fn lock(&self) {
        let acquired = self.raw.try_acquire_write(Deadline::NEVER, false);
        debug_assert_eq!(acquired, Ok(true), "an untimed, uninterruptible write lock cannot fail");
    }

    /// Acquires the write lock, blocking the current thread until it is
    /// available or the thread is [interrupted](crate::interrupt).
    ///
    /// # Errors
    ///
    /// - [`LockError::Interrupted`] if the thread was interrupted while
    ///   waiting.
    pub fn lock_interruptibly(&self) -> Result<()> {
        self.raw.try_acquire_write(Deadline::NEVER, true)?;
        Ok(())
    }

    /// Attempts to acquire the write lock without waiting.
    ///
    /// Returns `true` if the lock was acquired. An interrupt observed while the
    /// lock is contended makes the attempt fail, and is left pending.
    pub fn try_lock(&self) -> bool {
        match self.raw.try_acquire_write(Deadline::now(), true) {
            Ok(acquired) => acquired,
            Err(_) => {
                thread::current().reinterrupt();
                false
            }
        }
    }

    /// Attempts to acquire the write lock, waiting at most `timeout` for it to
    /// become available.
    ///
    /// Returns `Ok(true)` if the lock was acquired, or `Ok(false)` if the
    /// timeout elapsed first.
    ///
    /// # Errors
    ///
    /// - [`LockError::Interrupted`] if the thread was interrupted while
    ///   waiting.
    pub fn try_lock_for(&self, timeout: Duration) -> Result<bool> {
        self.raw.try_acquire_write(Deadline::after(timeout), true)
    }

    /// Releases one of the current thread's write grants.
    ///
    /// Once the last write grant is released, other threads may acquire the
    /// lock again.
    ///
    /// # Errors
    ///
    /// - [`LockError::NotOwned`]`(`[`Access::Write`]`)` if the current thread
    ///   does not hold the write lock.
    ///
    /// [`Access::Write`]: crate::Access::Write
    pub fn unlock(&self) -> Result<()> {
        self.raw.release_write()
    }

    /// Acquires the write lock like [`lock_interruptibly`], returning a guard
    /// that releases it when dropped.
    ///
    /// # Errors
    ///
    /// - [`LockError::Interrupted`] if the thread was interrupted while
    ///   waiting.
    ///
    /// [`lock_interruptibly`]: Self::lock_interruptibly
    pub fn scoped(&self) -> Result<WriteGuard<'_>> {
        self.lock_interruptibly()?;
        Ok(WriteGuard::new(&self.raw))
    }

    /// Condition variables are not supported.
    ///
    /// # Errors
    ///
    /// Always returns [`LockError::Unsupported`].
    pub fn new_condition(&self) -> Result<Condition> {
        Err(LockError::Unsupported)
    }

    /// Downgrades one of the current thread's write grants to a read grant.
    ///
    /// The read grant is acquired before the write grant is released, so the
    /// thread holds the lock throughout. Other readers are admitted as soon as
    /// the thread's last write grant is gone.
    ///
    /// The returned handle shares this lock's state, and is interchangeable
    /// with the one returned by [`UpgradeLock::read_lock`].
    ///
    /// # Errors
    ///
    /// - [`LockError::NotOwned`]`(`[`Access::Write`]`)` if the current thread
    ///   does not hold the write lock.
    ///
    /// [`Access::Write`]: crate::Access::Write
    /// [`UpgradeLock::read_lock`]: crate::UpgradeLock::read_lock
    pub fn downgrade(&self) -> Result<ReadLock> {
        if self.raw.write_hold_count() == 0 {
            return Err(LockError::NotOwned(Access::Write));
        }

        // the write grant is backed by a read grant, so this is reentrant and
        // cannot block.
        self.raw.try_acquire_read(Deadline::NEVER, false)?;
        if let Err(error) = self.raw.release_write() {
            self.raw.release_read()?;
            return Err(error);
        }

        debug!(readers = self.raw.reader_count(), "WriteLock::downgrade");
        Ok(ReadLock::new(self.raw.clone()))
    }
}

impl fmt::Debug for WriteLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteLock").field("raw", &self.raw).finish()
    }
}

// === impl WriteGuard ===

impl<'a> WriteGuard<'a> {
    pub(crate) fn new(raw: &'a RawUpgradeLock) -> Self {
        Self {
            raw,
            _not_send: PhantomData,
        }
    }

    /// Downgrades this write grant to a read grant, without releasing the lock
    /// in between.
    #[must_use = "if unused, the read lock is released immediately"]
    pub fn downgrade(self) -> ReadGuard<'a> {
        let raw = self.raw;
        mem::forget(self);

        let acquired = raw.try_acquire_read(Deadline::NEVER, false);
        debug_assert_eq!(acquired, Ok(true), "a writer's read lock is reentrant");
        release_on_drop(raw.release_write(), Access::Write);
        ReadGuard::new(raw)
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        release_on_drop(self.raw.release_write(), Access::Write);
    }
}

impl fmt::Debug for WriteGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteGuard").field("raw", self.raw).finish()
    }
}
