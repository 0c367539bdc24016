use crate::{
    deadline::Deadline,
    error::{Access, LockError, Result},
    loom::sync::Arc,
    raw::RawUpgradeLock,
    thread,
    write::{WriteGuard, WriteLock},
    Condition,
};
use core::{fmt, marker::PhantomData, time::Duration};

/// The read side of an [`UpgradeLock`](crate::UpgradeLock).
///
/// Any number of threads may hold the read lock at the same time, as long as
/// no thread holds the write lock. A thread may acquire the read lock
/// repeatedly, and must [`unlock`](Self::unlock) it once per acquisition.
///
/// A `ReadLock` is only a handle: it can be cloned and sent to other threads,
/// and every clone refers to the same lock. The grants it hands out belong to
/// the calling *thread*, not to the handle, so a grant acquired through one
/// clone may be released through another on the same thread.
#[derive(Clone)]
pub struct ReadLock {
    raw: Arc<RawUpgradeLock>,
}

/// An RAII guard for a read grant, returned by [`ReadLock::scoped`].
///
/// The grant is released when the guard is dropped. Because grants belong to
/// the thread that acquired them, guards cannot be sent to other threads.
///
/// # Panics
///
/// Dropping a `ReadGuard` panics (unless the thread is already panicking) if
/// its grant was already released by hand with [`ReadLock::unlock`].
#[must_use = "if unused, the read lock is released immediately"]
pub struct ReadGuard<'a> {
    raw: &'a RawUpgradeLock,
    _not_send: PhantomData<*const ()>,
}

// === impl ReadLock ===

impl ReadLock {
    pub(crate) fn new(raw: Arc<RawUpgradeLock>) -> Self {
        Self { raw }
    }

    pub(crate) fn raw(&self) -> &RawUpgradeLock {
        &self.raw
    }

    /// Acquires the read lock, blocking the current thread until it is
    /// available.
    ///
    /// An [interrupt](crate::interrupt) received while waiting does not stop
    /// the wait; it is delivered again once the lock has been acquired.
    pub fn lock(&self) {
        let acquired = self.raw.try_acquire_read(Deadline::NEVER, false);
        debug_assert_eq!(acquired, Ok(true), "an untimed, uninterruptible read lock cannot fail");
    }

    /// Acquires the read lock, blocking the current thread until it is
    /// available or the thread is [interrupted](crate::interrupt).
    ///
    /// # Errors
    ///
    /// - [`LockError::Interrupted`] if the thread was interrupted while
    ///   waiting.
    pub fn lock_interruptibly(&self) -> Result<()> {
        self.raw.try_acquire_read(Deadline::NEVER, true)?;
        Ok(())
    }

    /// Attempts to acquire the read lock without waiting.
    ///
    /// Returns `true` if the lock was acquired. An interrupt observed while the
    /// lock is contended makes the attempt fail, and is left pending.
    pub fn try_lock(&self) -> bool {
        match self.raw.try_acquire_read(Deadline::now(), true) {
            Ok(acquired) => acquired,
            Err(_) => {
                thread::current().reinterrupt();
                false
            }
        }
    }

    /// Attempts to acquire the read lock, waiting at most `timeout` for it to
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
        self.raw.try_acquire_read(Deadline::after(timeout), true)
    }

    /// Releases one of the current thread's read grants.
    ///
    /// # Errors
    ///
    /// - [`LockError::NotOwned`]`(`[`Access::Read`]`)` if the current thread
    ///   holds no read grant it can release. Read grants that back a write
    ///   grant held by the same thread are only released along with it.
    ///
    /// [`Access::Read`]: crate::Access::Read
    pub fn unlock(&self) -> Result<()> {
        self.raw.release_read()
    }

    /// Acquires the read lock like [`lock_interruptibly`], returning a guard
    /// that releases it when dropped.
    ///
    /// # Errors
    ///
    /// - [`LockError::Interrupted`] if the thread was interrupted while
    ///   waiting.
    ///
    /// [`lock_interruptibly`]: Self::lock_interruptibly
    pub fn scoped(&self) -> Result<ReadGuard<'_>> {
        self.lock_interruptibly()?;
        Ok(ReadGuard::new(&self.raw))
    }

    /// Condition variables are not supported.
    ///
    /// # Errors
    ///
    /// Always returns [`LockError::Unsupported`].
    pub fn new_condition(&self) -> Result<Condition> {
        Err(LockError::Unsupported)
    }

    /// Upgrades the current thread's read grant to a write grant, blocking
    /// until every *other* thread has released its read grants.
    ///
    /// The read grant stays held: once the returned [`WriteLock`] is unlocked,
    /// the thread is back to reading. If the thread holds no read grant, this
    /// is the same as [`WriteLock::lock_interruptibly`].
    ///
    /// A pending upgrade takes priority over threads waiting for the write
    /// lock that do not read. However, if two threads that both hold read
    /// grants try to upgrade at the same time, neither can proceed until the
    /// other gives up its read grant, so this waits forever. Use
    /// [`try_upgrade_for`](Self::try_upgrade_for) if that can happen.
    ///
    /// The returned handle shares this lock's state, and is interchangeable
    /// with the one returned by [`UpgradeLock::write_lock`].
    ///
    /// [`UpgradeLock::write_lock`]: crate::UpgradeLock::write_lock
    ///
    /// # Errors
    ///
    /// - [`LockError::Interrupted`] if the thread was interrupted while
    ///   waiting. The read grant is still held.
    pub fn upgrade(&self) -> Result<WriteLock> {
        self.raw.try_acquire_write(Deadline::NEVER, true)?;
        debug!(readers = self.raw.reader_count(), "ReadLock::upgrade");
        Ok(WriteLock::new(self.raw.clone()))
    }

    /// Attempts to upgrade the current thread's read grant to a write grant,
    /// waiting at most `timeout` for other readers to release.
    ///
    /// Returns `Ok(None)` if the timeout elapsed first. The read grant is held
    /// either way. As with [`upgrade`](Self::upgrade), the returned handle is
    /// interchangeable with [`UpgradeLock::write_lock`].
    ///
    /// [`UpgradeLock::write_lock`]: crate::UpgradeLock::write_lock
    ///
    /// # Errors
    ///
    /// - [`LockError::Interrupted`] if the thread was interrupted while
    ///   waiting.
    pub fn try_upgrade_for(&self, timeout: Duration) -> Result<Option<WriteLock>> {
        if !self.raw.try_acquire_write(Deadline::after(timeout), true)? {
            return Ok(None);
        }
        Ok(Some(WriteLock::new(self.raw.clone())))
    }
}

impl fmt::Debug for ReadLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadLock").field("raw", &self.raw).finish()
    }
}

// === impl ReadGuard ===

impl<'a> ReadGuard<'a> {
    pub(crate) fn new(raw: &'a RawUpgradeLock) -> Self {
        Self {
            raw,
            _not_send: PhantomData,
        }
    }

    /// Upgrades this read grant, blocking until every *other* thread has
    /// released its read grants.
    ///
    /// Dropping the returned [`WriteGuard`] releases the write grant and
    /// leaves this read grant held. See [`ReadLock::upgrade`] for how upgrades
    /// interact with other writers.
    ///
    /// # Errors
    ///
    /// - [`LockError::Interrupted`] if the thread was interrupted while
    ///   waiting.
    pub fn upgrade(&self) -> Result<WriteGuard<'_>> {
        self.raw.try_acquire_write(Deadline::NEVER, true)?;
        Ok(WriteGuard::new(self.raw))
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        release_on_drop(self.raw.release_read(), Access::Read);
    }
}

impl fmt::Debug for ReadGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadGuard").field("raw", self.raw).finish()
    }
}

/// Guards cannot report errors from `drop`, so a failed release panics, unless
/// the thread is already unwinding.
pub(crate) fn release_on_drop(released: Result<()>, access: Access) {
    if let Err(error) = released {
        if !std::thread::panicking() {
            panic!("failed to release {access} guard: {error}");
        }
    }
}
