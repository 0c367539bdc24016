//! The lock core shared by [`ReadLock`](crate::ReadLock) and
//! [`WriteLock`](crate::WriteLock).
//!
//! # Implementation Notes
//!
//! The core is built around a single *admission gate*, an atomic holding the
//! ID of the one thread that currently owns it (or zero if nobody does). A
//! writer takes the gate and keeps it for as long as it holds the write lock.
//! A reader that holds no read grant yet takes the gate only for as long as
//! it takes to register itself, and then opens it again, so a reader can
//! never be admitted while a writer owns the lock.
//!
//! Having taken the gate, a writer still has to wait for every *other*
//! thread's read grants to drain. Read grants the writer holds itself are
//! excluded, which is what allows a reader to upgrade: it takes the gate
//! while reading, and waits for everybody else to finish.
//!
//! Threads that cannot take the gate (or whose readers have not drained yet)
//! link themselves into a [`WaitQueue`] and park. Whenever the gate or the
//! reader count changes, the thread that changed it wakes whichever waiter can
//! make progress next.
//!
//! Each thread's own grant counts are kept in thread-local storage (see
//! [`crate::thread`]), so reentrant acquisitions never touch the gate.
use crate::{
    deadline::Deadline,
    error::{Access, LockError, Result},
    loom::sync::atomic::{AtomicU64, AtomicUsize, Ordering::*},
    thread::{self, Context, LockId, ThreadId},
    wait_queue::{WaitQueue, Waiter},
};
use core::{fmt, pin::pin};
use maitake_sync::util::CachePadded;


pub(crate) struct RawUpgradeLock {
    id: LockId,

    /// The admission gate: the ID of the thread that owns it, or zero.
    writer: CachePadded<AtomicU64>,

    /// The total number of read grants held by all threads.
    readers: CachePadded<AtomicUsize>,

    /// The number of threads waiting to upgrade a read grant to a write grant.
    ///
    /// While this is non-zero, writers that hold no read grant stay away from
    /// the gate, so that they cannot take it and then wait forever for the
    /// upgrading thread's read grant to drain.
    upgrades: AtomicUsize,

    queue: WaitQueue,
}

/// The state of one blocking wait.
struct Waiting<'a> {
    cx: &'a Context,
    deadline: Deadline,
    interruptible: bool,
    /// Set if an interrupt was observed while waiting uninterruptibly; it is
    /// delivered again once the wait is over.
    swallowed: bool,
}

enum Drain {
    /// No other thread holds a read grant.
    Drained,
    /// The gate was handed over to a pending upgrade.
    Yielded,
    TimedOut,
}

// === impl RawUpgradeLock ===

impl RawUpgradeLock {
    pub(crate) fn new() -> Self {
        Self {
            id: LockId::next(),
            writer: CachePadded::new(AtomicU64::new(0)),
            readers: CachePadded::new(AtomicUsize::new(0)),
            upgrades: AtomicUsize::new(0),
            queue: WaitQueue::new(),
        }
    }

    /// Acquires a read grant for the calling thread.
    ///
    /// Returns `Ok(false)` if `deadline` elapsed first, or
    /// `Err(LockError::Interrupted)` if the thread was interrupted while
    /// waiting and the wait is `interruptible`.
    pub(crate) fn try_acquire_read(
        &self,
        deadline: Deadline,
        interruptible: bool,
    ) -> Result<bool> {
        enter_test_debug_span!(
            "RawUpgradeLock::try_acquire_read",
            lock.id = %self.id,
            ?deadline
        );

        let reentered = thread::update_holds(self.id, |holds| {
            if holds.reads == 0 {
                return false;
            }
            holds.reads += 1;
            true
        });
        if reentered {
            self.readers.fetch_add(1, SeqCst);
            trace!(lock.id = %self.id, readers = self.reader_count(), "read lock reentered");
            return Ok(true);
        }

        let cx = thread::current();
        let me = cx.id();
        let waiter = pin!(Waiter::new(cx.clone(), false));
        let mut enqueued = self.queue.enqueue(waiter.into_ref());
        let mut waiting = Waiting::new(&cx, deadline, interruptible);

        let admitted = self.acquire_gate(me, &mut waiting, false);
        if let Ok(true) = admitted {
            thread::update_holds(self.id, |holds| holds.reads += 1);
            self.readers.fetch_add(1, SeqCst);
            self.writer.store(0, SeqCst);
            trace!(
                lock.id = %self.id,
                thread.id = %me,
                readers = self.reader_count(),
                "read lock acquired"
            );
        }

        enqueued.dequeue();
        self.wake_next();
        test_dbg!(admitted)
    }

    /// Releases one of the calling thread's read grants.
    pub(crate) fn release_read(&self) -> Result<()> {
        thread::update_holds(self.id, |holds| {
            // the last `writes` read grants back the thread's write grants,
            // and are only released along with them.
            if holds.reads == 0 || holds.reads == holds.writes {
                return Err(LockError::NotOwned(Access::Read));
            }
            holds.reads -= 1;
            Ok(())
        })?;

        self.readers.fetch_sub(1, SeqCst);
        trace!(lock.id = %self.id, readers = self.reader_count(), "read lock released");
        self.wake_next();
        Ok(())
    }

    /// Acquires a write grant for the calling thread.
    ///
    /// If the thread already holds read grants, this is an upgrade: it waits
    /// for every other thread's read grants to drain, but not for its own.
    pub(crate) fn try_acquire_write(
        &self,
        deadline: Deadline,
        interruptible: bool,
    ) -> Result<bool> {
        enter_test_debug_span!(
            "RawUpgradeLock::try_acquire_write",
            lock.id = %self.id,
            ?deadline
        );

        let reentered = thread::update_holds(self.id, |holds| {
            if holds.writes == 0 {
                return false;
            }
            holds.writes += 1;
            holds.reads += 1;
            true
        });
        if reentered {
            self.readers.fetch_add(1, SeqCst);
            trace!(lock.id = %self.id, readers = self.reader_count(), "write lock reentered");
            return Ok(true);
        }

        let cx = thread::current();
        let me = cx.id();
        let own_reads = thread::holds(self.id).reads;
        let upgrading = own_reads > 0;

        let waiter = pin!(Waiter::new(cx.clone(), upgrading));
        let mut enqueued = self.queue.enqueue(waiter.into_ref());
        let mut waiting = Waiting::new(&cx, deadline, interruptible);

        if upgrading {
            debug!(lock.id = %self.id, thread.id = %me, own_reads, "upgrading read lock");
            self.upgrades.fetch_add(1, SeqCst);
            // a writer may already be waiting on the gate for our read grants
            // to drain; wake it so that it hands the gate over.
            self.wake_next();
        }

        let admitted = self.acquire_write(me, own_reads, upgrading, &mut waiting);

        if upgrading {
            self.upgrades.fetch_sub(1, SeqCst);
        }

        enqueued.dequeue();
        match admitted {
            Ok(true) => {
                thread::update_holds(self.id, |holds| {
                    holds.writes += 1;
                    holds.reads += 1;
                });
                self.readers.fetch_add(1, SeqCst);
                trace!(
                    lock.id = %self.id,
                    thread.id = %me,
                    readers = self.reader_count(),
                    "write lock acquired"
                );
            }
            _ => self.wake_next(),
        }

        test_dbg!(admitted)
    }

    /// Releases one of the calling thread's write grants, along with the read
    /// grant that backs it.
    pub(crate) fn release_write(&self) -> Result<()> {
        let me = thread::current_id();
        if self.writer.load(Acquire) != me.as_u64() {
            return Err(LockError::NotOwned(Access::Write));
        }

        let writes = thread::update_holds(self.id, |holds| {
            if holds.writes == 0 {
                return Err(LockError::NotOwned(Access::Write));
            }
            holds.writes -= 1;
            holds.reads -= 1;
            Ok(holds.writes)
        })?;

        self.readers.fetch_sub(1, SeqCst);
        trace!(
            lock.id = %self.id,
            thread.id = %me,
            writes,
            readers = self.reader_count(),
            "write lock released"
        );

        if writes == 0 {
            self.writer.store(0, SeqCst);
            self.wake_next();
        }
        Ok(())
    }

    /// Takes the gate and waits for other readers to drain, handing the gate
    /// back whenever an upgrade is pending unless this is that upgrade.
    ///
    /// The gate is held when this returns `Ok(true)`, and only then.
    fn acquire_write(
        &self,
        me: ThreadId,
        own_reads: usize,
        upgrading: bool,
        waiting: &mut Waiting<'_>,
    ) -> Result<bool> {
        loop {
            if !self.acquire_gate(me, waiting, !upgrading)? {
                return Ok(false);
            }

            match self.drain_readers(own_reads, upgrading, waiting) {
                Ok(Drain::Drained) => return Ok(true),
                Ok(Drain::Yielded) => continue,
                Ok(Drain::TimedOut) => {
                    self.writer.store(0, SeqCst);
                    return Ok(false);
                }
                Err(error) => {
                    self.writer.store(0, SeqCst);
                    return Err(error);
                }
            }
        }
    }

    /// Parks until the calling thread owns the gate.
    ///
    /// If `defer_to_upgrades` is set, the gate is left alone while any upgrade
    /// is pending.
    fn acquire_gate(
        &self,
        me: ThreadId,
        waiting: &mut Waiting<'_>,
        defer_to_upgrades: bool,
    ) -> Result<bool> {
        loop {
            if defer_to_upgrades && self.upgrades.load(SeqCst) > 0 {
                self.queue.wake_upgraders();
            } else if self
                .writer
                .compare_exchange(0, me.as_u64(), SeqCst, SeqCst)
                .is_ok()
            {
                return Ok(true);
            }

            if !waiting.park()? {
                trace!(lock.id = %self.id, thread.id = %me, "timed out waiting for the gate");
                return Ok(false);
            }
        }
    }

    /// Parks, holding the gate, until no thread other than the caller holds a
    /// read grant.
    fn drain_readers(
        &self,
        own_reads: usize,
        upgrading: bool,
        waiting: &mut Waiting<'_>,
    ) -> Result<Drain> {
        loop {
            if test_dbg!(self.readers.load(SeqCst)) == own_reads {
                return Ok(Drain::Drained);
            }

            if !upgrading && self.upgrades.load(SeqCst) > 0 {
                debug!(lock.id = %self.id, "yielding the gate to a pending upgrade");
                self.writer.store(0, SeqCst);
                self.queue.wake_upgraders();
                return Ok(Drain::Yielded);
            }

            if !waiting.park()? {
                trace!(lock.id = %self.id, "timed out waiting for readers to drain");
                return Ok(Drain::TimedOut);
            }
        }
    }

    fn wake_next(&self) {
        self.queue
            .wake_next(ThreadId::from_gate(self.writer.load(SeqCst)));
    }

    pub(crate) fn reader_count(&self) -> usize {
        self.readers.load(Relaxed)
    }

    pub(crate) fn has_writer(&self) -> bool {
        self.writer.load(Relaxed) != 0
    }

    pub(crate) fn read_hold_count(&self) -> usize {
        thread::holds(self.id).reads
    }

    pub(crate) fn write_hold_count(&self) -> usize {
        thread::holds(self.id).writes
    }
}

impl fmt::Debug for RawUpgradeLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawUpgradeLock")
            .field("id", &self.id)
            .field("writer", &ThreadId::from_gate(self.writer.load(Relaxed)))
            .field("readers", &self.readers.load(Relaxed))
            .field("upgrades", &self.upgrades.load(Relaxed))
            .field("queue", &self.queue)
            .finish()
    }
}

// === impl Waiting ===

impl<'a> Waiting<'a> {
    fn new(cx: &'a Context, deadline: Deadline, interruptible: bool) -> Self {
        Self {
            cx,
            deadline,
            interruptible,
            swallowed: false,
        }
    }

    /// Parks once, returning `Ok(false)` if the deadline has elapsed.
    fn park(&mut self) -> Result<bool> {
        if self.cx.take_interrupt() {
            if self.interruptible {
                debug!(thread.id = %self.cx.id(), "interrupted while waiting for lock");
                return Err(LockError::Interrupted);
            }
            self.swallowed = true;
        }

        Ok(self.deadline.park())
    }
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        if self.swallowed {
            self.cx.reinterrupt();
        }
    }
}
