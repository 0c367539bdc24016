//! Per-thread lock state.
//!
//! Every thread that touches an [`UpgradeLock`](crate::UpgradeLock) gets a
//! [`Context`], which identifies it to the admission gate and lets other
//! threads wake or interrupt it, and a table of the grants it holds on each
//! lock. Both live in thread-local storage, so reading or updating a thread's
//! own counts never contends with other threads.
use crate::loom::{
    sync::{
        atomic::{AtomicBool, Ordering::*},
        Arc,
    },
    thread::{self, Thread},
    thread_local,
};
use core::{
    cell::RefCell,
    fmt,
    num::NonZeroU64,
    sync::atomic::{AtomicU64, Ordering::Relaxed as IdOrdering},
};

/// Identifies a thread to the admission gate.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub(crate) struct ThreadId(NonZeroU64);

/// Identifies a lock in a thread's table of held grants.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) struct LockId(u64);

/// The grants one thread holds on one lock.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct Holds {
    /// Read grants, including the one backing each write grant.
    pub(crate) reads: usize,
    pub(crate) writes: usize,
}

pub(crate) struct Context {
    id: ThreadId,
    thread: Thread,
    interrupted: AtomicBool,
}

thread_local! {
    static CONTEXT: Arc<Context> = Arc::new(Context::new());
    static HOLDS: RefCell<Vec<(LockId, Holds)>> = RefCell::new(Vec::new());
}

/// Returns the calling thread's [`Context`].
pub(crate) fn current() -> Arc<Context> {
    CONTEXT.with(Arc::clone)
}

pub(crate) fn current_id() -> ThreadId {
    CONTEXT.with(|cx| cx.id)
}

/// Returns the grants the calling thread holds on `lock`.
pub(crate) fn holds(lock: LockId) -> Holds {
    HOLDS.with(|all| {
        all.borrow()
            .iter()
            .find(|(id, _)| *id == lock)
            .map(|&(_, holds)| holds)
            .unwrap_or_default()
    })
}

/// Updates the grants the calling thread holds on `lock`.
///
/// The entry is created on demand and dropped again once `f` leaves it with
/// no grants, so a thread's table only contains locks it currently holds.
pub(crate) fn update_holds<T>(lock: LockId, f: impl FnOnce(&mut Holds) -> T) -> T {
    HOLDS.with(|all| {
        let mut all = all.borrow_mut();
        let idx = match all.iter().position(|(id, _)| *id == lock) {
            Some(idx) => idx,
            None => {
                all.push((lock, Holds::default()));
                all.len() - 1
            }
        };
        let (_, holds) = &mut all[idx];
        let result = f(holds);
        if *holds == Holds::default() {
            all.swap_remove(idx);
        }
        result
    })
}

// === impl ThreadId ===

impl ThreadId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        let id = NEXT.fetch_add(1, IdOrdering);
        match NonZeroU64::new(id) {
            Some(id) => Self(id),
            None => unreachable!("thread ID counter wrapped around after {} threads", u64::MAX),
        }
    }

    /// Returns the ID of the thread that owns a gate value, or [`None`] if the
    /// gate is open.
    pub(crate) fn from_gate(gate: u64) -> Option<Self> {
        NonZeroU64::new(gate).map(Self)
    }

    pub(crate) fn as_u64(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Debug for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ThreadId({})", self.0)
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

// === impl LockId ===

impl LockId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, IdOrdering))
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

// === impl Context ===

impl Context {
    fn new() -> Self {
        Self {
            id: ThreadId::next(),
            thread: thread::current(),
            interrupted: AtomicBool::new(false),
        }
    }

    pub(crate) fn id(&self) -> ThreadId {
        self.id
    }

    pub(crate) fn unpark(&self) {
        self.thread.unpark();
    }

    /// Sets this thread's interrupt flag and wakes it if it is parked.
    pub(crate) fn interrupt(&self) {
        self.interrupted.store(true, Release);
        self.thread.unpark();
    }

    /// Sets this thread's interrupt flag without waking it.
    ///
    /// Used by a thread to re-deliver an interrupt to itself after swallowing
    /// it during an uninterruptible wait.
    pub(crate) fn reinterrupt(&self) {
        self.interrupted.store(true, Release);
    }

    pub(crate) fn is_interrupted(&self) -> bool {
        self.interrupted.load(Acquire)
    }

    /// Clears this thread's interrupt flag, returning whether it was set.
    pub(crate) fn take_interrupt(&self) -> bool {
        self.interrupted.swap(false, AcqRel)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("thread", &self.thread.name())
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}
