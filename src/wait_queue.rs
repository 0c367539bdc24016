//! The queue of threads blocked on an [`UpgradeLock`](crate::UpgradeLock).
//!
//! The queue does not decide who gets the lock: admission is always a race
//! for the lock's gate. It only decides whom to *wake* when the gate may have
//! become available, so that waiters are woken roughly in the order they
//! arrived instead of all at once.
//!
//! Unlike the lock's gate and counters, which only change through atomic
//! operations, queue membership is guarded by a blocking mutex. The mutex is
//! held only to link, unlink or pick waiters; it is never held while a thread
//! is parked, and it never guards the gate or the read and upgrade counts.
use crate::{
    loom::sync::Arc,
    thread::{Context, ThreadId},
};
use cordyceps::{
    list::{self, List},
    Linked,
};
use core::{
    cell::UnsafeCell,
    fmt,
    marker::PhantomPinned,
    pin::Pin,
    ptr::{self, NonNull},
};
use maitake_sync::blocking::Mutex;

pub(crate) struct WaitQueue {
    /// The linked list of waiters.
    ///
    /// # Safety
    ///
    /// A waiter's links may only be touched while this mutex is held. Every
    /// waiter is pinned on the stack of the thread that is waiting, and is
    /// unlinked by that thread (through [`Enqueued`]) before its stack frame
    /// goes away.
    ///
    /// This is `maitake-sync`'s default blocking mutex, which becomes a `loom`
    /// mutex when running `loom` tests.
    list: Mutex<List<Waiter>>,
}

/// A thread waiting for a lock.
#[repr(C)]
pub(crate) struct Waiter {
    /// The intrusive linked list node.
    ///
    /// This *must* be the first field in the struct in order for the `Linked`
    /// implementation to be sound.
    node: UnsafeCell<Node>,

    /// The waiting thread.
    cx: Arc<Context>,

    /// Whether this thread is waiting to upgrade a read grant it already
    /// holds.
    upgrading: bool,
}

struct Node {
    links: list::Links<Waiter>,

    // This type is !Unpin due to the heuristic from:
    // <https://github.com/rust-lang/rust/pull/82834>
    _pin: PhantomPinned,
}

/// A [`Waiter`] linked into a [`WaitQueue`].
///
/// The waiter is unlinked when this is dropped, if it has not been
/// [dequeued](Enqueued::dequeue) already.
#[must_use = "a waiter is removed from the queue as soon as it is dropped"]
pub(crate) struct Enqueued<'a> {
    queue: &'a WaitQueue,
    waiter: Pin<&'a Waiter>,
    linked: bool,
}

// === impl WaitQueue ===

impl WaitQueue {
    pub(crate) fn new() -> Self {
        Self {
            list: Mutex::new(List::new()),
        }
    }

    /// Links `waiter` into the back of the queue.
    pub(crate) fn enqueue<'a>(&'a self, waiter: Pin<&'a Waiter>) -> Enqueued<'a> {
        let ptr = waiter_ptr(waiter);
        test_debug!(waiter = ?ptr, thread.id = %waiter.cx.id(), "WaitQueue::enqueue");
        self.list.with_lock(|list| list.push_back(ptr));
        Enqueued {
            queue: self,
            waiter,
            linked: true,
        }
    }

    /// Wakes the thread that should next try to take the gate.
    ///
    /// If the gate is held by a thread that is itself waiting in the queue
    /// (a writer waiting for readers to drain), that thread is the only one
    /// that can make progress, so it is woken. If the gate is held by a thread
    /// that is not waiting, nobody is woken: the owner will wake the queue
    /// when it releases the gate. Otherwise, the waiter at the front of the
    /// queue is woken.
    pub(crate) fn wake_next(&self, owner: Option<ThreadId>) {
        let next = self.list.with_lock(|list| {
            let mut waiters = list.iter().map(|waiter| waiter.cx.clone());
            match owner {
                Some(owner) => waiters.find(|cx| cx.id() == owner),
                None => waiters.next(),
            }
        });

        test_debug!(?owner, next = ?next.as_ref().map(|cx| cx.id()), "WaitQueue::wake_next");
        if let Some(next) = next {
            next.unpark();
        }
    }

    /// Wakes every thread that is waiting to upgrade a read grant.
    pub(crate) fn wake_upgraders(&self) {
        let upgraders = self.list.with_lock(|list| {
            list.iter()
                .filter(|waiter| waiter.upgrading)
                .map(|waiter| waiter.cx.clone())
                .collect::<Vec<_>>()
        });

        test_debug!(upgraders = upgraders.len(), "WaitQueue::wake_upgraders");
        for upgrader in upgraders {
            upgrader.unpark();
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.list.with_lock(|list| list.iter().count())
    }
}

impl fmt::Debug for WaitQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitQueue").finish_non_exhaustive()
    }
}

// === impl Waiter ===

impl Waiter {
    pub(crate) fn new(cx: Arc<Context>, upgrading: bool) -> Self {
        Self {
            node: UnsafeCell::new(Node {
                links: list::Links::new(),
                _pin: PhantomPinned,
            }),
            cx,
            upgrading,
        }
    }
}

fn waiter_ptr(waiter: Pin<&Waiter>) -> NonNull<Waiter> {
    NonNull::from(waiter.get_ref())
}

impl fmt::Debug for Waiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waiter")
            .field("thread", &self.cx.id())
            .field("upgrading", &self.upgrading)
            .finish()
    }
}

unsafe impl Linked<list::Links<Waiter>> for Waiter {
    type Handle = NonNull<Waiter>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        r
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        ptr
    }

    unsafe fn links(target: NonNull<Self>) -> NonNull<list::Links<Waiter>> {
        // Safety: using `ptr::addr_of!` avoids creating a temporary
        // reference, which stacked borrows dislikes.
        let node = ptr::addr_of!((*target.as_ptr()).node);
        let links = ptr::addr_of_mut!((*(*node).get()).links);
        // Safety: since the `target` pointer is `NonNull`, we can assume
        // that pointers to its members are also not null.
        NonNull::new_unchecked(links)
    }
}

// === impl Enqueued ===

impl Enqueued<'_> {
    /// Unlinks the waiter from the queue.
    ///
    /// A waiter must leave the queue before it wakes the next one, or it may
    /// pick itself.
    pub(crate) fn dequeue(&mut self) {
        if !self.linked {
            return;
        }

        let ptr = waiter_ptr(self.waiter);
        test_debug!(waiter = ?ptr, "WaitQueue::dequeue");
        self.queue.list.with_lock(|list| unsafe {
            // Safety: the waiter was linked into this queue by `enqueue`, and
            // we hold the queue's lock.
            list.remove(ptr);
        });
        self.linked = false;
    }
}

impl Drop for Enqueued<'_> {
    fn drop(&mut self) {
        self.dequeue();
    }
}

impl fmt::Debug for Enqueued<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Enqueued")
            .field("waiter", &*self.waiter)
            .field("linked", &self.linked)
            .finish()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use crate::thread;
    use core::pin::pin;

    #[test]
    fn dequeued_on_drop() {
        let queue = WaitQueue::new();
        {
            let waiter = pin!(Waiter::new(thread::current(), false));
            let _enqueued = queue.enqueue(waiter.into_ref());
            assert_eq!(queue.len(), 1);
        }
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn dequeue_is_idempotent() {
        let queue = WaitQueue::new();
        let waiter = pin!(Waiter::new(thread::current(), false));
        let mut enqueued = queue.enqueue(waiter.into_ref());
        enqueued.dequeue();
        enqueued.dequeue();
        assert_eq!(queue.len(), 0);
        drop(enqueued);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn wake_next_without_waiters() {
        let queue = WaitQueue::new();
        queue.wake_next(None);
        queue.wake_next(Some(thread::current_id()));
        queue.wake_upgraders();
    }

    #[test]
    fn wake_next_wakes_front() {
        let queue = std::sync::Arc::new(WaitQueue::new());
        let (tx, rx) = std::sync::mpsc::channel();
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();

        let child = {
            let queue = queue.clone();
            std::thread::spawn(move || {
                let waiter = pin!(Waiter::new(thread::current(), false));
                let mut enqueued = queue.enqueue(waiter.into_ref());
                tx.send(()).unwrap();
                std::thread::park();
                enqueued.dequeue();
                done_rx.recv().unwrap();
            })
        };

        rx.recv().unwrap();
        assert_eq!(queue.len(), 1);
        queue.wake_next(None);
        done_tx.send(()).unwrap();
        child.join().unwrap();
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn wake_upgraders_skips_plain_waiters() {
        let queue = std::sync::Arc::new(WaitQueue::new());
        let (tx, rx) = std::sync::mpsc::channel();

        let plain = pin!(Waiter::new(thread::current(), false));
        let _plain = queue.enqueue(plain.into_ref());

        let upgrader = {
            let queue = queue.clone();
            std::thread::spawn(move || {
                let waiter = pin!(Waiter::new(thread::current(), true));
                let mut enqueued = queue.enqueue(waiter.into_ref());
                tx.send(()).unwrap();
                std::thread::park();
                enqueued.dequeue();
            })
        };

        rx.recv().unwrap();
        assert_eq!(queue.len(), 2);
        queue.wake_upgraders();
        upgrader.join().unwrap();
        assert_eq!(queue.len(), 1);
    }
}
