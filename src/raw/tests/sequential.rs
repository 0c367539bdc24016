use super::*;
use crate::util::test::trace_init;
use std::{
    sync::{mpsc, Barrier},
    time::Duration,
};

const SHORT: Duration = Duration::from_millis(20);
const LONG: Duration = Duration::from_secs(5);

/// Takes a grant on another thread, and holds it until the returned sender is
/// used or dropped.
fn hold_on_other_thread(
    lock: &Arc<RawUpgradeLock>,
    acquire: fn(&RawUpgradeLock) -> Result<bool>,
    release: fn(&RawUpgradeLock) -> Result<()>,
) -> (mpsc::Sender<()>, thread::JoinHandle<()>) {
    let (release_tx, release_rx) = mpsc::channel();
    let barrier = Arc::new(Barrier::new(2));
    let handle = {
        let lock = lock.clone();
        let barrier = barrier.clone();
        thread::spawn(move || {
            assert_eq!(acquire(&lock), Ok(true));
            barrier.wait();
            let _ = release_rx.recv();
            release(&lock).unwrap();
        })
    };
    barrier.wait();
    (release_tx, handle)
}

fn read(lock: &RawUpgradeLock) -> Result<bool> {
    lock.try_acquire_read(Deadline::NEVER, false)
}

fn write(lock: &RawUpgradeLock) -> Result<bool> {
    lock.try_acquire_write(Deadline::NEVER, false)
}

#[test]
fn read_is_reentrant() {
    let _trace = trace_init();
    let lock = RawUpgradeLock::new();

    assert_eq!(read(&lock), Ok(true));
    assert_eq!(read(&lock), Ok(true));
    assert_eq!(lock.read_hold_count(), 2);
    assert_eq!(lock.reader_count(), 2);
    assert!(!lock.has_writer());

    lock.release_read().unwrap();
    lock.release_read().unwrap();
    assert_eq!(lock.read_hold_count(), 0);
    assert_eq!(lock.reader_count(), 0);
}

#[test]
fn release_without_hold_fails() {
    let _trace = trace_init();
    let lock = RawUpgradeLock::new();

    assert_eq!(lock.release_read(), Err(LockError::NotOwned(Access::Read)));
    assert_eq!(lock.release_write(), Err(LockError::NotOwned(Access::Write)));

    assert_eq!(read(&lock), Ok(true));
    lock.release_read().unwrap();
    assert_eq!(lock.release_read(), Err(LockError::NotOwned(Access::Read)));
    assert_eq!(lock.reader_count(), 0);
}

#[test]
fn release_write_held_by_other_thread_fails() {
    let _trace = trace_init();
    let lock = Arc::new(RawUpgradeLock::new());
    let (release, holder) = hold_on_other_thread(&lock, write, RawUpgradeLock::release_write);

    assert!(lock.has_writer());
    assert_eq!(lock.release_write(), Err(LockError::NotOwned(Access::Write)));

    release.send(()).unwrap();
    holder.join().unwrap();
    assert!(!lock.has_writer());
}

#[test]
fn write_is_reentrant() {
    let _trace = trace_init();
    let lock = RawUpgradeLock::new();

    assert_eq!(write(&lock), Ok(true));
    assert_eq!(write(&lock), Ok(true));
    assert_eq!(lock.write_hold_count(), 2);
    assert_eq!(lock.read_hold_count(), 2);
    assert_eq!(lock.reader_count(), 2);

    lock.release_write().unwrap();
    assert!(lock.has_writer(), "one write grant is still held");
    lock.release_write().unwrap();
    assert!(!lock.has_writer());
    assert_eq!(lock.reader_count(), 0);
}

#[test]
fn read_grants_backing_writes_are_not_releasable() {
    let _trace = trace_init();
    let lock = RawUpgradeLock::new();

    assert_eq!(write(&lock), Ok(true));
    assert_eq!(lock.release_read(), Err(LockError::NotOwned(Access::Read)));

    assert_eq!(read(&lock), Ok(true));
    assert_eq!(lock.read_hold_count(), 2);
    lock.release_read().unwrap();
    assert_eq!(lock.release_read(), Err(LockError::NotOwned(Access::Read)));

    lock.release_write().unwrap();
    assert_eq!(lock.reader_count(), 0);
}

#[test]
fn upgrade_then_downgrade() {
    let _trace = trace_init();
    let lock = RawUpgradeLock::new();

    assert_eq!(read(&lock), Ok(true));
    assert_eq!(write(&lock), Ok(true));
    assert_eq!((lock.read_hold_count(), lock.write_hold_count()), (2, 1));

    assert_eq!(read(&lock), Ok(true));
    lock.release_write().unwrap();
    assert_eq!((lock.read_hold_count(), lock.write_hold_count()), (2, 0));
    assert!(!lock.has_writer());

    lock.release_read().unwrap();
    lock.release_read().unwrap();
    assert_eq!(lock.reader_count(), 0);
}

#[test]
fn write_times_out_while_other_thread_reads() {
    let _trace = trace_init();
    let lock = Arc::new(RawUpgradeLock::new());
    let (release, holder) = hold_on_other_thread(&lock, read, RawUpgradeLock::release_read);

    assert_eq!(lock.try_acquire_write(Deadline::after(SHORT), true), Ok(false));
    assert!(!lock.has_writer(), "a timed out writer must give the gate back");
    assert_eq!(lock.queue.len(), 0);
    assert_eq!(lock.write_hold_count(), 0);

    release.send(()).unwrap();
    holder.join().unwrap();

    assert_eq!(lock.try_acquire_write(Deadline::after(SHORT), true), Ok(true));
    lock.release_write().unwrap();
}

#[test]
fn read_times_out_while_other_thread_writes() {
    let _trace = trace_init();
    let lock = Arc::new(RawUpgradeLock::new());
    let (release, holder) = hold_on_other_thread(&lock, write, RawUpgradeLock::release_write);

    assert_eq!(lock.try_acquire_read(Deadline::after(SHORT), true), Ok(false));
    assert_eq!(lock.try_acquire_read(Deadline::now(), true), Ok(false));
    assert_eq!(lock.read_hold_count(), 0);
    assert_eq!(lock.reader_count(), 1);

    release.send(()).unwrap();
    holder.join().unwrap();

    assert_eq!(lock.try_acquire_read(Deadline::now(), true), Ok(true));
    lock.release_read().unwrap();
}

#[test]
fn interruptible_wait_is_interrupted() {
    let _trace = trace_init();
    let lock = Arc::new(RawUpgradeLock::new());
    let (release, holder) = hold_on_other_thread(&lock, write, RawUpgradeLock::release_write);

    let waiter = {
        let lock = lock.clone();
        thread::spawn(move || {
            let cx = crate::thread::current();
            cx.interrupt();
            assert_eq!(
                lock.try_acquire_read(Deadline::after(LONG), true),
                Err(LockError::Interrupted)
            );
            assert!(!cx.is_interrupted(), "the interrupt is consumed");
            assert_eq!(lock.read_hold_count(), 0);

            // with the interrupt consumed, the next wait just times out.
            assert_eq!(lock.try_acquire_write(Deadline::after(SHORT), true), Ok(false));
        })
    };

    waiter.join().unwrap();
    assert_eq!(lock.queue.len(), 0);
    assert_eq!(lock.reader_count(), 1);

    release.send(()).unwrap();
    holder.join().unwrap();
}

#[test]
fn uninterruptible_wait_redelivers_interrupt() {
    let _trace = trace_init();
    let lock = Arc::new(RawUpgradeLock::new());
    let (release, holder) = hold_on_other_thread(&lock, write, RawUpgradeLock::release_write);

    let waiter = {
        let lock = lock.clone();
        thread::spawn(move || {
            let cx = crate::thread::current();
            cx.interrupt();
            assert_eq!(read(&lock), Ok(true));
            assert!(cx.take_interrupt(), "the interrupt is delivered again");
            lock.release_read().unwrap();
        })
    };

    std::thread::sleep(SHORT);
    release.send(()).unwrap();
    holder.join().unwrap();
    waiter.join().unwrap();
    assert_eq!(lock.reader_count(), 0);
}

#[test]
fn pending_upgrade_beats_plain_writer() {
    let _trace = trace_init();
    let lock = Arc::new(RawUpgradeLock::new());
    let written = Arc::new(AtomicBool::new(false));

    assert_eq!(read(&lock), Ok(true));

    let writer = {
        let lock = lock.clone();
        let written = written.clone();
        thread::spawn(move || {
            assert_eq!(write(&lock), Ok(true));
            written.store(true, SeqCst);
            lock.release_write().unwrap();
        })
    };

    // let the writer take the gate and start waiting for our read grant.
    std::thread::sleep(SHORT);
    assert!(!written.load(SeqCst));

    assert_eq!(
        lock.try_acquire_write(Deadline::after(LONG), true),
        Ok(true),
        "the upgrade must not wait for a writer that waits for it"
    );
    assert!(!written.load(SeqCst));
    lock.release_write().unwrap();
    lock.release_read().unwrap();

    writer.join().unwrap();
    assert!(written.load(SeqCst));
    assert_eq!(lock.reader_count(), 0);
    assert!(!lock.has_writer());
}

#[test]
fn competing_upgrades_time_out() {
    let _trace = trace_init();
    let lock = Arc::new(RawUpgradeLock::new());
    let barrier = Arc::new(Barrier::new(2));

    let other = {
        let lock = lock.clone();
        let barrier = barrier.clone();
        thread::spawn(move || {
            assert_eq!(read(&lock), Ok(true));
            barrier.wait();
            let upgraded = lock.try_acquire_write(Deadline::after(SHORT), true);
            barrier.wait();
            lock.release_read().unwrap();
            upgraded
        })
    };

    assert_eq!(read(&lock), Ok(true));
    barrier.wait();
    let upgraded = lock.try_acquire_write(Deadline::after(SHORT), true);
    barrier.wait();
    lock.release_read().unwrap();

    let other = other.join().unwrap();
    assert_eq!(upgraded, Ok(false), "an upgrade cannot drain another upgrader");
    assert_eq!(other, Ok(false), "an upgrade cannot drain another upgrader");
    assert_eq!(lock.reader_count(), 0);
    assert!(!lock.has_writer());
    assert_eq!(lock.upgrades.load(SeqCst), 0);
}
