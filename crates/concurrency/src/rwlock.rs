//! Recursive write-preferring read-write lock
//!
//! `RecursiveRwLock` is a raw lock: it guards no data of its own. Callers
//! pair it with the structures it protects and hold a [`ReadGuard`] or
//! [`WriteGuard`] for the duration of an operation.
//!
//! # Design
//!
//! - Shared state (active readers, writer flag, waiting writers) lives in a
//!   `parking_lot::Mutex` with one condvar for readers and one for writers.
//! - Per-thread re-entrancy is tracked in a thread-local map keyed by the
//!   lock's id, so a thread that already holds the lock never blocks on it.
//! - A read taken while the thread holds the write lock is a no-op that is
//!   turned into a real read when the write is released.
//! - A write taken while the thread holds a read drops the read first, then
//!   waits for exclusivity. The read is restored on the matching outermost
//!   write unlock, without letting another writer in between.
//!
//! # Fairness
//!
//! Writers are preferred: once a writer is waiting, new readers block until
//! it has acquired and released. A continuous stream of writers can starve
//! readers.

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_LOCK_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Default)]
struct LockState {
    readers: usize,
    writer: bool,
    waiting_writers: usize,
}

/// What the current thread holds on one lock
#[derive(Debug, Default, Clone, Copy)]
struct HeldState {
    read_depth: usize,
    write_depth: usize,
    /// Reads taken while holding the write lock
    reads_under_write: usize,
    /// Read depth dropped to acquire the write lock
    suspended_reads: usize,
}

impl HeldState {
    fn is_idle(&self) -> bool {
        self.read_depth == 0
            && self.write_depth == 0
            && self.reads_under_write == 0
            && self.suspended_reads == 0
    }
}

thread_local! {
    static HELD: RefCell<FxHashMap<u64, HeldState>> = RefCell::new(FxHashMap::default());
}

enum WriteEntry {
    Nested,
    Fresh,
    FromRead,
}

/// Recursive, write-preferring read-write lock
///
/// # Thread Safety
///
/// Lock and unlock calls must pair up on the same thread. The guard types
/// enforce this: they are neither `Send` nor `Sync`.
///
/// # Example
///
/// ```ignore
/// let lock = RecursiveRwLock::new();
/// let _r1 = lock.read();
/// let _r2 = lock.read(); // nested, does not block
/// ```
pub struct RecursiveRwLock {
    id: u64,
    state: Mutex<LockState>,
    readers_cv: Condvar,
    writers_cv: Condvar,
}

impl RecursiveRwLock {
    /// Create a new unlocked lock
    pub fn new() -> Self {
        RecursiveRwLock {
            id: NEXT_LOCK_ID.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(LockState::default()),
            readers_cv: Condvar::new(),
            writers_cv: Condvar::new(),
        }
    }

    /// Acquire a read lock, returning a guard that releases it on drop
    pub fn read(&self) -> ReadGuard<'_> {
        self.read_lock();
        ReadGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    /// Acquire the write lock, returning a guard that releases it on drop
    pub fn write(&self) -> WriteGuard<'_> {
        self.write_lock();
        WriteGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    /// Acquire a read lock
    ///
    /// Nested calls on a thread that already reads, or that holds the write
    /// lock, return immediately.
    pub fn read_lock(&self) {
        let must_wait = self.with_held(|h| {
            if h.write_depth > 0 {
                h.reads_under_write += 1;
                false
            } else if h.read_depth > 0 {
                h.read_depth += 1;
                false
            } else {
                true
            }
        });
        if !must_wait {
            return;
        }

        let mut st = self.state.lock();
        while st.writer || st.waiting_writers > 0 {
            self.readers_cv.wait(&mut st);
        }
        st.readers += 1;
        drop(st);

        self.with_held(|h| h.read_depth = 1);
    }

    /// Release a read lock taken by [`read_lock`](Self::read_lock)
    pub fn read_unlock(&self) {
        let release = self.with_held(|h| {
            if h.write_depth > 0 {
                if h.reads_under_write > 0 {
                    h.reads_under_write -= 1;
                } else if h.suspended_reads > 0 {
                    h.suspended_reads -= 1;
                } else {
                    tracing::warn!(target: "vault::concurrency", lock = self.id, "read unlock without matching read lock");
                }
                false
            } else if h.read_depth > 0 {
                h.read_depth -= 1;
                h.read_depth == 0
            } else {
                tracing::warn!(target: "vault::concurrency", lock = self.id, "read unlock without matching read lock");
                false
            }
        });
        if !release {
            return;
        }

        let mut st = self.state.lock();
        st.readers -= 1;
        if st.readers == 0 {
            self.writers_cv.notify_one();
        }
    }

    /// Acquire the write lock
    ///
    /// Nested calls on a thread that already writes return immediately. If
    /// the thread holds a read lock, that read is dropped before waiting and
    /// restored by the outermost [`write_unlock`](Self::write_unlock).
    pub fn write_lock(&self) {
        let entry = self.with_held(|h| {
            if h.write_depth > 0 {
                h.write_depth += 1;
                WriteEntry::Nested
            } else if h.read_depth > 0 {
                h.suspended_reads = h.read_depth;
                h.read_depth = 0;
                WriteEntry::FromRead
            } else {
                WriteEntry::Fresh
            }
        });

        let mut st = self.state.lock();
        match entry {
            WriteEntry::Nested => return,
            WriteEntry::FromRead => {
                st.readers -= 1;
                if st.readers == 0 {
                    self.writers_cv.notify_one();
                }
            }
            WriteEntry::Fresh => {}
        }

        st.waiting_writers += 1;
        while st.writer || st.readers > 0 {
            self.writers_cv.wait(&mut st);
        }
        st.waiting_writers -= 1;
        st.writer = true;
        drop(st);

        self.with_held(|h| h.write_depth = 1);
    }

    /// Release the write lock taken by [`write_lock`](Self::write_lock)
    pub fn write_unlock(&self) {
        let restored = self.with_held(|h| {
            if h.write_depth == 0 {
                tracing::warn!(target: "vault::concurrency", lock = self.id, "write unlock without matching write lock");
                return None;
            }
            h.write_depth -= 1;
            if h.write_depth > 0 {
                return None;
            }
            let restored = h.suspended_reads + h.reads_under_write;
            h.suspended_reads = 0;
            h.reads_under_write = 0;
            h.read_depth = restored;
            Some(restored)
        });
        let Some(restored) = restored else {
            return;
        };

        let mut st = self.state.lock();
        st.writer = false;
        if restored > 0 {
            // Downgrade in place: no other writer can slip in here.
            st.readers += 1;
        }
        if st.waiting_writers > 0 {
            if st.readers == 0 {
                self.writers_cv.notify_one();
            }
        } else {
            self.readers_cv.notify_all();
        }
    }

    /// Whether the current thread holds the write lock
    pub fn is_write_locked_by_current_thread(&self) -> bool {
        self.peek_held().write_depth > 0
    }

    /// Whether the current thread holds a read or write lock
    pub fn is_held_by_current_thread(&self) -> bool {
        !self.peek_held().is_idle()
    }

    /// Number of threads currently holding a read lock
    pub fn active_readers(&self) -> usize {
        self.state.lock().readers
    }

    /// Number of threads waiting for the write lock
    pub fn waiting_writers(&self) -> usize {
        self.state.lock().waiting_writers
    }

    fn peek_held(&self) -> HeldState {
        HELD.with(|held| held.borrow().get(&self.id).copied().unwrap_or_default())
    }

    fn with_held<R>(&self, f: impl FnOnce(&mut HeldState) -> R) -> R {
        HELD.with(|held| {
            let mut map = held.borrow_mut();
            let entry = map.entry(self.id).or_default();
            let out = f(entry);
            if entry.is_idle() {
                map.remove(&self.id);
            }
            out
        })
    }
}

impl Default for RecursiveRwLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RecursiveRwLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.state.lock();
        f.debug_struct("RecursiveRwLock")
            .field("id", &self.id)
            .field("readers", &st.readers)
            .field("writer", &st.writer)
            .field("waiting_writers", &st.waiting_writers)
            .finish()
    }
}

/// RAII read guard for [`RecursiveRwLock`]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ReadGuard<'a> {
    lock: &'a RecursiveRwLock,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.lock.read_unlock();
    }
}

/// RAII write guard for [`RecursiveRwLock`]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct WriteGuard<'a> {
    lock: &'a RecursiveRwLock,
    _not_send: PhantomData<*const ()>,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.write_unlock();
    }
}
