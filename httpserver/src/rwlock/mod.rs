// Copyright 2024 tison <wander4096@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A reader-writer lock with a selectable fairness policy.
//!
//! The lock allows any number of readers or at most one writer at a time.
//! Unlike `std::sync::RwLock`, whose priority policy depends on the
//! operating system, the policy here is chosen explicitly at construction
//! and never changes:
//!
//! * [`Policy::ReaderPriority`]: arriving readers are never held back. A
//!   continuous stream of readers can starve a waiting writer.
//! * [`Policy::WriterPriority`]: readers are held back whenever any writer
//!   is queued, so a writer is never overtaken by readers that arrived
//!   after it.
//! * [`Policy::NWay`]: while a writer is waiting, at most `N` readers are
//!   admitted before the writer is granted the lock. With no writer
//!   waiting, readers are never throttled. `N = 1` approximates writer
//!   priority while still admitting bursts; a large `N` approaches reader
//!   priority.
//!
//! Exclusive access is represented by a binary [`Semaphore`], the write
//! gate: it is held either by the current writer or by the cohort of
//! current readers as a whole. The first reader in takes the gate and the
//! last reader out releases it. Policy-specific counters live behind a
//! mutex and fairness is enforced with condition variables.
//!
//! The lock guards an external resource (this server uses it to serialize
//! filesystem access per path), so it carries no data of its own. The RAII
//! guards returned by [`read`] and [`write`] release the lock when dropped,
//! which also makes it impossible to drop the lock itself while it is held.
//!
//! # Examples
//!
//! ```
//! use httpserver::rwlock::Policy;
//! use httpserver::rwlock::RwLock;
//!
//! let lock = RwLock::new(Policy::WriterPriority);
//!
//! // many readers can hold the lock at once
//! {
//!     let r1 = lock.read();
//!     let r2 = lock.read();
//! } // read guards are dropped at this point
//!
//! // only one writer may hold it
//! {
//!     let w = lock.write();
//! } // write guard is dropped here
//! ```
//!
//! [`Semaphore`]: crate::semaphore::Semaphore
//! [`read`]: RwLock::read
//! [`write`]: RwLock::write

use std::fmt;

use parking_lot::Condvar;
use parking_lot::Mutex;

use crate::semaphore::Semaphore;

#[cfg(test)]
mod tests;

/// The fairness policy of a [`RwLock`], fixed at construction.
///
/// See the [module level documentation](self) for the guarantees each
/// policy makes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Policy {
    /// Arriving readers bypass waiting writers.
    ReaderPriority,
    /// Readers are held back while any writer is queued.
    WriterPriority,
    /// At most `N` readers are admitted per window while a writer waits.
    NWay(u32),
}

/// A reader-writer lock with a selectable fairness policy.
///
/// See the [module level documentation](self) for more.
pub struct RwLock {
    inner: Inner,
}

enum Inner {
    ReaderPriority(ReaderPriority),
    WriterPriority(WriterPriority),
    NWay(NWay),
}

impl RwLock {
    /// Creates a new unlocked lock with the given fairness policy.
    ///
    /// # Panics
    ///
    /// Panics if the policy is [`Policy::NWay`] with a quota of zero.
    pub fn new(policy: Policy) -> Self {
        let inner = match policy {
            Policy::ReaderPriority => Inner::ReaderPriority(ReaderPriority::new()),
            Policy::WriterPriority => Inner::WriterPriority(WriterPriority::new()),
            Policy::NWay(quota) => {
                assert!(quota > 0, "n-way policy requires a positive quota");
                Inner::NWay(NWay::new(quota))
            }
        };
        Self { inner }
    }

    /// Returns the policy the lock was constructed with.
    pub fn policy(&self) -> Policy {
        match &self.inner {
            Inner::ReaderPriority(_) => Policy::ReaderPriority,
            Inner::WriterPriority(_) => Policy::WriterPriority,
            Inner::NWay(l) => Policy::NWay(l.quota),
        }
    }

    /// Locks with shared read access, blocking the current thread until no
    /// writer holds the lock and the policy admits this reader.
    ///
    /// Returns an RAII guard that releases the read access when dropped.
    pub fn read(&self) -> RwLockReadGuard<'_> {
        match &self.inner {
            Inner::ReaderPriority(l) => l.lock_read(),
            Inner::WriterPriority(l) => l.lock_read(),
            Inner::NWay(l) => l.lock_read(),
        }
        RwLockReadGuard { lock: self }
    }

    /// Locks with exclusive write access, blocking the current thread until
    /// no reader or writer holds the lock.
    ///
    /// Returns an RAII guard that releases the write access when dropped.
    pub fn write(&self) -> RwLockWriteGuard<'_> {
        match &self.inner {
            Inner::ReaderPriority(l) => l.lock_write(),
            Inner::WriterPriority(l) => l.lock_write(),
            Inner::NWay(l) => l.lock_write(),
        }
        RwLockWriteGuard { lock: self }
    }

    fn unlock_read(&self) {
        match &self.inner {
            Inner::ReaderPriority(l) => l.unlock_read(),
            Inner::WriterPriority(l) => l.unlock_read(),
            Inner::NWay(l) => l.unlock_read(),
        }
    }

    fn unlock_write(&self) {
        match &self.inner {
            Inner::ReaderPriority(l) => l.unlock_write(),
            Inner::WriterPriority(l) => l.unlock_write(),
            Inner::NWay(l) => l.unlock_write(),
        }
    }
}

impl fmt::Debug for RwLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RwLock").field("policy", &self.policy()).finish()
    }
}

/// Readers are never held back; a stream of them can starve a writer.
struct ReaderPriority {
    state: Mutex<ReaderPriorityState>,
    writers: Condvar,
    gate: Semaphore,
}

struct ReaderPriorityState {
    readers_holding: u32,
    writer_holding: bool,
    writers_waiting: u32,
}

impl ReaderPriority {
    fn new() -> Self {
        Self {
            state: Mutex::new(ReaderPriorityState {
                readers_holding: 0,
                writer_holding: false,
                writers_waiting: 0,
            }),
            writers: Condvar::new(),
            gate: Semaphore::new(1),
        }
    }

    fn lock_read(&self) {
        let mut s = self.state.lock();
        if s.readers_holding == 0 {
            // The first reader of a cohort takes the write gate. A releasing
            // writer opens the gate before it reacquires the state mutex, so
            // blocking here with the mutex held cannot deadlock.
            self.gate.acquire(1);
        }
        s.readers_holding += 1;
    }

    fn unlock_read(&self) {
        let mut s = self.state.lock();
        s.readers_holding -= 1;
        if s.readers_holding == 0 {
            self.gate.release(1);
            if s.writers_waiting > 0 {
                self.writers.notify_one();
            }
        }
    }

    fn lock_write(&self) {
        let mut s = self.state.lock();
        s.writers_waiting += 1;
        while s.readers_holding > 0 || s.writer_holding {
            self.writers.wait(&mut s);
        }
        s.writers_waiting -= 1;
        s.writer_holding = true;
        drop(s);
        self.gate.acquire(1);
    }

    fn unlock_write(&self) {
        // Open the gate before touching the counters so a just-arriving
        // reader is unblocked promptly.
        self.gate.release(1);
        let mut s = self.state.lock();
        s.writer_holding = false;
        if s.writers_waiting > 0 && s.readers_holding == 0 {
            self.writers.notify_one();
        }
    }
}

/// Readers wait while any writer is queued; writers chain on the gate.
struct WriterPriority {
    state: Mutex<WriterPriorityState>,
    readers: Condvar,
    gate: Semaphore,
}

struct WriterPriorityState {
    readers_holding: u32,
    readers_waiting: u32,
    writers_waiting: u32,
}

impl WriterPriority {
    fn new() -> Self {
        Self {
            state: Mutex::new(WriterPriorityState {
                readers_holding: 0,
                readers_waiting: 0,
                writers_waiting: 0,
            }),
            readers: Condvar::new(),
            gate: Semaphore::new(1),
        }
    }

    fn lock_read(&self) {
        let mut s = self.state.lock();
        s.readers_waiting += 1;
        while s.writers_waiting > 0 {
            self.readers.wait(&mut s);
        }
        if s.readers_holding == 0 {
            // No writer is queued here, so at worst the gate is an instant
            // away from being posted by a releasing writer, which does so
            // without reacquiring the state mutex.
            self.gate.acquire(1);
        }
        s.readers_waiting -= 1;
        s.readers_holding += 1;
    }

    fn unlock_read(&self) {
        let mut s = self.state.lock();
        s.readers_holding -= 1;
        if s.readers_holding == 0 {
            self.gate.release(1);
        } else if s.writers_waiting == 0 && s.readers_waiting > 0 {
            self.readers.notify_all();
        }
    }

    fn lock_write(&self) {
        let mut s = self.state.lock();
        s.writers_waiting += 1;
        drop(s);
        self.gate.acquire(1);
    }

    fn unlock_write(&self) {
        let mut s = self.state.lock();
        s.writers_waiting -= 1;
        if s.writers_waiting == 0 && s.readers_waiting > 0 {
            self.readers.notify_all();
        }
        drop(s);
        self.gate.release(1);
    }
}

/// While a writer waits, at most `quota` readers pass per window. The
/// window is the stretch since the most recent writer release.
struct NWay {
    quota: u32,
    state: Mutex<NWayState>,
    readers: Condvar,
    writers: Condvar,
    gate: Semaphore,
}

struct NWayState {
    readers_holding: u32,
    readers_waiting: u32,
    readers_passed: u32,
    writers_waiting: u32,
}

impl NWay {
    fn new(quota: u32) -> Self {
        Self {
            quota,
            state: Mutex::new(NWayState {
                readers_holding: 0,
                readers_waiting: 0,
                readers_passed: 0,
                writers_waiting: 0,
            }),
            readers: Condvar::new(),
            writers: Condvar::new(),
            gate: Semaphore::new(1),
        }
    }

    fn lock_read(&self) {
        let mut s = self.state.lock();
        s.readers_waiting += 1;
        // Readers stall only when the window quota is spent AND a writer is
        // queued; if either is false they may proceed.
        while s.readers_passed >= self.quota && s.writers_waiting > 0 {
            self.readers.wait(&mut s);
        }
        if s.readers_passed < self.quota {
            s.readers_passed += 1;
        }
        s.readers_waiting -= 1;
        if s.readers_holding == 0 {
            // A holding writer opens the gate before it reacquires the state
            // mutex, so blocking here with the mutex held cannot deadlock.
            self.gate.acquire(1);
        }
        s.readers_holding += 1;
    }

    fn unlock_read(&self) {
        let mut s = self.state.lock();
        s.readers_holding -= 1;
        if s.readers_holding > 0 {
            return;
        }
        self.gate.release(1);
        if s.writers_waiting == 0 {
            self.readers.notify_all();
        } else if s.readers_passed >= self.quota || s.readers_waiting == 0 {
            self.writers.notify_one();
        } else {
            self.notify_readers(s.readers_waiting, self.quota - s.readers_passed);
        }
    }

    fn lock_write(&self) {
        let mut s = self.state.lock();
        s.writers_waiting += 1;
        // Yield to readers until the window quota is used up and no one is
        // actively reading.
        while s.readers_holding > 0 || (s.readers_passed < self.quota && s.readers_waiting > 0) {
            self.writers.wait(&mut s);
        }
        drop(s);
        self.gate.acquire(1);
    }

    fn unlock_write(&self) {
        // Open the gate before the bookkeeping so the next holder is
        // unblocked promptly.
        self.gate.release(1);
        let mut s = self.state.lock();
        s.writers_waiting -= 1;
        s.readers_passed = 0;
        if s.readers_waiting > 0 {
            self.notify_readers(s.readers_waiting, self.quota);
        } else {
            self.writers.notify_one();
        }
    }

    fn notify_readers(&self, waiting: u32, at_most: u32) {
        if waiting <= at_most {
            self.readers.notify_all();
        } else {
            for _ in 0..at_most {
                self.readers.notify_one();
            }
        }
    }
}

/// RAII structure used to release the shared read access of a lock when
/// dropped.
///
/// This structure is created by the [`read`] method on [`RwLock`].
///
/// [`read`]: RwLock::read
#[must_use = "if unused the RwLock will immediately unlock"]
pub struct RwLockReadGuard<'a> {
    lock: &'a RwLock,
}

impl Drop for RwLockReadGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock_read();
    }
}

impl fmt::Debug for RwLockReadGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RwLockReadGuard").finish_non_exhaustive()
    }
}

/// RAII structure used to release the exclusive write access of a lock when
/// dropped.
///
/// This structure is created by the [`write`] method on [`RwLock`].
///
/// [`write`]: RwLock::write
#[must_use = "if unused the RwLock will immediately unlock"]
pub struct RwLockWriteGuard<'a> {
    lock: &'a RwLock,
}

impl Drop for RwLockWriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock_write();
    }
}

impl fmt::Debug for RwLockWriteGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RwLockWriteGuard").finish_non_exhaustive()
    }
}
