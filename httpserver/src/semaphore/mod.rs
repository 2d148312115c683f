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

//! A blocking counting semaphore for controlling access to a set of resources.
//!
//! A semaphore maintains a set of permits. Each [`acquire`] call blocks the
//! current thread until the requested permits are available, and then takes
//! them. Each [`release`] call adds permits, potentially waking blocked
//! acquirers.
//!
//! The other primitives in this crate are built on this type: the bounded
//! [`Queue`] counts free and filled slots with a pair of semaphores, and the
//! [`RwLock`] uses a binary semaphore as its write gate.
//!
//! # Examples
//!
//! ```
//! use httpserver::semaphore::Semaphore;
//!
//! let semaphore = Semaphore::new(3);
//! semaphore.acquire(1);
//! semaphore.acquire(2);
//!
//! assert_eq!(semaphore.available_permits(), 0);
//! assert!(!semaphore.try_acquire(1));
//!
//! semaphore.release(3);
//! assert_eq!(semaphore.available_permits(), 3);
//! ```
//!
//! [`acquire`]: Semaphore::acquire
//! [`release`]: Semaphore::release
//! [`Queue`]: crate::queue::Queue
//! [`RwLock`]: crate::rwlock::RwLock

use parking_lot::Condvar;
use parking_lot::Mutex;


/// A blocking counting semaphore for controlling access to a set of resources.
///
/// See the [module level documentation](self) for more.
#[derive(Debug)]
pub struct Semaphore {
    permits: Mutex<u32>,
    released: Condvar,
}

impl Semaphore {
    /// Creates a new semaphore with the given number of permits.
    ///
    /// # Examples
    ///
    /// ```
    /// use httpserver::semaphore::Semaphore;
    ///
    /// let sem = Semaphore::new(5); // Creates a semaphore with 5 permits
    /// ```
    pub fn new(permits: u32) -> Self {
        Self {
            permits: Mutex::new(permits),
            released: Condvar::new(),
        }
    }

    /// Returns the current number of permits available.
    ///
    /// # Examples
    ///
    /// ```
    /// use httpserver::semaphore::Semaphore;
    ///
    /// let sem = Semaphore::new(2);
    /// assert_eq!(sem.available_permits(), 2);
    ///
    /// sem.acquire(1);
    /// assert_eq!(sem.available_permits(), 1);
    /// ```
    pub fn available_permits(&self) -> u32 {
        *self.permits.lock()
    }

    /// Acquires `permits` permits from the semaphore, blocking the current
    /// thread until they are available.
    ///
    /// Waiters are woken whenever permits are released; there is no fairness
    /// guarantee between concurrent acquirers beyond what callers layer on
    /// top.
    pub fn acquire(&self, permits: u32) {
        let mut available = self.permits.lock();
        while *available < permits {
            self.released.wait(&mut available);
        }
        *available -= permits;
    }

    /// Attempts to acquire `permits` permits from the semaphore without
    /// blocking. Returns `true` if the permits were acquired.
    ///
    /// # Examples
    ///
    /// ```
    /// use httpserver::semaphore::Semaphore;
    ///
    /// let sem = Semaphore::new(2);
    /// assert!(sem.try_acquire(2));
    /// assert!(!sem.try_acquire(1));
    /// ```
    pub fn try_acquire(&self, permits: u32) -> bool {
        let mut available = self.permits.lock();
        if *available >= permits {
            *available -= permits;
            true
        } else {
            false
        }
    }

    /// Adds `permits` new permits to the semaphore, waking blocked acquirers.
    ///
    /// # Panics
    ///
    /// Panics if adding the permits would cause the total number of permits
    /// to overflow.
    pub fn release(&self, permits: u32) {
        let mut available = self.permits.lock();
        *available = available
            .checked_add(permits)
            .expect("semaphore permits overflow");
        drop(available);
        self.released.notify_all();
    }
}
