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

//! Interns one [`RwLock`] per request path.
//!
//! Concurrent requests that target the same path must be serialized
//! (`GET`/`GET` in parallel, anything involving a `PUT` mutually exclusive)
//! while requests on distinct paths proceed independently. The registry
//! maps each path in use to a single lock: [`acquire`] calls with the same
//! path (byte-exact) return handles to the same lock and bump a reference
//! count, and dropping the last handle frees the path slot for reuse.
//!
//! The registry is a fixed array of slots sized to the worker pool. At most
//! one path per worker can be in use at any instant, so the table can never
//! be exhausted by its intended callers, and a linear scan under a single
//! mutex is all the lookup that is needed. The lock object in each slot is
//! created once and reused across many paths over its lifetime.
//!
//! # Examples
//!
//! ```
//! use httpserver::registry::LockRegistry;
//! use httpserver::rwlock::Policy;
//!
//! let registry = LockRegistry::new(4, Policy::WriterPriority);
//! let entry = registry.acquire("/a");
//! let guard = entry.lock().write();
//! // ... the path "/a" is exclusively held here ...
//! drop(guard);
//! drop(entry); // the slot becomes reusable
//! ```
//!
//! [`RwLock`]: crate::rwlock::RwLock
//! [`acquire`]: LockRegistry::acquire

use std::sync::Arc;

use parking_lot::Mutex;

use crate::rwlock::Policy;
use crate::rwlock::RwLock;


/// A fixed-size table interning one [`RwLock`] per in-use path.
///
/// See the [module level documentation](self) for more.
pub struct LockRegistry {
    slots: Mutex<Box<[Slot]>>,
}

struct Slot {
    path: Option<String>,
    refs: usize,
    lock: Arc<RwLock>,
}

impl LockRegistry {
    /// Creates a registry with `capacity` slots whose locks all use the
    /// given fairness policy.
    ///
    /// `capacity` must equal (or exceed) the number of threads that will
    /// call [`acquire`] concurrently.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    ///
    /// [`acquire`]: LockRegistry::acquire
    pub fn new(capacity: usize, policy: Policy) -> Arc<Self> {
        assert!(capacity > 0, "registry capacity must be positive");
        let slots = (0..capacity)
            .map(|_| Slot {
                path: None,
                refs: 0,
                lock: Arc::new(RwLock::new(policy)),
            })
            .collect();
        Arc::new(Self {
            slots: Mutex::new(slots),
        })
    }

    /// Returns a handle to the lock interned for `path`, creating the
    /// association if the path is not currently in use.
    ///
    /// Handles for the same path share one lock. The association is
    /// released when the last handle for the path is dropped.
    ///
    /// # Panics
    ///
    /// Panics if every slot is taken by a distinct other path, which cannot
    /// happen while concurrent callers do not outnumber the slots.
    pub fn acquire(self: &Arc<Self>, path: &str) -> PathLock {
        let mut slots = self.slots.lock();
        let mut free = None;
        let mut found = None;
        for (index, slot) in slots.iter().enumerate() {
            match &slot.path {
                Some(interned) if interned == path => {
                    found = Some(index);
                    break;
                }
                Some(_) => {}
                None => {
                    if free.is_none() {
                        free = Some(index);
                    }
                }
            }
        }
        let index = match found {
            Some(index) => {
                slots[index].refs += 1;
                index
            }
            None => {
                let index = free.expect("lock registry exhausted");
                slots[index].path = Some(path.to_owned());
                slots[index].refs = 1;
                index
            }
        };
        PathLock {
            registry: Arc::clone(self),
            lock: Arc::clone(&slots[index].lock),
            index,
        }
    }

    fn release(&self, index: usize) {
        let mut slots = self.slots.lock();
        let slot = &mut slots[index];
        slot.refs -= 1;
        if slot.refs == 0 {
            slot.path = None;
        }
    }

    #[cfg(test)]
    fn paths_in_use(&self) -> usize {
        self.slots.lock().iter().filter(|s| s.path.is_some()).count()
    }
}

/// A reference-counted handle to the lock interned for one path.
///
/// This structure is created by the [`acquire`] method on [`LockRegistry`].
/// Dropping it releases the reference; the last drop for a path frees its
/// slot.
///
/// [`acquire`]: LockRegistry::acquire
pub struct PathLock {
    registry: Arc<LockRegistry>,
    lock: Arc<RwLock>,
    index: usize,
}

impl PathLock {
    /// Returns the lock serializing access to this handle's path.
    pub fn lock(&self) -> &RwLock {
        &self.lock
    }
}

impl Drop for PathLock {
    fn drop(&mut self) {
        self.registry.release(self.index);
    }
}
