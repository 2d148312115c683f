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

//! A bounded blocking FIFO queue for handing items between threads.
//!
//! [`push`] blocks while the queue is full and [`pop`] blocks while it is
//! empty, so a fast producer is throttled by its consumers and vice versa.
//! Both operations are safe under arbitrary concurrency of multiple
//! producers and multiple consumers.
//!
//! The queue is a fixed-capacity ring. Two counting semaphores track free
//! and filled slots, and the push and pop cursors are guarded by separate
//! mutexes, so one producer and one consumer can make progress at the same
//! time.
//!
//! # Examples
//!
//! ```
//! use std::thread;
//!
//! use httpserver::queue::Queue;
//!
//! let queue = Queue::new(2);
//! thread::scope(|s| {
//!     s.spawn(|| {
//!         for i in 0..10 {
//!             queue.push(i);
//!         }
//!     });
//!     for i in 0..10 {
//!         assert_eq!(queue.pop(), i);
//!     }
//! });
//! ```
//!
//! [`push`]: Queue::push
//! [`pop`]: Queue::pop

use std::cell::UnsafeCell;

use parking_lot::Mutex;

use crate::semaphore::Semaphore;

#[cfg(test)]
mod tests;

/// A bounded blocking FIFO queue.
///
/// See the [module level documentation](self) for more.
pub struct Queue<T> {
    slots: Box<[UnsafeCell<Option<T>>]>,
    push_at: Mutex<usize>,
    pop_at: Mutex<usize>,
    free: Semaphore,
    filled: Semaphore,
}

// Items transfer ownership through the slots; access to each slot is
// serialized by the semaphore permits plus the cursor mutexes.
unsafe impl<T: Send> Send for Queue<T> {}
unsafe impl<T: Send> Sync for Queue<T> {}

impl<T> Queue<T> {
    /// Creates a queue that holds at most `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be positive");
        let slots = (0..capacity).map(|_| UnsafeCell::new(None)).collect();
        Self {
            slots,
            push_at: Mutex::new(0),
            pop_at: Mutex::new(0),
            free: Semaphore::new(capacity as u32),
            filled: Semaphore::new(0),
        }
    }

    /// Returns the fixed capacity of the queue.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Appends `item` to the queue, blocking while the queue is full.
    pub fn push(&self, item: T) {
        self.free.acquire(1);
        {
            let mut at = self.push_at.lock();
            // SAFETY: the free-slot permit guarantees `slots[*at]` is vacant,
            // and the cursor mutex keeps other producers away from it.
            unsafe { *self.slots[*at].get() = Some(item) };
            *at = (*at + 1) % self.slots.len();
        }
        self.filled.release(1);
    }

    /// Removes and returns the oldest item, blocking while the queue is
    /// empty.
    pub fn pop(&self) -> T {
        self.filled.acquire(1);
        let item = {
            let mut at = self.pop_at.lock();
            // SAFETY: the filled-slot permit guarantees `slots[*at]` holds an
            // item, and the cursor mutex keeps other consumers away from it.
            let item = unsafe { (*self.slots[*at].get()).take() };
            *at = (*at + 1) % self.slots.len();
            item
        };
        self.free.release(1);
        item.expect("filled permit without an occupied slot")
    }
}
