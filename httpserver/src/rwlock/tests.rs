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

use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Barrier;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use super::*;

#[test]
#[should_panic(expected = "positive quota")]
fn test_nway_zero_quota_panics() {
    let _ = RwLock::new(Policy::NWay(0));
}

#[test]
fn test_policy_accessor() {
    assert_eq!(RwLock::new(Policy::ReaderPriority).policy(), Policy::ReaderPriority);
    assert_eq!(RwLock::new(Policy::WriterPriority).policy(), Policy::WriterPriority);
    assert_eq!(RwLock::new(Policy::NWay(3)).policy(), Policy::NWay(3));
}

fn assert_mutual_exclusion(policy: Policy) {
    let lock = Arc::new(RwLock::new(policy));
    let readers_in = Arc::new(AtomicU32::new(0));
    let writers_in = Arc::new(AtomicU32::new(0));

    let mut handles = Vec::new();
    for i in 0..8 {
        let lock = lock.clone();
        let readers_in = readers_in.clone();
        let writers_in = writers_in.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..50 {
                if i % 2 == 0 {
                    let _guard = lock.read();
                    readers_in.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(writers_in.load(Ordering::SeqCst), 0);
                    readers_in.fetch_sub(1, Ordering::SeqCst);
                } else {
                    let _guard = lock.write();
                    assert_eq!(writers_in.fetch_add(1, Ordering::SeqCst), 0);
                    assert_eq!(readers_in.load(Ordering::SeqCst), 0);
                    writers_in.fetch_sub(1, Ordering::SeqCst);
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_mutual_exclusion_reader_priority() {
    assert_mutual_exclusion(Policy::ReaderPriority);
}

#[test]
fn test_mutual_exclusion_writer_priority() {
    assert_mutual_exclusion(Policy::WriterPriority);
}

#[test]
fn test_mutual_exclusion_nway() {
    assert_mutual_exclusion(Policy::NWay(2));
}

#[test]
fn test_readers_run_in_parallel() {
    // Both readers must be inside the critical section at the same time for
    // the barrier to be passed.
    let lock = Arc::new(RwLock::new(Policy::ReaderPriority));
    let barrier = Arc::new(Barrier::new(2));
    let mut handles = Vec::new();
    for _ in 0..2 {
        let lock = lock.clone();
        let barrier = barrier.clone();
        handles.push(thread::spawn(move || {
            let _guard = lock.read();
            barrier.wait();
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_readers_unthrottled_without_writer_nway() {
    // With no writer waiting, the window quota does not throttle readers.
    let lock = Arc::new(RwLock::new(Policy::NWay(1)));
    let barrier = Arc::new(Barrier::new(4));
    let mut handles = Vec::new();
    for _ in 0..4 {
        let lock = lock.clone();
        let barrier = barrier.clone();
        handles.push(thread::spawn(move || {
            let _guard = lock.read();
            barrier.wait();
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_writer_priority_blocks_later_readers() {
    let lock = Arc::new(RwLock::new(Policy::WriterPriority));
    let order = Arc::new(Mutex::new(Vec::new()));

    let first_reader = lock.read();

    let writer = {
        let lock = lock.clone();
        let order = order.clone();
        thread::spawn(move || {
            let _guard = lock.write();
            order.lock().push("writer");
        })
    };
    // Let the writer enqueue behind the held read lock.
    thread::sleep(Duration::from_millis(50));

    let late_reader = {
        let lock = lock.clone();
        let order = order.clone();
        thread::spawn(move || {
            let _guard = lock.read();
            order.lock().push("reader");
        })
    };
    // The late reader must not slip past the queued writer.
    thread::sleep(Duration::from_millis(50));
    assert!(!late_reader.is_finished());
    assert!(order.lock().is_empty());

    drop(first_reader);
    writer.join().unwrap();
    late_reader.join().unwrap();
    assert_eq!(*order.lock(), vec!["writer", "reader"]);
}

#[test]
fn test_nway_quota_bounds_readers_while_writer_waits() {
    const QUOTA: u32 = 2;
    let lock = Arc::new(RwLock::new(Policy::NWay(QUOTA)));
    let order = Arc::new(Mutex::new(Vec::new()));

    // One reader is already in, consuming one slot of the window quota.
    let first_reader = lock.read();
    order.lock().push("reader");

    let writer = {
        let lock = lock.clone();
        let order = order.clone();
        thread::spawn(move || {
            let _guard = lock.write();
            order.lock().push("writer");
        })
    };
    thread::sleep(Duration::from_millis(50));

    let mut readers = Vec::new();
    for _ in 0..4 {
        let lock = lock.clone();
        let order = order.clone();
        readers.push(thread::spawn(move || {
            let _guard = lock.read();
            order.lock().push("reader");
            thread::sleep(Duration::from_millis(20));
        }));
    }
    thread::sleep(Duration::from_millis(50));

    drop(first_reader);
    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    let order = order.lock();
    let writer_at = order.iter().position(|e| *e == "writer").unwrap();
    assert!(
        writer_at as u32 <= QUOTA,
        "writer admitted after {writer_at} readers, quota is {QUOTA}: {order:?}"
    );
    assert_eq!(order.len(), 6);
}

#[test]
fn test_writers_serialize() {
    let lock = Arc::new(RwLock::new(Policy::ReaderPriority));
    let counter = Arc::new(AtomicU32::new(0));
    let mut handles = Vec::new();
    for _ in 0..4 {
        let lock = lock.clone();
        let counter = counter.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..100 {
                let _guard = lock.write();
                let v = counter.load(Ordering::Relaxed);
                counter.store(v + 1, Ordering::Relaxed);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(counter.load(Ordering::Relaxed), 400);
}
