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

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::*;

#[test]
#[should_panic(expected = "capacity must be positive")]
fn test_zero_capacity_panics() {
    let _ = Queue::<u32>::new(0);
}

#[test]
fn test_fifo_single_thread() {
    let queue = Queue::new(4);
    for i in 0..4 {
        queue.push(i);
    }
    for i in 0..4 {
        assert_eq!(queue.pop(), i);
    }
}

#[test]
fn test_push_blocks_when_full() {
    let queue = Arc::new(Queue::new(1));
    queue.push(1u32);
    let producer = {
        let queue = queue.clone();
        thread::spawn(move || queue.push(2))
    };
    thread::sleep(Duration::from_millis(50));
    assert!(!producer.is_finished());
    assert_eq!(queue.pop(), 1);
    producer.join().unwrap();
    assert_eq!(queue.pop(), 2);
}

#[test]
fn test_pop_blocks_when_empty() {
    let queue = Arc::new(Queue::new(1));
    let consumer = {
        let queue = queue.clone();
        thread::spawn(move || queue.pop())
    };
    thread::sleep(Duration::from_millis(50));
    assert!(!consumer.is_finished());
    queue.push(7u32);
    assert_eq!(consumer.join().unwrap(), 7);
}

#[test]
fn test_wraps_around_capacity() {
    let queue = Queue::new(3);
    for round in 0..5 {
        for i in 0..3 {
            queue.push(round * 3 + i);
        }
        for i in 0..3 {
            assert_eq!(queue.pop(), round * 3 + i);
        }
    }
}

#[test]
fn test_mpmc_preserves_items_and_producer_order() {
    const PRODUCERS: usize = 4;
    const CONSUMERS: usize = 3;
    const PER_PRODUCER: usize = 200;

    let queue = Arc::new(Queue::new(8));
    let mut producers = Vec::new();
    for p in 0..PRODUCERS {
        let queue = queue.clone();
        producers.push(thread::spawn(move || {
            for i in 0..PER_PRODUCER {
                queue.push((p, i));
            }
        }));
    }

    let mut consumers = Vec::new();
    for _ in 0..CONSUMERS {
        let queue = queue.clone();
        consumers.push(thread::spawn(move || {
            let mut seen = Vec::new();
            loop {
                let (p, i) = queue.pop();
                if p == usize::MAX {
                    return seen;
                }
                seen.push((p, i));
            }
        }));
    }

    for producer in producers {
        producer.join().unwrap();
    }
    for _ in 0..CONSUMERS {
        queue.push((usize::MAX, 0));
    }

    let mut total = 0;
    let mut counts: HashMap<(usize, usize), usize> = HashMap::new();
    for consumer in consumers {
        let seen = consumer.join().unwrap();
        total += seen.len();
        // Within one consumer, items from a single producer arrive in
        // submission order.
        let mut last: HashMap<usize, usize> = HashMap::new();
        for (p, i) in seen {
            if let Some(prev) = last.insert(p, i) {
                assert!(prev < i, "producer {p} reordered: {prev} before {i}");
            }
            *counts.entry((p, i)).or_default() += 1;
        }
    }

    assert_eq!(total, PRODUCERS * PER_PRODUCER);
    for p in 0..PRODUCERS {
        for i in 0..PER_PRODUCER {
            assert_eq!(counts.get(&(p, i)), Some(&1), "lost or duplicated ({p}, {i})");
        }
    }
}
