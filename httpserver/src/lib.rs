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

//! A small concurrent HTTP/1.1 file server built on blocking sync primitives.
//!
//! The crate is organized around three reusable concurrency building blocks
//! and the server that composes them:
//!
//! * [`semaphore::Semaphore`]: a blocking counting semaphore. Every other
//!   primitive in this crate is built on top of it.
//! * [`queue::Queue`]: a bounded FIFO queue that hands accepted connections
//!   from the acceptor thread to a fixed pool of workers.
//! * [`rwlock::RwLock`]: a reader-writer lock with a selectable fairness
//!   policy (reader-priority, writer-priority, or N-way fair).
//! * [`registry::LockRegistry`]: interns one [`rwlock::RwLock`] per request
//!   path so that requests for the same file are serialized while requests
//!   for distinct files proceed independently.
//! * [`server::Server`]: the acceptor loop, worker pool, and dispatcher.
//!
//! The HTTP surface is intentionally narrow: `GET` streams a file back to
//! the client, `PUT` persists the request body, and every completed request
//! is recorded on the [`audit::AuditLog`]. There is no TLS, keep-alive, or
//! chunked transfer encoding.

pub mod audit;
pub mod handler;
pub mod http;
pub mod queue;
pub mod registry;
pub mod rwlock;
pub mod semaphore;
pub mod server;
