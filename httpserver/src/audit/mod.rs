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

//! The audit log: one line per completed request.
//!
//! Every `GET` or `PUT` that reaches its handler produces a record of the
//! form `METHOD,/URI,STATUS,REQUEST_ID`. The dispatcher writes the record
//! after the handler returns and before the per-path lock is released, so
//! for two conflicting requests the order of their audit lines matches the
//! order in which they observed the filesystem.
//!
//! The default sink is stderr. Tests (or embedders) can substitute any
//! writer. Each record is emitted as a single `write_all` call so lines
//! from concurrent workers do not interleave.

use std::io;
use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::http::Method;
use crate::http::Status;


/// A shared handle to the audit sink.
///
/// Clones refer to the same sink. See the
/// [module level documentation](self) for the record format.
#[derive(Clone)]
pub struct AuditLog {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl AuditLog {
    /// An audit log writing to stderr, the production sink.
    pub fn stderr() -> Self {
        Self::with_sink(io::stderr())
    }

    /// An audit log writing to an arbitrary sink.
    pub fn with_sink<W: Write + Send + 'static>(sink: W) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(sink))),
        }
    }

    /// Records one completed request. Sink errors are swallowed; auditing
    /// must never take a worker down.
    pub fn record(&self, method: Method, uri: &str, status: Status, request_id: &str) {
        let line = format!("{},{},{},{}\n", method.as_str(), uri, status.code(), request_id);
        let mut sink = self.sink.lock();
        if let Err(err) = sink.write_all(line.as_bytes()).and_then(|()| sink.flush()) {
            log::warn!("audit record dropped: {err}");
        }
    }
}
