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

//! `GET` and `PUT` semantics against the local filesystem.
//!
//! Handlers run while the per-path lock is held: `GET` under a read guard,
//! `PUT` under a write guard, so the open-then-create sequence of `PUT`
//! cannot race another request for the same path. Each handler reports
//! whether it already streamed a response; when it did not, the dispatcher
//! follows up with the canned response for the reported status.

use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Read;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::path::PathBuf;

use crate::http;
use crate::http::Request;
use crate::http::Status;

#[cfg(test)]
mod tests;

/// What a handler did and how it ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Outcome {
    /// The status to record on the audit log (and to answer with, if no
    /// response was streamed).
    pub status: Status,
    /// Whether the handler already wrote a response to the client.
    pub responded: bool,
}

impl Outcome {
    fn canned(status: Status) -> Self {
        Self {
            status,
            responded: false,
        }
    }

    fn streamed(status: Status) -> Self {
        Self {
            status,
            responded: true,
        }
    }
}

/// Serves `GET uri`: streams the file under `root` back to the client.
///
/// Directories are refused with 403. On success the response (status line,
/// `Content-Length`, body) is written to `out` directly; error statuses
/// are left for the dispatcher to answer.
pub fn get<W: Write>(root: &Path, uri: &str, out: &mut W) -> Outcome {
    let path = resolve(root, uri);
    let mut file = match File::open(&path) {
        Ok(file) => file,
        Err(err) => return Outcome::canned(read_error_status(&err)),
    };
    let metadata = match file.metadata() {
        Ok(metadata) => metadata,
        Err(err) => {
            log::warn!("stat {} failed: {err}", path.display());
            return Outcome::canned(Status::InternalServerError);
        }
    };
    if metadata.is_dir() {
        return Outcome::canned(Status::Forbidden);
    }

    if let Err(err) = http::write_head(out, Status::Ok, metadata.len()) {
        log::debug!("client went away before the response head: {err}");
        return Outcome::streamed(Status::Ok);
    }
    if let Err(err) = io::copy(&mut file, out).and_then(|_| out.flush()) {
        log::debug!("client went away mid-body: {err}");
    }
    Outcome::streamed(Status::Ok)
}

/// Serves `PUT uri`: persists the request body to the file under `root`.
///
/// Truncates an existing file (200) or creates a missing one with mode
/// 0666 (201). The body is the already-buffered prefix followed by
/// whatever remains on the socket, bounded by `Content-Length`.
pub fn put<R: Read>(root: &Path, request: &Request, body: &mut R) -> Outcome {
    let content_length = match request.header(http::CONTENT_LENGTH_HEADER) {
        Some(value) => match http::parse_content_length(value) {
            Some(length) => length,
            None => return Outcome::canned(Status::BadRequest),
        },
        None => return Outcome::canned(Status::BadRequest),
    };

    let path = resolve(root, request.uri());
    let (mut file, status) = match OpenOptions::new().write(true).truncate(true).open(&path) {
        Ok(file) => (file, Status::Ok),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            match OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o666)
                .open(&path)
            {
                Ok(file) => (file, Status::Created),
                Err(err) => return Outcome::canned(write_error_status(&err)),
            }
        }
        Err(err) => return Outcome::canned(write_error_status(&err)),
    };

    let prefix = request.body_prefix();
    let buffered = prefix.len().min(content_length as usize);
    if let Err(err) = file.write_all(&prefix[..buffered]) {
        log::warn!("write {} failed: {err}", path.display());
        return Outcome::canned(Status::InternalServerError);
    }
    let remaining = content_length - buffered as u64;
    match io::copy(&mut body.take(remaining), &mut file) {
        Ok(copied) if copied < remaining => {
            // The client promised more bytes than it sent; keep what
            // arrived and report the open status regardless.
            log::debug!(
                "short body for {}: got {} of {remaining} trailing bytes",
                path.display(),
                copied
            );
        }
        Ok(_) => {}
        Err(err) => {
            log::warn!("write {} failed: {err}", path.display());
            return Outcome::canned(Status::InternalServerError);
        }
    }
    Outcome::canned(status)
}

fn resolve(root: &Path, uri: &str) -> PathBuf {
    // The grammar guarantees a leading slash and no further separators.
    root.join(uri.trim_start_matches('/'))
}

fn read_error_status(err: &io::Error) -> Status {
    match err.raw_os_error() {
        Some(libc::EACCES | libc::ENAMETOOLONG | libc::EPERM | libc::EROFS) => Status::Forbidden,
        Some(libc::ENOENT) => Status::NotFound,
        _ => Status::InternalServerError,
    }
}

fn write_error_status(err: &io::Error) -> Status {
    match err.raw_os_error() {
        Some(libc::EISDIR | libc::EACCES | libc::ENAMETOOLONG | libc::EPERM | libc::EROFS) => {
            Status::Forbidden
        }
        _ => Status::InternalServerError,
    }
}
