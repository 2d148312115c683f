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

use std::fs;
use std::io::Cursor;

use super::*;
use crate::http::read_request;

fn request(raw: &[u8]) -> Request {
    read_request(&mut Cursor::new(raw.to_vec())).unwrap()
}

#[test]
fn test_get_missing_file() {
    let root = tempfile::tempdir().unwrap();
    let mut out = Vec::new();
    let outcome = get(root.path(), "/missing", &mut out);
    assert_eq!(outcome, Outcome { status: Status::NotFound, responded: false });
    assert!(out.is_empty());
}

#[test]
fn test_get_streams_file() {
    let root = tempfile::tempdir().unwrap();
    fs::write(root.path().join("a"), b"hello").unwrap();
    let mut out = Vec::new();
    let outcome = get(root.path(), "/a", &mut out);
    assert_eq!(outcome, Outcome { status: Status::Ok, responded: true });
    assert_eq!(out, b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello");
}

#[test]
fn test_get_empty_file() {
    let root = tempfile::tempdir().unwrap();
    fs::write(root.path().join("empty"), b"").unwrap();
    let mut out = Vec::new();
    let outcome = get(root.path(), "/empty", &mut out);
    assert_eq!(outcome, Outcome { status: Status::Ok, responded: true });
    assert_eq!(out, b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
}

#[test]
fn test_get_directory_is_forbidden() {
    let root = tempfile::tempdir().unwrap();
    fs::create_dir(root.path().join("dir")).unwrap();
    let mut out = Vec::new();
    let outcome = get(root.path(), "/dir", &mut out);
    assert_eq!(outcome, Outcome { status: Status::Forbidden, responded: false });
    assert!(out.is_empty());
}

#[test]
fn test_put_creates_missing_file() {
    let root = tempfile::tempdir().unwrap();
    let req = request(b"PUT /a HTTP/1.1\r\nRequest-Id: 2\r\nContent-Length: 5\r\n\r\nhello");
    let outcome = put(root.path(), &req, &mut Cursor::new(Vec::new()));
    assert_eq!(outcome, Outcome { status: Status::Created, responded: false });
    assert_eq!(fs::read(root.path().join("a")).unwrap(), b"hello");
}

#[test]
fn test_put_truncates_existing_file() {
    let root = tempfile::tempdir().unwrap();
    fs::write(root.path().join("a"), b"previous contents").unwrap();
    let req = request(b"PUT /a HTTP/1.1\r\nRequest-Id: 2\r\nContent-Length: 5\r\n\r\nhello");
    let outcome = put(root.path(), &req, &mut Cursor::new(Vec::new()));
    assert_eq!(outcome, Outcome { status: Status::Ok, responded: false });
    assert_eq!(fs::read(root.path().join("a")).unwrap(), b"hello");
}

#[test]
fn test_put_drains_body_from_stream() {
    // Only part of the body arrived with the head; the rest is still on
    // the socket.
    let root = tempfile::tempdir().unwrap();
    let req = request(b"PUT /a HTTP/1.1\r\nRequest-Id: 9\r\nContent-Length: 10\r\n\r\nhel");
    assert_eq!(req.body_prefix(), b"hel");
    let outcome = put(root.path(), &req, &mut Cursor::new(b"lo world!?".to_vec()));
    assert_eq!(outcome.status, Status::Created);
    assert_eq!(fs::read(root.path().join("a")).unwrap(), b"hello worl");
}

#[test]
fn test_put_ignores_bytes_past_content_length() {
    let root = tempfile::tempdir().unwrap();
    let req = request(b"PUT /a HTTP/1.1\r\nRequest-Id: 9\r\nContent-Length: 2\r\n\r\nhello");
    let outcome = put(root.path(), &req, &mut Cursor::new(Vec::new()));
    assert_eq!(outcome.status, Status::Created);
    assert_eq!(fs::read(root.path().join("a")).unwrap(), b"he");
}

#[test]
fn test_put_requires_content_length() {
    let root = tempfile::tempdir().unwrap();
    let req = request(b"PUT /a HTTP/1.1\r\nRequest-Id: 9\r\n\r\n");
    let outcome = put(root.path(), &req, &mut Cursor::new(Vec::new()));
    assert_eq!(outcome, Outcome { status: Status::BadRequest, responded: false });
    assert!(!root.path().join("a").exists());
}

#[test]
fn test_put_rejects_bad_content_length() {
    let root = tempfile::tempdir().unwrap();
    let req = request(b"PUT /a HTTP/1.1\r\nRequest-Id: 9\r\nContent-Length: -1\r\n\r\n");
    let outcome = put(root.path(), &req, &mut Cursor::new(Vec::new()));
    assert_eq!(outcome.status, Status::BadRequest);
}

#[test]
fn test_put_on_directory_is_forbidden() {
    let root = tempfile::tempdir().unwrap();
    fs::create_dir(root.path().join("dir")).unwrap();
    let req = request(b"PUT /dir HTTP/1.1\r\nRequest-Id: 9\r\nContent-Length: 0\r\n\r\n");
    let outcome = put(root.path(), &req, &mut Cursor::new(Vec::new()));
    assert_eq!(outcome, Outcome { status: Status::Forbidden, responded: false });
}

#[test]
fn test_put_short_body_keeps_what_arrived() {
    let root = tempfile::tempdir().unwrap();
    let req = request(b"PUT /a HTTP/1.1\r\nRequest-Id: 9\r\nContent-Length: 10\r\n\r\nhi");
    let outcome = put(root.path(), &req, &mut Cursor::new(Vec::new()));
    assert_eq!(outcome.status, Status::Created);
    assert_eq!(fs::read(root.path().join("a")).unwrap(), b"hi");
}
