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

//! The HTTP/1.1 surface: request parsing, status codes, canned responses.
//!
//! The accepted grammar is deliberately narrow. A request line is
//! `METHOD SP /URI SP HTTP/x.y CRLF` where the method is 1 to 8 alphabetic
//! characters and the URI is 1 to 63 characters drawn from
//! `[A-Za-z0-9.-]` after the mandatory leading slash. Headers are
//! `KEY: VALUE` pairs of bounded printable ASCII, terminated by an empty
//! line. The whole head may not exceed [`MAX_HEAD_BYTES`].
//!
//! [`read_request`] consumes bytes from a stream until the head is
//! complete; whatever it reads past the head terminator is kept in the
//! request as the already-buffered body prefix, which `PUT` handling picks
//! up before draining the rest of the body from the socket.

use std::fmt;
use std::io;
use std::io::Read;
use std::io::Write;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;


/// Maximum size of the request line plus headers, in bytes.
pub const MAX_HEAD_BYTES: usize = 2048;

/// Header carrying the client-chosen id echoed in audit records.
pub const REQUEST_ID_HEADER: &str = "Request-Id";

/// Header carrying the `PUT` body length.
pub const CONTENT_LENGTH_HEADER: &str = "Content-Length";

static REQUEST_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z]{1,8}) (/[A-Za-z0-9.-]{1,63}) (HTTP/[0-9]\.[0-9])$").unwrap()
});

static HEADER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z0-9.-]{1,128}): ([ -~]{1,128})$").unwrap());

/// The request methods this server implements.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
}

impl Method {
    fn from_token(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case("GET") {
            Some(Method::Get)
        } else if token.eq_ignore_ascii_case("PUT") {
            Some(Method::Put)
        } else {
            None
        }
    }

    /// The canonical upper-case name of the method.
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The status codes this server emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Ok,
    Created,
    BadRequest,
    Forbidden,
    NotFound,
    InternalServerError,
    NotImplemented,
    VersionNotSupported,
}

impl Status {
    /// The numeric status code.
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::Created => 201,
            Status::BadRequest => 400,
            Status::Forbidden => 403,
            Status::NotFound => 404,
            Status::InternalServerError => 500,
            Status::NotImplemented => 501,
            Status::VersionNotSupported => 505,
        }
    }

    /// The reason phrase sent on the status line.
    pub fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Created => "Created",
            Status::BadRequest => "Bad Request",
            Status::Forbidden => "Forbidden",
            Status::NotFound => "Not Found",
            Status::InternalServerError => "Internal Server Error",
            Status::NotImplemented => "Not Implemented",
            Status::VersionNotSupported => "Version Not Supported",
        }
    }

    /// The fixed human-readable body of a canned response.
    pub fn canned_body(self) -> &'static str {
        match self {
            Status::Ok => "OK\n",
            Status::Created => "Created\n",
            Status::BadRequest => "Bad Request\n",
            Status::Forbidden => "Forbidden\n",
            Status::NotFound => "Not Found\n",
            Status::InternalServerError => "Internal Server Error\n",
            Status::NotImplemented => "Not Implemented\n",
            Status::VersionNotSupported => "Version Not Supported\n",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

/// Why a request could not be parsed into a [`Request`].
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed request head")]
    Malformed,
    #[error("request head exceeds {MAX_HEAD_BYTES} bytes")]
    HeadTooLarge,
    #[error("connection closed before the request head completed")]
    UnexpectedEof,
    #[error("unsupported method {0:?}")]
    UnsupportedMethod(String),
    #[error("unsupported protocol version {0:?}")]
    UnsupportedVersion(String),
    #[error("failed to read the request")]
    Io(#[from] io::Error),
}

impl ParseError {
    /// The status to answer with, or `None` when the connection is beyond
    /// responding (the read itself failed).
    pub fn status(&self) -> Option<Status> {
        match self {
            ParseError::Malformed | ParseError::HeadTooLarge | ParseError::UnexpectedEof => {
                Some(Status::BadRequest)
            }
            ParseError::UnsupportedMethod(_) => Some(Status::NotImplemented),
            ParseError::UnsupportedVersion(_) => Some(Status::VersionNotSupported),
            ParseError::Io(_) => None,
        }
    }
}

/// A parsed request: method, target path, headers, and whatever slice of
/// the body was already read while scanning for the head terminator.
///
/// The request owns the raw read buffer; [`body_prefix`] is a view into it.
///
/// [`body_prefix`]: Request::body_prefix
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: String,
    headers: Vec<(String, String)>,
    buf: Vec<u8>,
    body_start: usize,
}

impl Request {
    /// The request method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// The target path, including the leading slash.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Looks up a header value by ASCII-case-insensitive name. The first
    /// occurrence wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The mandatory `Request-Id` header, if the client sent one.
    pub fn request_id(&self) -> Option<&str> {
        self.header(REQUEST_ID_HEADER)
    }

    /// The body bytes that were read together with the head.
    pub fn body_prefix(&self) -> &[u8] {
        &self.buf[self.body_start..]
    }
}

/// Parses the `Content-Length` value: a plain non-negative decimal.
pub fn parse_content_length(value: &str) -> Option<u64> {
    if value.bytes().all(|b| b.is_ascii_digit()) {
        value.parse().ok()
    } else {
        None
    }
}

/// Reads one request head from `stream` and parses it.
///
/// Reads until the blank-line terminator, at most [`MAX_HEAD_BYTES`] bytes.
/// Bytes past the terminator stay in the returned request as the body
/// prefix.
pub fn read_request<R: Read>(stream: &mut R) -> Result<Request, ParseError> {
    let mut buf = vec![0u8; MAX_HEAD_BYTES];
    let mut len = 0;
    let body_start = loop {
        if let Some(end) = head_end(&buf[..len]) {
            break end;
        }
        if len == buf.len() {
            return Err(ParseError::HeadTooLarge);
        }
        let n = match stream.read(&mut buf[len..]) {
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if n == 0 {
            return Err(ParseError::UnexpectedEof);
        }
        len += n;
    };
    buf.truncate(len);

    let head = std::str::from_utf8(&buf[..body_start - 4]).map_err(|_| ParseError::Malformed)?;
    let mut lines = head.split("\r\n");
    let request_line = lines.next().ok_or(ParseError::Malformed)?;
    let captures = REQUEST_LINE.captures(request_line).ok_or(ParseError::Malformed)?;

    let version = &captures[3];
    if version != "HTTP/1.1" {
        return Err(ParseError::UnsupportedVersion(version.to_owned()));
    }
    let method =
        Method::from_token(&captures[1]).ok_or_else(|| ParseError::UnsupportedMethod(captures[1].to_owned()))?;
    let uri = captures[2].to_owned();

    let mut headers = Vec::new();
    for line in lines {
        let captures = HEADER_LINE.captures(line).ok_or(ParseError::Malformed)?;
        headers.push((captures[1].to_owned(), captures[2].to_owned()));
    }

    Ok(Request {
        method,
        uri,
        headers,
        buf,
        body_start,
    })
}

fn head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|at| at + 4)
}

/// Writes a status line and `Content-Length` header, leaving the body to
/// the caller.
pub fn write_head<W: Write>(out: &mut W, status: Status, content_length: u64) -> io::Result<()> {
    write!(
        out,
        "HTTP/1.1 {} {}\r\n{}: {}\r\n\r\n",
        status.code(),
        status.reason(),
        CONTENT_LENGTH_HEADER,
        content_length
    )
}

/// Writes the fixed response for `status`: status line, `Content-Length`,
/// and the short human-readable body.
pub fn write_canned<W: Write>(out: &mut W, status: Status) -> io::Result<()> {
    let body = status.canned_body();
    write_head(out, status, body.len() as u64)?;
    out.write_all(body.as_bytes())?;
    out.flush()
}
