//! Request and response types exchanged with sync endpoints.
//!
//! The wire surface is HTTP-shaped: a method, a path, query parameters and a
//! body in, a status code and a body out. Record-carrying bodies hold one
//! text record per line (see `outpost_core` for the record formats).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;

use crate::error::{Result, SyncError};

/// Request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

/// Status codes used by the endpoints.
pub mod status {
    pub const OK: u16 = 200;
    pub const BAD_REQUEST: u16 = 400;
    pub const NOT_FOUND: u16 = 404;
    pub const METHOD_NOT_ALLOWED: u16 = 405;
    pub const CONFLICT: u16 = 409;
    pub const INTERNAL_ERROR: u16 = 500;
}

/// Log sync paths, relative to the endpoint.
pub mod paths {
    pub const QUERY: &str = "query";
    pub const SEND: &str = "send";
    pub const RECEIVE: &str = "receive";
    pub const SEND_IDS: &str = "sendids";
    pub const RECEIVE_IDS: &str = "receiveids";
}

/// Query parameter names.
pub mod params {
    /// Target id filter.
    pub const TARGET_ID: &str = "tid";
    /// Store id filter.
    pub const LOG_ID: &str = "logid";
    /// Range set restricting `receive`.
    pub const RANGE: &str = "range";
    /// Generic filter expression. Not supported; rejected with 400.
    pub const FILTER: &str = "filter";
    pub const CUSTOMER: &str = "customer";
    pub const NAME: &str = "name";
    pub const VERSION: &str = "version";
}

/// A request to an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    /// Path relative to the endpoint; leading and trailing `/` are ignored.
    pub path: String,
    pub params: BTreeMap<String, String>,
    pub body: Bytes,
}

impl Request {
    /// A GET request without parameters.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            params: BTreeMap::new(),
            body: Bytes::new(),
        }
    }

    /// A POST request carrying `body`.
    pub fn post(path: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            params: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// Add a query parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    /// Add a query parameter if `value` is present.
    pub fn with_opt_param<V: ToString>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.with_param(key, value),
            None => self,
        }
    }

    /// Path with surrounding slashes removed, used for routing.
    pub fn route(&self) -> &str {
        self.path.trim_matches('/')
    }

    /// Look up a query parameter.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Parse an optional query parameter.
    pub fn parse_param<T: FromStr>(&self, key: &str) -> std::result::Result<Option<T>, String> {
        self.param(key)
            .map(|raw| {
                raw.parse()
                    .map_err(|_| format!("malformed parameter {}: {}", key, raw))
            })
            .transpose()
    }
}

/// A response from an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: Bytes,
}

impl Response {
    /// Build a response with an arbitrary status.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// 200 with a body.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(status::OK, body)
    }

    /// 200 with an empty body.
    pub fn ok_empty() -> Self {
        Self::new(status::OK, Bytes::new())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(status::BAD_REQUEST, message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(status::NOT_FOUND, message.into())
    }

    pub fn method_not_allowed(method: Method) -> Self {
        Self::new(status::METHOD_NOT_ALLOWED, format!("{} not allowed", method))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(status::CONFLICT, message.into())
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(status::INTERNAL_ERROR, message.into())
    }

    /// Whether the status is 200.
    pub fn is_ok(&self) -> bool {
        self.status == status::OK
    }

    /// The body as UTF-8 text.
    pub fn text(&self) -> Result<&str> {
        std::str::from_utf8(&self.body).map_err(|e| SyncError::InvalidResponse(e.to_string()))
    }

    /// Convert a non-200 response into [`SyncError::BadStatus`].
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(SyncError::BadStatus {
                status: self.status,
                body: String::from_utf8_lossy(&self.body).into_owned(),
            })
        }
    }
}

/// Render records as a newline-terminated body.
pub fn to_lines<'a, T, I>(records: I) -> Bytes
where
    T: fmt::Display + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut body = String::new();
    for record in records {
        body.push_str(&record.to_string());
        body.push('\n');
    }
    Bytes::from(body)
}

/// Parse one record per non-blank line.
///
/// Returns the records that parsed and the lines that did not; callers
/// decide whether a bad line fails the batch.
pub fn parse_lines<T: FromStr>(text: &str) -> (Vec<T>, Vec<String>) {
    let mut records = Vec::new();
    let mut rejected = Vec::new();
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        match line.parse() {
            Ok(record) => records.push(record),
            Err(_) => rejected.push(line.to_string()),
        }
    }
    (records, rejected)
}

/// [`parse_lines`] over a raw body, decoding each line on its own.
///
/// A line that is not UTF-8 is rejected without affecting its neighbours.
pub fn parse_body_lines<T: FromStr>(body: &[u8]) -> (Vec<T>, Vec<String>) {
    let mut records = Vec::new();
    let mut rejected = Vec::new();
    for line in body.split(|&b| b == b'\n') {
        match std::str::from_utf8(line) {
            Ok(text) => {
                let (parsed, bad) = parse_lines(text);
                records.extend(parsed);
                rejected.extend(bad);
            }
            Err(_) => rejected.push(String::from_utf8_lossy(line).into_owned()),
        }
    }
    (records, rejected)
}
