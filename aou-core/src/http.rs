// HTTP request type

use crate::parser::{self, ParseLimits};
use crate::{DomainError, Error, HttpMethod};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;

/// Protocol versions the engine speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpVersion {
    Http10,
    Http11,
}

impl HttpVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpVersion::Http10 => "HTTP/1.0",
            HttpVersion::Http11 => "HTTP/1.1",
        }
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed HTTP request.
///
/// Header names are stored lower-cased; repeated headers are joined with
/// `", "`. `path` is fully percent-decoded while `raw_path` keeps the bytes
/// received so the router can split on `/` before decoding each segment.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub path: String,
    pub raw_path: String,
    pub version: HttpVersion,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub path_params: HashMap<String, String>,
    pub query_params: HashMap<String, String>,
}

impl HttpRequest {
    /// Build a request from a method and a request target such as `/users/1?page=2`.
    pub fn new(method: HttpMethod, target: &str) -> Self {
        let (raw_path, query) = match memchr::memchr(b'?', target.as_bytes()) {
            Some(idx) => (&target[..idx], &target[idx + 1..]),
            None => (target, ""),
        };
        Self {
            method,
            path: parser::percent_decode(raw_path),
            raw_path: raw_path.to_string(),
            version: HttpVersion::Http11,
            headers: HashMap::new(),
            body: Vec::new(),
            path_params: HashMap::new(),
            query_params: parser::parse_query(query),
        }
    }

    /// Parse a complete request held in memory, without any network I/O.
    ///
    /// This entry point is lenient about body framing: a request without a
    /// declared length takes everything after the head as its body, and a
    /// declared `Content-Length` longer than the available bytes is truncated.
    ///
    /// ```
    /// use aou_core::HttpRequest;
    ///
    /// let req = HttpRequest::from_text(
    ///     "GET /route/f?test=1?&query=x HTTP/1.1\r\nHost: localhost\r\n\r\n",
    /// ).unwrap();
    /// assert_eq!(req.path, "/route/f");
    /// assert_eq!(req.query("query"), Some("x"));
    /// ```
    pub fn from_text(raw: &str) -> Result<Self, Error> {
        Self::from_bytes(raw.as_bytes())
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self, Error> {
        parser::parse_complete(raw, &ParseLimits::default())
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Parse the request body as JSON.
    ///
    /// A body that does not deserialize is the client's fault and surfaces
    /// as a 400 domain error.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.body)
            .map_err(|_| DomainError::new(400, "Invalid JSON body").into())
    }

    /// The body as UTF-8 text.
    pub fn text(&self) -> Result<&str, Error> {
        std::str::from_utf8(&self.body)
            .map_err(|_| DomainError::new(400, "Body is not valid UTF-8").into())
    }

    /// Get a path parameter by name
    pub fn param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    /// Get a query parameter by name
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query_params.get(name).map(String::as_str)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        match self.headers.get(name) {
            Some(value) => Some(value.as_str()),
            None => self
                .headers
                .get(&name.to_ascii_lowercase())
                .map(String::as_str),
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Whether the client allows the connection to stay open after this request.
    pub fn keep_alive(&self) -> bool {
        let connection = self.header("connection").map(str::to_ascii_lowercase);
        let has_token = |token: &str| {
            connection
                .as_deref()
                .is_some_and(|value| value.split(',').any(|t| t.trim() == token))
        };
        match self.version {
            HttpVersion::Http11 => !has_token("close"),
            HttpVersion::Http10 => has_token("keep-alive"),
        }
    }
}
