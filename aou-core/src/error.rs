// Error types for the aou engine

use crate::{Body, HttpResponse, HttpStatus};
use std::fmt;
use thiserror::Error;

/// Structural failures raised while reading a request off the wire.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid request line")]
    InvalidRequestLine,

    #[error("unsupported method: {0}")]
    UnknownMethod(String),

    #[error("unsupported HTTP version")]
    InvalidVersion,

    #[error("invalid header")]
    InvalidHeader,

    #[error("too many headers")]
    TooManyHeaders,

    #[error("request head exceeds {0} bytes")]
    HeadTooLarge(usize),

    #[error("missing Host header")]
    MissingHost,

    #[error("invalid Content-Length")]
    InvalidContentLength,

    #[error("both Content-Length and Transfer-Encoding are present")]
    ConflictingFraming,

    #[error("unsupported Transfer-Encoding: {0}")]
    UnsupportedTransferEncoding(String),

    #[error("invalid chunked body")]
    InvalidChunk,

    #[error("request target is not a path")]
    InvalidTarget,

    #[error("request is incomplete")]
    Incomplete,

    #[error("body exceeds {0} bytes")]
    BodyTooLarge(usize),
}

impl From<httparse::Error> for ParseError {
    fn from(err: httparse::Error) -> Self {
        match err {
            httparse::Error::Version => ParseError::InvalidVersion,
            httparse::Error::HeaderName | httparse::Error::HeaderValue => ParseError::InvalidHeader,
            httparse::Error::TooManyHeaders => ParseError::TooManyHeaders,
            _ => ParseError::InvalidRequestLine,
        }
    }
}

/// Invalid route patterns, reported at registration time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("pattern `{0}` must start with '/'")]
    MissingLeadingSlash(String),

    #[error("pattern `{0}` contains an empty placeholder")]
    EmptyPlaceholder(String),

    #[error("pattern `{pattern}` has a malformed segment `{segment}`")]
    MalformedSegment { pattern: String, segment: String },

    #[error("pattern `{0}` declares more than one wildcard")]
    MultipleWildcards(String),

    #[error("wildcard `{name}` must be the last segment of `{pattern}`")]
    WildcardNotLast { pattern: String, name: String },

    #[error("parameter `{name}` appears more than once in `{pattern}`")]
    DuplicateParam { pattern: String, name: String },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("malformed request: {0}")]
    MalformedRequest(ParseError),

    #[error("payload too large: limit is {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("route not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Domain(DomainError),

    #[error("handler failed: {0}")]
    Handler(String),

    #[error("handler panicked: {0}")]
    Panic(String),

    #[error("invalid route pattern: {0}")]
    InvalidPattern(#[from] PatternError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap any displayable failure as a handler failure.
    ///
    /// The message is logged by the interceptor but never written to the client.
    pub fn handler(err: impl fmt::Display) -> Self {
        Error::Handler(err.to_string())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::MalformedRequest(_) => HttpStatus::BadRequest.code(),
            Error::PayloadTooLarge { .. } => HttpStatus::PayloadTooLarge.code(),
            Error::NotFound(_) => HttpStatus::NotFound.code(),
            Error::Domain(domain) => domain.status(),
            _ => HttpStatus::InternalServerError.code(),
        }
    }

    /// Get the HttpStatus enum for this error
    pub fn http_status(&self) -> HttpStatus {
        HttpStatus::from_code(self.status_code()).unwrap_or(HttpStatus::InternalServerError)
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status_code())
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::BodyTooLarge(limit) => Error::PayloadTooLarge { limit },
            other => Error::MalformedRequest(other),
        }
    }
}

impl From<DomainError> for Error {
    fn from(err: DomainError) -> Self {
        Error::Domain(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Handler(err.to_string())
    }
}

/// An application error that carries the complete response to send.
///
/// This is the only way for handler code to customize a non-2xx response
/// from the error path; everything else collapses into a generic 500.
///
/// ```
/// use aou_core::{DomainError, Error};
///
/// let err: Error = DomainError::new(404, "ooops").into();
/// assert_eq!(err.status_code(), 404);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DomainError {
    response: HttpResponse,
}

impl DomainError {
    /// Status used when a dynamic payload omits `status`.
    pub const DEFAULT_STATUS: u16 = 400;

    pub fn new(status: u16, body: impl Into<Body>) -> Self {
        Self {
            response: HttpResponse::new(status).with_body(body.into()),
        }
    }

    /// Build from a dynamic `{ status, headers, body | data }` payload.
    pub fn from_value(value: serde_json::Value) -> Self {
        let response = match value {
            serde_json::Value::Object(map) => {
                crate::reply::explicit_response(map, Self::DEFAULT_STATUS)
            }
            other => HttpResponse::new(Self::DEFAULT_STATUS)
                .with_body(crate::reply::body_from_value(other)),
        };
        Self { response }
    }

    pub fn from_response(response: HttpResponse) -> Self {
        Self { response }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.response = self.response.with_header(name, value);
        self
    }

    pub fn status(&self) -> u16 {
        self.response.status
    }

    pub fn response(&self) -> &HttpResponse {
        &self.response
    }

    pub fn into_response(self) -> HttpResponse {
        self.response
    }
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "domain error with status {}", self.response.status)
    }
}

impl std::error::Error for DomainError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::MalformedRequest(ParseError::InvalidHeader).status_code(), 400);
        assert_eq!(Error::PayloadTooLarge { limit: 10 }.status_code(), 413);
        assert_eq!(Error::NotFound("GET /".into()).status_code(), 404);
        assert_eq!(Error::handler("boom").status_code(), 500);
        assert_eq!(Error::Panic("boom".into()).status_code(), 500);
    }

    #[test]
    fn test_body_too_large_becomes_payload_error() {
        let err: Error = ParseError::BodyTooLarge(1024).into();
        assert!(matches!(err, Error::PayloadTooLarge { limit: 1024 }));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_domain_error_carries_status() {
        let err: Error = DomainError::new(404, "ooops").into();
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.http_status(), HttpStatus::NotFound);
    }

    #[test]
    fn test_domain_error_from_value_defaults_to_400() {
        let err = DomainError::from_value(json!({ "body": "nope" }));
        assert_eq!(err.status(), 400);
        assert_eq!(err.response().body, Body::Text("nope".into()));
    }

    #[test]
    fn test_domain_error_from_value_keeps_headers() {
        let err = DomainError::from_value(json!({
            "status": 418,
            "headers": { "Content-type": "text/html" },
            "body": "<h1>teapot</h1>"
        }));
        assert_eq!(err.status(), 418);
        assert_eq!(err.response().header("content-type"), Some("text/html"));
    }

    #[test]
    fn test_httparse_error_mapping() {
        assert_eq!(ParseError::from(httparse::Error::Version), ParseError::InvalidVersion);
        assert_eq!(ParseError::from(httparse::Error::HeaderName), ParseError::InvalidHeader);
        assert_eq!(ParseError::from(httparse::Error::Token), ParseError::InvalidRequestLine);
    }
}
