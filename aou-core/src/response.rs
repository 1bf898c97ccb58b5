// HTTP response type and wire serialization

use crate::status::{forbids_body, reason_phrase};
use crate::{Error, ParseError};
use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use serde_json::Value;
use std::time::SystemTime;
use tracing::warn;

/// Response payload. Exactly one variant is active.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Body {
    #[default]
    Empty,
    /// Sent as-is; the handler is responsible for declaring a content type.
    Text(String),
    /// Serialized on the wire with `application/json`.
    Json(Value),
    /// Passed through with `application/octet-stream` unless overridden.
    Binary(Bytes),
}

impl Body {
    pub fn is_empty(&self) -> bool {
        match self {
            Body::Empty => true,
            Body::Text(text) => text.is_empty(),
            Body::Json(_) => false,
            Body::Binary(bytes) => bytes.is_empty(),
        }
    }

    /// Content type implied by the variant when the handler set none.
    pub fn default_content_type(&self) -> Option<&'static str> {
        match self {
            Body::Json(_) => Some("application/json"),
            Body::Binary(_) => Some("application/octet-stream"),
            Body::Text(_) | Body::Empty => None,
        }
    }

    /// Encoded payload bytes.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Body::Empty => Bytes::new(),
            Body::Text(text) => Bytes::copy_from_slice(text.as_bytes()),
            // Value keys are always strings, so encoding cannot fail.
            Body::Json(value) => serde_json::to_vec(value).map(Bytes::from).unwrap_or_default(),
            Body::Binary(bytes) => bytes.clone(),
        }
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Binary(Bytes::from(bytes))
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Binary(bytes)
    }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        Body::Json(value)
    }
}

/// HTTP response with headers kept in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Body,
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::ok()
    }
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Body::Empty,
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn created() -> Self {
        Self::new(201)
    }

    pub fn no_content() -> Self {
        Self::new(204)
    }

    pub fn bad_request() -> Self {
        Self::new(400)
    }

    pub fn not_found() -> Self {
        Self::new(404)
    }

    pub fn internal_server_error() -> Self {
        Self::new(500)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Set a header, replacing any existing header with the same name (case-insensitive).
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(slot) => slot.1 = value,
            None => self.headers.push((name, value)),
        }
    }

    /// Add a header without replacing earlier ones, e.g. repeated `Set-Cookie`.
    pub fn append_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First header value with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers
            .retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_body(Body::Text(text.into()))
    }

    pub fn with_json<T: Serialize>(self, value: &T) -> Result<Self, Error> {
        Ok(self.with_body(Body::Json(serde_json::to_value(value)?)))
    }

    /// Effective content type: the explicit header, else the body's default.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
            .or_else(|| self.body.default_content_type())
    }

    /// Serialize as a complete HTTP/1.1 response.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = BytesMut::new();
        self.write_wire(&mut out, false, true);
        out.to_vec()
    }

    /// Append the wire form of this response to `out`.
    ///
    /// `head_only` keeps `Content-Length` but omits the payload (HEAD requests).
    /// Headers whose name or value could break framing are dropped.
    pub fn write_wire(&self, out: &mut BytesMut, head_only: bool, keep_alive: bool) {
        let status = self.final_status();
        let payload = if forbids_body(status) {
            Bytes::new()
        } else {
            self.body.to_bytes()
        };

        out.put_slice(b"HTTP/1.1 ");
        out.put_slice(status.to_string().as_bytes());
        out.put_u8(b' ');
        out.put_slice(reason_phrase(status).as_bytes());
        out.put_slice(b"\r\n");

        let mut has_date = false;
        let mut has_content_type = false;
        for (name, value) in &self.headers {
            if !is_valid_header_name(name) || !is_valid_header_value(value) {
                warn!(header = %name.escape_debug(), "Dropping response header with invalid characters");
                continue;
            }
            if name.eq_ignore_ascii_case("content-length")
                || name.eq_ignore_ascii_case("transfer-encoding")
                || name.eq_ignore_ascii_case("connection")
            {
                continue;
            }
            has_date |= name.eq_ignore_ascii_case("date");
            has_content_type |= name.eq_ignore_ascii_case("content-type");
            put_header(out, name, value);
        }

        if !has_content_type && !payload.is_empty() {
            if let Some(content_type) = self.body.default_content_type() {
                put_header(out, "Content-Type", content_type);
            }
        }
        if !forbids_body(status) {
            put_header(out, "Content-Length", &payload.len().to_string());
        }
        if !has_date {
            put_header(out, "Date", &httpdate::fmt_http_date(SystemTime::now()));
        }
        put_header(
            out,
            "Connection",
            if keep_alive { "keep-alive" } else { "close" },
        );
        out.put_slice(b"\r\n");

        if !head_only {
            out.put_slice(&payload);
        }
    }

    /// Status actually sent. Every request gets one final response, so
    /// informational and out-of-range codes become 500.
    fn final_status(&self) -> u16 {
        if (200..=599).contains(&self.status) {
            self.status
        } else {
            warn!(status = self.status, "Invalid final response status, sending 500");
            500
        }
    }

    /// Parse a serialized response back into an `HttpResponse`.
    ///
    /// The body variant is chosen from the content type: JSON types become
    /// [`Body::Json`], `text/*` and untyped UTF-8 become [`Body::Text`],
    /// everything else [`Body::Binary`].
    pub fn from_wire(raw: &[u8]) -> Result<Self, Error> {
        let mut slots = [httparse::EMPTY_HEADER; 64];
        let mut parsed = httparse::Response::new(&mut slots);
        let head_len = match parsed.parse(raw).map_err(ParseError::from)? {
            httparse::Status::Complete(len) => len,
            httparse::Status::Partial => return Err(ParseError::Incomplete.into()),
        };
        let status = parsed.code.ok_or(ParseError::InvalidRequestLine)?;

        let headers: Vec<(String, String)> = parsed
            .headers
            .iter()
            .map(|h| {
                (
                    h.name.to_string(),
                    String::from_utf8_lossy(h.value).into_owned(),
                )
            })
            .collect();

        let mut response = HttpResponse {
            status,
            headers,
            body: Body::Empty,
        };

        let rest = &raw[head_len..];
        let payload = match response.header("content-length") {
            Some(len) => {
                let len = len
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| ParseError::InvalidContentLength)?;
                &rest[..len.min(rest.len())]
            }
            None => rest,
        };
        response.body = classify_body(payload, response.header("content-type"));
        Ok(response)
    }
}

fn classify_body(payload: &[u8], content_type: Option<&str>) -> Body {
    if payload.is_empty() {
        return Body::Empty;
    }
    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase());

    match mime.as_deref() {
        Some(mime) if mime == "application/json" || mime.ends_with("+json") => {
            match serde_json::from_slice(payload) {
                Ok(value) => Body::Json(value),
                Err(_) => Body::Binary(Bytes::copy_from_slice(payload)),
            }
        }
        Some(mime) if mime.starts_with("text/") => {
            Body::Text(String::from_utf8_lossy(payload).into_owned())
        }
        None => match std::str::from_utf8(payload) {
            Ok(text) => Body::Text(text.to_string()),
            Err(_) => Body::Binary(Bytes::copy_from_slice(payload)),
        },
        Some(_) => Body::Binary(Bytes::copy_from_slice(payload)),
    }
}

fn put_header(out: &mut BytesMut, name: &str, value: &str) {
    out.put_slice(name.as_bytes());
    out.put_slice(b": ");
    out.put_slice(value.as_bytes());
    out.put_slice(b"\r\n");
}

fn is_valid_header_name(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_alphanumeric()
                || matches!(
                    b,
                    b'!' | b'#'
                        | b'$'
                        | b'%'
                        | b'&'
                        | b'\''
                        | b'*'
                        | b'+'
                        | b'-'
                        | b'.'
                        | b'^'
                        | b'_'
                        | b'`'
                        | b'|'
                        | b'~'
                )
        })
}

fn is_valid_header_value(value: &str) -> bool {
    value.bytes().all(|b| b == b'\t' || !(b.is_ascii_control()))
}
