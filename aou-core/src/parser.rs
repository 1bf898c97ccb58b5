// Incremental HTTP/1.x request parser
//
// The request line and header block go through httparse; body framing,
// target splitting and query decoding are handled here.

use crate::http::{HttpRequest, HttpVersion};
use crate::{Error, HttpMethod, ParseError};
use memchr::{memchr, memchr_iter, memmem};
use std::collections::HashMap;

/// Size limits applied while reading a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLimits {
    pub max_head_bytes: usize,
    pub max_headers: usize,
    pub max_body_bytes: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_head_bytes: 16 * 1024,
            max_headers: 64,
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Outcome of feeding a buffer to [`parse_request`].
#[derive(Debug)]
pub enum ParseStatus {
    /// A full request was read; `consumed` bytes of the buffer belong to it.
    Complete {
        request: HttpRequest,
        consumed: usize,
    },
    /// More bytes are needed.
    Partial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    /// No `Content-Length` and no `Transfer-Encoding`
    Undeclared,
    Length(usize),
    Chunked,
}

struct Head {
    request: HttpRequest,
    framing: Framing,
    len: usize,
}

/// Try to parse one request from the front of `buf`.
///
/// Returns `Partial` until the head and the declared body are buffered.
/// Anything left after `consumed` is the start of the next pipelined request.
pub fn parse_request(buf: &[u8], limits: &ParseLimits) -> Result<ParseStatus, Error> {
    let Some(head) = parse_head(buf, limits)? else {
        return Ok(ParseStatus::Partial);
    };
    let rest = &buf[head.len..];

    let (body, body_len) = match head.framing {
        Framing::Undeclared => (Vec::new(), 0),
        Framing::Length(len) => {
            if rest.len() < len {
                return Ok(ParseStatus::Partial);
            }
            (rest[..len].to_vec(), len)
        }
        Framing::Chunked => match decode_chunked(rest, limits.max_body_bytes)? {
            Some(decoded) => decoded,
            None => return Ok(ParseStatus::Partial),
        },
    };

    let mut request = head.request;
    request.body = body;
    Ok(ParseStatus::Complete {
        request,
        consumed: head.len + body_len,
    })
}

/// Parse a request that is already entirely in memory.
///
/// Unlike [`parse_request`] this never waits for more bytes: an undeclared
/// body is whatever follows the head, and a short `Content-Length` body is
/// taken as-is.
pub(crate) fn parse_complete(buf: &[u8], limits: &ParseLimits) -> Result<HttpRequest, Error> {
    let head = parse_head(buf, limits)?.ok_or(ParseError::Incomplete)?;
    let rest = &buf[head.len..];

    let body = match head.framing {
        Framing::Undeclared => rest.to_vec(),
        Framing::Length(len) => rest[..len.min(rest.len())].to_vec(),
        Framing::Chunked => {
            decode_chunked(rest, limits.max_body_bytes)?
                .ok_or(ParseError::Incomplete)?
                .0
        }
    };
    if body.len() > limits.max_body_bytes {
        return Err(ParseError::BodyTooLarge(limits.max_body_bytes).into());
    }

    let mut request = head.request;
    request.body = body;
    Ok(request)
}

fn parse_head(buf: &[u8], limits: &ParseLimits) -> Result<Option<Head>, ParseError> {
    let mut slots = vec![httparse::EMPTY_HEADER; limits.max_headers];
    let mut raw = httparse::Request::new(&mut slots);

    let len = match raw.parse(buf)? {
        httparse::Status::Complete(len) => len,
        httparse::Status::Partial => {
            if buf.len() > limits.max_head_bytes {
                return Err(ParseError::HeadTooLarge(limits.max_head_bytes));
            }
            return Ok(None);
        }
    };
    if len > limits.max_head_bytes {
        return Err(ParseError::HeadTooLarge(limits.max_head_bytes));
    }

    let token = raw.method.ok_or(ParseError::InvalidRequestLine)?;
    let method = HttpMethod::from_bytes(token.as_bytes())
        .ok_or_else(|| ParseError::UnknownMethod(token.to_string()))?;
    let version = match raw.version {
        Some(0) => HttpVersion::Http10,
        Some(1) => HttpVersion::Http11,
        _ => return Err(ParseError::InvalidVersion),
    };
    let target = raw.path.ok_or(ParseError::InvalidRequestLine)?;
    let (raw_path, query) = split_target(target)?;

    let mut headers: HashMap<String, String> = HashMap::with_capacity(raw.headers.len());
    let mut content_length: Option<usize> = None;
    let mut transfer_encoding: Option<String> = None;

    for header in raw.headers.iter() {
        let name = header.name.to_ascii_lowercase();
        let value = String::from_utf8_lossy(header.value).trim().to_string();

        match name.as_str() {
            "content-length" => {
                let len = parse_content_length(&value)?;
                if content_length.is_some_and(|prev| prev != len) {
                    return Err(ParseError::InvalidContentLength);
                }
                content_length = Some(len);
            }
            "transfer-encoding" => {
                transfer_encoding = Some(match transfer_encoding.take() {
                    Some(prev) => format!("{prev}, {value}"),
                    None => value.clone(),
                });
            }
            _ => {}
        }

        headers
            .entry(name)
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }

    if version == HttpVersion::Http11 && !headers.contains_key("host") {
        return Err(ParseError::MissingHost);
    }

    let framing = match (content_length, transfer_encoding) {
        (Some(_), Some(_)) => return Err(ParseError::ConflictingFraming),
        (None, Some(coding)) => {
            if !coding.trim().eq_ignore_ascii_case("chunked") {
                return Err(ParseError::UnsupportedTransferEncoding(coding));
            }
            Framing::Chunked
        }
        (Some(len), None) if len > limits.max_body_bytes => {
            return Err(ParseError::BodyTooLarge(limits.max_body_bytes));
        }
        (None, None) => Framing::Undeclared,
        (Some(len), None) => Framing::Length(len),
    };

    let request = HttpRequest {
        method,
        path: percent_decode(raw_path),
        raw_path: raw_path.to_string(),
        version,
        headers,
        body: Vec::new(),
        path_params: HashMap::new(),
        query_params: parse_query(query),
    };

    Ok(Some(Head {
        request,
        framing,
        len,
    }))
}

fn parse_content_length(value: &str) -> Result<usize, ParseError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidContentLength);
    }
    value
        .parse::<usize>()
        .map_err(|_| ParseError::InvalidContentLength)
}

/// Split a request target into its raw path and query string.
///
/// Origin-form (`/a?b`), absolute-form (`http://host/a?b`) and the
/// asterisk-form used by `OPTIONS *` are accepted.
fn split_target(target: &str) -> Result<(&str, &str), ParseError> {
    let path_and_query = if target.starts_with('/') || target == "*" {
        target
    } else if let Some(scheme_end) = memmem::find(target.as_bytes(), b"://") {
        let authority = &target[scheme_end + 3..];
        match memchr(b'/', authority.as_bytes()) {
            Some(idx) => &authority[idx..],
            // `http://host?x=1` has an empty path
            None => {
                let query = memchr(b'?', authority.as_bytes())
                    .map_or("", |idx| &authority[idx + 1..]);
                return Ok(("/", query));
            }
        }
    } else {
        return Err(ParseError::InvalidTarget);
    };

    Ok(match memchr(b'?', path_and_query.as_bytes()) {
        Some(idx) => (&path_and_query[..idx], &path_and_query[idx + 1..]),
        None => (path_and_query, ""),
    })
}

/// Decode a `Transfer-Encoding: chunked` body.
///
/// Returns the payload and the number of bytes consumed, or `None` when the
/// terminating chunk (and trailer section) has not arrived yet.
fn decode_chunked(buf: &[u8], max_body: usize) -> Result<Option<(Vec<u8>, usize)>, ParseError> {
    let mut body = Vec::new();
    let mut pos = 0;

    loop {
        let (offset, size) = match httparse::parse_chunk_size(&buf[pos..]) {
            Ok(httparse::Status::Complete(parsed)) => parsed,
            Ok(httparse::Status::Partial) => return Ok(None),
            Err(_) => return Err(ParseError::InvalidChunk),
        };
        pos += offset;

        if size == 0 {
            // Skip trailers up to the empty line.
            loop {
                let Some(line_len) = memmem::find(&buf[pos..], b"\r\n") else {
                    return Ok(None);
                };
                pos += line_len + 2;
                if line_len == 0 {
                    return Ok(Some((body, pos)));
                }
            }
        }

        let size = usize::try_from(size).map_err(|_| ParseError::BodyTooLarge(max_body))?;
        if body.len().saturating_add(size) > max_body {
            return Err(ParseError::BodyTooLarge(max_body));
        }
        if buf.len() - pos < size + 2 {
            return Ok(None);
        }
        body.extend_from_slice(&buf[pos..pos + size]);
        pos += size;
        if &buf[pos..pos + 2] != b"\r\n" {
            return Err(ParseError::InvalidChunk);
        }
        pos += 2;
    }
}

/// Parse a query string into key/value pairs.
///
/// Pairs are split on `&` and then on the first `=`; `+` means space and
/// percent-escapes are decoded. Repeated keys keep the last value.
pub fn parse_query(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let bytes = query.as_bytes();
    let mut start = 0;

    for end in memchr_iter(b'&', bytes).chain(std::iter::once(bytes.len())) {
        let pair = &query[start..end];
        start = end + 1;
        if pair.is_empty() {
            continue;
        }
        let (key, value) = match memchr(b'=', pair.as_bytes()) {
            Some(idx) => (&pair[..idx], &pair[idx + 1..]),
            None => (pair, ""),
        };
        params.insert(decode_form_component(key), decode_form_component(value));
    }

    params
}

fn decode_form_component(raw: &str) -> String {
    if raw.as_bytes().contains(&b'+') {
        percent_decode(&raw.replace('+', " "))
    } else {
        percent_decode(raw)
    }
}

/// Percent-decode `raw`, replacing invalid UTF-8 with U+FFFD.
pub fn percent_decode(raw: &str) -> String {
    if memchr(b'%', raw.as_bytes()).is_none() {
        return raw.to_string();
    }
    String::from_utf8_lossy(&urlencoding::decode_binary(raw.as_bytes())).into_owned()
}
