// Handler return values and their normalization into responses

use crate::{Body, DomainError, Error, HttpResponse};
use bytes::Bytes;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Keys that mark a dynamic value as an explicit response description.
const RESPONSE_KEYS: [&str; 4] = ["status", "headers", "body", "data"];

/// Everything a handler may hand back, resolved to a response in one place.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// A fully built response, used verbatim.
    Response(HttpResponse),
    /// A dynamic value: explicit `{ status, headers, body | data }` or a plain payload.
    Value(Value),
    Text(String),
    Binary(Bytes),
    Empty,
    /// Override the status of the inner reply.
    Status(u16, Box<Reply>),
}

/// Conversion from handler return types into a [`Reply`].
pub trait IntoReply {
    fn into_reply(self) -> Result<Reply, Error>;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Result<Reply, Error> {
        Ok(self)
    }
}

impl IntoReply for HttpResponse {
    fn into_reply(self) -> Result<Reply, Error> {
        Ok(Reply::Response(self))
    }
}

impl IntoReply for Value {
    fn into_reply(self) -> Result<Reply, Error> {
        Ok(Reply::Value(self))
    }
}

impl IntoReply for Body {
    fn into_reply(self) -> Result<Reply, Error> {
        Ok(Reply::Response(HttpResponse::ok().with_body(self)))
    }
}

impl IntoReply for String {
    fn into_reply(self) -> Result<Reply, Error> {
        Ok(Reply::Text(self))
    }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> Result<Reply, Error> {
        Ok(Reply::Text(self.to_string()))
    }
}

impl IntoReply for Vec<u8> {
    fn into_reply(self) -> Result<Reply, Error> {
        Ok(Reply::Binary(Bytes::from(self)))
    }
}

impl IntoReply for Bytes {
    fn into_reply(self) -> Result<Reply, Error> {
        Ok(Reply::Binary(self))
    }
}

impl IntoReply for () {
    fn into_reply(self) -> Result<Reply, Error> {
        Ok(Reply::Empty)
    }
}

impl<T: IntoReply> IntoReply for Option<T> {
    fn into_reply(self) -> Result<Reply, Error> {
        match self {
            Some(inner) => inner.into_reply(),
            None => Ok(Reply::Empty),
        }
    }
}

impl<T: IntoReply> IntoReply for (u16, T) {
    fn into_reply(self) -> Result<Reply, Error> {
        Ok(Reply::Status(self.0, Box::new(self.1.into_reply()?)))
    }
}

impl IntoReply for DomainError {
    fn into_reply(self) -> Result<Reply, Error> {
        Ok(Reply::Response(self.into_response()))
    }
}

/// Serialize `T` as a JSON body with status 200.
///
/// Unlike returning a raw [`Value`], the payload is never inspected for
/// `status`/`headers`/`body` keys.
#[derive(Debug, Clone)]
pub struct Json<T: Serialize>(pub T);

impl<T: Serialize> IntoReply for Json<T> {
    fn into_reply(self) -> Result<Reply, Error> {
        let value = serde_json::to_value(&self.0)?;
        Ok(Reply::Response(HttpResponse::ok().with_body(Body::Json(value))))
    }
}

/// Resolves handler replies into canonical responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer {
    /// Treat structured values without response keys as a JSON body.
    pub implicit_json: bool,
}

impl Normalizer {
    pub fn new(implicit_json: bool) -> Self {
        Self { implicit_json }
    }

    pub fn normalize(&self, reply: Reply) -> HttpResponse {
        match reply {
            Reply::Response(response) => response,
            Reply::Value(value) => self.normalize_value(value),
            Reply::Text(text) => HttpResponse::ok().with_body(Body::Text(text)),
            Reply::Binary(bytes) => HttpResponse::ok().with_body(Body::Binary(bytes)),
            Reply::Empty => HttpResponse::ok(),
            Reply::Status(status, inner) => {
                let mut response = self.normalize(*inner);
                response.status = sanitize_status(u64::from(status));
                response
            }
        }
    }

    fn normalize_value(&self, value: Value) -> HttpResponse {
        match value {
            Value::Null => HttpResponse::ok(),
            Value::Object(map) if is_explicit(&map) => explicit_response(map, 200),
            Value::String(text) => HttpResponse::ok().with_body(Body::Text(text)),
            other if self.implicit_json => HttpResponse::ok().with_body(Body::Json(other)),
            scalar @ (Value::Bool(_) | Value::Number(_)) => {
                HttpResponse::ok().with_body(Body::Text(scalar.to_string()))
            }
            _ => {
                debug!("Structured reply without response fields and implicit JSON disabled; sending empty body");
                HttpResponse::ok()
            }
        }
    }
}

fn is_explicit(map: &Map<String, Value>) -> bool {
    RESPONSE_KEYS.iter().any(|key| map.contains_key(*key))
}

/// Build a response from `{ status, headers, body | data }`.
///
/// A missing status falls back to `default_status`; `body` wins over `data`.
pub(crate) fn explicit_response(mut map: Map<String, Value>, default_status: u16) -> HttpResponse {
    let status = match map.remove("status") {
        None | Some(Value::Null) => default_status,
        Some(Value::Number(n)) => n.as_u64().map_or(500, sanitize_status),
        Some(Value::String(s)) => s.trim().parse::<u64>().map_or(500, sanitize_status),
        Some(other) => {
            warn!(status = %other, "Ignoring non-numeric response status");
            500
        }
    };

    let mut response = HttpResponse::new(status);

    match map.remove("headers") {
        None | Some(Value::Null) => {}
        Some(Value::Object(headers)) => {
            for (name, value) in headers {
                match value {
                    Value::Null => {}
                    Value::String(value) => response.set_header(name, value),
                    Value::Array(values) => {
                        for value in values {
                            response = response.append_header(name.clone(), header_text(value));
                        }
                    }
                    other => response.set_header(name, other.to_string()),
                }
            }
        }
        Some(_) => warn!("Ignoring response headers that are not an object"),
    }

    let body = match map.remove("body") {
        Some(body) => body,
        None => map.remove("data").unwrap_or(Value::Null),
    };
    response.body = body_from_value(body);
    response
}

fn header_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

/// Map a dynamic body value onto a [`Body`] variant.
pub(crate) fn body_from_value(value: Value) -> Body {
    match value {
        Value::Null => Body::Empty,
        Value::String(text) => Body::Text(text),
        scalar @ (Value::Bool(_) | Value::Number(_)) => Body::Text(scalar.to_string()),
        structured => Body::Json(structured),
    }
}

fn sanitize_status(status: u64) -> u16 {
    match u16::try_from(status) {
        Ok(code) if (100..=999).contains(&code) => code,
        _ => {
            warn!(status, "Response status out of range, using 500");
            500
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn normalize(value: Value, implicit_json: bool) -> HttpResponse {
        Normalizer::new(implicit_json).normalize(Reply::Value(value))
    }

    #[test]
    fn test_explicit_fields() {
        let response = normalize(
            json!({
                "status": 201,
                "headers": { "Content-Type": "text/html", "X-Count": 3 },
                "body": "<p>created</p>"
            }),
            false,
        );
        assert_eq!(response.status, 201);
        assert_eq!(response.header("content-type"), Some("text/html"));
        assert_eq!(response.header("x-count"), Some("3"));
        assert_eq!(response.body, Body::Text("<p>created</p>".into()));
    }

    #[test]
    fn test_data_alias_and_defaults() {
        let response = normalize(json!({ "data": { "id": 1 } }), false);
        assert_eq!(response.status, 200);
        assert!(response.headers.is_empty());
        assert_eq!(response.body, Body::Json(json!({ "id": 1 })));
        assert_eq!(response.content_type(), Some("application/json"));
    }

    #[test]
    fn test_body_wins_over_data() {
        let response = normalize(json!({ "body": "a", "data": "b" }), false);
        assert_eq!(response.body, Body::Text("a".into()));
    }

    #[test]
    fn test_status_only_has_empty_body() {
        let response = normalize(json!({ "status": 204 }), false);
        assert_eq!(response.status, 204);
        assert_eq!(response.body, Body::Empty);
    }

    #[test]
    fn test_invalid_status_becomes_500() {
        assert_eq!(normalize(json!({ "status": 42 }), false).status, 500);
        assert_eq!(normalize(json!({ "status": 70000 }), false).status, 500);
        assert_eq!(normalize(json!({ "status": "404" }), false).status, 404);
    }

    #[test]
    fn test_implicit_json() {
        let value = json!({ "hello": "world" });
        let response = normalize(value.clone(), true);
        assert_eq!(response.status, 200);
        assert_eq!(response.body, Body::Json(value));

        let list = normalize(json!([1, 2, 3]), true);
        assert_eq!(list.body, Body::Json(json!([1, 2, 3])));
    }

    #[test]
    fn test_plain_object_without_implicit_json_is_empty() {
        let response = normalize(json!({ "hello": "world" }), false);
        assert_eq!(response.status, 200);
        assert_eq!(response.body, Body::Empty);
    }

    #[test]
    fn test_scalars_are_stringified() {
        assert_eq!(normalize(json!(42), false).body, Body::Text("42".into()));
        assert_eq!(normalize(json!(true), false).body, Body::Text("true".into()));
        assert_eq!(normalize(json!("hi"), true).body, Body::Text("hi".into()));
        assert_eq!(normalize(Value::Null, true).body, Body::Empty);
    }

    #[test]
    fn test_header_arrays_append() {
        let response = normalize(
            json!({ "headers": { "Set-Cookie": ["a=1", "b=2"] } }),
            false,
        );
        let cookies: Vec<_> = response
            .headers
            .iter()
            .filter(|(name, _)| name == "Set-Cookie")
            .map(|(_, value)| value.as_str())
            .collect();
        assert_eq!(cookies, ["a=1", "b=2"]);
    }

    #[test]
    fn test_into_reply_shapes() {
        let normalizer = Normalizer::default();

        let text = normalizer.normalize("hello".into_reply().unwrap());
        assert_eq!(text.body, Body::Text("hello".into()));

        let bytes = normalizer.normalize(vec![1u8, 2].into_reply().unwrap());
        assert_eq!(bytes.content_type(), Some("application/octet-stream"));

        let empty = normalizer.normalize(().into_reply().unwrap());
        assert_eq!(empty.status, 200);
        assert_eq!(empty.body, Body::Empty);

        let created = normalizer.normalize((201u16, "made").into_reply().unwrap());
        assert_eq!(created.status, 201);
        assert_eq!(created.body, Body::Text("made".into()));

        let json = normalizer.normalize(Json(json!({ "status": "ok" })).into_reply().unwrap());
        assert_eq!(json.status, 200);
        assert_eq!(json.body, Body::Json(json!({ "status": "ok" })));
    }
}
