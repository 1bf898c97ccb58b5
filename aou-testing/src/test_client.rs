// Test HTTP Client

use aou_core::{Body, Engine, Error, HttpMethod, HttpRequest, HttpResponse, Server};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// In-memory client that drives the full wire pipeline.
///
/// Requests are serialized to raw HTTP/1.1 bytes, parsed by the engine,
/// dispatched, and the serialized response is parsed back for assertions.
/// No socket is opened.
#[derive(Debug, Clone)]
pub struct TestClient {
    engine: Engine,
}

impl TestClient {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> TestResponse {
        self.send(TestRequestBuilder::new(HttpMethod::GET, path)).await
    }

    /// Make a HEAD request
    pub async fn head(&self, path: &str) -> TestResponse {
        self.send(TestRequestBuilder::new(HttpMethod::HEAD, path)).await
    }

    /// Make a POST request
    pub async fn post(&self, path: &str, body: impl Into<Vec<u8>>) -> TestResponse {
        self.send(TestRequestBuilder::new(HttpMethod::POST, path).body(body))
            .await
    }

    /// Make a PUT request
    pub async fn put(&self, path: &str, body: impl Into<Vec<u8>>) -> TestResponse {
        self.send(TestRequestBuilder::new(HttpMethod::PUT, path).body(body))
            .await
    }

    /// Make a PATCH request
    pub async fn patch(&self, path: &str, body: impl Into<Vec<u8>>) -> TestResponse {
        self.send(TestRequestBuilder::new(HttpMethod::PATCH, path).body(body))
            .await
    }

    /// Make a DELETE request
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.send(TestRequestBuilder::new(HttpMethod::DELETE, path))
            .await
    }

    /// Start a request with any method
    pub fn request(&self, method: HttpMethod, path: &str) -> TestRequestBuilder {
        TestRequestBuilder::new(method, path)
    }

    pub async fn send(&self, request: TestRequestBuilder) -> TestResponse {
        self.send_raw(&request.to_bytes()).await
    }

    /// Feed arbitrary bytes to the engine, e.g. deliberately malformed requests.
    pub async fn send_raw(&self, raw: &[u8]) -> TestResponse {
        let wire = self.engine.handle_bytes(raw).await;
        TestResponse::from_wire(&wire)
    }
}

impl From<Server> for TestClient {
    fn from(server: Server) -> Self {
        Self::new(server.into_engine())
    }
}

impl From<Engine> for TestClient {
    fn from(engine: Engine) -> Self {
        Self::new(engine)
    }
}

/// Builder for test requests
#[derive(Debug, Clone)]
pub struct TestRequestBuilder {
    method: HttpMethod,
    path: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    query_params: Vec<(String, String)>,
}

impl TestRequestBuilder {
    pub fn new(method: HttpMethod, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            headers: Vec::new(),
            body: Vec::new(),
            query_params: Vec::new(),
        }
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a JSON body and its content type
    pub fn json<T: Serialize>(mut self, data: &T) -> Result<Self, Error> {
        self.body = serde_json::to_vec(data)?;
        self.headers
            .push(("Content-Type".to_string(), "application/json".to_string()));
        Ok(self)
    }

    /// Add a query parameter; key and value are percent-encoded.
    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query_params.push((key.to_string(), value.to_string()));
        self
    }

    /// The request as it would arrive on a socket.
    ///
    /// `Host` and `Content-Length` are added unless set explicitly.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut target = self.path.clone();
        for (i, (key, value)) in self.query_params.iter().enumerate() {
            target.push(if i == 0 && !self.path.contains('?') { '?' } else { '&' });
            target.push_str(&urlencoding::encode(key));
            target.push('=');
            target.push_str(&urlencoding::encode(value));
        }

        let mut head = format!("{} {} HTTP/1.1\r\n", self.method, target);
        let has = |name: &str| {
            self.headers
                .iter()
                .any(|(key, _)| key.eq_ignore_ascii_case(name))
        };
        if !has("host") {
            head.push_str("Host: localhost\r\n");
        }
        for (key, value) in &self.headers {
            head.push_str(&format!("{key}: {value}\r\n"));
        }
        if !self.body.is_empty() && !has("content-length") && !has("transfer-encoding") {
            head.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        }
        head.push_str("\r\n");

        let mut raw = head.into_bytes();
        raw.extend_from_slice(&self.body);
        raw
    }

    /// Parse the request the way the engine would.
    pub fn build(&self) -> Result<HttpRequest, Error> {
        HttpRequest::from_bytes(&self.to_bytes())
    }

    pub async fn send(self, client: &TestClient) -> TestResponse {
        client.send(self).await
    }
}

/// Response from a test request
#[derive(Debug)]
pub enum TestResponse {
    Success(HttpResponse),
    /// The engine emitted bytes that are not a valid response
    Error(Error),
}

impl TestResponse {
    pub fn from_wire(raw: &[u8]) -> Self {
        match HttpResponse::from_wire(raw) {
            Ok(response) => TestResponse::Success(response),
            Err(error) => TestResponse::Error(error),
        }
    }

    /// Assert the response was well formed and return it
    pub fn assert_success(&self) -> &HttpResponse {
        match self {
            TestResponse::Success(response) => response,
            TestResponse::Error(error) => {
                panic!("Expected a well-formed response, got error: {:?}", error)
            }
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            TestResponse::Success(response) => Some(response.status),
            TestResponse::Error(_) => None,
        }
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        match self {
            TestResponse::Success(response) => response.header(key),
            TestResponse::Error(_) => None,
        }
    }

    /// Body as UTF-8 text; JSON bodies are re-serialized.
    pub fn body_string(&self) -> Option<String> {
        match self {
            TestResponse::Success(response) => match &response.body {
                Body::Empty => Some(String::new()),
                Body::Text(text) => Some(text.clone()),
                Body::Json(value) => Some(value.to_string()),
                Body::Binary(bytes) => String::from_utf8(bytes.to_vec()).ok(),
            },
            TestResponse::Error(_) => None,
        }
    }

    pub fn body_json<T: DeserializeOwned>(&self) -> Result<T, String> {
        match self {
            TestResponse::Success(response) => match &response.body {
                Body::Json(value) => serde_json::from_value(value.clone()),
                other => serde_json::from_slice(&other.to_bytes()),
            }
            .map_err(|e| format!("Serialization error: {}", e)),
            TestResponse::Error(error) => Err(format!("{:?}", error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn client() -> TestClient {
        let mut server = Server::new();
        server
            .get("/hello/{name}", |req: HttpRequest| async move {
                Ok::<_, Error>(format!("hello {}", req.param("name").unwrap_or_default()))
            })
            .unwrap();
        server
            .post("/echo", |req: HttpRequest| async move {
                let value: Value = req.json()?;
                Ok::<_, Error>(json!({ "status": 201, "body": value }))
            })
            .unwrap();
        server
            .get("/search", |req: HttpRequest| async move {
                Ok::<_, Error>(req.query("q").unwrap_or_default().to_string())
            })
            .unwrap();
        TestClient::from(server)
    }

    #[test]
    fn test_request_builder() {
        let req = TestRequestBuilder::new(HttpMethod::GET, "/test")
            .header("Authorization", "Bearer token")
            .query("foo", "bar baz")
            .build()
            .unwrap();

        assert_eq!(req.method, HttpMethod::GET);
        assert_eq!(req.path, "/test");
        assert_eq!(req.query("foo"), Some("bar baz"));
        assert_eq!(req.header("authorization"), Some("Bearer token"));
        assert_eq!(req.header("host"), Some("localhost"));
    }

    #[test]
    fn test_body_gets_content_length() {
        let raw = TestRequestBuilder::new(HttpMethod::POST, "/")
            .body("abc")
            .to_bytes();
        let text = String::from_utf8(raw).unwrap();
        assert!(text.contains("Content-Length: 3\r\n"));
        assert!(text.ends_with("\r\n\r\nabc"));
    }

    #[tokio::test]
    async fn test_get() {
        let response = client().get("/hello/ada").await;
        assert_eq!(response.status(), Some(200));
        assert_eq!(response.body_string().as_deref(), Some("hello ada"));
    }

    #[tokio::test]
    async fn test_post_json() {
        let client = client();
        let request = client
            .request(HttpMethod::POST, "/echo")
            .json(&json!({ "n": 1 }))
            .unwrap();
        let response = client.send(request).await;

        assert_eq!(response.status(), Some(201));
        assert_eq!(response.header("content-type"), Some("application/json"));
        let body: Value = response.body_json().unwrap();
        assert_eq!(body, json!({ "n": 1 }));
    }

    #[tokio::test]
    async fn test_query_is_encoded() {
        let client = client();
        let response = client
            .request(HttpMethod::GET, "/search")
            .query("q", "a&b")
            .send(&client)
            .await;
        assert_eq!(response.body_string().as_deref(), Some("a&b"));
    }

    #[tokio::test]
    async fn test_raw_malformed_request() {
        let response = client().send_raw(b"BREW /pot HTTP/1.1\r\n\r\n").await;
        assert_eq!(response.status(), Some(400));
        assert_eq!(response.header("connection"), Some("close"));
    }
}
