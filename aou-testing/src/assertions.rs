// Test assertions for HTTP responses

use crate::TestResponse;
use aou_core::HttpStatus;

/// Assert that a response has a specific status code
pub fn assert_status(response: &TestResponse, expected: u16) {
    let actual = response.status().unwrap_or(0);
    assert_eq!(
        actual, expected,
        "Expected status {}, got {}",
        expected, actual
    );
}

/// Assert that a response has a specific HTTP status
pub fn assert_http_status(response: &TestResponse, expected: HttpStatus) {
    assert_status(response, expected.code());
}

/// Assert that a response body contains JSON matching expected value
pub fn assert_json<T>(response: &TestResponse, expected: &T)
where
    T: serde::de::DeserializeOwned + PartialEq + std::fmt::Debug,
{
    let actual: T = response
        .body_json()
        .unwrap_or_else(|e| panic!("Failed to deserialize response body: {}", e));
    assert_eq!(actual, *expected, "JSON bodies do not match");
}

/// Assert that a response has a specific header (name is case-insensitive)
pub fn assert_header(response: &TestResponse, key: &str, expected: &str) {
    let actual = response.header(key);
    assert_eq!(
        actual,
        Some(expected),
        "Expected header '{}' to be '{}', got {:?}",
        key,
        expected,
        actual
    );
}

pub fn assert_body_contains(response: &TestResponse, expected: &str) {
    let body = response.body_string().unwrap_or_default();
    assert!(
        body.contains(expected),
        "Expected body to contain '{}', but it didn't. Body: {}",
        expected,
        body
    );
}

/// Assert that a response is successful (2xx status)
pub fn assert_success(response: &TestResponse) {
    let status = response.status().unwrap_or(0);
    assert!(
        (200..300).contains(&status),
        "Expected successful status (2xx), got {}",
        status
    );
}

/// Assert that a response is a client error (4xx status)
pub fn assert_client_error(response: &TestResponse) {
    let status = response.status().unwrap_or(0);
    assert!(
        (400..500).contains(&status),
        "Expected client error status (4xx), got {}",
        status
    );
}

/// Assert that a response is a server error (5xx status)
pub fn assert_server_error(response: &TestResponse) {
    let status = response.status().unwrap_or(0);
    assert!(
        (500..600).contains(&status),
        "Expected server error status (5xx), got {}",
        status
    );
}

pub fn assert_json_content_type(response: &TestResponse) {
    let content_type = response.header("Content-Type");
    assert!(
        content_type
            .map(|ct| ct.contains("application/json"))
            .unwrap_or(false),
        "Expected JSON content type, got {:?}",
        content_type
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use aou_core::HttpResponse;
    use serde_json::json;

    fn create_test_response(status: u16, body: &str) -> TestResponse {
        TestResponse::Success(HttpResponse::new(status).with_text(body))
    }

    #[test]
    fn test_assert_status() {
        let response = create_test_response(200, "OK");
        assert_status(&response, 200);
        assert_http_status(&response, HttpStatus::Ok);
        assert_success(&response);
    }

    #[test]
    fn test_assert_body_contains() {
        let response = create_test_response(200, "Hello World from aou");
        assert_body_contains(&response, "Hello");
        assert_body_contains(&response, "aou");
    }

    #[test]
    fn test_assert_error_ranges() {
        assert_client_error(&create_test_response(404, "Not Found"));
        assert_client_error(&create_test_response(413, "Payload Too Large"));
        assert_server_error(&create_test_response(500, "Internal Server Error"));
        assert_server_error(&create_test_response(503, "Service Unavailable"));
    }

    #[test]
    fn test_assert_header_ignores_case() {
        let response =
            TestResponse::Success(HttpResponse::ok().with_header("X-Custom", "value"));
        assert_header(&response, "x-custom", "value");
    }

    #[test]
    fn test_assert_json() {
        let response = TestResponse::Success(
            HttpResponse::ok()
                .with_header("Content-Type", "application/json")
                .with_body(json!({ "users": ["Alice", "Bob"] })),
        );
        assert_json_content_type(&response);
        assert_json(&response, &json!({ "users": ["Alice", "Bob"] }));
    }

    #[test]
    #[should_panic(expected = "Expected status 404, got 200")]
    fn test_assert_status_mismatch_panics() {
        assert_status(&create_test_response(200, "OK"), 404);
    }
}
