//! Testing utilities for applications built on `aou-core`.
//!
//! [`TestClient`] drives a configured [`Server`](aou_core::Server) through
//! the real parse, dispatch and serialize path without opening a socket.
//!
//! ```
//! use aou_core::{Error, HttpRequest, Server};
//! use aou_testing::*;
//!
//! # tokio_test::block_on(async {
//! let mut server = Server::new();
//! server
//!     .get("/hello", |_req: HttpRequest| async { Ok::<_, Error>("Hello!") })
//!     .unwrap();
//!
//! let client = TestClient::from(server);
//! let response = client.get("/hello").await;
//! assert_status(&response, 200);
//! assert_eq!(response.body_string(), Some("Hello!".to_string()));
//! # });
//! ```

mod assertions;
mod test_client;

pub use assertions::{
    assert_body_contains, assert_client_error, assert_header, assert_http_status, assert_json,
    assert_json_content_type, assert_server_error, assert_status, assert_success,
};
pub use test_client::{TestClient, TestRequestBuilder, TestResponse};
