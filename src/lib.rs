// aou - an embeddable HTTP/1.1 server engine
//
// Register routes and middleware on a `Server`, call `listen`, and every
// accepted connection is parsed, routed and answered on the tokio runtime.

// Re-export core functionality
pub use aou_core::*;

#[cfg(feature = "testing")]
pub use aou_testing;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Body, Context, DomainError, Error, HttpMethod, HttpRequest, HttpResponse, HttpStatus,
        IntoReply, Json, MethodFilter, MiddlewareChain, Reply, Server, ServerInstance,
        ServerOptions,
    };

    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::json;

    #[cfg(feature = "testing")]
    pub use aou_testing::{TestClient, TestResponse, assert_header, assert_json, assert_status};
}
