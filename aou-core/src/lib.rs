// Core library for the aou HTTP engine
// Parsing, routing, middleware, response normalization and the connection listener

pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod http;
pub mod interceptor;
pub mod logging;
pub mod method;
pub mod middleware;
pub mod parser;
pub mod pipeline;
pub mod reply;
pub mod response;
pub mod routing;
pub mod server;
pub mod shutdown;
pub mod status;

// Re-export commonly used types
pub use config::ServerOptions;
pub use context::Context;
pub use error::{DomainError, Error, ParseError, PatternError};
pub use handler::{BoxedHandler, IntoHandler};
pub use http::{HttpRequest, HttpVersion};
pub use interceptor::{ErrorInterceptor, ErrorObserver, RequestSummary};
pub use method::{HttpMethod, MethodFilter};
pub use middleware::{MiddlewareChain, Step};
pub use parser::{ParseLimits, ParseStatus, parse_request};
pub use pipeline::Engine;
pub use reply::{IntoReply, Json, Normalizer, Reply};
pub use response::{Body, HttpResponse};
pub use routing::{Pattern, Route, RouteMatch, Router, Segment};
pub use server::{Server, ServerInstance};
pub use shutdown::ConnectionTracker;
pub use status::HttpStatus;
