// Error interception: every failure becomes exactly one response

use crate::{Error, HttpMethod, HttpRequest, HttpResponse, HttpStatus};
use std::sync::Arc;
use tracing::{debug, error};

/// Method and path of the request an error belongs to.
///
/// `method` is `None` when the request could not be parsed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestSummary {
    pub method: Option<HttpMethod>,
    pub path: String,
}

impl RequestSummary {
    pub fn unparsed() -> Self {
        Self::default()
    }
}

impl From<&HttpRequest> for RequestSummary {
    fn from(req: &HttpRequest) -> Self {
        Self {
            method: Some(req.method),
            path: req.path.clone(),
        }
    }
}

/// Callback invoked with every intercepted error before it is turned into
/// a response. The full cause is available here even though it never
/// reaches the client.
pub type ErrorObserver = Arc<dyn Fn(&Error, &RequestSummary) + Send + Sync>;

/// Converts pipeline failures into responses.
///
/// Domain errors are sent verbatim. Everything else collapses into a
/// default response for its status, with a body that never includes the
/// underlying cause.
#[derive(Clone, Default)]
pub struct ErrorInterceptor {
    observers: Vec<ErrorObserver>,
}

impl ErrorInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observer<F>(&mut self, observer: F)
    where
        F: Fn(&Error, &RequestSummary) + Send + Sync + 'static,
    {
        self.observers.push(Arc::new(observer));
    }

    pub fn intercept(&self, err: Error, summary: &RequestSummary) -> HttpResponse {
        for observer in &self.observers {
            observer(&err, summary);
        }

        let method = summary.method.map_or("-", |m| m.as_str());
        match err {
            Error::Domain(domain) => {
                debug!(method, path = %summary.path, status = domain.status(), "Domain error");
                domain.into_response()
            }
            other if other.is_server_error() => {
                error!(method, path = %summary.path, error = %other, "Request failed");
                default_response(HttpStatus::InternalServerError)
            }
            other => {
                debug!(method, path = %summary.path, error = %other, "Client error");
                default_response(other.http_status())
            }
        }
    }
}

impl std::fmt::Debug for ErrorInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorInterceptor")
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// Minimal `text/plain` response carrying the status reason phrase.
pub fn default_response(status: HttpStatus) -> HttpResponse {
    HttpResponse::new(status.code())
        .with_header("Content-Type", "text/plain; charset=utf-8")
        .with_text(status.reason())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Body, DomainError, ParseError};
    use std::sync::Mutex;

    fn summary() -> RequestSummary {
        RequestSummary {
            method: Some(HttpMethod::GET),
            path: "/boom".into(),
        }
    }

    #[test]
    fn test_domain_error_is_sent_verbatim() {
        let response = ErrorInterceptor::new().intercept(
            DomainError::new(404, "ooops").with_header("X-Reason", "gone").into(),
            &summary(),
        );
        assert_eq!(response.status, 404);
        assert_eq!(response.body, Body::Text("ooops".into()));
        assert_eq!(response.header("x-reason"), Some("gone"));
    }

    #[test]
    fn test_handler_failure_does_not_leak() {
        let response = ErrorInterceptor::new()
            .intercept(Error::handler("database password is hunter2"), &summary());
        assert_eq!(response.status, 500);
        assert_eq!(response.body, Body::Text("Internal Server Error".into()));
    }

    #[test]
    fn test_client_errors_use_default_bodies() {
        let interceptor = ErrorInterceptor::new();
        let bad = interceptor.intercept(
            ParseError::MissingHost.into(),
            &RequestSummary::unparsed(),
        );
        assert_eq!(bad.status, 400);
        assert_eq!(bad.body, Body::Text("Bad Request".into()));

        let large = interceptor.intercept(Error::PayloadTooLarge { limit: 1 }, &summary());
        assert_eq!(large.status, 413);
        assert_eq!(large.body, Body::Text("Payload Too Large".into()));
    }

    #[test]
    fn test_observers_see_the_cause() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut interceptor = ErrorInterceptor::new();
        let sink = seen.clone();
        interceptor.add_observer(move |err, summary| {
            sink.lock()
                .unwrap()
                .push(format!("{} {}", summary.path, err));
        });

        interceptor.intercept(Error::handler("disk full"), &summary());
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            ["/boom handler failed: disk full"]
        );
    }
}
