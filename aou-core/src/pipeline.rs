// Request pipeline: route, run the handler, normalize, intercept failures

use crate::parser::parse_complete;
use crate::{
    Context, Error, ErrorInterceptor, HttpMethod, HttpRequest, HttpResponse, Normalizer,
    RequestSummary, Router, ServerOptions,
};
use bytes::BytesMut;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// The frozen request pipeline shared by every connection.
///
/// Cloning is cheap: the route table, options and interceptor sit behind
/// `Arc`s and are never mutated once the engine exists.
#[derive(Clone, Debug)]
pub struct Engine {
    router: Arc<Router>,
    options: Arc<ServerOptions>,
    interceptor: Arc<ErrorInterceptor>,
    normalizer: Normalizer,
}

impl Engine {
    pub fn new(router: Router, options: ServerOptions, interceptor: ErrorInterceptor) -> Self {
        let normalizer = Normalizer::new(options.implicit_json);
        Self {
            router: Arc::new(router),
            options: Arc::new(options),
            interceptor: Arc::new(interceptor),
            normalizer,
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Run one parsed request through routing, middleware and the handler.
    ///
    /// Always produces a response: failures are converted by the
    /// [`ErrorInterceptor`], and a routing miss without a fallback is a 404.
    pub async fn dispatch(&self, req: HttpRequest) -> HttpResponse {
        let start = Instant::now();
        let summary = RequestSummary::from(&req);

        let response = match self.execute(req).await {
            Ok(response) => response,
            Err(err) => self.interceptor.intercept(err, &summary),
        };

        debug!(
            method = summary.method.map_or("-", |m| m.as_str()),
            path = %summary.path,
            status = response.status,
            elapsed_us = start.elapsed().as_micros() as u64,
            "Request handled"
        );
        response
    }

    async fn execute(&self, mut req: HttpRequest) -> Result<HttpResponse, Error> {
        let handler = match self.router.find(req.method, &req.raw_path) {
            Some(found) => {
                req.path_params = found.params;
                found.route.handler.clone()
            }
            None => match self.router.fallback() {
                Some(fallback) => fallback.clone(),
                None => {
                    return Err(Error::NotFound(format!("{} {}", req.method, req.path)));
                }
            },
        };

        let reply = AssertUnwindSafe(async move { handler.call(req, Context::new()).await })
            .catch_unwind()
            .await
            .map_err(|payload| Error::Panic(panic_message(payload.as_ref())))??;

        Ok(self.normalizer.normalize(reply))
    }

    /// Dispatch `req` and append its wire response to `out`.
    ///
    /// Returns whether the connection may stay open afterwards.
    pub(crate) async fn respond(&self, req: HttpRequest, out: &mut BytesMut) -> bool {
        let head_only = req.method == HttpMethod::HEAD;
        let keep_alive = self.options.keep_alive && req.keep_alive();
        let response = self.dispatch(req).await;
        response.write_wire(out, head_only, keep_alive);
        keep_alive
    }

    /// Append the response for a request that failed before dispatch.
    /// The connection is always closed afterwards.
    pub(crate) fn reject(&self, err: Error, out: &mut BytesMut) {
        let response = self.interceptor.intercept(err, &RequestSummary::unparsed());
        response.write_wire(out, false, false);
    }

    /// Handle one complete raw request without a socket, returning the raw response.
    pub async fn handle_bytes(&self, raw: &[u8]) -> Vec<u8> {
        let mut out = BytesMut::new();
        match parse_complete(raw, &self.options.parse_limits()) {
            Ok(req) => {
                self.respond(req, &mut out).await;
            }
            Err(err) => self.reject(err, &mut out),
        }
        out.to_vec()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
