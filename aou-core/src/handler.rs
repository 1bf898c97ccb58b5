// Handler dispatch
//
// Route handlers are async functions taking the request (and optionally the
// middleware context) and returning anything that implements `IntoReply`.
// They are type-erased into `BoxedHandler` at registration so routes of
// different handler types can live in the same table.

use crate::{Context, Error, HttpRequest, IntoReply, Reply};
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future produced by every handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Reply, Error>> + Send>>;

/// Conversion of functions into [`BoxedHandler`]s.
///
/// `Args` only disambiguates the supported signatures:
///
/// - `async fn(HttpRequest) -> Result<R, Error>`
/// - `async fn(HttpRequest, Context) -> Result<R, Error>`
///
/// where `R: IntoReply`. Handlers taking only the request receive an empty
/// context.
///
/// ```
/// use aou_core::{BoxedHandler, Context, Error, HttpRequest, IntoHandler};
///
/// async fn hello(_req: HttpRequest) -> Result<&'static str, Error> {
///     Ok("hello")
/// }
///
/// async fn whoami(_req: HttpRequest, ctx: Context) -> Result<String, Error> {
///     Ok(ctx.get_str("user").unwrap_or("anonymous").to_string())
/// }
///
/// let _: BoxedHandler = hello.into_handler();
/// let _: BoxedHandler = whoami.into_handler();
/// ```
pub trait IntoHandler<Args>: Send + Sync + 'static {
    fn into_handler(self) -> BoxedHandler;
}

impl<F, Fut, R> IntoHandler<(HttpRequest,)> for F
where
    F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
    R: IntoReply,
{
    fn into_handler(self) -> BoxedHandler {
        BoxedHandler::wrap(FnHandler::<F, (HttpRequest,)>::new(self))
    }
}

impl<F, Fut, R> IntoHandler<(HttpRequest, Context)> for F
where
    F: Fn(HttpRequest, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
    R: IntoReply,
{
    fn into_handler(self) -> BoxedHandler {
        BoxedHandler::wrap(FnHandler::<F, (HttpRequest, Context)>::new(self))
    }
}

impl IntoHandler<BoxedHandler> for BoxedHandler {
    fn into_handler(self) -> BoxedHandler {
        self
    }
}

/// Type-erased handler for storing in collections.
///
/// Cloning is cheap; the handler itself sits behind an `Arc`.
#[derive(Clone)]
pub struct BoxedHandler {
    inner: Arc<dyn ErasedHandler>,
}

impl BoxedHandler {
    /// Build a handler from a closure that already produces a [`HandlerFuture`].
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(HttpRequest, Context) -> HandlerFuture + Send + Sync + 'static,
    {
        Self::wrap(RawHandler(f))
    }

    fn wrap<H: ErasedHandler + 'static>(handler: H) -> Self {
        Self {
            inner: Arc::new(handler),
        }
    }

    #[inline]
    pub fn call(&self, req: HttpRequest, ctx: Context) -> HandlerFuture {
        self.inner.call(req, ctx)
    }
}

impl std::fmt::Debug for BoxedHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxedHandler").finish_non_exhaustive()
    }
}

trait ErasedHandler: Send + Sync {
    fn call(&self, req: HttpRequest, ctx: Context) -> HandlerFuture;
}

struct RawHandler<F>(F);

impl<F> ErasedHandler for RawHandler<F>
where
    F: Fn(HttpRequest, Context) -> HandlerFuture + Send + Sync,
{
    fn call(&self, req: HttpRequest, ctx: Context) -> HandlerFuture {
        (self.0)(req, ctx)
    }
}

struct FnHandler<F, Args> {
    f: F,
    _marker: PhantomData<fn() -> Args>,
}

impl<F, Args> FnHandler<F, Args> {
    fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

impl<F, Fut, R> ErasedHandler for FnHandler<F, (HttpRequest,)>
where
    F: Fn(HttpRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
    R: IntoReply,
{
    fn call(&self, req: HttpRequest, _ctx: Context) -> HandlerFuture {
        let fut = (self.f)(req);
        Box::pin(async move { fut.await?.into_reply() })
    }
}

impl<F, Fut, R> ErasedHandler for FnHandler<F, (HttpRequest, Context)>
where
    F: Fn(HttpRequest, Context) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
    R: IntoReply,
{
    fn call(&self, req: HttpRequest, ctx: Context) -> HandlerFuture {
        let fut = (self.f)(req, ctx);
        Box::pin(async move { fut.await?.into_reply() })
    }
}
