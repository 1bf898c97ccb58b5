// Middleware chain: ordered steps that build up a context for the handler

use crate::{BoxedHandler, Context, Error, HttpRequest, IntoHandler};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, trace};

/// A single middleware step.
///
/// Receives the request and the context produced so far and returns the
/// (possibly updated) request with the next context. Returning an error
/// stops the chain; later steps and the terminal handler never run.
///
/// Any `async` closure or function with the matching signature is a step:
///
/// ```
/// use aou_core::{Context, Error, HttpRequest, MiddlewareChain};
///
/// async fn authenticate(req: HttpRequest, ctx: Context) -> Result<(HttpRequest, Context), Error> {
///     let ctx = ctx.with("user", "alice")?;
///     Ok((req, ctx))
/// }
///
/// let chain = MiddlewareChain::create(authenticate);
/// assert_eq!(chain.len(), 1);
/// ```
#[async_trait]
pub trait Step: Send + Sync {
    async fn run(&self, req: HttpRequest, ctx: Context) -> Result<(HttpRequest, Context), Error>;
}

#[async_trait]
impl<F, Fut> Step for F
where
    F: Fn(HttpRequest, Context) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(HttpRequest, Context), Error>> + Send + 'static,
{
    async fn run(&self, req: HttpRequest, ctx: Context) -> Result<(HttpRequest, Context), Error> {
        (self)(req, ctx).await
    }
}

/// Middleware chain executor
///
/// Chains are immutable; [`MiddlewareChain::with`] returns a new chain that
/// shares the existing steps, so a common prefix can be reused by several
/// routes.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    steps: Arc<Vec<Arc<dyn Step>>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a chain from its first step.
    pub fn create<S: Step + 'static>(step: S) -> Self {
        Self::new().with(step)
    }

    /// Return a new chain with `step` appended.
    pub fn with<S: Step + 'static>(&self, step: S) -> Self {
        let mut steps = Vec::with_capacity(self.steps.len() + 1);
        steps.extend(self.steps.iter().cloned());
        steps.push(Arc::new(step) as Arc<dyn Step>);
        Self {
            steps: Arc::new(steps),
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step in order starting from an empty context.
    pub async fn run(&self, req: HttpRequest) -> Result<(HttpRequest, Context), Error> {
        self.run_with(req, Context::new()).await
    }

    /// Run every step in order starting from `ctx`.
    pub async fn run_with(
        &self,
        mut req: HttpRequest,
        mut ctx: Context,
    ) -> Result<(HttpRequest, Context), Error> {
        debug!(
            step_count = self.steps.len(),
            path = %req.path,
            method = %req.method,
            "Executing middleware chain"
        );
        for (index, step) in self.steps.iter().enumerate() {
            trace!(step_index = index, "Executing middleware step");
            (req, ctx) = step.run(req, ctx).await?;
        }
        trace!("Middleware chain complete, calling handler");
        Ok((req, ctx))
    }

    /// Compose the chain with a terminal handler into a single route handler.
    ///
    /// The handler receives the context accumulated by the steps, on top of
    /// whatever context the composed handler itself was called with (empty
    /// when dispatched by the router).
    pub fn handle<H, Args>(&self, terminal: H) -> BoxedHandler
    where
        H: IntoHandler<Args>,
    {
        let chain = self.clone();
        let terminal = terminal.into_handler();
        BoxedHandler::from_fn(move |req, ctx| {
            let chain = chain.clone();
            let terminal = terminal.clone();
            Box::pin(async move {
                let (req, ctx) = chain.run_with(req, ctx).await?;
                terminal.call(req, ctx).await
            })
        })
    }
}

impl std::fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("steps", &self.steps.len())
            .finish()
    }
}
