//! Middleware pipeline: ordered stages in front of a terminal handler.
//!
//! Each stage wraps the rest of the chain, so it can inspect the request,
//! short-circuit with its own response, or decorate the downstream response.
//!
//! ## Core types
//!
//! - [`Middleware`]: trait implemented by all middleware.
//! - [`Next`]: cursor into the remaining chain; call [`Next::run`] to advance.
//! - [`MiddlewareHandler`]: type-erased, cheaply-cloneable middleware function.
//! - [`Pipeline`]: the stages in insertion order plus the endpoint they guard.
//! - [`LoggerMiddleware`]: request/response logger.

use std::{future::Future, pin::Pin, sync::Arc};
use tokio::time::Instant;
use tracing::info;

use crate::{
    Request, Response,
    context::Context,
    router::{Handler, IntoHandler, into_handler},
};

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is passed to each middleware's [`Middleware::handle`]. Calling
/// [`Next::run`] invokes the next stage, or the endpoint once every stage has
/// run. It is consumed by `run`, so a stage forwards at most once.
///
/// # Examples
///
/// ```rust,no_run
/// use std::pin::Pin;
/// use cartd::{Response, context::Context, middleware::{Middleware, Next}};
///
/// struct PassThrough;
///
/// impl Middleware for PassThrough {
///     fn handle(
///         &self,
///         ctx: Context,
///         next: Next,
///     ) -> Pin<Box<dyn std::future::Future<Output = Response> + Send>> {
///         Box::pin(async move { next.run(ctx).await })
///     }
/// }
/// ```
#[derive(Clone)]
pub struct Next {
    stages: Arc<Vec<MiddlewareHandler>>,
    endpoint: Handler,
    // Stage to invoke on the next `run` call.
    index: usize,
}

/// A type-erased, reference-counted middleware function.
///
/// The [`Arc`] wrapper makes handlers cheap to clone so that [`Next`] can
/// advance through the chain without copying closures.
pub type MiddlewareHandler = Arc<
    dyn Fn(Context, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static,
>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

impl Next {
    /// Invokes the next stage, or the endpoint when the stages are exhausted.
    pub async fn run(mut self, ctx: Context) -> Response {
        match self.stages.get(self.index).cloned() {
            Some(stage) => {
                self.index += 1;
                stage(ctx, self).await
            }
            None => (self.endpoint)(ctx).await,
        }
    }
}

/// A stage in the request pipeline.
///
/// Implementors receive a [`Context`] and a [`Next`] cursor. They may:
///
/// - **Pass through**: call `next.run(ctx).await` without modification.
/// - **Short-circuit**: return a [`Response`] directly without calling `next`.
/// - **Decorate**: call `next.run(ctx).await` and modify the response.
///
/// Implementations must be `Send + Sync` because the pipeline is shared across
/// Tokio tasks, and must not hold `&mut` references to shared state across an
/// `.await` point.
pub trait Middleware: Send + Sync {
    /// Handle the request and optionally delegate to the next stage.
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

/// Ordered middleware stages in front of a terminal endpoint.
///
/// Stages run in the order they were added with [`layer`](Self::layer); the
/// endpoint runs only if every stage forwards.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use cartd::middleware::{LoggerMiddleware, Pipeline};
/// use cartd::{Request, Response, StatusCode};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let pipeline = Pipeline::new(|_ctx| async { Response::new(StatusCode::NoContent) })
///     .layer(Arc::new(LoggerMiddleware));
///
/// let (request, _) = Request::parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();
/// assert_eq!(pipeline.handle(request).await.status(), StatusCode::NoContent);
/// # }
/// ```
#[derive(Clone)]
pub struct Pipeline {
    stages: Arc<Vec<MiddlewareHandler>>,
    endpoint: Handler,
}

impl Pipeline {
    pub fn new(endpoint: impl IntoHandler) -> Self {
        Self {
            stages: Arc::new(Vec::new()),
            endpoint: into_handler(endpoint),
        }
    }

    /// Appends a stage after the ones already added.
    #[must_use]
    pub fn layer<M>(mut self, middleware: Arc<M>) -> Self
    where
        M: Middleware + 'static,
    {
        Arc::make_mut(&mut self.stages).push(from_middleware(middleware));
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs `request` through every stage and the endpoint.
    ///
    /// The returned future owns everything it needs, so it can be handed
    /// straight to [`Server::run`](crate::Server::run).
    pub fn handle(&self, request: Request) -> impl Future<Output = Response> + Send + use<> {
        let next = Next {
            stages: Arc::clone(&self.stages),
            endpoint: Arc::clone(&self.endpoint),
            index: 0,
        };
        next.run(Context::new(request))
    }
}

/// Logs each request's method, path, status, and duration once the
/// downstream response is available. Never short-circuits.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().clone();
            let path = ctx.request().path().to_owned();
            let client = ctx.request().client_id();

            let response = next.run(ctx).await;

            info!(
                %client,
                status = response.status().as_u16(),
                "{} {} - {} ({:?})",
                method,
                path,
                response.status().as_u16(),
                start.elapsed()
            );

            response
        })
    }
}
