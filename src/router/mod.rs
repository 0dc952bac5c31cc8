//! Request routing: map URL patterns and HTTP methods to handler functions.
//!
//! [`Router`] dispatches a [`Context`] to the first route whose method and
//! pattern both match. Two pattern styles are supported:
//!
//! | Pattern                          | Example match                | Captured params          |
//! |----------------------------------|------------------------------|--------------------------|
//! | `/api/carts`                     | `/api/carts`                 | *(none)*                 |
//! | `/api/carts/:id/items/:item_id`  | `/api/carts/7/items/9`       | `id → "7"`, `item_id → "9"` |
//!
//! Trailing slashes are normalized on both patterns and incoming paths.
//!
//! A path that matches some route under a different method answers
//! `405 Method Not Allowed` with an `Allow` header. A path that matches no
//! route goes to the fallback handler, `404 Not Found` by default.

use std::pin::Pin;
use std::sync::Arc;

use crate::context::{Context, PathParams};
use crate::{Method, Response, StatusCode};

/// Type-erased, heap-allocated async handler that processes a [`Context`] and returns a
/// [`Response`].
///
/// Handlers are stored behind `Arc<dyn Fn(…)>` so they can be cloned and shared across
/// threads without copying the underlying closure. Build one from any async closure
/// with [`into_handler`].
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = Response> + Send` that is also
/// `Send + Sync + 'static` implements this trait automatically via the blanket impl
/// below. Router methods and [`Pipeline::new`](crate::middleware::Pipeline::new) accept
/// `impl IntoHandler` so the two-type-parameter where-bound does not need to be repeated
/// at every call site.
pub trait IntoHandler: Send + Sync + 'static {
    /// Call the handler with the given context, boxing the returned future.
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin((self)(ctx))
    }
}

/// Erases the concrete handler type.
pub fn into_handler(handler: impl IntoHandler) -> Handler {
    Arc::new(move |ctx| handler.call(ctx))
}

// A single path segment, either a literal string or a named capture (`:name`).
#[derive(Debug, Clone)]
enum Segment {
    Static(String),
    Parameter(String),
}

// Compiled representation of a route pattern string.
#[derive(Debug, Clone)]
enum Pattern {
    // Matches one exact path string, e.g. `/carts`.
    Exact(String),
    // Matches a fixed number of segments where some may be named captures, e.g. `/carts/:id`.
    Parameterized { segments: Vec<Segment> },
}

impl Pattern {
    // Compiles `pattern`: a `:` anywhere makes it parameterized, otherwise it
    // is an exact match. A trailing slash other than the root's is dropped.
    fn parse(pattern: &str) -> Self {
        let pattern = trim_trailing_slash(pattern);

        if pattern.contains(':') {
            let segments = pattern
                .split('/')
                .filter(|s| !s.is_empty())
                .map(|s| {
                    if let Some(p) = s.strip_prefix(':') {
                        Segment::Parameter(p.to_string())
                    } else {
                        Segment::Static(s.to_string())
                    }
                })
                .collect();

            return Pattern::Parameterized { segments };
        }

        Pattern::Exact(pattern.to_string())
    }

    // Try to match `path` against this pattern, returning extracted [`PathParams`] on success.
    fn matches(&self, path: &str) -> Option<PathParams> {
        let path = trim_trailing_slash(path);

        match self {
            Pattern::Exact(p) => {
                if p == path {
                    Some(PathParams::new())
                } else {
                    None
                }
            }
            Pattern::Parameterized { segments } => {
                let mut params = PathParams::new();
                let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

                if segments.len() != path_segments.len() {
                    return None;
                }

                for (seg, path_seg) in segments.iter().zip(path_segments) {
                    match seg {
                        Segment::Static(s) => {
                            if s != path_seg {
                                return None;
                            }
                        }
                        Segment::Parameter(name) => {
                            params.insert(name.clone(), path_seg.to_string());
                        }
                    }
                }

                Some(params)
            }
        }
    }
}

fn trim_trailing_slash(path: &str) -> &str {
    match path.strip_suffix('/') {
        Some(trimmed) if !trimmed.is_empty() => trimmed,
        _ => path,
    }
}

// A single registered route binding a method + pattern to a handler.
struct Route {
    method: Method,
    pattern: Pattern,
    handler: Handler,
}

impl Route {
    fn new(method: Method, pattern: &str, handler: Handler) -> Self {
        Self {
            method,
            pattern: Pattern::parse(pattern),
            handler,
        }
    }
}

/// HTTP request router that dispatches requests to registered handler functions.
///
/// Routes are evaluated in registration order; the first route whose HTTP method and path
/// pattern both match the incoming request is used.
///
/// # Examples
///
/// ```rust,no_run
/// use cartd::{Router, Response, StatusCode, context::Context};
///
/// let mut router = Router::new();
///
/// router.get("/api/carts", |_ctx| async { Response::new(StatusCode::Ok) });
///
/// router.get("/api/carts/:id", |ctx: Context| async move {
///     let id = ctx.param("id").unwrap_or("unknown").to_owned();
///     Response::new(StatusCode::Ok).body(id)
/// });
/// ```
pub struct Router {
    routes: Vec<Route>,
    fallback: Option<Handler>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Create a new, empty `Router` with no registered routes.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use cartd::Router;
    ///
    /// let router = Router::new();
    /// assert!(router.is_empty());
    /// ```
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            fallback: None,
        }
    }

    /// Register a handler for `GET` requests matching `path`.
    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Get, path, handler);
    }

    /// Register a handler for `POST` requests matching `path`.
    pub fn post(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Post, path, handler);
    }

    /// Register a handler for `PATCH` requests matching `path`.
    pub fn patch(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Patch, path, handler);
    }

    /// Register a handler for `DELETE` requests matching `path`.
    pub fn delete(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Delete, path, handler);
    }

    /// Handler for requests no route matches. Without one the router answers an empty `404`.
    pub fn fallback(&mut self, handler: impl IntoHandler) {
        self.fallback = Some(into_handler(handler));
    }

    fn add_route(&mut self, method: Method, path: &str, handler: impl IntoHandler) {
        self.routes.push(Route::new(method, path, into_handler(handler)));
    }

    /// Return the number of routes registered in this router.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Return `true` if no routes have been registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Dispatch `ctx` to the first matching route and return its response.
    ///
    /// # Returns
    ///
    /// The [`Response`] produced by the matching handler; `405` with an `Allow` header
    /// when only the method is wrong; otherwise whatever the fallback produces.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use cartd::{Router, Response, StatusCode, context::Context};
    ///
    /// # async fn example(ctx: Context) {
    /// let mut router = Router::new();
    /// router.get("/ping", |_ctx| async { Response::new(StatusCode::Ok) });
    ///
    /// let response = router.dispatch(ctx).await;
    /// assert_eq!(response.status(), StatusCode::Ok);
    /// # }
    /// ```
    pub async fn dispatch(&self, ctx: Context) -> Response {
        let method = ctx.request().method().clone();
        let mut allowed: Vec<&str> = Vec::new();

        for route in &self.routes {
            let Some(params) = route.pattern.matches(ctx.request().path()) else {
                continue;
            };
            if route.method == method {
                return (route.handler)(ctx.into_routed(params)).await;
            }
            if !allowed.contains(&route.method.as_str()) {
                allowed.push(route.method.as_str());
            }
        }

        if !allowed.is_empty() {
            return Response::new(StatusCode::MethodNotAllowed).header("Allow", allowed.join(", "));
        }

        match &self.fallback {
            Some(fallback) => fallback(ctx).await,
            None => Response::new(StatusCode::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::Request;

    fn ctx(method: &str, path: &str) -> Context {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        Context::new(req)
    }

    fn body_of(response: &Response) -> &str {
        std::str::from_utf8(response.content()).unwrap()
    }

    // ── Pattern ───────────────────────────────────────────────────────────────

    #[test]
    fn pattern_parse_root() {
        assert!(matches!(Pattern::parse("/"), Pattern::Exact(s) if s == "/"));
    }

    #[test]
    fn pattern_parse_trailing_slash_stripped() {
        assert!(matches!(Pattern::parse("/api/carts/"), Pattern::Exact(s) if s == "/api/carts"));
    }

    #[test]
    fn pattern_parse_parameterized_multi() {
        match Pattern::parse("/api/carts/:id/items/:item_id") {
            Pattern::Parameterized { segments } => {
                assert_eq!(segments.len(), 5);
                assert!(matches!(&segments[2], Segment::Parameter(s) if s == "id"));
                assert!(matches!(&segments[4], Segment::Parameter(s) if s == "item_id"));
            }
            other => panic!("expected Parameterized, got {other:?}"),
        }
    }

    #[test]
    fn pattern_exact_match() {
        let pat = Pattern::parse("/api/carts");
        assert!(pat.matches("/api/carts").is_some());
        assert!(pat.matches("/api/carts/").is_some());
        assert!(pat.matches("/api/cart").is_none());
    }

    #[test]
    fn pattern_param_extracts_values() {
        let pat = Pattern::parse("/api/carts/:id/items/:item_id");
        let params = pat.matches("/api/carts/7/items/99").unwrap();
        assert_eq!(params.get("id"), Some("7"));
        assert_eq!(params.get("item_id"), Some("99"));
    }

    #[test]
    fn pattern_param_wrong_shape() {
        let pat = Pattern::parse("/api/carts/:id");
        assert!(pat.matches("/api/carts").is_none());
        assert!(pat.matches("/api/carts/42/items").is_none());
        assert!(pat.matches("/api/users/42").is_none());
    }

    // ── Router ────────────────────────────────────────────────────────────────

    #[test]
    fn router_len_tracks_routes() {
        let mut router = Router::default();
        assert!(router.is_empty());
        router.get("/a", |_ctx| async { Response::new(StatusCode::Ok) });
        router.post("/b", |_ctx| async { Response::new(StatusCode::Ok) });
        assert_eq!(router.len(), 2);
    }

    #[tokio::test]
    async fn unmatched_path_is_404_without_fallback() {
        let router = Router::new();
        let res = router.dispatch(ctx("GET", "/")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn unmatched_path_goes_to_fallback() {
        let mut router = Router::new();
        router.fallback(|_ctx| async { Response::new(StatusCode::NotFound).body("custom") });
        let res = router.dispatch(ctx("GET", "/nowhere")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
        assert_eq!(body_of(&res), "custom");
    }

    #[tokio::test]
    async fn wrong_method_is_405_with_allow() {
        let mut router = Router::new();
        router.get("/api/carts", |_ctx| async { Response::new(StatusCode::Ok) });
        router.post("/api/carts", |_ctx| async { Response::new(StatusCode::Created) });

        let res = router.dispatch(ctx("DELETE", "/api/carts")).await;
        assert_eq!(res.status(), StatusCode::MethodNotAllowed);
        assert_eq!(res.headers().get("allow"), Some("GET, POST"));
    }

    #[tokio::test]
    async fn method_selects_route() {
        let mut router = Router::new();
        router.get("/api/carts", |_ctx| async { Response::new(StatusCode::Ok) });
        router.post("/api/carts", |_ctx| async { Response::new(StatusCode::Created) });

        let get = router.dispatch(ctx("GET", "/api/carts")).await;
        let post = router.dispatch(ctx("POST", "/api/carts")).await;
        assert_eq!(get.status(), StatusCode::Ok);
        assert_eq!(post.status(), StatusCode::Created);
    }

    #[tokio::test]
    async fn first_matching_route_wins() {
        let mut router = Router::new();
        router.get("/path", |_ctx| async { Response::new(StatusCode::Ok) });
        router.get("/path", |_ctx| async { Response::new(StatusCode::NoContent) });

        let res = router.dispatch(ctx("GET", "/path")).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn handler_receives_params() {
        let mut router = Router::new();
        router.patch("/api/carts/:id/items/:item_id", |ctx: Context| async move {
            let body = format!("{}/{}", ctx.param("id").unwrap_or(""), ctx.param("item_id").unwrap_or(""));
            Response::new(StatusCode::Ok).body(body)
        });
        router.delete("/api/carts/:id/items/:item_id", |_ctx| async {
            Response::new(StatusCode::NoContent)
        });

        let res = router.dispatch(ctx("PATCH", "/api/carts/c1/items/i9")).await;
        assert_eq!(body_of(&res), "c1/i9");

        let res = router.dispatch(ctx("DELETE", "/api/carts/c1/items/i9/")).await;
        assert_eq!(res.status(), StatusCode::NoContent);
    }
}
