//! # Middleware System
//!
//! Middleware intercepts requests and responses around a handler. Each
//! resource node carries two independent middleware chains: one around its
//! request handler (method resolution) and one around its request passer (the
//! hop to a child node). The router additionally allows wrapping its
//! not-found handler.
//!
//! A middleware wraps a handler with the same signature in and out. The first
//! middleware added to a chain runs outermost.
//!
//! ## Examples
//!
//! ```rust
//! use treelight::{Request, Response, middleware::Middleware};
//! use std::pin::Pin;
//! use std::future::Future;
//!
//! struct Logger;
//!
//! impl Middleware for Logger {
//!     fn call(
//!         &self,
//!         req: Request,
//!         next: Box<dyn Fn(Request) -> Pin<Box<dyn Future<Output = Response> + Send + 'static>> + Send + Sync>,
//!     ) -> Pin<Box<dyn Future<Output = Response> + Send + 'static>> {
//!         Box::pin(async move {
//!             println!("{} {}", req.method(), req.path());
//!             let response = next(req).await;
//!             println!("-> {}", response.status_code());
//!             response
//!         })
//!     }
//! }
//! ```
//!
//! Function-based middleware works too:
//!
//! ```rust
//! use treelight::{Next, Request, Response, Router};
//!
//! let mut router = Router::new();
//! let resource = router.resource("/api").unwrap();
//! resource.wrap_request_handler(|req: Request, next: Next| async move {
//!     let mut response = next(req).await;
//!     response = response.header("X-Router", "treelight");
//!     response
//! });
//! ```

use std::sync::Arc;

use crate::handler::{BoxedFuture, HandlerFn};
use crate::Request;

/// The continuation a middleware calls to run the rest of the chain.
pub type Next = Box<dyn Fn(Request) -> BoxedFuture + Send + Sync>;

/// Type alias for erased middleware functions.
pub type MiddlewareFn = Arc<dyn Fn(Request, Next) -> BoxedFuture + Send + Sync + 'static>;

/// Trait for implementing middleware components.
///
/// A middleware receives the request and a `next` function that continues
/// through the remaining middleware and finally the wrapped handler. It can
/// modify the request before calling `next`, modify the response after, or
/// short-circuit by not calling `next` at all.
pub trait Middleware: Send + Sync + 'static {
    /// Processes a request through the middleware chain.
    fn call(&self, req: Request, next: Next) -> BoxedFuture;
}

/// Any function that matches the signature can be middleware
impl<F, Fut> Middleware for F
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = crate::Response> + Send + 'static,
{
    fn call(&self, req: Request, next: Next) -> BoxedFuture {
        Box::pin(self(req, next))
    }
}

pub(crate) fn into_middleware_fn<M>(middleware: M) -> MiddlewareFn
where
    M: Middleware,
{
    Arc::new(move |req, next| middleware.call(req, next))
}

/// Wraps `inner` with the given chain. `wrappers[0]` ends up outermost.
pub(crate) fn apply(wrappers: &[MiddlewareFn], inner: HandlerFn) -> HandlerFn {
    let mut wrapped = inner;
    for middleware in wrappers.iter().rev() {
        let middleware = middleware.clone();
        let next_handler = wrapped;
        wrapped = Arc::new(move |req| {
            let next_handler = next_handler.clone();
            middleware(req, Box::new(move |req| next_handler(req)))
        });
    }
    wrapped
}

/// Built-in middleware that logs each request and its response status.
pub fn logger() -> impl Middleware {
    |req: Request, next: Next| {
        Box::pin(async move {
            let method = req.method().clone();
            let path = req.path().to_string();
            let start = std::time::Instant::now();

            let response = next(req).await;

            tracing::info!(
                %method,
                %path,
                status = %response.status_code(),
                elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
                "request served"
            );

            response
        }) as BoxedFuture
    }
}

/// Built-in middleware for adding security headers
pub fn security_headers() -> impl Middleware {
    |req: Request, next: Next| {
        Box::pin(async move {
            let mut response = next(req).await;

            response = response
                .header("X-Content-Type-Options", "nosniff")
                .header("X-Frame-Options", "DENY")
                .header("X-XSS-Protection", "1; mode=block");

            response
        }) as BoxedFuture
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Response;

    fn terminal(body: &'static str) -> HandlerFn {
        Arc::new(move |_req| Box::pin(async move { Response::ok().body(body) }))
    }

    #[tokio::test]
    async fn apply_wraps_outermost_first() {
        let order = |tag: &'static str| -> MiddlewareFn {
            Arc::new(move |req: Request, next: Next| {
                Box::pin(async move {
                    let response = next(req).await;
                    let mut body = response.body_bytes().to_vec();
                    body.extend_from_slice(tag.as_bytes());
                    Response::ok().body(body)
                })
            })
        };

        let chain = apply(&[order(":first"), order(":second")], terminal("h"));
        let response = chain(Request::new()).await;
        // The first middleware runs outermost, so it appends last.
        assert_eq!(response.body_bytes(), b"h:second:first");
    }

    #[tokio::test]
    async fn middleware_can_short_circuit() {
        let gate: MiddlewareFn = Arc::new(|_req: Request, _next: Next| {
            Box::pin(async { Response::unauthorized() })
        });
        let chain = apply(&[gate], terminal("never"));
        let response = chain(Request::new()).await;
        assert_eq!(response.status_code(), http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn security_headers_are_added() {
        let chain = apply(
            &[into_middleware_fn(security_headers())],
            terminal("ok"),
        );
        let response = chain(Request::new()).await;
        assert_eq!(
            response.headers().get("X-Content-Type-Options").unwrap(),
            "nosniff"
        );
    }
}
