//! # Request Handlers
//!
//! A method handler receives the routed [`Request`] — captured host and path
//! values, remaining path, and shared data included — and asynchronously
//! produces something that converts into a [`Response`]: a `Response` built
//! with its fluent API, a bare `&str`/`String` body, or a `StatusCode`.
//!
//! Resources store handlers erased as [`HandlerFn`]; the erasure happens once
//! at registration time, when a handler is bound into a method table.
//!
//! ```rust
//! use treelight::{Request, Response, Router};
//!
//! let mut router = Router::new();
//! let resource = router.resource("/ping").unwrap();
//! // Any `Into<Response>` output works; a string becomes a 200 body.
//! resource.get(|_req: Request| async { "pong" }).unwrap();
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::{Request, Response};

/// Boxed response future, the return type of every erased handler.
pub type BoxedFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// An erased handler, as stored in a resource's method table and in the
/// router's not-found slot.
pub type HandlerFn = Arc<dyn Fn(Request) -> BoxedFuture + Send + Sync + 'static>;

/// The router's redirect handler: receives the request, the `Location` value,
/// and the status code to emit. Swappable and wrappable on the router.
pub type RedirectHandlerFn = Arc<
    dyn Fn(Request, String, http::StatusCode) -> BoxedFuture + Send + Sync + 'static,
>;

/// Something a resource method can dispatch to.
///
/// Implemented for every async function and closure of a routed request
/// whose output converts into a [`Response`]. The conversion is resolved
/// when the handler is bound, so the dispatch path only ever sees
/// [`BoxedFuture`]s.
pub trait Handler: Send + Sync + 'static {
    /// Handle the routed request.
    fn handle(&self, req: Request) -> BoxedFuture;
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: Into<Response>,
{
    fn handle(&self, req: Request) -> BoxedFuture {
        // Call first so the future owns no borrow of the handler.
        let response = self(req);
        Box::pin(async move { response.await.into() })
    }
}

/// Binds a handler into its erased, method-table form.
pub fn into_handler_fn<H>(handler: H) -> HandlerFn
where
    H: Handler,
{
    Arc::new(move |req| handler.handle(req))
}
