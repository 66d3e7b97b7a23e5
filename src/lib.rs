//! # treelight
//!
//! A tree-structured HTTP request router. Hosts and path segments are
//! described by URL templates — static literals, named regex patterns, and
//! wildcards — arranged in a hierarchy of resources. Each resource carries
//! its own method handlers, policy flags (https-only, trailing slash,
//! subtree catch-all), and middleware.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use treelight::{serve, Request, Response, Router};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut router = Router::new();
//!
//!     router
//!         .resource("/")
//!         .unwrap()
//!         .get(|_req: Request| async { Response::ok().body("Hello, World!") })
//!         .unwrap();
//!
//!     router
//!         .resource("/users/{id:[0-9]+}")
//!         .unwrap()
//!         .get(|req: Request| async move {
//!             let id = req.param("id").unwrap_or("unknown").to_string();
//!             Response::ok().body(format!("User ID: {}", id))
//!         })
//!         .unwrap();
//!
//!     serve("127.0.0.1:3000".parse().unwrap(), router).await.unwrap();
//! }
//! ```

pub mod config;
mod dispatch;
pub mod error;
pub mod handler;
pub mod middleware;
mod registrar;
pub mod request;
pub mod resource;
pub mod response;
pub mod router;
pub mod server;
pub mod template;

// Everything you need to get started
pub use config::ResourceConfig;
pub use error::{Result, RouterError};
pub use handler::{into_handler_fn, BoxedFuture, Handler, HandlerFn, RedirectHandlerFn};
pub use middleware::{Middleware, MiddlewareFn, Next};
pub use request::Request;
pub use resource::{Resource, Tier, METHOD_ANY, METHOD_NOT_ALLOWED_HANDLER};
pub use response::Response;
pub use router::Router;
pub use server::serve;
pub use template::{Similarity, Template, TemplateValues};

// HTTP essentials from the http crate
pub use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
