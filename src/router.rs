//! # Router
//!
//! The top-level aggregate: a set of host nodes, an optional root resource
//! for host-less paths, and the process-wide not-found and redirect handlers.
//! [`Router::dispatch`] is the request entry point; the registration surface
//! lives in the `registrar` module.
//!
//! ## Examples
//!
//! ```rust
//! use treelight::{Router, Request, Response};
//!
//! let mut router = Router::new();
//! router
//!     .resource("/api/v1/status")
//!     .unwrap()
//!     .get(|_req: Request| async { Response::ok().body("up") })
//!     .unwrap();
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use http::StatusCode;

use crate::dispatch;
use crate::error::{Result, RouterError};
use crate::handler::{into_handler_fn, BoxedFuture, Handler, HandlerFn, RedirectHandlerFn};
use crate::middleware::{self, into_middleware_fn, Middleware};
use crate::resource::Resource;
use crate::{Request, Response};

/// The request router.
///
/// Hosts and resources are registered during the configuration phase, which
/// requires exclusive access (`&mut self`). Once requests are being
/// dispatched the tree must be left alone; the registration APIs report
/// [`RouterError::ResourceInUse`](crate::RouterError::ResourceInUse) when
/// that precondition is broken.
pub struct Router {
    pub(crate) static_hosts: HashMap<String, Arc<Resource>>,
    pub(crate) pattern_hosts: Vec<Arc<Resource>>,
    pub(crate) root: Option<Arc<Resource>>,
    not_found: HandlerFn,
    redirect: RedirectHandlerFn,
    redirect_code: StatusCode,
    redirect_code_fixed: bool,
}

fn default_not_found_handler() -> HandlerFn {
    Arc::new(|_req| Box::pin(async { Response::not_found() }))
}

fn default_redirect_handler() -> RedirectHandlerFn {
    Arc::new(|_req, location, code| {
        Box::pin(async move { Response::redirect(code, &location) })
    })
}

impl Router {
    /// Creates an empty router: no hosts, no root resource, the default 404
    /// handler, and 308 as the permanent-redirect status.
    pub fn new() -> Self {
        Self {
            static_hosts: HashMap::new(),
            pattern_hosts: Vec::new(),
            root: None,
            not_found: default_not_found_handler(),
            redirect: default_redirect_handler(),
            redirect_code: StatusCode::PERMANENT_REDIRECT,
            redirect_code_fixed: false,
        }
    }

    /// Replaces the handler that answers requests no resource matched.
    pub fn set_not_found_handler<H>(&mut self, handler: H) -> &mut Self
    where
        H: Handler,
    {
        self.not_found = into_handler_fn(handler);
        self
    }

    /// Wraps the not-found handler with middleware.
    pub fn wrap_not_found<M>(&mut self, middleware: M) -> &mut Self
    where
        M: Middleware,
    {
        let middleware = into_middleware_fn(middleware);
        self.not_found =
            middleware::apply(std::slice::from_ref(&middleware), self.not_found.clone());
        self
    }

    /// Replaces the handler that writes redirect responses.
    pub fn set_redirect_handler<F, Fut>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(Request, String, StatusCode) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Response> + Send + 'static,
    {
        self.redirect = Arc::new(move |req, location, code| {
            Box::pin(handler(req, location, code)) as BoxedFuture
        });
        self
    }

    /// Wraps the redirect handler, e.g. for instrumentation.
    pub fn wrap_redirect_handler<F>(&mut self, wrap: F) -> &mut Self
    where
        F: FnOnce(RedirectHandlerFn) -> RedirectHandlerFn,
    {
        self.redirect = wrap(self.redirect.clone());
        self
    }

    /// Sets the status code used for canonicalizing redirects: 308 (the
    /// default) or 301 for older clients. Changing an explicitly set code is
    /// a conflict.
    pub fn set_permanent_redirect_code(&mut self, code: StatusCode) -> Result<&mut Self> {
        if code != StatusCode::PERMANENT_REDIRECT && code != StatusCode::MOVED_PERMANENTLY {
            return Err(RouterError::InvalidArgument(format!(
                "permanent redirect code must be 308 or 301, got {}",
                code
            )));
        }
        if self.redirect_code_fixed && self.redirect_code != code {
            return Err(RouterError::ConflictingStatusCode {
                existing: self.redirect_code,
                new: code,
            });
        }
        self.redirect_code = code;
        self.redirect_code_fixed = true;
        Ok(self)
    }

    /// The status code used for canonicalizing redirects.
    pub fn permanent_redirect_code(&self) -> StatusCode {
        self.redirect_code
    }

    /// Dispatches one request through the tree and returns the response.
    ///
    /// Host selection first: the request authority is looked up among the
    /// static hosts, then matched against the pattern hosts in registration
    /// order; with no host match the root resource takes the request. The
    /// selected node then walks the path one segment per hop.
    pub async fn dispatch(&self, mut req: Request) -> Response {
        let mut host_values = None;
        let node = match req.host() {
            Some(host) => {
                if let Some(found) = self.static_hosts.get(host) {
                    Some(found.clone())
                } else {
                    let matched = self.pattern_hosts.iter().find_map(|candidate| {
                        candidate
                            .template()
                            .match_str(host)
                            .map(|values| (candidate.clone(), values))
                    });
                    match matched {
                        Some((found, values)) => {
                            host_values = Some(values);
                            Some(found)
                        }
                        None => self.root.clone(),
                    }
                }
            }
            None => self.root.clone(),
        };
        let Some(node) = node else {
            tracing::debug!(host = req.host().unwrap_or_default(), "nothing to serve the request");
            return (self.not_found)(req).await;
        };

        req.routing.redirect = Some(self.redirect.clone());
        req.routing.redirect_code = self.redirect_code;
        req.routing.not_found = Some(self.not_found.clone());
        if let Some(values) = host_values {
            req.routing.host_values = values;
        }

        let path = req.path().to_string();
        let path = if path.is_empty() { "/".to_string() } else { path };

        if path != "/" && !dispatch::is_clean_path(&path) {
            let config = node.config();
            if !(config.lenient_on_unclean_path && config.subtree) {
                let mut location = dispatch::clean_path(&path);
                if let Some(query) = req.query_string() {
                    location.push('?');
                    location.push_str(query);
                }
                tracing::debug!(%path, %location, "redirecting unclean path");
                return (self.redirect)(req, location, self.redirect_code).await;
            }
        }

        let Some((segments, trailing_slash)) = dispatch::split_path(&path) else {
            return Response::bad_request();
        };
        req.routing.segments = segments;
        req.routing.trailing_slash = trailing_slash;
        req.routing.next = 0;

        let mut response = Resource::receive(node, req).await;
        if response.is_passed() {
            return match response.take_passed_request() {
                Some(request) => (self.not_found)(request).await,
                None => Response::not_found(),
            };
        }
        response
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
