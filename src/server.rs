//! # HTTP Server
//!
//! A thin hyper 1.x serve loop that drives [`Router::dispatch`]. The router
//! core never touches the network itself; this module is the glue between a
//! TCP listener and the dispatch pipeline.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request as HyperRequest, Response as HyperResponse};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use crate::{Request, Router};

/// Binds `addr` and serves requests with the given router until the process
/// exits.
///
/// The router is frozen here: no further registration is possible once
/// serving starts.
///
/// # Examples
///
/// ```rust,no_run
/// use treelight::{serve, Request, Response, Router};
///
/// #[tokio::main]
/// async fn main() {
///     let mut router = Router::new();
///     router
///         .resource("/hello")
///         .unwrap()
///         .get(|_req: Request| async { Response::ok().body("Hello, World!") })
///         .unwrap();
///
///     serve("127.0.0.1:3000".parse().unwrap(), router).await.unwrap();
/// }
/// ```
pub async fn serve(
    addr: SocketAddr,
    router: Router,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let router = Arc::new(router);
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(%addr, "listening");

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let router = router.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req| {
                let router = router.clone();
                async move { handle_request(req, router).await }
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                tracing::warn!(error = %err, "connection error");
            }
        });
    }
}

/// Handle a single HTTP request
async fn handle_request(
    hyper_req: HyperRequest<hyper::body::Incoming>,
    router: Arc<Router>,
) -> Result<HyperResponse<http_body_util::Full<hyper::body::Bytes>>, Infallible> {
    let (parts, body) = hyper_req.into_parts();

    let mut request = match Request::from_hyper(parts, body).await {
        Ok(req) => req,
        Err(err) => {
            tracing::warn!(error = %err, "failed to read request");
            return Ok(crate::Response::internal_error().into_hyper_response());
        }
    };
    // Plain TCP; a TLS-terminating deployment would set this from the
    // connection or a forwarded-protocol header.
    request.set_secure(false);

    let response = router.dispatch(request).await;
    Ok(response.into_hyper_response())
}
