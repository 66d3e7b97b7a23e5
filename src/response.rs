//! # HTTP Response Building
//!
//! This module provides the [`Response`] struct for building HTTP responses
//! with a fluent, chainable API, plus the pass-back mechanism the dispatcher
//! uses: a handler that declines a request returns [`Response::pass`], which
//! carries the request back up the tree so an ancestor subtree handler or the
//! router's not-found handler can take over.

use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use http_body_util::Full;
use hyper::body::Bytes;

use crate::Request;

/// HTTP response builder with a fluent API for creating responses.
///
/// # Examples
///
/// ```rust
/// use treelight::Response;
/// use http::StatusCode;
///
/// let response = Response::ok()
///     .header("X-API-Version", "1.0")
///     .body("Hello, World!");
/// assert_eq!(response.status_code(), StatusCode::OK);
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    passed: Option<Box<Request>>,
    is_passed: bool,
}

impl Response {
    /// Create a new response with 200 OK status
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Vec::new(),
            passed: None,
            is_passed: false,
        }
    }

    /// Create a response with 200 OK status (alias for new)
    pub fn ok() -> Self {
        Self::new()
    }

    /// Create a response with a specific status code
    pub fn with_status(status: StatusCode) -> Self {
        Self {
            status,
            ..Self::new()
        }
    }

    /// Create a 404 Not Found response
    pub fn not_found() -> Self {
        Self::with_status(StatusCode::NOT_FOUND).body("Not Found")
    }

    /// Create a 500 Internal Server Error response
    pub fn internal_error() -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR).body("Internal Server Error")
    }

    /// Create a 400 Bad Request response
    pub fn bad_request() -> Self {
        Self::with_status(StatusCode::BAD_REQUEST).body("Bad Request")
    }

    /// Create a 405 Method Not Allowed response
    pub fn method_not_allowed() -> Self {
        Self::with_status(StatusCode::METHOD_NOT_ALLOWED).body("Method Not Allowed")
    }

    /// Create a 401 Unauthorized response
    pub fn unauthorized() -> Self {
        Self::with_status(StatusCode::UNAUTHORIZED).body("Unauthorized")
    }

    /// Declines to handle the request.
    ///
    /// The request travels back up the dispatch chain inside the response;
    /// the nearest ancestor configured as a subtree handler picks it up, and
    /// failing that the router's not-found handler answers.
    pub fn pass(req: Request) -> Self {
        let mut response = Self::with_status(StatusCode::NOT_FOUND);
        response.passed = Some(Box::new(req));
        response.is_passed = true;
        response
    }

    /// True when the request was declined rather than handled.
    pub fn is_passed(&self) -> bool {
        self.is_passed
    }

    pub(crate) fn take_passed_request(&mut self) -> Option<Request> {
        self.passed.take().map(|boxed| *boxed)
    }

    /// Set the status code
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Set the response body
    pub fn body<T: Into<Vec<u8>>>(mut self, body: T) -> Self {
        self.body = body.into();
        self
    }

    /// Set a header
    pub fn header<K, V>(mut self, key: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
        K::Error: std::fmt::Debug,
        V::Error: std::fmt::Debug,
    {
        let key = key.try_into().expect("Invalid header name");
        let value = value.try_into().expect("Invalid header value");
        self.headers.insert(key, value);
        self
    }

    /// Set the Content-Type header
    pub fn content_type(self, content_type: &str) -> Self {
        self.header("content-type", content_type)
    }

    /// Set response as JSON and serialize the value (requires "json" feature)
    #[cfg(feature = "json")]
    pub fn json<T: serde::Serialize>(self, value: &T) -> Result<Self, serde_json::Error> {
        let json_string = serde_json::to_string(value)?;
        Ok(self.content_type("application/json").body(json_string))
    }

    /// Set response as HTML
    pub fn html<T: Into<Vec<u8>>>(self, html: T) -> Self {
        self.content_type("text/html; charset=utf-8").body(html)
    }

    /// Set response as plain text
    pub fn text<T: Into<Vec<u8>>>(self, text: T) -> Self {
        self.content_type("text/plain; charset=utf-8").body(text)
    }

    /// Redirect to another URL
    pub fn redirect(status: StatusCode, location: &str) -> Self {
        Self::with_status(status).header("location", location)
    }

    /// Redirect with 308 Permanent Redirect status
    pub fn redirect_permanent(location: &str) -> Self {
        Self::redirect(StatusCode::PERMANENT_REDIRECT, location)
    }

    /// Get the status code
    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    /// Get the headers
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get the body as bytes
    pub fn body_bytes(&self) -> &[u8] {
        &self.body
    }

    /// Convert to hyper Response
    pub fn into_hyper_response(self) -> hyper::Response<Full<Bytes>> {
        let mut response = hyper::Response::builder().status(self.status);

        for (key, value) in self.headers.iter() {
            response = response.header(key, value);
        }

        response
            .body(Full::new(Bytes::from(self.body)))
            .expect("Failed to build response")
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for Response {
    fn from(body: &str) -> Self {
        Response::ok().body(body)
    }
}

impl From<String> for Response {
    fn from(body: String) -> Self {
        Response::ok().body(body)
    }
}

impl From<StatusCode> for Response {
    fn from(status: StatusCode) -> Self {
        Response::with_status(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_creation() {
        let response = Response::ok().body("Hello, World!");
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.body_bytes(), b"Hello, World!");
    }

    #[test]
    fn test_response_with_headers() {
        let response = Response::ok()
            .header("x-custom", "value")
            .content_type("text/plain")
            .body("test");

        assert_eq!(response.headers().get("x-custom").unwrap(), "value");
        assert_eq!(response.headers().get("content-type").unwrap(), "text/plain");
    }

    #[test]
    fn test_redirect() {
        let response = Response::redirect_permanent("/new-path");
        assert_eq!(response.status_code(), StatusCode::PERMANENT_REDIRECT);
        assert_eq!(response.headers().get("location").unwrap(), "/new-path");
    }

    #[test]
    fn internal_error_is_a_plain_500() {
        let response = Response::internal_error();
        assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body_bytes(), b"Internal Server Error");
    }

    #[test]
    fn passed_response_returns_the_request() {
        let req = Request::new();
        let mut response = Response::pass(req);
        assert!(response.is_passed());
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
        assert!(response.take_passed_request().is_some());
        assert!(response.take_passed_request().is_none());
    }

    #[test]
    fn handled_responses_are_not_passed() {
        let response = Response::not_found();
        assert!(!response.is_passed());
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_json_response() {
        use serde_json::json;

        let data = json!({"message": "Hello, World!"});
        let response = Response::ok().json(&data).unwrap();

        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
        assert_eq!(response.body_bytes(), br#"{"message":"Hello, World!"}"#);
    }
}
