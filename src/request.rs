//! # HTTP Request Handling
//!
//! This module provides the [`Request`] struct, which wraps HTTP requests and
//! provides convenient methods for accessing request data like headers, body,
//! query parameters, and — once routing has run — the values captured from
//! the host and path templates, the remaining path of a subtree match, and
//! the shared data of the responding resource.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use http::{HeaderMap, Method, Uri, Version};
use http_body_util::BodyExt;
use hyper::body::Incoming;

use crate::dispatch::RoutingState;
use crate::template::TemplateValues;

/// HTTP request wrapper that provides convenient access to request data.
///
/// The `Request` encapsulates the method, URI, headers, and buffered body of
/// an incoming request, together with the routing state the dispatcher
/// accumulates while walking the resource tree.
///
/// # Examples
///
/// ```rust
/// use treelight::{Router, Request, Response};
///
/// let mut router = Router::new();
/// router
///     .resource("/users/{id:[0-9]+}")
///     .unwrap()
///     .get(|req: Request| async move {
///         let id = req.param("id").unwrap_or("unknown").to_string();
///         Response::ok().body(format!("user {}", id))
///     })
///     .unwrap();
/// ```
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Vec<u8>,
    query: HashMap<String, String>,
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    secure: bool,
    pub(crate) routing: RoutingState,
}

impl Request {
    /// Creates a new empty request with default values.
    ///
    /// Primarily used in tests; in normal operation requests are built from
    /// incoming HTTP requests via [`Request::from_hyper`].
    pub fn new() -> Self {
        Self {
            method: Method::GET,
            uri: Uri::from_static("/"),
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: Vec::new(),
            query: HashMap::new(),
            extensions: HashMap::new(),
            secure: false,
            routing: RoutingState::default(),
        }
    }

    /// Builds a `Request` from already-read parts and body bytes.
    ///
    /// The secure bit is derived from the URI scheme; servers that know
    /// better (TLS termination, forwarded protocol) can override it with
    /// [`Request::set_secure`].
    pub fn from_parts(parts: http::request::Parts, body: Vec<u8>) -> Self {
        let query = Self::parse_query_string(parts.uri.query().unwrap_or(""));
        let secure = parts.uri.scheme_str() == Some("https");

        Request {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
            query,
            extensions: HashMap::new(),
            secure,
            routing: RoutingState::default(),
        }
    }

    /// Creates a new Request from Hyper's request parts and body.
    ///
    /// Reads the entire request body into memory and parses the query string.
    pub async fn from_hyper(
        parts: http::request::Parts,
        body: Incoming,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let body_bytes = body.collect().await?.to_bytes().to_vec();
        Ok(Self::from_parts(parts, body_bytes))
    }

    /// Returns the HTTP method of the request.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the complete URI of the request.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the path portion of the request URI.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Returns the HTTP version of the request.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Returns a reference to the request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get mutable access to headers
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Returns the value of a specific header.
    ///
    /// Returns `None` if the header doesn't exist or contains invalid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// The authority the request was sent to, exactly as received
    /// (`Host` header first, URI authority as fallback).
    pub fn authority(&self) -> Option<&str> {
        self.header("host")
            .or_else(|| self.uri.authority().map(|a| a.as_str()))
    }

    /// The host the request was sent to, without the port.
    pub fn host(&self) -> Option<&str> {
        let authority = self.authority()?;
        // IPv6 literals keep their brackets.
        if let Some(rest) = authority.strip_prefix('[') {
            return rest.split(']').next();
        }
        Some(authority.split(':').next().unwrap_or(authority))
    }

    /// Whether the request arrived over https.
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Overrides the secure bit (used by servers that terminate TLS or trust
    /// a forwarded protocol header).
    pub fn set_secure(&mut self, secure: bool) {
        self.secure = secure;
    }

    /// Returns the request body as a byte slice.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Returns the request body as a UTF-8 string.
    pub fn body_string(&self) -> Result<String, std::string::FromUtf8Error> {
        String::from_utf8(self.body.clone())
    }

    /// Parse the request body as JSON (requires "json" feature)
    #[cfg(feature = "json")]
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(&self.body)
    }

    /// Get a path value by name.
    ///
    /// Path values are the captures of the path-segment templates matched on
    /// the way to the responding resource.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.routing.path_values.get(name)
    }

    /// All values captured from path-segment templates, in capture order.
    pub fn path_values(&self) -> &TemplateValues {
        &self.routing.path_values
    }

    /// Get a host value by name.
    pub fn host_value(&self, name: &str) -> Option<&str> {
        self.routing.host_values.get(name)
    }

    /// All values captured from the host template.
    pub fn host_values(&self) -> &TemplateValues {
        &self.routing.host_values
    }

    /// The raw, unconsumed tail of the request path. Present only when a
    /// subtree resource answered for an unmatched descendant path.
    pub fn remaining_path(&self) -> Option<&str> {
        self.routing.remaining_path.as_deref()
    }

    /// The shared data of the responding resource, if any was attached.
    pub fn shared_data(&self) -> Option<&Arc<dyn Any + Send + Sync>> {
        self.routing.shared_data.as_ref()
    }

    /// The shared data of the responding resource, downcast to `T`.
    pub fn shared_data_as<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.routing
            .shared_data
            .as_ref()
            .and_then(|data| data.downcast_ref())
    }

    /// Get a reference to the request extensions
    pub fn extensions(&self) -> &HashMap<TypeId, Box<dyn Any + Send + Sync>> {
        &self.extensions
    }

    /// Get a mutable reference to the request extensions
    pub fn extensions_mut(&mut self) -> &mut HashMap<TypeId, Box<dyn Any + Send + Sync>> {
        &mut self.extensions
    }

    /// Insert a value into the request extensions
    pub fn insert_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Get a value from the request extensions
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref())
    }

    /// Get a query parameter by name
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(|s| s.as_str())
    }

    /// Get all query parameters
    pub fn query_params(&self) -> &HashMap<String, String> {
        &self.query
    }

    /// Get the raw query string
    pub fn query_string(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Parse query string into a HashMap
    fn parse_query_string(query: &str) -> HashMap<String, String> {
        let mut params = HashMap::new();

        for pair in query.split('&') {
            if let Some((key, value)) = pair.split_once('=') {
                let key = urlencoding::decode(key).unwrap_or_else(|_| key.into()).into_owned();
                let value = urlencoding::decode(value).unwrap_or_else(|_| value.into()).into_owned();
                params.insert(key, value);
            } else if !pair.is_empty() {
                let key = urlencoding::decode(pair).unwrap_or_else(|_| pair.into()).into_owned();
                params.insert(key, String::new());
            }
        }

        params
    }
}

impl Default for Request {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_for(uri: &str) -> Request {
        let (parts, _) = http::Request::builder()
            .method("GET")
            .uri(uri)
            .body(())
            .unwrap()
            .into_parts();
        Request::from_parts(parts, Vec::new())
    }

    #[test]
    fn test_parse_query_string() {
        let query = "name=John&age=30&city=New%20York";
        let params = Request::parse_query_string(query);

        assert_eq!(params.get("name"), Some(&"John".to_string()));
        assert_eq!(params.get("age"), Some(&"30".to_string()));
        assert_eq!(params.get("city"), Some(&"New York".to_string()));
    }

    #[test]
    fn test_parse_empty_query_string() {
        let params = Request::parse_query_string("");
        assert!(params.is_empty());
    }

    #[test]
    fn secure_bit_follows_the_scheme() {
        assert!(request_for("https://example.com/a").is_secure());
        assert!(!request_for("http://example.com/a").is_secure());
        assert!(!request_for("/a").is_secure());
    }

    #[test]
    fn host_strips_the_port() {
        assert_eq!(request_for("http://example.com:8080/a").host(), Some("example.com"));
        assert_eq!(request_for("http://example.com/a").host(), Some("example.com"));
        assert_eq!(request_for("http://[::1]:8080/a").host(), Some("::1"));
        assert_eq!(request_for("/a").host(), None);
    }

    #[test]
    fn authority_prefers_the_host_header() {
        let mut req = request_for("/a");
        req.headers_mut()
            .insert("host", "example.org".parse().unwrap());
        assert_eq!(req.host(), Some("example.org"));
    }
}
