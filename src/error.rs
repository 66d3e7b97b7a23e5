//! # Error Types
//!
//! All configuration-time failures of the router are reported through
//! [`RouterError`]. Dispatch never returns these; runtime failures (bad
//! percent-encoding, unmatched paths, wrong scheme, wrong method) are turned
//! into HTTP responses instead.

use http::StatusCode;

/// Result type for router configuration operations.
pub type Result<T> = std::result::Result<T, RouterError>;

/// Errors surfaced while templates are parsed and the resource tree is built.
///
/// Variants carry the offending template, name, or method so the message
/// identifies the registration site. Every registration API propagates these
/// with `?`; nothing is swallowed, with one exception: bulk method-wrap
/// operations skip [`RouterError::NoHandlerExists`] for individual methods on
/// nodes that have at least one handler.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    // ---- input shape ----
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("empty path template")]
    EmptyPathTemplate,

    #[error("empty path segment template in {0:?}")]
    EmptyPathSegmentTemplate(String),

    #[error("empty host template")]
    EmptyHostTemplate,

    #[error("unwanted path template in {0:?}")]
    UnwantedPathTemplate(String),

    #[error("wildcard host template {0:?}")]
    WildcardHostTemplate(String),

    #[error("resource has no name: {0:?}")]
    UnnamedResource(String),

    #[error("{0:?} may be owned only by a router")]
    NonRouterParent(String),

    // ---- template ----
    #[error("invalid template {template:?}: {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("value {value:?} does not satisfy the pattern of {name:?}")]
    InvalidValue { name: String, value: String },

    #[error("missing value for {name:?}")]
    MissingValue { name: String },

    #[error("value name {name:?} was declared with a different pattern")]
    DifferentPattern { name: String },

    #[error("wildcard name {name:?} is repeated")]
    RepeatedWildcardName { name: String },

    #[error("second wildcard {name:?} in one template")]
    AnotherWildcardName { name: String },

    #[error("templates {a:?} and {b:?} are not equivalent")]
    DifferentTemplates { a: String, b: String },

    #[error("templates {a:?} and {b:?} differ in value names")]
    DifferentValueNames { a: String, b: String },

    #[error("templates {a:?} and {b:?} differ in name")]
    DifferentNames { a: String, b: String },

    // ---- structural conflict ----
    #[error("conflicting host template {0:?}")]
    ConflictingHost(String),

    #[error("conflicting path {0:?}")]
    ConflictingPath(String),

    #[error("conflicting path segment template {0:?}")]
    ConflictingPathSegment(String),

    #[error("conflicting security policy on {0:?}")]
    ConflictingSecurity(String),

    #[error("conflicting trailing slash policy on {0:?}")]
    ConflictingTrailingSlash(String),

    #[error("conflicting config on {0:?}")]
    ConflictingConfig(String),

    #[error("conflicting redirect status code: {existing} is already in use, cannot set {new}")]
    ConflictingStatusCode { existing: StatusCode, new: StatusCode },

    #[error("method {method:?} is already handled by {template:?}")]
    ConflictingMethod { method: String, template: String },

    // ---- registration ----
    #[error("duplicate host template {0:?}")]
    DuplicateHostTemplate(String),

    #[error("duplicate resource template {0:?}")]
    DuplicateResourceTemplate(String),

    #[error("name {name:?} is used more than once in the URL")]
    DuplicateNameInTheURL { name: String },

    #[error("value name {name:?} is used more than once in the URL")]
    DuplicateValueNameInTheURL { name: String },

    #[error("name {name:?} is already used by a sibling")]
    DuplicateNameAmongSiblings { name: String },

    #[error("host {0:?} is already registered")]
    RegisteredHost(String),

    #[error("resource {0:?} is already registered")]
    RegisteredResource(String),

    // ---- state ----
    #[error("host {0:?} does not exist")]
    NonExistentHost(String),

    #[error("resource {0:?} does not exist")]
    NonExistentResource(String),

    #[error("host {0:?} has no handlers")]
    DormantHost(String),

    #[error("resource {0:?} has no handlers")]
    DormantResource(String),

    #[error("no HTTP method was given")]
    NoHTTPMethod,

    #[error("no handler exists for method {method:?}")]
    NoHandlerExists { method: String },

    #[error("no middleware was given")]
    NoMiddleware,

    /// The tree was mutated while shared. Registration APIs require the
    /// exclusive access of the configuration phase; this is what surfaces when
    /// that precondition is broken.
    #[error("resource tree is shared and can no longer be configured")]
    ResourceInUse,
}
