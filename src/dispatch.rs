//! # Dispatch State
//!
//! Request-scoped routing state and path normalization. The state rides on
//! the [`Request`](crate::Request) through the whole dispatch chain: the
//! percent-decoded path segments, the walk position, the values captured so
//! far, the remaining path once a subtree handler takes over, and the
//! process-wide handlers injected by the router for gates deep in the tree.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use http::StatusCode;

use crate::handler::{HandlerFn, RedirectHandlerFn};
use crate::template::TemplateValues;

/// One path segment, kept in both its raw (as sent) and percent-decoded form.
/// Matching uses the decoded form; the remaining path is rebuilt from the raw
/// one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PathSegment {
    pub(crate) raw: String,
    pub(crate) decoded: String,
}

/// Splits a request path into segments, percent-decoding each one.
///
/// Returns `None` when a segment is not decodable (the dispatcher answers
/// 400). The leading slash and a trailing slash are structural, not segments;
/// the trailing slash is reported separately.
pub(crate) fn split_path(path: &str) -> Option<(Vec<PathSegment>, bool)> {
    let trailing = path.len() > 1 && path.ends_with('/');
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let trimmed = if trailing {
        &trimmed[..trimmed.len() - 1]
    } else {
        trimmed
    };

    if trimmed.is_empty() {
        return Some((Vec::new(), trailing));
    }

    let mut segments = Vec::new();
    for part in trimmed.split('/') {
        let decoded = urlencoding::decode(part).ok()?.into_owned();
        segments.push(PathSegment {
            raw: part.to_string(),
            decoded,
        });
    }
    Some((segments, trailing))
}

/// A clean path is absolute and has no empty, `.`, or `..` segments.
pub(crate) fn is_clean_path(path: &str) -> bool {
    if !path.starts_with('/') {
        return false;
    }
    if path.contains("//") {
        return false;
    }
    path[1..]
        .split('/')
        .all(|seg| seg != "." && seg != "..")
}

/// Canonicalizes a path: resolves `.` and `..`, collapses repeated slashes,
/// keeps the trailing slash. `..` never escapes the root.
pub(crate) fn clean_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    let trailing = path.ends_with('/');
    let mut stack: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            seg => stack.push(seg),
        }
    }
    let mut out = String::from("/");
    out.push_str(&stack.join("/"));
    if trailing && out.len() > 1 {
        out.push('/');
    }
    out
}

/// Per-request routing state.
pub(crate) struct RoutingState {
    pub(crate) segments: Vec<PathSegment>,
    pub(crate) next: usize,
    pub(crate) trailing_slash: bool,
    pub(crate) path_values: TemplateValues,
    pub(crate) host_values: TemplateValues,
    pub(crate) remaining_path: Option<String>,
    pub(crate) shared_data: Option<Arc<dyn Any + Send + Sync>>,
    pub(crate) redirect: Option<RedirectHandlerFn>,
    pub(crate) redirect_code: StatusCode,
    pub(crate) not_found: Option<HandlerFn>,
}

impl Default for RoutingState {
    fn default() -> Self {
        Self {
            segments: Vec::new(),
            next: 0,
            trailing_slash: false,
            path_values: TemplateValues::new(),
            host_values: TemplateValues::new(),
            remaining_path: None,
            shared_data: None,
            redirect: None,
            redirect_code: StatusCode::PERMANENT_REDIRECT,
            not_found: None,
        }
    }
}

impl fmt::Debug for RoutingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingState")
            .field("segments", &self.segments)
            .field("next", &self.next)
            .field("trailing_slash", &self.trailing_slash)
            .field("path_values", &self.path_values)
            .field("host_values", &self.host_values)
            .field("remaining_path", &self.remaining_path)
            .finish_non_exhaustive()
    }
}

/// A snapshot of the walk position, taken before descending into a child so
/// a subtree fallback can rewind.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Checkpoint {
    next: usize,
    path_values_len: usize,
}

impl RoutingState {
    pub(crate) fn has_remaining(&self) -> bool {
        self.next < self.segments.len()
    }

    pub(crate) fn current(&self) -> Option<&PathSegment> {
        self.segments.get(self.next)
    }

    pub(crate) fn advance(&mut self) {
        self.next += 1;
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            next: self.next,
            path_values_len: self.path_values.len(),
        }
    }

    pub(crate) fn rewind(&mut self, checkpoint: Checkpoint) {
        self.next = checkpoint.next;
        self.path_values.truncate(checkpoint.path_values_len);
    }

    /// The raw, unconsumed tail of the request path starting at `next`.
    pub(crate) fn remaining(&self) -> String {
        let mut out = self.segments[self.next..]
            .iter()
            .map(|seg| seg.raw.as_str())
            .collect::<Vec<_>>()
            .join("/");
        if self.trailing_slash {
            out.push('/');
        }
        out
    }

    pub(crate) fn record_remaining(&mut self) {
        self.remaining_path = Some(self.remaining());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_and_decodes_segments() {
        let (segments, trailing) = split_path("/a/b%20c/d/").unwrap();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[1].raw, "b%20c");
        assert_eq!(segments[1].decoded, "b c");
        assert!(trailing);
    }

    #[test]
    fn root_path_has_no_segments() {
        let (segments, trailing) = split_path("/").unwrap();
        assert!(segments.is_empty());
        assert!(!trailing);
    }

    #[test]
    fn undecodable_segment_is_rejected() {
        assert!(split_path("/a%FFb").is_none());
    }

    #[test]
    fn recognizes_unclean_paths() {
        assert!(is_clean_path("/a/b"));
        assert!(is_clean_path("/"));
        assert!(is_clean_path("/a/b/"));
        assert!(!is_clean_path("/a//b"));
        assert!(!is_clean_path("/a/./b"));
        assert!(!is_clean_path("/a/../b"));
        assert!(!is_clean_path("a/b"));
    }

    #[test]
    fn cleans_paths() {
        assert_eq!(clean_path("/a/./c/../b"), "/a/b");
        assert_eq!(clean_path("/a//b/"), "/a/b/");
        assert_eq!(clean_path("/../.."), "/");
        assert_eq!(clean_path("/a/b/.."), "/a");
        assert_eq!(clean_path("/"), "/");
    }

    #[test]
    fn remaining_path_preserves_raw_form() {
        let (segments, trailing) = split_path("/files/a%20b/deep/").unwrap();
        let mut state = RoutingState {
            segments,
            trailing_slash: trailing,
            next: 1,
            ..Default::default()
        };
        assert_eq!(state.remaining(), "a%20b/deep/");
        state.record_remaining();
        assert_eq!(state.remaining_path.as_deref(), Some("a%20b/deep/"));
    }

    #[test]
    fn checkpoint_rewinds_values_and_position() {
        let (segments, _) = split_path("/a/b/c").unwrap();
        let mut state = RoutingState {
            segments,
            ..Default::default()
        };
        state.path_values.push("x", "1");
        let checkpoint = state.checkpoint();
        state.advance();
        state.advance();
        state.path_values.push("y", "2");
        state.rewind(checkpoint);
        assert_eq!(state.next, 0);
        assert_eq!(state.path_values.len(), 1);
    }
}
