//! # Resource Configuration
//!
//! Per-node policy flags. A resource's config decides whether it responds
//! only over https, whether its canonical URL carries a trailing slash and
//! how strictly that is enforced, whether it catches the whole subtree below
//! it, and how unclean request paths are treated.

use crate::error::{Result, RouterError};

/// Policy flags of a resource or host node.
///
/// The default config has every flag off: the node responds over both
/// schemes, its canonical URL has no trailing slash, mismatches are answered
/// with a permanent redirect, and unclean paths are redirected to their clean
/// form.
///
/// # Examples
///
/// ```
/// use treelight::ResourceConfig;
///
/// let config = ResourceConfig::new()
///     .with_secure()
///     .with_redirect_insecure()
///     .with_subtree();
/// assert!(config.secure);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceConfig {
    /// On a segment miss below this node, its own handler runs and receives
    /// the remaining path.
    pub subtree: bool,
    /// The node responds only over https.
    pub secure: bool,
    /// On an insecure request, redirect to the https form instead of
    /// answering 404. Requires `secure`.
    pub redirect_insecure: bool,
    /// The node's canonical URL ends with `/`.
    pub trailing_slash: bool,
    /// On a trailing-slash mismatch, answer 404 instead of redirecting.
    pub strict_on_trailing_slash: bool,
    /// On a trailing-slash mismatch, proceed silently.
    pub lenient_on_trailing_slash: bool,
    /// Skip the unclean-path redirect.
    pub lenient_on_unclean_path: bool,
}

impl ResourceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subtree(mut self) -> Self {
        self.subtree = true;
        self
    }

    pub fn with_secure(mut self) -> Self {
        self.secure = true;
        self
    }

    pub fn with_redirect_insecure(mut self) -> Self {
        self.redirect_insecure = true;
        self
    }

    pub fn with_trailing_slash(mut self) -> Self {
        self.trailing_slash = true;
        self
    }

    pub fn with_strict_on_trailing_slash(mut self) -> Self {
        self.strict_on_trailing_slash = true;
        self
    }

    pub fn with_lenient_on_trailing_slash(mut self) -> Self {
        self.lenient_on_trailing_slash = true;
        self
    }

    pub fn with_lenient_on_unclean_path(mut self) -> Self {
        self.lenient_on_unclean_path = true;
        self
    }

    /// Both leniencies at once: the request path is taken exactly as sent.
    pub fn with_handle_path_as_is(mut self) -> Self {
        self.lenient_on_trailing_slash = true;
        self.lenient_on_unclean_path = true;
        self
    }

    /// True when both leniencies are on.
    pub fn handles_path_as_is(&self) -> bool {
        self.lenient_on_trailing_slash && self.lenient_on_unclean_path
    }

    /// Rejects contradictory flag combinations.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.redirect_insecure && !self.secure {
            return Err(RouterError::InvalidArgument(
                "redirect_insecure requires secure".to_string(),
            ));
        }
        if self.strict_on_trailing_slash && self.lenient_on_trailing_slash {
            return Err(RouterError::InvalidArgument(
                "strict_on_trailing_slash and lenient_on_trailing_slash are mutually exclusive"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Compares two full configs; any disagreement is a conflict.
    pub(crate) fn check_compatibility(&self, other: &ResourceConfig, site: &str) -> Result<()> {
        if self.secure != other.secure {
            return Err(RouterError::ConflictingSecurity(site.to_string()));
        }
        if self.trailing_slash != other.trailing_slash {
            return Err(RouterError::ConflictingTrailingSlash(site.to_string()));
        }
        if self != other {
            return Err(RouterError::ConflictingConfig(site.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_all_off() {
        let config = ResourceConfig::new();
        assert!(!config.subtree);
        assert!(!config.secure);
        assert!(!config.trailing_slash);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn redirect_insecure_requires_secure() {
        let config = ResourceConfig::new().with_redirect_insecure();
        assert!(config.validate().is_err());
        assert!(config.with_secure().validate().is_ok());
    }

    #[test]
    fn strict_and_lenient_trailing_slash_conflict() {
        let config = ResourceConfig::new()
            .with_strict_on_trailing_slash()
            .with_lenient_on_trailing_slash();
        assert!(config.validate().is_err());
    }

    #[test]
    fn handle_path_as_is_sets_both_leniencies() {
        let config = ResourceConfig::new().with_handle_path_as_is();
        assert!(config.lenient_on_trailing_slash);
        assert!(config.lenient_on_unclean_path);
        assert!(config.handles_path_as_is());
    }

    #[test]
    fn compatibility_reports_the_specific_conflict() {
        let a = ResourceConfig::new().with_secure();
        let b = ResourceConfig::new();
        assert!(matches!(
            a.check_compatibility(&b, "/x"),
            Err(RouterError::ConflictingSecurity(_))
        ));

        let a = ResourceConfig::new().with_trailing_slash();
        assert!(matches!(
            a.check_compatibility(&b, "/x"),
            Err(RouterError::ConflictingTrailingSlash(_))
        ));

        let a = ResourceConfig::new().with_subtree();
        assert!(matches!(
            a.check_compatibility(&b, "/x"),
            Err(RouterError::ConflictingConfig(_))
        ));

        assert!(b.check_compatibility(&ResourceConfig::new(), "/x").is_ok());
    }
}
