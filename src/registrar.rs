//! # Registration
//!
//! Parsing of URL templates (`[scheme://][host][/path][/]`) into host and
//! path-segment templates, and the router's registration surface: creating
//! resources in place, splicing externally built subtrees, and looking up
//! registered nodes.
//!
//! A URL template names one node. Missing prefix segments are created as
//! dormant placeholders; an existing node found under the template must agree
//! with the scheme and trailing slash the template declares.

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::ResourceConfig;
use crate::error::{Result, RouterError};
use crate::resource::{descend_create, Resource, Tier};
use crate::router::Router;
use crate::template::{Similarity, Template};

/// The scheme/host/path split of a URL template. Scheme implies a host; a
/// scheme-less template is all path.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct UrlParts<'a> {
    pub(crate) secure: Option<bool>,
    pub(crate) host: Option<&'a str>,
    pub(crate) path: &'a str,
}

pub(crate) fn parse_url_template(url: &str) -> Result<UrlParts<'_>> {
    let (secure, rest) = if let Some(rest) = url.strip_prefix("https://") {
        (Some(true), rest)
    } else if let Some(rest) = url.strip_prefix("http://") {
        (Some(false), rest)
    } else {
        return Ok(UrlParts {
            secure: None,
            host: None,
            path: url,
        });
    };

    let (host, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };
    if host.is_empty() {
        return Err(RouterError::EmptyHostTemplate);
    }
    Ok(UrlParts {
        secure,
        host: Some(host),
        path,
    })
}

/// Splits a path template into its segment template strings plus the
/// trailing-slash marker. `"/"` yields no segments (the root resource).
pub(crate) fn parse_path_segments(path: &str) -> Result<(Vec<String>, bool)> {
    if path.is_empty() {
        return Err(RouterError::EmptyPathTemplate);
    }
    if path == "/" {
        return Ok((Vec::new(), false));
    }

    let trailing = path.ends_with('/');
    let body = path.strip_prefix('/').unwrap_or(path);
    let body = if trailing {
        &body[..body.len() - 1]
    } else {
        body
    };

    if body.is_empty() {
        return Err(RouterError::EmptyPathSegmentTemplate(path.to_string()));
    }
    let mut segments = Vec::new();
    for segment in body.split('/') {
        if segment.is_empty() {
            return Err(RouterError::EmptyPathSegmentTemplate(path.to_string()));
        }
        segments.push(segment.to_string());
    }
    Ok((segments, trailing))
}

fn parse_segment_templates(segments: &[String]) -> Result<Vec<Template>> {
    let mut templates = Vec::with_capacity(segments.len());
    for segment in segments {
        templates.push(Template::parse(segment)?);
    }
    Ok(templates)
}

fn parse_host_template(host: &str) -> Result<Template> {
    if host.is_empty() {
        return Err(RouterError::EmptyHostTemplate);
    }
    let template = Template::parse(host)?;
    if template.is_wildcard() {
        return Err(RouterError::WildcardHostTemplate(host.to_string()));
    }
    Ok(template)
}

/// Checks that no template name or value name repeats along one path of
/// templates. Keeps captured values unambiguous.
pub(crate) fn validate_chain_names<'a>(
    templates: impl IntoIterator<Item = &'a Template>,
) -> Result<()> {
    let mut names: HashSet<String> = HashSet::new();
    let mut value_names: HashSet<String> = HashSet::new();
    for template in templates {
        insert_template_names(template, &mut names, &mut value_names)?;
    }
    Ok(())
}

fn insert_template_names(
    template: &Template,
    names: &mut HashSet<String>,
    value_names: &mut HashSet<String>,
) -> Result<()> {
    if !template.has_pattern() {
        return Ok(());
    }
    if let Some(name) = template.name() {
        if !names.insert(name.to_string()) {
            return Err(RouterError::DuplicateNameInTheURL {
                name: name.to_string(),
            });
        }
    }
    for value_name in template.value_names() {
        if !value_names.insert(value_name.to_string()) {
            return Err(RouterError::DuplicateValueNameInTheURL {
                name: value_name.to_string(),
            });
        }
    }
    Ok(())
}

/// Validates a subtree about to be spliced below the given template chain:
/// along every root-to-leaf path, non-static names stay unique.
fn validate_splice<'a>(
    chain: impl IntoIterator<Item = &'a Template>,
    node: &Resource,
) -> Result<()> {
    let mut names: HashSet<String> = HashSet::new();
    let mut value_names: HashSet<String> = HashSet::new();
    for template in chain {
        insert_template_names(template, &mut names, &mut value_names)?;
    }
    validate_subtree_names(node, &mut names, &mut value_names)
}

fn validate_subtree_names(
    node: &Resource,
    names: &mut HashSet<String>,
    value_names: &mut HashSet<String>,
) -> Result<()> {
    let mut added_name: Option<String> = None;
    let mut added_values: Vec<String> = Vec::new();

    if node.template().has_pattern() {
        if let Some(name) = node.template().name() {
            if names.contains(name) {
                return Err(RouterError::DuplicateNameInTheURL {
                    name: name.to_string(),
                });
            }
            names.insert(name.to_string());
            added_name = Some(name.to_string());
        }
        for value_name in node.template().value_names() {
            if value_names.contains(value_name) {
                return Err(RouterError::DuplicateValueNameInTheURL {
                    name: value_name.to_string(),
                });
            }
            value_names.insert(value_name.to_string());
            added_values.push(value_name.to_string());
        }
    }

    for child in node.static_children.values() {
        validate_subtree_names(child, names, value_names)?;
    }
    for child in node.pattern_children.iter() {
        validate_subtree_names(child, names, value_names)?;
    }
    if let Some(child) = &node.wildcard_child {
        validate_subtree_names(child, names, value_names)?;
    }

    // Names bind per path, not per subtree; siblings may reuse them.
    if let Some(name) = added_name {
        names.remove(&name);
    }
    for value_name in added_values {
        value_names.remove(&value_name);
    }
    Ok(())
}

// Detects the `$name` lookup shorthand: an unescaped leading `$` with no
// unescaped `:` after it. Returns the name with its `\:` escapes resolved.
fn lookup_shorthand(segment: &str) -> Option<String> {
    let raw = segment.strip_prefix('$')?;
    let mut name = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(next) => name.push(next),
                None => name.push('\\'),
            },
            ':' => return None,
            c => name.push(c),
        }
    }
    Some(name)
}

impl Router {
    pub(crate) fn root_slot(&mut self) -> &mut Arc<Resource> {
        self.root.get_or_insert_with(|| {
            Arc::new(Resource::from_template(Template::root(), Tier::Path))
        })
    }

    fn root_node_mut(&mut self) -> Result<&mut Resource> {
        let slot = self.root_slot();
        Arc::get_mut(slot).ok_or(RouterError::ResourceInUse)
    }

    /// Finds or creates the host node for a host template.
    fn host_slot(&mut self, host: &str) -> Result<&mut Arc<Resource>> {
        let template = parse_host_template(host)?;

        if let Some(lit) = template.literal() {
            if let Some(existing) = self.static_hosts.get(lit) {
                if existing.template().similarity(&template) != Similarity::TheSame {
                    return Err(RouterError::ConflictingHost(host.to_string()));
                }
            } else {
                self.static_hosts.insert(
                    lit.to_string(),
                    Arc::new(Resource::from_template(template.clone(), Tier::Host)),
                );
            }
            return self
                .static_hosts
                .get_mut(lit)
                .ok_or(RouterError::NonExistentHost(host.to_string()));
        }

        let mut found = None;
        for (idx, existing) in self.pattern_hosts.iter().enumerate() {
            match existing.template().similarity(&template) {
                Similarity::TheSame => {
                    found = Some(idx);
                    break;
                }
                Similarity::Different => {}
                _ => return Err(RouterError::ConflictingHost(host.to_string())),
            }
        }
        let idx = match found {
            Some(idx) => idx,
            None => {
                if let Some(name) = template.name() {
                    let name_taken = self
                        .pattern_hosts
                        .iter()
                        .any(|h| h.template().name() == Some(name));
                    if name_taken {
                        return Err(RouterError::DuplicateNameAmongSiblings {
                            name: name.to_string(),
                        });
                    }
                }
                self.pattern_hosts
                    .push(Arc::new(Resource::from_template(template, Tier::Host)));
                self.pattern_hosts.len() - 1
            }
        };
        Ok(&mut self.pattern_hosts[idx])
    }

    /// Returns (creating if necessary) the node named by a URL template.
    ///
    /// The template may carry a scheme, a host, and a path; missing prefix
    /// nodes are created dormant. An existing node's scheme and
    /// trailing-slash constraints must agree with the template.
    ///
    /// # Examples
    ///
    /// ```
    /// use treelight::{Router, Request, Response};
    ///
    /// let mut router = Router::new();
    /// router
    ///     .resource("https://example.com/api/users/{id:[0-9]+}")
    ///     .unwrap()
    ///     .get(|req: Request| async move {
    ///         Response::ok().body(format!("user {}", req.param("id").unwrap_or("?")))
    ///     })
    ///     .unwrap();
    /// ```
    pub fn resource(&mut self, url: &str) -> Result<&mut Resource> {
        let parts = parse_url_template(url)?;

        match parts.host {
            Some(host_template) => {
                let slot = self.host_slot(host_template)?;
                let host = Arc::get_mut(slot).ok_or(RouterError::ResourceInUse)?;

                if parts.path.is_empty() || parts.path == "/" {
                    if let Some(secure) = parts.secure {
                        host.constrain_secure(secure)?;
                    }
                    return Ok(host);
                }

                let (segments, trailing) = parse_path_segments(parts.path)?;
                let templates = parse_segment_templates(&segments)?;
                validate_chain_names(
                    std::iter::once(host.template()).chain(templates.iter()),
                )?;
                let node = descend_create(host, templates)?;
                if let Some(secure) = parts.secure {
                    node.constrain_secure(secure)?;
                }
                node.constrain_trailing_slash(trailing)?;
                Ok(node)
            }
            None => {
                if parts.path == "/" {
                    return self.root_node_mut();
                }
                let (segments, trailing) = parse_path_segments(parts.path)?;
                let templates = parse_segment_templates(&segments)?;
                validate_chain_names(templates.iter())?;
                let root = self.root_node_mut()?;
                let node = descend_create(root, templates)?;
                node.constrain_trailing_slash(trailing)?;
                Ok(node)
            }
        }
    }

    /// As [`Router::resource`], with the node's full config set or verified.
    pub fn resource_using_config(
        &mut self,
        url: &str,
        config: ResourceConfig,
    ) -> Result<&mut Resource> {
        let secure = parse_url_template(url)?.secure;
        let mut config = config;
        match secure {
            Some(true) => config.secure = true,
            Some(false) if config.secure => {
                return Err(RouterError::ConflictingSecurity(url.to_string()))
            }
            _ => {}
        }
        let node = self.resource(url)?;
        node.configure(config)?;
        Ok(node)
    }

    /// Returns (creating if necessary) the host node for a host template.
    /// The template may carry a scheme; a path other than the bare `/` is
    /// rejected.
    pub fn host(&mut self, url: &str) -> Result<&mut Resource> {
        let (secure, rest) = if let Some(rest) = url.strip_prefix("https://") {
            (Some(true), rest)
        } else if let Some(rest) = url.strip_prefix("http://") {
            (Some(false), rest)
        } else {
            (None, url)
        };

        let host_part = match rest.find('/') {
            Some(idx) => {
                if &rest[idx..] != "/" {
                    return Err(RouterError::UnwantedPathTemplate(url.to_string()));
                }
                &rest[..idx]
            }
            None => rest,
        };

        let slot = self.host_slot(host_part)?;
        let host = Arc::get_mut(slot).ok_or(RouterError::ResourceInUse)?;
        if let Some(secure) = secure {
            host.constrain_secure(secure)?;
        }
        Ok(host)
    }

    /// As [`Router::host`], with the node's full config set or verified.
    pub fn host_using_config(&mut self, url: &str, config: ResourceConfig) -> Result<&mut Resource> {
        let host = self.host(url)?;
        host.configure(config)?;
        Ok(host)
    }

    /// Splices an externally built resource (and its subtree) into the
    /// hierarchy at the prefix path recorded when it was constructed,
    /// resolving collisions by merging.
    pub fn register_resource(&mut self, mut node: Resource) -> Result<()> {
        if node.tier() == Tier::Host {
            return Err(RouterError::NonRouterParent(node.template().to_string()));
        }
        let prefix = std::mem::take(&mut node.prefix);
        validate_splice(prefix.iter(), &node)?;
        let root = self.root_node_mut()?;
        let parent = descend_create(root, prefix)?;
        parent.keep_or_merge(node)
    }

    /// Splices an externally built resource below the node named by
    /// `prefix_url` (host and path prefixes are created as needed; a
    /// trailing slash in the prefix is ignored).
    pub fn register_resource_under(&mut self, prefix_url: &str, mut node: Resource) -> Result<()> {
        if node.tier() == Tier::Host {
            return Err(RouterError::NonRouterParent(node.template().to_string()));
        }
        let parts = parse_url_template(prefix_url)?;

        let (prefix_templates, attach): (Vec<Template>, &mut Resource) = match parts.host {
            Some(host_template) => {
                let slot = self.host_slot(host_template)?;
                let host = Arc::get_mut(slot).ok_or(RouterError::ResourceInUse)?;
                if parts.path.is_empty() || parts.path == "/" {
                    (Vec::new(), host)
                } else {
                    let (segments, _trailing) = parse_path_segments(parts.path)?;
                    (parse_segment_templates(&segments)?, host)
                }
            }
            None => {
                let root = self.root_node_mut()?;
                if parts.path == "/" {
                    (Vec::new(), root)
                } else {
                    let (segments, _trailing) = parse_path_segments(parts.path)?;
                    (parse_segment_templates(&segments)?, root)
                }
            }
        };

        let own_prefix = std::mem::take(&mut node.prefix);
        validate_splice(prefix_templates.iter().chain(own_prefix.iter()), &node)?;

        let parent = descend_create(attach, prefix_templates)?;
        let parent = descend_create(parent, own_prefix)?;
        parent.keep_or_merge(node)
    }

    /// Registers an externally built host node, merging it with an existing
    /// host carrying the same template.
    pub fn register_host(&mut self, host: Resource) -> Result<()> {
        if host.tier() != Tier::Host {
            return Err(RouterError::InvalidArgument(
                "register_host requires a host node".to_string(),
            ));
        }
        validate_splice(std::iter::empty(), &host)?;

        let template = host.template().clone();
        if let Some(lit) = template.literal() {
            let Some(existing) = self.static_hosts.remove(lit) else {
                self.static_hosts.insert(lit.to_string(), Arc::new(host));
                return Ok(());
            };
            match merge_hosts(existing, host) {
                Ok(merged) => {
                    self.static_hosts.insert(lit.to_string(), Arc::new(merged));
                    Ok(())
                }
                Err((existing, err)) => {
                    if let Some(existing) = existing {
                        self.static_hosts.insert(lit.to_string(), existing);
                    }
                    Err(err)
                }
            }
        } else {
            let mut found = None;
            for (idx, existing) in self.pattern_hosts.iter().enumerate() {
                match existing.template().similarity(&template) {
                    Similarity::TheSame => {
                        found = Some(idx);
                        break;
                    }
                    Similarity::Different => {}
                    _ => {
                        return Err(RouterError::ConflictingHost(template.to_string()));
                    }
                }
            }
            match found {
                None => {
                    self.pattern_hosts.push(Arc::new(host));
                    Ok(())
                }
                Some(idx) => {
                    let existing = self.pattern_hosts.remove(idx);
                    match merge_hosts(existing, host) {
                        Ok(merged) => {
                            self.pattern_hosts.insert(idx, Arc::new(merged));
                            Ok(())
                        }
                        Err((existing, err)) => {
                            if let Some(existing) = existing {
                                self.pattern_hosts.insert(idx, existing);
                            }
                            Err(err)
                        }
                    }
                }
            }
        }
    }

    /// Returns the registered node a URL template names, without creating
    /// anything. Non-static path segments may be referred to by the `$name`
    /// shorthand.
    pub fn registered_resource(&self, url: &str) -> Result<&Resource> {
        let parts = parse_url_template(url)?;

        let mut current: &Arc<Resource> = match parts.host {
            Some(host) => self.find_host(host)?,
            None => self
                .root
                .as_ref()
                .ok_or_else(|| RouterError::NonExistentResource(url.to_string()))?,
        };

        if parts.path.is_empty() || parts.path == "/" {
            return Ok(current);
        }
        let (segments, _trailing) = parse_path_segments(parts.path)?;
        for segment in &segments {
            current = find_registered_child(current, segment, url)?;
        }
        Ok(current)
    }

    /// As [`Router::registered_resource`], for further configuration.
    pub fn registered_resource_mut(&mut self, url: &str) -> Result<&mut Resource> {
        let parts = parse_url_template(url)?;

        let slot: &mut Arc<Resource> = match parts.host {
            Some(host) => self.find_host_slot(host)?,
            None => self
                .root
                .as_mut()
                .ok_or_else(|| RouterError::NonExistentResource(url.to_string()))?,
        };
        let mut current = Arc::get_mut(slot).ok_or(RouterError::ResourceInUse)?;

        if parts.path.is_empty() || parts.path == "/" {
            return Ok(current);
        }
        let (segments, _trailing) = parse_path_segments(parts.path)?;
        for segment in &segments {
            let key = find_registered_child_key(current, segment, url)?;
            let slot = current.child_slot_mut(&key);
            current = Arc::get_mut(slot).ok_or(RouterError::ResourceInUse)?;
        }
        Ok(current)
    }

    /// Returns the registered host node for a host template.
    pub fn registered_host(&self, host: &str) -> Result<&Resource> {
        Ok(self.find_host(host)?)
    }

    fn find_host(&self, host: &str) -> Result<&Arc<Resource>> {
        if let Some(name) = lookup_shorthand(host) {
            if name.is_empty() {
                return Err(RouterError::UnnamedResource(host.to_string()));
            }
            return self
                .pattern_hosts
                .iter()
                .find(|h| h.template().name() == Some(name.as_str()))
                .ok_or_else(|| RouterError::NonExistentHost(host.to_string()));
        }

        let template = parse_host_template(host)?;
        if let Some(lit) = template.literal() {
            return match self.static_hosts.get(lit) {
                Some(existing)
                    if existing.template().similarity(&template) == Similarity::TheSame =>
                {
                    Ok(existing)
                }
                _ => Err(RouterError::NonExistentHost(host.to_string())),
            };
        }
        self.pattern_hosts
            .iter()
            .find(|h| h.template().similarity(&template) == Similarity::TheSame)
            .ok_or_else(|| RouterError::NonExistentHost(host.to_string()))
    }

    fn find_host_slot(&mut self, host: &str) -> Result<&mut Arc<Resource>> {
        if let Some(name) = lookup_shorthand(host) {
            if name.is_empty() {
                return Err(RouterError::UnnamedResource(host.to_string()));
            }
            return self
                .pattern_hosts
                .iter_mut()
                .find(|h| h.template().name() == Some(name.as_str()))
                .ok_or_else(|| RouterError::NonExistentHost(host.to_string()));
        }

        let template = parse_host_template(host)?;
        if let Some(lit) = template.literal() {
            return match self.static_hosts.get_mut(lit) {
                Some(existing)
                    if existing.template().similarity(&template) == Similarity::TheSame =>
                {
                    Ok(existing)
                }
                _ => Err(RouterError::NonExistentHost(host.to_string())),
            };
        }
        self.pattern_hosts
            .iter_mut()
            .find(|h| h.template().similarity(&template) == Similarity::TheSame)
            .ok_or_else(|| RouterError::NonExistentHost(host.to_string()))
    }
}

// Merges two same-template hosts. On failure the error comes with the
// original shared node when it is still intact, so the caller can restore it.
fn merge_hosts(
    existing: Arc<Resource>,
    new: Resource,
) -> std::result::Result<Resource, (Option<Arc<Resource>>, RouterError)> {
    if existing.can_handle_request() && new.can_handle_request() {
        let err = RouterError::DuplicateHostTemplate(new.template().to_string());
        return Err((Some(existing), err));
    }
    let existing = match Arc::try_unwrap(existing) {
        Ok(existing) => existing,
        Err(existing) => return Err((Some(existing), RouterError::ResourceInUse)),
    };
    let (mut keeper, absorbed) = if new.can_handle_request() && !existing.can_handle_request() {
        (new, existing)
    } else {
        (existing, new)
    };
    if let Err(err) = keeper.reconcile_policies(&absorbed) {
        return Err((None, err));
    }
    if let Err(err) = keeper.absorb_children_from(absorbed) {
        return Err((None, err));
    }
    Ok(keeper)
}

fn find_registered_child<'a>(
    node: &'a Arc<Resource>,
    segment: &str,
    url: &str,
) -> Result<&'a Arc<Resource>> {
    let key = find_registered_child_key(node, segment, url)?;
    Ok(node.child_ref(&key))
}

fn find_registered_child_key(
    node: &Resource,
    segment: &str,
    url: &str,
) -> Result<crate::resource::ChildKey> {
    if let Some(name) = lookup_shorthand(segment) {
        if name.is_empty() {
            return Err(RouterError::UnnamedResource(url.to_string()));
        }
        let named = node
            .find_child_key_by_name(&name)
            .ok_or_else(|| RouterError::NonExistentResource(url.to_string()))?;
        return Ok(named);
    }
    let template = Template::parse(segment)?;
    node.find_same_child(&template)?
        .ok_or_else(|| RouterError::NonExistentResource(url.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_template_parsing() {
        assert_eq!(
            parse_url_template("https://example.com/a/b").unwrap(),
            UrlParts {
                secure: Some(true),
                host: Some("example.com"),
                path: "/a/b"
            }
        );
        assert_eq!(
            parse_url_template("http://example.com").unwrap(),
            UrlParts {
                secure: Some(false),
                host: Some("example.com"),
                path: ""
            }
        );
        assert_eq!(
            parse_url_template("/a/b/").unwrap(),
            UrlParts {
                secure: None,
                host: None,
                path: "/a/b/"
            }
        );
        assert!(matches!(
            parse_url_template("https:///a"),
            Err(RouterError::EmptyHostTemplate)
        ));
    }

    #[test]
    fn path_segment_splitting() {
        let (segments, trailing) = parse_path_segments("/a/{id:[0-9]+}/c/").unwrap();
        assert_eq!(segments, vec!["a", "{id:[0-9]+}", "c"]);
        assert!(trailing);

        let (segments, trailing) = parse_path_segments("a").unwrap();
        assert_eq!(segments, vec!["a"]);
        assert!(!trailing);

        assert_eq!(parse_path_segments("/").unwrap(), (Vec::new(), false));
        assert!(matches!(
            parse_path_segments(""),
            Err(RouterError::EmptyPathTemplate)
        ));
        assert!(matches!(
            parse_path_segments("/a//b"),
            Err(RouterError::EmptyPathSegmentTemplate(_))
        ));
    }

    #[test]
    fn lookup_shorthand_detection() {
        assert_eq!(lookup_shorthand("$id").as_deref(), Some("id"));
        assert_eq!(lookup_shorthand("$").as_deref(), Some(""));
        assert_eq!(lookup_shorthand("users"), None);
        // A `$name:` prefix makes it a template, not a shorthand.
        assert_eq!(lookup_shorthand("$id:{id:[0-9]+}"), None);
        assert_eq!(lookup_shorthand("$a\\:b").as_deref(), Some("a:b"));
    }

    #[test]
    fn resource_creates_dormant_prefixes() {
        let mut router = Router::new();
        router.resource("/a/{id:[0-9]+}/c").unwrap();

        let a = router.registered_resource("/a").unwrap();
        assert!(!a.can_handle_request());
        let c = router.registered_resource("/a/$id/c").unwrap();
        assert_eq!(c.template().literal(), Some("c"));
    }

    #[test]
    fn resource_is_idempotent_for_equal_templates() {
        let mut router = Router::new();
        router.resource("/a/b").unwrap();
        router.resource("/a/b").unwrap();
        assert!(router.registered_resource("/a/b").is_ok());
    }

    #[test]
    fn resource_rejects_conflicting_trailing_slash() {
        let mut router = Router::new();
        router.resource("/a/b").unwrap();
        assert!(matches!(
            router.resource("/a/b/"),
            Err(RouterError::ConflictingTrailingSlash(_))
        ));
    }

    #[test]
    fn resource_rejects_conflicting_scheme() {
        let mut router = Router::new();
        router.resource("https://example.com/a").unwrap();
        assert!(matches!(
            router.resource("http://example.com/a"),
            Err(RouterError::ConflictingSecurity(_))
        ));
    }

    #[test]
    fn prefix_flags_survive_deeper_registration() {
        let mut router = Router::new();
        router.resource("https://example.com/a").unwrap();
        // Descending through `a` leaves its own constraints untouched.
        router.resource("https://example.com/a/b").unwrap();
        let a = router
            .registered_resource("https://example.com/a")
            .unwrap();
        assert!(a.config().secure);
    }

    #[test]
    fn resource_rejects_name_conflicts_in_url() {
        let mut router = Router::new();
        assert!(matches!(
            router.resource("/{id:[0-9]+}/x/{id:[0-9]+}"),
            Err(RouterError::DuplicateNameInTheURL { .. })
        ));
        assert!(matches!(
            router.resource("/{id:[0-9]+}/$other:{id:[0-9]+}-rest"),
            Err(RouterError::DuplicateValueNameInTheURL { .. })
        ));
    }

    #[test]
    fn resource_rejects_segment_conflicts() {
        let mut router = Router::new();
        router.resource("/a/{id:[0-9]+}").unwrap();
        assert!(matches!(
            router.resource("/a/{num:[0-9]+}"),
            Err(RouterError::ConflictingPathSegment(_))
        ));
    }

    #[test]
    fn host_validation() {
        let mut router = Router::new();
        assert!(router.host("example.com").is_ok());
        assert!(router.host("https://example.com/").is_ok());
        assert!(matches!(
            router.host("https://example.com/api"),
            Err(RouterError::UnwantedPathTemplate(_))
        ));
        assert!(matches!(
            router.host("{anything}"),
            Err(RouterError::WildcardHostTemplate(_))
        ));
    }

    #[test]
    fn registered_resource_misses_are_errors() {
        let mut router = Router::new();
        router.resource("/a/b").unwrap();
        assert!(matches!(
            router.registered_resource("/a/x"),
            Err(RouterError::NonExistentResource(_))
        ));
        assert!(matches!(
            router.registered_resource("https://nowhere.test/a"),
            Err(RouterError::NonExistentHost(_))
        ));
        assert!(matches!(
            router.registered_resource("/a/$"),
            Err(RouterError::UnnamedResource(_))
        ));
    }

    #[test]
    fn register_resource_merges_subtrees() {
        let mut router = Router::new();

        let mut a = Resource::new("/x").unwrap();
        a.resource("/y").unwrap();

        let mut a2 = Resource::new("/x").unwrap();
        a2.get(|_req: crate::Request| async { crate::Response::ok().body("x") })
            .unwrap();
        a2.resource("/z").unwrap();

        router.register_resource(a).unwrap();
        router.register_resource(a2).unwrap();

        let x = router.registered_resource("/x").unwrap();
        assert!(x.can_handle_request());
        assert!(router.registered_resource("/x/y").is_ok());
        assert!(router.registered_resource("/x/z").is_ok());
    }

    #[test]
    fn register_resource_under_prefixes_the_node() {
        let mut router = Router::new();
        let node = Resource::new("/leaf").unwrap();
        router
            .register_resource_under("https://example.com/api/", node)
            .unwrap();
        assert!(router
            .registered_resource("https://example.com/api/leaf")
            .is_ok());
    }

    #[test]
    fn register_host_merges_and_rejects_duplicates() {
        let mut router = Router::new();

        let mut host = Resource::new_host("example.com").unwrap();
        host.resource("/a").unwrap();
        router.register_host(host).unwrap();

        let mut host2 = Resource::new_host("example.com").unwrap();
        host2
            .get(|_req: crate::Request| async { crate::Response::ok().body("home") })
            .unwrap();
        host2.resource("/b").unwrap();
        router.register_host(host2).unwrap();

        let registered = router.registered_host("example.com").unwrap();
        assert!(registered.can_handle_request());
        assert!(router
            .registered_resource("https://example.com/a")
            .is_ok());
        assert!(router
            .registered_resource("https://example.com/b")
            .is_ok());

        let mut host3 = Resource::new_host("example.com").unwrap();
        host3
            .get(|_req: crate::Request| async { crate::Response::ok().body("again") })
            .unwrap();
        assert!(matches!(
            router.register_host(host3),
            Err(RouterError::DuplicateHostTemplate(_))
        ));
    }

    #[test]
    fn register_resource_rejects_hosts() {
        let mut router = Router::new();
        let host = Resource::new_host("example.com").unwrap();
        assert!(matches!(
            router.register_resource(host),
            Err(RouterError::NonRouterParent(_))
        ));
    }

    #[test]
    fn splice_validation_rejects_ancestor_name_reuse() {
        let mut router = Router::new();
        router.resource("/{id:[0-9]+}/files").unwrap();

        let node = Resource::new("/{id:[0-9]+}/files/{id:[0-9]+}");
        // The duplicate is caught when the standalone node is built.
        assert!(matches!(
            node,
            Err(RouterError::DuplicateNameInTheURL { .. })
        ));

        // And when splicing introduces the duplication.
        let mut subtree = Resource::new("/sub").unwrap();
        subtree.resource("/{id:[0-9]+}/deep").unwrap();
        assert!(matches!(
            router.register_resource_under("/{id:[0-9]+}/files", subtree),
            Err(RouterError::DuplicateNameInTheURL { .. })
        ));
    }
}
