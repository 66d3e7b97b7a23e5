//! # Resource Tree Nodes
//!
//! A [`Resource`] is one node of the routing tree. A node at the host tier
//! matches the authority of a request; every other node matches exactly one
//! path segment. Each node keeps its children in three buckets that are also
//! the match order: static literals first, then pattern templates in
//! registration order, then the single wildcard slot.
//!
//! During the configuration phase the tree has one owner and is freely
//! mutable. Once dispatch starts, nodes are shared (`Arc`) into the composed
//! request futures and must not be reconfigured.

use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use http::Method;

use crate::config::ResourceConfig;
use crate::dispatch::Checkpoint;
use crate::error::{Result, RouterError};
use crate::handler::{into_handler_fn, BoxedFuture, Handler, HandlerFn};
use crate::middleware::{self, into_middleware_fn, Middleware, MiddlewareFn};
use crate::registrar::{parse_path_segments, validate_chain_names};
use crate::template::{Similarity, Template};
use crate::{Request, Response};

/// Which component of the request URL a node's template applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// The node matches the authority. Only the router may own such nodes.
    Host,
    /// The node matches one path segment.
    Path,
}

/// The pseudo-method that configures the not-allowed-method handler.
pub const METHOD_NOT_ALLOWED_HANDLER: &str = "!";

/// The pseudo-method that targets every currently bound method in wrap
/// operations.
pub const METHOD_ANY: &str = "*";

#[derive(Default)]
pub(crate) struct MethodTable {
    pub(crate) handlers: HashMap<String, HandlerFn>,
    pub(crate) not_allowed: Option<HandlerFn>,
}

impl MethodTable {
    fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn set(&mut self, method: String, handler: HandlerFn, site: &Template) -> Result<()> {
        if self.handlers.contains_key(&method) {
            return Err(RouterError::ConflictingMethod {
                method,
                template: site.to_string(),
            });
        }
        self.handlers.insert(method, handler);
        Ok(())
    }

    /// The `Allow` header value: every bound method plus the implicit OPTIONS.
    fn allow_header(&self) -> String {
        let mut methods: BTreeSet<&str> = self.handlers.keys().map(|m| m.as_str()).collect();
        methods.insert("OPTIONS");
        methods.into_iter().collect::<Vec<_>>().join(", ")
    }
}

/// Identifies a child slot within its parent's buckets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ChildKey {
    Static(String),
    Pattern(usize),
    Wildcard,
}

/// A node of the routing tree.
///
/// Resources are built standalone (with [`Resource::new`]) or in place
/// through the router's registration methods; a standalone node is spliced
/// into the tree with [`Router::register_resource`](crate::Router::register_resource),
/// which consumes it.
pub struct Resource {
    pub(crate) template: Template,
    pub(crate) tier: Tier,
    pub(crate) prefix: Vec<Template>,

    pub(crate) static_children: HashMap<String, Arc<Resource>>,
    pub(crate) pattern_children: Vec<Arc<Resource>>,
    pub(crate) wildcard_child: Option<Arc<Resource>>,

    pub(crate) config: ResourceConfig,
    pub(crate) cfg_fixed: bool,
    pub(crate) secure_fixed: bool,
    pub(crate) ts_fixed: bool,

    pub(crate) method_table: MethodTable,
    pub(crate) handler_wrappers: Vec<MiddlewareFn>,
    pub(crate) passer_wrappers: Vec<MiddlewareFn>,
    pub(crate) shared_data: Option<Arc<dyn Any + Send + Sync>>,
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("template", &self.template.to_string())
            .field("tier", &self.tier)
            .field("config", &self.config)
            .field("methods", &self.method_table.handlers.keys().collect::<Vec<_>>())
            .field("static_children", &self.static_children.len())
            .field("pattern_children", &self.pattern_children.len())
            .field("wildcard_child", &self.wildcard_child.is_some())
            .finish_non_exhaustive()
    }
}

impl Resource {
    pub(crate) fn from_template(template: Template, tier: Tier) -> Resource {
        Resource {
            template,
            tier,
            prefix: Vec::new(),
            static_children: HashMap::new(),
            pattern_children: Vec::new(),
            wildcard_child: None,
            config: ResourceConfig::default(),
            cfg_fixed: false,
            secure_fixed: false,
            ts_fixed: false,
            method_table: MethodTable::default(),
            handler_wrappers: Vec::new(),
            passer_wrappers: Vec::new(),
            shared_data: None,
        }
    }

    /// Builds a standalone (dormant) resource from a path template.
    ///
    /// The template may contain several segments; the earlier ones are
    /// remembered as the node's prefix path and are created or matched when
    /// the node is registered. A trailing slash sets the node's
    /// trailing-slash policy.
    ///
    /// # Examples
    ///
    /// ```
    /// use treelight::Resource;
    ///
    /// let node = Resource::new("/projects/{id:[0-9]+}/files/").unwrap();
    /// ```
    pub fn new(path_template: &str) -> Result<Resource> {
        let (segment_templates, trailing_slash) = parse_path_segments(path_template)?;

        let mut templates = Vec::with_capacity(segment_templates.len());
        for segment in &segment_templates {
            templates.push(Template::parse(segment)?);
        }
        validate_chain_names(&templates)?;

        let Some(own) = templates.pop() else {
            // The bare "/" is the root resource.
            return Ok(Resource::from_template(Template::parse("/")?, Tier::Path));
        };

        let mut resource = Resource::from_template(own, Tier::Path);
        resource.prefix = templates;
        resource.config.trailing_slash = trailing_slash;
        resource.ts_fixed = true;
        Ok(resource)
    }

    /// As [`Resource::new`], with the node's full config set up front.
    pub fn new_using_config(path_template: &str, config: ResourceConfig) -> Result<Resource> {
        let mut resource = Resource::new(path_template)?;
        let mut config = config;
        config.trailing_slash = resource.config.trailing_slash;
        config.validate()?;
        resource.config = config;
        resource.cfg_fixed = true;
        resource.secure_fixed = true;
        Ok(resource)
    }

    /// Builds a standalone (dormant) host node from a host template.
    pub fn new_host(host_template: &str) -> Result<Resource> {
        if host_template.is_empty() {
            return Err(RouterError::EmptyHostTemplate);
        }
        if host_template.contains('/') {
            return Err(RouterError::UnwantedPathTemplate(host_template.to_string()));
        }
        let template = Template::parse(host_template)?;
        if template.is_wildcard() {
            return Err(RouterError::WildcardHostTemplate(host_template.to_string()));
        }
        Ok(Resource::from_template(template, Tier::Host))
    }

    /// As [`Resource::new_host`], with the node's full config set up front.
    pub fn new_host_using_config(host_template: &str, config: ResourceConfig) -> Result<Resource> {
        let mut host = Resource::new_host(host_template)?;
        config.validate()?;
        host.config = config;
        host.cfg_fixed = true;
        host.secure_fixed = true;
        host.ts_fixed = true;
        Ok(host)
    }

    // -------------------- accessors --------------------

    /// The node's template.
    pub fn template(&self) -> &Template {
        &self.template
    }

    /// The node's tier (host or path).
    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// The node's current config.
    pub fn config(&self) -> ResourceConfig {
        self.config
    }

    /// True when the node has at least one method handler. Dormant nodes
    /// never respond; they only carry children.
    pub fn can_handle_request(&self) -> bool {
        !self.method_table.is_empty()
    }

    /// The prefix path templates recorded when the node was built, consumed
    /// when it is registered.
    pub fn prefix_templates(&self) -> &[Template] {
        &self.prefix
    }

    // -------------------- configuration --------------------

    /// Sets the node's full config, or verifies it against a previously
    /// fixed one.
    pub fn configure(&mut self, config: ResourceConfig) -> Result<&mut Self> {
        let mut config = config;
        if self.ts_fixed {
            config.trailing_slash = self.config.trailing_slash;
        }
        config.validate()?;
        if self.cfg_fixed {
            self.config
                .check_compatibility(&config, &self.template.to_string())?;
        } else {
            if self.secure_fixed && self.config.secure != config.secure {
                return Err(RouterError::ConflictingSecurity(self.template.to_string()));
            }
            self.config = config;
        }
        self.cfg_fixed = true;
        self.secure_fixed = true;
        self.ts_fixed = true;
        Ok(self)
    }

    /// Constrains the node's secure flag from a URL scheme.
    pub(crate) fn constrain_secure(&mut self, secure: bool) -> Result<()> {
        if (self.secure_fixed || self.cfg_fixed) && self.config.secure != secure {
            return Err(RouterError::ConflictingSecurity(self.template.to_string()));
        }
        self.config.secure = secure;
        self.secure_fixed = true;
        Ok(())
    }

    /// Constrains the node's trailing-slash flag from a URL.
    pub(crate) fn constrain_trailing_slash(&mut self, trailing_slash: bool) -> Result<()> {
        if (self.ts_fixed || self.cfg_fixed) && self.config.trailing_slash != trailing_slash {
            return Err(RouterError::ConflictingTrailingSlash(
                self.template.to_string(),
            ));
        }
        self.config.trailing_slash = trailing_slash;
        self.ts_fixed = true;
        Ok(())
    }

    /// Attaches opaque shared data, handed to handlers through the request.
    pub fn set_shared_data(&mut self, data: Arc<dyn Any + Send + Sync>) -> &mut Self {
        self.shared_data = Some(data);
        self
    }

    // -------------------- handlers --------------------

    /// Binds a handler to an HTTP method token.
    ///
    /// The token is case-insensitive. The pseudo-method `"!"` binds the
    /// not-allowed-methods handler. Binding a method twice is an error.
    pub fn set_handler<H>(&mut self, method: &str, handler: H) -> Result<&mut Self>
    where
        H: Handler,
    {
        if method.is_empty() {
            return Err(RouterError::NoHTTPMethod);
        }
        let handler = into_handler_fn(handler);
        if method == METHOD_NOT_ALLOWED_HANDLER {
            self.method_table.not_allowed = Some(handler);
            return Ok(self);
        }
        self.method_table
            .set(method.to_uppercase(), handler, &self.template)?;
        Ok(self)
    }

    /// Binds a GET handler.
    pub fn get<H>(&mut self, handler: H) -> Result<&mut Self>
    where
        H: Handler,
    {
        self.set_handler(Method::GET.as_str(), handler)
    }

    /// Binds a POST handler.
    pub fn post<H>(&mut self, handler: H) -> Result<&mut Self>
    where
        H: Handler,
    {
        self.set_handler(Method::POST.as_str(), handler)
    }

    /// Binds a PUT handler.
    pub fn put<H>(&mut self, handler: H) -> Result<&mut Self>
    where
        H: Handler,
    {
        self.set_handler(Method::PUT.as_str(), handler)
    }

    /// Binds a DELETE handler.
    pub fn delete<H>(&mut self, handler: H) -> Result<&mut Self>
    where
        H: Handler,
    {
        self.set_handler(Method::DELETE.as_str(), handler)
    }

    /// Binds a PATCH handler.
    pub fn patch<H>(&mut self, handler: H) -> Result<&mut Self>
    where
        H: Handler,
    {
        self.set_handler(Method::PATCH.as_str(), handler)
    }

    /// Binds a HEAD handler.
    pub fn head<H>(&mut self, handler: H) -> Result<&mut Self>
    where
        H: Handler,
    {
        self.set_handler(Method::HEAD.as_str(), handler)
    }

    /// Binds an OPTIONS handler, replacing the implicit one.
    pub fn options<H>(&mut self, handler: H) -> Result<&mut Self>
    where
        H: Handler,
    {
        self.set_handler(Method::OPTIONS.as_str(), handler)
    }

    /// Binds the handler that answers requests with an unbound method,
    /// replacing the default 405 response.
    pub fn set_not_allowed_handler<H>(&mut self, handler: H) -> Result<&mut Self>
    where
        H: Handler,
    {
        self.set_handler(METHOD_NOT_ALLOWED_HANDLER, handler)
    }

    // -------------------- middleware --------------------

    /// Wraps the node's request handler (method resolution). The first
    /// middleware added runs outermost.
    pub fn wrap_request_handler<M>(&mut self, middleware: M) -> &mut Self
    where
        M: Middleware,
    {
        self.handler_wrappers.push(into_middleware_fn(middleware));
        self
    }

    /// Wraps the node's request passer (the hop to a child node). The wrapped
    /// chain sees every request that descends below this node.
    pub fn wrap_request_passer<M>(&mut self, middleware: M) -> &mut Self
    where
        M: Middleware,
    {
        self.passer_wrappers.push(into_middleware_fn(middleware));
        self
    }

    /// Wraps the handler of one method, or of every bound method (`"*"`), or
    /// the not-allowed handler (`"!"`).
    pub fn wrap_method<M>(&mut self, method: &str, middleware: M) -> Result<&mut Self>
    where
        M: Middleware,
    {
        if method.is_empty() {
            return Err(RouterError::NoHTTPMethod);
        }
        let middleware = into_middleware_fn(middleware);
        match method {
            METHOD_ANY => {
                if self.method_table.is_empty() {
                    return Err(match self.tier {
                        Tier::Host => RouterError::DormantHost(self.template.to_string()),
                        Tier::Path => RouterError::DormantResource(self.template.to_string()),
                    });
                }
                for handler in self.method_table.handlers.values_mut() {
                    *handler = middleware::apply(std::slice::from_ref(&middleware), handler.clone());
                }
            }
            METHOD_NOT_ALLOWED_HANDLER => {
                let Some(handler) = self.method_table.not_allowed.take() else {
                    return Err(RouterError::NoHandlerExists {
                        method: method.to_string(),
                    });
                };
                self.method_table.not_allowed =
                    Some(middleware::apply(std::slice::from_ref(&middleware), handler));
            }
            _ => {
                let method = method.to_uppercase();
                let Some(handler) = self.method_table.handlers.get_mut(&method) else {
                    return Err(RouterError::NoHandlerExists { method });
                };
                *handler = middleware::apply(std::slice::from_ref(&middleware), handler.clone());
            }
        }
        Ok(self)
    }

    /// Wraps the request handler of this node and every node below it,
    /// pre-order.
    pub fn wrap_subtree_handlers<M>(&mut self, middleware: M) -> Result<&mut Self>
    where
        M: Middleware,
    {
        let middleware = into_middleware_fn(middleware);
        self.for_each_in_subtree_mut(&mut |node| {
            node.handler_wrappers.push(middleware.clone());
            Ok(())
        })?;
        Ok(self)
    }

    /// Wraps one method's handler across the whole subtree. Nodes that do not
    /// bind the method (including dormant placeholders) are skipped.
    pub fn wrap_subtree_method<M>(&mut self, method: &str, middleware: M) -> Result<&mut Self>
    where
        M: Middleware,
    {
        if method.is_empty() {
            return Err(RouterError::NoHTTPMethod);
        }
        let method = method.to_uppercase();
        let middleware = into_middleware_fn(middleware);
        self.for_each_in_subtree_mut(&mut |node| {
            match node.wrap_method(&method, {
                let middleware = middleware.clone();
                move |req: Request, next: crate::middleware::Next| middleware(req, next)
            }) {
                Ok(_) => Ok(()),
                Err(RouterError::NoHandlerExists { .. }) => Ok(()),
                Err(RouterError::DormantResource(_)) | Err(RouterError::DormantHost(_)) => Ok(()),
                Err(err) => Err(err),
            }
        })?;
        Ok(self)
    }

    // -------------------- subtree building --------------------

    /// Returns (creating if necessary) the descendant at the given relative
    /// path. `"/"` returns the node itself.
    pub fn resource(&mut self, relative_path: &str) -> Result<&mut Resource> {
        let (segment_templates, trailing_slash) = parse_path_segments(relative_path)?;
        let mut templates = Vec::with_capacity(segment_templates.len());
        for segment in &segment_templates {
            templates.push(Template::parse(segment)?);
        }

        let mut chain = vec![self.template.clone()];
        chain.extend(templates.iter().cloned());
        validate_chain_names(&chain)?;

        let node = descend_create(self, templates)?;
        if trailing_slash {
            node.constrain_trailing_slash(true)?;
        }
        Ok(node)
    }

    // -------------------- child management --------------------

    fn find_child_by_name(&self, name: &str) -> Option<&Arc<Resource>> {
        self.static_children
            .values()
            .chain(self.pattern_children.iter())
            .chain(self.wildcard_child.iter())
            .find(|child| child.template.name() == Some(name))
    }

    pub(crate) fn find_child_key_by_name(&self, name: &str) -> Option<ChildKey> {
        if let Some((lit, _)) = self
            .static_children
            .iter()
            .find(|(_, child)| child.template.name() == Some(name))
        {
            return Some(ChildKey::Static(lit.clone()));
        }
        if let Some(idx) = self
            .pattern_children
            .iter()
            .position(|child| child.template.name() == Some(name))
        {
            return Some(ChildKey::Pattern(idx));
        }
        if self
            .wildcard_child
            .as_ref()
            .is_some_and(|child| child.template.name() == Some(name))
        {
            return Some(ChildKey::Wildcard);
        }
        None
    }

    /// Returns the child whose template is fully equivalent to the given
    /// one. A child that differs only in names is a configuration conflict,
    /// reported as an error.
    pub fn child(&self, template: &str) -> Result<Option<&Resource>> {
        let template = Template::parse(template)?;
        Ok(self
            .find_same_child(&template)?
            .map(|key| self.child_ref(&key).as_ref()))
    }

    /// Runs `f` on this node and every descendant, pre-order: the node
    /// itself, static children, pattern children in registration order, then
    /// the wildcard child (which is also the match order).
    pub fn for_each_in_subtree(&self, f: &mut impl FnMut(&Resource)) {
        f(self);
        for child in self.static_children.values() {
            child.for_each_in_subtree(f);
        }
        for child in &self.pattern_children {
            child.for_each_in_subtree(f);
        }
        if let Some(child) = &self.wildcard_child {
            child.for_each_in_subtree(f);
        }
    }

    /// Finds the child whose template is `TheSame` as the given one. A child
    /// that differs only in names is a configuration conflict.
    pub(crate) fn find_same_child(&self, template: &Template) -> Result<Option<ChildKey>> {
        let conflict = |site: &Template| match self.tier {
            Tier::Host => RouterError::ConflictingHost(site.to_string()),
            Tier::Path => RouterError::ConflictingPathSegment(site.to_string()),
        };

        if let Some(lit) = template.literal() {
            return match self.static_children.get(lit) {
                None => Ok(None),
                Some(child) => match child.template.similarity(template) {
                    Similarity::TheSame => Ok(Some(ChildKey::Static(lit.to_string()))),
                    _ => Err(conflict(template)),
                },
            };
        }

        if template.is_wildcard() {
            return match &self.wildcard_child {
                None => Ok(None),
                Some(child) => match child.template.similarity(template) {
                    Similarity::TheSame => Ok(Some(ChildKey::Wildcard)),
                    _ => Err(conflict(template)),
                },
            };
        }

        for (idx, child) in self.pattern_children.iter().enumerate() {
            match child.template.similarity(template) {
                Similarity::TheSame => return Ok(Some(ChildKey::Pattern(idx))),
                Similarity::Different => {}
                _ => return Err(conflict(template)),
            }
        }
        Ok(None)
    }

    pub(crate) fn child_ref(&self, key: &ChildKey) -> &Arc<Resource> {
        match key {
            ChildKey::Static(lit) => self.static_children.get(lit).expect("static child slot"),
            ChildKey::Pattern(idx) => &self.pattern_children[*idx],
            ChildKey::Wildcard => self.wildcard_child.as_ref().expect("wildcard child slot"),
        }
    }

    pub(crate) fn child_slot_mut(&mut self, key: &ChildKey) -> &mut Arc<Resource> {
        match key {
            ChildKey::Static(lit) => self.static_children.get_mut(lit).expect("static child slot"),
            ChildKey::Pattern(idx) => &mut self.pattern_children[*idx],
            ChildKey::Wildcard => self.wildcard_child.as_mut().expect("wildcard child slot"),
        }
    }

    fn remove_child(&mut self, key: &ChildKey) -> Arc<Resource> {
        match key {
            ChildKey::Static(lit) => self
                .static_children
                .remove(lit)
                .expect("static child slot"),
            ChildKey::Pattern(idx) => self.pattern_children.remove(*idx),
            ChildKey::Wildcard => self.wildcard_child.take().expect("wildcard child slot"),
        }
    }

    /// Places a new child in the matching bucket. Fails on any collision;
    /// use [`Resource::keep_or_merge`] to resolve collisions instead.
    pub fn register_child(&mut self, child: Resource) -> Result<()> {
        if child.tier == Tier::Host {
            return Err(RouterError::NonRouterParent(child.template.to_string()));
        }

        if let Some(name) = child.template.name() {
            if let Some(existing) = self.find_child_by_name(name) {
                if existing.template.similarity(&child.template) != Similarity::TheSame {
                    return Err(RouterError::DuplicateNameAmongSiblings {
                        name: name.to_string(),
                    });
                }
            }
        }

        if let Some(lit) = child.template.literal() {
            if self.static_children.contains_key(lit) {
                return Err(RouterError::RegisteredResource(child.template.to_string()));
            }
            self.static_children
                .insert(lit.to_string(), Arc::new(child));
            return Ok(());
        }

        if child.template.is_wildcard() {
            if let Some(existing) = &self.wildcard_child {
                if existing.template.similarity(&child.template) == Similarity::TheSame {
                    return Err(RouterError::RegisteredResource(child.template.to_string()));
                }
                return Err(RouterError::AnotherWildcardName {
                    name: child.template.name().unwrap_or_default().to_string(),
                });
            }
            self.wildcard_child = Some(Arc::new(child));
            return Ok(());
        }

        if self.find_same_child(&child.template)?.is_some() {
            return Err(RouterError::RegisteredResource(child.template.to_string()));
        }
        self.pattern_children.push(Arc::new(child));
        Ok(())
    }

    /// Replaces the child with the structurally equivalent template and
    /// returns the old node.
    pub fn replace_child(&mut self, new: Resource) -> Result<Arc<Resource>> {
        let Some(key) = self.find_same_child(&new.template)? else {
            return Err(RouterError::NonExistentResource(new.template.to_string()));
        };
        let slot = self.child_slot_mut(&key);
        Ok(std::mem::replace(slot, Arc::new(new)))
    }

    /// Re-registers every child of `other` under `self`, resolving
    /// collisions with [`Resource::keep_or_merge`].
    pub fn absorb_children_from(&mut self, other: Resource) -> Result<()> {
        let Resource {
            static_children,
            pattern_children,
            wildcard_child,
            ..
        } = other;

        for (_, child) in static_children {
            self.adopt(child)?;
        }
        for child in pattern_children {
            self.adopt(child)?;
        }
        if let Some(child) = wildcard_child {
            self.adopt(child)?;
        }
        Ok(())
    }

    fn adopt(&mut self, child: Arc<Resource>) -> Result<()> {
        let child = Arc::try_unwrap(child).map_err(|_| RouterError::ResourceInUse)?;
        self.keep_or_merge(child)
    }

    /// Registers `new_child`, merging it with an equal-template sibling when
    /// one exists.
    ///
    /// When templates collide, the configs must be compatible, and at most
    /// one of the two nodes may carry method handlers: the handler-less one
    /// yields its descendants to the other and is discarded. Two handling
    /// nodes with the same template are a duplicate.
    pub fn keep_or_merge(&mut self, new_child: Resource) -> Result<()> {
        let Some(key) = self.find_same_child(&new_child.template)? else {
            return self.register_child(new_child);
        };

        {
            let existing = self.child_ref(&key);
            if existing.can_handle_request() && new_child.can_handle_request() {
                return Err(match new_child.tier {
                    Tier::Host => RouterError::DuplicateHostTemplate(new_child.template.to_string()),
                    Tier::Path => {
                        RouterError::DuplicateResourceTemplate(new_child.template.to_string())
                    }
                });
            }
        }

        let existing = self.remove_child(&key);
        let existing = match Arc::try_unwrap(existing) {
            Ok(existing) => existing,
            Err(existing) => {
                // Put the shared node back before bailing out.
                self.restore_child(&key, existing);
                return Err(RouterError::ResourceInUse);
            }
        };

        let (mut keeper, absorbed) =
            if new_child.can_handle_request() && !existing.can_handle_request() {
                (new_child, existing)
            } else {
                (existing, new_child)
            };
        keeper.reconcile_policies(&absorbed)?;
        keeper.absorb_children_from(absorbed)?;
        self.register_child(keeper)
    }

    fn restore_child(&mut self, key: &ChildKey, child: Arc<Resource>) {
        match key {
            ChildKey::Static(lit) => {
                self.static_children.insert(lit.clone(), child);
            }
            ChildKey::Pattern(idx) => self.pattern_children.insert(*idx, child),
            ChildKey::Wildcard => self.wildcard_child = Some(child),
        }
    }

    /// Verifies that the policies of two same-template nodes agree and adopts
    /// the constraints the absorbed node carried.
    pub(crate) fn reconcile_policies(&mut self, other: &Resource) -> Result<()> {
        let site = self.template.to_string();

        let secure_known = self.cfg_fixed || self.secure_fixed;
        let other_secure_known = other.cfg_fixed || other.secure_fixed;
        if secure_known && other_secure_known && self.config.secure != other.config.secure {
            return Err(RouterError::ConflictingSecurity(site));
        }

        let ts_known = self.cfg_fixed || self.ts_fixed;
        let other_ts_known = other.cfg_fixed || other.ts_fixed;
        if ts_known && other_ts_known && self.config.trailing_slash != other.config.trailing_slash
        {
            return Err(RouterError::ConflictingTrailingSlash(site));
        }

        if self.cfg_fixed && other.cfg_fixed {
            self.config.check_compatibility(&other.config, &site)?;
        }

        if !self.cfg_fixed && other.cfg_fixed {
            self.config = other.config;
            self.cfg_fixed = true;
        } else {
            if !secure_known && other_secure_known {
                self.config.secure = other.config.secure;
                self.config.redirect_insecure = other.config.redirect_insecure;
            }
            if !ts_known && other_ts_known {
                self.config.trailing_slash = other.config.trailing_slash;
            }
        }
        self.secure_fixed = self.secure_fixed || other.secure_fixed;
        self.ts_fixed = self.ts_fixed || other.ts_fixed;
        Ok(())
    }

    /// Runs `f` on this node and every descendant, pre-order: the node
    /// itself, static children, pattern children in registration order, then
    /// the wildcard child.
    pub(crate) fn for_each_in_subtree_mut(
        &mut self,
        f: &mut impl FnMut(&mut Resource) -> Result<()>,
    ) -> Result<()> {
        f(self)?;
        for child in self.static_children.values_mut() {
            Arc::get_mut(child)
                .ok_or(RouterError::ResourceInUse)?
                .for_each_in_subtree_mut(f)?;
        }
        for child in self.pattern_children.iter_mut() {
            Arc::get_mut(child)
                .ok_or(RouterError::ResourceInUse)?
                .for_each_in_subtree_mut(f)?;
        }
        if let Some(child) = self.wildcard_child.as_mut() {
            Arc::get_mut(child)
                .ok_or(RouterError::ResourceInUse)?
                .for_each_in_subtree_mut(f)?;
        }
        Ok(())
    }

    // -------------------- dispatch --------------------

    /// Receives a request whose own segment (or authority) has just been
    /// matched: applies the scheme gate, then either passes the request on
    /// to a child or, at the final segment, applies the trailing-slash gate
    /// and resolves the method handler.
    pub(crate) fn receive(this: Arc<Resource>, req: Request) -> BoxedFuture {
        Box::pin(async move {
            if this.config.secure && !req.is_secure() {
                if this.config.redirect_insecure {
                    let location = secure_location(&req);
                    tracing::debug!(%location, "redirecting insecure request");
                    return invoke_redirect(req, location).await;
                }
                tracing::debug!(resource = %this.template, "insecure request refused");
                return invoke_not_found(req).await;
            }

            if req.routing.has_remaining() {
                return Resource::pass_request(this, req).await;
            }

            // A dormant node never responds, not even with a redirect.
            if !this.can_handle_request() {
                return Response::pass(req);
            }

            if !req.routing.segments.is_empty()
                && req.routing.trailing_slash != this.config.trailing_slash
                && !this.config.lenient_on_trailing_slash
            {
                if this.config.strict_on_trailing_slash {
                    return invoke_not_found(req).await;
                }
                let location = slash_corrected_location(&req, this.config.trailing_slash);
                return invoke_redirect(req, location).await;
            }

            Resource::handle_request(this, req).await
        })
    }

    /// Hands the request over to the child matching the next path segment.
    /// Static children are tried first, then pattern children in
    /// registration order, then the wildcard. Wrapped by the node's passer
    /// middleware; on a miss below, a subtree node answers with the
    /// remaining path.
    fn pass_request(this: Arc<Resource>, req: Request) -> BoxedFuture {
        let core: HandlerFn = {
            let node = this.clone();
            Arc::new(move |req| Resource::pass_request_core(node.clone(), req))
        };
        let chain = middleware::apply(&this.passer_wrappers, core);

        Box::pin(async move {
            let checkpoint: Checkpoint = req.routing.checkpoint();
            let mut response = chain(req).await;
            if response.is_passed() && this.config.subtree && this.can_handle_request() {
                if let Some(mut req) = response.take_passed_request() {
                    req.routing.rewind(checkpoint);
                    req.routing.record_remaining();
                    tracing::trace!(
                        resource = %this.template,
                        remaining = %req.remaining_path().unwrap_or_default(),
                        "subtree handler taking over"
                    );
                    return Resource::handle_request(this, req).await;
                }
            }
            response
        })
    }

    fn pass_request_core(this: Arc<Resource>, mut req: Request) -> BoxedFuture {
        Box::pin(async move {
            let Some(segment) = req.routing.current() else {
                return Response::pass(req);
            };
            let decoded = segment.decoded.clone();

            if let Some(child) = this.static_children.get(&decoded) {
                let child = child.clone();
                req.routing.advance();
                return Resource::receive(child, req).await;
            }

            for child in &this.pattern_children {
                if let Some(values) = child.template.match_str(&decoded) {
                    let child = child.clone();
                    req.routing.path_values.extend_from(values);
                    req.routing.advance();
                    return Resource::receive(child, req).await;
                }
            }

            if let Some(child) = &this.wildcard_child {
                if let Some(values) = child.template.match_str(&decoded) {
                    let child = child.clone();
                    req.routing.path_values.extend_from(values);
                    req.routing.advance();
                    return Resource::receive(child, req).await;
                }
            }

            tracing::trace!(resource = %this.template, segment = %decoded, "no child matched");
            Response::pass(req)
        })
    }

    /// Resolves the method handler and invokes it through the node's handler
    /// middleware. An unbound OPTIONS is answered implicitly with the `Allow`
    /// header; any other unbound method goes to the not-allowed handler, 405
    /// by default.
    pub(crate) fn handle_request(this: Arc<Resource>, mut req: Request) -> BoxedFuture {
        let core: HandlerFn = {
            let node = this.clone();
            Arc::new(move |req: Request| {
                let node = node.clone();
                Box::pin(async move {
                    let method = req.method().as_str().to_uppercase();
                    if let Some(handler) = node.method_table.handlers.get(&method) {
                        let handler = handler.clone();
                        return handler(req).await;
                    }
                    let allow = node.method_table.allow_header();
                    if method == Method::OPTIONS.as_str() {
                        return Response::ok().header("allow", allow);
                    }
                    match node.method_table.not_allowed.clone() {
                        Some(handler) => handler(req).await,
                        None => Response::method_not_allowed().header("allow", allow),
                    }
                }) as BoxedFuture
            })
        };
        let chain = middleware::apply(&this.handler_wrappers, core);

        Box::pin(async move {
            if let Some(data) = &this.shared_data {
                req.routing.shared_data = Some(data.clone());
            }
            chain(req).await
        })
    }
}

/// Creates (or finds) the chain of descendants described by `templates`,
/// returning the deepest node.
pub(crate) fn descend_create(
    start: &mut Resource,
    templates: Vec<Template>,
) -> Result<&mut Resource> {
    let mut current = start;
    for template in templates {
        let key = current.locate_or_create_child(template)?;
        let slot = current.child_slot_mut(&key);
        current = Arc::get_mut(slot).ok_or(RouterError::ResourceInUse)?;
    }
    Ok(current)
}

impl Resource {
    /// Finds the child slot matching `template`, creating a dormant child
    /// when none exists.
    pub(crate) fn locate_or_create_child(&mut self, template: Template) -> Result<ChildKey> {
        if let Some(key) = self.find_same_child(&template)? {
            return Ok(key);
        }
        let key = if let Some(lit) = template.literal() {
            ChildKey::Static(lit.to_string())
        } else if template.is_wildcard() {
            ChildKey::Wildcard
        } else {
            ChildKey::Pattern(self.pattern_children.len())
        };
        self.register_child(Resource::from_template(template, Tier::Path))?;
        Ok(key)
    }
}

fn secure_location(req: &Request) -> String {
    let path = req.path();
    let query = req
        .query_string()
        .map(|q| format!("?{}", q))
        .unwrap_or_default();
    match req.authority() {
        Some(authority) => format!("https://{}{}{}", authority, path, query),
        None => format!("{}{}", path, query),
    }
}

fn slash_corrected_location(req: &Request, trailing_slash: bool) -> String {
    let path = req.path();
    let mut corrected = path.trim_end_matches('/').to_string();
    if corrected.is_empty() {
        corrected.push('/');
    }
    if trailing_slash && corrected != "/" {
        corrected.push('/');
    }
    if let Some(query) = req.query_string() {
        corrected.push('?');
        corrected.push_str(query);
    }
    corrected
}

async fn invoke_redirect(req: Request, location: String) -> Response {
    let code = req.routing.redirect_code;
    match req.routing.redirect.clone() {
        Some(handler) => handler(req, location, code).await,
        None => Response::redirect(code, &location),
    }
}

async fn invoke_not_found(req: Request) -> Response {
    match req.routing.not_found.clone() {
        Some(handler) => handler(req).await,
        None => Response::not_found(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_handler(body: &'static str) -> impl Handler {
        move |_req: Request| async move { Response::ok().body(body) }
    }

    #[test]
    fn new_records_prefix_and_trailing_slash() {
        let node = Resource::new("/projects/{id:[0-9]+}/files/").unwrap();
        assert_eq!(node.prefix_templates().len(), 2);
        assert!(node.config().trailing_slash);
        assert_eq!(node.template().literal(), Some("files"));
    }

    #[test]
    fn root_resource_has_slash_template() {
        let root = Resource::new("/").unwrap();
        assert_eq!(root.template().literal(), Some("/"));
        assert!(root.prefix_templates().is_empty());
    }

    #[test]
    fn host_node_validation() {
        assert!(matches!(
            Resource::new_host(""),
            Err(RouterError::EmptyHostTemplate)
        ));
        assert!(matches!(
            Resource::new_host("example.com/api"),
            Err(RouterError::UnwantedPathTemplate(_))
        ));
        assert!(matches!(
            Resource::new_host("{anything}"),
            Err(RouterError::WildcardHostTemplate(_))
        ));
        assert!(Resource::new_host("{sub:[a-z]+}.example.com").is_ok());
    }

    #[test]
    fn register_child_uses_the_right_buckets() {
        let mut root = Resource::new("/").unwrap();
        root.register_child(Resource::new("users").unwrap()).unwrap();
        root.register_child(Resource::new("{id:[0-9]+}").unwrap())
            .unwrap();
        root.register_child(Resource::new("{rest}").unwrap()).unwrap();

        assert_eq!(root.static_children.len(), 1);
        assert_eq!(root.pattern_children.len(), 1);
        assert!(root.wildcard_child.is_some());
    }

    #[test]
    fn register_child_rejects_hosts_and_duplicates() {
        let mut root = Resource::new("/").unwrap();
        assert!(matches!(
            root.register_child(Resource::new_host("example.com").unwrap()),
            Err(RouterError::NonRouterParent(_))
        ));

        root.register_child(Resource::new("users").unwrap()).unwrap();
        assert!(matches!(
            root.register_child(Resource::new("users").unwrap()),
            Err(RouterError::RegisteredResource(_))
        ));

        root.register_child(Resource::new("{rest}").unwrap()).unwrap();
        assert!(matches!(
            root.register_child(Resource::new("{tail}").unwrap()),
            Err(RouterError::AnotherWildcardName { .. })
        ));
    }

    #[test]
    fn sibling_names_must_be_unique() {
        let mut root = Resource::new("/").unwrap();
        root.register_child(Resource::new("{id:[0-9]+}").unwrap())
            .unwrap();
        assert!(matches!(
            root.register_child(Resource::new("$id:x{n:[0-9]+}").unwrap()),
            Err(RouterError::DuplicateNameAmongSiblings { .. })
        ));
    }

    #[test]
    fn find_same_child_reports_name_conflicts() {
        let mut root = Resource::new("/").unwrap();
        root.register_child(Resource::new("{id:[0-9]+}").unwrap())
            .unwrap();
        let other = Template::parse("{num:[0-9]+}").unwrap();
        assert!(matches!(
            root.find_same_child(&other),
            Err(RouterError::ConflictingPathSegment(_))
        ));
    }

    #[test]
    fn keep_or_merge_prefers_the_handling_node() {
        // A carries a dormant child y; A' handles GET and carries child z.
        let mut a = Resource::new("/x").unwrap();
        a.resource("/y").unwrap();

        let mut a2 = Resource::new("/x").unwrap();
        a2.get(ok_handler("from x")).unwrap();
        a2.resource("/z").unwrap();

        let mut root = Resource::new("/").unwrap();
        root.keep_or_merge(a).unwrap();
        root.keep_or_merge(a2).unwrap();

        let x = root.static_children.get("x").unwrap();
        assert!(x.can_handle_request());
        assert!(x.static_children.contains_key("y"));
        assert!(x.static_children.contains_key("z"));
    }

    #[test]
    fn keep_or_merge_rejects_two_handling_nodes() {
        let mut a = Resource::new("/x").unwrap();
        a.get(ok_handler("one")).unwrap();
        let mut a2 = Resource::new("/x").unwrap();
        a2.get(ok_handler("two")).unwrap();

        let mut root = Resource::new("/").unwrap();
        root.keep_or_merge(a).unwrap();
        assert!(matches!(
            root.keep_or_merge(a2),
            Err(RouterError::DuplicateResourceTemplate(_))
        ));
    }

    #[test]
    fn keep_or_merge_checks_policy_compatibility() {
        let secure = Resource::new_using_config("/x", ResourceConfig::new().with_secure()).unwrap();
        let plain = Resource::new_using_config("/x", ResourceConfig::new()).unwrap();

        let mut root = Resource::new("/").unwrap();
        root.keep_or_merge(secure).unwrap();
        assert!(matches!(
            root.keep_or_merge(plain),
            Err(RouterError::ConflictingSecurity(_))
        ));
    }

    #[test]
    fn set_handler_rejects_rebinding() {
        let mut node = Resource::new("/x").unwrap();
        node.get(ok_handler("a")).unwrap();
        assert!(matches!(
            node.get(ok_handler("b")),
            Err(RouterError::ConflictingMethod { .. })
        ));
        assert!(matches!(
            node.set_handler("", ok_handler("c")),
            Err(RouterError::NoHTTPMethod)
        ));
    }

    #[test]
    fn wrap_method_requires_a_handler() {
        let mut node = Resource::new("/x").unwrap();
        assert!(matches!(
            node.wrap_method("GET", |req: Request, next: crate::middleware::Next| next(req)),
            Err(RouterError::NoHandlerExists { .. })
        ));
        assert!(matches!(
            node.wrap_method("*", |req: Request, next: crate::middleware::Next| next(req)),
            Err(RouterError::DormantResource(_))
        ));
    }

    #[test]
    fn relative_resource_creates_dormant_chain() {
        let mut root = Resource::new("/").unwrap();
        let deep = root.resource("/a/{b:[0-9]+}/c").unwrap();
        assert_eq!(deep.template().literal(), Some("c"));
        assert!(!deep.can_handle_request());
        assert!(root.static_children.contains_key("a"));
    }

    #[test]
    fn relative_resource_rejects_repeated_names() {
        let mut root = Resource::new("/").unwrap();
        assert!(matches!(
            root.resource("/{id:[0-9]+}/x/{id:[0-9]+}"),
            Err(RouterError::DuplicateNameInTheURL { .. })
        ));
    }

    fn request_with_method(method: &str) -> Request {
        let (parts, _) = http::Request::builder()
            .method(method)
            .uri("/x")
            .body(())
            .unwrap()
            .into_parts();
        Request::from_parts(parts, Vec::new())
    }

    #[tokio::test]
    async fn handle_request_resolves_methods() {
        let mut node = Resource::new("/x").unwrap();
        node.get(ok_handler("got")).unwrap();
        node.post(ok_handler("posted")).unwrap();
        let node = Arc::new(node);

        let response = Resource::handle_request(node.clone(), request_with_method("GET")).await;
        assert_eq!(response.body_bytes(), b"got");

        let response = Resource::handle_request(node.clone(), request_with_method("DELETE")).await;
        assert_eq!(response.status_code(), http::StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            response.headers().get("allow").unwrap(),
            "GET, OPTIONS, POST"
        );

        let response = Resource::handle_request(node, request_with_method("OPTIONS")).await;
        assert_eq!(response.status_code(), http::StatusCode::OK);
        assert_eq!(
            response.headers().get("allow").unwrap(),
            "GET, OPTIONS, POST"
        );
    }

    #[tokio::test]
    async fn not_allowed_handler_can_be_replaced() {
        let mut node = Resource::new("/x").unwrap();
        node.get(ok_handler("got")).unwrap();
        node.set_not_allowed_handler(|_req: Request| async {
            Response::with_status(http::StatusCode::METHOD_NOT_ALLOWED).body("custom")
        })
        .unwrap();
        let node = Arc::new(node);

        let response = Resource::handle_request(node, request_with_method("DELETE")).await;
        assert_eq!(response.body_bytes(), b"custom");
    }
}
