//! Executable virtual-host/route/target structures: the compiled, immutable
//! form that [`crate::router::Router`] matches requests against. Produced
//! from a [`crate::spec::VirtualHostSpec`] by
//! [`crate::spec::VirtualHostSpec::to_virtual_host`].

use crate::pattern::Pattern;
use crate::registry::{ErrorHandlerCallable, MiddlewareCallable};
use crate::types::ParamMap;
use http::Method;
use std::sync::Arc;

/// How a virtual host decides whether it owns a given `Host` header.
pub enum HostMatcher {
    /// The `"*"` catch-all: matches any hostname.
    AnyHostname,
    /// An exact hostname, pre-reversed at compile time so matching a request
    /// only has to reverse one side.
    Hostname(String),
    /// A pattern, compiled against reversed hostname segments.
    Pattern(Pattern),
}

/// A target's final, fully-composed pipeline: its middleware chain is
/// `route.inbound ++ target.handlers ++ route.outbound`; its error-handler
/// chain is `target.error_handlers ++ route.error_handlers`.
pub struct HttpTarget {
    pub name: String,
    pub methods: Vec<Method>,
    pub middleware_chain: Vec<MiddlewareCallable>,
    pub error_handlers: Vec<ErrorHandlerCallable>,
}

impl HttpTarget {
    pub(crate) fn new(
        name: String,
        methods: Vec<Method>,
        middleware_chain: Vec<MiddlewareCallable>,
        error_handlers: Vec<ErrorHandlerCallable>,
    ) -> Self {
        HttpTarget { name, methods, middleware_chain, error_handlers }
    }
}

/// A flattened, compiled route: a single pattern, its own (already
/// inner-first merged) error-handler chain, and the targets it dispatches
/// among by method.
pub struct HttpRoute {
    pub name: String,
    pattern: Pattern,
    pub targets: Vec<Arc<HttpTarget>>,
    /// The flattened route-level error-handler chain, inner-first.
    pub error_handlers: Vec<ErrorHandlerCallable>,
}

impl HttpRoute {
    pub(crate) fn new(
        name: String,
        pattern: Pattern,
        targets: Vec<Arc<HttpTarget>>,
        error_handlers: Vec<ErrorHandlerCallable>,
    ) -> Self {
        HttpRoute { name, pattern, targets, error_handlers }
    }

    pub fn pattern_source(&self) -> &str {
        self.pattern.source()
    }

    /// Attempts to match `pathname` against this route's compiled pattern.
    pub fn match_pathname(&self, pathname: &str) -> Option<ParamMap> {
        self.pattern.matches(pathname)
    }

    /// Returns the first target whose allowed-methods set contains `method`.
    pub fn find_target(&self, method: &Method) -> Option<&Arc<HttpTarget>> {
        self.targets.iter().find(|target| target.methods.contains(method))
    }

    /// The union of every target's methods on this route, in first-seen
    /// order with duplicates removed — used to populate `Allow` on a 405.
    pub fn allowed_methods(&self) -> Vec<Method> {
        let mut out: Vec<Method> = Vec::new();
        for target in &self.targets {
            for method in &target.methods {
                if !out.contains(method) {
                    out.push(method.clone());
                }
            }
        }
        out
    }
}

/// A routing scope keyed by hostname, exact or pattern, holding its
/// flattened, compiled routes in declared order.
pub struct VirtualHost {
    pub name: String,
    host_match: HostMatcher,
    pub routes: Vec<Arc<HttpRoute>>,
}

impl VirtualHost {
    pub(crate) fn new(name: String, host_match: HostMatcher, routes: Vec<Arc<HttpRoute>>) -> Self {
        VirtualHost { name, host_match, routes }
    }

    /// Matches `hostname` against this vhost's hostname/pattern, after
    /// reversing its dot-segments.
    pub fn match_hostname(&self, hostname: &str) -> Option<ParamMap> {
        let reversed = crate::pattern::reverse_hostname(hostname);
        match &self.host_match {
            HostMatcher::AnyHostname => Some(ParamMap::new()),
            HostMatcher::Hostname(expected) => {
                if *expected == reversed {
                    Some(ParamMap::new())
                } else {
                    None
                }
            }
            HostMatcher::Pattern(pattern) => pattern.matches(&reversed),
        }
    }

    /// Returns the first route (in declared order) whose pathname pattern
    /// matches, paired with its captured parameters. Route order is
    /// significant: first match wins.
    pub fn match_pathname(&self, pathname: &str) -> Option<(Arc<HttpRoute>, ParamMap)> {
        for route in &self.routes {
            if let Some(params) = route.match_pathname(pathname) {
                return Some((route.clone(), params));
            }
        }
        None
    }
}
