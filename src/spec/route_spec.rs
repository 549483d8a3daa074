//! `RouteSpec` validation, middleware resolution, and parent-child flattening.
//! A `RouteSpec` is either an intermediate node (`routes`) or a leaf
//! (`targets`), never both — [`RouteSpec::validate_and_create`] enforces the
//! XOR. [`RouteSpec::flatten`] implements the rule that turns a nested tree
//! into a flat list of leaf routes.

use super::{
    error_handler_refs_from_config, middleware_refs_from_config, resolve_error_handler_refs,
    resolve_middleware_refs, ErrorHandlerRef, MiddlewareConfig, MiddlewareRef, TargetConfig, TargetSpec,
};
use crate::error::Error;
use crate::registry::Registry;

/// Raw, unvalidated configuration for a route.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteConfig {
    pub name: Option<String>,
    pub pattern: String,
    #[serde(default)]
    pub inbound_middleware: Vec<MiddlewareConfig>,
    #[serde(default)]
    pub outbound_middleware: Vec<MiddlewareConfig>,
    #[serde(default)]
    pub error_handlers: Vec<MiddlewareConfig>,
    #[serde(default)]
    pub routes: Option<Vec<RouteConfig>>,
    #[serde(default)]
    pub targets: Option<Vec<TargetConfig>>,
}

/// Either nested child routes, or the leaf targets this route dispatches to.
/// Exactly one variant is ever populated.
pub enum RouteChildren {
    Routes(Vec<RouteSpec>),
    Targets(Vec<TargetSpec>),
}

/// A validated route, still organized as a tree. `inbound_middleware`,
/// `outbound_middleware` and `error_handlers` start out
/// [`MiddlewareRef::Unresolved`]/[`ErrorHandlerRef::Unresolved`] and become
/// resolved only after [`RouteSpec::assign_middleware`] runs.
pub struct RouteSpec {
    pub name: String,
    pub pattern: String,
    pub inbound_middleware: Vec<MiddlewareRef>,
    pub outbound_middleware: Vec<MiddlewareRef>,
    pub error_handlers: Vec<ErrorHandlerRef>,
    pub children: RouteChildren,
}

/// One leaf produced by [`RouteSpec::flatten`]: the merged pattern, the
/// merged inbound/outbound/error-handler chains (still as refs, resolved by
/// the time flattening runs), and the leaf's own targets.
pub struct FlattenedRoute {
    pub name: String,
    pub pattern: String,
    pub inbound: Vec<MiddlewareRef>,
    pub outbound: Vec<MiddlewareRef>,
    pub error_handlers: Vec<ErrorHandlerRef>,
    pub targets: Vec<TargetSpec>,
}

/// The accumulated state inherited from ancestors while walking down to a
/// leaf, used only during [`RouteSpec::flatten`].
struct Ancestor {
    name: String,
    pattern: String,
    inbound: Vec<MiddlewareRef>,
    outbound: Vec<MiddlewareRef>,
    error_handlers: Vec<ErrorHandlerRef>,
}

impl RouteSpec {
    /// Validates a [`RouteConfig`] and everything nested under it,
    /// recursively. Enforces the `routes` XOR `targets` invariant and
    /// compiles the pattern purely to surface invalid patterns at
    /// configuration time — the compiled matcher itself is produced later,
    /// in `to_http_route`; here we just prove it compiles.
    pub fn validate_and_create(config: RouteConfig, parent_reporting_path: &str) -> crate::Result<RouteSpec> {
        let name = config.name.clone().unwrap_or_else(|| config.pattern.clone());
        let here = format!("{parent_reporting_path}:route.{name}");

        crate::pattern::Pattern::compile(&config.pattern)
            .map_err(|_| Error::assertion(&here, format!("invalid pattern: {:?}", config.pattern)))?;

        let children = match (config.routes, config.targets) {
            (Some(_), Some(_)) => {
                return Err(Error::assertion(
                    &here,
                    "a route must declare either `routes` or `targets`, not both",
                ));
            }
            (None, None) => {
                return Err(Error::assertion(&here, "a route must declare either `routes` or `targets`"));
            }
            (Some(routes), None) => {
                let mut specs = Vec::with_capacity(routes.len());
                for (i, child) in routes.into_iter().enumerate() {
                    specs.push(RouteSpec::validate_and_create(child, &format!("{here}[{i}]"))?);
                }
                RouteChildren::Routes(specs)
            }
            (None, Some(targets)) => {
                let mut specs = Vec::with_capacity(targets.len());
                for (i, target) in targets.into_iter().enumerate() {
                    specs.push(TargetSpec::validate_and_create(target, &format!("{here}:target[{i}]"))?);
                }
                RouteChildren::Targets(specs)
            }
        };

        Ok(RouteSpec {
            name,
            pattern: config.pattern,
            inbound_middleware: middleware_refs_from_config(config.inbound_middleware),
            outbound_middleware: middleware_refs_from_config(config.outbound_middleware),
            error_handlers: error_handler_refs_from_config(config.error_handlers),
            children,
        })
    }

    /// Resolves every middleware/handler/error-handler reference under this
    /// route, recursively, in place.
    pub fn assign_middleware(&mut self, registry: &Registry, parent_reporting_path: &str) -> crate::Result<()> {
        let here = format!("{parent_reporting_path}:route.{}", self.name);

        resolve_middleware_refs(&mut self.inbound_middleware, registry, &here)?;
        resolve_middleware_refs(&mut self.outbound_middleware, registry, &here)?;
        resolve_error_handler_refs(&mut self.error_handlers, registry, &here)?;

        match &mut self.children {
            RouteChildren::Routes(children) => {
                for child in children.iter_mut() {
                    child.assign_middleware(registry, &here)?;
                }
            }
            RouteChildren::Targets(targets) => {
                for (i, target) in targets.iter_mut().enumerate() {
                    target.assign_middleware(registry, &format!("{here}:target[{i}]"))?;
                }
            }
        }
        Ok(())
    }

    /// Flattens this route and all its descendants into leaf routes, each
    /// carrying its fully concatenated name and pattern and its fully
    /// assembled inbound/outbound/error-handler chains. Must only be called
    /// after [`RouteSpec::assign_middleware`] has resolved every reference.
    pub fn flatten(&self) -> Vec<FlattenedRoute> {
        self.flatten_under(None)
    }

    fn flatten_under(&self, parent: Option<&Ancestor>) -> Vec<FlattenedRoute> {
        let (name, pattern, inbound, outbound, error_handlers) = match parent {
            None => (
                self.name.clone(),
                self.pattern.clone(),
                self.inbound_middleware.clone(),
                self.outbound_middleware.clone(),
                self.error_handlers.clone(),
            ),
            Some(parent) => {
                let name = format!("{}:{}", parent.name, self.name);
                let pattern = if parent.pattern == "*" {
                    self.pattern.clone()
                } else {
                    concat_patterns(&parent.pattern, &self.pattern)
                };

                let mut inbound = parent.inbound.clone();
                inbound.extend(self.inbound_middleware.iter().cloned());

                let mut outbound = self.outbound_middleware.clone();
                outbound.extend(parent.outbound.iter().cloned());

                let mut error_handlers = self.error_handlers.clone();
                error_handlers.extend(parent.error_handlers.iter().cloned());

                (name, pattern, inbound, outbound, error_handlers)
            }
        };

        match &self.children {
            RouteChildren::Targets(targets) => vec![FlattenedRoute {
                name,
                pattern,
                inbound,
                outbound,
                error_handlers,
                targets: targets.clone(),
            }],
            RouteChildren::Routes(children) => {
                let ancestor = Ancestor { name, pattern, inbound, outbound, error_handlers };
                children.iter().flat_map(|child| child.flatten_under(Some(&ancestor))).collect()
            }
        }
    }
}

/// Concatenates two patterns and collapses any run of `/` into one.
fn concat_patterns(a: &str, b: &str) -> String {
    collapse_slashes(&format!("{a}{b}"))
}

fn collapse_slashes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_slash = false;
    for c in s.chars() {
        if c == '/' {
            if last_was_slash {
                continue;
            }
            last_was_slash = true;
        } else {
            last_was_slash = false;
        }
        out.push(c);
    }
    out
}
