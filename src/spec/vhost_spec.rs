//! `VirtualHostSpec` validation and compilation into a runtime
//! [`crate::vhost::VirtualHost`].

use super::route_spec::RouteConfig;
use super::RouteSpec;
use crate::error::Error;
use crate::registry::Registry;
use crate::vhost::{HttpRoute, HttpTarget, VirtualHost};
use std::sync::Arc;

/// Raw, unvalidated configuration for a virtual host.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VHostConfig {
    pub name: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub pattern: Option<String>,
    pub routes: Vec<RouteConfig>,
}

/// Either an exact hostname (compared in reversed-segment order, `"*"`
/// matching any host) or a pattern to run through the pattern matcher.
pub enum HostMatch {
    Hostname(String),
    Pattern(String),
}

/// A validated virtual host, still holding its tree of (unflattened)
/// `RouteSpec`s.
pub struct VirtualHostSpec {
    pub name: String,
    pub host_match: HostMatch,
    pub routes: Vec<RouteSpec>,
}

impl VirtualHostSpec {
    /// Validates a [`VHostConfig`] and every route nested under it. `index`
    /// is this vhost's position in the configured list, used to build the
    /// `vhost.name[i]` reporting path.
    pub fn validate_and_create(config: VHostConfig, index: usize) -> crate::Result<VirtualHostSpec> {
        let name = config.name.clone().unwrap_or_else(|| format!("vhost{index}"));
        let here = format!("vhost.{name}[{index}]");

        let host_match = match (config.hostname, config.pattern) {
            (Some(_), Some(_)) => {
                return Err(Error::assertion(
                    &here,
                    "a virtual host must declare either `hostname` or `pattern`, not both",
                ));
            }
            (None, None) => {
                return Err(Error::assertion(&here, "a virtual host must declare either `hostname` or `pattern`"));
            }
            (Some(hostname), None) => HostMatch::Hostname(hostname),
            (None, Some(pattern)) => HostMatch::Pattern(pattern),
        };

        if let HostMatch::Pattern(pattern) = &host_match {
            crate::pattern::Pattern::compile(pattern)
                .map_err(|_| Error::assertion(&here, format!("invalid hostname pattern: {pattern:?}")))?;
        }

        let mut routes = Vec::with_capacity(config.routes.len());
        for (i, route) in config.routes.into_iter().enumerate() {
            routes.push(RouteSpec::validate_and_create(route, &format!("{here}[{i}]"))?);
        }

        Ok(VirtualHostSpec { name, host_match, routes })
    }

    /// Resolves every middleware/handler/error-handler reference in this
    /// vhost's route tree.
    pub fn assign_middleware(&mut self, registry: &Registry) -> crate::Result<()> {
        let here = format!("vhost.{}", self.name);
        for route in self.routes.iter_mut() {
            route.assign_middleware(registry, &here)?;
        }
        Ok(())
    }

    /// Flattens every top-level route and compiles the result into an
    /// executable [`VirtualHost`]. Must only be called after
    /// [`Self::assign_middleware`].
    pub fn to_virtual_host(&self) -> crate::Result<VirtualHost> {
        let here = format!("vhost.{}", self.name);

        let host_match = match &self.host_match {
            HostMatch::Hostname(hostname) if hostname == "*" => crate::vhost::HostMatcher::AnyHostname,
            HostMatch::Hostname(hostname) => {
                crate::vhost::HostMatcher::Hostname(crate::pattern::reverse_hostname(hostname))
            }
            HostMatch::Pattern(pattern) => crate::vhost::HostMatcher::Pattern(
                crate::pattern::Pattern::compile(&crate::pattern::reverse_hostname(pattern))
                    .map_err(|_| Error::assertion(&here, format!("invalid hostname pattern: {pattern:?}")))?,
            ),
        };

        let mut http_routes = Vec::new();
        for route in &self.routes {
            for flattened in route.flatten() {
                http_routes.push(Arc::new(to_http_route(flattened, &here)?));
            }
        }

        Ok(VirtualHost::new(self.name.clone(), host_match, http_routes))
    }
}

fn to_http_route(flattened: super::route_spec::FlattenedRoute, reporting_path: &str) -> crate::Result<HttpRoute> {
    let super::route_spec::FlattenedRoute { name, pattern, inbound, outbound, error_handlers, targets } = flattened;

    let compiled_pattern = crate::pattern::Pattern::compile(&pattern)
        .map_err(|_| Error::assertion(reporting_path, format!("invalid flattened pattern: {pattern:?}")))?;

    let route_error_handlers: Vec<_> = error_handlers
        .iter()
        .map(|r| {
            r.as_resolved()
                .cloned()
                .ok_or_else(|| Error::assertion(reporting_path, "error handler reference was never resolved"))
        })
        .collect::<crate::Result<Vec<_>>>()?;

    let inbound_resolved: Vec<_> = inbound
        .iter()
        .map(|r| {
            r.as_resolved()
                .cloned()
                .ok_or_else(|| Error::assertion(reporting_path, "middleware reference was never resolved"))
        })
        .collect::<crate::Result<Vec<_>>>()?;

    let outbound_resolved: Vec<_> = outbound
        .iter()
        .map(|r| {
            r.as_resolved()
                .cloned()
                .ok_or_else(|| Error::assertion(reporting_path, "middleware reference was never resolved"))
        })
        .collect::<crate::Result<Vec<_>>>()?;

    let mut http_targets = Vec::with_capacity(targets.len());
    for target in targets {
        let handlers: Vec<_> = target
            .handlers
            .iter()
            .map(|r| {
                r.as_resolved()
                    .cloned()
                    .ok_or_else(|| Error::assertion(reporting_path, "handler reference was never resolved"))
            })
            .collect::<crate::Result<Vec<_>>>()?;

        let target_error_handlers: Vec<_> = target
            .error_handlers
            .iter()
            .map(|r| {
                r.as_resolved()
                    .cloned()
                    .ok_or_else(|| Error::assertion(reporting_path, "error handler reference was never resolved"))
            })
            .collect::<crate::Result<Vec<_>>>()?;

        // Final middleware chain: route.inbound ++ target.handlers ++ route.outbound.
        let mut middleware_chain = inbound_resolved.clone();
        middleware_chain.extend(handlers);
        middleware_chain.extend(outbound_resolved.clone());

        // Final error-handler chain: target.errorHandlers ++ route.errorHandlers.
        let mut error_handler_chain = target_error_handlers;
        error_handler_chain.extend(route_error_handlers.clone());

        http_targets.push(Arc::new(HttpTarget::new(
            target.name,
            target.methods,
            middleware_chain,
            error_handler_chain,
        )));
    }

    Ok(HttpRoute::new(name, compiled_pattern, http_targets, route_error_handlers))
}
