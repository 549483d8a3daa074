//! The route specification model: validated, immutable descriptions of a
//! virtual host, route or target, plus the middleware
//! reference resolution and parent-child flattening rules that turn them
//! into the executable structures the [`crate::router::Router`] matches
//! against.

mod route_spec;
mod target_spec;
mod vhost_spec;

pub use route_spec::{RouteConfig, RouteSpec};
pub use target_spec::{MethodsConfig, TargetConfig, TargetSpec};
pub use vhost_spec::{VHostConfig, VirtualHostSpec};

use crate::registry::{ErrorHandlerCallable, MiddlewareCallable, Registry};

/// A middleware/handler reference as it appears in configuration: either a
/// bare name, or a `[name, options]` pair.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(untagged)]
pub enum MiddlewareConfig {
    Name(String),
    NameWithOptions(String, serde_json::Value),
}

impl MiddlewareConfig {
    fn into_parts(self) -> (String, serde_json::Value) {
        match self {
            MiddlewareConfig::Name(name) => (name, serde_json::Value::Null),
            MiddlewareConfig::NameWithOptions(name, options) => (name, options),
        }
    }
}

/// A middleware/handler reference at some point between being loaded from
/// configuration and being resolved against the [`crate::registry::Registry`].
/// Modeled as a tagged variant rather than an in-place mutation of the
/// configuration array.
#[derive(Clone)]
pub enum MiddlewareRef {
    Unresolved { name: String, options: serde_json::Value },
    Resolved(MiddlewareCallable),
}

impl MiddlewareRef {
    fn from_config(config: MiddlewareConfig) -> Self {
        let (name, options) = config.into_parts();
        MiddlewareRef::Unresolved { name, options }
    }

    pub(crate) fn as_resolved(&self) -> Option<&MiddlewareCallable> {
        match self {
            MiddlewareRef::Resolved(callable) => Some(callable),
            MiddlewareRef::Unresolved { .. } => None,
        }
    }
}

impl std::fmt::Debug for MiddlewareRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MiddlewareRef::Unresolved { name, .. } => write!(f, "Unresolved({name})"),
            MiddlewareRef::Resolved(_) => write!(f, "Resolved(..)"),
        }
    }
}

/// An error-handler reference, same shape as [`MiddlewareRef`] but resolving
/// against the error-handler registry into an [`ErrorHandlerCallable`].
#[derive(Clone)]
pub enum ErrorHandlerRef {
    Unresolved { name: String, options: serde_json::Value },
    Resolved(ErrorHandlerCallable),
}

impl ErrorHandlerRef {
    fn from_config(config: MiddlewareConfig) -> Self {
        let (name, options) = config.into_parts();
        ErrorHandlerRef::Unresolved { name, options }
    }

    pub(crate) fn as_resolved(&self) -> Option<&ErrorHandlerCallable> {
        match self {
            ErrorHandlerRef::Resolved(callable) => Some(callable),
            ErrorHandlerRef::Unresolved { .. } => None,
        }
    }
}

impl std::fmt::Debug for ErrorHandlerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorHandlerRef::Unresolved { name, .. } => write!(f, "Unresolved({name})"),
            ErrorHandlerRef::Resolved(_) => write!(f, "Resolved(..)"),
        }
    }
}

pub(crate) fn middleware_refs_from_config(configs: Vec<MiddlewareConfig>) -> Vec<MiddlewareRef> {
    configs.into_iter().map(MiddlewareRef::from_config).collect()
}

pub(crate) fn error_handler_refs_from_config(configs: Vec<MiddlewareConfig>) -> Vec<ErrorHandlerRef> {
    configs.into_iter().map(ErrorHandlerRef::from_config).collect()
}

/// Resolves every unresolved reference in `refs` in place against `registry`.
pub(crate) fn resolve_middleware_refs(
    refs: &mut [MiddlewareRef],
    registry: &Registry,
    reporting_path: &str,
) -> crate::Result<()> {
    for r in refs.iter_mut() {
        if let MiddlewareRef::Unresolved { name, options } = r {
            let resolved = registry.resolve_middleware(name, options.clone(), reporting_path)?;
            *r = MiddlewareRef::Resolved(resolved);
        }
    }
    Ok(())
}

pub(crate) fn resolve_error_handler_refs(
    refs: &mut [ErrorHandlerRef],
    registry: &Registry,
    reporting_path: &str,
) -> crate::Result<()> {
    for r in refs.iter_mut() {
        if let ErrorHandlerRef::Unresolved { name, options } = r {
            let resolved = registry.resolve_error_handler(name, options.clone(), reporting_path)?;
            *r = ErrorHandlerRef::Resolved(resolved);
        }
    }
    Ok(())
}
