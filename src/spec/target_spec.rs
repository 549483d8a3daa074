//! `TargetSpec` validation and middleware resolution.

use super::{
    error_handler_refs_from_config, middleware_refs_from_config, resolve_error_handler_refs, ErrorHandlerRef,
    MiddlewareConfig, MiddlewareRef,
};
use crate::constants::ALL_TARGET_METHODS;
use crate::error::Error;
use crate::registry::Registry;
use http::Method;

/// `methods` as it appears in configuration: either the literal `"*"` or an
/// ordered subset of the fixed method set.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(untagged)]
pub enum MethodsConfig {
    All(String),
    List(Vec<String>),
}

/// Raw, unvalidated configuration for a target.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetConfig {
    pub name: String,
    #[serde(default = "default_methods")]
    pub methods: MethodsConfig,
    pub handlers: Vec<MiddlewareConfig>,
    #[serde(default)]
    pub error_handlers: Vec<MiddlewareConfig>,
}

fn default_methods() -> MethodsConfig {
    MethodsConfig::All("*".to_string())
}

/// A validated target. `handlers` and `error_handlers` start out as
/// [`MiddlewareRef::Unresolved`] and become [`MiddlewareRef::Resolved`] only
/// after [`TargetSpec::assign_middleware`] runs.
#[derive(Clone)]
pub struct TargetSpec {
    pub name: String,
    pub methods: Vec<Method>,
    pub handlers: Vec<MiddlewareRef>,
    pub error_handlers: Vec<ErrorHandlerRef>,
}

impl TargetSpec {
    /// Validates a [`TargetConfig`], enforcing: non-empty `name`, a
    /// non-empty, recognized method set, and at least one handler.
    pub fn validate_and_create(config: TargetConfig, reporting_path: &str) -> crate::Result<TargetSpec> {
        if config.name.is_empty() {
            return Err(Error::assertion(reporting_path, "target name must be a non-empty string"));
        }

        let methods = match config.methods {
            MethodsConfig::All(marker) if marker == "*" => ALL_TARGET_METHODS.to_vec(),
            MethodsConfig::All(other) => {
                return Err(Error::assertion(
                    reporting_path,
                    format!("target methods must be \"*\" or a list of methods, got string {other:?}"),
                ));
            }
            MethodsConfig::List(names) => {
                if names.is_empty() {
                    return Err(Error::assertion(reporting_path, "target methods must not be empty"));
                }
                let mut methods = Vec::with_capacity(names.len());
                for name in names {
                    let method: Method = name
                        .parse()
                        .map_err(|_| Error::assertion(reporting_path, format!("unrecognized method: {name}")))?;
                    if !ALL_TARGET_METHODS.contains(&method) {
                        return Err(Error::assertion(reporting_path, format!("unsupported method: {name}")));
                    }
                    methods.push(method);
                }
                methods
            }
        };

        if config.handlers.is_empty() {
            return Err(Error::assertion(reporting_path, "target must declare at least one handler"));
        }

        Ok(TargetSpec {
            name: config.name,
            methods,
            handlers: middleware_refs_from_config(config.handlers),
            error_handlers: error_handler_refs_from_config(config.error_handlers),
        })
    }

    /// Resolves every handler/error-handler name reference against the
    /// registry, replacing it in place.
    pub fn assign_middleware(&mut self, registry: &Registry, reporting_path: &str) -> crate::Result<()> {
        // Handlers resolve against the *handler* registry, not the
        // middleware one, so we can't reuse `resolve_middleware_refs` here.
        for handler in &mut self.handlers {
            if let MiddlewareRef::Unresolved { name, options } = handler {
                let resolved = registry.resolve_handler(name, options.clone(), reporting_path)?;
                *handler = MiddlewareRef::Resolved(resolved);
            }
        }
        resolve_error_handler_refs(&mut self.error_handlers, registry, reporting_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(methods: MethodsConfig) -> TargetConfig {
        TargetConfig {
            name: "get-user".to_string(),
            methods,
            handlers: vec![MiddlewareConfig::Name("load-user".to_string())],
            error_handlers: vec![],
        }
    }

    #[test]
    fn rejects_empty_name() {
        let mut cfg = config(MethodsConfig::All("*".to_string()));
        cfg.name = String::new();
        let err = TargetSpec::validate_and_create(cfg, "vhost[0]:route[0]:target[0]").unwrap_err();
        assert!(matches!(err, Error::Assertion { .. }));
    }

    #[test]
    fn star_methods_expand_to_fixed_set() {
        let spec = TargetSpec::validate_and_create(config(MethodsConfig::All("*".to_string())), "t").unwrap();
        assert_eq!(spec.methods, ALL_TARGET_METHODS.to_vec());
    }

    #[test]
    fn rejects_unsupported_method() {
        let err =
            TargetSpec::validate_and_create(config(MethodsConfig::List(vec!["TRACE".to_string()])), "t").unwrap_err();
        assert!(matches!(err, Error::Assertion { .. }));
    }

    #[test]
    fn rejects_empty_handlers() {
        let mut cfg = config(MethodsConfig::All("*".to_string()));
        cfg.handlers.clear();
        let err = TargetSpec::validate_and_create(cfg, "t").unwrap_err();
        assert!(matches!(err, Error::Assertion { .. }));
    }
}
