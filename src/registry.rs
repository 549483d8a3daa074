//! Plugin Registry: name-keyed maps of middleware, handler and error-handler
//! factories, populated once at startup and consulted only at composition
//! time — never during request handling.

use crate::context::Context;
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// The outcome of a single middleware invocation: early exit modeled as a
/// return-value variant rather than a shared mutable flag.
pub enum MiddlewareOutcome {
    Continue(Response),
    Stop(Response),
}

pub type MiddlewareFuture = Pin<Box<dyn Future<Output = crate::Result<MiddlewareOutcome>> + Send>>;

/// A resolved middleware or handler callable. Handlers share this exact
/// shape: a handler is simply a middleware that is expected to produce the
/// substantive response.
pub type MiddlewareCallable = Arc<dyn Fn(Arc<Context>, Arc<Request>, Response) -> MiddlewareFuture + Send + Sync>;

pub type ErrorHandlerFuture = Pin<Box<dyn Future<Output = Option<Response>> + Send>>;

/// A resolved error-handler callable: `(context, request, response, error)
/// -> response|none`.
pub type ErrorHandlerCallable =
    Arc<dyn Fn(Arc<Context>, Arc<Request>, Response, Arc<Error>) -> ErrorHandlerFuture + Send + Sync>;

pub type MiddlewareFactory = Arc<dyn Fn(serde_json::Value) -> MiddlewareCallable + Send + Sync>;
pub type ErrorHandlerFactory = Arc<dyn Fn(serde_json::Value) -> ErrorHandlerCallable + Send + Sync>;

/// Name-keyed factory maps, built once at startup.
#[derive(Clone, Default)]
pub struct Registry {
    middleware: HashMap<String, MiddlewareFactory>,
    handlers: HashMap<String, MiddlewareFactory>,
    error_handlers: HashMap<String, ErrorHandlerFactory>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn register_middleware(&mut self, name: impl Into<String>, factory: MiddlewareFactory) -> crate::Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::assertion("registry", "middleware name must be a non-empty string"));
        }
        self.middleware.insert(name, factory);
        Ok(())
    }

    pub fn register_handler(&mut self, name: impl Into<String>, factory: MiddlewareFactory) -> crate::Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::assertion("registry", "handler name must be a non-empty string"));
        }
        self.handlers.insert(name, factory);
        Ok(())
    }

    pub fn register_error_handler(
        &mut self,
        name: impl Into<String>,
        factory: ErrorHandlerFactory,
    ) -> crate::Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::assertion("registry", "error handler name must be a non-empty string"));
        }
        self.error_handlers.insert(name, factory);
        Ok(())
    }

    pub(crate) fn resolve_middleware(
        &self,
        name: &str,
        options: serde_json::Value,
        reporting_path: &str,
    ) -> crate::Result<MiddlewareCallable> {
        let factory = self.middleware.get(name).ok_or_else(|| {
            Error::assertion(reporting_path, format!("unknown middleware name: {name}"))
        })?;
        Ok(factory(options))
    }

    pub(crate) fn resolve_handler(
        &self,
        name: &str,
        options: serde_json::Value,
        reporting_path: &str,
    ) -> crate::Result<MiddlewareCallable> {
        let factory = self
            .handlers
            .get(name)
            .ok_or_else(|| Error::assertion(reporting_path, format!("unknown handler name: {name}")))?;
        Ok(factory(options))
    }

    pub(crate) fn resolve_error_handler(
        &self,
        name: &str,
        options: serde_json::Value,
        reporting_path: &str,
    ) -> crate::Result<ErrorHandlerCallable> {
        let factory = self.error_handlers.get(name).ok_or_else(|| {
            Error::assertion(reporting_path, format!("unknown error handler name: {name}"))
        })?;
        Ok(factory(options))
    }
}
