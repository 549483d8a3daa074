//! The Dispatcher: orchestrates match → execute → respond, applies the error
//! cascade, validates the produced response, and emits lifecycle events via
//! `tracing`.

use crate::context::Context;
use crate::error::{Error, HttpError};
use crate::executor;
use crate::request::Request;
use crate::response::{Body, Response};
use crate::router::Router;
use crate::vhost::{HttpRoute, HttpTarget};
use bytes::Bytes;
use http::HeaderValue;
use std::sync::Arc;

/// Owns the [`Router`] and shared [`Context`] and turns one [`Request`] into
/// one [`Response`], never propagating an error out of [`Dispatcher::dispatch`]
/// — everything is resolved into a response, down to a generic 500.
pub struct Dispatcher {
    router: Arc<Router>,
    context: Arc<Context>,
}

impl Dispatcher {
    pub fn new(router: Arc<Router>, context: Arc<Context>) -> Self {
        Dispatcher { router, context }
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Runs all dispatch phases for `request`:
    /// 1. route resolution, 2. parameter attachment, 3. method resolution,
    /// 4. middleware execution, 5. response validation — falling back to
    /// the error cascade the moment any phase fails.
    pub async fn dispatch(&self, request: Arc<Request>) -> Response {
        let span = tracing::info_span!("dispatch", request_id = %request.id());
        let _enter = span.enter();

        let response = self.dispatch_inner(request).await;
        tracing::debug!(status = response.status(), "response-sent");
        response
    }

    /// The actual phase sequence; every return path — success or any point
    /// in the error cascade — funnels back through [`Self::dispatch`] so
    /// `response-sent` is logged exactly once per request regardless of
    /// which phase produced the response.
    async fn dispatch_inner(&self, request: Arc<Request>) -> Response {
        let route = match self.router.match_request(&request).await {
            Ok((route, hostname_params, pathname_params)) => {
                request.set_params(hostname_params, pathname_params);
                route
            }
            Err(err) => return self.error_response(err, None, None, None).await,
        };

        let target = match Router::find_target_for_request(&route, request.method()) {
            Ok(target) => target,
            Err(err) => return self.error_response(err, Some(route), None, Some(request)).await,
        };

        let outcome = executor::invoke_middleware(
            self.context.clone(),
            request.clone(),
            Response::new(200),
            &target.middleware_chain,
        )
        .await;

        let response = match outcome {
            Ok(response) => response,
            Err(err) => return self.error_response(err, Some(route), Some(target), Some(request)).await,
        };

        if let Err(err) = validate_response(&response) {
            return self.error_response(err, Some(route), Some(target), Some(request)).await;
        }

        response
    }

    /// Runs the error cascade: target error handlers, then route error
    /// handlers, then a router-default JSON error response for
    /// HTTP-classified errors, then a generic 500 for anything else.
    async fn error_response(
        &self,
        err: Error,
        route: Option<Arc<HttpRoute>>,
        target: Option<Arc<HttpTarget>>,
        request: Option<Arc<Request>>,
    ) -> Response {
        tracing::warn!(error = %err, "error cascade engaged");
        let err = Arc::new(err);

        if let (Some(target), Some(request)) = (&target, &request) {
            if let Some(response) =
                executor::handle_error(self.context.clone(), request.clone(), &err, &target.error_handlers).await
            {
                return response;
            }
        }

        if let (Some(route), Some(request)) = (&route, &request) {
            if let Some(response) =
                executor::handle_error(self.context.clone(), request.clone(), &err, &route.error_handlers).await
            {
                return response;
            }
        }

        if crate::error::is_http_error(&err) {
            return default_http_error_response(&err);
        }

        tracing::error!(error = %err, "request-handler-error");
        default_internal_error_response()
    }
}

/// Checks the response produced by a middleware chain is well-formed. Rust's
/// type system already rules out a null response or a non-numeric status;
/// the one thing worth asserting explicitly is that `status` is a valid HTTP
/// status code.
fn validate_response(response: &Response) -> crate::Result<()> {
    if !(100..=599).contains(&response.status()) {
        return Err(Error::assertion(
            "dispatcher:response-validation",
            format!("response status {} is not a valid HTTP status code", response.status()),
        ));
    }
    Ok(())
}

/// The router-default JSON:API error body for HTTP-classified errors.
fn default_http_error_response(err: &Arc<Error>) -> Response {
    let body = serde_json::json!({
        "errors": [{
            "status": err.status_code(),
            "code": err.code(),
            "title": err.name(),
            "detail": err.detail(),
            "source": err.source_pointer(),
        }]
    });

    let mut response = Response::json(err.status_code(), &body).unwrap_or_else(|_| Response::new(err.status_code()));

    if let Some(allowed_methods) = err.allowed_methods() {
        let value = allowed_methods.join(", ");
        if let Ok(header_value) = HeaderValue::from_str(&value) {
            response.headers_mut().insert(http::header::ALLOW, header_value);
        }
    }

    response
}

/// What the transport would otherwise emit on an unhandled 500: a plaintext
/// body, sanitized detail.
fn default_internal_error_response() -> Response {
    let mut response = Response::new(500);
    response
        .headers_mut()
        .insert(http::header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response.set_body(Body::Bytes(Bytes::from_static(b"Internal server error")));
    response
}
