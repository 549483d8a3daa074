//! The Target Executor: runs the inbound→handler→outbound middleware chain
//! for a matched target with early-exit semantics, and runs target- or
//! route-level error handlers on failure.

use crate::context::Context;
use crate::error::Error;
use crate::registry::{ErrorHandlerCallable, MiddlewareCallable, MiddlewareOutcome};
use crate::request::Request;
use crate::response::Response;
use std::sync::Arc;

/// Runs `chain` in order, sequentially awaiting each middleware. A
/// middleware that returns [`MiddlewareOutcome::Stop`] ends the chain
/// immediately without invoking the remainder.
pub async fn invoke_middleware(
    context: Arc<Context>,
    request: Arc<Request>,
    initial_response: Response,
    chain: &[MiddlewareCallable],
) -> crate::Result<Response> {
    let mut response = initial_response;
    for middleware in chain {
        match middleware(context.clone(), request.clone(), response).await? {
            MiddlewareOutcome::Stop(stopped) => return Ok(stopped),
            MiddlewareOutcome::Continue(continued) => response = continued,
        }
    }
    Ok(response)
}

/// Runs `handlers` in order, returning the first response any of them
/// produces, or `None` if every handler declines. Each handler is offered a
/// fresh response seeded with the error's status code, since no response
/// exists yet when an error interrupts the pipeline before it produces one.
pub async fn handle_error(
    context: Arc<Context>,
    request: Arc<Request>,
    error: &Arc<Error>,
    handlers: &[ErrorHandlerCallable],
) -> Option<Response> {
    use crate::error::HttpError;

    for handler in handlers {
        let seed = Response::new(error.status_code());
        if let Some(response) = handler(context.clone(), request.clone(), seed, error.clone()).await {
            return Some(response);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{build_url, Request};
    use http::HeaderMap;

    fn request() -> Arc<Request> {
        let url = build_url(&HeaderMap::new(), &"/x".parse().unwrap(), "http", "example.com");
        Arc::new(Request::new_for_test("req-1".to_string(), http::Method::GET, url))
    }

    #[tokio::test]
    async fn stop_short_circuits_remaining_middleware() {
        let ran_second: Arc<std::sync::atomic::AtomicBool> = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let ran_second_clone = ran_second.clone();

        let first: MiddlewareCallable =
            Arc::new(move |_ctx, _req, mut res| {
                Box::pin(async move {
                    res.set_status(201);
                    Ok(MiddlewareOutcome::Stop(res))
                })
            });
        let second: MiddlewareCallable = Arc::new(move |_ctx, _req, res| {
            let flag = ran_second_clone.clone();
            Box::pin(async move {
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(MiddlewareOutcome::Continue(res))
            })
        });

        let context = Arc::new(Context::new());
        let response = invoke_middleware(context, request(), Response::new(200), &[first, second])
            .await
            .unwrap();

        assert_eq!(response.status(), 201);
        assert!(!ran_second.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn handle_error_returns_first_truthy_response() {
        let declining: ErrorHandlerCallable =
            Arc::new(|_ctx, _req, _res, _err| Box::pin(async move { None }));
        let accepting: ErrorHandlerCallable =
            Arc::new(|_ctx, _req, mut res, _err| {
                Box::pin(async move {
                    res.set_status(418);
                    Some(res)
                })
            });

        let context = Arc::new(Context::new());
        let error = Arc::new(Error::not_found("/missing"));
        let response = handle_error(context, request(), &error, &[declining, accepting]).await.unwrap();
        assert_eq!(response.status(), 418);
    }

    #[tokio::test]
    async fn handle_error_returns_none_when_all_decline() {
        let declining: ErrorHandlerCallable =
            Arc::new(|_ctx, _req, _res, _err| Box::pin(async move { None }));

        let context = Arc::new(Context::new());
        let error = Arc::new(Error::not_found("/missing"));
        let response = handle_error(context, request(), &error, &[declining]).await;
        assert!(response.is_none());
    }
}
