//! HTTP Transport: binds a TCP listener, builds a
//! [`crate::request::Request`]/[`crate::response::Response`] pair per
//! connection, invokes the [`crate::dispatcher::Dispatcher`], and writes the
//! response back to the wire — including streaming bodies, HEAD suppression,
//! draining an unconsumed request body before responding, and a
//! graceful-drain shutdown window.
//!
//! A manual `TcpListener` accept loop feeding `hyper_util`'s
//! `http1::Builder`, serving one [`Dispatcher`] per bound port.

use crate::constants::{DEFAULT_PORT, GRACEFUL_SHUTDOWN_DRAIN, HEADER_NAME_REQUEST_ID};
use crate::dispatcher::Dispatcher;
use crate::error::Error;
use crate::request::{build_url, Request};
use crate::response::Body;
use bytes::Bytes;
use futures::TryStreamExt;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Notify;

/// Serves a [`Dispatcher`] over HTTP/1.1 on a configured port.
pub struct Transport {
    dispatcher: Arc<Dispatcher>,
    port: u16,
    request_counter: AtomicU64,
}

impl Transport {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Transport { dispatcher, port: DEFAULT_PORT, request_counter: AtomicU64::new(0) }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Binds and serves connections until `shutdown` resolves, then waits up
    /// to [`GRACEFUL_SHUTDOWN_DRAIN`] for in-flight connections to finish
    /// before returning. Returns the bound address once listening, via
    /// `ready`.
    pub async fn serve(
        self: Arc<Self>,
        shutdown: tokio::sync::oneshot::Receiver<()>,
        ready: Option<tokio::sync::oneshot::Sender<SocketAddr>>,
    ) -> crate::Result<()> {
        let bind_addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| Error::wrap("failed to bind transport listener", e))?;
        let local_addr = listener.local_addr().map_err(|e| Error::wrap("failed to read local address", e))?;

        tracing::info!(addr = %local_addr, "server-listening");
        if let Some(ready) = ready {
            let _ = ready.send(local_addr);
        }

        let in_flight = Arc::new(AtomicU64::new(0));
        let drained = Arc::new(Notify::new());
        let mut shutdown = shutdown;

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(v) => v,
                        Err(err) => {
                            tracing::error!(error = %err, "server-error");
                            continue;
                        }
                    };

                    in_flight.fetch_add(1, Ordering::SeqCst);
                    let transport = self.clone();
                    let in_flight = in_flight.clone();
                    let drained = drained.clone();

                    tokio::task::spawn(async move {
                        let io = TokioIo::new(stream);
                        let service = service_fn(move |req| {
                            let transport = transport.clone();
                            async move { transport.handle_connection_request(req, remote_addr).await }
                        });

                        if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                            tracing::error!(error = %err, "request-error");
                        }

                        if in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                            drained.notify_waiters();
                        }
                    });
                }
                _ = &mut shutdown => {
                    tracing::info!("server-closed");
                    break;
                }
            }
        }

        let _ = tokio::time::timeout(GRACEFUL_SHUTDOWN_DRAIN, async {
            while in_flight.load(Ordering::SeqCst) > 0 {
                drained.notified().await;
            }
        })
        .await;

        Ok(())
    }

    async fn handle_connection_request(
        &self,
        req: hyper::Request<Incoming>,
        remote_addr: SocketAddr,
    ) -> Result<hyper::Response<BoxBody<Bytes, std::io::Error>>, Infallible> {
        let (parts, incoming) = req.into_parts();

        let request_id = parts
            .headers
            .get(HEADER_NAME_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| format!("req-{}", self.request_counter.fetch_add(1, Ordering::SeqCst)));

        let default_host = format!("0.0.0.0:{}", self.port);
        let url = build_url(&parts.headers, &parts.uri, "http", &default_host);
        let method = parts.method.clone();

        tracing::debug!(
            request_id = %request_id,
            method = %method,
            path = url.pathname(),
            "request-received"
        );

        let request = Arc::new(Request::new(
            request_id.clone(),
            method.clone(),
            url,
            parts.headers,
            Some(remote_addr),
            incoming,
        ));

        let response = self.dispatcher.dispatch(request.clone()).await;

        // Drain any unread body before writing back, so an in-progress
        // upload the handler never read doesn't leave the connection
        // hanging on the client's remaining bytes.
        request.drain_if_unconsumed().await;

        Ok(into_hyper_response(response, &method))
    }
}

fn into_hyper_response(
    mut response: crate::response::Response,
    method: &http::Method,
) -> hyper::Response<BoxBody<Bytes, std::io::Error>> {
    let status = response.status();
    let is_head = *method == http::Method::HEAD;
    let body = if is_head { None } else { response.take_body() };

    let boxed: BoxBody<Bytes, std::io::Error> = match body {
        None => Empty::<Bytes>::new().map_err(|never: Infallible| match never {}).boxed(),
        Some(Body::Bytes(bytes)) => Full::new(bytes).map_err(|never: Infallible| match never {}).boxed(),
        Some(Body::Stream(stream)) => {
            let frames = stream.map_ok(Frame::data);
            StreamBody::new(frames).boxed()
        }
    };

    let mut builder = hyper::Response::builder().status(status);
    if let Some(headers) = builder.headers_mut() {
        *headers = std::mem::take(response.headers_mut());
    }

    builder
        .body(boxed)
        .unwrap_or_else(|_| hyper::Response::new(Empty::<Bytes>::new().map_err(|never: Infallible| match never {}).boxed()))
}
