//! Integration-test harness: serves a real [`kixx::dispatcher::Dispatcher`]
//! over loopback TCP and issues requests against it with a bare hyper
//! client-side handshake. Runs the accept loop through
//! `kixx::transport::Transport::serve` itself, rather than a hand-rolled
//! loop, so these tests exercise the real graceful-shutdown and
//! body-draining behavior.

use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::{Buf, Incoming};
use hyper_util::rt::TokioIo;
use kixx::dispatcher::Dispatcher;
use kixx::transport::Transport;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::oneshot;

pub struct Serve {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
}

impl Serve {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn shutdown(self) {
        let _ = self.shutdown.send(());
    }
}

/// Installs a `tracing` subscriber the first time any test calls [`serve`],
/// so `RUST_LOG=kixx=debug cargo test -- --nocapture` surfaces the
/// dispatcher's/transport's lifecycle events during a test run.
fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub async fn serve(dispatcher: Arc<Dispatcher>) -> Serve {
    init_tracing();
    let transport = Arc::new(Transport::new(dispatcher).with_port(0));
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let (ready_tx, ready_rx) = oneshot::channel();

    tokio::task::spawn(async move {
        transport.serve(shutdown_rx, Some(ready_tx)).await.unwrap();
    });

    let addr = ready_rx.await.unwrap();
    Serve { addr, shutdown: shutdown_tx }
}

/// Sends `request` (with an empty body) to `addr` over a fresh loopback
/// connection and returns the response with its body fully collected.
pub async fn send_empty(
    addr: SocketAddr,
    request: http::Request<()>,
) -> hyper::Response<Incoming> {
    let (parts, _) = request.into_parts();
    let body = Empty::<Bytes>::new().map_err(|never: std::convert::Infallible| match never {}).boxed();
    let request = hyper::Request::from_parts(parts, body);
    send(addr, request).await
}

pub async fn send_bytes(
    addr: SocketAddr,
    request: http::Request<()>,
    body: impl Into<Bytes>,
) -> hyper::Response<Incoming> {
    let (parts, _) = request.into_parts();
    let body = Full::new(body.into()).map_err(|never: std::convert::Infallible| match never {}).boxed();
    let request = hyper::Request::from_parts(parts, body);
    send(addr, request).await
}

async fn send(
    addr: SocketAddr,
    request: hyper::Request<http_body_util::combinators::BoxBody<Bytes, std::io::Error>>,
) -> hyper::Response<Incoming> {
    let stream = TcpStream::connect(addr).await.unwrap();
    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await.unwrap();
    tokio::task::spawn(async move {
        let _ = conn.await;
    });
    sender.send_request(request).await.unwrap()
}

pub async fn into_text(body: Incoming) -> String {
    let body = body.collect().await.unwrap().aggregate();
    io::read_to_string(body.reader()).unwrap()
}
