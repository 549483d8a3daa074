//! End-to-end scenarios: driving a real [`kixx::transport::Transport`] over
//! loopback TCP for the routing/middleware scenarios, and the datastore
//! engine directly for the persistence/query scenarios.

mod support;

use bytes::Bytes;
use http::{HeaderName, HeaderValue};
use kixx::context::Context;
use kixx::dispatcher::Dispatcher;
use kixx::registry::{MiddlewareCallable, MiddlewareOutcome, Registry};
use kixx::response::Body;
use kixx::router::Router;
use kixx::spec::{MethodsConfig, RouteConfig, TargetConfig, VHostConfig, VirtualHostSpec};
use kixx::spec::MiddlewareConfig;
use std::sync::Arc;

fn ok_handler_factory() -> kixx::registry::MiddlewareFactory {
    Arc::new(|_options| {
        let callable: MiddlewareCallable = Arc::new(|_ctx, _req, mut res| {
            Box::pin(async move {
                res.set_status(200);
                res.set_body(Body::Bytes(Bytes::from_static(b"OK")));
                Ok(MiddlewareOutcome::Continue(res))
            })
        });
        callable
    })
}

fn trace_middleware_factory(tag: &'static str) -> kixx::registry::MiddlewareFactory {
    Arc::new(move |_options| {
        let callable: MiddlewareCallable = Arc::new(move |_ctx, _req, mut res| {
            Box::pin(async move {
                res.headers_mut().append(HeaderName::from_static("x-trace"), HeaderValue::from_static(tag));
                Ok(MiddlewareOutcome::Continue(res))
            })
        });
        callable
    })
}

fn trace_handler_factory(tag: &'static str) -> kixx::registry::MiddlewareFactory {
    Arc::new(move |_options| {
        let callable: MiddlewareCallable = Arc::new(move |_ctx, _req, mut res| {
            Box::pin(async move {
                res.headers_mut().append(HeaderName::from_static("x-trace"), HeaderValue::from_static(tag));
                res.set_status(200);
                Ok(MiddlewareOutcome::Continue(res))
            })
        });
        callable
    })
}

fn single_route_vhost_config() -> VHostConfig {
    VHostConfig {
        name: Some("v".to_string()),
        hostname: Some("example.com".to_string()),
        pattern: None,
        routes: vec![RouteConfig {
            name: Some("users".to_string()),
            pattern: "/users/:id".to_string(),
            inbound_middleware: vec![],
            outbound_middleware: vec![],
            error_handlers: vec![],
            routes: None,
            targets: Some(vec![TargetConfig {
                name: "get".to_string(),
                methods: MethodsConfig::List(vec!["GET".to_string()]),
                handlers: vec![MiddlewareConfig::Name("h".to_string())],
                error_handlers: vec![],
            }]),
        }],
    }
}

async fn dispatcher_for(registry: Registry, vhost_config: VHostConfig) -> Arc<Dispatcher> {
    let mut spec = VirtualHostSpec::validate_and_create(vhost_config, 0).unwrap();
    spec.assign_middleware(&registry).unwrap();
    let vhost = spec.to_virtual_host().unwrap();
    let router = Arc::new(Router::new(vec![vhost]));
    Arc::new(Dispatcher::new(router, Arc::new(Context::new())))
}

fn request(method: &str, addr: std::net::SocketAddr, path: &str, forwarded_host: &str) -> http::Request<()> {
    http::Request::builder()
        .method(method)
        .uri(format!("http://{addr}{path}"))
        .header("x-forwarded-host", forwarded_host)
        .body(())
        .unwrap()
}

#[tokio::test]
async fn matched_route_returns_200_with_pathname_param() {
    let mut registry = Registry::new();
    registry.register_handler("h", ok_handler_factory()).unwrap();

    let dispatcher = dispatcher_for(registry, single_route_vhost_config()).await;
    let serve = support::serve(dispatcher).await;

    let req = request("GET", serve.addr(), "/users/42", "example.com");
    let response = support::send_empty(serve.addr(), req).await;
    assert_eq!(response.status(), 200);
    let body = support::into_text(response.into_body()).await;
    assert_eq!(body, "OK");

    serve.shutdown();
}

#[tokio::test]
async fn wrong_method_returns_405_with_allow_header_and_json_error() {
    let mut registry = Registry::new();
    registry.register_handler("h", ok_handler_factory()).unwrap();

    let dispatcher = dispatcher_for(registry, single_route_vhost_config()).await;
    let serve = support::serve(dispatcher).await;

    let req = request("POST", serve.addr(), "/users/42", "example.com");
    let response = support::send_empty(serve.addr(), req).await;
    assert_eq!(response.status(), 405);
    assert_eq!(response.headers().get(http::header::ALLOW).unwrap(), "GET");

    let body = support::into_text(response.into_body()).await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["errors"][0]["status"], 405);
    assert_eq!(json["errors"][0]["code"], "METHOD_NOT_ALLOWED");

    serve.shutdown();
}

#[tokio::test]
async fn unknown_path_returns_404_json_error() {
    let mut registry = Registry::new();
    registry.register_handler("h", ok_handler_factory()).unwrap();

    let dispatcher = dispatcher_for(registry, single_route_vhost_config()).await;
    let serve = support::serve(dispatcher).await;

    let req = request("GET", serve.addr(), "/unknown", "example.com");
    let response = support::send_empty(serve.addr(), req).await;
    assert_eq!(response.status(), 404);

    let body = support::into_text(response.into_body()).await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["errors"][0]["code"], "NOT_FOUND");

    serve.shutdown();
}

#[tokio::test]
async fn nested_route_flattens_pattern_and_runs_inbound_then_handler() {
    let mut registry = Registry::new();
    registry.register_middleware("mw1", trace_middleware_factory("mw1")).unwrap();
    registry.register_handler("h1", trace_handler_factory("h1")).unwrap();

    let vhost_config = VHostConfig {
        name: Some("v".to_string()),
        hostname: Some("example.com".to_string()),
        pattern: None,
        routes: vec![RouteConfig {
            name: Some("api".to_string()),
            pattern: "/api".to_string(),
            inbound_middleware: vec![MiddlewareConfig::Name("mw1".to_string())],
            outbound_middleware: vec![],
            error_handlers: vec![],
            routes: Some(vec![RouteConfig {
                name: Some("x".to_string()),
                pattern: "/v1/x".to_string(),
                inbound_middleware: vec![],
                outbound_middleware: vec![],
                error_handlers: vec![],
                routes: None,
                targets: Some(vec![TargetConfig {
                    name: "get".to_string(),
                    methods: MethodsConfig::List(vec!["GET".to_string()]),
                    handlers: vec![MiddlewareConfig::Name("h1".to_string())],
                    error_handlers: vec![],
                }]),
            }]),
            targets: None,
        }],
    };

    let dispatcher = dispatcher_for(registry, vhost_config).await;
    let serve = support::serve(dispatcher).await;

    let req = request("GET", serve.addr(), "/api/v1/x", "example.com");
    let response = support::send_empty(serve.addr(), req).await;
    assert_eq!(response.status(), 200);

    let trace: Vec<&str> = response
        .headers()
        .get_all("x-trace")
        .iter()
        .map(|v| v.to_str().unwrap())
        .collect();
    assert_eq!(trace, vec!["mw1", "h1"]);

    serve.shutdown();
}

#[tokio::test]
async fn set_item_persists_file_and_conflicts_on_stale_revision() {
    let dir = tempfile::tempdir().unwrap();
    let engine = kixx::datastore::DatastoreEngine::new(dir.path());
    engine.load().await.unwrap();

    let created = engine.set_item("u:1", serde_json::json!({"name": "a"})).await.unwrap();
    assert_eq!(created, serde_json::json!({"_rev": 0, "name": "a"}));

    let contents = tokio::fs::read_to_string(dir.path().join("u%3A1.json")).await.unwrap();
    assert_eq!(serde_json::from_str::<serde_json::Value>(&contents).unwrap(), created);

    let updated = engine
        .update_item("u:1", |current| {
            let mut doc = current.unwrap();
            doc["name"] = serde_json::json!("b");
            doc
        })
        .await
        .unwrap();
    assert_eq!(updated, serde_json::json!({"_rev": 1, "name": "b"}));

    let conflict = engine.set_item("u:1", serde_json::json!({"_rev": 0, "name": "c"})).await;
    assert!(matches!(conflict, Err(kixx::Error::Conflict { .. })));
}

#[tokio::test]
async fn view_query_groups_by_emitted_key_ordered_with_documents() {
    let dir = tempfile::tempdir().unwrap();
    let engine = kixx::datastore::DatastoreEngine::new(dir.path());
    engine.load().await.unwrap();

    engine.set_item("u:1", serde_json::json!({"type": "A"})).await.unwrap();
    engine.set_item("u:2", serde_json::json!({"type": "B"})).await.unwrap();
    engine.set_item("u:3", serde_json::json!({"type": "A"})).await.unwrap();

    let view: kixx::datastore::ViewMap = Arc::new(|document, emit| {
        if let Some(type_) = document.get("type").and_then(|v| v.as_str()) {
            emit(type_.to_string(), serde_json::Value::Null);
        }
    });
    engine.set_view("byType", view).await;

    let options = kixx::datastore::QueryOptions {
        key: Some("A".to_string()),
        inclusive_start_index: 0,
        limit: 10,
        include_documents: true,
        ..Default::default()
    };
    let result = engine.query_view("byType", &options).await.unwrap();

    let mut document_keys: Vec<_> = result.items.iter().map(|i| i.document_key.clone()).collect();
    document_keys.sort();
    assert_eq!(document_keys, vec!["u:1".to_string(), "u:3".to_string()]);
    assert!(result.items.iter().all(|i| i.document.is_some()));
}

#[tokio::test]
async fn head_request_has_same_headers_as_get_but_no_body() {
    let mut registry = Registry::new();
    registry.register_handler("h", ok_handler_factory()).unwrap();

    let dispatcher = dispatcher_for(registry, single_route_vhost_config()).await;
    let serve = support::serve(dispatcher).await;

    let get_req = request("GET", serve.addr(), "/users/42", "example.com");
    let get_response = support::send_empty(serve.addr(), get_req).await;
    assert_eq!(get_response.status(), 200);

    let head_req = request("HEAD", serve.addr(), "/users/42", "example.com");
    let head_response = support::send_empty(serve.addr(), head_req).await;
    assert_eq!(head_response.status(), 200);

    let body = support::into_text(head_response.into_body()).await;
    assert!(body.is_empty());

    serve.shutdown();
}

#[tokio::test]
async fn handler_reads_json_body_bearer_token_and_sets_cookie() {
    let echo_handler: kixx::registry::MiddlewareFactory = Arc::new(|_options| {
        let callable: MiddlewareCallable = Arc::new(|_ctx, req, _res| {
            Box::pin(async move {
                let payload: serde_json::Value = req.json().await?;
                let token = req.bearer_token().unwrap_or_default();

                let mut res = kixx::response::Response::json(
                    200,
                    &serde_json::json!({"echo": payload, "token": token}),
                )?;
                res.append_cookie(&kixx::response::Cookie::new("sid", "abc123"));
                Ok(MiddlewareOutcome::Continue(res))
            })
        });
        callable
    });

    let mut registry = Registry::new();
    registry.register_handler("echo", echo_handler).unwrap();

    let vhost_config = VHostConfig {
        name: Some("v".to_string()),
        hostname: Some("example.com".to_string()),
        pattern: None,
        routes: vec![RouteConfig {
            name: Some("echo".to_string()),
            pattern: "/echo".to_string(),
            inbound_middleware: vec![],
            outbound_middleware: vec![],
            error_handlers: vec![],
            routes: None,
            targets: Some(vec![TargetConfig {
                name: "post".to_string(),
                methods: MethodsConfig::List(vec!["POST".to_string()]),
                handlers: vec![MiddlewareConfig::Name("echo".to_string())],
                error_handlers: vec![],
            }]),
        }],
    };

    let dispatcher = dispatcher_for(registry, vhost_config).await;
    let serve = support::serve(dispatcher).await;

    let req = http::Request::builder()
        .method("POST")
        .uri(format!("http://{}/echo", serve.addr()))
        .header("x-forwarded-host", "example.com")
        .header("authorization", "Bearer xyz")
        .body(())
        .unwrap();
    let response = support::send_bytes(serve.addr(), req, Bytes::from_static(br#"{"a":1}"#)).await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers().get(http::header::SET_COOKIE).unwrap(), "sid=abc123; Secure; HttpOnly; SameSite=Lax");

    let body = support::into_text(response.into_body()).await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["echo"]["a"], 1);
    assert_eq!(json["token"], "xyz");

    serve.shutdown();
}
