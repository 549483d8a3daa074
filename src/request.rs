//! The immutable request wrapper handlers and middleware observe.

use crate::error::Error;
use crate::types::ParamMap;
use bytes::Bytes;
use http::{HeaderMap, Method};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use url::Url;

/// A parsed request URL: hostname, pathname, and query parameters, built
/// honoring `x-forwarded-proto`/`x-forwarded-host`.
#[derive(Debug, Clone)]
pub struct RequestUrl {
    url: Url,
}

impl RequestUrl {
    pub fn hostname(&self) -> &str {
        self.url.host_str().unwrap_or("")
    }

    pub fn pathname(&self) -> &str {
        self.url.path()
    }

    pub fn query_params(&self) -> HashMap<String, String> {
        self.url.query_pairs().into_owned().collect()
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

/// A handle for reading the request body exactly once. Subsequent reads
/// return the buffered bytes from the first read.
struct BodyHandle {
    incoming: Mutex<Option<Incoming>>,
    buffered: Mutex<Option<Bytes>>,
    consumed: AtomicBool,
}

/// The immutable wrapper `kixx` hands to middleware and handlers.
///
/// `hostname_params`/`pathname_params` use [`OnceLock`] rather than plain
/// fields: the router needs to attach them after the request is already
/// shared behind an `Arc`, so the write-once-then-immutable contract is
/// enforced at the type level instead of by a runtime freeze.
pub struct Request {
    id: String,
    method: Method,
    url: RequestUrl,
    headers: HeaderMap,
    remote_addr: Option<SocketAddr>,
    body: BodyHandle,
    hostname_params: OnceLock<ParamMap>,
    pathname_params: OnceLock<ParamMap>,
}

impl Request {
    pub(crate) fn new(
        id: String,
        method: Method,
        url: RequestUrl,
        headers: HeaderMap,
        remote_addr: Option<SocketAddr>,
        incoming: Incoming,
    ) -> Self {
        Request {
            id,
            method,
            url,
            headers,
            remote_addr,
            body: BodyHandle {
                incoming: Mutex::new(Some(incoming)),
                buffered: Mutex::new(None),
                consumed: AtomicBool::new(false),
            },
            hostname_params: OnceLock::new(),
            pathname_params: OnceLock::new(),
        }
    }

    /// Builds a request with no live connection, useful for router/dispatcher
    /// tests that never touch the body.
    #[cfg(test)]
    pub(crate) fn new_for_test(id: String, method: Method, url: RequestUrl) -> Self {
        Request {
            id,
            method,
            url,
            headers: HeaderMap::new(),
            remote_addr: None,
            body: BodyHandle {
                incoming: Mutex::new(None),
                buffered: Mutex::new(Some(Bytes::new())),
                consumed: AtomicBool::new(true),
            },
            hostname_params: OnceLock::new(),
            pathname_params: OnceLock::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &RequestUrl {
        &self.url
    }

    /// Headers are exposed via [`http::HeaderMap`], which already performs
    /// case-insensitive lookups.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn hostname_params(&self) -> ParamMap {
        self.hostname_params.get().cloned().unwrap_or_default()
    }

    pub fn pathname_params(&self) -> ParamMap {
        self.pathname_params.get().cloned().unwrap_or_default()
    }

    /// The only way to populate parameter maps on a request; restricted to
    /// the crate so that handlers always observe immutable, already-frozen
    /// copies. Takes `&self` since the router attaches parameters after the
    /// request is already shared behind an `Arc`; each `OnceLock` can only
    /// ever be set once per request.
    pub(crate) fn set_params(&self, hostname_params: ParamMap, pathname_params: ParamMap) {
        let _ = self.hostname_params.set(hostname_params);
        let _ = self.pathname_params.set(pathname_params);
    }

    /// Drains and discards the request body if no middleware or handler ever
    /// read it, so that an aborted upload doesn't leave the connection
    /// waiting on unread bytes before the response is written.
    pub(crate) async fn drain_if_unconsumed(&self) {
        if self.body_consumed() {
            return;
        }
        let incoming = self.body.incoming.lock().unwrap().take();
        if let Some(incoming) = incoming {
            self.body.consumed.store(true, Ordering::SeqCst);
            let _ = incoming.collect().await;
        }
    }

    /// Returns the full body as bytes, buffering it on first access so
    /// repeated calls (e.g. from multiple middleware) are cheap.
    pub async fn bytes(&self) -> crate::Result<Bytes> {
        {
            let buffered = self.body.buffered.lock().unwrap();
            if let Some(bytes) = buffered.as_ref() {
                return Ok(bytes.clone());
            }
        }

        let incoming = self
            .body
            .incoming
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| Error::bad_request("request body has already been consumed"))?;

        self.body.consumed.store(true, Ordering::SeqCst);

        let collected = incoming
            .collect()
            .await
            .map_err(|e| Error::bad_request(format!("failed to read request body: {e}")))?;
        let bytes = collected.to_bytes();

        *self.body.buffered.lock().unwrap() = Some(bytes.clone());
        Ok(bytes)
    }

    pub fn body_consumed(&self) -> bool {
        self.body.consumed.load(Ordering::SeqCst)
    }

    /// Buffers the body and parses it as JSON.
    pub async fn json<T: serde::de::DeserializeOwned>(&self) -> crate::Result<T> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| Error::bad_request(format!("invalid JSON body: {e}")))
    }

    /// Buffers the body and parses it as `application/x-www-form-urlencoded`.
    pub async fn form(&self) -> crate::Result<HashMap<String, String>> {
        let bytes = self.bytes().await?;
        Ok(url::form_urlencoded::parse(&bytes).into_owned().collect())
    }

    /// Parses the `cookie` header per RFC 6265.
    pub fn cookies(&self) -> HashMap<String, String> {
        let mut out = HashMap::new();
        for header_value in self.headers.get_all(http::header::COOKIE) {
            let Ok(s) = header_value.to_str() else { continue };
            for pair in s.split(';') {
                let pair = pair.trim();
                if pair.is_empty() {
                    continue;
                }
                if let Some((name, value)) = pair.split_once('=') {
                    out.insert(name.trim().to_string(), value.trim().to_string());
                }
            }
        }
        out
    }

    /// Extracts a bearer token from the `authorization` header,
    /// scheme-agnostically (i.e. trims any leading `Bearer ` case-insensitively).
    pub fn bearer_token(&self) -> Option<String> {
        let value = self.headers.get(http::header::AUTHORIZATION)?.to_str().ok()?;
        let mut parts = value.splitn(2, ' ');
        let scheme = parts.next()?;
        let token = parts.next()?;
        if scheme.eq_ignore_ascii_case("bearer") {
            Some(token.trim().to_string())
        } else {
            None
        }
    }
}

pub(crate) fn build_url(
    headers: &HeaderMap,
    uri: &http::Uri,
    default_scheme: &str,
    default_host: &str,
) -> RequestUrl {
    let scheme = headers
        .get(crate::constants::HEADER_NAME_FORWARDED_PROTO)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(default_scheme);

    let host = headers
        .get(crate::constants::HEADER_NAME_FORWARDED_HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .unwrap_or(default_host);

    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let full = format!("{scheme}://{host}{path_and_query}");
    let url = Url::parse(&full).unwrap_or_else(|_| Url::parse(&format!("{scheme}://{host}/")).unwrap());

    RequestUrl { url }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn builds_url_from_forwarded_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(
            crate::constants::HEADER_NAME_FORWARDED_PROTO,
            HeaderValue::from_static("https"),
        );
        headers.insert(
            crate::constants::HEADER_NAME_FORWARDED_HOST,
            HeaderValue::from_static("example.com"),
        );
        let uri: http::Uri = "/users/42?x=1".parse().unwrap();
        let url = build_url(&headers, &uri, "http", "localhost:8080");
        assert_eq!(url.hostname(), "example.com");
        assert_eq!(url.pathname(), "/users/42");
        assert_eq!(url.query_params().get("x").map(String::as_str), Some("1"));
        assert!(url.as_str().starts_with("https://"));
    }
}
