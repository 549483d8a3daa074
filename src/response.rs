//! The mutable response builder middleware and handlers operate on.

use bytes::Bytes;
use futures::Stream;
use http::{HeaderMap, HeaderValue};
use std::pin::Pin;

/// A streaming body source: any `Stream` of byte chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send + 'static>>;

/// The three shapes a response body can take.
pub enum Body {
    Bytes(Bytes),
    Stream(BodyStream),
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Body::Bytes(b) => write!(f, "Body::Bytes({} bytes)", b.len()),
            Body::Stream(_) => write!(f, "Body::Stream(..)"),
        }
    }
}

/// A cookie to be serialized onto a `Set-Cookie` header.
#[derive(Debug, Clone)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub max_age: Option<i64>,
    pub path: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl Cookie {
    /// A cookie defaulting to `Secure; HttpOnly; SameSite=Lax`.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Cookie {
            name: name.into(),
            value: value.into(),
            max_age: None,
            path: None,
            secure: true,
            http_only: true,
            same_site: SameSite::Lax,
        }
    }

    fn to_header_value(&self) -> String {
        let mut s = format!("{}={}", self.name, self.value);
        if let Some(max_age) = self.max_age {
            s.push_str(&format!("; Max-Age={max_age}"));
        }
        if let Some(path) = &self.path {
            s.push_str(&format!("; Path={path}"));
        }
        if self.secure {
            s.push_str("; Secure");
        }
        if self.http_only {
            s.push_str("; HttpOnly");
        }
        s.push_str(match self.same_site {
            SameSite::Strict => "; SameSite=Strict",
            SameSite::Lax => "; SameSite=Lax",
            SameSite::None => "; SameSite=None",
        });
        s
    }
}

/// A mutable response, threaded through the middleware chain and ultimately
/// written to the wire by the transport.
#[derive(Debug)]
pub struct Response {
    status: u16,
    headers: HeaderMap,
    body: Option<Body>,
    props: serde_json::Value,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Response {
            status,
            headers: HeaderMap::new(),
            body: None,
            props: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) -> &mut Self {
        self.status = status;
        self
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    pub fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }

    pub fn set_body(&mut self, body: Body) -> &mut Self {
        self.body = Some(body);
        self
    }

    pub fn props(&self) -> &serde_json::Value {
        &self.props
    }

    /// Deep-merges `value` into the existing props object. The object is
    /// otherwise immutable from outside this module: only an immutable
    /// getter is exposed alongside this merge operation.
    pub fn merge_props(&mut self, value: serde_json::Value) -> &mut Self {
        deep_merge(&mut self.props, value);
        self
    }

    pub fn append_cookie(&mut self, cookie: &Cookie) -> &mut Self {
        if let Ok(value) = HeaderValue::from_str(&cookie.to_header_value()) {
            self.headers.append(http::header::SET_COOKIE, value);
        }
        self
    }

    /// Builds a JSON response. The body gets a trailing newline and
    /// `content-length` is the UTF-8 byte count of the serialized payload.
    pub fn json<T: serde::Serialize>(status: u16, value: &T) -> crate::Result<Response> {
        let mut payload = serde_json::to_vec(value).map_err(|e| crate::Error::internal(e))?;
        payload.push(b'\n');

        let mut res = Response::new(status);
        res.headers
            .insert(http::header::CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
        res.headers
            .insert(http::header::CONTENT_LENGTH, HeaderValue::from_str(&payload.len().to_string()).unwrap());
        res.body = Some(Body::Bytes(Bytes::from(payload)));
        Ok(res)
    }

    pub fn html(status: u16, body: impl Into<String>) -> Response {
        let body = body.into();
        let len = body.len();
        let mut res = Response::new(status);
        res.headers
            .insert(http::header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
        res.headers
            .insert(http::header::CONTENT_LENGTH, HeaderValue::from_str(&len.to_string()).unwrap());
        res.body = Some(Body::Bytes(Bytes::from(body)));
        res
    }

    pub fn redirect(location: impl AsRef<str>, permanent: bool) -> Response {
        let mut res = Response::new(if permanent { 308 } else { 307 });
        if let Ok(value) = HeaderValue::from_str(location.as_ref()) {
            res.headers.insert(http::header::LOCATION, value);
        }
        res
    }

    /// A `304 Not Modified` response: no body, `content-length: 0`.
    pub fn not_modified() -> Response {
        let mut res = Response::new(304);
        res.headers
            .insert(http::header::CONTENT_LENGTH, HeaderValue::from_static("0"));
        res
    }

    pub fn streaming(status: u16, content_type: &str, stream: BodyStream) -> Response {
        let mut res = Response::new(status);
        if let Ok(value) = HeaderValue::from_str(content_type) {
            res.headers.insert(http::header::CONTENT_TYPE, value);
        }
        res.body = Some(Body::Stream(stream));
        res
    }
}

fn deep_merge(base: &mut serde_json::Value, incoming: serde_json::Value) {
    match (base, incoming) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(incoming_map)) => {
            for (k, v) in incoming_map {
                match base_map.get_mut(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        base_map.insert(k, v);
                    }
                }
            }
        }
        (base_slot, incoming_value) => {
            *base_slot = incoming_value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_response_has_trailing_newline_and_byte_length() {
        let res = Response::json(200, &serde_json::json!({"a": "é"})).unwrap();
        let Body::Bytes(bytes) = res.body().unwrap() else {
            panic!("expected bytes body")
        };
        assert!(bytes.ends_with(b"\n"));
        let content_length: usize = res
            .headers()
            .get(http::header::CONTENT_LENGTH)
            .unwrap()
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(content_length, bytes.len());
    }

    #[test]
    fn not_modified_has_zero_length_and_no_body() {
        let res = Response::not_modified();
        assert_eq!(res.status(), 304);
        assert_eq!(res.headers().get(http::header::CONTENT_LENGTH).unwrap(), "0");
        assert!(res.body().is_none());
    }

    #[test]
    fn props_deep_merge() {
        let mut res = Response::new(200);
        res.merge_props(serde_json::json!({"a": {"b": 1}}));
        res.merge_props(serde_json::json!({"a": {"c": 2}}));
        assert_eq!(res.props(), &serde_json::json!({"a": {"b": 1, "c": 2}}));
    }

    #[test]
    fn cookie_defaults_are_secure_http_only_lax() {
        let mut res = Response::new(200);
        res.append_cookie(&Cookie::new("sid", "abc"));
        let value = res.headers().get(http::header::SET_COOKIE).unwrap().to_str().unwrap();
        assert_eq!(value, "sid=abc; Secure; HttpOnly; SameSite=Lax");
    }
}
