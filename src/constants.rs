/// The fixed set of HTTP methods a target's `methods: "*"` shorthand expands
/// to.
pub(crate) const ALL_TARGET_METHODS: [http::Method; 6] = [
    http::Method::GET,
    http::Method::HEAD,
    http::Method::POST,
    http::Method::PUT,
    http::Method::PATCH,
    http::Method::DELETE,
];

pub(crate) const HEADER_NAME_REQUEST_ID: &str = "x-request-id";
pub(crate) const HEADER_NAME_FORWARDED_PROTO: &str = "x-forwarded-proto";
pub(crate) const HEADER_NAME_FORWARDED_HOST: &str = "x-forwarded-host";

pub(crate) const DEFAULT_PORT: u16 = 8080;

/// Graceful-shutdown drain window.
pub(crate) const GRACEFUL_SHUTDOWN_DRAIN: std::time::Duration = std::time::Duration::from_secs(3);

/// The lowest and highest possible string keys, used as the default
/// `startKey`/`endKey` bounds for datastore range queries.
pub(crate) const KEY_RANGE_START: &str = "\u{0000}";
pub(crate) const KEY_RANGE_END: &str = "\u{ffff}";
