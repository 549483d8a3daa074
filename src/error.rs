use std::fmt;

/// The error type used throughout `kixx`.
///
/// Each variant corresponds to one of the error kinds described by the
/// routing and datastore specifications. Variants that are safe to expose on
/// the wire implement [`HttpError`]; internal/unexpected failures do not and
/// are sanitized by the transport before they leave the process.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found: {pathname}")]
    NotFound { pathname: String },

    #[error("method not allowed: {method} {pathname}")]
    MethodNotAllowed {
        method: String,
        pathname: String,
        allowed_methods: Vec<String>,
    },

    #[error("bad request: {detail}")]
    BadRequest { detail: String },

    #[error("unauthenticated: {detail}")]
    Unauthenticated { detail: String },

    #[error("forbidden: {detail}")]
    Forbidden { detail: String },

    #[error("conflict: {detail}")]
    Conflict { detail: String },

    #[error("assertion failed at {reporting_path}: {message}")]
    Assertion {
        reporting_path: String,
        message: String,
    },

    #[error("{context}")]
    Wrapped {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("internal server error")]
    Internal {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl Error {
    pub fn not_found(pathname: impl Into<String>) -> Self {
        Error::NotFound {
            pathname: pathname.into(),
        }
    }

    pub fn method_not_allowed(
        method: impl Into<String>,
        pathname: impl Into<String>,
        allowed_methods: Vec<String>,
    ) -> Self {
        Error::MethodNotAllowed {
            method: method.into(),
            pathname: pathname.into(),
            allowed_methods,
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Error::BadRequest { detail: detail.into() }
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        Error::Conflict { detail: detail.into() }
    }

    pub fn assertion(reporting_path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Assertion {
            reporting_path: reporting_path.into(),
            message: message.into(),
        }
    }

    pub fn wrap(context: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::Wrapped {
            context: context.into(),
            source: Box::new(source),
        }
    }

    pub fn internal(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::Internal { source: Box::new(source) }
    }
}

/// Extends `Result<T, impl std::error::Error>` with a fluent way to attach
/// context while converting into a [`Error::Wrapped`].
pub trait ResultExt<T> {
    fn context(self, context: &str) -> crate::Result<T>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for Result<T, E> {
    fn context(self, context: &str) -> crate::Result<T> {
        self.map_err(|e| Error::wrap(context.to_string(), e))
    }
}

/// Errors that are safe to render on the wire implement this trait; it plays
/// the role of the source object's `isHttpError` tag.
pub trait HttpError: fmt::Debug {
    fn status_code(&self) -> u16;
    fn code(&self) -> &'static str;
    fn name(&self) -> &'static str;
    fn detail(&self) -> String;
    fn allowed_methods(&self) -> Option<&[String]> {
        None
    }
    fn source_pointer(&self) -> Option<serde_json::Value> {
        None
    }
}

impl HttpError for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::MethodNotAllowed { .. } => 405,
            Error::BadRequest { .. } => 400,
            Error::Unauthenticated { .. } => 401,
            Error::Forbidden { .. } => 403,
            Error::Conflict { .. } => 409,
            Error::Assertion { .. } => 500,
            Error::Wrapped { .. } => 500,
            Error::Internal { .. } => 500,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "NOT_FOUND",
            Error::MethodNotAllowed { .. } => "METHOD_NOT_ALLOWED",
            Error::BadRequest { .. } => "BAD_REQUEST",
            Error::Unauthenticated { .. } => "UNAUTHENTICATED",
            Error::Forbidden { .. } => "FORBIDDEN",
            Error::Conflict { .. } => "CONFLICT",
            Error::Assertion { .. } => "ASSERTION_ERROR",
            Error::Wrapped { .. } => "WRAPPED_ERROR",
            Error::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "NotFoundError",
            Error::MethodNotAllowed { .. } => "MethodNotAllowedError",
            Error::BadRequest { .. } => "BadRequestError",
            Error::Unauthenticated { .. } => "UnauthenticatedError",
            Error::Forbidden { .. } => "ForbiddenError",
            Error::Conflict { .. } => "ConflictError",
            Error::Assertion { .. } => "AssertionError",
            Error::Wrapped { .. } => "WrappedError",
            Error::Internal { .. } => "InternalError",
        }
    }

    fn detail(&self) -> String {
        match self {
            // Internal failures never leak their detail onto the wire.
            Error::Internal { .. } | Error::Wrapped { .. } | Error::Assertion { .. } => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }

    fn allowed_methods(&self) -> Option<&[String]> {
        match self {
            Error::MethodNotAllowed { allowed_methods, .. } => Some(allowed_methods.as_slice()),
            _ => None,
        }
    }
}

/// Is this error one whose kind is exposable on the wire (the source
/// system's `isHttpError` tag), as opposed to an internal/unexpected error
/// that must be masked before it reaches a client?
pub fn is_http_error(err: &Error) -> bool {
    !matches!(err, Error::Internal { .. } | Error::Wrapped { .. } | Error::Assertion { .. })
}
