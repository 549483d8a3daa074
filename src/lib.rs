//! `kixx`: an HTTP application server with hierarchical virtual-host → route
//! → target dispatch, a middleware pipeline with a layered error-handling
//! cascade, and an in-memory/file-backed document datastore.
//!
//! An embedding application wires the pieces together: populate a
//! [`registry::Registry`] with middleware/handler/error-handler factories,
//! load virtual hosts with a [`config::ConfigLoader`], hand the compiled
//! [`vhost::VirtualHost`]s to a [`router::Router`], wrap it in a
//! [`dispatcher::Dispatcher`], and serve it with a [`transport::Transport`].
//! The [`datastore::DatastoreEngine`] is independent of the HTTP pipeline and
//! is typically shared through [`context::Context`].

mod constants;
pub mod config;
pub mod context;
pub mod datastore;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod pattern;
pub mod registry;
pub mod request;
pub mod response;
pub mod router;
pub mod spec;
pub mod transport;
pub mod types;
pub mod vhost;

pub use error::Error;

/// The result type used throughout `kixx`.
pub type Result<T> = std::result::Result<T, Error>;
