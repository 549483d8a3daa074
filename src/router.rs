//! The Router: given a set of virtual hosts and a request, produces either a
//! matched `(route, target, params)` triple or a classified routing error.

use crate::error::Error;
use crate::request::Request;
use crate::types::ParamMap;
use crate::vhost::{HttpRoute, HttpTarget, VirtualHost};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Holds the current, atomically-swappable list of virtual hosts. An
/// `RwLock<Arc<Vec<VirtualHost>>>` gives matching requests a short read lock
/// to clone the current `Arc` snapshot, then matches against it lock-free;
/// in-flight requests always finish against the snapshot they started with
/// even if `reset_virtual_hosts` runs concurrently.
pub struct Router {
    vhosts: RwLock<Arc<Vec<VirtualHost>>>,
}

impl Router {
    pub fn new(vhosts: Vec<VirtualHost>) -> Self {
        Router { vhosts: RwLock::new(Arc::new(vhosts)) }
    }

    /// Atomically swaps in a new virtual-host list.
    pub async fn reset_virtual_hosts(&self, vhosts: Vec<VirtualHost>) {
        *self.vhosts.write().await = Arc::new(vhosts);
    }

    /// Matches `request` against the current virtual-host snapshot.
    ///
    /// Virtual hosts are tried in declared order; the first hostname match
    /// wins. If none match, the first declared virtual host is used with an
    /// empty hostname-parameter map, so an unexpected `Host` header falls
    /// through to ordinary route matching instead of failing closed. If the
    /// chosen vhost yields no route match, the result is [`Error::NotFound`].
    pub async fn match_request(&self, request: &Request) -> crate::Result<(Arc<HttpRoute>, ParamMap, ParamMap)> {
        let vhosts = self.vhosts.read().await.clone();
        let hostname = request.url().hostname();
        let pathname = request.url().pathname();

        let matched = vhosts
            .iter()
            .find_map(|vhost| vhost.match_hostname(hostname).map(|params| (vhost, params)))
            .or_else(|| vhosts.first().map(|vhost| (vhost, ParamMap::new())));

        let Some((vhost, hostname_params)) = matched else {
            return Err(Error::not_found(pathname));
        };

        let Some((route, pathname_params)) = vhost.match_pathname(pathname) else {
            return Err(Error::not_found(pathname));
        };

        Ok((route, hostname_params, pathname_params))
    }

    /// Returns the first target on `route` whose method set contains
    /// `method`, or [`Error::MethodNotAllowed`] carrying the union of every
    /// target's methods on the route.
    pub fn find_target_for_request(route: &HttpRoute, method: &http::Method) -> crate::Result<Arc<HttpTarget>> {
        route.find_target(method).cloned().ok_or_else(|| {
            let allowed_methods = route.allowed_methods().into_iter().map(|m| m.to_string()).collect();
            Error::method_not_allowed(method.to_string(), route.pattern_source().to_string(), allowed_methods)
        })
    }
}
