//! Shared application context threaded through every middleware, handler and
//! error-handler invocation (e.g. a handle to the datastore engine). Modeled
//! as a type-erased map wrapping `http::Extensions` so scoped data of
//! arbitrary types can ride alongside a request.

use http::Extensions;

#[derive(Default)]
pub struct Context {
    inner: Extensions,
}

impl Context {
    pub fn new() -> Self {
        Context { inner: Extensions::new() }
    }

    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) -> &mut Self {
        self.inner.insert(value);
        self
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.inner.get::<T>()
    }
}
