use std::collections::HashMap;

/// A parameter map. Insertion order is not significant. Once
/// attached to a request it is handed out to handlers only as an immutable
/// borrow — there is no setter reachable outside this crate, which is how
/// "defensively copied and made immutable before handlers observe them" is
/// enforced at the type level rather than at runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamMap {
    inner: HashMap<String, String>,
}

impl ParamMap {
    pub fn new() -> Self {
        ParamMap { inner: HashMap::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ParamMap {
            inner: HashMap::with_capacity(capacity),
        }
    }

    pub(crate) fn insert(&mut self, key: String, value: String) {
        self.inner.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
