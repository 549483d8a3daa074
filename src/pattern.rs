//! Pattern compiler for hostname and pathname matching.
//!
//! A pattern is either the catch-all `"*"`, or a sequence of `/`-delimited
//! segments where a segment spelled `:name` captures into the parameter map.
//! The same compiler serves both pathnames and (pre-reversed) hostnames.

use crate::error::{Error, ResultExt};
use crate::types::ParamMap;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref PARAM_RE: Regex = Regex::new(r"(?s)(?::([A-Za-z_][A-Za-z0-9_]*))|(?:\*)").unwrap();
}

/// A compiled, immutable matcher. Safe to invoke concurrently from any
/// number of threads since it only ever reads its own `Regex`.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    catch_all: bool,
    regex: Option<Regex>,
    param_names: Vec<String>,
}

impl Pattern {
    /// Compiles `pattern`. Fails with [`Error::Assertion`] if the pattern
    /// cannot be turned into a valid regular expression.
    pub fn compile(pattern: &str) -> crate::Result<Pattern> {
        if pattern == "*" {
            return Ok(Pattern {
                source: pattern.to_string(),
                catch_all: true,
                regex: None,
                param_names: Vec::new(),
            });
        }

        let mut regex_str = String::with_capacity(pattern.len() + 8);
        regex_str.push_str("(?s)^");
        let mut param_names = Vec::new();
        let mut pos = 0usize;

        for caps in PARAM_RE.captures_iter(pattern) {
            let whole = caps.get(0).unwrap();
            regex_str.push_str(&regex::escape(&pattern[pos..whole.start()]));

            if whole.as_str() == "*" {
                regex_str.push_str("(.*)");
                param_names.push("*".to_string());
            } else {
                regex_str.push_str("([^/]+)");
                param_names.push(caps.get(1).unwrap().as_str().to_string());
            }

            pos = whole.end();
        }
        regex_str.push_str(&regex::escape(&pattern[pos..]));
        regex_str.push('$');

        let regex = Regex::new(&regex_str).context("could not compile pattern into a regular expression")?;

        Ok(Pattern {
            source: pattern.to_string(),
            catch_all: false,
            regex: Some(regex),
            param_names,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Attempts to match `input`, returning the captured parameter map on
    /// success.
    pub fn matches(&self, input: &str) -> Option<ParamMap> {
        if self.catch_all {
            return Some(ParamMap::new());
        }

        let regex = self.regex.as_ref().expect("non catch-all pattern always has a regex");
        let caps = regex.captures(input)?;

        let mut params = ParamMap::with_capacity(self.param_names.len());
        for (idx, name) in self.param_names.iter().enumerate() {
            if let Some(m) = caps.get(idx + 1) {
                params.insert(name.clone(), m.as_str().to_string());
            }
        }
        Some(params)
    }
}

/// Reverses a hostname's dot-segments so that `www.example.com` is compared
/// as `com.example.www`, putting the least-specific label first so ordinary
/// prefix/suffix pattern matching can express "most specific wins".
pub fn reverse_hostname(hostname: &str) -> String {
    hostname.split('.').rev().collect::<Vec<_>>().join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catch_all_matches_anything() {
        let p = Pattern::compile("*").unwrap();
        let params = p.matches("/anything/at/all").unwrap();
        assert!(params.is_empty());
    }

    #[test]
    fn compiles_named_params() {
        let p = Pattern::compile("/users/:id").unwrap();
        let params = p.matches("/users/42").unwrap();
        assert_eq!(params.get("id"), Some("42"));
        assert!(p.matches("/users/42/extra").is_none());
    }

    #[test]
    fn rejects_partial_matches() {
        let p = Pattern::compile("/users/:id").unwrap();
        assert!(p.matches("/users/").is_none());
    }

    #[test]
    fn reverses_hostname_segments() {
        assert_eq!(reverse_hostname("www.example.com"), "com.example.www");
    }

    #[test]
    fn hostname_pattern_reuses_path_compiler() {
        let p = Pattern::compile(&reverse_hostname("*.example.com")).unwrap();
        let input = reverse_hostname("api.example.com");
        assert!(p.matches(&input).is_some());

        let other = reverse_hostname("example.org");
        assert!(p.matches(&other).is_none());
    }
}
