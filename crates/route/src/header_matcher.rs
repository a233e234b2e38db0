//! Request-header constraints attached to route leaves.

use http::HeaderMap;
use regex::Regex;

/// A set of per-header regex constraints.
///
/// A request satisfies the matcher only when every listed header is present
/// and its value matches the associated regex. An empty pattern therefore
/// asserts mere presence of the header.
#[derive(Debug, Default)]
pub struct HeaderMatcher {
    /// Keyed by header name.
    matches: Vec<(String, Regex)>,
}

impl HeaderMatcher {
    pub fn new(matches: Vec<(String, Regex)>) -> Self {
        Self { matches }
    }

    /// Returns true if all constraints hold for the given headers.
    pub fn matches(&self, headers: &HeaderMap) -> bool {
        self.matches.iter().all(|(name, re)| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| !v.is_empty() && re.is_match(v))
        })
    }
}
