//! The request wrapper handed to handlers.
//!
//! [`Request`] is a cheaply clonable view over the head of the incoming
//! request plus the connection metadata the core needs: the peer address and
//! a cancellation token observed by the chain runtime. Query-string helpers
//! live here so handlers rarely need to parse the URI themselves.

use http::request::Parts;
use http::{HeaderMap, Method, Uri, Version};
use percent_encoding::percent_decode_str;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// An incoming request head with connection metadata.
#[derive(Clone)]
pub struct Request {
    inner: Arc<Inner>,
}

struct Inner {
    parts: Parts,
    remote_addr: Option<SocketAddr>,
    cancellation: CancellationToken,
}

impl Request {
    pub fn new(parts: Parts) -> Self {
        Self::with_connection(parts, None, CancellationToken::new())
    }

    pub fn with_connection(
        parts: Parts,
        remote_addr: Option<SocketAddr>,
        cancellation: CancellationToken,
    ) -> Self {
        Self { inner: Arc::new(Inner { parts, remote_addr, cancellation }) }
    }

    pub fn method(&self) -> &Method {
        &self.inner.parts.method
    }

    pub fn uri(&self) -> &Uri {
        &self.inner.parts.uri
    }

    /// The percent-encoded request path.
    pub fn path(&self) -> &str {
        self.inner.parts.uri.path()
    }

    pub fn version(&self) -> Version {
        self.inner.parts.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.inner.parts.headers
    }

    /// The value of a request header as a string, or empty when absent or
    /// not valid UTF-8.
    pub fn header(&self, name: &str) -> &str {
        self.inner
            .parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    /// The cancellation token signalled when the client goes away. The chain
    /// runtime checks it between handlers.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.inner.cancellation
    }

    /// The remote IP address, taken from the `X-Real-IP` header, then
    /// `X-Forwarded-For`, then the peer address of the connection.
    pub fn remote_addr(&self) -> String {
        let addr = self.header("x-real-ip");
        if !addr.is_empty() {
            return addr.to_owned();
        }
        let addr = self.header("x-forwarded-for");
        if !addr.is_empty() {
            return addr.to_owned();
        }
        self.inner
            .remote_addr
            .map(|a| a.ip().to_string())
            .unwrap_or_default()
    }

    /// The value of the given URL parameter, or empty when absent. Repeated
    /// parameters yield the first value.
    pub fn query(&self, name: &str) -> String {
        self.query_values(name).into_iter().next().unwrap_or_default()
    }

    /// Like [`query`](Self::query), falling back to `default` when absent.
    pub fn query_or(&self, name: &str, default: &str) -> String {
        let v = self.query(name);
        if v.is_empty() {
            return default.to_owned();
        }
        v
    }

    /// The query value with surrounding whitespace removed.
    pub fn query_trim(&self, name: &str) -> String {
        self.query(name).trim().to_owned()
    }

    /// All values of a repeated URL parameter.
    pub fn query_strings(&self, name: &str) -> Vec<String> {
        self.query_values(name)
    }

    /// The query value percent-decoded one extra time, for values that were
    /// themselves escaped before being put in the URL.
    pub fn query_unescape(&self, name: &str) -> String {
        let v = self.query(name);
        percent_decode_str(&v).decode_utf8().map(|s| s.into_owned()).unwrap_or(v)
    }

    /// The query value parsed as a bool; absent or unparsable is false.
    pub fn query_bool(&self, name: &str) -> bool {
        self.query(name).parse().unwrap_or_default()
    }

    /// The query value parsed as an integer; absent or unparsable is 0.
    pub fn query_int(&self, name: &str) -> i64 {
        self.query(name).parse().unwrap_or_default()
    }

    /// The query value parsed as a float; absent or unparsable is 0.0.
    pub fn query_f64(&self, name: &str) -> f64 {
        self.query(name).parse().unwrap_or_default()
    }

    fn query_values(&self, name: &str) -> Vec<String> {
        let Some(query) = self.inner.parts.uri.query() else {
            return Vec::new();
        };

        let mut values = Vec::new();
        for pair in query.split('&') {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            if key == name {
                values.push(decode_query_component(value));
            }
        }
        values
    }
}

/// Decodes one query component: `+` means space, then percent-decoding.
fn decode_query_component(raw: &str) -> String {
    let plus_decoded = raw.replace('+', " ");
    percent_decode_str(&plus_decoded)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or(plus_decoded)
}

impl From<http::Request<()>> for Request {
    fn from(request: http::Request<()>) -> Self {
        let (parts, ()) = request.into_parts();
        Self::new(parts)
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", self.method())
            .field("uri", self.uri())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str) -> Request {
        http::Request::builder().uri(uri).body(()).unwrap().into()
    }

    #[test]
    fn test_query() {
        let req = request("/search?q=ember&lang=en&lang=de");
        assert_eq!(req.query("q"), "ember");
        assert_eq!(req.query("lang"), "en");
        assert_eq!(req.query_strings("lang"), vec!["en".to_string(), "de".to_string()]);
        assert_eq!(req.query("missing"), "");
        assert_eq!(req.query_or("missing", "fallback"), "fallback");
    }

    #[test]
    fn test_query_decoding() {
        let req = request("/search?q=hello+world&name=%E4%BD%A0%E5%A5%BD");
        assert_eq!(req.query("q"), "hello world");
        assert_eq!(req.query("name"), "你好");
    }

    #[test]
    fn test_query_conversions() {
        let req = request("/page?n=42&ratio=2.5&ok=true&bad=x");
        assert_eq!(req.query_int("n"), 42);
        assert_eq!(req.query_f64("ratio"), 2.5);
        assert!(req.query_bool("ok"));
        assert!(!req.query_bool("bad"));
        assert_eq!(req.query_int("missing"), 0);
    }

    #[test]
    fn test_query_trim_and_unescape() {
        let req = request("/q?padded=+x+&double=a%2520b");
        assert_eq!(req.query_trim("padded"), "x");
        // One decode happens in query(); unescape applies a second one.
        assert_eq!(req.query("double"), "a%20b");
        assert_eq!(req.query_unescape("double"), "a b");
    }

    #[test]
    fn test_remote_addr_prefers_forwarding_headers() {
        let req: Request = http::Request::builder()
            .uri("/")
            .header("X-Forwarded-For", "203.0.113.7")
            .body(())
            .unwrap()
            .into();
        assert_eq!(req.remote_addr(), "203.0.113.7");

        let req: Request = http::Request::builder()
            .uri("/")
            .header("X-Real-IP", "198.51.100.1")
            .header("X-Forwarded-For", "203.0.113.7")
            .body(())
            .unwrap()
            .into();
        assert_eq!(req.remote_addr(), "198.51.100.1");

        let parts = http::Request::builder().uri("/").body(()).unwrap().into_parts().0;
        let req = Request::with_connection(
            parts,
            Some("192.0.2.9:4123".parse().unwrap()),
            CancellationToken::new(),
        );
        assert_eq!(req.remote_addr(), "192.0.2.9");
    }
}
