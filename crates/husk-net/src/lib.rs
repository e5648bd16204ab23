//! husk networking
//!
//! Request/response model and the transport seam the engine drives.
//! There is no real network here: a [`Transport`] is an in-process
//! request executor, typically a [`Router`] wired up by the test.

mod router;

pub use router::{RouteReply, Router};
pub use url::Url;

/// An outgoing request, as handed to a [`Transport`].
#[derive(Debug, Clone)]
pub struct Request {
    /// Upper-cased HTTP method.
    pub method: String,
    /// Absolute URL.
    pub url: String,
    /// Ordered, case-preserving headers.
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            method: method.to_uppercase(),
            url: url.to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Case-insensitive header lookup (first match wins).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A completed response.
///
/// Immutable once built; the engine never reuses one across navigations.
#[derive(Debug, Clone)]
pub struct Response {
    /// Method of the request that produced this response.
    pub method: String,
    /// Final URL after any transport-level rewriting.
    pub url: String,
    pub status: u16,
    /// Ordered, case-preserving headers.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Declared content type, without parameters (e.g. `text/html`).
    pub content_type: String,
    pub charset: Option<String>,
}

impl Response {
    /// Case-insensitive header lookup (first match wins).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether this response carries an HTML document.
    pub fn is_html(&self) -> bool {
        matches!(
            self.content_type.as_str(),
            "text/html" | "application/xhtml+xml"
        )
    }

    /// Whether this response carries a JSON payload.
    pub fn is_json(&self) -> bool {
        self.content_type == "application/json" || self.content_type.ends_with("+json")
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    /// Decode the body as text.
    ///
    /// Only UTF-8 (and subsets of it) are handled; anything else is
    /// decoded lossily, which is fine for a test double.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// In-process request executor.
///
/// The engine owns exactly one of these and routes every navigation,
/// redirect hop, and RPC round trip through it.
pub trait Transport {
    fn execute(&mut self, request: &Request) -> Result<Response, NetError>;
}

/// Transport error
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("handler error: {0}")]
    Handler(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_response() -> Response {
        Response {
            method: "GET".into(),
            url: "http://test/".into(),
            status: 200,
            headers: vec![
                ("Content-Type".into(), "text/html".into()),
                ("X-Frame".into(), "deny".into()),
            ],
            body: b"<html></html>".to_vec(),
            content_type: "text/html".into(),
            charset: Some("utf-8".into()),
        }
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let resp = sample_response();
        assert_eq!(resp.header("content-type"), Some("text/html"));
        assert_eq!(resp.header("X-FRAME"), Some("deny"));
        assert_eq!(resp.header("missing"), None);
    }

    #[test]
    fn test_content_type_classification() {
        let mut resp = sample_response();
        assert!(resp.is_html());
        assert!(!resp.is_json());

        resp.content_type = "application/json".into();
        assert!(resp.is_json());
        assert!(!resp.is_html());

        resp.content_type = "application/problem+json".into();
        assert!(resp.is_json());
    }

    #[test]
    fn test_redirect_range() {
        let mut resp = sample_response();
        for status in [300, 301, 302, 307, 399] {
            resp.status = status;
            assert!(resp.is_redirect(), "{status} should be a redirect");
        }
        for status in [200, 299, 400, 404] {
            resp.status = status;
            assert!(!resp.is_redirect());
        }
    }
}
