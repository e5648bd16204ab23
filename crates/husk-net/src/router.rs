//! In-process router transport
//!
//! Maps `(method, path)` pairs to handler closures. This is the
//! "application under test" side of the engine: tests register a handful
//! of routes and the engine navigates against them.

use url::Url;

use crate::{NetError, Request, Response, Transport};

/// What a route handler returns.
#[derive(Debug, Clone)]
pub struct RouteReply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub content_type: String,
    pub charset: Option<String>,
}

impl RouteReply {
    /// A `200 text/html` reply.
    pub fn html(body: &str) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.as_bytes().to_vec(),
            content_type: "text/html".into(),
            charset: Some("utf-8".into()),
        }
    }

    /// A `200 application/json` reply.
    pub fn json(value: &serde_json::Value) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: value.to_string().into_bytes(),
            content_type: "application/json".into(),
            charset: Some("utf-8".into()),
        }
    }

    /// A `302` reply pointing at `location`.
    pub fn redirect(location: &str) -> Self {
        Self {
            status: 302,
            headers: vec![("Location".into(), location.to_string())],
            body: Vec::new(),
            content_type: "text/plain".into(),
            charset: None,
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: 404,
            headers: Vec::new(),
            body: b"not found".to_vec(),
            content_type: "text/plain".into(),
            charset: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

type Handler = Box<dyn FnMut(&Request) -> RouteReply>;

struct Route {
    method: String,
    path: String,
    handler: Handler,
}

/// In-process transport backed by a route table.
///
/// Routes match on upper-cased method and exact URL path (query strings
/// are ignored for matching but available to the handler via the
/// request URL). Unmatched requests produce a 404 reply rather than an
/// error, mirroring what a real application would do.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `method` + `path`.
    pub fn route<F>(&mut self, method: &str, path: &str, handler: F) -> &mut Self
    where
        F: FnMut(&Request) -> RouteReply + 'static,
    {
        self.routes.push(Route {
            method: method.to_uppercase(),
            path: path.to_string(),
            handler: Box::new(handler),
        });
        self
    }

    /// Shorthand for a fixed HTML page under GET.
    pub fn page(&mut self, path: &str, body: &str) -> &mut Self {
        let body = body.to_string();
        self.route("GET", path, move |_| RouteReply::html(&body))
    }
}

impl Transport for Router {
    fn execute(&mut self, request: &Request) -> Result<Response, NetError> {
        let url = Url::parse(&request.url)
            .map_err(|e| NetError::InvalidUrl(format!("{}: {e}", request.url)))?;
        let path = url.path();

        let reply = match self
            .routes
            .iter_mut()
            .find(|r| r.method == request.method && r.path == path)
        {
            Some(route) => {
                tracing::trace!(method = %request.method, path, "route hit");
                (route.handler)(request)
            }
            None => {
                tracing::trace!(method = %request.method, path, "route miss");
                RouteReply::not_found()
            }
        };

        Ok(Response {
            method: request.method.clone(),
            url: request.url.clone(),
            status: reply.status,
            headers: reply.headers,
            body: reply.body,
            content_type: reply.content_type,
            charset: reply.charset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(url: &str) -> Request {
        Request::new("GET", url)
    }

    #[test]
    fn test_route_match_ignores_query() {
        let mut router = Router::new();
        router.page("/a", "<html><body>A</body></html>");

        let resp = router.execute(&get("http://test/a?x=1")).unwrap();
        assert_eq!(resp.status, 200);
        assert!(resp.body_text().contains('A'));
        assert_eq!(resp.url, "http://test/a?x=1");
    }

    #[test]
    fn test_unmatched_route_is_404() {
        let mut router = Router::new();
        let resp = router.execute(&get("http://test/nope")).unwrap();
        assert_eq!(resp.status, 404);
        assert_eq!(resp.content_type, "text/plain");
    }

    #[test]
    fn test_method_is_part_of_the_key() {
        let mut router = Router::new();
        router.route("POST", "/submit", |_| RouteReply::html("ok"));

        assert_eq!(router.execute(&get("http://test/submit")).unwrap().status, 404);
        let resp = router
            .execute(&Request::new("post", "http://test/submit"))
            .unwrap();
        assert_eq!(resp.status, 200);
    }

    #[test]
    fn test_redirect_reply_carries_location() {
        let reply = RouteReply::redirect("/next");
        assert_eq!(reply.status, 302);
        assert_eq!(reply.headers[0], ("Location".into(), "/next".into()));
    }

    #[test]
    fn test_handler_sees_request_headers() {
        let mut router = Router::new();
        router.route("GET", "/echo", |req| {
            RouteReply::html(req.header("Referer").unwrap_or("none"))
        });

        let mut req = get("http://test/echo");
        req.headers.push(("Referer".into(), "http://test/prev".into()));
        let resp = router.execute(&req).unwrap();
        assert_eq!(resp.body_text(), "http://test/prev");
    }
}
