//! Path-based request dispatch.
//!
//! A [`Router`] is built once at startup and then shared read-only by every
//! session, so `route` takes `&self` and touches no mutable state.

use serde::Deserialize;

use crate::http::request::{Method, Request};
use crate::http::response::Response;

/// A route handler. Plain functions keep the table `Send + Sync` for free.
pub type Handler = fn(&Request) -> Response;

/// What to answer when a known path is requested with an unregistered method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodPolicy {
    /// `405 Method Not Allowed` with an `Allow` header.
    #[default]
    NotAllowed,
    /// The same `404 Not Found` as an unknown path.
    NotFound,
}

struct Route {
    method: Method,
    path: String,
    handler: Handler,
}

pub struct Router {
    routes: Vec<Route>,
    method_policy: MethodPolicy,
}

impl Router {
    /// An empty table: every request is a miss.
    pub fn new(method_policy: MethodPolicy) -> Self {
        Self {
            routes: Vec::new(),
            method_policy,
        }
    }

    /// The built-in table: `GET /hello` and `GET /headers`.
    pub fn with_default_routes(method_policy: MethodPolicy) -> Self {
        Self::new(method_policy)
            .add(Method::GET, "/hello", hello)
            .add(Method::GET, "/headers", echo_headers)
    }

    /// Registers `handler` for an exact `(method, path)` pair.
    ///
    /// A later registration of the same pair replaces the earlier one.
    pub fn add(mut self, method: Method, path: impl Into<String>, handler: Handler) -> Self {
        let path = path.into();
        match self
            .routes
            .iter_mut()
            .find(|r| r.method == method && r.path == path)
        {
            Some(existing) => existing.handler = handler,
            None => self.routes.push(Route { method, path, handler }),
        }
        self
    }

    /// Maps a request to its response.
    ///
    /// The path must match a registered route byte for byte; query strings
    /// are not stripped.
    pub fn route(&self, request: &Request) -> Response {
        let mut allowed = Vec::new();

        for route in self.routes.iter().filter(|r| r.path == request.path) {
            if route.method == request.method {
                return (route.handler)(request);
            }
            allowed.push(route.method.clone());
        }

        if allowed.is_empty() {
            return Response::not_found();
        }

        match self.method_policy {
            MethodPolicy::NotAllowed => Response::method_not_allowed(&allowed),
            MethodPolicy::NotFound => Response::not_found(),
        }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field(
                "routes",
                &self
                    .routes
                    .iter()
                    .map(|r| format!("{} {}", r.method, r.path))
                    .collect::<Vec<_>>(),
            )
            .field("method_policy", &self.method_policy)
            .finish()
    }
}

/// `GET /hello`
pub fn hello(_request: &Request) -> Response {
    Response::ok("hello\n")
}

/// `GET /headers`: one `Name: Value` line per request header, in arrival order.
pub fn echo_headers(request: &Request) -> Response {
    let mut body = String::new();
    for (name, value) in request.headers.iter() {
        body.push_str(name);
        body.push_str(": ");
        body.push_str(value);
        body.push('\n');
    }
    Response::ok(body)
}
