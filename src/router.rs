//! Route registry and request dispatch.
//!
//! Routes are kept in registration order and tried one by one; the first
//! route whose method matches and whose pattern covers the whole request path
//! handles the request. There is no specificity ranking, so overlapping
//! routes must be registered most specific first.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use hyper::{Method, StatusCode};
use regex::Regex;

use crate::error::{Result, ServiceError};
use crate::health::HealthCheck;
use crate::http::{Request, Response};

/// A request handler. Handlers set the response status and body; a handler
/// that sets nothing answers `200 OK` with an empty body.
pub type Handler = Arc<dyn Fn(&Request, &mut Response) + Send + Sync>;

/// The callback every worker runs for each request it receives.
pub trait Dispatch: Send + Sync + 'static {
    fn dispatch(&self, request: &mut Request, response: &mut Response);
}

impl<F> Dispatch for F
where
    F: Fn(&mut Request, &mut Response) + Send + Sync + 'static,
{
    fn dispatch(&self, request: &mut Request, response: &mut Response) {
        self(request, response)
    }
}

#[derive(Clone)]
enum Target {
    Handler(Handler),
    Health,
}

#[derive(Clone)]
struct Route {
    method: Method,
    pattern: Regex,
    target: Target,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern.as_str())
            .field("health", &matches!(self.target, Target::Health))
            .finish()
    }
}

/// Ordered list of routes under a common path prefix.
#[derive(Clone, Debug, Default)]
pub struct Router {
    prefix: String,
    routes: Vec<Route>,
}

impl Router {
    pub fn new(prefix: impl Into<String>) -> Self {
        Router {
            prefix: prefix.into(),
            routes: Vec::new(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Appends a route.
    ///
    /// `path` is a regular expression relative to the prefix. One trailing
    /// `/` is dropped and an optional one is allowed instead, so `/items` and
    /// `/items/` register the same pattern. Capture groups in `path` are
    /// available to the handler through [`Uri::sub_match`](crate::http::Uri::sub_match).
    ///
    /// # Errors
    /// Returns `InvalidRoute` if the resulting pattern does not compile.
    pub fn add<F>(&mut self, method: Method, path: &str, handler: F) -> Result<()>
    where
        F: Fn(&Request, &mut Response) + Send + Sync + 'static,
    {
        let path = path.strip_suffix('/').unwrap_or(path);
        let pattern = format!("{}{}/?", regex::escape(&self.prefix), path);
        self.push(method, &pattern, Target::Handler(Arc::new(handler)))
    }

    /// Appends the built-in `GET <prefix>/health` route.
    pub(crate) fn add_health(&mut self) -> Result<()> {
        let pattern = format!("{}/health", regex::escape(&self.prefix));
        self.push(Method::GET, &pattern, Target::Health)
    }

    fn push(&mut self, method: Method, pattern: &str, target: Target) -> Result<()> {
        let compiled = Regex::new(&format!("^(?:{})$", pattern)).map_err(|source| {
            ServiceError::InvalidRoute {
                pattern: pattern.to_string(),
                source,
            }
        })?;

        log::debug!("Route {} {} registered", method, pattern);
        self.routes.push(Route {
            method,
            pattern: compiled,
            target,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn clear(&mut self) {
        self.routes.clear();
    }
}

/// An immutable snapshot of the routes and health probes, shared by every
/// worker while the service is serving.
pub struct Dispatcher {
    routes: Vec<Route>,
    health: HealthCheck,
}

impl Dispatcher {
    pub fn new(router: Router, health: HealthCheck) -> Self {
        Dispatcher {
            routes: router.routes,
            health,
        }
    }
}

impl Dispatch for Dispatcher {
    fn dispatch(&self, request: &mut Request, response: &mut Response) {
        for route in &self.routes {
            if route.method == *request.method() && request.uri_mut().match_pattern(&route.pattern)
            {
                match &route.target {
                    Target::Handler(handler) => handler(request, response),
                    Target::Health => self.health.respond(response),
                }
                return;
            }
        }

        response.set_code(StatusCode::NOT_FOUND);
    }
}

/// Runs `dispatch` for one request and returns the response to send.
///
/// A panic inside the dispatch callback does not unwind into the worker's
/// event loop; it is logged and answered with `500 Internal Server Error`.
pub(crate) fn dispatch_request(dispatch: &dyn Dispatch, request: &mut Request) -> Response {
    let mut response = Response::for_client(request.client());
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        dispatch.dispatch(request, &mut response)
    }));

    if outcome.is_err() {
        log::error!(
            "Handler for {} {} panicked",
            request.method(),
            request.uri().path()
        );
        response = Response::for_client(request.client());
        response.set_error(StatusCode::INTERNAL_SERVER_ERROR, "internal server error");
    }
    response
}
