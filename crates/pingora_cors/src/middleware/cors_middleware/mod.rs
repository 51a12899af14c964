use async_trait::async_trait;
use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_EXPOSE_HEADERS, ACCESS_CONTROL_REQUEST_HEADERS,
    ACCESS_CONTROL_REQUEST_METHOD, ORIGIN,
};
use http::{HeaderValue, Method, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use super::Middleware;
use crate::core::{Handler, Request, Response, RouteTable};
use crate::error::WebError;


/// Methods a preflight may ask for.
pub const ALLOWED_REQUEST_METHODS: &str = "GET PUT POST DELETE HEAD OPTIONS PATCH";

/// Header names a preflight may ask for, lowercase.
pub const ALLOWED_REQUEST_HEADERS: &str = "accept content-type";

/// Singular request-header name read by legacy clients of this filter.
/// Browsers send the plural `Access-Control-Request-Headers`.
pub const ACCESS_CONTROL_REQUEST_HEADER: &str = "access-control-request-header";

const CONTENT_TYPE_ACCEPT: &str = "Content-Type, Accept";

/// Configuration for the CORS filter
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Emit `Access-Control-Expose-Headers` on actual requests (default: true)
    pub expose_headers: bool,
    /// Emit `Access-Control-Allow-Credentials: true` (default: false)
    pub cookies_allowed: bool,
    /// Validate requested methods and headers as exact tokens instead of
    /// substrings of the allow-lists (default: false)
    pub strict_matching: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            expose_headers: true,
            cookies_allowed: false,
            strict_matching: false,
        }
    }
}

impl CorsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from JSON, e.g. `{"cookies_allowed": true}`. Missing fields keep their defaults.
    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn expose_headers(mut self, enabled: bool) -> Self {
        self.expose_headers = enabled;
        self
    }

    pub fn cookies_allowed(mut self, allowed: bool) -> Self {
        self.cookies_allowed = allowed;
        self
    }

    pub fn strict_matching(mut self, strict: bool) -> Self {
        self.strict_matching = strict;
        self
    }
}

/// Which branch of the filter a request takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorsDecision {
    /// `Origin` is set: forward untouched.
    PassThrough,
    /// Not a preflight: tag the response and forward.
    Actual,
    /// `OPTIONS` with `Access-Control-Request-Method`.
    Preflight,
    /// `OPTIONS` without a requested method: answered empty, chain not advanced.
    Ignore,
}

impl CorsDecision {
    /// Decide the branch from request headers alone, first match wins.
    pub fn classify(req: &Request) -> Self {
        if has_value(req, ORIGIN) {
            return Self::PassThrough;
        }
        if req.method() != Method::OPTIONS {
            return Self::Actual;
        }
        if has_value(req, ACCESS_CONTROL_REQUEST_METHOD) {
            return Self::Preflight;
        }
        Self::Ignore
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PassThrough => "pass_through",
            Self::Actual => "actual",
            Self::Preflight => "preflight",
            Self::Ignore => "ignore",
        }
    }
}

/// Why a preflight was handed to the rest of the chain instead of answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreflightRejection {
    Method,
    Header,
}

/// Cross-origin filter answering preflight requests from the route table.
///
/// The filter never fails: anything it does not accept is forwarded to the
/// next handler without CORS headers and the browser makes the final call.
///
/// ```ignore
/// let app = App::new(router);
/// let cors = CorsMiddleware::with_config(CorsConfig::new(), app.route_table());
/// app.use_middleware(cors);
/// ```
pub struct CorsMiddleware {
    config: CorsConfig,
    routes: Arc<dyn RouteTable>,
}

impl CorsMiddleware {
    pub fn new(routes: Arc<dyn RouteTable>) -> Self {
        Self {
            config: CorsConfig::default(),
            routes,
        }
    }

    pub fn with_config(config: CorsConfig, routes: Arc<dyn RouteTable>) -> Self {
        Self { config, routes }
    }

    pub fn config(&self) -> &CorsConfig {
        &self.config
    }

    fn is_valid_request_method(&self, method: &str) -> bool {
        if self.config.strict_matching {
            ALLOWED_REQUEST_METHODS.split(' ').any(|m| m == method)
        } else {
            ALLOWED_REQUEST_METHODS.contains(method)
        }
    }

    fn is_valid_request_header(&self, header: &str) -> bool {
        let header = header.to_ascii_lowercase();
        if self.config.strict_matching {
            header
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .all(|h| ALLOWED_REQUEST_HEADERS.split(' ').any(|a| a == h))
        } else {
            ALLOWED_REQUEST_HEADERS.contains(header.as_str())
        }
    }

    /// Requested headers, if any. Strict mode also reads the plural header browsers send.
    fn requested_headers<'r>(&self, req: &'r Request) -> Option<&'r HeaderValue> {
        let singular = req
            .headers()
            .get(ACCESS_CONTROL_REQUEST_HEADER)
            .filter(|v| !v.is_empty());
        if singular.is_some() || !self.config.strict_matching {
            return singular;
        }
        req.headers()
            .get(ACCESS_CONTROL_REQUEST_HEADERS)
            .filter(|v| !v.is_empty())
    }

    pub fn validate_preflight(&self, req: &Request) -> Result<(), PreflightRejection> {
        let method = req
            .headers()
            .get(ACCESS_CONTROL_REQUEST_METHOD)
            .and_then(|v| v.to_str().ok())
            .filter(|m| !m.is_empty())
            .ok_or(PreflightRejection::Method)?;
        if !self.is_valid_request_method(method) {
            return Err(PreflightRejection::Method);
        }

        if let Some(value) = self.requested_headers(req) {
            let valid = value
                .to_str()
                .map(|h| self.is_valid_request_header(h))
                .unwrap_or(false);
            if !valid {
                return Err(PreflightRejection::Header);
            }
        }
        Ok(())
    }

    /// `Access-Control-Allow-Methods` value for `path`.
    pub fn allowed_methods(&self, path: &str) -> String {
        compute_allowed_methods(self.routes.as_ref(), path)
    }

    /// Headers are written as defaults: a value the handler already set wins,
    /// as if the filter had written first and the handler overwritten it.
    fn tag_actual(&self, res: &mut Response, origin: HeaderValue) {
        if self.config.expose_headers {
            res.headers
                .entry(ACCESS_CONTROL_EXPOSE_HEADERS)
                .or_insert(HeaderValue::from_static(CONTENT_TYPE_ACCEPT));
        }
        res.headers.entry(ACCESS_CONTROL_ALLOW_ORIGIN).or_insert(origin);
        self.tag_credentials(res);
    }

    fn tag_credentials(&self, res: &mut Response) {
        if self.config.cookies_allowed {
            res.headers
                .entry(ACCESS_CONTROL_ALLOW_CREDENTIALS)
                .or_insert(HeaderValue::from_static("true"));
        }
    }

    fn preflight_response(&self, req: &Request) -> Response {
        let mut res = Response::empty(StatusCode::OK);
        res.append_header(ACCESS_CONTROL_ALLOW_METHODS, self.allowed_methods(req.path()));
        res.append_header(ACCESS_CONTROL_ALLOW_HEADERS, CONTENT_TYPE_ACCEPT);
        res.append_header(ACCESS_CONTROL_ALLOW_ORIGIN, origin_value(req));
        self.tag_credentials(&mut res);
        res
    }
}

#[async_trait]
impl Middleware for CorsMiddleware {
    async fn handle(&self, req: Request, next: Arc<dyn Handler>) -> Result<Response, WebError> {
        let decision = CorsDecision::classify(&req);
        tracing::Span::current().record("cors", decision.as_str());

        match decision {
            CorsDecision::PassThrough => {
                debug!(path = req.path(), "origin present, forwarding untouched");
                next.handle(req).await
            }
            CorsDecision::Actual => {
                // Re-read after classification; always empty on this branch.
                let origin = origin_value(&req);
                // Downstream errors still carry the CORS headers.
                let mut res = match next.handle(req).await {
                    Ok(res) => res,
                    Err(err) => err.into_response(),
                };
                self.tag_actual(&mut res, origin);
                Ok(res)
            }
            CorsDecision::Preflight => match self.validate_preflight(&req) {
                Ok(()) => {
                    let res = self.preflight_response(&req);
                    debug!(
                        path = req.path(),
                        allow_methods = res.header_str(ACCESS_CONTROL_ALLOW_METHODS).unwrap_or(""),
                        "preflight answered"
                    );
                    Ok(res)
                }
                Err(reason) => {
                    debug!(path = req.path(), ?reason, "preflight rejected, forwarding");
                    next.handle(req).await
                }
            },
            CorsDecision::Ignore => {
                debug!(path = req.path(), "OPTIONS without requested method, nothing to do");
                Ok(Response::empty(StatusCode::OK))
            }
        }
    }
}

/// Scan the route table for methods registered at `path`.
///
/// Each service whose expression matches `path` hands its remainder to its
/// routes; a route counts when its own remainder is empty or `/`. The result
/// starts with `OPTIONS` and lists methods in registration order without
/// deduplication.
pub fn compute_allowed_methods(table: &dyn RouteTable, path: &str) -> String {
    let mut value = String::from("OPTIONS");
    for service in table.services() {
        let Some(tail) = service.path_expr().remainder(path) else {
            continue;
        };
        for route in service.routes() {
            if let Some(rest) = route.path_expr().remainder(tail)
                && (rest.is_empty() || rest == "/")
            {
                value.push(',');
                value.push_str(route.method().as_str());
            }
        }
    }
    value
}

fn has_value(req: &Request, name: http::HeaderName) -> bool {
    req.headers().get(name).is_some_and(|v| !v.is_empty())
}

fn origin_value(req: &Request) -> HeaderValue {
    req.headers()
        .get(ORIGIN)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(""))
}
