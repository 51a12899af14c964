pub mod core;
pub mod error;
pub mod middleware;

// Re-export commonly used types at the crate root
pub use crate::core::*;
pub use error::{ResponseError, RouteError, WebError};
pub use http::StatusCode;
pub use middleware::*;

use async_trait::async_trait;
use http::Response as HttpResponse;
use std::sync::Arc;

use pingora::protocols::http::ServerSession;
use pingora::server::ShutdownWatch;
use pingora::services::listening::Service;
use pingora_core::apps::{HttpPersistentSettings, HttpServerApp, HttpServerOptions, ReusedHttpStream};
use pingora_http::ResponseHeader;

/// Router plus middleware chain, served by Pingora.
///
/// The router is frozen when the app is built, so the route table handed to
/// [`CorsMiddleware`] is the same one requests are dispatched against.
pub struct App {
    router: Arc<Router>,
    middlewares: Vec<Arc<dyn Middleware>>,
}

/// Innermost handler: route lookup and dispatch.
struct Dispatch {
    router: Arc<Router>,
}

#[async_trait]
impl Handler for Dispatch {
    async fn handle(&self, req: Request) -> Result<Response, WebError> {
        if let Some((handler, params)) = self.router.find(req.method(), req.path()) {
            return handler.handle(req.with_params(params)).await;
        }

        let mut allowed = self.router.allowed_methods(req.path());
        if *req.method() == Method::OPTIONS {
            allowed.push(Method::OPTIONS.to_string());
            allowed.sort();
            allowed.dedup();
            return Ok(Response::empty(StatusCode::NO_CONTENT)
                .header(http::header::ALLOW, allowed.join(", ")));
        }
        if !allowed.is_empty() {
            return Ok(Response::text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
                .header(http::header::ALLOW, allowed.join(", ")));
        }
        Err(error::not_found(format!("no route for {}", req.path())))
    }
}

impl App {
    pub fn new(router: Router) -> Self {
        Self {
            router: Arc::new(router),
            middlewares: Vec::new(),
        }
    }

    pub fn use_middleware<M: Middleware + 'static>(&mut self, middleware: M) {
        self.middlewares.push(Arc::new(middleware));
    }

    /// Read-only handle on the registered routes, for injection into
    /// [`CorsMiddleware`].
    pub fn route_table(&self) -> Arc<dyn RouteTable> {
        let table: Arc<Router> = Arc::clone(&self.router);
        table
    }

    /// Handle a request end-to-end through middlewares and the router.
    pub async fn handle(&self, req: Request) -> Response {
        let endpoint: Arc<dyn Handler> = Arc::new(Dispatch {
            router: Arc::clone(&self.router),
        });
        let entry = compose(&self.middlewares, endpoint);
        let mut response = entry
            .handle(req)
            .await
            .unwrap_or_else(WebError::into_response);

        finalize_response_headers(&mut response);
        response
    }

    /// Wrap the app in a Pingora listening service; add listeners before
    /// handing it to a server.
    pub fn to_service(self, name: &str) -> Service<App> {
        Service::new(name.to_string(), self)
    }
}

fn finalize_response_headers(response: &mut Response) {
    if response.headers.contains_key(http::header::CONTENT_LENGTH)
        || response.headers.contains_key(http::header::TRANSFER_ENCODING)
    {
        return;
    }
    response.set_header(http::header::CONTENT_LENGTH, response.body.len().to_string());
}

/// Request for a raw path read off the wire; paths that do not parse as a
/// URI are answered with 400 instead of being routed.
fn parse_request(method: Method, raw_path: &str) -> Result<Request, WebError> {
    Request::try_new(method, raw_path).map_err(|e| {
        tracing::debug!(path = raw_path, error = %e, "unparsable request path");
        error::bad_request(format!("invalid request path: {e}"))
    })
}

#[async_trait]
impl HttpServerApp for App {
    async fn process_new_http(
        self: &Arc<Self>,
        mut session: ServerSession,
        shutdown: &ShutdownWatch,
    ) -> Option<ReusedHttpStream> {
        if !(session.read_request().await.ok()?) {
            return None;
        }
        if *shutdown.borrow() {
            session.set_keepalive(None);
        } else {
            session.set_keepalive(Some(60));
        }

        let reqh = session.req_header();
        let path = String::from_utf8_lossy(reqh.raw_path()).to_string();
        let is_head = reqh.method == Method::HEAD;

        let res = match parse_request(reqh.method.clone(), &path) {
            Ok(mut req) => {
                for (name, value) in reqh.headers.iter() {
                    req.headers_mut().append(name.clone(), value.clone());
                }

                if !is_head {
                    let has_te = req.headers().contains_key(http::header::TRANSFER_ENCODING);
                    let has_len = req
                        .header_str(http::header::CONTENT_LENGTH)
                        .parse::<u64>()
                        .unwrap_or(0)
                        > 0;
                    if (has_te || has_len)
                        && let Ok(Some(bytes)) = session.read_request_body().await
                    {
                        req = req.with_body(bytes);
                    }
                }

                self.handle(req).await
            }
            Err(err) => {
                let mut res = err.into_response();
                finalize_response_headers(&mut res);
                res
            }
        };

        let mut builder = HttpResponse::builder().status(res.status);
        for (k, v) in res.headers.iter() {
            builder = builder.header(k, v);
        }
        let parts = match builder.body(()) {
            Ok(built) => built.into_parts().0,
            Err(e) => {
                tracing::error!(error = %e, "failed to build response header");
                return None;
            }
        };
        let resp_header: ResponseHeader = parts.into();
        if session
            .write_response_header(Box::new(resp_header))
            .await
            .is_err()
        {
            return None;
        }

        // HEAD responses carry headers only
        let body = if is_head { bytes::Bytes::new() } else { res.body };
        if session.write_response_body(body, true).await.is_err() {
            return None;
        }

        let persistent_settings = HttpPersistentSettings::for_session(&session);
        match session.finish().await {
            Ok(c) => c.map(|s| ReusedHttpStream::new(s, Some(persistent_settings))),
            Err(_) => None,
        }
    }

    fn h2_options(&self) -> Option<pingora::protocols::http::v2::server::H2Options> {
        None
    }

    fn server_options(&self) -> Option<&HttpServerOptions> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{
        ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
        ACCESS_CONTROL_EXPOSE_HEADERS, ACCESS_CONTROL_REQUEST_METHOD, ALLOW, CONTENT_LENGTH, ORIGIN,
    };

    struct Named(&'static str);

    #[async_trait]
    impl Handler for Named {
        async fn handle(&self, req: Request) -> Result<Response, WebError> {
            let id = req.param("id").unwrap_or("-");
            Ok(Response::text(StatusCode::OK, format!("{} {}", self.0, id)))
        }
    }

    fn users_app() -> App {
        let users = WebService::new("/users")
            .unwrap()
            .get("", Arc::new(Named("list")))
            .unwrap()
            .post("", Arc::new(Named("create")))
            .unwrap()
            .get("/{id}", Arc::new(Named("show")))
            .unwrap()
            .delete("/{id}", Arc::new(Named("remove")))
            .unwrap();
        let mut router = Router::new();
        router.service(users).unwrap();
        router
            .get_fn("/health", |_req| Ok(Response::text(StatusCode::OK, "up")))
            .unwrap();

        let mut app = App::new(router);
        let cors = CorsMiddleware::new(app.route_table());
        app.use_middleware(cors);
        app.use_middleware(TracingMiddleware::new());
        app
    }

    #[tokio::test]
    async fn preflight_is_answered_before_dispatch() {
        let app = users_app();
        let req = Request::new(Method::OPTIONS, "/users")
            .header(ACCESS_CONTROL_REQUEST_METHOD, "POST");

        let res = app.handle(req).await;

        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.header_str(ACCESS_CONTROL_ALLOW_METHODS), Some("OPTIONS,GET,POST"));
        assert_eq!(res.header_str(ACCESS_CONTROL_ALLOW_HEADERS), Some("Content-Type, Accept"));
        assert_eq!(res.header_str(ACCESS_CONTROL_ALLOW_ORIGIN), Some(""));
        assert_eq!(res.header_str(CONTENT_LENGTH), Some("0"));
        assert!(!res.headers.contains_key(ALLOW));
    }

    #[tokio::test]
    async fn preflight_for_item_path() {
        let app = users_app();
        let req = Request::new(Method::OPTIONS, "/users/7")
            .header(ACCESS_CONTROL_REQUEST_METHOD, "DELETE");

        let res = app.handle(req).await;
        assert_eq!(res.header_str(ACCESS_CONTROL_ALLOW_METHODS), Some("OPTIONS,GET,DELETE"));
    }

    #[tokio::test]
    async fn actual_request_reaches_handler_with_params() {
        let app = users_app();
        let res = app.handle(Request::new(Method::GET, "/users/7")).await;

        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body.as_ref(), b"show 7");
        assert_eq!(res.header_str(ACCESS_CONTROL_EXPOSE_HEADERS), Some("Content-Type, Accept"));
        assert_eq!(res.header_str(ACCESS_CONTROL_ALLOW_ORIGIN), Some(""));
        assert_eq!(res.header_str(CONTENT_LENGTH), Some("6"));
    }

    #[tokio::test]
    async fn cross_origin_request_is_untouched() {
        let app = users_app();
        let req = Request::new(Method::POST, "/users").header(ORIGIN, "https://app.example");
        let res = app.handle(req).await;

        assert_eq!(res.body.as_ref(), b"create -");
        assert!(!res.headers.contains_key(ACCESS_CONTROL_ALLOW_ORIGIN));
        assert!(!res.headers.contains_key(ACCESS_CONTROL_EXPOSE_HEADERS));
    }

    #[tokio::test]
    async fn rejected_preflight_falls_through_to_dispatch() {
        let app = users_app();
        let req = Request::new(Method::OPTIONS, "/users")
            .header(ACCESS_CONTROL_REQUEST_METHOD, "TRACE");
        let res = app.handle(req).await;

        assert_eq!(res.status, StatusCode::NO_CONTENT);
        assert_eq!(res.header_str(ALLOW), Some("GET, OPTIONS, POST"));
        assert!(!res.headers.contains_key(ACCESS_CONTROL_ALLOW_METHODS));
    }

    #[tokio::test]
    async fn wrong_method_is_405_and_unknown_path_is_404() {
        let app = users_app();

        let res = app.handle(Request::new(Method::PUT, "/users")).await;
        assert_eq!(res.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(res.header_str(ALLOW), Some("GET, POST"));

        let res = app.handle(Request::new(Method::GET, "/orders")).await;
        assert_eq!(res.status, StatusCode::NOT_FOUND);
        assert_eq!(res.header_str(http::header::CONTENT_TYPE), Some("application/json"));
        // not-found errors are still tagged on the way out
        assert_eq!(res.header_str(ACCESS_CONTROL_ALLOW_ORIGIN), Some(""));
    }

    #[tokio::test]
    async fn app_without_middleware_dispatches_directly() {
        let mut router = Router::new();
        router
            .get_fn("/health", |_req| Ok(Response::text(StatusCode::OK, "up")))
            .unwrap();
        let app = App::new(router);

        let res = app.handle(Request::new(Method::HEAD, "/health")).await;
        assert_eq!(res.status, StatusCode::OK);
        assert!(!res.headers.contains_key(ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[test]
    fn unparsable_path_is_rejected_not_routed() {
        let err = parse_request(Method::OPTIONS, "/users/<x>").unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let req = parse_request(Method::OPTIONS, "/users/7").unwrap();
        assert_eq!(req.path(), "/users/7");
    }

    #[test]
    fn route_table_reflects_registrations() {
        let app = users_app();
        let table = app.route_table();
        let roots: Vec<_> = table.services().iter().map(|s| s.root()).collect();
        assert_eq!(roots, ["/users", ""]);
        assert_eq!(compute_allowed_methods(table.as_ref(), "/health"), "OPTIONS,GET");
    }
}
