use std::sync::Arc;

use http::Method;

use crate::core::path_expr::PathExpression;
use crate::core::router::Handler;
use crate::error::RouteError;

/// A single method + path registration inside a [`WebService`].
pub struct Route {
    method: Method,
    path: String,
    path_expr: PathExpression,
    handler: Arc<dyn Handler>,
}

impl Route {
    pub(crate) fn new<S: Into<String>>(
        method: Method,
        sub_path: S,
        handler: Arc<dyn Handler>,
    ) -> Result<Self, RouteError> {
        let path = normalize(&sub_path.into());
        let path_expr = PathExpression::compile(path.clone())?;
        Ok(Self {
            method,
            path,
            path_expr,
            handler,
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path relative to the owning service's root.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn path_expr(&self) -> &PathExpression {
        &self.path_expr
    }

    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .finish()
    }
}

/// A group of routes sharing a root path, e.g. everything under `/users`.
///
/// ```ignore
/// let users = WebService::new("/users")?
///     .get("", list_users)?
///     .post("", create_user)?
///     .get("/{id}", show_user)?;
/// router.service(users)?;
/// ```
#[derive(Debug)]
pub struct WebService {
    root: String,
    path_expr: PathExpression,
    routes: Vec<Route>,
}

impl WebService {
    pub fn new<S: Into<String>>(root: S) -> Result<Self, RouteError> {
        let root = normalize(&root.into());
        let path_expr = PathExpression::compile(root.clone())?;
        Ok(Self {
            root,
            path_expr,
            routes: Vec::new(),
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn path_expr(&self) -> &PathExpression {
        &self.path_expr
    }

    /// Routes in registration order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Full path of a route as the dispatcher sees it.
    pub fn full_path(&self, sub_path: &str) -> String {
        join_path(&self.root, sub_path)
    }

    pub fn add_route<S: Into<String>>(
        &mut self,
        method: Method,
        sub_path: S,
        handler: Arc<dyn Handler>,
    ) -> Result<&mut Self, RouteError> {
        self.routes.push(Route::new(method, sub_path, handler)?);
        Ok(self)
    }

    pub(crate) fn push_route(&mut self, route: Route) {
        self.routes.push(route);
    }

    pub fn route<S: Into<String>>(
        mut self,
        method: Method,
        sub_path: S,
        handler: Arc<dyn Handler>,
    ) -> Result<Self, RouteError> {
        self.add_route(method, sub_path, handler)?;
        Ok(self)
    }

    pub fn get<S: Into<String>>(self, sub_path: S, h: Arc<dyn Handler>) -> Result<Self, RouteError> {
        self.route(Method::GET, sub_path, h)
    }

    pub fn post<S: Into<String>>(self, sub_path: S, h: Arc<dyn Handler>) -> Result<Self, RouteError> {
        self.route(Method::POST, sub_path, h)
    }

    pub fn put<S: Into<String>>(self, sub_path: S, h: Arc<dyn Handler>) -> Result<Self, RouteError> {
        self.route(Method::PUT, sub_path, h)
    }

    pub fn patch<S: Into<String>>(self, sub_path: S, h: Arc<dyn Handler>) -> Result<Self, RouteError> {
        self.route(Method::PATCH, sub_path, h)
    }

    pub fn delete<S: Into<String>>(self, sub_path: S, h: Arc<dyn Handler>) -> Result<Self, RouteError> {
        self.route(Method::DELETE, sub_path, h)
    }

    pub fn head<S: Into<String>>(self, sub_path: S, h: Arc<dyn Handler>) -> Result<Self, RouteError> {
        self.route(Method::HEAD, sub_path, h)
    }
}

/// Dispatcher path for `sub_path` under `root`; the empty join is `/`.
pub(crate) fn join_path(root: &str, sub_path: &str) -> String {
    let joined = format!("{}{}", root, normalize(sub_path));
    if joined.is_empty() {
        "/".to_string()
    } else {
        joined
    }
}

/// Leading slash, no trailing slash; `""` and `"/"` both become `""`.
fn normalize(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Request, Response};
    use crate::error::WebError;
    use async_trait::async_trait;
    use http::StatusCode;

    struct Noop;

    #[async_trait]
    impl Handler for Noop {
        async fn handle(&self, _req: Request) -> Result<Response, WebError> {
            Ok(Response::empty(StatusCode::NO_CONTENT))
        }
    }

    #[test]
    fn routes_keep_registration_order() {
        let ws = WebService::new("/users/")
            .unwrap()
            .get("", Arc::new(Noop))
            .unwrap()
            .post("/", Arc::new(Noop))
            .unwrap()
            .delete("/{id}", Arc::new(Noop))
            .unwrap();

        assert_eq!(ws.root(), "/users");
        let methods: Vec<_> = ws.routes().iter().map(|r| r.method().as_str()).collect();
        assert_eq!(methods, ["GET", "POST", "DELETE"]);
        assert_eq!(ws.routes()[1].path(), "");
        assert_eq!(ws.full_path(ws.routes()[2].path()), "/users/{id}");
    }

    #[test]
    fn root_service_full_paths() {
        let ws = WebService::new("/").unwrap();
        assert_eq!(ws.root(), "");
        assert_eq!(ws.full_path(""), "/");
        assert_eq!(ws.full_path("health"), "/health");
    }

    #[test]
    fn bad_sub_path_is_reported() {
        let err = WebService::new("/users")
            .unwrap()
            .get("/{}", Arc::new(Noop))
            .unwrap_err();
        assert!(err.to_string().contains("empty parameter name"));
    }
}
