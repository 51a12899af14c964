use crate::core::service::{Route, WebService, join_path};
use crate::core::{Method, Request, Response};
use crate::error::{RouteError, WebError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, req: Request) -> Result<Response, WebError>;
}

/// Adapter so plain closures can be registered as handlers.
pub struct ResultClosure<F>
where
    F: Fn(Request) -> Result<Response, WebError> + Send + Sync + 'static,
{
    closure: F,
}

impl<F> ResultClosure<F>
where
    F: Fn(Request) -> Result<Response, WebError> + Send + Sync + 'static,
{
    pub fn new(closure: F) -> Self {
        Self { closure }
    }
}

#[async_trait]
impl<F> Handler for ResultClosure<F>
where
    F: Fn(Request) -> Result<Response, WebError> + Send + Sync + 'static,
{
    async fn handle(&self, req: Request) -> Result<Response, WebError> {
        (self.closure)(req)
    }
}

/// Read-only view of every registered service and its routes.
///
/// The CORS filter receives one of these at construction time and scans it
/// when answering preflight requests. Implementations must be safe to read
/// from many requests at once; [`Router`] is frozen behind an `Arc` by the
/// [`App`](crate::App) before serving starts.
pub trait RouteTable: Send + Sync {
    /// Services in registration order.
    fn services(&self) -> &[WebService];
}

pub struct Router {
    by_method: HashMap<String, matchit::Router<Arc<dyn Handler>>>,
    services: Vec<WebService>,
    root_service: Option<usize>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            by_method: HashMap::new(),
            services: Vec::new(),
            root_service: None,
        }
    }

    /// Register a single route. It is recorded under an implicit root
    /// service, created on first use.
    pub fn add<S: Into<String>>(
        &mut self,
        method: Method,
        path: S,
        handler: Arc<dyn Handler>,
    ) -> Result<(), RouteError> {
        let route = Route::new(method, path, handler)?;
        let full = join_path("", route.path());

        if let Some(idx) = self.root_service {
            insert(&mut self.by_method, route.method(), &full, Arc::clone(route.handler()))?;
            self.services[idx].push_route(route);
        } else {
            let mut root = WebService::new("")?;
            insert(&mut self.by_method, route.method(), &full, Arc::clone(route.handler()))?;
            root.push_route(route);
            self.root_service = Some(self.services.len());
            self.services.push(root);
        }
        Ok(())
    }

    /// Register a whole service. Either every route is added or none is.
    pub fn service(&mut self, service: WebService) -> Result<(), RouteError> {
        let mut inserted: Vec<(Method, String)> = Vec::with_capacity(service.routes().len());
        for route in service.routes() {
            let full = service.full_path(route.path());
            if let Err(e) = insert(&mut self.by_method, route.method(), &full, Arc::clone(route.handler())) {
                for (method, path) in inserted {
                    if let Some(router) = self.by_method.get_mut(method.as_str()) {
                        router.remove(path);
                    }
                }
                return Err(e);
            }
            inserted.push((route.method().clone(), full));
        }
        tracing::debug!(
            root = service.root(),
            routes = service.routes().len(),
            "service registered"
        );
        self.services.push(service);
        Ok(())
    }

    pub fn get<S: Into<String>>(&mut self, path: S, handler: Arc<dyn Handler>) -> Result<(), RouteError> {
        self.add(Method::GET, path, handler)
    }

    pub fn get_fn<S, F>(&mut self, path: S, handler: F) -> Result<(), RouteError>
    where
        S: Into<String>,
        F: Fn(Request) -> Result<Response, WebError> + Send + Sync + 'static,
    {
        self.add(Method::GET, path, Arc::new(ResultClosure::new(handler)))
    }

    pub fn post<S: Into<String>>(&mut self, path: S, handler: Arc<dyn Handler>) -> Result<(), RouteError> {
        self.add(Method::POST, path, handler)
    }

    pub fn post_fn<S, F>(&mut self, path: S, handler: F) -> Result<(), RouteError>
    where
        S: Into<String>,
        F: Fn(Request) -> Result<Response, WebError> + Send + Sync + 'static,
    {
        self.add(Method::POST, path, Arc::new(ResultClosure::new(handler)))
    }

    pub fn find(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(Arc<dyn Handler>, HashMap<String, String>)> {
        if let Some(found) = lookup(&self.by_method, method, path) {
            return Some(found);
        }

        // HEAD falls back to GET when no explicit HEAD route exists
        if *method == Method::HEAD {
            return lookup(&self.by_method, &Method::GET, path);
        }

        None
    }

    /// Methods with a route matching `path`, sorted for stable `Allow` headers.
    pub fn allowed_methods(&self, path: &str) -> Vec<String> {
        let mut methods: Vec<String> = self
            .by_method
            .iter()
            .filter(|(_, r)| r.at(path).is_ok())
            .map(|(m, _)| m.clone())
            .collect();
        methods.sort();
        methods
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteTable for Router {
    fn services(&self) -> &[WebService] {
        &self.services
    }
}

fn insert(
    by_method: &mut HashMap<String, matchit::Router<Arc<dyn Handler>>>,
    method: &Method,
    path: &str,
    handler: Arc<dyn Handler>,
) -> Result<(), RouteError> {
    by_method
        .entry(method.as_str().to_string())
        .or_default()
        .insert(path, handler)
        .map_err(|source| RouteError::Conflict {
            method: method.clone(),
            path: path.to_string(),
            source,
        })
}

fn lookup(
    by_method: &HashMap<String, matchit::Router<Arc<dyn Handler>>>,
    method: &Method,
    path: &str,
) -> Option<(Arc<dyn Handler>, HashMap<String, String>)> {
    let m = by_method.get(method.as_str())?.at(path).ok()?;
    let params = m
        .params
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Some((Arc::clone(m.value), params))
}
