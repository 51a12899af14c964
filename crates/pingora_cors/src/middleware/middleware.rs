use async_trait::async_trait;
use std::sync::Arc;

use crate::core::{Handler, Request, Response};
use crate::error::WebError;

/// A link in the request chain. Call `next` to continue, or return a
/// response without calling it to stop the chain here.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(&self, req: Request, next: Arc<dyn Handler>) -> Result<Response, WebError>;
}

struct Link {
    middleware: Arc<dyn Middleware>,
    next: Arc<dyn Handler>,
}

#[async_trait]
impl Handler for Link {
    async fn handle(&self, req: Request) -> Result<Response, WebError> {
        self.middleware.handle(req, Arc::clone(&self.next)).await
    }
}

/// Wrap `endpoint` in `middlewares`; the last one registered runs outermost.
pub fn compose(middlewares: &[Arc<dyn Middleware>], endpoint: Arc<dyn Handler>) -> Arc<dyn Handler> {
    middlewares.iter().fold(endpoint, |next, middleware| {
        let link: Arc<dyn Handler> = Arc::new(Link {
            middleware: Arc::clone(middleware),
            next,
        });
        link
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Method;
    use http::StatusCode;

    struct Mark(&'static str);

    #[async_trait]
    impl Middleware for Mark {
        async fn handle(&self, req: Request, next: Arc<dyn Handler>) -> Result<Response, WebError> {
            let mut res = next.handle(req).await?;
            res.append_header("x-trace", self.0);
            Ok(res)
        }
    }

    struct Stop;

    #[async_trait]
    impl Middleware for Stop {
        async fn handle(&self, _req: Request, _next: Arc<dyn Handler>) -> Result<Response, WebError> {
            Ok(Response::empty(StatusCode::OK))
        }
    }

    struct Endpoint;

    #[async_trait]
    impl Handler for Endpoint {
        async fn handle(&self, _req: Request) -> Result<Response, WebError> {
            Ok(Response::text(StatusCode::OK, "endpoint"))
        }
    }

    #[tokio::test]
    async fn later_middleware_wraps_earlier() {
        let middlewares: Vec<Arc<dyn Middleware>> = vec![Arc::new(Mark("A")), Arc::new(Mark("B"))];
        let chain = compose(&middlewares, Arc::new(Endpoint));
        let res = chain.handle(Request::new(Method::GET, "/")).await.unwrap();
        let trace: Vec<_> = res
            .headers
            .get_all("x-trace")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        // A sits next to the endpoint, so it tags the response first.
        assert_eq!(trace, ["A", "B"]);
    }

    #[tokio::test]
    async fn middleware_can_end_the_chain() {
        let middlewares: Vec<Arc<dyn Middleware>> = vec![Arc::new(Mark("A")), Arc::new(Stop)];
        let chain = compose(&middlewares, Arc::new(Endpoint));
        let res = chain.handle(Request::new(Method::GET, "/")).await.unwrap();
        assert!(res.body.is_empty());
        assert!(!res.headers.contains_key("x-trace"));
    }
}
