use crate::core::{Handler, Request, Response};
use crate::error::WebError;
use crate::middleware::Middleware;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{Instrument, info};

/// Opens a `request` span around the rest of the chain.
///
/// The span carries `method`, `path` and `origin`, and is filled in with
/// `status`, `latency_ms` and the `cors` branch taken once those are known.
/// Register it last so it wraps the CORS filter.
#[derive(Clone, Default)]
pub struct TracingMiddleware;

impl TracingMiddleware {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Middleware for TracingMiddleware {
    async fn handle(&self, req: Request, next: Arc<dyn Handler>) -> Result<Response, WebError> {
        let span = tracing::info_span!(
            "request",
            method = req.method().as_str(),
            path = req.path(),
            origin = req.header_str(http::header::ORIGIN),
            cors = tracing::field::Empty,
            status = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        );
        let span_for_record = span.clone();

        async move {
            let start_time = std::time::Instant::now();
            let result = next.handle(req).await;
            let status = match &result {
                Ok(res) => res.status,
                Err(err) => err.status_code(),
            };

            span_for_record.record("status", status.as_u16());
            span_for_record.record("latency_ms", start_time.elapsed().as_millis() as u64);
            info!("request completed");
            result
        }
        .instrument(span)
        .await
    }
}
