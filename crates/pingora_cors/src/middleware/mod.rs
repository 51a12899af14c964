#![allow(clippy::module_inception)]
pub mod cors_middleware;
pub mod middleware;
pub mod tracing_middleware;

pub use cors_middleware::{CorsConfig, CorsDecision, CorsMiddleware, compute_allowed_methods};
pub use middleware::{Middleware, compose};
pub use tracing_middleware::TracingMiddleware;
