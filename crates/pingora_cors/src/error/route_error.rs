use http::Method;

/// Failure to register a route or service with the [`Router`](crate::Router).
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("invalid path template `{template}`: {reason}")]
    InvalidTemplate {
        template: String,
        reason: &'static str,
    },

    #[error("path template `{template}` did not compile: {source}")]
    Regex {
        template: String,
        #[source]
        source: regex::Error,
    },

    #[error("route {method} {path} conflicts with an existing route: {source}")]
    Conflict {
        method: Method,
        path: String,
        #[source]
        source: matchit::InsertError,
    },
}
