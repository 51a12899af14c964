use crate::core::Response;
use http::StatusCode;

/// Errors that know how to render themselves as an HTTP response.
pub trait ResponseError: std::error::Error + Send + Sync {
    /// Status code for this error. Defaults to 500.
    fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    /// Render the error as a small JSON document.
    fn error_response(&self) -> Response {
        let error_body = serde_json::json!({
            "error": self.to_string()
        });

        Response::json(self.status_code(), &error_body)
    }
}
