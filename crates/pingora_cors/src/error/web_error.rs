use super::ResponseError;
use crate::core::Response;

/// Error type flowing through handlers and middlewares.
///
/// Wraps any [`ResponseError`]; the app turns it into a response once the
/// chain has unwound, so middlewares such as the CORS filter never need to
/// inspect it.
#[derive(Debug)]
pub struct WebError {
    inner: Box<dyn ResponseError>,
}

impl WebError {
    #[track_caller]
    pub fn new<T: ResponseError + 'static>(err: T) -> Self {
        Self {
            inner: Box::new(err),
        }
    }

    pub fn as_response_error(&self) -> &dyn ResponseError {
        &*self.inner
    }

    pub fn status_code(&self) -> http::StatusCode {
        self.inner.status_code()
    }

    pub fn into_response(self) -> Response {
        tracing::error!(
            status_code = %self.inner.status_code(),
            error = %self.inner,
            "request failed",
        );

        self.inner.error_response()
    }
}

impl std::fmt::Display for WebError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for WebError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.inner.as_ref())
    }
}

impl From<serde_json::Error> for WebError {
    #[track_caller]
    fn from(err: serde_json::Error) -> Self {
        Self::new(err)
    }
}

impl From<super::SimpleError> for WebError {
    #[track_caller]
    fn from(err: super::SimpleError) -> Self {
        Self::new(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{SimpleError, not_found};
    use http::StatusCode;

    #[test]
    fn simple_error_keeps_status_and_message() {
        let err: WebError =
            SimpleError::new(StatusCode::BAD_REQUEST, "bad origin".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "bad origin");
    }

    #[test]
    fn into_response_renders_json_body() {
        let res = not_found("no route for /missing").into_response();
        assert_eq!(res.status, StatusCode::NOT_FOUND);
        assert_eq!(res.header_str(http::header::CONTENT_TYPE), Some("application/json"));
        let body: serde_json::Value = serde_json::from_slice(&res.body).unwrap();
        assert_eq!(body["error"], "no route for /missing");
    }

    #[test]
    fn json_errors_are_client_errors() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = WebError::from(parse);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
