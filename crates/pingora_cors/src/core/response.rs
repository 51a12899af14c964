use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Empty body, no content-type. Used for preflight answers.
    pub fn empty(status: StatusCode) -> Self {
        Self::new(status)
    }

    pub fn text<S: Into<String>>(status: StatusCode, body: S) -> Self {
        let mut res = Self::new(status);
        res.headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        res.body = Bytes::from(body.into());
        res
    }

    pub fn json(status: StatusCode, value: impl serde::Serialize) -> Self {
        let mut res = Self::new(status);
        res.headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        match serde_json::to_vec(&value) {
            Ok(bytes) => res.body = Bytes::from(bytes),
            Err(_) => res.status = StatusCode::INTERNAL_SERVER_ERROR,
        }
        res
    }

    /// Replace any existing value for `k`.
    pub fn set_header<K, V>(&mut self, k: K, v: V)
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        if let (Ok(key), Ok(value)) = (k.try_into(), v.try_into()) {
            self.headers.insert(key, value);
        }
    }

    /// Add a value for `k`, keeping values already present.
    pub fn append_header<K, V>(&mut self, k: K, v: V)
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        if let (Ok(key), Ok(value)) = (k.try_into(), v.try_into()) {
            self.headers.append(key, value);
        }
    }

    pub fn header<K, V>(mut self, k: K, v: V) -> Self
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        self.set_header(k, v);
        self
    }

    pub fn header_str<K: http::header::AsHeaderName>(&self, name: K) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}
