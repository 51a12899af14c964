use std::collections::HashMap;

use bytes::Bytes;
use http::uri::InvalidUri;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};

#[derive(Debug)]
pub struct Request {
    pub inner: http::Request<Bytes>,
    pub params: HashMap<String, String>,
}

impl Request {
    /// Build a request for a path known to be valid, such as a literal.
    /// A path that is not a valid URI is replaced by `/`; use
    /// [`Request::try_new`] for paths read off the wire.
    pub fn new<S: AsRef<str>>(method: Method, path: S) -> Self {
        Self::try_new(method.clone(), path).unwrap_or_else(|_| Self::with_uri(method, Uri::default()))
    }

    pub fn try_new<S: AsRef<str>>(method: Method, path: S) -> Result<Self, InvalidUri> {
        let uri = path.as_ref().parse::<Uri>()?;
        Ok(Self::with_uri(method, uri))
    }

    fn with_uri(method: Method, uri: Uri) -> Self {
        let mut inner = http::Request::new(Bytes::new());
        *inner.method_mut() = method;
        *inner.uri_mut() = uri;

        Self {
            inner,
            params: HashMap::new(),
        }
    }

    pub fn header<K, V>(mut self, k: K, v: V) -> Self
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        if let (Ok(key), Ok(value)) = (k.try_into(), v.try_into()) {
            self.inner.headers_mut().insert(key, value);
        }
        self
    }

    pub fn with_body<B: Into<Bytes>>(mut self, body: B) -> Self {
        *self.inner.body_mut() = body.into();
        self
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn path(&self) -> &str {
        self.inner.uri().path()
    }

    pub fn headers(&self) -> &HeaderMap<HeaderValue> {
        self.inner.headers()
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap<HeaderValue> {
        self.inner.headers_mut()
    }

    /// Header value as text; missing or non-UTF-8 values read as empty.
    pub fn header_str<K: http::header::AsHeaderName>(&self, name: K) -> &str {
        self.inner
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    pub fn body(&self) -> &Bytes {
        self.inner.body()
    }

    pub fn with_params(mut self, params: HashMap<String, String>) -> Self {
        self.params = params;
        self
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(|s| s.as_str())
    }
}
