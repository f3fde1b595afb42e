//! Incoming HTTP request type.

use bytes::Bytes;
use http::Method;
use http_body_util::BodyExt;
use hyper::body::Incoming;

use crate::context::Context;
use crate::headers::Headers;

/// An incoming HTTP request with its body fully read.
///
/// Besides the wire data a request carries an immutable [`Context`].
/// Middlewares enrich it with [`Request::with_context`] before passing the
/// request downstream.
#[derive(Debug)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) query: Option<String>,
    pub(crate) headers: Headers,
    pub(crate) body: Bytes,
    pub(crate) context: Context,
}

impl Request {
    /// A bodiless request, mostly useful for driving handlers in tests.
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_owned(),
            query: None,
            headers: Headers::new(),
            body: Bytes::new(),
            context: Context::new(),
        }
    }

    /// Reads the body of a hyper request and converts it.
    ///
    /// Header values carrying obs-text bytes are kept, decoded as UTF-8 with
    /// invalid sequences replaced.
    pub(crate) async fn from_hyper(req: hyper::Request<Incoming>) -> Result<Self, hyper::Error> {
        let (parts, body) = req.into_parts();
        let body = body.collect().await?.to_bytes();

        let mut headers = Headers::new();
        for (name, value) in &parts.headers {
            headers.add(name.as_str(), &String::from_utf8_lossy(value.as_bytes()));
        }

        Ok(Self {
            method: parts.method,
            path: parts.uri.path().to_owned(),
            query: parts.uri.query().map(str::to_owned),
            headers,
            body,
            context: Context::new(),
        })
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.add(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Replaces the request context. The previous context is dropped, not
    /// modified.
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn query(&self) -> Option<&str> { self.query.as_deref() }
    pub fn headers(&self) -> &Headers { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn context(&self) -> &Context { &self.context }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }
}
