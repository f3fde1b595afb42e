//! Whole-response value type and the [`IntoResponse`] conversion trait.
//!
//! Most handlers do not stream. They build a [`Response`], return it, and
//! [`handler_fn`](crate::handler_fn) writes it into the
//! [`ResponseWriter`](crate::ResponseWriter) for them.

use bytes::Bytes;
use http::StatusCode;

use crate::headers::Headers;
use crate::writer::ResponseWriter;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

// ── Response ─────────────────────────────────────────────────────────────────

/// A complete outgoing HTTP response.
///
/// ```rust
/// use http::StatusCode;
/// use waypost::Response;
///
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/users/42")
///     .bytes("application/json", br#"{"id":42}"#.to_vec());
/// ```
#[derive(Debug)]
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) headers: Headers,
    pub(crate) body: Bytes,
}

impl Response {
    /// `200 OK` with a `text/plain` body.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { status: code, headers: Headers::new(), body: Bytes::new() }
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: Headers::new(), status: StatusCode::OK }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &Headers { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Commits the whole response to `w` in one go.
    pub fn write_to(self, w: &mut dyn ResponseWriter) {
        let live = w.headers_mut();
        for (name, value) in self.headers.iter() {
            live.add(name, value);
        }
        w.write_head(self.status);
        if !self.body.is_empty() {
            w.write(self.body);
        }
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`]. Defaults to `200 OK`.
pub struct ResponseBuilder {
    headers: Headers,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.add(name, value);
        self
    }

    /// Terminate with a plain-text body.
    pub fn text(self, body: impl Into<String>) -> Response {
        let body: String = body.into();
        self.bytes(TEXT_PLAIN, body)
    }

    /// Terminate with a body of the given content type.
    pub fn bytes(self, content_type: &str, body: impl Into<Bytes>) -> Response {
        let mut headers = Headers::new();
        headers.add("content-type", content_type);
        for (name, value) in self.headers.iter() {
            headers.add(name, value);
        }
        Response { status: self.status, headers, body: body.into() }
    }

    /// Terminate with no body.
    pub fn no_body(self) -> Response {
        Response { status: self.status, headers: self.headers, body: Bytes::new() }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Implement on your own types to return them from handlers built with
/// [`handler_fn`](crate::handler_fn).
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

/// Return a bare status from a handler: `return StatusCode::NOT_FOUND`
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::ResponseBuffer;

    #[test]
    fn builder_puts_content_type_first() {
        let response = Response::builder()
            .status(StatusCode::CREATED)
            .header("location", "/x")
            .text("made");

        assert_eq!(response.status_code(), StatusCode::CREATED);
        assert_eq!(response.headers().iter().collect::<Vec<_>>(), [
            ("content-type", TEXT_PLAIN),
            ("location", "/x"),
        ]);
        assert_eq!(response.body(), b"made");
    }

    #[test]
    fn write_to_commits_everything() {
        let mut buffer = ResponseBuffer::new();
        Response::text("hi").write_to(&mut buffer);

        let (status, headers, body) = buffer.into_parts();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers.get("Content-Type"), Some(TEXT_PLAIN));
        assert_eq!(&body[..], b"hi");
    }

    #[test]
    fn builder_without_body_keeps_headers() {
        let response = Response::builder()
            .status(StatusCode::MOVED_PERMANENTLY)
            .header("location", "/elsewhere")
            .no_body();
        assert_eq!(response.status_code(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers().get("Location"), Some("/elsewhere"));
        assert!(response.headers().get("content-type").is_none());
        assert!(response.body().is_empty());
    }

    #[test]
    fn bare_status_has_no_body() {
        let response = StatusCode::NO_CONTENT.into_response();
        assert_eq!(response.status_code(), StatusCode::NO_CONTENT);
        assert!(response.headers().is_empty());
        assert!(response.body().is_empty());
    }
}
