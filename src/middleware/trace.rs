//! Correlation-id tracing.
//!
//! Every request leaves this middleware with a correlation id in its
//! context: the caller's `X-Request-ID` if present, a fresh ULID otherwise
//! (or a 400 when the id is mandatory).
//!
//! # Why the response is buffered
//!
//! After downstream finishes, this middleware adds the `x-post` marker. On
//! the wire headers precede the body, so if downstream wrote straight to
//! the connection the head would already be gone by then. Downstream
//! therefore writes into a [`ResponseBuffer`]; once it returns, the buffer is
//! replayed onto the live writer with the marker appended. The cost is that
//! the whole response sits in memory and nothing streams through this stage.

use bytes::Bytes;
use http::StatusCode;
use tracing::{Instrument, debug, info_span, warn};

use crate::correlation::{self, CorrelationId};
use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::middleware::{Middleware, POST_MARKER, PRE_MARKER};
use crate::request::Request;
use crate::writer::{ResponseBuffer, ResponseWriter};

const NAME: &str = "Tracing";

/// Resolves, generates or demands a correlation id for every request.
#[derive(Clone, Copy, Debug, Default)]
pub struct Tracing {
    mandatory: bool,
}

impl Tracing {
    /// Generate an id when the caller did not send one.
    pub fn optional() -> Self {
        Self { mandatory: false }
    }

    /// Reject requests without an id with `400 Bad Request`.
    pub fn mandatory() -> Self {
        Self { mandatory: true }
    }

    pub fn new(mandatory: bool) -> Self {
        Self { mandatory }
    }
}

impl Middleware for Tracing {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        std::sync::Arc::new(TracingHandler { mandatory: self.mandatory, next })
    }
}

struct TracingHandler {
    mandatory: bool,
    next: BoxedHandler,
}

impl Handler for TracingHandler {
    fn call<'a>(&'a self, req: Request, w: &'a mut dyn ResponseWriter) -> BoxFuture<'a> {
        Box::pin(async move {
            w.headers_mut().add(PRE_MARKER, NAME);
            debug!("tracing: before");

            let id = match correlation::resolve(&req) {
                Ok(id) => id,
                Err(e) if self.mandatory => {
                    warn!(method = %req.method(), path = %req.path(), "rejecting request: {e}");
                    w.headers_mut().set("content-type", "text/plain; charset=utf-8");
                    w.write_head(StatusCode::BAD_REQUEST);
                    w.write(Bytes::from(format!("{e}\n")));
                    return;
                }
                Err(_) => CorrelationId::generate(),
            };

            let span = info_span!("request", correlation_id = %id);
            let context = correlation::attach(req.context(), id.as_str());
            let req = req.with_context(context);

            let mut buffer = ResponseBuffer::new();
            self.next.call(req, &mut buffer).instrument(span).await;
            buffer.flush_into(w, |headers| headers.add(POST_MARKER, NAME));

            debug!(correlation_id = %id, "tracing: after");
        })
    }
}
