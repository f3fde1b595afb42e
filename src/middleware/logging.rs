//! Request logging.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::middleware::{Middleware, PRE_MARKER};
use crate::request::Request;
use crate::writer::ResponseWriter;

const NAME: &str = "Logging";

/// Logs every request before and after downstream runs.
///
/// The only write is the `x-pre` marker, made before downstream is called.
/// After downstream returns the response may already be on the wire, so
/// this middleware only reads from the writer.
#[derive(Clone, Copy, Debug, Default)]
pub struct Logging;

impl Middleware for Logging {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(LoggingHandler { next })
    }
}

struct LoggingHandler {
    next: BoxedHandler,
}

impl Handler for LoggingHandler {
    fn call<'a>(&'a self, req: Request, w: &'a mut dyn ResponseWriter) -> BoxFuture<'a> {
        Box::pin(async move {
            let method = req.method().clone();
            let path = req.path().to_owned();

            w.headers_mut().add(PRE_MARKER, NAME);
            info!(%method, %path, "logging: before");

            let start = Instant::now();
            self.next.call(req, &mut *w).await;

            let status = w.status().map_or(0, |s| s.as_u16());
            info!(
                %method,
                %path,
                status,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "logging: after"
            );
        })
    }
}
