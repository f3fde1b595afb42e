//! Middleware layer.
//!
//! A middleware turns one handler into another: it receives the next stage
//! as a [`BoxedHandler`] and returns a handler that runs some code, calls
//! the next stage, and runs more code once it returns.
//!
//! Middlewares are stacked with a [`Chain`]. The first middleware added is
//! the outermost one: it sees the request first and the response last.
//!
//! ```text
//!            Chain::new().with(A).with(B).with(C).handler(T)
//!
//!   request ──▶ A ──▶ B ──▶ C ──▶ T
//!  response ◀── A ◀── B ◀── C ◀──┘
//! ```
//!
//! Stages never share mutable state. Anything one stage wants the next to
//! know travels in the request [`Context`](crate::context::Context).
//!
//! Built-in middleware:
//! - [`Recovery`] — panic boundary, must be outermost
//! - [`Logging`] — before/after log lines with method, path, status, latency
//! - [`Tracing`] — correlation id resolution, response buffering

mod logging;
mod recovery;
mod trace;

use std::sync::Arc;

use crate::handler::{BoxedHandler, Handler};

pub use logging::Logging;
pub use recovery::Recovery;
pub use trace::Tracing;

/// Marker header added by each built-in middleware before calling downstream.
pub const PRE_MARKER: &str = "x-pre";

/// Marker header added by [`Tracing`] after downstream has completed.
pub const POST_MARKER: &str = "x-post";

/// A transform from handler to handler.
pub trait Middleware: Send + Sync + 'static {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler;
}

/// Plain functions and closures work as middleware.
impl<F> Middleware for F
where
    F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
{
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        self(next)
    }
}

/// An ordered, immutable stack of middlewares.
#[derive(Clone, Default)]
pub struct Chain {
    layers: Vec<Arc<dyn Middleware>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the chain extended by `middleware`, which becomes the
    /// innermost layer so far.
    pub fn with(mut self, middleware: impl Middleware) -> Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Wraps `terminal` in every layer, first layer outermost.
    pub fn handler(&self, terminal: impl Handler) -> BoxedHandler {
        let terminal: BoxedHandler = Arc::new(terminal);
        self.layers
            .iter()
            .rev()
            .fold(terminal, |next, layer| layer.wrap(next))
    }
}

/// Wraps `terminal` in `middlewares`, the first one outermost.
pub fn compose<I>(terminal: impl Handler, middlewares: I) -> BoxedHandler
where
    I: IntoIterator<Item = Arc<dyn Middleware>>,
{
    let chain = Chain { layers: middlewares.into_iter().collect() };
    chain.handler(terminal)
}
