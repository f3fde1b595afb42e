//! Handler trait and type erasure.
//!
//! Every stage of the pipeline, terminal handler and middleware alike, is a
//! [`Handler`]: it takes the request by value and writes into a borrowed
//! [`ResponseWriter`]. Handlers are stored as [`BoxedHandler`] so that a
//! chain of differently typed middlewares collapses into one value the
//! server can share across connections.
//!
//! ```text
//! async fn echo(req: Request) -> Response { … }   ← user writes this
//!        ↓ handler_fn(echo)
//! FnHandler(echo)                                 ← implements Handler
//!        ↓ Chain::handler / compose
//! Arc<dyn Handler>                                ← BoxedHandler
//!        ↓ handler.call(req, &mut writer)         ← one vtable dispatch
//! Box::pin(async { echo(req).await.into_response().write_to(w) })
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::IntoResponse;
use crate::writer::ResponseWriter;

/// A heap-allocated, type-erased future borrowing the response writer for
/// `'a`.
pub type BoxFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// One stage of request handling.
///
/// Implement this directly when a handler needs to stream, set headers
/// before writing, or wrap another handler. For the common
/// "request in, response out" case use [`handler_fn`].
pub trait Handler: Send + Sync + 'static {
    fn call<'a>(&'a self, req: Request, w: &'a mut dyn ResponseWriter) -> BoxFuture<'a>;
}

/// A type-erased handler shared across concurrent requests.
pub type BoxedHandler = Arc<dyn Handler>;

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn call<'a>(&'a self, req: Request, w: &'a mut dyn ResponseWriter) -> BoxFuture<'a> {
        (**self).call(req, w)
    }
}

// ── Function handlers ─────────────────────────────────────────────────────────

/// Adapts an `async fn(Request) -> impl IntoResponse` into a [`Handler`].
///
/// The returned value is written into the response writer in one go once
/// the function completes.
pub fn handler_fn<F, Fut, R>(f: F) -> FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    FnHandler(f)
}

/// Newtype returned by [`handler_fn`], bridging plain async functions to the
/// writer-based [`Handler`] interface.
pub struct FnHandler<F>(F);

impl<F, Fut, R> Handler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call<'a>(&'a self, req: Request, w: &'a mut dyn ResponseWriter) -> BoxFuture<'a> {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_response().write_to(w) })
    }
}
