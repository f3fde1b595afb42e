//! Panic boundary.
//!
//! A panic anywhere downstream unwinds to this middleware instead of taking
//! down the connection task. The panic is logged with its message and a
//! backtrace, and the client gets a `500 Internal Server Error` unless part
//! of the response was already committed, in which case the truncated
//! response is left as is.
//!
//! Install it as the first layer of the chain so panics raised inside the
//! other middlewares are caught as well.
//!
//! The logged backtrace is the one taken at the panic site. Wrapping a
//! handler installs a process-wide panic hook, chained in front of the
//! previous one, that records it for the boundary to pick up.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Once};

use bytes::Bytes;
use futures_util::FutureExt;
use http::StatusCode;
use tracing::error;

use crate::correlation;
use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::middleware::Middleware;
use crate::request::Request;
use crate::writer::ResponseWriter;

/// Converts downstream panics into 500 responses.
#[derive(Clone, Copy, Debug, Default)]
pub struct Recovery;

impl Middleware for Recovery {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        install_panic_hook();
        Arc::new(RecoveryHandler { next })
    }
}

thread_local! {
    // Unwinding and catch_unwind happen on the thread that polled the
    // panicking future, so the hook and the boundary meet here.
    static PANIC_BACKTRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

fn install_panic_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            PANIC_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(Backtrace::capture()));
            previous(info);
        }));
    });
}

/// The backtrace recorded by the most recent panic on this thread.
fn take_panic_backtrace() -> Option<Backtrace> {
    PANIC_BACKTRACE.with(|slot| slot.borrow_mut().take())
}

struct RecoveryHandler {
    next: BoxedHandler,
}

impl Handler for RecoveryHandler {
    fn call<'a>(&'a self, req: Request, w: &'a mut dyn ResponseWriter) -> BoxFuture<'a> {
        Box::pin(async move {
            let method = req.method().clone();
            let path = req.path().to_owned();
            // Only the caller-supplied id is known out here; a generated one
            // lives in the span entered further down the chain.
            let correlation_id = correlation::resolve(&req)
                .map(|id| id.to_string())
                .unwrap_or_default();

            // A stale record from a panic caught elsewhere must not be
            // reported against this request.
            take_panic_backtrace();

            // `call` itself may panic before returning a future, so it runs
            // inside the caught future rather than ahead of it.
            let outcome = AssertUnwindSafe(async { self.next.call(req, &mut *w).await })
                .catch_unwind()
                .await;

            let Err(payload) = outcome else { return };
            let backtrace = take_panic_backtrace().unwrap_or_else(Backtrace::capture);
            let panic_message = panic_message(payload.as_ref());

            if w.is_committed() {
                error!(
                    %method,
                    %path,
                    %correlation_id,
                    %panic_message,
                    %backtrace,
                    "handler panicked after the response was committed"
                );
                return;
            }

            error!(
                %method,
                %path,
                %correlation_id,
                %panic_message,
                %backtrace,
                "handler panicked"
            );
            w.headers_mut().set("content-type", "text/plain; charset=utf-8");
            w.write_head(StatusCode::INTERNAL_SERVER_ERROR);
            w.write(Bytes::from_static(b"Internal Server Error\n"));
        })
    }
}

/// Best-effort text of a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}
