//! The service's one endpoint.
//!
//! ```rust,no_run
//! use waypost::middleware::{Chain, Logging, Recovery, Tracing};
//! use waypost::{echo, handler_fn};
//!
//! let app = Chain::new()
//!     .with(Recovery)
//!     .with(Logging)
//!     .with(Tracing::optional())
//!     .handler(handler_fn(echo::correlation_id));
//! ```

use tracing::info;

use crate::correlation;
use crate::{Request, Response};

/// Echoes the request's correlation id back as plain text.
pub async fn correlation_id(req: Request) -> Response {
    match correlation::extract(req.context()) {
        Some(id) => {
            info!(correlation_id = %id, "echoing request id");
            Response::text(format!("My Request-Id: {id}\n"))
        }
        None => {
            info!("no request id in context");
            Response::text("No Request-Id detected\n")
        }
    }
}
