//! # waypost
//!
//! A single-endpoint HTTP pipeline: a stack of middlewares around one
//! handler, correlation ids on every request, panics contained per request,
//! and a server that drains in-flight work on Ctrl-C / SIGTERM.
//!
//! ## The pieces
//!
//! - [`correlation`] — resolve `X-Request-ID` or mint a ULID, carry it in
//!   the request [`Context`](context::Context)
//! - [`middleware`] — [`Chain`](middleware::Chain) plus the built-in
//!   [`Recovery`](middleware::Recovery), [`Logging`](middleware::Logging)
//!   and [`Tracing`](middleware::Tracing) layers
//! - [`Server`] — bind, serve concurrently, wait for a signal, drain within
//!   a grace period
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use waypost::middleware::{Chain, Logging, Recovery, Tracing};
//! use waypost::{Request, Response, Server, ServerConfig, correlation, handler_fn};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), waypost::Error> {
//!     let app = Chain::new()
//!         .with(Recovery)
//!         .with(Logging)
//!         .with(Tracing::optional())
//!         .handler(handler_fn(hello));
//!
//!     let mut server = Server::new(ServerConfig::default());
//!     server.start(app).await?;
//!     server.wait().await?;
//!     server.stop().await
//! }
//!
//! async fn hello(req: Request) -> Response {
//!     let id = correlation::extract(req.context());
//!     Response::text(format!("hello, request {}", id.map(|id| id.to_string()).unwrap_or_default()))
//! }
//! ```

mod error;
mod handler;
mod headers;
mod request;
mod response;
mod server;
mod writer;

pub mod config;
pub mod context;
pub mod correlation;
pub mod echo;
pub mod middleware;
pub mod telemetry;

pub use config::ServerConfig;
pub use error::Error;
pub use handler::{BoxFuture, BoxedHandler, FnHandler, Handler, handler_fn};
pub use headers::Headers;
pub use request::Request;
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use server::{Server, ServerState};
pub use writer::{ResponseBuffer, ResponseWriter};
