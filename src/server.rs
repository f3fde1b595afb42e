//! HTTP server lifecycle and graceful shutdown.
//!
//! ```text
//!  Created ──start──▶ Listening ──stop──▶ ShuttingDown ──▶ Stopped
//!     │
//!     └──bind error──▶ Failed
//! ```
//!
//! [`Server::start`] binds, spawns the accept loop and returns as soon as the
//! socket is listening. [`Server::wait`] parks the caller until SIGINT (or
//! SIGTERM on unix) arrives; the accept loop keeps serving meanwhile.
//! [`Server::stop`] then:
//!
//! 1. Stops `listener.accept()`. No new connections are made.
//! 2. Tells every open connection to finish its in-flight request and close.
//!    Idle keep-alive connections close right away.
//! 3. Waits for the connections to go, up to the configured grace period,
//!    and aborts whatever is left after that. HTTP/2 streams run on tasks
//!    of their own and are aborted along with their connections.
//!
//! When running under Kubernetes, keep the grace period below
//! `terminationGracePeriodSeconds` so the drain finishes before SIGKILL.

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures_util::future::{self, Either};
use futures_util::stream::{self, Stream, StreamExt};
use http::header::{HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::rt::Executor;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler};
use crate::headers::Headers;
use crate::request::Request;
use crate::writer::LiveWriter;

type ResponseBody = UnsyncBoxBody<Bytes, Infallible>;

/// Where a [`Server`] is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Listening,
    ShuttingDown,
    Stopped,
    Failed,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created      => "created",
            Self::Listening    => "listening",
            Self::ShuttingDown => "shutting down",
            Self::Stopped      => "stopped",
            Self::Failed       => "failed",
        })
    }
}

/// The HTTP server.
///
/// ```rust,no_run
/// use waypost::middleware::{Chain, Logging, Recovery, Tracing};
/// use waypost::{Server, ServerConfig, echo, handler_fn};
///
/// # async fn run() -> Result<(), waypost::Error> {
/// let app = Chain::new()
///     .with(Recovery)
///     .with(Logging)
///     .with(Tracing::optional())
///     .handler(handler_fn(echo::correlation_id));
///
/// let mut server = Server::new(ServerConfig::default());
/// server.start(app).await?;
/// server.wait().await?;
/// server.stop().await
/// # }
/// ```
///
/// Dropping a listening server closes the listener and aborts every open
/// connection without a grace period.
pub struct Server {
    config: ServerConfig,
    state: ServerState,
    local_addr: Option<SocketAddr>,
    interrupts: Option<Interrupts>,
    running: Option<Running>,
}

struct Running {
    shutdown_tx: oneshot::Sender<Instant>,
    accept_loop: JoinHandle<Drain>,
}

/// How the drain phase ended.
enum Drain {
    Clean,
    Forced { remaining: usize },
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            state: ServerState::Created,
            local_addr: None,
            interrupts: None,
            running: None,
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    /// The bound address, once listening. Differs from the configured one
    /// when port `0` was requested.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// The configuration the server was created with.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Binds the listener and starts serving `handler` in the background.
    ///
    /// Returns the bound address as soon as the socket is listening. A bind
    /// failure moves the server to [`ServerState::Failed`].
    pub async fn start(&mut self, handler: BoxedHandler) -> Result<SocketAddr, Error> {
        self.expect_state(ServerState::Created, "start")?;

        let interrupts = Interrupts::subscribe().map_err(Error::Signal)?;

        let addr = self.config.addr;
        let bound = match TcpListener::bind(addr).await {
            Ok(listener) => listener.local_addr().map(|local| (listener, local)),
            Err(e) => Err(e),
        };
        let (listener, local_addr) = match bound {
            Ok(bound) => bound,
            Err(source) => {
                self.state = ServerState::Failed;
                error!(%addr, "bind failed: {source}");
                return Err(Error::Bind { addr, source });
            }
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let accept_loop = tokio::spawn(accept_loop(listener, handler, shutdown_rx));

        self.running = Some(Running { shutdown_tx, accept_loop });
        self.interrupts = Some(interrupts);
        self.local_addr = Some(local_addr);
        self.state = ServerState::Listening;

        info!(addr = %local_addr, "waypost listening");
        Ok(local_addr)
    }

    /// Waits for the first SIGINT (or SIGTERM on unix).
    ///
    /// Only the caller waits; connections keep being served.
    pub async fn wait(&mut self) -> Result<(), Error> {
        self.expect_state(ServerState::Listening, "wait on")?;
        let Some(interrupts) = self.interrupts.as_mut() else {
            return Err(self.illegal("wait on"));
        };

        info!("accepting connections, waiting for an interrupt");
        interrupts.recv().await;
        info!("interrupt received");
        Ok(())
    }

    /// Stops accepting and drains in-flight requests within the grace
    /// period.
    ///
    /// Returns [`Error::ShutdownTimeout`] if connections had to be aborted.
    /// Either way the server ends up [`ServerState::Stopped`].
    pub async fn stop(&mut self) -> Result<(), Error> {
        self.expect_state(ServerState::Listening, "stop")?;
        let Some(running) = self.running.take() else {
            return Err(self.illegal("stop"));
        };

        self.state = ServerState::ShuttingDown;
        self.interrupts = None;

        let grace_period = self.config.grace_period;
        let deadline = Instant::now() + grace_period;
        info!(?grace_period, "shutting down");

        if running.shutdown_tx.send(deadline).is_err() {
            warn!("accept loop exited before shutdown was requested");
        }
        let drain = running.accept_loop.await;
        self.state = ServerState::Stopped;

        match drain? {
            Drain::Clean => {
                info!("server gracefully stopped");
                Ok(())
            }
            Drain::Forced { remaining } => {
                warn!(remaining, ?grace_period, "grace period elapsed, forced stop");
                Err(Error::ShutdownTimeout(grace_period))
            }
        }
    }

    fn expect_state(&self, expected: ServerState, operation: &'static str) -> Result<(), Error> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.illegal(operation))
        }
    }

    fn illegal(&self, operation: &'static str) -> Error {
        Error::IllegalState { operation, state: self.state }
    }
}

// ── Accept loop ───────────────────────────────────────────────────────────────

/// Accepts until a shutdown deadline arrives, then drains.
///
/// The listener lives and dies here; nothing else touches it.
async fn accept_loop(
    listener: TcpListener,
    handler: BoxedHandler,
    mut shutdown: oneshot::Receiver<Instant>,
) -> Drain {
    // JoinSet tracks every connection task so the drain can wait for them
    // and, past the deadline, abort them.
    let mut tasks = JoinSet::new();
    let (drain_tx, drain_rx) = watch::channel(false);
    let (abort_tx, abort_rx) = watch::channel(false);
    let executor = StreamExecutor { abort: abort_rx };

    let deadline = loop {
        tokio::select! {
            // Check shutdown first so a stop immediately ends accepting,
            // even if more connections are queued.
            biased;

            deadline = &mut shutdown => {
                // A dropped `Server` sends nothing: no grace at all.
                break deadline.unwrap_or_else(|_| Instant::now());
            }

            res = listener.accept() => {
                let (stream, peer) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };
                tasks.spawn(serve_connection(
                    stream,
                    peer,
                    Arc::clone(&handler),
                    executor.clone(),
                    drain_rx.clone(),
                ));
            }

            // Reap finished connection tasks so the JoinSet does not grow
            // without bound on long-running servers.
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    };

    drop(listener);
    info!(in_flight = tasks.len(), "stopped accepting, draining connections");
    drain_tx.send_replace(true);

    let drained = tokio::time::timeout_at(deadline, async {
        while tasks.join_next().await.is_some() {}
    })
    .await;

    match drained {
        Ok(()) => Drain::Clean,
        Err(_) => {
            let remaining = tasks.len();
            abort_tx.send_replace(true);
            tasks.shutdown().await;
            Drain::Forced { remaining }
        }
    }
}

/// Serves one connection until the client closes it or a drain is
/// requested and the in-flight request has completed.
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    handler: BoxedHandler,
    executor: StreamExecutor,
    mut drain: watch::Receiver<bool>,
) {
    // TokioIo adapts tokio's AsyncRead/AsyncWrite to the hyper IO traits.
    let io = TokioIo::new(stream);

    // Called once per request on the connection, not once per connection.
    let svc = service_fn(move |req| dispatch(Arc::clone(&handler), req));

    // `auto::Builder` handles both HTTP/1.1 and HTTP/2.
    let builder = ConnBuilder::new(executor);
    let conn = builder.serve_connection(io, svc);
    tokio::pin!(conn);

    let result = tokio::select! {
        res = conn.as_mut() => res,
        _ = drain.changed() => {
            debug!(%peer, "draining connection");
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    if let Err(e) = result {
        error!(%peer, "connection error: {e}");
    }
}

/// Spawns the tasks hyper hands out for HTTP/2 streams.
///
/// Those tasks live outside the connection's `JoinSet`, so each one also
/// watches the abort flag raised when the drain deadline passes, or the
/// flag's sender going away with the accept loop.
#[derive(Clone)]
struct StreamExecutor {
    abort: watch::Receiver<bool>,
}

impl<F> Executor<F> for StreamExecutor
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    fn execute(&self, fut: F) {
        let mut abort = self.abort.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = fut => {}
                () = aborted(&mut abort) => {}
            }
        });
    }
}

async fn aborted(abort: &mut watch::Receiver<bool>) {
    loop {
        if *abort.borrow_and_update() {
            return;
        }
        if abort.changed().await.is_err() {
            return;
        }
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Runs `handler` for one request and turns what it writes into a hyper
/// response.
///
/// The handler writes into a [`LiveWriter`]. Its head is awaited first; if
/// the handler is still running at that point, its future moves into the
/// response body stream, which keeps driving it while hyper pulls chunks.
/// Aborting the connection therefore also drops the handler.
async fn dispatch(
    handler: BoxedHandler,
    req: hyper::Request<Incoming>,
) -> Result<hyper::Response<ResponseBody>, Infallible> {
    let req = match Request::from_hyper(req).await {
        Ok(req) => req,
        Err(e) => {
            warn!("failed to read request body: {e}");
            return Ok(bare(StatusCode::BAD_REQUEST));
        }
    };

    let (mut writer, head_rx, mut body_rx) = LiveWriter::channel();
    let work: BoxFuture<'static> = Box::pin(async move {
        handler.call(req, &mut writer).await;
        writer.finish();
    });

    let (head, work) = match future::select(head_rx, work).await {
        Either::Left((head, work)) => (head, Some(work)),
        Either::Right(((), head_rx)) => (head_rx.await, None),
    };
    let Ok((status, headers)) = head else {
        // The writer can only vanish without a head if the handler did.
        return Ok(bare(StatusCode::INTERNAL_SERVER_ERROR));
    };

    let body = match work {
        // Handler still running: stream chunks as they are written.
        Some(work) => {
            let chunks = stream::poll_fn(move |cx| body_rx.poll_recv(cx));
            let drive = stream::once(work).filter_map(|()| future::ready(None::<Bytes>));
            streaming(stream::select(chunks, drive))
        }
        // Handler done: the whole body is already queued.
        None => {
            let mut body = BytesMut::new();
            while let Ok(chunk) = body_rx.try_recv() {
                body.extend_from_slice(&chunk);
            }
            Full::new(body.freeze()).boxed_unsync()
        }
    };

    let mut response = hyper::Response::new(body);
    *response.status_mut() = status;
    copy_headers(&headers, response.headers_mut());
    Ok(response)
}

fn streaming<S>(chunks: S) -> ResponseBody
where
    S: Stream<Item = Bytes> + Send + 'static,
{
    StreamBody::new(chunks.map(|chunk| Ok::<_, Infallible>(Frame::data(chunk)))).boxed_unsync()
}

fn bare(status: StatusCode) -> hyper::Response<ResponseBody> {
    let mut response = hyper::Response::new(Empty::<Bytes>::new().boxed_unsync());
    *response.status_mut() = status;
    response
}

/// Appends `from` to `to` in order. Invalid names or values are dropped.
fn copy_headers(from: &Headers, to: &mut http::HeaderMap) {
    for (name, value) in from.iter() {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                to.append(name, value);
            }
            _ => warn!(name, "dropping invalid response header"),
        }
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// OS signal subscription owned by one [`Server`].
///
/// Subscribing installs the handlers immediately, so an interrupt that
/// arrives between `start` and `wait` is not lost.
struct Interrupts {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(windows)]
    ctrl_c: tokio::signal::windows::CtrlC,
}

impl Interrupts {
    /// SIGINT and SIGTERM on unix, Ctrl-C on Windows.
    fn subscribe() -> std::io::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            Ok(Self {
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
            })
        }
        #[cfg(windows)]
        {
            Ok(Self { ctrl_c: tokio::signal::windows::ctrl_c()? })
        }
    }

    async fn recv(&mut self) {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.interrupt.recv() => {}
                _ = self.terminate.recv() => {}
            }
        }
        #[cfg(windows)]
        {
            self.ctrl_c.recv().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn copy_headers_keeps_order_and_duplicates() {
        let headers: Headers = [
            ("x-pre", "Logging"),
            ("content-type", "text/plain"),
            ("x-pre", "Tracing"),
            ("bad header", "x"),
        ]
        .into_iter()
        .collect();

        let mut map = http::HeaderMap::new();
        copy_headers(&headers, &mut map);

        assert_eq!(map.len(), 3);
        let pre: Vec<_> = map.get_all("x-pre").iter().map(|v| v.to_str().unwrap()).collect();
        assert_eq!(pre, ["Logging", "Tracing"]);
    }

    #[tokio::test]
    async fn abort_flag_cancels_executor_tasks() {
        let (abort_tx, abort_rx) = watch::channel(false);
        let executor = StreamExecutor { abort: abort_rx };

        let (held_tx, held_rx) = oneshot::channel::<()>();
        executor.execute(async move {
            let _held = held_tx;
            std::future::pending::<()>().await;
        });
        let (done_tx, done_rx) = oneshot::channel();
        executor.execute(async move {
            let _ = done_tx.send(());
        });
        assert!(done_rx.await.is_ok());

        abort_tx.send_replace(true);
        let dropped = tokio::time::timeout(Duration::from_secs(1), held_rx).await;
        assert!(matches!(dropped, Ok(Err(_))));
    }

    #[test]
    fn config_is_kept() {
        let config = ServerConfig::new("127.0.0.1:0".parse().unwrap())
            .grace_period(Duration::from_millis(250));
        let server = Server::new(config);
        assert_eq!(server.config().grace_period, Duration::from_millis(250));
        assert_eq!(server.config().addr.port(), 0);
        assert_eq!(server.state(), ServerState::Created);
    }

    #[test]
    fn states_display_lowercase() {
        assert_eq!(ServerState::ShuttingDown.to_string(), "shutting down");
        assert_eq!(ServerState::Listening.to_string(), "listening");
    }

    #[tokio::test]
    async fn stop_before_start_is_illegal() {
        let mut server = Server::new(ServerConfig::new("127.0.0.1:0".parse().unwrap()));
        let err = server.stop().await.unwrap_err();
        assert!(matches!(
            err,
            Error::IllegalState { operation: "stop", state: ServerState::Created }
        ));
        assert_eq!(server.state(), ServerState::Created);
    }

    #[tokio::test]
    async fn wait_before_start_is_illegal() {
        let mut server = Server::new(ServerConfig::new("127.0.0.1:0".parse().unwrap()));
        assert!(matches!(server.wait().await, Err(Error::IllegalState { .. })));
    }
}
