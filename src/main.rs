//! waypost — correlation-id echo service.
//!
//! Run with:
//!   cargo run -- --strict
//!
//! Try:
//!   curl -i http://localhost:8080/
//!   curl -i -H 'X-Request-ID: 43' http://localhost:8080/
//!
//! Ctrl-C drains in-flight requests for up to `--grace-period` seconds.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use waypost::config::DEFAULT_ADDR;
use waypost::middleware::{Chain, Logging, Recovery, Tracing};
use waypost::{Server, ServerConfig, echo, handler_fn, telemetry};

#[derive(Debug, Parser)]
#[command(name = "waypost", version, about = "Correlation-id echo service")]
struct Cli {
    /// Reject requests that carry no X-Request-ID header
    #[arg(long, env = "WAYPOST_STRICT")]
    strict: bool,

    /// Address to listen on
    #[arg(long, env = "WAYPOST_ADDR", default_value_t = DEFAULT_ADDR)]
    addr: SocketAddr,

    /// Seconds to wait for in-flight requests on shutdown
    #[arg(long, env = "WAYPOST_GRACE_PERIOD", default_value_t = 5, value_name = "SECONDS")]
    grace_period: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init(telemetry::DEFAULT_FILTER)?;

    info!(strict = cli.strict, addr = %cli.addr, grace_period_secs = cli.grace_period, "starting");

    // Recovery first: it must see panics from every other layer.
    let app = Chain::new()
        .with(Recovery)
        .with(Logging)
        .with(Tracing::new(cli.strict))
        .handler(handler_fn(echo::correlation_id));

    let config = ServerConfig::new(cli.addr).grace_period(Duration::from_secs(cli.grace_period));
    let mut server = Server::new(config);

    server.start(app).await.context("starting server")?;
    server.wait().await?;
    server.stop().await.context("stopping server")?;
    Ok(())
}
