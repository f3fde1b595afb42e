//! Shared utilities for integration testing: a raw HTTP/1.1 client and an
//! in-memory log sink.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::subscriber::DefaultGuard;
use waypost::middleware::{Chain, Logging, Recovery, Tracing};
use waypost::{BoxedHandler, Handler, Server, ServerConfig};

/// A parsed HTTP/1.1 response.
#[derive(Debug)]
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.all(name).into_iter().next()
    }

    pub fn all(&self, name: &str) -> Vec<&str> {
        self.headers.iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sends `GET /` with the given extra headers and reads the whole reply.
pub async fn get(addr: SocketAddr, headers: &[(&str, &str)]) -> io::Result<Reply> {
    let mut stream = TcpStream::connect(addr).await?;
    send(&mut stream, headers).await?;
    read_reply(&mut stream).await
}

pub async fn send(stream: &mut TcpStream, headers: &[(&str, &str)]) -> io::Result<()> {
    let mut request = String::from("GET / HTTP/1.1\r\nhost: test\r\nconnection: close\r\n");
    for (name, value) in headers {
        request.push_str(&format!("{name}: {value}\r\n"));
    }
    request.push_str("\r\n");
    stream.write_all(request.as_bytes()).await?;
    stream.flush().await
}

/// Reads until the server closes the connection.
pub async fn read_reply(stream: &mut TcpStream) -> io::Result<Reply> {
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await?;
    parse(&raw).ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "malformed response"))
}

fn parse(raw: &[u8]) -> Option<Reply> {
    let split = raw.windows(4).position(|w| w == b"\r\n\r\n")?;
    let head = std::str::from_utf8(&raw[..split]).ok()?;
    let rest = &raw[split + 4..];

    let mut lines = head.split("\r\n");
    let status = lines.next()?.split(' ').nth(1)?.parse().ok()?;
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_owned(), v.trim().to_owned()))
        .collect();

    let chunked = headers.iter().any(|(k, v)| {
        k.eq_ignore_ascii_case("transfer-encoding") && v.eq_ignore_ascii_case("chunked")
    });
    let body = if chunked { dechunk(rest)? } else { rest.to_vec() };

    Some(Reply { status, headers, body })
}

fn dechunk(mut raw: &[u8]) -> Option<Vec<u8>> {
    let mut body = Vec::new();
    loop {
        let line_end = raw.windows(2).position(|w| w == b"\r\n")?;
        let size = usize::from_str_radix(std::str::from_utf8(&raw[..line_end]).ok()?.trim(), 16).ok()?;
        raw = &raw[line_end + 2..];
        if size == 0 {
            return Some(body);
        }
        body.extend_from_slice(raw.get(..size)?);
        raw = raw.get(size + 2..)?;
    }
}

/// The production middleware stack around `terminal`.
pub fn app(mandatory: bool, terminal: impl Handler) -> BoxedHandler {
    Chain::new()
        .with(Recovery)
        .with(Logging)
        .with(Tracing::new(mandatory))
        .handler(terminal)
}

/// A server on a free localhost port.
pub async fn start(handler: BoxedHandler, config: ServerConfig) -> (Server, SocketAddr) {
    let mut server = Server::new(config);
    let addr = server.start(handler).await.expect("server should start");
    (server, addr)
}

pub fn localhost() -> ServerConfig {
    ServerConfig::new("127.0.0.1:0".parse().unwrap())
}

// ── Log capture ───────────────────────────────────────────────────────────────

/// Log lines written by a thread-local fmt subscriber.
#[derive(Clone, Default)]
pub struct Logs(Arc<Mutex<Vec<u8>>>);

impl Logs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for Logs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Captures logs emitted on the current thread until the guard drops.
///
/// Use with the default current-thread `#[tokio::test]` runtime so server
/// tasks run on the capturing thread.
pub fn capture_logs() -> (Logs, DefaultGuard) {
    let logs = Logs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    (logs, tracing::subscriber::set_default(subscriber))
}
