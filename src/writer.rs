//! The response channel handlers write into.
//!
//! A handler never returns bytes to the server directly. It receives a
//! `&mut dyn ResponseWriter` and:
//!
//! 1. edits [`headers_mut`](ResponseWriter::headers_mut),
//! 2. commits the head with [`write_head`](ResponseWriter::write_head),
//! 3. streams body chunks with [`write`](ResponseWriter::write).
//!
//! Once the head is committed it is on its way to the client: later header
//! edits are ignored and a second `write_head` is logged and dropped.
//!
//! Two implementations exist. The live writer created by the server for
//! every request forwards the head and each chunk to hyper as soon as they
//! are written. [`ResponseBuffer`] records everything in memory so that a
//! middleware can inspect or extend the response after downstream finished.

use bytes::{Bytes, BytesMut};
use http::StatusCode;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::headers::Headers;

/// Destination of one response.
pub trait ResponseWriter: Send {
    fn headers(&self) -> &Headers;

    /// Mutable headers. Changes made after the head was committed have no
    /// effect on the response.
    fn headers_mut(&mut self) -> &mut Headers;

    /// Commits status and headers. Only the first call counts.
    fn write_head(&mut self, status: StatusCode);

    /// Appends a body chunk, committing `200 OK` first if nothing was
    /// committed yet.
    fn write(&mut self, chunk: Bytes);

    /// The committed status, `None` while the head is still open.
    fn status(&self) -> Option<StatusCode>;

    fn is_committed(&self) -> bool {
        self.status().is_some()
    }
}

// ── ResponseBuffer ────────────────────────────────────────────────────────────

/// In-memory recorder for one response.
///
/// Headers are snapshotted when the head is committed, mirroring what the
/// live writer would have sent.
#[derive(Debug, Default)]
pub struct ResponseBuffer {
    headers: Headers,
    committed: Option<(StatusCode, Headers)>,
    body: BytesMut,
}

impl ResponseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Status, headers and body as they would have reached the client.
    ///
    /// A buffer nobody wrote to is a bodiless `200 OK`.
    pub fn into_parts(self) -> (StatusCode, Headers, Bytes) {
        let (status, headers) = self.committed.unwrap_or((StatusCode::OK, self.headers));
        (status, headers, self.body.freeze())
    }

    /// Replays the recorded response into `w`.
    ///
    /// Recorded headers are appended in their original order, then
    /// `extend` may add more before the head is committed. The body goes out
    /// as a single chunk.
    pub fn flush_into(self, w: &mut dyn ResponseWriter, extend: impl FnOnce(&mut Headers)) {
        let (status, headers, body) = self.into_parts();

        let live = w.headers_mut();
        for (name, value) in headers.iter() {
            live.add(name, value);
        }
        extend(live);

        w.write_head(status);
        if !body.is_empty() {
            w.write(body);
        }
    }
}

impl ResponseWriter for ResponseBuffer {
    fn headers(&self) -> &Headers {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    fn write_head(&mut self, status: StatusCode) {
        if let Some((committed, _)) = &self.committed {
            warn!(%committed, ignored = %status, "superfluous write_head");
            return;
        }
        self.committed = Some((status, self.headers.clone()));
    }

    fn write(&mut self, chunk: Bytes) {
        if self.committed.is_none() {
            self.write_head(StatusCode::OK);
        }
        self.body.extend_from_slice(&chunk);
    }

    fn status(&self) -> Option<StatusCode> {
        self.committed.as_ref().map(|(status, _)| *status)
    }
}

// ── LiveWriter ────────────────────────────────────────────────────────────────

/// The committed response head, as handed to hyper.
pub(crate) type Head = (StatusCode, Headers);

/// Writer connected to a client connection.
///
/// The head travels over a oneshot channel, body chunks over an unbounded
/// channel. Dropping the writer ends the body stream.
pub(crate) struct LiveWriter {
    headers: Headers,
    status: Option<StatusCode>,
    head_tx: Option<oneshot::Sender<Head>>,
    body_tx: mpsc::UnboundedSender<Bytes>,
}

impl LiveWriter {
    pub(crate) fn channel() -> (Self, oneshot::Receiver<Head>, mpsc::UnboundedReceiver<Bytes>) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::unbounded_channel();
        let writer = Self {
            headers: Headers::new(),
            status: None,
            head_tx: Some(head_tx),
            body_tx,
        };
        (writer, head_rx, body_rx)
    }

    /// Commits `200 OK` if the handler returned without writing anything.
    pub(crate) fn finish(&mut self) {
        if self.status.is_none() {
            self.write_head(StatusCode::OK);
        }
    }
}

impl ResponseWriter for LiveWriter {
    fn headers(&self) -> &Headers {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    fn write_head(&mut self, status: StatusCode) {
        let Some(head_tx) = self.head_tx.take() else {
            warn!(committed = ?self.status, ignored = %status, "superfluous write_head");
            return;
        };
        self.status = Some(status);
        if head_tx.send((status, self.headers.clone())).is_err() {
            debug!("client went away before the response head was sent");
        }
    }

    fn write(&mut self, chunk: Bytes) {
        if self.status.is_none() {
            self.write_head(StatusCode::OK);
        }
        if chunk.is_empty() {
            return;
        }
        if self.body_tx.send(chunk).is_err() {
            debug!("client went away, dropping response chunk");
        }
    }

    fn status(&self) -> Option<StatusCode> {
        self.status
    }
}
