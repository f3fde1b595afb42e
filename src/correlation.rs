//! Correlation ids: resolving, generating and carrying them in the context.

use std::fmt;
use std::sync::Arc;

use ulid::Ulid;

use crate::context::{Context, Key};
use crate::error::Error;
use crate::request::Request;

/// Request header carrying a caller-supplied correlation id.
pub const HEADER: &str = "X-Request-ID";

/// The single context slot holding the request's correlation id.
pub static CORRELATION_ID: Key<CorrelationId> = Key::new("correlation-id");

/// An opaque, non-empty request identifier.
///
/// Generated ids are ULIDs: 48 bits of millisecond timestamp followed by 80
/// random bits, Crockford base32 encoded, so they sort by creation time.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CorrelationId(Arc<str>);

impl CorrelationId {
    /// Wraps `value` as given. Returns `None` for an empty string.
    pub fn new(value: &str) -> Option<Self> {
        (!value.is_empty()).then(|| Self(Arc::from(value)))
    }

    pub fn generate() -> Self {
        Self(Arc::from(Ulid::new().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reads the caller-supplied id from the [`HEADER`] request header.
///
/// Surrounding whitespace is trimmed; a missing or blank header is
/// [`Error::InvalidHeader`].
pub fn resolve(req: &Request) -> Result<CorrelationId, Error> {
    req.header(HEADER)
        .map(str::trim)
        .and_then(CorrelationId::new)
        .ok_or(Error::InvalidHeader(HEADER))
}

/// Returns `ctx` with `id` bound, or `ctx` itself when `id` is empty.
pub fn attach(ctx: &Context, id: &str) -> Context {
    match CorrelationId::new(id) {
        Some(id) => ctx.with_value(&CORRELATION_ID, id),
        None => ctx.clone(),
    }
}

/// The id bound in `ctx`, if any.
pub fn extract(ctx: &Context) -> Option<CorrelationId> {
    ctx.value(&CORRELATION_ID)
        .filter(|id| !id.as_str().is_empty())
        .cloned()
}
