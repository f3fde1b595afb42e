//! Immutable per-request context.
//!
//! A [`Context`] is a persistent list of key/value bindings. Adding a value
//! returns a new context that shares everything already bound; the original
//! is never touched, so a middleware can hand an enriched context downstream
//! without affecting what its caller sees.
//!
//! Keys are [`Key`] statics compared by address, not by name. Two modules
//! that both declare `Key::new("id")` get two unrelated slots:
//!
//! ```rust
//! use waypost::context::{Context, Key};
//!
//! static TENANT: Key<String> = Key::new("tenant");
//!
//! let root = Context::new();
//! let ctx = root.with_value(&TENANT, "acme".to_owned());
//!
//! assert_eq!(ctx.value(&TENANT).map(String::as_str), Some("acme"));
//! assert!(root.value(&TENANT).is_none());
//! ```

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// An opaque context key for values of type `T`.
///
/// Declare keys as `static` items; the key's identity is its address.
pub struct Key<T> {
    name: &'static str,
    _value: PhantomData<fn() -> T>,
}

impl<T> Key<T> {
    pub const fn new(name: &'static str) -> Self {
        Self { name, _value: PhantomData }
    }

    /// Label used in `Debug` output only.
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn id(&'static self) -> usize {
        std::ptr::from_ref(self) as usize
    }
}

struct Binding {
    key: usize,
    name: &'static str,
    value: Box<dyn Any + Send + Sync>,
    parent: Option<Arc<Binding>>,
}

/// Key/value carrier scoped to one request.
///
/// Cloning is one `Arc` increment.
#[derive(Clone, Default)]
pub struct Context {
    head: Option<Arc<Binding>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new context with `value` bound under `key`.
    ///
    /// A later binding of the same key shadows earlier ones.
    pub fn with_value<T: Send + Sync + 'static>(&self, key: &'static Key<T>, value: T) -> Self {
        Self {
            head: Some(Arc::new(Binding {
                key: key.id(),
                name: key.name,
                value: Box::new(value),
                parent: self.head.clone(),
            })),
        }
    }

    /// The most recent value bound under `key`.
    pub fn value<T: 'static>(&self, key: &'static Key<T>) -> Option<&T> {
        let id = key.id();
        let mut node = self.head.as_deref();
        while let Some(binding) = node {
            if binding.key == id {
                return binding.value.downcast_ref::<T>();
            }
            node = binding.parent.as_deref();
        }
        None
    }

    /// Whether both contexts share the exact same bindings.
    pub fn same_as(&self, other: &Context) -> bool {
        match (&self.head, &other.head) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys = Vec::new();
        let mut node = self.head.as_deref();
        while let Some(binding) = node {
            keys.push(binding.name);
            node = binding.parent.as_deref();
        }
        f.debug_struct("Context").field("keys", &keys).finish()
    }
}
