//! Per-connection state shared by the transport, the parser and handlers.
//!
//! [`Locals`] is a typed registry: each stored value is keyed by its own type,
//! so handlers can keep connection-scoped state (authentication progress,
//! capability negotiation, the emission log) without global mutable state.
//! Removing, replacing or clearing a value runs its [`Local::dispose`] hook.

use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::net::SocketAddr;

use dashmap::DashMap;
use encoding::Encoding;
use parking_lot::RwLock;

use crate::casemap::irc_eq;

/// A value that can live in a connection's [`Locals`].
pub trait Local: Any + Send + Sync {
    /// Release resources held by the value. Called exactly once when the
    /// value leaves the registry.
    fn dispose(&mut self) {}
}

trait Slot: Send + Sync {
    fn release(&mut self);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Local> Slot for T {
    fn release(&mut self) {
        Local::dispose(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Typed per-connection key/value store.
///
/// Closures passed to [`with`](Self::with), [`with_mut`](Self::with_mut) and
/// [`get_or_insert_with`](Self::get_or_insert_with) run while the entry is
/// locked and must not access the same `Locals` again.
#[derive(Default)]
pub struct Locals {
    slots: DashMap<TypeId, Box<dyn Slot>>,
}

impl Locals {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value`, disposing any previous value of the same type.
    pub fn insert<T: Local>(&self, value: T) {
        if let Some(mut old) = self.slots.insert(TypeId::of::<T>(), Box::new(value)) {
            old.release();
        }
    }

    /// Whether a value of type `T` is present.
    pub fn contains<T: Local>(&self) -> bool {
        self.slots.contains_key(&TypeId::of::<T>())
    }

    /// Borrow the value of type `T`.
    pub fn with<T: Local, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let slot = self.slots.get(&TypeId::of::<T>())?;
        (**slot).as_any().downcast_ref::<T>().map(f)
    }

    /// Mutably borrow the value of type `T`.
    pub fn with_mut<T: Local, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut slot = self.slots.get_mut(&TypeId::of::<T>())?;
        (**slot).as_any_mut().downcast_mut::<T>().map(f)
    }

    /// Mutably borrow the value of type `T`, creating it first if absent.
    pub fn get_or_insert_with<T: Local, R>(
        &self,
        init: impl FnOnce() -> T,
        f: impl FnOnce(&mut T) -> R,
    ) -> R {
        let mut slot = self
            .slots
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(init()) as Box<dyn Slot>);
        // Entries are keyed by the TypeId of their own value.
        let value = (**slot)
            .as_any_mut()
            .downcast_mut::<T>()
            .expect("slot type matches its key");
        f(value)
    }

    /// Remove and dispose the value of type `T`. Returns whether one existed.
    pub fn remove<T: Local>(&self) -> bool {
        match self.slots.remove(&TypeId::of::<T>()) {
            Some((_, mut slot)) => {
                slot.release();
                true
            }
            None => false,
        }
    }

    /// Remove and dispose every value.
    pub fn clear(&self) {
        let keys: Vec<TypeId> = self.slots.iter().map(|entry| *entry.key()).collect();
        for key in keys {
            if let Some((_, mut slot)) = self.slots.remove(&key) {
                slot.release();
            }
        }
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// One active server connection.
pub struct Connection {
    remote: Option<SocketAddr>,
    encoding: &'static Encoding,
    nickname: RwLock<String>,
    locals: Locals,
}

impl Connection {
    /// Create connection state for a socket to `remote`.
    pub fn new(
        remote: Option<SocketAddr>,
        encoding: &'static Encoding,
        nickname: impl Into<String>,
    ) -> Self {
        Self {
            remote,
            encoding,
            nickname: RwLock::new(nickname.into()),
            locals: Locals::new(),
        }
    }

    /// Remote address, when the stream has one.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }

    /// Negotiated character encoding.
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Current nickname.
    pub fn nickname(&self) -> String {
        self.nickname.read().clone()
    }

    /// Record a nickname change.
    pub fn set_nickname(&self, nickname: impl Into<String>) {
        *self.nickname.write() = nickname.into();
    }

    /// Whether `nick` refers to us.
    pub fn is_me(&self, nick: &str) -> bool {
        irc_eq(&self.nickname.read(), nick)
    }

    /// Connection-scoped handler state.
    pub fn locals(&self) -> &Locals {
        &self.locals
    }

    /// Decode raw line bytes with the connection's encoding.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        self.encoding.decode_without_bom_handling(bytes).0
    }

    /// Encode text with the connection's encoding.
    pub fn encode<'a>(&self, text: &'a str) -> Cow<'a, [u8]> {
        self.encoding.encode(text).0
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.locals.clear();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("remote", &self.remote)
            .field("encoding", &self.encoding.name())
            .field("nickname", &*self.nickname.read())
            .field("locals", &self.locals.len())
            .finish()
    }
}
