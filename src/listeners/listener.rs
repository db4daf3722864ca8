//! # Listener handles.
//!
//! Two callback shapes can be bound to a message kind `T`:
//! - [`Listener<T>`]: synchronous `Fn(&T)`, runs inside `publish` before it returns;
//! - [`AsyncListener<T>`]: `Fn(Arc<T>, CancellationToken) -> Future`, runs as a
//!   Tokio task during the asynchronous fan-out.
//!
//! ## Identity
//! A handle wraps its callable in an `Arc`; the allocation address is the
//! [`ListenerId`]. Clones share the id, so the same handle (or a clone of it)
//! is what you pass to `remove_listener`. Two handles built from identical
//! closures are **different** listeners.
//!
//! ```text
//! let a = Listener::new(f);   ── id 0x…10
//! let b = a.clone();          ── id 0x…10  (same listener)
//! let c = Listener::new(f);   ── id 0x…40  (another listener)
//! ```

use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::handler::Handler;

/// Boxed future produced by an asynchronous listener.
pub type BoxListenerFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Allocation identity of a listener; the deduplication key inside a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(usize);

impl ListenerId {
    fn of<P: ?Sized>(ptr: *const P) -> Self {
        Self(ptr.cast::<()>() as usize)
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

pub(crate) type SyncCall<T> = Arc<dyn Fn(&T) + Send + Sync>;
pub(crate) type AsyncCall<T> = Arc<dyn Fn(Arc<T>, CancellationToken) -> BoxListenerFuture + Send + Sync>;

/// Synchronous listener bound to kind `T`.
///
/// # Example
/// ```rust
/// use typebus::{Listener, Message, MessageBus};
///
/// struct Jumped { height: f32 }
/// impl Message for Jumped {}
///
/// let bus = MessageBus::default();
/// let on_jump = Listener::new(|m: &Jumped| assert!(m.height > 0.0)).named("jump-audio");
///
/// assert!(bus.add_listener(&on_jump));
/// assert!(!bus.add_listener(&on_jump)); // same identity: no-op
///
/// let delivery = bus.publish(Jumped { height: 1.5 });
/// assert_eq!(delivery.recipients, 1);
/// ```
pub struct Listener<T: ?Sized> {
    call: SyncCall<T>,
    name: Cow<'static, str>,
}

impl<T: ?Sized + 'static> Listener<T> {
    /// Wraps a callback. The default name is the callback's type name.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        Self {
            call: Arc::new(f),
            name: Cow::Borrowed(std::any::type_name::<F>()),
        }
    }

    /// Replaces the name used in diagnostics.
    #[must_use]
    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Identity of this listener.
    pub fn id(&self) -> ListenerId {
        ListenerId::of(Arc::as_ptr(&self.call))
    }

    /// Name used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn call(&self) -> SyncCall<T> {
        Arc::clone(&self.call)
    }
}

impl<T: ?Sized> Clone for Listener<T> {
    fn clone(&self) -> Self {
        Self {
            call: Arc::clone(&self.call),
            name: self.name.clone(),
        }
    }
}

impl<T: ?Sized + 'static> fmt::Debug for Listener<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id())
            .field("name", &self.name)
            .finish()
    }
}

/// Asynchronous, cancellable listener bound to kind `T`.
///
/// The callback receives its own `Arc<T>` and a [`CancellationToken`]; it should
/// check the token and return promptly once it fires.
///
/// # Example
/// ```rust
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
/// use typebus::{AsyncListener, Message};
///
/// struct SaveRequested;
/// impl Message for SaveRequested {}
///
/// let saver = AsyncListener::new(|_m: Arc<SaveRequested>, token: CancellationToken| async move {
///     if token.is_cancelled() {
///         return;
///     }
///     // write the save file...
/// });
/// assert_eq!(saver.id(), saver.clone().id());
/// ```
pub struct AsyncListener<T: ?Sized> {
    call: AsyncCall<T>,
    id: ListenerId,
    name: Cow<'static, str>,
}

impl<T: ?Sized + Send + Sync + 'static> AsyncListener<T> {
    /// Wraps an async callback. The default name is the callback's type name.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<T>, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let call: AsyncCall<T> =
            Arc::new(move |message: Arc<T>, token: CancellationToken| -> BoxListenerFuture {
                Box::pin(f(message, token))
            });
        Self {
            id: ListenerId::of(Arc::as_ptr(&call)),
            call,
            name: Cow::Borrowed(std::any::type_name::<F>()),
        }
    }

    /// Wraps a shared [`Handler`] object.
    ///
    /// Identity is the handler's allocation: wrapping the same `Arc` twice
    /// yields the same listener.
    pub fn from_handler<H>(handler: Arc<H>) -> Self
    where
        H: Handler<T>,
    {
        let id = ListenerId::of(Arc::as_ptr(&handler));
        let name = Cow::Borrowed(handler.name());
        let call: AsyncCall<T> =
            Arc::new(move |message: Arc<T>, token: CancellationToken| -> BoxListenerFuture {
                let handler = Arc::clone(&handler);
                Box::pin(async move { handler.handle(message, token).await })
            });
        Self { call, id, name }
    }

    /// Replaces the name used in diagnostics.
    #[must_use]
    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Identity of this listener.
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Name used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn call(&self) -> AsyncCall<T> {
        Arc::clone(&self.call)
    }
}

impl<T: ?Sized> Clone for AsyncListener<T> {
    fn clone(&self) -> Self {
        Self {
            call: Arc::clone(&self.call),
            id: self.id,
            name: self.name.clone(),
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> fmt::Debug for AsyncListener<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncListener")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}
