//! # Listeners and channels.
//!
//! ## Contents
//! - [`Listener`], [`AsyncListener`] cloneable handles whose `Arc` allocation is the identity
//! - [`Handler`] object-shaped async listener (`async-trait`)
//! - `Channel` the ordered listener set of one message kind, with sync and async raise
//! - [`Callback`] sealed seam letting `add_listener`/`remove_listener` accept both shapes
//!
//! ## Fan-out
//! ```text
//! publish(msg) ──► Channel snapshot (reverse registration order)
//!                   ├─► sync  cN … c2 c1   (inline, panic isolated)
//!                   └─► async aN … a2 a1   (one Tokio task each, joined as one aggregate)
//! ```

mod channel;
mod handler;
mod listener;

pub(crate) use channel::{Channel, ChannelSnapshot};
pub use handler::Handler;
pub use listener::{AsyncListener, BoxListenerFuture, Listener, ListenerId};

use crate::message::MessageKind;

pub(crate) mod sealed {
    use super::Channel;

    /// Channel-side half of [`Callback`](super::Callback); not nameable outside the crate.
    pub trait Attach {
        fn attach(&self, channel: &mut Channel) -> bool;
        fn detach(&self, channel: &mut Channel) -> bool;
    }
}

/// Either listener shape, as accepted by the bus registration methods.
///
/// Sealed: implemented for [`Listener<T>`] and [`AsyncListener<T>`] only.
pub trait Callback<T: ?Sized + MessageKind>: sealed::Attach {
    /// Identity of the listener.
    fn id(&self) -> ListenerId;

    /// Name used in diagnostics.
    fn name(&self) -> &str;
}

impl<T: ?Sized + MessageKind> sealed::Attach for Listener<T> {
    fn attach(&self, channel: &mut Channel) -> bool {
        channel.add_sync(self)
    }

    fn detach(&self, channel: &mut Channel) -> bool {
        channel.remove_sync(self.id())
    }
}

impl<T: ?Sized + MessageKind> sealed::Attach for AsyncListener<T> {
    fn attach(&self, channel: &mut Channel) -> bool {
        channel.add_async(self)
    }

    fn detach(&self, channel: &mut Channel) -> bool {
        channel.remove_async(self.id())
    }
}

impl<T: ?Sized + MessageKind> Callback<T> for Listener<T> {
    fn id(&self) -> ListenerId {
        Listener::id(self)
    }

    fn name(&self) -> &str {
        Listener::name(self)
    }
}

impl<T: ?Sized + MessageKind> Callback<T> for AsyncListener<T> {
    fn id(&self) -> ListenerId {
        AsyncListener::id(self)
    }

    fn name(&self) -> &str {
        AsyncListener::name(self)
    }
}
