//! # Channel registry and resolution.
//!
//! Maps a message kind (`TypeId`) to its [`Channel`]. Channels are created on
//! the first registration for a kind and dropped the moment they become empty.
//!
//! ## Resolution
//! ```text
//! resolve(lineage of M):
//!   ├─► channels[M]                         → Route::Exact
//!   ├─► channels[base0], channels[base1] …  → Route::Base { depth }
//!   ├─► channels[if0],   channels[if1]   …  → Route::Interface { index }
//!   └─► none                                → no-op (optional warning upstream)
//! ```
//!
//! ## Rules
//! - First match wins; exactly one channel receives a message, never several.
//! - Registering at several levels of a hierarchy does **not** multiply delivery.
//! - The registry itself never runs user code; callers take a snapshot and
//!   release the lock before raising.

use std::any::TypeId;
use std::collections::HashMap;

use crate::listeners::{Callback, Channel, ChannelSnapshot};
use crate::message::{Lineage, Message, MessageKind, Route, TypeKey};

/// Outcome of a removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Removal {
    /// No channel exists for the kind.
    NoChannel,
    /// The channel exists but does not hold this listener.
    NotRegistered,
    /// Removed; `dropped` is true when the channel became empty and was removed.
    Removed { dropped: bool },
}

/// Kind → channel map.
#[derive(Default)]
pub(crate) struct ChannelRegistry {
    channels: HashMap<TypeId, Channel>,
}

impl ChannelRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Adds `listener` to the channel of `T`, creating the channel if needed.
    ///
    /// Returns `false` when the same identity is already registered for `T`.
    pub(crate) fn add<T, C>(&mut self, listener: &C) -> bool
    where
        T: ?Sized + MessageKind,
        C: Callback<T>,
    {
        let key = TypeKey::of::<T>();
        let channel = self
            .channels
            .entry(key.id())
            .or_insert_with(|| Channel::new(key));
        let added = listener.attach(channel);

        // A rejected add must not leave a fresh, empty channel behind.
        if channel.is_empty() {
            self.channels.remove(&key.id());
        }
        added
    }

    /// Removes `listener` from the channel of `T`, dropping the channel once empty.
    pub(crate) fn remove<T, C>(&mut self, listener: &C) -> Removal
    where
        T: ?Sized + MessageKind,
        C: Callback<T>,
    {
        let key = TypeKey::of::<T>();
        let Some(channel) = self.channels.get_mut(&key.id()) else {
            return Removal::NoChannel;
        };
        if !listener.detach(channel) {
            return Removal::NotRegistered;
        }

        let dropped = channel.is_empty();
        if dropped {
            self.channels.remove(&key.id());
        }
        Removal::Removed { dropped }
    }

    /// Selects the single channel responsible for `M`, walking its lineage.
    pub(crate) fn resolve<M: Message>(&self, lineage: &Lineage<M>) -> Option<(Route, ChannelSnapshot)> {
        lineage.candidates().find_map(|(route, key)| {
            self.channels
                .get(&key.id())
                .map(|channel| (route, channel.snapshot()))
        })
    }

    /// Listeners (sync + async) bound to exactly `key`.
    pub(crate) fn listener_count(&self, key: &TypeKey) -> usize {
        self.channels.get(&key.id()).map_or(0, Channel::len)
    }

    /// Number of live channels.
    pub(crate) fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Listeners across every channel.
    pub(crate) fn total_listener_count(&self) -> usize {
        self.channels.values().map(Channel::len).sum()
    }

    /// Drops every channel; returns their keys.
    pub(crate) fn clear(&mut self) -> Vec<TypeKey> {
        self.channels.drain().map(|(_, channel)| channel.key()).collect()
    }
}
