//! Delivery report returned by every publish.

use crate::message::{Route, TypeKey};

/// What a publish reached.
///
/// A publish that resolves to no channel is still a success and reports the
/// default value (no channel, no route, zero recipients).
///
/// ## Counting
/// - `recipients`: listeners invoked (sync, plus async ones started by this publish)
/// - `failures`: invoked listeners that panicked, as far as this publish observed
///
/// For the background tail of a synchronous `publish`, panics inside running
/// async listeners happen after the report is returned and are only logged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Kind of the channel that received the message.
    pub channel: Option<TypeKey>,
    /// How that channel was selected.
    pub route: Option<Route>,
    /// Listeners invoked.
    pub recipients: usize,
    /// Listeners that panicked.
    pub failures: usize,
}

impl Delivery {
    /// True if a channel received the message.
    pub fn is_resolved(&self) -> bool {
        self.channel.is_some()
    }
}
