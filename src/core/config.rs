//! # Bus configuration.
//!
//! Provides [`Config`] centralized settings for a [`MessageBus`](crate::MessageBus).
//!
//! Config only toggles diagnostics and the background async tail; dispatch
//! semantics (resolution order, LIFO, supersession) are fixed.

/// Settings for a message bus.
///
/// ## Field semantics
/// - `warn_unresolved`: log a warning when a publish finds no channel
/// - `warn_registration`: log a warning on duplicate adds / unknown removals
/// - `async_on_publish`: a synchronous `publish` also starts the async fan-out in the background
///
/// ## Notes
/// All fields are public for flexibility, like the runtime's other plain settings.
#[derive(Clone, Debug)]
pub struct Config {
    /// Warn when a published message resolves to no channel.
    ///
    /// Publishing is still a successful no-op; this only controls the diagnostic.
    pub warn_unresolved: bool,

    /// Warn when a listener is added twice or removed without being registered.
    pub warn_registration: bool,

    /// Start the async fan-out as an unobserved background task on `publish`.
    ///
    /// - Needs a Tokio runtime on the calling thread; skipped (with a warning) otherwise.
    /// - Every `publish` takes the shared cancellation slot, resolved or not, so it
    ///   supersedes any pending async fan-out.
    /// - The background task only starts when the resolved channel has async listeners.
    pub async_on_publish: bool,
}

impl Config {
    /// Configuration with every diagnostic disabled.
    ///
    /// Handy for hot paths where misses are expected (optional listeners).
    pub fn quiet() -> Self {
        Self {
            warn_unresolved: false,
            warn_registration: false,
            ..Self::default()
        }
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `warn_unresolved = true`
    /// - `warn_registration = true`
    /// - `async_on_publish = true` (sync publishers still reach async listeners)
    fn default() -> Self {
        Self {
            warn_unresolved: true,
            warn_registration: true,
            async_on_publish: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_keeps_async_tail() {
        let cfg = Config::quiet();
        assert!(!cfg.warn_unresolved);
        assert!(!cfg.warn_registration);
        assert!(cfg.async_on_publish);
    }
}
