//! # Cancellation coordinator.
//!
//! Owns the single "current async publish" token of a bus.
//!
//! ## Architecture
//! ```text
//! root (bus lifetime)
//!   └─ child token #g   ← the only live slot; generation g
//!
//! begin():  slot.cancel()  →  g += 1  →  slot = root.child_token()
//! shutdown(): root.cancel()  (every child observes it)
//! ```
//!
//! ## Rules
//! - At most one live slot token at any time.
//! - Supersession is bus-wide: a fan-out for any message type cancels the
//!   pending one, whatever its type.
//! - Explicit caller tokens never pass through here.

use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

/// Token handed to one async fan-out, tagged with its generation.
#[derive(Clone, Debug)]
pub(crate) struct Scope {
    pub(crate) generation: u64,
    pub(crate) token: CancellationToken,
}

struct Slot {
    generation: u64,
    token: Option<CancellationToken>,
}

/// Single-slot, generation-counted cancellation source.
pub(crate) struct CancelCoordinator {
    root: CancellationToken,
    slot: Mutex<Slot>,
}

impl CancelCoordinator {
    pub(crate) fn new() -> Self {
        Self {
            root: CancellationToken::new(),
            slot: Mutex::new(Slot {
                generation: 0,
                token: None,
            }),
        }
    }

    /// Cancels the current slot (if any) and installs a fresh one.
    pub(crate) fn begin(&self) -> Scope {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.token.take() {
            previous.cancel();
            tracing::trace!(generation = slot.generation, "async fan-out superseded");
        }
        slot.generation += 1;
        let token = self.root.child_token();
        slot.token = Some(token.clone());
        Scope {
            generation: slot.generation,
            token,
        }
    }

    /// True if `generation` is still the live slot.
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.generation == generation && !self.root.is_cancelled()
    }

    /// Number of async fan-outs started through the slot so far.
    pub(crate) fn generation(&self) -> u64 {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).generation
    }

    /// Cancels the root; every slot token, past or future, is cancelled.
    pub(crate) fn shutdown(&self) {
        self.root.cancel();
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.token = None;
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.root.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_cancels_previous_scope() {
        let coord = CancelCoordinator::new();
        let first = coord.begin();
        assert!(coord.is_current(first.generation));

        let second = coord.begin();
        assert!(first.token.is_cancelled());
        assert!(!second.token.is_cancelled());
        assert!(!coord.is_current(first.generation));
        assert!(coord.is_current(second.generation));
        assert_eq!(coord.generation(), 2);
    }

    #[test]
    fn test_shutdown_cancels_live_and_future_scopes() {
        let coord = CancelCoordinator::new();
        let live = coord.begin();
        coord.shutdown();

        assert!(live.token.is_cancelled());
        assert!(coord.is_shut_down());
        assert!(!coord.is_current(live.generation));

        let after = coord.begin();
        assert!(after.token.is_cancelled());
    }
}
