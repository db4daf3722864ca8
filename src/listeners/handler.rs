//! # Handler objects.
//!
//! Systems usually react to messages from a long-lived object rather than a
//! free closure. [`Handler`] is the object-shaped counterpart of
//! [`AsyncListener::new`](crate::AsyncListener::new); wrap it with
//! [`AsyncListener::from_handler`](crate::AsyncListener::from_handler).
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use async_trait::async_trait;
//! use tokio_util::sync::CancellationToken;
//! use typebus::{AsyncListener, Handler, Message, MessageBus};
//!
//! struct ScoreChanged(u64);
//! impl Message for ScoreChanged {}
//!
//! #[derive(Default)]
//! struct Leaderboard { best: AtomicU64 }
//!
//! #[async_trait]
//! impl Handler<ScoreChanged> for Leaderboard {
//!     async fn handle(&self, msg: Arc<ScoreChanged>, token: CancellationToken) {
//!         if token.is_cancelled() { return; }
//!         self.best.fetch_max(msg.0, Ordering::Relaxed);
//!     }
//!
//!     fn name(&self) -> &'static str { "leaderboard" }
//! }
//!
//! let bus = MessageBus::default();
//! let board = Arc::new(Leaderboard::default());
//! assert!(bus.add_listener(&AsyncListener::<ScoreChanged>::from_handler(board.clone())));
//! assert!(!bus.add_listener(&AsyncListener::<ScoreChanged>::from_handler(board))); // same object
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Asynchronous message handler bound to kind `T`.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Observe `token`; it fires when a newer publish supersedes this one or the bus shuts down.
/// - Panics are caught and logged by the bus; they never reach the publisher.
#[async_trait]
pub trait Handler<T: ?Sized + Send + Sync + 'static>: Send + Sync + 'static {
    /// Processes one message.
    async fn handle(&self, message: Arc<T>, token: CancellationToken);

    /// Name used in diagnostics.
    ///
    /// The default uses `type_name::<Self>()`, which can be verbose - override it when possible.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
