//! Error types returned by the message bus.
//!
//! Listener failures never surface here: they are isolated, logged and counted
//! in [`Delivery::failures`](crate::Delivery). [`DispatchError`] only describes
//! why an awaited asynchronous fan-out did not run to completion.
//!
//! It provides helper methods (`as_label`, `as_message`) for logging/metrics,
//! like the rest of the runtime's error types.

use thiserror::Error;

/// # Errors produced by an asynchronous publish.
///
/// Cancellation is reported as an error value so the caller can tell it apart
/// from completion, but it is not a failure: listeners were asked to abandon
/// their work, nothing went wrong.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The aggregate was cancelled before every async listener finished.
    #[error("async fan-out for {message} cancelled (superseded: {superseded})")]
    Cancelled {
        /// Type name of the published message.
        message: &'static str,
        /// `true` when a newer publish replaced the shared token,
        /// `false` for an explicit token or bus shutdown.
        superseded: bool,
    },

    /// The bus was shut down; nothing was delivered.
    #[error("message bus is shut down")]
    Closed,

    /// No Tokio runtime is available to drive async listeners.
    #[error("no tokio runtime available for async fan-out of {message}")]
    NoRuntime {
        /// Type name of the published message.
        message: &'static str,
    },
}

impl DispatchError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use typebus::DispatchError;
    ///
    /// let err = DispatchError::Cancelled { message: "Ping", superseded: true };
    /// assert_eq!(err.as_label(), "dispatch_cancelled");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::Cancelled { .. } => "dispatch_cancelled",
            DispatchError::Closed => "dispatch_closed",
            DispatchError::NoRuntime { .. } => "dispatch_no_runtime",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            DispatchError::Cancelled {
                message,
                superseded: true,
            } => format!("superseded by a newer publish: {message}"),
            DispatchError::Cancelled { message, .. } => format!("cancelled: {message}"),
            DispatchError::Closed => "bus closed".to_string(),
            DispatchError::NoRuntime { message } => format!("no runtime: {message}"),
        }
    }

    /// Indicates whether the fan-out was cancelled (as opposed to never started).
    ///
    /// # Example
    /// ```
    /// use typebus::DispatchError;
    ///
    /// assert!(DispatchError::Cancelled { message: "Ping", superseded: false }.is_cancelled());
    /// assert!(!DispatchError::Closed.is_cancelled());
    /// ```
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DispatchError::Cancelled { .. })
    }
}
