//! Bus core: registry, dispatch and cancellation.
//!
//! The public API from this module is [`MessageBus`], with its [`Config`] and
//! the [`Delivery`] report every publish returns.
//!
//! Internal modules:
//! - [`bus`]: publish paths, registration and lifecycle;
//! - [`registry`]: kind → channel map and the exact → base → interface walk;
//! - [`cancel`]: the single-slot, bus-wide cancellation coordinator;
//! - [`config`]: diagnostics and background fan-out toggles;
//! - [`delivery`]: per-publish report.

mod bus;
mod cancel;
mod config;
mod delivery;
mod registry;

pub use bus::MessageBus;
pub use config::Config;
pub use delivery::Delivery;
