//! # typebus
//!
//! **typebus** is a type-directed, in-process message bus for game runtimes.
//!
//! There are no topics: the message **type** is the address. Systems publish
//! plain values; listeners bind to a concrete message type, to a declared
//! ancestor, or to a marker interface, and exactly one channel receives each
//! message.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  system #1   │   │  system #2   │   │  system #3   │
//!     │ publish(M)   │   │ publish_async│   │ add_listener │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  MessageBus (cloneable handle, shared state)                      │
//! │  - LineageCache        (TypeId → declared bases / interfaces)     │
//! │  - ChannelRegistry     (kind → Channel, RwLock)                   │
//! │  - CancelCoordinator   (one live async token, generation count)   │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │ Channel<Foo> │   │Channel<dyn B>│   │Channel<dyn I>│
//!     │ sync + async │   │ sync + async │   │ sync + async │
//!     └──────────────┘   └──────────────┘   └──────────────┘
//! ```
//!
//! ### Publish
//! ```text
//! publish(msg: M)
//!   ├─► resolve: exact M ─► bases (nearest first) ─► interfaces (declared order) ─► none
//!   ├─► sync listeners   cN … c1   (inline, panic isolated)
//!   └─► async listeners  aN … a1   (Tokio tasks, one aggregate, shared or caller token)
//!
//! publish_async(A) … publish(B) | publish_async(B)
//!   └─► B cancels A's token: A's listeners see `token.cancelled()`,
//!       A's await returns DispatchError::Cancelled { superseded: true }
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                          |
//! |-------------------|--------------------------------------------------------------|---------------------------------------------|
//! | **Messages**      | Publishable types and their declared lineage.                | [`Message`], [`MessageKind`], [`Lineage`]   |
//! | **Listeners**     | Sync closures, async closures and handler objects.           | [`Listener`], [`AsyncListener`], [`Handler`]|
//! | **Dispatch**      | Resolution, LIFO fan-out, cancellable async aggregate.       | [`MessageBus`], [`Delivery`], [`Route`]     |
//! | **Errors**        | Typed outcome of an awaited async fan-out.                   | [`DispatchError`]                           |
//! | **Configuration** | Diagnostics and background fan-out toggles.                  | [`Config`]                                  |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use typebus::{AsyncListener, Lineage, Listener, Message, MessageBus, MessageKind, Route};
//!
//! trait Hit: Send + Sync {
//!     fn damage(&self) -> u32;
//! }
//! impl MessageKind for dyn Hit {}
//!
//! struct Arrow(u32);
//! impl Hit for Arrow {
//!     fn damage(&self) -> u32 { self.0 }
//! }
//! impl Message for Arrow {
//!     fn lineage(lineage: &mut Lineage<Self>) {
//!         lineage.interface::<dyn Hit>(|m| m);
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bus = MessageBus::default();
//!
//!     // Any `Hit` reaches this listener.
//!     let hud = Listener::<dyn Hit>::new(|hit| println!("-{} hp", hit.damage()));
//!     bus.add_listener(&hud);
//!
//!     // Async work gets a token that fires when a newer publish supersedes it.
//!     let save = AsyncListener::<dyn Hit>::new(|_hit, token: CancellationToken| async move {
//!         if !token.is_cancelled() {
//!             tokio::task::yield_now().await;
//!         }
//!     });
//!     bus.add_listener(&save);
//!
//!     let delivery = bus.publish_async(Arrow(12)).await?;
//!     assert_eq!(delivery.route, Some(Route::Interface { index: 0 }));
//!     assert_eq!(delivery.recipients, 2);
//!
//!     bus.shutdown();
//!     Ok(())
//! }
//! ```

mod core;
mod error;
mod listeners;
mod message;

// ---- Public re-exports ----

pub use core::{Config, Delivery, MessageBus};
pub use error::DispatchError;
pub use listeners::{AsyncListener, BoxListenerFuture, Callback, Handler, Listener, ListenerId};
pub use message::{Lineage, Message, MessageKind, Route, TypeKey};
