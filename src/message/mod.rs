//! # Messages and message kinds.
//!
//! A message is any value whose **type** is the address. There are no topic
//! strings: publishing a `PlayerDied` reaches the listeners bound to
//! `PlayerDied` (or to one of its declared ancestors / marker interfaces).
//!
//! ## Contents
//! - [`Message`] publishable concrete types, with an optional lineage declaration
//! - [`MessageKind`] anything a listener may bind to (messages, abstract bases, markers)
//! - [`Lineage`] ordered base chain + marker interfaces of a concrete message
//! - [`TypeKey`] `TypeId` + type name, used as the registry key
//!
//! ## Kinds
//! ```text
//!   concrete message ──► Message + MessageKind (blanket)
//!   abstract base    ──► dyn BaseTrait   : MessageKind (opt-in)
//!   marker interface ──► dyn MarkerTrait : MessageKind (opt-in)
//! ```
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use typebus::{Lineage, Message, MessageKind};
//!
//! trait Damage: Send + Sync {
//!     fn amount(&self) -> u32;
//! }
//! impl MessageKind for dyn Damage {}
//!
//! struct FireDamage(u32);
//!
//! impl Damage for FireDamage {
//!     fn amount(&self) -> u32 { self.0 }
//! }
//!
//! impl Message for FireDamage {
//!     fn lineage(lineage: &mut Lineage<Self>) {
//!         lineage.interface::<dyn Damage>(|m| m);
//!     }
//! }
//! ```

mod cache;
mod lineage;

pub(crate) use cache::LineageCache;
pub use lineage::{Lineage, Route};

use std::any::{Any, TypeId};
use std::fmt;

/// Type-erased message as carried through a channel.
///
/// Always holds an `Arc<K>` where `K` is the kind of the channel that receives it.
pub(crate) type Payload = Box<dyn Any + Send + Sync>;

/// A publishable message type.
///
/// Implement it for every concrete value you want to publish. The default
/// lineage is empty: only listeners bound to the exact type receive it.
///
/// Messages are immutable by convention; listeners only ever see `&T` or `Arc<T>`.
pub trait Message: Send + Sync + Sized + 'static {
    /// Declares the ancestor chain and marker interfaces of this type.
    ///
    /// Called once per type, on first publish; the result is memoized.
    fn lineage(lineage: &mut Lineage<Self>) {
        let _ = lineage;
    }
}

/// A type listeners can bind to.
///
/// Implemented for every [`Message`]. Abstract bases and marker interfaces are
/// trait-object types that opt in explicitly:
///
/// ```rust
/// use typebus::MessageKind;
///
/// trait UiEvent: Send + Sync {}
/// impl MessageKind for dyn UiEvent {}
/// ```
pub trait MessageKind: Send + Sync + 'static {}

impl<M: Message> MessageKind for M {}

/// Identity of a message kind: its `TypeId` plus its name for diagnostics.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Key of `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Underlying `TypeId`.
    #[inline]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl std::hash::Hash for TypeKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
