//! # Lineage: the dispatch table of a concrete message type.
//!
//! Rust has no runtime reflection over base classes or implemented interfaces,
//! so every [`Message`] declares them once. The built [`Lineage`] is the
//! ordered list of keys the registry tries when resolving a channel:
//!
//! ```text
//!   exact type ──► bases[0] ──► bases[1] ──► … ──► interfaces[0] ──► interfaces[1] ──► …
//!   (the concrete)  (nearest ancestor first)       (declaration order)
//! ```
//!
//! Each step carries an upcast that turns the published `Arc<M>` into the
//! `Arc<K>` a listener bound to kind `K` expects.

use std::sync::Arc;

use super::{Message, MessageKind, Payload, TypeKey};

/// Which step of the lineage walk selected a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Route {
    /// Channel bound to the concrete message type.
    Exact,
    /// Channel bound to an ancestor; `depth` 0 is the nearest one.
    Base {
        /// Position in the declared base chain.
        depth: usize,
    },
    /// Channel bound to a marker interface.
    Interface {
        /// Position in the declared interface list.
        index: usize,
    },
}

impl Route {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            Route::Exact => "exact",
            Route::Base { .. } => "base",
            Route::Interface { .. } => "interface",
        }
    }
}

type Upcast<M> = Box<dyn Fn(Arc<M>) -> Payload + Send + Sync>;

struct Step<M> {
    key: TypeKey,
    upcast: Upcast<M>,
}

/// Declared base chain and marker interfaces of message type `M`.
///
/// Built through [`Message::lineage`]; both lists keep declaration order.
/// Targets that repeat an earlier key (or the concrete type itself) are skipped.
pub struct Lineage<M: Message> {
    key: TypeKey,
    bases: Vec<Step<M>>,
    interfaces: Vec<Step<M>>,
}

impl<M: Message> Lineage<M> {
    pub(crate) fn build() -> Self {
        let mut lineage = Self {
            key: TypeKey::of::<M>(),
            bases: Vec::new(),
            interfaces: Vec::new(),
        };
        M::lineage(&mut lineage);
        lineage
    }

    /// Appends an ancestor. Declare nearest first.
    pub fn base<B: ?Sized + MessageKind>(&mut self, upcast: fn(Arc<M>) -> Arc<B>) -> &mut Self {
        if let Some(step) = self.step::<B>(upcast) {
            self.bases.push(step);
        }
        self
    }

    /// Appends a marker interface.
    pub fn interface<I: ?Sized + MessageKind>(
        &mut self,
        upcast: fn(Arc<M>) -> Arc<I>,
    ) -> &mut Self {
        if let Some(step) = self.step::<I>(upcast) {
            self.interfaces.push(step);
        }
        self
    }

    fn step<K: ?Sized + MessageKind>(&self, upcast: fn(Arc<M>) -> Arc<K>) -> Option<Step<M>> {
        let key = TypeKey::of::<K>();
        if self.contains(&key) {
            tracing::debug!(message = %self.key, kind = %key, "duplicate lineage entry ignored");
            return None;
        }
        Some(Step {
            key,
            upcast: Box::new(move |message: Arc<M>| Box::new(upcast(message)) as Payload),
        })
    }

    fn contains(&self, key: &TypeKey) -> bool {
        self.key == *key
            || self.bases.iter().any(|s| s.key == *key)
            || self.interfaces.iter().any(|s| s.key == *key)
    }

    /// Key of the concrete type.
    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// Declared ancestors, nearest first.
    pub fn bases(&self) -> impl Iterator<Item = TypeKey> + '_ {
        self.bases.iter().map(|s| s.key)
    }

    /// Declared marker interfaces, in declaration order.
    pub fn interfaces(&self) -> impl Iterator<Item = TypeKey> + '_ {
        self.interfaces.iter().map(|s| s.key)
    }

    /// Every candidate key in resolution order, with the route it represents.
    pub(crate) fn candidates(&self) -> impl Iterator<Item = (Route, TypeKey)> + '_ {
        let exact = std::iter::once((Route::Exact, self.key));
        let bases = self
            .bases
            .iter()
            .enumerate()
            .map(|(depth, s)| (Route::Base { depth }, s.key));
        let interfaces = self
            .interfaces
            .iter()
            .enumerate()
            .map(|(index, s)| (Route::Interface { index }, s.key));
        exact.chain(bases).chain(interfaces)
    }

    /// Erases `message` into the payload shape expected by the channel behind `route`.
    ///
    /// Returns `None` if `route` does not belong to this lineage.
    pub(crate) fn upcast(&self, route: Route, message: Arc<M>) -> Option<Payload> {
        match route {
            Route::Exact => Some(Box::new(message)),
            Route::Base { depth } => self.bases.get(depth).map(|s| (s.upcast)(message)),
            Route::Interface { index } => self.interfaces.get(index).map(|s| (s.upcast)(message)),
        }
    }
}
