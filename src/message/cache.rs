//! # Lineage cache.
//!
//! Memoizes the [`Lineage`] of each concrete message type, keyed by `TypeId`,
//! so the declaration in [`Message::lineage`] runs once per type rather than
//! on every publish.
//!
//! ## Rules
//! - Entries are created on first publish of a type.
//! - No eviction, except [`LineageCache::forget`] when the channel keyed by the
//!   same type is dropped from the registry.
//! - The set of published types is small and static in practice, so the map stays tiny.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{Lineage, Message, TypeKey};

type Entry = Arc<dyn Any + Send + Sync>;

/// Process-wide memo of concrete type → lineage.
#[derive(Default)]
pub(crate) struct LineageCache {
    entries: RwLock<HashMap<TypeId, Entry>>,
}

impl LineageCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the lineage of `M`, building and storing it on first use.
    pub(crate) fn lineage<M: Message>(&self) -> Arc<Lineage<M>> {
        let id = TypeId::of::<M>();

        if let Some(found) = self.get::<M>(id) {
            return found;
        }

        // Build outside the lock; `Message::lineage` is user code.
        let built: Arc<Lineage<M>> = Arc::new(Lineage::build());

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let entry = entries
            .entry(id)
            .or_insert_with(|| built.clone() as Entry)
            .clone();
        drop(entries);

        match entry.downcast::<Lineage<M>>() {
            Ok(lineage) => {
                tracing::trace!(message = %TypeKey::of::<M>(), "lineage cached");
                lineage
            }
            Err(_) => built,
        }
    }

    fn get<M: Message>(&self, id: TypeId) -> Option<Arc<Lineage<M>>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(&id)
            .cloned()
            .and_then(|entry| entry.downcast::<Lineage<M>>().ok())
    }

    /// Drops the entry keyed by `key`, if any.
    pub(crate) fn forget(&self, key: &TypeKey) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(&key.id()).is_some()
    }

    /// Drops every entry.
    pub(crate) fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.clear();
    }

    /// Number of cached types.
    pub(crate) fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tick;
    impl Message for Tick {}

    struct Tock;
    impl Message for Tock {}

    #[test]
    fn test_lineage_is_memoized_per_type() {
        let cache = LineageCache::new();
        let a = cache.lineage::<Tick>();
        let b = cache.lineage::<Tick>();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);

        let _ = cache.lineage::<Tock>();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_forget_drops_only_matching_entry() {
        let cache = LineageCache::new();
        let _ = cache.lineage::<Tick>();
        let _ = cache.lineage::<Tock>();

        assert!(cache.forget(&TypeKey::of::<Tick>()));
        assert!(!cache.forget(&TypeKey::of::<Tick>()));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert_eq!(cache.len(), 0);
    }
}
