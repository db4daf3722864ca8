//! # MessageBus: type-directed publish/subscribe.
//!
//! The [`MessageBus`] owns the channel registry, the lineage cache and the
//! cancellation coordinator. Handles are cheap to clone and share one state.
//!
//! ## Architecture
//! ```text
//! publish(M) / publish_async(M)
//!   │
//!   ├─► LineageCache::lineage::<M>()            (memoized per TypeId)
//!   ├─► registry.read().resolve(lineage)        exact → base → interface
//!   │        └─► (Route, ChannelSnapshot)       lock released here
//!   ├─► lineage.upcast(route, Arc<M>)           Arc<K> for the channel kind K
//!   ├─► snapshot.raise(payload)                 sync listeners, LIFO, inline
//!   └─► async listeners
//!         ├─ publish:             coordinator.begin() → spawn(join)     (unobserved tail, begin() even on a miss)
//!         ├─ publish_async:       coordinator.begin() → join().await    (superseding)
//!         └─ publish_async_with:  caller token        → join().await    (coordinator untouched)
//! ```
//!
//! ## Rules
//! - Exactly one channel receives a message; a miss is a no-op.
//! - Sync listeners have all returned before any async listener is started.
//! - No lock is held while user code runs, so listeners may add or remove
//!   listeners (themselves included); changes apply from the next publish.
//! - Listener panics never reach the publisher.
//! - A publish that uses the shared token cancels whichever async fan-out was
//!   pending on it, whatever its message type.

use std::any::type_name;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use super::cancel::CancelCoordinator;
use super::config::Config;
use super::delivery::Delivery;
use super::registry::{ChannelRegistry, Removal};
use crate::error::DispatchError;
use crate::listeners::{Callback, ChannelSnapshot};
use crate::message::{LineageCache, Message, MessageKind, Payload, Route, TypeKey};

struct Inner {
    cfg: Config,
    registry: RwLock<ChannelRegistry>,
    cache: LineageCache,
    cancel: CancelCoordinator,
}

/// Resolved target of one publish.
struct Resolved {
    route: Route,
    snapshot: ChannelSnapshot,
    payload: Payload,
}

impl Resolved {
    /// Runs the synchronous listeners and starts the report.
    fn raise(&self) -> Delivery {
        let out = self.snapshot.raise(&self.payload);
        Delivery {
            channel: Some(self.snapshot.key()),
            route: Some(self.route),
            recipients: out.invoked,
            failures: out.failures,
        }
    }
}

/// In-process message bus keyed by message type.
///
/// # Example
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use typebus::{Listener, Message, MessageBus};
///
/// struct LevelUp(u32);
/// impl Message for LevelUp {}
///
/// let bus = MessageBus::default();
/// let level = Arc::new(AtomicU32::new(0));
///
/// let seen = level.clone();
/// let on_level = Listener::new(move |m: &LevelUp| seen.store(m.0, Ordering::Relaxed));
/// assert!(bus.add_listener(&on_level));
///
/// let delivery = bus.publish(LevelUp(7));
/// assert_eq!(delivery.recipients, 1);
/// assert_eq!(level.load(Ordering::Relaxed), 7);
///
/// assert!(bus.remove_listener(&on_level));
/// assert_eq!(bus.channel_count(), 0);
/// ```
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<Inner>,
}

impl MessageBus {
    /// Creates an empty bus.
    pub fn new(cfg: Config) -> Self {
        Self {
            inner: Arc::new(Inner {
                cfg,
                registry: RwLock::new(ChannelRegistry::new()),
                cache: LineageCache::new(),
                cancel: CancelCoordinator::new(),
            }),
        }
    }

    /// Configuration this bus was built with.
    pub fn config(&self) -> &Config {
        &self.inner.cfg
    }

    fn read(&self) -> RwLockReadGuard<'_, ChannelRegistry> {
        self.inner.registry.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ChannelRegistry> {
        self.inner.registry.write().unwrap_or_else(|e| e.into_inner())
    }

    // ---- registration ----

    /// Registers `listener` on the channel of kind `T`.
    ///
    /// Accepts both [`Listener<T>`](crate::Listener) and
    /// [`AsyncListener<T>`](crate::AsyncListener). Returns `false` (and warns)
    /// if the same listener is already registered for `T`, or if the bus is
    /// shut down.
    pub fn add_listener<T, C>(&self, listener: &C) -> bool
    where
        T: ?Sized + MessageKind,
        C: Callback<T>,
    {
        let mut registry = self.write();
        if self.inner.cancel.is_shut_down() {
            drop(registry);
            tracing::warn!(
                kind = %TypeKey::of::<T>(),
                listener = listener.name(),
                "message bus is shut down; listener rejected"
            );
            return false;
        }

        let added = registry.add(listener);
        drop(registry);

        if added {
            tracing::trace!(kind = %TypeKey::of::<T>(), listener = listener.name(), "listener added");
        } else if self.inner.cfg.warn_registration {
            tracing::warn!(
                kind = %TypeKey::of::<T>(),
                listener = listener.name(),
                "listener already added"
            );
        }
        added
    }

    /// Unregisters `listener` from the channel of kind `T`.
    ///
    /// Pass the same handle (or a clone of it) that was added. When the
    /// channel becomes empty it is removed together with the lineage cache
    /// entry keyed by `T`. Returns `false` (and warns) if it was not registered.
    pub fn remove_listener<T, C>(&self, listener: &C) -> bool
    where
        T: ?Sized + MessageKind,
        C: Callback<T>,
    {
        let key = TypeKey::of::<T>();
        let removal = self.write().remove(listener);

        match removal {
            Removal::Removed { dropped } => {
                if dropped {
                    self.inner.cache.forget(&key);
                    tracing::debug!(kind = %key, "channel dropped");
                }
                true
            }
            Removal::NoChannel | Removal::NotRegistered => {
                if self.inner.cfg.warn_registration {
                    tracing::warn!(kind = %key, listener = listener.name(), "listener not found");
                }
                false
            }
        }
    }

    // ---- publishing ----

    /// Delivers `message` to the synchronous listeners of the resolved channel.
    ///
    /// With [`Config::async_on_publish`] set and a Tokio runtime available,
    /// every call also takes the shared token, superseding any pending async
    /// fan-out (whatever its message type, and even when `message` resolves to
    /// no channel). Async listeners of the resolved channel are then started
    /// as an unobserved background fan-out on that token.
    pub fn publish<M: Message>(&self, message: M) -> Delivery {
        if self.inner.cancel.is_shut_down() {
            tracing::warn!(message = type_name::<M>(), "message bus is shut down; publish ignored");
            return Delivery::default();
        }

        let resolved = self.resolve(Arc::new(message));
        let mut delivery = resolved.as_ref().map(Resolved::raise).unwrap_or_default();
        if !self.inner.cfg.async_on_publish {
            return delivery;
        }

        let resolved = resolved.filter(|r| r.snapshot.has_async());
        let Ok(runtime) = Handle::try_current() else {
            if resolved.is_some() {
                tracing::warn!(
                    message = type_name::<M>(),
                    "no tokio runtime; async listeners skipped"
                );
            }
            return delivery;
        };

        let scope = self.inner.cancel.begin();
        let Some(resolved) = resolved else {
            return delivery;
        };

        let pending = resolved
            .snapshot
            .start_async(&runtime, &resolved.payload, scope.token);
        let started = pending.started();
        delivery.recipients += started.invoked;
        delivery.failures += started.failures;

        let generation = scope.generation;
        runtime.spawn(async move {
            if pending.join().await.is_err() {
                tracing::debug!(
                    message = type_name::<M>(),
                    generation,
                    "background async fan-out cancelled"
                );
            }
        });
        delivery
    }

    /// Delivers `message` to every listener of the resolved channel and waits
    /// for the async ones.
    ///
    /// Sync listeners run first. Async listeners share the bus-wide token:
    /// starting this fan-out cancels the pending one (any message type), and a
    /// later publish cancels this one, which then returns
    /// [`DispatchError::Cancelled`] with `superseded: true`.
    ///
    /// # Errors
    /// - [`DispatchError::Cancelled`] if the shared token fired before all async listeners finished
    /// - [`DispatchError::Closed`] if the bus is shut down
    /// - [`DispatchError::NoRuntime`] if polled outside a Tokio runtime with async listeners to run
    pub async fn publish_async<M: Message>(&self, message: M) -> Result<Delivery, DispatchError> {
        self.dispatch(message, None).await
    }

    /// Like [`publish_async`](Self::publish_async), but async listeners observe
    /// `token` instead of the shared one.
    ///
    /// The coordinator is not touched: this fan-out neither supersedes nor
    /// can be superseded. It is still cancelled by [`shutdown`](Self::shutdown)
    /// only if `token` is.
    pub async fn publish_async_with<M: Message>(
        &self,
        message: M,
        token: CancellationToken,
    ) -> Result<Delivery, DispatchError> {
        self.dispatch(message, Some(token)).await
    }

    async fn dispatch<M: Message>(
        &self,
        message: M,
        token: Option<CancellationToken>,
    ) -> Result<Delivery, DispatchError> {
        if self.inner.cancel.is_shut_down() {
            return Err(DispatchError::Closed);
        }

        let resolved = self.resolve(Arc::new(message));
        let mut delivery = resolved.as_ref().map(Resolved::raise).unwrap_or_default();

        // Checked before taking the shared slot: a publish that cannot run
        // must not cancel the pending one.
        let resolved = resolved.filter(|r| r.snapshot.has_async());
        let runtime = match resolved {
            Some(_) => Some(Handle::try_current().map_err(|_| DispatchError::NoRuntime {
                message: type_name::<M>(),
            })?),
            None => None,
        };

        // The shared slot is taken even on a miss: any async publish supersedes.
        let (token, generation) = match token {
            Some(token) => (token, None),
            None => {
                let scope = self.inner.cancel.begin();
                (scope.token, Some(scope.generation))
            }
        };

        let (Some(resolved), Some(runtime)) = (resolved, runtime) else {
            return Ok(delivery);
        };
        let pending = resolved
            .snapshot
            .start_async(&runtime, &resolved.payload, token);
        match pending.join().await {
            Ok(out) => {
                delivery.recipients += out.invoked;
                delivery.failures += out.failures;
                Ok(delivery)
            }
            Err(_) => {
                let superseded = generation.is_some_and(|g| !self.inner.cancel.is_current(g))
                    && !self.inner.cancel.is_shut_down();
                tracing::debug!(message = type_name::<M>(), superseded, "async fan-out cancelled");
                Err(DispatchError::Cancelled {
                    message: type_name::<M>(),
                    superseded,
                })
            }
        }
    }

    /// Resolves the channel for `M` and erases the message for it.
    fn resolve<M: Message>(&self, message: Arc<M>) -> Option<Resolved> {
        let lineage = self.inner.cache.lineage::<M>();
        let found = self.read().resolve(&lineage);

        let Some((route, snapshot)) = found else {
            if self.inner.cfg.warn_unresolved {
                tracing::warn!(message = %lineage.key(), "no channel for published message");
            }
            return None;
        };

        let Some(payload) = lineage.upcast(route, message) else {
            tracing::error!(
                message = %lineage.key(),
                route = route.as_label(),
                "resolved route missing from lineage"
            );
            return None;
        };

        tracing::trace!(
            message = %lineage.key(),
            channel = %snapshot.key(),
            route = route.as_label(),
            "message resolved"
        );
        Some(Resolved {
            route,
            snapshot,
            payload,
        })
    }

    // ---- diagnostics ----

    /// Listeners (sync + async) registered for exactly kind `T`.
    pub fn listener_count<T: ?Sized + MessageKind>(&self) -> usize {
        self.read().listener_count(&TypeKey::of::<T>())
    }

    /// Number of live channels.
    pub fn channel_count(&self) -> usize {
        self.read().channel_count()
    }

    /// Listeners across all channels.
    pub fn total_listener_count(&self) -> usize {
        self.read().total_listener_count()
    }

    /// Number of memoized lineages.
    pub fn cached_type_count(&self) -> usize {
        self.inner.cache.len()
    }

    /// Number of async fan-outs started on the shared token.
    pub fn generation(&self) -> u64 {
        self.inner.cancel.generation()
    }

    // ---- lifecycle ----

    /// Cancels pending async fan-outs on the shared token, drops every
    /// channel and the lineage cache, and rejects further work.
    ///
    /// Idempotent. Listener tasks already running are not aborted; they see
    /// their token cancelled.
    pub fn shutdown(&self) {
        if self.inner.cancel.is_shut_down() {
            return;
        }
        self.inner.cancel.shutdown();
        let dropped = self.write().clear();
        self.inner.cache.clear();
        tracing::debug!(channels = dropped.len(), "message bus shut down");
    }

    /// True once [`shutdown`](Self::shutdown) was called on any handle.
    pub fn is_shut_down(&self) -> bool {
        self.inner.cancel.is_shut_down()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBus")
            .field("channels", &self.channel_count())
            .field("listeners", &self.total_listener_count())
            .field("generation", &self.generation())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listeners::{AsyncListener, Handler, Listener};
    use crate::message::Lineage;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;
    use tokio::sync::{Notify, mpsc};

    struct Ping(u32);
    impl Message for Ping {}

    struct Pong;
    impl Message for Pong {}

    trait Creature: Send + Sync {
        fn label(&self) -> &'static str;
    }
    impl MessageKind for dyn Creature {}

    trait Tagged: Send + Sync {}
    impl MessageKind for dyn Tagged {}

    struct Goblin;
    impl Creature for Goblin {
        fn label(&self) -> &'static str {
            "goblin"
        }
    }
    impl Tagged for Goblin {}
    impl Message for Goblin {
        fn lineage(lineage: &mut Lineage<Self>) {
            lineage
                .base::<dyn Creature>(|m| m)
                .interface::<dyn Tagged>(|m| m);
        }
    }

    fn log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn entries(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    /// Async listener on `Ping` that signals `started`, then waits for its
    /// token (recording that) or for `work` to elapse.
    fn waiting(
        started: &Arc<Notify>,
        cancelled: &Arc<AtomicUsize>,
        work: Duration,
    ) -> AsyncListener<Ping> {
        let started = Arc::clone(started);
        let cancelled = Arc::clone(cancelled);
        AsyncListener::new(move |_m: Arc<Ping>, token: CancellationToken| {
            let started = Arc::clone(&started);
            let cancelled = Arc::clone(&cancelled);
            async move {
                started.notify_one();
                tokio::select! {
                    _ = token.cancelled() => { cancelled.fetch_add(1, Ordering::SeqCst); }
                    _ = tokio::time::sleep(work) => {}
                }
            }
        })
    }

    #[test]
    fn test_adding_twice_is_idempotent() {
        let bus = MessageBus::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let listener = Listener::new(move |_: &Ping| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        assert!(bus.add_listener(&listener));
        assert!(!bus.add_listener(&listener.clone()));
        assert_eq!(bus.listener_count::<Ping>(), 1);

        let delivery = bus.publish(Ping(1));
        assert_eq!(delivery.recipients, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_add_then_remove_drops_channel_and_cache() {
        let bus = MessageBus::default();
        let listener = Listener::new(|_: &Ping| {});

        assert!(bus.add_listener(&listener));
        assert_eq!(bus.channel_count(), 1);
        bus.publish(Ping(0));
        assert_eq!(bus.cached_type_count(), 1);

        assert!(bus.remove_listener(&listener));
        assert_eq!(bus.channel_count(), 0);
        assert_eq!(bus.total_listener_count(), 0);
        assert_eq!(bus.cached_type_count(), 0);
        assert!(!bus.remove_listener(&listener));
    }

    #[test]
    fn test_exact_type_wins_over_base() {
        let bus = MessageBus::default();
        let seen = log();
        let (a, b) = (Arc::clone(&seen), Arc::clone(&seen));
        bus.add_listener(&Listener::<dyn Creature>::new(move |c| {
            a.lock().unwrap().push(format!("base:{}", c.label()))
        }));
        bus.add_listener(&Listener::new(move |_: &Goblin| {
            b.lock().unwrap().push("exact".into())
        }));

        let delivery = bus.publish(Goblin);

        assert_eq!(delivery.route, Some(Route::Exact));
        assert_eq!(delivery.channel, Some(TypeKey::of::<Goblin>()));
        assert_eq!(entries(&seen), vec!["exact"]);
    }

    #[test]
    fn test_interface_ranks_below_base() {
        let bus = MessageBus::default();
        let seen = log();
        let (a, b) = (Arc::clone(&seen), Arc::clone(&seen));
        let tagged = Listener::<dyn Tagged>::new(move |_| a.lock().unwrap().push("tagged".into()));
        let creature = Listener::<dyn Creature>::new(move |c| {
            b.lock().unwrap().push(c.label().to_string())
        });
        bus.add_listener(&tagged);
        bus.add_listener(&creature);

        let first = bus.publish(Goblin);
        assert_eq!(first.route, Some(Route::Base { depth: 0 }));

        bus.remove_listener(&creature);
        let second = bus.publish(Goblin);
        assert_eq!(second.route, Some(Route::Interface { index: 0 }));

        assert_eq!(entries(&seen), vec!["goblin", "tagged"]);
    }

    #[test]
    fn test_publish_runs_listeners_last_in_first_out() {
        let bus = MessageBus::default();
        let seen = log();
        for tag in ["c1", "c2", "c3"] {
            let seen = Arc::clone(&seen);
            bus.add_listener(&Listener::new(move |_: &Ping| seen.lock().unwrap().push(tag.into())));
        }

        bus.publish(Ping(0));
        assert_eq!(entries(&seen), vec!["c3", "c2", "c1"]);
    }

    #[test]
    fn test_panicking_listener_does_not_stop_siblings() {
        let bus = MessageBus::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        bus.add_listener(&Listener::new(move |_: &Ping| {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        bus.add_listener(&Listener::new(|_: &Ping| panic!("listener bug")));

        let delivery = bus.publish(Ping(0));

        assert_eq!(delivery.recipients, 2);
        assert_eq!(delivery.failures, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_publish_without_listeners_is_a_noop() {
        let bus = MessageBus::new(Config::quiet());
        let delivery = bus.publish(Pong);
        assert_eq!(delivery, Delivery::default());
        assert!(!delivery.is_resolved());
    }

    #[test]
    fn test_listener_removing_itself_during_publish() {
        let bus = MessageBus::default();
        let hits = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let me: Arc<OnceLock<Listener<Ping>>> = Arc::new(OnceLock::new());
            let (slot, bus2, h) = (Arc::clone(&me), bus.clone(), Arc::clone(&hits));
            let listener = Listener::new(move |_: &Ping| {
                h.fetch_add(1, Ordering::SeqCst);
                if let Some(me) = slot.get() {
                    assert!(bus2.remove_listener(me));
                }
            });
            let _ = me.set(listener.clone());
            bus.add_listener(&listener);
        }

        assert_eq!(bus.publish(Ping(0)).recipients, 3);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(bus.channel_count(), 0);
        assert_eq!(bus.publish(Ping(1)).recipients, 0);
    }

    #[test]
    fn test_publish_without_runtime_skips_async_listeners() {
        let bus = MessageBus::default();
        bus.add_listener(&Listener::new(|_: &Ping| {}));
        bus.add_listener(&AsyncListener::new(|_: Arc<Ping>, _: CancellationToken| async {}));

        let delivery = bus.publish(Ping(0));

        assert_eq!(delivery.recipients, 1);
        assert_eq!(bus.generation(), 0);
    }

    #[tokio::test]
    async fn test_publish_async_runs_sync_then_async() {
        let bus = MessageBus::default();
        let seen = log();
        let (a, b) = (Arc::clone(&seen), Arc::clone(&seen));
        bus.add_listener(&AsyncListener::new(move |m: Arc<Ping>, _: CancellationToken| {
            let a = Arc::clone(&a);
            async move { a.lock().unwrap().push(format!("async:{}", m.0)) }
        }));
        bus.add_listener(&Listener::new(move |m: &Ping| {
            b.lock().unwrap().push(format!("sync:{}", m.0))
        }));

        let delivery = bus.publish_async(Ping(4)).await.expect("not cancelled");

        assert_eq!(delivery.recipients, 2);
        assert_eq!(entries(&seen), vec!["sync:4", "async:4"]);
        assert_eq!(bus.generation(), 1);
    }

    #[tokio::test]
    async fn test_async_publish_supersedes_pending_one_of_another_type() {
        let bus = MessageBus::default();
        let started = Arc::new(Notify::new());
        let cancelled = Arc::new(AtomicUsize::new(0));
        bus.add_listener(&waiting(&started, &cancelled, Duration::from_secs(30)));

        let first = tokio::spawn({
            let bus = bus.clone();
            async move { bus.publish_async(Ping(1)).await }
        });
        started.notified().await;

        // No channel for Pong: it still takes over the shared token.
        let second = bus.publish_async(Pong).await;
        assert_eq!(second, Ok(Delivery::default()));

        let first = first.await.expect("task joined");
        assert_eq!(
            first,
            Err(DispatchError::Cancelled {
                message: type_name::<Ping>(),
                superseded: true
            })
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sync_publish_supersedes_pending_async_fan_out() {
        let bus = MessageBus::default();
        let started = Arc::new(Notify::new());
        let cancelled = Arc::new(AtomicUsize::new(0));
        bus.add_listener(&waiting(&started, &cancelled, Duration::from_secs(30)));
        bus.add_listener(&Listener::new(|_: &Pong| {}));

        let first = tokio::spawn({
            let bus = bus.clone();
            async move { bus.publish_async(Ping(1)).await }
        });
        started.notified().await;

        // Pong has a sync listener only; it still takes over the shared token.
        assert_eq!(bus.publish(Pong).recipients, 1);
        assert_eq!(bus.generation(), 2);

        assert_eq!(
            first.await.expect("task joined"),
            Err(DispatchError::Cancelled {
                message: type_name::<Ping>(),
                superseded: true
            })
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unresolved_sync_publish_takes_shared_token() {
        let bus = MessageBus::new(Config::quiet());
        assert_eq!(bus.publish(Pong), Delivery::default());
        assert_eq!(bus.generation(), 1);
    }

    #[test]
    fn test_publish_async_without_runtime_keeps_shared_token() {
        let bus = MessageBus::default();
        bus.add_listener(&AsyncListener::new(|_: Arc<Ping>, _: CancellationToken| async {}));

        let out = futures::executor::block_on(bus.publish_async(Ping(0)));

        assert_eq!(
            out,
            Err(DispatchError::NoRuntime {
                message: type_name::<Ping>()
            })
        );
        assert_eq!(bus.generation(), 0);
    }

    #[tokio::test]
    async fn test_explicit_token_is_not_superseded() {
        let bus = MessageBus::default();
        let started = Arc::new(Notify::new());
        let cancelled = Arc::new(AtomicUsize::new(0));
        bus.add_listener(&waiting(&started, &cancelled, Duration::from_millis(50)));

        let first = tokio::spawn({
            let bus = bus.clone();
            async move {
                bus.publish_async_with(Ping(1), CancellationToken::new())
                    .await
            }
        });
        started.notified().await;
        bus.publish_async(Pong).await.expect("nothing to cancel");

        let first = first.await.expect("task joined").expect("not superseded");
        assert_eq!(first.recipients, 1);
        assert_eq!(cancelled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_explicit_token_cancellation_is_not_reported_as_superseded() {
        let bus = MessageBus::default();
        let started = Arc::new(Notify::new());
        let cancelled = Arc::new(AtomicUsize::new(0));
        bus.add_listener(&waiting(&started, &cancelled, Duration::from_secs(30)));

        let token = CancellationToken::new();
        let first = tokio::spawn({
            let (bus, token) = (bus.clone(), token.clone());
            async move { bus.publish_async_with(Ping(1), token).await }
        });
        started.notified().await;
        token.cancel();

        let err = first.await.expect("task joined").unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(
            err,
            DispatchError::Cancelled {
                message: type_name::<Ping>(),
                superseded: false
            }
        );
        assert_eq!(bus.generation(), 0);
    }

    #[tokio::test]
    async fn test_sync_publish_starts_background_async_fan_out() {
        let bus = MessageBus::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.add_listener(&AsyncListener::new(move |m: Arc<Ping>, _: CancellationToken| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(m.0);
            }
        }));

        let delivery = bus.publish(Ping(9));
        assert_eq!(delivery.recipients, 1);
        assert_eq!(bus.generation(), 1);

        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        assert_eq!(got.expect("tail ran"), Some(9));
    }

    #[tokio::test]
    async fn test_background_fan_out_can_be_disabled() {
        let bus = MessageBus::new(Config {
            async_on_publish: false,
            ..Config::default()
        });
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        bus.add_listener(&AsyncListener::new(move |_: Arc<Ping>, _: CancellationToken| {
            let h = Arc::clone(&h);
            async move {
                h.fetch_add(1, Ordering::SeqCst);
            }
        }));

        assert_eq!(bus.publish(Ping(0)).recipients, 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(bus.generation(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_pending_and_rejects_new_work() {
        let bus = MessageBus::default();
        let started = Arc::new(Notify::new());
        let cancelled = Arc::new(AtomicUsize::new(0));
        bus.add_listener(&waiting(&started, &cancelled, Duration::from_secs(30)));

        let pending = tokio::spawn({
            let bus = bus.clone();
            async move { bus.publish_async(Ping(1)).await }
        });
        started.notified().await;
        bus.shutdown();

        assert_eq!(
            pending.await.expect("task joined"),
            Err(DispatchError::Cancelled {
                message: type_name::<Ping>(),
                superseded: false
            })
        );
        assert!(bus.is_shut_down());
        assert_eq!(bus.channel_count(), 0);
        assert_eq!(bus.cached_type_count(), 0);

        assert!(!bus.add_listener(&Listener::new(|_: &Ping| {})));
        assert_eq!(bus.publish(Ping(2)), Delivery::default());
        assert_eq!(bus.publish_async(Ping(3)).await, Err(DispatchError::Closed));
    }

    #[tokio::test]
    async fn test_handler_identity_is_the_shared_object() {
        struct Tally(AtomicUsize);

        #[async_trait]
        impl Handler<Ping> for Tally {
            async fn handle(&self, message: Arc<Ping>, _token: CancellationToken) {
                self.0.fetch_add(message.0 as usize, Ordering::SeqCst);
            }
        }

        let bus = MessageBus::default();
        let tally = Arc::new(Tally(AtomicUsize::new(0)));
        assert!(bus.add_listener(&AsyncListener::<Ping>::from_handler(Arc::clone(&tally))));
        assert!(!bus.add_listener(&AsyncListener::<Ping>::from_handler(Arc::clone(&tally))));

        bus.publish_async(Ping(5)).await.expect("completed");
        assert_eq!(tally.0.load(Ordering::SeqCst), 5);

        assert!(bus.remove_listener(&AsyncListener::<Ping>::from_handler(tally)));
        assert_eq!(bus.total_listener_count(), 0);
    }

    #[test]
    fn test_clones_share_state() {
        let bus = MessageBus::default();
        let other = bus.clone();
        other.add_listener(&Listener::new(|_: &Ping| {}));
        assert_eq!(bus.listener_count::<Ping>(), 1);
        assert_eq!(bus.listener_count::<Pong>(), 0);

        bus.shutdown();
        assert!(other.is_shut_down());
    }
}
