//! # Channel: the listener set of one message kind.
//!
//! A [`Channel`] keeps two insertion-ordered sequences (sync and async) plus an
//! identity index per sequence, so duplicate detection and removal never scan.
//!
//! ## Architecture
//! ```text
//! Channel(kind K)
//!   ├─ sync : seq → Slot{id, name, erased Fn(&dyn Any)}        ┐ BTreeMap keyed by
//!   ├─ async: seq → Slot{id, name, erased Fn(&dyn Any, token)} ┘ registration sequence
//!   └─ index: id → seq  (one per sequence)
//!
//! snapshot() ──► ChannelSnapshot (reverse registration order, no lock held)
//!                  ├─ raise(&payload)              inline, catch_unwind per listener
//!                  └─ start_async(&payload, token) one Tokio task per listener
//!                        └─ AsyncFanOut::join()    join_all ∥ token.cancelled()
//! ```
//!
//! ## Rules
//! - Invocation order is **LIFO**: the last registered listener runs first.
//! - A panic in one listener is caught, logged and counted; siblings still run.
//! - A panic while *creating* an async listener's future counts as an already-finished no-op.
//! - Cancellation is cooperative: tasks are never aborted, the aggregate just stops waiting.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::join_all;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::listener::{AsyncListener, BoxListenerFuture, Listener, ListenerId};
use crate::message::{MessageKind, Payload, TypeKey};

type ErasedSync = Arc<dyn Fn(&(dyn Any + Send + Sync)) + Send + Sync>;
type ErasedAsync = Arc<
    dyn Fn(&(dyn Any + Send + Sync), CancellationToken) -> Option<BoxListenerFuture> + Send + Sync,
>;

/// One registered listener, type-erased.
#[derive(Clone)]
struct Slot<F> {
    id: ListenerId,
    name: Arc<str>,
    call: F,
}

/// Insertion-ordered listener sequence with an identity index.
struct Ordered<F> {
    slots: BTreeMap<u64, Slot<F>>,
    index: HashMap<ListenerId, u64>,
}

impl<F: Clone> Ordered<F> {
    fn new() -> Self {
        Self {
            slots: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    fn insert(&mut self, seq: u64, slot: Slot<F>) -> bool {
        if self.index.contains_key(&slot.id) {
            return false;
        }
        self.index.insert(slot.id, seq);
        self.slots.insert(seq, slot);
        true
    }

    fn remove(&mut self, id: ListenerId) -> bool {
        match self.index.remove(&id) {
            Some(seq) => self.slots.remove(&seq).is_some(),
            None => false,
        }
    }

    fn contains(&self, id: ListenerId) -> bool {
        self.index.contains_key(&id)
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    /// Clones the slots, last registered first.
    fn reversed(&self) -> Vec<Slot<F>> {
        self.slots.values().rev().cloned().collect()
    }
}

/// Ordered listener set bound to one message kind.
pub struct Channel {
    key: TypeKey,
    next_seq: u64,
    sync: Ordered<ErasedSync>,
    async_: Ordered<ErasedAsync>,
}

impl Channel {
    pub(crate) fn new(key: TypeKey) -> Self {
        Self {
            key,
            next_seq: 0,
            sync: Ordered::new(),
            async_: Ordered::new(),
        }
    }

    pub(crate) fn key(&self) -> TypeKey {
        self.key
    }

    fn seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Appends a synchronous listener; `false` if its identity is already present.
    pub(crate) fn add_sync<T: ?Sized + MessageKind>(&mut self, listener: &Listener<T>) -> bool {
        debug_assert_eq!(self.key, TypeKey::of::<T>());
        if self.sync.contains(listener.id()) {
            return false;
        }

        let call = listener.call();
        let name: Arc<str> = Arc::from(listener.name());
        let kind = self.key;
        let erased: ErasedSync = Arc::new(move |payload: &(dyn Any + Send + Sync)| {
            match payload.downcast_ref::<Arc<T>>() {
                Some(message) => call(&**message),
                None => tracing::error!(%kind, "payload does not match channel kind"),
            }
        });

        let seq = self.seq();
        self.sync.insert(
            seq,
            Slot {
                id: listener.id(),
                name,
                call: erased,
            },
        )
    }

    /// Appends an asynchronous listener; `false` if its identity is already present.
    pub(crate) fn add_async<T: ?Sized + MessageKind>(
        &mut self,
        listener: &AsyncListener<T>,
    ) -> bool {
        debug_assert_eq!(self.key, TypeKey::of::<T>());
        if self.async_.contains(listener.id()) {
            return false;
        }

        let call = listener.call();
        let name: Arc<str> = Arc::from(listener.name());
        let kind = self.key;
        let erased: ErasedAsync = Arc::new(
            move |payload: &(dyn Any + Send + Sync), token: CancellationToken| {
                match payload.downcast_ref::<Arc<T>>() {
                    Some(message) => Some(call(Arc::clone(message), token)),
                    None => {
                        tracing::error!(%kind, "payload does not match channel kind");
                        None
                    }
                }
            },
        );

        let seq = self.seq();
        self.async_.insert(
            seq,
            Slot {
                id: listener.id(),
                name,
                call: erased,
            },
        )
    }

    /// Removes a synchronous listener; `false` if it was not registered.
    pub(crate) fn remove_sync(&mut self, id: ListenerId) -> bool {
        self.sync.remove(id)
    }

    /// Removes an asynchronous listener; `false` if it was not registered.
    pub(crate) fn remove_async(&mut self, id: ListenerId) -> bool {
        self.async_.remove(id)
    }

    /// Total listeners, sync + async.
    pub(crate) fn len(&self) -> usize {
        self.sync.len() + self.async_.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies the listener sequences (reverse registration order) so they can be
    /// invoked without holding the registry lock.
    pub(crate) fn snapshot(&self) -> ChannelSnapshot {
        ChannelSnapshot {
            key: self.key,
            sync: self.sync.reversed(),
            async_: self.async_.reversed(),
        }
    }
}

/// Counters of one fan-out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct FanOut {
    /// Listeners invoked.
    pub(crate) invoked: usize,
    /// Listeners that panicked (counted within `invoked`).
    pub(crate) failures: usize,
}

/// Detached copy of a channel's listeners, ready to be raised.
pub(crate) struct ChannelSnapshot {
    key: TypeKey,
    sync: Vec<Slot<ErasedSync>>,
    async_: Vec<Slot<ErasedAsync>>,
}

impl ChannelSnapshot {
    pub(crate) fn key(&self) -> TypeKey {
        self.key
    }

    pub(crate) fn has_async(&self) -> bool {
        !self.async_.is_empty()
    }

    /// Synchronous fan-out, last registered first.
    pub(crate) fn raise(&self, payload: &Payload) -> FanOut {
        let mut out = FanOut::default();
        let payload: &(dyn Any + Send + Sync) = &**payload;

        for slot in &self.sync {
            out.invoked += 1;
            if let Err(panic_err) = std::panic::catch_unwind(AssertUnwindSafe(|| (slot.call)(payload)))
            {
                out.failures += 1;
                tracing::error!(
                    kind = %self.key,
                    listener = %slot.name,
                    panic = %panic_message(&*panic_err),
                    "listener panicked"
                );
            }
        }
        out
    }

    /// Invokes every async listener (last registered first) and spawns its future.
    ///
    /// Returns immediately; await [`AsyncFanOut::join`] for the aggregate.
    pub(crate) fn start_async(
        &self,
        runtime: &Handle,
        payload: &Payload,
        token: CancellationToken,
    ) -> AsyncFanOut {
        let payload: &(dyn Any + Send + Sync) = &**payload;
        let mut tasks = Vec::with_capacity(self.async_.len());
        let mut failures = 0;

        for slot in &self.async_ {
            let started =
                std::panic::catch_unwind(AssertUnwindSafe(|| (slot.call)(payload, token.clone())));

            let fut = match started {
                Ok(Some(fut)) => fut,
                Ok(None) => {
                    failures += 1;
                    continue;
                }
                Err(panic_err) => {
                    failures += 1;
                    tracing::error!(
                        kind = %self.key,
                        listener = %slot.name,
                        panic = %panic_message(&*panic_err),
                        "async listener panicked before returning a future"
                    );
                    continue;
                }
            };

            let name = Arc::clone(&slot.name);
            let kind = self.key;
            tasks.push(runtime.spawn(async move {
                match AssertUnwindSafe(fut).catch_unwind().await {
                    Ok(()) => true,
                    Err(panic_err) => {
                        tracing::error!(
                            %kind,
                            listener = %name,
                            panic = %panic_message(&*panic_err),
                            "async listener panicked"
                        );
                        false
                    }
                }
            }));
        }

        AsyncFanOut {
            key: self.key,
            invoked: self.async_.len(),
            failures,
            tasks,
            token,
        }
    }
}

/// In-flight asynchronous fan-out.
pub(crate) struct AsyncFanOut {
    key: TypeKey,
    invoked: usize,
    failures: usize,
    tasks: Vec<JoinHandle<bool>>,
    token: CancellationToken,
}

impl AsyncFanOut {
    /// Counters known right after start: every listener invoked, panics while
    /// building futures already counted.
    pub(crate) fn started(&self) -> FanOut {
        FanOut {
            invoked: self.invoked,
            failures: self.failures,
        }
    }

    /// Waits for every listener task, or for the token.
    ///
    /// `Err` carries the counters known at cancellation time; the tasks keep
    /// running until they observe the token themselves.
    pub(crate) async fn join(self) -> Result<FanOut, FanOut> {
        let AsyncFanOut {
            key,
            invoked,
            mut failures,
            tasks,
            token,
        } = self;

        // Cancellation is checked first: once the token fired, the aggregate
        // reports cancelled even if the listeners wound down in the meantime.
        let all = join_all(tasks);
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::debug!(kind = %key, "async fan-out cancelled");
                Err(FanOut { invoked, failures })
            }
            results = all => {
                for result in results {
                    match result {
                        Ok(true) => {}
                        Ok(false) => failures += 1,
                        Err(join_err) => {
                            failures += 1;
                            tracing::error!(kind = %key, error = %join_err, "async listener task failed");
                        }
                    }
                }
                Ok(FanOut { invoked, failures })
            }
        }
    }
}

/// Best-effort text of a panic payload.
fn panic_message(panic_err: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic_err.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic_err.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
