//! # Example: counters
//!
//! A tiny game loop wired through a [`MessageBus`].
//!
//! Demonstrates how to:
//! - Publish concrete messages and listen to them by exact type.
//! - Listen to a whole family of messages through a marker interface.
//! - Run async systems (autosave) that are cancelled when a newer save supersedes them.
//! - Unregister a listener from inside its own callback.
//!
//! ## Flow
//! ```text
//! tick loop ──► publish(FrameTicked)             ──► hud (exact)
//!          ├─► publish(CoinPicked | EnemyKilled) ──► score (dyn Scored, interface)
//!          └─► publish_async(SaveRequested)      ──► autosave (async, superseded by the next save)
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=typebus=debug cargo run --example counters
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use typebus::{
    AsyncListener, Config, DispatchError, Handler, Lineage, Listener, Message, MessageBus,
    MessageKind,
};

/// Anything worth points.
trait Scored: Send + Sync {
    fn points(&self) -> u64;
}
impl MessageKind for dyn Scored {}

struct FrameTicked(u64);
impl Message for FrameTicked {}

struct CoinPicked;
impl Scored for CoinPicked {
    fn points(&self) -> u64 {
        10
    }
}
impl Message for CoinPicked {
    fn lineage(lineage: &mut Lineage<Self>) {
        lineage.interface::<dyn Scored>(|m| m);
    }
}

struct EnemyKilled {
    boss: bool,
}
impl Scored for EnemyKilled {
    fn points(&self) -> u64 {
        if self.boss { 500 } else { 50 }
    }
}
impl Message for EnemyKilled {
    fn lineage(lineage: &mut Lineage<Self>) {
        lineage.interface::<dyn Scored>(|m| m);
    }
}

struct SaveRequested {
    frame: u64,
}
impl Message for SaveRequested {}

/// Async system: writes a save slot, abandons it if a newer save arrives.
#[derive(Default)]
struct Autosave {
    written: AtomicU64,
}

#[async_trait]
impl Handler<SaveRequested> for Autosave {
    async fn handle(&self, msg: Arc<SaveRequested>, token: CancellationToken) {
        tokio::select! {
            _ = token.cancelled() => println!("[autosave] frame {} abandoned", msg.frame),
            _ = tokio::time::sleep(Duration::from_millis(30)) => {
                self.written.store(msg.frame, Ordering::Relaxed);
                println!("[autosave] frame {} written", msg.frame);
            }
        }
    }

    fn name(&self) -> &'static str {
        "autosave"
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Frame traffic is sync-only; keep it from superseding a pending save.
    let bus = MessageBus::new(Config {
        async_on_publish: false,
        ..Config::default()
    });

    // Score: one listener for every `Scored` message.
    let score = Arc::new(AtomicU64::new(0));
    let total = Arc::clone(&score);
    bus.add_listener(&Listener::<dyn Scored>::new(move |m| {
        total.fetch_add(m.points(), Ordering::Relaxed);
    }));

    // HUD: prints the first few frames, then unregisters itself.
    let hud_slot: Arc<OnceLock<Listener<FrameTicked>>> = Arc::new(OnceLock::new());
    let hud = {
        let (slot, bus) = (Arc::clone(&hud_slot), bus.clone());
        Listener::new(move |m: &FrameTicked| {
            println!("[hud] frame {}", m.0);
            if m.0 == 3 {
                if let Some(me) = slot.get() {
                    bus.remove_listener(me);
                }
            }
        })
        .named("hud")
    };
    let _ = hud_slot.set(hud.clone());
    bus.add_listener(&hud);

    let autosave = Arc::new(Autosave::default());
    bus.add_listener(&AsyncListener::<SaveRequested>::from_handler(Arc::clone(&autosave)));

    let mut saves = Vec::new();
    for frame in 1..=6 {
        bus.publish(FrameTicked(frame));
        bus.publish(CoinPicked);
        if frame % 3 == 0 {
            bus.publish(EnemyKilled { boss: frame == 6 });
        }

        // Each save supersedes the previous one if it is still running.
        if frame % 2 == 0 {
            let bus = bus.clone();
            saves.push(tokio::spawn(async move {
                bus.publish_async(SaveRequested { frame }).await
            }));
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    for save in saves {
        match save.await? {
            Ok(_) => {}
            Err(DispatchError::Cancelled { superseded: true, .. }) => {}
            Err(err) => println!("[save] {}: {}", err.as_label(), err.as_message()),
        }
    }

    println!(
        "score={} last_save={} channels={} listeners={} generation={}",
        score.load(Ordering::Relaxed),
        autosave.written.load(Ordering::Relaxed),
        bus.channel_count(),
        bus.total_listener_count(),
        bus.generation(),
    );

    bus.shutdown();
    Ok(())
}
