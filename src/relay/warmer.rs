use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;

use crate::util;

use super::coordinator::RefreshCoordinator;
use super::store::SessionStore;
use super::types::ChannelId;

/// Tunables for the background warmer and the idle sweep.
#[derive(Clone)]
pub struct WarmerConfig {
    /// How often the warmer looks for channels needing refresh.
    pub interval: Duration,
    /// Sessions older than this are due for a background refresh.
    pub max_age: Duration,
    /// Cap on simultaneous background captures.
    pub concurrency: usize,
    /// Channels kept warm unconditionally.
    pub seed: Vec<ChannelId>,
    /// How often the idle sweep runs.
    pub sweep_interval: Duration,
    /// Viewer inactivity after which a channel leaves the active set.
    pub active_window: Duration,
    /// Session idle time after which a non-seed channel's session is evicted.
    pub evict_after: Duration,
}

/**
    Spawn the background warmer loop.

    Each tick re-authenticates channels from the seed list and the active set
    whose session is missing or older than `max_age`, at most `concurrency`
    captures at a time. Failures are logged and absorbed; a channel that
    keeps failing simply keeps its last-good session.
*/
pub fn spawn_warmer(
    coordinator: Arc<RefreshCoordinator>,
    store: Arc<SessionStore>,
    config: WarmerConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let semaphore = Arc::new(Semaphore::new(config.concurrency));
        let mut tick = tokio::time::interval(config.interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        println!(
            "[warmer] Started: {} seed channel(s), interval {}s",
            config.seed.len(),
            config.interval.as_secs()
        );

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let due = due_channels(&store, &config.seed, config.max_age);
                    if !due.is_empty() {
                        refresh_batch(&coordinator, due, &semaphore, config.max_age).await;
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        println!("[warmer] Shutting down");
                        return;
                    }
                }
            }
        }
    })
}

/**
    Spawn the idle sweep loop: drops stale active-set entries and evicts
    sessions of non-seed channels nobody has watched recently.
*/
pub fn spawn_idle_sweep(
    store: Arc<SessionStore>,
    config: WarmerConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(config.sweep_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    for id in store.sweep_inactive(config.active_window) {
                        println!("[sweep] Channel {} left the active set", id);
                    }
                    for id in store.evict_idle_sessions(&config.seed, config.evict_after) {
                        println!("[sweep] Evicted idle session for channel {}", id);
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        return;
                    }
                }
            }
        }
    })
}

/// Seed and active channels whose session is missing or older than `max_age`.
fn due_channels(store: &SessionStore, seed: &[ChannelId], max_age: Duration) -> Vec<ChannelId> {
    let now = util::time::now();
    let mut due: Vec<ChannelId> = Vec::new();

    for id in seed.iter().cloned().chain(store.active_channels()) {
        if due.contains(&id) {
            continue;
        }
        let needs_refresh = match store.session(&id) {
            Some(session) => session.age(now) > max_age,
            None => true,
        };
        if needs_refresh {
            due.push(id);
        }
    }

    due
}

/// Refresh one tick's worth of channels, bounded by the semaphore.
async fn refresh_batch(
    coordinator: &Arc<RefreshCoordinator>,
    due: Vec<ChannelId>,
    semaphore: &Arc<Semaphore>,
    max_age: Duration,
) {
    let mut handles = Vec::new();

    for id in due {
        let coordinator = Arc::clone(coordinator);
        let semaphore = Arc::clone(semaphore);
        handles.push(tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire().await else {
                return;
            };
            if let Err(e) = coordinator.ensure_fresh(&id, max_age).await {
                eprintln!("[warmer] Refresh failed for channel {}: {}", id, e);
            }
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }
}
