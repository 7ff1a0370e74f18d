//! Background rebuild loop.
//!
//! Every `interval_ms` the watcher fingerprints the default corpus (see
//! [`ChunkSource::signature`](crate::sources::ChunkSource::signature)) and
//! rebuilds the index when the fingerprint moved. Rebuilds run on tokio's
//! blocking pool; queries keep reading the previous index until the swap.
//!
//! While an external corpus is loaded the watcher is paused. Resuming clears
//! the remembered fingerprint so the next comparison starts from scratch.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::engine::{BuildKind, Engine};
use crate::error::Result;
use crate::index::IndexStats;
use crate::models::Origin;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WatcherStatus {
    /// No watcher task was started (CLI one-shot commands).
    Stopped,
    Running,
    Paused,
}

/// Pause flag and fingerprint cache shared by the engine and the loop.
#[derive(Debug, Default)]
pub struct WatchState {
    started: AtomicBool,
    paused: AtomicBool,
    last_signature: Mutex<Option<String>>,
}

impl WatchState {
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Un-pause and forget the last fingerprint.
    pub fn resume(&self) {
        *self.signature_slot() = None;
        self.unpause();
    }

    /// Un-pause, keeping the fingerprint of a rebuild that just happened.
    pub(crate) fn unpause(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> WatcherStatus {
        if !self.started.load(Ordering::SeqCst) {
            WatcherStatus::Stopped
        } else if self.is_paused() {
            WatcherStatus::Paused
        } else {
            WatcherStatus::Running
        }
    }

    pub(crate) fn record(&self, signature: String) {
        *self.signature_slot() = Some(signature);
    }

    fn differs(&self, signature: &str) -> bool {
        self.signature_slot().as_deref() != Some(signature)
    }

    fn signature_slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.last_signature
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// What a single watcher tick did.
#[derive(Debug)]
pub enum TickOutcome {
    Paused,
    Unchanged,
    Rebuilt(IndexStats),
}

/// Run one watcher iteration synchronously.
pub fn tick(engine: &Engine) -> Result<TickOutcome> {
    let watch = engine.watch();
    if watch.is_paused() {
        return Ok(TickOutcome::Paused);
    }

    let source = engine.active_source();
    if source.origin() != Origin::Default {
        return Ok(TickOutcome::Paused);
    }

    let current = engine.current();
    let scope = engine.refresh_scope(source.as_ref(), current.scope())?;
    let signature = source
        .signature(&scope)
        .map_err(|e| engine.build_failed(e))?;

    if scope == *current.scope() && !watch.differs(&signature) {
        return Ok(TickOutcome::Unchanged);
    }

    debug!(groups = scope.included_groups.len(), "Corpus changed, rebuilding");
    match engine.rebuild(source, scope, BuildKind::Tick)? {
        Some(stats) => Ok(TickOutcome::Rebuilt(stats)),
        None => Ok(TickOutcome::Paused),
    }
}

/// Marks the watcher stopped when the loop's future is dropped, whether it
/// ended or its task was aborted.
struct StartedGuard(Arc<Engine>);

impl Drop for StartedGuard {
    fn drop(&mut self) {
        self.0.watch().started.store(false, Ordering::SeqCst);
        debug!("Watcher stopped");
    }
}

/// Start the watcher loop on the current tokio runtime.
///
/// Status reports `stopped` again once the returned task is aborted.
pub fn spawn(engine: Arc<Engine>, interval: Duration) -> JoinHandle<()> {
    engine.watch().started.store(true, Ordering::SeqCst);
    info!(interval_ms = interval.as_millis() as u64, "Watcher started");
    let guard = StartedGuard(engine.clone());

    tokio::spawn(async move {
        let _guard = guard;
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the index is already fresh.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let engine = engine.clone();
            match tokio::task::spawn_blocking(move || tick(&engine)).await {
                Ok(Ok(TickOutcome::Rebuilt(stats))) => info!(
                    chunks = stats.chunks,
                    vocabulary = stats.vocabulary,
                    duration_ms = stats.duration_ms,
                    "Watcher rebuilt index"
                ),
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(error = %e, "Watcher tick failed"),
                Err(e) => error!(error = %e, "Watcher task panicked"),
            }
        }
    })
}
