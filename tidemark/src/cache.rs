//! Channel cache registry.
//!
//! # Overview
//!
//! The [`Cache`] maps channel keys to per-channel [`UnaryCache`] entries and
//! owns their shared lifecycle: it batch-fetches metadata for channels it
//! has not seen, hands out entries for reads and writes, and runs a
//! background task that periodically sweeps idle historical data from every
//! entry.
//!
//! Entries are created only through [`Cache::populate_missing`]; [`Cache::get`]
//! never creates, so callers interleaving the two always see a consistent
//! picture. Closing the registry stops the sweeper and drops all entries;
//! further population attempts fail with [`RegistryError::Closed`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::channel::{ChannelKey, ChannelRetriever};
use crate::error::{RegistryError, Result};
use crate::static_cache::GcMetrics;
use crate::unary::UnaryCache;

/// Default capacity, in samples, of each channel's live rolling buffer.
pub const DEFAULT_DYNAMIC_BUFFER_SIZE: u32 = 10_000;

/// Tuning knobs for a [`Cache`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Capacity, in samples, of each channel's live rolling buffer.
    pub dynamic_buffer_size: u32,
    /// How often the background sweeper runs.
    pub gc_interval: Duration,
    /// How long a stored series may go unread before a sweep purges it.
    pub gc_idle_threshold: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dynamic_buffer_size: DEFAULT_DYNAMIC_BUFFER_SIZE,
            gc_interval: Duration::from_secs(30),
            gc_idle_threshold: Duration::from_secs(60),
        }
    }
}

type Entries = Arc<RwLock<HashMap<ChannelKey, Arc<UnaryCache>>>>;

/// Registry of per-channel caches with background garbage collection.
///
/// Cloneable handles are not provided; share the registry behind an `Arc`
/// when multiple consumers need it.
#[derive(Debug)]
pub struct Cache<R> {
    retriever: R,
    config: CacheConfig,
    entries: Entries,
    closed: Arc<AtomicBool>,
    gc_task: Mutex<Option<JoinHandle<()>>>,
}

impl<R: ChannelRetriever> Cache<R> {
    /// Creates a registry that resolves unknown channels through
    /// `retriever` and starts its background sweeper.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime, since the sweeper is
    /// spawned onto the ambient runtime.
    pub fn new(retriever: R, config: CacheConfig) -> Self {
        let entries: Entries = Arc::new(RwLock::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let gc_task = spawn_gc(
            Arc::clone(&entries),
            Arc::clone(&closed),
            config.gc_interval,
            config.gc_idle_threshold,
        );
        Self {
            retriever,
            config,
            entries,
            closed,
            gc_task: Mutex::new(Some(gc_task)),
        }
    }

    /// Ensures an entry exists for every key in `keys` that the retriever
    /// knows about.
    ///
    /// Keys that already have an entry are not re-fetched; the retriever is
    /// called once with the deduplicated set of missing keys, and not at
    /// all when nothing is missing.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Closed`] after [`Cache::close`], and passes
    /// through any retrieval failure.
    pub async fn populate_missing(&self, keys: &[ChannelKey]) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RegistryError::Closed.into());
        }
        let missing: Vec<ChannelKey> = {
            let entries = read_entries(&self.entries);
            let mut missing: Vec<ChannelKey> = keys
                .iter()
                .copied()
                .filter(|k| !entries.contains_key(k))
                .collect();
            missing.sort_unstable();
            missing.dedup();
            missing
        };
        if missing.is_empty() {
            return Ok(());
        }
        tracing::debug!(missing = missing.len(), "fetching channel metadata");
        let channels = self.retriever.retrieve(&missing).await?;
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for channel in channels {
            // A concurrent populate may have raced us; first entry wins so
            // handed-out Arcs stay valid.
            entries.entry(channel.key).or_insert_with(|| {
                Arc::new(UnaryCache::new(channel, self.config.dynamic_buffer_size))
            });
        }
        Ok(())
    }

    /// Returns the cache entry for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::EntryNotFound`] when the key was never
    /// populated (call [`Cache::populate_missing`] first) and
    /// [`RegistryError::Closed`] after [`Cache::close`].
    pub fn get(&self, key: ChannelKey) -> Result<Arc<UnaryCache>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RegistryError::Closed.into());
        }
        read_entries(&self.entries)
            .get(&key)
            .cloned()
            .ok_or_else(|| RegistryError::EntryNotFound { key }.into())
    }

    /// Runs a garbage-collection pass over every entry immediately,
    /// independent of the background sweeper's schedule.
    pub fn gc(&self) -> GcMetrics {
        sweep(&self.entries, self.config.gc_idle_threshold)
    }

    /// Stops the background sweeper and drops every entry.
    ///
    /// Idempotent. Subsequent [`Cache::populate_missing`] and [`Cache::get`]
    /// calls fail with [`RegistryError::Closed`].
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(task) = self
            .gc_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for entry in entries.values() {
            entry.close();
        }
        entries.clear();
    }
}

impl<R> Drop for Cache<R> {
    fn drop(&mut self) {
        if let Some(task) = self
            .gc_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

fn read_entries(
    entries: &Entries,
) -> std::sync::RwLockReadGuard<'_, HashMap<ChannelKey, Arc<UnaryCache>>> {
    entries.read().unwrap_or_else(PoisonError::into_inner)
}

/// Sweeps every entry once, accumulating per-channel metrics.
fn sweep(entries: &Entries, idle_threshold: Duration) -> GcMetrics {
    // Snapshot the Arcs so the read lock is not held across per-entry
    // sweeps, which take each entry's own locks.
    let snapshot: Vec<Arc<UnaryCache>> = read_entries(entries).values().cloned().collect();
    tracing::debug!(entries = snapshot.len(), "starting gc sweep");
    let mut metrics = GcMetrics::default();
    for entry in snapshot {
        metrics.merge(entry.gc(idle_threshold));
    }
    if metrics.purged_series > 0 {
        tracing::info!(
            purged_series = metrics.purged_series,
            purged_bytes = metrics.purged_bytes,
            "gc sweep complete"
        );
    }
    metrics
}

fn spawn_gc(
    entries: Entries,
    closed: Arc<AtomicBool>,
    interval: Duration,
    idle_threshold: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick of a tokio interval completes immediately; consume
        // it so the first sweep happens one full interval after startup.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if closed.load(Ordering::Acquire) {
                return;
            }
            sweep(&entries, idle_threshold);
        }
    })
}
