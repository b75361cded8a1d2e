//! Per-channel cache pairing a live rolling buffer with historical storage.
//!
//! A [`UnaryCache`] owns one channel's [`DynamicCache`] and [`StaticCache`]
//! and wires them together: live writes land in the dynamic buffer, and
//! every full buffer the dynamic side flushes is committed to the static
//! side, so recently streamed data becomes immediately readable through the
//! same coverage queries as historical fetches.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::channel::Channel;
use crate::dynamic::{DynamicCache, DynamicWriteResponse};
use crate::error::Result;
use crate::series::Series;
use crate::static_cache::{DirtyReadResult, FillPermit, GcMetrics, StaticCache};
use crate::telem::TimeRange;

/// Combined live and historical cache for a single channel.
#[derive(Debug)]
pub struct UnaryCache {
    channel: Channel,
    dynamic: Mutex<DynamicCache>,
    static_cache: StaticCache,
}

impl UnaryCache {
    /// Creates a cache for `channel` with a rolling live buffer of
    /// `dynamic_buffer_size` samples.
    pub fn new(channel: Channel, dynamic_buffer_size: u32) -> Self {
        let dynamic = DynamicCache::new(dynamic_buffer_size, channel.data_type);
        Self {
            channel,
            dynamic: Mutex::new(dynamic),
            static_cache: StaticCache::new(),
        }
    }

    /// The channel this cache serves.
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Writes live series into the rolling buffer, committing any buffers
    /// it flushes to historical storage.
    ///
    /// Returns the flushed series and the digests of buffers allocated
    /// during the write, exactly as the dynamic layer reported them.
    ///
    /// # Errors
    ///
    /// Propagates the historical store's integrity failure if committing a
    /// flushed buffer corrupts the timeline.
    pub fn write_dynamic(&self, series: &[Series]) -> Result<DynamicWriteResponse> {
        let response = self
            .dynamic
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write(series);
        if !response.flushed.is_empty() {
            self.static_cache.write(&response.flushed)?;
        }
        Ok(response)
    }

    /// Snapshot of the currently accumulating live buffer, if any.
    pub fn leading_buffer(&self) -> Option<Series> {
        self.dynamic
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .leading_buffer()
    }

    /// Writes fetched historical series directly to the static store.
    ///
    /// # Errors
    ///
    /// Propagates the store's post-write integrity failure.
    pub fn write_static(&self, series: &[Series]) -> Result<()> {
        self.static_cache.write(series)
    }

    /// Coverage query against historical storage. See
    /// [`StaticCache::dirty_read`].
    pub fn dirty_read(&self, tr: TimeRange) -> DirtyReadResult {
        self.static_cache.dirty_read(tr)
    }

    /// Coverage query under the channel's exclusive fill permit. See
    /// [`StaticCache::dirty_read_for_write`].
    pub async fn dirty_read_for_write(&self, tr: TimeRange) -> (DirtyReadResult, FillPermit) {
        self.static_cache.dirty_read_for_write(tr).await
    }

    /// Purges historical series idle longer than `idle_threshold`. The live
    /// buffer is never collected.
    pub fn gc(&self, idle_threshold: Duration) -> GcMetrics {
        self.static_cache.gc(idle_threshold)
    }

    /// Flushes nothing and discards everything: drops the live buffer and
    /// clears historical storage.
    pub fn close(&self) {
        self.dynamic
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .close();
        self.static_cache.close();
    }
}
