//! Non-overlapping interval cache for historical reads.
//!
//! The static cache holds the immutable historical spans already read from
//! the remote store, merged into a sorted, non-overlapping timeline per
//! channel. It answers two questions: *what do I already have* (the stored
//! series overlapping a query) and *what is still missing* (the gaps the
//! caller must fetch).
//!
//! Filling gaps is a read-check-fetch-write sequence that must not run
//! concurrently for the same channel, or two consumers requesting
//! overlapping ranges would both fetch and double-write the same span.
//! [`StaticCache::dirty_read_for_write`] therefore couples the read with an
//! exclusive [`FillPermit`] that stays held across the caller's fetch and
//! write-back. The permit releases on drop, so success, error, and
//! cancellation paths all release it.
//!
//! Storage integrity (no two stored series' alignment bounds overlap) is
//! re-checked after every write. A violation is fatal corruption: it can
//! only mean the insertion plan was computed wrong.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::bounds::build_insertion_plan;
use crate::error::{IntegrityError, Result};
use crate::series::Series;
use crate::telem::TimeRange;

/// What a garbage-collection pass reclaimed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcMetrics {
    /// Number of stored series purged.
    pub purged_series: u32,
    /// Total raw byte size of the purged series.
    pub purged_bytes: u64,
}

impl GcMetrics {
    /// Accumulates another pass's metrics into this one.
    pub fn merge(&mut self, other: GcMetrics) {
        self.purged_series += other.purged_series;
        self.purged_bytes += other.purged_bytes;
    }
}

/// Result of a coverage query against the static cache.
#[derive(Debug, Clone)]
pub struct DirtyReadResult {
    /// Every stored series whose time range overlaps the query, in order.
    pub series: Vec<Series>,
    /// Ordered sub-ranges of the query not covered by any returned series:
    /// a leading gap, interior gaps between non-adjacent matches, and a
    /// trailing gap. The whole query range when nothing matched.
    pub gaps: Vec<TimeRange>,
}

/// Exclusive permission to fill a channel's gaps.
///
/// Returned by [`StaticCache::dirty_read_for_write`]; while it lives, no
/// other consumer can start a read-for-write on the same channel and the
/// garbage collector skips the channel. Dropping the permit releases the
/// underlying mutex, so a caller that errors out or is cancelled mid-fetch
/// cannot stall the channel.
#[derive(Debug)]
pub struct FillPermit {
    _guard: OwnedMutexGuard<()>,
}

impl FillPermit {
    /// Releases the permit explicitly. Equivalent to dropping it.
    pub fn release(self) {}
}

/// One stored span plus the read stamp the garbage collector keys off.
#[derive(Debug)]
struct Entry {
    series: Series,
    /// Milliseconds since the cache's creation at which the entry was last
    /// returned by a read (or inserted).
    last_read: AtomicU64,
}

/// Sorted, non-overlapping collection of historical series for one channel.
///
/// All methods take `&self`; stored data sits behind an `RwLock` and the
/// fill sequence behind an async mutex, so a `StaticCache` can be shared
/// freely between tasks.
#[derive(Debug)]
pub struct StaticCache {
    data: RwLock<Vec<Entry>>,
    fill_lock: Arc<AsyncMutex<()>>,
    created: Instant,
}

impl Default for StaticCache {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticCache {
    /// Creates an empty static cache.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(Vec::new()),
            fill_lock: Arc::new(AsyncMutex::new(())),
            created: Instant::now(),
        }
    }

    /// Returns the number of stored series.
    pub fn series_count(&self) -> usize {
        self.read_data().len()
    }

    /// Merges the given series into the stored timeline.
    ///
    /// Each series is normalized to float32, trimmed of any samples a stored
    /// neighbor already covers, and spliced into the sorted list, replacing
    /// entries it fully subsumes. Series left empty after trimming (fully
    /// redundant reads) are skipped.
    ///
    /// Callers filling gaps must hold the channel's [`FillPermit`] across
    /// the fetch and this write. Writes from other paths (e.g. a live
    /// write-through) are the caller's responsibility to serialize.
    ///
    /// # Errors
    ///
    /// Returns [`IntegrityError::OverlappingBounds`] when the post-write
    /// integrity check finds overlapping stored bounds. This is fatal
    /// corruption and unreachable with a correct insertion plan.
    pub fn write(&self, series: &[Series]) -> Result<()> {
        let stamp = self.elapsed_millis();
        let mut data = self
            .data
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for s in series {
            Self::write_one(&mut data, s.to_float32(None), stamp);
        }
        Self::check_integrity(&data)
    }

    fn write_one(data: &mut Vec<Entry>, series: Series, stamp: u64) {
        if series.is_empty() {
            return;
        }
        let stored: Vec<_> = data.iter().map(|e| e.series.alignment_bounds()).collect();
        let Some(plan) = build_insertion_plan(&stored, series.alignment_bounds()) else {
            tracing::debug!(inserting = ?series.digest(), "no viable insertion plan");
            return;
        };
        let trimmed = series.slice(plan.remove_before, series.len() - plan.remove_after);
        if trimmed.is_empty() {
            // We executed a redundant read.
            return;
        }
        data.splice(
            plan.insert_into..plan.insert_into + plan.delete_in_between,
            [Entry {
                series: trimmed,
                last_read: AtomicU64::new(stamp),
            }],
        );
    }

    fn check_integrity(data: &[Entry]) -> Result<()> {
        for pair in data.windows(2) {
            let a = pair[0].series.alignment_bounds();
            let b = pair[1].series.alignment_bounds();
            if a.upper > b.lower {
                tracing::error!(%a, %b, "static cache integrity violation");
                return Err(IntegrityError::OverlappingBounds { a, b }.into());
            }
        }
        Ok(())
    }

    /// Returns the stored series overlapping `tr` and the gaps a caller must
    /// still fetch to fully cover it.
    ///
    /// "Dirty" because nothing is locked against a concurrent fill: the
    /// answer reflects the store at the moment of the call. Use
    /// [`StaticCache::dirty_read_for_write`] when the gaps will be fetched
    /// and written back.
    pub fn dirty_read(&self, tr: TimeRange) -> DirtyReadResult {
        let stamp = self.elapsed_millis();
        let data = self.read_data();
        let matches: Vec<_> = data
            .iter()
            .filter(|e| e.series.time_range().overlaps_with(&tr))
            .collect();
        if matches.is_empty() {
            return DirtyReadResult {
                series: Vec::new(),
                gaps: vec![tr],
            };
        }
        for e in &matches {
            e.last_read.store(stamp, Ordering::Relaxed);
        }

        let mut gaps = Vec::new();
        let first = matches[0].series.time_range();
        if tr.start < first.start {
            gaps.push(TimeRange::new(tr.start, first.start));
        }
        for pair in matches.windows(2) {
            let prev = pair[0].series.time_range();
            let next = pair[1].series.time_range();
            if prev.end < next.start {
                gaps.push(TimeRange::new(prev.end, next.start));
            }
        }
        // matches is non-empty here.
        if let Some(last) = matches.last() {
            let last = last.series.time_range();
            if last.end < tr.end {
                gaps.push(TimeRange::new(last.end, tr.end));
            }
        }
        DirtyReadResult {
            series: matches.iter().map(|e| e.series.clone()).collect(),
            gaps,
        }
    }

    /// Performs a [`StaticCache::dirty_read`] under the channel's exclusive
    /// fill mutex, returning the read result together with the held
    /// [`FillPermit`].
    ///
    /// The caller fetches the returned gaps, writes them back via
    /// [`StaticCache::write`], and then drops the permit. The mutex is held
    /// across the caller's (async) fetch on purpose: it is what keeps two
    /// consumers with overlapping queries from double-fetching the same
    /// span.
    pub async fn dirty_read_for_write(&self, tr: TimeRange) -> (DirtyReadResult, FillPermit) {
        let guard = Arc::clone(&self.fill_lock).lock_owned().await;
        (self.dirty_read(tr), FillPermit { _guard: guard })
    }

    /// Purges stored series not read within `idle_threshold`.
    ///
    /// Skips the entire pass (returning zero metrics) when a fill is in
    /// flight on this channel, so collection never races a
    /// read-check-fetch-write sequence.
    #[allow(clippy::cast_possible_truncation)] // millis since creation fit u64 for ~585M years
    pub fn gc(&self, idle_threshold: Duration) -> GcMetrics {
        let Ok(_guard) = self.fill_lock.try_lock() else {
            return GcMetrics::default();
        };
        let now = self.elapsed_millis();
        let threshold = idle_threshold.as_millis() as u64;
        let mut data = self
            .data
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut metrics = GcMetrics::default();
        data.retain(|e| {
            let idle = now.saturating_sub(e.last_read.load(Ordering::Relaxed));
            if idle > threshold {
                metrics.purged_series += 1;
                metrics.purged_bytes += e.series.byte_size();
                false
            } else {
                true
            }
        });
        metrics
    }

    /// Discards all stored series. The cache remains usable but empty.
    pub fn close(&self) {
        self.data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn read_data(&self) -> std::sync::RwLockReadGuard<'_, Vec<Entry>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    #[allow(clippy::cast_possible_truncation)] // millis since creation fit u64 for ~585M years
    fn elapsed_millis(&self) -> u64 {
        self.created.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::Series;

    /// A series whose alignment and time range march together: one sample
    /// per time unit starting at `lo`.
    fn spanned(lo: u64, hi: u64) -> Series {
        let values: Vec<f32> = (lo..hi).map(|v| v as f32).collect();
        Series::from_f32s(values, lo).with_time_range(TimeRange::new(lo, hi))
    }

    #[test]
    fn test_write_and_read_back() {
        let cache = StaticCache::new();
        cache.write(&[spanned(0, 10)]).unwrap();
        let res = cache.dirty_read(TimeRange::new(0u64, 10u64));
        assert_eq!(res.series.len(), 1);
        assert!(res.gaps.is_empty());
    }

    #[test]
    fn test_read_uncovered_range_is_one_gap() {
        let cache = StaticCache::new();
        cache.write(&[spanned(0, 10)]).unwrap();
        let res = cache.dirty_read(TimeRange::new(50u64, 60u64));
        assert!(res.series.is_empty());
        assert_eq!(res.gaps, vec![TimeRange::new(50u64, 60u64)]);
    }

    #[test]
    fn test_gap_computation() {
        // Stored [0, 10) and [20, 30); query [5, 25) returns both series and
        // the single interior gap [10, 20).
        let cache = StaticCache::new();
        cache.write(&[spanned(0, 10), spanned(20, 30)]).unwrap();
        let res = cache.dirty_read(TimeRange::new(5u64, 25u64));
        assert_eq!(res.series.len(), 2);
        assert_eq!(res.gaps, vec![TimeRange::new(10u64, 20u64)]);
    }

    #[test]
    fn test_leading_and_trailing_gaps() {
        let cache = StaticCache::new();
        cache.write(&[spanned(10, 20)]).unwrap();
        let res = cache.dirty_read(TimeRange::new(0u64, 30u64));
        assert_eq!(res.series.len(), 1);
        assert_eq!(
            res.gaps,
            vec![TimeRange::new(0u64, 10u64), TimeRange::new(20u64, 30u64)]
        );
    }

    #[test]
    fn test_idempotent_write() {
        let cache = StaticCache::new();
        cache.write(&[spanned(0, 10)]).unwrap();
        cache.write(&[spanned(0, 10)]).unwrap();
        assert_eq!(cache.series_count(), 1);
        let res = cache.dirty_read(TimeRange::new(0u64, 10u64));
        assert_eq!(res.series.len(), 1);
        assert_eq!(res.series[0].len(), 10);
    }

    #[test]
    fn test_overlapping_writes_trim_to_nonoverlap() {
        let cache = StaticCache::new();
        cache.write(&[spanned(0, 10)]).unwrap();
        cache.write(&[spanned(5, 15)]).unwrap();
        assert_eq!(cache.series_count(), 2);
        let res = cache.dirty_read(TimeRange::new(0u64, 15u64));
        assert!(res.gaps.is_empty());
        // The second entry kept only its non-redundant tail.
        assert_eq!(res.series[1].alignment_bounds(), crate::bounds::Bounds::new(10, 15));
    }

    #[test]
    fn test_subsuming_write_replaces_entries() {
        let cache = StaticCache::new();
        cache.write(&[spanned(2, 4), spanned(6, 8)]).unwrap();
        cache.write(&[spanned(0, 10)]).unwrap();
        assert_eq!(cache.series_count(), 1);
        let res = cache.dirty_read(TimeRange::new(0u64, 10u64));
        assert_eq!(res.series[0].len(), 10);
        assert!(res.gaps.is_empty());
    }

    #[test]
    fn test_fully_redundant_write_is_skipped() {
        let cache = StaticCache::new();
        cache.write(&[spanned(0, 10)]).unwrap();
        cache.write(&[spanned(2, 8)]).unwrap();
        assert_eq!(cache.series_count(), 1);
        assert_eq!(
            cache.dirty_read(TimeRange::MAX).series[0].alignment_bounds(),
            crate::bounds::Bounds::new(0, 10)
        );
    }

    #[test]
    fn test_out_of_order_writes_stay_sorted() {
        let cache = StaticCache::new();
        cache.write(&[spanned(20, 30)]).unwrap();
        cache.write(&[spanned(0, 10)]).unwrap();
        cache.write(&[spanned(10, 20)]).unwrap();
        let res = cache.dirty_read(TimeRange::new(0u64, 30u64));
        assert_eq!(res.series.len(), 3);
        assert!(res.gaps.is_empty());
        let alignments: Vec<u64> = res.series.iter().map(Series::alignment).collect();
        assert_eq!(alignments, vec![0, 10, 20]);
    }

    #[test]
    fn test_gc_purges_idle_entries() {
        let cache = StaticCache::new();
        cache.write(&[spanned(0, 10), spanned(20, 30)]).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        // A generous threshold purges nothing.
        let metrics = cache.gc(Duration::from_secs(3600));
        assert_eq!(metrics, GcMetrics::default());
        assert_eq!(cache.series_count(), 2);
        // A zero threshold purges everything idle.
        let metrics = cache.gc(Duration::ZERO);
        assert_eq!(metrics.purged_series, 2);
        assert_eq!(metrics.purged_bytes, 2 * 10 * 4);
        assert_eq!(cache.series_count(), 0);
    }

    #[test]
    fn test_read_refreshes_gc_stamp() {
        let cache = StaticCache::new();
        cache.write(&[spanned(0, 10)]).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        // Reading the entry marks it as in use.
        cache.dirty_read(TimeRange::new(0u64, 10u64));
        let metrics = cache.gc(Duration::from_millis(10));
        assert_eq!(metrics.purged_series, 0);
        assert_eq!(cache.series_count(), 1);
    }

    #[tokio::test]
    async fn test_gc_skips_while_fill_in_flight() {
        let cache = StaticCache::new();
        cache.write(&[spanned(0, 10)]).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        let (_res, permit) = cache.dirty_read_for_write(TimeRange::new(0u64, 10u64)).await;
        assert_eq!(cache.gc(Duration::ZERO), GcMetrics::default());
        permit.release();
        // dirty_read_for_write stamped the entry, so give it time to go
        // idle again before sweeping.
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.gc(Duration::ZERO).purged_series, 1);
    }

    #[test]
    fn test_close_discards_everything() {
        let cache = StaticCache::new();
        cache.write(&[spanned(0, 10)]).unwrap();
        cache.close();
        assert_eq!(cache.series_count(), 0);
        let res = cache.dirty_read(TimeRange::new(0u64, 10u64));
        assert_eq!(res.gaps, vec![TimeRange::new(0u64, 10u64)]);
    }

    #[tokio::test]
    async fn test_dirty_read_for_write_round_trip() {
        let cache = StaticCache::new();
        let tr = TimeRange::new(0u64, 10u64);
        let (res, permit) = cache.dirty_read_for_write(tr).await;
        assert_eq!(res.gaps, vec![tr]);
        cache.write(&[spanned(0, 10)]).unwrap();
        drop(permit);
        let (res, permit) = cache.dirty_read_for_write(tr).await;
        assert!(res.gaps.is_empty());
        permit.release();
    }
}
