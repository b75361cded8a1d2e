//! Rolling-buffer cache for live, approximately-in-order sample streams.
//!
//! The dynamic cache absorbs a continuous stream of newly arrived samples
//! into one fixed-capacity buffer per channel. When the buffer fills, or an
//! incoming series breaks alignment continuity with the buffer's tail, the
//! buffer is *flushed*: returned to the caller, which takes over its
//! persistence (typically a write into the static cache or a hand-off to a
//! renderer), and a fresh buffer is allocated in its place.
//!
//! This layer is purely mechanical: there are no recoverable failures, and
//! malformed (zero-length) input series are a no-op. Writes are assumed
//! single-writer per channel; the owning [`UnaryCache`](crate::unary::UnaryCache)
//! guards access with a mutex.

use crate::series::{DataType, Series, SeriesDigest};
use crate::telem::TimeStamp;

/// Response from a write to the dynamic cache.
#[derive(Debug, Default)]
pub struct DynamicWriteResponse {
    /// Buffers displaced during this write, in flush order. Ownership
    /// transfers to the caller; the cache will never touch them again.
    pub flushed: Vec<Series>,
    /// Digests of every buffer allocated during this write, including the
    /// one left open as the live tail. Digest bounds describe the buffer's
    /// reserved span (`alignment..alignment + capacity`).
    pub allocated: Vec<SeriesDigest>,
}

/// A rolling float32 buffer for one channel's live writes.
///
/// The buffer lifecycle is `Empty -> Filling -> flushed (replaced)`: the
/// buffer is `None` until the first write, fills in place while incoming
/// series stay contiguous, and is replaced (never reused) once full or
/// broken. Incoming samples are converted to the cache's internal float32
/// representation on entry, with timestamp channels anchored to a
/// per-buffer sample offset.
#[derive(Debug)]
pub struct DynamicCache {
    capacity: usize,
    data_type: DataType,
    counter: u32,
    buffer: Option<OpenBuffer>,
}

/// The currently-filling buffer.
#[derive(Debug)]
struct OpenBuffer {
    key: String,
    alignment: u64,
    sample_offset: i64,
    start: TimeStamp,
    capacity: usize,
    samples: Vec<f32>,
}

impl OpenBuffer {
    /// Appends as many samples as remaining capacity allows, returning the
    /// number written.
    fn push(&mut self, samples: &[f32]) -> usize {
        let fit = (self.capacity - self.samples.len()).min(samples.len());
        self.samples.extend_from_slice(&samples[..fit]);
        fit
    }

    fn digest(&self) -> SeriesDigest {
        SeriesDigest {
            key: self.key.clone(),
            data_type: DataType::Float32,
            bounds: crate::bounds::Bounds::new(
                self.alignment,
                self.alignment + self.capacity as u64,
            ),
            time_range: self.start.range(TimeStamp::MAX),
        }
    }

    /// Seals the buffer into an immutable series ending at `end`.
    fn into_series(self, end: TimeStamp) -> Series {
        Series::from_f32s(self.samples, self.alignment)
            .with_time_range(self.start.range(end))
            .with_sample_offset(self.sample_offset)
            .with_key(self.key)
    }

    /// Copies the current contents out as an immutable snapshot.
    fn snapshot(&self) -> Series {
        Series::from_f32s(self.samples.as_slice(), self.alignment)
            .with_time_range(self.start.range(TimeStamp::MAX))
            .with_sample_offset(self.sample_offset)
            .with_key(self.key.clone())
    }
}

impl DynamicCache {
    /// Creates a dynamic cache for a channel of the given type.
    ///
    /// `capacity` is the buffer size in samples; it is clamped to at least 1
    /// so writes always make progress.
    pub fn new(capacity: u32, data_type: DataType) -> Self {
        Self {
            capacity: (capacity.max(1)) as usize,
            data_type,
            counter: 0,
            buffer: None,
        }
    }

    /// Returns the number of samples currently held in the open buffer.
    pub fn len(&self) -> usize {
        self.buffer.as_ref().map_or(0, |b| b.samples.len())
    }

    /// Returns true when no buffer is open or the open buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a snapshot of the live tail, if a buffer is open.
    ///
    /// The snapshot is a copy taken at call time; subsequent writes do not
    /// modify it.
    pub fn leading_buffer(&self) -> Option<Series> {
        self.buffer.as_ref().map(OpenBuffer::snapshot)
    }

    /// Writes the given series into the rolling buffer, in order.
    ///
    /// For each series: a buffer is allocated at the series' alignment if
    /// none is open; an open buffer whose tail is more than one sample away
    /// from the series' alignment is flushed first; samples are converted to
    /// float32 and appended; and when a series overflows the buffer, the full
    /// buffer is flushed and the remainder continues into a fresh buffer at
    /// `alignment + written`.
    pub fn write(&mut self, series: &[Series]) -> DynamicWriteResponse {
        let mut res = DynamicWriteResponse::default();
        for s in series {
            self.write_one(s, &mut res);
        }
        res
    }

    /// Discards the open buffer. The cache must not be written after close.
    pub fn close(&mut self) {
        self.buffer = None;
    }

    fn allocate(&mut self, alignment: u64, start: TimeStamp) -> OpenBuffer {
        self.counter += 1;
        #[allow(clippy::cast_possible_wrap)] // u64 nanos stay below i64::MAX until 2262
        let sample_offset = if self.data_type == DataType::Timestamp {
            start.nanos() as i64
        } else {
            0
        };
        OpenBuffer {
            key: format!("dynamic-{}", self.counter),
            alignment,
            sample_offset,
            start,
            capacity: self.capacity,
            samples: Vec::with_capacity(self.capacity),
        }
    }

    fn write_one(&mut self, series: &Series, res: &mut DynamicWriteResponse) {
        if series.is_empty() {
            return;
        }
        match &self.buffer {
            // First write to the cache.
            None => {
                let buf = self.allocate(series.alignment(), TimeStamp::now());
                res.allocated.push(buf.digest());
                self.buffer = Some(buf);
            }
            Some(buf) => {
                let tail = buf.alignment + buf.samples.len() as u64;
                // The incoming series is not contiguous with the buffer's
                // tail (1 sample of tolerance): flush and start over at the
                // new alignment.
                if tail.abs_diff(series.alignment()) > 1 {
                    tracing::debug!(
                        tail,
                        alignment = series.alignment(),
                        "alignment discontinuity, flushing open buffer"
                    );
                    let now = TimeStamp::now();
                    if let Some(old) = self.buffer.take() {
                        res.flushed.push(old.into_series(now));
                    }
                    let buf = self.allocate(series.alignment(), now);
                    res.allocated.push(buf.digest());
                    self.buffer = Some(buf);
                }
            }
        }
        let mut remaining = series.clone();
        loop {
            let written = match self.buffer.as_mut() {
                Some(buf) => {
                    let converted = remaining.float32_samples(buf.sample_offset);
                    buf.push(&converted)
                }
                // A buffer is always open at this point.
                None => return,
            };
            if written == remaining.len() {
                return;
            }
            // The buffer filled mid-series: flush it and continue into a
            // fresh buffer picking up where the write left off.
            let now = TimeStamp::now();
            if let Some(full) = self.buffer.take() {
                res.flushed.push(full.into_series(now));
            }
            let next = self.allocate(remaining.alignment() + written as u64, now);
            res.allocated.push(next.digest());
            self.buffer = Some(next);
            remaining = remaining.slice(written, remaining.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f32s(values: &[f32], alignment: u64) -> Series {
        Series::from_f32s(values, alignment)
    }

    #[test]
    fn test_first_write_allocates() {
        let mut cache = DynamicCache::new(100, DataType::Float32);
        let res = cache.write(&[f32s(&[1.0, 2.0, 3.0], 0)]);
        assert_eq!(res.flushed.len(), 0);
        assert_eq!(res.allocated.len(), 1);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_contiguous_write_reuses_buffer() {
        let mut cache = DynamicCache::new(100, DataType::Float32);
        cache.write(&[f32s(&[1.0, 2.0, 3.0], 0)]);
        let res = cache.write(&[f32s(&[4.0, 5.0, 6.0], 3)]);
        assert_eq!(res.flushed.len(), 0);
        assert_eq!(res.allocated.len(), 0);
        assert_eq!(cache.len(), 6);
    }

    #[test]
    fn test_contiguous_fill_single_buffer() {
        // Alignments 0, 3, 6 with lengths 3 each into capacity 10: one open
        // buffer of length 9, nothing flushed, one allocation total.
        let mut cache = DynamicCache::new(10, DataType::Float32);
        let mut flushed = 0;
        let mut allocated = 0;
        for alignment in [0u64, 3, 6] {
            let res = cache.write(&[f32s(&[1.0, 2.0, 3.0], alignment)]);
            flushed += res.flushed.len();
            allocated += res.allocated.len();
        }
        assert_eq!(flushed, 0);
        assert_eq!(allocated, 1);
        assert_eq!(cache.len(), 9);
    }

    #[test]
    fn test_capacity_split() {
        // Capacity 5: 3 samples at alignment 0, then 4 contiguous samples at
        // alignment 3. The buffer flushes full (samples 0..5) and the two
        // leftover samples (5..7) stay open in a fresh buffer.
        let mut cache = DynamicCache::new(5, DataType::Float32);
        cache.write(&[f32s(&[0.0, 1.0, 2.0], 0)]);
        let res = cache.write(&[f32s(&[3.0, 4.0, 5.0, 6.0], 3)]);
        assert_eq!(res.flushed.len(), 1);
        assert_eq!(res.allocated.len(), 1);
        assert_eq!(res.flushed[0].len(), 5);
        assert_eq!(res.flushed[0].alignment_bounds(), crate::bounds::Bounds::new(0, 5));
        assert_eq!(res.flushed[0].raw_values(), vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        let open = cache.leading_buffer().unwrap();
        assert_eq!(open.alignment_bounds(), crate::bounds::Bounds::new(5, 7));
        assert_eq!(open.raw_values(), vec![5.0, 6.0]);
    }

    #[test]
    fn test_single_series_overflow_allocates_once_more() {
        let mut cache = DynamicCache::new(2, DataType::Float32);
        let res = cache.write(&[f32s(&[1.0, 2.0, 3.0], 0)]);
        assert_eq!(res.flushed.len(), 1);
        assert_eq!(res.allocated.len(), 2);
        // The flushed buffer is the first one allocated.
        assert_eq!(res.flushed[0].key(), res.allocated[0].key);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_single_series_overflow_multiple_buffers() {
        let mut cache = DynamicCache::new(1, DataType::Float32);
        let res = cache.write(&[f32s(&[1.0, 2.0, 3.0], 0)]);
        assert_eq!(res.flushed.len(), 2);
        assert_eq!(res.allocated.len(), 3);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_flushed_buffer_contents_across_writes() {
        let mut cache = DynamicCache::new(10, DataType::Float32);
        assert_eq!(cache.write(&[f32s(&[1.0, 2.0, 3.0], 0)]).allocated.len(), 1);
        assert_eq!(cache.write(&[f32s(&[1.0, 2.0, 3.0], 3)]).allocated.len(), 0);
        assert_eq!(cache.write(&[f32s(&[1.0, 2.0, 3.0], 6)]).allocated.len(), 0);
        let res = cache.write(&[f32s(&[1.0, 2.0, 3.0], 9)]);
        assert_eq!(res.allocated.len(), 1);
        assert_eq!(res.flushed.len(), 1);
        let values = res.flushed[0].raw_values();
        assert_eq!(values.len(), 10);
        assert_eq!(&values[0..3], &[1.0, 2.0, 3.0]);
        assert_eq!(&values[3..6], &[1.0, 2.0, 3.0]);
        assert_eq!(&values[6..9], &[1.0, 2.0, 3.0]);
        assert_eq!(values[9], 1.0);
    }

    #[test]
    fn test_discontinuity_flushes_as_is() {
        // Buffer holds samples at alignments 0..3; a write at alignment 10
        // (gap > 1) flushes the old buffer unchanged and starts fresh.
        let mut cache = DynamicCache::new(10, DataType::Float32);
        cache.write(&[f32s(&[1.0, 2.0, 3.0], 0)]);
        let res = cache.write(&[f32s(&[9.0, 9.0], 10)]);
        assert_eq!(res.flushed.len(), 1);
        assert_eq!(res.allocated.len(), 1);
        assert_eq!(res.flushed[0].len(), 3);
        assert_eq!(res.flushed[0].alignment_bounds(), crate::bounds::Bounds::new(0, 3));
        let open = cache.leading_buffer().unwrap();
        assert_eq!(open.alignment(), 10);
    }

    #[test]
    fn test_discontinuity_within_single_call() {
        let mut cache = DynamicCache::new(10, DataType::Float32);
        let res = cache.write(&[f32s(&[1.0, 2.0, 3.0], 0), f32s(&[4.0, 5.0], 8)]);
        assert_eq!(res.flushed.len(), 1);
        assert_eq!(res.allocated.len(), 2);
    }

    #[test]
    fn test_one_sample_alignment_tolerance() {
        let mut cache = DynamicCache::new(10, DataType::Float32);
        cache.write(&[f32s(&[1.0, 2.0], 0)]);
        // Tail is at 2; alignment 3 is within the 1-sample tolerance.
        let res = cache.write(&[f32s(&[3.0], 3)]);
        assert_eq!(res.flushed.len(), 0);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_empty_series_is_noop() {
        let mut cache = DynamicCache::new(10, DataType::Float32);
        let res = cache.write(&[f32s(&[], 0)]);
        assert_eq!(res.flushed.len(), 0);
        assert_eq!(res.allocated.len(), 0);
        assert!(cache.is_empty());
        assert!(cache.leading_buffer().is_none());
    }

    #[test]
    fn test_timestamp_channel_uses_sample_offset() {
        let mut cache = DynamicCache::new(10, DataType::Timestamp);
        let base = TimeStamp::now().nanos();
        let res = cache.write(&[Series::from_timestamps(
            [TimeStamp::new(base), TimeStamp::new(base + 500)],
            0,
        )]);
        assert_eq!(res.allocated.len(), 1);
        let open = cache.leading_buffer().unwrap();
        assert!(open.sample_offset() > 0);
        let values = open.raw_values();
        // Values are offset-relative, so they stay tiny compared to the
        // ~1.7e18 raw nanosecond magnitudes.
        assert!(values.iter().all(|v| v.abs() < 2_000_000_000.0));
        assert!((values[1] - values[0] - 500.0).abs() <= 64.0);
    }

    #[test]
    fn test_close_discards_buffer() {
        let mut cache = DynamicCache::new(10, DataType::Float32);
        cache.write(&[f32s(&[1.0], 0)]);
        cache.close();
        assert!(cache.leading_buffer().is_none());
        assert_eq!(cache.len(), 0);
    }
}
