//! Typed sample blocks and their normalization into cache form.
//!
//! A [`Series`] is an immutable-once-written block of fixed-width samples
//! tagged with a [`DataType`], a wall-clock [`TimeRange`], and an *alignment*:
//! the series' position in its channel's logical sample ordering. Alignment,
//! not timestamps, is what the caches use to decide contiguity and overlap.
//!
//! Both caches store samples in a single comparable representation, `f32`.
//! [`Series::to_float32`] performs that conversion, subtracting a
//! `sample_offset` first so that large magnitudes (notably nanosecond
//! timestamps) survive the narrowing: the stored value is
//! `(raw - sample_offset) as f32`, and the offset rides along on the series
//! for consumers that need the original magnitude back.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::bounds::Bounds;
use crate::error::{Result, SeriesError};
use crate::telem::{TimeRange, TimeStamp};

/// The closed set of sample types a channel can carry.
///
/// Samples are fixed-width and little-endian in a series' raw buffer.
/// `Timestamp` is a nanosecond `u64` that receives sample-offset treatment
/// during float32 conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Unsigned 8-bit integer.
    Uint8,
    /// Signed 32-bit integer.
    Int32,
    /// Signed 64-bit integer.
    Int64,
    /// Unsigned 32-bit integer.
    Uint32,
    /// Unsigned 64-bit integer.
    Uint64,
    /// 32-bit float, the cache's internal representation.
    Float32,
    /// 64-bit float.
    Float64,
    /// Nanosecond timestamp (unsigned 64-bit).
    Timestamp,
}

impl DataType {
    /// Returns the width of one sample in bytes.
    pub const fn element_width(&self) -> usize {
        match self {
            DataType::Uint8 => 1,
            DataType::Int32 | DataType::Uint32 | DataType::Float32 => 4,
            DataType::Int64 | DataType::Uint64 | DataType::Float64 | DataType::Timestamp => 8,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DataType::Uint8 => "uint8",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::Uint32 => "uint32",
            DataType::Uint64 => "uint64",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
            DataType::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}

/// An immutable block of typed samples with a time range and alignment.
///
/// The raw buffer is reference-counted, so cloning and slicing a series is
/// cheap and read results can hand copies back to concurrent consumers
/// without duplicating sample data.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    data_type: DataType,
    alignment: u64,
    time_range: TimeRange,
    sample_offset: i64,
    key: String,
    data: Arc<[u8]>,
}

/// A lightweight identity summary of a series, used in write responses and
/// structured log fields where handing over the sample data would be wrong
/// or wasteful.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesDigest {
    /// The series key (empty when the series was never keyed).
    pub key: String,
    /// The sample type.
    pub data_type: DataType,
    /// The alignment bounds the series occupies.
    pub bounds: Bounds,
    /// The wall-clock range the series covers.
    pub time_range: TimeRange,
}

impl Series {
    /// Creates a series from raw little-endian sample bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::UnalignedBuffer`] when `data` is not a whole
    /// number of `data_type` samples.
    pub fn new(
        data_type: DataType,
        data: Vec<u8>,
        alignment: u64,
        time_range: TimeRange,
    ) -> Result<Self> {
        let width = data_type.element_width();
        if data.len() % width != 0 {
            return Err(SeriesError::UnalignedBuffer {
                byte_len: data.len(),
                data_type,
                width,
            }
            .into());
        }
        Ok(Self {
            data_type,
            alignment,
            time_range,
            sample_offset: 0,
            key: String::new(),
            data: data.into(),
        })
    }

    /// Creates a float32 series from samples. Infallible; the time range
    /// defaults to [`TimeRange::ZERO`] and can be set with
    /// [`Series::with_time_range`].
    pub fn from_f32s(samples: impl AsRef<[f32]>, alignment: u64) -> Self {
        let mut data = Vec::with_capacity(samples.as_ref().len() * 4);
        for s in samples.as_ref() {
            data.extend_from_slice(&s.to_le_bytes());
        }
        Self {
            data_type: DataType::Float32,
            alignment,
            time_range: TimeRange::ZERO,
            sample_offset: 0,
            key: String::new(),
            data: data.into(),
        }
    }

    /// Creates a timestamp series from nanosecond timestamps.
    pub fn from_timestamps(samples: impl AsRef<[TimeStamp]>, alignment: u64) -> Self {
        let mut data = Vec::with_capacity(samples.as_ref().len() * 8);
        for s in samples.as_ref() {
            data.extend_from_slice(&s.nanos().to_le_bytes());
        }
        Self {
            data_type: DataType::Timestamp,
            alignment,
            time_range: TimeRange::ZERO,
            sample_offset: 0,
            key: String::new(),
            data: data.into(),
        }
    }

    /// Sets the time range the series covers.
    #[must_use]
    pub fn with_time_range(mut self, time_range: TimeRange) -> Self {
        self.time_range = time_range;
        self
    }

    /// Sets the series key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Sets the sample offset carried by the series.
    #[must_use]
    pub fn with_sample_offset(mut self, sample_offset: i64) -> Self {
        self.sample_offset = sample_offset;
        self
    }

    /// Returns the sample type.
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Returns the alignment of the first sample.
    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    /// Returns the wall-clock range the series covers.
    pub fn time_range(&self) -> TimeRange {
        self.time_range
    }

    /// Returns the sample offset subtracted during float32 conversion.
    pub fn sample_offset(&self) -> i64 {
        self.sample_offset
    }

    /// Returns the series key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the number of samples.
    pub fn len(&self) -> usize {
        self.data.len() / self.data_type.element_width()
    }

    /// Returns true when the series holds no samples.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the size of the raw sample buffer in bytes.
    pub fn byte_size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Returns the half-open alignment interval the series occupies.
    pub fn alignment_bounds(&self) -> Bounds {
        Bounds::new(self.alignment, self.alignment + self.len() as u64)
    }

    /// Returns an identity summary of the series.
    pub fn digest(&self) -> SeriesDigest {
        SeriesDigest {
            key: self.key.clone(),
            data_type: self.data_type,
            bounds: self.alignment_bounds(),
            time_range: self.time_range,
        }
    }

    /// Returns the sub-series covering samples `start..end`, with alignment
    /// shifted accordingly. Out-of-range indexes are clamped.
    ///
    /// The time range is carried over unchanged: per-sample timestamps are
    /// not stored, so a slice cannot narrow it.
    pub fn slice(&self, start: usize, end: usize) -> Series {
        let len = self.len();
        let start = start.min(len);
        let end = end.clamp(start, len);
        let width = self.data_type.element_width();
        Series {
            data_type: self.data_type,
            alignment: self.alignment + start as u64,
            time_range: self.time_range,
            sample_offset: self.sample_offset,
            key: self.key.clone(),
            data: self.data[start * width..end * width].into(),
        }
    }

    /// Reads every sample as `f64`, without applying any sample offset.
    ///
    /// Intended for inspection and tests; values wider than an `f64` mantissa
    /// (u64 timestamps) lose precision here, which is exactly what
    /// [`Series::to_float32`]'s offset handling exists to avoid on the cache
    /// path.
    #[allow(clippy::cast_precision_loss)] // documented: inspection only
    pub fn raw_values(&self) -> Vec<f64> {
        let width = self.data_type.element_width();
        self.data
            .chunks_exact(width)
            .map(|c| match self.data_type {
                DataType::Uint8 => f64::from(c[0]),
                DataType::Int32 => f64::from(i32::from_le_bytes([c[0], c[1], c[2], c[3]])),
                DataType::Uint32 => f64::from(u32::from_le_bytes([c[0], c[1], c[2], c[3]])),
                DataType::Float32 => f64::from(f32::from_le_bytes([c[0], c[1], c[2], c[3]])),
                DataType::Int64 => i64::from_le_bytes([
                    c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7],
                ]) as f64,
                DataType::Uint64 | DataType::Timestamp => u64::from_le_bytes([
                    c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7],
                ]) as f64,
                DataType::Float64 => f64::from_le_bytes([
                    c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7],
                ]),
            })
            .collect()
    }

    /// Converts every sample to `f32` after subtracting `offset`.
    ///
    /// Integer-family samples are centered in integer arithmetic before the
    /// narrowing cast so timestamp-scale magnitudes keep their precision.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap
    )] // f32 narrowing is the point of this conversion
    pub fn float32_samples(&self, offset: i64) -> Vec<f32> {
        let width = self.data_type.element_width();
        self.data
            .chunks_exact(width)
            .map(|c| match self.data_type {
                DataType::Uint8 => (i64::from(c[0]) - offset) as f32,
                DataType::Int32 => {
                    (i64::from(i32::from_le_bytes([c[0], c[1], c[2], c[3]])) - offset) as f32
                }
                DataType::Uint32 => {
                    (i64::from(u32::from_le_bytes([c[0], c[1], c[2], c[3]])) - offset) as f32
                }
                DataType::Float32 => {
                    let v = f32::from_le_bytes([c[0], c[1], c[2], c[3]]);
                    if offset == 0 { v } else { (f64::from(v) - offset as f64) as f32 }
                }
                DataType::Int64 => {
                    let v = i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]);
                    (i128::from(v) - i128::from(offset)) as f32
                }
                DataType::Uint64 | DataType::Timestamp => {
                    let v = u64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]);
                    (i128::from(v) - i128::from(offset)) as f32
                }
                DataType::Float64 => {
                    let v = f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]);
                    (v - offset as f64) as f32
                }
            })
            .collect()
    }

    /// Normalizes the series into the caches' internal float32 form.
    ///
    /// When `offset` is `None`, timestamp series default to their first
    /// sample as the offset and every other type defaults to zero. A series
    /// that is already float32 with a zero offset is returned as-is (the
    /// underlying buffer is shared, not copied).
    pub fn to_float32(&self, offset: Option<i64>) -> Series {
        let offset = offset.unwrap_or_else(|| {
            if self.data_type == DataType::Timestamp {
                self.first_sample_i64().unwrap_or(0)
            } else {
                0
            }
        });
        if self.data_type == DataType::Float32 && offset == 0 {
            return self.clone();
        }
        let samples = self.float32_samples(offset);
        Series::from_f32s(samples, self.alignment)
            .with_time_range(self.time_range)
            .with_sample_offset(offset)
            .with_key(self.key.clone())
    }

    /// Reads the first sample as a raw `i64`, if any.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn first_sample_i64(&self) -> Option<i64> {
        let width = self.data_type.element_width();
        let c = self.data.get(..width)?;
        let v = match self.data_type {
            DataType::Uint8 => i64::from(c[0]),
            DataType::Int32 => i64::from(i32::from_le_bytes([c[0], c[1], c[2], c[3]])),
            DataType::Uint32 => i64::from(u32::from_le_bytes([c[0], c[1], c[2], c[3]])),
            DataType::Float32 => f32::from_le_bytes([c[0], c[1], c[2], c[3]]) as i64,
            DataType::Int64 => i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]),
            DataType::Uint64 | DataType::Timestamp => {
                u64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as i64
            }
            DataType::Float64 => {
                f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as i64
            }
        };
        Some(v)
    }
}
