//! Time primitives shared by every cache layer.
//!
//! All timestamps are nanoseconds since the Unix epoch, wrapped in
//! [`TimeStamp`] to keep them from being confused with alignments (which are
//! logical sample indexes, not wall-clock values). [`TimeRange`] is half-open:
//! `[start, end)`.

use serde::{Deserialize, Serialize};

/// A nanosecond-precision UTC timestamp.
///
/// `TimeStamp` is a thin wrapper over `u64` nanoseconds since the Unix epoch.
/// It is `Copy` and totally ordered, so it can be compared and stored freely
/// on hot paths.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TimeStamp(u64);

impl TimeStamp {
    /// The zero timestamp (the Unix epoch).
    pub const ZERO: TimeStamp = TimeStamp(0);

    /// The maximum representable timestamp. Used as the open end of a live
    /// buffer's time range until the buffer is flushed.
    pub const MAX: TimeStamp = TimeStamp(u64::MAX);

    /// Creates a timestamp from raw nanoseconds since the Unix epoch.
    pub const fn new(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Returns the current wall-clock time.
    ///
    /// Clocks before the Unix epoch saturate to [`TimeStamp::ZERO`].
    #[allow(clippy::cast_possible_truncation)] // u64 nanos covers ~584 years
    pub fn now() -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self(nanos)
    }

    /// Returns the raw nanosecond value.
    pub const fn nanos(&self) -> u64 {
        self.0
    }

    /// Returns a range spanning from this timestamp to `end`.
    pub const fn range(&self, end: TimeStamp) -> TimeRange {
        TimeRange {
            start: *self,
            end,
        }
    }
}

impl From<u64> for TimeStamp {
    fn from(nanos: u64) -> Self {
        Self(nanos)
    }
}

impl std::fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// A half-open range of time `[start, end)`.
///
/// Ranges are the query currency of the static cache: stored series are
/// matched against a requested range, and uncovered sub-ranges come back as
/// gaps. A range is *valid* when `start <= end` and *zero* when it spans no
/// time at all; gap lists only ever contain valid, non-zero ranges.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct TimeRange {
    /// Inclusive start of the range.
    pub start: TimeStamp,
    /// Exclusive end of the range.
    pub end: TimeStamp,
}

impl TimeRange {
    /// The zero range.
    pub const ZERO: TimeRange = TimeRange {
        start: TimeStamp::ZERO,
        end: TimeStamp::ZERO,
    };

    /// The range spanning all representable time.
    pub const MAX: TimeRange = TimeRange {
        start: TimeStamp::ZERO,
        end: TimeStamp::MAX,
    };

    /// Creates a range from start and end timestamps.
    pub fn new(start: impl Into<TimeStamp>, end: impl Into<TimeStamp>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Returns true when `start <= end`.
    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }

    /// Returns true when the range spans no time.
    pub fn is_zero(&self) -> bool {
        self.start == self.end
    }

    /// Returns the span of the range in nanoseconds, or 0 for invalid ranges.
    pub fn span(&self) -> u64 {
        self.end.nanos().saturating_sub(self.start.nanos())
    }

    /// Returns true when the two half-open ranges share any instant.
    pub fn overlaps_with(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true when `ts` falls within the range.
    pub fn contains(&self, ts: TimeStamp) -> bool {
        ts >= self.start && ts < self.end
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}
