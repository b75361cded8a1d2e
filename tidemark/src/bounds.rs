//! Alignment bounds and the insertion plan used by the static cache.
//!
//! Every series occupies a half-open interval `[alignment, alignment + len)`
//! in its channel's logical sample ordering. The static cache keeps its
//! stored series sorted by these bounds and non-overlapping; merging a new
//! series into that timeline is expressed as an [`InsertionPlan`]: how many
//! samples to trim from the head and tail of the incoming series, where to
//! splice it in, and how many fully-subsumed stored entries it replaces.
//!
//! Planning and execution are deliberately split: [`build_insertion_plan`]
//! is a pure function over bounds, so it can be tested exhaustively without
//! touching sample data.

use serde::{Deserialize, Serialize};

/// A half-open interval `[lower, upper)` over a channel's alignment space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bounds {
    /// Inclusive lower bound.
    pub lower: u64,
    /// Exclusive upper bound.
    pub upper: u64,
}

impl Bounds {
    /// Creates bounds from lower and upper alignment values.
    pub const fn new(lower: u64, upper: u64) -> Self {
        Self { lower, upper }
    }

    /// Returns the number of samples the bounds span.
    pub fn span(&self) -> u64 {
        self.upper.saturating_sub(self.lower)
    }

    /// Returns true when the bounds span no samples.
    pub fn is_empty(&self) -> bool {
        self.upper <= self.lower
    }

    /// Returns true when the two half-open intervals share any sample index.
    ///
    /// Empty bounds never overlap anything.
    pub fn overlaps_with(&self, other: &Bounds) -> bool {
        self.lower < other.upper && other.lower < self.upper
    }

    /// Returns true when `other` lies entirely within these bounds.
    pub fn contains(&self, other: &Bounds) -> bool {
        other.lower >= self.lower && other.upper <= self.upper
    }
}

impl std::fmt::Display for Bounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.lower, self.upper)
    }
}

/// The splice operation that merges one series into a sorted, non-overlapping
/// store without violating the non-overlap invariant.
///
/// Produced by [`build_insertion_plan`] and executed by the static cache:
/// slice `remove_before..len - remove_after` out of the incoming series, then
/// replace the `delete_in_between` stored entries starting at `insert_into`
/// with the trimmed series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertionPlan {
    /// Index in the stored list at which the trimmed series is spliced in.
    pub insert_into: usize,
    /// Number of stored entries, starting at `insert_into`, that the incoming
    /// series fully subsumes and replaces.
    pub delete_in_between: usize,
    /// Samples to trim from the head of the incoming series because a stored
    /// neighbor already covers them.
    pub remove_before: usize,
    /// Samples to trim from the tail of the incoming series because a stored
    /// neighbor already covers them.
    pub remove_after: usize,
}

/// Computes the insertion plan for merging `inserting` into `existing`.
///
/// `existing` must be sorted by bounds and non-overlapping (the static
/// cache's standing invariant). Returns `None` when no viable plan exists:
/// the incoming bounds are empty, or a stored neighbor already covers every
/// incoming sample (a fully redundant read).
///
/// # Examples
///
/// ```rust
/// use tidemark::bounds::{Bounds, build_insertion_plan};
///
/// let existing = vec![Bounds::new(0, 10), Bounds::new(20, 30)];
/// let plan = build_insertion_plan(&existing, Bounds::new(5, 25)).unwrap();
/// // Samples 5..10 and 20..25 are already covered; the remainder lands
/// // between the two stored entries.
/// assert_eq!(plan.remove_before, 5);
/// assert_eq!(plan.remove_after, 5);
/// assert_eq!(plan.insert_into, 1);
/// assert_eq!(plan.delete_in_between, 0);
/// ```
#[allow(clippy::cast_possible_truncation)] // trim counts are bounded by the series length
pub fn build_insertion_plan(existing: &[Bounds], inserting: Bounds) -> Option<InsertionPlan> {
    if inserting.is_empty() {
        return None;
    }

    // First stored entry that ends after our start; everything before it is
    // entirely to our left.
    let start = existing.partition_point(|e| e.upper <= inserting.lower);

    let mut insert_into = start;
    let mut remove_before = 0u64;
    let mut effective_lower = inserting.lower;
    if let Some(e) = existing.get(start) {
        if e.lower <= inserting.lower {
            // The left neighbor covers our head; trim it and insert after.
            remove_before = e.upper.min(inserting.upper) - inserting.lower;
            effective_lower = inserting.lower + remove_before;
            insert_into = start + 1;
        }
    }
    if effective_lower >= inserting.upper {
        // Fully covered by the left neighbor: a redundant read.
        return None;
    }

    // First stored entry that starts at or after our end; entries between
    // `insert_into` and here overlap what remains of the incoming series.
    let end = existing.partition_point(|e| e.lower < inserting.upper);
    let mut remove_after = 0u64;
    let mut delete_end = end;
    if end > insert_into {
        let e = &existing[end - 1];
        if e.upper > inserting.upper {
            // The right neighbor extends past our tail; trim the tail and
            // leave that entry in place.
            remove_after = inserting.upper - e.lower;
            delete_end = end - 1;
        }
    }

    // Everything left in insert_into..delete_end is fully subsumed.
    Some(InsertionPlan {
        insert_into,
        delete_in_between: delete_end - insert_into,
        remove_before: remove_before as usize,
        remove_after: remove_after as usize,
    })
}
