//! Integration tests for the historical interval layer through the public
//! API.

use tidemark::{Series, StaticCache, TimeRange};

/// One sample per time unit over `[lo, hi)`, with alignment matching.
fn spanned(lo: u64, hi: u64) -> Series {
    let values: Vec<f32> = (lo..hi).map(|v| v as f32).collect();
    Series::from_f32s(values, lo).with_time_range(TimeRange::new(lo, hi))
}

#[test]
fn gap_computation_over_partial_coverage() {
    let cache = StaticCache::new();
    cache.write(&[spanned(0, 10), spanned(20, 30)]).unwrap();

    let res = cache.dirty_read(TimeRange::new(5u64, 25u64));
    assert_eq!(res.series.len(), 2);
    assert_eq!(res.gaps, vec![TimeRange::new(10u64, 20u64)]);

    // Widening the query adds leading and trailing gaps.
    let res = cache.dirty_read(TimeRange::new(0u64, 40u64));
    assert_eq!(
        res.gaps,
        vec![TimeRange::new(10u64, 20u64), TimeRange::new(30u64, 40u64)]
    );
}

#[test]
fn repeated_writes_converge() {
    let cache = StaticCache::new();
    cache.write(&[spanned(0, 10)]).unwrap();
    let before = cache.dirty_read(TimeRange::MAX);

    cache.write(&[spanned(0, 10)]).unwrap();
    cache.write(&[spanned(2, 8)]).unwrap();
    let after = cache.dirty_read(TimeRange::MAX);

    assert_eq!(before.series.len(), after.series.len());
    assert_eq!(
        before.series[0].alignment_bounds(),
        after.series[0].alignment_bounds()
    );
}

#[test]
fn arbitrary_overlapping_write_order_yields_consistent_state() {
    // Deterministic pseudo-random spans written in a scrambled order; the
    // store must end sorted, non-overlapping, and fully covering the union.
    let mut spans = Vec::new();
    let mut x: u64 = 0xdead_beef;
    for _ in 0..50 {
        // xorshift
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        let lo = x % 400;
        let hi = lo + 1 + (x >> 32) % 40;
        spans.push((lo, hi));
    }

    let cache = StaticCache::new();
    for &(lo, hi) in &spans {
        cache.write(&[spanned(lo, hi)]).unwrap();
    }

    let res = cache.dirty_read(TimeRange::MAX);
    // Sorted, non-overlapping.
    for pair in res.series.windows(2) {
        let a = pair[0].alignment_bounds();
        let b = pair[1].alignment_bounds();
        assert!(a.upper <= b.lower, "overlap between {a} and {b}");
    }
    // Every written span is covered: a query over it reports no gaps.
    for &(lo, hi) in &spans {
        let covered = cache.dirty_read(TimeRange::new(lo, hi));
        assert!(covered.gaps.is_empty(), "uncovered span [{lo}, {hi})");
    }
    // Sample values survive trimming and splicing intact.
    for s in &res.series {
        let bounds = s.alignment_bounds();
        let values = s.raw_values();
        for (i, v) in values.iter().enumerate() {
            assert!((v - (bounds.lower + i as u64) as f64).abs() < f64::EPSILON);
        }
    }
}

#[tokio::test]
async fn fill_sequence_closes_the_gap() {
    let cache = StaticCache::new();
    cache.write(&[spanned(0, 10)]).unwrap();

    let query = TimeRange::new(0u64, 30u64);
    let (read, permit) = cache.dirty_read_for_write(query).await;
    assert_eq!(read.gaps, vec![TimeRange::new(10u64, 30u64)]);

    // Fetch the gap and write it back while holding the permit.
    cache.write(&[spanned(10, 30)]).unwrap();
    drop(permit);

    let read = cache.dirty_read(query);
    assert!(read.gaps.is_empty());
    assert_eq!(read.series.len(), 2);
}
