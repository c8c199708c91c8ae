//! QoS Statistics
//!
//! Pure functions over a bounded sample list (latencies in ms).
//! Empty input is a documented edge case that yields 0, never an error.

use serde::{Deserialize, Serialize};

/// A sample counts as a loss gap when it exceeds the median by this factor
pub const LOSS_GAP_FACTOR: f64 = 3.0;

/// Arithmetic mean, 0 for an empty list
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Largest value, 0 for an empty list
pub fn max(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::max).unwrap_or(0.0)
}

/// Smallest value, 0 for an empty list
pub fn min(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::min).unwrap_or(0.0)
}

/// Jitter as the population standard deviation, 0 for fewer than 2 samples
pub fn jitter(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Value at index `floor(p * (n - 1))` of a sorted copy, 0 for an empty list
///
/// `p` is clamped to [0, 1]. The copy is sorted with the stable std sort and
/// `total_cmp`, so NaN samples order deterministically instead of panicking.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) };
    let index = (p * (sorted.len() - 1) as f64).floor() as usize;
    sorted[index.min(sorted.len() - 1)]
}

/// Median via `percentile(values, 0.5)`
pub fn median(values: &[f64]) -> f64 {
    percentile(values, 0.5)
}

/// Fraction of samples that look like loss gaps (> LOSS_GAP_FACTOR x median)
pub fn loss_rate(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let limit = median(values) * LOSS_GAP_FACTOR;
    if limit <= 0.0 {
        return 0.0;
    }
    values.iter().filter(|&&v| v > limit).count() as f64 / values.len() as f64
}

// ============================================================================
// SUMMARY
// ============================================================================

/// All QoS derivatives of one window's latency samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QosSummary {
    pub avg_latency_ms: f64,
    pub max_latency_ms: f64,
    pub min_latency_ms: f64,
    pub jitter_ms: f64,
    pub p95_latency_ms: f64,
    pub packet_loss_rate: f64,
}

impl QosSummary {
    pub fn from_samples(samples: &[f64]) -> Self {
        Self {
            avg_latency_ms: mean(samples),
            max_latency_ms: max(samples),
            min_latency_ms: min(samples),
            jitter_ms: jitter(samples),
            p95_latency_ms: percentile(samples, 0.95),
            packet_loss_rate: loss_rate(samples),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_inputs_are_zero() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(max(&[]), 0.0);
        assert_eq!(min(&[]), 0.0);
        assert_eq!(jitter(&[]), 0.0);
        for p in [0.0, 0.25, 0.5, 0.99, 1.0] {
            assert_eq!(percentile(&[], p), 0.0);
        }
    }

    #[test]
    fn test_jitter_edge_cases() {
        assert_eq!(jitter(&[42.0]), 0.0);
        assert_eq!(jitter(&[7.5; 20]), 0.0);

        // population std-dev of [2,4,4,4,5,5,7,9] is exactly 2
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((jitter(&v) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_percentile_median_on_odd_length() {
        let v = [9.0, 1.0, 5.0, 3.0, 7.0];
        assert_eq!(percentile(&v, 0.5), 5.0);
        assert_eq!(median(&v), 5.0);
        assert_eq!(percentile(&v, 0.0), 1.0);
        assert_eq!(percentile(&v, 1.0), 9.0);
    }

    #[test]
    fn test_percentile_uses_floor_index() {
        // n = 4, p = 0.5 -> floor(1.5) = 1
        let v = [40.0, 10.0, 30.0, 20.0];
        assert_eq!(percentile(&v, 0.5), 20.0);
        // out-of-range p is clamped
        assert_eq!(percentile(&v, 3.0), 40.0);
        assert_eq!(percentile(&v, -1.0), 10.0);
    }

    #[test]
    fn test_percentile_does_not_mutate_input() {
        let v = vec![3.0, 1.0, 2.0];
        let _ = percentile(&v, 0.5);
        assert_eq!(v, vec![3.0, 1.0, 2.0]);
    }

    #[test]
    fn test_min_max_mean() {
        let v = [3.0, -1.0, 10.0];
        assert_eq!(max(&v), 10.0);
        assert_eq!(min(&v), -1.0);
        assert_eq!(mean(&v), 4.0);
    }

    #[test]
    fn test_loss_rate_counts_large_gaps() {
        let mut v = vec![1.0; 9];
        v.push(10.0);
        assert!((loss_rate(&v) - 0.1).abs() < 1e-12);
        assert_eq!(loss_rate(&[5.0]), 0.0);
    }

    #[test]
    fn test_summary() {
        let s = QosSummary::from_samples(&[10.0, 20.0, 30.0]);
        assert_eq!(s.avg_latency_ms, 20.0);
        assert_eq!(s.max_latency_ms, 30.0);
        assert_eq!(s.min_latency_ms, 10.0);
        assert_eq!(s.packet_loss_rate, 0.0);
    }
}
