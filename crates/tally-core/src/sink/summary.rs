//! Distribution summary over retained series samples.

use serde::Serialize;

/// Summary of a series.
///
/// `count` is the number of samples ever recorded; the other figures cover
/// the retained window only. Percentiles use the nearest-rank method.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeriesSummary {
    pub count: u64,
    pub retained: usize,
    pub min: i64,
    pub max: i64,
    pub mean: f64,
    pub p50: i64,
    pub p90: i64,
    pub p99: i64,
}

impl SeriesSummary {
    pub fn from_samples<'a>(count: u64, samples: impl IntoIterator<Item = &'a i64>) -> Self {
        let mut sorted: Vec<i64> = samples.into_iter().copied().collect();
        if sorted.is_empty() {
            return Self {
                count,
                ..Self::default()
            };
        }
        sorted.sort_unstable();

        let sum: i128 = sorted.iter().map(|&v| i128::from(v)).sum();

        Self {
            count,
            retained: sorted.len(),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            mean: sum as f64 / sorted.len() as f64,
            p50: nearest_rank(&sorted, 50),
            p90: nearest_rank(&sorted, 90),
            p99: nearest_rank(&sorted, 99),
        }
    }
}

/// Nearest-rank percentile of a non-empty sorted slice.
fn nearest_rank(sorted: &[i64], percentile: usize) -> i64 {
    let rank = (percentile * sorted.len()).div_ceil(100);
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_of_range() {
        let samples: Vec<i64> = (1..=100).collect();
        let summary = SeriesSummary::from_samples(100, &samples);

        assert_eq!(summary.retained, 100);
        assert_eq!(summary.min, 1);
        assert_eq!(summary.max, 100);
        assert_eq!(summary.p50, 50);
        assert_eq!(summary.p90, 90);
        assert_eq!(summary.p99, 99);
        assert!((summary.mean - 50.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_summary_single_sample() {
        let summary = SeriesSummary::from_samples(1, &[-4]);
        assert_eq!(summary.min, -4);
        assert_eq!(summary.p50, -4);
        assert_eq!(summary.p99, -4);
    }

    #[test]
    fn test_summary_empty_window_keeps_count() {
        let summary = SeriesSummary::from_samples(12, &[]);
        assert_eq!(summary.count, 12);
        assert_eq!(summary.retained, 0);
    }
}
