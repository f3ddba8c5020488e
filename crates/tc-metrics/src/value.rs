use serde::{Deserialize, Serialize};

/// Default number of equal-width buckets in a [`HistogramSummary`].
pub const DEFAULT_BUCKETS: usize = 30;

/// Concrete value recorded for a metric.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricValue {
    /// Scalar quantity.
    Scalar(f64),
    /// Summary of a batch of scalars.
    Distribution(HistogramSummary),
}

/// Moments and equal-width bucket counts of a batch of values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistogramSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
    /// `(left_edge, right_edge, count)` per bucket.
    pub buckets: Vec<(f64, f64, usize)>,
}

impl HistogramSummary {
    pub fn from_values(values: &[f32]) -> Self {
        Self::with_buckets(values, DEFAULT_BUCKETS)
    }

    /// Summarises `values` into `buckets` equal-width buckets spanning
    /// `[min, max]`. A constant batch collapses into a single bucket and an
    /// empty batch has none.
    pub fn with_buckets(values: &[f32], buckets: usize) -> Self {
        if values.is_empty() {
            return Self {
                count: 0,
                min: 0.0,
                max: 0.0,
                mean: 0.0,
                std: 0.0,
                buckets: Vec::new(),
            };
        }
        let count = values.len();
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0f64;
        for &v in values {
            let v = v as f64;
            min = min.min(v);
            max = max.max(v);
            sum += v;
        }
        let mean = sum / count as f64;
        let var = values
            .iter()
            .map(|&v| {
                let d = v as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / count as f64;

        let span = max - min;
        let bucket_list = if span == 0.0 || buckets <= 1 {
            vec![(min, max, count)]
        } else {
            let width = span / buckets as f64;
            let mut counts = vec![0usize; buckets];
            for &v in values {
                let idx = (((v as f64 - min) / width) as usize).min(buckets - 1);
                counts[idx] += 1;
            }
            counts
                .into_iter()
                .enumerate()
                .map(|(i, c)| (min + width * i as f64, min + width * (i + 1) as f64, c))
                .collect()
        };

        Self {
            count,
            min,
            max,
            mean,
            std: var.sqrt(),
            buckets: bucket_list,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn summary_moments_and_bucket_totals() {
        let values = [1.0f32, 2.0, 3.0, 4.0];
        let summary = HistogramSummary::with_buckets(&values, 3);
        assert_eq!(summary.count, 4);
        assert_relative_eq!(summary.mean, 2.5);
        assert_relative_eq!(summary.std, 1.25f64.sqrt());
        assert_eq!(summary.buckets.len(), 3);
        let total: usize = summary.buckets.iter().map(|b| b.2).sum();
        assert_eq!(total, 4);
        assert_eq!(summary.buckets[2].2, 2, "max lands in the last bucket");
    }

    #[test]
    fn constant_and_empty_batches() {
        let constant = HistogramSummary::from_values(&[0.0; 5]);
        assert_eq!(constant.buckets, vec![(0.0, 0.0, 5)]);
        let empty = HistogramSummary::from_values(&[]);
        assert_eq!(empty.count, 0);
        assert!(empty.buckets.is_empty());
    }
}
