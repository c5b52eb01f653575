//! Accumulators: per-(view, tag tuple) running statistics
//!
//! One `MutableAggregation` variant per aggregation kind. Accumulators never
//! reject input; `combine` merges another accumulator scaled by a fraction,
//! which is how the interval ring decays its oldest bucket.
//!
//! Distribution and last-value accumulators ignore the fraction and merge the
//! other side whole, so those views step at the decay edge instead of fading.

use super::types::{MeasureKind, MeasureValue};
use super::view::{Aggregation, BucketBoundaries};
use crate::clock::Timestamp;
use serde::Serialize;
use std::collections::BTreeMap;

/// String attachments carried by a recorded batch
pub type Attachments = BTreeMap<String, String>;

/// A representative raw observation retained for a histogram bucket
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exemplar {
    pub value: f64,
    pub timestamp: Timestamp,
    pub attachments: Attachments,
}

/// Running state of a distribution aggregation
#[derive(Debug, Clone, PartialEq)]
pub struct MutableDistribution {
    boundaries: BucketBoundaries,
    count: i64,
    mean: f64,
    sum_of_squared_deviations: f64,
    min: f64,
    max: f64,
    bucket_counts: Vec<i64>,
    exemplars: Vec<Option<Exemplar>>,
}

impl MutableDistribution {
    pub fn new(boundaries: BucketBoundaries) -> Self {
        let buckets = boundaries.bucket_count();
        MutableDistribution {
            boundaries,
            count: 0,
            mean: 0.0,
            sum_of_squared_deviations: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            bucket_counts: vec![0; buckets],
            exemplars: vec![None; buckets],
        }
    }

    /// Verify all invariants hold for this distribution
    #[cfg(debug_assertions)]
    pub fn verify_invariants(&self) {
        debug_assert_eq!(
            self.bucket_counts.len(),
            self.boundaries.bucket_count(),
            "Invariant violated: bucket count length must be boundaries + 1"
        );
        debug_assert_eq!(self.exemplars.len(), self.bucket_counts.len());
        debug_assert!(
            self.bucket_counts.iter().all(|c| *c >= 0),
            "Invariant violated: negative bucket count"
        );
        debug_assert_eq!(
            self.bucket_counts.iter().sum::<i64>(),
            self.count,
            "Invariant violated: bucket counts must sum to count"
        );
        if self.count > 0 {
            debug_assert!(self.min <= self.max, "Invariant violated: min > max");
        }
    }

    #[cfg(not(debug_assertions))]
    #[inline(always)]
    pub fn verify_invariants(&self) {}

    fn add(&mut self, value: f64, attachments: &Attachments, timestamp: Timestamp) {
        // Welford's online update
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.sum_of_squared_deviations += delta * (value - self.mean);
        self.min = self.min.min(value);
        self.max = self.max.max(value);

        let index = self.boundaries.bucket_index(value);
        self.bucket_counts[index] += 1;
        if !attachments.is_empty() {
            self.exemplars[index] = Some(Exemplar {
                value,
                timestamp,
                attachments: attachments.clone(),
            });
        }

        self.verify_invariants();
    }

    fn combine(&mut self, other: &MutableDistribution) {
        debug_assert_eq!(
            self.boundaries, other.boundaries,
            "combined distributions must share boundaries"
        );
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = other.clone();
            return;
        }

        // Chan et al. pairwise merge of mean and squared deviations
        let n1 = self.count as f64;
        let n2 = other.count as f64;
        let total = n1 + n2;
        let delta = other.mean - self.mean;
        self.mean += delta * n2 / total;
        self.sum_of_squared_deviations +=
            other.sum_of_squared_deviations + delta * delta * n1 * n2 / total;
        self.count += other.count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);

        for (mine, theirs) in self.bucket_counts.iter_mut().zip(&other.bucket_counts) {
            *mine += *theirs;
        }
        for (mine, theirs) in self.exemplars.iter_mut().zip(&other.exemplars) {
            if theirs.is_some() {
                mine.clone_from(theirs);
            }
        }

        self.verify_invariants();
    }

    fn snapshot(&self) -> DistributionData {
        let (mean, min, max) = if self.count == 0 {
            (0.0, 0.0, 0.0)
        } else {
            (self.mean, self.min, self.max)
        };
        DistributionData {
            count: self.count,
            mean,
            min,
            max,
            sum_of_squared_deviations: self.sum_of_squared_deviations,
            bucket_boundaries: self.boundaries.boundaries().to_vec(),
            bucket_counts: self.bucket_counts.clone(),
            exemplars: self.exemplars.clone(),
        }
    }
}

/// Mutable accumulator, one variant per aggregation kind
#[derive(Debug, Clone, PartialEq)]
pub enum MutableAggregation {
    SumDouble(f64),
    SumLong(i64),
    Count(i64),
    /// Weighted sum and count; the count is fractional after decay
    Mean { sum: f64, count: f64 },
    Distribution(MutableDistribution),
    /// Most recently added value, `None` until the first add
    LastValueDouble(Option<f64>),
    LastValueLong(Option<i64>),
}

impl MutableAggregation {
    /// Create an empty accumulator for `aggregation` over a measure of `kind`
    pub fn new(aggregation: &Aggregation, kind: MeasureKind) -> Self {
        match (aggregation, kind) {
            (Aggregation::Sum, MeasureKind::Double) => MutableAggregation::SumDouble(0.0),
            (Aggregation::Sum, MeasureKind::Long) => MutableAggregation::SumLong(0),
            (Aggregation::Count, _) => MutableAggregation::Count(0),
            (Aggregation::Mean, _) => MutableAggregation::Mean {
                sum: 0.0,
                count: 0.0,
            },
            (Aggregation::Distribution(boundaries), _) => {
                MutableAggregation::Distribution(MutableDistribution::new(boundaries.clone()))
            }
            (Aggregation::LastValue, MeasureKind::Double) => {
                MutableAggregation::LastValueDouble(None)
            }
            (Aggregation::LastValue, MeasureKind::Long) => MutableAggregation::LastValueLong(None),
        }
    }

    /// Fold one observation into the accumulator
    pub fn add(&mut self, value: MeasureValue, attachments: &Attachments, timestamp: Timestamp) {
        match self {
            MutableAggregation::SumDouble(sum) => *sum += value.as_f64(),
            MutableAggregation::SumLong(sum) => *sum = sum.wrapping_add(value.as_i64()),
            MutableAggregation::Count(count) => *count += 1,
            MutableAggregation::Mean { sum, count } => {
                *sum += value.as_f64();
                *count += 1.0;
            }
            MutableAggregation::Distribution(dist) => {
                dist.add(value.as_f64(), attachments, timestamp)
            }
            MutableAggregation::LastValueDouble(last) => *last = Some(value.as_f64()),
            MutableAggregation::LastValueLong(last) => *last = Some(value.as_i64()),
        }
    }

    /// Merge `other` into `self`, scaling Sum/Count/Mean by `fraction`.
    ///
    /// `fraction` must lie in `[0, 1]`. Mismatched kinds are ignored; the
    /// ring only ever combines accumulators built from the same view.
    pub fn combine(&mut self, other: &MutableAggregation, fraction: f64) {
        debug_assert!(
            (0.0..=1.0).contains(&fraction),
            "fraction {} out of range",
            fraction
        );

        match (self, other) {
            (MutableAggregation::SumDouble(sum), MutableAggregation::SumDouble(o)) => {
                *sum += o * fraction
            }
            (MutableAggregation::SumLong(sum), MutableAggregation::SumLong(o)) => {
                *sum = sum.wrapping_add((*o as f64 * fraction).round() as i64)
            }
            (MutableAggregation::Count(count), MutableAggregation::Count(o)) => {
                *count += (*o as f64 * fraction).round() as i64
            }
            (
                MutableAggregation::Mean { sum, count },
                MutableAggregation::Mean {
                    sum: o_sum,
                    count: o_count,
                },
            ) => {
                *sum += o_sum * fraction;
                *count += o_count * fraction;
            }
            (MutableAggregation::Distribution(dist), MutableAggregation::Distribution(o)) => {
                dist.combine(o)
            }
            (MutableAggregation::LastValueDouble(last), MutableAggregation::LastValueDouble(o)) => {
                if o.is_some() {
                    *last = *o;
                }
            }
            (MutableAggregation::LastValueLong(last), MutableAggregation::LastValueLong(o)) => {
                if o.is_some() {
                    *last = *o;
                }
            }
            (mine, theirs) => {
                debug_assert!(false, "cannot combine {:?} with {:?}", mine, theirs);
            }
        }
    }

    /// Immutable snapshot of the current state
    pub fn to_aggregation_data(&self) -> AggregationData {
        match self {
            MutableAggregation::SumDouble(sum) => AggregationData::SumDouble(*sum),
            MutableAggregation::SumLong(sum) => AggregationData::SumLong(*sum),
            MutableAggregation::Count(count) => AggregationData::Count(*count),
            MutableAggregation::Mean { sum, count } => AggregationData::Mean {
                mean: if *count == 0.0 { 0.0 } else { sum / count },
                count: count.round() as i64,
            },
            MutableAggregation::Distribution(dist) => {
                AggregationData::Distribution(dist.snapshot())
            }
            MutableAggregation::LastValueDouble(last) => {
                AggregationData::LastValueDouble(last.unwrap_or(f64::NAN))
            }
            MutableAggregation::LastValueLong(last) => {
                AggregationData::LastValueLong(last.unwrap_or(0))
            }
        }
    }
}

/// Snapshot of a distribution accumulator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionData {
    pub count: i64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub sum_of_squared_deviations: f64,
    pub bucket_boundaries: Vec<f64>,
    pub bucket_counts: Vec<i64>,
    /// One slot per bucket
    pub exemplars: Vec<Option<Exemplar>>,
}

/// Immutable read-time snapshot of an accumulator
///
/// A last-value accumulator that never saw a value reports NaN (double)
/// or 0 (long).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AggregationData {
    SumDouble(f64),
    SumLong(i64),
    Count(i64),
    Mean { mean: f64, count: i64 },
    Distribution(DistributionData),
    LastValueDouble(f64),
    LastValueLong(i64),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_all(agg: &mut MutableAggregation, values: &[f64]) {
        let none = Attachments::new();
        for (i, v) in values.iter().enumerate() {
            agg.add(MeasureValue::Double(*v), &none, Timestamp(i as u64));
        }
    }

    fn distribution(boundaries: Vec<f64>) -> MutableAggregation {
        let agg = Aggregation::distribution(boundaries).unwrap();
        MutableAggregation::new(&agg, MeasureKind::Double)
    }

    #[test]
    fn test_zero_values() {
        let sum = MutableAggregation::new(&Aggregation::Sum, MeasureKind::Double);
        assert_eq!(sum.to_aggregation_data(), AggregationData::SumDouble(0.0));

        let count = MutableAggregation::new(&Aggregation::Count, MeasureKind::Long);
        assert_eq!(count.to_aggregation_data(), AggregationData::Count(0));

        let mean = MutableAggregation::new(&Aggregation::Mean, MeasureKind::Double);
        assert_eq!(
            mean.to_aggregation_data(),
            AggregationData::Mean {
                mean: 0.0,
                count: 0
            }
        );

        match distribution(vec![1.0, 2.0]).to_aggregation_data() {
            AggregationData::Distribution(d) => {
                assert_eq!(d.count, 0);
                assert_eq!(d.bucket_counts, vec![0, 0, 0]);
                assert_eq!((d.mean, d.min, d.max), (0.0, 0.0, 0.0));
                assert!(d.exemplars.iter().all(Option::is_none));
            }
            other => panic!("Expected Distribution, got {:?}", other),
        }

        let last = MutableAggregation::new(&Aggregation::LastValue, MeasureKind::Double);
        match last.to_aggregation_data() {
            AggregationData::LastValueDouble(v) => assert!(v.is_nan()),
            other => panic!("Expected LastValueDouble, got {:?}", other),
        }
        let last = MutableAggregation::new(&Aggregation::LastValue, MeasureKind::Long);
        assert_eq!(last.to_aggregation_data(), AggregationData::LastValueLong(0));
    }

    #[test]
    fn test_sum_count_mean() {
        let values = [10.0, 20.0, 30.0, 40.0];

        let mut sum = MutableAggregation::new(&Aggregation::Sum, MeasureKind::Double);
        add_all(&mut sum, &values);
        assert_eq!(sum.to_aggregation_data(), AggregationData::SumDouble(100.0));

        let mut count = MutableAggregation::new(&Aggregation::Count, MeasureKind::Double);
        add_all(&mut count, &values);
        assert_eq!(count.to_aggregation_data(), AggregationData::Count(4));

        let mut mean = MutableAggregation::new(&Aggregation::Mean, MeasureKind::Double);
        add_all(&mut mean, &values);
        assert_eq!(
            mean.to_aggregation_data(),
            AggregationData::Mean {
                mean: 25.0,
                count: 4
            }
        );
    }

    #[test]
    fn test_sum_long_keeps_integers() {
        let mut sum = MutableAggregation::new(&Aggregation::Sum, MeasureKind::Long);
        let none = Attachments::new();
        sum.add(MeasureValue::Long(i64::MAX / 2), &none, Timestamp::ZERO);
        sum.add(MeasureValue::Long(3), &none, Timestamp::ZERO);
        assert_eq!(
            sum.to_aggregation_data(),
            AggregationData::SumLong(i64::MAX / 2 + 3)
        );
    }

    #[test]
    fn test_distribution_stats() {
        let mut dist = distribution(vec![-10.0, 0.0, 10.0]);
        add_all(&mut dist, &[-1.0, 1.0, -5.0, 20.0, 5.0]);

        match dist.to_aggregation_data() {
            AggregationData::Distribution(d) => {
                assert_eq!(d.count, 5);
                assert!((d.mean - 4.0).abs() < 1e-9);
                assert_eq!(d.min, -5.0);
                assert_eq!(d.max, 20.0);
                assert_eq!(d.bucket_counts, vec![0, 2, 2, 1]);
                // sum of (x - 4)^2 over the five values
                assert!((d.sum_of_squared_deviations - 372.0).abs() < 1e-9);
            }
            other => panic!("Expected Distribution, got {:?}", other),
        }
    }

    #[test]
    fn test_distribution_without_boundaries() {
        let mut dist = distribution(vec![]);
        add_all(&mut dist, &[2.0, 4.0, 9.0]);
        match dist.to_aggregation_data() {
            AggregationData::Distribution(d) => {
                assert_eq!(d.bucket_counts, vec![3]);
                assert_eq!(d.count, 3);
                assert!((d.mean - 5.0).abs() < 1e-9);
                assert_eq!((d.min, d.max), (2.0, 9.0));
            }
            other => panic!("Expected Distribution, got {:?}", other),
        }
    }

    #[test]
    fn test_exemplar_retention() {
        let mut dist = distribution(vec![10.0]);
        let mut trace = Attachments::new();
        trace.insert("trace_id".to_string(), "abc".to_string());
        let none = Attachments::new();

        dist.add(MeasureValue::Double(1.0), &trace, Timestamp(1));
        dist.add(MeasureValue::Double(2.0), &none, Timestamp(2));
        dist.add(MeasureValue::Double(20.0), &none, Timestamp(3));

        let data = match dist.to_aggregation_data() {
            AggregationData::Distribution(d) => d,
            other => panic!("Expected Distribution, got {:?}", other),
        };
        let kept = data.exemplars[0].as_ref().unwrap();
        assert_eq!(kept.value, 1.0, "attachment-less adds keep the exemplar");
        assert_eq!(kept.attachments.get("trace_id").map(String::as_str), Some("abc"));
        assert!(data.exemplars[1].is_none());

        trace.insert("trace_id".to_string(), "def".to_string());
        dist.add(MeasureValue::Double(3.0), &trace, Timestamp(4));
        if let AggregationData::Distribution(d) = dist.to_aggregation_data() {
            let replaced = d.exemplars[0].as_ref().unwrap();
            assert_eq!(replaced.value, 3.0);
            assert_eq!(replaced.timestamp, Timestamp(4));
        }
    }

    #[test]
    fn test_last_value_most_recent_call_wins() {
        let mut last = MutableAggregation::new(&Aggregation::LastValue, MeasureKind::Double);
        let none = Attachments::new();
        last.add(MeasureValue::Double(5.0), &none, Timestamp(100));
        last.add(MeasureValue::Double(7.0), &none, Timestamp(50));
        assert_eq!(last.to_aggregation_data(), AggregationData::LastValueDouble(7.0));
    }

    #[test]
    fn test_fractional_combine() {
        let mut sum = MutableAggregation::new(&Aggregation::Sum, MeasureKind::Double);
        add_all(&mut sum, &[4.0]);
        let mut other = MutableAggregation::new(&Aggregation::Sum, MeasureKind::Double);
        add_all(&mut other, &[10.0]);
        sum.combine(&other, 0.5);
        assert_eq!(sum.to_aggregation_data(), AggregationData::SumDouble(9.0));

        let mut count = MutableAggregation::new(&Aggregation::Count, MeasureKind::Double);
        let mut other = MutableAggregation::new(&Aggregation::Count, MeasureKind::Double);
        add_all(&mut other, &[1.0, 1.0, 1.0, 1.0]);
        count.combine(&other, 0.25);
        assert_eq!(count.to_aggregation_data(), AggregationData::Count(1));

        let mut mean = MutableAggregation::new(&Aggregation::Mean, MeasureKind::Double);
        add_all(&mut mean, &[3.0]);
        let mut other = MutableAggregation::new(&Aggregation::Mean, MeasureKind::Double);
        add_all(&mut other, &[1.0, 1.0]);
        mean.combine(&other, 0.5);
        // (3 + 2 * 0.5) / (1 + 2 * 0.5)
        assert_eq!(
            mean.to_aggregation_data(),
            AggregationData::Mean {
                mean: 2.0,
                count: 2
            }
        );
    }

    #[test]
    fn test_distribution_and_last_value_ignore_fraction() {
        let mut dist = distribution(vec![0.0]);
        add_all(&mut dist, &[1.0, 3.0]);
        let mut other = distribution(vec![0.0]);
        add_all(&mut other, &[-2.0, 8.0]);
        dist.combine(&other, 0.1);
        match dist.to_aggregation_data() {
            AggregationData::Distribution(d) => {
                assert_eq!(d.count, 4);
                assert_eq!(d.bucket_counts, vec![1, 3]);
                assert!((d.mean - 2.5).abs() < 1e-9);
                // deviations from 2.5: 1.5, 0.5, 4.5, 5.5
                assert!((d.sum_of_squared_deviations - 53.0).abs() < 1e-9);
                assert_eq!((d.min, d.max), (-2.0, 8.0));
            }
            other => panic!("Expected Distribution, got {:?}", other),
        }

        let mut last = MutableAggregation::new(&Aggregation::LastValue, MeasureKind::Long);
        let mut other = MutableAggregation::new(&Aggregation::LastValue, MeasureKind::Long);
        other.add(MeasureValue::Long(9), &Attachments::new(), Timestamp::ZERO);
        last.combine(&other, 0.0);
        assert_eq!(last.to_aggregation_data(), AggregationData::LastValueLong(9));

        // An empty other side leaves the value alone
        last.combine(
            &MutableAggregation::new(&Aggregation::LastValue, MeasureKind::Long),
            1.0,
        );
        assert_eq!(last.to_aggregation_data(), AggregationData::LastValueLong(9));
    }
}
