//! View descriptors: what to aggregate, how, over which window

use super::error::{Result, StatsError};
use super::types::{validate_name, Measure, TagKey};
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;

/// Histogram bucket boundaries, strictly increasing and finite
///
/// For boundaries `[b0, b1, ..., bn]` there are n+2 buckets:
/// `(-inf, b0), [b0, b1), ..., [bn, +inf)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct BucketBoundaries(Vec<f64>);

impl BucketBoundaries {
    pub fn new(boundaries: Vec<f64>) -> Result<Self> {
        if let Some(bad) = boundaries.iter().find(|b| !b.is_finite()) {
            return Err(StatsError::InvalidBucketBoundaries {
                reason: format!("boundary {} is not finite", bad),
            });
        }
        if let Some(pair) = boundaries.windows(2).find(|w| w[0] >= w[1]) {
            return Err(StatsError::InvalidBucketBoundaries {
                reason: format!(
                    "boundaries must be strictly increasing, got {} then {}",
                    pair[0], pair[1]
                ),
            });
        }
        Ok(BucketBoundaries(boundaries))
    }

    pub fn boundaries(&self) -> &[f64] {
        &self.0
    }

    /// Number of buckets including underflow and overflow
    pub fn bucket_count(&self) -> usize {
        self.0.len() + 1
    }

    /// Index of the bucket holding `value`: the number of boundaries <= value
    pub fn bucket_index(&self, value: f64) -> usize {
        self.0.partition_point(|b| *b <= value)
    }
}

/// Statistical summary kind, fixed at view registration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Aggregation {
    Sum,
    Count,
    Mean,
    Distribution(BucketBoundaries),
    LastValue,
}

impl Aggregation {
    /// Distribution aggregation, rejecting malformed boundaries
    pub fn distribution(boundaries: Vec<f64>) -> Result<Self> {
        Ok(Aggregation::Distribution(BucketBoundaries::new(boundaries)?))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Aggregation::Sum => "sum",
            Aggregation::Count => "count",
            Aggregation::Mean => "mean",
            Aggregation::Distribution(_) => "distribution",
            Aggregation::LastValue => "last_value",
        }
    }
}

/// Time window a view aggregates over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AggregationWindow {
    /// Everything since the view data was created
    Cumulative,
    /// Sliding window of the given duration
    Interval(Duration),
}

impl AggregationWindow {
    pub fn interval(duration: Duration) -> Result<Self> {
        if duration.as_millis() == 0 {
            return Err(StatsError::InvalidWindow {
                reason: format!("interval must be at least 1ms, got {:?}", duration),
            });
        }
        Ok(AggregationWindow::Interval(duration))
    }
}

/// Validated view name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ViewName(String);

impl ViewName {
    pub fn new(name: &str) -> Result<Self> {
        validate_name("view", name, false)?;
        Ok(ViewName(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for ViewName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ViewName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registered (measure, aggregation, tag columns, window) combination
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct View {
    name: ViewName,
    description: String,
    measure: Measure,
    aggregation: Aggregation,
    columns: Vec<TagKey>,
    window: AggregationWindow,
}

impl View {
    pub fn new(
        name: &str,
        description: &str,
        measure: Measure,
        aggregation: Aggregation,
        columns: Vec<TagKey>,
        window: AggregationWindow,
    ) -> Result<Self> {
        let name = ViewName::new(name)?;

        let mut seen = HashSet::with_capacity(columns.len());
        for key in &columns {
            if !seen.insert(key) {
                return Err(StatsError::DuplicateColumns {
                    view: name.to_string(),
                    key: key.to_string(),
                });
            }
        }

        if let AggregationWindow::Interval(duration) = window {
            // Re-check windows built without `AggregationWindow::interval`.
            AggregationWindow::interval(duration)?;
        }

        Ok(View {
            name,
            description: description.to_string(),
            measure,
            aggregation,
            columns,
            window,
        })
    }

    pub fn name(&self) -> &ViewName {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn measure(&self) -> &Measure {
        &self.measure
    }

    pub fn aggregation(&self) -> &Aggregation {
        &self.aggregation
    }

    pub fn columns(&self) -> &[TagKey] {
        &self.columns
    }

    pub fn window(&self) -> AggregationWindow {
        self.window
    }
}
