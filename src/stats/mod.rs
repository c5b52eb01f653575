//! In-process Stats Aggregation
//!
//! Turns application measurements, grouped by tag combinations, into
//! statistical summaries:
//!
//! - **Accumulators** for sum, count, mean, distribution and last value
//! - **Cumulative windows** growing since the view data was created
//! - **Interval windows** approximated by a ring of time-sliced buckets
//! - **View manager** fanning each recorded batch out atomically to every
//!   interested view

mod accumulator;
mod component;
mod error;
mod interval;
mod manager;
mod recorder;
mod types;
mod view;
mod view_data;

pub use accumulator::{
    AggregationData, Attachments, DistributionData, Exemplar, MutableAggregation,
    MutableDistribution,
};
pub use component::StatsComponent;
pub use error::{Result, StatsError};
pub use interval::{IntervalBucket, IntervalBucketRing};
pub use manager::{CollectionState, ViewManager};
pub use recorder::{MeasureMap, NoTags, SharedTagContext, StatsRecorder, TagContextSource};
pub use types::{
    Measure, MeasureKind, MeasureValue, Measurement, TagContext, TagKey, TagTuple, TagValue,
    MAX_NAME_LENGTH, UNKNOWN_TAG_VALUE,
};
pub use view::{Aggregation, AggregationWindow, BucketBoundaries, View, ViewName};
pub use view_data::{CumulativeViewData, IntervalViewData, MutableViewData, ViewData, WindowData};
