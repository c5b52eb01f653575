//! Per-view mutable state and its read-time snapshot

use super::accumulator::{AggregationData, Attachments, MutableAggregation};
use super::interval::IntervalBucketRing;
use super::types::{MeasureValue, TagTuple};
use super::view::{AggregationWindow, View};
use crate::clock::Timestamp;
use ahash::AHashMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// Time range a snapshot covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WindowData {
    Cumulative { start: Timestamp, end: Timestamp },
    Interval { end: Timestamp },
}

/// Immutable snapshot of one view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewData {
    pub view: View,
    #[serde(serialize_with = "serialize_entries")]
    pub aggregation_map: BTreeMap<TagTuple, AggregationData>,
    pub window_data: WindowData,
}

impl ViewData {
    /// Pretty JSON rendering for debug consumers
    pub fn to_json(&self) -> super::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Tag tuples are sequences, so the map goes out as a list of entries
fn serialize_entries<S: Serializer>(
    map: &BTreeMap<TagTuple, AggregationData>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    #[derive(Serialize)]
    struct Entry<'a> {
        tags: &'a TagTuple,
        data: &'a AggregationData,
    }
    serializer.collect_seq(map.iter().map(|(tags, data)| Entry { tags, data }))
}

/// Cumulative view state: one accumulator per tag tuple since `start`
#[derive(Debug)]
pub struct CumulativeViewData {
    view: View,
    start: Timestamp,
    accumulators: AHashMap<TagTuple, MutableAggregation>,
}

/// Interval view state: one bucket ring per tag tuple
#[derive(Debug)]
pub struct IntervalViewData {
    view: View,
    start: Timestamp,
    window: Duration,
    sub_buckets: usize,
    rings: AHashMap<TagTuple, IntervalBucketRing>,
}

/// State of one registered view
#[derive(Debug)]
pub enum MutableViewData {
    Cumulative(CumulativeViewData),
    Interval(IntervalViewData),
}

impl MutableViewData {
    /// Fresh, empty state for `view` starting at `start`. Interval windows
    /// are split into `sub_buckets` sub-intervals.
    pub fn new(view: View, start: Timestamp, sub_buckets: usize) -> Self {
        match view.window() {
            AggregationWindow::Cumulative => MutableViewData::Cumulative(CumulativeViewData {
                view,
                start,
                accumulators: AHashMap::new(),
            }),
            AggregationWindow::Interval(window) => MutableViewData::Interval(IntervalViewData {
                view,
                start,
                window,
                sub_buckets,
                rings: AHashMap::new(),
            }),
        }
    }

    pub fn view(&self) -> &View {
        match self {
            MutableViewData::Cumulative(data) => &data.view,
            MutableViewData::Interval(data) => &data.view,
        }
    }

    pub fn start(&self) -> Timestamp {
        match self {
            MutableViewData::Cumulative(data) => data.start,
            MutableViewData::Interval(data) => data.start,
        }
    }

    /// Number of tag tuples currently tracked
    pub fn series_count(&self) -> usize {
        match self {
            MutableViewData::Cumulative(data) => data.accumulators.len(),
            MutableViewData::Interval(data) => data.rings.len(),
        }
    }

    /// Fold one value into the series for `tags`
    pub fn record(
        &mut self,
        tags: TagTuple,
        value: MeasureValue,
        attachments: &Attachments,
        timestamp: Timestamp,
    ) {
        debug_assert_eq!(tags.len(), self.view().columns().len());

        match self {
            MutableViewData::Cumulative(data) => {
                if timestamp < data.start {
                    debug!(
                        view = %data.view.name(),
                        %timestamp,
                        start = %data.start,
                        "Dropping record that predates the view start"
                    );
                    return;
                }
                let view = &data.view;
                data.accumulators
                    .entry(tags)
                    .or_insert_with(|| {
                        MutableAggregation::new(view.aggregation(), view.measure().kind())
                    })
                    .add(value, attachments, timestamp);
            }
            MutableViewData::Interval(data) => {
                let (view, start, window, sub_buckets) =
                    (&data.view, data.start, data.window, data.sub_buckets);
                data.rings
                    .entry(tags)
                    .or_insert_with(|| {
                        let template =
                            MutableAggregation::new(view.aggregation(), view.measure().kind());
                        IntervalBucketRing::new(start, window, sub_buckets, template)
                    })
                    .record(value, attachments, timestamp);
            }
        }
    }

    /// Snapshot every series as of `now`.
    ///
    /// A `now` before the view start yields an empty map. Interval rings with
    /// nothing left in the window are dropped here.
    pub fn to_view_data(&mut self, now: Timestamp) -> ViewData {
        match self {
            MutableViewData::Cumulative(data) => {
                if now < data.start {
                    debug!(view = %data.view.name(), %now, start = %data.start, "Clock before view start");
                    return ViewData {
                        view: data.view.clone(),
                        aggregation_map: BTreeMap::new(),
                        window_data: WindowData::Cumulative {
                            start: data.start,
                            end: data.start,
                        },
                    };
                }
                let aggregation_map = data
                    .accumulators
                    .iter()
                    .map(|(tags, agg)| (tags.clone(), agg.to_aggregation_data()))
                    .collect();
                ViewData {
                    view: data.view.clone(),
                    aggregation_map,
                    window_data: WindowData::Cumulative {
                        start: data.start,
                        end: now,
                    },
                }
            }
            MutableViewData::Interval(data) => {
                let mut aggregation_map = BTreeMap::new();
                if now < data.start {
                    debug!(view = %data.view.name(), %now, start = %data.start, "Clock before view start");
                } else {
                    data.rings.retain(|tags, ring| {
                        let combined = ring.collect(now);
                        if ring.observations() == 0 {
                            return false;
                        }
                        aggregation_map.insert(tags.clone(), combined.to_aggregation_data());
                        true
                    });
                }
                ViewData {
                    view: data.view.clone(),
                    aggregation_map,
                    window_data: WindowData::Interval { end: now },
                }
            }
        }
    }
}
