//! Interval bucket ring: approximate sliding-window aggregation
//!
//! A window of duration D is split into N sub-intervals of width D/N. The
//! ring holds N+1 buckets so that, whatever `now` is, the N newest buckets
//! plus part of the oldest one cover exactly `[now - D, now]`.
//!
//! Buckets are addressed by their absolute index since the epoch,
//! `floor((ts - epoch) / width)`, and live in slot `index mod (N+1)`.
//! Rolling forward resets the slots of the indices being skipped; nothing is
//! allocated after construction.
//!
//! Reading weights the oldest bucket by the share of its span still inside
//! the window, decaying linearly from 1.0 to 0.0 until it is evicted.

use super::accumulator::{Attachments, MutableAggregation};
use super::types::MeasureValue;
use crate::clock::Timestamp;
use std::time::Duration;
use tracing::debug;

/// One time-sliced accumulator covering `[start, start + width)`
#[derive(Debug, Clone)]
pub struct IntervalBucket {
    /// Absolute bucket index since the ring epoch (negative before it)
    index: i64,
    observations: u64,
    aggregation: MutableAggregation,
}

impl IntervalBucket {
    fn empty(index: i64, template: &MutableAggregation) -> Self {
        IntervalBucket {
            index,
            observations: 0,
            aggregation: template.clone(),
        }
    }

    pub fn index(&self) -> i64 {
        self.index
    }

    pub fn observations(&self) -> u64 {
        self.observations
    }

    pub fn aggregation(&self) -> &MutableAggregation {
        &self.aggregation
    }
}

/// Fixed-capacity ring of N+1 interval buckets
#[derive(Debug, Clone)]
pub struct IntervalBucketRing {
    epoch: Timestamp,
    width_ms: u64,
    sub_buckets: usize,
    /// Index of the newest bucket
    newest: i64,
    buckets: Vec<IntervalBucket>,
    /// Empty accumulator cloned into every fresh bucket
    template: MutableAggregation,
}

impl IntervalBucketRing {
    /// Create a ring whose bucket 0 starts at `epoch`.
    ///
    /// `sub_buckets` is N and must be at least 1. Windows shorter than N
    /// milliseconds get 1ms buckets.
    pub fn new(
        epoch: Timestamp,
        window: Duration,
        sub_buckets: usize,
        template: MutableAggregation,
    ) -> Self {
        let sub_buckets = sub_buckets.max(1);
        let width_ms = (window.as_millis() as u64 / sub_buckets as u64).max(1);
        let oldest = -(sub_buckets as i64);
        let mut buckets: Vec<IntervalBucket> = (oldest..=0)
            .map(|index| IntervalBucket::empty(index, &template))
            .collect();
        buckets.sort_by_key(|b| Self::slot_of(b.index, sub_buckets));

        let ring = IntervalBucketRing {
            epoch,
            width_ms,
            sub_buckets,
            newest: 0,
            buckets,
            template,
        };
        ring.verify_invariants();
        ring
    }

    /// Verify all invariants hold for this ring
    #[cfg(debug_assertions)]
    pub fn verify_invariants(&self) {
        debug_assert_eq!(
            self.buckets.len(),
            self.sub_buckets + 1,
            "Invariant violated: ring must hold N+1 buckets"
        );
        for (slot, bucket) in self.buckets.iter().enumerate() {
            debug_assert_eq!(
                Self::slot_of(bucket.index, self.sub_buckets),
                slot,
                "Invariant violated: bucket {} in wrong slot",
                bucket.index
            );
            debug_assert!(
                bucket.index <= self.newest && bucket.index >= self.oldest(),
                "Invariant violated: bucket {} outside [{}, {}]",
                bucket.index,
                self.oldest(),
                self.newest
            );
        }
    }

    #[cfg(not(debug_assertions))]
    #[inline(always)]
    pub fn verify_invariants(&self) {}

    fn slot_of(index: i64, sub_buckets: usize) -> usize {
        index.rem_euclid(sub_buckets as i64 + 1) as usize
    }

    fn oldest(&self) -> i64 {
        self.newest - self.sub_buckets as i64
    }

    /// Bucket index containing `ts`. `None` before the epoch, or when the
    /// offset from the epoch does not fit in an `i64`.
    fn index_of(&self, ts: Timestamp) -> Option<i64> {
        let offset = i64::try_from(ts.0.checked_sub(self.epoch.0)?).ok()?;
        Some(offset / self.width_ms as i64)
    }

    /// Largest index `index_of` can return
    fn max_index(&self) -> i64 {
        i64::MAX / self.width_ms as i64
    }

    fn start_of(&self, index: i64) -> Timestamp {
        let offset = index.saturating_mul(self.width_ms as i64);
        Timestamp(self.epoch.0.saturating_add_signed(offset))
    }

    fn bucket(&self, index: i64) -> &IntervalBucket {
        &self.buckets[Self::slot_of(index, self.sub_buckets)]
    }

    /// Width of one bucket
    pub fn bucket_width(&self) -> Duration {
        Duration::from_millis(self.width_ms)
    }

    /// Retained buckets, oldest first
    pub fn buckets(&self) -> impl Iterator<Item = &IntervalBucket> {
        (self.oldest()..=self.newest).map(move |index| self.bucket(index))
    }

    /// Evict buckets so that `index` becomes the newest
    fn roll_to(&mut self, index: i64) {
        if index <= self.newest {
            return;
        }
        let ring_len = self.sub_buckets as i64 + 1;
        let first_new = (self.newest + 1).max(index - ring_len + 1);
        for i in first_new..=index {
            let slot = Self::slot_of(i, self.sub_buckets);
            self.buckets[slot] = IntervalBucket::empty(i, &self.template);
        }
        self.newest = index;
        self.verify_invariants();
    }

    /// Record into the bucket containing `timestamp`, rolling forward if it
    /// is newer than the newest bucket.
    ///
    /// Returns false when the timestamp predates the retained buckets (or
    /// the epoch), or lies beyond `i64::MAX` ms past the epoch, and the
    /// observation was dropped.
    pub fn record(
        &mut self,
        value: MeasureValue,
        attachments: &Attachments,
        timestamp: Timestamp,
    ) -> bool {
        let Some(index) = self.index_of(timestamp) else {
            debug!(%timestamp, epoch = %self.epoch, "Dropping interval record outside the ring's range");
            return false;
        };
        self.roll_to(index);
        if index < self.oldest() {
            debug!(
                %timestamp,
                oldest_start = %self.start_of(self.oldest()),
                "Dropping interval record older than the oldest bucket"
            );
            return false;
        }

        let slot = Self::slot_of(index, self.sub_buckets);
        let bucket = &mut self.buckets[slot];
        debug_assert_eq!(bucket.index, index);
        bucket.observations += 1;
        bucket.aggregation.add(value, attachments, timestamp);
        true
    }

    /// Share of the oldest bucket's span still inside `[now - D, now]`.
    ///
    /// Expects `now` to fall inside the newest bucket. A `now` before the
    /// newest bucket (clock rewind) keeps the oldest bucket whole; a `now`
    /// too far past the epoch to index leaves none of it.
    pub fn get_fraction(&self, now: Timestamp) -> f64 {
        let newest_start = self.start_of(self.newest);
        let elapsed = now.0.saturating_sub(newest_start.0).min(self.width_ms);
        debug_assert!(
            self.index_of(now).is_none()
                || now.0 < newest_start.0.saturating_add(self.width_ms),
            "now {} past the newest bucket starting at {}",
            now,
            newest_start
        );
        1.0 - elapsed as f64 / self.width_ms as f64
    }

    /// Roll forward to `now` and combine the retained buckets into one
    /// accumulator: the oldest weighted by `get_fraction(now)`, the rest whole.
    pub fn collect(&mut self, now: Timestamp) -> MutableAggregation {
        let index = match self.index_of(now) {
            Some(index) => Some(index),
            // too far past the epoch to index: everything has expired
            None if now >= self.epoch => Some(self.max_index()),
            None => None,
        };
        if let Some(index) = index {
            self.roll_to(index);
        }

        let fraction = self.get_fraction(now);
        let mut combined = self.template.clone();
        combined.combine(&self.bucket(self.oldest()).aggregation, fraction);
        for index in self.oldest() + 1..=self.newest {
            combined.combine(&self.bucket(index).aggregation, 1.0);
        }
        combined
    }

    /// Observations held by the retained buckets
    pub fn observations(&self) -> u64 {
        self.buckets.iter().map(|b| b.observations).sum()
    }
}
