//! Stats Recorder: batches measurements and resolves the tag context
//! before handing them to the view manager

use super::accumulator::Attachments;
use super::manager::ViewManager;
use super::types::{Measure, MeasureKind, MeasureValue, Measurement, TagContext};
use parking_lot::RwLock;
use std::sync::Arc;

/// Supplies the ambient tag context for `MeasureMap::record`
pub trait TagContextSource: Send + Sync + 'static {
    fn current(&self) -> TagContext;
}

/// Source that never carries tags
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTags;

impl TagContextSource for NoTags {
    fn current(&self) -> TagContext {
        TagContext::empty()
    }
}

/// Process-wide settable tag context, shared by clones
#[derive(Debug, Clone, Default)]
pub struct SharedTagContext {
    inner: Arc<RwLock<TagContext>>,
}

impl SharedTagContext {
    pub fn new(tags: TagContext) -> Self {
        SharedTagContext {
            inner: Arc::new(RwLock::new(tags)),
        }
    }

    /// Replace the ambient context
    pub fn set(&self, tags: TagContext) {
        *self.inner.write() = tags;
    }
}

impl TagContextSource for SharedTagContext {
    fn current(&self) -> TagContext {
        self.inner.read().clone()
    }
}

/// Ingestion entrypoint
#[derive(Clone)]
pub struct StatsRecorder {
    manager: Arc<ViewManager>,
    tags: Arc<dyn TagContextSource>,
}

impl StatsRecorder {
    pub fn new(manager: Arc<ViewManager>, tags: Arc<dyn TagContextSource>) -> Self {
        StatsRecorder { manager, tags }
    }

    /// Start a new batch
    pub fn new_measure_map(&self) -> MeasureMap<'_> {
        MeasureMap {
            recorder: self,
            measurements: Vec::new(),
            attachments: Attachments::new(),
        }
    }
}

/// A batch of measurements recorded together under one tag context
pub struct MeasureMap<'a> {
    recorder: &'a StatsRecorder,
    measurements: Vec<Measurement>,
    attachments: Attachments,
}

impl MeasureMap<'_> {
    /// Add a value, converted to the measure's numeric kind.
    /// Putting the same measure twice keeps the last value.
    pub fn put(mut self, measure: &Measure, value: impl Into<MeasureValue>) -> Self {
        let value = match (measure.kind(), value.into()) {
            (MeasureKind::Double, v) => MeasureValue::Double(v.as_f64()),
            (MeasureKind::Long, v) => MeasureValue::Long(v.as_i64()),
        };
        match self
            .measurements
            .iter_mut()
            .find(|m| m.measure.name() == measure.name())
        {
            Some(existing) => {
                existing.measure = measure.clone();
                existing.value = value;
            }
            None => self
                .measurements
                .push(Measurement::new(measure.clone(), value)),
        }
        self
    }

    pub fn put_double(self, measure: &Measure, value: f64) -> Self {
        self.put(measure, value)
    }

    pub fn put_long(self, measure: &Measure, value: i64) -> Self {
        self.put(measure, value)
    }

    /// Attach a key/value pair, kept as an exemplar by distribution views
    pub fn put_attachment(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attachments.insert(key.into(), value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    /// Record under the ambient tag context
    pub fn record(self) {
        let tags = self.recorder.tags.current();
        self.record_with_tags(&tags);
    }

    /// Record under an explicit tag context
    pub fn record_with_tags(self, tags: &TagContext) {
        if self.measurements.is_empty() {
            return;
        }
        self.recorder
            .manager
            .record(tags, &self.measurements, &self.attachments);
    }
}
