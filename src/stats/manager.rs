//! View Manager
//!
//! Registry of views, keyed by view name, with a reverse index from measure
//! name to the views that aggregate it. Recording fans a batch out to every
//! interested view; reading snapshots one view.
//!
//! ## Concurrency
//!
//! All state sits behind one coarse `parking_lot::Mutex`. A recorded batch is
//! applied to every interested view while the lock is held, so readers never
//! observe half a batch. Reads take the same lock: interval views roll their
//! buckets forward lazily on whichever call first sees the new time.

use super::accumulator::Attachments;
use super::error::{Result, StatsError};
use super::types::{Measure, Measurement, TagContext};
use super::view::{AggregationWindow, View, ViewName};
use super::view_data::{MutableViewData, ViewData};
use crate::clock::{Clock, Timestamp};
use ahash::AHashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Whether recorded values are aggregated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionState {
    #[default]
    Enabled,
    Disabled,
}

impl std::str::FromStr for CollectionState {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "enabled" => Ok(CollectionState::Enabled),
            "disabled" => Ok(CollectionState::Disabled),
            other => Err(StatsError::Config {
                reason: format!("unknown collection state '{}'", other),
            }),
        }
    }
}

struct Registry {
    state: CollectionState,
    views: AHashMap<ViewName, MutableViewData>,
    measures: AHashMap<Arc<str>, Measure>,
    views_by_measure: AHashMap<Arc<str>, Vec<ViewName>>,
}

impl Registry {
    /// Verify all invariants hold for this registry
    #[cfg(debug_assertions)]
    fn verify_invariants(&self) {
        let indexed: usize = self.views_by_measure.values().map(Vec::len).sum();
        debug_assert_eq!(
            indexed,
            self.views.len(),
            "Invariant violated: every view is indexed under exactly one measure"
        );
        for (measure, names) in &self.views_by_measure {
            for name in names {
                let data = self.views.get(name);
                debug_assert!(
                    data.is_some_and(|d| d.view().measure().name() == &**measure),
                    "Invariant violated: view '{}' indexed under wrong measure '{}'",
                    name,
                    measure
                );
            }
        }
    }

    #[cfg(not(debug_assertions))]
    #[inline(always)]
    fn verify_invariants(&self) {}
}

/// Registry of views coordinating concurrent recording and reading
pub struct ViewManager {
    clock: Arc<dyn Clock>,
    sub_buckets: usize,
    registry: Mutex<Registry>,
}

impl ViewManager {
    /// Create an empty manager. Interval views split their window into
    /// `sub_buckets` sub-intervals.
    pub fn new(clock: Arc<dyn Clock>, sub_buckets: usize, state: CollectionState) -> Self {
        ViewManager {
            clock,
            sub_buckets: sub_buckets.max(1),
            registry: Mutex::new(Registry {
                state,
                views: AHashMap::new(),
                measures: AHashMap::new(),
                views_by_measure: AHashMap::new(),
            }),
        }
    }

    /// Register a view.
    ///
    /// Interval windows must be at least one millisecond per sub-interval.
    /// Re-registering an identical view is a no-op. A different view under an
    /// existing name, or a view whose measure conflicts with an already
    /// registered measure of the same name, is rejected and the registry is
    /// left unchanged.
    pub fn register_view(&self, view: View) -> Result<()> {
        if let AggregationWindow::Interval(window) = view.window() {
            if window.as_millis() < self.sub_buckets as u128 {
                warn!(view = %view.name(), ?window, "Rejecting interval shorter than its sub-intervals");
                return Err(StatsError::InvalidWindow {
                    reason: format!(
                        "interval {:?} is shorter than {} sub-intervals of 1ms",
                        window, self.sub_buckets
                    ),
                });
            }
        }

        let mut registry = self.registry.lock();

        if let Some(existing) = registry.views.get(view.name()) {
            if existing.view() == &view {
                debug!(view = %view.name(), "View already registered");
                return Ok(());
            }
            warn!(view = %view.name(), "Rejecting different view with the same name");
            return Err(StatsError::ViewConflict {
                name: view.name().to_string(),
            });
        }

        let measure = view.measure();
        if let Some(registered) = registry.measures.get(measure.name()) {
            if registered != measure {
                warn!(
                    view = %view.name(),
                    measure = measure.name(),
                    "Rejecting view with a different measure of the same name"
                );
                return Err(StatsError::MeasureConflict {
                    name: measure.name().to_string(),
                });
            }
        }

        let measure_name: Arc<str> = measure.name().into();
        registry
            .measures
            .entry(measure_name.clone())
            .or_insert_with(|| measure.clone());
        registry
            .views_by_measure
            .entry(measure_name)
            .or_default()
            .push(view.name().clone());

        info!(
            view = %view.name(),
            measure = view.measure().name(),
            aggregation = view.aggregation().name(),
            window = ?view.window(),
            "Registered view"
        );
        let name = view.name().clone();
        let data = MutableViewData::new(view, self.clock.now(), self.sub_buckets);
        registry.views.insert(name, data);
        registry.verify_invariants();
        Ok(())
    }

    /// Record a batch at the current clock time
    pub fn record(&self, tags: &TagContext, measurements: &[Measurement], attachments: &Attachments) {
        self.record_at(tags, measurements, attachments, self.clock.now());
    }

    /// Record a batch at `timestamp`.
    ///
    /// No-op while disabled. Measurements whose measure no view aggregates are
    /// dropped; absent tag columns resolve to the unknown sentinel.
    pub fn record_at(
        &self,
        tags: &TagContext,
        measurements: &[Measurement],
        attachments: &Attachments,
        timestamp: Timestamp,
    ) {
        let mut guard = self.registry.lock();
        if guard.state == CollectionState::Disabled {
            return;
        }

        let Registry {
            views,
            views_by_measure,
            ..
        } = &mut *guard;
        for measurement in measurements {
            let Some(names) = views_by_measure.get(measurement.measure.name()) else {
                continue;
            };
            for name in names {
                if let Some(data) = views.get_mut(name) {
                    let tuple = tags.tuple_for(data.view().columns());
                    data.record(tuple, measurement.value, attachments, timestamp);
                }
            }
        }
    }

    /// Snapshot the view registered under `name` at the current clock time
    pub fn get_view(&self, name: &str) -> Result<ViewData> {
        let mut registry = self.registry.lock();
        let now = self.clock.now();
        match registry.views.get_mut(name) {
            Some(data) => Ok(data.to_view_data(now)),
            None => Err(StatsError::ViewNotRegistered {
                name: name.to_string(),
            }),
        }
    }

    /// All registered views, sorted by name
    pub fn registered_views(&self) -> Vec<View> {
        let registry = self.registry.lock();
        let mut views: Vec<View> = registry.views.values().map(|d| d.view().clone()).collect();
        views.sort_by(|a, b| a.name().cmp(b.name()));
        views
    }

    pub fn state(&self) -> CollectionState {
        self.registry.lock().state
    }

    /// Switch collection state. Any transition replaces every view's data
    /// with a fresh, empty instance starting now; disabling therefore
    /// forgets everything recorded so far.
    ///
    /// Returns false if the manager was already in `state`.
    pub fn set_state(&self, state: CollectionState) -> bool {
        let mut registry = self.registry.lock();
        if registry.state == state {
            return false;
        }

        let now = self.clock.now();
        let sub_buckets = self.sub_buckets;
        for data in registry.views.values_mut() {
            *data = MutableViewData::new(data.view().clone(), now, sub_buckets);
        }
        registry.state = state;
        info!(?state, views = registry.views.len(), %now, "Stats collection state changed");
        true
    }
}
