//! Stats component: the one place a process wires clock, config, view
//! manager and recorder together

use super::error::Result;
use super::manager::{CollectionState, ViewManager};
use super::recorder::{NoTags, StatsRecorder, TagContextSource};
use crate::clock::{Clock, ProductionClock};
use crate::config::StatsConfig;
use std::sync::Arc;
use tracing::info;

/// Owns the view manager and hands out recorders bound to it
#[derive(Clone)]
pub struct StatsComponent {
    manager: Arc<ViewManager>,
    recorder: StatsRecorder,
}

impl StatsComponent {
    pub fn new(
        config: &StatsConfig,
        clock: Arc<dyn Clock>,
        tags: Arc<dyn TagContextSource>,
    ) -> Result<Self> {
        config.validate()?;
        let manager = Arc::new(ViewManager::new(
            clock,
            config.interval_sub_buckets,
            config.initial_state,
        ));
        let recorder = StatsRecorder::new(manager.clone(), tags);
        info!(
            sub_buckets = config.interval_sub_buckets,
            state = ?config.initial_state,
            "Stats component created"
        );
        Ok(StatsComponent { manager, recorder })
    }

    /// Wall clock, no ambient tags, configuration from the environment
    pub fn from_env() -> Result<Self> {
        Self::new(
            &StatsConfig::from_env(),
            Arc::new(ProductionClock::new()),
            Arc::new(NoTags),
        )
    }

    pub fn view_manager(&self) -> &Arc<ViewManager> {
        &self.manager
    }

    pub fn stats_recorder(&self) -> &StatsRecorder {
        &self.recorder
    }

    pub fn state(&self) -> CollectionState {
        self.manager.state()
    }

    pub fn set_state(&self, state: CollectionState) -> bool {
        self.manager.set_state(state)
    }
}
