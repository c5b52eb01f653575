pub mod clock;
pub mod config;
pub mod stats;

pub use clock::{Clock, ProductionClock, SimulatedClock, Timestamp};
pub use config::StatsConfig;
pub use stats::{StatsComponent, StatsError, StatsRecorder, ViewData, ViewManager};
