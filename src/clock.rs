//! Clock Abstraction for Recording and Reading Stats
//!
//! Every timestamp the stats engine sees comes through [`Clock`], so tests
//! can drive interval windows forward (and backward) deterministically.
//!
//! ## Design Principles (TigerStyle)
//!
//! 1. **Explicit time**: The view manager never reads the system clock directly
//! 2. **No hidden state**: Clock state is visible and controllable
//! 3. **Non-monotonic tolerant**: Consumers must cope with time going backwards

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Timestamp in milliseconds since the Unix epoch
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    pub fn from_secs(secs: u64) -> Self {
        Timestamp(secs.saturating_mul(1000))
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Clock trait for time operations
///
/// Implementations:
/// - `ProductionClock`: Uses real system time
/// - `SimulatedClock`: Uses controlled virtual time for tests
pub trait Clock: Send + Sync + 'static {
    /// Get current time
    fn now(&self) -> Timestamp;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

/// Production clock using real system time
#[derive(Clone)]
pub struct ProductionClock {
    /// Epoch instant for calculating timestamps
    start: Instant,
    /// Initial timestamp in milliseconds
    start_millis: u64,
}

impl Default for ProductionClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ProductionClock {
    pub fn new() -> Self {
        // A system clock set before 1970 reads as the epoch itself.
        let start_millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        ProductionClock {
            start: Instant::now(),
            start_millis,
        }
    }
}

impl Clock for ProductionClock {
    fn now(&self) -> Timestamp {
        let elapsed = self.start.elapsed().as_millis() as u64;
        Timestamp(self.start_millis.saturating_add(elapsed))
    }
}

/// Simulated clock for deterministic testing
///
/// Time only advances when explicitly told to via `advance()` or `set()`.
/// `set()` may move time backwards.
#[derive(Clone)]
pub struct SimulatedClock {
    /// Current virtual time in milliseconds
    time_ms: Arc<AtomicU64>,
}

impl Default for SimulatedClock {
    fn default() -> Self {
        Self::new(0)
    }
}

impl SimulatedClock {
    /// Create a new simulated clock starting at the given time
    pub fn new(start_ms: u64) -> Self {
        SimulatedClock {
            time_ms: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    /// Advance time by the given duration
    pub fn advance(&self, duration: Duration) {
        self.time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    /// Advance time by milliseconds
    pub fn advance_ms(&self, ms: u64) {
        self.time_ms.fetch_add(ms, Ordering::SeqCst);
    }

    /// Set time to a specific value
    pub fn set(&self, time_ms: u64) {
        self.time_ms.store(time_ms, Ordering::SeqCst);
    }

    /// Get current time in milliseconds
    pub fn current_ms(&self) -> u64 {
        self.time_ms.load(Ordering::SeqCst)
    }
}

impl Clock for SimulatedClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.time_ms.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_clock() {
        let clock = ProductionClock::new();
        let t1 = clock.now();
        std::thread::sleep(Duration::from_millis(10));
        let t2 = clock.now();

        assert!(t2.0 > t1.0, "Time should advance");
        assert!(t2.0 - t1.0 >= 10, "Should have elapsed at least 10ms");
    }

    #[test]
    fn test_simulated_clock_can_rewind() {
        let clock = SimulatedClock::new(5000);
        clock.advance_ms(100);
        assert_eq!(clock.now().0, 5100);

        clock.set(1000);
        assert_eq!(clock.now(), Timestamp::from_secs(1));
    }

    #[test]
    fn test_simulated_clock_shared() {
        let clock = SimulatedClock::new(0);
        let clock2 = clock.clone();

        clock.advance(Duration::from_secs(2));
        assert_eq!(clock2.current_ms(), 2000, "Clones should share state");
    }

    #[test]
    fn test_arc_clock_delegates() {
        let clock = SimulatedClock::new(42);
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        clock.advance_ms(8);
        assert_eq!(shared.now(), Timestamp(50));
    }
}
