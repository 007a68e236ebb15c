use std::time::{SystemTime, UNIX_EPOCH};

/// A source of wall-clock time for an aggregation.
///
/// Retrieval only reads the clock in distributed mode, to find the slots that
/// have not yet been rolled up into coarser persisted tables.
pub trait Clock: Send + Sync + 'static {
    /// Returns the current timestamp in milliseconds since the UNIX epoch.
    fn now_ms(&self) -> i64;
}

/// A clock that uses `std::time::SystemTime`.
///
/// Susceptible to NTP adjustments, requires no calibration.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        wall_clock_ms()
    }
}

/// A clock pinned to a single instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_ms(&self) -> i64 {
        self.0
    }
}

/// A clock that uses the CPU's Time-Stamp Counter (TSC) via the `quanta` crate.
///
/// Anchors to SystemTime at initialization and then uses TSC ticks to progress,
/// so it never jumps backwards.
#[cfg(feature = "tsc-clock")]
#[derive(Debug, Clone)]
pub struct QuantaClock {
    clock: quanta::Clock,
    start_wall_ms: i64,
    start_instant: quanta::Instant,
}

#[cfg(feature = "tsc-clock")]
impl Default for QuantaClock {
    fn default() -> Self {
        let clock = quanta::Clock::new();
        let start_instant = clock.now();
        Self {
            clock,
            start_wall_ms: wall_clock_ms(),
            start_instant,
        }
    }
}

#[cfg(feature = "tsc-clock")]
impl QuantaClock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(feature = "tsc-clock")]
impl Clock for QuantaClock {
    fn now_ms(&self) -> i64 {
        let delta = self.clock.now().duration_since(self.start_instant);
        self.start_wall_ms + delta.as_millis() as i64
    }
}

fn wall_clock_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}
