//! Rate limiting for the per-tick driver.
//!
//! [`Machine::process_tick`](crate::Machine::process_tick) may be called as
//! often as the host likes; work only happens once per configured period,
//! and at most `max_events_per_tick` events are dispatched per tick.

use crate::error::ActionError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum wall-clock time between processed ticks.
    pub tick_period_ms: u64,
    /// Events dispatched per tick before the rest wait for the next tick.
    pub max_events_per_tick: usize,
    /// Fail construction when the definition names actions the host did not
    /// register, instead of warning.
    pub strict_actions: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: 50,
            max_events_per_tick: 256,
            strict_actions: false,
        }
    }
}

impl EngineConfig {
    pub fn with_tick_period_ms(mut self, ms: u64) -> Self {
        self.tick_period_ms = ms;
        self
    }

    pub fn with_max_events_per_tick(mut self, max: usize) -> Self {
        self.max_events_per_tick = max;
        self
    }

    pub fn with_strict_actions(mut self, strict: bool) -> Self {
        self.strict_actions = strict;
        self
    }

    /// Returns the tick period as Duration.
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }
}

/// Tracks when the last tick was processed.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    period_ms: u64,
    last_ms: Option<u64>,
}

impl RateLimiter {
    pub fn new(period_ms: u64) -> Self {
        Self {
            period_ms,
            last_ms: None,
        }
    }

    /// Returns true if a tick at `now_ms` should do work. The first tick is
    /// always ready; a clock that moved backwards is not.
    pub fn ready(&self, now_ms: u64) -> bool {
        match self.last_ms {
            None => true,
            Some(last) => now_ms
                .checked_sub(last)
                .is_some_and(|elapsed| elapsed >= self.period_ms),
        }
    }

    pub fn record(&mut self, now_ms: u64) {
        self.last_ms = Some(now_ms);
    }

    pub fn last_ms(&self) -> Option<u64> {
        self.last_ms
    }

    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }
}

/// What one call to `process_tick` did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// False when the call was rate limited (or the machine torn down).
    pub processed: bool,
    pub timers_fired: usize,
    pub events_processed: usize,
    pub transitions: usize,
    /// Action failures from every step in the tick.
    pub failures: Vec<ActionError>,
    /// Events left queued because the per-tick cap was reached.
    pub backlog: usize,
}

impl TickReport {
    pub fn skipped() -> Self {
        Self::default()
    }
}
