//! Per-system execution statistics.
//!
//! Every registered system owns one [`StatsSlot`]. The executor writes to a
//! slot after each invocation of its system, successful or not; diagnostics
//! read slots through [`StatsSnapshot`]. A system runs at most once per tick,
//! so concurrent writers within a stage always target different slots and the
//! per-slot lock is never contended by another system.
//!
//! Durations are floating-point milliseconds measured on a monotonic clock.
//! They are informational only and never feed back into scheduling.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;

use crate::engine::error::SystemResult;
use crate::engine::types::Tick;


/// Timing and outcome counters for one system.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SystemStats {
    /// Number of invocations, including failed ones.
    pub runs: u64,

    /// Number of invocations that failed or panicked.
    pub failures: u64,

    /// Duration of the most recent invocation, in milliseconds.
    pub last_ms: f64,

    /// Mean duration, in milliseconds: over every run, or over the most
    /// recent `rolling_window` runs when a window is configured.
    pub mean_ms: f64,

    /// Longest observed invocation, in milliseconds.
    pub max_ms: f64,

    /// Tick of the most recent invocation.
    pub last_tick: Tick,

    /// Message of the most recent failure, if any.
    pub last_error: Option<String>,

    /// Durations inside the rolling window, oldest first.
    #[serde(skip)]
    recent: VecDeque<f64>,

    /// Sum of `recent`.
    #[serde(skip)]
    recent_sum: f64,
}

impl SystemStats {
    /// Records one invocation.
    ///
    /// `window` is the number of most recent samples the mean covers;
    /// 0 averages every run.
    pub fn record(&mut self, duration: Duration, outcome: &SystemResult, tick: Tick, window: u32) {
        let ms = duration.as_secs_f64() * 1000.0;

        self.runs += 1;
        self.last_ms = ms;
        self.last_tick = tick;
        if ms > self.max_ms {
            self.max_ms = ms;
        }

        match window {
            // Incremental mean: new_avg = prev_avg + (x - prev_avg) / n
            0 => self.mean_ms += (ms - self.mean_ms) / self.runs as f64,
            w => {
                self.recent.push_back(ms);
                self.recent_sum += ms;
                while self.recent.len() > w as usize {
                    if let Some(oldest) = self.recent.pop_front() {
                        self.recent_sum -= oldest;
                    }
                }
                self.mean_ms = self.recent_sum / self.recent.len() as f64;
            }
        }

        if let Err(e) = outcome {
            self.failures += 1;
            self.last_error = Some(e.to_string());
        }
    }
}

/// Lock-protected statistics owned by one registered system.
#[derive(Debug, Default)]
pub struct StatsSlot {
    inner: Mutex<SystemStats>,
}

impl StatsSlot {
    /// Records one invocation into the slot.
    pub fn record(&self, duration: Duration, outcome: &SystemResult, tick: Tick, window: u32) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(duration, outcome, tick, window);
    }

    /// Copy of the current counters.
    pub fn snapshot(&self) -> SystemStats {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Point-in-time copy of every system's statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    /// Number of ticks executed when the snapshot was taken.
    pub tick: Tick,

    /// Statistics keyed by system name.
    pub systems: BTreeMap<String, SystemStats>,
}

impl StatsSnapshot {
    /// Statistics of one system.
    pub fn get(&self, name: &str) -> Option<&SystemStats> {
        self.systems.get(name)
    }

    /// Serializes the snapshot as JSON for an external inspector.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
