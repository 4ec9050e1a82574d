//! Scheduler configuration.
//!
//! [`SchedulerConfig`] is plain data deriving `serde` so a host can embed it in
//! its own settings file. Every field has a default, so a partial (or empty)
//! document deserializes.

use serde::{Deserialize, Serialize};


/// How to treat a system registered without access metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingAccessPolicy {
    /// Treat the system as parallel-eligible with an empty access footprint.
    /// A warning is logged at registration.
    #[default]
    Permissive,

    /// Treat the system as non-parallel: it always runs alone in its stage.
    Exclusive,

    /// Refuse to register the system.
    Reject,
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of worker threads. 0 = available hardware concurrency.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Whether multi-system stages are dispatched to the worker pool.
    /// When `false` every tick runs in sequential mode.
    #[serde(default = "default_parallel")]
    pub parallel: bool,

    /// Policy for systems that declare no access metadata.
    #[serde(default)]
    pub missing_access: MissingAccessPolicy,

    /// Number of samples in the rolling duration mean. 0 = mean over all runs.
    #[serde(default = "default_rolling_window")]
    pub rolling_window: u32,
}

fn default_worker_threads() -> usize { 0 }
fn default_parallel() -> bool { true }
fn default_rolling_window() -> u32 { 0 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            parallel: default_parallel(),
            missing_access: MissingAccessPolicy::default(),
            rolling_window: default_rolling_window(),
        }
    }
}

impl SchedulerConfig {
    /// Resolves `worker_threads`, replacing 0 with the available parallelism.
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.worker_threads
        }
    }

    /// Builder-style override of `worker_threads`.
    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    /// Builder-style override of `parallel`.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Builder-style override of `missing_access`.
    pub fn with_missing_access(mut self, policy: MissingAccessPolicy) -> Self {
        self.missing_access = policy;
        self
    }

    /// Builder-style override of `rolling_window`.
    pub fn with_rolling_window(mut self, samples: u32) -> Self {
        self.rolling_window = samples;
        self
    }
}
