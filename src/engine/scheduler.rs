//! System scheduling and execution.
//!
//! This module is responsible for:
//! * keeping the table of registered systems and their metadata,
//! * caching the execution plan and rebuilding it lazily when stale,
//! * running compatible systems in parallel on a bounded Rayon pool,
//! * enforcing a fork-join barrier between stages,
//! * isolating and timing every system invocation.
//!
//! ## Scheduling model
//!
//! Systems are assigned to **stages** by the planner such that:
//! * systems within the same stage do **not** conflict on component access,
//! * all systems in a stage may run in parallel,
//! * stages are executed sequentially, and each tick restarts at stage 0.
//!
//! The calling thread drives the tick. A single-system stage runs inline on
//! it; a multi-system stage is dispatched to the worker pool and the caller
//! blocks until every member has returned before the next stage starts.
//!
//! ## Modes
//!
//! * **Staged**: the plan is valid, parallel execution is enabled and the
//!   pool is available.
//! * **Sequential**: every enabled system runs on the calling thread in
//!   priority order. Used when parallel execution is disabled, the worker pool
//!   could not be built, or the plan fails validation.
//!
//! ## Plan cache
//!
//! Registering, removing, enabling or disabling a system marks the plan
//! stale. The next [`Scheduler::execute`] rebuilds it before running anything,
//! so a system registered between ticks runs (and is timed) on the very next
//! tick.
//!
//! ## Failure isolation
//!
//! A system that returns `Err` or panics is logged with its name and stage,
//! its statistics are recorded, and the tick continues with the remaining
//! systems. One failing system never aborts a tick.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;

use crate::engine::config::{MissingAccessPolicy, SchedulerConfig};
use crate::engine::error::{PlanAnomaly, SchedulerError, SchedulerResult, SystemError, SystemResult};
use crate::engine::graph::{build_conflicts, priority_order, SystemDescriptor};
use crate::engine::planner::{compute_stages, ExecutionPlan};
use crate::engine::stats::{StatsSlot, StatsSnapshot, SystemStats};
use crate::engine::systems::{FnSystem, System, SystemMetadata, TickContext};
use crate::engine::types::Tick;
use crate::profiling::profiler::{self, Arg};


/// How a tick was executed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ExecutionMode {
    /// Stage by stage, multi-system stages on the worker pool.
    Staged,
    /// One system at a time on the calling thread, in priority order.
    Sequential,
}

/// Outcome of one [`Scheduler::execute`] call.
#[derive(Clone, Debug, PartialEq)]
pub struct TickReport {
    /// Tick number (1 for the first call).
    pub tick: Tick,

    /// Mode the tick ran in.
    pub mode: ExecutionMode,

    /// Number of stages started. In sequential mode every system counts as one.
    pub stages_run: usize,

    /// Names of the invoked systems, in stage order.
    pub invoked: Vec<String>,

    /// Names of the systems that failed or panicked.
    pub failed: Vec<String>,

    /// `true` if a shutdown request stopped the tick between stages.
    pub aborted: bool,

    /// Plan inconsistency that forced sequential mode, if any.
    pub anomaly: Option<PlanAnomaly>,
}

impl TickReport {
    fn new(tick: Tick, mode: ExecutionMode) -> Self {
        Self {
            tick,
            mode,
            stages_run: 0,
            invoked: Vec::new(),
            failed: Vec::new(),
            aborted: false,
            anomaly: None,
        }
    }

    fn note(&mut self, invocation: Invocation) {
        if !invocation.ok {
            self.failed.push(invocation.name.clone());
        }
        self.invoked.push(invocation.name);
    }
}

/// Cloneable handle used to stop a running tick between stages.
///
/// Once requested, every subsequent tick stops before its first stage until
/// the request is cleared.
#[derive(Clone, Debug, Default)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Requests that the scheduler stop at the next stage boundary.
    pub fn request(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Returns `true` if a stop has been requested.
    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Withdraws a pending request.
    pub fn clear(&self) {
        self.flag.store(false, Ordering::Release);
    }
}

struct SystemEntry {
    system: Box<dyn System>,
    name: String,
    metadata: SystemMetadata,
    enabled: bool,
    stats: StatsSlot,
}

struct Invocation {
    name: String,
    ok: bool,
}

/// Scheduler that stores systems, compiles them into conflict-free execution
/// stages based on declared access sets, and executes stages with parallelism.
pub struct Scheduler {
    config: SchedulerConfig,
    systems: Vec<SystemEntry>,
    /// Cached stages.
    plan: Option<ExecutionPlan>,
    /// Whether `plan` needs rebuilding.
    stale: bool,
    parallel: bool,
    pool: Option<rayon::ThreadPool>,
    pool_failed: bool,
    shutdown: ShutdownHandle,
    tick: Tick,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Creates an empty scheduler with the default configuration.
    #[inline]
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// Creates an empty scheduler. The worker pool is built on first use.
    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            parallel: config.parallel,
            config,
            systems: Vec::new(),
            plan: None,
            stale: true,
            pool: None,
            pool_failed: false,
            shutdown: ShutdownHandle::default(),
            tick: 0,
        }
    }

    /// The configuration the scheduler was created with.
    #[inline]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Returns the number of registered systems.
    #[inline]
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    /// Returns `true` if no systems are registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Number of ticks executed so far.
    #[inline]
    pub fn tick(&self) -> Tick {
        self.tick
    }

    // ─────────────────────────────────────────────────────────────────────
    // Registration
    // ─────────────────────────────────────────────────────────────────────

    /// Registers a system using the metadata it declares itself.
    pub fn add_system<S: System + 'static>(&mut self, system: S) -> SchedulerResult<()> {
        self.register(Box::new(system), None)
    }

    /// Registers a system with explicit metadata, overriding its own.
    pub fn add_system_with<S: System + 'static>(
        &mut self,
        system: S,
        metadata: SystemMetadata,
    ) -> SchedulerResult<()> {
        self.register(Box::new(system), Some(metadata))
    }

    /// Registers a boxed system using the metadata it declares itself.
    pub fn add_boxed(&mut self, system: Box<dyn System>) -> SchedulerResult<()> {
        self.register(system, None)
    }

    /// Convenience helper to build-and-register an [`FnSystem`].
    pub fn add_fn<F>(
        &mut self,
        name: impl Into<String>,
        metadata: SystemMetadata,
        f: F,
    ) -> SchedulerResult<()>
    where
        F: Fn(&TickContext) -> SystemResult + Send + Sync + 'static,
    {
        self.add_system(FnSystem::new(name, metadata, f))
    }

    /// Registers an infallible function-backed system.
    /// The function is automatically wrapped to return `Ok(())`.
    pub fn add_fn_infallible<F>(
        &mut self,
        name: impl Into<String>,
        metadata: SystemMetadata,
        f: F,
    ) -> SchedulerResult<()>
    where
        F: Fn(&TickContext) + Send + Sync + 'static,
    {
        self.add_fn(name, metadata, move |ctx: &TickContext| {
            f(ctx);
            Ok(())
        })
    }

    fn register(
        &mut self,
        system: Box<dyn System>,
        explicit: Option<SystemMetadata>,
    ) -> SchedulerResult<()> {
        let name = system.name().to_string();
        if self.slot_of(&name).is_some() {
            return Err(SchedulerError::DuplicateSystem { name });
        }

        let metadata = match explicit.or_else(|| system.metadata()) {
            Some(metadata) => metadata,
            None => match self.config.missing_access {
                MissingAccessPolicy::Permissive => {
                    log::warn!(
                        "system `{name}` declares no component access; scheduling it as conflict-free"
                    );
                    SystemMetadata::new(0)
                }
                MissingAccessPolicy::Exclusive => {
                    log::debug!("system `{name}` declares no component access; scheduling it alone");
                    SystemMetadata::new(0).exclusive()
                }
                MissingAccessPolicy::Reject => {
                    return Err(SchedulerError::MissingMetadata { name });
                }
            },
        };

        log::debug!(
            "registered system `{name}` (priority {}, parallel {}, {})",
            metadata.priority, metadata.parallel, metadata.access
        );

        self.systems.push(SystemEntry {
            system,
            name,
            metadata,
            enabled: true,
            stats: StatsSlot::default(),
        });
        self.stale = true;
        Ok(())
    }

    /// Removes a system and its statistics, returning it to the caller.
    pub fn remove_system(&mut self, name: &str) -> SchedulerResult<Box<dyn System>> {
        let slot = self.require_slot(name)?;
        let entry = self.systems.remove(slot);
        self.stale = true;
        log::debug!("removed system `{name}`");
        Ok(entry.system)
    }

    /// Enables or disables a system. Disabled systems are left out of the plan.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> SchedulerResult<()> {
        let slot = self.require_slot(name)?;
        let entry = &mut self.systems[slot];
        if entry.enabled != enabled {
            entry.enabled = enabled;
            self.stale = true;
        }
        Ok(())
    }

    /// Whether the named system is enabled, or `None` if it is unknown.
    pub fn is_enabled(&self, name: &str) -> Option<bool> {
        self.slot_of(name).map(|slot| self.systems[slot].enabled)
    }

    /// Metadata in effect for the named system.
    pub fn metadata_of(&self, name: &str) -> Option<SystemMetadata> {
        self.slot_of(name).map(|slot| self.systems[slot].metadata)
    }

    /// Names of all registered systems, in registration order.
    pub fn system_names(&self) -> Vec<String> {
        self.systems.iter().map(|e| e.name.clone()).collect()
    }

    /// Names of the enabled systems, in registration order.
    pub fn enabled_system_names(&self) -> Vec<String> {
        self.systems
            .iter()
            .filter(|e| e.enabled)
            .map(|e| e.name.clone())
            .collect()
    }

    /// Removes all systems and the cached plan.
    pub fn clear(&mut self) {
        self.systems.clear();
        self.plan = None;
        self.stale = true;
    }

    fn slot_of(&self, name: &str) -> Option<usize> {
        self.systems.iter().position(|e| e.name == name)
    }

    fn require_slot(&self, name: &str) -> SchedulerResult<usize> {
        self.slot_of(name)
            .ok_or_else(|| SchedulerError::UnknownSystem { name: name.to_string() })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Planning
    // ─────────────────────────────────────────────────────────────────────

    fn enabled_descriptors(&self) -> Vec<SystemDescriptor> {
        self.systems
            .iter()
            .enumerate()
            .filter(|(_, e)| e.enabled)
            .map(|(slot, e)| SystemDescriptor::new(e.name.clone(), e.metadata, slot))
            .collect()
    }

    /// Rebuilds the execution plan now, whether or not it is stale.
    pub fn rebuild(&mut self) {
        let descriptors = self.enabled_descriptors();
        let graph = build_conflicts(&descriptors);
        let plan = compute_stages(&descriptors, &graph);

        log::debug!(
            "rebuilt execution plan: {} system(s), {} conflict(s), {} stage(s)",
            descriptors.len(),
            graph.conflict_pairs().len(),
            plan.len()
        );

        self.plan = Some(plan);
        self.stale = false;
    }

    /// Ensures the plan is up to date.
    fn rebuild_if_stale(&mut self) {
        if self.is_plan_stale() {
            self.rebuild();
        }
    }

    /// Returns `true` if the next tick will rebuild the plan.
    #[inline]
    pub fn is_plan_stale(&self) -> bool {
        self.stale || self.plan.is_none()
    }

    /// The cached plan, possibly stale.
    #[inline]
    pub fn plan(&self) -> Option<&ExecutionPlan> {
        self.plan.as_ref()
    }

    /// Human-readable rendering of the cached plan. Does not rebuild.
    pub fn plan_text(&self) -> String {
        match &self.plan {
            None => "(no plan built)\n".to_string(),
            Some(plan) if self.stale => format!("(stale)\n{plan}"),
            Some(plan) => plan.to_string(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Parallelism
    // ─────────────────────────────────────────────────────────────────────

    /// Enables or disables staged parallel execution.
    ///
    /// Enabling requires an execution plan to exist: call [`rebuild`] or run a
    /// tick first.
    ///
    /// [`rebuild`]: Scheduler::rebuild
    pub fn set_parallel_enabled(&mut self, enabled: bool) -> SchedulerResult<()> {
        if enabled && self.plan.is_none() {
            return Err(SchedulerError::NoPlan);
        }
        self.parallel = enabled;
        Ok(())
    }

    /// Returns `true` if staged parallel execution is enabled.
    #[inline]
    pub fn is_parallel_enabled(&self) -> bool {
        self.parallel
    }

    /// Builds the worker pool eagerly, surfacing construction errors.
    ///
    /// Without this call the pool is built on the first staged tick, and a
    /// failure there degrades to sequential execution with a warning.
    /// Worker threads are named in profiler traces only if
    /// [`profiler::init`] ran before the pool was built.
    pub fn build_pool(&mut self) -> SchedulerResult<()> {
        if self.pool.is_some() {
            return Ok(());
        }
        let threads = self.config.resolved_worker_threads();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("stage-worker-{i}"))
            .start_handler(|i| profiler::thread_name(format!("stage-worker-{i}")))
            .build()
            .map_err(|e| SchedulerError::ThreadPool(e.to_string()))?;
        log::debug!("worker pool ready with {threads} thread(s)");
        self.pool = Some(pool);
        self.pool_failed = false;
        Ok(())
    }

    fn ensure_pool(&mut self) -> bool {
        if self.pool.is_none() && !self.pool_failed {
            if let Err(e) = self.build_pool() {
                log::warn!("{e}; falling back to sequential execution");
                self.pool_failed = true;
            }
        }
        self.pool.is_some()
    }

    /// Handle that can stop ticks between stages from another thread.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Execution
    // ─────────────────────────────────────────────────────────────────────

    /// Runs one tick.
    ///
    /// This will:
    /// 1) rebuild the execution plan if it is stale,
    /// 2) choose staged or sequential mode,
    /// 3) execute every enabled system once, isolating failures.
    ///
    /// Never fails: system failures are recorded and planning problems
    /// degrade to sequential execution.
    pub fn execute(&mut self, delta_time: f32) -> TickReport {
        self.tick += 1;
        let tick = self.tick;
        let _span = profiler::span("tick").arg("tick", Arg::U64(tick));

        self.rebuild_if_stale();

        let descriptors = self.enabled_descriptors();
        let mut anomaly = None;

        let staged = self.parallel && match self.plan.as_ref().map(|p| p.validate(&descriptors)) {
            Some(Ok(())) => true,
            Some(Err(found)) => {
                log::warn!("tick {tick}: invalid execution plan ({found}); running sequentially");
                anomaly = Some(found);
                false
            }
            None => false,
        };

        let staged = staged && !descriptors.is_empty() && self.ensure_pool();

        let mut report = if staged {
            self.run_staged(tick, delta_time)
        } else {
            self.run_sequential(tick, delta_time, &descriptors)
        };
        report.anomaly = anomaly;

        if !report.failed.is_empty() {
            log::debug!("tick {tick}: {} of {} system(s) failed", report.failed.len(), report.invoked.len());
        }
        report
    }

    fn run_staged(&self, tick: Tick, delta_time: f32) -> TickReport {
        let mut report = TickReport::new(tick, ExecutionMode::Staged);
        let (Some(plan), Some(pool)) = (self.plan.as_ref(), self.pool.as_ref()) else {
            return report;
        };

        for (stage_index, stage) in plan.stages().iter().enumerate() {
            if self.shutdown.is_requested() {
                log::info!("tick {tick}: shutdown requested, stopping before stage {stage_index}");
                report.aborted = true;
                break;
            }

            let _stage_span = profiler::span(format!("stage {stage_index}"))
                .arg("systems", Arg::U64(stage.len() as u64));
            let ctx = TickContext { delta_time, tick, stage: Some(stage_index) };

            match stage.systems.as_slice() {
                [] => continue,
                [only] => report.note(self.invoke(only.slot, &ctx)),
                members => {
                    // install + par_iter returns only after every member is done
                    let outcomes: Vec<Invocation> = pool.install(|| {
                        members
                            .par_iter()
                            .map(|member| self.invoke(member.slot, &ctx))
                            .collect()
                    });
                    outcomes.into_iter().for_each(|o| report.note(o));
                }
            }
            report.stages_run += 1;
        }
        report
    }

    fn run_sequential(&self, tick: Tick, delta_time: f32, descriptors: &[SystemDescriptor]) -> TickReport {
        let mut report = TickReport::new(tick, ExecutionMode::Sequential);
        let ctx = TickContext { delta_time, tick, stage: None };

        for index in priority_order(descriptors) {
            if self.shutdown.is_requested() {
                log::info!("tick {tick}: shutdown requested, stopping sequential run");
                report.aborted = true;
                break;
            }
            report.note(self.invoke(descriptors[index].slot, &ctx));
            report.stages_run += 1;
        }
        report
    }

    /// Runs one system with timing and failure isolation.
    fn invoke(&self, slot: usize, ctx: &TickContext) -> Invocation {
        let entry = &self.systems[slot];
        let _span = profiler::span(entry.name.clone());

        let start = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| entry.system.run(ctx)))
            .unwrap_or_else(|payload| Err(SystemError::Panicked(panic_message(payload.as_ref()))));
        let elapsed = start.elapsed();

        if let Err(e) = &outcome {
            match ctx.stage {
                Some(stage) => log::error!(
                    "system `{}` failed in stage {stage} of tick {}: {e}", entry.name, ctx.tick
                ),
                None => log::error!(
                    "system `{}` failed in sequential tick {}: {e}", entry.name, ctx.tick
                ),
            }
        }

        entry.stats.record(elapsed, &outcome, ctx.tick, self.config.rolling_window);
        Invocation { name: entry.name.clone(), ok: outcome.is_ok() }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Diagnostics
    // ─────────────────────────────────────────────────────────────────────

    /// Statistics of one system.
    pub fn stats_for(&self, name: &str) -> Option<SystemStats> {
        self.slot_of(name).map(|slot| self.systems[slot].stats.snapshot())
    }

    /// Statistics of every registered system. Systems that have never run
    /// report zeroed counters.
    pub fn stats_snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            tick: self.tick,
            systems: self
                .systems
                .iter()
                .map(|e| (e.name.clone(), e.stats.snapshot()))
                .collect(),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
