/// Chrome Trace (flame-style) scheduler profiler.
///
/// This module provides a **feature-gated, zero-overhead (when disabled)**
/// profiling API. When enabled, the scheduler records a span per tick, per
/// stage and per system invocation, and [`profiler::shutdown`] emits a
/// **Chrome Trace Event JSON** file that can be inspected using:
///
/// - `chrome://tracing`
/// - <https://ui.perfetto.dev>
///
/// ## Feature flag
///
/// ```bash
/// cargo test --features profiling
/// ```
///
/// When the feature is disabled, all profiling calls compile to no-ops.
///
/// ## Usage
///
/// ```no_run
/// use tick_scheduler::profiler;
///
/// profiler::init("profile/trace.json");
///
/// {
///     let _g = profiler::span("frame");
///     // scheduler.execute(dt);
/// }
///
/// profiler::shutdown();
/// ```
///
/// Worker threads get stable logical thread IDs, so concurrent members of a
/// stage appear on separate tracks.
///
/// ## Ordering
///
/// Worker tracks are named (`stage-worker-N`) when the scheduler's pool
/// starts its threads, and names are only recorded while the profiler is
/// active. Call [`profiler::init`] before the first staged tick, or before
/// [`Scheduler::build_pool`](crate::Scheduler::build_pool), otherwise worker
/// tracks show bare thread IDs. Spans themselves are recorded either way.

pub mod profiler;
