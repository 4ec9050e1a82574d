//! # Tick Scheduler
//!
//! Dependency-aware parallel system scheduler for entity-component update
//! loops.
//!
//! ## Design Goals
//! - Declared component access drives parallelism
//! - Deterministic, priority-ordered stages
//! - Parallel CPU execution with a sequential fallback
//! - One failing system never aborts a tick
//!
//! This crate builds as both:
//! - `rlib` (for Rust usage & integration tests)
//! - `cdylib` (for FFI / DLL usage)

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]
#![deny(dead_code)]

pub mod engine;
pub mod profiling;

pub use profiling::profiler;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

// Scheduling

pub use engine::scheduler::{
    Scheduler,
    ShutdownHandle,
    TickReport,
    ExecutionMode,
};

pub use engine::systems::{
    System,
    FnSystem,
    SystemMetadata,
    AccessSets,
    TickContext,
};

pub use engine::planner::{
    ExecutionPlan,
    Stage,
    PlannedSystem,
};

pub use engine::stats::{
    SystemStats,
    StatsSnapshot,
};

pub use engine::config::{
    SchedulerConfig,
    MissingAccessPolicy,
};

// Components

pub use engine::component::{
    register_component,
    component_id_of,
    component_name,
};

pub use engine::error::{
    SchedulerResult,
    SchedulerError,
    SystemResult,
    SystemError,
    PlanAnomaly,
};

pub use engine::types::{
    ComponentID,
    Priority,
    Signature,
    Tick,
};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude (Optional but recommended)
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used scheduler types.
///
/// Import with:
/// ```rust
/// use tick_scheduler::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Scheduler,
        SchedulerConfig,
        System,
        FnSystem,
        SystemMetadata,
        AccessSets,
        TickContext,
        SystemResult,
        SystemError,
        register_component,
        component_id_of,
    };
}
