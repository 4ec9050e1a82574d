//! Error types for registration, planning and system execution.
//!
//! The scheduler separates failures by **who pays for them**:
//!
//! * [`SchedulerError`]: configuration and registration mistakes made by the
//!   caller (duplicate names, unknown systems, enabling parallel execution
//!   with no plan). Returned from the offending call; scheduler state is left
//!   exactly as it was before the call.
//! * [`SystemError`]: a failure raised by a system body, either as an `Err`
//!   return or as a caught panic. Never escapes a tick: the executor logs it,
//!   records it in the system's statistics and continues with the remaining
//!   systems.
//! * [`PlanAnomaly`]: a logic inconsistency detected in a computed plan. The
//!   executor downgrades that tick to sequential execution and logs a warning.
//!
//! ## Display vs. Debug
//! * `Display` is short and lowercase, suitable for log lines.
//! * `Debug` (derived) retains full structure for diagnostics.

use thiserror::Error;


/// Convenience alias for results of scheduler-level operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Result type returned by a system body.
pub type SystemResult = Result<(), SystemError>;

/// Configuration and registration errors.
///
/// Every variant is returned before any state is modified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// A system with the same name is already registered.
    #[error("system `{name}` is already registered")]
    DuplicateSystem {
        /// Name of the rejected system.
        name: String,
    },

    /// The named system is not registered.
    #[error("no system named `{name}` is registered")]
    UnknownSystem {
        /// Name that was looked up.
        name: String,
    },

    /// The system declared no access metadata and the configured policy
    /// rejects such systems.
    #[error("system `{name}` declares no component access")]
    MissingMetadata {
        /// Name of the rejected system.
        name: String,
    },

    /// Parallel execution was requested before any execution plan exists.
    #[error("cannot enable parallel execution before an execution plan has been built")]
    NoPlan,

    /// The worker pool could not be created.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),
}

/// Failure raised by a single system invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SystemError {
    /// The system returned an error.
    #[error("{0}")]
    Failed(String),

    /// The system panicked; the payload message is preserved when it is a string.
    #[error("panicked: {0}")]
    Panicked(String),
}

impl From<String> for SystemError {
    fn from(message: String) -> Self { SystemError::Failed(message) }
}

impl From<&str> for SystemError {
    fn from(message: &str) -> Self { SystemError::Failed(message.to_string()) }
}

/// Inconsistency found while validating an execution plan.
///
/// These indicate bookkeeping bugs rather than user mistakes; the executor
/// never runs a plan that fails validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanAnomaly {
    /// Systems are enabled but every stage of the plan is empty.
    #[error("plan has {stages} empty stage(s) but {expected} enabled system(s)")]
    EmptyStages {
        /// Number of stages in the plan.
        stages: usize,
        /// Number of enabled systems the plan should cover.
        expected: usize,
    },

    /// An enabled system does not appear in any stage.
    #[error("system `{name}` is missing from the plan")]
    Missing {
        /// Name of the uncovered system.
        name: String,
    },

    /// A system appears in more than one stage, or more than once in a stage.
    #[error("system `{name}` is scheduled more than once")]
    Duplicated {
        /// Name of the repeated system.
        name: String,
    },

    /// The plan references a system that is not enabled or not registered.
    #[error("plan references unknown system `{name}`")]
    Unknown {
        /// Name that could not be resolved.
        name: String,
    },
}
