//! Stage planning.
//!
//! Converts the conflict graph into an ordered list of [`Stage`]s, where every
//! stage is a set of mutually non-conflicting systems that may run
//! concurrently.
//!
//! ## Algorithm
//! Systems are processed in priority order (ascending priority, then name)
//! and assigned greedily:
//! * A system is placed in the earliest stage that comes after every stage
//!   already holding a system it conflicts with.
//! * If no such stage exists, a new stage is appended.
//! * A non-parallel system always gets a freshly appended stage of its own.
//!   Every later system conflicts with it, so nothing joins that stage.
//!
//! ## Determinism
//! The output depends only on the names and metadata of the input, never on
//! its order, so identical registrations always produce identical plans.
//!
//! ## Complexity
//! * O(n²) over the conflict matrix in the worst case
//! * Expected to be small for typical update loops

use std::collections::HashSet;
use std::fmt;

use crate::engine::error::PlanAnomaly;
use crate::engine::graph::{priority_order, ConflictGraph, SystemDescriptor};
use crate::engine::types::Priority;


/// A system placed in a stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedSystem {
    /// Unique system name.
    pub name: String,

    /// Index of the system in the scheduler's table.
    pub slot: usize,

    /// Priority the system was planned with.
    pub priority: Priority,
}

/// A group of systems that can be executed in parallel.
///
/// ## Invariants
/// * All systems within a `Stage` are pairwise non-conflicting
/// * An exclusive stage holds exactly one system
///
/// Stages themselves must be executed sequentially.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Stage {
    /// Systems scheduled in this stage, in priority order.
    pub systems: Vec<PlannedSystem>,
    exclusive: bool,
    members: Vec<usize>,
}

impl Stage {
    fn open(exclusive: bool) -> Self {
        Self { systems: Vec::new(), exclusive, members: Vec::new() }
    }

    fn push(&mut self, index: usize, descriptor: &SystemDescriptor) {
        self.members.push(index);
        self.systems.push(PlannedSystem {
            name: descriptor.name.clone(),
            slot: descriptor.slot,
            priority: descriptor.metadata.priority,
        });
    }

    fn can_accept(&self, index: usize, graph: &ConflictGraph) -> bool {
        !self.exclusive && self.members.iter().all(|&other| !graph.conflicts(index, other))
    }

    /// Number of systems in the stage.
    #[inline]
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    /// Returns `true` if the stage holds no systems.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Returns `true` if the stage was opened for a non-parallel system.
    #[inline]
    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    /// Names of the systems in this stage.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.systems.iter().map(|s| s.name.as_str())
    }
}

/// Ordered list of stages covering every enabled system exactly once.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionPlan {
    stages: Vec<Stage>,
}

/// Partitions `systems` into ordered execution stages.
///
/// `graph` must have been built from the same `systems` slice.
pub fn compute_stages(systems: &[SystemDescriptor], graph: &ConflictGraph) -> ExecutionPlan {
    debug_assert_eq!(systems.len(), graph.len());

    let mut stages: Vec<Stage> = Vec::new();
    let mut stage_of: Vec<Option<usize>> = vec![None; systems.len()];

    for index in priority_order(systems) {
        let descriptor = &systems[index];

        if !descriptor.metadata.parallel {
            let mut stage = Stage::open(true);
            stage.push(index, descriptor);
            stage_of[index] = Some(stages.len());
            stages.push(stage);
            continue;
        }

        let earliest = graph
            .predecessors(index)
            .filter_map(|other| stage_of[other])
            .map(|s| s + 1)
            .max()
            .unwrap_or(0);

        let target = (earliest..stages.len()).find(|&s| stages[s].can_accept(index, graph));

        let target = match target {
            Some(s) => s,
            None => {
                stages.push(Stage::open(false));
                stages.len() - 1
            }
        };
        stages[target].push(index, descriptor);
        stage_of[index] = Some(target);
    }

    ExecutionPlan { stages }
}

impl ExecutionPlan {
    /// Builds a plan from explicit stages. The scheduler always plans through
    /// [`compute_stages`].
    #[cfg(test)]
    pub(crate) fn from_stages(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    /// The stages, in execution order.
    #[inline]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Number of stages.
    #[inline]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns `true` if the plan has no stages.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Total number of planned systems across all stages.
    pub fn system_count(&self) -> usize {
        self.stages.iter().map(Stage::len).sum()
    }

    /// Index of the stage holding `name`, if planned.
    pub fn stage_of(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|stage| stage.names().any(|n| n == name))
    }

    /// Checks that the plan partitions exactly the `expected` systems.
    pub fn validate(&self, expected: &[SystemDescriptor]) -> Result<(), PlanAnomaly> {
        if !expected.is_empty() && self.stages.iter().all(Stage::is_empty) {
            return Err(PlanAnomaly::EmptyStages {
                stages: self.stages.len(),
                expected: expected.len(),
            });
        }

        let known: HashSet<&str> = expected.iter().map(|d| d.name.as_str()).collect();
        let mut seen: HashSet<&str> = HashSet::with_capacity(expected.len());

        for name in self.stages.iter().flat_map(Stage::names) {
            if !known.contains(name) {
                return Err(PlanAnomaly::Unknown { name: name.to_string() });
            }
            if !seen.insert(name) {
                return Err(PlanAnomaly::Duplicated { name: name.to_string() });
            }
        }

        match expected.iter().find(|d| !seen.contains(d.name.as_str())) {
            Some(missing) => Err(PlanAnomaly::Missing { name: missing.name.clone() }),
            None => Ok(()),
        }
    }
}

impl fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.stages.is_empty() {
            return writeln!(f, "(empty plan)");
        }
        for (index, stage) in self.stages.iter().enumerate() {
            let names: Vec<&str> = stage.names().collect();
            let marker = if stage.exclusive { " (exclusive)" } else { "" };
            writeln!(f, "stage {index}{marker}: [{}]", names.join(", "))?;
        }
        Ok(())
    }
}
