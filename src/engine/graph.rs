//! Conflict graph between registered systems.
//!
//! The graph is rebuilt only when the execution plan is rebuilt, never per
//! tick. Construction tests every unordered pair of systems once, which is
//! O(n²) in the number of systems; system counts are in the tens, so a dense
//! adjacency matrix is both the simplest and the fastest representation.
//!
//! ## Ordering
//!
//! Conflict testing is symmetric and makes no ordering decision by itself.
//! Ordering comes from [`priority_order`]: systems sorted by ascending
//! priority, ties broken by name. Orienting every conflict edge along that
//! order yields the partial order the stage planner must respect: of two
//! conflicting systems, the one earlier in priority order always runs in an
//! earlier stage.

use std::cmp::Ordering;

use crate::engine::systems::SystemMetadata;


/// Planning snapshot of one enabled system.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SystemDescriptor {
    /// Unique system name.
    pub name: String,

    /// Scheduling metadata in effect for the system.
    pub metadata: SystemMetadata,

    /// Index of the system in the scheduler's table.
    pub slot: usize,
}

impl SystemDescriptor {
    /// Creates a descriptor.
    pub fn new(name: impl Into<String>, metadata: SystemMetadata, slot: usize) -> Self {
        Self { name: name.into(), metadata, slot }
    }
}

/// Deterministic scheduling order: ascending priority, then ascending name.
///
/// Returns indices into `systems`.
pub fn priority_order(systems: &[SystemDescriptor]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..systems.len()).collect();
    order.sort_by(|&a, &b| compare_priority(&systems[a], &systems[b]));
    order
}

fn compare_priority(a: &SystemDescriptor, b: &SystemDescriptor) -> Ordering {
    a.metadata
        .priority
        .cmp(&b.metadata.priority)
        .then_with(|| a.name.cmp(&b.name))
}

/// Symmetric conflict relation over a fixed list of systems.
///
/// Node `i` corresponds to `systems[i]` of the slice the graph was built from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConflictGraph {
    len: usize,
    matrix: Vec<bool>,
    rank: Vec<usize>,
}

/// Computes pairwise conflicts between `systems`.
pub fn build_conflicts(systems: &[SystemDescriptor]) -> ConflictGraph {
    let len = systems.len();
    let mut matrix = vec![false; len * len];

    for a in 0..len {
        for b in (a + 1)..len {
            if systems[a].metadata.conflicts_with(&systems[b].metadata) {
                matrix[a * len + b] = true;
                matrix[b * len + a] = true;
            }
        }
    }

    let mut rank = vec![0; len];
    for (position, index) in priority_order(systems).into_iter().enumerate() {
        rank[index] = position;
    }

    ConflictGraph { len, matrix, rank }
}

impl ConflictGraph {
    /// Number of nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the graph has no nodes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `true` if systems `a` and `b` conflict. Never true for `a == b`.
    #[inline]
    pub fn conflicts(&self, a: usize, b: usize) -> bool {
        a != b && self.matrix[a * self.len + b]
    }

    /// All systems conflicting with `a`, ascending index.
    pub fn neighbors(&self, a: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(move |&b| self.conflicts(a, b))
    }

    /// Conflicting systems that precede `a` in priority order.
    pub fn predecessors(&self, a: usize) -> impl Iterator<Item = usize> + '_ {
        self.neighbors(a).filter(move |&b| self.rank[b] < self.rank[a])
    }

    /// Returns `true` if `a` comes before `b` in priority order.
    #[inline]
    pub fn precedes(&self, a: usize, b: usize) -> bool {
        self.rank[a] < self.rank[b]
    }

    /// Every conflicting unordered pair `(a, b)` with `a < b`.
    pub fn conflict_pairs(&self) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for a in 0..self.len {
            for b in (a + 1)..self.len {
                if self.matrix[a * self.len + b] {
                    pairs.push((a, b));
                }
            }
        }
        pairs
    }
}
