//! System Abstractions and Access Metadata
//!
//! This module defines the *unit of scheduling* used by the engine.
//!
//! A **system** is a unit of per-tick update logic that:
//! - declares which component kinds it reads and writes,
//! - declares a priority (lower runs earlier),
//! - declares whether it may share a stage with other systems,
//! - is invoked once per tick with a [`TickContext`].
//!
//! ## Access Declaration
//!
//! Declarations are carried by [`SystemMetadata`], which wraps an
//! [`AccessSets`] pair of component [`Signature`]s. Two systems conflict when
//! either one writes a component the other reads or writes; read/read sharing
//! never conflicts. A system whose metadata is marked
//! [`exclusive`](SystemMetadata::exclusive) conflicts with every other system.
//!
//! Metadata is obtained by ordinary trait dispatch: a system either reports
//! its own via [`System::metadata`] or has it supplied at registration time.
//! Systems that report nothing are handled according to the scheduler's
//! [`MissingAccessPolicy`](crate::engine::config::MissingAccessPolicy).
//!
//! ## Function-backed Systems
//!
//! [`FnSystem`] wraps a closure so that small systems do not need a dedicated
//! type. It is fully schedulable and parallel-safe.
//!
//! ## Thread Safety
//!
//! All systems must be `Send + Sync`: members of a multi-system stage run on
//! worker threads. The scheduler does not lock the data a system touches;
//! the declared access sets are the only thing keeping concurrent systems
//! apart, so they must be complete.

use std::fmt;
use std::sync::Arc;

use crate::engine::component::{component_id_of, component_name};
use crate::engine::error::SystemResult;
use crate::engine::types::{ComponentID, Priority, Signature, Tick};


/// Declares the component access set of a system.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct AccessSets {
    /// Components read by the system.
    pub read: Signature,
    /// Components written by the system.
    pub write: Signature,
}

impl AccessSets {
    /// Returns `true` if this access set conflicts with another.
    #[inline]
    pub fn conflicts_with(&self, other: &AccessSets) -> bool {
        // Conflicts if: (W ∩ W) or (W ∩ R) or (R ∩ W)
        self.write.intersects(&other.write)
            || self.write.intersects(&other.read)
            || self.read.intersects(&other.write)
    }

    /// Returns `true` if nothing is read or written.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.read.is_empty() && self.write.is_empty()
    }

    /// Adds a read of component type `T`.
    pub fn reads<T: 'static>(mut self) -> Self {
        self.read.set(component_id_of::<T>());
        self
    }

    /// Adds a write of component type `T`.
    pub fn writes<T: 'static>(mut self) -> Self {
        self.write.set(component_id_of::<T>());
        self
    }

    /// Adds a read of an already-resolved component ID.
    pub fn read_id(mut self, component_id: ComponentID) -> Self {
        self.read.set(component_id);
        self
    }

    /// Adds a write of an already-resolved component ID.
    pub fn write_id(mut self, component_id: ComponentID) -> Self {
        self.write.set(component_id);
        self
    }
}

impl fmt::Display for AccessSets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |s: &Signature| {
            s.iterate_over_components()
                .map(component_name)
                .collect::<Vec<_>>()
                .join(", ")
        };
        write!(f, "reads [{}] writes [{}]", names(&self.read), names(&self.write))
    }
}

/// Everything the scheduler needs to know about a system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SystemMetadata {
    /// Declared component access.
    pub access: AccessSets,

    /// Lower values are scheduled earlier.
    pub priority: Priority,

    /// Whether the system may share a stage with other systems.
    pub parallel: bool,
}

impl SystemMetadata {
    /// Metadata with the given priority, empty access and parallel execution allowed.
    pub fn new(priority: Priority) -> Self {
        Self { access: AccessSets::default(), priority, parallel: true }
    }

    /// Replaces the access sets.
    pub fn with_access(mut self, access: AccessSets) -> Self {
        self.access = access;
        self
    }

    /// Adds a read of component type `T`.
    pub fn reads<T: 'static>(mut self) -> Self {
        self.access = self.access.reads::<T>();
        self
    }

    /// Adds a write of component type `T`.
    pub fn writes<T: 'static>(mut self) -> Self {
        self.access = self.access.writes::<T>();
        self
    }

    /// Forbids sharing a stage with any other system.
    pub fn exclusive(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Conflict predicate between two systems.
    ///
    /// Symmetric. A non-parallel system conflicts with everything.
    #[inline]
    pub fn conflicts_with(&self, other: &SystemMetadata) -> bool {
        !self.parallel || !other.parallel || self.access.conflicts_with(&other.access)
    }
}

/// Per-invocation context handed to a running system.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickContext {
    /// Seconds elapsed since the previous tick, as supplied by the game loop.
    pub delta_time: f32,

    /// Tick number, starting at 1 for the first `execute` call.
    pub tick: Tick,

    /// Index of the stage the system runs in, or `None` in sequential mode.
    pub stage: Option<usize>,
}

/// A unit of per-tick logic.
///
/// Systems must be `Send + Sync` so they can be executed on worker threads.
pub trait System: Send + Sync {
    /// Stable, unique name. Used as the system's identity.
    fn name(&self) -> &str;

    /// Self-declared scheduling metadata. `None` if the system predates
    /// access declaration.
    fn metadata(&self) -> Option<SystemMetadata> {
        None
    }

    /// Executes the system once.
    fn run(&self, ctx: &TickContext) -> SystemResult;
}

/// Shared handle: lets the owner keep an `Arc` to a system after registering
/// a clone of it with the scheduler.
impl<S: System + ?Sized> System for Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn metadata(&self) -> Option<SystemMetadata> {
        (**self).metadata()
    }

    fn run(&self, ctx: &TickContext) -> SystemResult {
        (**self).run(ctx)
    }
}

/// A concrete [`System`] backed by a function or closure.
pub struct FnSystem<F>
where
    F: Fn(&TickContext) -> SystemResult + Send + Sync + 'static,
{
    name: String,
    metadata: Option<SystemMetadata>,
    f: F,
}

impl<F> FnSystem<F>
where
    F: Fn(&TickContext) -> SystemResult + Send + Sync + 'static,
{
    /// Creates a function-backed system with declared metadata.
    pub fn new(name: impl Into<String>, metadata: SystemMetadata, f: F) -> Self {
        Self { name: name.into(), metadata: Some(metadata), f }
    }

    /// Creates a function-backed system that declares no metadata.
    pub fn undeclared(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), metadata: None, f }
    }
}

impl<F> System for FnSystem<F>
where
    F: Fn(&TickContext) -> SystemResult + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> Option<SystemMetadata> {
        self.metadata
    }

    fn run(&self, ctx: &TickContext) -> SystemResult {
        (self.f)(ctx)
    }
}
