//! # Component Kind Registry
//!
//! This module provides a process-wide registry that assigns stable
//! `ComponentID` values to Rust component types so that systems can declare
//! their access by type (`reads::<Position>()`) while the scheduler reasons
//! about compact bitsets.
//!
//! ## Design
//! - Components are registered once and assigned a compact `ComponentID` in
//!   `[0, COMPONENT_CAP)`.
//! - Registration is idempotent: registering a type twice returns the
//!   original ID.
//! - [`component_id_of`] registers on first use, so access declarations never
//!   require a separate setup step.
//!
//! ## Invariants
//! - `ComponentID` values are unique and stable for the lifetime of the process.
//! - Every ID handed out has a matching [`ComponentDesc`].
//!
//! ## Concurrency
//! The registry is protected by an `RwLock`: lookups take the read lock and
//! only first-time registrations take the write lock.

use std::{
    any::{TypeId, type_name},
    collections::HashMap,
    sync::{OnceLock, PoisonError, RwLock},
};

use crate::engine::types::{ComponentID, COMPONENT_CAP};


/// Describes a registered component kind.
///
/// `ComponentDesc` is `Copy` and is used by diagnostics to print readable
/// access sets and conflict reasons.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ComponentDesc {
    /// Runtime identifier assigned to this component kind.
    pub component_id: ComponentID,

    /// Rust type name.
    pub name: &'static str,

    /// Runtime `TypeId` of the component.
    pub type_id: TypeId,
}

impl ComponentDesc {
    /// Constructs a descriptor for type `T` with the given ID.
    #[inline]
    pub fn of<T: 'static>(component_id: ComponentID) -> Self {
        Self {
            component_id,
            name: type_name::<T>(),
            type_id: TypeId::of::<T>(),
        }
    }

    /// Returns the last path segment of the type name (`Position` rather than
    /// `game::physics::Position`).
    pub fn short_name(&self) -> &'static str {
        short_type_name(self.name)
    }
}

/// Global mapping between Rust component types and compact `ComponentID` values.
///
/// - `by_type` maps `TypeId -> ComponentID`.
/// - `by_id` stores `ComponentDesc` indexed by `ComponentID`.
pub struct ComponentRegistry {
    by_type: HashMap<TypeId, ComponentID>,
    by_id: Vec<ComponentDesc>,
}

static REGISTRY: OnceLock<RwLock<ComponentRegistry>> = OnceLock::new();

fn component_registry() -> &'static RwLock<ComponentRegistry> {
    REGISTRY.get_or_init(|| {
        RwLock::new(ComponentRegistry {
            by_type: HashMap::new(),
            by_id: Vec::with_capacity(COMPONENT_CAP),
        })
    })
}

impl ComponentRegistry {
    /// Registers component type `T` and returns its assigned `ComponentID`.
    ///
    /// ## Panics
    /// Panics if `COMPONENT_CAP` is exceeded.
    pub fn register<T: 'static>(&mut self) -> ComponentID {
        let type_id = TypeId::of::<T>();
        if let Some(&existing) = self.by_type.get(&type_id) {
            return existing;
        }

        assert!(self.by_id.len() < COMPONENT_CAP, "Exceeded configured component capacity.");
        let id = self.by_id.len() as ComponentID;
        self.by_type.insert(type_id, id);
        self.by_id.push(ComponentDesc::of::<T>(id));
        id
    }

    /// Returns the `ComponentID` for `T`, if registered.
    pub fn id_of<T: 'static>(&self) -> Option<ComponentID> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Returns the descriptor for a `ComponentID`, if registered.
    pub fn description(&self, component_id: ComponentID) -> Option<&ComponentDesc> {
        self.by_id.get(component_id as usize)
    }

    /// Number of registered component kinds.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Returns `true` if nothing has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Registers component type `T` in the global registry and returns its `ComponentID`.
///
/// ## Panics
/// Panics if `COMPONENT_CAP` is exceeded.
pub fn register_component<T: 'static>() -> ComponentID {
    if let Some(id) = registered_id_of::<T>() {
        return id;
    }
    component_registry()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .register::<T>()
}

/// Returns the `ComponentID` for `T`, registering it on first use.
pub fn component_id_of<T: 'static>() -> ComponentID {
    register_component::<T>()
}

/// Returns the `ComponentID` for `T` only if it was already registered.
pub fn registered_id_of<T: 'static>() -> Option<ComponentID> {
    component_registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .id_of::<T>()
}

/// Returns a copy of the descriptor for `component_id`, if registered.
pub fn component_description(component_id: ComponentID) -> Option<ComponentDesc> {
    component_registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .description(component_id)
        .copied()
}

/// Short, human-readable name for `component_id`, falling back to `#<id>`
/// for IDs that were never registered.
pub fn component_name(component_id: ComponentID) -> String {
    match component_description(component_id) {
        Some(desc) => desc.short_name().to_string(),
        None => format!("#{component_id}"),
    }
}

fn short_type_name(full: &'static str) -> &'static str {
    // Keep generic arguments intact: only strip the path before the first `<`.
    let head_end = full.find('<').unwrap_or(full.len());
    let start = full[..head_end].rfind("::").map(|i| i + 2).unwrap_or(0);
    &full[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Position;
    struct Velocity;
    struct Wrapper<T>(#[allow(dead_code)] T);

    #[test]
    fn registration_is_idempotent() {
        let a = register_component::<Position>();
        let b = register_component::<Position>();
        assert_eq!(a, b);
        assert_eq!(component_id_of::<Position>(), a);
    }

    #[test]
    fn distinct_types_get_distinct_ids() {
        assert_ne!(component_id_of::<Position>(), component_id_of::<Velocity>());
    }

    #[test]
    fn description_names_the_type() {
        let id = component_id_of::<Velocity>();
        let desc = component_description(id).unwrap();
        assert_eq!(desc.component_id, id);
        assert_eq!(desc.short_name(), "Velocity");
        assert_eq!(component_name(id), "Velocity");
    }

    #[test]
    fn short_name_keeps_generics() {
        let id = component_id_of::<Wrapper<Position>>();
        assert!(component_name(id).starts_with("Wrapper<"));
    }

    #[test]
    fn unknown_id_has_placeholder_name() {
        assert_eq!(component_name(COMPONENT_CAP as ComponentID - 1).chars().next(), Some('#'));
    }
}
