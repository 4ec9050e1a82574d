//! Core Scheduler Types and Identifiers
//!
//! This module defines the **small, copyable identifiers and bitsets** shared
//! by every part of the scheduler: the component registry, access
//! declarations, the conflict graph, the stage planner and the executor.
//!
//! ## Design Philosophy
//!
//! - **Stable numeric identifiers** for component kinds,
//! - **Bitset-based signatures** so that conflict tests are a handful of
//!   word-wise `AND`s,
//! - **Explicit access declaration** rather than runtime discovery.
//!
//! ## Component Signatures
//!
//! Component kinds are identified by compact [`ComponentID`] values and
//! grouped into [`Signature`] bitsets. A system's read set and write set are
//! each one `Signature`; two systems conflict when a write set of one
//! intersects either set of the other.
//!
//! Signatures:
//!
//! - are fixed-size arrays of `u64`,
//! - never allocate,
//! - support fast intersection and union,
//! - allow efficient iteration over set bits for diagnostics.

/// Unique identifier for a component kind.
pub type ComponentID = u16;

/// Scheduling priority of a system. Lower values run earlier.
pub type Priority = i32;

/// Monotonic tick counter, incremented once per `execute` call.
pub type Tick = u64;

/// Maximum number of registered component kinds.
pub const COMPONENT_CAP: usize = 256;
/// Number of `u64` words required to represent a full component signature.
pub const SIGNATURE_SIZE: usize = COMPONENT_CAP.div_ceil(64);

/// Bitset representing a set of component kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Signature {
    /// Packed component bitset.
    pub components: [u64; SIGNATURE_SIZE],
}

impl Default for Signature {
    fn default() -> Self {
        Self {
            components: [0u64; SIGNATURE_SIZE],
        }
    }
}

impl Signature {
    /// Sets the bit corresponding to `component_id`.
    #[inline]
    pub fn set(&mut self, component_id: ComponentID) {
        let index = (component_id as usize) / 64;
        let bits = (component_id as usize) % 64;
        self.components[index] |= 1u64 << bits;
    }

    /// Clears the bit corresponding to `component_id`.
    #[inline]
    pub fn clear(&mut self, component_id: ComponentID) {
        let index = (component_id as usize) / 64;
        let bits = (component_id as usize) % 64;
        self.components[index] &= !(1u64 << bits);
    }

    /// Returns `true` if `component_id` is present in this signature.
    #[inline]
    pub fn has(&self, component_id: ComponentID) -> bool {
        let index = (component_id as usize) / 64;
        let bits = (component_id as usize) % 64;
        (self.components[index] >> bits) & 1 == 1
    }

    /// Returns `true` if no component is set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.components.iter().all(|&word| word == 0)
    }

    /// Returns `true` if the two signatures share at least one component.
    #[inline]
    pub fn intersects(&self, other: &Signature) -> bool {
        self.components
            .iter()
            .zip(other.components.iter())
            .any(|(a, b)| (a & b) != 0)
    }

    /// Merges every component of `other` into `self`.
    #[inline]
    pub fn union_with(&mut self, other: &Signature) {
        for (d, s) in self.components.iter_mut().zip(other.components.iter()) {
            *d |= *s;
        }
    }

    /// Number of components set.
    #[inline]
    pub fn len(&self) -> usize {
        self.components.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Iterates over all component IDs set in this signature, ascending.
    pub fn iterate_over_components(&self) -> impl Iterator<Item = ComponentID> + '_ {
        self.components
            .iter()
            .enumerate()
            .flat_map(|(word_index, &word)| {
                let base = word_index * 64;
                let mut bits = word;
                std::iter::from_fn(move || {
                    if bits == 0 {
                        return None;
                    }
                    let tz = bits.trailing_zeros() as usize;
                    bits &= bits - 1;
                    Some((base + tz) as ComponentID)
                })
            })
    }
}

/// Builds a component signature from a list of component IDs.
pub fn build_signature(component_ids: &[ComponentID]) -> Signature {
    let mut signature = Signature::default();
    for &component_id in component_ids { signature.set(component_id); }
    signature
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_has_clear() {
        let mut s = Signature::default();
        assert!(s.is_empty());
        s.set(3);
        s.set(130);
        assert!(s.has(3) && s.has(130));
        assert!(!s.has(4));
        assert_eq!(s.len(), 2);
        s.clear(3);
        assert!(!s.has(3));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn intersects_across_words() {
        let a = build_signature(&[1, 200]);
        let b = build_signature(&[200]);
        let c = build_signature(&[2, 65]);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(!Signature::default().intersects(&a));
    }

    #[test]
    fn iteration_is_ascending() {
        let s = build_signature(&[190, 0, 64, 7]);
        let ids: Vec<ComponentID> = s.iterate_over_components().collect();
        assert_eq!(ids, vec![0, 7, 64, 190]);
    }

    #[test]
    fn union_merges_bits() {
        let mut a = build_signature(&[1]);
        a.union_with(&build_signature(&[2, 100]));
        assert_eq!(a, build_signature(&[1, 2, 100]));
    }
}
