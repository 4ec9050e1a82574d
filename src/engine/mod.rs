//! # Engine Module
//!
//! Scheduling engine implementation.
//!
//! This module contains the building blocks of the scheduler:
//! - Component identities and access signatures
//! - System metadata and the `System` trait
//! - Conflict graph construction
//! - Stage planning
//! - Tick execution and per-system statistics
//!
//! Public API exposure is controlled by `lib.rs`.

pub mod types;
pub mod error;
pub mod config;
pub mod component;
pub mod systems;
pub mod graph;
pub mod planner;
pub mod stats;
pub mod scheduler;
