//! Trestle - An archetype query cache core for entity-component systems
//!
//! This crate re-exports all layers of the Trestle system for convenient
//! access. For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 2: trestle_query      — Terms, uncached evaluation, the query cache
//! Layer 1: trestle_storage    — Archetype tables, world state, monitors, events
//! Layer 0: trestle_foundation — Core ids (Entity, Id) and errors
//! ```

pub use trestle_foundation as foundation;
pub use trestle_query as query;
pub use trestle_storage as storage;
