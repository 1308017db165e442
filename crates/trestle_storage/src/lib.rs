//! Archetype tables, world state, and structural-change plumbing for Trestle.
//!
//! This crate provides:
//! - [`Table`] - Archetype storage with a sorted type signature
//! - [`World`] - Table registry, entity locations, and relationship depth
//! - [`MonitorRegistry`] - Refcounted component monitors driving the world
//!   monitor generation
//! - [`TableEvent`] - Table create/delete events consumed by query caches

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod event;
pub mod monitor;
pub mod table;
pub mod world;

pub use event::{TableEvent, TableEventKind};
pub use monitor::MonitorRegistry;
pub use table::{id_bloom, Table, TableId, TableRecord};
pub use world::World;
