//! Core types for the Trestle query cache.
//!
//! This crate provides:
//! - [`Entity`] - Identifiers for entities, components, and relations
//! - [`Id`] - Component ids and relationship pairs with wildcard matching
//! - [`Error`] - Rich error types with context

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod entity;
pub mod error;
pub mod id;

// Re-export primary types at crate root for convenience
pub use entity::{Entity, INHERIT, WILDCARD};
pub use error::{Error, ErrorKind};
pub use id::Id;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;
