//! Error types for the Trestle system.
//!
//! Uses `thiserror` for ergonomic error definition with rich context.

use thiserror::Error;

use crate::id::Id;

/// The main error type for Trestle operations.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional context about the operation that failed.
    pub context: Option<String>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Adds context to this error.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Creates an unsupported-term error.
    #[must_use]
    pub fn unsupported_term(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedTerm(detail.into()))
    }

    /// Creates an invalid-grouping error.
    #[must_use]
    pub fn invalid_grouping(detail: &'static str) -> Self {
        Self::new(ErrorKind::InvalidGrouping(detail))
    }

    /// Creates an order-by-not-queried error.
    #[must_use]
    pub fn order_by_not_queried(id: Id) -> Self {
        Self::new(ErrorKind::OrderByNotQueried(id))
    }

    /// Creates a world-shutting-down error.
    #[must_use]
    pub fn world_shutting_down() -> Self {
        Self::new(ErrorKind::WorldShuttingDown)
    }

    /// Creates an invalid-iterator-state error.
    #[must_use]
    pub fn invalid_iterator_state() -> Self {
        Self::new(ErrorKind::InvalidIteratorState)
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal(detail.into()))
    }
}

/// Categorized error kinds for pattern matching.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// A term uses a named variable, a non-wildcard variable reference, or a
    /// filter interaction, none of which cached queries support.
    #[error("unsupported term: {0}")]
    UnsupportedTerm(String),

    /// Conflicting or repeated grouping configuration.
    #[error("invalid grouping: {0}")]
    InvalidGrouping(&'static str),

    /// The order-by component does not appear as an And term in the query.
    #[error("order_by component {0:?} is not queried for")]
    OrderByNotQueried(Id),

    /// Construction attempted while the world is tearing down.
    #[error("cannot create query cache during world teardown")]
    WorldShuttingDown,

    /// An iterator was repositioned while iteration was in progress.
    #[error("cannot set group during iteration")]
    InvalidIteratorState,

    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}
