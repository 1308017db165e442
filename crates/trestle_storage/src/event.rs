//! Table lifecycle events.
//!
//! The world queues a [`TableEvent`] for every table creation and deletion.
//! The embedding runtime drains the queue and feeds each event to the query
//! caches that subscribed. The bus may deliver one event through multiple
//! paths; consumers de-duplicate on `event_id`.

use crate::table::TableId;

/// The kind of a table lifecycle event.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TableEventKind {
    /// A table was created.
    TableCreate,
    /// A table was deleted.
    TableDelete,
}

/// A table lifecycle event.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TableEvent {
    /// What happened.
    pub kind: TableEventKind,
    /// The table it happened to.
    pub table: TableId,
    /// Monotonically increasing event id, used for de-duplication.
    pub event_id: u64,
}
