//! Archetype tables.
//!
//! A table holds all entities sharing the same type signature. The signature
//! is kept sorted so membership checks are binary searches and two tables
//! with the same components always compare equal.

use std::fmt;

use trestle_foundation::{Entity, Id};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier for an archetype table.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TableId(pub u64);

impl fmt::Debug for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableId({})", self.0)
    }
}

/// Descriptor naming a specific column (component id) within a specific table.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TableRecord {
    /// The table holding the column.
    pub table: TableId,
    /// Column index into the table's type signature.
    pub column: usize,
    /// The concrete id stored at that column.
    pub id: Id,
}

/// A storage region holding all entities sharing one type signature.
#[derive(Clone, Debug)]
pub struct Table {
    id: TableId,
    /// Type signature, sorted and deduplicated.
    kind: Vec<Id>,
    /// Entities stored in this table.
    rows: Vec<Entity>,
    /// Bloom signature over the type, for cheap match rejection.
    bloom: u64,
}

/// Maps an entity to one bit of a 64-bit bloom signature.
fn bloom_bit(e: Entity) -> u64 {
    1u64 << (e.0.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 58)
}

/// Computes the bloom contribution of a single concrete id.
///
/// Wildcard positions contribute nothing, so a pattern's signature is always
/// a subset of the signature of any id it matches.
#[must_use]
pub fn id_bloom(id: Id) -> u64 {
    let mut bits = 0;
    let first = id.first();
    if !first.is_wildcard() {
        bits |= bloom_bit(first);
    }
    if let Some(second) = id.second() {
        if !second.is_wildcard() {
            bits |= bloom_bit(second);
        }
    }
    bits
}

impl Table {
    /// Creates a table from an unsorted id list. Sorts and deduplicates.
    pub(crate) fn new(id: TableId, mut kind: Vec<Id>) -> Self {
        kind.sort_unstable();
        kind.dedup();
        let bloom = kind.iter().fold(0, |acc, &i| acc | id_bloom(i));
        Self {
            id,
            kind,
            rows: Vec::new(),
            bloom,
        }
    }

    /// Returns this table's id.
    #[must_use]
    pub fn id(&self) -> TableId {
        self.id
    }

    /// Returns the sorted type signature.
    #[must_use]
    pub fn kind(&self) -> &[Id] {
        &self.kind
    }

    /// Returns the number of entities stored in this table.
    #[must_use]
    pub fn count(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if this table stores no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the entities stored in this table.
    #[must_use]
    pub fn rows(&self) -> &[Entity] {
        &self.rows
    }

    /// Tests whether the table's bloom signature can contain `filter`.
    ///
    /// A false result guarantees no match; a true result must be confirmed
    /// by a real search.
    #[must_use]
    pub fn bloom_test(&self, filter: u64) -> bool {
        (self.bloom & filter) == filter
    }

    /// Searches the type signature for the first id matching `pattern`.
    ///
    /// Returns the column index and the concrete id found there.
    #[must_use]
    pub fn search(&self, pattern: Id) -> Option<(usize, Id)> {
        self.search_from(pattern, 0)
    }

    /// Searches the type signature for a match at or after `start`.
    ///
    /// Repeated calls with an advancing `start` enumerate every wildcard
    /// expansion of `pattern` within this table, in column order.
    #[must_use]
    pub fn search_from(&self, pattern: Id, start: usize) -> Option<(usize, Id)> {
        self.kind[start.min(self.kind.len())..]
            .iter()
            .position(|&id| pattern.matches(id))
            .map(|offset| (start + offset, self.kind[start + offset]))
    }

    /// Returns true if any id in the signature matches `pattern`.
    #[must_use]
    pub fn has(&self, pattern: Id) -> bool {
        self.search(pattern).is_some()
    }

    /// Builds a record naming the given column of this table.
    #[must_use]
    pub fn record(&self, column: usize) -> TableRecord {
        TableRecord {
            table: self.id,
            column,
            id: self.kind[column],
        }
    }

    pub(crate) fn push_row(&mut self, entity: Entity) {
        self.rows.push(entity);
    }

    pub(crate) fn remove_row(&mut self, entity: Entity) -> bool {
        if let Some(pos) = self.rows.iter().position(|&e| e == entity) {
            self.rows.swap_remove(pos);
            true
        } else {
            false
        }
    }
}
