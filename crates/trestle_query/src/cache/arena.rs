//! Match record storage.
//!
//! Match records live in a contiguous arena with free-list reuse, addressed
//! by [`MatchKey`]. A record is a common header ([`MatchNode`]) plus an
//! optional [`FullMatch`] extension; trivial caches allocate bare headers,
//! full caches always carry the extension. The two layouts never coexist in
//! one cache.

use std::fmt;
use std::sync::Arc;

use trestle_foundation::{Entity, Id};
use trestle_storage::{TableId, TableRecord};

/// Dense identifier for an arena-allocated match record.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct MatchKey(u32);

impl fmt::Debug for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MatchKey({})", self.0)
    }
}

/// The extended attributes present only in the full record layout.
#[derive(Debug)]
pub(crate) struct FullMatch {
    /// Next match record for the same table (wildcard expansion chain).
    pub next_match: Option<MatchKey>,
    /// Per-field resolved ids. Pointer-equal to the cache's default vector
    /// when every field matches the declared id.
    pub ids: Arc<[Id]>,
    /// Per-field source entities. Pointer-equal to the cache's zero vector
    /// when every field is resolved on the iterated entity.
    pub sources: Arc<[Entity]>,
    /// Per-field source tables; populated only when a field has a non-null
    /// source.
    pub tables: Option<Box<[Option<TableId>]>>,
    /// Bitmask of fields that are set.
    pub set_fields: u32,
    /// Bitmask of fields resolved via up-traversal.
    pub up_fields: u32,
    /// Per-field change-detection counters, allocated on demand.
    pub monitor: Option<Box<[i32]>>,
}

/// The record header shared by both layouts.
#[derive(Debug)]
pub(crate) struct MatchNode {
    /// The table this record describes.
    pub table: TableId,
    /// Per-field table records naming the backing columns.
    pub trs: Box<[Option<TableRecord>]>,
    /// Previous record in the iteration list.
    pub prev: Option<MatchKey>,
    /// Next record in the iteration list.
    pub next: Option<MatchKey>,
    /// Group key; zero when grouping is disabled.
    pub group_id: u64,
    /// Extension present in the full layout only.
    pub full: Option<Box<FullMatch>>,
}

impl MatchNode {
    /// Creates an unlinked record for `table`.
    ///
    /// `defaults` carries the cache-shared id and source vectors installed
    /// into a full-layout record until the first populate; `None` produces
    /// a trivial-layout record.
    pub fn new(
        table: TableId,
        field_count: usize,
        defaults: Option<(&Arc<[Id]>, &Arc<[Entity]>)>,
    ) -> Self {
        Self {
            table,
            trs: vec![None; field_count].into_boxed_slice(),
            prev: None,
            next: None,
            group_id: 0,
            full: defaults.map(|(ids, sources)| {
                Box::new(FullMatch {
                    next_match: None,
                    ids: Arc::clone(ids),
                    sources: Arc::clone(sources),
                    tables: None,
                    set_fields: 0,
                    up_fields: 0,
                    monitor: None,
                })
            }),
        }
    }

    /// The next record in this table's wildcard expansion chain.
    pub fn next_match(&self) -> Option<MatchKey> {
        self.full.as_ref().and_then(|f| f.next_match)
    }
}

/// Slot in the match arena.
#[derive(Debug)]
struct Slot {
    node: Option<MatchNode>,
    next_free: Option<u32>,
}

/// Contiguous storage for match records with free-list reuse.
///
/// Freed slots are reused most-recently-freed first, so rematch cycles that
/// drop and re-create records do not grow the arena.
#[derive(Debug, Default)]
pub(crate) struct MatchArena {
    slots: Vec<Slot>,
    free_head: Option<u32>,
    live_count: usize,
}

impl MatchArena {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a slot for `node` and returns its key.
    pub fn alloc(&mut self, node: MatchNode) -> MatchKey {
        self.live_count += 1;
        if let Some(idx) = self.free_head {
            let slot = &mut self.slots[idx as usize];
            debug_assert!(slot.node.is_none(), "free slot should have no node");
            self.free_head = slot.next_free;
            slot.node = Some(node);
            slot.next_free = None;
            MatchKey(idx)
        } else {
            let idx = u32::try_from(self.slots.len()).expect("match arena overflow");
            self.slots.push(Slot {
                node: Some(node),
                next_free: None,
            });
            MatchKey(idx)
        }
    }

    /// Frees the slot for `key`, returning its record.
    ///
    /// # Panics
    ///
    /// Panics if the slot is already free.
    pub fn free(&mut self, key: MatchKey) -> MatchNode {
        let slot = &mut self.slots[key.0 as usize];
        let node = slot.node.take().expect("double free of match record");
        slot.next_free = self.free_head;
        self.free_head = Some(key.0);
        self.live_count -= 1;
        node
    }

    /// Returns the record for `key`.
    ///
    /// # Panics
    ///
    /// Panics if the slot is free.
    pub fn get(&self, key: MatchKey) -> &MatchNode {
        self.slots[key.0 as usize]
            .node
            .as_ref()
            .expect("stale match key")
    }

    /// Returns the record for `key` mutably.
    ///
    /// # Panics
    ///
    /// Panics if the slot is free.
    pub fn get_mut(&mut self, key: MatchKey) -> &mut MatchNode {
        self.slots[key.0 as usize]
            .node
            .as_mut()
            .expect("stale match key")
    }

    /// Number of live records.
    pub fn live_count(&self) -> usize {
        self.live_count
    }
}
