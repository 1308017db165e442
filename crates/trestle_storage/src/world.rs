//! World state management.
//!
//! The `World` is the unified interface to all storage systems: the table
//! registry, entity locations, the component-monitor registry, and the
//! structural-change event queue.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::debug;

use trestle_foundation::{Entity, Error, Id, Result, WILDCARD};

use crate::event::{TableEvent, TableEventKind};
use crate::monitor::MonitorRegistry;
use crate::table::{Table, TableId};

/// Mutable simulation state.
///
/// All structural mutation is single-writer; see the query crate for the
/// cooperative scheduling contract.
#[derive(Debug)]
pub struct World {
    /// Next entity id to hand out.
    next_entity: u64,
    /// Next table id to hand out.
    next_table: u64,
    /// Live tables by id.
    tables: HashMap<TableId, Table>,
    /// Live table ids in creation order, for deterministic iteration.
    table_order: Vec<TableId>,
    /// Table lookup by sorted type signature.
    by_kind: HashMap<Vec<Id>, TableId>,
    /// Which table each live entity is stored in.
    locations: HashMap<Entity, TableId>,
    /// Component monitors registered by query caches.
    monitors: MonitorRegistry,
    /// Bumped whenever a structural change touches a monitored id.
    monitor_generation: u64,
    /// Total rematches performed by caches against this world.
    rematch_count_total: u64,
    /// Queued table lifecycle events.
    events: VecDeque<TableEvent>,
    /// Next event id to stamp.
    next_event_id: u64,
    /// Set once teardown has begun; cache construction is rejected after.
    shutting_down: bool,
}

impl World {
    /// Creates a new empty world.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_entity: Entity::FIRST_USER,
            next_table: 1,
            tables: HashMap::new(),
            table_order: Vec::new(),
            by_kind: HashMap::new(),
            locations: HashMap::new(),
            monitors: MonitorRegistry::new(),
            monitor_generation: 0,
            rematch_count_total: 0,
            events: VecDeque::new(),
            next_event_id: 0,
            shutting_down: false,
        }
    }

    /// Allocates a fresh entity id.
    pub fn entity(&mut self) -> Entity {
        let e = Entity(self.next_entity);
        self.next_entity += 1;
        e
    }

    // --- Tables ---

    /// Returns the table with the given id, if it is live.
    #[must_use]
    pub fn table(&self, id: TableId) -> Option<&Table> {
        self.tables.get(&id)
    }

    /// Returns live table ids in creation order.
    #[must_use]
    pub fn table_ids(&self) -> &[TableId] {
        &self.table_order
    }

    /// Returns the number of live tables.
    #[must_use]
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Finds or creates the table for the given type signature.
    ///
    /// Creation queues a `TableCreate` event and notes a structural change
    /// for every id in the signature.
    pub fn ensure_table(&mut self, kind: Vec<Id>) -> TableId {
        let mut sorted = kind;
        sorted.sort_unstable();
        sorted.dedup();

        if let Some(&id) = self.by_kind.get(&sorted) {
            return id;
        }

        let id = TableId(self.next_table);
        self.next_table += 1;
        let table = Table::new(id, sorted.clone());
        debug!(table = ?id, kind = ?table.kind(), "table created");

        self.tables.insert(id, table);
        self.table_order.push(id);
        self.by_kind.insert(sorted.clone(), id);
        self.emit(TableEventKind::TableCreate, id);
        for changed in sorted {
            self.note_structural_change(changed);
        }
        id
    }

    /// Deletes a table, dropping its rows and queueing a `TableDelete` event.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist.
    pub fn delete_table(&mut self, id: TableId) -> Result<()> {
        let table = self
            .tables
            .remove(&id)
            .ok_or_else(|| Error::internal(format!("no such table: {id:?}")))?;
        debug!(table = ?id, "table deleted");

        self.table_order.retain(|&t| t != id);
        self.by_kind.remove(table.kind());
        for &row in table.rows() {
            self.locations.remove(&row);
        }
        self.emit(TableEventKind::TableDelete, id);
        for &changed in table.kind() {
            self.note_structural_change(changed);
        }
        Ok(())
    }

    // --- Entities ---

    /// Spawns a new entity directly into the given table.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist.
    pub fn spawn_in(&mut self, table: TableId) -> Result<Entity> {
        let e = self.entity();
        let t = self
            .tables
            .get_mut(&table)
            .ok_or_else(|| Error::internal(format!("no such table: {table:?}")))?;
        t.push_row(e);
        self.locations.insert(e, table);
        Ok(e)
    }

    /// Removes an entity from its table.
    pub fn despawn(&mut self, entity: Entity) {
        if let Some(table) = self.locations.remove(&entity) {
            if let Some(t) = self.tables.get_mut(&table) {
                t.remove_row(entity);
            }
        }
    }

    /// Returns the table an entity is stored in.
    #[must_use]
    pub fn location(&self, entity: Entity) -> Option<TableId> {
        self.locations.get(&entity).copied()
    }

    /// Adds an id to an entity, moving it to the matching table.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity has no storage location.
    pub fn add_id(&mut self, entity: Entity, id: Id) -> Result<TableId> {
        let from = self
            .location(entity)
            .ok_or_else(|| Error::internal(format!("entity has no table: {entity:?}")))?;
        let mut kind = self.tables[&from].kind().to_vec();
        if kind.contains(&id) {
            return Ok(from);
        }
        kind.push(id);
        let to = self.move_entity(entity, from, kind)?;
        self.note_structural_change(id);
        Ok(to)
    }

    /// Removes an id from an entity, moving it to the matching table.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity has no storage location.
    pub fn remove_id(&mut self, entity: Entity, id: Id) -> Result<TableId> {
        let from = self
            .location(entity)
            .ok_or_else(|| Error::internal(format!("entity has no table: {entity:?}")))?;
        let mut kind = self.tables[&from].kind().to_vec();
        let before = kind.len();
        kind.retain(|&k| k != id);
        if kind.len() == before {
            return Ok(from);
        }
        let to = self.move_entity(entity, from, kind)?;
        self.note_structural_change(id);
        Ok(to)
    }

    fn move_entity(&mut self, entity: Entity, from: TableId, kind: Vec<Id>) -> Result<TableId> {
        let to = self.ensure_table(kind);
        if to != from {
            if let Some(t) = self.tables.get_mut(&from) {
                t.remove_row(entity);
            }
            let t = self
                .tables
                .get_mut(&to)
                .ok_or_else(|| Error::internal(format!("no such table: {to:?}")))?;
            t.push_row(entity);
            self.locations.insert(entity, to);
        }
        Ok(to)
    }

    // --- Relationship depth ---

    /// Computes the depth of a table along a traversal relation.
    ///
    /// A table with no `(rel, target)` pair has depth 0; otherwise the depth
    /// is one more than the depth of the first target's table. Cycles
    /// terminate the walk.
    #[must_use]
    pub fn relation_depth(&self, rel: Entity, table: TableId) -> i32 {
        let mut depth = 0;
        let mut current = table;
        let mut seen: HashSet<TableId> = HashSet::new();
        seen.insert(current);

        while let Some(t) = self.tables.get(&current) {
            let Some((_, found)) = t.search(Id::pair(rel, WILDCARD)) else {
                break;
            };
            let Some(target) = found.second() else {
                break;
            };
            depth += 1;
            let Some(next) = self.location(target) else {
                break;
            };
            if !seen.insert(next) {
                break;
            }
            current = next;
        }
        depth
    }

    // --- Monitors and structural change ---

    /// Registers a component monitor.
    pub fn register_monitor(&mut self, id: Id) {
        self.monitors.register(id);
    }

    /// Unregisters a component monitor.
    pub fn unregister_monitor(&mut self, id: Id) {
        self.monitors.unregister(id);
    }

    /// Returns the monitor registry.
    #[must_use]
    pub fn monitors(&self) -> &MonitorRegistry {
        &self.monitors
    }

    /// Notes a structural change on a concrete id.
    ///
    /// Bumps the monitor generation iff a registered monitor matches it.
    pub fn note_structural_change(&mut self, changed: Id) {
        if self.monitors.is_watched(changed) {
            self.monitor_generation += 1;
        }
    }

    /// Returns the current world monitor generation.
    #[must_use]
    pub fn monitor_generation(&self) -> u64 {
        self.monitor_generation
    }

    /// Records one completed cache rematch.
    pub fn record_rematch(&mut self) {
        self.rematch_count_total += 1;
    }

    /// Returns the total number of cache rematches against this world.
    #[must_use]
    pub fn rematch_count_total(&self) -> u64 {
        self.rematch_count_total
    }

    // --- Events ---

    fn emit(&mut self, kind: TableEventKind, table: TableId) {
        self.next_event_id += 1;
        self.events.push_back(TableEvent {
            kind,
            table,
            event_id: self.next_event_id,
        });
    }

    /// Drains all queued table events, in emission order.
    pub fn drain_events(&mut self) -> Vec<TableEvent> {
        self.events.drain(..).collect()
    }

    // --- Teardown ---

    /// Marks the world as shutting down. Cache construction is rejected
    /// after this point.
    pub fn begin_teardown(&mut self) {
        self.shutting_down = true;
    }

    /// Returns true if teardown has begun.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}
