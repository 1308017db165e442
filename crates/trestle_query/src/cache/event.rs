//! Event handling and rematching.
//!
//! Table-create and table-delete events keep the cache aligned with single
//! structural changes. When the world's monitor generation advances past the
//! cache's last observed value, a full rematch reconciles the cache's table
//! set with the world, re-using existing records wherever a table still
//! matches in the same shape so a structural change does not churn
//! allocations.

use tracing::debug;

use trestle_storage::{Table, TableEvent, TableEventKind, TableId, World};

use crate::eval::QueryEvaluator;

use super::arena::MatchKey;
use super::{Bucket, QueryCache};

impl QueryCache {
    /// Observer entry point.
    ///
    /// Repeated delivery of the same event id is ignored; events for
    /// untracked tables are ignored. Never fails.
    pub fn on_event(&mut self, world: &World, event: &TableEvent) {
        // The bus may fan one event to the cache through multiple paths.
        if self.last_event_id == Some(event.event_id) {
            return;
        }
        self.last_event_id = Some(event.event_id);

        match event.kind {
            TableEventKind::TableCreate => {
                let Some(table) = world.table(event.table) else {
                    return;
                };
                if self.match_new_table(world, table) {
                    debug!(table = ?event.table, "query cache matched created table");
                }
            }
            TableEventKind::TableDelete => {
                if self.tables.contains_key(&event.table) {
                    debug!(table = ?event.table, "query cache dropped deleted table");
                    self.unmatch_table(world, event.table);
                }
            }
        }
    }

    /// Matches a single table against the uncached query, adding one record
    /// per resolution. Returns true if the table matched.
    fn match_new_table(&mut self, world: &World, table: &Table) -> bool {
        #[cfg(not(debug_assertions))]
        {
            if !table.bloom_test(self.query.bloom_filter) {
                return false;
            }
        }

        let yields = QueryEvaluator::match_table(&self.query, world, table);
        if yields.is_empty() {
            return false;
        }

        // Cross-check that the probe agrees with a confirmed match.
        #[cfg(debug_assertions)]
        assert!(
            table.bloom_test(self.query.bloom_filter),
            "bloom filter rejected a matching table"
        );

        self.tables.entry(table.id()).or_insert_with(Bucket::default);
        for m in &yields {
            let key = self.add_table_match(world, m.table);
            self.set_table_match(key, m);
        }
        true
    }

    /// Reconciles the cache with the world after structural change.
    ///
    /// A no-op when the world's monitor generation has not advanced past the
    /// cache's last observed value. Trivial caches never rematch. Never
    /// fails; the result may be an empty cache.
    pub fn rematch(&mut self, world: &mut World) {
        if self.trivial {
            return;
        }
        if self.monitor_generation == world.monitor_generation() {
            return;
        }
        self.monitor_generation = world.monitor_generation();
        world.record_rematch();
        self.rematch_count = self.rematch_count.wrapping_add(1);
        let rematch_count = self.rematch_count;
        debug!(generation = self.monitor_generation, "query cache rematch");

        let yields = QueryEvaluator::match_all(&self.query, world);
        let mut cur_table: Option<TableId> = None;
        let mut cursor: Option<MatchKey> = None;

        for m in &yields {
            if cur_table != Some(m.table) {
                // Finalize the previous table: wildcard expansions past the
                // cursor no longer apply.
                if let Some(prev) = cursor {
                    self.truncate_tail(world, prev);
                }
                cur_table = Some(m.table);
                let bucket = self.tables.entry(m.table).or_insert_with(Bucket::default);
                bucket.rematch_count = rematch_count;
                cursor = None;
            }

            // Advance the cursor through existing records; allocate only
            // when it runs out.
            let existing = match cursor {
                None => self.tables[&m.table].first,
                Some(prev) => self.nodes.get(prev).next_match(),
            };
            let key = match existing {
                Some(key) => key,
                None => self.add_table_match(world, m.table),
            };
            self.set_table_match(key, m);

            if self.grouping_enabled() {
                let group_id = self.group_id_for(world, m.table);
                if group_id != self.nodes.get(key).group_id {
                    // The table moved groups; re-establish list invariants.
                    self.remove_node(world, key);
                    self.insert_node(world, key);
                }
            }

            cursor = Some(key);
        }
        if let Some(prev) = cursor {
            self.truncate_tail(world, prev);
        }

        // Every bucket the sweep did not stamp no longer matches.
        let stale: Vec<TableId> = self
            .tables
            .iter()
            .filter(|(_, bucket)| bucket.rematch_count != rematch_count)
            .map(|(&table, _)| table)
            .collect();
        for table in stale {
            self.unmatch_table(world, table);
        }

        if self.order_by().is_some() {
            self.build_sorted_tables();
        }
    }

    /// Frees the unused tail of a bucket's wildcard chain after `after`.
    fn truncate_tail(&mut self, world: &World, after: MatchKey) {
        let tail = self.nodes.get(after).next_match();
        if tail.is_none() {
            return;
        }
        if let Some(full) = self.nodes.get_mut(after).full.as_deref_mut() {
            full.next_match = None;
        }
        let table = self.nodes.get(after).table;
        if let Some(bucket) = self.tables.get_mut(&table) {
            bucket.last = Some(after);
        }
        self.free_match_chain(world, tail);
    }
}
