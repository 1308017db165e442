//! The query cache.
//!
//! A [`QueryCache`] maintains, for one persistent query, a materialized
//! index of every archetype table whose contents satisfy the query, plus the
//! per-table evaluation results. Matched tables live in a doubly-linked
//! iteration list, optionally partitioned into key-ordered groups, and are
//! reconciled incrementally: table-create and table-delete events update
//! single entries, and a full rematch reconciles the cache after bursts of
//! structural change.

mod arena;
mod event;
mod list;

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use trestle_foundation::{Entity, Error, Id, Result, INHERIT, WILDCARD};
use trestle_storage::{TableId, TableRecord, World};

use crate::eval::{Query, QueryEvaluator, TableMatch};
use crate::term::{
    GroupByFn, GroupCreateFn, GroupDeleteFn, OrderByFn, QueryDesc, QueryFlags, RefFlags, RefName,
    Term, TermInOut, TermOper, TermRef,
};

use arena::{MatchArena, MatchKey, MatchNode};

/// Statistics and context for one group.
#[derive(Default)]
pub struct GroupInfo {
    /// Number of tables in the group.
    pub table_count: i32,
    /// Change stamp, advanced on every insert into or removal from the
    /// group.
    pub match_count: i32,
    /// Opaque context produced by the group creation hook.
    pub ctx: Option<Box<dyn Any>>,
}

impl std::fmt::Debug for GroupInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupInfo")
            .field("table_count", &self.table_count)
            .field("match_count", &self.match_count)
            .field("ctx", &self.ctx.is_some())
            .finish()
    }
}

/// Endpoints of a contiguous segment of the iteration list.
///
/// The global list is one of these; every group is another whose segment
/// nests inside the global one.
#[derive(Debug)]
pub(crate) struct MatchList {
    pub first: Option<MatchKey>,
    pub last: Option<MatchKey>,
    pub info: GroupInfo,
}

/// Per-table bucket: the chain of match records for one table.
#[derive(Debug, Default)]
struct Bucket {
    first: Option<MatchKey>,
    last: Option<MatchKey>,
    /// Generation stamp of the most recent rematch that saw this table.
    rematch_count: u32,
}

/// A materialized index of the tables matching one query.
pub struct QueryCache {
    /// The uncached query populating this cache.
    query: Query,
    /// Whether records use the reduced trivial layout.
    trivial: bool,
    /// Whether iteration yields empty tables.
    match_empty: bool,
    /// Whether records reserve change-detection state.
    detect_changes: bool,
    /// Match record storage.
    nodes: MatchArena,
    /// Per-table buckets.
    tables: HashMap<TableId, Bucket>,
    /// The global iteration list.
    list: MatchList,
    /// Group segments by key; empty unless grouping is enabled.
    groups: HashMap<u64, MatchList>,
    group_by_id: Id,
    group_by_callback: Option<GroupByFn>,
    on_group_create: Option<GroupCreateFn>,
    on_group_delete: Option<GroupDeleteFn>,
    /// True when groups are ordered by descending key.
    group_desc: bool,
    /// 1-based index of the cascade term; zero when none.
    cascade_by: usize,
    order_by: Option<Id>,
    #[allow(dead_code)]
    order_by_callback: Option<OrderByFn>,
    /// Matched records in sorted order; rebuilt by the external sort.
    table_slices: Vec<MatchKey>,
    /// Shared per-field id vector equal to the query's declared ids.
    default_ids: Arc<[Id]>,
    /// Shared zeroed per-field source vector.
    zero_sources: Arc<[Entity]>,
    /// Last observed world monitor generation.
    monitor_generation: u64,
    /// Local rematch generation counter.
    rematch_count: u32,
    /// Monotonic change stamp, advanced on every insert and remove.
    match_count: u64,
    /// De-duplication guard for observer events.
    last_event_id: Option<u64>,
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("query", &self.query)
            .field("trivial", &self.trivial)
            .field("match_empty", &self.match_empty)
            .field("detect_changes", &self.detect_changes)
            .field("nodes", &self.nodes)
            .field("tables", &self.tables)
            .field("list", &self.list)
            .field("groups", &self.groups)
            .field("group_by_id", &self.group_by_id)
            .field("group_by_callback", &self.group_by_callback.is_some())
            .field("on_group_create", &self.on_group_create.is_some())
            .field("on_group_delete", &self.on_group_delete.is_some())
            .field("group_desc", &self.group_desc)
            .field("cascade_by", &self.cascade_by)
            .field("order_by", &self.order_by)
            .field("order_by_callback", &self.order_by_callback.is_some())
            .field("table_slices", &self.table_slices)
            .field("default_ids", &self.default_ids)
            .field("zero_sources", &self.zero_sources)
            .field("monitor_generation", &self.monitor_generation)
            .field("rematch_count", &self.rematch_count)
            .field("match_count", &self.match_count)
            .field("last_event_id", &self.last_event_id)
            .finish()
    }
}

impl QueryCache {
    /// Builds a cache for the query described by `desc` and populates it
    /// with all currently matching tables.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::UnsupportedTerm`](trestle_foundation::ErrorKind) for
    ///   named variables or filter terms
    /// - [`ErrorKind::InvalidGrouping`](trestle_foundation::ErrorKind) for
    ///   conflicting grouping configuration
    /// - [`ErrorKind::OrderByNotQueried`](trestle_foundation::ErrorKind)
    ///   when the sort component is not an And term
    /// - [`ErrorKind::WorldShuttingDown`](trestle_foundation::ErrorKind)
    ///   during world teardown
    pub fn new(world: &mut World, desc: QueryDesc) -> Result<Self> {
        if world.is_shutting_down() {
            return Err(Error::world_shutting_down().with_context("query cache init"));
        }

        let QueryDesc {
            terms,
            flags,
            group_by,
            group_by_callback,
            on_group_create,
            on_group_delete,
            order_by,
            order_by_callback,
        } = desc;

        // Grouping, ordering, and user context are stripped from the
        // uncached query; it only evaluates terms.
        let query = Query::new(terms);
        let cascade_by = Self::process_signature(&query.terms)?;

        if cascade_by != 0 && (group_by.is_some() || group_by_callback.is_some()) {
            return Err(Error::invalid_grouping("cannot mix cascade and group_by"));
        }

        if let Some(order_id) = order_by {
            let queried = query
                .terms
                .iter()
                .any(|t| t.oper == TermOper::And && t.id() == order_id);
            if !queried {
                return Err(Error::order_by_not_queried(order_id));
            }
        }

        let grouped = cascade_by != 0 || group_by.is_some() || group_by_callback.is_some();
        let ordered = order_by.is_some();
        let detect_changes = flags.contains(QueryFlags::DETECT_CHANGES);
        let trivial = query.match_only_self()
            && !query.match_wildcards()
            && query.terms.iter().all(|t| t.oper == TermOper::And)
            && !grouped
            && !ordered
            && !detect_changes;

        // order_by returns table slices, not whole tables, which is
        // incompatible with storing empty tables.
        let match_empty = flags.contains(QueryFlags::MATCH_EMPTY_TABLES) && !ordered;

        let default_ids: Arc<[Id]> = query.terms.iter().map(Term::id).collect();
        let zero_sources: Arc<[Entity]> = vec![Entity::NULL; query.field_count].into();

        let mut cache = Self {
            query,
            trivial,
            match_empty,
            detect_changes,
            nodes: MatchArena::new(),
            tables: HashMap::new(),
            list: MatchList::new(None),
            groups: HashMap::new(),
            group_by_id: Id::comp(Entity::NULL),
            group_by_callback: None,
            on_group_create,
            on_group_delete,
            group_desc: false,
            cascade_by,
            order_by,
            order_by_callback,
            table_slices: Vec::new(),
            default_ids,
            zero_sources,
            monitor_generation: world.monitor_generation(),
            rematch_count: 0,
            match_count: 0,
            last_event_id: None,
        };

        // Group before matching so records land in place immediately.
        if cascade_by != 0 {
            let term = &cache.query.terms[cascade_by - 1];
            let trav = term.trav;
            let cascade_id = term.id();
            cache.group_desc = term.src.flags.contains(RefFlags::DESC);
            let callback: GroupByFn = Box::new(move |world, table, _id| {
                u64::try_from(world.relation_depth(trav, table.id())).unwrap_or(0)
            });
            cache.set_group_by(cascade_id, callback)?;
        }
        if group_by.is_some() || group_by_callback.is_some() {
            let id = group_by.unwrap_or(Id::comp(Entity::NULL));
            let callback = group_by_callback.unwrap_or_else(|| Box::new(list::default_group_by));
            cache.set_group_by(id, callback)?;
        }

        Self::for_each_monitor_id(&cache.query.terms, |id| world.register_monitor(id));

        cache.populate(world);

        if ordered {
            cache.build_sorted_tables();
        }

        debug!(
            tables = cache.table_count(),
            trivial = cache.trivial,
            "query cache created"
        );
        Ok(cache)
    }

    /// Validates the signature and finds the cascade term.
    ///
    /// Returns the 1-based index of the cascade term, or zero.
    fn process_signature(terms: &[Term]) -> Result<usize> {
        fn ref_supported(r: &TermRef) -> bool {
            match &r.name {
                RefName::This | RefName::Entity(_) => true,
                RefName::Var(_) => false,
            }
        }

        let mut cascade_by = 0;
        for (i, term) in terms.iter().enumerate() {
            if !ref_supported(&term.src) {
                return Err(Error::unsupported_term(format!(
                    "term {i}: named variable source"
                )));
            }
            if !ref_supported(&term.first) {
                return Err(Error::unsupported_term(format!(
                    "term {i}: named variable in first position"
                )));
            }
            if let Some(second) = &term.second {
                if !ref_supported(second) {
                    return Err(Error::unsupported_term(format!(
                        "term {i}: named variable in second position"
                    )));
                }
            }
            if term.inout == TermInOut::Filter {
                return Err(Error::unsupported_term(format!(
                    "term {i}: filter terms are not cacheable"
                )));
            }
            if term.src.flags.contains(RefFlags::CASCADE) {
                if cascade_by != 0 {
                    return Err(Error::invalid_grouping(
                        "query can only have one cascade term",
                    ));
                }
                cascade_by = i + 1;
            }
        }
        Ok(cascade_by)
    }

    /// Calls `f` with every id the cache must monitor: each term's id, and
    /// for up-traversal terms the traversal pair plus the inheritance pair
    /// when the relations differ.
    fn for_each_monitor_id(terms: &[Term], mut f: impl FnMut(Id)) {
        for term in terms {
            f(term.id());
            if term.src.flags.contains(RefFlags::UP) {
                f(Id::pair(term.trav, WILDCARD));
                if term.trav != INHERIT {
                    f(Id::pair(INHERIT, WILDCARD));
                }
            }
        }
    }

    fn set_group_by(&mut self, id: Id, callback: GroupByFn) -> Result<()> {
        if self.group_by_callback.is_some() {
            return Err(Error::invalid_grouping("query is already grouped"));
        }
        self.group_by_id = id;
        self.group_by_callback = Some(callback);
        Ok(())
    }

    /// Tears the cache down: fires the group destruction hook for every
    /// surviving group, unregisters monitors, and frees every bucket and
    /// match record.
    pub fn fini(mut self, world: &mut World) {
        if let Some(on_delete) = self.on_group_delete.take() {
            let mut group_ids: Vec<u64> = self.groups.keys().copied().collect();
            group_ids.sort_unstable();
            for group_id in group_ids {
                if let Some(group) = self.groups.get_mut(&group_id) {
                    on_delete(world, group_id, group.info.ctx.take());
                }
            }
        }

        Self::for_each_monitor_id(&self.query.terms, |id| world.unregister_monitor(id));

        let tables: Vec<TableId> = self.tables.keys().copied().collect();
        for table in tables {
            self.unmatch_table(world, table);
        }
        debug_assert_eq!(self.nodes.live_count(), 0);
        debug!("query cache destroyed");
    }

    // --- Counters and lookups ---

    /// Number of matched tables.
    #[must_use]
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Sum of entity counts across all matched tables.
    #[must_use]
    pub fn entity_count(&self, world: &World) -> usize {
        self.tables
            .keys()
            .filter_map(|&t| world.table(t))
            .map(trestle_storage::Table::count)
            .sum()
    }

    /// Monotonic change stamp; advances on every insert and remove.
    #[must_use]
    pub fn match_count(&self) -> u64 {
        self.match_count
    }

    /// Number of rematches this cache has performed.
    #[must_use]
    pub fn rematch_count(&self) -> u32 {
        self.rematch_count
    }

    /// Returns true if this cache uses the reduced trivial record layout.
    #[must_use]
    pub fn is_trivial(&self) -> bool {
        self.trivial
    }

    /// 1-based index of the cascade term, or zero when none.
    #[must_use]
    pub fn cascade_by(&self) -> usize {
        self.cascade_by
    }

    /// The component the external sort orders by, if any.
    #[must_use]
    pub fn order_by(&self) -> Option<Id> {
        self.order_by
    }

    /// Returns true if the cache has a bucket for `table`.
    #[must_use]
    pub fn has_table(&self, table: TableId) -> bool {
        self.tables.contains_key(&table)
    }

    /// Iterates the match records of one table's bucket, in wildcard
    /// expansion order.
    #[must_use]
    pub fn table_matches(&self, table: TableId) -> Option<BucketIter<'_>> {
        self.tables.get(&table).map(|bucket| BucketIter {
            cache: self,
            cur: bucket.first,
        })
    }

    /// Statistics for a group, if it exists.
    #[must_use]
    pub fn group_info(&self, group_id: u64) -> Option<&GroupInfo> {
        self.groups.get(&group_id).map(|g| &g.info)
    }

    /// The opaque context of a group, if it exists and has one.
    #[must_use]
    pub fn group_ctx(&self, group_id: u64) -> Option<&dyn Any> {
        self.group_info(group_id).and_then(|info| info.ctx.as_deref())
    }

    /// Matched records in external-sort order. Empty unless `order_by` was
    /// requested.
    #[must_use]
    pub fn sorted_len(&self) -> usize {
        self.table_slices.len()
    }

    // --- Iteration ---

    /// Starts an iterator over the full iteration list.
    #[must_use]
    pub fn iter<'a>(&'a self, world: &'a World) -> CacheIter<'a> {
        CacheIter {
            cache: self,
            world,
            cur: self.list.first,
            last: self.list.last,
            started: false,
        }
    }

    // --- Match record store ---

    /// Allocates a record for `table` and links it onto the bucket chain.
    fn bucket_add(&mut self, table: TableId) -> MatchKey {
        let node = if self.trivial {
            MatchNode::new(table, self.query.field_count, None)
        } else {
            MatchNode::new(
                table,
                self.query.field_count,
                Some((&self.default_ids, &self.zero_sources)),
            )
        };
        let key = self.nodes.alloc(node);

        let last = self.tables.get(&table).expect("bucket exists").last;
        if let Some(last) = last {
            debug_assert!(!self.trivial, "trivial queries yield one match per table");
            if let Some(full) = self.nodes.get_mut(last).full.as_deref_mut() {
                full.next_match = Some(key);
            }
        }
        let bucket = self.tables.get_mut(&table).expect("bucket exists");
        if bucket.first.is_none() {
            bucket.first = Some(key);
        }
        bucket.last = Some(key);
        key
    }

    /// Allocates, bucket-links, and list-links a record for `table`.
    fn add_table_match(&mut self, world: &World, table: TableId) -> MatchKey {
        let key = self.bucket_add(table);
        self.insert_node(world, key);
        key
    }

    /// Populates a record from one evaluator yield.
    ///
    /// Full-layout records share the cache's default id and source vectors
    /// whenever the yield matches them, and fall back to private copies
    /// otherwise; source tables are materialized only for non-`$this`
    /// sources.
    fn set_table_match(&mut self, key: MatchKey, m: &TableMatch) {
        debug_assert_eq!(self.query.field_count, m.trs.len());

        let ids_default = m.ids[..] == self.default_ids[..];
        let sources_generic = m.sources.iter().all(|s| s.is_null());
        let default_ids = Arc::clone(&self.default_ids);
        let zero_sources = Arc::clone(&self.zero_sources);
        let detect_changes = self.detect_changes;
        let field_count = self.query.field_count;

        let node = self.nodes.get_mut(key);
        node.trs.copy_from_slice(&m.trs);

        let Some(full) = node.full.as_deref_mut() else {
            debug_assert!(
                sources_generic,
                "trivial cache cannot match non-$this sources"
            );
            return;
        };

        if ids_default {
            if !Arc::ptr_eq(&full.ids, &default_ids) {
                full.ids = default_ids;
            }
        } else if Arc::ptr_eq(&full.ids, &default_ids) || full.ids[..] != m.ids[..] {
            full.ids = Arc::from(m.ids.as_slice());
        }

        if sources_generic {
            if !Arc::ptr_eq(&full.sources, &zero_sources) {
                full.sources = zero_sources;
            }
            full.tables = None;
        } else {
            if Arc::ptr_eq(&full.sources, &zero_sources) || full.sources[..] != m.sources[..] {
                full.sources = Arc::from(m.sources.as_slice());
            }
            full.tables = Some(m.trs.iter().map(|r| r.map(|r| r.table)).collect());
        }

        full.set_fields = m.set_fields;
        full.up_fields = m.up_fields;

        if detect_changes && full.monitor.is_none() {
            full.monitor = Some(vec![0; 1 + field_count].into_boxed_slice());
        }
    }

    /// Unlinks and frees a chain of records connected by `next_match`.
    fn free_match_chain(&mut self, world: &World, first: Option<MatchKey>) {
        let mut cur = first;
        while let Some(key) = cur {
            let next = self.nodes.get(key).next_match();
            self.remove_node(world, key);
            self.nodes.free(key);
            cur = next;
        }
    }

    /// Removes a table's bucket and frees all its records.
    fn unmatch_table(&mut self, world: &World, table: TableId) {
        if let Some(bucket) = self.tables.remove(&table) {
            self.free_match_chain(world, bucket.first);
        }
    }

    /// Populates the cache by running the uncached query to completion.
    fn populate(&mut self, world: &World) {
        let yields = QueryEvaluator::match_all(&self.query, world);
        let mut cur: Option<TableId> = None;
        for m in &yields {
            if cur != Some(m.table) {
                cur = Some(m.table);
                self.tables.insert(m.table, Bucket::default());
            }
            let key = self.add_table_match(world, m.table);
            self.set_table_match(key, m);
        }
        debug!(matches = self.nodes.live_count(), "query cache populated");
    }

    /// Rebuilds the sorted record list consumed by the external sort.
    fn build_sorted_tables(&mut self) {
        self.table_slices.clear();
        let mut cur = self.list.first;
        while let Some(key) = cur {
            self.table_slices.push(key);
            cur = self.nodes.get(key).next;
        }
    }

    /// Walks every internal structure and panics on an invariant violation.
    ///
    /// Debugging aid; cheap enough for tests, too slow for hot paths.
    pub fn check_consistency(&self) {
        // Link symmetry and endpoint conventions.
        let mut list_keys = Vec::new();
        let mut cur = self.list.first;
        let mut prev: Option<MatchKey> = None;
        while let Some(key) = cur {
            let node = self.nodes.get(key);
            assert_eq!(node.prev, prev, "prev link asymmetry");
            list_keys.push(key);
            prev = cur;
            cur = node.next;
        }
        assert_eq!(self.list.last, prev, "list.last does not end the list");
        if let Some(first) = self.list.first {
            assert_eq!(self.nodes.get(first).prev, None);
        }
        assert_eq!(
            usize::try_from(self.list.info.table_count).unwrap_or(0),
            list_keys.len(),
            "global table_count drift"
        );

        // Group contiguity: each group id forms exactly one run, and the
        // group's endpoints bound it.
        let mut runs: Vec<u64> = Vec::new();
        for &key in &list_keys {
            let gid = self.nodes.get(key).group_id;
            if runs.last() != Some(&gid) {
                runs.push(gid);
            }
        }
        let mut deduped = runs.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(deduped.len(), runs.len(), "group ids interleave");
        if self.grouping_enabled() {
            for (&gid, group) in &self.groups {
                let members: Vec<MatchKey> = list_keys
                    .iter()
                    .copied()
                    .filter(|&k| self.nodes.get(k).group_id == gid)
                    .collect();
                assert!(!members.is_empty(), "empty group survived");
                assert_eq!(group.first, members.first().copied());
                assert_eq!(group.last, members.last().copied());
                assert_eq!(
                    usize::try_from(group.info.table_count).unwrap_or(0),
                    members.len()
                );
            }
        }

        // Bucket coverage: walking every bucket chain reaches exactly the
        // records in the iteration list.
        let mut bucket_keys = Vec::new();
        for (&table, bucket) in &self.tables {
            let mut cur = bucket.first;
            while let Some(key) = cur {
                let node = self.nodes.get(key);
                assert_eq!(node.table, table, "record in wrong bucket");
                bucket_keys.push(key);
                if Some(key) == bucket.last {
                    break;
                }
                cur = node.next_match();
            }
        }
        let sort = |mut v: Vec<MatchKey>| {
            v.sort_unstable();
            v
        };
        assert_eq!(
            sort(bucket_keys),
            sort(list_keys),
            "bucket chains and iteration list disagree"
        );
    }
}

/// Read-only view of one match record.
pub struct MatchView<'a> {
    cache: &'a QueryCache,
    key: MatchKey,
}

impl<'a> MatchView<'a> {
    fn node(&self) -> &'a MatchNode {
        self.cache.nodes.get(self.key)
    }

    /// The matched table.
    #[must_use]
    pub fn table(&self) -> TableId {
        self.node().table
    }

    /// The record's group key; zero when grouping is disabled.
    #[must_use]
    pub fn group_id(&self) -> u64 {
        self.node().group_id
    }

    /// Per-field table records naming the backing columns.
    #[must_use]
    pub fn trs(&self) -> &'a [Option<TableRecord>] {
        &self.node().trs
    }

    /// Per-field resolved ids.
    #[must_use]
    pub fn ids(&self) -> &'a [Id] {
        match &self.node().full {
            Some(full) => &full.ids,
            None => &self.cache.default_ids,
        }
    }

    /// Per-field source entities; null entries are resolved on the iterated
    /// entity itself.
    #[must_use]
    pub fn sources(&self) -> &'a [Entity] {
        match &self.node().full {
            Some(full) => &full.sources,
            None => &self.cache.zero_sources,
        }
    }

    /// Per-field source tables; present only when a field has a non-null
    /// source.
    #[must_use]
    pub fn source_tables(&self) -> Option<&'a [Option<TableId>]> {
        self.node().full.as_ref().and_then(|f| f.tables.as_deref())
    }

    /// Bitmask of set fields.
    #[must_use]
    pub fn set_fields(&self) -> u32 {
        match &self.node().full {
            Some(full) => full.set_fields,
            None => mask(self.cache.query.field_count),
        }
    }

    /// Bitmask of fields resolved via up-traversal.
    #[must_use]
    pub fn up_fields(&self) -> u32 {
        self.node().full.as_ref().map_or(0, |f| f.up_fields)
    }

    /// Returns true if this record shares the cache's default id vector.
    #[must_use]
    pub fn shares_default_ids(&self) -> bool {
        match &self.node().full {
            Some(full) => Arc::ptr_eq(&full.ids, &self.cache.default_ids),
            None => true,
        }
    }

    /// Returns true if this record shares the cache's zeroed source vector.
    #[must_use]
    pub fn shares_default_sources(&self) -> bool {
        match &self.node().full {
            Some(full) => Arc::ptr_eq(&full.sources, &self.cache.zero_sources),
            None => true,
        }
    }
}

fn mask(field_count: usize) -> u32 {
    if field_count >= 32 {
        u32::MAX
    } else {
        (1u32 << field_count) - 1
    }
}

/// Iterator over one table's bucket chain.
pub struct BucketIter<'a> {
    cache: &'a QueryCache,
    cur: Option<MatchKey>,
}

impl<'a> Iterator for BucketIter<'a> {
    type Item = MatchView<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.cur?;
        self.cur = self.cache.nodes.get(key).next_match();
        Some(MatchView {
            cache: self.cache,
            key,
        })
    }
}

/// Iterator over the cache's iteration list.
///
/// Yields matched tables in list order: insertion order within a group,
/// groups in key order. When the cache does not match empty tables, tables
/// with no entities are skipped here, at the filter stage.
pub struct CacheIter<'a> {
    cache: &'a QueryCache,
    world: &'a World,
    cur: Option<MatchKey>,
    last: Option<MatchKey>,
    started: bool,
}

impl<'a> CacheIter<'a> {
    /// Repositions a fresh iterator to one group's `first..last` window.
    /// On a miss the iterator yields nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidIteratorState`](trestle_foundation::ErrorKind)
    /// if iteration has already begun.
    pub fn set_group(&mut self, group_id: u64) -> Result<()> {
        if self.started {
            return Err(Error::invalid_iterator_state());
        }
        match self.cache.groups.get(&group_id) {
            Some(group) => {
                self.cur = group.first;
                self.last = group.last;
            }
            None => {
                self.cur = None;
                self.last = None;
            }
        }
        Ok(())
    }
}

impl<'a> Iterator for CacheIter<'a> {
    type Item = MatchView<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let key = self.cur?;
            self.started = true;
            let node = self.cache.nodes.get(key);
            self.cur = if Some(key) == self.last {
                None
            } else {
                node.next
            };
            if !self.cache.match_empty {
                let empty = self
                    .world
                    .table(node.table)
                    .map_or(true, trestle_storage::Table::is_empty);
                if empty {
                    continue;
                }
            }
            return Some(MatchView {
                cache: self.cache,
                key,
            });
        }
    }
}
