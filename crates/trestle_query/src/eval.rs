//! Uncached query evaluation.
//!
//! The evaluator checks a query's terms against archetype tables and yields
//! one [`TableMatch`] per distinct resolution. A table matching a wildcard
//! term in several ways yields several matches, in column order. The cache
//! consumes this stream during initial population, single-table event
//! matching, and rematching.

use tracing::trace;

use trestle_foundation::{Entity, Id, WILDCARD};
use trestle_storage::{id_bloom, Table, TableId, TableRecord, World};

use crate::term::{RefFlags, RefName, Term, TermOper};

bitflags::bitflags! {
    /// Classification flags computed when a query is compiled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CompiledFlags: u8 {
        /// Every term matches on the `$this` source without traversal.
        const MATCH_ONLY_SELF = 1 << 0;
        /// At least one term id contains a wildcard.
        const MATCH_WILDCARDS = 1 << 1;
        /// At least one term uses up-traversal or a fixed-entity source.
        const HAS_REFS = 1 << 2;
    }
}

/// A compiled query: the term list plus derived classification.
#[derive(Debug)]
pub struct Query {
    /// The query signature.
    pub terms: Vec<Term>,
    /// Number of fields, one per term.
    pub field_count: usize,
    /// Bloom signature every matching table's signature must contain.
    pub bloom_filter: u64,
    /// Derived classification flags.
    pub flags: CompiledFlags,
}

impl Query {
    /// Compiles a term list.
    ///
    /// # Panics
    ///
    /// Panics if the query has more than 32 terms (the field bitmask width).
    #[must_use]
    pub fn new(terms: Vec<Term>) -> Self {
        assert!(terms.len() <= 32, "a query supports at most 32 terms");

        let field_count = terms.len();
        let mut flags = CompiledFlags::MATCH_ONLY_SELF;
        let mut bloom_filter = 0;

        for term in &terms {
            if term.id().is_wildcard() {
                flags |= CompiledFlags::MATCH_WILDCARDS;
            }
            let up = term.src.flags.contains(RefFlags::UP);
            if up || !term.src.is_this() {
                flags.remove(CompiledFlags::MATCH_ONLY_SELF);
            }
            if up || (term.src.flags.contains(RefFlags::IS_ENTITY) && !term.src.is_this()) {
                flags |= CompiledFlags::HAS_REFS;
            }
            // Only ids that must literally appear in a matching table's
            // signature may contribute to the filter.
            if term.oper == TermOper::And && term.src.is_this() && !up {
                bloom_filter |= id_bloom(term.id());
            }
        }

        Self {
            terms,
            field_count,
            bloom_filter,
            flags,
        }
    }

    /// Returns true if every term matches on `$this` without traversal.
    #[must_use]
    pub fn match_only_self(&self) -> bool {
        self.flags.contains(CompiledFlags::MATCH_ONLY_SELF)
    }

    /// Returns true if any term id contains a wildcard.
    #[must_use]
    pub fn match_wildcards(&self) -> bool {
        self.flags.contains(CompiledFlags::MATCH_WILDCARDS)
    }

    /// Returns true if any term resolves fields on another entity.
    #[must_use]
    pub fn has_refs(&self) -> bool {
        self.flags.contains(CompiledFlags::HAS_REFS)
    }
}

/// One resolution of a query against a table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableMatch {
    /// The matched table.
    pub table: TableId,
    /// Per-field table records naming the backing columns. `None` for
    /// fields that are not set.
    pub trs: Vec<Option<TableRecord>>,
    /// Per-field resolved ids.
    pub ids: Vec<Id>,
    /// Per-field source entities. Null for fields resolved on the iterated
    /// entity itself.
    pub sources: Vec<Entity>,
    /// Bitmask of fields that are set.
    pub set_fields: u32,
    /// Bitmask of fields resolved via up-traversal.
    pub up_fields: u32,
}

impl TableMatch {
    fn new(query: &Query, table: TableId) -> Self {
        Self {
            table,
            trs: vec![None; query.field_count],
            ids: query.terms.iter().map(Term::id).collect(),
            sources: vec![Entity::NULL; query.field_count],
            set_fields: 0,
            up_fields: 0,
        }
    }
}

/// Evaluates compiled queries against a world.
pub struct QueryEvaluator;

impl QueryEvaluator {
    /// Yields every resolution of `query` for every table in the world, in
    /// table-creation order. Empty tables are visited like any other.
    #[must_use]
    pub fn match_all(query: &Query, world: &World) -> Vec<TableMatch> {
        let mut out = Vec::new();
        for &table_id in world.table_ids() {
            if let Some(table) = world.table(table_id) {
                Self::match_into(query, world, table, &mut out);
            }
        }
        out
    }

    /// Yields every resolution of `query` for a single table bound as the
    /// `$this` variable.
    #[must_use]
    pub fn match_table(query: &Query, world: &World, table: &Table) -> Vec<TableMatch> {
        let mut out = Vec::new();
        Self::match_into(query, world, table, &mut out);
        out
    }

    fn match_into(query: &Query, world: &World, table: &Table, out: &mut Vec<TableMatch>) {
        let mut current = TableMatch::new(query, table.id());
        let before = out.len();
        Self::expand(query, world, table, 0, &mut current, out);
        if out.len() > before {
            trace!(table = ?table.id(), matches = out.len() - before, "table matched");
        }
    }

    /// Depth-first expansion over terms. Wildcard terms fork one branch per
    /// matching column, so yields come out in lexicographic column order.
    fn expand(
        query: &Query,
        world: &World,
        table: &Table,
        index: usize,
        current: &mut TableMatch,
        out: &mut Vec<TableMatch>,
    ) {
        let Some(term) = query.terms.get(index) else {
            out.push(current.clone());
            return;
        };
        let pattern = term.id();
        let bit = 1u32 << index;

        if term.oper == TermOper::Not {
            let absent = match Self::term_table(world, table, term) {
                Some(t) => !t.has(pattern),
                None => true,
            };
            if absent {
                Self::clear_field(current, index, pattern);
                Self::expand(query, world, table, index + 1, current, out);
            }
            return;
        }

        let src_table = Self::term_table(world, table, term);
        let mut found = false;

        if let Some(src_table) = src_table {
            if term.src.flags.contains(RefFlags::SELF) {
                let mut col = 0;
                while let Some((column, concrete)) = src_table.search_from(pattern, col) {
                    found = true;
                    current.trs[index] = Some(src_table.record(column));
                    current.ids[index] = concrete;
                    current.sources[index] = Self::fixed_source(term);
                    current.set_fields |= bit;
                    current.up_fields &= !bit;
                    Self::expand(query, world, table, index + 1, current, out);
                    col = column + 1;
                }
            }

            if !found && term.src.flags.contains(RefFlags::UP) {
                if let Some((record, concrete, source)) =
                    Self::resolve_up(world, src_table, pattern, term.trav)
                {
                    found = true;
                    current.trs[index] = Some(record);
                    current.ids[index] = concrete;
                    current.sources[index] = source;
                    current.set_fields |= bit;
                    current.up_fields |= bit;
                    Self::expand(query, world, table, index + 1, current, out);
                }
            }
        }

        if !found && term.oper == TermOper::Optional {
            Self::clear_field(current, index, pattern);
            Self::expand(query, world, table, index + 1, current, out);
        }
    }

    /// The table a term is resolved against: the candidate table for `$this`
    /// sources, the fixed entity's table otherwise.
    fn term_table<'a>(world: &'a World, table: &'a Table, term: &Term) -> Option<&'a Table> {
        match &term.src.name {
            RefName::This => Some(table),
            RefName::Entity(e) => world.table(world.location(*e)?),
            RefName::Var(_) => {
                debug_assert!(false, "named variables are rejected before evaluation");
                None
            }
        }
    }

    fn fixed_source(term: &Term) -> Entity {
        match term.src.name {
            RefName::Entity(e) => e,
            _ => Entity::NULL,
        }
    }

    fn clear_field(current: &mut TableMatch, index: usize, pattern: Id) {
        let bit = 1u32 << index;
        current.trs[index] = None;
        current.ids[index] = pattern;
        current.sources[index] = Entity::NULL;
        current.set_fields &= !bit;
        current.up_fields &= !bit;
    }

    /// Walks ancestors along the traversal relation until one of their
    /// tables contains the pattern. Cycles terminate the walk.
    fn resolve_up(
        world: &World,
        table: &Table,
        pattern: Id,
        trav: Entity,
    ) -> Option<(TableRecord, Id, Entity)> {
        let mut seen = std::collections::HashSet::new();
        let mut cur = table;
        loop {
            let (_, pair) = cur.search(Id::pair(trav, WILDCARD))?;
            let parent = pair.second()?;
            let parent_table = world.table(world.location(parent)?)?;
            if let Some((column, concrete)) = parent_table.search(pattern) {
                return Some((parent_table.record(column), concrete, parent));
            }
            if !seen.insert(parent_table.id()) {
                return None;
            }
            cur = parent_table;
        }
    }
}
