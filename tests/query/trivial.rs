//! Integration tests for record layouts
//!
//! Tests trivial classification, the full-layout extended attributes, and
//! the shared-vector discipline.

use trestle_foundation::{Entity, Id, WILDCARD};
use trestle_query::{QueryCache, QueryDesc, Term, TermOper, TermRef};
use trestle_storage::World;

// =============================================================================
// Trivial Classification
// =============================================================================

#[test]
fn self_only_query_is_trivial() {
    let mut world = World::new();
    let a = world.entity();
    let b = world.entity();

    let cache = QueryCache::new(
        &mut world,
        QueryDesc::new().with_term(Term::new(a)).with_term(Term::new(b)),
    )
    .unwrap();
    assert!(cache.is_trivial());
}

#[test]
fn wildcards_disable_trivial_layout() {
    let mut world = World::new();
    let rel = world.entity();

    let cache = QueryCache::new(
        &mut world,
        QueryDesc::new().with_term(Term::pair(rel, WILDCARD)),
    )
    .unwrap();
    assert!(!cache.is_trivial());
}

#[test]
fn grouping_disables_trivial_layout() {
    let mut world = World::new();
    let a = world.entity();
    let rel = world.entity();

    let cache = QueryCache::new(
        &mut world,
        QueryDesc::new()
            .with_term(Term::new(a))
            .with_group_by(Id::comp(rel)),
    )
    .unwrap();
    assert!(!cache.is_trivial());
}

#[test]
fn change_detection_disables_trivial_layout() {
    let mut world = World::new();
    let a = world.entity();

    let cache = QueryCache::new(
        &mut world,
        QueryDesc::new().with_term(Term::new(a)).detect_changes(),
    )
    .unwrap();
    assert!(!cache.is_trivial());
}

#[test]
fn order_by_forces_full_layout() {
    let mut world = World::new();
    let a = world.entity();

    // Identical descriptor, once plain and once ordered.
    let plain =
        QueryCache::new(&mut world, QueryDesc::new().with_term(Term::new(a))).unwrap();
    assert!(plain.is_trivial());
    plain.fini(&mut world);

    let ordered = QueryCache::new(
        &mut world,
        QueryDesc::new()
            .with_term(Term::new(a))
            .with_order_by(Id::comp(a), Box::new(|l, r| l.0.cmp(&r.0))),
    )
    .unwrap();
    assert!(!ordered.is_trivial());
    assert_eq!(ordered.order_by(), Some(Id::comp(a)));
}

#[test]
fn order_by_clears_empty_table_matching() {
    let mut world = World::new();
    let a = world.entity();

    world.ensure_table(vec![Id::comp(a)]);
    world.drain_events();

    let cache = QueryCache::new(
        &mut world,
        QueryDesc::new()
            .with_term(Term::new(a))
            .match_empty_tables()
            .with_order_by(Id::comp(a), Box::new(|l: Entity, r: Entity| l.0.cmp(&r.0))),
    )
    .unwrap();

    // The empty table is cached and part of the sorted slices, but the
    // match-empty flag was cleared by the ordering request.
    assert_eq!(cache.table_count(), 1);
    assert_eq!(cache.sorted_len(), 1);
    assert_eq!(cache.iter(&world).count(), 0);
}

#[test]
fn trivial_records_report_declared_ids_and_null_sources() {
    let mut world = World::new();
    let a = world.entity();
    let b = world.entity();

    let t = world.ensure_table(vec![Id::comp(a), Id::comp(b)]);
    world.spawn_in(t).unwrap();
    world.drain_events();

    let cache = QueryCache::new(
        &mut world,
        QueryDesc::new().with_term(Term::new(a)).with_term(Term::new(b)),
    )
    .unwrap();
    assert!(cache.is_trivial());

    let views: Vec<_> = cache.iter(&world).collect();
    assert_eq!(views.len(), 1);
    let m = &views[0];
    assert_eq!(m.ids(), &[Id::comp(a), Id::comp(b)]);
    assert_eq!(m.sources(), &[Entity::NULL, Entity::NULL]);
    assert_eq!(m.set_fields(), 0b11);
    assert_eq!(m.up_fields(), 0);
    assert!(m.shares_default_ids());
    assert!(m.shares_default_sources());
    assert!(m.source_tables().is_none());
}

// =============================================================================
// Shared-Vector Discipline
// =============================================================================

#[test]
fn default_resolution_shares_cache_vectors() {
    let mut world = World::new();
    let a = world.entity();

    let t = world.ensure_table(vec![Id::comp(a)]);
    world.spawn_in(t).unwrap();
    world.drain_events();

    // Change detection forces the full layout without changing resolution.
    let cache = QueryCache::new(
        &mut world,
        QueryDesc::new().with_term(Term::new(a)).detect_changes(),
    )
    .unwrap();

    let views: Vec<_> = cache.iter(&world).collect();
    assert!(views[0].shares_default_ids());
    assert!(views[0].shares_default_sources());
}

#[test]
fn wildcard_resolution_gets_private_id_vector() {
    let mut world = World::new();
    let rel = world.entity();
    let x = world.entity();

    let t = world.ensure_table(vec![Id::pair(rel, x)]);
    world.spawn_in(t).unwrap();
    world.drain_events();

    let cache = QueryCache::new(
        &mut world,
        QueryDesc::new().with_term(Term::pair(rel, WILDCARD)),
    )
    .unwrap();

    let views: Vec<_> = cache.iter(&world).collect();
    let m = &views[0];
    // The resolved id differs from the declared wildcard, so the record
    // owns a private vector whose contents differ from the default.
    assert!(!m.shares_default_ids());
    assert_eq!(m.ids(), &[Id::pair(rel, x)]);
    assert!(m.shares_default_sources());
}

#[test]
fn up_resolution_gets_private_sources_and_source_tables() {
    let mut world = World::new();
    let child_of = world.entity();
    let a = world.entity();

    let parent_table = world.ensure_table(vec![Id::comp(a)]);
    let parent = world.spawn_in(parent_table).unwrap();
    let child_table = world.ensure_table(vec![Id::pair(child_of, parent)]);
    world.spawn_in(child_table).unwrap();
    world.drain_events();

    let cache = QueryCache::new(
        &mut world,
        QueryDesc::new().with_term(Term::new(a).up(child_of)),
    )
    .unwrap();

    let views: Vec<_> = cache.iter(&world).collect();
    // Both tables match: the parent on itself, the child via traversal.
    assert_eq!(views.len(), 2);

    let child_match = views.iter().find(|m| m.table() == child_table).unwrap();
    assert!(!child_match.shares_default_sources());
    assert_eq!(child_match.sources(), &[parent]);
    assert_eq!(child_match.up_fields(), 1);
    assert_eq!(
        child_match.source_tables(),
        Some(&[Some(parent_table)][..])
    );

    let parent_match = views.iter().find(|m| m.table() == parent_table).unwrap();
    assert!(parent_match.shares_default_sources());
    assert_eq!(parent_match.up_fields(), 0);
}

// =============================================================================
// Operators in the Full Layout
// =============================================================================

#[test]
fn optional_and_not_fields_round_trip_set_masks() {
    let mut world = World::new();
    let a = world.entity();
    let b = world.entity();
    let c = world.entity();

    let t = world.ensure_table(vec![Id::comp(a)]);
    world.spawn_in(t).unwrap();
    world.drain_events();

    let cache = QueryCache::new(
        &mut world,
        QueryDesc::new()
            .with_term(Term::new(a))
            .with_term(Term::new(b).with_oper(TermOper::Optional))
            .with_term(Term::new(c).with_oper(TermOper::Not)),
    )
    .unwrap();

    let views: Vec<_> = cache.iter(&world).collect();
    assert_eq!(views.len(), 1);
    let m = &views[0];
    assert_eq!(m.set_fields(), 0b001);
    assert_eq!(m.trs()[0].map(|r| r.table), Some(t));
    assert_eq!(m.trs()[1], None);
    assert_eq!(m.trs()[2], None);
}

#[test]
fn fixed_source_term_reports_the_source_entity() {
    let mut world = World::new();
    let a = world.entity();
    let settings = world.entity();

    let settings_table = world.ensure_table(vec![Id::comp(settings)]);
    let config = world.spawn_in(settings_table).unwrap();
    let t = world.ensure_table(vec![Id::comp(a)]);
    world.spawn_in(t).unwrap();
    world.drain_events();

    let cache = QueryCache::new(
        &mut world,
        QueryDesc::new()
            .with_term(Term::new(a))
            .with_term(Term::new(settings).with_src(TermRef::entity(config))),
    )
    .unwrap();
    assert!(!cache.is_trivial());

    let views: Vec<_> = cache.iter(&world).collect();
    let m = views.iter().find(|m| m.table() == t).unwrap();
    assert_eq!(m.sources(), &[Entity::NULL, config]);
    assert!(!m.shares_default_sources());
    assert_eq!(m.source_tables().unwrap()[1], Some(settings_table));
}
