//! Integration tests for the group index
//!
//! Tests custom grouping callbacks, the builtin pair lookup, group lifecycle
//! hooks, group statistics, and group-windowed iteration.

use std::cell::RefCell;
use std::rc::Rc;

use trestle_foundation::{Entity, ErrorKind, Id};
use trestle_query::{GroupByFn, QueryCache, QueryDesc, Term};
use trestle_storage::{TableId, World};

fn deliver(world: &mut World, cache: &mut QueryCache) {
    for event in world.drain_events() {
        cache.on_event(world, &event);
    }
}

/// Groups tables by whether they carry the marker component: 10 with it,
/// 20 without.
fn marker_grouping(marker: Entity) -> GroupByFn {
    Box::new(move |_world, table, _id| if table.has(Id::comp(marker)) { 10 } else { 20 })
}

// =============================================================================
// Custom Grouping
// =============================================================================

#[test]
fn ascending_groups_order_the_iteration_list() {
    let mut world = World::new();
    let a = world.entity();
    let b = world.entity();

    let t1 = world.ensure_table(vec![Id::comp(a)]);
    let t2 = world.ensure_table(vec![Id::comp(a), Id::comp(b)]);
    world.spawn_in(t1).unwrap();
    world.spawn_in(t2).unwrap();
    world.drain_events();

    let cache = QueryCache::new(
        &mut world,
        QueryDesc::new()
            .with_term(Term::new(a))
            .with_group_by_callback(marker_grouping(b)),
    )
    .unwrap();

    // T2 lands in group 10, T1 in group 20; ascending key order puts the
    // group-10 run first even though T1 was inserted first.
    let order: Vec<TableId> = cache.iter(&world).map(|m| m.table()).collect();
    assert_eq!(order, vec![t2, t1]);

    let groups: Vec<u64> = cache.iter(&world).map(|m| m.group_id()).collect();
    assert_eq!(groups, vec![10, 20]);
    cache.check_consistency();
}

#[test]
fn builtin_grouping_reads_the_pair_target() {
    let mut world = World::new();
    let a = world.entity();
    let region = world.entity();
    let north = world.entity();
    let south = world.entity();

    let t1 = world.ensure_table(vec![Id::comp(a), Id::pair(region, south)]);
    let t2 = world.ensure_table(vec![Id::comp(a), Id::pair(region, north)]);
    let t3 = world.ensure_table(vec![Id::comp(a)]);
    world.spawn_in(t1).unwrap();
    world.spawn_in(t2).unwrap();
    world.spawn_in(t3).unwrap();
    world.drain_events();

    let cache = QueryCache::new(
        &mut world,
        QueryDesc::new()
            .with_term(Term::new(a))
            .with_group_by(Id::comp(region)),
    )
    .unwrap();

    // Tables without the pair land in group 0, which sorts first; then the
    // pair targets in allocation order (north before south).
    let groups: Vec<u64> = cache.iter(&world).map(|m| m.group_id()).collect();
    assert_eq!(groups, vec![0, north.0, south.0]);
    cache.check_consistency();
}

// =============================================================================
// Group Lifecycle Hooks
// =============================================================================

#[test]
fn group_hooks_fire_on_create_and_last_removal() {
    let mut world = World::new();
    let a = world.entity();
    let b = world.entity();

    let created: Rc<RefCell<Vec<u64>>> = Rc::new(RefCell::new(Vec::new()));
    let deleted: Rc<RefCell<Vec<u64>>> = Rc::new(RefCell::new(Vec::new()));
    let created_hook = Rc::clone(&created);
    let deleted_hook = Rc::clone(&deleted);

    let mut cache = QueryCache::new(
        &mut world,
        QueryDesc::new()
            .with_term(Term::new(a))
            .with_group_by_callback(marker_grouping(b))
            .with_on_group_create(Box::new(move |_world, group_id| {
                created_hook.borrow_mut().push(group_id);
                Box::new(group_id * 2)
            }))
            .with_on_group_delete(Box::new(move |_world, group_id, ctx| {
                let ctx = ctx.and_then(|c| c.downcast::<u64>().ok());
                assert_eq!(ctx.as_deref(), Some(&(group_id * 2)));
                deleted_hook.borrow_mut().push(group_id);
            }))
            .match_empty_tables(),
    )
    .unwrap();

    let t1 = world.ensure_table(vec![Id::comp(a)]);
    deliver(&mut world, &mut cache);
    assert_eq!(*created.borrow(), vec![20]);

    // The context produced on creation is visible through the cache.
    assert_eq!(
        cache.group_ctx(20).and_then(|c| c.downcast_ref::<u64>()),
        Some(&40)
    );

    world.delete_table(t1).unwrap();
    deliver(&mut world, &mut cache);
    assert_eq!(*deleted.borrow(), vec![20]);
    assert!(cache.group_info(20).is_none());
    cache.check_consistency();
}

// =============================================================================
// Group Statistics
// =============================================================================

#[test]
fn group_info_tracks_table_counts() {
    let mut world = World::new();
    let a = world.entity();
    let b = world.entity();
    let salt = world.entity();

    world.ensure_table(vec![Id::comp(a), Id::comp(b)]);
    world.ensure_table(vec![Id::comp(a), Id::comp(b), Id::comp(salt)]);
    world.ensure_table(vec![Id::comp(a)]);
    world.drain_events();

    let cache = QueryCache::new(
        &mut world,
        QueryDesc::new()
            .with_term(Term::new(a))
            .with_group_by_callback(marker_grouping(b))
            .match_empty_tables(),
    )
    .unwrap();

    assert_eq!(cache.group_info(10).unwrap().table_count, 2);
    assert_eq!(cache.group_info(20).unwrap().table_count, 1);
    assert!(cache.group_info(99).is_none());
}

// =============================================================================
// Group-Windowed Iteration
// =============================================================================

#[test]
fn set_group_restricts_iteration_to_one_window() {
    let mut world = World::new();
    let a = world.entity();
    let b = world.entity();
    let salt = world.entity();

    let t1 = world.ensure_table(vec![Id::comp(a)]);
    let t2 = world.ensure_table(vec![Id::comp(a), Id::comp(b)]);
    let t3 = world.ensure_table(vec![Id::comp(a), Id::comp(b), Id::comp(salt)]);
    world.spawn_in(t1).unwrap();
    world.spawn_in(t2).unwrap();
    world.spawn_in(t3).unwrap();
    world.drain_events();

    let cache = QueryCache::new(
        &mut world,
        QueryDesc::new()
            .with_term(Term::new(a))
            .with_group_by_callback(marker_grouping(b)),
    )
    .unwrap();

    let mut it = cache.iter(&world);
    it.set_group(10).unwrap();
    let group_10: Vec<TableId> = it.map(|m| m.table()).collect();
    assert_eq!(group_10, vec![t2, t3]);

    let mut it = cache.iter(&world);
    it.set_group(20).unwrap();
    let group_20: Vec<TableId> = it.map(|m| m.table()).collect();
    assert_eq!(group_20, vec![t1]);
}

#[test]
fn set_group_miss_yields_nothing() {
    let mut world = World::new();
    let a = world.entity();
    let b = world.entity();

    world.ensure_table(vec![Id::comp(a)]);
    world.drain_events();

    let cache = QueryCache::new(
        &mut world,
        QueryDesc::new()
            .with_term(Term::new(a))
            .with_group_by_callback(marker_grouping(b))
            .match_empty_tables(),
    )
    .unwrap();

    let mut it = cache.iter(&world);
    it.set_group(12345).unwrap();
    assert_eq!(it.count(), 0);
}

#[test]
fn set_group_mid_iteration_is_rejected() {
    let mut world = World::new();
    let a = world.entity();
    let b = world.entity();

    let t1 = world.ensure_table(vec![Id::comp(a)]);
    world.spawn_in(t1).unwrap();
    world.drain_events();

    let cache = QueryCache::new(
        &mut world,
        QueryDesc::new()
            .with_term(Term::new(a))
            .with_group_by_callback(marker_grouping(b)),
    )
    .unwrap();

    let mut it = cache.iter(&world);
    assert!(it.next().is_some());
    let err = it.set_group(20).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidIteratorState));
}
