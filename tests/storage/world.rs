//! Integration tests for world state
//!
//! Tests entity movement, structural-change events, monitors, and
//! relationship depth.

use trestle_foundation::{Id, WILDCARD};
use trestle_storage::{TableEventKind, World};

// =============================================================================
// Entity Movement
// =============================================================================

#[test]
fn add_id_creates_destination_table_on_demand() {
    let mut world = World::new();
    let a = Id::comp(world.entity());
    let b = Id::comp(world.entity());

    let t1 = world.ensure_table(vec![a]);
    let e = world.spawn_in(t1).unwrap();
    let before = world.table_count();

    let t2 = world.add_id(e, b).unwrap();
    assert_eq!(world.table_count(), before + 1);
    assert_eq!(world.table(t2).unwrap().kind(), &[a, b]);
}

#[test]
fn add_existing_id_is_noop() {
    let mut world = World::new();
    let a = Id::comp(world.entity());

    let t = world.ensure_table(vec![a]);
    let e = world.spawn_in(t).unwrap();
    assert_eq!(world.add_id(e, a).unwrap(), t);
}

#[test]
fn remove_id_moves_back_to_existing_table() {
    let mut world = World::new();
    let a = Id::comp(world.entity());
    let b = Id::comp(world.entity());

    let t1 = world.ensure_table(vec![a]);
    let e = world.spawn_in(t1).unwrap();
    let t2 = world.add_id(e, b).unwrap();
    assert_ne!(t1, t2);

    assert_eq!(world.remove_id(e, b).unwrap(), t1);
    assert_eq!(world.table(t1).unwrap().count(), 1);
    assert_eq!(world.table(t2).unwrap().count(), 0);
}

// =============================================================================
// Events
// =============================================================================

#[test]
fn event_ids_are_monotonic() {
    let mut world = World::new();
    let a = Id::comp(world.entity());
    let b = Id::comp(world.entity());

    world.ensure_table(vec![a]);
    world.ensure_table(vec![b]);
    let events = world.drain_events();

    assert_eq!(events.len(), 2);
    assert!(events[0].event_id < events[1].event_id);
    assert!(events.iter().all(|e| e.kind == TableEventKind::TableCreate));
}

#[test]
fn drain_empties_the_queue() {
    let mut world = World::new();
    let a = Id::comp(world.entity());
    world.ensure_table(vec![a]);

    assert_eq!(world.drain_events().len(), 1);
    assert!(world.drain_events().is_empty());
}

// =============================================================================
// Monitors
// =============================================================================

#[test]
fn wildcard_monitor_catches_pair_changes() {
    let mut world = World::new();
    let rel = world.entity();
    let target = world.entity();

    world.register_monitor(Id::pair(rel, WILDCARD));
    let before = world.monitor_generation();

    world.ensure_table(vec![Id::pair(rel, target)]);
    assert!(world.monitor_generation() > before);
}

#[test]
fn entity_moves_bump_generation_for_watched_ids() {
    let mut world = World::new();
    let a = Id::comp(world.entity());
    let b = Id::comp(world.entity());

    let t1 = world.ensure_table(vec![a]);
    // Pre-create the destination so the move itself creates no table.
    world.ensure_table(vec![a, b]);
    let e = world.spawn_in(t1).unwrap();

    world.register_monitor(b);
    let before = world.monitor_generation();

    world.add_id(e, b).unwrap();
    assert!(world.monitor_generation() > before);
}

#[test]
fn unwatched_changes_leave_generation_alone() {
    let mut world = World::new();
    let a = Id::comp(world.entity());
    let b = Id::comp(world.entity());

    world.register_monitor(a);
    let before = world.monitor_generation();
    world.ensure_table(vec![b]);
    assert_eq!(world.monitor_generation(), before);
}

// =============================================================================
// Relationship Depth
// =============================================================================

#[test]
fn depth_counts_traversal_hops() {
    let mut world = World::new();
    let child_of = world.entity();
    let tag = Id::comp(world.entity());

    let root_table = world.ensure_table(vec![tag]);
    let root = world.spawn_in(root_table).unwrap();

    let child_table = world.ensure_table(vec![tag, Id::pair(child_of, root)]);
    let child = world.spawn_in(child_table).unwrap();

    let grandchild_table = world.ensure_table(vec![tag, Id::pair(child_of, child)]);

    assert_eq!(world.relation_depth(child_of, root_table), 0);
    assert_eq!(world.relation_depth(child_of, child_table), 1);
    assert_eq!(world.relation_depth(child_of, grandchild_table), 2);
}

#[test]
fn depth_of_unrelated_relation_is_zero() {
    let mut world = World::new();
    let child_of = world.entity();
    let other = world.entity();
    let tag = Id::comp(world.entity());

    let root_table = world.ensure_table(vec![tag]);
    let root = world.spawn_in(root_table).unwrap();
    let child_table = world.ensure_table(vec![tag, Id::pair(child_of, root)]);

    assert_eq!(world.relation_depth(other, child_table), 0);
}
