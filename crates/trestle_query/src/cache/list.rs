//! Iteration list and group index maintenance.
//!
//! The cache keeps one global doubly-linked list of match records. When
//! grouping is enabled, the group index overlays that list: every group is
//! a contiguous `first..last` segment, and the global list is the
//! concatenation of groups in key order. Insertion and removal splice
//! records while keeping both views consistent; the group-boundary
//! bookkeeping here is the most delicate part of the cache.

use trestle_foundation::{Id, WILDCARD};
use trestle_storage::{Table, TableId, World};

use super::arena::MatchKey;
use super::{GroupInfo, MatchList, QueryCache};

impl MatchList {
    pub(crate) fn new(ctx: Option<Box<dyn std::any::Any>>) -> Self {
        Self {
            first: None,
            last: None,
            info: GroupInfo {
                table_count: 0,
                match_count: 0,
                ctx,
            },
        }
    }
}

/// The builtin grouping callback: matches `(group_by, *)` against the table
/// and returns the second element of the matched pair, or zero on miss.
pub(crate) fn default_group_by(_world: &World, table: &Table, id: Id) -> u64 {
    match table.search(Id::pair(id.first(), WILDCARD)) {
        Some((_, found)) => found.second().map_or(0, |target| target.0),
        None => 0,
    }
}

impl QueryCache {
    /// Returns true if this cache partitions its list into groups.
    pub(crate) fn grouping_enabled(&self) -> bool {
        self.group_by_callback.is_some()
    }

    /// Computes the group key for a table, or zero when grouping is off.
    pub(crate) fn group_id_for(&self, world: &World, table: TableId) -> u64 {
        match (&self.group_by_callback, world.table(table)) {
            (Some(callback), Some(t)) => callback(world, t, self.group_by_id),
            _ => 0,
        }
    }

    fn compute_group_id(&mut self, world: &World, key: MatchKey) {
        if self.grouping_enabled() {
            let table = self.nodes.get(key).table;
            let group_id = self.group_id_for(world, table);
            self.nodes.get_mut(key).group_id = group_id;
        } else if !self.trivial {
            self.nodes.get_mut(key).group_id = 0;
        }
    }

    fn ensure_group(&mut self, world: &World, group_id: u64) {
        if !self.groups.contains_key(&group_id) {
            let ctx = self
                .on_group_create
                .as_ref()
                .map(|hook| hook(world, group_id));
            self.groups.insert(group_id, MatchList::new(ctx));
        }
    }

    fn remove_group(&mut self, world: &World, group_id: u64) {
        if let Some(mut group) = self.groups.remove(&group_id) {
            if let Some(hook) = &self.on_group_delete {
                hook(world, group_id, group.info.ctx.take());
            }
        }
    }

    /// Finds the record after which a new group's first node is spliced:
    /// the last node of the nearest group on the smaller side (ascending)
    /// or larger side (descending). `None` means the group goes first.
    fn find_group_insertion_node(&self, group_id: u64) -> Option<MatchKey> {
        debug_assert!(self.grouping_enabled());
        let desc = self.group_desc;
        let mut closest: Option<(u64, MatchKey)> = None;

        for (&id, list) in &self.groups {
            if id == group_id {
                continue;
            }
            // Ascending order looks for the closest smaller key, descending
            // for the closest larger key.
            if (!desc && id >= group_id) || (desc && id <= group_id) {
                continue;
            }
            let Some(last) = list.last else {
                debug_assert!(list.first.is_none());
                continue;
            };
            let better = match closest {
                None => true,
                Some((closest_id, _)) => {
                    if desc {
                        id < closest_id
                    } else {
                        id > closest_id
                    }
                }
            };
            if better {
                closest = Some((id, last));
            }
        }

        closest.map(|(_, last)| last)
    }

    /// Splices a new group's first node into the global list at the position
    /// dictated by its key.
    fn splice_new_group(&mut self, key: MatchKey, group_id: u64) {
        match self.find_group_insertion_node(group_id) {
            None => {
                // This group goes first in the global list.
                if let Some(old_first) = self.list.first {
                    self.nodes.get_mut(key).next = Some(old_first);
                    self.nodes.get_mut(old_first).prev = Some(key);
                    self.list.first = Some(key);
                } else {
                    debug_assert!(self.list.last.is_none());
                    self.list.first = Some(key);
                    self.list.last = Some(key);
                }
            }
            Some(after) => {
                debug_assert!(self.list.first.is_some());
                debug_assert!(self.list.last.is_some());

                let before = self.nodes.get(after).next;
                self.nodes.get_mut(key).prev = Some(after);
                self.nodes.get_mut(key).next = before;
                self.nodes.get_mut(after).next = Some(key);
                if let Some(before) = before {
                    self.nodes.get_mut(before).prev = Some(key);
                } else {
                    debug_assert_eq!(self.list.last, Some(after));
                    self.list.last = Some(key);
                }
            }
        }
    }

    /// Inserts an unlinked record into the iteration list.
    pub(crate) fn insert_node(&mut self, world: &World, key: MatchKey) {
        {
            let node = self.nodes.get(key);
            debug_assert!(node.prev.is_none() && node.next.is_none());
        }

        self.compute_group_id(world, key);

        if self.grouping_enabled() {
            let group_id = self.nodes.get(key).group_id;
            self.ensure_group(world, group_id);

            let group_last = self.groups[&group_id].last;
            if let Some(last) = group_last {
                // Append after the group's last node, which may sit in the
                // middle of the global list.
                let last_next = self.nodes.get(last).next;
                {
                    let node = self.nodes.get_mut(key);
                    node.prev = Some(last);
                    node.next = last_next;
                }
                self.nodes.get_mut(last).next = Some(key);
                if let Some(last_next) = last_next {
                    self.nodes.get_mut(last_next).prev = Some(key);
                }
                let group = self.groups.get_mut(&group_id).expect("group exists");
                group.last = Some(key);
                if self.list.last == Some(last) {
                    self.list.last = Some(key);
                }
            } else {
                let group = self.groups.get_mut(&group_id).expect("group exists");
                group.first = Some(key);
                group.last = Some(key);
                self.splice_new_group(key, group_id);
            }

            let group = self.groups.get_mut(&group_id).expect("group exists");
            group.info.table_count += 1;
            group.info.match_count += 1;
        } else if let Some(last) = self.list.last {
            self.nodes.get_mut(key).prev = Some(last);
            self.nodes.get_mut(last).next = Some(key);
            self.list.last = Some(key);
        } else {
            debug_assert!(self.list.first.is_none());
            self.list.first = Some(key);
            self.list.last = Some(key);
        }

        self.list.info.table_count += 1;
        self.match_count += 1;

        debug_assert_ne!(self.nodes.get(key).prev, Some(key));
        debug_assert_ne!(self.nodes.get(key).next, Some(key));
        debug_assert!(self.list.first.is_some());
        debug_assert!(self.list.last.is_some());
    }

    /// Unlinks a record from the iteration list and its group.
    ///
    /// Removing the last record of a group destroys the group; the group's
    /// endpoints are rebound only to its own remaining members, never to a
    /// neighbouring group's record.
    pub(crate) fn remove_node(&mut self, world: &World, key: MatchKey) {
        let (mut prev, mut next, group_id) = {
            let node = self.nodes.get(key);
            (node.prev, node.next, node.group_id)
        };
        debug_assert_ne!(prev, Some(key));
        debug_assert_ne!(next, Some(key));

        let grouping = self.grouping_enabled();
        let list_first = if grouping {
            self.groups.get(&group_id).and_then(|g| g.first)
        } else {
            self.list.first
        };
        if list_first.is_none() {
            // The containing list has no members, so this record was never
            // linked.
            debug_assert!(prev.is_none() && next.is_none());
            return;
        }

        debug_assert!(prev.is_some() || self.list.first == Some(key));
        debug_assert!(next.is_some() || self.list.last == Some(key));

        if let Some(prev) = prev {
            self.nodes.get_mut(prev).next = next;
        }
        if let Some(next) = next {
            self.nodes.get_mut(next).prev = prev;
        }

        let mut group_removed = false;
        if grouping {
            {
                let group = self.groups.get_mut(&group_id).expect("group exists");
                debug_assert!(group.info.table_count > 0);
                group.info.table_count -= 1;
                group.info.match_count += 1;
            }

            // Keep the global endpoints valid before looking at neighbours.
            if self.list.first == Some(key) {
                debug_assert!(prev.is_none());
                self.list.first = next;
                prev = next;
            }
            if self.list.last == Some(key) {
                debug_assert!(next.is_none());
                self.list.last = prev;
                next = prev;
            }

            debug_assert!(self.list.info.table_count > 0);
            self.list.info.table_count -= 1;

            // A neighbour in another group must not become a group endpoint.
            if let Some(p) = prev {
                if self.nodes.get(p).group_id != group_id {
                    prev = next;
                }
            }
            if let Some(n) = next {
                if self.nodes.get(n).group_id != group_id {
                    next = prev;
                }
            }

            // Check again: both neighbours may belong to other groups.
            let emptied = match prev {
                None => next.is_none(),
                Some(p) => self.nodes.get(p).group_id != group_id,
            };
            if emptied {
                self.remove_group(world, group_id);
                group_removed = true;
            }
        } else {
            debug_assert!(self.list.info.table_count > 0);
            self.list.info.table_count -= 1;
        }

        if !group_removed {
            if grouping {
                let group = self.groups.get_mut(&group_id).expect("group exists");
                if group.first == Some(key) {
                    group.first = next;
                }
                if group.last == Some(key) {
                    group.last = prev;
                }
            } else {
                if self.list.first == Some(key) {
                    self.list.first = next;
                }
                if self.list.last == Some(key) {
                    self.list.last = prev;
                }
            }
        }

        let node = self.nodes.get_mut(key);
        node.prev = None;
        node.next = None;

        self.match_count += 1;
    }
}
