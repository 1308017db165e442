//! Component monitors.
//!
//! A query cache registers a monitor for every id its terms can be affected
//! by. When a structural change touches a monitored id, the world bumps its
//! monitor generation, which is the coarse trigger for cache rematching.

use std::collections::HashMap;

use trestle_foundation::Id;

/// Refcounted registry of monitored ids.
///
/// Monitors may be registered on wildcard patterns such as `(rel, *)`;
/// structural changes always report concrete ids.
#[derive(Debug, Default)]
pub struct MonitorRegistry {
    monitors: HashMap<Id, u32>,
}

impl MonitorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a monitor for `id`, incrementing its refcount.
    pub fn register(&mut self, id: Id) {
        *self.monitors.entry(id).or_insert(0) += 1;
    }

    /// Unregisters a monitor for `id`, decrementing its refcount.
    ///
    /// Removing a monitor that was never registered is a no-op.
    pub fn unregister(&mut self, id: Id) {
        if let Some(count) = self.monitors.get_mut(&id) {
            *count -= 1;
            if *count == 0 {
                self.monitors.remove(&id);
            }
        }
    }

    /// Returns true if any registered monitor matches the changed id.
    #[must_use]
    pub fn is_watched(&self, changed: Id) -> bool {
        self.monitors.keys().any(|&key| key.matches(changed))
    }

    /// Returns the number of distinct monitored ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    /// Returns true if no monitors are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }
}
