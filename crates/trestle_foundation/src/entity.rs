//! Entity identifiers.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier for an entity.
///
/// Entities name everything in a world: plain objects, component types, and
/// relations. Ids below [`Entity::FIRST_USER`] are reserved for builtins.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Entity(pub u64);

/// The wildcard pseudo-entity, matching any entity in an id position.
pub const WILDCARD: Entity = Entity(1);

/// The builtin inheritance relation, used as the default traversal relation.
pub const INHERIT: Entity = Entity(2);

impl Entity {
    /// Sentinel for "no entity". Also the source value for fields resolved
    /// on the iterated entity itself.
    pub const NULL: Entity = Entity(0);

    /// First id handed out to user entities; lower ids are builtins.
    pub const FIRST_USER: u64 = 256;

    /// Returns true if this is the null sentinel.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Returns true if this is the wildcard pseudo-entity.
    #[must_use]
    pub const fn is_wildcard(self) -> bool {
        self.0 == WILDCARD.0
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Entity(null)")
        } else if self.is_wildcard() {
            write!(f, "Entity(*)")
        } else {
            write!(f, "Entity({})", self.0)
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_wildcard() {
            write!(f, "*")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}
