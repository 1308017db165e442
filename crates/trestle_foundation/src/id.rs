//! Component ids and relationship pairs.
//!
//! An [`Id`] names one element of a table's type signature: either a plain
//! component, or a `(relation, target)` pair. Either position of a pair may
//! hold the wildcard, which makes the id a pattern rather than a concrete id.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::entity::Entity;

/// A component id or relationship pair.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Id {
    /// A plain component.
    Comp(Entity),
    /// A `(relation, target)` pair.
    Pair(Entity, Entity),
}

impl Id {
    /// Creates a plain component id.
    #[must_use]
    pub const fn comp(component: Entity) -> Self {
        Self::Comp(component)
    }

    /// Creates a relationship pair id.
    #[must_use]
    pub const fn pair(relation: Entity, target: Entity) -> Self {
        Self::Pair(relation, target)
    }

    /// Returns the first element: the component, or the pair's relation.
    #[must_use]
    pub const fn first(self) -> Entity {
        match self {
            Self::Comp(c) | Self::Pair(c, _) => c,
        }
    }

    /// Returns the pair's target, if this is a pair.
    #[must_use]
    pub const fn second(self) -> Option<Entity> {
        match self {
            Self::Comp(_) => None,
            Self::Pair(_, t) => Some(t),
        }
    }

    /// Returns true if this is a relationship pair.
    #[must_use]
    pub const fn is_pair(self) -> bool {
        matches!(self, Self::Pair(_, _))
    }

    /// Returns true if either position holds the wildcard.
    #[must_use]
    pub const fn is_wildcard(self) -> bool {
        match self {
            Self::Comp(c) => c.is_wildcard(),
            Self::Pair(r, t) => r.is_wildcard() || t.is_wildcard(),
        }
    }

    /// Matches this id, treated as a pattern, against a concrete id.
    ///
    /// Wildcard positions in `self` match anything in the same position of
    /// `other`. A pair pattern never matches a plain component and vice
    /// versa.
    #[must_use]
    pub fn matches(self, other: Id) -> bool {
        match (self, other) {
            (Self::Comp(a), Self::Comp(b)) => a.is_wildcard() || a == b,
            (Self::Pair(ar, at), Self::Pair(br, bt)) => {
                (ar.is_wildcard() || ar == br) && (at.is_wildcard() || at == bt)
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Comp(c) => write!(f, "Id({c})"),
            Self::Pair(r, t) => write!(f, "Id({r},{t})"),
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Comp(c) => write!(f, "{c}"),
            Self::Pair(r, t) => write!(f, "({r},{t})"),
        }
    }
}
