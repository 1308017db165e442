//! Query signature model.
//!
//! A query is a list of [`Term`]s. Each term has a source (which entity the
//! term is evaluated against), a first reference (the predicate) and an
//! optional second reference (the object of a relationship pair), an
//! operator, and inout flags. The [`QueryDesc`] builder carries the terms
//! plus the cache configuration: grouping, ordering, and lifecycle hooks.

use std::any::Any;
use std::cmp::Ordering;

use trestle_foundation::{Entity, Id, INHERIT, WILDCARD};
use trestle_storage::{Table, World};

bitflags::bitflags! {
    /// Flags qualifying a term reference.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RefFlags: u16 {
        /// Match on the source entity itself.
        const SELF = 1 << 0;
        /// Match by traversing the term's traversal relation upwards.
        const UP = 1 << 1;
        /// Group results by traversal depth (breadth-first iteration).
        const CASCADE = 1 << 2;
        /// Reverse the cascade group order (deepest first).
        const DESC = 1 << 3;
        /// The reference names a fixed entity rather than a variable.
        const IS_ENTITY = 1 << 4;
    }
}

bitflags::bitflags! {
    /// Query-level configuration flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct QueryFlags: u16 {
        /// Store empty tables in the iteration list instead of filtering
        /// them out at iteration time.
        const MATCH_EMPTY_TABLES = 1 << 0;
        /// Reserve per-record change-detection state. Disables the trivial
        /// record layout.
        const DETECT_CHANGES = 1 << 1;
    }
}

/// What a term reference names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefName {
    /// The `$this` variable: the entity being iterated.
    This,
    /// A fixed entity (which may be the wildcard pseudo-entity).
    Entity(Entity),
    /// A named variable. Not supported by cached queries; rejected at
    /// cache construction.
    Var(String),
}

/// One reference position of a term: a name plus qualifying flags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TermRef {
    /// What the reference names.
    pub name: RefName,
    /// Qualifying flags.
    pub flags: RefFlags,
}

impl TermRef {
    /// The `$this` variable, matched on the entity itself.
    #[must_use]
    pub fn this() -> Self {
        Self {
            name: RefName::This,
            flags: RefFlags::SELF,
        }
    }

    /// A fixed entity reference.
    #[must_use]
    pub fn entity(e: Entity) -> Self {
        Self {
            name: RefName::Entity(e),
            flags: RefFlags::SELF | RefFlags::IS_ENTITY,
        }
    }

    /// A named variable reference. Cached queries reject these.
    #[must_use]
    pub fn var(name: impl Into<String>) -> Self {
        Self {
            name: RefName::Var(name.into()),
            flags: RefFlags::SELF,
        }
    }

    /// The wildcard reference.
    #[must_use]
    pub fn wildcard() -> Self {
        Self::entity(WILDCARD)
    }

    /// Returns true if this is the `$this` variable.
    #[must_use]
    pub fn is_this(&self) -> bool {
        self.name == RefName::This
    }

    /// Returns the referenced entity, treating variables as wildcards.
    #[must_use]
    pub fn entity_or_wildcard(&self) -> Entity {
        match self.name {
            RefName::This | RefName::Var(_) => WILDCARD,
            RefName::Entity(e) => e,
        }
    }
}

/// Term operator.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum TermOper {
    /// The table must contain the term's id.
    #[default]
    And,
    /// The table must not contain the term's id.
    Not,
    /// The field is populated when present and left unset otherwise.
    Optional,
}

/// Term access declaration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum TermInOut {
    /// Access inferred from the term shape.
    #[default]
    Default,
    /// Read-only access.
    In,
    /// Write-only access.
    Out,
    /// Read-write access.
    InOut,
    /// Filter-only: the term constrains matching but provides no field
    /// data. Not supported by cached queries; rejected at construction.
    Filter,
}

/// One clause of a query signature.
#[derive(Clone, Debug)]
pub struct Term {
    /// The entity the term is evaluated against.
    pub src: TermRef,
    /// The predicate: a component or pair relation.
    pub first: TermRef,
    /// The object of a relationship pair, if any.
    pub second: Option<TermRef>,
    /// The term operator.
    pub oper: TermOper,
    /// Access declaration.
    pub inout: TermInOut,
    /// Traversal relation for up-traversal and cascade.
    pub trav: Entity,
}

impl Term {
    /// A term matching a plain component on `$this`.
    #[must_use]
    pub fn new(component: Entity) -> Self {
        Self {
            src: TermRef::this(),
            first: TermRef::entity(component),
            second: None,
            oper: TermOper::default(),
            inout: TermInOut::default(),
            trav: INHERIT,
        }
    }

    /// A term matching a relationship pair on `$this`. Either position may
    /// be the wildcard.
    #[must_use]
    pub fn pair(relation: Entity, target: Entity) -> Self {
        Self {
            second: Some(TermRef::entity(target)),
            ..Self::new(relation)
        }
    }

    /// Replaces the term source.
    #[must_use]
    pub fn with_src(mut self, src: TermRef) -> Self {
        self.src = src;
        self
    }

    /// Replaces the operator.
    #[must_use]
    pub fn with_oper(mut self, oper: TermOper) -> Self {
        self.oper = oper;
        self
    }

    /// Replaces the access declaration.
    #[must_use]
    pub fn with_inout(mut self, inout: TermInOut) -> Self {
        self.inout = inout;
        self
    }

    /// Enables up-traversal along `relation` in addition to self matching.
    #[must_use]
    pub fn up(mut self, relation: Entity) -> Self {
        self.src.flags |= RefFlags::UP;
        self.trav = relation;
        self
    }

    /// Enables cascade grouping by depth along `relation`.
    #[must_use]
    pub fn cascade(mut self, relation: Entity) -> Self {
        self.src.flags |= RefFlags::CASCADE;
        self.trav = relation;
        self
    }

    /// Reverses the cascade group order (deepest groups first).
    #[must_use]
    pub fn desc(mut self) -> Self {
        self.src.flags |= RefFlags::DESC;
        self
    }

    /// The id this term matches, with variables treated as wildcards.
    #[must_use]
    pub fn id(&self) -> Id {
        let first = self.first.entity_or_wildcard();
        match &self.second {
            None => Id::comp(first),
            Some(second) => Id::pair(first, second.entity_or_wildcard()),
        }
    }
}

/// Computes the group key for a table.
pub type GroupByFn = Box<dyn Fn(&World, &Table, Id) -> u64>;

/// Produces the opaque per-group context when a group is created.
pub type GroupCreateFn = Box<dyn Fn(&World, u64) -> Box<dyn Any>>;

/// Receives the group id and its context when a group is destroyed.
pub type GroupDeleteFn = Box<dyn Fn(&World, u64, Option<Box<dyn Any>>)>;

/// Compares two entities for external sorting.
pub type OrderByFn = Box<dyn Fn(Entity, Entity) -> Ordering>;

/// Descriptor for constructing a query cache.
///
/// Built incrementally; consumed by `QueryCache::new`.
#[derive(Default)]
pub struct QueryDesc {
    /// The query signature.
    pub terms: Vec<Term>,
    /// Configuration flags.
    pub flags: QueryFlags,
    /// Id matched by the builtin grouping callback.
    pub group_by: Option<Id>,
    /// Custom grouping callback; overrides the builtin.
    pub group_by_callback: Option<GroupByFn>,
    /// Group creation hook.
    pub on_group_create: Option<GroupCreateFn>,
    /// Group destruction hook.
    pub on_group_delete: Option<GroupDeleteFn>,
    /// Component the external sort orders by.
    pub order_by: Option<Id>,
    /// External sort comparator.
    pub order_by_callback: Option<OrderByFn>,
}

impl QueryDesc {
    /// Creates an empty descriptor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a term.
    #[must_use]
    pub fn with_term(mut self, term: Term) -> Self {
        self.terms.push(term);
        self
    }

    /// Enables grouping by the builtin `(id, *)` lookup.
    #[must_use]
    pub fn with_group_by(mut self, id: Id) -> Self {
        self.group_by = Some(id);
        self
    }

    /// Enables grouping with a custom key callback.
    #[must_use]
    pub fn with_group_by_callback(mut self, callback: GroupByFn) -> Self {
        self.group_by_callback = Some(callback);
        self
    }

    /// Installs the group creation hook.
    #[must_use]
    pub fn with_on_group_create(mut self, hook: GroupCreateFn) -> Self {
        self.on_group_create = Some(hook);
        self
    }

    /// Installs the group destruction hook.
    #[must_use]
    pub fn with_on_group_delete(mut self, hook: GroupDeleteFn) -> Self {
        self.on_group_delete = Some(hook);
        self
    }

    /// Requests the external sort.
    #[must_use]
    pub fn with_order_by(mut self, id: Id, callback: OrderByFn) -> Self {
        self.order_by = Some(id);
        self.order_by_callback = Some(callback);
        self
    }

    /// Stores empty tables in the iteration list.
    #[must_use]
    pub fn match_empty_tables(mut self) -> Self {
        self.flags |= QueryFlags::MATCH_EMPTY_TABLES;
        self
    }

    /// Requests change detection, disabling the trivial record layout.
    #[must_use]
    pub fn detect_changes(mut self) -> Self {
        self.flags |= QueryFlags::DETECT_CHANGES;
        self
    }
}
