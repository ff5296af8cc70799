//! The `Kit`: the single owner of variables, joins, and constraints for one
//! analysis run (spec §9 "Ownership graph" — "The kit exclusively owns
//! variables, joins, constraints, and partial solutions"; spec §5
//! "Shared-resource policy" — "the kit is never shared between threads
//! while mutation ... is in progress").
//!
//! A `Kit` is built once during constraint generation and then handed,
//! read-only, to the solver (module C). Its lifetime must outlast every
//! [`crate::solver::Solution`] built against it.

use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::lattice::{flatten_members, Element, JoinId, SecurityLevel, VarId};

/// Lazily-created, description-carrying variable arena (spec §3
/// "Per-entity variables (created lazily)").
#[derive(Debug, Default)]
pub struct VariableManager {
    descriptions: Vec<String>,
}

impl VariableManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fresh variable. `description` is carried purely for
    /// diagnostics/`Display`; it plays no role in equality.
    pub fn new_var(&mut self, description: impl Into<String>) -> Element {
        let id = VarId(self.descriptions.len());
        self.descriptions.push(description.into());
        Element::Var(id)
    }

    pub fn description(&self, id: VarId) -> &str {
        &self.descriptions[id.0]
    }

    pub fn len(&self) -> usize {
        self.descriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptions.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = VarId> {
        (0..self.descriptions.len()).map(VarId)
    }
}

/// Content-addressed interning table for `Join` elements: building a join
/// from the same flattened member set twice returns the same [`JoinId`]
/// (spec §4.A "Join elements are content-addressed").
#[derive(Debug, Default)]
struct JoinInterner {
    by_members: IndexMap<BTreeSet<Element>, JoinId>,
    members: Vec<BTreeSet<Element>>,
}

impl JoinInterner {
    fn intern(&mut self, members: BTreeSet<Element>) -> JoinId {
        if let Some(id) = self.by_members.get(&members) {
            return *id;
        }
        let id = JoinId(self.members.len());
        self.members.push(members.clone());
        self.by_members.insert(members, id);
        id
    }

    fn members(&self, id: JoinId) -> BTreeSet<Element> {
        self.members[id.0].clone()
    }
}

/// Owns all variables and joins allocated during constraint generation, plus
/// the per-kind constraint store (module B).
pub struct Kit {
    pub vars: VariableManager,
    joins: JoinInterner,
    pub store: crate::constraints::ConstraintStore,
}

impl Default for Kit {
    fn default() -> Self {
        Self::new()
    }
}

impl Kit {
    pub fn new() -> Self {
        Kit {
            vars: VariableManager::new(),
            joins: JoinInterner::default(),
            store: crate::constraints::ConstraintStore::new(),
        }
    }

    /// Creates a fresh variable (forwarding to [`VariableManager::new_var`]).
    pub fn new_var(&mut self, description: impl Into<String>) -> Element {
        self.vars.new_var(description)
    }

    /// Returns the (interned, flattened, simplified) members of a join.
    pub fn join_members(&self, id: JoinId) -> BTreeSet<Element> {
        self.joins.members(id)
    }

    /// Builds `⊔` over a non-empty set of elements, interning the result.
    /// Nested joins are flattened; a member equal to `L` is dropped (`L` is
    /// the join identity); a member equal to `H` collapses the whole join to
    /// `H` (`H` is the lattice top). Panics on an empty set (spec §7
    /// "joining the empty set" is a contract violation).
    pub fn join_many(&mut self, members: impl IntoIterator<Item = Element>) -> Element {
        let resolve = |j: JoinId| self.joins.members(j);
        let mut flat = flatten_members(members, &resolve);
        assert!(!flat.is_empty(), "join of the empty set is a contract violation");

        if flat.contains(&Element::Const(SecurityLevel::High)) {
            return Element::Const(SecurityLevel::High);
        }
        flat.remove(&Element::Const(SecurityLevel::Low));
        if flat.is_empty() {
            return Element::Const(SecurityLevel::Low);
        }
        if flat.len() == 1 {
            return flat.into_iter().next().unwrap();
        }
        Element::Join(self.joins.intern(flat))
    }

    /// `join(e1, e2)`, the binary special case of [`Kit::join_many`].
    pub fn join(&mut self, a: Element, b: Element) -> Element {
        self.join_many([a, b])
    }

    /// Adds `lhs ⊑ rhs` to `kind` in this kit's own constraint store,
    /// expanding a `Join` on `lhs` into one constraint per member (spec
    /// §4.B). `ConstraintStore::add` takes `&Kit` to do that expansion
    /// itself, which this kit's own `store` field can't pass along for
    /// itself without aliasing `self`; resolving members here, while `self`
    /// is only borrowed immutably, and mutating `self.store` afterwards
    /// avoids that.
    pub fn add_constraint(&mut self, kind: &str, lhs: Element, rhs: Element, implicit: bool) {
        let members: Vec<Element> = match &lhs {
            Element::Join(j) => self.join_members(*j).into_iter().collect(),
            other => vec![other.clone()],
        };
        for member in members {
            self.store.add_resolved(kind, member, rhs.clone(), implicit);
        }
    }

    /// `a ⊑ b` (spec §4.A `leq`).
    pub fn leq(&self, a: &Element, b: &Element) -> bool {
        crate::lattice::leq(a, b, &|j| self.joins.members(j))
    }

    /// Renders an element for diagnostics, resolving variable descriptions
    /// and join members recursively.
    pub fn display(&self, e: &Element) -> String {
        match e {
            Element::Const(lvl) => lvl.to_string(),
            Element::Var(id) => self.vars.description(*id).to_owned(),
            Element::Join(j) => {
                let parts: Vec<String> = self
                    .joins
                    .members(*j)
                    .iter()
                    .map(|m| self.display(m))
                    .collect();
                format!("({})", parts.join(" \u{2294} "))
            }
        }
    }
}
