//! Module B: the constraint store (spec §4.B).
//!
//! Constraints are collected per [`Kind`], an append-only namespace that is
//! frozen ("locked") the first time it is solved. Four kinds are reserved by
//! the generator (spec §3): `"default"`, `"default-sinks"`, `"implicit"`,
//! `"implicit-sinks"`. Each data-flow edge the generator emits is filed into
//! exactly one of the four, chosen by whether the edge is control-derived
//! (`implicit?`) and whether its sink is itself recognised as a sink
//! (`sink?`) (see `generator::VariablePool::emit_record`) — the `-sinks`
//! kinds hold only the narrower set of flows landing on a declared sink, so
//! the backward (greatest, sink-seeded) solve used by slicing (spec §4.E.8)
//! starts from a sink-focused subgraph instead of the whole program. User
//! code (the `api`/`slice` modules) adds further kinds to seed per-query
//! source/sink taint.

use std::fmt;

use indexmap::{IndexMap, IndexSet};

use crate::lattice::Element;

/// A namespace for constraints; the unit of locking and solving (spec §3
/// "Kind").
pub type Kind = String;

pub const DEFAULT: &str = "default";
pub const DEFAULT_SINKS: &str = "default-sinks";
pub const IMPLICIT: &str = "implicit";
pub const IMPLICIT_SINKS: &str = "implicit-sinks";

/// An immutable pair `(lhs, rhs)` meaning `lhs ⊑ rhs` (spec §3
/// "Constraint"). `rhs` is never a `Join` — [`ConstraintStore::add`]
/// guarantees this by expanding a `Join` on the left into one constraint per
/// member and rejecting a `Join` on the right outright.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Constraint {
    pub lhs: Element,
    pub rhs: Element,
}

impl Constraint {
    pub fn new(lhs: Element, rhs: Element) -> Self {
        assert!(
            !rhs.is_join(),
            "a Join may never be passed as the right-hand side of a constraint \
             (pre-expand into one constraint per member on the left instead)"
        );
        Constraint { lhs, rhs }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} \u{2291} {:?}", self.lhs, self.rhs)
    }
}

/// Per-kind bookkeeping: the accumulated constraints (in insertion order,
/// spec §5 "constraints are stored in insertion order") plus the explicit/
/// implicit addition counters (spec §4.B), and whether the kind has been
/// locked by a solve.
#[derive(Default)]
struct KindEntry {
    constraints: IndexSet<Constraint>,
    explicit_additions: u64,
    implicit_additions: u64,
    locked: bool,
}

/// The append-only, per-kind constraint store (spec §4.B).
#[derive(Default)]
pub struct ConstraintStore {
    kinds: IndexMap<Kind, KindEntry>,
}

impl ConstraintStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, kind: &str) -> &mut KindEntry {
        self.kinds.entry(kind.to_owned()).or_default()
    }

    /// Appends `lhs ⊑ rhs` to `kind`. If `lhs` is a `Join(S)`, this expands
    /// into `|S|` separate constraints, one per member on the left (spec
    /// §3/§4.B). Panics (a fatal "contract violation", spec §7) if `kind` is
    /// already locked.
    pub fn add(&mut self, kit: &crate::kit::Kit, kind: &str, lhs: Element, rhs: Element, implicit: bool) {
        let members: Vec<Element> = match &lhs {
            Element::Join(j) => kit.join_members(*j).into_iter().collect(),
            other => vec![other.clone()],
        };
        for member in members {
            self.add_resolved(kind, member, rhs.clone(), implicit);
        }
    }

    /// Appends a single, already-join-resolved `lhs ⊑ rhs` pair (`lhs` must
    /// not itself be a `Join`). Split out of [`ConstraintStore::add`] so
    /// [`crate::kit::Kit::add_constraint`] can resolve `Join` members with an
    /// immutable borrow of the whole `Kit` and then mutate `self` (one of
    /// `Kit`'s own fields) afterwards, rather than needing both at once.
    pub fn add_resolved(&mut self, kind: &str, lhs: Element, rhs: Element, implicit: bool) {
        debug_assert!(
            !lhs.is_join(),
            "add_resolved expects Join members pre-expanded by the caller"
        );
        let entry = self.entry(kind);
        assert!(
            !entry.locked,
            "adding a constraint to locked kind `{}` is a contract violation",
            kind
        );
        let added = entry.constraints.insert(Constraint::new(lhs, rhs));
        if added {
            if implicit {
                entry.implicit_additions += 1;
            } else {
                entry.explicit_additions += 1;
            }
        }
    }

    /// Returns `true` if `kind` has never been created (never had a
    /// constraint added and never been locked).
    pub fn is_known(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }

    pub fn is_locked(&self, kind: &str) -> bool {
        self.kinds.get(kind).map(|e| e.locked).unwrap_or(false)
    }

    pub fn explicit_count(&self, kind: &str) -> u64 {
        self.kinds.get(kind).map(|e| e.explicit_additions).unwrap_or(0)
    }

    pub fn implicit_count(&self, kind: &str) -> u64 {
        self.kinds.get(kind).map(|e| e.implicit_additions).unwrap_or(0)
    }

    /// Read-only peek at a kind's constraints without locking it.
    pub fn peek(&self, kind: &str) -> Vec<Constraint> {
        self.kinds
            .get(kind)
            .map(|e| e.constraints.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Locks `kind` and returns its accumulated constraint list (spec §4.B
    /// `lock_and_take`). Once locked, further `add` calls to this kind
    /// panic. Safe to call on a kind that was never populated (returns an
    /// empty list and still locks it, so a later `add` is still rejected).
    pub fn lock_and_take(&mut self, kind: &str) -> Vec<Constraint> {
        let entry = self.entry(kind);
        entry.locked = true;
        entry.constraints.iter().cloned().collect()
    }

    /// Releases the raw constraint list for an already-solved-both-ways
    /// kind (spec §3 "Lifecycle" — only the compact propagation map is
    /// retained once both solutions exist).
    pub fn release(&mut self, kind: &str) {
        if let Some(entry) = self.kinds.get_mut(kind) {
            entry.constraints.clear();
            entry.constraints.shrink_to_fit();
        }
    }

    pub fn known_kinds(&self) -> impl Iterator<Item = &str> {
        self.kinds.keys().map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kit::Kit;
    use crate::lattice::{high, low};

    #[test]
    fn join_on_lhs_expands_per_member() {
        let mut kit = Kit::new();
        let a = kit.new_var("a");
        let b = kit.new_var("b");
        let j = kit.join(a.clone(), b.clone());
        let sink = kit.new_var("sink");

        let mut store = ConstraintStore::new();
        store.add(&kit, "k", j, sink.clone(), false);

        let cs = store.peek("k");
        assert_eq!(cs.len(), 2);
        assert!(cs.iter().any(|c| c.lhs == a && c.rhs == sink));
        assert!(cs.iter().any(|c| c.lhs == b && c.rhs == sink));
    }

    #[test]
    #[should_panic(expected = "locked")]
    fn add_after_lock_panics() {
        let kit = Kit::new();
        let mut store = ConstraintStore::new();
        store.add(&kit, "k", low(), high(), false);
        store.lock_and_take("k");
        store.add(&kit, "k", low(), high(), false);
    }

    #[test]
    fn explicit_and_implicit_counters_are_distinct() {
        let kit = Kit::new();
        let mut store = ConstraintStore::new();
        store.add(&kit, "k", low(), high(), false);
        store.add(&kit, "k", high(), high(), true);
        assert_eq!(store.explicit_count("k"), 1);
        assert_eq!(store.implicit_count("k"), 1);
    }

    #[test]
    #[should_panic(expected = "right-hand side")]
    fn join_on_rhs_is_rejected() {
        let mut kit = Kit::new();
        let a = kit.new_var("a");
        let b = kit.new_var("b");
        let j = kit.join(a, b);
        let _ = Constraint::new(low(), j);
    }
}
