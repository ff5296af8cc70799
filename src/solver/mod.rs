//! Module C: constraint solving (spec §4.C).
//!
//! All solvers operate on a locked [`crate::constraints::Constraint`] list —
//! `lhs ⊑ rhs` pairs where neither side is ever a `Join` (the store already
//! expanded/rejected those, see `constraints::ConstraintStore::add`). A
//! [`Solution`] is a read-only snapshot: a value per [`VarId`], plus enough
//! to answer queries against `Join`-shaped elements via the owning `Kit`.

pub mod bulk;
pub mod partial;
pub mod worklist;

use std::collections::HashMap;

use crate::constraints::Constraint;
use crate::kit::Kit;
use crate::lattice::{Element, SecurityLevel, VarId};

/// One fixed-point solution: `least = true` for the smallest assignment
/// satisfying every constraint (unconstrained variables are `L`), `least =
/// false` for the largest (unconstrained variables are `H`) (spec §4.C).
#[derive(Debug, Clone)]
pub struct Solution {
    pub(crate) least: bool,
    pub(crate) values: HashMap<VarId, SecurityLevel>,
}

impl Solution {
    pub fn least(&self) -> bool {
        self.least
    }

    fn var_value(&self, id: VarId) -> SecurityLevel {
        self.values
            .get(&id)
            .copied()
            .unwrap_or_else(|| SecurityLevel::default_for(self.least))
    }

    /// Resolves `e` to a concrete lattice value, joining over a `Join`'s
    /// members when needed.
    pub fn value(&self, e: &Element, kit: &Kit) -> SecurityLevel {
        match e {
            Element::Const(lvl) => *lvl,
            Element::Var(id) => self.var_value(*id),
            Element::Join(j) => kit
                .join_members(*j)
                .iter()
                .map(|m| self.value(m, kit))
                .fold(SecurityLevel::Low, SecurityLevel::join),
        }
    }

    pub fn is_tainted(&self, e: &Element, kit: &Kit) -> bool {
        self.value(e, kit) == SecurityLevel::High
    }
}

/// Locks `kind` and solves it in isolation (spec §4.C.1 entry point).
/// Constraints are already fully resolved (no `Join` on either side) by the
/// time they reach a store, so this needs only the store, never the owning
/// `Kit` — which also means a caller can call this as `Kit::solve_kind`
/// without running into the aliasing problem a `&Kit` parameter would cause
/// when the store being locked is `kit.store` itself.
pub fn solve_kind(store: &mut crate::constraints::ConstraintStore, kind: &str, least: bool) -> Solution {
    let constraints = store.lock_and_take(kind);
    worklist::solve(&constraints, least)
}

/// Locks and solves several kinds together as a single constraint set,
/// sharing one variable space across all of them (spec §4.C.4 "combined-kind
/// solve" — e.g. `default` + `implicit` solved jointly so that a value
/// tainted only through a combination of explicit and control-flow-derived
/// edges is still found).
pub fn solve_combined(store: &mut crate::constraints::ConstraintStore, kinds: &[&str], least: bool) -> Solution {
    let mut combined: Vec<Constraint> = Vec::new();
    for kind in kinds {
        combined.extend(store.lock_and_take(kind));
    }
    worklist::solve(&combined, least)
}
