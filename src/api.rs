//! Module E, part 3: the public analysis surface (spec §4.E.6, §4.E.7).

use crate::constraints::{DEFAULT, DEFAULT_SINKS, IMPLICIT, IMPLICIT_SINKS};
use crate::context::ContextId;
use crate::generator::VariablePool;
use crate::ir::{FunctionId, ValueId};
use crate::kit::Kit;
use crate::lattice::{high, low};
use crate::providers::PointsToProvider;
use crate::solver::{self, Solution};

/// Panics if `kind` names one of the four reserved kinds (spec §4.E.6
/// "Adding to `default` or `implicit` is forbidden" — the `-sinks` twins are
/// reserved for the same reason, since they're the generator's own output,
/// not a query-time seed namespace).
fn check_not_reserved(kind: &str) {
    assert!(
        !matches!(kind, DEFAULT | DEFAULT_SINKS | IMPLICIT | IMPLICIT_SINKS),
        "adding a query seed directly to reserved kind `{}` is forbidden; use a query-specific kind instead",
        kind
    );
}

/// Seeds `value` under `ctx` as an additional taint source in `kind`: `H ⊑
/// value` (spec §4.E.6 `set_tainted`). `kind` is a caller-chosen namespace
/// (e.g. a one-off "extra sources" query) solved together with `default`/
/// `implicit` via [`solver::solve_combined`]; it must not itself be one of
/// the four reserved kinds.
pub fn set_tainted(kit: &mut Kit, pool: &mut VariablePool, kind: &str, ctx: ContextId, value: ValueId) {
    check_not_reserved(kind);
    let var = pool.value_var(kit, ctx, value);
    kit.add_constraint(kind, high(), var, false);
}

/// Pins `value` under `ctx` untainted in `kind`: `value ⊑ L` (spec §4.E.6
/// `set_untainted`) — forces it down regardless of what would otherwise
/// reach it once `kind` is solved together with the kinds carrying that flow.
pub fn set_untainted(kit: &mut Kit, pool: &mut VariablePool, kind: &str, ctx: ContextId, value: ValueId) {
    check_not_reserved(kind);
    let var = pool.value_var(kit, ctx, value);
    kit.add_constraint(kind, var, low(), false);
}

/// `set_tainted`'s direct-ptr variant (spec §4.E.6 "variants for direct-ptr,
/// reachable-ptr, and varargs target their respective variable pools"):
/// seeds every location in `value`'s direct points-to set. A value whose
/// points-to set is empty is a legal, silently-dropped no-op (spec §4.E.8
/// "missing entity" edge case), not an error.
pub fn set_direct_ptr_tainted(kit: &mut Kit, pool: &mut VariablePool, points_to: &impl PointsToProvider, kind: &str, ctx: ContextId, value: ValueId) {
    check_not_reserved(kind);
    for loc in points_to.direct(value) {
        let var = pool.location_var(kit, ctx, loc);
        kit.add_constraint(kind, high(), var, false);
    }
}

/// `set_untainted`'s direct-ptr variant; see [`set_direct_ptr_tainted`].
pub fn set_direct_ptr_untainted(kit: &mut Kit, pool: &mut VariablePool, points_to: &impl PointsToProvider, kind: &str, ctx: ContextId, value: ValueId) {
    check_not_reserved(kind);
    for loc in points_to.direct(value) {
        let var = pool.location_var(kit, ctx, loc);
        kit.add_constraint(kind, var, low(), false);
    }
}

/// `set_tainted`'s reachable-ptr variant; see [`set_direct_ptr_tainted`].
pub fn set_reach_ptr_tainted(kit: &mut Kit, pool: &mut VariablePool, points_to: &impl PointsToProvider, kind: &str, ctx: ContextId, value: ValueId) {
    check_not_reserved(kind);
    for loc in points_to.reach(value) {
        let var = pool.location_var(kit, ctx, loc);
        kit.add_constraint(kind, high(), var, false);
    }
}

/// `set_untainted`'s reachable-ptr variant; see [`set_direct_ptr_tainted`].
pub fn set_reach_ptr_untainted(kit: &mut Kit, pool: &mut VariablePool, points_to: &impl PointsToProvider, kind: &str, ctx: ContextId, value: ValueId) {
    check_not_reserved(kind);
    for loc in points_to.reach(value) {
        let var = pool.location_var(kit, ctx, loc);
        kit.add_constraint(kind, var, low(), false);
    }
}

/// `set_tainted`'s varargs variant: seeds `function`'s varargs structure
/// variable directly (spec §3 "one `Var` per function for the varargs
/// structure" — there is no points-to indirection to resolve).
pub fn set_varargs_tainted(kit: &mut Kit, pool: &mut VariablePool, kind: &str, ctx: ContextId, function: FunctionId) {
    check_not_reserved(kind);
    let var = pool.varargs_var(kit, ctx, function);
    kit.add_constraint(kind, high(), var, false);
}

/// `set_untainted`'s varargs variant; see [`set_varargs_tainted`].
pub fn set_varargs_untainted(kit: &mut Kit, pool: &mut VariablePool, kind: &str, ctx: ContextId, function: FunctionId) {
    check_not_reserved(kind);
    let var = pool.varargs_var(kit, ctx, function);
    kit.add_constraint(kind, var, low(), false);
}

/// The solved whole-program result (spec §4.E.7 `InfoflowSolution`): a
/// least and a greatest fixed point over `default ∪ implicit`, combined so a
/// value tainted only through the interaction of explicit and control-flow
/// edges is still found (spec §4.C.4). Locks `default`/`implicit` for the
/// lifetime of this solution; `default-sinks`/`implicit-sinks` are left
/// unlocked for [`crate::slice`] to solve separately, backward, per query.
pub struct InfoflowSolution {
    least: Solution,
    greatest: Solution,
    /// The answer `is_direct_ptr_tainted`/`is_reach_ptr_tainted` fall back to
    /// when a value's points-to set is empty — there is no location variable
    /// to consult, so the predicate can't derive an answer from the solution
    /// at all (spec §4.E.7 "a policy on unmapped values"). Defaults to
    /// `false` via [`InfoflowSolution::solve`]; override with
    /// [`InfoflowSolution::with_default_tainted`].
    default_tainted: bool,
}

impl InfoflowSolution {
    pub fn solve(kit: &mut Kit) -> Self {
        let least = solver::solve_combined(&mut kit.store, &[DEFAULT, IMPLICIT], true);
        let greatest = solver::solve_combined(&mut kit.store, &[DEFAULT, IMPLICIT], false);
        InfoflowSolution { least, greatest, default_tainted: false }
    }

    /// Overrides the unmapped-value policy (spec §4.E.7); see
    /// `default_tainted`.
    pub fn with_default_tainted(mut self, default_tainted: bool) -> Self {
        self.default_tainted = default_tainted;
        self
    }

    /// `true` iff `value` under `ctx` is tainted in the least solution —
    /// the ordinary "is this value affected by a taint source" query.
    /// Takes `kit` mutably because naming a value not yet seen by the
    /// generator (e.g. one with no flows at all) still needs to allocate
    /// its variable before it can be looked up.
    pub fn is_tainted(&self, kit: &mut Kit, pool: &mut VariablePool, ctx: ContextId, value: ValueId) -> bool {
        let var = pool.value_var(kit, ctx, value);
        self.least.is_tainted(&var, kit)
    }

    /// `true` iff `value` under `ctx` is tainted in the greatest solution —
    /// "could this value be tainted under some assignment consistent with
    /// every constraint", used by [`crate::slice`] for the backward half of
    /// a slice.
    pub fn could_be_tainted(&self, kit: &mut Kit, pool: &mut VariablePool, ctx: ContextId, value: ValueId) -> bool {
        let var = pool.value_var(kit, ctx, value);
        self.greatest.is_tainted(&var, kit)
    }

    /// `true` iff *any* abstract location in `value`'s direct points-to set
    /// is tainted in the least solution (spec §4.E.7). Falls back to
    /// `default_tainted` when the points-to set is empty, since there is
    /// then no location variable to evaluate at all.
    pub fn is_direct_ptr_tainted(&self, kit: &mut Kit, pool: &mut VariablePool, points_to: &impl PointsToProvider, ctx: ContextId, value: ValueId) -> bool {
        let locs = points_to.direct(value);
        if locs.is_empty() {
            return self.default_tainted;
        }
        locs.into_iter().any(|loc| {
            let var = pool.location_var(kit, ctx, loc);
            self.least.is_tainted(&var, kit)
        })
    }

    /// The reachable-points-to-set counterpart of
    /// [`InfoflowSolution::is_direct_ptr_tainted`].
    pub fn is_reach_ptr_tainted(&self, kit: &mut Kit, pool: &mut VariablePool, points_to: &impl PointsToProvider, ctx: ContextId, value: ValueId) -> bool {
        let locs = points_to.reach(value);
        if locs.is_empty() {
            return self.default_tainted;
        }
        locs.into_iter().any(|loc| {
            let var = pool.location_var(kit, ctx, loc);
            self.least.is_tainted(&var, kit)
        })
    }

    /// `true` iff `function`'s varargs structure variable is tainted in the
    /// least solution (spec §4.E.7 `is_varg_tainted`).
    pub fn is_varg_tainted(&self, kit: &mut Kit, pool: &mut VariablePool, ctx: ContextId, function: FunctionId) -> bool {
        let var = pool.varargs_var(kit, ctx, function);
        self.least.is_tainted(&var, kit)
    }

    pub fn least(&self) -> &Solution {
        &self.least
    }

    pub fn greatest(&self) -> &Solution {
        &self.greatest
    }
}
