//! Module E, part 4: program slicing (spec §4.E.8).
//!
//! A slice between one source and one sink is the set of values that both
//! receive taint from the source (a forward, least-solution query) and feed
//! the sink (a backward, greatest-solution query) — the two halves only
//! agree on a value if a flow genuinely passes through it on some path from
//! source to sink. Both halves are solved over the `default-sinks`/
//! `implicit-sinks` kind twins (see `constraints` module docs) so a slice
//! query never contends with [`crate::api::InfoflowSolution`] for a lock on
//! `default`/`implicit`.

use crate::constraints::{DEFAULT_SINKS, IMPLICIT_SINKS};
use crate::context::ContextId;
use crate::generator::VariablePool;
use crate::ir::ValueId;
use crate::kit::Kit;
use crate::lattice::{Element, VarId};
use crate::solver::bulk;
use crate::solver::partial::PartialSolution;
use crate::solver::Solution;

fn var_id(e: &Element) -> VarId {
    match e {
        Element::Var(id) => *id,
        _ => unreachable!("VariablePool always hands out fresh Var elements"),
    }
}

/// Builds the `default-sinks`/`implicit-sinks` baseline in both directions,
/// once per `Kit` lock (spec §4.C.2/§4.E.8): a [`PartialSolution`] is cheap to
/// `fork` and `seed` per query, so neither `Slice::compute` nor
/// `MultiSlice::compute` ever re-runs the full worklist.
fn baselines(kit: &mut Kit) -> (PartialSolution, PartialSolution) {
    let mut constraints = kit.store.peek(DEFAULT_SINKS);
    constraints.extend(kit.store.peek(IMPLICIT_SINKS));
    // Locking both kinds keeps their lifecycle in step with every other
    // query against them, even though the constraints used here were
    // already captured above via `peek`.
    let _ = kit.store.lock_and_take(DEFAULT_SINKS);
    let _ = kit.store.lock_and_take(IMPLICIT_SINKS);

    let least = PartialSolution::new(&constraints, true);
    let greatest = PartialSolution::new(&constraints, false);
    (least, greatest)
}

/// A single source/sink slice (spec §4.E.8 `Slice`).
pub struct Slice {
    sink: Element,
    forward: Solution,
    backward: Solution,
}

impl Slice {
    pub fn compute(
        kit: &mut Kit,
        pool: &mut VariablePool,
        source_ctx: ContextId,
        source: ValueId,
        sink_ctx: ContextId,
        sink: ValueId,
    ) -> Slice {
        let source_var = pool.value_var(kit, source_ctx, source);
        let sink_var = pool.value_var(kit, sink_ctx, sink);
        let (baseline_least, baseline_greatest) = baselines(kit);

        let mut forward = baseline_least.fork();
        forward.seed([var_id(&source_var)]);
        let mut backward = baseline_greatest.fork();
        backward.seed([var_id(&sink_var)]);

        Slice { sink: sink_var, forward: forward.to_solution(), backward: backward.to_solution() }
    }

    /// Whether the source's taint reaches the sink at all.
    pub fn reaches(&self, kit: &Kit) -> bool {
        self.forward.is_tainted(&self.sink, kit)
    }

    /// Whether `value` under `ctx` lies on some source-to-sink path: it must
    /// both have received the source's taint (forward) and actually flow
    /// into the sink (the chained backward solve forces it down from `H`).
    pub fn contains(&self, kit: &mut Kit, pool: &mut VariablePool, ctx: ContextId, value: ValueId) -> bool {
        let var = pool.value_var(kit, ctx, value);
        self.forward.is_tainted(&var, kit) && !self.backward.is_tainted(&var, kit)
    }
}

/// Many sources sliced against one shared sink (spec §4.E.8 `MultiSlice`):
/// the backward half is solved once and shared; the forward halves run as
/// an independent least-chain per source, spread across
/// [`bulk::solve_many_least_mt`]'s worker pool.
pub struct MultiSlice {
    sink: Element,
    sources: Vec<Element>,
    forwards: Vec<Solution>,
    backward: Solution,
}

impl MultiSlice {
    pub fn compute(
        kit: &mut Kit,
        pool: &mut VariablePool,
        sink_ctx: ContextId,
        sink: ValueId,
        sources: &[(ContextId, ValueId)],
        workers: usize,
    ) -> MultiSlice {
        let sink_var = pool.value_var(kit, sink_ctx, sink);
        let (baseline_least, baseline_greatest) = baselines(kit);

        let mut backward = baseline_greatest.fork();
        backward.seed([var_id(&sink_var)]);

        let source_vars: Vec<Element> = sources
            .iter()
            .map(|&(ctx, v)| pool.value_var(kit, ctx, v))
            .collect();
        let seed_sets: Vec<Vec<VarId>> = source_vars.iter().map(|e| vec![var_id(e)]).collect();
        let forwards = bulk::solve_many_least_mt(&baseline_least, &seed_sets, workers);

        MultiSlice { sink: sink_var, sources: source_vars, forwards, backward: backward.to_solution() }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn reaches(&self, kit: &Kit, source_index: usize) -> bool {
        self.forwards[source_index].is_tainted(&self.sink, kit)
    }

    pub fn contains(&self, kit: &mut Kit, pool: &mut VariablePool, source_index: usize, ctx: ContextId, value: ValueId) -> bool {
        let var = pool.value_var(kit, ctx, value);
        self.forwards[source_index].is_tainted(&var, kit) && !self.backward.is_tainted(&var, kit)
    }
}
