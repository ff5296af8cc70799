//! The propagation solver with a persistent partial solution (spec §4.C.2):
//! a propagation map built once from a constraint set, plus a reachable-set
//! ("VSet") that can be extended (`seed`) or combined with other partial
//! solutions (`merge_in`) without ever rebuilding the map. This is what lets
//! `MultiSlice`'s "one forward solve per source, sharing one backward
//! baseline" access pattern (spec §4.E.8) and the bulk solver (§4.C.3) avoid
//! re-scanning the full constraint list on every query.
//!
//! Orientation matches [`super::worklist`]: for a least solution, `lhs ⊑
//! rhs` propagates forward (a var in `rhs` position becomes reachable once
//! its `lhs` is); for a greatest solution the roles are swapped and
//! "reachable" means forced down to `Low` instead of up to `High`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::constraints::Constraint;
use crate::lattice::{Element, SecurityLevel, VarId};

use super::Solution;

fn propagate(propagation: &HashMap<VarId, Vec<VarId>>, vset: &mut HashSet<VarId>, queue: &mut VecDeque<VarId>) {
    while let Some(v) = queue.pop_front() {
        if let Some(targets) = propagation.get(&v) {
            for &t in targets {
                if vset.insert(t) {
                    queue.push_back(t);
                }
            }
        }
    }
}

/// A persistent partial solution over one fixed constraint set (spec
/// §4.C.2). `propagation` is built exactly once, in [`PartialSolution::new`],
/// and never rebuilt by any later `seed`/`merge_in`/`fork` call — the whole
/// point of this type over the plain worklist solver is that forking a
/// baseline and seeding it per query costs a `HashSet` walk, not a rescan of
/// every constraint.
pub struct PartialSolution {
    least: bool,
    propagation: Arc<HashMap<VarId, Vec<VarId>>>,
    /// This solution's own reachable set.
    own: HashSet<VarId>,
    /// Other partial solutions' reachable sets, semantically unioned with
    /// `own` at query time (`is_reachable`/`to_solution`) rather than
    /// physically merged into it.
    chain: Vec<Arc<HashSet<VarId>>>,
}

impl PartialSolution {
    /// Builds the propagation map from `constraints` and seeds the initial
    /// `VSet` from each constraint's immediate const evidence (spec §4.C.2:
    /// "using the initial substitution — all `L` for least, all `H` for
    /// greatest — insert every target whose immediate evidence forces the
    /// non-default value"), then runs the fixed point once.
    pub fn new(constraints: &[Constraint], least: bool) -> PartialSolution {
        let non_default = if least { SecurityLevel::High } else { SecurityLevel::Low };
        let mut propagation: HashMap<VarId, Vec<VarId>> = HashMap::new();
        let mut own: HashSet<VarId> = HashSet::new();
        let mut queue: VecDeque<VarId> = VecDeque::new();

        for c in constraints {
            let (src, tgt) = if least { (&c.lhs, &c.rhs) } else { (&c.rhs, &c.lhs) };
            if let (Element::Var(s), Element::Var(t)) = (src, tgt) {
                propagation.entry(*s).or_default().push(*t);
            }
            if let Element::Const(lvl) = src {
                if *lvl == non_default {
                    if let Element::Var(t) = tgt {
                        if own.insert(*t) {
                            queue.push_back(*t);
                        }
                    }
                }
            }
        }

        propagate(&propagation, &mut own, &mut queue);

        PartialSolution { least, propagation: Arc::new(propagation), own, chain: Vec::new() }
    }

    /// `true` iff `self.least` matches `least`, for callers that combine
    /// partial solutions and need to reject a direction mismatch early.
    pub fn least(&self) -> bool {
        self.least
    }

    fn in_chain(&self, v: VarId) -> bool {
        self.chain.iter().any(|layer| layer.contains(&v))
    }

    /// `true` iff `v` currently evaluates to the non-default lattice value
    /// (`High` for a least solution, `Low` for a greatest one) — reachable
    /// either directly or through a chained partial solution.
    pub fn is_reachable(&self, v: VarId) -> bool {
        self.own.contains(&v) || self.in_chain(v)
    }

    /// A fresh, cheap copy sharing this solution's propagation map and
    /// chaining back to its current reachable set (spec §4.C.3 "a fresh
    /// copy, chained to the baseline via the copy constructor"): the copy's
    /// own `VSet` starts empty, so seeding or merging into it never mutates
    /// `self`.
    pub fn fork(&self) -> PartialSolution {
        let mut chain = self.chain.clone();
        chain.push(Arc::new(self.own.clone()));
        PartialSolution {
            least: self.least,
            propagation: Arc::clone(&self.propagation),
            own: HashSet::new(),
            chain,
        }
    }

    /// Seeds this solution directly with `vars` forced to the non-default
    /// value and propagates from them, reusing the existing map.
    pub fn seed(&mut self, vars: impl IntoIterator<Item = VarId>) {
        let mut queue: VecDeque<VarId> = VecDeque::new();
        for v in vars {
            if !self.is_reachable(v) && self.own.insert(v) {
                queue.push_back(v);
            }
        }
        propagate(&self.propagation, &mut self.own, &mut queue);
    }

    /// Merges `other`'s reachable set into this chain (spec §4.C.2
    /// `merge_in`: "appends it to the chain and re-runs propagation using
    /// the combined seeds") — `other` may be built over a different
    /// (kind-local) constraint set, so anything newly reachable through
    /// *this* solution's own propagation map from `other`'s vars still needs
    /// to be walked; `self.propagation` itself is never rebuilt.
    pub fn merge_in(&mut self, other: &PartialSolution) {
        assert_eq!(self.least, other.least, "merge_in requires both partial solutions to solve the same direction");

        let mut queue: VecDeque<VarId> = VecDeque::new();
        let mut seed = |v: VarId, own: &mut HashSet<VarId>, queue: &mut VecDeque<VarId>| {
            if !own.contains(&v) && !self.in_chain(v) && own.insert(v) {
                queue.push_back(v);
            }
        };
        for &v in other.own.iter() {
            seed(v, &mut self.own, &mut queue);
        }
        for layer in &other.chain {
            for &v in layer.iter() {
                seed(v, &mut self.own, &mut queue);
            }
        }

        propagate(&self.propagation, &mut self.own, &mut queue);

        self.chain.push(Arc::new(other.own.clone()));
        self.chain.extend(other.chain.iter().cloned());
    }

    /// Materializes this partial solution as a plain [`Solution`]. Only the
    /// non-default variables need an entry: [`Solution::value`] already
    /// falls back to `SecurityLevel::default_for(least)` for anything
    /// absent.
    pub fn to_solution(&self) -> Solution {
        let non_default = if self.least { SecurityLevel::High } else { SecurityLevel::Low };
        let mut values: HashMap<VarId, SecurityLevel> = self.own.iter().map(|&v| (v, non_default)).collect();
        for layer in &self.chain {
            for &v in layer.iter() {
                values.insert(v, non_default);
            }
        }
        Solution { least: self.least, values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kit::Kit;
    use crate::lattice::Element;

    fn var(kit: &mut Kit, name: &str) -> (VarId, Element) {
        let e = kit.new_var(name);
        match &e {
            Element::Var(id) => (*id, e.clone()),
            _ => unreachable!(),
        }
    }

    #[test]
    fn new_seeds_from_const_high_forward() {
        let mut kit = Kit::new();
        let (a_id, a) = var(&mut kit, "a");
        let (b_id, b) = var(&mut kit, "b");
        let constraints = vec![Constraint::new(crate::lattice::high(), a.clone()), Constraint::new(a, b)];
        let partial = PartialSolution::new(&constraints, true);
        assert!(partial.is_reachable(a_id));
        assert!(partial.is_reachable(b_id));
    }

    #[test]
    fn fork_then_seed_does_not_mutate_baseline() {
        let mut kit = Kit::new();
        let (a_id, a) = var(&mut kit, "a");
        let (b_id, b) = var(&mut kit, "b");
        let (c_id, c) = var(&mut kit, "c");
        let constraints = vec![Constraint::new(a.clone(), b.clone()), Constraint::new(b, c)];
        let baseline = PartialSolution::new(&constraints, true);
        assert!(!baseline.is_reachable(a_id));

        let mut forked = baseline.fork();
        forked.seed([a_id]);
        assert!(forked.is_reachable(a_id));
        assert!(forked.is_reachable(b_id));
        assert!(forked.is_reachable(c_id));
        // baseline itself is untouched.
        assert!(!baseline.is_reachable(a_id));
        assert!(!baseline.is_reachable(b_id));
    }

    #[test]
    fn fork_then_seed_greatest_forces_predecessors_low() {
        let mut kit = Kit::new();
        let (a_id, a) = var(&mut kit, "a");
        let (b_id, b) = var(&mut kit, "b");
        let (c_id, c) = var(&mut kit, "c");
        let constraints = vec![Constraint::new(a.clone(), b.clone()), Constraint::new(b, c.clone())];
        let baseline = PartialSolution::new(&constraints, false);
        assert!(!baseline.is_reachable(a_id));

        let mut forked = baseline.fork();
        forked.seed([c_id]);
        assert!(forked.is_reachable(c_id));
        assert!(forked.is_reachable(b_id));
        assert!(forked.is_reachable(a_id));
        assert!(!baseline.is_reachable(a_id));

        let extended = forked.to_solution();
        assert_eq!(extended.var_value(a_id), SecurityLevel::Low);
        assert_eq!(extended.var_value(c_id), SecurityLevel::Low);
    }

    #[test]
    fn merge_in_combines_a_kind_local_solution_with_a_baseline() {
        let mut kit = Kit::new();
        let (a_id, a) = var(&mut kit, "a");
        let (b_id, b) = var(&mut kit, "b");
        let (c_id, c) = var(&mut kit, "c");

        // Baseline: H ⊑ a ⊑ b (so a, b are reachable in the baseline alone).
        let baseline_constraints = vec![Constraint::new(crate::lattice::high(), a.clone()), Constraint::new(a, b.clone())];
        let baseline = PartialSolution::new(&baseline_constraints, true);
        assert!(baseline.is_reachable(a_id));
        assert!(baseline.is_reachable(b_id));

        // Kind-local solution, with its own (disjoint) propagation map: b ⊑ c.
        let kind_constraints = vec![Constraint::new(b, c)];
        let mut kind_solution = PartialSolution::new(&kind_constraints, true);
        assert!(!kind_solution.is_reachable(c_id));

        kind_solution.merge_in(&baseline);
        // a and b come in directly from the baseline; c follows through the
        // kind-local map (b ⊑ c), which was never rebuilt to discover it.
        assert!(kind_solution.is_reachable(a_id));
        assert!(kind_solution.is_reachable(b_id));
        assert!(kind_solution.is_reachable(c_id));

        let merged = kind_solution.to_solution();
        assert_eq!(merged.var_value(a_id), SecurityLevel::High);
        assert_eq!(merged.var_value(b_id), SecurityLevel::High);
        assert_eq!(merged.var_value(c_id), SecurityLevel::High);
    }
}
