//! The classical worklist fixed-point solver (spec §4.C.1).
//!
//! A least solution is found by starting every variable at `L` and
//! propagating constraints "forward" (`rhs` rises to meet `lhs`) until
//! nothing changes. A greatest solution starts every variable at `H` and
//! propagates "backward" (`lhs` falls to meet `rhs`) — the dual direction,
//! since in the two-point lattice `H` is already the top and the only way a
//! variable can be forced down is through an upper bound imposed by some
//! `rhs`.

use std::collections::{HashMap, VecDeque};

use crate::constraints::Constraint;
use crate::lattice::{Element, SecurityLevel, VarId};

use super::Solution;

/// Solves `constraints` for the least (`least = true`) or greatest
/// (`least = false`) fixed point.
pub fn solve(constraints: &[Constraint], least: bool) -> Solution {
    if least {
        solve_least(constraints)
    } else {
        solve_greatest(constraints)
    }
}

fn var_ids(constraints: &[Constraint]) -> impl Iterator<Item = VarId> + '_ {
    constraints.iter().flat_map(|c| {
        let lhs = if let Element::Var(v) = c.lhs { Some(v) } else { None };
        let rhs = if let Element::Var(v) = c.rhs { Some(v) } else { None };
        lhs.into_iter().chain(rhs)
    })
}

fn solve_least(constraints: &[Constraint]) -> Solution {
    let mut values: HashMap<VarId, SecurityLevel> = HashMap::new();
    for v in var_ids(constraints) {
        values.entry(v).or_insert(SecurityLevel::Low);
    }

    // rhs (a Var) depends on every constraint whose lhs is that same Var.
    let mut dependents: HashMap<VarId, Vec<&Constraint>> = HashMap::new();
    for c in constraints {
        if let Element::Var(v) = c.lhs {
            dependents.entry(v).or_default().push(c);
        }
    }

    let mut queue: VecDeque<VarId> = VecDeque::new();
    let mut raise = |values: &mut HashMap<VarId, SecurityLevel>, queue: &mut VecDeque<VarId>, v: VarId, lvl: SecurityLevel| {
        let cur = *values.get(&v).unwrap_or(&SecurityLevel::Low);
        let new = cur.join(lvl);
        if new != cur {
            values.insert(v, new);
            queue.push_back(v);
        }
    };

    // Seed from constraints whose lhs is a constant.
    for c in constraints {
        if let Element::Const(lvl) = c.lhs {
            if let Element::Var(v) = c.rhs {
                raise(&mut values, &mut queue, v, lvl);
            }
        }
    }

    while let Some(v) = queue.pop_front() {
        let cur = *values.get(&v).unwrap_or(&SecurityLevel::Low);
        if let Some(deps) = dependents.get(&v) {
            for c in deps {
                if let Element::Var(w) = c.rhs {
                    raise(&mut values, &mut queue, w, cur);
                }
            }
        }
    }

    Solution { least: true, values }
}

fn solve_greatest(constraints: &[Constraint]) -> Solution {
    let mut values: HashMap<VarId, SecurityLevel> = HashMap::new();
    for v in var_ids(constraints) {
        values.entry(v).or_insert(SecurityLevel::High);
    }

    // lhs (a Var) depends on every constraint whose rhs is that same Var.
    let mut dependents: HashMap<VarId, Vec<&Constraint>> = HashMap::new();
    for c in constraints {
        if let Element::Var(v) = c.rhs {
            dependents.entry(v).or_default().push(c);
        }
    }

    let mut queue: VecDeque<VarId> = VecDeque::new();
    let mut lower = |values: &mut HashMap<VarId, SecurityLevel>, queue: &mut VecDeque<VarId>, v: VarId, ceiling: SecurityLevel| {
        let cur = *values.get(&v).unwrap_or(&SecurityLevel::High);
        // meet in the two-point lattice: High only if both sides are High.
        let new = if cur == SecurityLevel::High && ceiling == SecurityLevel::High {
            SecurityLevel::High
        } else {
            SecurityLevel::Low
        };
        if new != cur {
            values.insert(v, new);
            queue.push_back(v);
        }
    };

    // Seed from constraints whose rhs is a constant: lhs must not exceed it.
    for c in constraints {
        if let Element::Const(lvl) = c.rhs {
            if let Element::Var(v) = c.lhs {
                lower(&mut values, &mut queue, v, lvl);
            }
        }
    }

    while let Some(v) = queue.pop_front() {
        let ceiling = *values.get(&v).unwrap_or(&SecurityLevel::High);
        if let Some(deps) = dependents.get(&v) {
            for c in deps {
                if let Element::Var(w) = c.lhs {
                    lower(&mut values, &mut queue, w, ceiling);
                }
            }
        }
    }

    Solution { least: false, values }
}
