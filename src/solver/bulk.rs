//! Bulk parallel solve (spec §4.C.3): runs many independent partial-solution
//! forks across a fixed worker pool, built on the persistent
//! [`PartialSolution`]/`merge_in` machinery from [`super::partial`] so no
//! worker ever rebuilds a propagation map it could instead fork or chain.

use crate::constraints::{Constraint, ConstraintStore};
use crate::lattice::VarId;

use super::partial::PartialSolution;
use super::worklist;
use super::Solution;

/// Default worker count (spec §4.C.3); overridable via
/// `crate::config::AnalysisConfig::parallel_workers`.
pub const DEFAULT_WORKERS: usize = 16;

fn chunk_index_ranges(len: usize, workers: usize) -> (usize, usize) {
    let workers = workers.clamp(1, DEFAULT_WORKERS).min(len.max(1));
    let chunk_size = (len + workers - 1) / workers;
    (workers, chunk_size)
}

/// Solves `seed_sets.len()` independent least fixed points, each forking
/// `base` and seeding it with its own variables, spread across up to
/// `workers` OS threads. Results are returned in the same order as
/// `seed_sets`; `base` is only ever read (each worker calls
/// [`PartialSolution::fork`], which shares the propagation map via `Arc` and
/// allocates nothing but an empty `HashSet`), so sharing it across the scope
/// needs no locking.
pub fn solve_many_least_mt(base: &PartialSolution, seed_sets: &[Vec<VarId>], workers: usize) -> Vec<Solution> {
    if seed_sets.is_empty() {
        return Vec::new();
    }
    assert!(base.least(), "solve_many_least_mt requires a least-solution base");
    let (_workers, chunk_size) = chunk_index_ranges(seed_sets.len(), workers);

    let mut results: Vec<Option<Solution>> = (0..seed_sets.len()).map(|_| None).collect();

    std::thread::scope(|scope| {
        let mut handles = Vec::new();
        for (chunk_idx, chunk) in seed_sets.chunks(chunk_size).enumerate() {
            let base_index = chunk_idx * chunk_size;
            let handle = scope.spawn(move || {
                chunk
                    .iter()
                    .enumerate()
                    .map(|(i, seeds)| {
                        let mut partial = base.fork();
                        partial.seed(seeds.iter().copied());
                        (base_index + i, partial.to_solution())
                    })
                    .collect::<Vec<_>>()
            });
            handles.push(handle);
        }
        for handle in handles {
            for (idx, solution) in handle.join().expect("solver worker thread panicked") {
                results[idx] = Some(solution);
            }
        }
    });

    results
        .into_iter()
        .map(|r| r.expect("every seed set index must have been filled by exactly one worker"))
        .collect()
}

/// The parallel entry point for solving a batch of user-seeded kinds against
/// the shared whole-program baseline (spec §4.C.3 `solve_least_mt(kinds,
/// use_default_sinks)`): each `kind` is locked and solved as its own small
/// least-fixed-point partial solution over just that kind's constraints,
/// then merged against `default_base` (and `default_sinks_base`, if
/// `use_default_sinks`) — one worker per round-robin chunk of kinds,
/// `merge_in` reusing each baseline's already-built propagation map rather
/// than re-solving it per kind. Results are returned in the same order as
/// `kinds`.
pub fn solve_least_mt(
    store: &mut ConstraintStore,
    default_base: &PartialSolution,
    default_sinks_base: Option<&PartialSolution>,
    kinds: &[&str],
    workers: usize,
) -> Vec<Solution> {
    if kinds.is_empty() {
        return Vec::new();
    }
    assert!(default_base.least(), "solve_least_mt's default baseline must be a least solution");
    if let Some(sinks_base) = default_sinks_base {
        assert!(sinks_base.least(), "solve_least_mt's default-sinks baseline must be a least solution");
    }

    let kind_constraints: Vec<Vec<Constraint>> = kinds.iter().map(|k| store.lock_and_take(k)).collect();
    let (_workers, chunk_size) = chunk_index_ranges(kind_constraints.len(), workers);

    let mut results: Vec<Option<Solution>> = (0..kind_constraints.len()).map(|_| None).collect();

    std::thread::scope(|scope| {
        let mut handles = Vec::new();
        for (chunk_idx, chunk) in kind_constraints.chunks(chunk_size).enumerate() {
            let base_index = chunk_idx * chunk_size;
            let handle = scope.spawn(move || {
                chunk
                    .iter()
                    .enumerate()
                    .map(|(i, constraints)| {
                        let mut partial = PartialSolution::new(constraints, true);
                        partial.merge_in(default_base);
                        if let Some(sinks_base) = default_sinks_base {
                            partial.merge_in(sinks_base);
                        }
                        (base_index + i, partial.to_solution())
                    })
                    .collect::<Vec<_>>()
            });
            handles.push(handle);
        }
        for handle in handles {
            for (idx, solution) in handle.join().expect("solver worker thread panicked") {
                results[idx] = Some(solution);
            }
        }
    });

    results
        .into_iter()
        .map(|r| r.expect("every kind index must have been filled by exactly one worker"))
        .collect()
}

/// Computes both the least and greatest solution for one kind in two
/// threads, then frees its raw constraint list (spec §4.C.3 `solve_mt`):
/// once both fixed points exist as compact propagation maps, the constraint
/// list itself is never read again.
pub fn solve_mt(store: &mut ConstraintStore, kind: &str) -> (Solution, Solution) {
    let constraints = store.lock_and_take(kind);
    let (least, greatest) = std::thread::scope(|scope| {
        let least_handle = scope.spawn(|| worklist::solve(&constraints, true));
        let greatest_handle = scope.spawn(|| worklist::solve(&constraints, false));
        (
            least_handle.join().expect("least-solution worker thread panicked"),
            greatest_handle.join().expect("greatest-solution worker thread panicked"),
        )
    });
    store.release(kind);
    (least, greatest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kit::Kit;
    use crate::lattice::{Element, SecurityLevel};

    fn var(kit: &mut Kit, name: &str) -> (VarId, Element) {
        let e = kit.new_var(name);
        match &e {
            Element::Var(id) => (*id, e.clone()),
            _ => unreachable!(),
        }
    }

    #[test]
    fn bulk_solve_matches_sequential_chaining() {
        let mut kit = Kit::new();
        let (a_id, a) = var(&mut kit, "a");
        let (b_id, b) = var(&mut kit, "b");
        let constraints = vec![Constraint::new(a, b)];
        let base = PartialSolution::new(&constraints, true);

        let seed_sets: Vec<Vec<VarId>> = (0..40).map(|i| if i % 2 == 0 { vec![a_id] } else { Vec::new() }).collect();

        let results = solve_many_least_mt(&base, &seed_sets, 8);
        assert_eq!(results.len(), 40);
        for (i, sol) in results.iter().enumerate() {
            if i % 2 == 0 {
                assert_eq!(sol.var_value(b_id), SecurityLevel::High);
            } else {
                assert_eq!(sol.var_value(b_id), SecurityLevel::Low);
            }
        }
    }

    #[test]
    fn bulk_solve_with_no_seed_sets_returns_empty() {
        let base = PartialSolution::new(&[], true);
        let results = solve_many_least_mt(&base, &[], 16);
        assert!(results.is_empty());
    }

    #[test]
    fn solve_least_mt_merges_each_kind_against_the_default_baseline() {
        let mut kit = Kit::new();
        let mut store = ConstraintStore::new();
        let (a_id, a) = var(&mut kit, "a");
        let (b_id, b) = var(&mut kit, "b");
        let (c_id, c) = var(&mut kit, "c");

        // default: H ⊑ a.
        store.add_resolved(crate::constraints::DEFAULT, crate::lattice::high(), a.clone(), false);
        // kind "k1": a ⊑ b.
        store.add_resolved("k1", a.clone(), b, false);
        // kind "k2": c is never touched by anything.
        store.add_resolved("k2", c.clone(), c, false);

        let default_constraints = store.lock_and_take(crate::constraints::DEFAULT);
        let default_base = PartialSolution::new(&default_constraints, true);

        let results = solve_least_mt(&mut store, &default_base, None, &["k1", "k2"], 4);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].var_value(a_id), SecurityLevel::High);
        assert_eq!(results[0].var_value(b_id), SecurityLevel::High);
        assert_eq!(results[1].var_value(c_id), SecurityLevel::Low);
    }

    #[test]
    fn solve_mt_solves_both_directions_and_releases_the_kind() {
        let mut kit_ = Kit::new();
        let mut store = ConstraintStore::new();
        let a = kit_.new_var("a");
        let b = kit_.new_var("b");
        store.add_resolved("k", crate::lattice::high(), a.clone(), false);
        store.add_resolved("k", a, b, false);

        let (least, greatest) = solve_mt(&mut store, "k");
        assert!(least.least());
        assert!(!greatest.least());
        assert_eq!(store.explicit_count("k"), 0);
        assert!(store.is_locked("k"));
    }
}
