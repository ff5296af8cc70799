//! Control-dependence computation for the implicit flow rule (spec §4.E.4):
//! when a conditional terminator's condition is tainted, every block whose
//! execution depends on which way that branch goes must have its PC
//! variable tainted too.
//!
//! A block `b` is control-dependent on a branch at `branch_block` through
//! successor `successor` if `b` is reachable from `successor` without first
//! passing through a block that post-dominates `branch_block` (such a block
//! is reached regardless of which way the branch went, so it is not
//! control-dependent on it).

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::ir::{BasicBlock, BlockId, FunctionId};
use crate::providers::PostDominatorProvider;

/// The set of blocks control-dependent on `branch_block` through
/// `successor`.
///
/// Marks `successor` visited *before* pushing it (and every further
/// candidate the same way) so a cyclic CFG can't requeue the same block
/// twice — queuing on first discovery rather than on dequeue is what keeps
/// this terminating and linear instead of re-walking a loop's back-edge
/// indefinitely.
pub fn control_dependent_blocks(
    function: FunctionId,
    branch_block: BlockId,
    successor: BlockId,
    blocks: &BTreeMap<BlockId, &BasicBlock>,
    post_dominators: &impl PostDominatorProvider,
) -> BTreeSet<BlockId> {
    let mut visited: BTreeSet<BlockId> = BTreeSet::new();
    let mut queue: VecDeque<BlockId> = VecDeque::new();
    visited.insert(successor);
    queue.push_back(successor);

    let mut dependent: BTreeSet<BlockId> = BTreeSet::new();

    while let Some(block) = queue.pop_front() {
        if post_dominators.dominates(function, block, branch_block) {
            // Reached regardless of which way the branch went: not
            // control-dependent, and don't walk past it either.
            continue;
        }
        dependent.insert(block);
        if let Some(bb) = blocks.get(&block) {
            for succ in bb.terminator.successors() {
                if !visited.contains(&succ) {
                    visited.insert(succ);
                    queue.push_back(succ);
                }
            }
        }
    }

    dependent
}

/// Unions [`control_dependent_blocks`] over every successor of a branching
/// terminator — the full implicit-flow sink set for one conditional branch.
pub fn sink_blocks_for_terminator(
    function: FunctionId,
    branch_block: BlockId,
    successors: &[BlockId],
    blocks: &BTreeMap<BlockId, &BasicBlock>,
    post_dominators: &impl PostDominatorProvider,
) -> BTreeSet<BlockId> {
    let mut out = BTreeSet::new();
    for &succ in successors {
        out.extend(control_dependent_blocks(function, branch_block, succ, blocks, post_dominators));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Terminator;

    struct AlwaysPostDominates(BlockId);
    impl PostDominatorProvider for AlwaysPostDominates {
        fn dominates(&self, _function: FunctionId, a: BlockId, _b: BlockId) -> bool {
            a == self.0
        }
    }

    struct NeverPostDominates;
    impl PostDominatorProvider for NeverPostDominates {
        fn dominates(&self, _function: FunctionId, _a: BlockId, _b: BlockId) -> bool {
            false
        }
    }

    fn bb(id: u32, term: Terminator) -> BasicBlock {
        BasicBlock { id: BlockId(id), instructions: Vec::new(), terminator: term }
    }

    #[test]
    fn stops_at_post_dominator_and_excludes_it() {
        // 0 (branch) -> {1, 2}; 1 -> 3; 2 -> 3; 3 post-dominates 0 (the join point).
        let b0 = bb(0, Terminator::CondBranch { cond: crate::ir::ValueId(0), if_true: BlockId(1), if_false: BlockId(2) });
        let b1 = bb(1, Terminator::Branch { target: BlockId(3) });
        let b2 = bb(2, Terminator::Branch { target: BlockId(3) });
        let b3 = bb(3, Terminator::Unreachable);
        let blocks: BTreeMap<BlockId, &BasicBlock> =
            [(BlockId(0), &b0), (BlockId(1), &b1), (BlockId(2), &b2), (BlockId(3), &b3)].into_iter().collect();

        let pd = AlwaysPostDominates(BlockId(3));
        let dependent = sink_blocks_for_terminator(FunctionId(0), BlockId(0), &[BlockId(1), BlockId(2)], &blocks, &pd);

        assert_eq!(dependent, [BlockId(1), BlockId(2)].into_iter().collect());
        assert!(!dependent.contains(&BlockId(3)));
    }

    #[test]
    fn cyclic_cfg_terminates_and_visits_each_block_once() {
        // 0 (branch) -> {1}; 1 -> 1 (self-loop); no post-dominator ever reached.
        let b0 = bb(0, Terminator::CondBranch { cond: crate::ir::ValueId(0), if_true: BlockId(1), if_false: BlockId(1) });
        let b1 = bb(1, Terminator::Branch { target: BlockId(1) });
        let blocks: BTreeMap<BlockId, &BasicBlock> = [(BlockId(0), &b0), (BlockId(1), &b1)].into_iter().collect();

        let dependent = sink_blocks_for_terminator(FunctionId(0), BlockId(0), &[BlockId(1)], &blocks, &NeverPostDominates);
        assert_eq!(dependent, [BlockId(1)].into_iter().collect());
    }
}
