//! Basic blocks (spec §3.2) and the per-block bookkeeping the on-the-fly
//! SSA construction algorithm needs (spec §4.1.1).

use crate::ids::{BlockId, FunctionId, ValueId};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Loop depth saturates rather than growing without bound; this bounds
/// both the variable-weight exponent (spec §4.4.1) and pathological
/// nesting.
pub const MAX_LOOP_DEPTH: u32 = 12;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicBlock {
    pub id: BlockId,
    pub function: FunctionId,
    /// Ordered instruction ids, including phis once placed at the top
    /// (spec §4.4.5) and, post-elimination, PhiMove ids belonging to other
    /// blocks' phis physically inserted here.
    pub instructions: Vec<ValueId>,
    /// The subset of `instructions` that are `Phi`s, tracked separately so
    /// the builder and optimizer can find "this block's phis" without a
    /// linear scan (mirrors `BasicBlock::phis` in spec §3.2).
    pub phis: IndexSet<ValueId>,
    pub predecessors: IndexSet<BlockId>,
    pub successors: IndexSet<BlockId>,
    pub loop_depth: u32,
    /// Values live at block entry (spec §3.2 `aliveValues`), populated by
    /// liveness.
    pub alive_values: IndexSet<ValueId>,

    // --- SSA-construction bookkeeping (spec §4.1.1) ---
    pub sealed: bool,
    pub local_var_ssa_map: IndexMap<String, ValueId>,
    pub incomplete_phis: IndexMap<String, ValueId>,
}

impl BasicBlock {
    pub fn new(id: BlockId, function: FunctionId, loop_depth: u32) -> Self {
        Self {
            id,
            function,
            instructions: Vec::new(),
            phis: IndexSet::new(),
            predecessors: IndexSet::new(),
            successors: IndexSet::new(),
            loop_depth: loop_depth.min(MAX_LOOP_DEPTH),
            alive_values: IndexSet::new(),
            sealed: true,
            local_var_ssa_map: IndexMap::new(),
            incomplete_phis: IndexMap::new(),
        }
    }

    /// Created unsealed only for the body block of a while loop, which may
    /// later gain the tail-condition block as an additional predecessor
    /// (spec §4.1.1, §4.1.2).
    pub fn new_unsealed(id: BlockId, function: FunctionId, loop_depth: u32) -> Self {
        let mut b = Self::new(id, function, loop_depth);
        b.sealed = false;
        b
    }

    pub fn last_instruction(&self) -> Option<ValueId> {
        self.instructions.last().copied()
    }
}
