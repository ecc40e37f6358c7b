//! Dead-code, dead-block, and dead-function elimination (spec §4.3.3).

use crate::abandon::abandon;
use crate::ids::{BlockId, FunctionId, ValueId};
use crate::instruction::{CallTarget, InstKind};
use crate::module::Module;
use crate::value::ValueKind;
use indexmap::IndexSet;

/// Removes instructions whose result has no users and whose kind isn't
/// always kept, cascading through the abandon worklist. Returns whether
/// anything changed.
pub fn run_function(module: &mut Module, fid: FunctionId) -> bool {
    let mut changed = false;
    let blocks = module.function(fid).blocks.clone();
    for bid in blocks {
        let instructions = module.block(bid).instructions.clone();
        for iid in instructions {
            if !module.is_valid(iid) {
                continue;
            }
            let is_dead_candidate = match &module.value(iid).kind {
                ValueKind::Inst(inst) => {
                    !inst.kind.is_always_kept_kind() && module.value(iid).users.is_empty()
                }
                _ => false,
            };
            if is_dead_candidate {
                let removed = abandon(module, iid);
                if !removed.is_empty() {
                    changed = true;
                }
            }
        }
    }
    // Earlier passes (constant folding, local-array promotion) leave
    // invalidated ids sitting in block instruction lists for this pass to
    // sweep, regardless of whether this call found anything new to abandon.
    let pruned = prune_invalid_from_blocks(module, fid);
    changed || pruned
}

fn prune_invalid_from_blocks(module: &mut Module, fid: FunctionId) -> bool {
    let mut pruned = false;
    let blocks = module.function(fid).blocks.clone();
    for bid in blocks {
        let before = module.block(bid).instructions.len();
        let kept: Vec<ValueId> = module.block(bid).instructions.iter().copied().filter(|&id| module.is_valid(id)).collect();
        pruned |= kept.len() != before;
        module.block_mut(bid).instructions = kept;
        let kept_phis: IndexSet<ValueId> = module.block(bid).phis.iter().copied().filter(|&id| module.is_valid(id)).collect();
        module.block_mut(bid).phis = kept_phis;
    }
    pruned
}

/// Removes blocks unreachable from the function's entry, severing CFG
/// edges into them and abandoning the values they solely defined.
pub fn remove_dead_blocks(module: &mut Module, fid: FunctionId) -> bool {
    let entry = module.function(fid).entry;
    let all_blocks = module.function(fid).blocks.clone();

    let mut reachable: IndexSet<BlockId> = IndexSet::new();
    let mut stack = vec![entry];
    while let Some(b) = stack.pop() {
        if !reachable.insert(b) {
            continue;
        }
        for s in module.block(b).successors.clone() {
            stack.push(s);
        }
    }

    let dead: Vec<BlockId> = all_blocks.iter().copied().filter(|b| !reachable.contains(b)).collect();
    if dead.is_empty() {
        return false;
    }

    for &b in &dead {
        let succs = module.block(b).successors.clone();
        for s in succs {
            module.remove_edge(b, s);
        }
        let preds = module.block(b).predecessors.clone();
        for p in preds {
            module.remove_edge(p, b);
        }
        let instructions = module.block(b).instructions.clone();
        for iid in instructions {
            if module.is_valid(iid) {
                abandon(module, iid);
            }
        }
    }

    let kept: Vec<BlockId> = all_blocks.into_iter().filter(|b| reachable.contains(b)).collect();
    module.function_mut(fid).blocks = kept;
    true
}

/// Removes functions with no remaining callers other than `main`, and
/// recomputes each surviving function's `may_have_side_effects` flag from
/// whether it (transitively) reaches a builtin call or a global store.
pub fn remove_dead_functions(module: &mut Module) -> bool {
    let order = module.function_order.clone();
    let mut reachable: IndexSet<FunctionId> = IndexSet::new();
    let main = order.iter().copied().find(|&f| module.function(f).is_main());

    if let Some(main) = main {
        let mut stack = vec![main];
        while let Some(f) = stack.pop() {
            if !reachable.insert(f) {
                continue;
            }
            for callee in module.function(f).callees.clone() {
                stack.push(callee);
            }
        }
    } else {
        reachable.extend(order.iter().copied());
    }

    let dead: Vec<FunctionId> = order.iter().copied().filter(|f| !reachable.contains(f)).collect();
    for &f in &dead {
        for callee in module.function(f).callees.clone() {
            module.function_mut(callee).callers.shift_remove(&f);
        }
        module.remove_function(f);
    }
    !dead.is_empty()
}

/// Recomputes `may_have_side_effects` (a builtin call, or a Store to a
/// global/through a pointer parameter, makes a function impure) and
/// `callees`/`callers` from the current instruction set.
pub fn recompute_call_graph(module: &mut Module) {
    let order = module.function_order.clone();
    for &fid in &order {
        let mut callees = IndexSet::new();
        let mut side_effects = false;
        for &bid in &module.function(fid).blocks.clone() {
            for &iid in &module.block(bid).instructions.clone() {
                if let ValueKind::Inst(inst) = &module.value(iid).kind {
                    match &inst.kind {
                        InstKind::Invoke { target, .. } => {
                            side_effects = true;
                            if let CallTarget::Function(callee) = target {
                                callees.insert(*callee);
                            }
                        }
                        InstKind::Store { .. } => side_effects = true,
                        _ => {}
                    }
                }
            }
        }
        for &callee in &callees {
            module.function_mut(callee).callers.insert(fid);
        }
        let f = module.function_mut(fid);
        f.callees = callees;
        f.may_have_side_effects = side_effects;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::FuncKind;
    use crate::ids::BlockId;
    use crate::instruction::{BinaryOp, ResultRole};

    #[test]
    fn dead_binary_is_abandoned() {
        let mut m = Module::new();
        let f = m.new_function("F*0_0$main", FuncKind::Int, BlockId(0));
        let b0 = m.new_block(f, 1, true);
        m.function_mut(f).blocks = vec![b0];
        let one = m.intern_number(1);
        let dead = m.create_instruction(InstKind::Binary { op: BinaryOp::Add, lhs: one, rhs: one }, b0, ResultRole::RValue);
        m.push_instruction_to_block(b0, dead);
        let ret = m.create_instruction(InstKind::Return { value: Some(one) }, b0, ResultRole::NoResult);
        m.push_instruction_to_block(b0, ret);

        assert!(run_function(&mut m, f));
        assert!(!m.is_valid(dead));
        assert!(!m.block(b0).instructions.contains(&dead));
    }

    #[test]
    fn unreachable_block_is_dropped() {
        let mut m = Module::new();
        let f = m.new_function("F*0_0$main", FuncKind::Int, BlockId(0));
        let entry = m.new_block(f, 1, true);
        let dead_block = m.new_block(f, 1, true);
        m.function_mut(f).blocks = vec![entry, dead_block];
        let zero = m.intern_number(0);
        let ret = m.create_instruction(InstKind::Return { value: Some(zero) }, entry, ResultRole::NoResult);
        m.push_instruction_to_block(entry, ret);

        assert!(remove_dead_blocks(&mut m, f));
        assert_eq!(m.function(f).blocks, vec![entry]);
    }
}
