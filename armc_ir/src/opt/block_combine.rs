//! Block merging (spec §4.3.10): a block with exactly one successor that
//! has exactly one predecessor (this block) folds into it — the successor's
//! instructions splice onto the end, its phis (which then have exactly one
//! operand) degrade to plain values, and the CFG edge collapses.

use crate::ids::{BlockId, FunctionId, ValueId};
use crate::instruction::InstKind;
use crate::module::Module;
use crate::phi;
use crate::value::ValueKind;

pub fn run(module: &mut Module, fid: FunctionId) -> bool {
    let mut changed = false;
    loop {
        let Some((a, b)) = find_mergeable_pair(module, fid) else { break };
        merge(module, fid, a, b);
        changed = true;
    }
    changed
}

fn find_mergeable_pair(module: &Module, fid: FunctionId) -> Option<(BlockId, BlockId)> {
    for &a in &module.function(fid).blocks {
        if module.block(a).successors.len() == 1 {
            let b = *module.block(a).successors.iter().next().unwrap();
            if b != a && module.block(b).predecessors.len() == 1 && module.block(b).predecessors.contains(&a) {
                return Some((a, b));
            }
        }
    }
    None
}

fn merge(module: &mut Module, fid: FunctionId, a: BlockId, b: BlockId) {
    // `a`'s terminator (the sole Jump to `b`) is discarded; `b`'s phis
    // become plain single-operand values first so nothing downstream still
    // expects a Phi keyed by the soon-to-vanish edge.
    let phis: Vec<ValueId> = module.block(b).phis.iter().copied().collect();
    for phi in phis {
        phi::remove_trivial_phi(module, phi);
    }

    if let Some(term) = module.block(a).last_instruction() {
        if matches!(&module.value(term).kind, ValueKind::Inst(inst) if matches!(inst.kind, InstKind::Jump { .. })) {
            module.block_mut(a).instructions.pop();
            module.value_mut(term).valid = false;
        }
    }

    let b_instructions = module.block(b).instructions.clone();
    for &iid in &b_instructions {
        if let ValueKind::Inst(inst) = &mut module.value_mut(iid).kind {
            inst.block = a;
        }
    }
    module.block_mut(a).instructions.extend(b_instructions);

    let b_successors = module.block(b).successors.clone();
    module.remove_edge(a, b);
    for s in b_successors {
        module.remove_edge(b, s);
        module.add_edge(a, s);
        retarget_phi_operand(module, s, b, a);
    }

    module.function_mut(fid).blocks.retain(|&bid| bid != b);
}

/// A successor's phi may key an operand on `b` (`b` as its predecessor);
/// now that `a` absorbed `b`, that operand belongs to `a` instead.
fn retarget_phi_operand(module: &mut Module, successor: BlockId, from: BlockId, to: BlockId) {
    let phis = module.block(successor).phis.clone();
    for phi in phis {
        if let ValueKind::Inst(inst) = &mut module.value_mut(phi).kind {
            if let InstKind::Phi { operands, .. } = &mut inst.kind {
                if let Some(v) = operands.shift_remove(&from) {
                    operands.insert(to, v);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::FuncKind;
    use crate::instruction::ResultRole;

    #[test]
    fn sole_successor_with_sole_predecessor_merges() {
        let mut m = Module::new();
        let f = m.new_function("F*0_0$main", FuncKind::Int, BlockId(0));
        let a = m.new_block(f, 1, true);
        let b = m.new_block(f, 1, true);
        m.function_mut(f).blocks = vec![a, b];
        m.add_edge(a, b);

        let jump = m.create_instruction(InstKind::Jump { target: b }, a, ResultRole::NoResult);
        m.push_instruction_to_block(a, jump);
        let zero = m.intern_number(0);
        let ret = m.create_instruction(InstKind::Return { value: Some(zero) }, b, ResultRole::NoResult);
        m.push_instruction_to_block(b, ret);

        assert!(run(&mut m, f));
        assert_eq!(m.function(f).blocks, vec![a]);
        assert!(m.block(a).instructions.contains(&ret));
    }
}
