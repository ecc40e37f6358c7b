//! Constant-condition branch folding (spec §4.3.9): a `Branch` whose
//! condition is a literal 0/1 becomes an unconditional `Jump`, and the
//! edge to the now-unreachable target is severed.

use crate::ids::{BlockId, FunctionId, ValueId};
use crate::instruction::InstKind;
use crate::module::Module;
use crate::value::{UseSite, ValueKind};

pub fn run(module: &mut Module, fid: FunctionId) -> bool {
    let mut changed = false;
    let blocks = module.function(fid).blocks.clone();
    for bid in blocks {
        let Some(term) = module.block(bid).last_instruction() else { continue };
        let (cond, if_true, if_false) = match &module.value(term).kind {
            ValueKind::Inst(inst) => match inst.kind {
                InstKind::Branch { cond, if_true, if_false } => (cond, if_true, if_false),
                _ => continue,
            },
            _ => continue,
        };
        let Some(n) = module.value(cond).kind.as_number() else { continue };
        let (taken, dropped) = if n != 0 { (if_true, if_false) } else { (if_false, if_true) };
        fold_branch(module, bid, term, cond, taken, dropped);
        changed = true;
    }
    changed
}

fn fold_branch(module: &mut Module, block: BlockId, term: ValueId, cond: ValueId, taken: BlockId, dropped: BlockId) {
    if let ValueKind::Inst(inst) = &mut module.value_mut(term).kind {
        inst.kind = InstKind::Jump { target: taken };
    }
    module.remove_use(cond, UseSite::Value(term));
    if module.is_valid(cond) && module.value(cond).users.is_empty() {
        crate::abandon::abandon(module, cond);
    }
    if dropped != taken {
        module.remove_edge(block, dropped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::FuncKind;
    use crate::instruction::ResultRole;

    #[test]
    fn true_condition_collapses_to_jump_and_drops_false_edge() {
        let mut m = Module::new();
        let f = m.new_function("F*0_0$main", FuncKind::Int, BlockId(0));
        let entry = m.new_block(f, 1, true);
        let if_true = m.new_block(f, 1, true);
        let if_false = m.new_block(f, 1, true);
        m.function_mut(f).blocks = vec![entry, if_true, if_false];
        m.add_edge(entry, if_true);
        m.add_edge(entry, if_false);

        let one = m.intern_number(1);
        let branch = m.create_instruction(InstKind::Branch { cond: one, if_true, if_false }, entry, ResultRole::NoResult);
        m.push_instruction_to_block(entry, branch);

        assert!(run(&mut m, f));
        assert!(!m.block(entry).successors.contains(&if_false));
        assert!(m.block(entry).successors.contains(&if_true));
        if let ValueKind::Inst(inst) = &m.value(branch).kind {
            assert!(matches!(inst.kind, InstKind::Jump { target } if target == if_true));
        }
    }
}
