//! Abandonment: the garbage-collection side of invariant U2. A value with
//! an empty use-set (and no kind-specific reason to survive) is marked
//! invalid and its own operands lose a use in turn. Driven by an explicit
//! worklist rather than recursion (spec §9) to avoid re-entrancy when two
//! operands of the same abandoned instruction would otherwise each try to
//! abandon a shared third operand.

use crate::module::Module;
use crate::value::{UseSite, ValueKind};
use crate::ids::ValueId;
use std::collections::VecDeque;

/// Marks `seed` invalid if it is safe to (empty use-set, not a kept kind,
/// not an interned Number/Undefined), and cascades to its operands.
/// Returns the full set of ids abandoned, in abandonment order.
pub fn abandon(module: &mut Module, seed: ValueId) -> Vec<ValueId> {
    let mut abandoned = Vec::new();
    let mut worklist = VecDeque::new();
    worklist.push_back(seed);

    while let Some(id) = worklist.pop_front() {
        if !module.is_valid(id) {
            continue;
        }
        if !can_abandon(module, id) {
            continue;
        }

        let operands = match &module.value(id).kind {
            ValueKind::Inst(inst) => inst.kind.operands(),
            _ => Vec::new(),
        };

        module.value_mut(id).valid = false;
        abandoned.push(id);

        for operand in operands {
            module.remove_use(operand, UseSite::Value(id));
            if module.is_valid(operand) && module.value(operand).users.is_empty() {
                worklist.push_back(operand);
            }
        }
    }

    abandoned
}

/// Numbers, strings, and `Undefined` are never abandoned even with an
/// empty use-set — they are shared/interned or stand for "nothing to load
/// here", not transient computation (spec §3.1, §3.5). Instructions whose
/// kind is always kept (branches, stores, calls, ...) are never abandoned
/// purely for lacking users either (spec §4.3.3).
fn can_abandon(module: &Module, id: ValueId) -> bool {
    let node = module.value(id);
    if !node.users.is_empty() {
        return false;
    }
    match &node.kind {
        ValueKind::Number(_) | ValueKind::Str(_) | ValueKind::Undefined => false,
        ValueKind::Constant(_) | ValueKind::Global(_) | ValueKind::Parameter(_) => false,
        ValueKind::Inst(inst) => !inst.kind.is_always_kept_kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::FuncKind;
    use crate::ids::BlockId;
    use crate::instruction::{BinaryOp, InstKind, ResultRole};

    #[test]
    fn abandoning_a_binary_cascades_to_dead_operand() {
        let mut m = Module::new();
        let f = m.new_function("F*0_0$main", FuncKind::Int, BlockId(0));
        let b0 = m.new_block(f, 1, true);
        let one = m.intern_number(1);
        let neg = m.create_instruction(InstKind::Unary { op: crate::instruction::UnaryOp::Neg, value: one }, b0, ResultRole::RValue);
        let add = m.create_instruction(InstKind::Binary { op: BinaryOp::Add, lhs: neg, rhs: one }, b0, ResultRole::RValue);

        let removed = abandon(&mut m, add);
        assert!(removed.contains(&add));
        assert!(removed.contains(&neg));
        assert!(!m.is_valid(add));
        assert!(!m.is_valid(neg));
        // `one` is interned and still used by `add`'s rhs use-site removal... but add itself
        // is gone, so `one` should have lost both uses and yet remain valid (Number is never abandoned).
        assert!(m.is_valid(one));
    }

    #[test]
    fn always_kept_kind_survives_empty_use_set() {
        let mut m = Module::new();
        let f = m.new_function("F*0_0$main", FuncKind::Int, BlockId(0));
        let b0 = m.new_block(f, 1, true);
        let store = m.create_instruction(
            InstKind::Store { value: m.intern_number(0), address: m.intern_number(0), offset: m.intern_number(0) },
            b0,
            ResultRole::NoResult,
        );
        let removed = abandon(&mut m, store);
        assert!(removed.is_empty());
        assert!(m.is_valid(store));
    }
}
