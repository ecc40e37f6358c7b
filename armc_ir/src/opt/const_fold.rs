//! Constant folding and algebraic simplification (spec §4.3.2).

use crate::ids::{FunctionId, ValueId};
use crate::instruction::{BinaryOp, CmpOp, InstKind, UnaryOp};
use crate::module::Module;
use crate::phi;
use crate::value::{UseSite, ValueKind};

pub fn run(module: &mut Module, fid: FunctionId) -> bool {
    let mut changed = false;
    let blocks = module.function(fid).blocks.clone();
    for bid in blocks {
        let instructions = module.block(bid).instructions.clone();
        for iid in instructions {
            if !module.is_valid(iid) {
                continue;
            }
            if let Some(replacement) = try_fold(module, iid) {
                replace_value(module, iid, replacement);
                changed = true;
            }
        }
    }
    changed
}

fn as_number(module: &Module, id: ValueId) -> Option<i32> {
    module.value(id).kind.as_number()
}

fn try_fold(module: &mut Module, iid: ValueId) -> Option<ValueId> {
    let kind = match &module.value(iid).kind {
        ValueKind::Inst(inst) => inst.kind.clone(),
        _ => return None,
    };

    match kind {
        InstKind::Unary { op, value } => fold_unary(module, op, value, iid),
        InstKind::Binary { op, lhs, rhs } => fold_binary(module, op, lhs, rhs),
        InstKind::Cmp { op, lhs, rhs } => fold_cmp(module, op, lhs, rhs, iid),
        InstKind::Load { address, offset } => fold_load(module, address, offset),
        InstKind::Phi { .. } => {
            let result = phi::remove_trivial_phi(module, iid);
            if result == iid {
                None
            } else {
                Some(result)
            }
        }
        _ => None,
    }
}

fn fold_unary(module: &mut Module, op: UnaryOp, value: ValueId, _self_id: ValueId) -> Option<ValueId> {
    if op == UnaryOp::Plus {
        return Some(value);
    }
    if let Some(n) = as_number(module, value) {
        let folded = match op {
            UnaryOp::Plus => n,
            UnaryOp::Neg => n.wrapping_neg(),
            UnaryOp::Not => (n == 0) as i32,
        };
        return Some(module.intern_number(folded));
    }
    // `-(-x) -> x`, `!(!x) -> x`: inner unary of the matching shape collapses.
    if let ValueKind::Inst(inner) = &module.value(value).kind {
        if let InstKind::Unary { op: inner_op, value: inner_value } = inner.kind {
            match (op, inner_op) {
                (UnaryOp::Neg, UnaryOp::Neg) => return Some(inner_value),
                (UnaryOp::Not, UnaryOp::Not) => return Some(inner_value),
                _ => {}
            }
        }
    }
    None
}

fn fold_binary(module: &mut Module, op: BinaryOp, lhs: ValueId, rhs: ValueId) -> Option<ValueId> {
    if let (Some(a), Some(b)) = (as_number(module, lhs), as_number(module, rhs)) {
        let folded = match op {
            BinaryOp::Add => Some(a.wrapping_add(b)),
            BinaryOp::Sub => Some(a.wrapping_sub(b)),
            BinaryOp::Mul => Some(a.wrapping_mul(b)),
            BinaryOp::Div if b != 0 => Some(a.wrapping_div(b)),
            BinaryOp::Mod if b != 0 => Some(a.wrapping_rem(b)),
            BinaryOp::And => Some(((a != 0) && (b != 0)) as i32),
            BinaryOp::Or => Some(((a != 0) || (b != 0)) as i32),
            BinaryOp::Relational(cmp) => Some(cmp.eval(a, b) as i32),
            BinaryOp::Div | BinaryOp::Mod => None, // division/modulus by zero: leave for runtime (spec §7)
        };
        if let Some(v) = folded {
            return Some(module.intern_number(v));
        }
    }

    let lhs_num = as_number(module, lhs);
    let rhs_num = as_number(module, rhs);

    match (op, lhs_num, rhs_num) {
        (BinaryOp::Add, Some(0), _) => return Some(rhs),
        (BinaryOp::Add, _, Some(0)) => return Some(lhs),
        (BinaryOp::Sub, _, Some(0)) => return Some(lhs),
        (BinaryOp::Mul, Some(0), _) => return Some(lhs),
        (BinaryOp::Mul, _, Some(0)) => return Some(rhs),
        (BinaryOp::Mul, Some(1), _) => return Some(rhs),
        (BinaryOp::Mul, _, Some(1)) => return Some(lhs),
        (BinaryOp::Div, _, Some(1)) => return Some(lhs),
        (BinaryOp::Mod, _, Some(1)) => return Some(module.intern_number(0)),
        _ => {}
    }

    if lhs == rhs {
        match op {
            BinaryOp::Sub => return Some(module.intern_number(0)),
            BinaryOp::Div => return Some(module.intern_number(1)),
            BinaryOp::Mod => return Some(module.intern_number(0)),
            _ => {}
        }
    }

    // `a - (-b) -> a + b`.
    if op == BinaryOp::Sub {
        if let Some(negated) = negated_operand(module, rhs) {
            return Some(module.create_instruction(
                InstKind::Binary { op: BinaryOp::Add, lhs, rhs: negated },
                owning_block(module, lhs).unwrap_or(owning_block_of_rhs(module, rhs)),
                crate::instruction::ResultRole::RValue,
            ));
        }
    }
    // `a + (-a) -> 0` (either side negated).
    if op == BinaryOp::Add {
        if let Some(negated) = negated_operand(module, rhs) {
            if negated == lhs {
                return Some(module.intern_number(0));
            }
        }
        if let Some(negated) = negated_operand(module, lhs) {
            if negated == rhs {
                return Some(module.intern_number(0));
            }
        }
    }

    None
}

fn negated_operand(module: &Module, id: ValueId) -> Option<ValueId> {
    match &module.value(id).kind {
        ValueKind::Inst(inst) => match inst.kind {
            InstKind::Unary { op: UnaryOp::Neg, value } => Some(value),
            _ => None,
        },
        _ => None,
    }
}

fn owning_block(module: &Module, id: ValueId) -> Option<crate::ids::BlockId> {
    phi::owning_block(module, id)
}

fn owning_block_of_rhs(module: &Module, id: ValueId) -> crate::ids::BlockId {
    phi::owning_block(module, id).expect("rhs of a Sub fold is always an instruction or has a resolvable block")
}

fn fold_cmp(module: &mut Module, op: CmpOp, lhs: ValueId, rhs: ValueId, self_id: ValueId) -> Option<ValueId> {
    if let (Some(a), Some(b)) = (as_number(module, lhs), as_number(module, rhs)) {
        return Some(module.intern_number(op.eval(a, b) as i32));
    }
    // Canonicalize a constant on the left to the right-hand side.
    if as_number(module, lhs).is_some() && as_number(module, rhs).is_none() {
        if let ValueKind::Inst(inst) = &mut module.value_mut(self_id).kind {
            inst.kind = InstKind::Cmp { op: op.swapped(), lhs: rhs, rhs: lhs };
        }
    }
    None
}

fn fold_load(module: &mut Module, address: ValueId, offset: ValueId) -> Option<ValueId> {
    let idx = as_number(module, offset)?;
    let data = module.value(address).kind.as_constant()?.clone();
    let v = if idx >= 0 { data.get(idx as usize) } else { 0 };
    Some(module.intern_number(v))
}

/// Redirects every use of `old` to `new`, inheriting `old`'s lvalue role
/// when it had one (spec §4.3.2), then abandons `old`.
fn replace_value(module: &mut Module, old: ValueId, new: ValueId) {
    if old == new {
        return;
    }
    let old_role = match &module.value(old).kind {
        ValueKind::Inst(inst) => Some(inst.role.clone()),
        _ => None,
    };
    if let (Some(role), ValueKind::Inst(new_inst)) = (&old_role, &mut module.value_mut(new).kind) {
        if role.is_lvalue() && !new_inst.role.is_lvalue() {
            new_inst.role = role.clone();
        }
    }

    let users: Vec<UseSite> = module.value(old).users.iter().copied().collect();
    for user in &users {
        match *user {
            UseSite::Value(v) => {
                if let ValueKind::Inst(inst) = &mut module.value_mut(v).kind {
                    inst.kind.replace_operand(old, new);
                }
                module.add_use(new, UseSite::Value(v));
            }
            UseSite::Block(b) => {
                let entries: Vec<String> = module
                    .block(b)
                    .local_var_ssa_map
                    .iter()
                    .filter(|(_, v)| **v == old)
                    .map(|(k, _)| k.clone())
                    .collect();
                for name in entries {
                    module.block_mut(b).local_var_ssa_map.insert(name, new);
                }
                module.add_use(new, UseSite::Block(b));
            }
        }
    }

    let operands = match &module.value(old).kind {
        ValueKind::Inst(inst) => inst.kind.operands(),
        _ => Vec::new(),
    };
    for op in operands {
        module.remove_use(op, UseSite::Value(old));
    }
    module.value_mut(old).valid = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::FuncKind;
    use crate::ids::BlockId;
    use crate::instruction::ResultRole;

    #[test]
    fn folds_constant_addition() {
        let mut m = Module::new();
        let f = m.new_function("F*0_0$main", FuncKind::Int, BlockId(0));
        let b0 = m.new_block(f, 1, true);
        m.function_mut(f).blocks = vec![b0];
        let a = m.intern_number(2);
        let b = m.intern_number(3);
        let add = m.create_instruction(InstKind::Binary { op: BinaryOp::Add, lhs: a, rhs: b }, b0, ResultRole::RValue);
        m.push_instruction_to_block(b0, add);
        let ret = m.create_instruction(InstKind::Return { value: Some(add) }, b0, ResultRole::NoResult);
        m.push_instruction_to_block(b0, ret);

        assert!(run(&mut m, f));
        if let ValueKind::Inst(inst) = &m.value(ret).kind {
            if let InstKind::Return { value: Some(v) } = inst.kind {
                assert_eq!(m.value(v).kind.as_number(), Some(5));
                return;
            }
        }
        panic!("expected folded return operand");
    }

    #[test]
    fn simplifies_additive_identity() {
        let mut m = Module::new();
        let f = m.new_function("F*0_0$main", FuncKind::Int, BlockId(0));
        let b0 = m.new_block(f, 1, true);
        m.function_mut(f).blocks = vec![b0];
        let zero = m.intern_number(0);
        let param = m.new_parameter(crate::value::ParameterData {
            name: "x".into(),
            cell: crate::value::Cell::Int,
            dimensions: vec![],
        });
        let add = m.create_instruction(InstKind::Binary { op: BinaryOp::Add, lhs: zero, rhs: param }, b0, ResultRole::RValue);
        m.push_instruction_to_block(b0, add);
        let ret = m.create_instruction(InstKind::Return { value: Some(add) }, b0, ResultRole::NoResult);
        m.push_instruction_to_block(b0, ret);

        assert!(run(&mut m, f));
        if let ValueKind::Inst(inst) = &m.value(ret).kind {
            if let InstKind::Return { value: Some(v) } = inst.kind {
                assert_eq!(v, param);
                return;
            }
        }
        panic!("expected 0+x to simplify to x");
    }
}
