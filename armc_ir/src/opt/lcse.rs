//! Local common-subexpression elimination (spec §4.3.8): within a single
//! block, structurally identical `Unary`/`Binary`/`Cmp`/`Load` instructions
//! collapse to the first occurrence. `BinaryOp::is_commutative` (only
//! `Add`/`Mul`, spec §9) lets `a+b` and `b+a` hash the same.

use crate::ids::{FunctionId, ValueId};
use crate::instruction::{InstKind, UnaryOp};
use crate::module::Module;
use crate::value::ValueKind;
use std::collections::HashMap;

/// A structural key for "same computation" purposes — operand order is
/// normalized for commutative ops so `a+b` and `b+a` collide.
#[derive(Hash, PartialEq, Eq)]
enum Key {
    Unary(UnaryOpKey, ValueId),
    Binary(BinaryOpKey, ValueId, ValueId),
    Cmp(CmpOpKey, ValueId, ValueId),
    Load(ValueId, ValueId),
}

#[derive(Hash, PartialEq, Eq)]
struct UnaryOpKey(u8);
#[derive(Hash, PartialEq, Eq)]
struct BinaryOpKey(u8, Option<crate::instruction::CmpOp>);
#[derive(Hash, PartialEq, Eq)]
struct CmpOpKey(crate::instruction::CmpOp);

fn unary_tag(op: UnaryOp) -> u8 {
    match op {
        UnaryOp::Plus => 0,
        UnaryOp::Neg => 1,
        UnaryOp::Not => 2,
    }
}

fn binary_tag(op: crate::instruction::BinaryOp) -> (u8, Option<crate::instruction::CmpOp>) {
    use crate::instruction::BinaryOp::*;
    match op {
        Add => (0, None),
        Sub => (1, None),
        Mul => (2, None),
        Div => (3, None),
        Mod => (4, None),
        And => (5, None),
        Or => (6, None),
        Relational(cmp) => (7, Some(cmp)),
    }
}

fn key_of(module: &Module, kind: &InstKind) -> Option<Key> {
    match kind {
        InstKind::Unary { op, value } => Some(Key::Unary(UnaryOpKey(unary_tag(*op)), *value)),
        InstKind::Binary { op, lhs, rhs } => {
            let (tag, cmp) = binary_tag(*op);
            let (a, b) = if op.is_commutative() { order(*lhs, *rhs) } else { (*lhs, *rhs) };
            Some(Key::Binary(BinaryOpKey(tag, cmp), a, b))
        }
        InstKind::Cmp { op, lhs, rhs } => Some(Key::Cmp(CmpOpKey(*op), *lhs, *rhs)),
        // Only a Load from an immutable Constant is safe to dedupe across
        // program points within the block — a Global could have been
        // written by an intervening call (spec §4.3.3 side-effect model).
        InstKind::Load { address, offset } if module.value(*address).kind.as_constant().is_some() => {
            Some(Key::Load(*address, *offset))
        }
        _ => None,
    }
}

fn order(a: ValueId, b: ValueId) -> (ValueId, ValueId) {
    if a.0 <= b.0 {
        (a, b)
    } else {
        (b, a)
    }
}

/// A Store, Invoke, or side-effecting instruction between two otherwise
/// identical Loads invalidates a would-be match; conservatively clear the
/// whole table whenever one is seen.
fn invalidates_table(kind: &InstKind) -> bool {
    matches!(kind, InstKind::Store { .. } | InstKind::Invoke { .. })
}

pub fn run(module: &mut Module, fid: FunctionId) -> bool {
    let mut changed = false;
    let blocks = module.function(fid).blocks.clone();
    for bid in blocks {
        let mut seen: HashMap<Key, ValueId> = HashMap::new();
        let instructions = module.block(bid).instructions.clone();
        for iid in instructions {
            if !module.is_valid(iid) {
                continue;
            }
            let kind = match &module.value(iid).kind {
                ValueKind::Inst(inst) => inst.kind.clone(),
                _ => continue,
            };
            if invalidates_table(&kind) {
                seen.clear();
                continue;
            }
            let Some(key) = key_of(module, &kind) else { continue };
            if let Some(&earlier) = seen.get(&key) {
                replace_with(module, iid, earlier);
                changed = true;
            } else {
                seen.insert(key, iid);
            }
        }
    }
    changed
}

fn replace_with(module: &mut Module, old: ValueId, new: ValueId) {
    let users: Vec<crate::value::UseSite> = module.value(old).users.iter().copied().collect();
    for user in users {
        match user {
            crate::value::UseSite::Value(v) => {
                if let ValueKind::Inst(inst) = &mut module.value_mut(v).kind {
                    inst.kind.replace_operand(old, new);
                }
                module.add_use(new, crate::value::UseSite::Value(v));
            }
            crate::value::UseSite::Block(b) => {
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
                module.add_use(new, crate::value::UseSite::Block(b));
            }
        }
    }
    let operands = match &module.value(old).kind {
        ValueKind::Inst(inst) => inst.kind.operands(),
        _ => Vec::new(),
    };
    for op in operands {
        module.remove_use(op, crate::value::UseSite::Value(old));
    }
    module.value_mut(old).valid = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::FuncKind;
    use crate::ids::BlockId;
    use crate::instruction::{BinaryOp, ResultRole};

    #[test]
    fn commutative_binary_deduplicates_with_swapped_operands() {
        let mut m = Module::new();
        let f = m.new_function("F*0_0$main", FuncKind::Int, BlockId(0));
        let b0 = m.new_block(f, 1, true);
        m.function_mut(f).blocks = vec![b0];
        let a = m.intern_number(1);
        let b = m.intern_number(2);
        let first = m.create_instruction(InstKind::Binary { op: BinaryOp::Add, lhs: a, rhs: b }, b0, ResultRole::RValue);
        m.push_instruction_to_block(b0, first);
        let second = m.create_instruction(InstKind::Binary { op: BinaryOp::Add, lhs: b, rhs: a }, b0, ResultRole::RValue);
        m.push_instruction_to_block(b0, second);
        let ret = m.create_instruction(InstKind::Return { value: Some(second) }, b0, ResultRole::NoResult);
        m.push_instruction_to_block(b0, ret);

        assert!(run(&mut m, f));
        assert!(!m.is_valid(second));
        if let ValueKind::Inst(inst) = &m.value(ret).kind {
            if let InstKind::Return { value: Some(v) } = inst.kind {
                assert_eq!(v, first);
                return;
            }
        }
        panic!("return should now reference the first occurrence");
    }
}
