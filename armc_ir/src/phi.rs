//! φ-triviality collapse (spec §4.1.1 `removeTrivialPhi`), shared between
//! the builder (where it runs inline during SSA construction) and the
//! optimizer's constant-folding pass (where a φ can become trivial again
//! after its operands fold to a shared constant, spec §4.3.2).

use crate::ids::{BlockId, ValueId};
use crate::instruction::InstKind;
use crate::module::Module;
use crate::value::{UseSite, ValueKind};

pub fn is_phi(module: &Module, id: ValueId) -> bool {
    matches!(&module.value(id).kind, ValueKind::Inst(i) if i.kind.is_phi())
}

pub fn owning_block(module: &Module, id: ValueId) -> Option<BlockId> {
    match &module.value(id).kind {
        ValueKind::Inst(i) => Some(i.block),
        _ => None,
    }
}

/// Collapses `phi` to its single distinct non-self operand (or a fresh
/// Undefined if it has none), rewriting every use and cascading into any
/// user that is itself a now-trivial φ. Returns `phi` unchanged if it has
/// more than one distinct operand.
pub fn remove_trivial_phi(module: &mut Module, phi: ValueId) -> ValueId {
    let operands: Vec<ValueId> = match &module.value(phi).kind {
        ValueKind::Inst(i) => match &i.kind {
            InstKind::Phi { operands, .. } => operands.values().copied().collect(),
            _ => return phi,
        },
        _ => return phi,
    };

    let mut same: Option<ValueId> = None;
    for op in &operands {
        if *op == phi {
            continue;
        }
        if same == Some(*op) {
            continue;
        }
        if same.is_some() {
            return phi;
        }
        same = Some(*op);
    }
    let same = same.unwrap_or_else(|| module.new_undefined());

    let users: Vec<UseSite> = module.value(phi).users.iter().copied().collect();
    let mut phi_users = Vec::new();

    for user in &users {
        match *user {
            UseSite::Value(v) if v == phi => continue,
            UseSite::Value(v) => {
                if is_phi(module, v) {
                    phi_users.push(v);
                }
                if let ValueKind::Inst(inst) = &mut module.value_mut(v).kind {
                    inst.kind.replace_operand(phi, same);
                }
                module.add_use(same, UseSite::Value(v));
            }
            UseSite::Block(b) => {
                let entries: Vec<String> = module
                    .block(b)
                    .local_var_ssa_map
                    .iter()
                    .filter(|(_, v)| **v == phi)
                    .map(|(k, _)| k.clone())
                    .collect();
                for name in entries {
                    module.block_mut(b).local_var_ssa_map.insert(name, same);
                }
                module.add_use(same, UseSite::Block(b));
            }
        }
    }

    for op in &operands {
        module.remove_use(*op, UseSite::Value(phi));
    }
    module.value_mut(phi).valid = false;
    if let Some(b) = owning_block(module, phi) {
        module.block_mut(b).phis.shift_remove(&phi);
    }

    for user in phi_users {
        remove_trivial_phi(module, user);
    }

    same
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::FuncKind;
    use crate::ids::FunctionId;
    use crate::instruction::ResultRole;
    use indexmap::IndexMap;

    #[test]
    fn phi_with_single_distinct_operand_collapses() {
        let mut m = Module::new();
        let _f: FunctionId = m.new_function("F*0_0$main", FuncKind::Int, BlockId(0));
        let b0 = m.new_block(_f, 1, true);
        let three = m.intern_number(3);
        let phi = m.create_instruction(
            InstKind::Phi { var_name: "x".into(), operands: IndexMap::from([(b0, three)]) },
            b0,
            ResultRole::LValue("x".into()),
        );
        let result = remove_trivial_phi(&mut m, phi);
        assert_eq!(result, three);
        assert!(!m.is_valid(phi));
    }
}
