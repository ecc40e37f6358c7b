//! Local-array optimizations (spec §4.3.4-§4.3.6): promote a local array
//! that is only ever initialized with constant stores and never escapes to
//! a module-level constant, and delete a local array that is never read.

use crate::abandon::abandon;
use crate::ids::{FunctionId, ValueId};
use crate::instruction::InstKind;
use crate::module::Module;
use crate::value::{ConstantData, UseSite, ValueKind};
use std::collections::HashMap;

/// Stores are an always-kept kind for ordinary DCE (spec §4.3.3), but once
/// we've decided the array they target is being deleted or promoted
/// outright, the store itself is dead weight — remove it directly rather
/// than through `abandon`, which would refuse it.
fn force_delete_store(module: &mut Module, store: ValueId) {
    let (block, operands) = match &module.value(store).kind {
        ValueKind::Inst(inst) => (inst.block, inst.kind.operands()),
        _ => return,
    };
    for op in operands {
        module.remove_use(op, UseSite::Value(store));
        if module.is_valid(op) && module.value(op).users.is_empty() {
            abandon(module, op);
        }
    }
    module.value_mut(store).valid = false;
    module.block_mut(block).instructions.retain(|&id| id != store);
}

/// An Alloc "escapes" if its address flows anywhere other than as the
/// `address` operand of a Load/Store on itself — e.g. as a call argument
/// or a return value — at which point neither promotion nor deletion is
/// safe without whole-program aliasing analysis (out of scope, spec §1).
fn escapes(module: &Module, alloc: ValueId) -> bool {
    module.value(alloc).users.iter().any(|use_site| match use_site {
        crate::value::UseSite::Value(user) => match &module.value(*user).kind {
            ValueKind::Inst(inst) => !matches!(
                &inst.kind,
                InstKind::Load { address, .. } | InstKind::Store { address, .. } if *address == alloc
            ),
            _ => true,
        },
        crate::value::UseSite::Block(_) => true,
    })
}

pub fn run(module: &mut Module, fid: FunctionId) -> bool {
    let mut changed = false;
    let blocks = module.function(fid).blocks.clone();
    let allocs: Vec<ValueId> = blocks
        .iter()
        .flat_map(|&b| module.block(b).instructions.clone())
        .filter(|&id| matches!(&module.value(id).kind, ValueKind::Inst(i) if matches!(i.kind, InstKind::Alloc { .. })))
        .collect();

    for alloc in allocs {
        if !module.is_valid(alloc) || escapes(module, alloc) {
            continue;
        }
        let (loads, stores) = uses_of(module, alloc);

        if loads.is_empty() {
            for store in stores {
                force_delete_store(module, store);
            }
            if module.value(alloc).users.is_empty() {
                abandon(module, alloc);
                changed = true;
            }
            continue;
        }

        if let Some(values) = constant_fold_stores(module, &stores) {
            promote_to_constant(module, alloc, values);
            changed = true;
        }
    }

    changed
}

fn uses_of(module: &Module, alloc: ValueId) -> (Vec<ValueId>, Vec<ValueId>) {
    let mut loads = Vec::new();
    let mut stores = Vec::new();
    for use_site in module.value(alloc).users.clone() {
        if let crate::value::UseSite::Value(user) = use_site {
            if let ValueKind::Inst(inst) = &module.value(user).kind {
                match inst.kind {
                    InstKind::Load { .. } => loads.push(user),
                    InstKind::Store { .. } => stores.push(user),
                    _ => {}
                }
            }
        }
    }
    (loads, stores)
}

/// Returns `Some(sparse map)` only if every store writes a constant value
/// at a constant offset — the shape needed to become `ConstantData`.
fn constant_fold_stores(module: &Module, stores: &[ValueId]) -> Option<HashMap<usize, i32>> {
    let mut values = HashMap::new();
    for &s in stores {
        let (value, offset) = match &module.value(s).kind {
            ValueKind::Inst(inst) => match inst.kind {
                InstKind::Store { value, offset, .. } => (value, offset),
                _ => return None,
            },
            _ => return None,
        };
        let idx = module.value(offset).kind.as_number()?;
        let val = module.value(value).kind.as_number()?;
        values.insert(idx as usize, val);
    }
    Some(values)
}

fn promote_to_constant(module: &mut Module, alloc: ValueId, values: HashMap<usize, i32>) {
    let (name, units) = match &module.value(alloc).kind {
        ValueKind::Inst(inst) => match &inst.kind {
            InstKind::Alloc { name, units, .. } => (name.clone(), *units),
            _ => return,
        },
        _ => return,
    };

    let stores: Vec<ValueId> = module
        .value(alloc)
        .users
        .iter()
        .filter_map(|u| match u {
            crate::value::UseSite::Value(v)
                if matches!(&module.value(*v).kind, ValueKind::Inst(i) if matches!(i.kind, InstKind::Store { .. })) =>
            {
                Some(*v)
            }
            _ => None,
        })
        .collect();
    for s in stores {
        force_delete_store(module, s);
    }

    let constant = module.new_constant(ConstantData { name, dimensions: vec![units], size: units, values });
    let loads: Vec<ValueId> = module
        .value(alloc)
        .users
        .iter()
        .filter_map(|u| match u {
            crate::value::UseSite::Value(v) => Some(*v),
            _ => None,
        })
        .collect();
    for load in loads {
        if let ValueKind::Inst(inst) = &mut module.value_mut(load).kind {
            inst.kind.replace_operand(alloc, constant);
        }
        module.remove_use(alloc, crate::value::UseSite::Value(load));
        module.add_use(constant, crate::value::UseSite::Value(load));
    }
    module.value_mut(alloc).valid = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::FuncKind;
    use crate::ids::BlockId;
    use crate::instruction::ResultRole;

    #[test]
    fn array_with_only_constant_stores_promotes() {
        let mut m = Module::new();
        let f = m.new_function("F*0_0$main", FuncKind::Int, BlockId(0));
        let b0 = m.new_block(f, 1, true);
        m.function_mut(f).blocks = vec![b0];

        let alloc = m.create_instruction(
            InstKind::Alloc { name: "a".into(), bytes: 12, units: 3 },
            b0,
            ResultRole::LValue("a".into()),
        );
        m.push_instruction_to_block(b0, alloc);
        for i in 0..3 {
            let idx = m.intern_number(i);
            let val = m.intern_number(i * 10);
            let store = m.create_instruction(InstKind::Store { value: val, address: alloc, offset: idx }, b0, ResultRole::NoResult);
            m.push_instruction_to_block(b0, store);
        }
        let zero = m.intern_number(0);
        let load = m.create_instruction(InstKind::Load { address: alloc, offset: zero }, b0, ResultRole::RValue);
        m.push_instruction_to_block(b0, load);
        let ret = m.create_instruction(InstKind::Return { value: Some(load) }, b0, ResultRole::NoResult);
        m.push_instruction_to_block(b0, ret);

        assert!(run(&mut m, f));
        assert!(!m.is_valid(alloc));
        if let ValueKind::Inst(inst) = &m.value(load).kind {
            if let InstKind::Load { address, .. } = inst.kind {
                assert!(m.value(address).kind.as_constant().is_some());
                return;
            }
        }
        panic!("load should now address the promoted constant");
    }

    #[test]
    fn array_never_loaded_is_deleted() {
        let mut m = Module::new();
        let f = m.new_function("F*0_0$main", FuncKind::Int, BlockId(0));
        let b0 = m.new_block(f, 1, true);
        m.function_mut(f).blocks = vec![b0];

        let alloc = m.create_instruction(
            InstKind::Alloc { name: "a".into(), bytes: 4, units: 1 },
            b0,
            ResultRole::LValue("a".into()),
        );
        m.push_instruction_to_block(b0, alloc);
        let zero = m.intern_number(0);
        let store = m.create_instruction(InstKind::Store { value: zero, address: alloc, offset: zero }, b0, ResultRole::NoResult);
        m.push_instruction_to_block(b0, store);
        let ret = m.create_instruction(InstKind::Return { value: None }, b0, ResultRole::NoResult);
        m.push_instruction_to_block(b0, ret);

        assert!(run(&mut m, f));
        assert!(!m.is_valid(alloc));
        assert!(!m.is_valid(store));
    }
}
