//! Read-only global → constant promotion (spec §4.3.1): a global that no
//! function ever `Store`s into behaves exactly like a constant, so folding
//! (§4.3.2) can see through loads from it once it's retagged.

use crate::module::Module;
use crate::value::{Cell, ConstantData, ValueKind};
use indexmap::IndexSet;

pub fn run(module: &mut Module) -> bool {
    let mut written: IndexSet<crate::ids::ValueId> = IndexSet::new();
    for func in module.functions() {
        for &bid in &func.blocks {
            for &iid in &module.block(bid).instructions {
                if let ValueKind::Inst(inst) = &module.value(iid).kind {
                    if let crate::instruction::InstKind::Store { address, .. } = inst.kind {
                        written.insert(address);
                    }
                }
            }
        }
    }

    let candidates: Vec<crate::ids::ValueId> =
        module.globals.iter().copied().filter(|g| !written.contains(g)).collect();

    let mut changed = false;
    for id in candidates {
        let data = match &module.value(id).kind {
            ValueKind::Global(g) if g.cell == Cell::Int || !g.dimensions.is_empty() => g.clone(),
            _ => continue,
        };
        module.value_mut(id).kind = ValueKind::Constant(ConstantData {
            name: data.name,
            dimensions: data.dimensions,
            size: data.size,
            values: data.init_values,
        });
        module.remove_global(id);
        module.constants.push(id);
        changed = true;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::FuncKind;
    use crate::ids::BlockId;
    use crate::value::GlobalData;
    use std::collections::HashMap;

    #[test]
    fn global_never_stored_to_is_promoted() {
        let mut m = Module::new();
        let _f = m.new_function("F*0_0$main", FuncKind::Int, BlockId(0));
        let g = m.new_global(GlobalData {
            name: "g".into(),
            dimensions: vec![],
            size: 1,
            init_values: HashMap::from([(0, 5)]),
            cell: Cell::Int,
        });

        assert!(run(&mut m));
        assert!(m.value(g).kind.as_constant().is_some());
        assert!(!m.globals.contains(&g));
        assert!(m.constants.contains(&g));
    }

    #[test]
    fn global_written_by_store_is_left_alone() {
        let mut m = Module::new();
        let f = m.new_function("F*0_0$main", FuncKind::Int, BlockId(0));
        let b0 = m.new_block(f, 1, true);
        m.function_mut(f).blocks = vec![b0];
        let g = m.new_global(GlobalData {
            name: "g".into(),
            dimensions: vec![],
            size: 1,
            init_values: HashMap::new(),
            cell: Cell::Int,
        });
        let zero = m.intern_number(0);
        let store = m.create_instruction(
            crate::instruction::InstKind::Store { value: zero, address: g, offset: zero },
            b0,
            crate::instruction::ResultRole::NoResult,
        );
        m.push_instruction_to_block(b0, store);

        assert!(!run(&mut m));
        assert!(m.value(g).kind.as_global().is_some());
    }
}
