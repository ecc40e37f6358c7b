//! Post-build normalization (spec §4.2): run once, immediately after the
//! builder finishes, before any optimization pass sees the IR.

use crate::instruction::InstKind;
use crate::module::Module;
use crate::value::{UseSite, ValueKind};

/// 1. A `Cmp` not immediately followed by a `Branch` in its own block is
///    retagged to `Binary` — it will be materialized as a 0/1 value rather
///    than consumed for its flags.
/// 2. Any φ use-set entry naming a block that is no longer one of the φ's
///    predecessors is dropped (defensive clean-up after on-the-fly linking).
pub fn normalize(module: &mut Module) {
    retag_dangling_cmps(module);
    prune_stale_phi_block_uses(module);
}

fn retag_dangling_cmps(module: &mut Module) {
    let function_ids: Vec<_> = module.function_order.clone();
    for fid in function_ids {
        let block_ids = module.function(fid).blocks.clone();
        for bid in block_ids {
            let instructions = module.block(bid).instructions.clone();
            for (pos, &inst_id) in instructions.iter().enumerate() {
                let is_cmp = matches!(
                    &module.value(inst_id).kind,
                    ValueKind::Inst(inst) if matches!(inst.kind, InstKind::Cmp { .. })
                );
                if !is_cmp {
                    continue;
                }
                let consumed_by_branch = instructions
                    .get(pos + 1)
                    .map(|&next| {
                        matches!(
                            &module.value(next).kind,
                            ValueKind::Inst(n) if matches!(&n.kind, InstKind::Branch { cond, .. } if *cond == inst_id)
                        )
                    })
                    .unwrap_or(false);
                if consumed_by_branch {
                    continue;
                }
                if let ValueKind::Inst(inst) = &mut module.value_mut(inst_id).kind {
                    if let InstKind::Cmp { op, lhs, rhs } = inst.kind {
                        inst.kind = InstKind::Binary { op: crate::instruction::BinaryOp::Relational(op), lhs, rhs };
                    }
                }
            }
        }
    }
}

/// A φ's use-set (spec §3.1) is `module.value(phi).users`, not its operand
/// map. `write_variable` (builder.rs) adds a `UseSite::Block` entry every
/// time a block's SSA map points at a phi; once that block's map is later
/// overwritten to point elsewhere, the entry is stale and must be dropped,
/// or `dce.rs`'s `users.is_empty()` dead-check can never fire for the phi.
fn prune_stale_phi_block_uses(module: &mut Module) {
    let function_ids: Vec<_> = module.function_order.clone();
    for fid in function_ids {
        let block_ids = module.function(fid).blocks.clone();
        for bid in block_ids {
            let phis: Vec<_> = module.block(bid).phis.iter().copied().collect();
            for phi in phis {
                let stale: Vec<_> = module
                    .value(phi)
                    .users
                    .iter()
                    .filter_map(|use_site| match use_site {
                        UseSite::Block(b) => Some(*b),
                        _ => None,
                    })
                    .filter(|b| !module.block(*b).local_var_ssa_map.values().any(|v| *v == phi))
                    .collect();
                for b in stale {
                    module.remove_use(phi, UseSite::Block(b));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::FuncKind;
    use crate::ids::BlockId;
    use crate::instruction::{CmpOp, ResultRole};

    #[test]
    fn cmp_not_followed_by_branch_becomes_binary() {
        let mut m = Module::new();
        let f = m.new_function("F*0_0$main", FuncKind::Int, BlockId(0));
        let b0 = m.new_block(f, 1, true);
        m.function_mut(f).blocks = vec![b0];
        let one = m.intern_number(1);
        let zero = m.intern_number(0);
        let cmp = m.create_instruction(InstKind::Cmp { op: CmpOp::Lt, lhs: zero, rhs: one }, b0, ResultRole::RValue);
        m.push_instruction_to_block(b0, cmp);
        let ret = m.create_instruction(InstKind::Return { value: Some(cmp) }, b0, ResultRole::NoResult);
        m.push_instruction_to_block(b0, ret);

        normalize(&mut m);

        assert!(matches!(&m.value(cmp).kind, ValueKind::Inst(i) if matches!(i.kind, InstKind::Binary { .. })));
    }

    #[test]
    fn cmp_immediately_before_branch_is_untouched() {
        let mut m = Module::new();
        let f = m.new_function("F*0_0$main", FuncKind::Int, BlockId(0));
        let b0 = m.new_block(f, 1, true);
        let b1 = m.new_block(f, 1, true);
        let b2 = m.new_block(f, 1, true);
        m.function_mut(f).blocks = vec![b0, b1, b2];
        let one = m.intern_number(1);
        let zero = m.intern_number(0);
        let cmp = m.create_instruction(InstKind::Cmp { op: CmpOp::Lt, lhs: zero, rhs: one }, b0, ResultRole::RValue);
        m.push_instruction_to_block(b0, cmp);
        let branch = m.create_instruction(
            InstKind::Branch { cond: cmp, if_true: b1, if_false: b2 },
            b0,
            ResultRole::NoResult,
        );
        m.push_instruction_to_block(b0, branch);

        normalize(&mut m);

        assert!(matches!(&m.value(cmp).kind, ValueKind::Inst(i) if matches!(i.kind, InstKind::Cmp { .. })));
    }

    #[test]
    fn overwritten_block_ssa_entry_drops_its_stale_phi_user() {
        let mut m = Module::new();
        let f = m.new_function("F*0_0$main", FuncKind::Int, BlockId(0));
        let b0 = m.new_block(f, 1, true);
        m.function_mut(f).blocks = vec![b0];

        let zero = m.intern_number(0);
        let phi = m.create_instruction(
            InstKind::Phi { var_name: "x".into(), operands: indexmap::IndexMap::from([(b0, zero)]) },
            b0,
            ResultRole::LValue("x".into()),
        );
        m.block_mut(b0).phis.insert(phi);
        m.push_instruction_to_block(b0, phi);
        m.block_mut(b0).local_var_ssa_map.insert("x".to_string(), phi);
        m.add_use(phi, UseSite::Block(b0));

        // `x` is reassigned; the block's SSA map no longer points at `phi`,
        // but nothing has told `phi` its block-use is gone.
        let one = m.intern_number(1);
        m.block_mut(b0).local_var_ssa_map.insert("x".to_string(), one);

        normalize(&mut m);

        assert!(
            !m.value(phi).users.contains(&UseSite::Block(b0)),
            "stale UseSite::Block entry should have been dropped from phi.users"
        );
    }
}
