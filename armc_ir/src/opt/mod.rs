//! Optimization passes (spec §4.3) and the fixed-point driver that runs
//! them (§4.3.11): two rounds of the whole suite, dead-code elimination
//! after every pass, then a final rvalue→lvalue promotion pass for any
//! value now used across block boundaries, and a dead-store/dead-Alloc
//! sweep that marks unused `Invoke`/`Alloc` results as no-result.

pub mod block_combine;
pub mod branch_fold;
pub mod const_fold;
pub mod dce;
pub mod lcse;
pub mod licm;
pub mod local_array;
pub mod read_only_global;

use crate::ids::{FunctionId, ValueId};
use crate::instruction::{InstKind, ResultRole};
use crate::module::Module;
use crate::value::{UseSite, ValueKind};

/// Runs the full optimization suite to a fixed point (bounded at two
/// rounds, spec §4.3.11), then the cross-cutting cleanup passes.
pub fn optimize_module(module: &mut Module) {
    read_only_global::run(module);

    let fids = module.function_order.clone();
    for _round in 0..2 {
        for &fid in &fids {
            run_function_passes(module, fid);
        }
    }

    dce::recompute_call_graph(module);
    dce::remove_dead_functions(module);

    let fids = module.function_order.clone();
    for &fid in &fids {
        promote_cross_block_rvalues(module, fid);
        demote_unused_results(module, fid);
    }
}

fn run_function_passes(module: &mut Module, fid: FunctionId) {
    let mut changed = true;
    while changed {
        changed = false;
        changed |= const_fold::run(module, fid);
        changed |= dce::run_function(module, fid);
        changed |= local_array::run(module, fid);
        changed |= dce::run_function(module, fid);
        changed |= lcse::run(module, fid);
        changed |= dce::run_function(module, fid);
        changed |= licm::run(module, fid);
        changed |= branch_fold::run(module, fid);
        changed |= dce::remove_dead_blocks(module, fid);
        changed |= block_combine::run(module, fid);
        changed |= dce::run_function(module, fid);
    }
}

/// An `RValue` result used only within its own block never needed a
/// persistent name; but block merging/LICM can move its definition or
/// introduce a cross-block user. Anything still tagged `RValue` whose
/// users now span more than one block is promoted to `LValue` so the
/// register allocator treats it as a real variable (spec §4.3.11).
fn promote_cross_block_rvalues(module: &mut Module, fid: FunctionId) {
    let blocks = module.function(fid).blocks.clone();
    for bid in blocks {
        for iid in module.block(bid).instructions.clone() {
            if !module.is_valid(iid) {
                continue;
            }
            let needs_promotion = match &module.value(iid).kind {
                ValueKind::Inst(inst) if matches!(inst.role, ResultRole::RValue) => {
                    used_outside_block(module, iid, inst.block)
                }
                _ => false,
            };
            if needs_promotion {
                let name = module.generate_temp_lvalue_name();
                if let ValueKind::Inst(inst) = &mut module.value_mut(iid).kind {
                    inst.role = ResultRole::LValue(name);
                }
            }
        }
    }
}

fn used_outside_block(module: &Module, id: ValueId, owner: crate::ids::BlockId) -> bool {
    module.value(id).users.iter().any(|u| match u {
        UseSite::Value(v) => match &module.value(*v).kind {
            ValueKind::Inst(inst) => inst.block != owner,
            _ => false,
        },
        UseSite::Block(b) => *b != owner,
    })
}

/// An `Invoke`/`Alloc` kept alive only by `is_always_kept_kind` but whose
/// result is never read can drop its lvalue name — it still executes (for
/// its side effects/stack reservation) but no longer occupies a register
/// or stack slot (spec §4.3.11).
fn demote_unused_results(module: &mut Module, fid: FunctionId) {
    let blocks = module.function(fid).blocks.clone();
    for bid in blocks {
        for iid in module.block(bid).instructions.clone() {
            if !module.is_valid(iid) {
                continue;
            }
            let is_unused_result = match &module.value(iid).kind {
                ValueKind::Inst(inst) => {
                    inst.role.is_lvalue()
                        && module.value(iid).users.is_empty()
                        && matches!(inst.kind, InstKind::Invoke { .. })
                }
                _ => false,
            };
            if is_unused_result {
                if let ValueKind::Inst(inst) = &mut module.value_mut(iid).kind {
                    inst.role = ResultRole::NoResult;
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
    use crate::instruction::{BinaryOp, ResultRole as Role};

    #[test]
    fn full_pipeline_folds_constant_arithmetic_to_a_literal_return() {
        let mut m = Module::new();
        let f = m.new_function("F*0_0$main", FuncKind::Int, BlockId(0));
        let b0 = m.new_block(f, 1, true);
        m.function_mut(f).blocks = vec![b0];
        let a = m.intern_number(2);
        let b = m.intern_number(3);
        let add = m.create_instruction(InstKind::Binary { op: BinaryOp::Add, lhs: a, rhs: b }, b0, Role::RValue);
        m.push_instruction_to_block(b0, add);
        let one = m.intern_number(1);
        let mul = m.create_instruction(InstKind::Binary { op: BinaryOp::Mul, lhs: add, rhs: one }, b0, Role::RValue);
        m.push_instruction_to_block(b0, mul);
        let ret = m.create_instruction(InstKind::Return { value: Some(mul) }, b0, Role::NoResult);
        m.push_instruction_to_block(b0, ret);

        optimize_module(&mut m);

        if let ValueKind::Inst(inst) = &m.value(ret).kind {
            if let InstKind::Return { value: Some(v) } = inst.kind {
                assert_eq!(m.value(v).kind.as_number(), Some(5));
                return;
            }
        }
        panic!("expected the whole computation to fold to the literal 5");
    }
}
