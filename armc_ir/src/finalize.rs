//! φ elimination and frame layout (spec §4.4.5), split into the two phases
//! `end_optimize.cpp` runs separately: [`eliminate_phis`] synthesizes one
//! PhiMove per live Phi, places it in every predecessor immediately before
//! the terminator (or before a flag-setting `Cmp`), and repositions Phis to
//! the top of their block — run for every function before liveness and
//! register allocation touch any of them. [`finalize_function`] computes
//! each function's required stack size once `variable_regs` is populated,
//! and so runs after register allocation.

use crate::ids::{BlockId, FunctionId, ValueId};
use crate::instruction::{InstKind, ResultRole};
use crate::module::Module;
use crate::value::{UseSite, ValueKind};
use indexmap::IndexMap;

/// Baseline stack words every frame reserves regardless of content (spec
/// §4.4.5): saved link register, frame pointer, and two words of padding
/// for 8-byte alignment under the AAPCS.
const BASELINE_STACK_WORDS: u32 = 4;
const WORD_BYTES: u32 = 4;

pub fn eliminate_phis(module: &mut Module, fid: FunctionId) {
    synthesize_phi_moves(module, fid);
    reposition_phis_to_top(module, fid);
}

/// Runs after register allocation (spec §4.4.5); `compute_stack_size`
/// reads `variable_regs`, which only regalloc populates.
pub fn finalize_function(module: &mut Module, fid: FunctionId) {
    compute_stack_size(module, fid);
}

/// For each live Phi, create one PhiMove (spec invariant I2) and push its
/// id into every predecessor's instruction list at the correct position.
/// `block_alive` starts empty here — it's populated per predecessor by
/// `liveness::propagate_liveness`, which runs after this (spec §4.4.3); at
/// synthesis time liveness hasn't computed anything yet to snapshot.
fn synthesize_phi_moves(module: &mut Module, fid: FunctionId) {
    let blocks = module.function(fid).blocks.clone();
    for &bid in &blocks {
        let phis: Vec<ValueId> = module.block(bid).phis.iter().copied().collect();
        for phi in phis {
            if !module.is_valid(phi) {
                continue;
            }
            let operands = match &module.value(phi).kind {
                ValueKind::Inst(inst) => match &inst.kind {
                    InstKind::Phi { operands, .. } => operands.clone(),
                    _ => continue,
                },
                _ => continue,
            };

            let phi_move = module.create_instruction(
                InstKind::PhiMove { phi, block_alive: IndexMap::new() },
                bid,
                ResultRole::NoResult,
            );
            module.add_use(phi, UseSite::Value(phi_move));

            for (&pred, _) in &operands {
                insert_before_terminator(module, pred, phi_move);
            }
        }
    }
}

/// Inserts `inst` into `block` immediately before its terminator, or
/// before a `Cmp` that immediately precedes a `Branch` consuming it — so
/// the PhiMove never clobbers flags the Branch depends on (spec §4.4.5,
/// §8.4 scenario 4).
fn insert_before_terminator(module: &mut Module, block: BlockId, inst: ValueId) {
    let instructions = module.block(block).instructions.clone();
    let terminator_pos = instructions
        .iter()
        .position(|&id| is_terminator(module, id))
        .unwrap_or(instructions.len());

    let insert_pos = if terminator_pos > 0 {
        let candidate = instructions[terminator_pos - 1];
        if is_cmp_feeding_branch(module, candidate, instructions.get(terminator_pos).copied()) {
            terminator_pos - 1
        } else {
            terminator_pos
        }
    } else {
        terminator_pos
    };

    module.block_mut(block).instructions.insert(insert_pos, inst);
}

fn is_terminator(module: &Module, id: ValueId) -> bool {
    matches!(&module.value(id).kind, ValueKind::Inst(inst) if inst.kind.is_terminator())
}

fn is_cmp_feeding_branch(module: &Module, candidate: ValueId, terminator: Option<ValueId>) -> bool {
    let is_cmp = matches!(&module.value(candidate).kind, ValueKind::Inst(inst) if matches!(inst.kind, InstKind::Cmp { .. }));
    if !is_cmp {
        return false;
    }
    match terminator {
        Some(t) => matches!(
            &module.value(t).kind,
            ValueKind::Inst(inst) if matches!(&inst.kind, InstKind::Branch { cond, .. } if *cond == candidate)
        ),
        None => false,
    }
}

fn reposition_phis_to_top(module: &mut Module, fid: FunctionId) {
    let blocks = module.function(fid).blocks.clone();
    for &bid in &blocks {
        let phis = module.block(bid).phis.clone();
        if phis.is_empty() {
            continue;
        }
        let mut reordered: Vec<ValueId> = phis.iter().copied().filter(|v| module.is_valid(*v)).collect();
        let rest: Vec<ValueId> = module
            .block(bid)
            .instructions
            .iter()
            .copied()
            .filter(|id| !phis.contains(id))
            .collect();
        reordered.extend(rest);
        module.block_mut(bid).instructions = reordered;
    }
}

/// Stack size = baseline + one word per unassigned PhiMove + one word per
/// unassigned lvalue instruction + every Alloc's byte count (spec §4.4.5).
fn compute_stack_size(module: &mut Module, fid: FunctionId) {
    let mut words = BASELINE_STACK_WORDS;
    let mut alloc_bytes = 0u32;

    let blocks = module.function(fid).blocks.clone();
    let regs = module.function(fid).variable_regs.clone();
    for &bid in &blocks {
        for &iid in &module.block(bid).instructions {
            let Some(inst) = (match &module.value(iid).kind {
                ValueKind::Inst(i) => Some(i),
                _ => None,
            }) else {
                continue;
            };
            let has_reg = regs.contains_key(&iid);
            match &inst.kind {
                InstKind::PhiMove { .. } if !has_reg => words += 1,
                InstKind::Alloc { bytes, .. } => alloc_bytes += *bytes as u32,
                _ if inst.role.is_lvalue() && !has_reg => words += 1,
                _ => {}
            }
        }
    }

    module.function_mut(fid).required_stack_size = words * WORD_BYTES + alloc_bytes;
}
