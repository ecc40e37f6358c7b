//! Variable weight (spec §4.4.1) and liveness propagation (spec §4.4.2).
//!
//! Liveness here is the dataflow formulation the design notes recommend
//! (§9) in place of the source's naive path enumeration: a classical
//! backward live-variable analysis reaches a fixed point over `aliveValues`
//! sets and produces the same per-block/per-instruction alive sets the
//! conflict graph (§4.4.3) needs, without the combinatorial blow-up of
//! enumerating every simple path explicitly.

use crate::function::Function;
use crate::ids::{BlockId, FunctionId, ValueId};
use crate::instruction::{InstKind, ResultRole};
use crate::module::Module;
use crate::value::ValueKind;
use indexmap::{IndexMap, IndexSet};

/// Loop-weight base: each additional level of loop nesting multiplies a
/// value's weight contribution by this factor (spec §4.4.1).
pub const LOOP_WEIGHT_BASE: u32 = 4;
/// Saturating ceiling so pathologically deep nesting can't overflow.
pub const MAX_WEIGHT: u32 = 1_000_000;

fn weight_at_depth(depth: u32) -> u32 {
    let depth = depth.min(crate::block::MAX_LOOP_DEPTH);
    LOOP_WEIGHT_BASE.saturating_pow(depth).min(MAX_WEIGHT)
}

/// Populates `function.variable_weight` for every parameter, lvalue
/// instruction, Phi, and PhiMove reachable in the function.
pub fn compute_variable_weights(module: &mut Module, fid: FunctionId) {
    let mut weights: IndexMap<ValueId, u32> = IndexMap::new();
    for &pid in &module.function(fid).params {
        *weights.entry(pid).or_insert(0) = weight_at_depth(1);
    }

    let blocks = module.function(fid).blocks.clone();
    for bid in &blocks {
        let depth = module.block(*bid).loop_depth;
        for &iid in &module.block(*bid).instructions.clone() {
            let w = weight_at_depth(depth);
            if let ValueKind::Inst(inst) = &module.value(iid).kind {
                if inst.role.is_lvalue() || matches!(inst.kind, InstKind::Phi { .. } | InstKind::PhiMove { .. }) {
                    *weights.entry(iid).or_insert(0) =
                        weights.get(&iid).copied().unwrap_or(0).saturating_add(w).min(MAX_WEIGHT);
                }
                if let InstKind::Phi { operands, .. } = &inst.kind {
                    for (&pred, _) in operands {
                        let pred_depth = module.block(pred).loop_depth;
                        let pw = weight_at_depth(pred_depth);
                        let entry = weights.entry(iid).or_insert(0);
                        *entry = entry.saturating_add(pw).min(MAX_WEIGHT);
                    }
                }
            }
        }
    }

    module.function_mut(fid).variable_weight = weights;
}

/// Clears and recomputes `alive_values` on every block and `alive` on every
/// instruction of the function via backward fixed-point dataflow:
/// `in(b) = uses(b) ∪ (out(b) - defs(b))`, `out(b) = ∪ in(succ)`.
/// Per-instruction alive sets are then reconstructed by a single forward
/// sweep over each block seeded with `in(b)`.
pub fn propagate_liveness(module: &mut Module, fid: FunctionId) {
    let blocks = module.function(fid).blocks.clone();
    for &bid in &blocks {
        module.block_mut(bid).alive_values.clear();
    }

    let mut uses: IndexMap<BlockId, IndexSet<ValueId>> = IndexMap::new();
    let mut defs: IndexMap<BlockId, IndexSet<ValueId>> = IndexMap::new();
    for &bid in &blocks {
        let (u, d) = block_uses_and_defs(module, bid);
        uses.insert(bid, u);
        defs.insert(bid, d);
    }

    let mut live_in: IndexMap<BlockId, IndexSet<ValueId>> =
        blocks.iter().map(|&b| (b, IndexSet::new())).collect();
    let mut live_out: IndexMap<BlockId, IndexSet<ValueId>> =
        blocks.iter().map(|&b| (b, IndexSet::new())).collect();

    let mut changed = true;
    while changed {
        changed = false;
        for &bid in blocks.iter().rev() {
            let mut out_b: IndexSet<ValueId> = IndexSet::new();
            for succ in module.block(bid).successors.iter() {
                out_b.extend(live_in[succ].iter().copied());
            }
            let mut in_b = uses[&bid].clone();
            for v in out_b.iter() {
                if !defs[&bid].contains(v) {
                    in_b.insert(*v);
                }
            }
            if in_b != live_in[&bid] {
                live_in.insert(bid, in_b);
                changed = true;
            }
            if out_b != live_out[&bid] {
                live_out.insert(bid, out_b);
                changed = true;
            }
        }
    }

    for &bid in &blocks {
        module.block_mut(bid).alive_values = live_in[&bid].clone();
    }

    for &bid in &blocks {
        let mut alive = live_out[&bid].clone();
        let instructions = module.block(bid).instructions.clone();
        for &iid in instructions.iter().rev() {
            if let ValueKind::Inst(inst) = &module.value(iid).kind {
                if inst.kind.is_phi() {
                    continue; // phis are defined "before" the block, not mid-stream
                }
            }
            alive.insert(iid);
            for operand in instruction_operands(module, iid, bid) {
                alive.insert(operand);
            }
            // A PhiMove is one shared instruction physically present in
            // every predecessor of its phi, so a single `alive` field can't
            // hold more than one predecessor's set; `block_alive` keeps the
            // per-predecessor snapshot the conflict graph needs (spec
            // §4.4.3) instead of clobbering it on every visit.
            let is_phi_move =
                matches!(&module.value(iid).kind, ValueKind::Inst(inst) if inst.kind.is_phi_move());
            if is_phi_move {
                if let ValueKind::Inst(inst) = &mut module.value_mut(iid).kind {
                    if let InstKind::PhiMove { block_alive, .. } = &mut inst.kind {
                        block_alive.insert(bid, alive.clone());
                    }
                }
            } else if let ValueKind::Inst(inst) = &mut module.value_mut(iid).kind {
                inst.alive = alive.clone();
            }
            let is_lvalue =
                matches!(&module.value(iid).kind, ValueKind::Inst(inst) if inst.role.is_lvalue());
            if is_lvalue {
                alive.shift_remove(&iid);
            }
        }
    }
}

/// A PhiMove's real operand depends on which predecessor it physically
/// sits in; resolve it from the phi's own operand map keyed by `bid`
/// rather than `InstKind::operands()` (which only names the phi itself).
fn phi_move_operand(module: &Module, phi: ValueId, bid: BlockId) -> Option<ValueId> {
    match &module.value(phi).kind {
        ValueKind::Inst(inst) => match &inst.kind {
            InstKind::Phi { operands, .. } => operands.get(&bid).copied(),
            _ => None,
        },
        _ => None,
    }
}

fn instruction_operands(module: &Module, iid: ValueId, bid: BlockId) -> Vec<ValueId> {
    match &module.value(iid).kind {
        ValueKind::Inst(inst) => match &inst.kind {
            InstKind::PhiMove { phi, .. } => phi_move_operand(module, *phi, bid).into_iter().collect(),
            _ => inst.kind.operands(),
        },
        _ => Vec::new(),
    }
}

/// A value is "used" in a block if some instruction in the block
/// references it before (or without) redefining it locally; "defined" if
/// some instruction in the block produces it as an lvalue. A `Phi`'s
/// operands are used, not at the phi itself, but at the PhiMove physically
/// sitting in the corresponding predecessor (spec §4.4.2) — resolved via
/// `phi_move_operand` since the PhiMove's own operand list only names the
/// phi, not the per-predecessor value being moved.
fn block_uses_and_defs(module: &Module, bid: BlockId) -> (IndexSet<ValueId>, IndexSet<ValueId>) {
    let mut used = IndexSet::new();
    let mut defined = IndexSet::new();
    for &iid in &module.block(bid).instructions {
        let inst = match &module.value(iid).kind {
            ValueKind::Inst(inst) => inst,
            _ => continue,
        };
        if inst.kind.is_phi() {
            if inst.role.is_lvalue() && !used.contains(&iid) {
                defined.insert(iid);
            }
            continue;
        }
        if let InstKind::PhiMove { phi, .. } = &inst.kind {
            if let Some(operand) = phi_move_operand(module, *phi, bid) {
                if !defined.contains(&operand) {
                    used.insert(operand);
                }
            }
            continue;
        }
        for operand in inst.kind.operands() {
            if !defined.contains(&operand) {
                used.insert(operand);
            }
        }
        if inst.role.is_lvalue() {
            defined.insert(iid);
        }
    }
    (used, defined)
}

pub fn is_always_live_at_timeout(_function: &Function) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::FuncKind;
    use crate::ids::BlockId as Bid;
    use crate::instruction::{BinaryOp, ResultRole};

    #[test]
    fn weight_grows_with_loop_depth() {
        let mut m = Module::new();
        let f = m.new_function("F*0_0$main", FuncKind::Int, Bid(0));
        let b0 = m.new_block(f, 1, true);
        let b1 = m.new_block(f, 3, true);
        m.function_mut(f).blocks = vec![b0, b1];
        let one = m.intern_number(1);
        let shallow = m.create_instruction(
            InstKind::Unary { op: crate::instruction::UnaryOp::Plus, value: one },
            b0,
            ResultRole::LValue("s".into()),
        );
        m.push_instruction_to_block(b0, shallow);
        let deep = m.create_instruction(
            InstKind::Binary { op: BinaryOp::Add, lhs: one, rhs: one },
            b1,
            ResultRole::LValue("d".into()),
        );
        m.push_instruction_to_block(b1, deep);

        compute_variable_weights(&mut m, f);
        let weights = &m.function(f).variable_weight;
        assert!(weights[&deep] > weights[&shallow]);
    }

    #[test]
    fn cross_block_value_stays_alive_through_intermediate_block() {
        let mut m = Module::new();
        let f = m.new_function("F*0_0$main", FuncKind::Int, Bid(0));
        let b0 = m.new_block(f, 1, true);
        let b1 = m.new_block(f, 1, true);
        let b2 = m.new_block(f, 1, true);
        m.function_mut(f).blocks = vec![b0, b1, b2];
        m.add_edge(b0, b1);
        m.add_edge(b1, b2);

        let one = m.intern_number(1);
        let def = m.create_instruction(
            InstKind::Unary { op: crate::instruction::UnaryOp::Plus, value: one },
            b0,
            ResultRole::LValue("v".into()),
        );
        m.push_instruction_to_block(b0, def);
        let jump0 = m.create_instruction(InstKind::Jump { target: b1 }, b0, ResultRole::NoResult);
        m.push_instruction_to_block(b0, jump0);
        let jump1 = m.create_instruction(InstKind::Jump { target: b2 }, b1, ResultRole::NoResult);
        m.push_instruction_to_block(b1, jump1);
        let ret = m.create_instruction(InstKind::Return { value: Some(def) }, b2, ResultRole::NoResult);
        m.push_instruction_to_block(b2, ret);

        propagate_liveness(&mut m, f);
        assert!(m.block(b1).alive_values.contains(&def));
        assert!(m.block(b2).alive_values.contains(&def));
        assert!(!m.block(b0).alive_values.contains(&def));
    }

    /// A value that only feeds a loop header's phi via the back edge must
    /// stay alive through the tail of the body block that supplies it, or
    /// the register allocator could hand its register to something else
    /// before the (conceptual) move into the phi happens.
    #[test]
    fn back_edge_phi_operand_stays_alive_to_the_tail_of_its_predecessor() {
        use crate::value::UseSite;
        use indexmap::IndexMap as Map;

        let mut m = Module::new();
        let f = m.new_function("F*0_0$loop", FuncKind::Int, Bid(0));
        let entry = m.new_block(f, 1, true);
        let header = m.new_block(f, 2, true);
        let body = m.new_block(f, 2, true);
        m.function_mut(f).blocks = vec![entry, header, body];
        m.add_edge(entry, header);
        m.add_edge(header, body);
        m.add_edge(body, header);

        let zero = m.intern_number(0);
        let jump_entry = m.create_instruction(InstKind::Jump { target: header }, entry, ResultRole::NoResult);
        m.push_instruction_to_block(entry, jump_entry);

        let phi = m.create_instruction(
            InstKind::Phi { var_name: "i".into(), operands: Map::from([(entry, zero)]) },
            header,
            ResultRole::LValue("i".into()),
        );
        m.block_mut(header).phis.insert(phi);
        m.push_instruction_to_block(header, phi);
        m.add_use(zero, UseSite::Value(phi));
        let jump_header = m.create_instruction(InstKind::Jump { target: body }, header, ResultRole::NoResult);
        m.push_instruction_to_block(header, jump_header);

        let one = m.intern_number(1);
        let i_next = m.create_instruction(
            InstKind::Binary { op: BinaryOp::Add, lhs: phi, rhs: one },
            body,
            ResultRole::LValue("i.next".into()),
        );
        m.push_instruction_to_block(body, i_next);
        if let ValueKind::Inst(inst) = &mut m.value_mut(phi).kind {
            if let InstKind::Phi { operands, .. } = &mut inst.kind {
                operands.insert(body, i_next);
            }
        }
        m.add_use(i_next, UseSite::Value(phi));
        let jump_body = m.create_instruction(InstKind::Jump { target: header }, body, ResultRole::NoResult);
        m.push_instruction_to_block(body, jump_body);

        crate::finalize::eliminate_phis(&mut m, f);
        compute_variable_weights(&mut m, f);
        propagate_liveness(&mut m, f);

        let phi_move = m
            .block(body)
            .instructions
            .iter()
            .copied()
            .find(|&id| matches!(&m.value(id).kind, ValueKind::Inst(inst) if inst.kind.is_phi_move()))
            .expect("phi elimination inserted a PhiMove into the back edge's block");
        if let ValueKind::Inst(inst) = &m.value(phi_move).kind {
            if let InstKind::PhiMove { block_alive, .. } = &inst.kind {
                assert!(
                    block_alive[&body].contains(&i_next),
                    "i_next must still be alive at the PhiMove sitting in the loop body"
                );
                return;
            }
        }
        panic!("expected the found instruction to be a PhiMove");
    }
}
