//! Loop-invariant code motion (spec §4.3.7): dominator computation, natural
//! loop discovery from back edges, pre-header synthesis, and hoisting of
//! side-effect-free `Unary`/`Binary` instructions whose operands are all
//! defined outside the loop.

use crate::ids::{BlockId, FunctionId, ValueId};
use crate::instruction::{InstKind, ResultRole};
use crate::module::Module;
use crate::value::{UseSite, ValueKind};
use indexmap::{IndexMap, IndexSet};

/// Reverse-postorder-free iterative dominator computation (Cooper/Harvey/
/// Kennedy style adapted to our index-based blocks): converges because
/// block count is finite and the meet operation is monotone.
fn compute_idom(module: &Module, fid: FunctionId) -> IndexMap<BlockId, BlockId> {
    let blocks = &module.function(fid).blocks;
    let entry = module.function(fid).entry;
    let order: Vec<BlockId> = blocks.clone();
    let index_of: IndexMap<BlockId, usize> = order.iter().enumerate().map(|(i, &b)| (b, i)).collect();

    let mut idom: IndexMap<BlockId, Option<usize>> = order.iter().map(|&b| (b, None)).collect();
    idom.insert(entry, Some(index_of[&entry]));

    let mut changed = true;
    while changed {
        changed = false;
        for &b in &order {
            if b == entry {
                continue;
            }
            let preds = module.block(b).predecessors.clone();
            let mut new_idom: Option<usize> = None;
            for p in preds {
                let Some(&p_idx) = index_of.get(&p) else { continue };
                if idom.get(&p).copied().flatten().is_none() {
                    continue;
                }
                new_idom = Some(match new_idom {
                    None => p_idx,
                    Some(cur) => intersect(&idom, &order, cur, p_idx),
                });
            }
            if idom.get(&b).copied().flatten() != new_idom {
                idom.insert(b, new_idom);
                changed = true;
            }
        }
    }

    idom.into_iter().filter_map(|(b, i)| i.map(|i| (b, order[i]))).collect()
}

fn intersect(idom: &IndexMap<BlockId, Option<usize>>, order: &[BlockId], mut a: usize, mut b: usize) -> usize {
    while a != b {
        while a > b {
            let Some(idx) = idom.get(&order[a]).copied().flatten() else { return a.min(b) };
            a = idx;
        }
        while b > a {
            let Some(idx) = idom.get(&order[b]).copied().flatten() else { return a.min(b) };
            b = idx;
        }
    }
    a
}

fn dominates(idom: &IndexMap<BlockId, BlockId>, a: BlockId, mut b: BlockId) -> bool {
    loop {
        if a == b {
            return true;
        }
        let Some(&parent) = idom.get(&b) else { return false };
        if parent == b {
            return a == b;
        }
        b = parent;
    }
}

struct Loop {
    header: BlockId,
    body: IndexSet<BlockId>,
}

/// A back edge `latch -> header` exists when `header` dominates `latch`;
/// the loop body is every block that can reach `latch` without leaving
/// through `header` (standard natural-loop discovery).
fn find_natural_loops(module: &Module, fid: FunctionId, idom: &IndexMap<BlockId, BlockId>) -> Vec<Loop> {
    let mut loops = Vec::new();
    for &header in &module.function(fid).blocks {
        for &latch in &module.block(header).predecessors.clone() {
            if !dominates(idom, header, latch) {
                continue;
            }
            let mut body: IndexSet<BlockId> = IndexSet::new();
            body.insert(header);
            let mut stack = vec![latch];
            while let Some(b) = stack.pop() {
                if !body.insert(b) {
                    continue;
                }
                for p in module.block(b).predecessors.clone() {
                    stack.push(p);
                }
            }
            loops.push(Loop { header, body });
        }
    }
    loops
}

pub fn run(module: &mut Module, fid: FunctionId) -> bool {
    let idom = compute_idom(module, fid);
    let loops = find_natural_loops(module, fid, &idom);
    let mut changed = false;

    for lp in loops {
        let preheader = ensure_preheader(module, fid, lp.header, &lp.body);
        changed |= hoist_invariant(module, &lp.body, lp.header, preheader);
    }

    changed
}

/// If the header already has exactly one predecessor outside the loop,
/// that block serves as the pre-header. Otherwise synthesize one: a fresh
/// block inserted between every outside predecessor and the header.
fn ensure_preheader(module: &mut Module, fid: FunctionId, header: BlockId, body: &IndexSet<BlockId>) -> BlockId {
    let outside_preds: Vec<BlockId> =
        module.block(header).predecessors.iter().copied().filter(|p| !body.contains(p)).collect();

    if outside_preds.len() == 1 {
        return outside_preds[0];
    }

    let depth = module.block(header).loop_depth.saturating_sub(1);
    let preheader = module.new_block(fid, depth, true);
    module.function_mut(fid).blocks.push(preheader);
    let jump = module.create_instruction(InstKind::Jump { target: header }, preheader, crate::instruction::ResultRole::NoResult);
    module.push_instruction_to_block(preheader, jump);

    for pred in &outside_preds {
        redirect_terminator(module, *pred, header, preheader);
        module.remove_edge(*pred, header);
        module.add_edge(*pred, preheader);
    }
    module.add_edge(preheader, header);

    retarget_phi_predecessors(module, header, &outside_preds, preheader);

    preheader
}

fn redirect_terminator(module: &mut Module, block: BlockId, from: BlockId, to: BlockId) {
    let Some(term) = module.block(block).last_instruction() else { return };
    if let ValueKind::Inst(inst) = &mut module.value_mut(term).kind {
        match &mut inst.kind {
            InstKind::Jump { target } if *target == from => *target = to,
            InstKind::Branch { if_true, if_false, .. } => {
                if *if_true == from {
                    *if_true = to;
                }
                if *if_false == from {
                    *if_false = to;
                }
            }
            _ => {}
        }
    }
}

/// Moves each header phi's operands from the outside predecessors onto the
/// new pre-header. When those predecessors carry genuinely different
/// incoming values for the phi, one value can't simply stand in for the
/// rest (spec §4.3.7): a new phi is synthesized in the pre-header, keyed by
/// exactly the predecessors being merged (matching the pre-header's own
/// predecessor set), and that phi's result becomes the header phi's single
/// pre-header operand.
fn retarget_phi_predecessors(module: &mut Module, header: BlockId, old_preds: &[BlockId], new_pred: BlockId) {
    let phis = module.block(header).phis.clone();
    for phi in phis {
        let var_name = match &module.value(phi).kind {
            ValueKind::Inst(inst) => match &inst.kind {
                InstKind::Phi { var_name, .. } => var_name.clone(),
                _ => continue,
            },
            _ => continue,
        };

        let mut removed: IndexMap<BlockId, ValueId> = IndexMap::new();
        if let ValueKind::Inst(inst) = &mut module.value_mut(phi).kind {
            if let InstKind::Phi { operands, .. } = &mut inst.kind {
                for old in old_preds {
                    if let Some(v) = operands.shift_remove(old) {
                        removed.insert(*old, v);
                    }
                }
            }
        }
        if removed.is_empty() {
            continue;
        }

        let distinct: IndexSet<ValueId> = removed.values().copied().collect();
        let merged = if distinct.len() == 1 {
            *distinct.iter().next().expect("distinct is non-empty")
        } else {
            let new_phi = module.create_instruction(
                InstKind::Phi { var_name: var_name.clone(), operands: removed.clone() },
                new_pred,
                ResultRole::LValue(var_name),
            );
            module.block_mut(new_pred).phis.insert(new_phi);
            module.block_mut(new_pred).instructions.insert(0, new_phi);
            new_phi
        };

        if let ValueKind::Inst(inst) = &mut module.value_mut(phi).kind {
            if let InstKind::Phi { operands, .. } = &mut inst.kind {
                operands.insert(new_pred, merged);
            }
        }
        module.add_use(merged, UseSite::Value(phi));
    }
}

fn has_side_effects(kind: &InstKind) -> bool {
    !matches!(kind, InstKind::Unary { .. } | InstKind::Binary { .. })
}

/// Hoists every `Unary`/`Binary` in the loop body whose operands are all
/// defined outside the loop (a global, parameter, number, or an
/// already-hoisted instruction) into the pre-header, in program order so
/// later hoists can depend on earlier ones.
fn hoist_invariant(module: &mut Module, body: &IndexSet<BlockId>, header: BlockId, preheader: BlockId) -> bool {
    if preheader == header {
        return false;
    }
    let mut hoisted: IndexSet<ValueId> = IndexSet::new();
    let mut changed = false;

    loop {
        let mut progressed = false;
        for &bid in body {
            let instructions = module.block(bid).instructions.clone();
            for iid in instructions {
                if hoisted.contains(&iid) || !module.is_valid(iid) {
                    continue;
                }
                let kind = match &module.value(iid).kind {
                    ValueKind::Inst(inst) => inst.kind.clone(),
                    _ => continue,
                };
                if has_side_effects(&kind) {
                    continue;
                }
                let operands = kind.operands();
                let all_invariant = operands.iter().all(|op| is_invariant(module, *op, body, &hoisted));
                if !all_invariant {
                    continue;
                }

                module.block_mut(bid).instructions.retain(|&id| id != iid);
                let preheader_jump_pos =
                    module.block(preheader).instructions.iter().position(|&id| is_terminator(module, id)).unwrap_or(module.block(preheader).instructions.len());
                module.block_mut(preheader).instructions.insert(preheader_jump_pos, iid);
                if let ValueKind::Inst(inst) = &mut module.value_mut(iid).kind {
                    inst.block = preheader;
                }
                hoisted.insert(iid);
                progressed = true;
                changed = true;
            }
        }
        if !progressed {
            break;
        }
    }

    changed
}

fn is_terminator(module: &Module, id: ValueId) -> bool {
    matches!(&module.value(id).kind, ValueKind::Inst(inst) if inst.kind.is_terminator())
}

fn is_invariant(module: &Module, id: ValueId, body: &IndexSet<BlockId>, hoisted: &IndexSet<ValueId>) -> bool {
    match &module.value(id).kind {
        ValueKind::Number(_) | ValueKind::Str(_) | ValueKind::Constant(_) | ValueKind::Global(_) | ValueKind::Parameter(_) | ValueKind::Undefined => true,
        ValueKind::Inst(inst) => hoisted.contains(&id) || !body.contains(&inst.block),
    }
}
