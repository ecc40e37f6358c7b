//! Conflict graph construction and graph-coloring register allocation
//! (spec §4.4.3, §4.4.4), including the wall-clock timeout fallback
//! (spec §4.4.3, §5): on timeout, allocation is skipped and every lvalue
//! is left in `variable_without_reg`.

use crate::function::Function;
use crate::ids::{FunctionId, RegisterId, ValueId};
use crate::instruction::{InstKind, ResultRole};
use crate::module::Module;
use crate::value::ValueKind;
use indexmap::{IndexMap, IndexSet};
use log::{debug, warn};
use std::time::{Duration, Instant};

/// Count of callee-saved GPRs available to the allocator (spec §4.4.4:
/// "nominally 9").
pub const GLB_REG_CNT: usize = 9;
/// Default wall-clock budget for conflict-graph construction (spec §5).
pub const CONFLICT_GRAPH_TIMEOUT: Duration = Duration::from_secs(10);

struct ConflictGraph {
    nodes: IndexSet<ValueId>,
    edges: IndexMap<ValueId, IndexSet<ValueId>>,
}

impl ConflictGraph {
    fn new(nodes: IndexSet<ValueId>) -> Self {
        let edges = nodes.iter().map(|&n| (n, IndexSet::new())).collect();
        Self { nodes, edges }
    }

    fn add_edge(&mut self, a: ValueId, b: ValueId) {
        if a == b {
            return;
        }
        self.edges.entry(a).or_default().insert(b);
        self.edges.entry(b).or_default().insert(a);
    }

    fn degree(&self, v: &ValueId) -> usize {
        self.edges.get(v).map(|s| s.len()).unwrap_or(0)
    }
}

/// Builds the conflict graph for `fid` from already-populated alive sets
/// (spec §4.4.3): node set is parameters ∪ lvalue instructions; an edge
/// connects two nodes simultaneously alive at some block-entry or
/// post-instruction program point. Returns `None` if the wall-clock
/// budget is exceeded.
fn build_conflict_graph(module: &Module, fid: FunctionId, deadline: Instant) -> Option<ConflictGraph> {
    let f = module.function(fid);
    let mut nodes: IndexSet<ValueId> = f.params.iter().copied().collect();
    for &bid in &f.blocks {
        for &iid in &module.block(bid).instructions {
            if let ValueKind::Inst(inst) = &module.value(iid).kind {
                if inst.role.is_lvalue() {
                    nodes.insert(iid);
                }
            }
        }
    }

    let mut graph = ConflictGraph::new(nodes);

    for &bid in &f.blocks {
        if Instant::now() >= deadline {
            return None;
        }
        let alive = &module.block(bid).alive_values;
        for a in alive.iter() {
            for b in alive.iter() {
                graph.add_edge(*a, *b);
            }
        }
        for &iid in &module.block(bid).instructions {
            if Instant::now() >= deadline {
                return None;
            }
            if let ValueKind::Inst(inst) = &module.value(iid).kind {
                // A PhiMove is one shared instruction sitting in every
                // predecessor of its phi; `inst.alive` can't distinguish
                // those occurrences, so its program point is keyed off
                // `block_alive[bid]` instead (spec §4.4.3).
                if let InstKind::PhiMove { block_alive, .. } = &inst.kind {
                    if let Some(alive_here) = block_alive.get(&bid) {
                        for a in alive_here.iter() {
                            for b in alive_here.iter() {
                                graph.add_edge(*a, *b);
                            }
                        }
                    }
                    continue;
                }
                for a in inst.alive.iter() {
                    if inst.role.is_lvalue() {
                        graph.add_edge(iid, *a);
                    }
                    for b in inst.alive.iter() {
                        graph.add_edge(*a, *b);
                    }
                }
            }
        }
    }

    Some(graph)
}

/// Runs conflict-graph construction and graph-coloring allocation for one
/// function, writing `variable_regs` / `variable_without_reg` directly.
pub fn allocate_function(module: &mut Module, fid: FunctionId) {
    let deadline = Instant::now() + CONFLICT_GRAPH_TIMEOUT;
    let graph = match build_conflict_graph(module, fid, deadline) {
        Some(g) => g,
        None => {
            warn!("conflict graph construction timed out for {}; spilling every value", module.function(fid).name);
            spill_everything(module, fid);
            return;
        }
    };

    color_graph(module, fid, graph);
}

fn spill_everything(module: &mut Module, fid: FunctionId) {
    let f = module.function(fid);
    let mut spills: IndexSet<ValueId> = f.params.iter().copied().collect();
    for &bid in &f.blocks {
        for &iid in &module.block(bid).instructions {
            if let ValueKind::Inst(inst) = &module.value(iid).kind {
                if inst.role.is_lvalue() {
                    spills.insert(iid);
                }
            }
        }
    }
    let func = module.function_mut(fid);
    func.variable_regs.clear();
    func.variable_without_reg = spills;
}

fn color_graph(module: &mut Module, fid: FunctionId, mut graph: ConflictGraph) {
    let weights = module.function(fid).variable_weight.clone();
    let mut stack = Vec::new();
    let mut spilled: IndexSet<ValueId> = IndexSet::new();
    let mut remaining: IndexSet<ValueId> = graph.nodes.clone();

    loop {
        let mut progressed = true;
        while progressed {
            progressed = false;
            let candidates: Vec<ValueId> =
                remaining.iter().filter(|v| graph.degree(v) < GLB_REG_CNT).copied().collect();
            for v in candidates {
                if !remaining.contains(&v) {
                    continue;
                }
                remove_node(&mut graph, &mut remaining, v);
                stack.push(v);
                progressed = true;
            }
        }
        if remaining.is_empty() {
            break;
        }
        let victim = *remaining
            .iter()
            .min_by_key(|v| (weights.get(v).copied().unwrap_or(0), v.0))
            .expect("remaining is non-empty");
        debug!("spilling {} in {} (minimum weight among {} remaining)", victim, module.function(fid).name, remaining.len());
        remove_node(&mut graph, &mut remaining, victim);
        spilled.insert(victim);
    }

    let mut colors: IndexMap<ValueId, RegisterId> = IndexMap::new();
    while let Some(v) = stack.pop() {
        let used: IndexSet<u8> = graph
            .edges
            .get(&v)
            .into_iter()
            .flatten()
            .filter_map(|n| colors.get(n).map(|r| r.0))
            .collect();
        let color = (0..GLB_REG_CNT as u8).find(|c| !used.contains(c)).expect("k-coloring guarantees a free color");
        colors.insert(v, RegisterId(color));
    }

    let func = module.function_mut(fid);
    func.variable_regs = colors;
    func.variable_without_reg = spilled;
}

fn remove_node(graph: &mut ConflictGraph, remaining: &mut IndexSet<ValueId>, v: ValueId) {
    remaining.shift_remove(&v);
    let neighbors: Vec<ValueId> = graph.edges.get(&v).map(|s| s.iter().copied().collect()).unwrap_or_default();
    for n in neighbors {
        if let Some(set) = graph.edges.get_mut(&n) {
            set.shift_remove(&v);
        }
    }
    graph.edges.insert(v, IndexSet::new());
}

pub fn required_register_band() -> std::ops::Range<u8> {
    0..GLB_REG_CNT as u8
}

pub fn is_spilled(function: &Function, value: ValueId) -> bool {
    function.variable_without_reg.contains(&value)
}
