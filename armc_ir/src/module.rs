//! The `Module`: one arena per kind of entity (values, blocks, functions),
//! replacing the reference-counted, cyclically-owned graph of the original
//! implementation with dense integer ids (spec §9). A `Module` is the
//! `CompilerContext` the design notes call for — id counters and the
//! number-interning table live here, threaded explicitly rather than as
//! process-global state.

use crate::block::BasicBlock;
use crate::function::{FuncKind, Function};
use crate::ids::{BlockId, FunctionId, ValueId};
use crate::instruction::{InstKind, Instruction, ResultRole};
use crate::value::{Cell, ConstantData, GlobalData, ParameterData, UseSite, ValueKind, ValueNode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    values: Vec<ValueNode>,
    blocks: Vec<BasicBlock>,
    functions: Vec<Function>,

    number_pool: HashMap<i32, ValueId>,
    temp_lvalue_counter: u32,
    temp_block_counter: u32,

    pub constants: Vec<ValueId>,
    pub globals: Vec<ValueId>,
    pub strings: Vec<ValueId>,
    pub function_order: Vec<FunctionId>,
}

impl Module {
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            blocks: Vec::new(),
            functions: Vec::new(),
            number_pool: HashMap::new(),
            temp_lvalue_counter: 0,
            temp_block_counter: 0,
            constants: Vec::new(),
            globals: Vec::new(),
            strings: Vec::new(),
            function_order: Vec::new(),
        }
    }

    // --- value arena ---

    fn push_value(&mut self, kind: ValueKind) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(ValueNode::new(id, kind));
        id
    }

    pub fn value(&self, id: ValueId) -> &ValueNode {
        &self.values[id.index()]
    }

    pub fn value_mut(&mut self, id: ValueId) -> &mut ValueNode {
        &mut self.values[id.index()]
    }

    pub fn is_valid(&self, id: ValueId) -> bool {
        self.values[id.index()].valid
    }

    /// Numbers are interned globally: two requests for the same integer
    /// return the same `ValueId` (spec §3.1) and are never abandoned.
    pub fn intern_number(&mut self, n: i32) -> ValueId {
        if let Some(id) = self.number_pool.get(&n) {
            return *id;
        }
        let id = self.push_value(ValueKind::Number(n));
        self.number_pool.insert(n, id);
        id
    }

    pub fn intern_string(&mut self, s: impl Into<String>) -> ValueId {
        let id = self.push_value(ValueKind::Str(s.into()));
        self.strings.push(id);
        id
    }

    pub fn new_undefined(&mut self) -> ValueId {
        self.push_value(ValueKind::Undefined)
    }

    pub fn new_constant(&mut self, data: ConstantData) -> ValueId {
        let id = self.push_value(ValueKind::Constant(data));
        self.constants.push(id);
        id
    }

    pub fn new_global(&mut self, data: GlobalData) -> ValueId {
        let id = self.push_value(ValueKind::Global(data));
        self.globals.push(id);
        id
    }

    pub fn new_parameter(&mut self, data: ParameterData) -> ValueId {
        self.push_value(ValueKind::Parameter(data))
    }

    /// Remove a global from the module's global list without touching the
    /// value arena slot itself (the caller is expected to `abandon` it).
    pub fn remove_global(&mut self, id: ValueId) {
        self.globals.retain(|g| *g != id);
    }

    pub fn remove_constant(&mut self, id: ValueId) {
        self.constants.retain(|c| *c != id);
    }

    /// Adds an instruction to the value arena and registers it as a user of
    /// each of its operands, maintaining invariant U1 at the point of
    /// creation. Does not place it into a block's instruction list — the
    /// caller positions it (builder, finalize).
    pub fn create_instruction(&mut self, kind: InstKind, block: BlockId, role: ResultRole) -> ValueId {
        let operands = kind.operands();
        let inst = Instruction::new(kind, block, role);
        let id = self.push_value(ValueKind::Inst(inst));
        for operand in operands {
            self.add_use(operand, UseSite::Value(id));
        }
        id
    }

    pub fn add_use(&mut self, operand: ValueId, user: UseSite) {
        self.value_mut(operand).add_user(user);
    }

    pub fn remove_use(&mut self, operand: ValueId, user: UseSite) {
        self.value_mut(operand).remove_user(user);
    }

    pub fn generate_temp_lvalue_name(&mut self) -> String {
        let n = self.temp_lvalue_counter;
        self.temp_lvalue_counter += 1;
        format!("%tmp{}", n)
    }

    pub fn generate_block_name(&mut self, prefix: &str) -> String {
        let n = self.temp_block_counter;
        self.temp_block_counter += 1;
        format!("{}.{}", prefix, n)
    }

    // --- block arena ---

    pub fn new_block(&mut self, function: FunctionId, loop_depth: u32, sealed: bool) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        let block = if sealed {
            BasicBlock::new(id, function, loop_depth)
        } else {
            BasicBlock::new_unsealed(id, function, loop_depth)
        };
        self.blocks.push(block);
        id
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.index()]
    }

    /// Invariant B1: maintains both directions of the CFG edge.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        self.block_mut(from).successors.insert(to);
        self.block_mut(to).predecessors.insert(from);
    }

    pub fn remove_edge(&mut self, from: BlockId, to: BlockId) {
        self.block_mut(from).successors.shift_remove(&to);
        self.block_mut(to).predecessors.shift_remove(&from);
    }

    // --- function arena ---

    pub fn new_function(&mut self, name: impl Into<String>, return_kind: FuncKind, entry: BlockId) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(Function::new(id, name, return_kind, entry));
        self.function_order.push(id);
        id
    }

    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.index()]
    }

    pub fn function_mut(&mut self, id: FunctionId) -> &mut Function {
        &mut self.functions[id.index()]
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.function_order.iter().map(move |id| self.function(*id))
    }

    pub fn remove_function(&mut self, id: FunctionId) {
        self.function_order.retain(|f| *f != id);
    }

    pub fn push_instruction_to_block(&mut self, block: BlockId, inst: ValueId) {
        self.block_mut(block).instructions.push(inst);
    }
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module")?;
        for &c in &self.constants {
            if let Some(data) = self.value(c).kind.as_constant() {
                writeln!(f, "const {} {:?}", data.name, data.dimensions)?;
            }
        }
        for &g in &self.globals {
            if let Some(data) = self.value(g).kind.as_global() {
                writeln!(f, "global {} {:?}", data.name, data.dimensions)?;
            }
        }
        for func in self.functions() {
            writeln!(f, "fn {} ({:?})", func.name, func.return_kind)?;
            for &bid in &func.blocks {
                let b = self.block(bid);
                writeln!(f, "  {}: preds={:?}", bid, b.predecessors)?;
                for &iid in &b.instructions {
                    writeln!(f, "    {} = {:?}", iid, self.value(iid).kind.as_inst())?;
                }
            }
        }
        Ok(())
    }
}

pub fn cell_of_dimensions(dimensions: &[usize]) -> Cell {
    if dimensions.is_empty() {
        Cell::Int
    } else {
        Cell::Pointer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_are_interned() {
        let mut m = Module::new();
        let a = m.intern_number(42);
        let b = m.intern_number(42);
        let c = m.intern_number(7);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn edges_stay_symmetric() {
        let mut m = Module::new();
        let f = m.new_function("F*0_0$main", FuncKind::Int, BlockId(0));
        let b0 = m.new_block(f, 1, true);
        let b1 = m.new_block(f, 1, true);
        m.add_edge(b0, b1);
        assert!(m.block(b0).successors.contains(&b1));
        assert!(m.block(b1).predecessors.contains(&b0));
        m.remove_edge(b0, b1);
        assert!(!m.block(b0).successors.contains(&b1));
        assert!(!m.block(b1).predecessors.contains(&b0));
    }

    #[test]
    fn creating_instruction_registers_uses() {
        let mut m = Module::new();
        let f = m.new_function("F*0_0$main", FuncKind::Int, BlockId(0));
        let b0 = m.new_block(f, 1, true);
        let lhs = m.intern_number(1);
        let rhs = m.intern_number(2);
        let add = m.create_instruction(
            InstKind::Binary { op: crate::instruction::BinaryOp::Add, lhs, rhs },
            b0,
            ResultRole::RValue,
        );
        assert!(m.value(lhs).users.contains(&UseSite::Value(add)));
        assert!(m.value(rhs).users.contains(&UseSite::Value(add)));
    }
}
