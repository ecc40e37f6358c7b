//! The value graph's node types (spec §3.1). Every node — interned
//! numbers, string literals, constants, globals, parameters, the
//! undefined placeholder, and instructions — lives in one arena
//! (`Module::values`) and is referenced by `ValueId`.

use crate::ids::{BlockId, ValueId};
use crate::instruction::Instruction;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Whether a variable/parameter cell holds a plain integer or a pointer
/// (an array that has decayed, or the address of one) — spec §3.1 Global,
/// Parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cell {
    Int,
    Pointer,
}

/// A use-site: something that references a `ValueId` as an operand. Blocks
/// are included because `writeVariable` records a block's current SSA
/// binding of a phi as a use of that phi (spec §4.1.1), and invariant U1
/// requires that relationship to be visible from the phi's use-set too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UseSite {
    Value(ValueId),
    Block(BlockId),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstantData {
    pub name: String,
    pub dimensions: Vec<usize>,
    pub size: usize,
    /// Sparse `index -> value`; an absent index is implicitly zero.
    pub values: HashMap<usize, i32>,
}

impl ConstantData {
    pub fn get(&self, index: usize) -> i32 {
        self.values.get(&index).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalData {
    pub name: String,
    pub dimensions: Vec<usize>,
    pub size: usize,
    pub init_values: HashMap<usize, i32>,
    pub cell: Cell,
}

impl GlobalData {
    pub fn is_scalar(&self) -> bool {
        self.dimensions.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterData {
    pub name: String,
    pub cell: Cell,
    /// Dimensions after pointer decay; empty for a plain int parameter.
    pub dimensions: Vec<usize>,
}

/// A node of the SSA value graph (spec §3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ValueKind {
    Number(i32),
    Str(String),
    Constant(ConstantData),
    Global(GlobalData),
    Parameter(ParameterData),
    Undefined,
    Inst(Instruction),
}

impl ValueKind {
    pub fn as_number(&self) -> Option<i32> {
        match self {
            ValueKind::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_inst(&self) -> Option<&Instruction> {
        match self {
            ValueKind::Inst(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_inst_mut(&mut self) -> Option<&mut Instruction> {
        match self {
            ValueKind::Inst(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_constant(&self) -> Option<&ConstantData> {
        match self {
            ValueKind::Constant(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_global(&self) -> Option<&GlobalData> {
        match self {
            ValueKind::Global(g) => Some(g),
            _ => None,
        }
    }
}

/// A node plus its bookkeeping: validity (invariant U2) and use-set
/// (invariant U1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueNode {
    pub id: ValueId,
    pub kind: ValueKind,
    pub valid: bool,
    pub users: IndexSet<UseSite>,
}

impl ValueNode {
    pub fn new(id: ValueId, kind: ValueKind) -> Self {
        Self { id, kind, valid: true, users: IndexSet::new() }
    }

    pub fn add_user(&mut self, use_site: UseSite) {
        self.users.insert(use_site);
    }

    pub fn remove_user(&mut self, use_site: UseSite) {
        self.users.shift_remove(&use_site);
    }
}
