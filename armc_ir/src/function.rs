//! Functions (spec §3.2): ordered blocks, the call-graph edges used by
//! dead-function elimination and side-effect analysis (§4.3.3), and the
//! register-allocation results the finalizer produces (§4.4, §6.2).

use crate::ids::{BlockId, FunctionId, RegisterId, ValueId};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FuncKind {
    Void,
    Int,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub id: FunctionId,
    pub name: String,
    pub return_kind: FuncKind,
    /// Ordered `Parameter` values.
    pub params: Vec<ValueId>,
    pub blocks: Vec<BlockId>,
    pub entry: BlockId,

    pub callers: IndexSet<FunctionId>,
    pub callees: IndexSet<FunctionId>,
    pub may_have_side_effects: bool,

    pub variable_regs: IndexMap<ValueId, RegisterId>,
    pub variable_without_reg: IndexSet<ValueId>,
    pub variable_weight: IndexMap<ValueId, u32>,
    pub required_stack_size: u32,
}

impl Function {
    pub fn new(id: FunctionId, name: impl Into<String>, return_kind: FuncKind, entry: BlockId) -> Self {
        Self {
            id,
            name: name.into(),
            return_kind,
            params: Vec::new(),
            blocks: vec![entry],
            entry,
            callers: IndexSet::new(),
            callees: IndexSet::new(),
            may_have_side_effects: true,
            variable_regs: IndexMap::new(),
            variable_without_reg: IndexSet::new(),
            variable_weight: IndexMap::new(),
            required_stack_size: 0,
        }
    }

    pub fn is_main(&self) -> bool {
        // Usage names are mangled (spec §3.3); the unmangled source name is
        // the suffix after the last '$'.
        self.name.rsplit('$').next() == Some("main")
    }
}
