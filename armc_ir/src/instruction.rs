//! Instruction kinds (spec §3.4): a tagged variant with a shared header
//! (owning block, result role, alive-set) and a per-kind payload, replacing
//! the virtual-dispatch hierarchy of the original implementation (spec §9)
//! with an exhaustively-matchable sum type.

use crate::ids::{BlockId, FunctionId, ValueId};
use armc_common::Builtin;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Plus,
    Neg,
    Not,
}

/// Binary arithmetic/logical ops. `&&`/`||` are retained at IR level rather
/// than lowered to branches at expression-build time — short-circuiting
/// happens via explicit control flow in the builder (spec §4.1.3); once
/// materialized as a value (e.g. after normalization, §4.2) a leftover
/// `And`/`Or` binary is still possible and is treated as non-commutative
/// (spec §9 open question: the conservative reading, since the IR
/// preserves evaluation order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    /// A relation materialized to a 0/1 value rather than consumed as
    /// flags — the shape a `Cmp` takes after post-build normalization
    /// retags it (spec §4.2). `CmpOp::eval` still gives the semantics.
    Relational(CmpOp),
}

impl BinaryOp {
    /// Per spec §9: only `+`/`*` are treated as commutative for hashing
    /// and structural-equality purposes (LCSE, §4.3.8).
    pub fn is_commutative(self) -> bool {
        matches!(self, BinaryOp::Add | BinaryOp::Mul)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl CmpOp {
    /// Swap the relation to match swapped operands (used to canonicalize a
    /// constant to the right-hand side, spec §4.3.2).
    pub fn swapped(self) -> CmpOp {
        match self {
            CmpOp::Eq => CmpOp::Eq,
            CmpOp::Ne => CmpOp::Ne,
            CmpOp::Lt => CmpOp::Gt,
            CmpOp::Gt => CmpOp::Lt,
            CmpOp::Le => CmpOp::Ge,
            CmpOp::Ge => CmpOp::Le,
        }
    }

    pub fn eval(self, lhs: i32, rhs: i32) -> bool {
        match self {
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
            CmpOp::Lt => lhs < rhs,
            CmpOp::Gt => lhs > rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Ge => lhs >= rhs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallTarget {
    Function(FunctionId),
    Builtin(Builtin),
}

/// The per-instruction role that decides whether a result needs a
/// persistent name (spec GLOSSARY, §3.4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultRole {
    RValue,
    LValue(String),
    NoResult,
}

impl ResultRole {
    pub fn is_lvalue(&self) -> bool {
        matches!(self, ResultRole::LValue(_))
    }

    pub fn caught_name(&self) -> Option<&str> {
        match self {
            ResultRole::LValue(name) => Some(name.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InstKind {
    Return { value: Option<ValueId> },
    Branch { cond: ValueId, if_true: BlockId, if_false: BlockId },
    Jump { target: BlockId },
    Invoke { target: CallTarget, args: Vec<ValueId> },
    Unary { op: UnaryOp, value: ValueId },
    Binary { op: BinaryOp, lhs: ValueId, rhs: ValueId },
    Cmp { op: CmpOp, lhs: ValueId, rhs: ValueId },
    /// Reserves stack space for a local array; its "identity" (the base
    /// pointer other instructions address) is the Alloc's own `ValueId`.
    Alloc { name: String, bytes: usize, units: usize },
    /// `offset` is an element offset (multiplied by the word size at
    /// codegen time) — spec §4.1.4.
    Load { address: ValueId, offset: ValueId },
    Store { value: ValueId, address: ValueId, offset: ValueId },
    /// One per merged variable per join block; `operands` keys are exactly
    /// the owning block's predecessors (invariant B3/P4).
    Phi { var_name: String, operands: IndexMap<BlockId, ValueId> },
    /// Exactly one per live Phi after φ elimination (invariant I2). Placed
    /// physically (its `ValueId` pushed into the instruction list) in every
    /// predecessor of the phi, immediately before that predecessor's
    /// terminator (or before a `Cmp` feeding a `Branch`, spec §4.4.5); its
    /// own `block` header field names the phi's block, matching the
    /// original implementation's `PhiMoveInstruction`.
    PhiMove { phi: ValueId, block_alive: IndexMap<BlockId, IndexSet<ValueId>> },
}

impl InstKind {
    pub fn is_terminator(&self) -> bool {
        matches!(self, InstKind::Return { .. } | InstKind::Branch { .. } | InstKind::Jump { .. })
    }

    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            InstKind::Branch { if_true, if_false, .. } => vec![*if_true, *if_false],
            InstKind::Jump { target } => vec![*target],
            _ => Vec::new(),
        }
    }

    /// All `ValueId` operands referenced by this instruction, in a fixed
    /// order (used by the abandon cascade and by use-def rebuilding).
    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            InstKind::Return { value } => value.iter().copied().collect(),
            InstKind::Branch { cond, .. } => vec![*cond],
            InstKind::Jump { .. } => Vec::new(),
            InstKind::Invoke { args, .. } => args.clone(),
            InstKind::Unary { value, .. } => vec![*value],
            InstKind::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
            InstKind::Cmp { lhs, rhs, .. } => vec![*lhs, *rhs],
            InstKind::Alloc { .. } => Vec::new(),
            InstKind::Load { address, offset } => vec![*address, *offset],
            InstKind::Store { value, address, offset } => vec![*value, *address, *offset],
            InstKind::Phi { operands, .. } => operands.values().copied().collect(),
            InstKind::PhiMove { phi, .. } => vec![*phi],
        }
    }

    pub fn replace_operand(&mut self, old: ValueId, new: ValueId) {
        let swap = |v: &mut ValueId| {
            if *v == old {
                *v = new;
            }
        };
        match self {
            InstKind::Return { value: Some(v) } => swap(v),
            InstKind::Branch { cond, .. } => swap(cond),
            InstKind::Invoke { args, .. } => args.iter_mut().for_each(swap),
            InstKind::Unary { value, .. } => swap(value),
            InstKind::Binary { lhs, rhs, .. } => {
                swap(lhs);
                swap(rhs);
            }
            InstKind::Cmp { lhs, rhs, .. } => {
                swap(lhs);
                swap(rhs);
            }
            InstKind::Load { address, offset } => {
                swap(address);
                swap(offset);
            }
            InstKind::Store { value, address, offset } => {
                swap(value);
                swap(address);
                swap(offset);
            }
            InstKind::Phi { operands, .. } => {
                for v in operands.values_mut() {
                    swap(v);
                }
            }
            InstKind::PhiMove { phi, .. } => swap(phi),
            InstKind::Return { value: None } | InstKind::Jump { .. } | InstKind::Alloc { .. } => {}
        }
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, InstKind::Phi { .. })
    }

    pub fn is_phi_move(&self) -> bool {
        matches!(self, InstKind::PhiMove { .. })
    }

    /// "No-result" kinds that dead-code elimination never removes purely
    /// for having an empty use-set (spec §4.3.3).
    pub fn is_always_kept_kind(&self) -> bool {
        matches!(
            self,
            InstKind::Branch { .. }
                | InstKind::Jump { .. }
                | InstKind::Return { .. }
                | InstKind::Invoke { .. }
                | InstKind::Store { .. }
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instruction {
    pub kind: InstKind,
    pub block: BlockId,
    pub role: ResultRole,
    /// Populated by liveness (spec §4.4.2); empty until that pass runs.
    pub alive: IndexSet<ValueId>,
}

impl Instruction {
    pub fn new(kind: InstKind, block: BlockId, role: ResultRole) -> Self {
        Self { kind, block, role, alive: IndexSet::new() }
    }
}
