//! Internal-consistency errors (spec §7). The core presumes a well-formed
//! AST; everything here is a bug in the builder/optimizer/allocator, not a
//! diagnostic about the user's program.

use crate::ids::{BlockId, ValueId};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("block {block} is missing a terminator instruction")]
    MissingTerminator { block: BlockId },

    #[error("predecessor/successor mismatch between {a} and {b}")]
    CfgAsymmetry { a: BlockId, b: BlockId },

    #[error("phi {phi} operand keys do not match predecessor set of block {block}")]
    PhiPredecessorMismatch { phi: ValueId, block: BlockId },

    #[error("use-def mismatch: {user} references {operand} but is not in its user set")]
    UseDefMismatch { user: ValueId, operand: ValueId },

    #[error("value {0} referenced after being abandoned")]
    UseOfInvalidValue(ValueId),
}

pub type CoreResult<T> = Result<T, CoreError>;
