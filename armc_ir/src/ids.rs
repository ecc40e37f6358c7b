//! Dense integer ids into the module's arenas, replacing the reference-
//! counted back-pointers of the original implementation (spec §9): every
//! Value, BasicBlock, and Function is referenced by a small `Copy` id
//! rather than a shared pointer, and the arenas that own them live in one
//! place (`Module`).

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! dense_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }
    };
}

dense_id!(ValueId, "%v");
dense_id!(BlockId, "bb");
dense_id!(FunctionId, "fn");

/// A callee-saved register in the allocation band `R_start .. R_start + k`
/// (spec §4.4.4). The concrete ARM register name is a concern of the
/// machine-IR builder (out of scope here); this id is only ever compared
/// or enumerated by the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegisterId(pub u8);

impl fmt::Display for RegisterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}
