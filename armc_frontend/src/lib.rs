//! Input contract for the IR builder: the AST shape and the symbol table
//! produced by lexing/parsing (spec §3.3, §6.1). Scanning and parsing
//! themselves are out of scope for this repository (spec §1) — this crate
//! exists only so the core (`armc_ir`) has a concrete type to build from.

pub mod ast;
pub mod symbol;

pub use ast::{BinaryOp, CmpOp, CompUnit, Expr, FuncDef, FuncKind, FuncParam, Stmt, UnaryOp};
pub use symbol::{Initializer, ScopeId, Symbol, SymbolKind, SymbolTable};
