//! The AST shape the IR builder consumes (spec §3.3/§6.1). Scanning and
//! parsing that produce this tree are out of scope (spec §1); this module
//! only fixes the contract between "front end" and "IR builder."

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Plus,
    Neg,
    Not,
}

/// A source expression. `Ident` refers to a symbol by its mangled usage
/// name (spec §3.3) rather than a raw source name — the front end has
/// already resolved scoping by the time the builder sees this tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    IntLit(i32),
    StrLit(String),
    Ident(String),
    /// `a[i1][i2]...`. May be a partial subscript (pointer decay, §4.1.4).
    Index { base: Box<Expr>, indices: Vec<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Cmp { op: CmpOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Call { callee: String, args: Vec<Expr> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    ExprStmt(Expr),
    /// Assignment to a scalar or an element/pointer produced by `Index`.
    Assign { target: Expr, value: Expr },
    Block(Vec<Stmt>),
    If { cond: Expr, then_branch: Box<Stmt>, else_branch: Option<Box<Stmt>> },
    While { cond: Expr, body: Box<Stmt> },
    Break,
    Continue,
    Return(Option<Expr>),
    /// Declares a local (scalar or array); its symbol table entry carries
    /// kind/dimensions/const-ness (spec §3.3). `init` holds the initializer
    /// expressions in source order when present, addressed per element for
    /// arrays by the builder.
    LocalDecl { usage_name: String, init: Vec<Expr> },
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncParam {
    pub usage_name: String,
    /// Dimensions of a pointer parameter after decay; empty for a plain int.
    pub dimensions: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FuncKind {
    Void,
    Int,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncDef {
    pub usage_name: String,
    pub kind: FuncKind,
    pub params: Vec<FuncParam>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompUnit {
    /// Global `const`/variable declarations resolve through the symbol
    /// table by usage name; the AST only records which globals the module
    /// must materialize, in declaration order.
    pub global_usage_names: Vec<String>,
    pub functions: Vec<FuncDef>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_minimal_comp_unit() {
        let unit = CompUnit {
            global_usage_names: vec!["V*0_0$g".to_string()],
            functions: vec![FuncDef {
                usage_name: "F*0_0$main".to_string(),
                kind: FuncKind::Int,
                params: vec![],
                body: vec![Stmt::Return(Some(Expr::IntLit(0)))],
            }],
        };
        assert_eq!(unit.functions.len(), 1);
        assert_eq!(unit.global_usage_names.len(), 1);
    }
}
