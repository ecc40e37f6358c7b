//! Whole-pipeline scenarios exercising `compile_to_module` end to end,
//! covering a handful of the optimizer's headline behaviors that unit
//! tests on individual passes don't show in combination.

use armc_frontend::ast::{self, CompUnit, Expr, FuncDef, FuncKind as AstFuncKind, FuncParam, Stmt};
use armc_frontend::symbol::{Initializer, ScopeId, Symbol, SymbolKind, SymbolTable};
use armc_ir::{self, InstKind, OptimizationLevel, ValueKind};

fn table_with_main() -> SymbolTable {
    let mut t = SymbolTable::new();
    t.define(ScopeId::GLOBAL, "main", Symbol::new(SymbolKind::IntFunction, "F*0_0$main"));
    t
}

fn main_func(body: Vec<Stmt>) -> FuncDef {
    FuncDef { usage_name: "F*0_0$main".to_string(), kind: AstFuncKind::Int, params: vec![], body }
}

/// Scenario 1 (spec §8.4.1): both arms of an `if` assign the same literal
/// to a local; after optimization the return value is the literal itself,
/// with no surviving φ and no conditional branch.
#[test]
fn constant_propagation_through_a_phi_collapses_to_a_literal() {
    let mut symbols = table_with_main();
    symbols.define(ScopeId::new(1, 0), "x", Symbol::new(SymbolKind::Scalar, "V*1_0$x"));

    let body = vec![
        Stmt::LocalDecl { usage_name: "V*1_0$x".to_string(), init: vec![] },
        Stmt::If {
            cond: Expr::Cmp {
                op: ast::CmpOp::Lt,
                lhs: Box::new(Expr::IntLit(0)),
                rhs: Box::new(Expr::IntLit(1)),
            },
            then_branch: Box::new(Stmt::Assign {
                target: Expr::Ident("V*1_0$x".to_string()),
                value: Expr::IntLit(3),
            }),
            else_branch: Some(Box::new(Stmt::Assign {
                target: Expr::Ident("V*1_0$x".to_string()),
                value: Expr::IntLit(3),
            })),
        },
        Stmt::Return(Some(Expr::Ident("V*1_0$x".to_string()))),
    ];
    let unit = CompUnit { global_usage_names: vec![], functions: vec![main_func(body)] };

    let module = armc_ir::compile_to_module(&symbols, &unit, OptimizationLevel::O2);

    let f = module.function(module.function_order[0]);
    assert_eq!(f.blocks.len(), 1, "no conditional branch should survive");
    let exit = f.blocks[0];
    assert!(module.block(exit).phis.is_empty(), "no phi should survive");

    let last = module.block(exit).last_instruction().expect("terminator");
    let inst = module.value(last).kind.as_inst().unwrap();
    match inst.kind {
        InstKind::Return { value: Some(v) } => {
            assert_eq!(module.value(v).kind.as_number(), Some(3));
        }
        _ => panic!("expected a Return carrying the folded literal"),
    }
}

/// Scenario 3 (spec §8.4.3): a global array never written to folds into a
/// constant, and a `main` that only reads fixed indices of it collapses to
/// a literal return.
#[test]
fn read_only_global_promotes_and_main_folds_to_a_literal() {
    let mut symbols = table_with_main();
    let mut g = Symbol::new(SymbolKind::Array, "V*0_0$g").with_dimensions(vec![3]);
    g.initializer = Some(Initializer::List(vec![
        Initializer::Scalar(1),
        Initializer::Scalar(2),
        Initializer::Scalar(3),
    ]));
    symbols.define(ScopeId::GLOBAL, "g", g);

    let index = |i: i32| Expr::Index { base: Box::new(Expr::Ident("V*0_0$g".to_string())), indices: vec![Expr::IntLit(i)] };
    let sum = Expr::Binary {
        op: ast::BinaryOp::Add,
        lhs: Box::new(Expr::Binary { op: ast::BinaryOp::Add, lhs: Box::new(index(0)), rhs: Box::new(index(1)) }),
        rhs: Box::new(index(2)),
    };
    let body = vec![Stmt::Return(Some(sum))];
    let unit =
        CompUnit { global_usage_names: vec!["V*0_0$g".to_string()], functions: vec![main_func(body)] };

    let module = armc_ir::compile_to_module(&symbols, &unit, OptimizationLevel::O2);

    assert!(module.globals.is_empty(), "g should have been promoted out of the globals list");

    let f = module.function(module.function_order[0]);
    let exit = *f.blocks.last().unwrap();
    let last = module.block(exit).last_instruction().expect("terminator");
    let inst = module.value(last).kind.as_inst().unwrap();
    match inst.kind {
        InstKind::Return { value: Some(v) } => {
            assert_eq!(module.value(v).kind.as_number(), Some(6));
        }
        _ => panic!("expected a Return carrying the folded literal 6"),
    }
}

/// Scenario 2 (spec §8.4.2): `k*k` is invariant across the loop (`k` is a
/// parameter, never reassigned) and hoists to a pre-header once, leaving no
/// copy of the multiplication inside the loop body.
#[test]
fn loop_invariant_multiplication_hoists_out_of_the_loop() {
    let mut symbols = table_with_main();
    symbols.define(ScopeId::new(1, 0), "n", Symbol::new(SymbolKind::Scalar, "V*1_0$n"));
    symbols.define(ScopeId::new(1, 0), "k", Symbol::new(SymbolKind::Scalar, "V*1_0$k"));
    symbols.define(ScopeId::new(1, 0), "s", Symbol::new(SymbolKind::Scalar, "V*1_0$s"));
    symbols.define(ScopeId::new(1, 0), "i", Symbol::new(SymbolKind::Scalar, "V*1_0$i"));

    let body = vec![
        Stmt::LocalDecl { usage_name: "V*1_0$s".to_string(), init: vec![Expr::IntLit(0)] },
        Stmt::LocalDecl { usage_name: "V*1_0$i".to_string(), init: vec![Expr::IntLit(0)] },
        Stmt::While {
            cond: Expr::Cmp {
                op: ast::CmpOp::Lt,
                lhs: Box::new(Expr::Ident("V*1_0$i".to_string())),
                rhs: Box::new(Expr::Ident("V*1_0$n".to_string())),
            },
            body: Box::new(Stmt::Block(vec![
                Stmt::Assign {
                    target: Expr::Ident("V*1_0$s".to_string()),
                    value: Expr::Binary {
                        op: ast::BinaryOp::Add,
                        lhs: Box::new(Expr::Ident("V*1_0$s".to_string())),
                        rhs: Box::new(Expr::Binary {
                            op: ast::BinaryOp::Mul,
                            lhs: Box::new(Expr::Ident("V*1_0$k".to_string())),
                            rhs: Box::new(Expr::Ident("V*1_0$k".to_string())),
                        }),
                    },
                },
                Stmt::Assign {
                    target: Expr::Ident("V*1_0$i".to_string()),
                    value: Expr::Binary {
                        op: ast::BinaryOp::Add,
                        lhs: Box::new(Expr::Ident("V*1_0$i".to_string())),
                        rhs: Box::new(Expr::IntLit(1)),
                    },
                },
            ])),
        },
        Stmt::Return(Some(Expr::Ident("V*1_0$s".to_string()))),
    ];
    let mut f = main_func(body);
    f.params = vec![
        FuncParam { usage_name: "V*1_0$n".to_string(), dimensions: vec![] },
        FuncParam { usage_name: "V*1_0$k".to_string(), dimensions: vec![] },
    ];
    let unit = CompUnit { global_usage_names: vec![], functions: vec![f] };

    let module = armc_ir::compile_to_module(&symbols, &unit, OptimizationLevel::O2);

    let count_mul = |module: &armc_ir::Module| {
        let f = module.function(module.function_order[0]);
        let mut n = 0;
        for &bid in &f.blocks {
            for &iid in &module.block(bid).instructions {
                if !module.is_valid(iid) {
                    continue;
                }
                if let ValueKind::Inst(inst) = &module.value(iid).kind {
                    if matches!(
                        inst.kind,
                        InstKind::Binary { op: armc_ir::BinaryOp::Mul, .. }
                    ) {
                        n += 1;
                    }
                }
            }
        }
        n
    };

    assert_eq!(count_mul(&module), 1, "k*k should be computed exactly once after LICM");
}
