//! SSA intermediate representation, optimizer, and graph-coloring register
//! allocator for the compiler core. Front-end lexing/parsing and ARM text
//! emission live in sibling crates; this crate owns everything between
//! `armc_frontend`'s AST and the machine-IR handoff: on-the-fly SSA
//! construction (spec §4.1), post-build normalization (§4.2), the
//! optimizer suite (§4.3), and liveness/register allocation/φ elimination
//! (§4.4).

pub mod abandon;
pub mod block;
pub mod builder;
pub mod error;
pub mod finalize;
pub mod function;
pub mod ids;
pub mod instruction;
pub mod liveness;
pub mod module;
pub mod normalize;
pub mod opt;
pub mod phi;
pub mod regalloc;
pub mod value;

pub use error::{CoreError, CoreResult};
pub use function::{FuncKind, Function};
pub use ids::{BlockId, FunctionId, RegisterId, ValueId};
pub use instruction::{BinaryOp, CallTarget, CmpOp, InstKind, Instruction, ResultRole, UnaryOp};
pub use module::Module;
pub use value::{Cell, ConstantData, GlobalData, ParameterData, UseSite, ValueKind, ValueNode};

use armc_frontend::ast::CompUnit;
use armc_frontend::symbol::SymbolTable;

/// The original pipeline's `OptimizeLevel` (`main.cpp`): gates whether the
/// optimizer suite (§4.3) runs at all. `O0` still performs φ elimination and
/// register allocation — those are not optional passes, just the unoptimized
/// baseline the original calls `fixRightValue` + `phiElimination` for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OptimizationLevel {
    O0,
    O1,
    O2,
}

impl Default for OptimizationLevel {
    fn default() -> Self {
        OptimizationLevel::O2
    }
}

/// Runs the full core pipeline over an already name-resolved compilation
/// unit: SSA construction, normalization, the optimizer suite (skipped at
/// `O0`), φ elimination, then per-function liveness/register allocation/
/// frame layout (spec §2). φ elimination runs for every function before
/// liveness or regalloc touches any of them — mirroring `end_optimize.cpp`'s
/// two separate loops (phi elimination for all functions, then weight/
/// regalloc/stack-size per function) — so the conflict graph sees the
/// PhiMove instructions liveness and register allocation both depend on.
/// The caller (the CLI's pipeline driver) owns emitting the resulting
/// `Module` to machine IR.
pub fn compile_to_module(symbols: &SymbolTable, unit: &CompUnit, level: OptimizationLevel) -> Module {
    let mut module = Module::new();
    builder::build_module(&mut module, symbols, unit);
    normalize::normalize(&mut module);

    if level != OptimizationLevel::O0 {
        opt::optimize_module(&mut module);
    }

    let fids = module.function_order.clone();

    for &fid in &fids {
        finalize::eliminate_phis(&mut module, fid);
    }

    for fid in fids {
        liveness::compute_variable_weights(&mut module, fid);
        liveness::propagate_liveness(&mut module, fid);
        regalloc::allocate_function(&mut module, fid);
        finalize::finalize_function(&mut module, fid);
    }

    module
}
