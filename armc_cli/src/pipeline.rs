//! Stage-by-stage driver: load a pre-resolved compilation unit, build SSA
//! IR, optimize, allocate registers, and hand the result to the machine-IR
//! data model. Lexing/parsing/instruction-selection/text emission are out
//! of scope (spec.md §1) — this module exercises exactly the stages the
//! core crates implement, the way the original driver's
//! `buildIrModule -> optimizeIr -> buildMachineModule` chain does.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use armc_frontend::ast::CompUnit;
use armc_frontend::symbol::SymbolTable;
use armc_ir::{Module, OptimizationLevel};
use armc_machine::{InsKind, MachineBlock, MachineFunction, MachineIns, MachineModule};
use serde::{Deserialize, Serialize};

/// The JSON input contract this binary reads: a symbol table plus the
/// compilation unit it resolves against, exactly the pair the IR builder
/// expects (spec §3.3/§6.1). A real front end would produce this from
/// source text; here it is read directly since lexing/parsing is out of
/// scope.
#[derive(Debug, Serialize, Deserialize)]
pub struct CompileInput {
    pub symbols: SymbolTable,
    pub unit: CompUnit,
}

pub struct CompileOutput {
    pub ir_module: Module,
    pub machine_module: MachineModule,
}

pub fn load_input(path: &Path) -> Result<CompileInput> {
    let text = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {} as a compilation unit", path.display()))
}

/// Runs the full core pipeline and lowers to a machine-IR skeleton.
pub fn compile(input: &CompileInput, level: OptimizationLevel) -> CompileOutput {
    log::info!("[IR] building IR in SSA form...");
    let ir_module = armc_ir::compile_to_module(&input.symbols, &input.unit, level);
    log::info!("IR built successfully ({} functions)", ir_module.function_order.len());

    log::info!("[Machine IR] building machine IR...");
    let machine_module = lower_to_machine_stub(&ir_module);
    log::info!("machine IR built successfully ({} functions)", machine_module.functions.len());

    CompileOutput { ir_module, machine_module }
}

/// Instruction selection is out of scope for this repository (spec.md §1;
/// `armc_machine` fixes the data model only). This produces a function/
/// block skeleton with one `Comment` per block, enough to demonstrate the
/// handoff contract between the core and a real backend without inventing
/// an ARM instruction selector.
fn lower_to_machine_stub(module: &Module) -> MachineModule {
    let mut out = MachineModule::new();
    for func in module.functions() {
        let mut mfunc = MachineFunction::new(func.name.clone());
        for (index, &bid) in func.blocks.iter().enumerate() {
            let block = module.block(bid);
            let mut mblock = MachineBlock::new(index as u32);
            let comment = format!("{} ({} instructions)", bid, block.instructions.len());
            mblock.instructions.push(MachineIns::new(InsKind::Comment).with_comment(comment));
            mfunc.blocks.push(mblock);
        }
        out.functions.push(mfunc);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use armc_frontend::symbol::SymbolTable;

    fn empty_unit() -> CompileInput {
        CompileInput {
            symbols: SymbolTable::default(),
            unit: CompUnit { global_usage_names: Vec::new(), functions: Vec::new() },
        }
    }

    #[test]
    fn compiling_an_empty_unit_yields_an_empty_module() {
        let input = empty_unit();
        let out = compile(&input, OptimizationLevel::O2);
        assert!(out.ir_module.function_order.is_empty());
        assert!(out.machine_module.functions.is_empty());
    }

    #[test]
    fn round_trips_through_json() {
        let input = empty_unit();
        let json = serde_json::to_string(&input).unwrap();
        let parsed: CompileInput = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.unit.functions.len(), input.unit.functions.len());
    }
}
