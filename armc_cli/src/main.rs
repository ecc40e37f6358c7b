//! Driver binary for the ARM v7 SSA optimizing compiler core.

use std::path::PathBuf;

use anyhow::Result;
use armc_ir::OptimizationLevel;
use clap::{Parser, Subcommand};

mod pipeline;

/// ARM v7 SSA optimizing compiler core
#[derive(Parser)]
#[command(name = "armc")]
#[command(about = "ARM v7 SSA optimizing compiler core", long_about = None)]
struct Cli {
    /// Sets the level of verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build SSA IR, optimize, and allocate registers for a compilation
    /// unit given as JSON (a `SymbolTable` + `CompUnit` pair).
    Compile {
        /// Path to the JSON-encoded compilation unit
        input: PathBuf,

        /// Optimization level, mirroring the original `-O<n>` flag
        #[arg(short = 'O', long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(0..=2))]
        opt_level: u8,

        /// Print the optimized IR module (spec §6.2's Display contract)
        #[arg(long)]
        dump_ir: bool,

        /// Print the machine-IR skeleton the core hands off to a backend
        #[arg(long)]
        dump_machine: bool,
    },
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.verbose {
        0 => log::set_max_level(log::LevelFilter::Info),
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    match cli.command {
        Commands::Compile { input, opt_level, dump_ir, dump_machine } => {
            let level = match opt_level {
                0 => OptimizationLevel::O0,
                1 => OptimizationLevel::O1,
                _ => OptimizationLevel::O2,
            };

            let compile_input = pipeline::load_input(&input)?;
            let output = pipeline::compile(&compile_input, level);

            if dump_ir {
                println!("{}", output.ir_module);
            }
            if dump_machine {
                println!("{}", output.machine_module);
            }
            if !dump_ir && !dump_machine {
                println!(
                    "compiled {} function(s) at -O{}",
                    output.ir_module.function_order.len(),
                    opt_level
                );
            }

            Ok(())
        }
    }
}
