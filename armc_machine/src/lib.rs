//! Machine-IR data model (spec §6.2 output contract): the shape a real ARM
//! v7 backend would lower `armc_ir::Module` into, grounded on the original
//! implementation's `MachineModule`/`MachineFunc`/`MachineBB`/`MachineIns`
//! hierarchy (`machine_ir.h`). Final assembly-text emission is out of scope
//! (spec.md §1); this crate fixes the data model and a `Display`-based
//! textual stand-in so the pipeline has somewhere concrete to hand off to.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Mirrors `mit::InsType`, trimmed to the instruction shapes this pipeline
/// actually needs to describe (no shifted-operand addressing modes, no
/// `SMULL`/`MLS`/`MLA` — those are a real backend's concern).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InsKind {
    Add,
    Sub,
    Rsb,
    Mul,
    Div,
    And,
    Orr,
    Lsl,
    Lsr,
    Asr,
    Load,
    Store,
    Push,
    Pop,
    Mov,
    Cmp,
    Branch,
    BranchLink,
    Return,
    Global,
    Comment,
}

/// Mirrors `Cond` — the ARM condition-code suffix a `MachineIns` carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cond {
    Always,
    Eq,
    Ne,
    Lt,
    Le,
    Ge,
    Gt,
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Cond::Always => "",
            Cond::Eq => "eq",
            Cond::Ne => "ne",
            Cond::Lt => "lt",
            Cond::Le => "le",
            Cond::Ge => "ge",
            Cond::Gt => "gt",
        };
        write!(f, "{s}")
    }
}

/// Mirrors `State` — what kind of thing an `Operand`'s `value` names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperandState {
    GlobalInt,
    GlobalPointer,
    Virtual,
    Register,
    Immediate,
    Label,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operand {
    pub state: OperandState,
    pub value: String,
}

impl Operand {
    pub fn register(name: impl Into<String>) -> Self {
        Self { state: OperandState::Register, value: name.into() }
    }

    pub fn immediate(n: i32) -> Self {
        Self { state: OperandState::Immediate, value: n.to_string() }
    }

    pub fn label(name: impl Into<String>) -> Self {
        Self { state: OperandState::Label, value: name.into() }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state {
            OperandState::Immediate => write!(f, "#{}", self.value),
            _ => write!(f, "{}", self.value),
        }
    }
}

/// One machine instruction: an opcode, an optional condition suffix, and up
/// to three source operands plus a destination — enough to describe every
/// `InsKind` above without a separate subclass per arity (the original's
/// `BinaryIns`/`TriIns`/`MemoryIns`/... split, collapsed into one shape
/// since Rust doesn't need the virtual-dispatch hierarchy that served).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineIns {
    pub kind: InsKind,
    pub cond: Cond,
    pub operands: Vec<Operand>,
    pub dest: Option<Operand>,
    pub comment: Option<String>,
}

impl MachineIns {
    pub fn new(kind: InsKind) -> Self {
        Self { kind, cond: Cond::Always, operands: Vec::new(), dest: None, comment: None }
    }

    pub fn with_operands(mut self, operands: Vec<Operand>) -> Self {
        self.operands = operands;
        self
    }

    pub fn with_dest(mut self, dest: Operand) -> Self {
        self.dest = Some(dest);
        self
    }

    pub fn with_cond(mut self, cond: Cond) -> Self {
        self.cond = cond;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

fn mnemonic(kind: InsKind) -> &'static str {
    match kind {
        InsKind::Add => "add",
        InsKind::Sub => "sub",
        InsKind::Rsb => "rsb",
        InsKind::Mul => "mul",
        InsKind::Div => "sdiv",
        InsKind::And => "and",
        InsKind::Orr => "orr",
        InsKind::Lsl => "lsl",
        InsKind::Lsr => "lsr",
        InsKind::Asr => "asr",
        InsKind::Load => "ldr",
        InsKind::Store => "str",
        InsKind::Push => "push",
        InsKind::Pop => "pop",
        InsKind::Mov => "mov",
        InsKind::Cmp => "cmp",
        InsKind::Branch => "b",
        InsKind::BranchLink => "bl",
        InsKind::Return => "bx",
        InsKind::Global => ".word",
        InsKind::Comment => "@",
    }
}

impl fmt::Display for MachineIns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind == InsKind::Comment {
            return write!(f, "  @ {}", self.comment.as_deref().unwrap_or_default());
        }
        write!(f, "  {}{}", mnemonic(self.kind), self.cond)?;
        let mut parts: Vec<String> = Vec::new();
        if let Some(dest) = &self.dest {
            parts.push(dest.to_string());
        }
        parts.extend(self.operands.iter().map(|o| o.to_string()));
        if !parts.is_empty() {
            write!(f, " {}", parts.join(", "))?;
        }
        if let Some(comment) = &self.comment {
            write!(f, "  @ {comment}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineBlock {
    pub index: u32,
    pub instructions: Vec<MachineIns>,
}

impl MachineBlock {
    pub fn new(index: u32) -> Self {
        Self { index, instructions: Vec::new() }
    }

    pub fn label(&self, function: &str) -> String {
        format!(".L{function}_{}", self.index)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineFunction {
    pub name: String,
    pub params: Vec<String>,
    pub blocks: Vec<MachineBlock>,
    /// Byte offset of each named stack slot from the frame pointer, mirroring
    /// the original's `var2offset`.
    pub var_offsets: indexmap::IndexMap<String, i32>,
    pub stack_size: u32,
}

impl MachineFunction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            blocks: Vec::new(),
            var_offsets: indexmap::IndexMap::new(),
            stack_size: 0,
        }
    }
}

impl fmt::Display for MachineFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.name)?;
        writeln!(f, "  @ stack_size={}", self.stack_size)?;
        for block in &self.blocks {
            writeln!(f, "{}:", block.label(&self.name))?;
            for ins in &block.instructions {
                writeln!(f, "{ins}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalSlot {
    pub name: String,
    pub size_bytes: usize,
    pub init_values: Vec<(usize, i32)>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MachineModule {
    pub functions: Vec<MachineFunction>,
    pub global_variables: Vec<GlobalSlot>,
    pub global_constants: Vec<GlobalSlot>,
}

impl MachineModule {
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Display for MachineModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  .data")?;
        for g in &self.global_variables {
            writeln!(f, "{}: @ {} bytes", g.name, g.size_bytes)?;
        }
        writeln!(f, "  .section .rodata")?;
        for g in &self.global_constants {
            writeln!(f, "{}: @ {} bytes", g.name, g.size_bytes)?;
        }
        writeln!(f, "  .text")?;
        for func in &self.functions {
            write!(f, "{func}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_instruction_renders_dest_first() {
        let ins = MachineIns::new(InsKind::Add)
            .with_dest(Operand::register("r0"))
            .with_operands(vec![Operand::register("r1"), Operand::immediate(4)]);
        assert_eq!(ins.to_string(), "  add r0, r1, #4");
    }

    #[test]
    fn conditional_branch_renders_suffix() {
        let ins = MachineIns::new(InsKind::Branch).with_cond(Cond::Lt).with_operands(vec![Operand::label(".L0_2")]);
        assert_eq!(ins.to_string(), "  blt .L0_2");
    }

    #[test]
    fn module_display_separates_sections() {
        let mut module = MachineModule::new();
        let mut func = MachineFunction::new("main");
        let mut block = MachineBlock::new(0);
        block.instructions.push(MachineIns::new(InsKind::Return).with_operands(vec![Operand::register("lr")]));
        func.blocks.push(block);
        module.functions.push(func);
        let rendered = module.to_string();
        assert!(rendered.contains("main:"));
        assert!(rendered.contains("bx lr"));
    }
}
