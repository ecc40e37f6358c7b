//! AST → SSA IR (spec §4.1): on-the-fly φ construction per Braun/Hack, plus
//! statement/expression lowering. The core presumes a well-formed AST (§7):
//! lookups into the symbol table here use `expect` rather than `Result`,
//! since failure means the front end handed us an inconsistent tree, not a
//! condition the optimizer pipeline can recover from.

use crate::block::MAX_LOOP_DEPTH;
use crate::function::FuncKind as IrFuncKind;
use crate::ids::{BlockId, FunctionId, ValueId};
use crate::instruction::{BinaryOp, CallTarget, CmpOp, InstKind, ResultRole, UnaryOp};
use crate::module::Module;
use crate::value::{Cell, ConstantData, GlobalData, ParameterData, UseSite, ValueKind};
use armc_common::Builtin;
use armc_frontend::ast::{self, CompUnit, Expr, FuncDef, FuncKind as AstFuncKind, Stmt};
use armc_frontend::symbol::{Initializer, Symbol, SymbolKind, SymbolTable};
use std::collections::HashMap;

/// Materializes every global/const declaration and function body of `unit`
/// into `module`. Functions may call each other in any order; function ids
/// are allocated up front so forward references resolve.
pub fn build_module(module: &mut Module, symbols: &SymbolTable, unit: &CompUnit) {
    let by_usage_name = index_by_usage_name(symbols);
    let mut global_values: HashMap<String, ValueId> = HashMap::new();

    for name in &unit.global_usage_names {
        let sym = by_usage_name
            .get(name.as_str())
            .unwrap_or_else(|| panic!("global `{name}` missing from symbol table"));
        materialize_global(module, name, sym, &mut global_values);
    }

    let mut functions_by_name: HashMap<String, FunctionId> = HashMap::new();
    for f in &unit.functions {
        let kind = match f.kind {
            AstFuncKind::Void => IrFuncKind::Void,
            AstFuncKind::Int => IrFuncKind::Int,
        };
        // Entry block is created per-function below; the placeholder is
        // overwritten by `set_function_entry` before anything reads it.
        let placeholder = BlockId(0);
        let fid = module.new_function(f.usage_name.clone(), kind, placeholder);
        functions_by_name.insert(f.usage_name.clone(), fid);
    }

    for f in &unit.functions {
        let fid = functions_by_name[&f.usage_name];
        build_function(module, &by_usage_name, &global_values, &functions_by_name, fid, f);
    }
}

fn index_by_usage_name(symbols: &SymbolTable) -> HashMap<&str, &Symbol> {
    let mut map = HashMap::new();
    for scope_map in symbols.scopes.values() {
        for sym in scope_map.values() {
            map.insert(sym.usage_name.as_str(), sym);
        }
    }
    map
}

fn materialize_global(
    module: &mut Module,
    name: &str,
    sym: &Symbol,
    global_values: &mut HashMap<String, ValueId>,
) {
    match sym.kind {
        // Const scalars never get a module-level Value; every reference is
        // replaced by the interned literal at the point of use.
        SymbolKind::ConstScalar => {}
        SymbolKind::ConstArray => {
            let total = sym.total_elements();
            let values = sym
                .initializer
                .as_ref()
                .map(|init| init.flatten(total))
                .unwrap_or_default();
            let data = ConstantData {
                name: name.to_string(),
                dimensions: sym.dimensions.clone(),
                size: total,
                values,
            };
            let id = module.new_constant(data);
            global_values.insert(name.to_string(), id);
        }
        SymbolKind::Scalar | SymbolKind::Array => {
            let total = sym.total_elements();
            let init_values = sym
                .initializer
                .as_ref()
                .map(|init| init.flatten(total))
                .unwrap_or_default();
            let data = GlobalData {
                name: name.to_string(),
                dimensions: sym.dimensions.clone(),
                size: total,
                init_values,
                cell: Cell::Int,
            };
            let id = module.new_global(data);
            global_values.insert(name.to_string(), id);
        }
        SymbolKind::VoidFunction | SymbolKind::IntFunction => {}
    }
}

struct Builder<'a> {
    module: &'a mut Module,
    by_usage_name: &'a HashMap<&'a str, &'a Symbol>,
    global_values: &'a HashMap<String, ValueId>,
    functions_by_name: &'a HashMap<String, FunctionId>,
    function: FunctionId,
    current: BlockId,
    after_jump: bool,
    loop_depth: u32,
    break_targets: Vec<BlockId>,
    continue_targets: Vec<BlockId>,
}

fn build_function(
    module: &mut Module,
    by_usage_name: &HashMap<&str, &Symbol>,
    global_values: &HashMap<String, ValueId>,
    functions_by_name: &HashMap<String, FunctionId>,
    fid: FunctionId,
    f: &FuncDef,
) {
    let entry = module.new_block(fid, 1, true);
    module.function_mut(fid).entry = entry;
    module.function_mut(fid).blocks = vec![entry];

    let mut b = Builder {
        module,
        by_usage_name,
        global_values,
        functions_by_name,
        function: fid,
        current: entry,
        after_jump: false,
        loop_depth: 1,
        break_targets: Vec::new(),
        continue_targets: Vec::new(),
    };

    for p in &f.params {
        let cell = if p.dimensions.is_empty() { Cell::Int } else { Cell::Pointer };
        let data = ParameterData { name: p.usage_name.clone(), cell, dimensions: p.dimensions.clone() };
        let pid = b.module.new_parameter(data);
        b.module.function_mut(fid).params.push(pid);
        b.write_variable(entry, &p.usage_name, pid);
    }

    b.lower_stmts(&f.body);

    if !b.after_jump {
        // Front end guarantees every path returns; this only covers a
        // fall-off-the-end body defensively.
        let value = match f.kind {
            AstFuncKind::Void => None,
            AstFuncKind::Int => Some(b.module.intern_number(0)),
        };
        b.emit(InstKind::Return { value }, ResultRole::NoResult);
    }
}

impl<'a> Builder<'a> {
    fn new_block(&mut self) -> BlockId {
        self.module.new_block(self.function, self.loop_depth, true)
    }

    fn register_block(&mut self, block: BlockId) {
        self.module.function_mut(self.function).blocks.push(block);
    }

    fn emit(&mut self, kind: InstKind, role: ResultRole) -> ValueId {
        self.emit_in(self.current, kind, role)
    }

    fn emit_in(&mut self, block: BlockId, kind: InstKind, role: ResultRole) -> ValueId {
        let id = self.module.create_instruction(kind, block, role);
        self.module.push_instruction_to_block(block, id);
        id
    }

    fn terminate_with_jump(&mut self, from: BlockId, target: BlockId) {
        self.emit_in(from, InstKind::Jump { target }, ResultRole::NoResult);
        self.module.add_edge(from, target);
    }

    fn emit_branch(&mut self, cond: ValueId, if_true: BlockId, if_false: BlockId) {
        let from = self.current;
        self.emit_in(from, InstKind::Branch { cond, if_true, if_false }, ResultRole::NoResult);
        self.module.add_edge(from, if_true);
        self.module.add_edge(from, if_false);
        self.after_jump = true;
    }

    // --- Braun/Hack SSA construction (spec §4.1.1) ---

    fn write_variable(&mut self, block: BlockId, name: &str, value: ValueId) {
        self.module.block_mut(block).local_var_ssa_map.insert(name.to_string(), value);
        if self.is_phi(value) {
            self.module.add_use(value, UseSite::Block(block));
        }
    }

    fn read_variable(&mut self, block: BlockId, name: &str) -> ValueId {
        if let Some(v) = self.module.block(block).local_var_ssa_map.get(name).copied() {
            return v;
        }
        self.read_variable_recursive(block, name)
    }

    fn read_variable_recursive(&mut self, block: BlockId, name: &str) -> ValueId {
        if !self.module.block(block).sealed {
            let phi = self.new_empty_phi(block, name);
            self.module.block_mut(block).incomplete_phis.insert(name.to_string(), phi);
            self.module.block_mut(block).local_var_ssa_map.insert(name.to_string(), phi);
            return phi;
        }
        let preds: Vec<BlockId> = self.module.block(block).predecessors.iter().copied().collect();
        if preds.len() == 1 {
            let value = self.read_variable(preds[0], name);
            self.module.block_mut(block).local_var_ssa_map.insert(name.to_string(), value);
            return value;
        }
        let phi = self.new_empty_phi(block, name);
        self.module.block_mut(block).local_var_ssa_map.insert(name.to_string(), phi);
        let result = self.add_phi_operands(block, name, phi);
        self.module.block_mut(block).local_var_ssa_map.insert(name.to_string(), result);
        result
    }

    fn new_empty_phi(&mut self, block: BlockId, name: &str) -> ValueId {
        let kind = InstKind::Phi { var_name: name.to_string(), operands: indexmap::IndexMap::new() };
        let id = self.emit_in(block, kind, ResultRole::LValue(name.to_string()));
        self.module.block_mut(block).phis.insert(id);
        id
    }

    fn add_phi_operands(&mut self, block: BlockId, name: &str, phi: ValueId) -> ValueId {
        let preds: Vec<BlockId> = self.module.block(block).predecessors.iter().copied().collect();
        for p in preds {
            let v = self.read_variable(p, name);
            self.module.add_use(v, UseSite::Value(phi));
            if let ValueKind::Inst(inst) = &mut self.module.value_mut(phi).kind {
                if let InstKind::Phi { operands, .. } = &mut inst.kind {
                    operands.insert(p, v);
                }
            }
        }
        self.remove_trivial_phi(phi)
    }

    fn is_phi(&self, id: ValueId) -> bool {
        crate::phi::is_phi(self.module, id)
    }

    fn remove_trivial_phi(&mut self, phi: ValueId) -> ValueId {
        crate::phi::remove_trivial_phi(self.module, phi)
    }

    fn seal_block(&mut self, block: BlockId) {
        let pending: Vec<(String, ValueId)> = self
            .module
            .block(block)
            .incomplete_phis
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        for (name, phi) in pending {
            self.add_phi_operands(block, &name, phi);
        }
        self.module.block_mut(block).incomplete_phis.clear();
        self.module.block_mut(block).sealed = true;
    }

    // --- name resolution ---

    fn symbol(&self, name: &str) -> &'a Symbol {
        self.by_usage_name
            .get(name)
            .unwrap_or_else(|| panic!("usage name `{name}` missing from symbol table"))
    }

    /// Resolves a bare identifier to the value it denotes: for a const
    /// scalar, the interned literal; for a global scalar, a Load against
    /// its cell; for an array (local or global) or a pointer parameter, the
    /// address identity itself (arrays decay on bare reference); for a
    /// local/parameter scalar, its current SSA value.
    fn lower_ident(&mut self, name: &str) -> ValueId {
        let sym = self.symbol(name);
        if sym.kind == SymbolKind::ConstScalar {
            let v = match sym.initializer.as_ref() {
                Some(Initializer::Scalar(v)) => *v,
                _ => 0,
            };
            return self.module.intern_number(v);
        }
        if let Some(&identity) = self.global_values.get(name) {
            if sym.kind.is_array() {
                return identity;
            }
            let zero = self.module.intern_number(0);
            return self.emit(InstKind::Load { address: identity, offset: zero }, ResultRole::RValue);
        }
        self.read_variable(self.current, name)
    }

    fn base_name(expr: &Expr) -> &str {
        match expr {
            Expr::Ident(name) => name.as_str(),
            _ => panic!("array index base is always a bare identifier in this AST contract"),
        }
    }

    /// Spec §4.1.4: element offset from nested index expressions, plus
    /// whether the subscript is full (`k == n`) or partial (pointer decay).
    fn lower_index_parts(&mut self, base_name: &str, indices: &[Expr]) -> (ValueId, ValueId, bool) {
        let dims = self.symbol(base_name).dimensions.clone();
        let address = self.lower_ident(base_name);
        let k = indices.len();
        let n = dims.len();

        let mut offset: Option<ValueId> = None;
        for (j, idx_expr) in indices.iter().enumerate() {
            let stride: usize = dims[(j + 1)..n].iter().product();
            let idx_val = self.lower_expr(idx_expr);
            let stride_val = self.module.intern_number(stride as i32);
            let term = self.emit(
                InstKind::Binary { op: BinaryOp::Mul, lhs: idx_val, rhs: stride_val },
                ResultRole::RValue,
            );
            offset = Some(match offset {
                None => term,
                Some(prev) => {
                    self.emit(InstKind::Binary { op: BinaryOp::Add, lhs: prev, rhs: term }, ResultRole::RValue)
                }
            });
        }
        let offset = offset.unwrap_or_else(|| self.module.intern_number(0));

        if k == n {
            (address, offset, true)
        } else {
            let word = self.module.intern_number(4);
            let byte_offset =
                self.emit(InstKind::Binary { op: BinaryOp::Mul, lhs: offset, rhs: word }, ResultRole::RValue);
            let ptr = self.emit(
                InstKind::Binary { op: BinaryOp::Add, lhs: address, rhs: byte_offset },
                ResultRole::RValue,
            );
            (ptr, byte_offset, false)
        }
    }

    // --- expressions ---

    fn lower_expr(&mut self, expr: &Expr) -> ValueId {
        match expr {
            Expr::IntLit(n) => self.module.intern_number(*n),
            Expr::StrLit(s) => self.module.intern_string(s.clone()),
            Expr::Ident(name) => self.lower_ident(name),
            Expr::Index { base, indices } => {
                let base_name = Self::base_name(base).to_string();
                let (address, offset, full) = self.lower_index_parts(&base_name, indices);
                if full {
                    self.emit(InstKind::Load { address, offset }, ResultRole::RValue)
                } else {
                    address // already the decayed pointer (Binary add)
                }
            }
            Expr::Unary { op, operand } => {
                let value = self.lower_expr(operand);
                let op = match op {
                    ast::UnaryOp::Plus => UnaryOp::Plus,
                    ast::UnaryOp::Neg => UnaryOp::Neg,
                    ast::UnaryOp::Not => UnaryOp::Not,
                };
                self.emit(InstKind::Unary { op, value }, ResultRole::RValue)
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs_v = self.lower_expr(lhs);
                let rhs_v = self.lower_expr(rhs);
                let op = match op {
                    ast::BinaryOp::Add => BinaryOp::Add,
                    ast::BinaryOp::Sub => BinaryOp::Sub,
                    ast::BinaryOp::Mul => BinaryOp::Mul,
                    ast::BinaryOp::Div => BinaryOp::Div,
                    ast::BinaryOp::Mod => BinaryOp::Mod,
                    ast::BinaryOp::And => BinaryOp::And,
                    ast::BinaryOp::Or => BinaryOp::Or,
                };
                self.emit(InstKind::Binary { op, lhs: lhs_v, rhs: rhs_v }, ResultRole::RValue)
            }
            Expr::Cmp { op, lhs, rhs } => {
                let lhs_v = self.lower_expr(lhs);
                let rhs_v = self.lower_expr(rhs);
                let op = match op {
                    ast::CmpOp::Eq => CmpOp::Eq,
                    ast::CmpOp::Ne => CmpOp::Ne,
                    ast::CmpOp::Lt => CmpOp::Lt,
                    ast::CmpOp::Gt => CmpOp::Gt,
                    ast::CmpOp::Le => CmpOp::Le,
                    ast::CmpOp::Ge => CmpOp::Ge,
                };
                self.emit(InstKind::Cmp { op, lhs: lhs_v, rhs: rhs_v }, ResultRole::RValue)
            }
            Expr::Call { callee, args } => self.lower_call(callee, args),
        }
    }

    fn lower_call(&mut self, callee: &str, args: &[Expr]) -> ValueId {
        if let Some(builtin) = Builtin::from_name(callee) {
            let arg_values: Vec<ValueId> = if builtin.needs_line_marker() {
                // Timing built-ins take a literal-1 marker rather than the
                // source arguments (spec §6.3); the register convention
                // itself belongs to machine-IR lowering.
                vec![self.module.intern_number(1)]
            } else {
                args.iter().map(|a| self.lower_expr(a)).collect()
            };
            let role = if builtin.returns_int() { ResultRole::RValue } else { ResultRole::NoResult };
            return self.emit(InstKind::Invoke { target: CallTarget::Builtin(builtin), args: arg_values }, role);
        }

        let fid = *self
            .functions_by_name
            .get(callee)
            .unwrap_or_else(|| panic!("call to unknown function `{callee}`"));
        let arg_values: Vec<ValueId> = args.iter().map(|a| self.lower_expr(a)).collect();
        let role = match self.module.function(fid).return_kind {
            IrFuncKind::Int => ResultRole::RValue,
            IrFuncKind::Void => ResultRole::NoResult,
        };
        self.emit(InstKind::Invoke { target: CallTarget::Function(fid), args: arg_values }, role)
    }

    // --- conditions (spec §4.1.3) ---

    fn lower_cond(&mut self, expr: &Expr, true_blk: BlockId, false_blk: BlockId) {
        match expr {
            Expr::Binary { op: ast::BinaryOp::And, lhs, rhs } => {
                let mid = self.new_block();
                self.register_block(mid);
                self.lower_cond(lhs, mid, false_blk);
                self.current = mid;
                self.after_jump = false;
                self.lower_cond(rhs, true_blk, false_blk);
            }
            Expr::Binary { op: ast::BinaryOp::Or, lhs, rhs } => {
                let mid = self.new_block();
                self.register_block(mid);
                self.lower_cond(lhs, true_blk, mid);
                self.current = mid;
                self.after_jump = false;
                self.lower_cond(rhs, true_blk, false_blk);
            }
            _ => {
                let val = self.lower_expr(expr);
                self.emit_branch(val, true_blk, false_blk);
            }
        }
    }

    // --- statements (spec §4.1.2) ---

    fn lower_stmts(&mut self, stmts: &[Stmt]) {
        for s in stmts {
            if self.after_jump {
                break;
            }
            self.lower_stmt(s);
        }
    }

    fn lower_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Empty => {}
            Stmt::ExprStmt(e) => {
                self.lower_expr(e);
            }
            Stmt::Assign { target, value } => {
                let val = self.lower_expr(value);
                self.lower_assign(target, val);
            }
            Stmt::Block(inner) => self.lower_stmts(inner),
            Stmt::If { cond, then_branch, else_branch: None } => {
                self.lower_if(cond, then_branch);
            }
            Stmt::If { cond, then_branch, else_branch: Some(else_branch) } => {
                self.lower_if_else(cond, then_branch, else_branch);
            }
            Stmt::While { cond, body } => self.lower_while(cond, body),
            Stmt::Break => {
                let target = *self.break_targets.last().expect("break outside a loop");
                self.terminate_with_jump(self.current, target);
                self.after_jump = true;
            }
            Stmt::Continue => {
                let target = *self.continue_targets.last().expect("continue outside a loop");
                self.terminate_with_jump(self.current, target);
                self.after_jump = true;
            }
            Stmt::Return(e) => {
                let value = e.as_ref().map(|e| self.lower_expr(e));
                self.emit(InstKind::Return { value }, ResultRole::NoResult);
                self.after_jump = true;
            }
            Stmt::LocalDecl { usage_name, init } => self.lower_local_decl(usage_name, init),
        }
    }

    fn lower_assign(&mut self, target: &Expr, val: ValueId) {
        match target {
            Expr::Ident(name) => {
                let sym = self.symbol(name);
                if let Some(&identity) = self.global_values.get(name.as_str()) {
                    debug_assert!(!sym.kind.is_const(), "front end rejects assignment to a const");
                    let zero = self.module.intern_number(0);
                    self.emit(InstKind::Store { value: val, address: identity, offset: zero }, ResultRole::NoResult);
                } else {
                    self.write_variable(self.current, name, val);
                }
            }
            Expr::Index { base, indices } => {
                let base_name = Self::base_name(base).to_string();
                let (address, offset, full) = self.lower_index_parts(&base_name, indices);
                debug_assert!(full, "assignment target is always a full subscript");
                self.emit(InstKind::Store { value: val, address, offset }, ResultRole::NoResult);
            }
            _ => panic!("assignment target is always an identifier or index expression"),
        }
    }

    fn lower_local_decl(&mut self, usage_name: &str, init: &[Expr]) {
        let sym = self.symbol(usage_name);
        if sym.kind.is_array() {
            let total = sym.total_elements();
            let name = usage_name.to_string();
            let alloc = self.emit(
                InstKind::Alloc { name: name.clone(), bytes: total * 4, units: total },
                ResultRole::NoResult,
            );
            self.write_variable(self.current, usage_name, alloc);
            for (idx, expr) in init.iter().enumerate() {
                if idx >= total {
                    break;
                }
                let val = self.lower_expr(expr);
                let offset = self.module.intern_number(idx as i32);
                self.emit(InstKind::Store { value: val, address: alloc, offset }, ResultRole::NoResult);
            }
        } else if let Some(e) = init.first() {
            let val = self.lower_expr(e);
            self.write_variable(self.current, usage_name, val);
        }
    }

    fn lower_if(&mut self, cond: &Expr, then_branch: &Stmt) {
        let if_stmt = self.new_block();
        let end_if = self.new_block();
        self.register_block(if_stmt);
        self.register_block(end_if);
        self.lower_cond(cond, if_stmt, end_if);

        self.current = if_stmt;
        self.after_jump = false;
        self.lower_stmt(then_branch);
        if !self.after_jump {
            self.terminate_with_jump(self.current, end_if);
        }

        self.current = end_if;
        self.after_jump = false;
    }

    fn lower_if_else(&mut self, cond: &Expr, then_branch: &Stmt, else_branch: &Stmt) {
        let then_blk = self.new_block();
        let else_blk = self.new_block();
        self.register_block(then_blk);
        self.register_block(else_blk);
        self.lower_cond(cond, then_blk, else_blk);

        self.current = then_blk;
        self.after_jump = false;
        self.lower_stmt(then_branch);
        let then_jumped = self.after_jump;
        let then_tail = self.current;

        self.current = else_blk;
        self.after_jump = false;
        self.lower_stmt(else_branch);
        let else_jumped = self.after_jump;
        let else_tail = self.current;

        if !then_jumped || !else_jumped {
            let end_if = self.new_block();
            self.register_block(end_if);
            if !then_jumped {
                self.terminate_with_jump(then_tail, end_if);
            }
            if !else_jumped {
                self.terminate_with_jump(else_tail, end_if);
            }
            self.current = end_if;
            self.after_jump = false;
        } else {
            self.current = else_tail;
            self.after_jump = true;
        }
    }

    fn lower_while(&mut self, cond: &Expr, body: &Stmt) {
        let entry = self.current;
        let body_depth = (self.loop_depth + 1).min(MAX_LOOP_DEPTH);

        let while_body = self.module.new_block(self.function, body_depth, false);
        let while_judge = self.module.new_block(self.function, body_depth, true);
        let while_end = self.new_block();
        self.register_block(while_body);
        self.register_block(while_judge);
        self.register_block(while_end);

        self.current = entry;
        self.lower_cond(cond, while_body, while_end);

        self.break_targets.push(while_end);
        self.continue_targets.push(while_judge);
        self.loop_depth = body_depth;

        self.current = while_body;
        self.after_jump = false;
        self.lower_stmt(body);
        if !self.after_jump {
            self.terminate_with_jump(self.current, while_judge);
        }

        self.break_targets.pop();
        self.continue_targets.pop();

        if !self.module.block(while_judge).predecessors.is_empty() {
            self.current = while_judge;
            self.after_jump = false;
            // Independent second lowering of the same source condition:
            // shares no IR nodes with the entry-test lowering (spec §4.1.2).
            // Still executes inside the loop, so any `&&`/`||` mid-blocks
            // `lower_cond` synthesizes here must get the loop's depth, not
            // the outer one.
            self.loop_depth = body_depth;
            self.lower_cond(cond, while_body, while_end);
        }

        self.loop_depth = body_depth - 1;
        self.seal_block(while_body);

        self.current = while_end;
        self.after_jump = false;
    }
}
