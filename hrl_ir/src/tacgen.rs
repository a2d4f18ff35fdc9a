//! TAC generation: lowering the symbol-annotated AST to linear
//! three-address code, then partitioning it into basic blocks.
//!
//! Each subroutine is emitted into an append-only instruction buffer
//! with a label ↔ instruction-index bimap on the side. Indices are
//! stable because the buffer only grows during generation, which is
//! what keeps the bimap usable for the block split afterwards.

use crate::{BasicBlock, Instruction, IrOp, Operand, Program, ProgramMetadata, Subroutine};
use hrl_common::{HrBox, HrlError, HrlResult, GLOBAL_SCOPE_ID, START_SUBROUTINE};
use hrl_parser::{
    BinaryOp, Block, CompilationUnit, Expr, ExprKind, Stmt, StmtKind, SubroutineDef,
    SubroutineKind, UnaryOp, VariableDeclaration,
};
use hrl_semanalyzer::{SemanticInfo, SymbolId, INTRINSIC_INBOX, INTRINSIC_OUTBOX};
use log::debug;
use std::collections::{BTreeMap, HashMap};

/// Label ↔ instruction-index mapping for one subroutine's linear buffer.
/// Both directions stay in sync; the reverse direction drives block
/// splitting.
#[derive(Debug, Default)]
struct LabelBimap {
    label_to_index: HashMap<String, usize>,
    index_to_label: HashMap<usize, String>,
}

impl LabelBimap {
    fn insert(&mut self, label: String, index: usize) -> HrlResult<()> {
        if self.label_to_index.contains_key(&label) {
            return Err(HrlError::ir_construction(format!("label '{}' emitted twice", label)));
        }
        if let Some(existing) = self.index_to_label.get(&index) {
            return Err(HrlError::ir_construction(format!(
                "labels '{}' and '{}' attached to the same instruction",
                existing, label
            )));
        }
        self.index_to_label.insert(index, label.clone());
        self.label_to_index.insert(label, index);
        Ok(())
    }

    fn label_at(&self, index: usize) -> Option<&str> {
        self.index_to_label.get(&index).map(String::as_str)
    }
}

struct GeneratedSubroutine {
    name: String,
    has_param: bool,
    has_return: bool,
    instructions: Vec<Instruction>,
    labels: LabelBimap,
}

/// TAC generator over one compilation unit
pub struct TacGen<'a> {
    info: &'a SemanticInfo,
    // Per-subroutine numbering, reset on entry.
    next_var_id: i32,
    next_label_id: u32,
    current_name: String,
    current: Vec<Instruction>,
    labels: LabelBimap,
    // Symbol → operand, shared across the unit so globals stay visible.
    symbol_operands: HashMap<SymbolId, Operand>,
    loop_break_labels: Vec<String>,
    loop_continue_labels: Vec<String>,
    in_global_var_decl: bool,
    floor_inits: BTreeMap<i32, HrBox>,
    generated: Vec<GeneratedSubroutine>,
}

impl<'a> TacGen<'a> {
    pub fn new(info: &'a SemanticInfo) -> Self {
        Self {
            info,
            next_var_id: 0,
            next_label_id: 0,
            current_name: String::new(),
            current: Vec::new(),
            labels: LabelBimap::default(),
            symbol_operands: HashMap::new(),
            loop_break_labels: Vec::new(),
            loop_continue_labels: Vec::new(),
            in_global_var_decl: false,
            floor_inits: BTreeMap::new(),
            generated: Vec::new(),
        }
    }

    /// Lower the unit and build the block-partitioned program.
    pub fn run(mut self, unit: &CompilationUnit) -> HrlResult<Program> {
        self.visit_compilation_unit(unit)?;

        let mut subroutines = Vec::with_capacity(self.generated.len());
        for generated in self.generated {
            let blocks = split_into_basic_blocks(
                &generated.name,
                generated.instructions,
                &generated.labels,
            );
            subroutines.push(Subroutine::new(
                generated.name,
                generated.has_param,
                generated.has_return,
                blocks,
            ));
        }

        let floor_max = unit.floor_max.unwrap_or(crate::DEFAULT_FLOOR_MAX);
        let metadata = ProgramMetadata::new(floor_max, self.floor_inits);
        Ok(Program::new(subroutines, metadata))
    }

    fn visit_compilation_unit(&mut self, unit: &CompilationUnit) -> HrlResult<()> {
        self.begin_subroutine(GLOBAL_SCOPE_ID);

        for init in &unit.floor_inits {
            let value = if init.is_char {
                HrBox::char(char::from_u32(init.value as u32).unwrap_or('\0'))
            } else {
                HrBox::int(init.value)
            };
            self.floor_inits.insert(init.index, value);
        }

        self.in_global_var_decl = true;
        for decl in &unit.globals {
            self.visit_variable_declaration(decl)?;
        }
        self.in_global_var_decl = false;

        // The unit's only executable job after initialization: enter the
        // user program.
        let result = self.take_var();
        self.emit(Instruction::call(
            result,
            Operand::Label(START_SUBROUTINE.to_string()),
            None,
        )?);

        self.finish_subroutine(false, false);

        for sub in &unit.subroutines {
            self.visit_subroutine(sub)?;
        }

        Ok(())
    }

    fn visit_subroutine(&mut self, sub: &SubroutineDef) -> HrlResult<()> {
        self.begin_subroutine(&sub.name.value);

        let param = self.take_var();
        let enter_index = self.emit(Instruction::enter(param.clone())?.with_origin(sub.span));
        if let Some(&param_symbol) = self.info.param_symbols.get(&sub.id) {
            self.symbol_operands.insert(param_symbol, param);
        }

        self.visit_block(&sub.body)?;

        // Unconditional tail; unreachable when every path returns, and
        // dead-block elimination cleans that up.
        let end_index = if sub.kind == SubroutineKind::Function {
            let zero = self.take_var();
            let index = self.emit(Instruction::loadi(zero.clone(), 0)?.with_origin(sub.span));
            self.emit(Instruction::ret(Some(zero))?.with_origin(sub.span));
            index
        } else {
            self.emit(Instruction::ret(None)?.with_origin(sub.span))
        };

        self.labels.insert(sub.name.value.clone(), enter_index)?;
        self.labels.insert(format!("{}.end", sub.name.value), end_index)?;

        self.finish_subroutine(sub.parameter.is_some(), sub.kind == SubroutineKind::Function);
        Ok(())
    }

    fn visit_block(&mut self, block: &Block) -> HrlResult<()> {
        for stmt in &block.statements {
            self.visit_stmt(stmt)?;
        }
        Ok(())
    }

    fn visit_stmt(&mut self, stmt: &Stmt) -> HrlResult<()> {
        match &stmt.kind {
            StmtKind::Let(decl) => self.visit_variable_declaration(decl),
            StmtKind::If { condition, then_branch, else_branch } => {
                self.visit_if(stmt, condition, then_branch, else_branch.as_deref())
            }
            StmtKind::While { condition, body } => self.visit_while(stmt, condition, body),
            StmtKind::For { init, condition, update, body } => {
                self.visit_for(stmt, init.as_deref(), condition.as_ref(), update.as_ref(), body)
            }
            StmtKind::Return(value) => {
                let result = match value {
                    Some(expr) => Some(self.visit_expr(expr)?),
                    None => None,
                };
                self.emit(Instruction::ret(result)?.with_origin(stmt.span));
                Ok(())
            }
            StmtKind::Break => {
                let target = self.loop_break_labels.last().cloned().ok_or_else(|| {
                    HrlError::ir_construction("break emitted outside of a loop")
                })?;
                self.emit(Instruction::jmp(Operand::Label(target))?.with_origin(stmt.span));
                Ok(())
            }
            StmtKind::Continue => {
                let target = self.loop_continue_labels.last().cloned().ok_or_else(|| {
                    HrlError::ir_construction("continue emitted outside of a loop")
                })?;
                self.emit(Instruction::jmp(Operand::Label(target))?.with_origin(stmt.span));
                Ok(())
            }
            StmtKind::Block(block) => self.visit_block(block),
            StmtKind::Expr(expr) => {
                self.visit_expr(expr)?;
                Ok(())
            }
            StmtKind::Empty => Ok(()),
        }
    }

    /// `if` lowers to four label-bracketed regions:
    /// cond, then (ending with a jump over the else), else, join.
    fn visit_if(
        &mut self,
        stmt: &Stmt,
        condition: &Expr,
        then_branch: &Stmt,
        else_branch: Option<&Stmt>,
    ) -> HrlResult<()> {
        let if_label = self.take_block_label("if");
        let then_label = self.take_block_label("then");
        let else_label = self.take_block_label("else");
        let fi_label = self.take_block_label("fi");

        let if_start = self.emit_anchor(stmt);
        let cond = self.visit_expr(condition)?;
        self.emit(
            Instruction::branch_on(IrOp::Jz, Operand::Label(else_label.clone()), cond)?
                .with_origin(stmt.span),
        );

        let then_start = self.emit_anchor(stmt);
        self.visit_stmt(then_branch)?;
        self.emit(Instruction::jmp(Operand::Label(fi_label.clone()))?.with_origin(stmt.span));

        let else_start = self.emit_anchor(stmt);
        if let Some(else_branch) = else_branch {
            self.visit_stmt(else_branch)?;
        }

        let fi_start = self.emit_anchor(stmt);

        self.labels.insert(if_label, if_start)?;
        self.labels.insert(then_label, then_start)?;
        self.labels.insert(else_label, else_start)?;
        self.labels.insert(fi_label, fi_start)?;
        Ok(())
    }

    /// `while` lowers to head (condition + exit jump), body (looping
    /// back to the head), and exit.
    fn visit_while(&mut self, stmt: &Stmt, condition: &Expr, body: &Stmt) -> HrlResult<()> {
        let while_label = self.take_block_label("while");
        let loop_label = self.take_block_label("loop");
        let elihw_label = self.take_block_label("elihw");

        self.loop_break_labels.push(elihw_label.clone());
        self.loop_continue_labels.push(while_label.clone());

        let while_start = self.emit_anchor(stmt);
        let cond = self.visit_expr(condition)?;
        self.emit(
            Instruction::branch_on(IrOp::Jz, Operand::Label(elihw_label.clone()), cond)?
                .with_origin(stmt.span),
        );

        let loop_start = self.emit_anchor(stmt);
        self.visit_stmt(body)?;
        self.emit(Instruction::jmp(Operand::Label(while_label.clone()))?.with_origin(stmt.span));

        let elihw_start = self.emit_anchor(stmt);

        self.labels.insert(while_label, while_start)?;
        self.labels.insert(loop_label, loop_start)?;
        self.labels.insert(elihw_label, elihw_start)?;

        self.loop_break_labels.pop();
        self.loop_continue_labels.pop();
        Ok(())
    }

    /// `for` splits into init / cond / body / update / exit; `continue`
    /// targets the update region.
    fn visit_for(
        &mut self,
        stmt: &Stmt,
        init: Option<&Stmt>,
        condition: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stmt,
    ) -> HrlResult<()> {
        let for_label = self.take_block_label("for");
        let cond_label = self.take_block_label("cond");
        let loop_label = self.take_block_label("loop");
        let update_label = self.take_block_label("update");
        let rof_label = self.take_block_label("rof");

        self.loop_break_labels.push(rof_label.clone());
        self.loop_continue_labels.push(update_label.clone());

        let for_start = self.emit_anchor(stmt);
        if let Some(init) = init {
            self.visit_stmt(init)?;
        }

        let cond_start = self.emit_anchor(stmt);
        if let Some(condition) = condition {
            let cond = self.visit_expr(condition)?;
            self.emit(
                Instruction::branch_on(IrOp::Jz, Operand::Label(rof_label.clone()), cond)?
                    .with_origin(stmt.span),
            );
        }

        let loop_start = self.emit_anchor(stmt);
        self.visit_stmt(body)?;

        let update_start = self.emit_anchor(stmt);
        if let Some(update) = update {
            self.visit_expr(update)?;
        }
        self.emit(Instruction::jmp(Operand::Label(cond_label.clone()))?.with_origin(stmt.span));

        let rof_start = self.emit_anchor(stmt);

        self.labels.insert(for_label, for_start)?;
        self.labels.insert(cond_label, cond_start)?;
        self.labels.insert(loop_label, loop_start)?;
        self.labels.insert(update_label, update_start)?;
        self.labels.insert(rof_label, rof_start)?;

        self.loop_break_labels.pop();
        self.loop_continue_labels.pop();
        Ok(())
    }

    fn visit_variable_declaration(&mut self, decl: &VariableDeclaration) -> HrlResult<()> {
        let mut var_id = self.take_var_id();
        if self.in_global_var_decl {
            // Negative encoding; plain negation would collide 0 with -0.
            var_id = -var_id - 1;
        }
        let var = Operand::Variable(var_id);
        let symbol = self.symbol_of(decl.id, &decl.name.value)?;
        self.symbol_operands.insert(symbol, var.clone());

        match &decl.initializer {
            Some(init) => {
                let result = self.visit_expr(init)?;
                if var.is_global_register() {
                    self.emit(Instruction::store(var, result)?.with_origin(decl.span));
                } else {
                    self.emit(Instruction::mov(var, result)?.with_origin(decl.span));
                }
            }
            None => {
                self.emit(Instruction::loadi(var, 0)?.with_origin(decl.span));
            }
        }
        Ok(())
    }

    fn visit_expr(&mut self, expr: &Expr) -> HrlResult<Operand> {
        match &*expr.kind {
            ExprKind::IntegerLiteral { value, .. } => {
                let result = self.take_var();
                self.emit(Instruction::loadi(result.clone(), *value)?.with_origin(expr.span));
                Ok(result)
            }
            ExprKind::BooleanLiteral(value) => {
                let result = self.take_var();
                self.emit(
                    Instruction::loadi(result.clone(), i32::from(*value))?.with_origin(expr.span),
                );
                Ok(result)
            }
            ExprKind::Variable(name) => {
                let operand = self.symbol_operand(expr.id, &name.value)?;
                if operand.is_global_register() {
                    // Globals materialize through a fresh LOAD at every use.
                    let result = self.take_var();
                    self.emit(Instruction::load(result.clone(), operand)?.with_origin(expr.span));
                    Ok(result)
                } else {
                    Ok(operand)
                }
            }
            ExprKind::FloorAccess { index } => {
                let index = self.floor_index_operand(index)?;
                let result = self.take_var();
                self.emit(Instruction::load(result.clone(), index)?.with_origin(expr.span));
                Ok(result)
            }
            ExprKind::Assignment { name, value } => {
                let result = self.visit_expr(value)?;
                let operand = self.symbol_operand(expr.id, &name.value)?;
                if operand.is_global_register() {
                    self.emit(Instruction::store(operand, result.clone())?.with_origin(expr.span));
                } else {
                    self.emit(Instruction::mov(operand, result.clone())?.with_origin(expr.span));
                }
                Ok(result)
            }
            ExprKind::FloorAssignment { index, value } => {
                let value = self.visit_expr(value)?;
                let index = self.floor_index_operand(index)?;
                self.emit(Instruction::store(index, value.clone())?.with_origin(expr.span));
                Ok(value)
            }
            ExprKind::Unary { op, operand } => {
                let source = self.visit_expr(operand)?;
                let result = self.take_var();
                let instr = match op {
                    UnaryOp::Neg => Instruction::neg(result.clone(), source)?,
                    UnaryOp::Not => Instruction::not(result.clone(), source)?,
                };
                self.emit(instr.with_origin(expr.span));
                Ok(result)
            }
            ExprKind::Increment { name } => self.visit_step(expr, &name.value, IrOp::Add),
            ExprKind::Decrement { name } => self.visit_step(expr, &name.value, IrOp::Sub),
            ExprKind::Binary { op, left, right } => {
                let left = self.visit_expr(left)?;
                let right = self.visit_expr(right)?;
                let result = self.take_var();
                let instr = match op {
                    BinaryOp::Add => Instruction::arithmetic(IrOp::Add, result.clone(), left, right)?,
                    BinaryOp::Sub => Instruction::arithmetic(IrOp::Sub, result.clone(), left, right)?,
                    BinaryOp::Mul => Instruction::arithmetic(IrOp::Mul, result.clone(), left, right)?,
                    BinaryOp::Div => Instruction::arithmetic(IrOp::Div, result.clone(), left, right)?,
                    BinaryOp::Mod => Instruction::arithmetic(IrOp::Mod, result.clone(), left, right)?,
                    BinaryOp::Eq => Instruction::comparison(IrOp::Eq, result.clone(), left, right)?,
                    BinaryOp::Ne => Instruction::comparison(IrOp::Ne, result.clone(), left, right)?,
                    BinaryOp::Lt => Instruction::comparison(IrOp::Lt, result.clone(), left, right)?,
                    BinaryOp::Le => Instruction::comparison(IrOp::Le, result.clone(), left, right)?,
                    BinaryOp::Gt => Instruction::comparison(IrOp::Gt, result.clone(), left, right)?,
                    BinaryOp::Ge => Instruction::comparison(IrOp::Ge, result.clone(), left, right)?,
                    BinaryOp::And => Instruction::logical(IrOp::And, result.clone(), left, right)?,
                    BinaryOp::Or => Instruction::logical(IrOp::Or, result.clone(), left, right)?,
                };
                self.emit(instr.with_origin(expr.span));
                Ok(result)
            }
            ExprKind::Invocation { callee, argument } => {
                self.visit_invocation(expr, &callee.value, argument.as_ref())
            }
        }
    }

    /// `x++` / `x--`: load 1, add/sub, write back; the expression's
    /// value is the stepped variable.
    fn visit_step(&mut self, expr: &Expr, name: &str, op: IrOp) -> HrlResult<Operand> {
        let original = self.symbol_operand(expr.id, name)?;

        let one = self.take_var();
        self.emit(Instruction::loadi(one.clone(), 1)?.with_origin(expr.span));

        let stepped = self.take_var();
        let source = if original.is_global_register() {
            let loaded = self.take_var();
            self.emit(Instruction::load(loaded.clone(), original.clone())?.with_origin(expr.span));
            loaded
        } else {
            original.clone()
        };
        self.emit(Instruction::arithmetic(op, stepped.clone(), source, one)?.with_origin(expr.span));

        if original.is_global_register() {
            self.emit(Instruction::store(original.clone(), stepped)?.with_origin(expr.span));
        } else {
            self.emit(Instruction::mov(original.clone(), stepped)?.with_origin(expr.span));
        }

        Ok(original)
    }

    fn visit_invocation(
        &mut self,
        expr: &Expr,
        callee: &str,
        argument: Option<&Expr>,
    ) -> HrlResult<Operand> {
        match (callee, argument) {
            (INTRINSIC_OUTBOX, Some(argument)) => {
                let value = self.visit_expr(argument)?;
                self.emit(Instruction::output(value)?.with_origin(expr.span));
                // outbox produces no value; a constant 0 stands in when
                // the call is used in expression position.
                let result = self.take_var();
                self.emit(Instruction::loadi(result.clone(), 0)?.with_origin(expr.span));
                Ok(result)
            }
            (INTRINSIC_INBOX, None) => {
                let result = self.take_var();
                self.emit(Instruction::input(result.clone())?.with_origin(expr.span));
                Ok(result)
            }
            _ => {
                let argument = match argument {
                    Some(argument) => Some(self.visit_expr(argument)?),
                    None => None,
                };
                let result = self.take_var();
                self.emit(
                    Instruction::call(
                        result.clone(),
                        Operand::Label(callee.to_string()),
                        argument,
                    )?
                    .with_origin(expr.span),
                );
                Ok(result)
            }
        }
    }

    /// Floor indices that are literals become immediates; everything else
    /// evaluates to a register holding the index.
    fn floor_index_operand(&mut self, index: &Expr) -> HrlResult<Operand> {
        if let ExprKind::IntegerLiteral { value, .. } = &*index.kind {
            return Ok(Operand::Immediate(*value));
        }
        self.visit_expr(index)
    }

    // Numbering and buffer plumbing.

    fn take_var_id(&mut self) -> i32 {
        let id = self.next_var_id;
        self.next_var_id += 1;
        id
    }

    fn take_var(&mut self) -> Operand {
        Operand::Variable(self.take_var_id())
    }

    fn take_block_label(&mut self, tag: &str) -> String {
        let label = format!("{}.B{}_{}", self.current_name, self.next_label_id, tag);
        self.next_label_id += 1;
        label
    }

    fn emit(&mut self, instruction: Instruction) -> usize {
        self.current.push(instruction);
        self.current.len() - 1
    }

    /// A NOP that pins a label position; stripped by the nop pass later.
    fn emit_anchor(&mut self, stmt: &Stmt) -> usize {
        self.emit(Instruction::nop().with_origin(stmt.span))
    }

    fn symbol_of(&self, node: hrl_parser::NodeId, name: &str) -> HrlResult<SymbolId> {
        self.info
            .resolutions
            .get(&node)
            .copied()
            .ok_or_else(|| {
                HrlError::ir_construction(format!("no symbol recorded for '{}'", name))
            })
    }

    fn symbol_operand(&self, node: hrl_parser::NodeId, name: &str) -> HrlResult<Operand> {
        let symbol = self.symbol_of(node, name)?;
        self.symbol_operands.get(&symbol).cloned().ok_or_else(|| {
            HrlError::ir_construction(format!("symbol '{}' has no operand mapping", name))
        })
    }

    fn begin_subroutine(&mut self, name: &str) {
        self.next_var_id = 0;
        self.next_label_id = 0;
        self.current_name = name.to_string();
        self.current.clear();
        self.labels = LabelBimap::default();
    }

    fn finish_subroutine(&mut self, has_param: bool, has_return: bool) {
        debug!(
            "[TacGen] subroutine '{}' lowered to {} instructions",
            self.current_name,
            self.current.len()
        );
        self.generated.push(GeneratedSubroutine {
            name: std::mem::take(&mut self.current_name),
            has_param,
            has_return,
            instructions: std::mem::take(&mut self.current),
            labels: std::mem::replace(&mut self.labels, LabelBimap::default()),
        });
    }
}

/// Partition a linear instruction stream into basic blocks: a block
/// starts at every labeled instruction and after every control transfer.
/// Blocks that begin without a label get a synthetic `<sub>.XB<n>` one.
fn split_into_basic_blocks(
    subroutine_name: &str,
    instructions: Vec<Instruction>,
    labels: &LabelBimap,
) -> Vec<BasicBlock> {
    let total = instructions.len();
    let mut blocks = Vec::new();
    let mut current: Vec<Instruction> = Vec::new();
    let mut current_label: Option<String> = None;
    let mut seen_control_transfer = false;
    let mut synthetic_id = 0;

    for (index, instruction) in instructions.into_iter().enumerate() {
        let label = labels.label_at(index);

        if (label.is_some() || seen_control_transfer) && !current.is_empty() {
            let block_label = current_label.take().expect("non-empty block without a label");
            blocks.push(BasicBlock::new(block_label, std::mem::take(&mut current)));
            seen_control_transfer = false;
        } else if label.is_some() || seen_control_transfer {
            seen_control_transfer = false;
        }

        if current_label.is_none() {
            current_label = Some(match label {
                Some(label) => label.to_string(),
                None => {
                    let synthetic = format!("{}.XB{}", subroutine_name, synthetic_id);
                    synthetic_id += 1;
                    synthetic
                }
            });
        }

        if instruction.op().is_control_transfer() {
            seen_control_transfer = true;
        }
        current.push(instruction);
    }

    if !current.is_empty() {
        let block_label = current_label.take().expect("non-empty block without a label");
        blocks.push(BasicBlock::new(block_label, current));
    }

    debug_assert_eq!(
        blocks.iter().map(|b| b.instructions.len()).sum::<usize>(),
        total
    );

    if blocks.is_empty() {
        blocks.push(BasicBlock::new(subroutine_name, Vec::new()));
    }

    blocks
}

/// Convenience wrapper: lower a checked compilation unit to a program.
pub fn generate(unit: &CompilationUnit, info: &SemanticInfo) -> HrlResult<Program> {
    TacGen::new(info).run(unit)
}
