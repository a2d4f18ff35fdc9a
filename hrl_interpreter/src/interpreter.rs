//! The interpreter proper

use crate::RuntimeError;
use hrl_common::{HrBox, GLOBAL_SCOPE_ID};
use hrl_ir::{Instruction, IrOp, Operand, Program, Subroutine};
use log::{debug, trace};
use std::collections::{HashMap, HashSet, VecDeque};

/// Recursion guard; the VM has no meaningful stack limit of its own.
const MAX_CALL_DEPTH: usize = 1024;

/// A resolved addressing target for LOAD/STORE: either a global slot or a floor index.
enum Slot {
    Global(i32),
    Floor(i32),
}

/// One activation record
struct CallFrame {
    subroutine_name: String,
    variables: HashMap<i32, HrBox>,
    visited_block_labels: HashSet<String>,
    current_block: Option<usize>,
}

/// Interpreter over a lowered program
pub struct Interpreter<'a> {
    program: &'a Program,
    floor: Vec<Option<HrBox>>,
    input: VecDeque<HrBox>,
    output: Vec<HrBox>,
    globals: HashMap<i32, HrBox>,
    call_stack: Vec<CallFrame>,
    return_slot: Option<HrBox>,
    enforce_ssa: bool,
}

impl<'a> Interpreter<'a> {
    pub fn new(program: &'a Program) -> Self {
        let floor_max = program.metadata.floor_max().max(0) as usize;
        Self {
            program,
            floor: vec![None; floor_max],
            input: VecDeque::new(),
            output: Vec::new(),
            globals: HashMap::new(),
            call_stack: Vec::new(),
            return_slot: None,
            enforce_ssa: false,
        }
    }

    /// Enable the dynamic single-assignment check. Re-assigning a local
    /// stays legal when the current block was already visited in this
    /// frame, which is what loop back-edges do to phi targets.
    pub fn with_ssa_enforcement(mut self, enforce: bool) -> Self {
        self.enforce_ssa = enforce;
        self
    }

    pub fn with_input<I: IntoIterator<Item = HrBox>>(mut self, input: I) -> Self {
        self.input = input.into_iter().collect();
        self
    }

    pub fn push_input(&mut self, value: HrBox) {
        self.input.push_back(value);
    }

    /// Everything the program has written to the output queue so far.
    pub fn output(&self) -> &[HrBox] {
        &self.output
    }

    /// Run the program from its `<global>` initializer.
    pub fn exec(&mut self) -> Result<(), RuntimeError> {
        for (&slot, &value) in self.program.metadata.floor_inits() {
            self.set_floor(slot, value)?;
        }

        let entry = self.program.subroutine(GLOBAL_SCOPE_ID).ok_or_else(|| {
            RuntimeError::InvalidProgram(format!("no '{}' subroutine", GLOBAL_SCOPE_ID))
        })?;

        debug!("[IrInterp] starting execution");
        self.exec_subroutine(entry, None)?;
        debug!("[IrInterp] program ran to completion");
        Ok(())
    }

    fn exec_subroutine(
        &mut self,
        subroutine: &Subroutine,
        parameter: Option<HrBox>,
    ) -> Result<(), RuntimeError> {
        if self.call_stack.len() >= MAX_CALL_DEPTH {
            return Err(RuntimeError::InvalidProgram(format!(
                "call depth exceeded {} frames entering '{}'",
                MAX_CALL_DEPTH,
                subroutine.name()
            )));
        }
        debug!("[IrInterp] entering subroutine '{}'", subroutine.name());

        self.call_stack.push(CallFrame {
            subroutine_name: subroutine.name().to_string(),
            variables: HashMap::new(),
            visited_block_labels: HashSet::new(),
            current_block: None,
        });

        let result = self.run_blocks(subroutine, parameter);
        self.call_stack.pop();
        result
    }

    fn run_blocks(
        &mut self,
        subroutine: &Subroutine,
        parameter: Option<HrBox>,
    ) -> Result<(), RuntimeError> {
        let entry = subroutine.entry_vertex().unwrap_or(0);
        let mut current = if subroutine.blocks.is_empty() { None } else { Some(entry) };
        let mut predecessor: Option<usize> = None;

        while let Some(block_index) = current {
            let block = &subroutine.blocks[block_index];
            trace!("[IrInterp] entering block '{}'", block.label());
            self.frame_mut().current_block = Some(block_index);
            let mut non_linear_control_flow = false;

            'instructions: for instruction in &block.instructions {
                trace!("[IrInterp] executing {}", instruction);
                let op = instruction.op();
                let tgt = instruction.tgt();
                let src1 = instruction.src1();
                let src2 = instruction.src2();

                let mut op_result: Option<HrBox> = None;
                let mut should_branch = false;

                match op {
                    IrOp::Mov | IrOp::Load | IrOp::Store | IrOp::Loadi => {
                        self.move_data(instruction, block.label())?;
                    }

                    IrOp::Not => {
                        let value = self.get_variable(src1)?;
                        op_result = Some(HrBox::from(!value.is_truthy()));
                    }
                    IrOp::Neg => {
                        let value = self.get_variable(src1)?;
                        op_result = Some(-value);
                    }

                    IrOp::Add | IrOp::Sub | IrOp::Mul | IrOp::Div | IrOp::Mod | IrOp::And
                    | IrOp::Or | IrOp::Eq | IrOp::Ne | IrOp::Lt | IrOp::Le | IrOp::Gt
                    | IrOp::Ge => {
                        op_result = Some(self.eval_binary(op, src1, src2)?);
                    }

                    IrOp::Je => should_branch = self.eval_binary(IrOp::Eq, src1, src2)?.is_truthy(),
                    IrOp::Jne => should_branch = self.eval_binary(IrOp::Ne, src1, src2)?.is_truthy(),
                    IrOp::Jgt => should_branch = self.eval_binary(IrOp::Gt, src1, src2)?.is_truthy(),
                    IrOp::Jlt => should_branch = self.eval_binary(IrOp::Lt, src1, src2)?.is_truthy(),
                    IrOp::Jge => should_branch = self.eval_binary(IrOp::Ge, src1, src2)?.is_truthy(),
                    IrOp::Jle => should_branch = self.eval_binary(IrOp::Le, src1, src2)?.is_truthy(),
                    IrOp::Jz => should_branch = !self.get_variable(src1)?.is_truthy(),
                    IrOp::Jnz => should_branch = self.get_variable(src1)?.is_truthy(),
                    IrOp::Jmp => should_branch = true,

                    IrOp::Call => {
                        let callee_name = src1.label().ok_or_else(|| {
                            RuntimeError::InvalidProgram("CALL without a label".to_string())
                        })?;
                        let callee = self.program.subroutine(callee_name).ok_or_else(|| {
                            RuntimeError::InvalidProgram(format!(
                                "call to unknown subroutine '{}'",
                                callee_name
                            ))
                        })?;
                        let argument = match src2 {
                            Operand::Variable(_) => Some(self.get_variable(src2)?),
                            _ => None,
                        };
                        self.return_slot = None;
                        self.exec_subroutine(callee, argument)?;
                        if tgt.is_variable() {
                            if let Some(value) = self.return_slot.take() {
                                op_result = Some(value);
                            }
                        }
                    }
                    IrOp::Enter => {
                        op_result = Some(parameter.unwrap_or_default());
                    }
                    IrOp::Ret => {
                        if src1.is_variable() {
                            self.return_slot = Some(self.get_variable(src1)?);
                        }
                        self.mark_visited(subroutine, block_index);
                        current = None;
                        non_linear_control_flow = true;
                        break 'instructions;
                    }
                    IrOp::Halt => return Err(RuntimeError::HaltRequested),

                    IrOp::Input => match self.input.pop_front() {
                        Some(value) => op_result = Some(value),
                        None => return Err(RuntimeError::EndOfInput),
                    },
                    IrOp::Output => {
                        let value = self.get_variable(src1)?;
                        self.output.push(value);
                    }

                    IrOp::Phi => {
                        let pred_index = predecessor.ok_or_else(|| {
                            RuntimeError::InvalidProgram(format!(
                                "phi in entry block '{}'",
                                block.label()
                            ))
                        })?;
                        let pred_label = subroutine.blocks[pred_index].label();
                        let incoming =
                            instruction.phi_incomings().get(pred_label).ok_or_else(|| {
                                RuntimeError::InvalidProgram(format!(
                                    "phi in '{}' has no incoming for predecessor '{}'",
                                    block.label(),
                                    pred_label
                                ))
                            })?;
                        match self.get_variable(&Operand::Variable(incoming.variable)) {
                            Ok(value) => op_result = Some(value),
                            // No value reaches along this edge: the merge
                            // carries no meaning here. The target stays
                            // unset and a real read of it still faults.
                            Err(RuntimeError::RegisterIsEmpty(_)) => {}
                            Err(err) => return Err(err),
                        }
                    }

                    IrOp::Nop => {}
                }

                if let Some(value) = op_result {
                    self.set_variable(tgt, value, block.label())?;
                }

                if should_branch {
                    let target = tgt.label().ok_or_else(|| {
                        RuntimeError::InvalidProgram("branch without a label".to_string())
                    })?;
                    let target_index = subroutine.block_index(target).ok_or_else(|| {
                        RuntimeError::InvalidProgram(format!("branch to unknown label '{}'", target))
                    })?;
                    self.mark_visited(subroutine, block_index);
                    predecessor = Some(block_index);
                    current = Some(target_index);
                    non_linear_control_flow = true;
                    break 'instructions;
                }
            }

            if !non_linear_control_flow {
                self.mark_visited(subroutine, block_index);
                predecessor = Some(block_index);
                current = if block_index + 1 < subroutine.blocks.len() {
                    Some(block_index + 1)
                } else {
                    None
                };
            }
        }

        Ok(())
    }

    fn move_data(&mut self, instruction: &Instruction, block_label: &str) -> Result<(), RuntimeError> {
        let tgt = instruction.tgt();
        let src1 = instruction.src1();
        let src2 = instruction.src2();

        match instruction.op() {
            IrOp::Mov => {
                let value = self.get_variable(src1)?;
                self.set_variable(tgt, value, block_label)
            }
            IrOp::Loadi => {
                let value = src1.immediate().ok_or_else(|| {
                    RuntimeError::InvalidProgram("LOADI without an immediate".to_string())
                })?;
                self.set_variable(tgt, HrBox::int(value), block_label)
            }
            IrOp::Load => {
                let slot = self.resolve_slot(src1)?;
                let value = match slot {
                    Slot::Global(id) => self
                        .globals
                        .get(&id)
                        .copied()
                        .ok_or_else(|| RuntimeError::RegisterIsEmpty(format!("gv{}", -id - 1)))?,
                    Slot::Floor(index) => self.get_floor(index)?,
                };
                self.set_variable(tgt, value, block_label)
            }
            IrOp::Store => {
                let slot = self.resolve_slot(src1)?;
                let value = self.get_variable(src2)?;
                match slot {
                    Slot::Global(id) => {
                        self.globals.insert(id, value);
                        Ok(())
                    }
                    Slot::Floor(index) => self.set_floor(index, value),
                }
            }
            other => Err(RuntimeError::InvalidProgram(format!(
                "'{}' routed through data movement",
                other
            ))),
        }
    }

    fn eval_binary(
        &mut self,
        op: IrOp,
        src1: &Operand,
        src2: &Operand,
    ) -> Result<HrBox, RuntimeError> {
        let a = self.get_variable(src1)?;
        let b = self.get_variable(src2)?;
        let result = match op {
            IrOp::Add => a + b,
            IrOp::Sub => a - b,
            IrOp::Mul => a * b,
            IrOp::Div => {
                if b.as_int() == 0 {
                    return Err(RuntimeError::ValueIsZero);
                }
                a / b
            }
            IrOp::Mod => {
                if b.as_int() == 0 {
                    return Err(RuntimeError::ValueIsZero);
                }
                a % b
            }
            IrOp::And => HrBox::from(a.is_truthy() && b.is_truthy()),
            IrOp::Or => HrBox::from(a.is_truthy() || b.is_truthy()),
            IrOp::Eq => HrBox::from(a == b),
            IrOp::Ne => HrBox::from(a != b),
            IrOp::Lt => HrBox::from(a.as_int() < b.as_int()),
            IrOp::Le => HrBox::from(a.as_int() <= b.as_int()),
            IrOp::Gt => HrBox::from(a.as_int() > b.as_int()),
            IrOp::Ge => HrBox::from(a.as_int() >= b.as_int()),
            other => {
                return Err(RuntimeError::InvalidProgram(format!(
                    "'{}' evaluated as a binary operation",
                    other
                )))
            }
        };
        Ok(result)
    }

    fn get_variable(&self, operand: &Operand) -> Result<HrBox, RuntimeError> {
        let id = operand.register_id().ok_or_else(|| {
            RuntimeError::InvalidProgram(format!("'{}' read as a register", operand))
        })?;
        let value = if id < 0 {
            self.globals.get(&id)
        } else {
            self.frame().variables.get(&id)
        };
        value
            .copied()
            .ok_or_else(|| RuntimeError::RegisterIsEmpty(operand.to_string()))
    }

    fn set_variable(
        &mut self,
        operand: &Operand,
        value: HrBox,
        block_label: &str,
    ) -> Result<(), RuntimeError> {
        let id = operand.register_id().ok_or_else(|| {
            RuntimeError::InvalidProgram(format!("'{}' written as a register", operand))
        })?;
        if id < 0 {
            self.globals.insert(id, value);
            return Ok(());
        }

        let enforce = self.enforce_ssa;
        let frame = self.frame_mut();
        // A block revisited in this frame may legally redefine: the loop
        // body's phi targets are rewritten on every iteration.
        if enforce
            && frame.variables.contains_key(&id)
            && !frame.visited_block_labels.contains(block_label)
        {
            return Err(RuntimeError::InvalidProgram(format!(
                "register v{} assigned twice in subroutine '{}'",
                id, frame.subroutine_name
            )));
        }
        frame.variables.insert(id, value);
        Ok(())
    }

    /// Decode an addressing operand: an immediate is a floor index, a
    /// negative register names a global slot, a local register holds the
    /// floor index to use.
    fn resolve_slot(&self, operand: &Operand) -> Result<Slot, RuntimeError> {
        match operand {
            Operand::Immediate(index) => Ok(Slot::Floor(*index)),
            Operand::Variable(id) if *id < 0 => Ok(Slot::Global(*id)),
            Operand::Variable(_) => Ok(Slot::Floor(self.get_variable(operand)?.as_int())),
            other => Err(RuntimeError::InvalidProgram(format!(
                "'{}' used as an address",
                other
            ))),
        }
    }

    fn get_floor(&self, index: i32) -> Result<HrBox, RuntimeError> {
        let cell = self
            .floor
            .get(usize::try_from(index).map_err(|_| Self::floor_bounds(index))?)
            .ok_or_else(|| Self::floor_bounds(index))?;
        (*cell).ok_or(RuntimeError::FloorIsEmpty(index))
    }

    fn set_floor(&mut self, index: i32, value: HrBox) -> Result<(), RuntimeError> {
        let cell = self
            .floor
            .get_mut(usize::try_from(index).map_err(|_| Self::floor_bounds(index))?)
            .ok_or_else(|| Self::floor_bounds(index))?;
        *cell = Some(value);
        Ok(())
    }

    fn floor_bounds(index: i32) -> RuntimeError {
        RuntimeError::InvalidProgram(format!("floor index {} out of bounds", index))
    }

    fn mark_visited(&mut self, subroutine: &Subroutine, block_index: usize) {
        let label = subroutine.blocks[block_index].label().to_string();
        self.frame_mut().visited_block_labels.insert(label);
    }

    fn frame(&self) -> &CallFrame {
        self.call_stack.last().expect("no active call frame")
    }

    fn frame_mut(&mut self) -> &mut CallFrame {
        self.call_stack.last_mut().expect("no active call frame")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hrl_ir::{BasicBlock, ProgramMetadata, Subroutine};

    fn var(id: i32) -> Operand {
        Operand::Variable(id)
    }

    fn global_calling(name: &str) -> Subroutine {
        Subroutine::new(
            GLOBAL_SCOPE_ID,
            false,
            false,
            vec![BasicBlock::new(
                format!("{}.XB0", GLOBAL_SCOPE_ID),
                vec![Instruction::call(var(0), Operand::Label(name.to_string()), None).unwrap()],
            )],
        )
    }

    #[test]
    fn straight_line_io() {
        // start: in v0; out v0; ret
        let start = Subroutine::new(
            "start",
            false,
            true,
            vec![BasicBlock::new("start", vec![
                Instruction::input(var(0)).unwrap(),
                Instruction::output(var(0)).unwrap(),
                Instruction::ret(Some(var(0))).unwrap(),
            ])],
        );
        let program = Program::new(
            vec![global_calling("start"), start],
            ProgramMetadata::default(),
        );

        let mut interp = Interpreter::new(&program).with_input([HrBox::int(7)]);
        interp.exec().unwrap();
        assert_eq!(interp.output(), &[HrBox::int(7)]);
    }

    #[test]
    fn empty_input_raises_end_of_input() {
        let start = Subroutine::new(
            "start",
            false,
            true,
            vec![BasicBlock::new("start", vec![
                Instruction::input(var(0)).unwrap(),
                Instruction::ret(None).unwrap(),
            ])],
        );
        let program = Program::new(
            vec![global_calling("start"), start],
            ProgramMetadata::default(),
        );

        let mut interp = Interpreter::new(&program);
        assert_eq!(interp.exec(), Err(RuntimeError::EndOfInput));
    }

    #[test]
    fn uninitialized_floor_read_fails() {
        let start = Subroutine::new(
            "start",
            false,
            true,
            vec![BasicBlock::new("start", vec![
                Instruction::load(var(0), Operand::Immediate(3)).unwrap(),
                Instruction::ret(None).unwrap(),
            ])],
        );
        let program = Program::new(
            vec![global_calling("start"), start],
            ProgramMetadata::default(),
        );

        let mut interp = Interpreter::new(&program);
        assert_eq!(interp.exec(), Err(RuntimeError::FloorIsEmpty(3)));
    }

    #[test]
    fn division_by_zero_fails() {
        let start = Subroutine::new(
            "start",
            false,
            true,
            vec![BasicBlock::new("start", vec![
                Instruction::loadi(var(0), 1).unwrap(),
                Instruction::loadi(var(1), 0).unwrap(),
                Instruction::arithmetic(IrOp::Div, var(2), var(0), var(1)).unwrap(),
                Instruction::ret(None).unwrap(),
            ])],
        );
        let program = Program::new(
            vec![global_calling("start"), start],
            ProgramMetadata::default(),
        );

        let mut interp = Interpreter::new(&program);
        assert_eq!(interp.exec(), Err(RuntimeError::ValueIsZero));
    }

    #[test]
    fn halt_surfaces_as_halt_requested() {
        let start = Subroutine::new(
            "start",
            false,
            true,
            vec![BasicBlock::new("start", vec![Instruction::halt()])],
        );
        let program = Program::new(
            vec![global_calling("start"), start],
            ProgramMetadata::default(),
        );

        let mut interp = Interpreter::new(&program);
        assert_eq!(interp.exec(), Err(RuntimeError::HaltRequested));
    }

    #[test]
    fn ssa_enforcement_rejects_redefinition_in_straight_line_code() {
        let start = Subroutine::new(
            "start",
            false,
            true,
            vec![BasicBlock::new("start", vec![
                Instruction::loadi(var(0), 1).unwrap(),
                Instruction::loadi(var(0), 2).unwrap(),
                Instruction::ret(None).unwrap(),
            ])],
        );
        let program = Program::new(
            vec![global_calling("start"), start],
            ProgramMetadata::default(),
        );

        let mut strict = Interpreter::new(&program).with_ssa_enforcement(true);
        assert!(matches!(strict.exec(), Err(RuntimeError::InvalidProgram(_))));

        let mut loose = Interpreter::new(&program);
        assert!(loose.exec().is_ok());
    }

    #[test]
    fn indirect_floor_addressing() {
        // floor[5] = 9 via a register-held index, then read it back.
        let start = Subroutine::new(
            "start",
            false,
            true,
            vec![BasicBlock::new("start", vec![
                Instruction::loadi(var(0), 5).unwrap(),
                Instruction::loadi(var(1), 9).unwrap(),
                Instruction::store(var(0), var(1)).unwrap(),
                Instruction::load(var(2), var(0)).unwrap(),
                Instruction::output(var(2)).unwrap(),
                Instruction::ret(None).unwrap(),
            ])],
        );
        let program = Program::new(
            vec![global_calling("start"), start],
            ProgramMetadata::default(),
        );

        let mut interp = Interpreter::new(&program);
        interp.exec().unwrap();
        assert_eq!(interp.output(), &[HrBox::int(9)]);
    }
}
