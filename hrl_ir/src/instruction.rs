//! Three-address code instructions
//!
//! Every opcode has a fixed operand-slot contract; instructions can only
//! be built through factory constructors (or [`Instruction::with_operands`])
//! which enforce it. A violated contract is a malformed-IR error and
//! always indicates a compiler bug.

use crate::{IrOp, Operand};
use hrl_common::{HrlError, HrlResult, Span};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One incoming value of a phi function: the variable id that flows in
/// and the block defining it. Keyed in [`Instruction::phi_incomings`] by
/// the *predecessor block label*, which stays valid across block
/// reordering and instruction rewrites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhiIncoming {
    pub variable: i32,
    pub def_block: String,
}

/// A single TAC instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    op: IrOp,
    tgt: Operand,
    src1: Operand,
    src2: Operand,
    /// predecessor block label → incoming value; non-empty only for PHI
    phi_incomings: BTreeMap<String, PhiIncoming>,
    /// Source location of the AST node this was lowered from
    origin: Option<Span>,
}

/// Operand-kind expectation for one slot of the contract table
#[derive(Clone, Copy, PartialEq, Eq)]
enum Slot {
    None,
    Var,
    VarOpt,
    VarOrImm,
    Imm,
    Label,
}

impl Slot {
    fn accepts(self, operand: &Operand) -> bool {
        match self {
            Slot::None => operand.is_null(),
            Slot::Var => operand.is_variable(),
            Slot::VarOpt => operand.is_null() || operand.is_variable(),
            Slot::VarOrImm => operand.is_variable() || operand.is_immediate(),
            Slot::Imm => operand.is_immediate(),
            Slot::Label => operand.is_label(),
        }
    }
}

/// The slot contract of §"instruction model": (tgt, src1, src2) per opcode.
fn slot_contract(op: IrOp) -> (Slot, Slot, Slot) {
    use IrOp::*;
    match op {
        Add | Sub | Mul | Div | Mod => (Slot::Var, Slot::Var, Slot::Var),
        Neg => (Slot::Var, Slot::Var, Slot::None),
        And | Or => (Slot::Var, Slot::Var, Slot::Var),
        Not => (Slot::Var, Slot::Var, Slot::None),
        Eq | Ne | Lt | Le | Gt | Ge => (Slot::Var, Slot::Var, Slot::Var),
        Je | Jne | Jgt | Jlt | Jge | Jle => (Slot::Label, Slot::Var, Slot::Var),
        Jz | Jnz => (Slot::Label, Slot::Var, Slot::None),
        Jmp => (Slot::Label, Slot::None, Slot::None),
        Mov => (Slot::Var, Slot::Var, Slot::None),
        Load => (Slot::Var, Slot::VarOrImm, Slot::None),
        Store => (Slot::None, Slot::VarOrImm, Slot::Var),
        Loadi => (Slot::Var, Slot::Imm, Slot::None),
        Call => (Slot::Var, Slot::Label, Slot::VarOpt),
        Enter => (Slot::Var, Slot::None, Slot::None),
        Ret => (Slot::None, Slot::VarOpt, Slot::None),
        Input => (Slot::Var, Slot::None, Slot::None),
        Output => (Slot::None, Slot::Var, Slot::None),
        Nop | Halt => (Slot::None, Slot::None, Slot::None),
        Phi => (Slot::Var, Slot::None, Slot::None),
    }
}

fn validate(op: IrOp, tgt: &Operand, src1: &Operand, src2: &Operand) -> HrlResult<()> {
    let (tgt_slot, src1_slot, src2_slot) = slot_contract(op);
    if tgt_slot.accepts(tgt) && src1_slot.accepts(src1) && src2_slot.accepts(src2) {
        Ok(())
    } else {
        Err(HrlError::malformed_ir(format!(
            "operand contract violated for {}: tgt={}, src1={}, src2={}",
            op, tgt, src1, src2
        )))
    }
}

impl Instruction {
    fn build(op: IrOp, tgt: Operand, src1: Operand, src2: Operand) -> HrlResult<Instruction> {
        validate(op, &tgt, &src1, &src2)?;
        Ok(Instruction {
            op,
            tgt,
            src1,
            src2,
            phi_incomings: BTreeMap::new(),
            origin: None,
        })
    }

    /// Rebuild with the same opcode but different operands, preserving
    /// phi incomings and origin. Used by rewriting passes.
    pub fn with_operands(&self, tgt: Operand, src1: Operand, src2: Operand) -> HrlResult<Instruction> {
        validate(self.op, &tgt, &src1, &src2)?;
        Ok(Instruction {
            op: self.op,
            tgt,
            src1,
            src2,
            phi_incomings: self.phi_incomings.clone(),
            origin: self.origin,
        })
    }

    pub fn arithmetic(op: IrOp, tgt: Operand, src1: Operand, src2: Operand) -> HrlResult<Instruction> {
        if !matches!(op, IrOp::Add | IrOp::Sub | IrOp::Mul | IrOp::Div | IrOp::Mod) {
            return Err(HrlError::malformed_ir(format!("{} is not a binary arithmetic operation", op)));
        }
        Self::build(op, tgt, src1, src2)
    }

    pub fn neg(tgt: Operand, src1: Operand) -> HrlResult<Instruction> {
        Self::build(IrOp::Neg, tgt, src1, Operand::Null)
    }

    pub fn comparison(op: IrOp, tgt: Operand, src1: Operand, src2: Operand) -> HrlResult<Instruction> {
        if !op.is_comparison() {
            return Err(HrlError::malformed_ir(format!("{} is not a comparison operation", op)));
        }
        Self::build(op, tgt, src1, src2)
    }

    pub fn logical(op: IrOp, tgt: Operand, src1: Operand, src2: Operand) -> HrlResult<Instruction> {
        if !matches!(op, IrOp::And | IrOp::Or) {
            return Err(HrlError::malformed_ir(format!("{} is not a binary logical operation", op)));
        }
        Self::build(op, tgt, src1, src2)
    }

    pub fn not(tgt: Operand, src1: Operand) -> HrlResult<Instruction> {
        Self::build(IrOp::Not, tgt, src1, Operand::Null)
    }

    /// Fused conditional branch `J{cond} label, a, b`.
    pub fn branch(op: IrOp, label: Operand, src1: Operand, src2: Operand) -> HrlResult<Instruction> {
        if !matches!(op, IrOp::Je | IrOp::Jne | IrOp::Jgt | IrOp::Jlt | IrOp::Jge | IrOp::Jle) {
            return Err(HrlError::malformed_ir(format!("{} is not a fused conditional branch", op)));
        }
        Self::build(op, label, src1, src2)
    }

    /// `JZ`/`JNZ` on a single operand.
    pub fn branch_on(op: IrOp, label: Operand, src1: Operand) -> HrlResult<Instruction> {
        if !matches!(op, IrOp::Jz | IrOp::Jnz) {
            return Err(HrlError::malformed_ir(format!("{} is not a unary conditional branch", op)));
        }
        Self::build(op, label, src1, Operand::Null)
    }

    pub fn jmp(label: Operand) -> HrlResult<Instruction> {
        Self::build(IrOp::Jmp, label, Operand::Null, Operand::Null)
    }

    pub fn mov(tgt: Operand, src: Operand) -> HrlResult<Instruction> {
        Self::build(IrOp::Mov, tgt, src, Operand::Null)
    }

    /// Load from a floor slot (immediate), a global register, or
    /// indirectly through a local register's value.
    pub fn load(tgt: Operand, src: Operand) -> HrlResult<Instruction> {
        Self::build(IrOp::Load, tgt, src, Operand::Null)
    }

    /// Store `value` to the address named by `addr` (same addressing
    /// forms as `load`).
    pub fn store(addr: Operand, value: Operand) -> HrlResult<Instruction> {
        Self::build(IrOp::Store, Operand::Null, addr, value)
    }

    pub fn loadi(tgt: Operand, value: i32) -> HrlResult<Instruction> {
        Self::build(IrOp::Loadi, tgt, Operand::Immediate(value), Operand::Null)
    }

    pub fn call(tgt: Operand, label: Operand, argument: Option<Operand>) -> HrlResult<Instruction> {
        Self::build(IrOp::Call, tgt, label, argument.unwrap_or(Operand::Null))
    }

    pub fn enter(param: Operand) -> HrlResult<Instruction> {
        Self::build(IrOp::Enter, param, Operand::Null, Operand::Null)
    }

    pub fn ret(value: Option<Operand>) -> HrlResult<Instruction> {
        Self::build(IrOp::Ret, Operand::Null, value.unwrap_or(Operand::Null), Operand::Null)
    }

    pub fn input(tgt: Operand) -> HrlResult<Instruction> {
        Self::build(IrOp::Input, tgt, Operand::Null, Operand::Null)
    }

    pub fn output(src: Operand) -> HrlResult<Instruction> {
        Self::build(IrOp::Output, Operand::Null, src, Operand::Null)
    }

    pub fn nop() -> Instruction {
        Self::build(IrOp::Nop, Operand::Null, Operand::Null, Operand::Null).unwrap()
    }

    pub fn halt() -> Instruction {
        Self::build(IrOp::Halt, Operand::Null, Operand::Null, Operand::Null).unwrap()
    }

    /// A phi for local register `variable`; incomings start empty and are
    /// filled in by SSA construction.
    pub fn phi(variable: i32) -> HrlResult<Instruction> {
        Self::build(IrOp::Phi, Operand::Variable(variable), Operand::Null, Operand::Null)
    }

    pub fn with_origin(mut self, origin: Span) -> Instruction {
        self.origin = Some(origin);
        self
    }

    pub fn op(&self) -> IrOp {
        self.op
    }

    pub fn tgt(&self) -> &Operand {
        &self.tgt
    }

    pub fn src1(&self) -> &Operand {
        &self.src1
    }

    pub fn src2(&self) -> &Operand {
        &self.src2
    }

    pub fn origin(&self) -> Option<Span> {
        self.origin
    }

    pub fn phi_incomings(&self) -> &BTreeMap<String, PhiIncoming> {
        &self.phi_incomings
    }

    pub fn set_phi_incoming(&mut self, predecessor: impl Into<String>, incoming: PhiIncoming) {
        debug_assert_eq!(self.op, IrOp::Phi);
        self.phi_incomings.insert(predecessor.into(), incoming);
    }

    pub fn clear_phi_incomings(&mut self) {
        self.phi_incomings.clear();
    }

    pub fn set_phi_incomings(&mut self, incomings: BTreeMap<String, PhiIncoming>) {
        debug_assert_eq!(self.op, IrOp::Phi);
        self.phi_incomings = incomings;
    }

    /// The register this instruction defines, when it defines one.
    pub fn variable_def(&self) -> Option<i32> {
        self.tgt.register_id()
    }

    /// The registers this instruction reads (phi incomings excluded).
    pub fn variable_uses(&self) -> impl Iterator<Item = i32> + '_ {
        [&self.src1, &self.src2]
            .into_iter()
            .filter_map(|operand| operand.register_id())
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<7}", self.op.name())?;
        let mut first = true;
        for operand in [&self.tgt, &self.src1, &self.src2] {
            if operand.is_present() {
                if !first {
                    write!(f, ", ")?;
                }
                first = false;
                write!(f, "{}", operand)?;
            }
        }
        if self.op == IrOp::Phi {
            let incomings: Vec<String> = self
                .phi_incomings
                .iter()
                .map(|(pred, inc)| format!("[{}: v{}]", pred, inc.variable))
                .collect();
            write!(f, " {}", incomings.join(" "))?;
        }
        Ok(())
    }
}
