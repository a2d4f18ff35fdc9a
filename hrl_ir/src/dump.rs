//! Textual IR emission (`.hrasm`)
//!
//! One header per subroutine, one `label:` line per block, one indented
//! instruction per line. Operand rendering is configurable; emission is
//! deterministic for any given program and format.

use crate::{Instruction, IrOp, Operand, Program, Subroutine};
use std::fmt::Write;

/// How register operands are spelled in dumps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VariableFormat {
    /// Letter names: `a`..`z`, `aa`, `ab`, …; globals suffixed `_`.
    /// Immediates print as bare decimals.
    Named,
    /// `v<n>` / `gv<n>`; immediates as `#<n>`.
    #[default]
    Virtual,
    /// `%<n>` / `glb%<n>`; immediates as `#<n>`.
    Ssa,
}

/// Bijective base-26 letter name: 0 → `a`, 25 → `z`, 26 → `aa`.
fn letter_name(mut id: u32) -> String {
    let mut name = String::new();
    loop {
        name.insert(0, (b'a' + (id % 26) as u8) as char);
        id /= 26;
        if id == 0 {
            break;
        }
        id -= 1;
    }
    name
}

fn format_operand(operand: &Operand, format: VariableFormat) -> String {
    match (operand, format) {
        (Operand::Null, _) => String::new(),
        (Operand::Variable(id), VariableFormat::Named) => {
            if *id >= 0 {
                letter_name(*id as u32)
            } else {
                format!("{}_", letter_name((-id - 1) as u32))
            }
        }
        (Operand::Variable(id), VariableFormat::Virtual) => {
            if *id >= 0 {
                format!("v{}", id)
            } else {
                format!("gv{}", -id - 1)
            }
        }
        (Operand::Variable(id), VariableFormat::Ssa) => {
            if *id >= 0 {
                format!("%{}", id)
            } else {
                format!("glb%{}", -id - 1)
            }
        }
        (Operand::Immediate(value), VariableFormat::Named) => format!("{}", value),
        (Operand::Immediate(value), _) => format!("#{}", value),
        (Operand::Label(label), _) => label.clone(),
    }
}

/// Render one instruction: 7-padded mnemonic, then the populated
/// operands in tgt, src1, src2 order.
pub fn format_instruction(instruction: &Instruction, format: VariableFormat) -> String {
    let mut text = format!("{:<7}", instruction.op().name());
    let mut first = true;
    for operand in [instruction.tgt(), instruction.src1(), instruction.src2()] {
        if operand.is_present() {
            if !first {
                text.push_str(", ");
            }
            first = false;
            text.push_str(&format_operand(operand, format));
        }
    }

    if instruction.op() == IrOp::Phi {
        for (pred, incoming) in instruction.phi_incomings() {
            let value = format_operand(&Operand::Variable(incoming.variable), format);
            write!(text, " [{}: {}]", pred, value).expect("writing to a string");
        }
    }

    text
}

pub fn dump_subroutine(subroutine: &Subroutine, format: VariableFormat) -> String {
    let mut text = String::new();
    let param = if subroutine.has_param() { "param" } else { "" };
    let result = if subroutine.has_return() { "value" } else { "void" };
    writeln!(text, "def {}({}) -> {}:", subroutine.name(), param, result)
        .expect("writing to a string");

    for block in &subroutine.blocks {
        writeln!(text, "{}:", block.label()).expect("writing to a string");
        for instruction in &block.instructions {
            writeln!(text, "    {}", format_instruction(instruction, format))
                .expect("writing to a string");
        }
    }
    text
}

pub fn dump_program(program: &Program, format: VariableFormat) -> String {
    let mut text = String::new();
    for (index, subroutine) in program.subroutines.iter().enumerate() {
        if index > 0 {
            text.push('\n');
        }
        text.push_str(&dump_subroutine(subroutine, format));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BasicBlock;

    #[test]
    fn letter_names_roll_over() {
        assert_eq!(letter_name(0), "a");
        assert_eq!(letter_name(25), "z");
        assert_eq!(letter_name(26), "aa");
        assert_eq!(letter_name(27), "ab");
        assert_eq!(letter_name(51), "az");
        assert_eq!(letter_name(52), "ba");
    }

    #[test]
    fn operand_formats() {
        let local = Operand::Variable(2);
        let global = Operand::Variable(-1);
        let imm = Operand::Immediate(42);

        assert_eq!(format_operand(&local, VariableFormat::Named), "c");
        assert_eq!(format_operand(&global, VariableFormat::Named), "a_");
        assert_eq!(format_operand(&imm, VariableFormat::Named), "42");

        assert_eq!(format_operand(&local, VariableFormat::Virtual), "v2");
        assert_eq!(format_operand(&global, VariableFormat::Virtual), "gv0");
        assert_eq!(format_operand(&imm, VariableFormat::Virtual), "#42");

        assert_eq!(format_operand(&local, VariableFormat::Ssa), "%2");
        assert_eq!(format_operand(&global, VariableFormat::Ssa), "glb%0");
    }

    #[test]
    fn dump_layout() {
        let sub = Subroutine::new(
            "start",
            false,
            true,
            vec![BasicBlock::new("start", vec![
                Instruction::loadi(Operand::Variable(0), 0).unwrap(),
                Instruction::ret(Some(Operand::Variable(0))).unwrap(),
            ])],
        );
        let text = dump_subroutine(&sub, VariableFormat::Virtual);
        let expected = "def start() -> value:\nstart:\n    ldi    v0, #0\n    ret    v0\n";
        assert_eq!(text, expected);
    }
}
