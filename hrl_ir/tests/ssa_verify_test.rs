//! Verifier behavior on handcrafted SSA, both well-formed and broken.

use hrl_common::HrlError;
use hrl_ir::passes::{BuildControlFlowGraphPass, Pass, VerifySsaPass};
use hrl_ir::{
    BasicBlock, Instruction, IrOp, Operand, PhiIncoming, Program, ProgramMetadata, Subroutine,
};

fn var(id: i32) -> Operand {
    Operand::Variable(id)
}

fn label(name: &str) -> Operand {
    Operand::Label(name.to_string())
}

/// A diamond with a well-formed phi at the join:
///
/// ```text
/// f:      in v0; jnz f.then, v0
/// f.else: ldi v1, 0; jmp f.join
/// f.then: ldi v2, 1
/// f.join: v3 = phi [f.else: v1] [f.then: v2]; out v3; ret
/// ```
fn diamond() -> Subroutine {
    let mut phi = Instruction::phi(3).unwrap();
    phi.set_phi_incoming(
        "f.else",
        PhiIncoming { variable: 1, def_block: "f.else".to_string() },
    );
    phi.set_phi_incoming(
        "f.then",
        PhiIncoming { variable: 2, def_block: "f.then".to_string() },
    );

    Subroutine::new(
        "f",
        false,
        false,
        vec![
            BasicBlock::new("f", vec![
                Instruction::input(var(0)).unwrap(),
                Instruction::branch_on(IrOp::Jnz, label("f.then"), var(0)).unwrap(),
            ]),
            BasicBlock::new("f.else", vec![
                Instruction::loadi(var(1), 0).unwrap(),
                Instruction::jmp(label("f.join")).unwrap(),
            ]),
            BasicBlock::new("f.then", vec![Instruction::loadi(var(2), 1).unwrap()]),
            BasicBlock::new("f.join", vec![
                phi,
                Instruction::output(var(3)).unwrap(),
                Instruction::ret(None).unwrap(),
            ]),
        ],
    )
}

fn verify(sub: Subroutine) -> Result<(), HrlError> {
    let mut program = Program::new(vec![sub], ProgramMetadata::default());
    BuildControlFlowGraphPass.run(&mut program)?;
    VerifySsaPass.run(&mut program)
}

#[test]
fn well_formed_ssa_passes() {
    assert!(verify(diamond()).is_ok());
}

#[test]
fn second_definition_is_rejected() {
    let mut sub = diamond();
    // Inject a second definition of v1 into the then-branch.
    sub.blocks[2]
        .instructions
        .push(Instruction::loadi(var(1), 9).unwrap());

    let err = verify(sub).unwrap_err();
    let HrlError::SsaViolation { message } = err else {
        panic!("expected an SSA violation");
    };
    assert!(message.contains("defined more than once"), "{}", message);
}

#[test]
fn use_before_definition_is_rejected() {
    let mut sub = diamond();
    // v7 has no definition anywhere.
    sub.blocks[1].instructions[0] = Instruction::mov(var(1), var(7)).unwrap();

    let err = verify(sub).unwrap_err();
    let HrlError::SsaViolation { message } = err else {
        panic!("expected an SSA violation");
    };
    assert!(message.contains("used before assignment"), "{}", message);
}

#[test]
fn phi_with_missing_predecessor_is_rejected() {
    let mut sub = diamond();
    // Drop one incoming: the key set no longer matches the predecessors.
    let phi = &mut sub.blocks[3].instructions[0];
    let mut incomings = phi.phi_incomings().clone();
    incomings.remove("f.else");
    phi.set_phi_incomings(incomings);

    let err = verify(sub).unwrap_err();
    let HrlError::SsaViolation { message } = err else {
        panic!("expected an SSA violation");
    };
    assert!(message.contains("predecessors"), "{}", message);
}

#[test]
fn phi_with_foreign_predecessor_is_rejected() {
    let mut sub = diamond();
    // Key a phi incoming by a block that is not a predecessor.
    let phi = &mut sub.blocks[3].instructions[0];
    phi.set_phi_incoming(
        "f",
        PhiIncoming { variable: 0, def_block: "f".to_string() },
    );

    assert!(verify(sub).is_err());
}

#[test]
fn phi_incoming_without_definition_is_rejected() {
    let mut sub = diamond();
    let phi = &mut sub.blocks[3].instructions[0];
    phi.set_phi_incoming(
        "f.else",
        PhiIncoming { variable: 40, def_block: "f.else".to_string() },
    );

    let err = verify(sub).unwrap_err();
    let HrlError::SsaViolation { message } = err else {
        panic!("expected an SSA violation");
    };
    assert!(message.contains("never defined"), "{}", message);
}
