//! Whole-pipeline tests: source text through TAC generation and the
//! default pass pipeline, checking the structural invariants the middle
//! end promises.

use hrl_common::{Diagnostics, GLOBAL_SCOPE_ID};
use hrl_ir::passes::{IrGenOptions, PassManager};
use hrl_ir::{dump_program, IrOp, Program, VariableFormat};
use std::collections::{BTreeSet, HashMap};

fn compile(source: &str) -> Program {
    let tokens = hrl_lexer::Lexer::new(source).tokenize().expect("lexing");
    let unit = hrl_parser::Parser::new(tokens)
        .parse_compilation_unit()
        .expect("parsing");
    let (info, _) = hrl_semanalyzer::SemanticAnalyzer::new("test.hrl")
        .analyze(&unit)
        .expect("semantic analysis");
    hrl_ir::generate(&unit, &info).expect("TAC generation")
}

fn optimized(source: &str) -> Program {
    let mut program = compile(source);
    let mut diagnostics = Diagnostics::new();
    let rc = PassManager::with_default_pipeline(IrGenOptions::for_speed())
        .run(&mut program, &mut diagnostics, true);
    assert_eq!(rc, 0, "pipeline failed: {:?}", diagnostics.messages());
    program
}

fn phi_count(program: &Program, subroutine: &str) -> usize {
    program
        .subroutine(subroutine)
        .unwrap()
        .blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .filter(|i| i.op() == IrOp::Phi)
        .count()
}

#[test]
fn global_subroutine_calls_start() {
    let program = compile("function start() { return 0; }");
    let global = program.subroutine(GLOBAL_SCOPE_ID).expect("global scope");
    assert!(!global.has_param());
    assert!(!global.has_return());

    let last = global
        .blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .last()
        .expect("global scope is not empty");
    assert_eq!(last.op(), IrOp::Call);
    assert_eq!(last.src1().label(), Some("start"));
}

#[test]
fn empty_function_lowers_to_enter_loadi_ret() {
    let program = compile("function start() {}");
    let start = program.subroutine("start").unwrap();
    let ops: Vec<IrOp> = start
        .blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .map(|i| i.op())
        .collect();
    assert_eq!(ops, vec![IrOp::Enter, IrOp::Loadi, IrOp::Ret]);
}

#[test]
fn empty_subproc_lowers_to_enter_ret() {
    let program = compile("sub helper() {} function start() { helper(); }");
    let helper = program.subroutine("helper").unwrap();
    let ops: Vec<IrOp> = helper
        .blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .map(|i| i.op())
        .collect();
    assert_eq!(ops, vec![IrOp::Enter, IrOp::Ret]);
    assert!(!helper.has_return());
}

#[test]
fn blocks_split_at_labels_and_after_control_transfers() {
    let program = compile(
        "function start() { let n = inbox(); if (n > 0) outbox(1); else outbox(0); }",
    );
    let start = program.subroutine("start").unwrap();

    // Every block label is unique, and only terminators transfer control.
    let mut seen = BTreeSet::new();
    for block in &start.blocks {
        assert!(seen.insert(block.label().to_string()), "duplicate label");
        for instruction in &block.instructions[..block.instructions.len().saturating_sub(1)] {
            assert!(
                !instruction.op().is_control_transfer(),
                "control transfer in the middle of '{}'",
                block.label()
            );
        }
    }
}

#[test]
fn cfg_edges_match_terminator_rules() {
    let program = optimized(
        "function start() {
            let n = inbox();
            while (n != 0) { outbox(n); n = n - 1; }
        }",
    );

    for sub in &program.subroutines {
        let cfg = sub.cfg.as_ref().expect("pipeline builds the CFG");
        assert_eq!(cfg.graph.vertex_count(), sub.blocks.len());

        for (vertex, block) in sub.blocks.iter().enumerate() {
            let succs: BTreeSet<usize> = cfg.graph.successors(vertex).iter().copied().collect();
            let mut expected = BTreeSet::new();

            match block.terminator() {
                None => {
                    if vertex + 1 < sub.blocks.len() {
                        expected.insert(vertex + 1);
                    }
                }
                Some(terminator) => {
                    let op = terminator.op();
                    if let Some(label) = terminator.tgt().label() {
                        expected.insert(sub.block_index(label).expect("target must exist"));
                    }
                    let falls_through = match op {
                        IrOp::Jmp | IrOp::Ret | IrOp::Halt => false,
                        _ => true,
                    };
                    if falls_through && vertex + 1 < sub.blocks.len() {
                        expected.insert(vertex + 1);
                    }
                }
            }

            assert_eq!(succs, expected, "edges of block '{}'", block.label());
        }
    }
}

#[test]
fn liveness_reaches_a_fixed_point() {
    use hrl_ir::passes::{AnalyzeLivenessPass, BuildControlFlowGraphPass, Pass};

    let mut program = compile(
        "function start() {
            let n = inbox();
            while (n != 0) { outbox(n); n = n - 1; }
        }",
    );
    let mut cfg_pass = BuildControlFlowGraphPass;
    let mut liveness = AnalyzeLivenessPass;
    cfg_pass.run(&mut program).unwrap();
    liveness.run(&mut program).unwrap();

    for sub in &program.subroutines {
        let cfg = sub.cfg.as_ref().unwrap();
        for vertex in 0..sub.blocks.len() {
            let block = &sub.blocks[vertex];

            let mut expected_out = BTreeSet::new();
            for &succ in cfg.graph.successors(vertex) {
                expected_out.extend(sub.blocks[succ].in_set.iter().copied());
            }
            assert_eq!(block.out_set, expected_out, "OUT of '{}'", block.label());

            let mut expected_in = block.use_set.clone();
            expected_in.extend(expected_out.difference(&block.def_set).copied());
            assert_eq!(block.in_set, expected_in, "IN of '{}'", block.label());

            // Sets only ever hold local ids.
            for set in [&block.def_set, &block.use_set, &block.in_set, &block.out_set] {
                assert!(set.iter().all(|&id| id >= 0));
            }
        }
    }
}

#[test]
fn ssa_has_single_definitions_and_phi_bijections() {
    let program = optimized(
        "function start() {
            let n = inbox();
            let sum = 0;
            while (n != 0) {
                if (n > 1) sum = sum + n; else sum = sum + 1;
                n = n - 1;
            }
            outbox(sum);
        }",
    );

    for sub in &program.subroutines {
        assert!(sub.ssa, "'{}' should be in SSA form", sub.name());
        let cfg = sub.cfg.as_ref().unwrap();

        let mut definitions: HashMap<i32, usize> = HashMap::new();
        for block in &sub.blocks {
            for instruction in &block.instructions {
                if let Some(defined) = instruction.tgt().local_id() {
                    *definitions.entry(defined).or_insert(0) += 1;
                }
            }
        }
        for (&register, &count) in &definitions {
            assert_eq!(count, 1, "v{} defined {} times in '{}'", register, count, sub.name());
        }

        for (vertex, block) in sub.blocks.iter().enumerate() {
            for instruction in &block.instructions {
                if instruction.op() != IrOp::Phi {
                    continue;
                }
                let keys: BTreeSet<&str> = instruction
                    .phi_incomings()
                    .keys()
                    .map(String::as_str)
                    .collect();
                let preds: BTreeSet<&str> = cfg
                    .graph
                    .predecessors(vertex)
                    .iter()
                    .map(|&p| sub.blocks[p].label())
                    .collect();
                assert_eq!(keys, preds, "phi in '{}'", block.label());
            }
        }
    }
}

#[test]
fn renumbering_is_dense() {
    use hrl_ir::passes::{
        AnalyzeLivenessPass, BuildControlFlowGraphPass, BuildSsaPass,
        EliminateDeadBasicBlockPass, MergeConditionalBranchPass, Pass,
        StripEmptyBasicBlockPass, StripUselessInstructionPass,
    };

    // Density is a property of SSA construction itself; the later
    // optimizers are allowed to delete instructions and leave gaps.
    let mut program = compile(
        "function start() { let n = inbox(); while (n != 0) { outbox(n); n = n - 1; } }",
    );
    StripUselessInstructionPass::new(IrGenOptions::for_speed()).run(&mut program).unwrap();
    StripEmptyBasicBlockPass.run(&mut program).unwrap();
    MergeConditionalBranchPass.run(&mut program).unwrap();
    BuildControlFlowGraphPass.run(&mut program).unwrap();
    EliminateDeadBasicBlockPass.run(&mut program).unwrap();
    AnalyzeLivenessPass.run(&mut program).unwrap();
    BuildSsaPass.run(&mut program).unwrap();

    for sub in &program.subroutines {
        let mut registers = BTreeSet::new();
        for block in &sub.blocks {
            for instruction in &block.instructions {
                registers.extend(instruction.tgt().local_id());
                registers.extend(instruction.variable_uses().filter(|&id| id >= 0));
                registers.extend(
                    instruction
                        .phi_incomings()
                        .values()
                        .map(|inc| inc.variable),
                );
            }
        }
        let expected: BTreeSet<i32> = (0..registers.len() as i32).collect();
        assert_eq!(registers, expected, "registers of '{}'", sub.name());
    }
}

#[test]
fn diamond_join_merges_every_branch_definition() {
    let program = optimized(
        "function start() {
            let n = inbox();
            let r = 0;
            if (n > 0) r = 1; else r = 2;
            outbox(r);
        }",
    );
    // Minimal SSA merges r plus the two branch-local literal
    // temporaries whose definition blocks share the join as frontier.
    assert_eq!(phi_count(&program, "start"), 3);
}

#[test]
fn dead_after_merge_variable_still_gets_a_phi() {
    // r is never read after the join; the frontier criterion places its
    // phi regardless of liveness. Dead-assignment elimination stays off
    // here so the count reflects construction, not later cleanup.
    let mut program = compile(
        "function start() {
            let n = inbox();
            let r = 0;
            if (n > 0) r = 1; else r = 2;
            outbox(n);
        }",
    );
    let mut diagnostics = Diagnostics::new();
    let rc = PassManager::with_default_pipeline(IrGenOptions::default())
        .run(&mut program, &mut diagnostics, true);
    assert_eq!(rc, 0, "pipeline failed: {:?}", diagnostics.messages());
    assert_eq!(phi_count(&program, "start"), 3);
}

#[test]
fn loop_header_merges_every_loop_defined_register() {
    let program = optimized(
        "function start() { let n = inbox(); while (n != 0) { outbox(n); n = n - 1; } }",
    );
    // n, the head's comparison literal, and the three body temporaries
    // are all redefined per iteration and all merge at the header.
    assert_eq!(phi_count(&program, "start"), 5);
}

/// The iterated-dominance-frontier closure, computed independently of
/// the SSA builder, over a subroutine that has not been rewritten yet.
fn minimal_phi_reference(sub: &hrl_ir::Subroutine, dominance: &hrl_ir::DominanceInfo) -> usize {
    let mut def_map: std::collections::BTreeMap<i32, BTreeSet<usize>> = Default::default();
    for (vertex, block) in sub.blocks.iter().enumerate() {
        for instruction in &block.instructions {
            if let Some(defined) = instruction.tgt().local_id() {
                def_map.entry(defined).or_default().insert(vertex);
            }
        }
    }

    let mut count = 0;
    for def_blocks in def_map.values() {
        let mut work: Vec<usize> = def_blocks.iter().copied().collect();
        let mut has_phi = BTreeSet::new();
        while let Some(x) = work.pop() {
            for &y in &dominance.frontiers[x] {
                if has_phi.insert(y) {
                    count += 1;
                    if !def_blocks.contains(&y) {
                        work.push(y);
                    }
                }
            }
        }
    }
    count
}

#[test]
fn phi_counts_match_the_minimal_ssa_reference() {
    use hrl_ir::passes::dominance::compute_dominance;
    use hrl_ir::passes::{
        AnalyzeLivenessPass, BuildControlFlowGraphPass, BuildSsaPass,
        EliminateDeadBasicBlockPass, MergeConditionalBranchPass, Pass,
        StripEmptyBasicBlockPass, StripUselessInstructionPass,
    };

    let sources = [
        "function start() {
            let i = inbox();
            while (i != 0) {
                let j = i;
                while (j != 0) { outbox(j); j = j - 1; }
                i = i - 1;
            }
        }",
        "function start() {
            let n = inbox();
            let r = 0;
            if (n > 0) r = 1; else r = 2;
            outbox(r);
        }",
        "function start() { let a = inbox(); let b = inbox(); outbox(a + b); }",
    ];

    for source in sources {
        let mut program = compile(source);
        StripUselessInstructionPass::new(IrGenOptions::for_speed()).run(&mut program).unwrap();
        StripEmptyBasicBlockPass.run(&mut program).unwrap();
        MergeConditionalBranchPass.run(&mut program).unwrap();
        BuildControlFlowGraphPass.run(&mut program).unwrap();
        EliminateDeadBasicBlockPass.run(&mut program).unwrap();
        AnalyzeLivenessPass.run(&mut program).unwrap();

        let expected: Vec<usize> = program
            .subroutines
            .iter()
            .map(|sub| {
                let cfg = sub.cfg.as_ref().unwrap();
                let dominance = compute_dominance(&cfg.graph, cfg.entry).unwrap();
                minimal_phi_reference(sub, &dominance)
            })
            .collect();

        BuildSsaPass.run(&mut program).unwrap();

        for (sub, expected) in program.subroutines.iter().zip(expected) {
            let actual = sub
                .blocks
                .iter()
                .flat_map(|b| &b.instructions)
                .filter(|i| i.op() == IrOp::Phi)
                .count();
            assert_eq!(actual, expected, "phi count of '{}' in: {}", sub.name(), source);
        }
    }
}

#[test]
fn straight_line_code_has_no_phis() {
    let program = optimized(
        "function start() { let a = inbox(); let b = inbox(); outbox(a + b); }",
    );
    assert_eq!(phi_count(&program, "start"), 0);
}

#[test]
fn comparisons_fuse_into_conditional_branches() {
    let program = optimized(
        "function start() { let n = inbox(); if (n > 0) outbox(1); else outbox(0); }",
    );
    let start = program.subroutine("start").unwrap();
    let ops: Vec<IrOp> = start
        .blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .map(|i| i.op())
        .collect();
    assert!(ops.contains(&IrOp::Jle), "expected a fused branch, got {:?}", ops);
    assert!(!ops.contains(&IrOp::Gt), "comparison should be fused away");
    assert!(!ops.contains(&IrOp::Jz));
}

#[test]
fn unreachable_tail_blocks_are_eliminated() {
    let program = optimized("function start() { return 1; outbox(9); }");
    let start = program.subroutine("start").unwrap();
    for block in &start.blocks {
        for instruction in &block.instructions {
            assert_ne!(instruction.op(), IrOp::Output, "unreachable OUTPUT survived");
        }
    }
}

#[test]
fn emission_is_deterministic() {
    let source = "function start() {
        let n = inbox();
        while (n != 0) { outbox(n); n = n - 1; }
    }";
    let first = dump_program(&optimized(source), VariableFormat::Virtual);
    let second = dump_program(&optimized(source), VariableFormat::Virtual);
    assert_eq!(first, second);
    assert!(first.contains("def start() -> value:"));
}
