//! Analysis and transform passes over the HIR program
//!
//! Every pass implements [`Pass`]; the [`PassManager`] runs an ordered
//! pipeline, reporting failures into the shared diagnostics and
//! optionally dumping per-pass artifacts (textual IR and Graphviz).

pub mod build_cfg;
pub mod build_ssa;
pub mod dominance;
pub mod eliminate_dead_block;
pub mod liveness;
pub mod merge_cond_branch;
pub mod propagate_copy;
pub mod remove_dead_instr;
pub mod strip_empty_block;
pub mod strip_nop;
pub mod verify_ssa;

pub use build_cfg::BuildControlFlowGraphPass;
pub use build_ssa::BuildSsaPass;
pub use eliminate_dead_block::EliminateDeadBasicBlockPass;
pub use liveness::AnalyzeLivenessPass;
pub use merge_cond_branch::MergeConditionalBranchPass;
pub use propagate_copy::PropagateCopyPass;
pub use remove_dead_instr::RemoveDeadInstructionsPass;
pub use strip_empty_block::StripEmptyBasicBlockPass;
pub use strip_nop::StripUselessInstructionPass;
pub use verify_ssa::VerifySsaPass;

use crate::dump::{dump_program, VariableFormat};
use crate::graphviz::generate_graphviz;
use crate::{Program, ProgramMetadata, Subroutine};
use hrl_common::{Diagnostics, HrlResult, Location};
use log::{debug, error};
use std::path::PathBuf;

/// Diagnostic code reported when a pass fails.
const E_PASS_FAILED: u32 = 5001;

/// Knobs for the optimization pipeline
#[derive(Debug, Clone, Copy)]
pub struct IrGenOptions {
    pub strip_nops: bool,
    pub strip_useless_enter: bool,
    pub eliminate_dead_assignment: bool,
}

impl Default for IrGenOptions {
    fn default() -> Self {
        Self {
            strip_nops: true,
            strip_useless_enter: true,
            eliminate_dead_assignment: false,
        }
    }
}

impl IrGenOptions {
    pub fn for_speed() -> Self {
        Self {
            strip_nops: true,
            strip_useless_enter: true,
            eliminate_dead_assignment: true,
        }
    }

    pub fn no_opt() -> Self {
        Self {
            strip_nops: false,
            strip_useless_enter: false,
            eliminate_dead_assignment: false,
        }
    }
}

/// A transform or analysis over the program. The default `run`
/// implementation visits subroutines in declaration order; passes that
/// need whole-program context override it.
pub trait Pass {
    fn name(&self) -> &'static str;

    fn run_on_subroutine(
        &mut self,
        subroutine: &mut Subroutine,
        metadata: &mut ProgramMetadata,
    ) -> HrlResult<()>;

    fn run(&mut self, program: &mut Program) -> HrlResult<()> {
        for subroutine in program.subroutines.iter_mut() {
            self.run_on_subroutine(subroutine, &mut program.metadata)?;
        }
        Ok(())
    }

    /// Extra textual artifact (beyond the IR and Graphviz dumps) written
    /// to the entry's additional paths after the pass ran. Passes with
    /// nothing to add return `None`.
    fn extra_artifact_text(&self, _program: &Program) -> Option<String> {
        None
    }
}

struct PassEntry {
    pass: Box<dyn Pass>,
    /// `.hrasm` dump written after the pass completes, when set.
    asm_path: Option<PathBuf>,
    /// Graphviz dump written after the pass completes, when set.
    graph_path: Option<PathBuf>,
    /// Targets for the pass's own extra artifact, when it produces one.
    extra_paths: Vec<PathBuf>,
}

/// Ordered pass pipeline with fail-fast or keep-going policies
#[derive(Default)]
pub struct PassManager {
    entries: Vec<PassEntry>,
}

impl PassManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pass(&mut self, pass: Box<dyn Pass>) -> &mut Self {
        self.add_pass_with_artifacts(pass, None, None)
    }

    pub fn add_pass_with_artifacts(
        &mut self,
        pass: Box<dyn Pass>,
        asm_path: Option<PathBuf>,
        graph_path: Option<PathBuf>,
    ) -> &mut Self {
        self.entries.push(PassEntry {
            pass,
            asm_path,
            graph_path,
            extra_paths: Vec::new(),
        });
        self
    }

    pub fn add_extra_artifact_path(&mut self, path: PathBuf) -> &mut Self {
        if let Some(entry) = self.entries.last_mut() {
            entry.extra_paths.push(path);
        }
        self
    }

    /// Run every pass in order. A failing pass is reported into
    /// `diagnostics`; with `fail_fast` the pipeline stops there,
    /// otherwise it continues and the last failure code wins.
    pub fn run(
        &mut self,
        program: &mut Program,
        diagnostics: &mut Diagnostics,
        fail_fast: bool,
    ) -> i32 {
        let mut result = 0;

        for entry in &mut self.entries {
            let pass_name = entry.pass.name();
            debug!("[PassManager] running pass '{}'", pass_name);
            let rc = match entry.pass.run(program) {
                Ok(()) => 0,
                Err(err) => {
                    error!("[PassManager] pass '{}' failed: {}", pass_name, err);
                    diagnostics.error(
                        E_PASS_FAILED,
                        format!("IR pass '{}' failed: {}", pass_name, err),
                        Location::unknown(),
                    );
                    1
                }
            };

            // Artifacts are written even for a failing pass; the broken
            // state is exactly what needs inspecting.
            if let Some(path) = &entry.asm_path {
                let text = dump_program(program, VariableFormat::Virtual);
                if let Err(err) = std::fs::write(path, text) {
                    error!("[PassManager] cannot write '{}': {}", path.display(), err);
                }
            }
            if let Some(path) = &entry.graph_path {
                let text = generate_graphviz(program);
                if let Err(err) = std::fs::write(path, text) {
                    error!("[PassManager] cannot write '{}': {}", path.display(), err);
                }
            }
            if !entry.extra_paths.is_empty() {
                if let Some(text) = entry.pass.extra_artifact_text(program) {
                    for path in &entry.extra_paths {
                        if let Err(err) = std::fs::write(path, &text) {
                            error!("[PassManager] cannot write '{}': {}", path.display(), err);
                        }
                    }
                }
            }

            if rc != 0 {
                if fail_fast {
                    return rc;
                }
                result = rc;
            }
        }

        result
    }

    /// The standard pipeline: cleanup, CFG, dead-block pruning, liveness,
    /// SSA construction and verification, then SSA-based optimizations.
    pub fn with_default_pipeline(options: IrGenOptions) -> Self {
        Self::with_default_pipeline_artifacts(options, None)
    }

    /// Same pipeline, with per-pass artifacts written as
    /// `<prefix>.<n>.<pass>.hrasm` / `.dot` when a prefix is given.
    pub fn with_default_pipeline_artifacts(
        options: IrGenOptions,
        artifact_prefix: Option<&str>,
    ) -> Self {
        let mut manager = PassManager::new();
        let passes: Vec<Box<dyn Pass>> = vec![
            Box::new(StripUselessInstructionPass::new(options)),
            Box::new(StripEmptyBasicBlockPass),
            Box::new(MergeConditionalBranchPass),
            Box::new(BuildControlFlowGraphPass),
            Box::new(EliminateDeadBasicBlockPass),
            Box::new(AnalyzeLivenessPass),
            Box::new(BuildSsaPass),
            Box::new(VerifySsaPass),
            Box::new(PropagateCopyPass),
            Box::new(RemoveDeadInstructionsPass::new(options)),
            Box::new(VerifySsaPass),
        ];

        for (index, pass) in passes.into_iter().enumerate() {
            let (asm_path, graph_path) = match artifact_prefix {
                Some(prefix) => (
                    Some(PathBuf::from(format!("{}.{}.{}.hrasm", prefix, index, pass.name()))),
                    Some(PathBuf::from(format!("{}.{}.{}.dot", prefix, index, pass.name()))),
                ),
                None => (None, None),
            };
            manager.add_pass_with_artifacts(pass, asm_path, graph_path);
        }

        manager
    }
}
