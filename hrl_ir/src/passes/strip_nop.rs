//! Removal of NOPs and useless ENTERs
//!
//! NOPs only exist to pin label positions during TAC generation and
//! carry no behavior. An ENTER in a subroutine without a parameter
//! defines a register nothing reads.

use crate::passes::{IrGenOptions, Pass};
use crate::{IrOp, ProgramMetadata, Subroutine};
use hrl_common::HrlResult;

pub struct StripUselessInstructionPass {
    options: IrGenOptions,
}

impl StripUselessInstructionPass {
    pub fn new(options: IrGenOptions) -> Self {
        Self { options }
    }
}

impl Pass for StripUselessInstructionPass {
    fn name(&self) -> &'static str {
        "strip-useless-instruction"
    }

    fn run_on_subroutine(
        &mut self,
        subroutine: &mut Subroutine,
        _metadata: &mut ProgramMetadata,
    ) -> HrlResult<()> {
        let strip_nops = self.options.strip_nops;
        let strip_enter = self.options.strip_useless_enter && !subroutine.has_param();

        for block in &mut subroutine.blocks {
            block.instructions.retain(|instruction| match instruction.op() {
                IrOp::Nop => !strip_nops,
                IrOp::Enter => !strip_enter,
                _ => true,
            });
        }
        Ok(())
    }
}
