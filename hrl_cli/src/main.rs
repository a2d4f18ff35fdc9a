//! HRL compiler command-line interface
//!
//! Compiles a `.hrl` source file through the full pipeline (lex, parse,
//! semantic analysis, TAC generation, optimization passes) and can dump
//! the IR, emit per-pass artifacts, or run the result in the IR
//! interpreter.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use hrl_common::HrBox;
use hrl_interpreter::Interpreter;
use hrl_ir::passes::{IrGenOptions, PassManager};
use hrl_ir::VariableFormat;
use log::debug;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
enum VarFormatArg {
    Named,
    #[default]
    Virtual,
    Ssa,
}

impl From<VarFormatArg> for VariableFormat {
    fn from(arg: VarFormatArg) -> Self {
        match arg {
            VarFormatArg::Named => VariableFormat::Named,
            VarFormatArg::Virtual => VariableFormat::Virtual,
            VarFormatArg::Ssa => VariableFormat::Ssa,
        }
    }
}

/// The HRL compiler and interpreter
#[derive(Parser)]
#[command(name = "hrlc")]
#[command(about = "Compile and run HRL programs")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Source file to compile
    source: PathBuf,

    /// Print the optimized IR to stdout
    #[arg(long)]
    dump_ir: bool,

    /// Write per-pass `.hrasm` and `.dot` artifacts with this path prefix
    #[arg(long, value_name = "PREFIX")]
    emit_ir: Option<String>,

    /// Run the compiled program in the IR interpreter
    #[arg(long)]
    run: bool,

    /// Comma-separated integers preloaded into the input queue
    #[arg(long, value_name = "VALUES", value_delimiter = ',')]
    input: Vec<i32>,

    /// Disable the optimization passes (SSA is still built)
    #[arg(long)]
    no_opt: bool,

    /// Operand spelling in IR dumps
    #[arg(long, value_enum, default_value = "virtual")]
    var_format: VarFormatArg,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut builder = env_logger::Builder::from_default_env();
    if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();

    match compile_and_run(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn compile_and_run(cli: &Cli) -> Result<ExitCode> {
    let source = std::fs::read_to_string(&cli.source)
        .with_context(|| format!("cannot read '{}'", cli.source.display()))?;
    let file_name = cli.source.display().to_string();

    let tokens = hrl_lexer::Lexer::new(&source).tokenize()?;
    debug!("lexed {} tokens", tokens.len());

    let unit = hrl_parser::Parser::new(tokens).parse_compilation_unit()?;
    debug!("parsed {} subroutines", unit.subroutines.len());

    let analyzer = hrl_semanalyzer::SemanticAnalyzer::new(&file_name);
    let (info, mut diagnostics) = match analyzer.analyze(&unit) {
        Ok(result) => result,
        Err(err) => {
            anyhow::bail!("{}", err);
        }
    };

    let mut program = hrl_ir::generate(&unit, &info)?;

    let options = if cli.no_opt {
        IrGenOptions::no_opt()
    } else {
        IrGenOptions::for_speed()
    };
    let mut manager =
        PassManager::with_default_pipeline_artifacts(options, cli.emit_ir.as_deref());
    let rc = manager.run(&mut program, &mut diagnostics, true);

    for message in diagnostics.messages() {
        eprintln!("{}", message);
    }
    if rc != 0 {
        return Ok(ExitCode::from(rc.clamp(1, 255) as u8));
    }

    if cli.dump_ir {
        print!("{}", hrl_ir::dump_program(&program, cli.var_format.into()));
    }

    if cli.run {
        let input = cli.input.iter().map(|&v| HrBox::int(v));
        let mut interpreter = Interpreter::new(&program)
            .with_ssa_enforcement(true)
            .with_input(input);
        match interpreter.exec() {
            Ok(()) => {
                for value in interpreter.output() {
                    println!("{}", value);
                }
            }
            Err(err) => {
                // A HALT is a normal way for a program to stop; its
                // output still counts.
                if err == hrl_interpreter::RuntimeError::HaltRequested {
                    for value in interpreter.output() {
                        println!("{}", value);
                    }
                }
                eprintln!("runtime error: {}", err);
                return Ok(ExitCode::from(err.exit_code() as u8));
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
