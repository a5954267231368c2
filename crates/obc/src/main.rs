//! obc - Oberon-07 front end driver
//!
//! Usage: obc <input.ob>

use anyhow::Context as _;
use clap::Parser as ClapParser;
use oberon_compiler::lexer::Lexer;
use oberon_compiler::{check_module, DiagnosticReporter};
use std::fs;
use std::path::PathBuf;
use std::process;

#[derive(ClapParser, Debug)]
#[command(name = "obc")]
#[command(version = "0.1.0")]
#[command(about = "Oberon-07 parser and semantic analyzer", long_about = None)]
struct Args {
    /// Input source file
    #[arg(required = true)]
    input: PathBuf,

    /// Dump tokens (for debugging)
    #[arg(long)]
    dump_tokens: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("error: {:#}", e);
        process::exit(1);
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let source = fs::read_to_string(&args.input)
        .with_context(|| format!("cannot read {}", args.input.display()))?;
    let filename = args.input.display().to_string();

    let mut reporter = DiagnosticReporter::new();
    let file_id = reporter.add_file(&filename, &source);

    if args.verbose {
        eprintln!("Checking {}...", filename);
    }

    if args.dump_tokens {
        match Lexer::new(&source).tokenize_all() {
            Ok(tokens) => {
                for token in tokens {
                    eprintln!("{:?} {}", token.span, token.kind);
                }
            }
            Err(error) => {
                reporter.report_error(file_id, &error);
                anyhow::bail!("compilation failed")
            }
        }
    }

    match check_module(&source) {
        Ok(module) => {
            println!("module {}: OK", module.name);
            Ok(())
        }
        Err(error) => {
            reporter.report_error(file_id, &error);
            anyhow::bail!("compilation failed")
        }
    }
}
