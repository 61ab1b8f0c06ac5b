//! MiniAPL compile-and-run CLI
//!
//! Usage:
//!   miniapl program.apl
//!   miniapl program.apl --debug
//!   miniapl program.apl --emit-json -O 0

use clap::Parser as ClapParser;
use colored::Colorize;
use std::fs;
use std::io;
use std::process::ExitCode;
use tracing::Level;

use miniapl::{compile, run, OptLevel, RunOptions, VirtualMachine, DEFAULT_ENTRY_SYMBOL};

#[derive(ClapParser, Debug)]
#[command(name = "miniapl")]
#[command(author = "MiniAPL Team")]
#[command(version = "0.1.0")]
#[command(about = "Compiles and runs MiniAPL programs")]
struct Args {
    /// MiniAPL source file
    #[arg(value_name = "FILE")]
    file: String,

    /// Dump the generated program to stderr and verify it before running
    #[arg(short = 'd', long = "debug")]
    debug: bool,

    /// Optimization level
    #[arg(short = 'O', long = "opt-level", default_value = "1", value_parser = parse_opt_level)]
    opt_level: OptLevel,

    /// Print the generated program as JSON instead of running it
    #[arg(long = "emit-json")]
    emit_json: bool,

    /// Verbose output
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn parse_opt_level(s: &str) -> Result<OptLevel, String> {
    s.parse::<u8>()
        .ok()
        .and_then(OptLevel::from_level)
        .ok_or_else(|| format!("Invalid optimization level: {} (expected 0 or 1)", s))
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_target(false)
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::WARN })
        .init();

    let source = match fs::read_to_string(&args.file) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("{}: Failed to read file '{}': {}", "Error".red(), args.file, e);
            return ExitCode::FAILURE;
        }
    };

    let options = RunOptions {
        debug: args.debug,
        opt_level: args.opt_level,
        entry_symbol: DEFAULT_ENTRY_SYMBOL.to_string(),
    };

    let unit_name = format!("MiniAPL Module {}", args.file);
    let unit = match compile(&source, &unit_name, &options.entry_symbol) {
        Ok(unit) => unit,
        Err(e) => {
            eprintln!("{}: {}", "Compilation error".red(), e);
            return ExitCode::FAILURE;
        }
    };

    if args.emit_json {
        return match unit.to_json() {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}: Failed to serialize to JSON: {}", "Error".red(), e);
                ExitCode::FAILURE
            }
        };
    }

    if args.debug {
        eprintln!("{}", unit);
    }

    let mut engine = match VirtualMachine::create(io::stdout().lock()) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("{}: {}", "Engine error".red(), e);
            return ExitCode::FAILURE;
        }
    };

    match run(unit, &mut engine, &options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", "Execution error".red(), e);
            ExitCode::FAILURE
        }
    }
}
