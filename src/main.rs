use std::fs;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;

use puppy::compiler;
use puppy::messages::{self, EventKind};

#[derive(Parser)]
#[command(name = "puppy", version, about = "Puppy to JavaScript transpiler")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a source file and print the generated routine
    Compile { file: String },
    /// Check a source file and report diagnostics only
    Check { file: String },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::Compile { file } => run(&file, true),
        Command::Check { file } => run(&file, false),
    }
}

fn run(path: &str, emit: bool) -> ExitCode {
    let source = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{} {}: {}", "error:".red().bold(), path, e);
            return ExitCode::FAILURE;
        }
    };

    let code = compiler::compile(&source);
    for e in &code.errors {
        report(EventKind::Error, e);
    }
    for w in &code.warnings {
        report(EventKind::Warning, w);
    }
    for n in &code.notices {
        report(n.kind, n);
    }

    if !code.ok() {
        return ExitCode::FAILURE;
    }
    if emit {
        println!("{}", code.main);
    }
    ExitCode::SUCCESS
}

fn report(kind: EventKind, event: &messages::SourceEvent) {
    let line = messages::render_line(event);
    let label = match kind {
        EventKind::Error => format!("{}:", kind.label()).red().bold(),
        EventKind::Warning => format!("{}:", kind.label()).yellow().bold(),
        _ => format!("{}:", kind.label()).cyan(),
    };
    eprintln!("{} {}", label, line);
    // hints, if any, follow on their own lines
    for hint in messages::render(event).lines().skip(1) {
        eprintln!("  {}", hint.dimmed());
    }
}
