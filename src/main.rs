use clap::{ArgAction, Parser as ClapParser};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use tracing::Level;

use glc::{
    format_diagnostics, format_error, format_simple_error, CodeGenerator, CompileError, Lexer,
    Parser,
};

#[derive(ClapParser, Debug)]
#[command(name = "glc")]
#[command(about = "Compiles G source to 32-bit x86 NASM assembly", long_about = None)]
struct Args {
    #[arg(help = "Input G source file")]
    input: PathBuf,

    #[arg(short, long, help = "Output assembly file (defaults to <input>.asm)")]
    output: Option<PathBuf>,

    #[arg(long, help = "Print tokens (lexer output)")]
    lex_only: bool,

    #[arg(long, help = "Print the parse tree (parser output)")]
    parse_only: bool,

    #[arg(short, long, action = ArgAction::Count, help = "Increase log verbosity (-v, -vv, -vvv)")]
    verbose: u8,
}

fn log_level(verbose: u8) -> Level {
    match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

fn render_front_end_error(input: &Path, source: &str, stage: &str, error: &CompileError) -> String {
    match error.location {
        Some(location) => format_error(
            &input.display().to_string(),
            source,
            location,
            &error.message,
        ),
        None => format_simple_error(&format!(
            "{} error in '{}': {}",
            stage,
            input.display(),
            error.message
        )),
    }
}

fn run(args: &Args) -> Result<(), String> {
    let source = fs::read_to_string(&args.input)
        .map_err(|e| format!("Error reading file '{}': {}", args.input.display(), e))?;

    let tokens = Lexer::new(&source)
        .tokenize()
        .map_err(|e| render_front_end_error(&args.input, &source, "Lexer", &e))?;

    if args.lex_only {
        for token in &tokens {
            println!("{}", token);
        }
        return Ok(());
    }

    let program = Parser::new(tokens)
        .parse()
        .map_err(|e| render_front_end_error(&args.input, &source, "Parser", &e))?;

    if args.parse_only {
        print!("{}", program);
        return Ok(());
    }

    let mut codegen = CodeGenerator::new();
    let assembly = codegen
        .generate(&program)
        .map_err(|diagnostics| format_diagnostics(&args.input.display().to_string(), &diagnostics))?;

    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| args.input.with_extension("asm"));

    fs::write(&output_path, assembly).map_err(|e| {
        format!(
            "Error writing output file '{}': {}",
            output_path.display(),
            e
        )
    })?;

    println!(
        "Compiled {} to {}",
        args.input.display(),
        output_path.display()
    );
    Ok(())
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(log_level(args.verbose))
        .init();

    if let Err(e) = run(&args) {
        eprintln!("{}", e);
        process::exit(1);
    }
}
