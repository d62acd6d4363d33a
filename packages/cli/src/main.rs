mod commands;
mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{
    eval, init, resources, validate, variables, EvalArgs, InitArgs, ResourcesArgs, ValidateArgs,
    VariablesArgs,
};
use tracing_subscriber::EnvFilter;

/// Trellis CLI - inspect and check trellis projects
#[derive(Parser, Debug)]
#[command(name = "trellis")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a trellis.config.json
    Init(InitArgs),

    /// Check a project snapshot for structural problems
    Validate(ValidateArgs),

    /// Evaluate an expression
    Eval(EvalArgs),

    /// Show the variables an instance can see
    Variables(VariablesArgs),

    /// List (and optionally load) the resources of a page
    Resources(ResourcesArgs),
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let cwd = match std::env::current_dir() {
        Ok(dir) => dir.display().to_string(),
        Err(err) => {
            eprintln!("{} Cannot get current directory: {}", "Error:".red().bold(), err);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Init(args) => init(args, &cwd),
        Command::Validate(args) => validate(args, &cwd),
        Command::Eval(args) => eval(args, &cwd),
        Command::Variables(args) => variables(args, &cwd),
        Command::Resources(args) => resources(args, &cwd),
    };

    if let Err(err) = result {
        eprintln!();
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}
