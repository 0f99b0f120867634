//! Lort CLI - a command-line host for Loreline scripts.
//!
//! This is the main entry point for the lort application. It uses clap for
//! argument parsing and dispatches to the command handlers: `run` plays a
//! script interactively, `check` reports diagnostics, `fmt` reprints the
//! canonical form, `extract` exports the translation table.

mod commands;
mod config;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{
    check::{run_check, CheckArgs},
    extract::{run_extract, ExtractArgs},
    fmt::{run_fmt, FmtArgs},
    run::{run_run, RunArgs},
};
use config::Config;
use error::{LortError, Result};

/// Lort - a command-line host for Loreline scripts
#[derive(Parser, Debug)]
#[command(name = "lort")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Play, check and format Loreline scripts", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, env = "LORT_VERBOSE")]
    verbose: bool,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "LORT_CONFIG")]
    config: Option<PathBuf>,

    /// Disable color output
    #[arg(long, global = true, env = "LORT_NO_COLOR")]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands for the lort CLI.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a script interactively in the terminal
    Run(RunCommand),

    /// Parse a script and report every diagnostic
    Check(CheckCommand),

    /// Reprint a script in canonical form
    Fmt(FmtCommand),

    /// Export the translation table of a script
    Extract(ExtractCommand),
}

/// Arguments for the run subcommand.
#[derive(Parser, Debug)]
struct RunCommand {
    /// Script file to play
    file: PathBuf,

    /// Beat to start at (default: the first declared beat)
    #[arg(short, long)]
    beat: Option<String>,

    /// RNG seed for a reproducible session
    #[arg(short, long)]
    seed: Option<u64>,

    /// Reject reads of undeclared names
    #[arg(long)]
    strict: bool,
}

/// Arguments for the check subcommand.
#[derive(Parser, Debug)]
struct CheckCommand {
    /// Script file to check
    file: PathBuf,
}

/// Arguments for the fmt subcommand.
#[derive(Parser, Debug)]
struct FmtCommand {
    /// Script file to format
    file: PathBuf,

    /// Rewrite the file in place instead of printing to stdout
    #[arg(short, long)]
    write: bool,

    /// Indentation unit override
    #[arg(long)]
    indent: Option<String>,
}

/// Arguments for the extract subcommand.
#[derive(Parser, Debug)]
struct ExtractCommand {
    /// Script file to extract from
    file: PathBuf,

    /// Output file (stdout when absent)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

/// Main entry point for the lort CLI.
fn main() {
    let cli = Cli::parse();
    if let Err(err) = try_main(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn try_main(cli: Cli) -> Result<()> {
    init_logging(cli.verbose, cli.no_color)?;
    let config = load_config(cli.config.as_deref())?;
    execute_command(cli.command, cli.verbose, config)
}

/// Initialize the logging system.
fn init_logging(verbose: bool, no_color: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let layer = fmt::layer()
        .with_ansi(!no_color)
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .map_err(|err| LortError::Config(format!("failed to initialize logging: {err}")))?;
    Ok(())
}

/// Load configuration from file or use defaults.
fn load_config(config_path: Option<&std::path::Path>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
}

/// Execute the selected command.
fn execute_command(command: Commands, verbose: bool, config: Config) -> Result<()> {
    let verbose = verbose || config.verbose;
    match command {
        Commands::Run(args) => run_run(
            RunArgs {
                file: args.file,
                beat: args.beat,
                seed: args.seed,
                strict: args.strict,
                verbose,
            },
            &config,
        ),
        Commands::Check(args) => run_check(CheckArgs {
            file: args.file,
            verbose,
        }),
        Commands::Fmt(args) => run_fmt(
            FmtArgs {
                file: args.file,
                write: args.write,
                indent: args.indent,
                verbose,
            },
            &config,
        ),
        Commands::Extract(args) => run_extract(ExtractArgs {
            file: args.file,
            output: args.output,
            verbose,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_run() {
        let cli = Cli::parse_from(["lort", "run", "story.lor"]);
        assert!(matches!(cli.command, Commands::Run(_)));
    }

    #[test]
    fn test_cli_parse_run_with_beat_and_seed() {
        let cli = Cli::parse_from(["lort", "run", "story.lor", "--beat", "Intro", "--seed", "7"]);
        if let Commands::Run(args) = cli.command {
            assert_eq!(args.beat.as_deref(), Some("Intro"));
            assert_eq!(args.seed, Some(7));
            assert!(!args.strict);
        } else {
            panic!("expected run command");
        }
    }

    #[test]
    fn test_cli_parse_run_strict() {
        let cli = Cli::parse_from(["lort", "run", "story.lor", "--strict"]);
        if let Commands::Run(args) = cli.command {
            assert!(args.strict);
        } else {
            panic!("expected run command");
        }
    }

    #[test]
    fn test_cli_parse_check() {
        let cli = Cli::parse_from(["lort", "check", "story.lor"]);
        if let Commands::Check(args) = cli.command {
            assert_eq!(args.file, PathBuf::from("story.lor"));
        } else {
            panic!("expected check command");
        }
    }

    #[test]
    fn test_cli_parse_fmt_write() {
        let cli = Cli::parse_from(["lort", "fmt", "story.lor", "--write"]);
        if let Commands::Fmt(args) = cli.command {
            assert!(args.write);
            assert_eq!(args.indent, None);
        } else {
            panic!("expected fmt command");
        }
    }

    #[test]
    fn test_cli_parse_fmt_indent() {
        let cli = Cli::parse_from(["lort", "fmt", "story.lor", "--indent", "    "]);
        if let Commands::Fmt(args) = cli.command {
            assert_eq!(args.indent.as_deref(), Some("    "));
        } else {
            panic!("expected fmt command");
        }
    }

    #[test]
    fn test_cli_parse_extract_output() {
        let cli = Cli::parse_from(["lort", "extract", "story.lor", "--output", "strings.json"]);
        if let Commands::Extract(args) = cli.command {
            assert_eq!(args.output, Some(PathBuf::from("strings.json")));
        } else {
            panic!("expected extract command");
        }
    }

    #[test]
    fn test_cli_parse_global_flags() {
        let cli = Cli::parse_from(["lort", "--verbose", "--no-color", "check", "story.lor"]);
        assert!(cli.verbose);
        assert!(cli.no_color);
    }

    #[test]
    fn test_cli_parse_global_config() {
        let cli = Cli::parse_from(["lort", "--config", "custom.toml", "check", "story.lor"]);
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
    }
}
