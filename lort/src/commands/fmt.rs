//! Fmt command: reprint a script in canonical form.

use std::path::PathBuf;

use loreline::PrintOptions;

use crate::commands::common::load_script;
use crate::config::Config;
use crate::error::{LortError, Result};

/// Arguments for the fmt command.
#[derive(Debug, Clone)]
pub struct FmtArgs {
    /// Script to format.
    pub file: PathBuf,
    /// Rewrite the file in place instead of printing to stdout.
    pub write: bool,
    /// Indentation override.
    pub indent: Option<String>,
    /// Enable verbose output.
    pub verbose: bool,
}

/// Print the canonical form of the script.
///
/// Note that imports are resolved and inlined: the canonical form of a
/// multi-file script is self-contained.
pub fn run_fmt(args: FmtArgs, config: &Config) -> Result<()> {
    let script = load_script(&args.file)?;
    let options = PrintOptions::new(
        args.indent.as_deref().unwrap_or(&config.fmt.indent),
        config.newline_str()?,
    );
    let formatted = loreline::print(&script, &options);

    if args.write {
        std::fs::write(&args.file, &formatted).map_err(|err| {
            LortError::FileOperation(format!("cannot write {}: {err}", args.file.display()))
        })?;
        if args.verbose {
            eprintln!("formatted {}", args.file.display());
        }
    } else {
        print!("{formatted}");
    }
    Ok(())
}
