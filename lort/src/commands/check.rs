//! Check command: parse a script and report every diagnostic.

use std::path::PathBuf;

use crate::commands::common::load_script_with_diagnostics;
use crate::error::{LortError, Result};

/// Arguments for the check command.
#[derive(Debug, Clone)]
pub struct CheckArgs {
    /// Script to check.
    pub file: PathBuf,
    /// Enable verbose output.
    pub verbose: bool,
}

/// Parse the script and print diagnostics; fails when any were found.
pub fn run_check(args: CheckArgs) -> Result<()> {
    let (script, errors) = load_script_with_diagnostics(&args.file)?;

    for error in &errors {
        eprintln!("{error}");
    }
    if !errors.is_empty() {
        return Err(LortError::Validation(format!(
            "{}: {} error(s)",
            args.file.display(),
            errors.len()
        )));
    }

    if args.verbose {
        let beats = script.beats().count();
        let characters = script.characters().count();
        eprintln!(
            "{}: ok ({beats} beat(s), {characters} character(s))",
            args.file.display()
        );
    }
    Ok(())
}
