//! Helpers shared by the subcommands.

use std::path::Path;

use loreline::Script;
use tracing::debug;

use crate::error::{LortError, Result};

/// Read and parse a script from disk, resolving imports relative to it.
///
/// The core never touches the filesystem itself; this is the host-side
/// file loader it calls back into.
pub fn load_script(path: &Path) -> Result<Script> {
    let source = std::fs::read_to_string(path).map_err(|err| {
        LortError::FileOperation(format!("cannot read {}: {err}", path.display()))
    })?;
    debug!(file = %path.display(), bytes = source.len(), "loaded script");
    let mut loader = |import: &Path| std::fs::read_to_string(import).ok();
    let script = loreline::parse(&source, Some(path), Some(&mut loader))?;
    Ok(script)
}

/// Read, but collect every diagnostic instead of stopping at the first.
pub fn load_script_with_diagnostics(path: &Path) -> Result<(Script, Vec<loreline::Error>)> {
    let source = std::fs::read_to_string(path).map_err(|err| {
        LortError::FileOperation(format!("cannot read {}: {err}", path.display()))
    })?;
    let mut loader = |import: &Path| std::fs::read_to_string(import).ok();
    Ok(loreline::parse_with_diagnostics(
        &source,
        Some(path),
        Some(&mut loader),
    ))
}
