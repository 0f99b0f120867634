//! Extract command: export a script's translation table.

use std::path::PathBuf;

use serde_json::json;

use crate::commands::common::load_script;
use crate::error::{LortError, Result};

/// Arguments for the extract command.
#[derive(Debug, Clone)]
pub struct ExtractArgs {
    /// Script to extract from.
    pub file: PathBuf,
    /// Output file; stdout when absent.
    pub output: Option<PathBuf>,
    /// Enable verbose output.
    pub verbose: bool,
}

/// Export every text node and choice prompt as `{ id, key, text }`
/// entries, ordered by node id. Translators copy the script, localise the
/// text in place, and the mirrored structure reproduces the same ids.
pub fn run_extract(args: ExtractArgs) -> Result<()> {
    let script = load_script(&args.file)?;
    let table = loreline::extract_translations(&script);

    let mut entries: Vec<_> = table.iter().collect();
    entries.sort_by_key(|(id, _)| *id);
    let payload: Vec<_> = entries
        .into_iter()
        .map(|(id, entry)| {
            json!({
                "id": id.to_string(),
                "key": format!("{:016x}", entry.key),
                "text": entry.text,
            })
        })
        .collect();
    let rendered = serde_json::to_string_pretty(&payload)?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, rendered).map_err(|err| {
                LortError::FileOperation(format!("cannot write {}: {err}", path.display()))
            })?;
            if args.verbose {
                eprintln!("wrote {} entries to {}", payload.len(), path.display());
            }
        }
        None => println!("{rendered}"),
    }
    Ok(())
}
