//! Configuration for the lort CLI.
//!
//! Settings come from an optional `lort.toml` (working directory, or an
//! explicit `--config` path) and mostly parameterise the printer.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LortError, Result};

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "lort.toml";

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Global verbose setting.
    #[serde(default)]
    pub verbose: bool,

    /// Formatting configuration (used by `lort fmt`).
    #[serde(default)]
    pub fmt: FmtConfig,

    /// Player configuration (used by `lort run`).
    #[serde(default)]
    pub run: RunConfig,
}

/// Formatting options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FmtConfig {
    /// Indentation unit.
    #[serde(default = "default_indent")]
    pub indent: String,

    /// Line ending: `lf` or `crlf`.
    #[serde(default = "default_newline")]
    pub newline: String,
}

/// Player options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    /// Fixed RNG seed for reproducible sessions.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Reject reads of undeclared names.
    #[serde(default)]
    pub strict: bool,
}

fn default_indent() -> String {
    "  ".to_string()
}

fn default_newline() -> String {
    "lf".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            verbose: false,
            fmt: FmtConfig::default(),
            run: RunConfig::default(),
        }
    }
}

impl Default for FmtConfig {
    fn default() -> Self {
        Self {
            indent: default_indent(),
            newline: default_newline(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: None,
            strict: false,
        }
    }
}

impl Config {
    /// Load `lort.toml` from the working directory, falling back to
    /// defaults when absent.
    pub fn load() -> Result<Self> {
        let path = Path::new(CONFIG_FILE_NAME);
        if path.exists() {
            Self::load_from_path(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit path.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|err| {
            LortError::Config(format!("cannot read {}: {err}", path.display()))
        })?;
        toml::from_str(&contents)
            .map_err(|err| LortError::Config(format!("cannot parse {}: {err}", path.display())))
    }

    /// The newline string configured for the printer.
    pub fn newline_str(&self) -> Result<&'static str> {
        match self.fmt.newline.as_str() {
            "lf" => Ok("\n"),
            "crlf" => Ok("\r\n"),
            other => Err(LortError::Config(format!(
                "unknown newline '{other}', expected 'lf' or 'crlf'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.verbose);
        assert_eq!(config.fmt.indent, "  ");
        assert_eq!(config.fmt.newline, "lf");
        assert_eq!(config.run.seed, None);
    }

    #[test]
    fn test_parse_partial_config() {
        let config: Config = toml::from_str("[fmt]\nindent = \"    \"\n").unwrap();
        assert_eq!(config.fmt.indent, "    ");
        assert_eq!(config.fmt.newline, "lf");
    }

    #[test]
    fn test_newline_str() {
        let mut config = Config::default();
        assert_eq!(config.newline_str().unwrap(), "\n");
        config.fmt.newline = "crlf".to_string();
        assert_eq!(config.newline_str().unwrap(), "\r\n");
        config.fmt.newline = "cr".to_string();
        assert!(config.newline_str().is_err());
    }

    #[test]
    fn test_run_config() {
        let config: Config = toml::from_str("[run]\nseed = 7\nstrict = true\n").unwrap();
        assert_eq!(config.run.seed, Some(7));
        assert!(config.run.strict);
    }
}
