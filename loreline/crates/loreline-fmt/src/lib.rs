//! loreline-fmt - Canonical printing of Loreline scripts.
//!
//! Re-emits a parsed [`Script`](loreline_par::Script) as source text. The
//! output is canonical: indentation-based blocks (never braces), the
//! configured indent and newline strings, statement-level comments
//! preserved, and text lines kept in their original quoted or bare form
//! wherever the bare form re-lexes unambiguously.
//!
//! Printing is idempotent through the parser: for any valid script `s`,
//! `print(parse(print(s))) == print(s)`.
//!
//! # Example
//!
//! ```
//! use loreline_fmt::{print, PrintOptions};
//!
//! let script = loreline_par::parse("beat B { \"Hi.\" }", None, None).unwrap();
//! let text = print(&script, &PrintOptions::default());
//! assert_eq!(text, "beat B\n  \"Hi.\"\n");
//! ```

mod printer;

pub use printer::print;

/// Printing parameters.
#[derive(Clone, Debug)]
pub struct PrintOptions {
    /// Indentation unit, two spaces by default.
    pub indent: String,
    /// Line separator, `\n` by default.
    pub newline: String,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            indent: "  ".to_string(),
            newline: "\n".to_string(),
        }
    }
}

impl PrintOptions {
    pub fn new(indent: impl Into<String>, newline: impl Into<String>) -> Self {
        Self {
            indent: indent.into(),
            newline: newline.into(),
        }
    }
}
