//! loreline-lex - Lexical analysis for Loreline scripts.
//!
//! Turns `.lor` source text into a token stream with precise positions.
//! Line endings are normalised to LF before scanning; indentation is
//! significant outside braces and surfaces as `Indent` / `Dedent` /
//! `Newline` structural tokens. Text runs (quoted strings, narrator and
//! dialogue lines, choice prompts) are split into fragment streams of
//! literal chunks, `$path` interpolations and `<tag>` markers.
//!
//! # Example
//!
//! ```
//! use loreline_lex::{tokenize, TokenKind};
//!
//! let (tokens, errors) = tokenize("beat Start\n  Hello there.\n", None);
//! assert!(errors.is_empty());
//! assert!(matches!(tokens[0].kind, TokenKind::Beat));
//! ```

pub mod cursor;
pub mod lexer;
pub mod token;

pub use lexer::{normalize_newlines, tokenize, LexMode, Lexer};
pub use token::{template_text, TextFragment, Token, TokenKind};
