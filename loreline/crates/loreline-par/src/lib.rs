//! loreline-par - Parsing for Loreline scripts.
//!
//! Recursive descent over the token stream from `loreline-lex`, producing a
//! typed [`Script`] AST in which every node carries a deterministic
//! [`NodeId`] and a source [`Position`]. `import` declarations are resolved
//! through a caller-supplied [`FileLoader`] and merged into the importer's
//! declaration list at the point of the import; the finished script is
//! self-contained.
//!
//! The public [`parse`] entry point reports the first error; the parser
//! itself synchronises at statement boundaries and keeps going, and
//! [`parse_with_diagnostics`] exposes everything it found.
//!
//! # Example
//!
//! ```
//! let script = loreline_par::parse("beat Start\n  Hello.\n", None, None).unwrap();
//! assert!(script.beat("Start").is_some());
//! ```

pub mod ast;
mod expr;
mod items;
pub mod node_id;
mod stmt;

use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap, FxHashSet};

use loreline_lex::{normalize_newlines, tokenize, Token, TokenKind};
use loreline_util::{Error, ParseErrorKind, Position, Result};

pub use ast::*;
pub use node_id::{NodeId, NodeIdGen};

/// Supplies the contents of imported files.
///
/// The parser never touches disk; every `import NAME` declaration asks the
/// loader for `NAME.lor` resolved relative to the importing file. Returning
/// `None` is a hard failure (`UnresolvedImport`).
pub trait FileLoader {
    fn load(&mut self, path: &Path) -> Option<String>;
}

impl<F> FileLoader for F
where
    F: FnMut(&Path) -> Option<String>,
{
    fn load(&mut self, path: &Path) -> Option<String> {
        self(path)
    }
}

/// Parse a script, resolving imports through `loader`.
///
/// Returns the first error encountered (lexical errors included); the
/// script is only returned when the source is clean.
pub fn parse(
    source: &str,
    file_path: Option<&Path>,
    loader: Option<&mut dyn FileLoader>,
) -> Result<Script> {
    let (script, mut errors) = parse_with_diagnostics(source, file_path, loader);
    if errors.is_empty() {
        Ok(script)
    } else {
        Err(errors.remove(0))
    }
}

/// Parse a script, returning the (possibly partial) AST together with every
/// diagnostic collected along the way. Tooling that wants to report more
/// than the first error goes through here.
pub fn parse_with_diagnostics(
    source: &str,
    file_path: Option<&Path>,
    loader: Option<&mut dyn FileLoader>,
) -> (Script, Vec<Error>) {
    let driver = Driver {
        loader,
        loaded: FxHashSet::default(),
        in_progress: Vec::new(),
        ids: NodeIdGen::new(),
        decls: Vec::new(),
        beat_sources: FxHashMap::default(),
        character_sources: FxHashMap::default(),
        errors: Vec::new(),
    };
    driver.run(source, file_path)
}

/// One item yielded by the top-level parse loop.
pub(crate) enum TopItem {
    Decl(Decl),
    Import { name: String, pos: Position },
}

/// Walks files, merges declarations and owns the shared id generator so
/// imported declarations take section numbers at the point of the import.
struct Driver<'l> {
    loader: Option<&'l mut dyn FileLoader>,
    loaded: FxHashSet<PathBuf>,
    in_progress: Vec<PathBuf>,
    ids: NodeIdGen,
    decls: Vec<Decl>,
    /// Source slice per beat name, for the byte-identical redeclaration rule.
    beat_sources: FxHashMap<String, String>,
    character_sources: FxHashMap<String, String>,
    errors: Vec<Error>,
}

impl<'l> Driver<'l> {
    fn run(mut self, source: &str, path: Option<&Path>) -> (Script, Vec<Error>) {
        if let Some(path) = path {
            self.in_progress.push(path.to_path_buf());
        }
        let file = path.map(|p| p.display().to_string());
        self.parse_source(source, path.map(Path::to_path_buf));
        (Script::new(self.decls, file), self.errors)
    }

    fn parse_source(&mut self, source: &str, path: Option<PathBuf>) {
        let normalized = normalize_newlines(source).into_owned();
        let file = path.as_ref().map(|p| p.display().to_string());
        let (tokens, lex_errors) = tokenize(&normalized, file.as_deref());
        self.errors.extend(lex_errors);

        let mut parser = Parser::new(tokens, file);
        while let Some(item) = parser.parse_top_item(&mut self.ids) {
            match item {
                TopItem::Decl(decl) => self.add_decl(decl, &normalized),
                TopItem::Import { name, pos } => {
                    self.resolve_import(&name, pos, path.as_deref());
                }
            }
        }
        self.errors.append(&mut parser.errors);
    }

    /// Add a declaration, enforcing name uniqueness for beats and
    /// characters. A redeclaration whose source slice is byte-identical to
    /// the original (the same file imported along two paths) is skipped.
    fn add_decl(&mut self, decl: Decl, source: &str) {
        let (name, pos, kind) = match &decl {
            Decl::Beat(beat) => (beat.name.clone(), beat.pos, ParseErrorKind::DuplicateBeat),
            Decl::Character(character) => (
                character.name.clone(),
                character.pos,
                ParseErrorKind::DuplicateCharacter,
            ),
            Decl::State(_) => {
                self.decls.push(decl);
                return;
            }
        };

        let slice = source
            .get(pos.offset..pos.end_offset())
            .unwrap_or_default()
            .to_string();
        let sources = match kind {
            ParseErrorKind::DuplicateBeat => &mut self.beat_sources,
            _ => &mut self.character_sources,
        };
        match sources.get(&name) {
            Some(existing) if *existing == slice => {}
            Some(_) => {
                let what = match kind {
                    ParseErrorKind::DuplicateBeat => "beat",
                    _ => "character",
                };
                self.errors.push(Error::new(
                    kind,
                    format!("{what} '{name}' is already declared"),
                    pos,
                ));
            }
            None => {
                sources.insert(name, slice);
                self.decls.push(decl);
            }
        }
    }

    fn resolve_import(&mut self, name: &str, pos: Position, importing: Option<&Path>) {
        let file = importing.map(|p| p.display().to_string());
        let dir = importing
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let resolved = dir.join(format!("{name}.lor"));

        if self.loaded.contains(&resolved) {
            return;
        }
        if self.in_progress.iter().any(|p| p == &resolved) {
            self.errors.push(
                Error::new(
                    ParseErrorKind::ImportCycle,
                    format!("import of '{}' re-enters a file still being parsed", resolved.display()),
                    pos,
                )
                .with_frame(file.as_deref(), pos.line),
            );
            return;
        }

        let contents = match self.loader.as_mut() {
            Some(loader) => loader.load(&resolved),
            None => {
                self.errors.push(
                    Error::new(
                        ParseErrorKind::UnresolvedImport,
                        format!("import '{name}' needs a file loader"),
                        pos,
                    )
                    .with_frame(file.as_deref(), pos.line),
                );
                return;
            }
        };
        match contents {
            Some(source) => {
                self.in_progress.push(resolved.clone());
                self.parse_source(&source, Some(resolved.clone()));
                self.in_progress.pop();
                self.loaded.insert(resolved);
            }
            None => {
                self.errors.push(
                    Error::new(
                        ParseErrorKind::UnresolvedImport,
                        format!("could not load '{}'", resolved.display()),
                        pos,
                    )
                    .with_frame(file.as_deref(), pos.line),
                );
            }
        }
    }
}

/// Recursive descent parser over one file's token stream.
pub(crate) struct Parser {
    tokens: Vec<Token>,
    position: usize,
    file: Option<String>,
    pub(crate) errors: Vec<Error>,
    pending_comments: Vec<Comment>,
}

impl Parser {
    pub(crate) fn new(tokens: Vec<Token>, file: Option<String>) -> Self {
        Self {
            tokens,
            position: 0,
            file,
            errors: Vec::new(),
            pending_comments: Vec::new(),
        }
    }

    // =========================================================================
    // Token access
    // =========================================================================

    pub(crate) fn kind(&self) -> &TokenKind {
        self.tokens
            .get(self.position)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    pub(crate) fn kind_at(&self, offset: usize) -> &TokenKind {
        self.tokens
            .get(self.position + offset)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    pub(crate) fn pos(&self) -> Position {
        self.tokens
            .get(self.position)
            .map(|t| t.pos)
            .or_else(|| self.tokens.last().map(|t| t.pos))
            .unwrap_or(Position::NONE)
    }

    /// Position of the most recently consumed token. Declarations use this
    /// to span their full source extent, which the duplicate-declaration
    /// check compares byte-for-byte.
    pub(crate) fn prev_pos(&self) -> Position {
        self.tokens
            .get(self.position.saturating_sub(1))
            .map(|t| t.pos)
            .unwrap_or(Position::NONE)
    }

    pub(crate) fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    /// Discriminant-level kind check, so `at(&TokenKind::Ident(..))` style
    /// probes work without comparing payloads.
    pub(crate) fn at(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.kind()) == std::mem::discriminant(kind)
    }

    pub(crate) fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: &TokenKind, what: &str) -> Option<Position> {
        if self.at(kind) {
            let pos = self.pos();
            self.advance();
            Some(pos)
        } else {
            self.error_here(
                ParseErrorKind::UnexpectedToken,
                format!("expected {what}, found {}", self.kind()),
            );
            None
        }
    }

    pub(crate) fn expect_ident(&mut self, what: &str) -> Option<(String, Position)> {
        match self.kind() {
            TokenKind::Ident(name) => {
                let name = name.clone();
                let pos = self.pos();
                self.advance();
                Some((name, pos))
            }
            other => {
                let message = format!("expected {what}, found {other}");
                self.error_here(ParseErrorKind::UnexpectedToken, message);
                None
            }
        }
    }

    // =========================================================================
    // Trivia
    // =========================================================================

    /// Stash comment tokens for the next statement; optionally skip
    /// newlines too.
    pub(crate) fn skip_trivia(&mut self, skip_newlines: bool) {
        loop {
            match self.kind() {
                TokenKind::LineComment(text) => {
                    let comment = Comment {
                        text: text.clone(),
                        block: false,
                        pos: self.pos(),
                    };
                    self.pending_comments.push(comment);
                    self.advance();
                }
                TokenKind::BlockComment(text) => {
                    let comment = Comment {
                        text: text.clone(),
                        block: true,
                        pos: self.pos(),
                    };
                    self.pending_comments.push(comment);
                    self.advance();
                }
                TokenKind::Newline if skip_newlines => self.advance(),
                _ => return,
            }
        }
    }

    pub(crate) fn take_comments(&mut self) -> Vec<Comment> {
        std::mem::take(&mut self.pending_comments)
    }

    // =========================================================================
    // Errors and recovery
    // =========================================================================

    pub(crate) fn error_here(&mut self, kind: ParseErrorKind, message: impl Into<String>) {
        let pos = self.pos();
        self.error_at(kind, message, pos);
    }

    pub(crate) fn error_at(
        &mut self,
        kind: ParseErrorKind,
        message: impl Into<String>,
        pos: Position,
    ) {
        let err = Error::new(kind, message, pos).with_frame(self.file.as_deref(), pos.line);
        self.errors.push(err);
    }

    /// Skip ahead to a statement boundary: past the next newline, or up to
    /// a dedent, closing brace, declaration keyword or end of input. The
    /// offending token itself is always consumed, so recovery makes
    /// progress even when it sits on a declaration keyword.
    pub(crate) fn synchronize(&mut self) {
        match self.kind() {
            TokenKind::Eof | TokenKind::Dedent | TokenKind::RBrace => return,
            TokenKind::Newline => {
                self.advance();
                return;
            }
            _ => self.advance(),
        }
        loop {
            match self.kind() {
                TokenKind::Eof | TokenKind::Dedent | TokenKind::RBrace => return,
                TokenKind::Newline => {
                    self.advance();
                    return;
                }
                TokenKind::State
                | TokenKind::New
                | TokenKind::Beat
                | TokenKind::Character
                | TokenKind::Import => return,
                _ => self.advance(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Script {
        parse(source, None, None).expect("script should parse")
    }

    #[test]
    fn test_parse_minimal_script() {
        let script = parse_ok("beat Start\n  Hello there.\n");
        assert_eq!(script.decls.len(), 1);
        let beat = script.beat("Start").unwrap();
        assert_eq!(beat.body.stmts.len(), 1);
    }

    #[test]
    fn test_first_error_is_reported() {
        let err = parse("beat Start\n  -> \n", None, None).unwrap_err();
        assert!(err.is_parse());
    }

    #[test]
    fn test_node_ids_stable_across_parses() {
        let source = "state\n  a: 1\n\nbeat B\n  \"x is $a\"\n  if a > 0\n    a -= 1\n  -> .\n";
        let first = parse_ok(source);
        let second = parse_ok(source);

        fn ids(script: &Script) -> Vec<NodeId> {
            let mut out = Vec::new();
            for decl in &script.decls {
                out.push(decl.id());
                if let Decl::Beat(beat) = decl {
                    collect_block(&beat.body, &mut out);
                }
            }
            out
        }
        fn collect_block(block: &Block, out: &mut Vec<NodeId>) {
            out.push(block.id);
            for stmt in &block.stmts {
                out.push(stmt.id());
                if let Stmt::If(stmt) = stmt {
                    collect_block(&stmt.then_block, out);
                    if let Some(e) = &stmt.else_block {
                        collect_block(e, out);
                    }
                }
            }
        }

        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn test_node_ids_unique() {
        let source = "beat B\n  choice\n    One\n      x = 1\n    Two\n      y = 2\n";
        let script = parse_ok(source);
        let beat = script.beat("B").unwrap();
        let Stmt::Choice(choice) = &beat.body.stmts[0] else {
            panic!("expected choice");
        };
        let mut seen = std::collections::HashSet::new();
        assert!(seen.insert(beat.body.id));
        assert!(seen.insert(choice.id));
        for option in &choice.options {
            assert!(seen.insert(option.id));
            assert!(seen.insert(option.body.id));
            for stmt in &option.body.stmts {
                assert!(seen.insert(stmt.id()));
            }
        }
    }

    #[test]
    fn test_duplicate_beat_rejected() {
        let err = parse("beat B\n  One.\n\nbeat B\n  Two.\n", None, None).unwrap_err();
        assert_eq!(
            err.kind,
            loreline_util::ErrorKind::Parse(ParseErrorKind::DuplicateBeat)
        );
    }

    #[test]
    fn test_import_merges_declarations() {
        let mut loader = |path: &Path| {
            if path.to_string_lossy().ends_with("extras.lor") {
                Some("beat Extra\n  From the import.\n".to_string())
            } else {
                None
            }
        };
        let script = parse(
            "import extras\n\nbeat Main\n  -> Extra\n",
            Some(Path::new("story/main.lor")),
            Some(&mut loader),
        )
        .unwrap();
        assert!(script.beat("Extra").is_some());
        assert!(script.beat("Main").is_some());
        // the imported beat merged at the point of the import
        assert!(script.beat("Extra").unwrap().id < script.beat("Main").unwrap().id);
    }

    #[test]
    fn test_import_deduplicated_by_path() {
        let mut loads = 0usize;
        let mut loader = |path: &Path| {
            if path.to_string_lossy().ends_with("shared.lor") {
                loads += 1;
                Some("character extra\n  name: \"Extra\"\n".to_string())
            } else {
                None
            }
        };
        let source = "import shared\nimport shared\n\nbeat Main\n  Done.\n";
        let script = parse(source, None, Some(&mut loader)).unwrap();
        assert!(script.character("extra").is_some());
        assert_eq!(loads, 1);
    }

    #[test]
    fn test_import_cycle_detected() {
        let mut loader = |path: &Path| {
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            match name.as_str() {
                "a.lor" => Some("import b\n".to_string()),
                "b.lor" => Some("import a\n".to_string()),
                _ => None,
            }
        };
        let err = parse("import a\n", Some(Path::new("root.lor")), Some(&mut loader)).unwrap_err();
        assert_eq!(
            err.kind,
            loreline_util::ErrorKind::Parse(ParseErrorKind::ImportCycle)
        );
    }

    #[test]
    fn test_unresolved_import() {
        let mut loader = |_: &Path| None;
        let err = parse("import missing\n", None, Some(&mut loader)).unwrap_err();
        assert_eq!(
            err.kind,
            loreline_util::ErrorKind::Parse(ParseErrorKind::UnresolvedImport)
        );
    }

    #[test]
    fn test_diagnostics_keep_going() {
        let (script, errors) = parse_with_diagnostics(
            "beat A\n  -> \n\nbeat B\n  Fine.\n",
            None,
            None,
        );
        assert!(!errors.is_empty());
        assert!(script.beat("B").is_some());
    }
}
