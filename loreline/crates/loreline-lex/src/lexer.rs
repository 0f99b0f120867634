//! The Loreline lexer.
//!
//! Single pass over LF-normalised source. Produces a token vector plus a
//! vector of recoverable errors; the lexer never stops early.
//!
//! Two things set this lexer apart from an ordinary expression-language
//! tokenizer:
//!
//! - **Layout.** Outside braces, indentation is significant. The lexer keeps
//!   a stack of indent widths and emits `Indent` / `Dedent` / `Newline`
//!   structural tokens (off-side rule). Inside braces no layout tokens are
//!   produced and newlines act as plain separators.
//! - **Line modes.** What a line means depends on the block it is in: inside
//!   `state` and `character` blocks `name: expr` is a field initialiser,
//!   inside a beat body `name: …` starts a dialogue line whose remainder is
//!   raw text, and inside a `choice` block a bare line is an option prompt.
//!   The lexer tracks a mode stack driven by the keyword that opened each
//!   block and classifies lines with cheap cursor lookahead.
//!
//! Text runs (quoted strings and raw lines) are split into fragment streams:
//! literal chunks, `$path` interpolations and `<tag>` / `</tag>` markers,
//! each with its byte offset in the template text.

use std::borrow::Cow;

use loreline_util::{Error, LexErrorKind, Position};

use crate::cursor::Cursor;
use crate::token::{TextFragment, Token, TokenKind};

/// What kind of block the lexer is currently inside.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LexMode {
    /// Between top-level declarations.
    TopLevel,
    /// Inside a `state` or `character` block: `name: expr` lines.
    Fields,
    /// Inside a beat body, if-branch or option body.
    Body,
    /// Inside a `choice` block: option prompt lines.
    Choice,
}

/// How a body-mode line should be lexed.
enum LineShape {
    Code,
    Dialogue,
    Narration,
}

/// Replace CRLF (and stray CR) line endings with LF.
pub fn normalize_newlines(source: &str) -> Cow<'_, str> {
    if source.contains('\r') {
        Cow::Owned(source.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(source)
    }
}

/// Tokenise `source`, returning all tokens and all recoverable errors.
///
/// CRLF input is normalised to LF first; token positions refer to the
/// normalised stream. `file` is only used to stamp error trace frames.
pub fn tokenize(source: &str, file: Option<&str>) -> (Vec<Token>, Vec<Error>) {
    let normalized = normalize_newlines(source);
    Lexer::new(&normalized, file).lex()
}

/// Captured start point of a token.
#[derive(Clone, Copy)]
struct Start {
    line: u32,
    column: u32,
    offset: usize,
}

/// The lexer state machine.
pub struct Lexer<'a> {
    cursor: Cursor<'a>,
    file: Option<&'a str>,
    tokens: Vec<Token>,
    errors: Vec<Error>,
    /// Open indentation widths; always holds the sentinel 0.
    indents: Vec<usize>,
    /// Block modes, parallel to open blocks; always holds the root mode.
    modes: Vec<LexMode>,
    /// Mode the next opened block should use, set by block-header keywords.
    pending_mode: Option<LexMode>,
    brace_depth: usize,
}

impl<'a> Lexer<'a> {
    /// Create a lexer over already LF-normalised source.
    pub fn new(source: &'a str, file: Option<&'a str>) -> Self {
        Self {
            cursor: Cursor::new(source),
            file,
            tokens: Vec::new(),
            errors: Vec::new(),
            indents: vec![0],
            modes: vec![LexMode::TopLevel],
            pending_mode: None,
            brace_depth: 0,
        }
    }

    /// Run the lexer to completion.
    pub fn lex(mut self) -> (Vec<Token>, Vec<Error>) {
        while self.lex_line() {}
        let pos = self.here();
        while self.indents.len() > 1 {
            self.indents.pop();
            if self.modes.len() > 1 {
                self.modes.pop();
            }
            self.tokens.push(Token::new(TokenKind::Dedent, pos));
        }
        self.tokens.push(Token::new(TokenKind::Eof, pos));
        (self.tokens, self.errors)
    }

    // =========================================================================
    // Lines and layout
    // =========================================================================

    /// Lex one physical line. Returns false once the input is exhausted.
    fn lex_line(&mut self) -> bool {
        if self.cursor.is_at_end() {
            return false;
        }

        let indent_pos = self.here();
        let mut width = 0usize;
        let mut saw_space = false;
        let mut saw_tab = false;
        loop {
            match self.cursor.current_char() {
                ' ' => {
                    saw_space = true;
                    width += 1;
                    self.cursor.advance();
                }
                '\t' => {
                    saw_tab = true;
                    width += 1;
                    self.cursor.advance();
                }
                _ => break,
            }
        }

        if self.cursor.is_at_end() {
            return false;
        }
        if self.cursor.current_char() == '\n' {
            self.cursor.advance();
            return true;
        }
        if saw_space && saw_tab {
            self.error(
                LexErrorKind::InconsistentIndent,
                "indentation mixes tabs and spaces",
                indent_pos,
            );
        }

        // Comment-only lines carry no layout; the comment token is enough
        // for the parser to attach it to the next statement.
        if self.line_is_comment_only() {
            self.lex_comment();
            self.skip_inline_ws();
            if self.cursor.current_char() == '\n' {
                self.cursor.advance();
            }
            return true;
        }

        if self.brace_depth == 0 {
            self.layout(width, indent_pos);
        }

        self.lex_line_content();

        if self.cursor.current_char() == '\n' {
            if self.brace_depth > 0 {
                self.tokens.push(Token::new(TokenKind::Newline, self.here()));
            }
            self.cursor.advance();
        }
        true
    }

    /// Compare this line's indent against the stack and emit layout tokens.
    fn layout(&mut self, width: usize, pos: Position) {
        let top = *self.indents.last().expect("indent stack never empty");
        if width > top {
            self.indents.push(width);
            let mode = self.pending_mode.take().unwrap_or_else(|| self.mode());
            self.modes.push(mode);
            self.tokens.push(Token::new(TokenKind::Indent, pos));
        } else if width == top {
            self.pending_mode = None;
            if !self.tokens.is_empty() {
                self.tokens.push(Token::new(TokenKind::Newline, pos));
            }
        } else {
            self.pending_mode = None;
            while *self.indents.last().expect("indent stack never empty") > width {
                self.indents.pop();
                if self.modes.len() > 1 {
                    self.modes.pop();
                }
                self.tokens.push(Token::new(TokenKind::Dedent, pos));
            }
            if *self.indents.last().expect("indent stack never empty") != width {
                self.error(
                    LexErrorKind::InconsistentIndent,
                    "dedent does not match any open indentation level",
                    pos,
                );
                self.indents.push(width);
                self.modes.push(self.mode());
            }
        }
    }

    fn lex_line_content(&mut self) {
        match self.mode() {
            LexMode::TopLevel | LexMode::Fields => self.lex_code_until_eol(),
            LexMode::Body => self.lex_body_line(),
            LexMode::Choice => self.lex_choice_line(),
        }
    }

    // =========================================================================
    // Body mode
    // =========================================================================

    fn lex_body_line(&mut self) {
        loop {
            self.skip_inline_ws();
            let c = self.cursor.current_char();
            if c == '\n' || self.cursor.is_at_end() {
                return;
            }
            match c {
                '/' if self.cursor.peek_char() == '/' || self.cursor.peek_char() == '*' => {
                    // Leading comment; re-classify whatever follows it.
                    self.lex_comment();
                }
                '"' => {
                    let token = self.lex_string();
                    self.tokens.push(token);
                    self.lex_code_until_eol();
                    return;
                }
                '~' => {
                    self.cursor.advance();
                    self.skip_inline_ws();
                    let token = self.lex_raw_text(false, false);
                    self.tokens.push(token);
                    return;
                }
                '-' if self.cursor.peek_char() == '>' => {
                    self.lex_code_until_eol();
                    return;
                }
                '}' if self.brace_depth > 0 => {
                    self.lex_code_until_eol();
                    return;
                }
                c if is_ident_start(c) => {
                    match self.classify_ident_line() {
                        LineShape::Code => self.lex_code_until_eol(),
                        LineShape::Dialogue => self.lex_dialogue_line(),
                        LineShape::Narration => {
                            let token = self.lex_raw_text(false, false);
                            self.tokens.push(token);
                        }
                    }
                    return;
                }
                _ => {
                    let token = self.lex_raw_text(false, false);
                    self.tokens.push(token);
                    return;
                }
            }
        }
    }

    /// Decide what an identifier-led body line is, without consuming input.
    fn classify_ident_line(&self) -> LineShape {
        let mut probe = self.cursor.clone();
        let start = probe.position();
        probe.advance_while(is_ident_continue);
        let word = probe.slice_from(start);

        if TokenKind::from_ident(word).is_some() {
            // Structural keywords open statements; word operators like
            // `and` at line start can only be prose.
            return match word {
                "state" | "new" | "beat" | "character" | "choice" | "if" | "else" | "import" => {
                    LineShape::Code
                }
                _ => LineShape::Narration,
            };
        }

        let mut segments = 1usize;
        while probe.current_char() == '.' && is_ident_start(probe.peek_char()) {
            probe.advance();
            probe.advance_while(is_ident_continue);
            segments += 1;
        }

        if probe.current_char() == '(' {
            return LineShape::Code;
        }
        if probe.current_char() == ':' && segments == 1 {
            return LineShape::Dialogue;
        }

        while probe.current_char() == ' ' || probe.current_char() == '\t' {
            probe.advance();
        }
        match probe.current_char() {
            '=' if probe.peek_char() != '=' => LineShape::Code,
            '+' | '-' | '*' | '/' if probe.peek_char() == '=' => LineShape::Code,
            ':' if segments == 1 => LineShape::Dialogue,
            _ => LineShape::Narration,
        }
    }

    /// Lex `speaker: text…` as identifier, colon, then the text run.
    fn lex_dialogue_line(&mut self) {
        let start = self.start();
        let from = self.cursor.position();
        self.cursor.advance_while(is_ident_continue);
        let name = self.cursor.slice_from(from).to_string();
        self.push(TokenKind::Ident(name), start);

        self.skip_inline_ws();
        let colon = self.start();
        self.cursor.advance();
        self.push(TokenKind::Colon, colon);

        self.skip_inline_ws();
        if self.cursor.current_char() == '"' {
            let token = self.lex_string();
            self.tokens.push(token);
            self.lex_code_until_eol();
        } else if self.cursor.current_char() == '\n' || self.cursor.is_at_end() {
            self.tokens
                .push(Token::new(TokenKind::Text(Vec::new()), self.here()));
        } else {
            let token = self.lex_raw_text(false, false);
            self.tokens.push(token);
        }
    }

    // =========================================================================
    // Choice mode
    // =========================================================================

    fn lex_choice_line(&mut self) {
        loop {
            self.skip_inline_ws();
            let c = self.cursor.current_char();
            if c == '\n' || self.cursor.is_at_end() {
                return;
            }
            match c {
                '/' if self.cursor.peek_char() == '/' || self.cursor.peek_char() == '*' => {
                    self.lex_comment();
                }
                '}' if self.brace_depth > 0 => {
                    self.lex_code_until_eol();
                    return;
                }
                '"' => {
                    self.pending_mode = Some(LexMode::Body);
                    let token = self.lex_string();
                    self.tokens.push(token);
                    self.lex_code_until_eol();
                    return;
                }
                '~' => {
                    self.pending_mode = Some(LexMode::Body);
                    self.cursor.advance();
                    self.skip_inline_ws();
                    let token = self.lex_raw_text(true, true);
                    self.tokens.push(token);
                    self.lex_code_until_eol();
                    return;
                }
                _ => {
                    // Unquoted prompt: runs to end of line, a bare `if`
                    // (the guard) or an inline `{` block.
                    self.pending_mode = Some(LexMode::Body);
                    let token = self.lex_raw_text(true, true);
                    self.tokens.push(token);
                    self.lex_code_until_eol();
                    return;
                }
            }
        }
    }

    // =========================================================================
    // Code tokens
    // =========================================================================

    fn lex_code_until_eol(&mut self) {
        loop {
            self.skip_inline_ws();
            if self.cursor.is_at_end() || self.cursor.current_char() == '\n' {
                return;
            }
            match self.cursor.current_char() {
                '/' if self.cursor.peek_char() == '/' => {
                    self.lex_comment();
                    return;
                }
                '/' if self.cursor.peek_char() == '*' => {
                    self.lex_comment();
                }
                '"' => {
                    let token = self.lex_string();
                    self.tokens.push(token);
                }
                c if is_ident_start(c) => self.lex_ident(),
                c if c.is_ascii_digit() => self.lex_number(),
                _ => self.lex_operator(),
            }
        }
    }

    fn lex_ident(&mut self) {
        let start = self.start();
        let from = self.cursor.position();
        self.cursor.advance_while(is_ident_continue);
        let word = self.cursor.slice_from(from);

        match TokenKind::from_ident(word) {
            Some(kind) => {
                match kind {
                    TokenKind::State | TokenKind::Character => {
                        self.pending_mode = Some(LexMode::Fields)
                    }
                    TokenKind::Beat | TokenKind::If | TokenKind::Else => {
                        self.pending_mode = Some(LexMode::Body)
                    }
                    TokenKind::Choice => self.pending_mode = Some(LexMode::Choice),
                    _ => {}
                }
                self.push(kind, start);
            }
            None => {
                let name = word.to_string();
                self.push(TokenKind::Ident(name), start);
            }
        }
    }

    fn lex_number(&mut self) {
        let start = self.start();
        let from = self.cursor.position();
        self.cursor.advance_while(|c| c.is_ascii_digit());

        if self.cursor.current_char() == '.' && self.cursor.peek_char().is_ascii_digit() {
            self.cursor.advance();
            self.cursor.advance_while(|c| c.is_ascii_digit());
            let text = self.cursor.slice_from(from);
            match text.parse::<f64>() {
                Ok(value) => self.push(TokenKind::Float(value), start),
                Err(_) => {
                    let pos = self.pos_from(start);
                    self.error(LexErrorKind::InvalidNumber, "invalid decimal literal", pos);
                    self.push(TokenKind::Float(0.0), start);
                }
            }
            return;
        }

        if self.cursor.current_char() == '.' && !is_ident_start(self.cursor.peek_char()) {
            // `12.` with nothing after the point
            self.cursor.advance();
            let pos = self.pos_from(start);
            self.error(
                LexErrorKind::InvalidNumber,
                "expected digits after decimal point",
                pos,
            );
            self.push(TokenKind::Int(0), start);
            return;
        }

        let text = self.cursor.slice_from(from);
        match text.parse::<i64>() {
            Ok(value) => self.push(TokenKind::Int(value), start),
            Err(_) => {
                let pos = self.pos_from(start);
                self.error(
                    LexErrorKind::InvalidNumber,
                    "integer literal out of range",
                    pos,
                );
                self.push(TokenKind::Int(0), start);
            }
        }
    }

    fn lex_operator(&mut self) {
        let start = self.start();
        let c = self.cursor.current_char();
        self.cursor.advance();
        let kind = match c {
            '+' => {
                if self.cursor.match_char('=') {
                    TokenKind::PlusEq
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if self.cursor.match_char('>') {
                    TokenKind::Arrow
                } else if self.cursor.match_char('=') {
                    TokenKind::MinusEq
                } else {
                    TokenKind::Minus
                }
            }
            '*' => {
                if self.cursor.match_char('=') {
                    TokenKind::StarEq
                } else {
                    TokenKind::Star
                }
            }
            '/' => {
                if self.cursor.match_char('=') {
                    TokenKind::SlashEq
                } else {
                    TokenKind::Slash
                }
            }
            '=' => {
                if self.cursor.match_char('=') {
                    TokenKind::EqEq
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                if self.cursor.match_char('=') {
                    TokenKind::NotEq
                } else {
                    TokenKind::Not
                }
            }
            '<' => {
                if self.cursor.match_char('=') {
                    TokenKind::LtEq
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if self.cursor.match_char('=') {
                    TokenKind::GtEq
                } else {
                    TokenKind::Gt
                }
            }
            '&' => {
                if self.cursor.match_char('&') {
                    TokenKind::AndAnd
                } else {
                    let pos = self.pos_from(start);
                    self.error(LexErrorKind::UnexpectedCharacter, "expected '&&'", pos);
                    return;
                }
            }
            '|' => {
                if self.cursor.match_char('|') {
                    TokenKind::OrOr
                } else {
                    let pos = self.pos_from(start);
                    self.error(LexErrorKind::UnexpectedCharacter, "expected '||'", pos);
                    return;
                }
            }
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '.' => TokenKind::Dot,
            '{' => {
                self.brace_depth += 1;
                let mode = self.pending_mode.take().unwrap_or_else(|| self.mode());
                self.modes.push(mode);
                TokenKind::LBrace
            }
            '}' => {
                if self.brace_depth > 0 {
                    self.brace_depth -= 1;
                    if self.modes.len() > 1 {
                        self.modes.pop();
                    }
                }
                TokenKind::RBrace
            }
            other => {
                let pos = self.pos_from(start);
                self.error(
                    LexErrorKind::UnexpectedCharacter,
                    format!("unexpected character '{other}'"),
                    pos,
                );
                return;
            }
        };
        self.push(kind, start);
    }

    // =========================================================================
    // Text runs
    // =========================================================================

    /// Lex a quoted string into a `Str` token.
    ///
    /// The cursor sits on the opening quote. Escapes are resolved here;
    /// `$path` and `<tag>` markers become fragments.
    fn lex_string(&mut self) -> Token {
        let start = self.start();
        self.cursor.advance(); // opening quote

        let mut fragments: Vec<TextFragment> = Vec::new();
        let mut buf = String::new();
        let mut template_len = 0usize;

        loop {
            if self.cursor.is_at_end() || self.cursor.current_char() == '\n' {
                let pos = self.pos_from(start);
                self.error(
                    LexErrorKind::UnterminatedString,
                    "string not closed before end of line",
                    pos,
                );
                break;
            }
            match self.cursor.current_char() {
                '"' => {
                    self.cursor.advance();
                    break;
                }
                '\\' => {
                    let escape_start = self.start();
                    self.cursor.advance();
                    if self.cursor.is_at_end() || self.cursor.current_char() == '\n' {
                        let pos = self.pos_from(escape_start);
                        self.error(
                            LexErrorKind::UnterminatedString,
                            "string not closed before end of line",
                            pos,
                        );
                        break;
                    }
                    let escaped = self.cursor.current_char();
                    self.cursor.advance();
                    match escaped {
                        '\\' => buf.push('\\'),
                        '"' => buf.push('"'),
                        'n' => buf.push('\n'),
                        't' => buf.push('\t'),
                        'r' => buf.push('\r'),
                        other => {
                            let pos = self.pos_from(escape_start);
                            self.error(
                                LexErrorKind::InvalidEscape,
                                format!("unknown escape '\\{other}'"),
                                pos,
                            );
                            buf.push(other);
                        }
                    }
                }
                '$' if is_ident_start(self.cursor.peek_char()) => {
                    flush_literal(&mut fragments, &mut buf, &mut template_len);
                    let path = self.lex_interp_path();
                    fragments.push(TextFragment::Interp {
                        path,
                        offset: template_len,
                    });
                }
                '<' => {
                    if !self.try_lex_tag(&mut fragments, &mut buf, &mut template_len) {
                        buf.push('<');
                        self.cursor.advance();
                    }
                }
                c => {
                    buf.push(c);
                    self.cursor.advance();
                }
            }
        }

        flush_literal(&mut fragments, &mut buf, &mut template_len);
        Token::new(TokenKind::Str(fragments), self.pos_from(start))
    }

    /// Lex an unquoted text run into a `Text` token.
    ///
    /// Runs to end of line. No escapes; `$path` and `<tag>` markers apply.
    /// `stop_at_if` ends the run before a bare `if` word (choice guards);
    /// `stop_at_brace` ends it before `{` (inline option bodies). Trailing
    /// whitespace is trimmed.
    fn lex_raw_text(&mut self, stop_at_if: bool, stop_at_brace: bool) -> Token {
        let start = self.start();
        let mut fragments: Vec<TextFragment> = Vec::new();
        let mut buf = String::new();
        let mut template_len = 0usize;

        loop {
            if self.cursor.is_at_end() || self.cursor.current_char() == '\n' {
                break;
            }
            let c = self.cursor.current_char();
            if stop_at_brace && c == '{' {
                break;
            }
            if stop_at_if
                && (c == ' ' || c == '\t')
                && (!buf.is_empty() || !fragments.is_empty())
                && self.peek_guard_keyword()
            {
                break;
            }
            match c {
                '$' if is_ident_start(self.cursor.peek_char()) => {
                    flush_literal(&mut fragments, &mut buf, &mut template_len);
                    let path = self.lex_interp_path();
                    fragments.push(TextFragment::Interp {
                        path,
                        offset: template_len,
                    });
                }
                '<' => {
                    if !self.try_lex_tag(&mut fragments, &mut buf, &mut template_len) {
                        buf.push('<');
                        self.cursor.advance();
                    }
                }
                c => {
                    buf.push(c);
                    self.cursor.advance();
                }
            }
        }

        while buf.ends_with(' ') || buf.ends_with('\t') {
            buf.pop();
        }
        flush_literal(&mut fragments, &mut buf, &mut template_len);
        Token::new(TokenKind::Text(fragments), self.pos_from(start))
    }

    /// True if whitespace at the cursor is followed by a bare `if` word.
    fn peek_guard_keyword(&self) -> bool {
        let mut probe = self.cursor.clone();
        probe.advance_while(|c| c == ' ' || c == '\t');
        if probe.current_char() != 'i' {
            return false;
        }
        let from = probe.position();
        probe.advance_while(is_ident_continue);
        probe.slice_from(from) == "if"
    }

    /// Lex `$head.field…` starting at the `$`.
    fn lex_interp_path(&mut self) -> Vec<String> {
        self.cursor.advance(); // '$'
        let mut path = Vec::new();
        let from = self.cursor.position();
        self.cursor.advance_while(is_ident_continue);
        path.push(self.cursor.slice_from(from).to_string());
        while self.cursor.current_char() == '.' && is_ident_start(self.cursor.peek_char()) {
            self.cursor.advance();
            let from = self.cursor.position();
            self.cursor.advance_while(is_ident_continue);
            path.push(self.cursor.slice_from(from).to_string());
        }
        path
    }

    /// Try to lex `<name>` or `</name>` at the cursor. Returns false (and
    /// consumes nothing) if the shape does not match, so `<` stays literal.
    fn try_lex_tag(
        &mut self,
        fragments: &mut Vec<TextFragment>,
        buf: &mut String,
        template_len: &mut usize,
    ) -> bool {
        let mut probe = self.cursor.clone();
        probe.advance(); // '<'
        let closing = probe.match_char('/');
        if !is_ident_start(probe.current_char()) {
            return false;
        }
        let from = probe.position();
        probe.advance_while(is_ident_continue);
        let name = probe.slice_from(from).to_string();
        if !probe.match_char('>') {
            return false;
        }

        flush_literal(fragments, buf, template_len);
        self.cursor = probe;
        let fragment = if closing {
            TextFragment::TagClose {
                name,
                offset: *template_len,
            }
        } else {
            TextFragment::TagOpen {
                name,
                offset: *template_len,
            }
        };
        fragments.push(fragment);
        true
    }

    // =========================================================================
    // Comments
    // =========================================================================

    /// True if the rest of the line is a single comment and nothing else.
    fn line_is_comment_only(&self) -> bool {
        let mut probe = self.cursor.clone();
        if probe.current_char() != '/' {
            return false;
        }
        match probe.peek_char() {
            '/' => true,
            '*' => {
                probe.advance();
                probe.advance();
                loop {
                    if probe.is_at_end() {
                        return true;
                    }
                    if probe.current_char() == '*' && probe.peek_char() == '/' {
                        probe.advance();
                        probe.advance();
                        break;
                    }
                    probe.advance();
                }
                probe.advance_while(|c| c == ' ' || c == '\t');
                probe.is_at_end() || probe.current_char() == '\n'
            }
            _ => false,
        }
    }

    /// Lex a `//` or `/* */` comment token. The cursor sits on the `/`.
    fn lex_comment(&mut self) {
        let start = self.start();
        self.cursor.advance(); // '/'
        if self.cursor.match_char('/') {
            let from = self.cursor.position();
            self.cursor.advance_while(|c| c != '\n');
            let text = self.cursor.slice_from(from).to_string();
            self.push(TokenKind::LineComment(text), start);
            return;
        }

        // Block comment; no nesting.
        self.cursor.advance(); // '*'
        let from = self.cursor.position();
        loop {
            if self.cursor.is_at_end() {
                let pos = self.pos_from(start);
                self.error(
                    LexErrorKind::UnexpectedCharacter,
                    "unterminated block comment",
                    pos,
                );
                let text = self.cursor.slice_from(from).to_string();
                self.push(TokenKind::BlockComment(text), start);
                return;
            }
            if self.cursor.current_char() == '*' && self.cursor.peek_char() == '/' {
                let text = self.cursor.slice_from(from).to_string();
                self.cursor.advance();
                self.cursor.advance();
                self.push(TokenKind::BlockComment(text), start);
                return;
            }
            self.cursor.advance();
        }
    }

    // =========================================================================
    // Small helpers
    // =========================================================================

    fn mode(&self) -> LexMode {
        *self.modes.last().expect("mode stack never empty")
    }

    fn skip_inline_ws(&mut self) {
        self.cursor.advance_while(|c| c == ' ' || c == '\t');
    }

    fn start(&self) -> Start {
        Start {
            line: self.cursor.line(),
            column: self.cursor.column(),
            offset: self.cursor.position(),
        }
    }

    fn pos_from(&self, start: Start) -> Position {
        Position::new(
            start.line,
            start.column,
            start.offset,
            self.cursor.position() - start.offset,
        )
    }

    fn here(&self) -> Position {
        Position::point(self.cursor.line(), self.cursor.column(), self.cursor.position())
    }

    fn push(&mut self, kind: TokenKind, start: Start) {
        let pos = self.pos_from(start);
        self.tokens.push(Token::new(kind, pos));
    }

    fn error(&mut self, kind: LexErrorKind, message: impl Into<String>, pos: Position) {
        let err = Error::new(kind, message, pos).with_frame(self.file, pos.line);
        self.errors.push(err);
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Move accumulated literal text out of `buf` into a fragment.
fn flush_literal(fragments: &mut Vec<TextFragment>, buf: &mut String, template_len: &mut usize) {
    if buf.is_empty() {
        return;
    }
    let text = std::mem::take(buf);
    let offset = *template_len;
    *template_len += text.len();
    fragments.push(TextFragment::Literal { text, offset });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let (tokens, errors) = tokenize(source, None);
        assert!(errors.is_empty(), "unexpected lex errors: {errors:?}");
        tokens.into_iter().map(|t| t.kind).collect()
    }

    fn lex_errors(source: &str) -> Vec<Error> {
        tokenize(source, None).1
    }

    fn literal(text: &str, offset: usize) -> TextFragment {
        TextFragment::Literal {
            text: text.into(),
            offset,
        }
    }

    #[test]
    fn test_top_level_state_block() {
        let kinds = kinds("state\n  coffeeBeans: 5\n  milk: 2\n");
        assert_eq!(
            kinds,
            vec![
                TokenKind::State,
                TokenKind::Indent,
                TokenKind::Ident("coffeeBeans".into()),
                TokenKind::Colon,
                TokenKind::Int(5),
                TokenKind::Newline,
                TokenKind::Ident("milk".into()),
                TokenKind::Colon,
                TokenKind::Int(2),
                TokenKind::Dedent,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_braced_character_block() {
        let kinds = kinds("character barista { name: \"Alex\", friendliness: 3 }\n");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Character,
                TokenKind::Ident("barista".into()),
                TokenKind::LBrace,
                TokenKind::Ident("name".into()),
                TokenKind::Colon,
                TokenKind::Str(vec![literal("Alex", 0)]),
                TokenKind::Comma,
                TokenKind::Ident("friendliness".into()),
                TokenKind::Colon,
                TokenKind::Int(3),
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_narrator_line_in_beat() {
        let kinds = kinds("beat Start\n  The rain keeps falling.\n");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Beat,
                TokenKind::Ident("Start".into()),
                TokenKind::Indent,
                TokenKind::Text(vec![literal("The rain keeps falling.", 0)]),
                TokenKind::Dedent,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_dialogue_line_with_tags() {
        let kinds = kinds("beat Greet\n  barista: <happy>Welcome back!</happy>\n");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Beat,
                TokenKind::Ident("Greet".into()),
                TokenKind::Indent,
                TokenKind::Ident("barista".into()),
                TokenKind::Colon,
                TokenKind::Text(vec![
                    TextFragment::TagOpen {
                        name: "happy".into(),
                        offset: 0
                    },
                    literal("Welcome back!", 0),
                    TextFragment::TagClose {
                        name: "happy".into(),
                        offset: 13
                    },
                ]),
                TokenKind::Dedent,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_interpolation_fragments() {
        let (tokens, errors) = tokenize("beat B\n  \"Served by $barista.name today\"\n", None);
        assert!(errors.is_empty());
        let frags = tokens
            .iter()
            .find_map(|t| match &t.kind {
                TokenKind::Str(frags) => Some(frags.clone()),
                _ => None,
            })
            .expect("string token");
        assert_eq!(
            frags,
            vec![
                literal("Served by ", 0),
                TextFragment::Interp {
                    path: vec!["barista".into(), "name".into()],
                    offset: 10
                },
                literal(" today", 10),
            ]
        );
    }

    #[test]
    fn test_assignment_is_code_not_text() {
        let kinds = kinds("beat B\n  coffeeBeans -= 2\n");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Beat,
                TokenKind::Ident("B".into()),
                TokenKind::Indent,
                TokenKind::Ident("coffeeBeans".into()),
                TokenKind::MinusEq,
                TokenKind::Int(2),
                TokenKind::Dedent,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_transition_and_self_transition() {
        let kinds = kinds("beat B\n  -> Next\n  -> .\n");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Beat,
                TokenKind::Ident("B".into()),
                TokenKind::Indent,
                TokenKind::Arrow,
                TokenKind::Ident("Next".into()),
                TokenKind::Newline,
                TokenKind::Arrow,
                TokenKind::Dot,
                TokenKind::Dedent,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_choice_prompt_with_guard() {
        let kinds = kinds("beat B\n  choice\n    Cappuccino if coffeeBeans >= 2 and milk > 0\n      milk -= 1\n");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Beat,
                TokenKind::Ident("B".into()),
                TokenKind::Indent,
                TokenKind::Choice,
                TokenKind::Indent,
                TokenKind::Text(vec![literal("Cappuccino", 0)]),
                TokenKind::If,
                TokenKind::Ident("coffeeBeans".into()),
                TokenKind::GtEq,
                TokenKind::Int(2),
                TokenKind::AndAnd,
                TokenKind::Ident("milk".into()),
                TokenKind::Gt,
                TokenKind::Int(0),
                TokenKind::Indent,
                TokenKind::Ident("milk".into()),
                TokenKind::MinusEq,
                TokenKind::Int(1),
                TokenKind::Dedent,
                TokenKind::Dedent,
                TokenKind::Dedent,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_quoted_prompt_keeps_if_inside() {
        let (tokens, errors) = tokenize("beat B\n  choice\n    \"What if?\" if milk > 0\n      milk -= 1\n", None);
        assert!(errors.is_empty());
        let prompt = tokens
            .iter()
            .find_map(|t| match &t.kind {
                TokenKind::Str(frags) => Some(frags.clone()),
                _ => None,
            })
            .expect("prompt");
        assert_eq!(prompt, vec![literal("What if?", 0)]);
        assert!(tokens.iter().any(|t| t.kind == TokenKind::If));
    }

    #[test]
    fn test_tilde_forces_narration() {
        let kinds = kinds("beat B\n  ~ state of the art\n");
        assert!(kinds.contains(&TokenKind::Text(vec![literal("state of the art", 0)])));
    }

    #[test]
    fn test_string_escapes() {
        let (tokens, errors) = tokenize("beat B\n  \"a\\\"b\\n\\t\\\\c\"\n", None);
        assert!(errors.is_empty());
        let frags = tokens
            .iter()
            .find_map(|t| match &t.kind {
                TokenKind::Str(frags) => Some(frags.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(frags, vec![literal("a\"b\n\t\\c", 0)]);
    }

    #[test]
    fn test_invalid_escape_reported() {
        let errors = lex_errors("beat B\n  \"bad \\q escape\"\n");
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].kind,
            loreline_util::ErrorKind::Lex(LexErrorKind::InvalidEscape)
        );
    }

    #[test]
    fn test_unterminated_string_reported() {
        let errors = lex_errors("beat B\n  \"no closing quote\n");
        assert!(errors
            .iter()
            .any(|e| e.kind == loreline_util::ErrorKind::Lex(LexErrorKind::UnterminatedString)));
    }

    #[test]
    fn test_mixed_indentation_reported() {
        let errors = lex_errors("beat B\n \t x = 1\n");
        assert!(errors
            .iter()
            .any(|e| e.kind == loreline_util::ErrorKind::Lex(LexErrorKind::InconsistentIndent)));
    }

    #[test]
    fn test_bad_dedent_reported() {
        let errors = lex_errors("beat B\n    x = 1\n  y = 2\n");
        assert!(errors
            .iter()
            .any(|e| e.kind == loreline_util::ErrorKind::Lex(LexErrorKind::InconsistentIndent)));
    }

    #[test]
    fn test_crlf_normalised() {
        let lf = kinds("beat B\n  x = 1\n");
        let crlf = kinds("beat B\r\n  x = 1\r\n");
        assert_eq!(lf, crlf);
    }

    #[test]
    fn test_comments_are_tokens() {
        let kinds = kinds("// top note\nbeat B\n  /* aside */\n  x = 1\n");
        assert!(kinds.contains(&TokenKind::LineComment(" top note".into())));
        assert!(kinds.contains(&TokenKind::BlockComment(" aside ".into())));
    }

    #[test]
    fn test_float_and_int_literals() {
        let kinds = kinds("state\n  a: 3\n  b: 2.5\n");
        assert!(kinds.contains(&TokenKind::Int(3)));
        assert!(kinds.contains(&TokenKind::Float(2.5)));
    }

    #[test]
    fn test_trailing_dot_number_reported() {
        let errors = lex_errors("state\n  a: 12.\n");
        assert!(errors
            .iter()
            .any(|e| e.kind == loreline_util::ErrorKind::Lex(LexErrorKind::InvalidNumber)));
    }

    #[test]
    fn test_positions_track_lines_and_columns() {
        let (tokens, _) = tokenize("beat B\n  x = 1\n", None);
        let ident = tokens
            .iter()
            .find(|t| matches!(&t.kind, TokenKind::Ident(name) if name == "x"))
            .unwrap();
        assert_eq!(ident.pos.line, 2);
        assert_eq!(ident.pos.column, 3);
        assert_eq!(ident.pos.offset, 9);
        assert_eq!(ident.pos.length, 1);
    }

    #[test]
    fn test_lone_dollar_and_angle_stay_literal() {
        let (tokens, errors) = tokenize("beat B\n  \"cost: 5$ < 10\"\n", None);
        assert!(errors.is_empty());
        let frags = tokens
            .iter()
            .find_map(|t| match &t.kind {
                TokenKind::Str(frags) => Some(frags.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(frags, vec![literal("cost: 5$ < 10", 0)]);
    }
}

#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::tokenize;
    use crate::token::TokenKind;

    proptest! {
        /// The lexer is total: any input produces a token stream ending in
        /// Eof, never a panic.
        #[test]
        fn lexer_never_panics(source in "\\PC{0,200}") {
            let (tokens, _errors) = tokenize(&source, None);
            prop_assert_eq!(tokens.last().map(|t| t.kind.clone()), Some(TokenKind::Eof));
        }

        /// Token offsets never run backwards.
        #[test]
        fn token_offsets_monotonic(source in "[ a-zA-Z0-9:\"\\n\\-><=+]{0,200}") {
            let (tokens, _errors) = tokenize(&source, None);
            let mut last = 0usize;
            for token in &tokens {
                prop_assert!(token.pos.offset >= last || token.pos.length == 0);
                last = token.pos.offset;
            }
        }
    }
}
