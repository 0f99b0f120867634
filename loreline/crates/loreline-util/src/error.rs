//! The common error model.
//!
//! Every stage reports failures through one [`Error`] type: a kind (grouped
//! into lexical, parse and runtime enums), a human-readable message, the
//! [`Position`] the error points at, and a trace of `(file, line)` frames
//! describing where in the script flow the failure happened.

use thiserror::Error as ThisError;

use crate::position::Position;

/// Lexical error kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ThisError)]
pub enum LexErrorKind {
    /// A string literal reached end of line or end of input before `"`.
    #[error("unterminated string")]
    UnterminatedString,

    /// A backslash escape other than `\\ \" \n \t \r`.
    #[error("invalid escape sequence")]
    InvalidEscape,

    /// A malformed numeric literal, e.g. a trailing `.` with no digits.
    #[error("invalid number")]
    InvalidNumber,

    /// A character with no meaning at this point in the source.
    #[error("unexpected character")]
    UnexpectedCharacter,

    /// Mixed tabs and spaces, or a dedent to a level never used.
    #[error("inconsistent indentation")]
    InconsistentIndent,
}

/// Parse error kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ThisError)]
pub enum ParseErrorKind {
    /// The parser saw a token that no rule accepts here.
    #[error("unexpected token")]
    UnexpectedToken,

    /// Two beats share a name and are not byte-identical.
    #[error("duplicate beat")]
    DuplicateBeat,

    /// Two characters share a name and are not byte-identical.
    #[error("duplicate character")]
    DuplicateCharacter,

    /// The file loader failed to deliver an imported file.
    #[error("unresolved import")]
    UnresolvedImport,

    /// An import chain re-entered a file still being parsed.
    #[error("import cycle")]
    ImportCycle,

    /// An expression that started well but could not be completed.
    #[error("malformed expression")]
    MalformedExpression,
}

/// Runtime error kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ThisError)]
pub enum RuntimeErrorKind {
    /// A transition or start target names no declared beat.
    #[error("unknown beat")]
    UnknownBeat,

    /// A character lookup by identifier found no declared character.
    #[error("unknown character")]
    UnknownCharacter,

    /// A read of an undeclared name under strict access.
    #[error("undefined reference")]
    UndefinedReference,

    /// An operation applied to values of the wrong type.
    #[error("type mismatch")]
    TypeMismatch,

    /// Integer division or modulo by zero, or float division by zero.
    #[error("division by zero")]
    DivideByZero,

    /// The execution stack exceeded its depth bound.
    #[error("stack overflow")]
    StackOverflow,

    /// The transition counter exceeded its bound.
    #[error("infinite loop guard triggered")]
    InfiniteLoopGuard,

    /// A continuation was invoked when the interpreter was not awaiting it.
    #[error("continuation invoked twice")]
    DoubleContinuation,

    /// A save payload with an unknown version or shape.
    #[error("incompatible save data")]
    IncompatibleSaveData,

    /// A choice guard called a host function not declared pure
    /// (strict access only).
    #[error("impure call in choice guard")]
    ImpureGuardCall,

    /// A host-registered function returned an error.
    #[error("host function failed")]
    HostFunctionFailed,
}

/// An error kind from any stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Lex(LexErrorKind),
    Parse(ParseErrorKind),
    Runtime(RuntimeErrorKind),
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Lex(k) => k.fmt(f),
            ErrorKind::Parse(k) => k.fmt(f),
            ErrorKind::Runtime(k) => k.fmt(f),
        }
    }
}

impl From<LexErrorKind> for ErrorKind {
    fn from(kind: LexErrorKind) -> Self {
        ErrorKind::Lex(kind)
    }
}

impl From<ParseErrorKind> for ErrorKind {
    fn from(kind: ParseErrorKind) -> Self {
        ErrorKind::Parse(kind)
    }
}

impl From<RuntimeErrorKind> for ErrorKind {
    fn from(kind: RuntimeErrorKind) -> Self {
        ErrorKind::Runtime(kind)
    }
}

/// One frame of the script-flow trace attached to an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceFrame {
    /// Script file the frame points into, when known.
    pub file: Option<String>,
    /// Line number (1-based) inside that file.
    pub line: u32,
}

/// An error from any stage of the pipeline.
///
/// # Examples
///
/// ```
/// use loreline_util::{Error, LexErrorKind, Position};
///
/// let err = Error::new(
///     LexErrorKind::UnterminatedString,
///     "string not closed before end of line",
///     Position::new(4, 12, 58, 1),
/// );
/// assert!(err.to_string().contains("4:12"));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Error {
    /// What went wrong.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
    /// Where it went wrong.
    pub pos: Position,
    /// Script-flow frames, innermost first.
    pub trace: Vec<TraceFrame>,
}

impl Error {
    /// Create an error with an empty trace.
    pub fn new(kind: impl Into<ErrorKind>, message: impl Into<String>, pos: Position) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            pos,
            trace: Vec::new(),
        }
    }

    /// Append a trace frame (innermost first).
    pub fn with_frame(mut self, file: Option<&str>, line: u32) -> Self {
        self.trace.push(TraceFrame {
            file: file.map(str::to_owned),
            line,
        });
        self
    }

    /// Returns true if the kind is a lexical error.
    pub fn is_lex(&self) -> bool {
        matches!(self.kind, ErrorKind::Lex(_))
    }

    /// Returns true if the kind is a parse error.
    pub fn is_parse(&self) -> bool {
        matches!(self.kind, ErrorKind::Parse(_))
    }

    /// Returns true if the kind is a runtime error.
    pub fn is_runtime(&self) -> bool {
        matches!(self.kind, ErrorKind::Runtime(_))
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} at {}", self.kind, self.message, self.pos)?;
        for frame in &self.trace {
            match &frame.file {
                Some(file) => write!(f, "\n  in {}:{}", file, frame.line)?,
                None => write!(f, "\n  at line {}", frame.line)?,
            }
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

/// Result alias used across the runtime.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display() {
        assert_eq!(
            LexErrorKind::UnterminatedString.to_string(),
            "unterminated string"
        );
        assert_eq!(ParseErrorKind::ImportCycle.to_string(), "import cycle");
        assert_eq!(
            RuntimeErrorKind::InfiniteLoopGuard.to_string(),
            "infinite loop guard triggered"
        );
    }

    #[test]
    fn test_kind_grouping() {
        let err = Error::new(ParseErrorKind::UnexpectedToken, "found '}'", Position::NONE);
        assert!(err.is_parse());
        assert!(!err.is_lex());
        assert!(!err.is_runtime());
    }

    #[test]
    fn test_error_display_with_trace() {
        let err = Error::new(
            RuntimeErrorKind::UnknownBeat,
            "no beat named 'Ending'",
            Position::new(9, 3, 120, 9),
        )
        .with_frame(Some("story.lor"), 9);
        let text = err.to_string();
        assert!(text.contains("unknown beat"));
        assert!(text.contains("9:3"));
        assert!(text.contains("story.lor:9"));
    }

    #[test]
    fn test_from_kind() {
        let kind: ErrorKind = LexErrorKind::InvalidEscape.into();
        assert_eq!(kind, ErrorKind::Lex(LexErrorKind::InvalidEscape));
    }
}
