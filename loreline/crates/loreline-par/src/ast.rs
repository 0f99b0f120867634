//! AST node definitions and the [`Script`] container.

use std::fmt;

use loreline_lex::TextFragment;
use loreline_util::Position;
use rustc_hash::FxHashMap;

use crate::node_id::NodeId;

/// A comment captured at statement granularity for the printer.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    /// Text between the delimiters, verbatim.
    pub text: String,
    /// True for `/* */`, false for `//`.
    pub block: bool,
    pub pos: Position,
}

/// A parsed script: an ordered list of top-level declarations.
///
/// Imports have already been resolved and merged by the parser, so the
/// declaration list is self-contained. The script is immutable once built;
/// the interpreter and printer only read it.
#[derive(Debug, Clone)]
pub struct Script {
    pub decls: Vec<Decl>,
    /// Path of the root file, for diagnostics.
    pub file: Option<String>,
    beats: FxHashMap<String, usize>,
    characters: FxHashMap<String, usize>,
}

impl Script {
    /// Build a script, indexing beats and characters by name.
    ///
    /// Name uniqueness is the parser's responsibility; on duplicates the
    /// first declaration wins here.
    pub fn new(decls: Vec<Decl>, file: Option<String>) -> Self {
        let mut beats = FxHashMap::default();
        let mut characters = FxHashMap::default();
        for (index, decl) in decls.iter().enumerate() {
            match decl {
                Decl::Beat(beat) => {
                    beats.entry(beat.name.clone()).or_insert(index);
                }
                Decl::Character(character) => {
                    characters.entry(character.name.clone()).or_insert(index);
                }
                Decl::State(_) => {}
            }
        }
        Self {
            decls,
            file,
            beats,
            characters,
        }
    }

    /// Look up a beat by name.
    pub fn beat(&self, name: &str) -> Option<&BeatDecl> {
        self.beats.get(name).and_then(|&i| match &self.decls[i] {
            Decl::Beat(beat) => Some(beat),
            _ => None,
        })
    }

    /// The first beat in declaration order, the default entry point.
    pub fn first_beat(&self) -> Option<&BeatDecl> {
        self.decls.iter().find_map(|d| match d {
            Decl::Beat(beat) => Some(beat),
            _ => None,
        })
    }

    /// Look up a character by its declared identifier.
    pub fn character(&self, name: &str) -> Option<&CharacterDecl> {
        self.characters.get(name).and_then(|&i| match &self.decls[i] {
            Decl::Character(character) => Some(character),
            _ => None,
        })
    }

    /// True if `name` is a declared character identifier.
    pub fn has_character(&self, name: &str) -> bool {
        self.characters.contains_key(name)
    }

    /// All character declarations in order.
    pub fn characters(&self) -> impl Iterator<Item = &CharacterDecl> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Character(character) => Some(character),
            _ => None,
        })
    }

    /// All top-level state declarations in order.
    pub fn state_decls(&self) -> impl Iterator<Item = &StateDecl> {
        self.decls.iter().filter_map(|d| match d {
            Decl::State(state) => Some(state),
            _ => None,
        })
    }

    /// All beat declarations in order.
    pub fn beats(&self) -> impl Iterator<Item = &BeatDecl> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Beat(beat) => Some(beat),
            _ => None,
        })
    }

    /// Find the block with the given id, anywhere in the script.
    ///
    /// The id's section field names the owning declaration, so the search
    /// only walks one beat.
    pub fn find_block(&self, id: NodeId) -> Option<&Block> {
        let decl = self
            .decls
            .iter()
            .find(|d| d.id().section() == id.section())?;
        match decl {
            Decl::Beat(beat) => find_block_in(&beat.body, id),
            _ => None,
        }
    }

    /// Find the statement with the given id, anywhere in the script.
    pub fn find_stmt(&self, id: NodeId) -> Option<&Stmt> {
        let decl = self
            .decls
            .iter()
            .find(|d| d.id().section() == id.section())?;
        match decl {
            Decl::Beat(beat) => find_stmt_in(&beat.body, id),
            _ => None,
        }
    }
}

fn find_block_in<'a>(block: &'a Block, id: NodeId) -> Option<&'a Block> {
    if block.id == id {
        return Some(block);
    }
    for stmt in &block.stmts {
        let found = match stmt {
            Stmt::If(stmt) => find_block_in(&stmt.then_block, id)
                .or_else(|| stmt.else_block.as_ref().and_then(|b| find_block_in(b, id))),
            Stmt::Choice(stmt) => stmt
                .options
                .iter()
                .find_map(|option| find_block_in(&option.body, id)),
            _ => None,
        };
        if found.is_some() {
            return found;
        }
    }
    None
}

fn find_stmt_in<'a>(block: &'a Block, id: NodeId) -> Option<&'a Stmt> {
    for stmt in &block.stmts {
        if stmt.id() == id {
            return Some(stmt);
        }
        let found = match stmt {
            Stmt::If(stmt) => find_stmt_in(&stmt.then_block, id)
                .or_else(|| stmt.else_block.as_ref().and_then(|b| find_stmt_in(b, id))),
            Stmt::Choice(stmt) => stmt
                .options
                .iter()
                .find_map(|option| find_stmt_in(&option.body, id)),
            _ => None,
        };
        if found.is_some() {
            return found;
        }
    }
    None
}

/// A top-level declaration.
#[derive(Debug, Clone)]
pub enum Decl {
    State(StateDecl),
    Character(CharacterDecl),
    Beat(BeatDecl),
}

impl Decl {
    pub fn id(&self) -> NodeId {
        match self {
            Decl::State(d) => d.id,
            Decl::Character(d) => d.id,
            Decl::Beat(d) => d.id,
        }
    }

    pub fn pos(&self) -> Position {
        match self {
            Decl::State(d) => d.pos,
            Decl::Character(d) => d.pos,
            Decl::Beat(d) => d.pos,
        }
    }

    pub fn comments(&self) -> &[Comment] {
        match self {
            Decl::State(d) => &d.comments,
            Decl::Character(d) => &d.comments,
            Decl::Beat(d) => &d.comments,
        }
    }
}

/// A `state` block, top-level or beat-local.
///
/// With `is_new` set the frame is transient: re-initialised every time the
/// statement runs (hence on every entry to its beat). Without it the frame
/// is persistent for the lifetime of the interpreter.
#[derive(Debug, Clone)]
pub struct StateDecl {
    pub id: NodeId,
    pub pos: Position,
    pub is_new: bool,
    pub fields: Vec<FieldInit>,
    pub comments: Vec<Comment>,
}

/// One `name: expr` initialiser inside a state or character block.
#[derive(Debug, Clone)]
pub struct FieldInit {
    pub id: NodeId,
    pub pos: Position,
    pub name: String,
    pub value: Expr,
    pub comments: Vec<Comment>,
}

/// A `character` declaration.
///
/// The declared identifier is how scripts and the host address the
/// character; the conventional `name` field holds the display name.
#[derive(Debug, Clone)]
pub struct CharacterDecl {
    pub id: NodeId,
    pub pos: Position,
    pub name: String,
    pub fields: Vec<FieldInit>,
    pub comments: Vec<Comment>,
}

/// A `beat` declaration, the unit of flow control.
#[derive(Debug, Clone)]
pub struct BeatDecl {
    pub id: NodeId,
    pub pos: Position,
    pub name: String,
    pub body: Block,
    pub comments: Vec<Comment>,
}

/// An ordered list of statements.
#[derive(Debug, Clone)]
pub struct Block {
    pub id: NodeId,
    pub pos: Position,
    pub stmts: Vec<Stmt>,
}

/// A statement inside a beat body, if-branch or option body.
#[derive(Debug, Clone)]
pub enum Stmt {
    Text(TextStmt),
    Assign(AssignStmt),
    If(IfStmt),
    Choice(ChoiceStmt),
    Transition(TransitionStmt),
    State(StateDecl),
    Call(CallStmt),
}

impl Stmt {
    pub fn id(&self) -> NodeId {
        match self {
            Stmt::Text(s) => s.id,
            Stmt::Assign(s) => s.id,
            Stmt::If(s) => s.id,
            Stmt::Choice(s) => s.id,
            Stmt::Transition(s) => s.id,
            Stmt::State(s) => s.id,
            Stmt::Call(s) => s.id,
        }
    }

    pub fn pos(&self) -> Position {
        match self {
            Stmt::Text(s) => s.pos,
            Stmt::Assign(s) => s.pos,
            Stmt::If(s) => s.pos,
            Stmt::Choice(s) => s.pos,
            Stmt::Transition(s) => s.pos,
            Stmt::State(s) => s.pos,
            Stmt::Call(s) => s.pos,
        }
    }

    pub fn comments(&self) -> &[Comment] {
        match self {
            Stmt::Text(s) => &s.comments,
            Stmt::Assign(s) => &s.comments,
            Stmt::If(s) => &s.comments,
            Stmt::Choice(s) => &s.comments,
            Stmt::Transition(s) => &s.comments,
            Stmt::State(s) => &s.comments,
            Stmt::Call(s) => &s.comments,
        }
    }
}

/// A narrator or dialogue line.
///
/// `speaker` is the character identifier for dialogue, `None` for narration.
/// `quoted` records whether the source used the `"…"` form, which the
/// printer preserves.
#[derive(Debug, Clone)]
pub struct TextStmt {
    pub id: NodeId,
    pub pos: Position,
    pub speaker: Option<String>,
    pub quoted: bool,
    pub fragments: Vec<TextFragment>,
    pub comments: Vec<Comment>,
}

/// Assignment operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
}

impl fmt::Display for AssignOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AssignOp::Set => "=",
            AssignOp::Add => "+=",
            AssignOp::Sub => "-=",
            AssignOp::Mul => "*=",
            AssignOp::Div => "/=",
        })
    }
}

/// `path op expr`.
#[derive(Debug, Clone)]
pub struct AssignStmt {
    pub id: NodeId,
    pub pos: Position,
    pub target: PathExpr,
    pub op: AssignOp,
    pub value: Expr,
    pub comments: Vec<Comment>,
}

/// `if expr block [else …]`; `else if` chains are nested `If` statements
/// inside the else block.
#[derive(Debug, Clone)]
pub struct IfStmt {
    pub id: NodeId,
    pub pos: Position,
    pub cond: Expr,
    pub then_block: Block,
    pub else_block: Option<Block>,
    pub comments: Vec<Comment>,
}

/// A `choice` menu with at least one option.
#[derive(Debug, Clone)]
pub struct ChoiceStmt {
    pub id: NodeId,
    pub pos: Position,
    pub options: Vec<ChoiceOption>,
    pub comments: Vec<Comment>,
}

/// One option: prompt, optional guard, body.
#[derive(Debug, Clone)]
pub struct ChoiceOption {
    pub id: NodeId,
    pub pos: Position,
    pub prompt: Vec<TextFragment>,
    pub quoted: bool,
    pub guard: Option<Expr>,
    pub body: Block,
    pub comments: Vec<Comment>,
}

/// `-> Beat` or `-> .`.
#[derive(Debug, Clone)]
pub struct TransitionStmt {
    pub id: NodeId,
    pub pos: Position,
    pub target: TransitionTarget,
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionTarget {
    Beat(String),
    /// `-> .`: re-enter the current beat.
    Current,
}

/// A bare call statement, e.g. `notify("…")`.
#[derive(Debug, Clone)]
pub struct CallStmt {
    pub id: NodeId,
    pub pos: Position,
    pub call: CallExpr,
    pub comments: Vec<Comment>,
}

/// An expression.
#[derive(Debug, Clone)]
pub enum Expr {
    Literal(LiteralExpr),
    Str(StrLit),
    Path(PathExpr),
    Unary(UnaryExpr),
    Binary(BinaryExpr),
    Call(CallExpr),
    Paren(ParenExpr),
}

impl Expr {
    pub fn id(&self) -> NodeId {
        match self {
            Expr::Literal(e) => e.id,
            Expr::Str(e) => e.id,
            Expr::Path(e) => e.id,
            Expr::Unary(e) => e.id,
            Expr::Binary(e) => e.id,
            Expr::Call(e) => e.id,
            Expr::Paren(e) => e.id,
        }
    }

    pub fn pos(&self) -> Position {
        match self {
            Expr::Literal(e) => e.pos,
            Expr::Str(e) => e.pos,
            Expr::Path(e) => e.pos,
            Expr::Unary(e) => e.pos,
            Expr::Binary(e) => e.pos,
            Expr::Call(e) => e.pos,
            Expr::Paren(e) => e.pos,
        }
    }
}

/// A non-string literal.
#[derive(Debug, Clone)]
pub struct LiteralExpr {
    pub id: NodeId,
    pub pos: Position,
    pub value: LiteralValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

/// A string literal with its fragment stream (interpolation included).
#[derive(Debug, Clone)]
pub struct StrLit {
    pub id: NodeId,
    pub pos: Position,
    pub fragments: Vec<TextFragment>,
}

/// A dotted identifier path, `a.b.c`.
#[derive(Debug, Clone)]
pub struct PathExpr {
    pub id: NodeId,
    pub pos: Position,
    pub segments: Vec<String>,
}

impl PathExpr {
    /// The first segment.
    pub fn head(&self) -> &str {
        &self.segments[0]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone)]
pub struct UnaryExpr {
    pub id: NodeId,
    pub pos: Position,
    pub op: UnOp,
    pub expr: Box<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone)]
pub struct BinaryExpr {
    pub id: NodeId,
    pub pos: Position,
    pub op: BinOp,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
}

/// A call to a host-registered function or built-in.
#[derive(Debug, Clone)]
pub struct CallExpr {
    pub id: NodeId,
    pub pos: Position,
    pub name: String,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone)]
pub struct ParenExpr {
    pub id: NodeId,
    pub pos: Position,
    pub inner: Box<Expr>,
}
