//! The printer itself.

use loreline_lex::TextFragment;
use loreline_par::{
    BinOp, BinaryExpr, Block, ChoiceStmt, Comment, Decl, Expr, FieldInit, IfStmt, LiteralValue,
    Script, StateDecl, Stmt, TextStmt, TransitionTarget, UnOp,
};

use crate::PrintOptions;

/// Print a script as canonical source text.
pub fn print(script: &Script, options: &PrintOptions) -> String {
    let mut printer = Printer {
        out: String::new(),
        options,
        depth: 0,
    };
    printer.print_script(script);
    printer.out
}

struct Printer<'a> {
    out: String,
    options: &'a PrintOptions,
    depth: usize,
}

impl<'a> Printer<'a> {
    fn print_script(&mut self, script: &Script) {
        let mut first = true;
        for decl in &script.decls {
            if !first {
                self.newline();
            }
            first = false;
            match decl {
                Decl::State(state) => self.print_state(state),
                Decl::Character(character) => {
                    self.print_comments(&character.comments);
                    self.line(&format!("character {}", character.name));
                    self.print_fields(&character.fields);
                }
                Decl::Beat(beat) => {
                    self.print_comments(&beat.comments);
                    self.line(&format!("beat {}", beat.name));
                    self.print_block(&beat.body);
                }
            }
        }
    }

    fn print_state(&mut self, state: &StateDecl) {
        self.print_comments(&state.comments);
        if state.is_new {
            self.line("new state");
        } else {
            self.line("state");
        }
        self.print_fields(&state.fields);
    }

    fn print_fields(&mut self, fields: &[FieldInit]) {
        self.depth += 1;
        for field in fields {
            self.print_comments(&field.comments);
            let value = self.expr_to_string(&field.value);
            self.line(&format!("{}: {}", field.name, value));
        }
        self.depth -= 1;
    }

    fn print_block(&mut self, block: &Block) {
        self.depth += 1;
        for stmt in &block.stmts {
            self.print_stmt(stmt);
        }
        self.depth -= 1;
    }

    fn print_stmt(&mut self, stmt: &Stmt) {
        self.print_comments(stmt.comments());
        match stmt {
            Stmt::Text(text) => self.print_text(text),
            Stmt::Assign(assign) => {
                let target = assign.target.segments.join(".");
                let value = self.expr_to_string(&assign.value);
                self.line(&format!("{} {} {}", target, assign.op, value));
            }
            Stmt::If(stmt) => self.print_if(stmt),
            Stmt::Choice(choice) => self.print_choice(choice),
            Stmt::Transition(transition) => match &transition.target {
                TransitionTarget::Beat(name) => self.line(&format!("-> {name}")),
                TransitionTarget::Current => self.line("-> ."),
            },
            Stmt::State(state) => self.print_state(state),
            Stmt::Call(call) => {
                let text = self.expr_to_string(&Expr::Call(call.call.clone()));
                self.line(&text);
            }
        }
    }

    fn print_text(&mut self, text: &TextStmt) {
        let rendered = raw_form(&text.fragments);
        let body = if text.quoted || !raw_text_is_safe(&rendered, false) {
            quoted_form(&text.fragments)
        } else {
            rendered
        };
        match &text.speaker {
            Some(speaker) => self.line(&format!("{speaker}: {body}")),
            None => self.line(&body),
        }
    }

    fn print_if(&mut self, stmt: &IfStmt) {
        let cond = self.expr_to_string(&stmt.cond);
        self.line(&format!("if {cond}"));
        self.print_block(&stmt.then_block);
        self.print_else(stmt.else_block.as_ref());
    }

    fn print_else(&mut self, else_block: Option<&Block>) {
        let Some(block) = else_block else { return };
        // An else block holding exactly one bare `if` prints as `else if`.
        if block.stmts.len() == 1 {
            if let Stmt::If(nested) = &block.stmts[0] {
                if nested.comments.is_empty() {
                    let cond = self.expr_to_string(&nested.cond);
                    self.line(&format!("else if {cond}"));
                    self.print_block(&nested.then_block);
                    self.print_else(nested.else_block.as_ref());
                    return;
                }
            }
        }
        self.line("else");
        self.print_block(block);
    }

    fn print_choice(&mut self, choice: &ChoiceStmt) {
        self.line("choice");
        self.depth += 1;
        for option in &choice.options {
            self.print_comments(&option.comments);
            let rendered = raw_form(&option.prompt);
            let prompt = if option.quoted || !raw_text_is_safe(&rendered, true) {
                quoted_form(&option.prompt)
            } else {
                rendered
            };
            match &option.guard {
                Some(guard) => {
                    let guard = self.expr_to_string(guard);
                    self.line(&format!("{prompt} if {guard}"));
                }
                None => self.line(&prompt),
            }
            self.print_block(&option.body);
        }
        self.depth -= 1;
    }

    fn print_comments(&mut self, comments: &[Comment]) {
        for comment in comments {
            if comment.block {
                self.line(&format!("/*{}*/", comment.text));
            } else {
                self.line(&format!("//{}", comment.text));
            }
        }
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn expr_to_string(&self, expr: &Expr) -> String {
        let mut out = String::new();
        write_expr(&mut out, expr, 0);
        out
    }

    // =========================================================================
    // Output plumbing
    // =========================================================================

    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str(&self.options.indent);
        }
        self.out.push_str(text);
        self.newline();
    }

    fn newline(&mut self) {
        self.out.push_str(&self.options.newline);
    }
}

/// Binary operator precedence for parenthesisation; higher binds tighter.
fn bin_prec(op: BinOp) -> u8 {
    match op {
        BinOp::Or => 1,
        BinOp::And => 2,
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => 3,
        BinOp::Add | BinOp::Sub => 4,
        BinOp::Mul | BinOp::Div => 5,
    }
}

fn bin_symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Eq => "==",
        BinOp::Ne => "!=",
        BinOp::Lt => "<",
        BinOp::Le => "<=",
        BinOp::Gt => ">",
        BinOp::Ge => ">=",
        BinOp::And => "and",
        BinOp::Or => "or",
    }
}

fn write_expr(out: &mut String, expr: &Expr, min_prec: u8) {
    match expr {
        Expr::Literal(lit) => match &lit.value {
            LiteralValue::Int(value) => out.push_str(&value.to_string()),
            LiteralValue::Float(value) => out.push_str(&float_literal(*value)),
            LiteralValue::Bool(value) => out.push_str(if *value { "true" } else { "false" }),
            LiteralValue::Null => out.push_str("null"),
        },
        Expr::Str(lit) => out.push_str(&quoted_form(&lit.fragments)),
        Expr::Path(path) => out.push_str(&path.segments.join(".")),
        Expr::Unary(unary) => {
            out.push(match unary.op {
                UnOp::Not => '!',
                UnOp::Neg => '-',
            });
            write_expr(out, &unary.expr, 6);
        }
        Expr::Binary(binary) => write_binary(out, binary, min_prec),
        Expr::Call(call) => {
            out.push_str(&call.name);
            out.push('(');
            for (i, arg) in call.args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, arg, 0);
            }
            out.push(')');
        }
        Expr::Paren(paren) => {
            out.push('(');
            write_expr(out, &paren.inner, 0);
            out.push(')');
        }
    }
}

fn write_binary(out: &mut String, binary: &BinaryExpr, min_prec: u8) {
    let prec = bin_prec(binary.op);
    let parens = prec < min_prec;
    if parens {
        out.push('(');
    }
    write_expr(out, &binary.left, prec);
    out.push(' ');
    out.push_str(bin_symbol(binary.op));
    out.push(' ');
    write_expr(out, &binary.right, prec + 1);
    if parens {
        out.push(')');
    }
}

/// A float literal that re-parses as a float: always keeps a decimal point.
fn float_literal(value: f64) -> String {
    if value.is_finite() && value == value.trunc() {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

// =============================================================================
// Text forms
// =============================================================================

/// The bare (unquoted) rendition of a fragment stream.
fn raw_form(fragments: &[TextFragment]) -> String {
    let mut out = String::new();
    for fragment in fragments {
        match fragment {
            TextFragment::Literal { text, .. } => out.push_str(text),
            TextFragment::Interp { path, .. } => {
                out.push('$');
                out.push_str(&path.join("."));
            }
            TextFragment::TagOpen { name, .. } => {
                out.push('<');
                out.push_str(name);
                out.push('>');
            }
            TextFragment::TagClose { name, .. } => {
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
        }
    }
    out
}

/// The quoted rendition of a fragment stream, escapes applied.
fn quoted_form(fragments: &[TextFragment]) -> String {
    let mut out = String::from("\"");
    for fragment in fragments {
        match fragment {
            TextFragment::Literal { text, .. } => {
                for c in text.chars() {
                    match c {
                        '\\' => out.push_str("\\\\"),
                        '"' => out.push_str("\\\""),
                        '\n' => out.push_str("\\n"),
                        '\t' => out.push_str("\\t"),
                        '\r' => out.push_str("\\r"),
                        other => out.push(other),
                    }
                }
            }
            TextFragment::Interp { path, .. } => {
                out.push('$');
                out.push_str(&path.join("."));
            }
            TextFragment::TagOpen { name, .. } => {
                out.push('<');
                out.push_str(name);
                out.push('>');
            }
            TextFragment::TagClose { name, .. } => {
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
        }
    }
    out.push('"');
    out
}

/// Whether a bare text line would re-lex as the same text under the body
/// (or, with `prompt`, choice) line rules. Anything ambiguous gets quoted.
fn raw_text_is_safe(rendered: &str, prompt: bool) -> bool {
    if rendered.is_empty() {
        return false;
    }
    if rendered.trim() != rendered {
        return false;
    }
    let first = rendered.chars().next().unwrap_or('\0');
    if first == '"' || first == '~' || first == '{' || first == '}' {
        return false;
    }
    if rendered.starts_with("->") || rendered.starts_with("//") || rendered.starts_with("/*") {
        return false;
    }

    if prompt {
        // Prompts end at a bare `if` or an inline `{`.
        return !rendered.contains('{')
            && !rendered
                .split([' ', '\t'])
                .skip(1)
                .any(|word| word == "if");
    }

    if !(first.is_ascii_alphabetic() || first == '_') {
        return true;
    }

    // Mirror the lexer's identifier-line classification.
    let bytes: Vec<char> = rendered.chars().collect();
    let mut i = 0;
    let mut segments = 1;
    let ident = |c: char| c.is_ascii_alphanumeric() || c == '_';
    while i < bytes.len() && ident(bytes[i]) {
        i += 1;
    }
    let first_word: String = bytes[..i].iter().collect();
    if matches!(
        first_word.as_str(),
        "state" | "new" | "beat" | "character" | "choice" | "if" | "else" | "import"
    ) {
        return false;
    }
    loop {
        if i + 1 < bytes.len() && bytes[i] == '.' && (bytes[i + 1].is_ascii_alphabetic() || bytes[i + 1] == '_') {
            i += 1;
            while i < bytes.len() && ident(bytes[i]) {
                i += 1;
            }
            segments += 1;
        } else {
            break;
        }
    }
    if i < bytes.len() && bytes[i] == '(' {
        return false;
    }
    if i < bytes.len() && bytes[i] == ':' && segments == 1 {
        return false;
    }
    while i < bytes.len() && (bytes[i] == ' ' || bytes[i] == '\t') {
        i += 1;
    }
    if i < bytes.len() {
        let c = bytes[i];
        let next = bytes.get(i + 1).copied().unwrap_or('\0');
        if c == '=' && next != '=' {
            return false;
        }
        if matches!(c, '+' | '-' | '*' | '/') && next == '=' {
            return false;
        }
        if c == ':' && segments == 1 {
            return false;
        }
    }
    true
}
