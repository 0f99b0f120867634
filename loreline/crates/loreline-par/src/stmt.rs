//! Statement and block parsing for beat bodies.

use loreline_lex::TokenKind;
use loreline_util::ParseErrorKind;

use crate::ast::*;
use crate::node_id::NodeIdGen;
use crate::Parser;

impl Parser {
    /// Parse a `{ … }` or indented block of statements. A header with
    /// nothing under it yields an empty block.
    pub(crate) fn parse_block(&mut self, ids: &mut NodeIdGen) -> Block {
        let id = ids.begin_block();
        let pos = self.pos();
        let mut stmts = Vec::new();
        self.skip_trivia(false);
        if self.match_token(&TokenKind::LBrace) {
            loop {
                self.skip_trivia(true);
                if self.match_token(&TokenKind::RBrace) {
                    break;
                }
                if self.at(&TokenKind::Eof) {
                    self.error_here(ParseErrorKind::UnexpectedToken, "unclosed block");
                    break;
                }
                match self.parse_stmt(ids) {
                    Some(stmt) => stmts.push(stmt),
                    None => self.synchronize(),
                }
            }
        } else if self.match_token(&TokenKind::Indent) {
            loop {
                self.skip_trivia(true);
                if self.match_token(&TokenKind::Dedent) {
                    break;
                }
                if self.at(&TokenKind::Eof) {
                    break;
                }
                match self.parse_stmt(ids) {
                    Some(stmt) => stmts.push(stmt),
                    None => self.synchronize(),
                }
            }
        }
        ids.end_block();
        Block { id, pos, stmts }
    }

    pub(crate) fn parse_stmt(&mut self, ids: &mut NodeIdGen) -> Option<Stmt> {
        match self.kind() {
            TokenKind::If => self.parse_if_stmt(ids).map(Stmt::If),
            TokenKind::Choice => self.parse_choice_stmt(ids),
            TokenKind::Arrow => self.parse_transition_stmt(ids),
            TokenKind::New => {
                let pos = self.pos();
                self.advance();
                if !self.match_token(&TokenKind::State) {
                    self.error_here(
                        ParseErrorKind::UnexpectedToken,
                        format!("expected 'state' after 'new', found {}", self.kind()),
                    );
                    return None;
                }
                Some(Stmt::State(self.parse_state_body(ids, true, pos, false)))
            }
            TokenKind::State => {
                let pos = self.pos();
                self.advance();
                Some(Stmt::State(self.parse_state_body(ids, false, pos, false)))
            }
            TokenKind::Str(_) | TokenKind::Text(_) => self.parse_text_stmt(ids, None),
            TokenKind::Ident(_) => {
                if matches!(self.kind_at(1), TokenKind::Colon)
                    && matches!(self.kind_at(2), TokenKind::Str(_) | TokenKind::Text(_))
                {
                    self.parse_dialogue_stmt(ids)
                } else if matches!(self.kind_at(1), TokenKind::LParen) {
                    self.parse_call_stmt(ids)
                } else {
                    self.parse_assign_stmt(ids)
                }
            }
            TokenKind::Else => {
                self.error_here(
                    ParseErrorKind::UnexpectedToken,
                    "'else' without a matching 'if'",
                );
                None
            }
            other => {
                let message = format!("expected a statement, found {other}");
                self.error_here(ParseErrorKind::UnexpectedToken, message);
                None
            }
        }
    }

    fn parse_text_stmt(&mut self, ids: &mut NodeIdGen, speaker: Option<String>) -> Option<Stmt> {
        let comments = self.take_comments();
        let pos = self.pos();
        let (fragments, quoted) = match self.kind() {
            TokenKind::Str(fragments) => (fragments.clone(), true),
            TokenKind::Text(fragments) => (fragments.clone(), false),
            other => {
                let message = format!("expected text, found {other}");
                self.error_here(ParseErrorKind::UnexpectedToken, message);
                return None;
            }
        };
        self.advance();
        let id = ids.next();
        Some(Stmt::Text(TextStmt {
            id,
            pos,
            speaker,
            quoted,
            fragments,
            comments,
        }))
    }

    fn parse_dialogue_stmt(&mut self, ids: &mut NodeIdGen) -> Option<Stmt> {
        let (speaker, _) = self.expect_ident("a character name")?;
        self.expect(&TokenKind::Colon, "':' after the character name")?;
        self.parse_text_stmt(ids, Some(speaker))
    }

    fn parse_assign_stmt(&mut self, ids: &mut NodeIdGen) -> Option<Stmt> {
        let comments = self.take_comments();
        let pos = self.pos();
        let id = ids.next();
        let target = self.parse_path_expr(ids)?;
        let op = match self.kind() {
            TokenKind::Assign => AssignOp::Set,
            TokenKind::PlusEq => AssignOp::Add,
            TokenKind::MinusEq => AssignOp::Sub,
            TokenKind::StarEq => AssignOp::Mul,
            TokenKind::SlashEq => AssignOp::Div,
            other => {
                let message = format!("expected an assignment operator, found {other}");
                self.error_here(ParseErrorKind::UnexpectedToken, message);
                return None;
            }
        };
        self.advance();
        let value = self.parse_expr(ids)?;
        let pos = pos.to(value.pos());
        Some(Stmt::Assign(AssignStmt {
            id,
            pos,
            target,
            op,
            value,
            comments,
        }))
    }

    fn parse_call_stmt(&mut self, ids: &mut NodeIdGen) -> Option<Stmt> {
        let comments = self.take_comments();
        let pos = self.pos();
        let id = ids.next();
        let call = self.parse_call_expr(ids)?;
        let pos = pos.to(call.pos);
        Some(Stmt::Call(CallStmt {
            id,
            pos,
            call,
            comments,
        }))
    }

    fn parse_if_stmt(&mut self, ids: &mut NodeIdGen) -> Option<IfStmt> {
        let comments = self.take_comments();
        let pos = self.pos();
        self.advance();
        let id = ids.next();
        let cond = self.parse_expr(ids)?;
        let then_block = self.parse_block(ids);

        let else_block = if self.match_token(&TokenKind::Else) {
            if self.at(&TokenKind::If) {
                // `else if`: desugar into an else block holding one if.
                let block_id = ids.begin_block();
                let block_pos = self.pos();
                let nested = self.parse_if_stmt(ids);
                ids.end_block();
                Some(Block {
                    id: block_id,
                    pos: block_pos,
                    stmts: nested.map(Stmt::If).into_iter().collect(),
                })
            } else {
                Some(self.parse_block(ids))
            }
        } else {
            None
        };

        Some(IfStmt {
            id,
            pos,
            cond,
            then_block,
            else_block,
            comments,
        })
    }

    fn parse_choice_stmt(&mut self, ids: &mut NodeIdGen) -> Option<Stmt> {
        let comments = self.take_comments();
        let pos = self.pos();
        self.advance();
        let id = ids.next();

        let mut options = Vec::new();
        self.skip_trivia(false);
        if self.match_token(&TokenKind::LBrace) {
            loop {
                self.skip_trivia(true);
                if self.match_token(&TokenKind::RBrace) {
                    break;
                }
                if self.at(&TokenKind::Eof) {
                    self.error_here(ParseErrorKind::UnexpectedToken, "unclosed choice block");
                    break;
                }
                match self.parse_choice_option(ids) {
                    Some(option) => options.push(option),
                    None => self.synchronize(),
                }
            }
        } else if self.match_token(&TokenKind::Indent) {
            loop {
                self.skip_trivia(true);
                if self.match_token(&TokenKind::Dedent) {
                    break;
                }
                if self.at(&TokenKind::Eof) {
                    break;
                }
                match self.parse_choice_option(ids) {
                    Some(option) => options.push(option),
                    None => self.synchronize(),
                }
            }
        }

        if options.is_empty() {
            self.error_at(
                ParseErrorKind::UnexpectedToken,
                "a choice needs at least one option",
                pos,
            );
            return None;
        }
        Some(Stmt::Choice(ChoiceStmt {
            id,
            pos,
            options,
            comments,
        }))
    }

    fn parse_choice_option(&mut self, ids: &mut NodeIdGen) -> Option<ChoiceOption> {
        let comments = self.take_comments();
        let pos = self.pos();
        let (prompt, quoted) = match self.kind() {
            TokenKind::Str(fragments) => (fragments.clone(), true),
            TokenKind::Text(fragments) => (fragments.clone(), false),
            other => {
                let message = format!("expected an option prompt, found {other}");
                self.error_here(ParseErrorKind::UnexpectedToken, message);
                return None;
            }
        };
        self.advance();
        let id = ids.next();

        let guard = if self.match_token(&TokenKind::If) {
            Some(self.parse_expr(ids)?)
        } else {
            None
        };

        ids.begin_branch();
        let body = self.parse_block(ids);
        ids.end_branch();

        Some(ChoiceOption {
            id,
            pos,
            prompt,
            quoted,
            guard,
            body,
            comments,
        })
    }

    fn parse_transition_stmt(&mut self, ids: &mut NodeIdGen) -> Option<Stmt> {
        let comments = self.take_comments();
        let pos = self.pos();
        self.advance();
        let id = ids.next();
        let target = match self.kind() {
            TokenKind::Ident(name) => {
                let target = TransitionTarget::Beat(name.clone());
                self.advance();
                target
            }
            TokenKind::Dot => {
                self.advance();
                TransitionTarget::Current
            }
            other => {
                let message = format!("expected a beat name or '.', found {other}");
                self.error_here(ParseErrorKind::UnexpectedToken, message);
                return None;
            }
        };
        Some(Stmt::Transition(TransitionStmt {
            id,
            pos,
            target,
            comments,
        }))
    }
}
