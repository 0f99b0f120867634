//! Top-level declaration parsing: `import`, `state`, `character`, `beat`.

use loreline_lex::TokenKind;
use loreline_util::ParseErrorKind;

use crate::ast::*;
use crate::node_id::NodeIdGen;
use crate::{Parser, TopItem};

impl Parser {
    /// Parse the next top-level item, or `None` at end of input.
    ///
    /// Declarations come back fully built; `import` comes back unresolved
    /// so the driver can splice the imported file in at this point.
    pub(crate) fn parse_top_item(&mut self, ids: &mut NodeIdGen) -> Option<TopItem> {
        loop {
            self.skip_trivia(true);
            while self.match_token(&TokenKind::Dedent) {
                self.skip_trivia(true);
            }
            match self.kind() {
                TokenKind::Eof => return None,
                TokenKind::Import => {
                    let pos = self.pos();
                    self.advance();
                    self.take_comments();
                    let Some((name, _)) = self.expect_ident("an import name") else {
                        self.synchronize();
                        continue;
                    };
                    return Some(TopItem::Import { name, pos });
                }
                TokenKind::New => {
                    let pos = self.pos();
                    self.advance();
                    if !self.match_token(&TokenKind::State) {
                        self.error_here(
                            ParseErrorKind::UnexpectedToken,
                            format!("expected 'state' after 'new', found {}", self.kind()),
                        );
                        self.synchronize();
                        continue;
                    }
                    let decl = self.parse_state_body(ids, true, pos, true);
                    return Some(TopItem::Decl(Decl::State(decl)));
                }
                TokenKind::State => {
                    let pos = self.pos();
                    self.advance();
                    let decl = self.parse_state_body(ids, false, pos, true);
                    return Some(TopItem::Decl(Decl::State(decl)));
                }
                TokenKind::Character => match self.parse_character_decl(ids) {
                    Some(decl) => return Some(TopItem::Decl(decl)),
                    None => self.synchronize(),
                },
                TokenKind::Beat => match self.parse_beat_decl(ids) {
                    Some(decl) => return Some(TopItem::Decl(decl)),
                    None => self.synchronize(),
                },
                other => {
                    let message = format!(
                        "expected 'import', 'state', 'character' or 'beat', found {other}"
                    );
                    self.error_here(ParseErrorKind::UnexpectedToken, message);
                    self.synchronize();
                }
            }
        }
    }

    /// Parse the field block of a `state` declaration. The `state` (and
    /// optional `new`) keywords are already consumed; `pos` points at the
    /// first of them.
    pub(crate) fn parse_state_body(
        &mut self,
        ids: &mut NodeIdGen,
        is_new: bool,
        pos: loreline_util::Position,
        top_level: bool,
    ) -> StateDecl {
        let comments = self.take_comments();
        let id = if top_level {
            ids.begin_section()
        } else {
            ids.next()
        };
        let fields = self.parse_field_block(ids);
        let pos = fields.last().map(|f| pos.to(f.pos)).unwrap_or(pos);
        StateDecl {
            id,
            pos,
            is_new,
            fields,
            comments,
        }
    }

    fn parse_character_decl(&mut self, ids: &mut NodeIdGen) -> Option<Decl> {
        let comments = self.take_comments();
        let pos = self.pos();
        self.advance();
        let (name, _) = self.expect_ident("a character name")?;
        let id = ids.begin_section();
        let fields = self.parse_field_block(ids);
        let pos = pos.to(self.prev_pos());
        Some(Decl::Character(CharacterDecl {
            id,
            pos,
            name,
            fields,
            comments,
        }))
    }

    fn parse_beat_decl(&mut self, ids: &mut NodeIdGen) -> Option<Decl> {
        let comments = self.take_comments();
        let pos = self.pos();
        self.advance();
        let (name, _) = self.expect_ident("a beat name")?;
        let id = ids.begin_section();
        let body = self.parse_block(ids);
        let pos = pos.to(self.prev_pos());
        Some(Decl::Beat(BeatDecl {
            id,
            pos,
            name,
            body,
            comments,
        }))
    }

    /// Parse `{ name: expr, … }` or an indented run of `name: expr` lines.
    /// Accepts an empty block (header with nothing under it).
    pub(crate) fn parse_field_block(&mut self, ids: &mut NodeIdGen) -> Vec<FieldInit> {
        let mut fields = Vec::new();
        ids.begin_block();
        self.skip_trivia(false);
        if self.match_token(&TokenKind::LBrace) {
            loop {
                self.skip_field_separators();
                if self.match_token(&TokenKind::RBrace) {
                    break;
                }
                if self.at(&TokenKind::Eof) {
                    self.error_here(ParseErrorKind::UnexpectedToken, "unclosed field block");
                    break;
                }
                match self.parse_field(ids) {
                    Some(field) => fields.push(field),
                    None => self.synchronize(),
                }
            }
        } else if self.match_token(&TokenKind::Indent) {
            loop {
                self.skip_field_separators();
                if self.match_token(&TokenKind::Dedent) {
                    break;
                }
                if self.at(&TokenKind::Eof) {
                    break;
                }
                match self.parse_field(ids) {
                    Some(field) => fields.push(field),
                    None => self.synchronize(),
                }
            }
        }
        ids.end_block();
        fields
    }

    /// Newlines and commas both separate fields.
    fn skip_field_separators(&mut self) {
        loop {
            self.skip_trivia(true);
            if !self.match_token(&TokenKind::Comma) {
                return;
            }
        }
    }

    fn parse_field(&mut self, ids: &mut NodeIdGen) -> Option<FieldInit> {
        let comments = self.take_comments();
        let (name, pos) = self.expect_ident("a field name")?;
        self.expect(&TokenKind::Colon, "':' after the field name")?;
        let id = ids.next();
        let value = self.parse_expr(ids)?;
        let pos = pos.to(value.pos());
        Some(FieldInit {
            id,
            pos,
            name,
            value,
            comments,
        })
    }
}
