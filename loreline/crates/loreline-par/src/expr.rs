//! Expression parsing (Pratt / top-down operator precedence).
//!
//! Precedence, loosest to tightest: `or`, `and`, comparisons, `+ -`,
//! `* /`, unary `! -`.

use loreline_lex::TokenKind;
use loreline_util::ParseErrorKind;

use crate::ast::*;
use crate::node_id::NodeIdGen;
use crate::Parser;

/// Binding powers. Higher binds tighter; infix operators use (bp, bp + 1)
/// for left associativity.
mod bp {
    pub const MIN: u8 = 0;
    pub const OR: u8 = 2;
    pub const AND: u8 = 4;
    pub const CMP: u8 = 6;
    pub const ADD: u8 = 10;
    pub const MUL: u8 = 12;
    pub const UNARY: u8 = 14;
}

impl Parser {
    pub(crate) fn parse_expr(&mut self, ids: &mut NodeIdGen) -> Option<Expr> {
        self.parse_expr_bp(ids, bp::MIN)
    }

    /// Comments inside expressions are dropped, not attached.
    fn skip_expr_comments(&mut self) {
        while self.kind().is_comment() {
            self.advance();
        }
    }

    fn parse_expr_bp(&mut self, ids: &mut NodeIdGen, min_bp: u8) -> Option<Expr> {
        let mut lhs = self.parse_prefix(ids)?;

        loop {
            self.skip_expr_comments();
            let (rbp, op) = match self.peek_binop() {
                Some((lbp, rbp, op)) if lbp >= min_bp => (rbp, op),
                _ => break,
            };
            let id = ids.next();
            self.advance();
            let rhs = self.parse_expr_bp(ids, rbp)?;
            let pos = lhs.pos().to(rhs.pos());
            lhs = Expr::Binary(BinaryExpr {
                id,
                pos,
                op,
                left: Box::new(lhs),
                right: Box::new(rhs),
            });
        }

        Some(lhs)
    }

    fn peek_binop(&self) -> Option<(u8, u8, BinOp)> {
        let entry = match self.kind() {
            TokenKind::OrOr => (bp::OR, bp::OR + 1, BinOp::Or),
            TokenKind::AndAnd => (bp::AND, bp::AND + 1, BinOp::And),
            TokenKind::EqEq => (bp::CMP, bp::CMP + 1, BinOp::Eq),
            TokenKind::NotEq => (bp::CMP, bp::CMP + 1, BinOp::Ne),
            TokenKind::Lt => (bp::CMP, bp::CMP + 1, BinOp::Lt),
            TokenKind::LtEq => (bp::CMP, bp::CMP + 1, BinOp::Le),
            TokenKind::Gt => (bp::CMP, bp::CMP + 1, BinOp::Gt),
            TokenKind::GtEq => (bp::CMP, bp::CMP + 1, BinOp::Ge),
            TokenKind::Plus => (bp::ADD, bp::ADD + 1, BinOp::Add),
            TokenKind::Minus => (bp::ADD, bp::ADD + 1, BinOp::Sub),
            TokenKind::Star => (bp::MUL, bp::MUL + 1, BinOp::Mul),
            TokenKind::Slash => (bp::MUL, bp::MUL + 1, BinOp::Div),
            _ => return None,
        };
        Some(entry)
    }

    fn parse_prefix(&mut self, ids: &mut NodeIdGen) -> Option<Expr> {
        self.skip_expr_comments();
        let pos = self.pos();
        match self.kind().clone() {
            TokenKind::Minus => {
                self.advance();
                // Fold a negated constant into the literal.
                match self.kind().clone() {
                    TokenKind::Int(value) => {
                        self.advance();
                        Some(Expr::Literal(LiteralExpr {
                            id: ids.next(),
                            pos,
                            value: LiteralValue::Int(-value),
                        }))
                    }
                    TokenKind::Float(value) => {
                        self.advance();
                        Some(Expr::Literal(LiteralExpr {
                            id: ids.next(),
                            pos,
                            value: LiteralValue::Float(-value),
                        }))
                    }
                    _ => {
                        let id = ids.next();
                        let expr = self.parse_expr_bp(ids, bp::UNARY)?;
                        Some(Expr::Unary(UnaryExpr {
                            id,
                            pos,
                            op: UnOp::Neg,
                            expr: Box::new(expr),
                        }))
                    }
                }
            }
            TokenKind::Not => {
                self.advance();
                let id = ids.next();
                let expr = self.parse_expr_bp(ids, bp::UNARY)?;
                Some(Expr::Unary(UnaryExpr {
                    id,
                    pos,
                    op: UnOp::Not,
                    expr: Box::new(expr),
                }))
            }
            TokenKind::Int(value) => {
                self.advance();
                Some(Expr::Literal(LiteralExpr {
                    id: ids.next(),
                    pos,
                    value: LiteralValue::Int(value),
                }))
            }
            TokenKind::Float(value) => {
                self.advance();
                Some(Expr::Literal(LiteralExpr {
                    id: ids.next(),
                    pos,
                    value: LiteralValue::Float(value),
                }))
            }
            TokenKind::True => {
                self.advance();
                Some(Expr::Literal(LiteralExpr {
                    id: ids.next(),
                    pos,
                    value: LiteralValue::Bool(true),
                }))
            }
            TokenKind::False => {
                self.advance();
                Some(Expr::Literal(LiteralExpr {
                    id: ids.next(),
                    pos,
                    value: LiteralValue::Bool(false),
                }))
            }
            TokenKind::Null => {
                self.advance();
                Some(Expr::Literal(LiteralExpr {
                    id: ids.next(),
                    pos,
                    value: LiteralValue::Null,
                }))
            }
            TokenKind::Str(fragments) => {
                self.advance();
                Some(Expr::Str(StrLit {
                    id: ids.next(),
                    pos,
                    fragments,
                }))
            }
            TokenKind::Ident(_) => {
                if matches!(self.kind_at(1), TokenKind::LParen) {
                    self.parse_call_expr(ids).map(Expr::Call)
                } else {
                    self.parse_path_expr(ids).map(Expr::Path)
                }
            }
            TokenKind::LParen => {
                self.advance();
                let id = ids.next();
                let inner = self.parse_expr(ids)?;
                self.expect(&TokenKind::RParen, "')'")?;
                Some(Expr::Paren(ParenExpr {
                    id,
                    pos: pos.to(inner.pos()),
                    inner: Box::new(inner),
                }))
            }
            other => {
                let message = format!("expected an expression, found {other}");
                self.error_here(ParseErrorKind::MalformedExpression, message);
                None
            }
        }
    }

    /// Parse `ident(.ident)*`.
    pub(crate) fn parse_path_expr(&mut self, ids: &mut NodeIdGen) -> Option<PathExpr> {
        let (head, pos) = self.expect_ident("an identifier")?;
        let id = ids.next();
        let mut segments = vec![head];
        let mut end = pos;
        while self.at(&TokenKind::Dot) {
            self.advance();
            let Some((segment, seg_pos)) = self.expect_ident("a field name after '.'") else {
                return None;
            };
            segments.push(segment);
            end = seg_pos;
        }
        Some(PathExpr {
            id,
            pos: pos.to(end),
            segments,
        })
    }

    /// Parse `name(arg, …)`. The cursor sits on the name.
    pub(crate) fn parse_call_expr(&mut self, ids: &mut NodeIdGen) -> Option<CallExpr> {
        let (name, pos) = self.expect_ident("a function name")?;
        let id = ids.next();
        self.expect(&TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        if !self.at(&TokenKind::RParen) {
            loop {
                let arg = self.parse_expr(ids)?;
                args.push(arg);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let end = self.expect(&TokenKind::RParen, "')'")?;
        Some(CallExpr {
            id,
            pos: pos.to(end),
            name,
            args,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::*;
    use crate::parse;

    /// Parse `expr` by wrapping it in a field initialiser.
    fn parse_expr(expr: &str) -> Expr {
        let source = format!("state\n  probe: {expr}\n");
        let script = parse(&source, None, None).expect("expression should parse");
        let Decl::State(state) = &script.decls[0] else {
            panic!("expected state");
        };
        state.fields[0].value.clone()
    }

    #[test]
    fn test_precedence_mul_over_add() {
        let Expr::Binary(add) = parse_expr("1 + 2 * 3") else {
            panic!("expected binary");
        };
        assert_eq!(add.op, BinOp::Add);
        let Expr::Binary(mul) = *add.right else {
            panic!("expected nested mul");
        };
        assert_eq!(mul.op, BinOp::Mul);
    }

    #[test]
    fn test_left_associative_sub() {
        let Expr::Binary(outer) = parse_expr("10 - 4 - 3") else {
            panic!("expected binary");
        };
        assert_eq!(outer.op, BinOp::Sub);
        let Expr::Binary(inner) = *outer.left else {
            panic!("expected nested sub");
        };
        assert_eq!(inner.op, BinOp::Sub);
    }

    #[test]
    fn test_word_operators() {
        let Expr::Binary(expr) = parse_expr("a >= 2 and b > 0 or c") else {
            panic!("expected binary");
        };
        // `or` binds loosest
        assert_eq!(expr.op, BinOp::Or);
    }

    #[test]
    fn test_unary_and_parens() {
        let Expr::Unary(not) = parse_expr("!(a == b)") else {
            panic!("expected unary");
        };
        assert_eq!(not.op, UnOp::Not);
        assert!(matches!(*not.expr, Expr::Paren(_)));
    }

    #[test]
    fn test_negative_literal_folded() {
        let Expr::Literal(lit) = parse_expr("-3") else {
            panic!("expected literal");
        };
        assert_eq!(lit.value, LiteralValue::Int(-3));
        let Expr::Literal(lit) = parse_expr("-2.5") else {
            panic!("expected literal");
        };
        assert_eq!(lit.value, LiteralValue::Float(-2.5));
    }

    #[test]
    fn test_call_with_args() {
        let Expr::Call(call) = parse_expr("chance(3)") else {
            panic!("expected call");
        };
        assert_eq!(call.name, "chance");
        assert_eq!(call.args.len(), 1);
    }

    #[test]
    fn test_path_expr() {
        let Expr::Path(path) = parse_expr("barista.friendliness") else {
            panic!("expected path");
        };
        assert_eq!(path.segments, ["barista", "friendliness"]);
    }

    #[test]
    fn test_string_with_interpolation() {
        let Expr::Str(lit) = parse_expr("\"hi $name\"") else {
            panic!("expected string");
        };
        assert_eq!(lit.fragments.len(), 2);
    }

    #[test]
    fn test_malformed_expression() {
        let err = parse("state\n  probe: 1 +\n", None, None).unwrap_err();
        assert!(err.is_parse());
    }

    #[test]
    fn test_inline_comments_dropped() {
        let Expr::Binary(expr) = parse_expr("1 + /* carried over */ 2") else {
            panic!("expected binary");
        };
        assert_eq!(expr.op, BinOp::Add);
    }
}
