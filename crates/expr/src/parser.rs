//! Recursive-descent parser for the restricted expression language.
//!
//! Precedence, low to high: `||`, `&&`, equality, relational, additive,
//! multiplicative, unary, call/primary.

use crate::ast::{BinaryOp, Expr, Literal, UnaryOp};
use crate::error::{ExprError, ExprResult};
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(source: &str) -> Self {
        Self {
            tokens: Lexer::tokenize(source),
            pos: 0,
        }
    }

    pub fn parse(source: &str) -> ExprResult<Expr> {
        let mut parser = Parser::new(source);
        let expr = parser.parse_expr()?;
        parser.expect_eof()?;
        Ok(expr)
    }

    fn parse_expr(&mut self) -> ExprResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> ExprResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.check(&TokenKind::OrOr) {
            let span = self.advance().span;
            let rhs = self.parse_and()?;
            let merged = lhs.span().merge(rhs.span()).merge(span);
            lhs = Expr::Binary(BinaryOp::Or, Box::new(lhs), Box::new(rhs), merged);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> ExprResult<Expr> {
        let mut lhs = self.parse_equality()?;
        while self.check(&TokenKind::AndAnd) {
            let span = self.advance().span;
            let rhs = self.parse_equality()?;
            let merged = lhs.span().merge(rhs.span()).merge(span);
            lhs = Expr::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs), merged);
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> ExprResult<Expr> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::NotEq,
                _ => break,
            };
            let span = self.advance().span;
            let rhs = self.parse_relational()?;
            let merged = lhs.span().merge(rhs.span()).merge(span);
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs), merged);
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> ExprResult<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::LtEq => BinaryOp::LtEq,
                TokenKind::GtEq => BinaryOp::GtEq,
                _ => break,
            };
            let span = self.advance().span;
            let rhs = self.parse_additive()?;
            let merged = lhs.span().merge(rhs.span()).merge(span);
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs), merged);
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> ExprResult<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            let span = self.advance().span;
            let rhs = self.parse_multiplicative()?;
            let merged = lhs.span().merge(rhs.span()).merge(span);
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs), merged);
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> ExprResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            let span = self.advance().span;
            let rhs = self.parse_unary()?;
            let merged = lhs.span().merge(rhs.span()).merge(span);
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs), merged);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> ExprResult<Expr> {
        match self.peek().kind {
            TokenKind::Bang => {
                let span = self.advance().span;
                let operand = self.parse_unary()?;
                let merged = span.merge(operand.span());
                Ok(Expr::Unary(UnaryOp::Not, Box::new(operand), merged))
            }
            TokenKind::Minus => {
                let span = self.advance().span;
                let operand = self.parse_unary()?;
                let merged = span.merge(operand.span());
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(operand), merged))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> ExprResult<Expr> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Number(n) => {
                self.advance();
                Ok(Expr::Literal(Literal::Number(n), token.span))
            }
            TokenKind::String(s) => {
                self.advance();
                Ok(Expr::Literal(Literal::String(s), token.span))
            }
            TokenKind::Bool(b) => {
                self.advance();
                Ok(Expr::Literal(Literal::Bool(b), token.span))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::Literal(Literal::Null, token.span))
            }
            TokenKind::Ident(name) => {
                self.advance();
                if self.check(&TokenKind::LParen) {
                    self.parse_call(name, token.span)
                } else {
                    Ok(Expr::Var(name, token.span))
                }
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            other => Err(ExprError::UnexpectedToken {
                found: other.to_string(),
                position: token.span.start,
            }),
        }
    }

    fn parse_call(&mut self, name: String, start: crate::token::Span) -> ExprResult<Expr> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if self.check(&TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        let end = self.expect(TokenKind::RParen)?;
        Ok(Expr::Call(name, args, start.merge(end)))
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn expect(&mut self, kind: TokenKind) -> ExprResult<crate::token::Span> {
        if self.check(&kind) {
            Ok(self.advance().span)
        } else {
            Err(ExprError::UnexpectedToken {
                found: self.peek().kind.to_string(),
                position: self.peek().span.start,
            })
        }
    }

    fn expect_eof(&mut self) -> ExprResult<()> {
        if self.check(&TokenKind::Eof) {
            Ok(())
        } else {
            Err(ExprError::UnexpectedToken {
                found: self.peek().kind.to_string(),
                position: self.peek().span.start,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_arithmetic_with_precedence() {
        let expr = Parser::parse("1 + 2 * 3").unwrap();
        match expr {
            Expr::Binary(BinaryOp::Add, lhs, rhs, _) => {
                assert!(matches!(*lhs, Expr::Literal(Literal::Number(n), _) if n == 1.0));
                assert!(matches!(*rhs, Expr::Binary(BinaryOp::Mul, _, _, _)));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn parses_boolean_combinators_and_comparisons() {
        let expr = Parser::parse("temperature > 30 && humidity < 50").unwrap();
        assert!(matches!(expr, Expr::Binary(BinaryOp::And, _, _, _)));
    }

    #[test]
    fn parses_function_calls_with_multiple_args() {
        let expr = Parser::parse("max(abs(x), 10)").unwrap();
        if let Expr::Call(name, args, _) = &expr {
            assert_eq!(name, "max");
            assert_eq!(args.len(), 2);
        } else {
            panic!("expected call expression");
        }
    }

    #[test]
    fn rejects_unclosed_parens() {
        assert!(Parser::parse("(1 + 2").is_err());
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(Parser::parse("1 + 2 3").is_err());
    }

    #[test]
    fn rejects_a_bare_single_equals_instead_of_silently_truncating() {
        let err = Parser::parse("temperature = 5 && x").unwrap_err();
        assert!(matches!(err, ExprError::UnexpectedToken { .. }));
    }

    #[test]
    fn extracts_identifiers_for_dependency_analysis() {
        let expr = Parser::parse("temperature > threshold && !override_active").unwrap();
        assert_eq!(
            expr.identifiers(),
            vec![
                "override_active".to_string(),
                "temperature".to_string(),
                "threshold".to_string()
            ]
        );
    }
}
