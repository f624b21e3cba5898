//! Rachet Parser - recursive descent over the token vector
//!
//! There is no recovery: the first token that does not fit the grammar ends
//! the parse with a syntax error naming what was expected.

use crate::ast::*;
use crate::error::{RachetError, RachetResult};
use crate::lexer::{Token, TokenKind};
use crate::span::Span;

pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn parse(&mut self) -> RachetResult<Program> {
        let start = self.current_span();
        let mut items = Vec::new();
        let mut seen_target = false;

        while !self.at_end() {
            match self.peek_kind() {
                TokenKind::Use => {
                    let span = self.current_span();
                    let stmt = self.parse_use()?;
                    if seen_target {
                        return Err(RachetError::syntax(
                            "a single `use crate::` statement",
                            format!("a second crate target `{}`", stmt.target),
                            span.merge(stmt.span),
                        ));
                    }
                    seen_target = true;
                    items.push(Item::Use(stmt));
                }
                TokenKind::Fn => items.push(Item::Function(self.parse_function()?)),
                _ => return Err(self.unexpected("`use` or `fn`")),
            }
        }

        Ok(Program { items, span: start.merge(self.current_span()) })
    }

    fn parse_use(&mut self) -> RachetResult<UseStatement> {
        let start = self.current_span();
        self.expect(TokenKind::Use)?;
        self.expect(TokenKind::Crate)?;
        self.expect(TokenKind::ColonColon)?;
        let target = match self.peek_kind() {
            TokenKind::CrateName(target) => {
                self.advance();
                target
            }
            _ => return Err(self.unexpected("crate name `iso` or `bin`")),
        };
        self.expect(TokenKind::Semi)?;
        Ok(UseStatement { target, span: start.merge(self.prev_span()) })
    }

    fn parse_function(&mut self) -> RachetResult<FunctionDecl> {
        let start = self.current_span();
        self.expect(TokenKind::Fn)?;
        let name = match self.peek_kind() {
            TokenKind::Main => {
                self.advance();
                "main".to_string()
            }
            TokenKind::Ident(name) => {
                self.advance();
                name
            }
            _ => return Err(self.unexpected("function name")),
        };

        self.expect(TokenKind::LParen)?;
        let params = self.parse_params()?;
        if name == "main" {
            if let Some(param) = params.first() {
                return Err(RachetError::syntax(
                    "`)` (main takes no parameters)",
                    format!("parameter `{}`", param.name),
                    param.span,
                ));
            }
        }
        self.expect(TokenKind::RParen)?;

        self.expect(TokenKind::LBrace)?;
        let body = self.parse_block()?;
        self.expect(TokenKind::RBrace)?;

        Ok(FunctionDecl { name, params, body, span: start.merge(self.prev_span()) })
    }

    fn parse_params(&mut self) -> RachetResult<Vec<Param>> {
        let mut params = Vec::new();
        while !self.check(TokenKind::RParen) && !self.at_end() {
            let start = self.current_span();
            let name = self.parse_ident()?;
            let ty = self.parse_type_annotation()?;
            params.push(Param { name, ty, span: start.merge(self.prev_span()) });
            if !self.check(TokenKind::RParen) {
                self.expect(TokenKind::Comma)?;
            }
        }
        Ok(params)
    }

    fn parse_type_annotation(&mut self) -> RachetResult<Option<String>> {
        if self.check(TokenKind::Colon) {
            self.advance();
            Ok(Some(self.parse_ident()?))
        } else {
            Ok(None)
        }
    }

    /// Statements up to (not including) the closing brace
    fn parse_block(&mut self) -> RachetResult<Block> {
        let start = self.current_span();
        let mut stmts = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.at_end() {
            stmts.push(self.parse_stmt()?);
        }
        let span = match stmts.last() {
            Some(last) => start.merge(last.span()),
            None => Span::new(start.start, start.start),
        };
        Ok(Block { stmts, span })
    }

    fn parse_stmt(&mut self) -> RachetResult<Stmt> {
        match self.peek_kind() {
            TokenKind::Let => self.parse_let(),
            TokenKind::If => Ok(Stmt::If(self.parse_if()?)),
            TokenKind::Match => self.parse_match(),
            TokenKind::Ident(_) | TokenKind::Input | TokenKind::Os
                if self.peek_nth_kind(1) == TokenKind::LParen =>
            {
                let call = self.parse_call()?;
                if self.check(TokenKind::Semi) {
                    self.advance();
                }
                Ok(Stmt::Call(call))
            }
            _ => Err(self.unexpected("statement (`let`, `if`, `match`, or a call)")),
        }
    }

    fn parse_let(&mut self) -> RachetResult<Stmt> {
        let start = self.current_span();
        self.expect(TokenKind::Let)?;
        let name = self.parse_ident()?;
        let ty = self.parse_type_annotation()?;
        self.expect(TokenKind::Eq)?;
        let value = self.parse_expr()?;
        self.expect(TokenKind::Semi)?;
        Ok(Stmt::Let { name, ty, value, span: start.merge(self.prev_span()) })
    }

    fn parse_if(&mut self) -> RachetResult<IfStmt> {
        let start = self.current_span();
        self.expect(TokenKind::If)?;
        self.expect(TokenKind::LParen)?;
        let condition = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::LBrace)?;
        let then_branch = self.parse_block()?;
        self.expect(TokenKind::RBrace)?;

        let else_branch = if self.check(TokenKind::Else) {
            self.advance();
            if self.check(TokenKind::If) {
                Some(ElseBranch::ElseIf(Box::new(self.parse_if()?)))
            } else {
                self.expect(TokenKind::LBrace)?;
                let block = self.parse_block()?;
                self.expect(TokenKind::RBrace)?;
                Some(ElseBranch::Else(block))
            }
        } else {
            None
        };

        Ok(IfStmt { condition, then_branch, else_branch, span: start.merge(self.prev_span()) })
    }

    fn parse_match(&mut self) -> RachetResult<Stmt> {
        let start = self.current_span();
        self.expect(TokenKind::Match)?;
        let scrutinee = self.parse_expr()?;
        self.expect(TokenKind::LBrace)?;

        let mut arms = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.at_end() {
            let arm_start = self.current_span();
            let pattern = match self.peek_kind() {
                TokenKind::Str(s) => {
                    self.advance();
                    s
                }
                _ => return Err(self.unexpected("string literal pattern")),
            };
            self.expect(TokenKind::FatArrow)?;
            self.expect(TokenKind::LBrace)?;
            let body = self.parse_block()?;
            self.expect(TokenKind::RBrace)?;
            arms.push(MatchArm { pattern, body, span: arm_start.merge(self.prev_span()) });
            if self.check(TokenKind::Comma) {
                self.advance();
            }
        }
        self.expect(TokenKind::RBrace)?;

        Ok(Stmt::Match { scrutinee, arms, span: start.merge(self.prev_span()) })
    }

    fn parse_expr(&mut self) -> RachetResult<Expr> {
        self.parse_binary(0)
    }

    fn parse_binary(&mut self, min_prec: u8) -> RachetResult<Expr> {
        let mut left = self.parse_unary()?;

        while let Some((op, prec)) = self.get_binary_op() {
            if prec < min_prec {
                break;
            }
            self.advance();
            let right = self.parse_binary(prec + 1)?;
            let span = left.span().merge(right.span());
            left = Expr::Binary { left: Box::new(left), op, right: Box::new(right), span };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> RachetResult<Expr> {
        match self.peek_kind() {
            TokenKind::Not => {
                let start = self.current_span();
                self.advance();
                let operand = self.parse_unary()?;
                let span = start.merge(operand.span());
                Ok(Expr::Unary { op: UnaryOp::Not, operand: Box::new(operand), span })
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> RachetResult<Expr> {
        let span = self.current_span();
        match self.peek_kind() {
            TokenKind::Number(value) => {
                self.advance();
                Ok(Expr::Number { value, span })
            }
            TokenKind::Str(value) => {
                self.advance();
                Ok(Expr::Str { value, span })
            }
            TokenKind::Ident(_) | TokenKind::Input | TokenKind::Os
                if self.peek_nth_kind(1) == TokenKind::LParen =>
            {
                Ok(Expr::Call(self.parse_call()?))
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Expr::Variable { name, span })
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_call(&mut self) -> RachetResult<Call> {
        let start = self.current_span();
        let callee = match self.peek_kind() {
            TokenKind::Ident(name) => name,
            TokenKind::Input => "input".to_string(),
            TokenKind::Os => "os".to_string(),
            _ => return Err(self.unexpected("function name")),
        };
        self.advance();
        self.expect(TokenKind::LParen)?;

        let mut args = Vec::new();
        while !self.check(TokenKind::RParen) && !self.at_end() {
            args.push(self.parse_argument()?);
            if !self.check(TokenKind::RParen) {
                self.expect(TokenKind::Comma)?;
            }
        }
        self.expect(TokenKind::RParen)?;

        Ok(Call { callee, args, span: start.merge(self.prev_span()) })
    }

    fn parse_argument(&mut self) -> RachetResult<Argument> {
        let span = self.current_span();
        let arg = match self.peek_kind() {
            TokenKind::Number(value) => Argument::Number { value, span },
            TokenKind::Str(value) => Argument::Str { value, span },
            TokenKind::Ident(name) => Argument::Ident { name, span },
            _ => return Err(self.unexpected("call argument (number, string, or identifier)")),
        };
        self.advance();
        Ok(arg)
    }

    fn parse_ident(&mut self) -> RachetResult<String> {
        match self.peek_kind() {
            TokenKind::Ident(s) => {
                self.advance();
                Ok(s)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn get_binary_op(&self) -> Option<(BinaryOp, u8)> {
        match self.peek_kind() {
            TokenKind::Or => Some((BinaryOp::Or, 1)),
            TokenKind::And => Some((BinaryOp::And, 2)),
            TokenKind::EqEq => Some((BinaryOp::Eq, 3)),
            TokenKind::NotEq => Some((BinaryOp::Ne, 3)),
            TokenKind::Plus => Some((BinaryOp::Add, 4)),
            TokenKind::Minus => Some((BinaryOp::Sub, 4)),
            TokenKind::Star => Some((BinaryOp::Mul, 5)),
            TokenKind::Slash => Some((BinaryOp::Div, 5)),
            _ => None,
        }
    }

    // Helper methods
    fn peek_kind(&self) -> TokenKind { self.peek_nth_kind(0) }
    fn peek_nth_kind(&self, n: usize) -> TokenKind {
        self.tokens.get(self.pos + n).map(|t| t.kind.clone()).unwrap_or(TokenKind::Eof)
    }
    fn current_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.span)
            .unwrap_or_default()
    }
    fn prev_span(&self) -> Span {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|t| t.span)
            .unwrap_or_else(|| self.current_span())
    }
    fn at_end(&self) -> bool { matches!(self.peek_kind(), TokenKind::Eof) }
    fn check(&self, k: TokenKind) -> bool { std::mem::discriminant(&self.peek_kind()) == std::mem::discriminant(&k) }
    fn advance(&mut self) { if !self.at_end() { self.pos += 1; } }

    fn expect(&mut self, k: TokenKind) -> RachetResult<()> {
        if self.check(k.clone()) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(k.describe()))
        }
    }

    fn unexpected(&self, expected: impl Into<String>) -> RachetError {
        RachetError::syntax(expected, self.peek_kind().describe(), self.current_span())
    }
}

/// Convenience wrapper around [`Parser::parse`].
pub fn parse(tokens: &[Token]) -> RachetResult<Program> {
    Parser::new(tokens).parse()
}
