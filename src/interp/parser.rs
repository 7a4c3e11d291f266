//! Recursive-descent parser producing the guest language AST.

use super::ast::{BinOp, Expr, ExprKind, Stmt, UnaryOp};
use super::lexer::{lex, TokKind, Token};
use super::SyntaxError;

/// Parse a program: statements separated by newlines or `;`.
pub fn parse(src: &str) -> Result<Vec<Stmt>, SyntaxError> {
    let tokens = lex(src)?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn program(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        let mut stmts = Vec::new();
        self.skip_separators();
        while !self.check(&TokKind::Eof) {
            stmts.push(self.statement()?);
            if !self.check(&TokKind::Eof) {
                self.separator()?;
                self.skip_separators();
            }
        }
        Ok(stmts)
    }

    fn statement(&mut self) -> Result<Stmt, SyntaxError> {
        let line = self.peek().line;
        if let TokKind::Ident(name) = self.peek().kind.clone() {
            if self.peek_ahead(1).kind == TokKind::Assign {
                self.advance();
                self.advance();
                let value = self.expression()?;
                return Ok(Stmt::Assign { name, value, line });
            }
        }
        let value = self.expression()?;
        Ok(Stmt::Expr { value, line })
    }

    fn expression(&mut self) -> Result<Expr, SyntaxError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.and_expr()?;
        while self.matches(&TokKind::Or) {
            let rhs = self.and_expr()?;
            lhs = binary(BinOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.not_expr()?;
        while self.matches(&TokKind::And) {
            let rhs = self.not_expr()?;
            lhs = binary(BinOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn not_expr(&mut self) -> Result<Expr, SyntaxError> {
        if self.check(&TokKind::Not) {
            let line = self.peek().line;
            self.advance();
            let operand = self.not_expr()?;
            return Ok(Expr {
                kind: ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                line,
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, SyntaxError> {
        let lhs = self.arith()?;
        let op = match self.peek().kind {
            TokKind::Eq => BinOp::Eq,
            TokKind::Ne => BinOp::Ne,
            TokKind::Lt => BinOp::Lt,
            TokKind::Le => BinOp::Le,
            TokKind::Gt => BinOp::Gt,
            TokKind::Ge => BinOp::Ge,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.arith()?;
        Ok(binary(op, lhs, rhs))
    }

    fn arith(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek().kind {
                TokKind::Plus => BinOp::Add,
                TokKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.term()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.factor()?;
        loop {
            let op = match self.peek().kind {
                TokKind::Star => BinOp::Mul,
                TokKind::Slash => BinOp::Div,
                TokKind::SlashSlash => BinOp::FloorDiv,
                TokKind::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.factor()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn factor(&mut self) -> Result<Expr, SyntaxError> {
        if self.check(&TokKind::Minus) {
            let line = self.peek().line;
            self.advance();
            let operand = self.factor()?;
            return Ok(Expr {
                kind: ExprKind::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                },
                line,
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.atom()?;
        loop {
            if self.check(&TokKind::LParen) {
                let line = self.peek().line;
                self.advance();
                let args = self.expr_list(&TokKind::RParen)?;
                self.expect(&TokKind::RParen, "')' after arguments")?;
                expr = Expr {
                    kind: ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                    line,
                };
            } else if self.check(&TokKind::LBracket) {
                let line = self.peek().line;
                self.advance();
                let index = self.expression()?;
                self.expect(&TokKind::RBracket, "']' after index")?;
                expr = Expr {
                    kind: ExprKind::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                    },
                    line,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn atom(&mut self) -> Result<Expr, SyntaxError> {
        let tok = self.peek().clone();
        let line = tok.line;
        let kind = match tok.kind {
            TokKind::None => {
                self.advance();
                ExprKind::None
            }
            TokKind::True => {
                self.advance();
                ExprKind::Bool(true)
            }
            TokKind::False => {
                self.advance();
                ExprKind::Bool(false)
            }
            TokKind::Int(v) => {
                self.advance();
                ExprKind::Int(v)
            }
            TokKind::Float(v) => {
                self.advance();
                ExprKind::Float(v)
            }
            TokKind::Str(s) => {
                self.advance();
                ExprKind::Str(s)
            }
            TokKind::Bytes(b) => {
                self.advance();
                ExprKind::Bytes(b)
            }
            TokKind::Ident(name) => {
                self.advance();
                ExprKind::Ident(name)
            }
            TokKind::LParen => return self.paren(),
            TokKind::LBracket => {
                self.advance();
                let items = self.expr_list(&TokKind::RBracket)?;
                self.expect(&TokKind::RBracket, "']' after list")?;
                ExprKind::List(items)
            }
            TokKind::LBrace => return self.brace(),
            TokKind::Fn => return self.fn_expr(),
            other => {
                return Err(SyntaxError::new(
                    format!("unexpected token {:?}", other),
                    line,
                ))
            }
        };
        Ok(Expr { kind, line })
    }

    /// `(` - grouping, empty tuple, or tuple with elements.
    fn paren(&mut self) -> Result<Expr, SyntaxError> {
        let line = self.peek().line;
        self.advance();
        if self.matches(&TokKind::RParen) {
            return Ok(Expr {
                kind: ExprKind::Tuple(Vec::new()),
                line,
            });
        }
        let first = self.expression()?;
        if self.matches(&TokKind::Comma) {
            let mut items = vec![first];
            if !self.check(&TokKind::RParen) {
                items.extend(self.expr_list(&TokKind::RParen)?);
            }
            self.expect(&TokKind::RParen, "')' after tuple")?;
            return Ok(Expr {
                kind: ExprKind::Tuple(items),
                line,
            });
        }
        self.expect(&TokKind::RParen, "')' after expression")?;
        Ok(first)
    }

    /// `{` - empty dict, dict entries, or set elements.
    fn brace(&mut self) -> Result<Expr, SyntaxError> {
        let line = self.peek().line;
        self.advance();
        if self.matches(&TokKind::RBrace) {
            return Ok(Expr {
                kind: ExprKind::Dict(Vec::new()),
                line,
            });
        }
        let first = self.expression()?;
        if self.matches(&TokKind::Colon) {
            let value = self.expression()?;
            let mut entries = vec![(first, value)];
            while self.matches(&TokKind::Comma) {
                if self.check(&TokKind::RBrace) {
                    break;
                }
                let k = self.expression()?;
                self.expect(&TokKind::Colon, "':' in dict entry")?;
                let v = self.expression()?;
                entries.push((k, v));
            }
            self.expect(&TokKind::RBrace, "'}' after dict")?;
            return Ok(Expr {
                kind: ExprKind::Dict(entries),
                line,
            });
        }
        let mut items = vec![first];
        while self.matches(&TokKind::Comma) {
            if self.check(&TokKind::RBrace) {
                break;
            }
            items.push(self.expression()?);
        }
        self.expect(&TokKind::RBrace, "'}' after set")?;
        Ok(Expr {
            kind: ExprKind::Set(items),
            line,
        })
    }

    /// `fn (params) body-expr`
    fn fn_expr(&mut self) -> Result<Expr, SyntaxError> {
        let line = self.peek().line;
        self.advance();
        self.expect(&TokKind::LParen, "'(' after fn")?;
        let mut params = Vec::new();
        while !self.check(&TokKind::RParen) {
            match self.peek().kind.clone() {
                TokKind::Ident(name) => {
                    self.advance();
                    params.push(name);
                }
                _ => return Err(SyntaxError::new("expected parameter name", self.peek().line)),
            }
            if !self.matches(&TokKind::Comma) {
                break;
            }
        }
        self.expect(&TokKind::RParen, "')' after parameters")?;
        let body = self.expression()?;
        Ok(Expr {
            kind: ExprKind::Fn {
                params,
                body: Box::new(body),
            },
            line,
        })
    }

    /// Comma-separated expressions up to (not consuming) `close`.
    /// Allows a trailing comma.
    fn expr_list(&mut self, close: &TokKind) -> Result<Vec<Expr>, SyntaxError> {
        let mut items = Vec::new();
        while !self.check(close) {
            items.push(self.expression()?);
            if !self.matches(&TokKind::Comma) {
                break;
            }
        }
        Ok(items)
    }

    fn separator(&mut self) -> Result<(), SyntaxError> {
        match self.peek().kind {
            TokKind::Newline | TokKind::Semi => {
                self.advance();
                Ok(())
            }
            _ => Err(SyntaxError::new(
                format!("expected end of statement, found {:?}", self.peek().kind),
                self.peek().line,
            )),
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek().kind, TokKind::Newline | TokKind::Semi) {
            self.advance();
        }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_ahead(&self, n: usize) -> &Token {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn check(&self, kind: &TokKind) -> bool {
        &self.peek().kind == kind
    }

    fn matches(&mut self, kind: &TokKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokKind, what: &str) -> Result<(), SyntaxError> {
        if self.matches(kind) {
            Ok(())
        } else {
            Err(SyntaxError::new(
                format!("expected {}", what),
                self.peek().line,
            ))
        }
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }
}

fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    let line = lhs.line;
    Expr {
        kind: ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        line,
    }
}
