//! Recursive-descent parser for blockml templates.

use crate::ast::*;
use crate::error::{ParseError, ParseResult};
use crate::lexer::{tokenize, Token, TokenKind};
use smol_str::SmolStr;
use source_map::Span;
use std::sync::Arc;

/// Parse a template unit from source code.
pub fn parse_module(source: &str) -> ParseResult<Module> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(source, tokens);
    parser.parse_module()
}

/// Parse a single expression, e.g. a value supplied on the command line.
pub fn parse_expression(source: &str) -> ParseResult<Expr> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(source, tokens);
    let expr = parser.parse_expr_list()?;
    parser.eat(TokenKind::Newline);
    parser.expect(TokenKind::Eof, "end of expression")?;
    Ok(expr)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
        }
    }

    // Token cursor

    fn peek(&self) -> Token {
        self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn peek_nth_kind(&self, n: usize) -> TokenKind {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        self.tokens[idx].kind
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> ParseResult<Token> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let token = self.peek();
        let found = match token.kind {
            TokenKind::Name | TokenKind::Int | TokenKind::Float => {
                format!("'{}'", self.text(token))
            }
            kind => kind.describe().to_string(),
        };
        ParseError::unexpected_token(expected, &found, token.span)
    }

    fn text(&self, token: Token) -> &'a str {
        token.span.text(self.source).unwrap_or_default()
    }

    /// End offset of the previously consumed token.
    fn prev_end(&self) -> u32 {
        if self.pos == 0 {
            0
        } else {
            self.tokens[self.pos - 1].span.end
        }
    }

    fn span_from(&self, start: u32) -> Span {
        Span::new(start, self.prev_end().max(start))
    }

    fn expect_name(&mut self, expected: &str) -> ParseResult<SmolStr> {
        let token = self.expect(TokenKind::Name, expected)?;
        Ok(SmolStr::new(self.text(token)))
    }

    // Statements

    fn parse_module(&mut self) -> ParseResult<Module> {
        let mut body = Vec::new();
        loop {
            match self.peek_kind() {
                TokenKind::Eof => break,
                TokenKind::Newline => {
                    self.advance();
                }
                TokenKind::Indent => return Err(ParseError::syntax("Unexpected indent", self.peek().span)),
                _ => self.parse_statement(&mut body)?,
            }
        }
        Ok(Module::new(body))
    }

    /// Parse one logical line or compound statement, pushing into `out`.
    fn parse_statement(&mut self, out: &mut Vec<Stmt>) -> ParseResult<()> {
        match self.peek_kind() {
            TokenKind::With => out.push(self.parse_with()?),
            TokenKind::If => out.push(self.parse_if()?),
            TokenKind::For => out.push(self.parse_for()?),
            TokenKind::Def => out.push(self.parse_def()?),
            _ => self.parse_simple_line(out)?,
        }
        Ok(())
    }

    fn parse_simple_line(&mut self, out: &mut Vec<Stmt>) -> ParseResult<()> {
        out.push(self.parse_simple_statement()?);
        while self.eat(TokenKind::Semicolon) {
            if self.at(TokenKind::Newline) {
                break;
            }
            out.push(self.parse_simple_statement()?);
        }
        self.expect(TokenKind::Newline, "end of line")?;
        Ok(())
    }

    /// Parse the `: BODY` part of a compound statement.
    fn parse_block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.expect(TokenKind::Colon, "':'")?;
        let mut body = Vec::new();
        if !self.eat(TokenKind::Newline) {
            self.parse_simple_line(&mut body)?;
            return Ok(body);
        }
        self.expect(TokenKind::Indent, "an indented block")?;
        while !self.eat(TokenKind::Dedent) {
            if self.at(TokenKind::Eof) {
                break;
            }
            if self.eat(TokenKind::Newline) {
                continue;
            }
            self.parse_statement(&mut body)?;
        }
        Ok(body)
    }

    fn parse_with(&mut self) -> ParseResult<Stmt> {
        let start = self.advance().span.start;
        let mut items = Vec::new();
        loop {
            let context = self.parse_expr()?;
            let target = if self.eat(TokenKind::As) {
                let target = self.parse_target()?;
                check_target(&target)?;
                Some(target)
            } else {
                None
            };
            items.push(WithItem { context, target });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        let body = self.parse_block()?;
        Ok(Stmt::new(StmtKind::With { items, body }, self.span_from(start)))
    }

    fn parse_if(&mut self) -> ParseResult<Stmt> {
        let start = self.advance().span.start;
        let test = self.parse_expr()?;
        let body = self.parse_block()?;
        let orelse = if self.at(TokenKind::Elif) {
            vec![self.parse_if()?]
        } else if self.eat(TokenKind::Else) {
            self.parse_block()?
        } else {
            Vec::new()
        };
        Ok(Stmt::new(
            StmtKind::If { test, body, orelse },
            self.span_from(start),
        ))
    }

    fn parse_for(&mut self) -> ParseResult<Stmt> {
        let start = self.advance().span.start;
        let target = self.parse_target_list()?;
        check_target(&target)?;
        self.expect(TokenKind::In, "'in'")?;
        let iter = self.parse_expr_list()?;
        let body = self.parse_block()?;
        let orelse = if self.eat(TokenKind::Else) {
            self.parse_block()?
        } else {
            Vec::new()
        };
        Ok(Stmt::new(
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            },
            self.span_from(start),
        ))
    }

    fn parse_def(&mut self) -> ParseResult<Stmt> {
        let start = self.advance().span.start;
        let name = self.expect_name("function name")?;
        self.expect(TokenKind::LParen, "'('")?;
        let params = self.parse_params(TokenKind::RParen)?;
        self.expect(TokenKind::RParen, "')'")?;
        let body = self.parse_block()?;
        let span = self.span_from(start);
        Ok(Stmt::new(
            StmtKind::FunctionDef(Arc::new(FunctionDef {
                name,
                params,
                body,
                span,
            })),
            span,
        ))
    }

    /// Parameters up to (not including) `end`.
    fn parse_params(&mut self, end: TokenKind) -> ParseResult<Vec<Param>> {
        let mut params: Vec<Param> = Vec::new();
        while !self.at(end) {
            let token = self.peek();
            let name = self.expect_name("parameter name")?;
            if params.iter().any(|p| p.name == name) {
                return Err(ParseError::syntax(
                    format!("Duplicate parameter '{}'", name),
                    token.span,
                ));
            }
            let default = if self.eat(TokenKind::Assign) {
                Some(self.parse_expr()?)
            } else if params.iter().any(|p| p.default.is_some()) {
                return Err(ParseError::syntax(
                    "Parameter without a default follows parameter with a default",
                    token.span,
                ));
            } else {
                None
            };
            params.push(Param { name, default });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        Ok(params)
    }

    fn parse_simple_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.peek().span.start;
        let kind = match self.peek_kind() {
            TokenKind::Pass => {
                self.advance();
                StmtKind::Pass
            }
            TokenKind::Break => {
                self.advance();
                StmtKind::Break
            }
            TokenKind::Continue => {
                self.advance();
                StmtKind::Continue
            }
            TokenKind::Return => {
                self.advance();
                if matches!(
                    self.peek_kind(),
                    TokenKind::Newline | TokenKind::Semicolon | TokenKind::Eof
                ) {
                    StmtKind::Return(None)
                } else {
                    StmtKind::Return(Some(self.parse_expr_list()?))
                }
            }
            TokenKind::Del => {
                self.advance();
                let mut targets = Vec::new();
                loop {
                    let target = self.parse_target()?;
                    check_target(&target)?;
                    targets.push(target);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                StmtKind::Delete(targets)
            }
            TokenKind::Import => {
                self.advance();
                let mut names = Vec::new();
                loop {
                    names.push(self.parse_alias(true)?);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                StmtKind::Import(names)
            }
            TokenKind::From => return self.parse_import_from(),
            _ => return self.parse_expression_statement(),
        };
        Ok(Stmt::new(kind, self.span_from(start)))
    }

    fn parse_dotted_name(&mut self) -> ParseResult<SmolStr> {
        let mut name = String::from(self.expect_name("module name")?.as_str());
        while self.eat(TokenKind::Dot) {
            name.push('.');
            name.push_str(&self.expect_name("name after '.'")?);
        }
        Ok(SmolStr::from(name))
    }

    fn parse_alias(&mut self, dotted: bool) -> ParseResult<Alias> {
        let start = self.peek().span.start;
        let name = if dotted {
            self.parse_dotted_name()?
        } else {
            self.expect_name("imported name")?
        };
        let asname = if self.eat(TokenKind::As) {
            Some(self.expect_name("name after 'as'")?)
        } else {
            None
        };
        Ok(Alias {
            name,
            asname,
            span: self.span_from(start),
        })
    }

    fn parse_import_from(&mut self) -> ParseResult<Stmt> {
        let start = self.advance().span.start;
        let module = self.parse_dotted_name()?;
        self.expect(TokenKind::Import, "'import'")?;
        let mut names = Vec::new();
        if self.at(TokenKind::Star) {
            let star = self.advance();
            names.push(Alias {
                name: SmolStr::new_static("*"),
                asname: None,
                span: star.span,
            });
        } else {
            let parenthesized = self.eat(TokenKind::LParen);
            loop {
                names.push(self.parse_alias(false)?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
                if parenthesized && self.at(TokenKind::RParen) {
                    break;
                }
            }
            if parenthesized {
                self.expect(TokenKind::RParen, "')'")?;
            }
        }
        Ok(Stmt::new(
            StmtKind::ImportFrom { module, names },
            self.span_from(start),
        ))
    }

    fn parse_expression_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.peek().span.start;
        let first = self.parse_expr_list()?;
        match self.peek_kind() {
            TokenKind::Assign => {
                let mut targets = vec![first];
                let mut value;
                loop {
                    self.advance();
                    value = self.parse_expr_list()?;
                    if self.at(TokenKind::Assign) {
                        targets.push(value);
                    } else {
                        break;
                    }
                }
                for target in &targets {
                    check_target(target)?;
                }
                Ok(Stmt::new(
                    StmtKind::Assign { targets, value },
                    self.span_from(start),
                ))
            }
            TokenKind::PlusAssign | TokenKind::MinusAssign => {
                let op = if self.advance().kind == TokenKind::PlusAssign {
                    BinOp::Add
                } else {
                    BinOp::Sub
                };
                if !matches!(
                    first.kind,
                    ExprKind::Name(_) | ExprKind::Attribute { .. } | ExprKind::Subscript { .. }
                ) {
                    return Err(ParseError::invalid_target(
                        "this expression with an augmented assignment",
                        first.span,
                    ));
                }
                let value = self.parse_expr_list()?;
                Ok(Stmt::new(
                    StmtKind::AugAssign {
                        target: first,
                        op,
                        value,
                    },
                    self.span_from(start),
                ))
            }
            _ => Ok(Stmt::expr(first)),
        }
    }

    // Expressions

    /// `expr (, expr)* [,]`; more than one element (or a trailing comma) makes a tuple.
    fn parse_expr_list(&mut self) -> ParseResult<Expr> {
        let start = self.peek().span.start;
        let first = self.parse_expr()?;
        if !self.at(TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(TokenKind::Comma) {
            if !self.starts_expression() {
                break;
            }
            items.push(self.parse_expr()?);
        }
        Ok(Expr::new(ExprKind::Tuple(items), self.span_from(start)))
    }

    /// Targets of `for` loops and comprehensions, which must stop before `in`.
    fn parse_target_list(&mut self) -> ParseResult<Expr> {
        let start = self.peek().span.start;
        let first = self.parse_target()?;
        if !self.at(TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(TokenKind::Comma) {
            if self.at(TokenKind::In) {
                break;
            }
            items.push(self.parse_target()?);
        }
        Ok(Expr::new(ExprKind::Tuple(items), self.span_from(start)))
    }

    fn parse_target(&mut self) -> ParseResult<Expr> {
        self.parse_postfix()
    }

    fn starts_expression(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Name
                | TokenKind::Int
                | TokenKind::Float
                | TokenKind::Str
                | TokenKind::Markup
                | TokenKind::None
                | TokenKind::True
                | TokenKind::False
                | TokenKind::LParen
                | TokenKind::LBracket
                | TokenKind::LBrace
                | TokenKind::Minus
                | TokenKind::Plus
                | TokenKind::Not
                | TokenKind::Lambda
        )
    }

    fn parse_expr(&mut self) -> ParseResult<Expr> {
        if self.at(TokenKind::Lambda) {
            return self.parse_lambda();
        }
        let start = self.peek().span.start;
        let body = self.parse_or()?;
        if !self.eat(TokenKind::If) {
            return Ok(body);
        }
        let test = self.parse_or()?;
        self.expect(TokenKind::Else, "'else' in conditional expression")?;
        let orelse = self.parse_expr()?;
        Ok(Expr::new(
            ExprKind::IfExp {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            },
            self.span_from(start),
        ))
    }

    fn parse_lambda(&mut self) -> ParseResult<Expr> {
        let start = self.advance().span.start;
        let params = self.parse_params(TokenKind::Colon)?;
        self.expect(TokenKind::Colon, "':' after lambda parameters")?;
        let body = self.parse_expr()?;
        Ok(Expr::new(
            ExprKind::Lambda(Arc::new(Lambda { params, body })),
            self.span_from(start),
        ))
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let start = self.peek().span.start;
        let first = self.parse_and()?;
        if !self.at(TokenKind::Or) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat(TokenKind::Or) {
            values.push(self.parse_and()?);
        }
        Ok(Expr::new(
            ExprKind::BoolOp {
                op: BoolOp::Or,
                values,
            },
            self.span_from(start),
        ))
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let start = self.peek().span.start;
        let first = self.parse_not()?;
        if !self.at(TokenKind::And) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat(TokenKind::And) {
            values.push(self.parse_not()?);
        }
        Ok(Expr::new(
            ExprKind::BoolOp {
                op: BoolOp::And,
                values,
            },
            self.span_from(start),
        ))
    }

    fn parse_not(&mut self) -> ParseResult<Expr> {
        if self.at(TokenKind::Not) {
            let start = self.advance().span.start;
            let operand = self.parse_not()?;
            return Ok(Expr::new(
                ExprKind::UnaryOp {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                self.span_from(start),
            ));
        }
        self.parse_comparison()
    }

    fn comparison_op(&mut self) -> Option<CmpOp> {
        let op = match self.peek_kind() {
            TokenKind::EqEq => CmpOp::Eq,
            TokenKind::NotEq => CmpOp::NotEq,
            TokenKind::Lt => CmpOp::Lt,
            TokenKind::LtEq => CmpOp::LtEq,
            TokenKind::Gt => CmpOp::Gt,
            TokenKind::GtEq => CmpOp::GtEq,
            TokenKind::In => CmpOp::In,
            TokenKind::Not if self.peek_nth_kind(1) == TokenKind::In => {
                self.advance();
                CmpOp::NotIn
            }
            TokenKind::Is => {
                if self.peek_nth_kind(1) == TokenKind::Not {
                    self.advance();
                    CmpOp::IsNot
                } else {
                    CmpOp::Is
                }
            }
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let start = self.peek().span.start;
        let left = self.parse_arith()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        while let Some(op) = self.comparison_op() {
            ops.push(op);
            comparators.push(self.parse_arith()?);
        }
        if ops.is_empty() {
            return Ok(left);
        }
        Ok(Expr::new(
            ExprKind::Compare {
                left: Box::new(left),
                ops,
                comparators,
            },
            self.span_from(start),
        ))
    }

    fn parse_arith(&mut self) -> ParseResult<Expr> {
        let start = self.peek().span.start;
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_term()?;
            left = Expr::new(
                ExprKind::BinOp {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
                self.span_from(start),
            );
        }
    }

    fn parse_term(&mut self) -> ParseResult<Expr> {
        let start = self.peek().span.start;
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::DoubleSlash => BinOp::FloorDiv,
                TokenKind::Percent => BinOp::Mod,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_factor()?;
            left = Expr::new(
                ExprKind::BinOp {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
                self.span_from(start),
            );
        }
    }

    fn parse_factor(&mut self) -> ParseResult<Expr> {
        let op = match self.peek_kind() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Pos,
            _ => return self.parse_postfix(),
        };
        let start = self.advance().span.start;
        let operand = self.parse_factor()?;
        Ok(Expr::new(
            ExprKind::UnaryOp {
                op,
                operand: Box::new(operand),
            },
            self.span_from(start),
        ))
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let start = self.peek().span.start;
        let mut expr = self.parse_atom()?;
        loop {
            match self.peek_kind() {
                TokenKind::LParen => {
                    self.advance();
                    let (args, keywords) = self.parse_call_args()?;
                    self.expect(TokenKind::RParen, "')' to close call")?;
                    expr = Expr::new(
                        ExprKind::Call {
                            func: Box::new(expr),
                            args,
                            keywords,
                        },
                        self.span_from(start),
                    );
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expr_list()?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    expr = Expr::new(
                        ExprKind::Subscript {
                            value: Box::new(expr),
                            index: Box::new(index),
                        },
                        self.span_from(start),
                    );
                }
                TokenKind::Dot => {
                    self.advance();
                    let attr = self.expect_name("attribute name")?;
                    expr = Expr::attribute(expr, attr, self.span_from(start));
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_call_args(&mut self) -> ParseResult<(Vec<Expr>, Vec<Keyword>)> {
        let mut args = Vec::new();
        let mut keywords: Vec<Keyword> = Vec::new();
        while !self.at(TokenKind::RParen) {
            if self.at(TokenKind::Name) && self.peek_nth_kind(1) == TokenKind::Assign {
                let token = self.peek();
                let name = self.expect_name("keyword")?;
                self.advance();
                if keywords.iter().any(|k| k.name == name) {
                    return Err(ParseError::syntax(
                        format!("Keyword argument repeated: {}", name),
                        token.span,
                    ));
                }
                let value = self.parse_expr()?;
                keywords.push(Keyword { name, value });
            } else {
                if !keywords.is_empty() {
                    return Err(ParseError::syntax(
                        "Positional argument follows keyword argument",
                        self.peek().span,
                    ));
                }
                let start = self.peek().span.start;
                let value = self.parse_expr()?;
                if self.at(TokenKind::For) {
                    let comp = self.parse_comprehension(value)?;
                    args.push(Expr::new(
                        ExprKind::Generator(Arc::new(comp)),
                        self.span_from(start),
                    ));
                } else {
                    args.push(value);
                }
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        Ok((args, keywords))
    }

    fn parse_comprehension(&mut self, element: Expr) -> ParseResult<Comprehension> {
        let mut clauses = Vec::new();
        while self.eat(TokenKind::For) {
            let target = self.parse_target_list()?;
            check_target(&target)?;
            self.expect(TokenKind::In, "'in'")?;
            let iter = self.parse_or()?;
            let mut conditions = Vec::new();
            while self.eat(TokenKind::If) {
                conditions.push(self.parse_or()?);
            }
            clauses.push(ComprehensionClause {
                target,
                iter,
                conditions,
            });
        }
        Ok(Comprehension { element, clauses })
    }

    fn parse_atom(&mut self) -> ParseResult<Expr> {
        let token = self.peek();
        let start = token.span.start;
        match token.kind {
            TokenKind::Name => {
                self.advance();
                Ok(Expr::name(self.text(token), token.span))
            }
            TokenKind::None => {
                self.advance();
                Ok(Expr::constant(Constant::None, token.span))
            }
            TokenKind::True | TokenKind::False => {
                self.advance();
                Ok(Expr::constant(
                    Constant::Bool(token.kind == TokenKind::True),
                    token.span,
                ))
            }
            TokenKind::Int => {
                self.advance();
                let value = self.text(token).parse::<i64>().map_err(|_| {
                    ParseError::syntax("Integer literal is too large", token.span)
                })?;
                Ok(Expr::constant(Constant::Int(value), token.span))
            }
            TokenKind::Float => {
                self.advance();
                let value = self
                    .text(token)
                    .parse::<f64>()
                    .map_err(|_| ParseError::syntax("Invalid float literal", token.span))?;
                Ok(Expr::constant(Constant::Float(value), token.span))
            }
            TokenKind::Str => {
                // Adjacent literals concatenate.
                let mut value = String::new();
                while self.at(TokenKind::Str) {
                    let token = self.advance();
                    value.push_str(&unescape(self.text(token), token.span)?);
                }
                Ok(Expr::string(value, self.span_from(start)))
            }
            TokenKind::Markup => {
                self.advance();
                let value = unescape(&self.text(token)[1..], token.span)?;
                Ok(Expr::constant(Constant::Markup(value.into()), token.span))
            }
            TokenKind::LParen => self.parse_paren(),
            TokenKind::LBracket => self.parse_list(),
            TokenKind::LBrace => self.parse_dict(),
            _ => Err(self.unexpected("an expression")),
        }
    }

    fn parse_paren(&mut self) -> ParseResult<Expr> {
        let start = self.advance().span.start;
        if self.eat(TokenKind::RParen) {
            return Ok(Expr::new(ExprKind::Tuple(Vec::new()), self.span_from(start)));
        }
        let first = self.parse_expr()?;
        if self.at(TokenKind::For) {
            let comp = self.parse_comprehension(first)?;
            self.expect(TokenKind::RParen, "')' to close generator")?;
            return Ok(Expr::new(
                ExprKind::Generator(Arc::new(comp)),
                self.span_from(start),
            ));
        }
        if self.eat(TokenKind::RParen) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(TokenKind::Comma) {
            if self.at(TokenKind::RParen) {
                break;
            }
            items.push(self.parse_expr()?);
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(Expr::new(ExprKind::Tuple(items), self.span_from(start)))
    }

    fn parse_list(&mut self) -> ParseResult<Expr> {
        let start = self.advance().span.start;
        let mut items = Vec::new();
        if !self.at(TokenKind::RBracket) {
            let first = self.parse_expr()?;
            if self.at(TokenKind::For) {
                let comp = self.parse_comprehension(first)?;
                self.expect(TokenKind::RBracket, "']' to close list comprehension")?;
                return Ok(Expr::new(
                    ExprKind::ListComp(Arc::new(comp)),
                    self.span_from(start),
                ));
            }
            items.push(first);
            while self.eat(TokenKind::Comma) {
                if self.at(TokenKind::RBracket) {
                    break;
                }
                items.push(self.parse_expr()?);
            }
        }
        self.expect(TokenKind::RBracket, "']'")?;
        Ok(Expr::new(ExprKind::List(items), self.span_from(start)))
    }

    fn parse_dict(&mut self) -> ParseResult<Expr> {
        let start = self.advance().span.start;
        let mut entries = Vec::new();
        while !self.at(TokenKind::RBrace) {
            let key = self.parse_expr()?;
            self.expect(TokenKind::Colon, "':' in dict")?;
            let value = self.parse_expr()?;
            entries.push((key, value));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(Expr::new(ExprKind::Dict(entries), self.span_from(start)))
    }
}

/// Reject targets that cannot be bound.
fn check_target(target: &Expr) -> ParseResult<()> {
    match &target.kind {
        ExprKind::Name(_) | ExprKind::Attribute { .. } | ExprKind::Subscript { .. } => Ok(()),
        ExprKind::Tuple(items) | ExprKind::List(items) => items.iter().try_for_each(check_target),
        ExprKind::Call { .. } => Err(ParseError::invalid_target("a function call", target.span)),
        ExprKind::Constant(_) => Err(ParseError::invalid_target("a literal", target.span)),
        _ => Err(ParseError::invalid_target("an expression", target.span)),
    }
}

/// Decode a quoted literal (quotes included) into its value.
fn unescape(quoted: &str, span: Span) -> ParseResult<String> {
    let inner = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let decoded = u32::from_str_radix(&hex, 16)
                    .ok()
                    .filter(|_| hex.len() == 4)
                    .and_then(char::from_u32)
                    .ok_or_else(|| ParseError::syntax("Invalid \\u escape", span))?;
                out.push(decoded);
            }
            // Unknown escapes are kept verbatim.
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    Ok(out)
}
