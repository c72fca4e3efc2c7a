//! Recursive-descent parser for pipeline scripts.
//!
//! Binary operators are parsed by precedence climbing, so the tree handed to
//! the evaluator already reflects `||` < `&&` < comparisons < `..` < `+ -`
//! < `* / %`.
//!
//! Identifiers are resolved while parsing. Every pipeline, stage and closure
//! opens a lexical scope; names declared with `:=` (or in `vars`) go into the
//! innermost one, and any other identifier must be declared earlier in the
//! chain or be bound in the runtime scope the script is parsed against
//! (built-in steps, `params`, `env`, host globals).

use std::sync::Arc;

use crate::{
    ast::{
        Argument, AssignOp, Assignment, BinOp, Block, ClosureExpr, DeclStmt, Expr, ExprKind,
        File, LexicalScope, Literal, PathExpr, Pipeline, Segment, Stage, Stmt, Token, UnaryOp,
        VarsBlock, tokens::LOWEST_PREC,
    },
    error::{ErrorList, Position},
    lexer::Lexer,
    scope::{Scope, ScopeError},
    value::Value,
};

/// Parses a whole script against `scope`.
pub fn parse_file(src: &str, scope: &Scope) -> Result<File, ErrorList> {
    let mut parser = Parser::new(src, scope);
    let file = parser.parse_file();
    parser.finish().map(|()| file)
}

/// Parses a standalone expression, as used by `${...}` interpolation.
pub fn parse_expression(src: &str, scope: &Scope) -> Result<Expr, ErrorList> {
    let mut parser = Parser::new(src, scope);
    let expr = parser.parse_expr();
    if parser.tok != Token::Eof {
        let found = parser.describe();
        parser.error(parser.pos, format!("unexpected {} after expression", found));
    }
    parser.finish().map(|()| expr)
}

type Lookahead = (Position, Token, String);

pub struct Parser<'s> {
    lexer: Lexer,
    outer: &'s Scope,
    scopes: Vec<LexicalScope>,
    errors: ErrorList,

    pos: Position,
    tok: Token,
    lit: String,
    next: Option<Lookahead>,
}

impl<'s> Parser<'s> {
    pub fn new(src: &str, outer: &'s Scope) -> Self {
        let mut lexer = Lexer::new(src);
        let (pos, tok, lit) = lexer.scan();
        Parser {
            lexer,
            outer,
            scopes: Vec::new(),
            errors: ErrorList::new(),
            pos,
            tok,
            lit,
            next: None,
        }
    }

    /// Scanner and parser errors, ordered by position.
    pub fn finish(mut self) -> Result<(), ErrorList> {
        let mut errors = self.lexer.take_errors();
        errors.extend(std::mem::take(&mut self.errors));
        errors.sort();
        errors.err()
    }

    // ------------------------------------------------------------------
    // Token plumbing

    fn advance(&mut self) {
        let (pos, tok, lit) = match self.next.take() {
            Some(next) => next,
            None => self.lexer.scan(),
        };
        self.pos = pos;
        self.tok = tok;
        self.lit = lit;
    }

    /// The token after the current one.
    fn peek(&mut self) -> Token {
        if self.next.is_none() {
            self.next = Some(self.lexer.scan());
        }
        self.next.as_ref().map_or(Token::Eof, |(_, tok, _)| *tok)
    }

    fn error(&mut self, pos: Position, message: impl std::fmt::Display) {
        self.errors.add(pos, message);
    }

    fn describe(&self) -> String {
        match self.tok {
            Token::Semicolon if self.lit == "\n" => "newline".to_string(),
            Token::Eof => "EOF".to_string(),
            tok if tok.is_literal() => format!("{} {}", tok, self.lit),
            tok => format!("'{}'", tok),
        }
    }

    fn expect(&mut self, expected: Token) -> Position {
        let pos = self.pos;
        if self.tok == expected {
            self.advance();
        } else {
            let found = self.describe();
            self.error(pos, format!("expected '{}', found {}", expected, found));
        }
        pos
    }

    /// Newlines scanned as terminators inside bracketed lists.
    fn skip_newlines(&mut self) {
        while self.tok == Token::Semicolon && self.lit == "\n" {
            self.advance();
        }
    }

    fn skip_semicolons(&mut self) {
        while self.tok == Token::Semicolon {
            self.advance();
        }
    }

    /// Consumes `{`, switching newline terminators on first when the block
    /// holds statements.
    fn open_block(&mut self, line_mode: bool) {
        if self.tok == Token::LBrace {
            if line_mode {
                self.lexer.set_line_terminators(true);
            }
            self.advance();
        } else {
            self.expect(Token::LBrace);
        }
    }

    fn close_block(&mut self, line_mode: bool) {
        if line_mode {
            self.lexer.set_line_terminators(false);
        }
        self.expect(Token::RBrace);
    }

    /// Skips to the end of the current statement: past a `;`, or up to a
    /// closing brace or keyword at the same nesting depth.
    fn recover(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.tok {
                Token::Eof => return,
                Token::Semicolon if depth == 0 => {
                    self.advance();
                    return;
                }
                Token::RBrace if depth == 0 => return,
                Token::RBrace => depth -= 1,
                Token::LBrace => depth += 1,
                tok if tok.is_sync_point() && depth == 0 => return,
                _ => {}
            }
            self.advance();
        }
    }

    // ------------------------------------------------------------------
    // Scopes

    fn open_scope(&mut self) {
        self.scopes.push(LexicalScope::default());
    }

    fn close_scope(&mut self) -> LexicalScope {
        self.scopes.pop().unwrap_or_default()
    }

    fn declare(&mut self, name: &str, pos: Position) {
        let taken = match self.scopes.last() {
            Some(scope) => scope.declares(name),
            None => self.outer.contains_local(name),
        };
        if taken {
            self.error(pos, ScopeError::AlreadyDeclared(name.to_string()));
        } else if let Some(scope) = self.scopes.last_mut() {
            scope.names.push(name.to_string());
        }
    }

    fn resolve(&mut self, name: &str, pos: Position) {
        let declared = self.scopes.iter().rev().any(|s| s.declares(name));
        if !declared && !self.outer.contains(name) {
            self.error(pos, ScopeError::Undefined(name.to_string()));
        }
    }

    // ------------------------------------------------------------------
    // Declarations

    pub fn parse_file(&mut self) -> File {
        self.open_scope();
        let mut pipelines = Vec::new();
        loop {
            self.skip_semicolons();
            match self.tok {
                Token::Eof => break,
                Token::Pipeline => pipelines.push(self.parse_pipeline()),
                _ => {
                    let found = self.describe();
                    self.error(self.pos, format!("expected 'pipeline', found {}", found));
                    self.advance();
                    while !matches!(self.tok, Token::Pipeline | Token::Eof) {
                        self.advance();
                    }
                }
            }
        }
        File {
            pipelines,
            scope: self.close_scope(),
        }
    }

    /// `"name"`, `'name'` or nothing, between parentheses.
    fn parse_block_name(&mut self) -> String {
        self.expect(Token::LParen);
        let name = match self.tok {
            Token::String | Token::RawString => {
                let name = unescape(&self.lit);
                self.advance();
                name
            }
            _ => String::new(),
        };
        self.expect(Token::RParen);
        name
    }

    fn parse_pipeline(&mut self) -> Pipeline {
        let pos = self.expect(Token::Pipeline);
        let name = self.parse_block_name();
        self.open_block(false);
        self.open_scope();

        let mut vars: Option<VarsBlock> = None;
        let mut stages = Vec::new();
        loop {
            self.skip_semicolons();
            match self.tok {
                Token::RBrace | Token::Eof => break,
                Token::Vars => {
                    let block = self.parse_vars();
                    if vars.is_some() {
                        self.error(pos, "pipeline has more than one vars block");
                    }
                    vars.get_or_insert_with(VarsBlock::default).specs.extend(block.specs);
                }
                Token::Stages => stages.extend(self.parse_stages()),
                tok => {
                    let found = self.describe();
                    self.error(self.pos, format!("expected 'vars' or 'stages', found {}", found));
                    if tok.is_sync_point() {
                        break;
                    }
                    self.recover();
                }
            }
        }

        let scope = self.close_scope();
        self.close_block(false);
        Pipeline {
            name,
            vars,
            stages,
            scope,
            pos,
        }
    }

    fn parse_vars(&mut self) -> VarsBlock {
        self.expect(Token::Vars);
        self.open_block(true);

        let mut specs = Vec::new();
        loop {
            self.skip_semicolons();
            if matches!(self.tok, Token::RBrace | Token::Eof) {
                break;
            }
            if self.tok != Token::Ident {
                let found = self.describe();
                self.error(self.pos, format!("expected variable name, found {}", found));
                if self.tok.is_sync_point() {
                    break;
                }
                self.recover();
                continue;
            }

            let pos = self.pos;
            let name = std::mem::take(&mut self.lit);
            self.advance();
            let value = match self.tok {
                Token::Assign | Token::Define => {
                    self.advance();
                    self.skip_newlines();
                    Some(self.parse_expr())
                }
                _ => None,
            };
            self.declare(&name, pos);
            specs.push(Stmt::Decl(DeclStmt { name, value, pos }));
            self.end_statement();
        }

        self.close_block(true);
        VarsBlock { specs }
    }

    fn parse_stages(&mut self) -> Vec<Stage> {
        self.expect(Token::Stages);
        self.open_block(false);

        let mut stages = Vec::new();
        loop {
            self.skip_semicolons();
            match self.tok {
                Token::RBrace | Token::Eof => break,
                Token::Stage => stages.push(self.parse_stage()),
                tok => {
                    let found = self.describe();
                    self.error(self.pos, format!("expected 'stage', found {}", found));
                    if tok.is_sync_point() {
                        break;
                    }
                    self.recover();
                }
            }
        }

        self.close_block(false);
        stages
    }

    fn parse_stage(&mut self) -> Stage {
        let pos = self.expect(Token::Stage);
        let name = self.parse_block_name();
        self.open_block(false);
        self.open_scope();

        let mut when: Option<Expr> = None;
        let mut steps = Block::default();
        loop {
            self.skip_semicolons();
            match self.tok {
                Token::RBrace | Token::Eof => break,
                Token::When => {
                    let when_pos = self.pos;
                    let expr = self.parse_when();
                    if when.is_some() {
                        self.error(when_pos, format!("stage {:?} has more than one when block", name));
                    } else {
                        when = Some(expr);
                    }
                }
                Token::Steps => {
                    let block = self.parse_steps();
                    steps.stmts.extend(block.stmts);
                }
                tok => {
                    let found = self.describe();
                    self.error(self.pos, format!("expected 'when' or 'steps', found {}", found));
                    if tok.is_sync_point() {
                        break;
                    }
                    self.recover();
                }
            }
        }

        let scope = self.close_scope();
        self.close_block(false);
        Stage {
            name,
            when,
            steps,
            scope,
            pos,
        }
    }

    fn parse_when(&mut self) -> Expr {
        self.expect(Token::When);
        self.open_block(true);
        self.skip_semicolons();
        let expr = self.parse_expr();
        self.skip_semicolons();
        self.close_block(true);
        expr
    }

    fn parse_steps(&mut self) -> Block {
        self.expect(Token::Steps);
        self.open_block(true);
        let block = self.parse_stmt_list();
        self.close_block(true);
        block
    }

    // ------------------------------------------------------------------
    // Statements

    /// Statements up to (not including) the closing `}`.
    fn parse_stmt_list(&mut self) -> Block {
        let mut stmts = Vec::new();
        loop {
            self.skip_semicolons();
            if matches!(self.tok, Token::RBrace | Token::Eof) {
                break;
            }
            if self.tok.is_sync_point() {
                let found = self.describe();
                self.error(self.pos, format!("expected '}}', found {}", found));
                break;
            }
            stmts.push(self.parse_stmt());
            self.end_statement();
        }
        Block { stmts }
    }

    fn end_statement(&mut self) {
        match self.tok {
            Token::Semicolon => self.advance(),
            Token::RBrace | Token::Eof => {}
            _ => {
                let found = self.describe();
                self.error(self.pos, format!("expected ';' or newline, found {}", found));
                self.recover();
            }
        }
    }

    fn parse_stmt(&mut self) -> Stmt {
        let pos = self.pos;

        if self.tok == Token::Ident && self.peek() == Token::Define {
            let name = std::mem::take(&mut self.lit);
            self.advance();
            self.advance();
            self.skip_newlines();
            let rhs = self.parse_expr();
            self.declare(&name, pos);
            return Stmt::Assign(Assignment {
                lhs: Expr::new(ExprKind::Ident(name), pos),
                op: AssignOp::Define,
                rhs,
                pos,
            });
        }

        let lhs = self.parse_expr();
        match self.tok {
            Token::Define => {
                self.error(self.pos, "non-name on left side of :=");
                self.advance();
                let rhs = self.parse_expr();
                Stmt::Assign(Assignment {
                    lhs,
                    op: AssignOp::Define,
                    rhs,
                    pos,
                })
            }
            tok @ (Token::Inc | Token::Dec) => {
                self.check_assignable(&lhs);
                let one = Expr::new(ExprKind::Literal(Literal::Number(1.0)), self.pos);
                self.advance();
                let op = if tok == Token::Inc {
                    BinOp::Add
                } else {
                    BinOp::Subtract
                };
                Stmt::Assign(Assignment {
                    lhs,
                    op: AssignOp::Compound(op),
                    rhs: one,
                    pos,
                })
            }
            tok => match AssignOp::from_token(tok) {
                Some(op) => {
                    self.check_assignable(&lhs);
                    self.advance();
                    self.skip_newlines();
                    let rhs = self.parse_expr();
                    Stmt::Assign(Assignment { lhs, op, rhs, pos })
                }
                None => Stmt::Expr(lhs),
            },
        }
    }

    fn check_assignable(&mut self, lhs: &Expr) {
        if !lhs.is_assignable() {
            self.error(lhs.pos, "cannot assign to this expression");
        }
    }

    // ------------------------------------------------------------------
    // Expressions

    pub fn parse_expr(&mut self) -> Expr {
        self.parse_binary(Token::LOr.precedence(), Token::Eql.precedence(), Self::parse_range)
    }

    /// Precedence climbing over the binary operators whose precedence lies
    /// in `min..=max`; `operand` parses what binds tighter.
    fn parse_binary(&mut self, min: u8, max: u8, operand: fn(&mut Self) -> Expr) -> Expr {
        let mut left = operand(self);
        loop {
            let prec = self.tok.precedence();
            if prec == LOWEST_PREC || prec < min || prec > max {
                return left;
            }
            let Some(op) = BinOp::from_token(self.tok) else {
                return left;
            };
            self.advance();
            self.skip_newlines();
            let right = self.parse_binary(prec + 1, max, operand);
            let pos = left.pos;
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                pos,
            );
        }
    }

    fn parse_range(&mut self) -> Expr {
        let start = self.parse_arithmetic();
        if self.tok != Token::Range {
            return start;
        }
        self.advance();
        let end = self.parse_arithmetic();
        let pos = start.pos;
        Expr::new(
            ExprKind::Range {
                start: Box::new(start),
                end: Box::new(end),
            },
            pos,
        )
    }

    fn parse_arithmetic(&mut self) -> Expr {
        self.parse_binary(Token::Add.precedence(), Token::Mul.precedence(), Self::parse_unary)
    }

    fn parse_unary(&mut self) -> Expr {
        let pos = self.pos;
        let op = match self.tok {
            Token::Not => UnaryOp::Not,
            Token::Sub => UnaryOp::Negate,
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = self.parse_unary();
        Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            pos,
        )
    }

    /// Whether the current token can open an argument of a call written
    /// without parentheses (`echo x`, `xs.findAll {x => x > 1}`).
    fn starts_bare_argument(&self) -> bool {
        matches!(
            self.tok,
            Token::Ident | Token::Number | Token::String | Token::RawString | Token::LBrace
        )
    }

    /// `[`, `!` and `-` open an argument only after a name bound to a step
    /// outside the script (`echo [1, 2]`, `echo -1`), so indexing and
    /// subtraction on variables are unaffected.
    fn starts_step_argument(&self, callee: &Expr) -> bool {
        let ExprKind::Ident(name) = &callee.kind else {
            return false;
        };
        matches!(self.tok, Token::LBracket | Token::Not | Token::Sub)
            && !self.scopes.iter().any(|s| s.declares(name))
            && matches!(self.outer.lookup(name), Some(Value::Step(_)))
    }

    fn parse_postfix(&mut self) -> Expr {
        let mut expr = self.parse_primary();

        if matches!(expr.kind, ExprKind::Ident(_))
            && (self.starts_bare_argument() || self.starts_step_argument(&expr))
        {
            let args = self.parse_bare_arguments();
            let pos = expr.pos;
            expr = Expr::new(
                ExprKind::Call {
                    func: Box::new(expr),
                    args,
                },
                pos,
            );
        }

        loop {
            let pos = expr.pos;
            match self.tok {
                Token::Period => {
                    self.advance();
                    let segment = match self.tok {
                        Token::Ident | Token::String | Token::RawString => {
                            Segment::Name(unescape(&self.lit))
                        }
                        tok if tok.is_keyword() => Segment::Name(self.lit.clone()),
                        Token::Mul => Segment::Wildcard,
                        Token::DoubleStar => Segment::DeepWildcard,
                        _ => {
                            let found = self.describe();
                            self.error(self.pos, format!("expected member name, found {}", found));
                            return expr;
                        }
                    };
                    self.advance();

                    let args = match (&segment, self.tok) {
                        (Segment::Name(_), Token::LParen) => Some(self.parse_call_arguments()),
                        (Segment::Name(_), _) if self.starts_bare_argument() => {
                            Some(self.parse_bare_arguments())
                        }
                        _ => None,
                    };
                    expr = Expr::new(
                        ExprKind::Path(PathExpr {
                            object: Box::new(expr),
                            segment,
                            args,
                        }),
                        pos,
                    );
                }
                Token::LBracket => {
                    self.advance();
                    self.skip_newlines();
                    let index = self.parse_expr();
                    self.skip_newlines();
                    self.expect(Token::RBracket);
                    expr = Expr::new(
                        ExprKind::Index {
                            object: Box::new(expr),
                            index: Box::new(index),
                        },
                        pos,
                    );
                }
                Token::LParen => {
                    let args = self.parse_call_arguments();
                    expr = Expr::new(
                        ExprKind::Call {
                            func: Box::new(expr),
                            args,
                        },
                        pos,
                    );
                }
                _ => return expr,
            }
        }
    }

    fn parse_primary(&mut self) -> Expr {
        let pos = self.pos;
        match self.tok {
            Token::Ident => {
                let name = std::mem::take(&mut self.lit);
                self.resolve(&name, pos);
                self.advance();
                Expr::new(ExprKind::Ident(name), pos)
            }
            Token::Number => {
                let n = match self.lit.parse::<f64>() {
                    Ok(n) => n,
                    Err(_) => {
                        let lit = self.lit.clone();
                        self.error(pos, format!("invalid number literal {}", lit));
                        0.0
                    }
                };
                self.advance();
                Expr::new(ExprKind::Literal(Literal::Number(n)), pos)
            }
            Token::String => {
                let body = std::mem::take(&mut self.lit);
                self.advance();
                Expr::new(ExprKind::Literal(Literal::String(body)), pos)
            }
            Token::RawString => {
                let text = unescape(&self.lit);
                self.advance();
                Expr::new(ExprKind::Literal(Literal::RawString(text)), pos)
            }
            Token::LParen => {
                self.advance();
                self.skip_newlines();
                let inner = self.parse_expr();
                self.skip_newlines();
                self.expect(Token::RParen);
                Expr::new(ExprKind::Paren(Box::new(inner)), pos)
            }
            Token::LBracket => self.parse_sequence(),
            Token::LBrace => self.parse_closure(),
            tok => {
                let found = self.describe();
                self.error(pos, format!("expected expression, found {}", found));
                if !(matches!(tok, Token::Semicolon | Token::RBrace) || tok.is_sync_point()) {
                    self.advance();
                }
                Expr::new(ExprKind::Literal(Literal::Number(0.0)), pos)
            }
        }
    }

    /// `[a, b]`, `[k: v, ...]`, `[]` or `[:]`.
    fn parse_sequence(&mut self) -> Expr {
        let pos = self.expect(Token::LBracket);
        self.skip_newlines();

        if self.tok == Token::Colon {
            self.advance();
            self.skip_newlines();
            self.expect(Token::RBracket);
            return Expr::new(
                ExprKind::Sequence {
                    values: Vec::new(),
                    is_map: true,
                },
                pos,
            );
        }

        let mut values = Vec::new();
        let mut is_map = None;
        while !matches!(self.tok, Token::RBracket | Token::Eof) {
            let entry_pos = self.pos;
            let is_entry = matches!(self.tok, Token::Ident | Token::String | Token::RawString)
                && self.peek() == Token::Colon;

            let value = if is_entry {
                let key = unescape(&self.lit);
                self.advance();
                self.advance();
                self.skip_newlines();
                let value = self.parse_expr();
                Expr::new(
                    ExprKind::KeyValue {
                        key,
                        value: Box::new(value),
                    },
                    entry_pos,
                )
            } else {
                self.parse_expr()
            };

            match is_map {
                None => is_map = Some(is_entry),
                Some(map) if map != is_entry => {
                    self.error(entry_pos, "mixed list and map entries in literal");
                }
                Some(_) => {}
            }
            values.push(value);

            self.skip_newlines();
            if self.tok != Token::Comma {
                break;
            }
            self.advance();
            self.skip_newlines();
        }

        self.expect(Token::RBracket);
        Expr::new(
            ExprKind::Sequence {
                values,
                is_map: is_map.unwrap_or(false),
            },
            pos,
        )
    }

    /// `{x, y => body}` or `{body}`.
    fn parse_closure(&mut self) -> Expr {
        let pos = self.expect(Token::LBrace);
        self.skip_newlines();

        let mut params: Vec<String> = Vec::new();
        if self.tok == Token::Arrow {
            self.advance();
        } else if self.tok == Token::Ident && matches!(self.peek(), Token::Arrow | Token::Comma) {
            loop {
                if self.tok != Token::Ident {
                    let found = self.describe();
                    self.error(self.pos, format!("expected parameter name, found {}", found));
                    break;
                }
                let name = std::mem::take(&mut self.lit);
                if params.contains(&name) {
                    self.error(self.pos, format!("duplicate parameter {}", name));
                }
                params.push(name);
                self.advance();
                if self.tok != Token::Comma {
                    break;
                }
                self.advance();
            }
            self.expect(Token::Arrow);
        }

        self.open_scope();
        if let Some(scope) = self.scopes.last_mut() {
            scope.names.extend(params.iter().cloned());
        }
        let body = self.parse_stmt_list();
        let scope = self.close_scope();
        self.expect(Token::RBrace);

        Expr::new(
            ExprKind::Closure(Arc::new(ClosureExpr {
                params,
                body,
                scope,
            })),
            pos,
        )
    }

    fn parse_argument(&mut self) -> Argument {
        if self.tok == Token::Ident && self.peek() == Token::Colon {
            let name = std::mem::take(&mut self.lit);
            self.advance();
            self.advance();
            self.skip_newlines();
            return Argument {
                name: Some(name),
                value: self.parse_expr(),
            };
        }
        Argument {
            name: None,
            value: self.parse_expr(),
        }
    }

    /// `(a, name: b)`
    fn parse_call_arguments(&mut self) -> Vec<Argument> {
        self.expect(Token::LParen);
        self.skip_newlines();
        let mut args = Vec::new();
        while !matches!(self.tok, Token::RParen | Token::Eof) {
            args.push(self.parse_argument());
            self.skip_newlines();
            if self.tok != Token::Comma {
                break;
            }
            self.advance();
            self.skip_newlines();
        }
        self.expect(Token::RParen);
        args
    }

    /// `a, name: b` without parentheses; ends at the first token that is
    /// not a comma.
    fn parse_bare_arguments(&mut self) -> Vec<Argument> {
        let mut args = vec![self.parse_argument()];
        while self.tok == Token::Comma {
            self.advance();
            self.skip_newlines();
            args.push(self.parse_argument());
        }
        args
    }
}

/// Drops the backslash of each escape pair.
fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(ch);
        }
    }
    out
}
