//! Recursive-descent parser with statement-level error recovery.
//!
//! Every diagnostic goes straight to stderr; the parser keeps going by
//! synchronising to the next statement boundary, so one pass reports as many
//! errors as possible. A recovered AST is still produced, but [`Parser::parse`]
//! fails if anything was reported.

use crate::ast::{BinOp, DeclKind, Expr, Program, Stmt, UnOp};
use crate::frontend::lexer::{Token, TokenKind};

/// Marker for an already-reported parse error.
struct ParseError;

type PResult<T> = Result<T, ParseError>;

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    errors: usize,
}

impl Parser {
    /// The token stream must end with an `Eof` token, as produced by
    /// [`crate::frontend::lexer::Lexer::tokenize`].
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            errors: 0,
        }
    }

    /// Parse a whole program. `Err` carries the number of diagnostics that
    /// were reported on stderr.
    pub fn parse(&mut self) -> Result<Program, usize> {
        let mut statements = Vec::new();
        while !self.at_end() {
            match self.statement() {
                Ok(stmt) => statements.push(stmt),
                Err(_) => self.synchronize(),
            }
        }
        if self.errors > 0 {
            Err(self.errors)
        } else {
            Ok(Program { statements })
        }
    }

    /* Statements */

    fn statement(&mut self) -> PResult<Stmt> {
        if self.matches(&[TokenKind::Function]) {
            return self.function_declaration();
        }
        if self.matches(&[TokenKind::Var, TokenKind::Let, TokenKind::Const]) {
            return self.variable_declaration();
        }
        if self.matches(&[TokenKind::If]) {
            return self.if_statement();
        }
        if self.matches(&[TokenKind::While]) {
            return self.while_statement();
        }
        if self.matches(&[TokenKind::For]) {
            return self.for_statement();
        }
        if self.matches(&[TokenKind::Return]) {
            return self.return_statement();
        }
        if self.matches(&[TokenKind::LBrace]) {
            return Ok(Stmt::Block(self.block_body()?));
        }
        self.expression_statement()
    }

    /// Called with the `let`/`var`/`const` keyword already consumed.
    fn variable_declaration(&mut self) -> PResult<Stmt> {
        let kind = match self.previous().kind {
            TokenKind::Var => DeclKind::Var,
            TokenKind::Const => DeclKind::Const,
            _ => DeclKind::Let,
        };
        let name = self.consume(TokenKind::Identifier, "Expected variable name")?.lexeme;
        let initializer = if self.matches(&[TokenKind::Assign]) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(
            TokenKind::Semicolon,
            "Expected ';' after variable declaration",
        )?;
        Ok(Stmt::VariableDeclaration {
            kind,
            name,
            initializer,
        })
    }

    fn function_declaration(&mut self) -> PResult<Stmt> {
        let name = self.consume(TokenKind::Identifier, "Expected function name")?.lexeme;
        self.consume(TokenKind::LParen, "Expected '(' after function name")?;
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                params.push(
                    self.consume(TokenKind::Identifier, "Expected parameter name")?
                        .lexeme,
                );
                if !self.matches(&[TokenKind::Comma]) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "Expected ')' after parameters")?;
        self.consume(TokenKind::LBrace, "Expected '{' before function body")?;
        let body = self.block_body()?;
        Ok(Stmt::FunctionDeclaration { name, params, body })
    }

    /// Statements up to and including the closing `}`.
    fn block_body(&mut self) -> PResult<Vec<Stmt>> {
        let mut statements = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.at_end() {
            statements.push(self.statement()?);
        }
        self.consume(TokenKind::RBrace, "Expected '}' after block")?;
        Ok(statements)
    }

    fn if_statement(&mut self) -> PResult<Stmt> {
        self.consume(TokenKind::LParen, "Expected '(' after 'if'")?;
        let condition = self.expression()?;
        self.consume(TokenKind::RParen, "Expected ')' after if condition")?;
        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.matches(&[TokenKind::Else]) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn while_statement(&mut self) -> PResult<Stmt> {
        self.consume(TokenKind::LParen, "Expected '(' after 'while'")?;
        let condition = self.expression()?;
        self.consume(TokenKind::RParen, "Expected ')' after while condition")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::While { condition, body })
    }

    fn for_statement(&mut self) -> PResult<Stmt> {
        self.consume(TokenKind::LParen, "Expected '(' after 'for'")?;

        let init = if self.matches(&[TokenKind::Semicolon]) {
            None
        } else if self.matches(&[TokenKind::Var, TokenKind::Let, TokenKind::Const]) {
            Some(Box::new(self.variable_declaration()?))
        } else {
            let expr = self.expression()?;
            self.consume(
                TokenKind::Semicolon,
                "Expected ';' after for loop initializer",
            )?;
            Some(Box::new(Stmt::Expression(expr)))
        };

        let condition = if !self.check(TokenKind::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenKind::Semicolon, "Expected ';' after for loop condition")?;

        let update = if !self.check(TokenKind::RParen) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenKind::RParen, "Expected ')' after for clauses")?;

        let body = Box::new(self.statement()?);
        Ok(Stmt::For {
            init,
            condition,
            update,
            body,
        })
    }

    fn return_statement(&mut self) -> PResult<Stmt> {
        let value = if !self.check(TokenKind::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenKind::Semicolon, "Expected ';' after return value")?;
        Ok(Stmt::Return(value))
    }

    fn expression_statement(&mut self) -> PResult<Stmt> {
        let expr = self.expression()?;
        self.consume(TokenKind::Semicolon, "Expected ';' after expression")?;
        Ok(Stmt::Expression(expr))
    }

    /* Expressions */

    fn expression(&mut self) -> PResult<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> PResult<Expr> {
        let expr = self.logical_or()?;

        if self.matches(&[TokenKind::Assign]) {
            return match expr {
                Expr::Identifier(name) => {
                    let value = self.assignment()?;
                    Ok(Expr::Assignment {
                        name,
                        value: Box::new(value),
                    })
                }
                Expr::Index { array, index } => {
                    let value = self.assignment()?;
                    Ok(Expr::IndexAssignment {
                        array,
                        index,
                        value: Box::new(value),
                    })
                }
                other => {
                    // Report but keep the parsed expression so recovery can
                    // continue at the statement level.
                    let equals = self.previous().clone();
                    let _ = self.error(&equals, "Invalid assignment target");
                    Ok(other)
                }
            };
        }

        Ok(expr)
    }

    fn logical_or(&mut self) -> PResult<Expr> {
        let mut expr = self.logical_and()?;
        while self.matches(&[TokenKind::OrOr]) {
            let right = self.logical_and()?;
            expr = binary(expr, BinOp::Or, right);
        }
        Ok(expr)
    }

    fn logical_and(&mut self) -> PResult<Expr> {
        let mut expr = self.equality()?;
        while self.matches(&[TokenKind::AndAnd]) {
            let right = self.equality()?;
            expr = binary(expr, BinOp::And, right);
        }
        Ok(expr)
    }

    fn equality(&mut self) -> PResult<Expr> {
        let mut expr = self.comparison()?;
        while self.matches(&[TokenKind::Eq, TokenKind::Neq]) {
            let op = match self.previous().kind {
                TokenKind::Eq => BinOp::Eq,
                _ => BinOp::Ne,
            };
            let right = self.comparison()?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> PResult<Expr> {
        let mut expr = self.addition()?;
        while self.matches(&[
            TokenKind::Gt,
            TokenKind::Ge,
            TokenKind::Lt,
            TokenKind::Le,
        ]) {
            let op = match self.previous().kind {
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Ge => BinOp::Ge,
                TokenKind::Lt => BinOp::Lt,
                _ => BinOp::Le,
            };
            let right = self.addition()?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn addition(&mut self) -> PResult<Expr> {
        let mut expr = self.multiplication()?;
        while self.matches(&[TokenKind::Plus, TokenKind::Minus]) {
            let op = match self.previous().kind {
                TokenKind::Plus => BinOp::Add,
                _ => BinOp::Sub,
            };
            let right = self.multiplication()?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn multiplication(&mut self) -> PResult<Expr> {
        let mut expr = self.unary()?;
        while self.matches(&[TokenKind::Mul, TokenKind::Div, TokenKind::Mod]) {
            let op = match self.previous().kind {
                TokenKind::Mul => BinOp::Mul,
                TokenKind::Div => BinOp::Div,
                _ => BinOp::Mod,
            };
            let right = self.unary()?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn unary(&mut self) -> PResult<Expr> {
        if self.matches(&[TokenKind::Not, TokenKind::Minus]) {
            let op = match self.previous().kind {
                TokenKind::Not => UnOp::Not,
                _ => UnOp::Neg,
            };
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
            });
        }
        self.call()
    }

    fn call(&mut self) -> PResult<Expr> {
        let mut expr = self.primary()?;

        loop {
            if self.matches(&[TokenKind::LParen]) {
                match expr {
                    Expr::Identifier(name) => {
                        let mut args = Vec::new();
                        if !self.check(TokenKind::RParen) {
                            loop {
                                args.push(self.expression()?);
                                if !self.matches(&[TokenKind::Comma]) {
                                    break;
                                }
                            }
                        }
                        self.consume(TokenKind::RParen, "Expected ')' after arguments")?;
                        expr = Expr::Call { name, args };
                    }
                    other => {
                        let paren = self.previous().clone();
                        let _ = self.error(&paren, "Can only call functions");
                        expr = other;
                    }
                }
            } else if self.matches(&[TokenKind::LBracket]) {
                let index = self.expression()?;
                self.consume(TokenKind::RBracket, "Expected ']' after index")?;
                expr = Expr::Index {
                    array: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn primary(&mut self) -> PResult<Expr> {
        if self.matches(&[TokenKind::True]) {
            return Ok(Expr::BooleanLiteral(true));
        }
        if self.matches(&[TokenKind::False]) {
            return Ok(Expr::BooleanLiteral(false));
        }
        if self.matches(&[TokenKind::Null]) {
            return Ok(Expr::NullLiteral);
        }
        if self.matches(&[TokenKind::Number]) {
            let value = self.previous().lexeme.parse().unwrap_or(0.0);
            return Ok(Expr::NumberLiteral(value));
        }
        if self.matches(&[TokenKind::Str]) {
            return Ok(Expr::StringLiteral(self.previous().lexeme.clone()));
        }
        if self.matches(&[TokenKind::Identifier]) {
            return Ok(Expr::Identifier(self.previous().lexeme.clone()));
        }
        if self.matches(&[TokenKind::LParen]) {
            let expr = self.expression()?;
            self.consume(TokenKind::RParen, "Expected ')' after expression")?;
            return Ok(expr);
        }
        if self.matches(&[TokenKind::LBracket]) {
            let mut elements = Vec::new();
            if !self.check(TokenKind::RBracket) {
                loop {
                    elements.push(self.expression()?);
                    if !self.matches(&[TokenKind::Comma]) {
                        break;
                    }
                }
            }
            self.consume(TokenKind::RBracket, "Expected ']' after array elements")?;
            return Ok(Expr::ArrayLiteral(elements));
        }

        let token = self.peek().clone();
        Err(self.error(&token, "Expected expression"))
    }

    /* Utilities */

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    fn at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn advance(&mut self) -> &Token {
        if !self.at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn check(&self, kind: TokenKind) -> bool {
        !self.at_end() && self.peek().kind == kind
    }

    fn matches(&mut self, kinds: &[TokenKind]) -> bool {
        for &kind in kinds {
            if self.check(kind) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> PResult<Token> {
        if self.check(kind) {
            return Ok(self.advance().clone());
        }
        let token = self.peek().clone();
        Err(self.error(&token, message))
    }

    fn error(&mut self, token: &Token, message: &str) -> ParseError {
        self.errors += 1;
        if token.kind == TokenKind::Eof {
            eprintln!(
                "Parse Error at line {}, column {} at end of file: {}",
                token.line, token.column, message
            );
        } else {
            eprintln!(
                "Parse Error at line {}, column {} at '{}': {}",
                token.line, token.column, token.lexeme, message
            );
        }
        ParseError
    }

    /// Discard tokens until a statement boundary.
    fn synchronize(&mut self) {
        self.advance();
        while !self.at_end() {
            if self.previous().kind == TokenKind::Semicolon {
                return;
            }
            match self.peek().kind {
                TokenKind::Function
                | TokenKind::Var
                | TokenKind::Let
                | TokenKind::Const
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Return => return,
                _ => {}
            }
            self.advance();
        }
    }
}

fn binary(left: Expr, op: BinOp, right: Expr) -> Expr {
    Expr::Binary {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;

    fn parse(source: &str) -> Result<Program, usize> {
        Parser::new(Lexer::new(source).tokenize()).parse()
    }

    fn parse_ok(source: &str) -> Program {
        match parse(source) {
            Ok(program) => program,
            Err(count) => panic!("expected {source:?} to parse, got {count} error(s)"),
        }
    }

    fn first_expr(program: &Program) -> &Expr {
        match &program.statements[0] {
            Stmt::Expression(expr) => expr,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn precedence_mul_binds_tighter() {
        let program = parse_ok("2 + 3 * 4;");
        match first_expr(&program) {
            Expr::Binary { op: BinOp::Add, right, .. } => match right.as_ref() {
                Expr::Binary { op: BinOp::Mul, .. } => {}
                other => panic!("expected multiplication on the right, got {other:?}"),
            },
            other => panic!("expected addition at the root, got {other:?}"),
        }
    }

    #[test]
    fn assignment_is_right_associative() {
        let program = parse_ok("a = b = 1;");
        match first_expr(&program) {
            Expr::Assignment { name, value } => {
                assert_eq!(name, "a");
                assert!(matches!(value.as_ref(), Expr::Assignment { .. }));
            }
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn index_assignment() {
        let program = parse_ok("a[0] = 5;");
        assert!(matches!(
            first_expr(&program),
            Expr::IndexAssignment { .. }
        ));
    }

    #[test]
    fn array_literal_and_index_chain() {
        let program = parse_ok("let a = [1, 2, 3]; a[1][2];");
        match &program.statements[0] {
            Stmt::VariableDeclaration { initializer: Some(Expr::ArrayLiteral(elements)), .. } => {
                assert_eq!(elements.len(), 3);
            }
            other => panic!("expected array declaration, got {other:?}"),
        }
        match &program.statements[1] {
            Stmt::Expression(Expr::Index { array, .. }) => {
                assert!(matches!(array.as_ref(), Expr::Index { .. }));
            }
            other => panic!("expected chained index, got {other:?}"),
        }
    }

    #[test]
    fn call_arguments() {
        let program = parse_ok("foo(1, bar, baz());");
        match first_expr(&program) {
            Expr::Call { name, args } => {
                assert_eq!(name, "foo");
                assert_eq!(args.len(), 3);
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn else_binds_to_nearest_if() {
        let program = parse_ok("if (a) if (b) 1; else 2;");
        match &program.statements[0] {
            Stmt::If { else_branch: None, then_branch, .. } => {
                assert!(matches!(
                    then_branch.as_ref(),
                    Stmt::If { else_branch: Some(_), .. }
                ));
            }
            other => panic!("expected if statement, got {other:?}"),
        }
    }

    #[test]
    fn for_with_empty_clauses() {
        let program = parse_ok("for (;;) { }");
        match &program.statements[0] {
            Stmt::For { init: None, condition: None, update: None, .. } => {}
            other => panic!("expected bare for loop, got {other:?}"),
        }
    }

    #[test]
    fn for_with_declaration() {
        let program = parse_ok("for (let i = 0; i < 10; i = i + 1) { print(i); }");
        match &program.statements[0] {
            Stmt::For { init: Some(init), condition: Some(_), update: Some(_), .. } => {
                assert!(matches!(init.as_ref(), Stmt::VariableDeclaration { .. }));
            }
            other => panic!("expected full for loop, got {other:?}"),
        }
    }

    #[test]
    fn function_declaration_with_params() {
        let program = parse_ok("function add(a, b) { return a + b; }");
        match &program.statements[0] {
            Stmt::FunctionDeclaration { name, params, body } => {
                assert_eq!(name, "add");
                assert_eq!(params, &["a".to_string(), "b".to_string()]);
                assert_eq!(body.len(), 1);
            }
            other => panic!("expected function declaration, got {other:?}"),
        }
    }

    #[test]
    fn missing_semicolon_is_reported() {
        assert!(matches!(parse("let x = 5"), Err(1)));
    }

    #[test]
    fn recovery_reports_every_statement() {
        // Two broken statements, each reported once after synchronisation.
        assert!(matches!(parse("let = 1; let = 2;"), Err(2)));
    }

    #[test]
    fn invalid_assignment_target_is_reported() {
        assert!(matches!(parse("1 = 2;"), Err(1)));
    }

    #[test]
    fn recovered_statements_still_parse() {
        // The bad first statement must not swallow the good second one.
        let result = parse("let = 1; let y = 2;");
        assert!(result.is_err());
    }
}
