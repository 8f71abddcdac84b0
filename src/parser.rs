use log::debug;

use crate::error::Diagnostics;
use crate::expr::{
    BinaryOp, BinaryOpTy, ClassDecl, Expr, ExprId, FunDecl, LambdaDecl, Literal, LogicalOp,
    LoopKind, SourceLocation, Stmt, Symbol, UnaryOp, UnaryOpTy,
};
use crate::scanner;
use crate::scanner::TokenType;

/*
Recursive descent using the following grammar

program     → declaration* EOF ;

declaration → classDecl
            | funDecl
            | varDecl
            | statement ;

classDecl → "class" IDENTIFIER ( "<" IDENTIFIER )?
            "{" function* "}" ;

funDecl  → "fun" function ;
function → IDENTIFIER "(" parameters? ")" block ;
parameters  → IDENTIFIER ( "," IDENTIFIER )* ;

statement → exprStmt
          | forStmt
          | ifStmt
          | printStmt
          | returnStmt
          | whileStmt
          | breakStmt
          | continueStmt
          | block ;

returnStmt → "return" expression? ";" ;

forStmt   → "for" "(" ( varDecl | exprStmt | ";" )
                      expression? ";"
                      expression? ")" statement ;

whileStmt → "while" "(" expression ")" statement ;

ifStmt    → "if" "(" expression ")" statement ( "else" statement )? ;

block     → "{" declaration* "}" ;

varDecl → "var" IDENTIFIER ( "=" expression )? ";" ;

exprStmt  → expression ";" ;
printStmt → "print" expression ";" ;

expression → comma ;
comma      → assignment ( "," assignment )* ;
assignment → ( call "." IDENTIFIER | IDENTIFIER ) "=" assignment
           | ternary ;
ternary    → logic_or ( "?" expression ":" ternary )? ;
logic_or   → logic_and ( "or" logic_and )* ;
logic_and  → equality ( "and" equality )* ;

equality       → comparison ( ( "!=" | "==" ) comparison )* ;
comparison     → addition ( ( ">" | ">=" | "<" | "<=" ) addition )* ;
addition       → multiplication ( ( "-" | "+" ) multiplication )* ;
multiplication → unary ( ( "/" | "*" ) unary )* ;
unary → ( "!" | "-" ) unary | call ;
call → primary ( "(" arguments? ")" | "." IDENTIFIER )* ;
arguments → assignment ( "," assignment )* ;

primary → "true" | "false" | "nil" | "this"
        | NUMBER | STRING | IDENTIFIER | "(" expression ")"
        | "super" "." IDENTIFIER
        | "fun" "(" parameters? ")" block ;

*/

/// Signal thrown on a syntax error; unwinds to `declaration`, which
/// synchronizes at the next statement boundary. The diagnostic itself was
/// already reported to the sink when the signal was constructed.
struct ParseError;

pub struct Parser<'a> {
    tokens: Vec<scanner::Token>,
    current: usize,
    sink: &'a mut Diagnostics,
    next_expr_id: ExprId,
    loop_stack: Vec<LoopKind>,
    allow_single_expression: bool,
    found_single_expression: bool,
}

impl<'a> Parser<'a> {
    pub fn new(
        tokens: Vec<scanner::Token>,
        allow_single_expression: bool,
        sink: &'a mut Diagnostics,
    ) -> Parser<'a> {
        Parser {
            tokens,
            current: 0,
            sink,
            next_expr_id: 0,
            loop_stack: Vec::new(),
            allow_single_expression,
            found_single_expression: false,
        }
    }

    pub fn parse(&mut self) -> Vec<Stmt> {
        let mut statements = Vec::new();

        while !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
            if self.allow_single_expression && self.found_single_expression {
                break;
            }
            // Single-expression acceptance only applies to the first
            // statement of the input.
            self.allow_single_expression = false;
        }

        statements
    }

    /// True when the parser accepted a trailing expression without `;` in
    /// single-expression mode. The prompt driver uses this to echo values.
    pub fn parsed_single_expression(&self) -> bool {
        self.found_single_expression
    }

    /// Starts node ids at `first_id` instead of zero. Prompt mode parses
    /// each line with a fresh parser but shares one interpreter, so ids must
    /// keep advancing or new nodes would collide with side-table entries
    /// still owned by functions from earlier lines.
    pub fn starting_at(mut self, first_id: ExprId) -> Parser<'a> {
        self.next_expr_id = first_id;
        self
    }

    pub fn next_expr_id(&self) -> ExprId {
        self.next_expr_id
    }

    fn declaration(&mut self) -> Option<Stmt> {
        let result = if self.matches(TokenType::Var) {
            self.allow_single_expression = false;
            self.var_decl()
        } else if self.check(TokenType::Fun) && self.check_next(TokenType::Identifier) {
            self.advance();
            self.fun_decl("function").map(Stmt::FunDecl)
        } else if self.matches(TokenType::Class) {
            self.class_decl()
        } else {
            self.statement()
        };

        match result {
            Ok(stmt) => Some(stmt),
            Err(ParseError) => {
                self.synchronize();
                None
            }
        }
    }

    fn var_decl(&mut self) -> Result<Stmt, ParseError> {
        let name = self.consume(TokenType::Identifier, "Expect variable name.")?;

        let initializer = if self.matches(TokenType::Equal) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(
            TokenType::Semicolon,
            "Expect ';' after variable declaration.",
        )?;

        Ok(Stmt::VarDecl(Parser::symbol(&name), initializer))
    }

    fn fun_decl(&mut self, kind: &str) -> Result<FunDecl, ParseError> {
        let name = self.consume(TokenType::Identifier, &format!("Expect {} name.", kind))?;
        self.consume(
            TokenType::LeftParen,
            &format!("Expect '(' after {} name.", kind),
        )?;
        let lambda = self.function_body(kind)?;

        Ok(FunDecl {
            name: Parser::symbol(&name),
            lambda,
        })
    }

    /// Parameter list and body, shared by declarations, methods and lambda
    /// expressions. The opening `(` has already been consumed.
    fn function_body(&mut self, kind: &str) -> Result<LambdaDecl, ParseError> {
        let mut params = Vec::new();
        if !self.check(TokenType::RightParen) {
            loop {
                if params.len() >= 255 {
                    let token = self.peek().clone();
                    self.report_error(&token, "Can't have more than 255 parameters.");
                }
                let param = self.consume(TokenType::Identifier, "Expect parameter name.")?;
                params.push(Parser::symbol(&param));
                if !self.matches(TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen, "Expect ')' after parameters.")?;
        self.consume(
            TokenType::LeftBrace,
            &format!("Expect '{{' before {} body.", kind),
        )?;

        // A loop surrounding the declaration must not leak its context into
        // the body: break/continue cannot jump out of a function.
        let enclosing_loops = std::mem::take(&mut self.loop_stack);
        let body = self.block_statements();
        self.loop_stack = enclosing_loops;

        Ok(LambdaDecl {
            params,
            body: body?,
        })
    }

    fn class_decl(&mut self) -> Result<Stmt, ParseError> {
        let name = self.consume(TokenType::Identifier, "Expect class name.")?;

        let superclass = if self.matches(TokenType::Less) {
            let superclass = self.consume(TokenType::Identifier, "Expect superclass name.")?;
            Some((self.next_id(), Parser::symbol(&superclass)))
        } else {
            None
        };

        self.consume(TokenType::LeftBrace, "Expect '{' before class body.")?;

        let mut methods = Vec::new();
        while !self.check(TokenType::RightBrace) && !self.is_at_end() {
            methods.push(self.fun_decl("method")?);
        }

        self.consume(TokenType::RightBrace, "Expect '}' after class body.")?;

        Ok(Stmt::ClassDecl(ClassDecl {
            name: Parser::symbol(&name),
            superclass,
            methods,
        }))
    }

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        if self.matches(TokenType::Print) {
            return self.print_statement();
        }
        if self.matches(TokenType::While) {
            return self.while_statement();
        }
        if self.matches(TokenType::For) {
            return self.for_statement();
        }
        if self.matches(TokenType::If) {
            return self.if_statement();
        }
        if self.matches(TokenType::Return) {
            return self.return_statement();
        }
        if self.matches(TokenType::Break) {
            return self.break_statement();
        }
        if self.matches(TokenType::Continue) {
            return self.continue_statement();
        }
        if self.matches(TokenType::LeftBrace) {
            return Ok(Stmt::Block(self.block_statements()?));
        }
        self.expression_statement()
    }

    fn print_statement(&mut self) -> Result<Stmt, ParseError> {
        let expr = self.expression()?;
        self.consume(TokenType::Semicolon, "Expect ';' after value.")?;
        Ok(Stmt::Print(expr))
    }

    fn while_statement(&mut self) -> Result<Stmt, ParseError> {
        self.consume(TokenType::LeftParen, "Expect '(' after 'while'.")?;
        let condition = self.expression()?;
        self.consume(TokenType::RightParen, "Expect ')' after while condition.")?;

        self.loop_stack.push(LoopKind::While);
        let body = self.statement();
        self.loop_stack.pop();

        Ok(Stmt::While(condition, Box::new(body?)))
    }

    /// Desugars `for (init; cond; inc) body` into
    /// `{ init; while (cond) { body; inc; } }`. Without an increment the
    /// loop registers as a plain `while`, so `continue` inside it never
    /// re-executes the body's last statement.
    fn for_statement(&mut self) -> Result<Stmt, ParseError> {
        self.consume(TokenType::LeftParen, "Expect '(' after 'for'.")?;

        let initializer = if self.matches(TokenType::Semicolon) {
            None
        } else if self.matches(TokenType::Var) {
            Some(self.var_decl()?)
        } else {
            Some(self.expression_statement()?)
        };

        let condition = if !self.check(TokenType::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenType::Semicolon, "Expect ';' after loop condition.")?;

        let increment = if !self.check(TokenType::RightParen) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenType::RightParen, "Expect ')' after for clauses.")?;

        let kind = if increment.is_some() {
            LoopKind::For
        } else {
            LoopKind::While
        };
        self.loop_stack.push(kind);
        let body = self.statement();
        self.loop_stack.pop();
        let mut body = body?;

        if let Some(increment) = increment {
            body = Stmt::Block(vec![body, Stmt::Expr(increment)]);
        }

        let condition = condition.unwrap_or(Expr::Literal(Literal::True));
        body = Stmt::While(condition, Box::new(body));

        if let Some(initializer) = initializer {
            body = Stmt::Block(vec![initializer, body]);
        }

        Ok(body)
    }

    fn if_statement(&mut self) -> Result<Stmt, ParseError> {
        self.consume(TokenType::LeftParen, "Expect '(' after 'if'.")?;
        let condition = self.expression()?;
        self.consume(TokenType::RightParen, "Expect ')' after if condition.")?;

        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.matches(TokenType::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };

        Ok(Stmt::If(condition, then_branch, else_branch))
    }

    fn return_statement(&mut self) -> Result<Stmt, ParseError> {
        let keyword = self.previous().clone();

        let value = if !self.check(TokenType::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(TokenType::Semicolon, "Expect ';' after return value.")?;

        Ok(Stmt::Return(
            SourceLocation { line: keyword.line },
            value,
        ))
    }

    fn break_statement(&mut self) -> Result<Stmt, ParseError> {
        let keyword = self.previous().clone();
        if self.loop_stack.is_empty() {
            self.report_error(&keyword, "Can't use 'break' outside of a loop.");
        }
        self.consume(TokenType::Semicolon, "Expect ';' after 'break'.")?;
        Ok(Stmt::Break(SourceLocation { line: keyword.line }))
    }

    fn continue_statement(&mut self) -> Result<Stmt, ParseError> {
        let keyword = self.previous().clone();
        let kind = match self.loop_stack.last() {
            Some(kind) => *kind,
            None => {
                self.report_error(&keyword, "Can't use 'continue' outside of a loop.");
                LoopKind::While
            }
        };
        self.consume(TokenType::Semicolon, "Expect ';' after 'continue'.")?;
        Ok(Stmt::Continue(SourceLocation { line: keyword.line }, kind))
    }

    fn block_statements(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();

        while !self.check(TokenType::RightBrace) && !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                stmts.push(stmt);
            }
        }

        self.consume(TokenType::RightBrace, "Expect '}' after block.")?;

        Ok(stmts)
    }

    fn expression_statement(&mut self) -> Result<Stmt, ParseError> {
        let expr = self.expression()?;
        if self.allow_single_expression && self.is_at_end() {
            self.found_single_expression = true;
        } else {
            self.consume(TokenType::Semicolon, "Expect ';' after expression.")?;
        }
        Ok(Stmt::Expr(expr))
    }

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.comma()
    }

    fn comma(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.assignment()?;

        while self.matches(TokenType::Comma) {
            let op = Parser::binary_op(self.previous());
            let right = self.assignment()?;
            expr = Expr::Binary(Box::new(expr), op, Box::new(right));
        }

        Ok(expr)
    }

    fn assignment(&mut self) -> Result<Expr, ParseError> {
        let expr = self.ternary()?;

        if self.matches(TokenType::Equal) {
            let equals = self.previous().clone();
            let value = self.assignment()?;

            return Ok(match expr {
                Expr::Variable(_, name) => {
                    Expr::Assign(self.next_id(), name, Box::new(value))
                }
                Expr::Get(object, name) => Expr::Set(object, name, Box::new(value)),
                other => {
                    self.report_error(&equals, "Invalid assignment target.");
                    other
                }
            });
        }

        Ok(expr)
    }

    fn ternary(&mut self) -> Result<Expr, ParseError> {
        let expr = self.or()?;

        if self.matches(TokenType::Question) {
            let then_branch = self.expression()?;
            self.consume(
                TokenType::Colon,
                "Expect ':' after then branch of ternary expression.",
            )?;
            let else_branch = self.ternary()?;
            return Ok(Expr::Ternary(
                Box::new(expr),
                Box::new(then_branch),
                Box::new(else_branch),
            ));
        }

        Ok(expr)
    }

    fn or(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.and()?;

        while self.matches(TokenType::Or) {
            let right = self.and()?;
            expr = Expr::Logical(Box::new(expr), LogicalOp::Or, Box::new(right));
        }

        Ok(expr)
    }

    fn and(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.equality()?;

        while self.matches(TokenType::And) {
            let right = self.equality()?;
            expr = Expr::Logical(Box::new(expr), LogicalOp::And, Box::new(right));
        }

        Ok(expr)
    }

    fn equality(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.comparison()?;

        while self.match_one_of(&[TokenType::BangEqual, TokenType::EqualEqual]) {
            let op = Parser::binary_op(self.previous());
            let right = self.comparison()?;
            expr = Expr::Binary(Box::new(expr), op, Box::new(right));
        }

        Ok(expr)
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.addition()?;

        while self.match_one_of(&[
            TokenType::Greater,
            TokenType::GreaterEqual,
            TokenType::Less,
            TokenType::LessEqual,
        ]) {
            let op = Parser::binary_op(self.previous());
            let right = self.addition()?;
            expr = Expr::Binary(Box::new(expr), op, Box::new(right));
        }

        Ok(expr)
    }

    fn addition(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.multiplication()?;

        while self.match_one_of(&[TokenType::Minus, TokenType::Plus]) {
            let op = Parser::binary_op(self.previous());
            let right = self.multiplication()?;
            expr = Expr::Binary(Box::new(expr), op, Box::new(right));
        }

        Ok(expr)
    }

    fn multiplication(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.unary()?;

        while self.match_one_of(&[TokenType::Slash, TokenType::Star]) {
            let op = Parser::binary_op(self.previous());
            let right = self.unary()?;
            expr = Expr::Binary(Box::new(expr), op, Box::new(right));
        }

        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.match_one_of(&[TokenType::Bang, TokenType::Minus]) {
            let op = Parser::unary_op(self.previous());
            let right = self.unary()?;
            return Ok(Expr::Unary(op, Box::new(right)));
        }
        self.call()
    }

    fn call(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;

        loop {
            if self.matches(TokenType::LeftParen) {
                expr = self.finish_call(expr)?;
            } else if self.matches(TokenType::Dot) {
                let name = self.consume(TokenType::Identifier, "Expect property name after '.'.")?;
                expr = Expr::Get(Box::new(expr), Parser::symbol(&name));
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> Result<Expr, ParseError> {
        let mut arguments = Vec::new();

        if !self.check(TokenType::RightParen) {
            loop {
                if arguments.len() >= 255 {
                    let token = self.peek().clone();
                    self.report_error(&token, "Can't have more than 255 arguments.");
                }
                // Arguments parse at assignment precedence so the comma
                // operator can't swallow the separators.
                let argument = self.assignment()?;
                Parser::push_argument(&mut arguments, argument);
                if !self.matches(TokenType::Comma) {
                    break;
                }
            }
        }

        let paren = self.consume(TokenType::RightParen, "Expect ')' after arguments.")?;

        Ok(Expr::Call(
            Box::new(callee),
            SourceLocation { line: paren.line },
            arguments,
        ))
    }

    // An argument that still parsed to a comma chain contributes each half
    // as its own argument.
    fn push_argument(arguments: &mut Vec<Expr>, argument: Expr) {
        match argument {
            Expr::Binary(left, op, right) if op.ty == BinaryOpTy::Comma => {
                Parser::push_argument(arguments, *left);
                Parser::push_argument(arguments, *right);
            }
            other => arguments.push(other),
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        if self.matches(TokenType::False) {
            return Ok(Expr::Literal(Literal::False));
        }
        if self.matches(TokenType::True) {
            return Ok(Expr::Literal(Literal::True));
        }
        if self.matches(TokenType::Nil) {
            return Ok(Expr::Literal(Literal::Nil));
        }
        if self.matches(TokenType::This) {
            let keyword = self.previous().clone();
            return Ok(Expr::This(
                self.next_id(),
                SourceLocation { line: keyword.line },
            ));
        }
        if self.matches(TokenType::Super) {
            let keyword = self.previous().clone();
            self.consume(TokenType::Dot, "Expect '.' after 'super'.")?;
            let method = self.consume(TokenType::Identifier, "Expect superclass method name.")?;
            return Ok(Expr::Super(
                self.next_id(),
                SourceLocation { line: keyword.line },
                Parser::symbol(&method),
            ));
        }
        if self.matches(TokenType::Number) {
            match &self.previous().literal {
                Some(scanner::Literal::Number(n)) => {
                    return Ok(Expr::Literal(Literal::Number(*n)))
                }
                other => panic!(
                    "internal error in parser: number token carried literal {:?}",
                    other
                ),
            }
        }
        if self.matches(TokenType::String) {
            match &self.previous().literal {
                Some(scanner::Literal::Str(s)) => {
                    return Ok(Expr::Literal(Literal::String(s.clone())))
                }
                other => panic!(
                    "internal error in parser: string token carried literal {:?}",
                    other
                ),
            }
        }
        if self.matches(TokenType::Identifier) {
            let token = self.previous().clone();
            match token.literal {
                Some(scanner::Literal::Identifier(name)) => {
                    return Ok(Expr::Variable(
                        self.next_id(),
                        Symbol {
                            name,
                            line: token.line,
                        },
                    ))
                }
                other => panic!(
                    "internal error in parser: identifier token carried literal {:?}",
                    other
                ),
            }
        }
        if self.matches(TokenType::LeftParen) {
            let expr = self.expression()?;
            self.consume(TokenType::RightParen, "Expect ')' after expression.")?;
            return Ok(Expr::Grouping(Box::new(expr)));
        }
        if self.matches(TokenType::Fun) {
            self.consume(TokenType::LeftParen, "Expect '(' after 'fun'.")?;
            return Ok(Expr::Lambda(self.function_body("lambda")?));
        }

        if self.is_at_end() {
            let previous = self.previous().clone();
            return Err(self.error(&previous, "Incomplete expression"));
        }
        let token = self.peek().clone();
        Err(self.error(&token, "Expected expression."))
    }

    fn symbol(token: &scanner::Token) -> Symbol {
        Symbol {
            name: token.lexeme.clone(),
            line: token.line,
        }
    }

    fn binary_op(token: &scanner::Token) -> BinaryOp {
        let ty = match token.ty {
            TokenType::EqualEqual => BinaryOpTy::EqualEqual,
            TokenType::BangEqual => BinaryOpTy::NotEqual,
            TokenType::Less => BinaryOpTy::Less,
            TokenType::LessEqual => BinaryOpTy::LessEqual,
            TokenType::Greater => BinaryOpTy::Greater,
            TokenType::GreaterEqual => BinaryOpTy::GreaterEqual,
            TokenType::Plus => BinaryOpTy::Plus,
            TokenType::Minus => BinaryOpTy::Minus,
            TokenType::Star => BinaryOpTy::Star,
            TokenType::Slash => BinaryOpTy::Slash,
            TokenType::Comma => BinaryOpTy::Comma,
            _ => panic!(
                "internal error in parser: token {:?} is not a binary operator",
                token.ty
            ),
        };
        BinaryOp {
            ty,
            line: token.line,
        }
    }

    fn unary_op(token: &scanner::Token) -> UnaryOp {
        let ty = match token.ty {
            TokenType::Minus => UnaryOpTy::Minus,
            TokenType::Bang => UnaryOpTy::Bang,
            _ => panic!(
                "internal error in parser: token {:?} is not a unary operator",
                token.ty
            ),
        };
        UnaryOp {
            ty,
            line: token.line,
        }
    }

    fn next_id(&mut self) -> ExprId {
        let id = self.next_expr_id;
        self.next_expr_id += 1;
        id
    }

    fn error(&mut self, token: &scanner::Token, message: &str) -> ParseError {
        self.report_error(token, message);
        ParseError
    }

    fn report_error(&mut self, token: &scanner::Token, message: &str) {
        if token.ty == TokenType::Eof {
            self.sink.error_at_end(token.line, message);
        } else {
            self.sink.error_at(token.line, &token.lexeme, message);
        }
    }

    fn synchronize(&mut self) {
        debug!(
            "synchronizing after parse error near line {}",
            self.peek().line
        );
        self.advance();

        while !self.is_at_end() {
            if self.previous().ty == TokenType::Semicolon {
                return;
            }

            match self.peek().ty {
                TokenType::Class
                | TokenType::Fun
                | TokenType::Var
                | TokenType::For
                | TokenType::If
                | TokenType::While
                | TokenType::Print
                | TokenType::Return => return,
                _ => {}
            }

            self.advance();
        }
    }

    fn consume(&mut self, ty: TokenType, message: &str) -> Result<scanner::Token, ParseError> {
        if self.check(ty) {
            return Ok(self.advance().clone());
        }
        let token = self.peek().clone();
        Err(self.error(&token, message))
    }

    fn match_one_of(&mut self, types: &[TokenType]) -> bool {
        for ty in types {
            if self.matches(*ty) {
                return true;
            }
        }
        false
    }

    fn matches(&mut self, ty: TokenType) -> bool {
        if self.check(ty) {
            self.advance();
            return true;
        }
        false
    }

    fn check(&self, ty: TokenType) -> bool {
        if self.is_at_end() {
            return false;
        }
        self.peek().ty == ty
    }

    fn check_next(&self, ty: TokenType) -> bool {
        if self.is_at_end() {
            return false;
        }
        match self.tokens.get(self.current + 1) {
            Some(token) => token.ty == ty,
            None => false,
        }
    }

    fn advance(&mut self) -> &scanner::Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn is_at_end(&self) -> bool {
        self.peek().ty == TokenType::Eof
    }

    fn peek(&self) -> &scanner::Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &scanner::Token {
        &self.tokens[self.current - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::Parser;
    use crate::error::Diagnostics;
    use crate::expr::{Expr, Stmt};
    use crate::scanner;

    fn parse(source: &str) -> (Vec<Stmt>, Diagnostics) {
        let mut sink = Diagnostics::new();
        let tokens = scanner::scan_tokens(source, &mut sink);
        let mut parser = Parser::new(tokens, false, &mut sink);
        let statements = parser.parse();
        (statements, sink)
    }

    #[test]
    fn recovers_at_statement_boundary() {
        let (statements, sink) = parse("var = 1; print 2;");
        assert!(sink.had_error);
        // The bad declaration is dropped, the print survives.
        assert_eq!(statements.len(), 1);
        assert!(matches!(statements[0], Stmt::Print(_)));
    }

    #[test]
    fn invalid_assignment_target_does_not_panic_parsing() {
        let (statements, sink) = parse("1 + 2 = 3; print 4;");
        assert!(sink.had_error);
        assert!(sink.messages()[0].contains("Invalid assignment target."));
        assert_eq!(statements.len(), 2);
    }

    #[test]
    fn for_desugars_to_while_in_block() {
        let (statements, sink) = parse("for (var i = 0; i < 3; i = i + 1) print i;");
        assert!(!sink.had_error);
        assert_eq!(statements.len(), 1);
        match &statements[0] {
            Stmt::Block(outer) => {
                assert!(matches!(outer[0], Stmt::VarDecl(_, _)));
                match &outer[1] {
                    Stmt::While(_, body) => match body.as_ref() {
                        Stmt::Block(inner) => {
                            assert!(matches!(inner[0], Stmt::Print(_)));
                            assert!(matches!(inner[1], Stmt::Expr(_)));
                        }
                        other => panic!("expected desugared block body, found {:?}", other),
                    },
                    other => panic!("expected while, found {:?}", other),
                }
            }
            other => panic!("expected block, found {:?}", other),
        }
    }

    #[test]
    fn break_outside_loop_is_reported() {
        let (_, sink) = parse("break;");
        assert!(sink.had_error);
        assert!(sink.messages()[0].contains("Can't use 'break' outside of a loop."));
    }

    #[test]
    fn continue_inside_function_inside_loop_is_reported() {
        let (_, sink) = parse("while (true) { fun f() { continue; } }");
        assert!(sink.had_error);
        assert!(sink.messages()[0].contains("Can't use 'continue' outside of a loop."));
    }

    #[test]
    fn comma_operator_does_not_leak_into_arguments() {
        let (statements, sink) = parse("f(1, 2);");
        assert!(!sink.had_error);
        match &statements[0] {
            Stmt::Expr(Expr::Call(_, _, arguments)) => assert_eq!(arguments.len(), 2),
            other => panic!("expected call, found {:?}", other),
        }
    }

    #[test]
    fn parenthesized_comma_is_one_argument() {
        let (statements, sink) = parse("f((1, 2));");
        assert!(!sink.had_error);
        match &statements[0] {
            Stmt::Expr(Expr::Call(_, _, arguments)) => {
                assert_eq!(arguments.len(), 1);
                assert!(matches!(arguments[0], Expr::Grouping(_)));
            }
            other => panic!("expected call, found {:?}", other),
        }
    }

    #[test]
    fn single_expression_mode_accepts_bare_expression() {
        let mut sink = Diagnostics::new();
        let tokens = scanner::scan_tokens("1 + 2", &mut sink);
        let mut parser = Parser::new(tokens, true, &mut sink);
        let statements = parser.parse();
        let parsed_single = parser.parsed_single_expression();
        assert!(!sink.had_error);
        assert!(parsed_single);
        assert_eq!(statements.len(), 1);
        assert!(matches!(statements[0], Stmt::Expr(_)));
    }

    #[test]
    fn single_expression_mode_still_requires_semicolons_elsewhere() {
        let mut sink = Diagnostics::new();
        let tokens = scanner::scan_tokens("print 1; 2", &mut sink);
        let mut parser = Parser::new(tokens, true, &mut sink);
        parser.parse();
        let parsed_single = parser.parsed_single_expression();
        assert!(sink.had_error);
        assert!(!parsed_single);
    }

    #[test]
    fn lambda_in_expression_position() {
        let (statements, sink) = parse("var f = fun (x) { return x; };");
        assert!(!sink.had_error);
        match &statements[0] {
            Stmt::VarDecl(_, Some(Expr::Lambda(lambda))) => {
                assert_eq!(lambda.params.len(), 1);
            }
            other => panic!("expected lambda initializer, found {:?}", other),
        }
    }

    #[test]
    fn ternary_parses_right_associative() {
        let (statements, sink) = parse("var x = true ? 1 : false ? 2 : 3;");
        assert!(!sink.had_error);
        match &statements[0] {
            Stmt::VarDecl(_, Some(Expr::Ternary(_, _, else_branch))) => {
                assert!(matches!(else_branch.as_ref(), Expr::Ternary(_, _, _)));
            }
            other => panic!("expected ternary initializer, found {:?}", other),
        }
    }
}
