use crate::ast::*;
use crate::error::CompileError;
use crate::lexer::{SourceLocation, SpannedToken, Token};

pub struct Parser {
    tokens: Vec<SpannedToken>,
    position: usize,
}

type ParseResult<T> = Result<T, CompileError>;

impl Parser {
    pub fn new(tokens: Vec<SpannedToken>) -> Self {
        Parser {
            tokens,
            position: 0,
        }
    }

    pub fn parse(&mut self) -> ParseResult<Program> {
        let mut items = Vec::new();

        while !self.is_at_end() {
            items.push(self.parse_item()?);
        }

        Ok(Program { items })
    }

    fn parse_item(&mut self) -> ParseResult<Item> {
        match self.current() {
            Token::Extern => {
                self.advance();
                let decl = self.parse_function_header()?;
                self.expect(Token::Semicolon)?;
                Ok(Item::Extern(decl))
            }
            Token::Struct => self.parse_struct(),
            Token::Fn => {
                let mut decl = self.parse_function_header()?;
                decl.body = self.parse_block()?;
                Ok(Item::Function(decl))
            }
            _ => Err(self.error(format!(
                "Expected 'fn', 'extern' or 'struct', got '{}'",
                self.current()
            ))),
        }
    }

    fn parse_function_header(&mut self) -> ParseResult<FunctionDecl> {
        self.expect(Token::Fn)?;
        let name = self.expect_identifier("function name")?;

        self.expect(Token::OpenParen)?;
        let params = self.parse_parameters()?;
        self.expect(Token::CloseParen)?;

        let return_type = if self.current() == &Token::Arrow {
            self.advance();
            Some(self.parse_type()?)
        } else {
            None
        };

        Ok(FunctionDecl {
            name,
            params,
            return_type,
            body: Vec::new(),
        })
    }

    fn parse_struct(&mut self) -> ParseResult<Item> {
        self.expect(Token::Struct)?;
        let name = self.expect_identifier("struct name")?;
        self.expect(Token::OpenBrace)?;

        let mut fields = Vec::new();
        while self.current() != &Token::CloseBrace {
            let field_name = self.expect_identifier("field name")?;
            self.expect(Token::Colon)?;
            let field_type = self.parse_type()?;
            self.expect(Token::Semicolon)?;
            fields.push(Parameter {
                name: field_name,
                param_type: field_type,
            });
        }

        self.expect(Token::CloseBrace)?;
        Ok(Item::Struct(StructDecl { name, fields }))
    }

    /// Parses a type descriptor and returns its canonical text, e.g. `u8(16)`
    /// or `i32**`.
    fn parse_type(&mut self) -> ParseResult<String> {
        let mut descriptor = self.expect_identifier("type name")?;

        loop {
            match self.current() {
                Token::Star => {
                    self.advance();
                    descriptor.push('*');
                }
                Token::OpenParen => {
                    let count = match self.peek() {
                        Token::IntLiteral(n) => *n,
                        _ => break,
                    };
                    self.advance();
                    self.advance();
                    self.expect(Token::CloseParen)?;
                    descriptor.push_str(&format!("({})", count));
                }
                _ => break,
            }
        }

        Ok(descriptor)
    }

    fn parse_parameters(&mut self) -> ParseResult<Vec<Parameter>> {
        let mut params = Vec::new();

        if self.current() == &Token::CloseParen {
            return Ok(params);
        }

        loop {
            let name = self.expect_identifier("parameter name")?;
            self.expect(Token::Colon)?;
            let param_type = self.parse_type()?;
            params.push(Parameter { name, param_type });

            if self.current() == &Token::Comma {
                self.advance();
            } else {
                break;
            }
        }

        Ok(params)
    }

    fn parse_block(&mut self) -> ParseResult<Block> {
        self.expect(Token::OpenBrace)?;

        let mut statements = Vec::new();
        while self.current() != &Token::CloseBrace {
            if self.is_at_end() {
                return Err(self.error("Expected '}', got end of file".to_string()));
            }
            statements.push(self.parse_statement()?);
        }

        self.expect(Token::CloseBrace)?;
        Ok(statements)
    }

    fn parse_statement(&mut self) -> ParseResult<Stmt> {
        match self.current() {
            Token::Var => {
                let decl = self.parse_var_decl()?;
                self.expect(Token::Semicolon)?;
                Ok(decl)
            }
            Token::If => self.parse_if(),
            Token::While => {
                self.advance();
                self.expect(Token::OpenParen)?;
                let condition = self.parse_expression()?;
                self.expect(Token::CloseParen)?;
                let body = self.parse_block()?;
                Ok(Stmt::While { condition, body })
            }
            Token::For => self.parse_for(),
            Token::Break => {
                self.advance();
                self.expect(Token::Semicolon)?;
                Ok(Stmt::Break)
            }
            Token::Continue => {
                self.advance();
                self.expect(Token::Semicolon)?;
                Ok(Stmt::Continue)
            }
            Token::Return => {
                self.advance();
                let expr = if self.current() == &Token::Semicolon {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.expect(Token::Semicolon)?;
                Ok(Stmt::Return(expr))
            }
            _ => {
                let stmt = self.parse_simple_statement()?;
                self.expect(Token::Semicolon)?;
                Ok(stmt)
            }
        }
    }

    fn parse_var_decl(&mut self) -> ParseResult<Stmt> {
        self.expect(Token::Var)?;
        let name = self.expect_identifier("variable name")?;
        self.expect(Token::Colon)?;
        let var_type = self.parse_type()?;

        let init = if self.current() == &Token::Equals {
            self.advance();
            Some(self.parse_expression()?)
        } else {
            None
        };

        Ok(Stmt::VarDecl {
            name,
            var_type,
            init,
        })
    }

    /// Assignments, `x++`/`x--` and call statements, without the trailing `;`.
    fn parse_simple_statement(&mut self) -> ParseResult<Stmt> {
        if self.current() == &Token::Star {
            self.advance();
            let target = self.parse_unary()?;
            self.expect(Token::Equals)?;
            let value = self.parse_expression()?;
            return Ok(match target {
                Expr::Symbol(name) => Stmt::DerefAssign { name, value },
                target => Stmt::DerefExprAssign { target, value },
            });
        }

        let name = self.expect_identifier("statement")?;
        match self.current() {
            Token::Equals => {
                self.advance();
                let value = self.parse_expression()?;
                Ok(Stmt::Assign { name, value })
            }
            Token::PlusPlus => {
                self.advance();
                Ok(Stmt::Step {
                    op: StepOp::Increment,
                    name,
                })
            }
            Token::MinusMinus => {
                self.advance();
                Ok(Stmt::Step {
                    op: StepOp::Decrement,
                    name,
                })
            }
            Token::OpenParen => Ok(Stmt::Call(self.parse_call(name)?)),
            _ => Err(self.error(format!(
                "Expected '=', '++', '--' or '(' after '{}', got '{}'",
                name,
                self.current()
            ))),
        }
    }

    fn parse_if(&mut self) -> ParseResult<Stmt> {
        self.expect(Token::If)?;
        self.expect(Token::OpenParen)?;
        let condition = self.parse_expression()?;
        self.expect(Token::CloseParen)?;
        let then_block = self.parse_block()?;

        let mut else_ifs = Vec::new();
        let mut else_block = None;

        while self.current() == &Token::Else {
            self.advance();
            if self.current() == &Token::If {
                self.advance();
                self.expect(Token::OpenParen)?;
                let condition = self.parse_expression()?;
                self.expect(Token::CloseParen)?;
                let body = self.parse_block()?;
                else_ifs.push(ElseIf { condition, body });
            } else {
                else_block = Some(self.parse_block()?);
                break;
            }
        }

        Ok(Stmt::If {
            condition,
            then_block,
            else_ifs,
            else_block,
        })
    }

    fn parse_for(&mut self) -> ParseResult<Stmt> {
        self.expect(Token::For)?;
        self.expect(Token::OpenParen)?;

        let init = match self.current() {
            Token::Semicolon => None,
            Token::Var => Some(Box::new(self.parse_var_decl()?)),
            _ => Some(Box::new(self.parse_simple_statement()?)),
        };
        self.expect(Token::Semicolon)?;

        let condition = if self.current() == &Token::Semicolon {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(Token::Semicolon)?;

        let increment = if self.current() == &Token::CloseParen {
            None
        } else {
            Some(Box::new(self.parse_simple_statement()?))
        };
        self.expect(Token::CloseParen)?;

        let body = self.parse_block()?;

        Ok(Stmt::For {
            init,
            condition,
            increment,
            body,
        })
    }

    fn parse_expression(&mut self) -> ParseResult<Expr> {
        self.parse_logical_or()
    }

    fn parse_logical_or(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_logical_and()?;

        while self.current() == &Token::LogicalOr {
            self.advance();
            let right = self.parse_logical_and()?;
            left = Expr::binary(BinOp::LogicalOr, left, right);
        }

        Ok(left)
    }

    fn parse_logical_and(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_equality()?;

        while self.current() == &Token::LogicalAnd {
            self.advance();
            let right = self.parse_equality()?;
            left = Expr::binary(BinOp::LogicalAnd, left, right);
        }

        Ok(left)
    }

    fn parse_equality(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_relational()?;

        while matches!(self.current(), Token::EqualEqual | Token::NotEqual) {
            let op = match self.current() {
                Token::EqualEqual => BinOp::EqualEqual,
                Token::NotEqual => BinOp::NotEqual,
                _ => unreachable!(),
            };
            self.advance();
            let right = self.parse_relational()?;
            left = Expr::binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_relational(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_additive()?;

        while matches!(
            self.current(),
            Token::Less | Token::LessEqual | Token::Greater | Token::GreaterEqual
        ) {
            let op = match self.current() {
                Token::Less => BinOp::Less,
                Token::LessEqual => BinOp::LessEqual,
                Token::Greater => BinOp::Greater,
                Token::GreaterEqual => BinOp::GreaterEqual,
                _ => unreachable!(),
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_multiplicative()?;

        while matches!(self.current(), Token::Plus | Token::Minus) {
            let op = match self.current() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Subtract,
                _ => unreachable!(),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_cast()?;

        while matches!(self.current(), Token::Star | Token::Slash) {
            let op = match self.current() {
                Token::Star => BinOp::Multiply,
                Token::Slash => BinOp::Divide,
                _ => unreachable!(),
            };
            self.advance();
            let right = self.parse_cast()?;
            left = Expr::binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_cast(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_unary()?;

        while self.current() == &Token::As {
            self.advance();
            let target = self.parse_type()?;
            expr = Expr::Cast {
                expr: Box::new(expr),
                target,
            };
        }

        Ok(expr)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        match self.current() {
            Token::Minus => {
                self.advance();
                Ok(Expr::Negate(Box::new(self.parse_unary()?)))
            }
            Token::Star => {
                self.advance();
                Ok(Expr::Deref(Box::new(self.parse_unary()?)))
            }
            Token::Ampersand => {
                self.advance();
                let name = self.expect_identifier("symbol after '&'")?;
                Ok(Expr::AddressOf(name))
            }
            Token::PlusPlus | Token::MinusMinus => {
                let op = if self.current() == &Token::PlusPlus {
                    StepOp::Increment
                } else {
                    StepOp::Decrement
                };
                self.advance();
                let name = self.expect_identifier("symbol after prefix operator")?;
                Ok(Expr::Step {
                    op,
                    order: StepOrder::Prefix,
                    operand: Box::new(Expr::Symbol(name)),
                })
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        if let Token::Identifier(name) = self.current() {
            let name = name.clone();
            match self.peek() {
                Token::PlusPlus | Token::MinusMinus => {
                    self.advance();
                    let op = if self.current() == &Token::PlusPlus {
                        StepOp::Increment
                    } else {
                        StepOp::Decrement
                    };
                    self.advance();
                    return Ok(Expr::Step {
                        op,
                        order: StepOrder::Postfix,
                        operand: Box::new(Expr::Symbol(name)),
                    });
                }
                Token::OpenParen => {
                    self.advance();
                    return self.parse_call(name);
                }
                _ => {}
            }
        }
        self.parse_primary()
    }

    /// Parses `(args)` after an already-consumed function name.
    fn parse_call(&mut self, name: String) -> ParseResult<Expr> {
        self.expect(Token::OpenParen)?;
        let args = self.parse_arguments()?;
        self.expect(Token::CloseParen)?;
        Ok(Expr::Call { name, args })
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        match self.current() {
            Token::IntLiteral(n) => {
                let val = *n;
                self.advance();
                Ok(Expr::IntLiteral(val))
            }
            Token::StringLiteral(s) => {
                let literal = s.clone();
                self.advance();
                Ok(Expr::StringLiteral(literal))
            }
            Token::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(Expr::Symbol(name))
            }
            Token::OpenParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(Token::CloseParen)?;
                Ok(expr)
            }
            _ => Err(self.error(format!("Expected expression, got '{}'", self.current()))),
        }
    }

    fn parse_arguments(&mut self) -> ParseResult<Vec<Expr>> {
        let mut args = Vec::new();

        if self.current() == &Token::CloseParen {
            return Ok(args);
        }

        loop {
            args.push(self.parse_expression()?);

            if self.current() == &Token::Comma {
                self.advance();
            } else {
                break;
            }
        }

        Ok(args)
    }

    fn current(&self) -> &Token {
        &self.tokens[self.position.min(self.tokens.len() - 1)].token
    }

    fn peek(&self) -> &Token {
        &self.tokens[(self.position + 1).min(self.tokens.len() - 1)].token
    }

    fn location(&self) -> SourceLocation {
        self.tokens[self.position.min(self.tokens.len() - 1)].location
    }

    fn error(&self, message: String) -> CompileError {
        CompileError::with_location(message, self.location())
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            self.position += 1;
        }
    }

    fn expect(&mut self, expected: Token) -> ParseResult<()> {
        if self.current() == &expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("Expected '{}', got '{}'", expected, self.current())))
        }
    }

    fn expect_identifier(&mut self, what: &str) -> ParseResult<String> {
        match self.current() {
            Token::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error(format!("Expected {}, got '{}'", what, self.current()))),
        }
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.tokens.len() || self.current() == &Token::Eof
    }
}
