use crate::error::CompileError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize) -> Self {
        SourceLocation { line, column }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    Fn,
    Extern,
    Struct,
    Var,
    Return,
    If,
    Else,
    While,
    For,
    Break,
    Continue,
    As,

    // Identifiers and literals
    Identifier(String),
    IntLiteral(i64),
    /// Raw literal text between the quotes, escapes left untranslated.
    StringLiteral(String),

    // Punctuation
    OpenParen,
    CloseParen,
    OpenBrace,
    CloseBrace,
    Semicolon,
    Comma,
    Colon,
    Arrow,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Equals,
    Ampersand,
    PlusPlus,
    MinusMinus,

    // Comparison operators
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    EqualEqual,
    NotEqual,

    // Logical operators
    LogicalAnd,
    LogicalOr,

    // Special
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::Fn => write!(f, "fn"),
            Token::Extern => write!(f, "extern"),
            Token::Struct => write!(f, "struct"),
            Token::Var => write!(f, "var"),
            Token::Return => write!(f, "return"),
            Token::If => write!(f, "if"),
            Token::Else => write!(f, "else"),
            Token::While => write!(f, "while"),
            Token::For => write!(f, "for"),
            Token::Break => write!(f, "break"),
            Token::Continue => write!(f, "continue"),
            Token::As => write!(f, "as"),
            Token::Identifier(s) => write!(f, "Identifier({})", s),
            Token::IntLiteral(n) => write!(f, "IntLiteral({})", n),
            Token::StringLiteral(s) => write!(f, "StringLiteral(\"{}\")", s),
            Token::OpenParen => write!(f, "("),
            Token::CloseParen => write!(f, ")"),
            Token::OpenBrace => write!(f, "{{"),
            Token::CloseBrace => write!(f, "}}"),
            Token::Semicolon => write!(f, ";"),
            Token::Comma => write!(f, ","),
            Token::Colon => write!(f, ":"),
            Token::Arrow => write!(f, "->"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Equals => write!(f, "="),
            Token::Ampersand => write!(f, "&"),
            Token::PlusPlus => write!(f, "++"),
            Token::MinusMinus => write!(f, "--"),
            Token::Less => write!(f, "<"),
            Token::Greater => write!(f, ">"),
            Token::LessEqual => write!(f, "<="),
            Token::GreaterEqual => write!(f, ">="),
            Token::EqualEqual => write!(f, "=="),
            Token::NotEqual => write!(f, "!="),
            Token::LogicalAnd => write!(f, "&&"),
            Token::LogicalOr => write!(f, "||"),
            Token::Eof => write!(f, "EOF"),
        }
    }
}

/// A token together with where it starts in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub location: SourceLocation,
}

impl fmt::Display for SpannedToken {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.location, self.token)
    }
}

pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<SpannedToken>, CompileError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace_and_comments();
            let location = self.location();
            let token = self.next_token()?;
            let done = token == Token::Eof;
            tokens.push(SpannedToken { token, location });
            if done {
                break;
            }
        }

        Ok(tokens)
    }

    fn location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column)
    }

    fn error(&self, message: String) -> CompileError {
        CompileError::with_location(message, self.location())
    }

    fn next_token(&mut self) -> Result<Token, CompileError> {
        if self.is_at_end() {
            return Ok(Token::Eof);
        }

        let ch = self.current_char();

        match ch {
            '(' => self.single(Token::OpenParen),
            ')' => self.single(Token::CloseParen),
            '{' => self.single(Token::OpenBrace),
            '}' => self.single(Token::CloseBrace),
            ';' => self.single(Token::Semicolon),
            ',' => self.single(Token::Comma),
            ':' => self.single(Token::Colon),
            '*' => self.single(Token::Star),
            '/' => self.single(Token::Slash),
            '+' => {
                self.advance();
                if self.match_char('+') {
                    Ok(Token::PlusPlus)
                } else {
                    Ok(Token::Plus)
                }
            }
            '-' => {
                self.advance();
                if self.match_char('-') {
                    Ok(Token::MinusMinus)
                } else if self.match_char('>') {
                    Ok(Token::Arrow)
                } else {
                    Ok(Token::Minus)
                }
            }
            '=' => {
                self.advance();
                if self.match_char('=') {
                    Ok(Token::EqualEqual)
                } else {
                    Ok(Token::Equals)
                }
            }
            '<' => {
                self.advance();
                if self.match_char('=') {
                    Ok(Token::LessEqual)
                } else {
                    Ok(Token::Less)
                }
            }
            '>' => {
                self.advance();
                if self.match_char('=') {
                    Ok(Token::GreaterEqual)
                } else {
                    Ok(Token::Greater)
                }
            }
            '!' => {
                self.advance();
                if self.match_char('=') {
                    Ok(Token::NotEqual)
                } else {
                    Err(self.error("Unexpected character: '!' (did you mean !=?)".to_string()))
                }
            }
            '&' => {
                self.advance();
                if self.match_char('&') {
                    Ok(Token::LogicalAnd)
                } else {
                    Ok(Token::Ampersand)
                }
            }
            '|' => {
                self.advance();
                if self.match_char('|') {
                    Ok(Token::LogicalOr)
                } else {
                    Err(self.error("Unexpected character: '|' (use || for logical OR)".to_string()))
                }
            }
            '"' => self.read_string(),
            _ if ch.is_ascii_digit() => self.read_number(),
            _ if ch.is_ascii_alphabetic() || ch == '_' => self.read_identifier(),
            _ => Err(self.error(format!("Unexpected character: '{}'", ch))),
        }
    }

    fn single(&mut self, token: Token) -> Result<Token, CompileError> {
        self.advance();
        Ok(token)
    }

    fn match_char(&mut self, expected: char) -> bool {
        if !self.is_at_end() && self.current_char() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        while !self.is_at_end() {
            let ch = self.current_char();
            if ch.is_whitespace() {
                self.advance();
            } else if ch == '/' && self.peek_char() == Some('/') {
                while !self.is_at_end() && self.current_char() != '\n' {
                    self.advance();
                }
            } else {
                break;
            }
        }
    }

    fn read_number(&mut self) -> Result<Token, CompileError> {
        let location = self.location();
        let start = self.position;
        while !self.is_at_end() && self.current_char().is_ascii_digit() {
            self.advance();
        }
        let num_str: String = self.input[start..self.position].iter().collect();
        let num = num_str.parse::<i64>().map_err(|_| {
            CompileError::with_location(format!("Invalid number: {}", num_str), location)
        })?;
        Ok(Token::IntLiteral(num))
    }

    fn read_string(&mut self) -> Result<Token, CompileError> {
        let location = self.location();
        self.advance();
        let mut literal = String::new();
        loop {
            if self.is_at_end() || self.current_char() == '\n' {
                return Err(CompileError::with_location(
                    "Unterminated string literal".to_string(),
                    location,
                ));
            }
            let ch = self.current_char();
            self.advance();
            match ch {
                '"' => break,
                '\\' => {
                    if self.is_at_end() {
                        continue;
                    }
                    literal.push('\\');
                    literal.push(self.current_char());
                    self.advance();
                }
                _ => literal.push(ch),
            }
        }
        Ok(Token::StringLiteral(literal))
    }

    fn read_identifier(&mut self) -> Result<Token, CompileError> {
        let start = self.position;
        while !self.is_at_end() {
            let ch = self.current_char();
            if ch.is_ascii_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }
        let ident: String = self.input[start..self.position].iter().collect();

        let token = match ident.as_str() {
            "fn" => Token::Fn,
            "extern" => Token::Extern,
            "struct" => Token::Struct,
            "var" => Token::Var,
            "return" => Token::Return,
            "if" => Token::If,
            "else" => Token::Else,
            "while" => Token::While,
            "for" => Token::For,
            "break" => Token::Break,
            "continue" => Token::Continue,
            "as" => Token::As,
            _ => Token::Identifier(ident),
        };

        Ok(token)
    }

    fn current_char(&self) -> char {
        self.input[self.position]
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn advance(&mut self) {
        if self.input[self.position] == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        self.position += 1;
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }
}
