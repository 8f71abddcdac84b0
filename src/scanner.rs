use phf::phf_map;

use crate::error::Diagnostics;

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum TokenType {
    // Single-character tokens.
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Comma,
    Dot,
    Minus,
    Plus,
    Semicolon,
    Slash,
    Star,
    Question,
    Colon,

    // One or two character tokens.
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    // Literals.
    Identifier,
    String,
    Number,

    // Keywords.
    And,
    Break,
    Class,
    Continue,
    Else,
    False,
    Fun,
    For,
    If,
    Nil,
    Or,
    Print,
    Return,
    Super,
    This,
    True,
    Var,
    While,

    Eof,
}

#[derive(Debug, Clone)]
pub enum Literal {
    Identifier(String),
    Str(String),
    Number(f64),
}

#[derive(Debug, Clone)]
pub struct Token {
    pub ty: TokenType,
    pub lexeme: String,
    pub literal: Option<Literal>,
    pub line: usize,
}

static KEYWORDS: phf::Map<&'static str, TokenType> = phf_map! {
    "and" => TokenType::And,
    "break" => TokenType::Break,
    "class" => TokenType::Class,
    "continue" => TokenType::Continue,
    "else" => TokenType::Else,
    "false" => TokenType::False,
    "fun" => TokenType::Fun,
    "for" => TokenType::For,
    "if" => TokenType::If,
    "nil" => TokenType::Nil,
    "or" => TokenType::Or,
    "print" => TokenType::Print,
    "return" => TokenType::Return,
    "super" => TokenType::Super,
    "this" => TokenType::This,
    "true" => TokenType::True,
    "var" => TokenType::Var,
    "while" => TokenType::While,
};

/// Scans `source` into a token list terminated by exactly one `Eof` token.
/// Lexical errors go to the sink and scanning continues at the next
/// character, so the parser always has tokens to work with.
pub fn scan_tokens(source: &str, sink: &mut Diagnostics) -> Vec<Token> {
    let mut scanner = Scanner::new(source, sink);
    scanner.scan();
    scanner.tokens
}

struct Scanner<'a> {
    source: Vec<u8>,
    tokens: Vec<Token>,
    sink: &'a mut Diagnostics,
    start: usize,
    current: usize,
    line: usize,
}

impl<'a> Scanner<'a> {
    fn new(source: &str, sink: &'a mut Diagnostics) -> Scanner<'a> {
        Scanner {
            source: source.as_bytes().to_vec(),
            tokens: Vec::new(),
            sink,
            start: 0,
            current: 0,
            line: 1,
        }
    }

    fn scan(&mut self) {
        while !self.is_at_end() {
            self.start = self.current;
            self.scan_token();
        }

        self.tokens.push(Token {
            ty: TokenType::Eof,
            lexeme: String::new(),
            literal: None,
            line: self.line,
        });
    }

    fn scan_token(&mut self) {
        let c = self.advance();

        match c {
            b'(' => self.add_token(TokenType::LeftParen),
            b')' => self.add_token(TokenType::RightParen),
            b'{' => self.add_token(TokenType::LeftBrace),
            b'}' => self.add_token(TokenType::RightBrace),
            b',' => self.add_token(TokenType::Comma),
            b'.' => self.add_token(TokenType::Dot),
            b'-' => self.add_token(TokenType::Minus),
            b'+' => self.add_token(TokenType::Plus),
            b';' => self.add_token(TokenType::Semicolon),
            b'*' => self.add_token(TokenType::Star),
            b'?' => self.add_token(TokenType::Question),
            b':' => self.add_token(TokenType::Colon),
            b'!' => {
                let ty = if self.matches(b'=') {
                    TokenType::BangEqual
                } else {
                    TokenType::Bang
                };
                self.add_token(ty)
            }
            b'=' => {
                let ty = if self.matches(b'=') {
                    TokenType::EqualEqual
                } else {
                    TokenType::Equal
                };
                self.add_token(ty)
            }
            b'<' => {
                let ty = if self.matches(b'=') {
                    TokenType::LessEqual
                } else {
                    TokenType::Less
                };
                self.add_token(ty)
            }
            b'>' => {
                let ty = if self.matches(b'=') {
                    TokenType::GreaterEqual
                } else {
                    TokenType::Greater
                };
                self.add_token(ty)
            }
            b'/' => {
                if self.matches(b'/') {
                    while self.peek() != b'\n' && !self.is_at_end() {
                        self.advance();
                    }
                } else if self.matches(b'*') {
                    self.block_comment();
                } else {
                    self.add_token(TokenType::Slash)
                }
            }
            b' ' | b'\r' | b'\t' => {}
            b'\n' => self.line += 1,
            b'"' => self.string(),
            _ => {
                if c.is_ascii_digit() {
                    self.number()
                } else if is_alpha(c) {
                    self.identifier()
                } else {
                    self.sink.error(self.line, "Unexpected character.")
                }
            }
        }
    }

    // Block comments don't nest. Strings are scanned as their own state, so
    // a "*/" inside a string literal never terminates a comment.
    fn block_comment(&mut self) {
        while !self.is_at_end() {
            if self.peek() == b'*' && self.peek_next() == b'/' {
                self.advance();
                self.advance();
                return;
            }
            if self.peek() == b'\n' {
                self.line += 1;
            }
            self.advance();
        }
        self.sink.error(self.line, "Unterminated block comment.");
    }

    fn string(&mut self) {
        while self.peek() != b'"' && !self.is_at_end() {
            if self.peek() == b'\n' {
                self.line += 1;
            }
            self.advance();
        }

        if self.is_at_end() {
            self.sink.error(self.line, "Unterminated string.");
            return;
        }

        // The closing quote.
        self.advance();

        let content =
            String::from_utf8_lossy(&self.source[self.start + 1..self.current - 1]).into_owned();
        self.add_literal_token(TokenType::String, Literal::Str(content));
    }

    fn number(&mut self) {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        if self.peek() == b'.' && self.peek_next().is_ascii_digit() {
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let text = String::from_utf8_lossy(&self.source[self.start..self.current]).into_owned();
        match text.parse::<f64>() {
            Ok(value) => self.add_literal_token(TokenType::Number, Literal::Number(value)),
            Err(_) => panic!("internal scanner error: bad number lexeme '{}'", text),
        }
    }

    fn identifier(&mut self) {
        while is_alphanumeric(self.peek()) {
            self.advance();
        }

        let text = String::from_utf8_lossy(&self.source[self.start..self.current]).into_owned();
        match KEYWORDS.get(text.as_str()) {
            Some(keyword) => self.add_token(*keyword),
            None => self.add_literal_token(TokenType::Identifier, Literal::Identifier(text)),
        }
    }

    fn advance(&mut self) -> u8 {
        let c = self.source[self.current];
        self.current += 1;
        c
    }

    fn matches(&mut self, expected: u8) -> bool {
        if self.is_at_end() || self.source[self.current] != expected {
            return false;
        }
        self.current += 1;
        true
    }

    fn peek(&self) -> u8 {
        if self.is_at_end() {
            return b'\0';
        }
        self.source[self.current]
    }

    fn peek_next(&self) -> u8 {
        if self.current + 1 >= self.source.len() {
            return b'\0';
        }
        self.source[self.current + 1]
    }

    fn add_token(&mut self, ty: TokenType) {
        self.push_token(ty, None)
    }

    fn add_literal_token(&mut self, ty: TokenType, literal: Literal) {
        self.push_token(ty, Some(literal))
    }

    fn push_token(&mut self, ty: TokenType, literal: Option<Literal>) {
        let lexeme = String::from_utf8_lossy(&self.source[self.start..self.current]).into_owned();
        self.tokens.push(Token {
            ty,
            lexeme,
            literal,
            line: self.line,
        });
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }
}

fn is_alpha(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_alphanumeric(c: u8) -> bool {
    is_alpha(c) || c.is_ascii_digit()
}
