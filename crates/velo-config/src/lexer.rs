//! Lexical analysis for the build-description grammar
//!
//! The lexer converts build-description text into a stream of tokens with
//! line/column information. Backtick strings keep their raw content
//! (including `&{NAME}` placeholders); the parser splits them into segments.

use crate::diagnostic::Diagnostic;

/// Kind of a lexed token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Colon,
    Comma,
    /// Backtick string literal; lexeme is the raw content without delimiters
    Str,
    /// Unquoted identifier (alpha or underscore, then alnum or dot)
    Ident,
    /// Signed integer literal
    Int,
    True,
    False,
    Null,
    Eof,
    /// Lexical error; lexeme carries the message
    Invalid,
}

/// A lexed token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: u32,
    pub column: u32,
}

impl Token {
    fn new(kind: TokenKind, lexeme: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
            line,
            column,
        }
    }
}

/// Lexer state for tokenizing build-description source
pub struct Lexer {
    chars: Vec<char>,
    current: usize,
    line: u32,
    column: u32,
    start_line: u32,
    start_column: u32,
    file: String,
    diagnostics: Vec<Diagnostic>,
}

impl Lexer {
    /// Create a new lexer for the given source text
    pub fn new(source: &str, file: impl Into<String>) -> Self {
        Self {
            chars: source.chars().collect(),
            current: 0,
            line: 1,
            column: 1,
            start_line: 1,
            start_column: 1,
            file: file.into(),
            diagnostics: Vec::new(),
        }
    }

    /// Tokenize the entire source, returning tokens and any diagnostics
    pub fn tokenize(mut self) -> (Vec<Token>, Vec<Diagnostic>) {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        (tokens, self.diagnostics)
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.chars.len()
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            '\0'
        } else {
            self.chars[self.current]
        }
    }

    fn peek_next(&self) -> char {
        if self.current + 1 >= self.chars.len() {
            '\0'
        } else {
            self.chars[self.current + 1]
        }
    }

    fn advance(&mut self) -> char {
        let c = self.chars[self.current];
        self.current += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    fn skip_whitespace_and_comments(&mut self) {
        while !self.is_at_end() {
            match self.peek() {
                ' ' | '\t' | '\r' | '\n' => {
                    self.advance();
                }
                '/' if self.peek_next() == '/' => {
                    while !self.is_at_end() && self.peek() != '\n' {
                        self.advance();
                    }
                }
                _ => return,
            }
        }
    }

    fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();

        self.start_line = self.line;
        self.start_column = self.column;

        if self.is_at_end() {
            return self.make(TokenKind::Eof, "");
        }

        let c = self.advance();
        match c {
            '{' => self.make(TokenKind::LeftBrace, "{"),
            '}' => self.make(TokenKind::RightBrace, "}"),
            '[' => self.make(TokenKind::LeftBracket, "["),
            ']' => self.make(TokenKind::RightBracket, "]"),
            ':' => self.make(TokenKind::Colon, ":"),
            ',' => self.make(TokenKind::Comma, ","),
            '`' => self.string(),
            '-' if self.peek().is_ascii_digit() => self.number(true),
            c if c.is_ascii_digit() => self.number(false),
            c if c.is_ascii_alphabetic() || c == '_' => self.identifier(c),
            c => self.error_token(format!("unexpected character '{}'", c)),
        }
    }

    /// Scan a backtick string. The content is kept verbatim; `&{NAME}`
    /// placeholders are split out by the parser. No escape sequences.
    fn string(&mut self) -> Token {
        let mut content = String::new();
        while !self.is_at_end() && self.peek() != '`' {
            content.push(self.advance());
        }
        if self.is_at_end() {
            return self.error_token("unterminated string literal");
        }
        self.advance(); // closing backtick
        Token::new(TokenKind::Str, content, self.start_line, self.start_column)
    }

    fn number(&mut self, negative: bool) -> Token {
        let mut text = String::new();
        if negative {
            text.push('-');
        } else {
            text.push(self.chars[self.current - 1]);
        }
        while self.peek().is_ascii_digit() {
            text.push(self.advance());
        }
        Token::new(TokenKind::Int, text, self.start_line, self.start_column)
    }

    fn identifier(&mut self, first: char) -> Token {
        let mut text = String::new();
        text.push(first);
        while self.peek().is_ascii_alphanumeric() || self.peek() == '_' || self.peek() == '.' {
            text.push(self.advance());
        }

        let kind = match text.as_str() {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            _ => TokenKind::Ident,
        };
        Token::new(kind, text, self.start_line, self.start_column)
    }

    fn make(&self, kind: TokenKind, lexeme: &str) -> Token {
        Token::new(kind, lexeme, self.start_line, self.start_column)
    }

    fn error_token(&mut self, message: impl Into<String>) -> Token {
        let message = message.into();
        self.diagnostics.push(Diagnostic::error(
            message.clone(),
            self.file.clone(),
            self.start_line,
            self.start_column,
        ));
        Token::new(TokenKind::Invalid, message, self.start_line, self.start_column)
    }
}
