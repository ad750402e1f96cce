//! Recursive-descent parser for the build-description grammar
//!
//! Produces an arena-backed AST plus a list of diagnostics. Errors use
//! panic-mode synchronization: the parser records a diagnostic, then skips
//! tokens until the next closing brace/bracket or an `IDENT ':'` lookahead
//! that plausibly starts the next member, so one malformed value does not
//! hide every later problem.

use crate::ast::{Arena, Node, NodeId, Segment, StringValue};
use crate::diagnostic::Diagnostic;
use crate::lexer::{Lexer, Token, TokenKind};

/// A parsed build-description document
#[derive(Debug)]
pub struct Document {
    pub arena: Arena,
    /// Top-level object, absent when the document failed to parse at all
    pub root: Option<NodeId>,
}

impl Document {
    /// The `project` section, if present
    pub fn project(&self) -> Option<NodeId> {
        self.root.and_then(|root| self.arena.member(root, "project"))
    }

    /// The global `variables` section, if present
    pub fn variables(&self) -> Option<NodeId> {
        self.root.and_then(|root| self.arena.member(root, "variables"))
    }

    /// The `targets` array, if present
    pub fn targets(&self) -> Option<NodeId> {
        self.root.and_then(|root| self.arena.member(root, "targets"))
    }
}

/// Parse build-description text into a document and diagnostics
pub fn parse_document(source: &str, file: &str) -> (Document, Vec<Diagnostic>) {
    let (tokens, mut diagnostics) = Lexer::new(source, file).tokenize();
    let mut parser = Parser {
        tokens,
        pos: 0,
        arena: Arena::new(),
        diagnostics: Vec::new(),
        panic_mode: false,
        file: file.to_string(),
    };

    let root = parser.parse_root();
    diagnostics.append(&mut parser.diagnostics);

    (
        Document {
            arena: parser.arena,
            root,
        },
        diagnostics,
    )
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    arena: Arena,
    diagnostics: Vec<Diagnostic>,
    panic_mode: bool,
    file: String,
}

impl Parser {
    fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn next(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + 1).min(last)]
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error_at_current(&mut self, message: impl Into<String>) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        let token = self.current();
        self.diagnostics.push(Diagnostic::error(
            message,
            self.file.clone(),
            token.line,
            token.column,
        ));
    }

    /// Skip tokens until a plausible recovery point
    fn synchronize(&mut self) {
        self.panic_mode = false;
        while !self.check(TokenKind::Eof) {
            match self.current().kind {
                TokenKind::RightBrace | TokenKind::RightBracket => {
                    self.advance();
                    return;
                }
                TokenKind::Ident if self.next().kind == TokenKind::Colon => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn parse_root(&mut self) -> Option<NodeId> {
        if !self.check(TokenKind::LeftBrace) {
            self.error_at_current("expected '{' at start of build description");
            return None;
        }
        let root = self.parse_object();
        if !self.check(TokenKind::Eof) {
            self.error_at_current("expected end of file after top-level object");
        }
        root
    }

    fn parse_value(&mut self) -> Option<NodeId> {
        match self.current().kind {
            TokenKind::LeftBrace => self.parse_object(),
            TokenKind::LeftBracket => self.parse_array(),
            TokenKind::Str => self.parse_string(),
            TokenKind::Int => {
                let token = self.advance();
                let value: i64 = token.lexeme.parse().unwrap_or_else(|_| {
                    // out-of-range digits clamp rather than abort the parse
                    if token.lexeme.starts_with('-') {
                        i64::MIN
                    } else {
                        i64::MAX
                    }
                });
                Some(self.arena.alloc(Node::Int(value), token.line, token.column))
            }
            TokenKind::True => {
                let token = self.advance();
                Some(self.arena.alloc(Node::Bool(true), token.line, token.column))
            }
            TokenKind::False => {
                let token = self.advance();
                Some(self.arena.alloc(Node::Bool(false), token.line, token.column))
            }
            TokenKind::Null => {
                let token = self.advance();
                Some(self.arena.alloc(Node::Null, token.line, token.column))
            }
            // Bare identifiers in value position read as literal strings
            TokenKind::Ident => {
                let token = self.advance();
                Some(self.arena.alloc(
                    Node::Str(StringValue::Literal(token.lexeme)),
                    token.line,
                    token.column,
                ))
            }
            _ => {
                self.error_at_current("expected value");
                None
            }
        }
    }

    fn parse_object(&mut self) -> Option<NodeId> {
        let open = self.advance(); // '{'
        debug_assert_eq!(open.kind, TokenKind::LeftBrace);

        let mut members: Vec<(String, NodeId)> = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            let key = match self.current().kind {
                TokenKind::Ident | TokenKind::Str => self.advance().lexeme,
                _ => {
                    self.error_at_current("expected key (identifier or string)");
                    self.synchronize();
                    continue;
                }
            };

            if !self.matches(TokenKind::Colon) {
                self.error_at_current("expected ':' after key");
                self.synchronize();
                continue;
            }

            let Some(value) = self.parse_value() else {
                self.synchronize();
                continue;
            };
            members.push((key, value));

            if self.matches(TokenKind::Comma) {
                continue; // trailing comma permitted
            }
            if !self.check(TokenKind::RightBrace) {
                self.error_at_current("expected ',' or '}' after value");
                self.synchronize();
            }
        }

        if !self.matches(TokenKind::RightBrace) {
            self.error_at_current("expected '}'");
        }
        Some(self.arena.alloc(Node::Object(members), open.line, open.column))
    }

    fn parse_array(&mut self) -> Option<NodeId> {
        let open = self.advance(); // '['
        debug_assert_eq!(open.kind, TokenKind::LeftBracket);

        let mut elements = Vec::new();
        while !self.check(TokenKind::RightBracket) && !self.check(TokenKind::Eof) {
            let Some(element) = self.parse_value() else {
                self.synchronize();
                continue;
            };
            elements.push(element);

            if self.matches(TokenKind::Comma) {
                continue;
            }
            if !self.check(TokenKind::RightBracket) {
                self.error_at_current("expected ',' or ']' after element");
                self.synchronize();
            }
        }

        if !self.matches(TokenKind::RightBracket) {
            self.error_at_current("expected ']'");
        }
        Some(self.arena.alloc(Node::Array(elements), open.line, open.column))
    }

    fn parse_string(&mut self) -> Option<NodeId> {
        let token = self.advance();
        let value = match split_segments(&token.lexeme) {
            Ok(value) => value,
            Err(()) => {
                self.error_at_current("unterminated variable placeholder in string");
                StringValue::Literal(token.lexeme)
            }
        };
        Some(self.arena.alloc(Node::Str(value), token.line, token.column))
    }
}

/// Split raw string content into literal and `&{NAME}` segments.
/// Returns Err on a `&{` with no closing brace.
fn split_segments(content: &str) -> Result<StringValue, ()> {
    let Some(first) = content.find("&{") else {
        return Ok(StringValue::Literal(content.to_string()));
    };

    let mut segments = Vec::new();
    let mut rest = content;
    let mut at = first;
    loop {
        if at > 0 {
            segments.push(Segment::Literal(rest[..at].to_string()));
        }
        let after = &rest[at + 2..];
        let Some(close) = after.find('}') else {
            return Err(());
        };
        segments.push(Segment::Variable(after[..close].to_string()));
        rest = &after[close + 1..];
        match rest.find("&{") {
            Some(next) => at = next,
            None => {
                if !rest.is_empty() {
                    segments.push(Segment::Literal(rest.to_string()));
                }
                return Ok(StringValue::Composite(segments));
            }
        }
    }
}
