//! Streaming tokenizer for `.enc` encoding spec files.

use std::path::{Path, PathBuf};

use crate::isa::diagnostic::{DiagnosticPhase, IsaDiagnostic, SourceLocation};
use crate::isa::error::IsaError;

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Colon,
    Equals,
    NotEquals,
    LBrace,
    RBrace,
    Identifier,
    Number,
    String,
    /// Raw bit pattern such as `1(0)x0`; only produced by [`Lexer::next_pattern`].
    Pattern,
    EOF,
}

/// Line and column of the next unread character.
type Mark = (usize, usize);

pub struct Lexer<'src> {
    src: &'src str,
    path: PathBuf,
    offset: usize,
    line: usize,
    column: usize,
}

impl<'src> Lexer<'src> {
    pub fn new(src: &'src str, path: PathBuf) -> Self {
        Self {
            src,
            path,
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn next_token(&mut self) -> Result<Token, IsaError> {
        self.skip_trivia();
        let at = self.mark();
        let start = self.offset;
        let Some(ch) = self.bump() else {
            return Ok(self.token(TokenKind::EOF, start, at));
        };

        let kind = match ch {
            ':' => TokenKind::Colon,
            '=' => TokenKind::Equals,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '!' if self.peek() == Some('=') => {
                self.bump();
                TokenKind::NotEquals
            }
            '!' => return Err(self.error("lexer.bang", "expected '!=' after '!'", at)),
            '"' => return self.string(at),
            ch if ch.is_ascii_digit() => {
                self.eat_while(|ch| ch.is_ascii_digit());
                TokenKind::Number
            }
            ch if ch.is_ascii_alphabetic() || ch == '_' => {
                self.eat_while(is_ident_part);
                TokenKind::Identifier
            }
            other => {
                return Err(self.error(
                    "lexer.unexpected-char",
                    format!("unexpected character '{other}'"),
                    at,
                ));
            }
        };
        Ok(self.token(kind, start, at))
    }

    /// Scans a bit pattern directly after `=` or `!=`. Patterns share characters with
    /// identifiers and numbers (`x`, `0`, `1`), so the parser switches into this mode explicitly.
    pub fn next_pattern(&mut self) -> Result<Token, IsaError> {
        let at = self.mark();
        let start = self.offset;
        if self.eat_while(|ch| matches!(ch, '0' | '1' | 'x' | '(' | ')')).is_empty() {
            return Err(self.error(
                "lexer.pattern.empty",
                "expected a bit pattern of 0, 1, x, (0) or (1)",
                at,
            ));
        }
        Ok(self.token(TokenKind::Pattern, start, at))
    }

    /// Quoted text; the opening quote is already consumed. `\` escapes the next character.
    fn string(&mut self, at: Mark) -> Result<Token, IsaError> {
        let mut value = String::new();
        loop {
            match self.bump() {
                Some('"') => break,
                Some('\\') => match self.bump() {
                    Some(escaped) => value.push(escaped),
                    None => break,
                },
                Some('\n') | None => {
                    return Err(self.error(
                        "lexer.string.unterminated",
                        "unterminated string literal",
                        at,
                    ));
                }
                Some(other) => value.push(other),
            }
        }
        Ok(Token {
            kind: TokenKind::String,
            lexeme: value,
            line: at.0,
            column: at.1,
        })
    }

    fn skip_trivia(&mut self) {
        loop {
            self.eat_while(char::is_whitespace);
            if self.peek() != Some('#') {
                break;
            }
            self.eat_while(|ch| ch != '\n');
        }
    }

    fn eat_while(&mut self, mut keep: impl FnMut(char) -> bool) -> &'src str {
        let src = self.src;
        let start = self.offset;
        while self.peek().is_some_and(&mut keep) {
            self.bump();
        }
        &src[start..self.offset]
    }

    fn peek(&self) -> Option<char> {
        self.src[self.offset..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.offset += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn mark(&self) -> Mark {
        (self.line, self.column)
    }

    fn token(&self, kind: TokenKind, start: usize, at: Mark) -> Token {
        Token {
            kind,
            lexeme: self.src[start..self.offset].to_string(),
            line: at.0,
            column: at.1,
        }
    }

    fn error(&self, code: &'static str, message: impl Into<String>, at: Mark) -> IsaError {
        IsaError::diagnostic(IsaDiagnostic::new(
            DiagnosticPhase::Lexer,
            code,
            message,
            Some(SourceLocation::new(&self.path, at.0, at.1)),
        ))
    }
}

fn is_ident_part(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-')
}
