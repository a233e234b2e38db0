//! Stateful lexer for route strings.
//!
//! The lexer runs a small mode automaton so that the same character can mean
//! different things depending on where it appears: `/` starts a segment at
//! the top level but delimits a regex value inside a bind, `?` marks an
//! optional segment but is an ordinary regex character, and so on.
//!
//! Mode transitions:
//!
//! ```text
//! Root ──'/'──▶ Segment ──'{'──▶ Bind ──':'──▶ BindParameter ──'/'──▶ RegexValue
//!                  ▲                │ '}'            │ ','  '}'           │ '/'
//!                  └────────────────┘◀───────────────┘◀──────────────────┘
//! ```
//!
//! Identifiers use the character set of legal URI characters defined in
//! RFC 3986. Whitespace is tokenized but carries no meaning outside of `{}`;
//! the parser decides where it is allowed.

use crate::ast::Pos;
use crate::parser::ParseError;
use std::fmt;
use Mode::*;

/// All legal URI characters that are defined in RFC 3986.
/// `[]:,{}` are excluded since they take part in the binding syntax.
fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~' | '@' | '!' | '$' | '&' | '\'' | '(' | ')' | '*' | '+' | ';' | '%' | '=')
}

/// Characters allowed inside a `/.../` regex value. Notably `/` itself is
/// excluded; it terminates the value.
fn is_regex_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(c, '*' | '-' | '+' | '.' | '_' | ',' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | ' ' | '\\' | '|')
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenKind {
    /// `/`: segment delimiter, or regex value delimiter inside a bind.
    Slash,
    /// `?` right after a segment's `/`.
    Optional,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `:`
    Colon,
    /// `,`
    Comma,
    /// A run of RFC 3986 identifier characters.
    Ident(String),
    /// A regex value between two slashes inside a bind parameter.
    Regex(String),
    /// A single whitespace character.
    Whitespace,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Slash => f.write_str("\"/\""),
            Self::Optional => f.write_str("\"?\""),
            Self::LBrace => f.write_str("\"{\""),
            Self::RBrace => f.write_str("\"}\""),
            Self::Colon => f.write_str("\":\""),
            Self::Comma => f.write_str("\",\""),
            Self::Ident(s) => write!(f, "{s:?}"),
            Self::Regex(s) => write!(f, "/{s}/"),
            Self::Whitespace => f.write_str("whitespace"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub pos: Pos,
}

/// The lexing mode. See the module docs for the transition diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Root,
    Segment,
    Bind,
    BindParameter,
    RegexValue,
}

struct Lexer<'a> {
    rest: &'a str,
    offset: usize,
    line: u32,
    column: u32,
    modes: Vec<Mode>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self { rest: source, offset: 0, line: 1, column: 1, modes: vec![Root] }
    }

    fn pos(&self) -> Pos {
        Pos::new(self.offset, self.line, self.column)
    }

    fn mode(&self) -> Mode {
        *self.modes.last().unwrap_or(&Root)
    }

    fn bump(&mut self, len: usize) {
        let (consumed, rest) = self.rest.split_at(len);
        for c in consumed.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.offset += len;
        self.rest = rest;
    }

    /// Consumes the longest run of characters satisfying `pred`.
    fn take_while(&mut self, pred: fn(char) -> bool) -> String {
        let end = self.rest.find(|c| !pred(c)).unwrap_or(self.rest.len());
        let s = self.rest[..end].to_owned();
        self.bump(end);
        s
    }

    fn next_token(&mut self) -> Result<Option<Token>, ParseError> {
        let Some(c) = self.rest.chars().next() else {
            return Ok(None);
        };
        let pos = self.pos();

        let kind = match (self.mode(), c) {
            (Root, '/') => {
                self.modes.push(Segment);
                self.bump(1);
                TokenKind::Slash
            }

            (Segment, '/') => {
                self.bump(1);
                TokenKind::Slash
            }
            (Segment, '?') => {
                self.bump(1);
                TokenKind::Optional
            }
            (Segment, '{') => {
                self.modes.push(Bind);
                self.bump(1);
                TokenKind::LBrace
            }

            (Bind, ':') => {
                self.modes.push(BindParameter);
                self.bump(1);
                TokenKind::Colon
            }
            (Bind, '}') => {
                self.modes.pop();
                self.bump(1);
                TokenKind::RBrace
            }

            (BindParameter, '/') => {
                self.modes.push(RegexValue);
                self.bump(1);
                TokenKind::Slash
            }
            (BindParameter, ',') => {
                self.modes.pop();
                self.bump(1);
                TokenKind::Comma
            }
            (BindParameter, '}') => {
                // Closes both the parameter and its enclosing bind.
                self.modes.pop();
                self.modes.pop();
                self.bump(1);
                TokenKind::RBrace
            }

            (RegexValue, '/') => {
                self.modes.pop();
                self.bump(1);
                TokenKind::Slash
            }
            (RegexValue, c) if is_regex_char(c) => TokenKind::Regex(self.take_while(is_regex_char)),

            (Segment | Bind | BindParameter, c) if c.is_whitespace() => {
                self.bump(c.len_utf8());
                TokenKind::Whitespace
            }
            (Segment | Bind | BindParameter, c) if is_ident_char(c) => TokenKind::Ident(self.take_while(is_ident_char)),

            (_, c) => {
                return Err(ParseError::UnexpectedChar { ch: c, pos });
            }
        };

        Ok(Some(Token { kind, pos }))
    }
}

/// Tokenizes the whole route string up front, so the parser can look ahead
/// freely.
pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}
