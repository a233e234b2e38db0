//! Recursive-descent parser for route strings.
//!
//! The parser consumes the token stream produced by the lexer and builds a
//! [`Route`] AST. Two tokens of lookahead are enough to tell the three
//! element forms apart: after a `{`, an ident followed by `}` is a bare bind
//! while an ident followed by `:` starts a bind-parameter list.
//!
//! Errors carry the `line:column` position of the offending token and a
//! description of what was expected there.

use crate::ast::{BindParameter, BindParameterValue, BindParameters, Pos, Route, Segment, SegmentElement};
use crate::lexer::{tokenize, Token, TokenKind};
use thiserror::Error;

/// An error produced while lexing or parsing a route string.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{pos}: unexpected character {ch:?}")]
    UnexpectedChar { ch: char, pos: Pos },

    #[error("{pos}: unexpected token {found} (expected {expected})")]
    UnexpectedToken { found: String, expected: &'static str, pos: Pos },

    #[error("unexpected end of route (expected {expected})")]
    UnexpectedEof { expected: &'static str },

    #[error("cannot parse an empty route")]
    EmptyRoute,
}

/// Parses a route string into its AST.
///
/// The rendered form of the returned AST (`route.to_string()`) equals the
/// input for any canonically spaced route.
pub fn parse(source: &str) -> Result<Route, ParseError> {
    if source.is_empty() {
        return Err(ParseError::EmptyRoute);
    }
    let tokens = tokenize(source)?;
    Parser { tokens, index: 0 }.parse_route()
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index)
    }

    fn peek2(&self) -> Option<&Token> {
        self.tokens.get(self.index + 1)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.index).cloned();
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    fn unexpected(&self, expected: &'static str) -> ParseError {
        match self.peek() {
            Some(token) => ParseError::UnexpectedToken {
                found: token.kind.to_string(),
                expected,
                pos: token.pos,
            },
            None => ParseError::UnexpectedEof { expected },
        }
    }

    fn expect_slash(&mut self) -> Result<Pos, ParseError> {
        match self.peek() {
            Some(Token { kind: TokenKind::Slash, pos }) => {
                let pos = *pos;
                self.index += 1;
                Ok(pos)
            }
            _ => Err(self.unexpected("\"/\"")),
        }
    }

    fn expect_ident(&mut self, expected: &'static str) -> Result<(Pos, String), ParseError> {
        match self.peek() {
            Some(Token { kind: TokenKind::Ident(_), .. }) => {
                let Some(Token { kind: TokenKind::Ident(value), pos }) = self.next() else {
                    unreachable!()
                };
                Ok((pos, value))
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek().map(|t| &t.kind) == Some(kind) {
            self.index += 1;
            return true;
        }
        false
    }

    fn skip_whitespace(&mut self) {
        while self.eat(&TokenKind::Whitespace) {}
    }

    fn parse_route(&mut self) -> Result<Route, ParseError> {
        let mut segments = Vec::new();
        loop {
            segments.push(self.parse_segment()?);
            if self.peek().is_none() {
                break;
            }
        }
        Ok(Route { segments })
    }

    fn parse_segment(&mut self) -> Result<Segment, ParseError> {
        let pos = self.expect_slash()?;
        let optional = self.eat(&TokenKind::Optional);

        let mut elements = Vec::new();
        loop {
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Ident(_)) => {
                    let (pos, value) = self.expect_ident("ident")?;
                    elements.push(SegmentElement::Ident { pos, value });
                }
                Some(TokenKind::LBrace) => elements.push(self.parse_bind()?),
                Some(TokenKind::Slash) | None => break,
                _ => return Err(self.unexpected("ident, \"{\" or \"/\"")),
            }
        }
        Ok(Segment { pos, optional, elements })
    }

    /// Parses `{name}` or `{name: value, ...}`. The caller has peeked the
    /// opening brace.
    fn parse_bind(&mut self) -> Result<SegmentElement, ParseError> {
        let Some(Token { kind: TokenKind::LBrace, pos }) = self.next() else {
            unreachable!()
        };

        // Two-token lookahead: `{ident}` vs `{ident: ...}`.
        if let (Some(TokenKind::Ident(_)), Some(TokenKind::RBrace)) =
            (self.peek().map(|t| &t.kind), self.peek2().map(|t| &t.kind))
        {
            let (_, name) = self.expect_ident("ident")?;
            self.index += 1; // closing brace
            return Ok(SegmentElement::BindIdent { pos, name });
        }

        let mut parameters = Vec::new();
        loop {
            let (_, ident) = self.expect_ident("bind parameter name")?;
            if !self.eat(&TokenKind::Colon) {
                return Err(self.unexpected("\":\""));
            }
            self.skip_whitespace();
            let value = self.parse_bind_parameter_value()?;
            parameters.push(BindParameter { ident, value });

            if self.eat(&TokenKind::Comma) {
                self.skip_whitespace();
                continue;
            }
            if self.eat(&TokenKind::RBrace) {
                break;
            }
            return Err(self.unexpected("\",\" or \"}\""));
        }
        Ok(SegmentElement::BindParameters { pos, parameters: BindParameters { parameters } })
    }

    fn parse_bind_parameter_value(&mut self) -> Result<BindParameterValue, ParseError> {
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Ident(_)) => {
                let (_, value) = self.expect_ident("ident")?;
                Ok(BindParameterValue::Literal(value))
            }
            Some(TokenKind::Slash) => {
                self.index += 1;
                let regex = match self.peek() {
                    Some(Token { kind: TokenKind::Regex(_), .. }) => {
                        let Some(Token { kind: TokenKind::Regex(regex), .. }) = self.next() else {
                            unreachable!()
                        };
                        regex
                    }
                    _ => return Err(self.unexpected("regex")),
                };
                if !self.eat(&TokenKind::Slash) {
                    return Err(self.unexpected("\"/\""));
                }
                Ok(BindParameterValue::Regex(regex))
            }
            _ => Err(self.unexpected("ident or regex value")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(value: &str) -> BindParameterValue {
        BindParameterValue::Literal(value.into())
    }

    fn param(ident: &str, value: BindParameterValue) -> BindParameter {
        BindParameter { ident: ident.into(), value }
    }

    /// Strips positions so expected values stay readable.
    fn shape(route: &Route) -> Vec<(bool, Vec<String>)> {
        route
            .segments
            .iter()
            .map(|s| (s.optional, s.elements.iter().map(|e| e.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_parse_static_route() {
        let route = parse("/webapi/users").unwrap();
        assert_eq!(shape(&route), vec![
            (false, vec!["webapi".to_string()]),
            (false, vec!["users".to_string()]),
        ]);
    }

    #[test]
    fn test_parse_root_route() {
        let route = parse("/").unwrap();
        assert_eq!(shape(&route), vec![(false, vec![])]);
    }

    #[test]
    fn test_parse_optional_bind() {
        let route = parse("/webapi/users/?{id}").unwrap();
        assert_eq!(shape(&route), vec![
            (false, vec!["webapi".to_string()]),
            (false, vec!["users".to_string()]),
            (true, vec!["{id}".to_string()]),
        ]);
    }

    #[test]
    fn test_parse_mixed_segment_keeps_element_order() {
        let route = parse("/{year: /[0-9]+/}-{month-day}").unwrap();
        let segment = &route.segments[0];
        assert_eq!(segment.elements.len(), 3);
        assert_eq!(
            segment.elements[0],
            SegmentElement::BindParameters {
                pos: segment.elements[0].pos(),
                parameters: BindParameters { parameters: vec![param("year", BindParameterValue::Regex("[0-9]+".into()))] },
            }
        );
        assert!(matches!(&segment.elements[1], SegmentElement::Ident { value, .. } if value == "-"));
        assert!(matches!(&segment.elements[2], SegmentElement::BindIdent { name, .. } if name == "month-day"));
    }

    #[test]
    fn test_parse_match_all_with_capture() {
        let route = parse("/files/{path: **, capture: 2}").unwrap();
        assert_eq!(
            route.segments[1].elements[0],
            SegmentElement::BindParameters {
                pos: route.segments[1].elements[0].pos(),
                parameters: BindParameters {
                    parameters: vec![param("path", literal("**")), param("capture", literal("2"))],
                },
            }
        );
    }

    #[test]
    fn test_parse_unnamed_match_all_is_a_bind_ident() {
        let route = parse("/files/{**}").unwrap();
        assert!(matches!(
            &route.segments[1].elements[0],
            SegmentElement::BindIdent { name, .. } if name == "**"
        ));
    }

    #[test]
    fn test_segment_positions() {
        let route = parse("/webapi/users").unwrap();
        assert_eq!(route.segments[0].pos, Pos::new(0, 1, 1));
        assert_eq!(route.segments[1].pos, Pos::new(7, 1, 8));
        assert_eq!(route.segments[1].elements[0].pos(), Pos::new(8, 1, 9));
    }

    #[test]
    fn test_round_trip() {
        let routes = [
            "/webapi",
            "/webapi/users",
            "/webapi/users/?{id}",
            "/{name}",
            "/webapi/{name-1}/{name-2: /[a-z0-9]{7, 40}/}",
            "/webapi/{name-1}/{name-2: /[a-z0-9]{7, 40}/}/{year: regex2}-{month-day}",
            "/webapi/{name-1}/{name-2: /[a-z0-9]{7, 40}/}/{year: regex2}-{month-day}/{**: **, capture: 3}",
            "/webapi/projects/{name}/hashes/{ids: **}/diff/{lineno}",
            "/webapi/{username}/%E4%BD%A0%E5%A5%BD%E4%B8%96%E7%95%8C/test@$",
            "/{**}",
            "/users/?sessions",
        ];
        for route in routes {
            let parsed = parse(route).unwrap_or_else(|e| panic!("parse {route:?}: {e}"));
            assert_eq!(parsed.to_string(), route, "round-trip of {route:?}");
        }
    }

    #[test]
    fn test_errors_carry_position_and_expectation() {
        let tests = [
            ("", "cannot parse an empty route"),
            ("webapi", "1:1: unexpected character 'w'"),
            ("/web api", "1:5: unexpected token whitespace (expected ident, \"{\" or \"/\")"),
            ("/{name", "unexpected end of route (expected \":\")"),
            ("/{name:}", "1:8: unexpected token \"}\" (expected ident or regex value)"),
            ("/{id: /re", "unexpected end of route (expected \"/\")"),
            ("/{id: //}", "1:8: unexpected token \"/\" (expected regex)"),
            ("/{a: b c}", "1:7: unexpected token whitespace (expected \",\" or \"}\")"),
        ];
        for (route, want) in tests {
            let err = parse(route).unwrap_err();
            assert_eq!(err.to_string(), want, "error for {route:?}");
        }
    }
}
