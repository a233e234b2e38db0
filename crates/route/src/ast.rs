//! Abstract syntax tree for route strings.
//!
//! The AST mirrors the route grammar one production per type:
//!
//! ```text
//! Route          = Segment+ .
//! Segment        = "/" "?"? Element* .
//! Element        = Ident | "{" Ident "}" | "{" BindParameters "}" .
//! BindParameters = BindParameter ("," BindParameter)* .
//! BindParameter  = Ident ":" BindParameterValue .
//! BindParameterValue = Ident | "/" Regex "/" .
//! ```
//!
//! Every node keeps the source position it was parsed from, so that errors
//! raised later (e.g. while constructing the matching tree) can point back at
//! the offending part of the route string.
//!
//! `Display` reconstructs the source form: for any successfully parsed route
//! the rendered string equals the input, modulo whitespace inside `{}` which
//! is normalized to a single space after `:` and `,`.

use std::fmt;

/// A position in the route source string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pos {
    /// Byte offset from the start of the route string.
    pub offset: usize,
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub column: u32,
}

impl Pos {
    pub(crate) fn new(offset: usize, line: u32, column: u32) -> Self {
        Self { offset, line, column }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// The value of a bind parameter, either a literal or a regex surrounded by
/// `/.../`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindParameterValue {
    Literal(String),
    Regex(String),
}

impl fmt::Display for BindParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(s) => f.write_str(s),
            Self::Regex(re) => write!(f, "/{re}/"),
        }
    }
}

/// A single `name: value` pair inside a bind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindParameter {
    pub ident: String,
    pub value: BindParameterValue,
}

impl fmt::Display for BindParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.ident, self.value)
    }
}

/// A comma-separated list of bind parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindParameters {
    pub parameters: Vec<BindParameter>,
}

impl fmt::Display for BindParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, p) in self.parameters.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{p}")?;
        }
        Ok(())
    }
}

/// One element of a segment.
///
/// Segments may hold several adjacent elements, e.g. `{year}-{month}` is two
/// binds joined by a literal dash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentElement {
    /// A literal, e.g. `users`.
    Ident { pos: Pos, value: String },
    /// A bare bind, e.g. `{name}`.
    BindIdent { pos: Pos, name: String },
    /// A parameterized bind, e.g. `{id: /[0-9]+/}` or `{p: **, capture: 2}`.
    BindParameters { pos: Pos, parameters: BindParameters },
}

impl SegmentElement {
    /// The source position of the element.
    pub fn pos(&self) -> Pos {
        match self {
            Self::Ident { pos, .. } | Self::BindIdent { pos, .. } | Self::BindParameters { pos, .. } => *pos,
        }
    }
}

impl fmt::Display for SegmentElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident { value, .. } => f.write_str(value),
            Self::BindIdent { name, .. } => write!(f, "{{{name}}}"),
            Self::BindParameters { parameters, .. } => write!(f, "{{{parameters}}}"),
        }
    }
}

/// A `/`-delimited portion of a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Position of the leading `/`.
    pub pos: Pos,
    /// Whether the segment is marked optional (`/?...`). Only the terminal
    /// segment of a route may be optional.
    pub optional: bool,
    pub elements: Vec<SegmentElement>,
}

impl Segment {
    /// An empty segment, used as the implicit segment of a tree root.
    pub(crate) fn empty() -> Self {
        Self { pos: Pos::default(), optional: false, elements: Vec::new() }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("/")?;
        if self.optional {
            f.write_str("?")?;
        }
        for e in &self.elements {
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

/// A parsed route: one or more segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub segments: Vec<Segment>,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for s in &self.segments {
            write!(f, "{s}")?;
        }
        Ok(())
    }
}
