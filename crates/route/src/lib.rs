//! Route syntax and matching for the ember web framework.
//!
//! This crate owns everything between a route string and a matched request
//! path:
//!
//! - [`ast`]: the abstract syntax tree of a route, reconstructable back to
//!   its source form via `Display`
//! - [`parser`]: a stateful lexer and recursive-descent parser for the route
//!   grammar
//! - [`tree`]: a prioritized matching tree built from parsed routes
//! - [`header_matcher`]: per-leaf request-header constraints
//!
//! Route strings support four kinds of segments, tried in this order during
//! matching:
//!
//! ```text
//! /settings                  static
//! /{id: /[0-9]+/}            regex
//! /{name}                    placeholder
//! /{path: **, capture: 2}    match-all (optionally capped)
//! ```
//!
//! A trailing segment may be marked optional (`/users/?sessions`), in which
//! case the route matches both with and without it.

pub mod ast;
pub mod header_matcher;
mod lexer;
pub mod parser;
pub mod tree;

mod leaf;

pub use ast::{BindParameter, BindParameterValue, BindParameters, Pos, Route, Segment, SegmentElement};
pub use header_matcher::HeaderMatcher;
pub use leaf::{Leaf, MatchStyle};
pub use parser::{parse, ParseError};
pub use tree::{Params, RouteError, Tree};
