//! The prioritized route matching tree.
//!
//! A tree is built per HTTP method from parsed routes. Interior nodes
//! represent non-terminal segments; leaves represent full routes and carry
//! the registered handler payload. Children are kept ordered by
//! [`MatchStyle`], so matching always prefers the most specific candidate:
//! static segments win over regexes, regexes over placeholders, placeholders
//! over match-alls. Children of equal style keep their registration order.
//!
//! Matching walks the request path one `/`-delimited segment at a time.
//! Match-all nodes backtrack: they try to absorb successively longer
//! remainders as long as the rest of the tree can still match what is left.
//! Captured bind values are percent-decoded individually after a successful
//! match.

use crate::ast::{Route, Segment};
use crate::leaf::{Leaf, MatchKind, MatchStyle};
use percent_encoding::percent_decode_str;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;

/// Bind parameters with their values extracted from a request path.
pub type Params = BTreeMap<String, String>;

/// An error raised while adding a route to a tree.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("cannot add empty route")]
    EmptyRoute,

    #[error("duplicated route {route:?}")]
    DuplicatedRoute { route: String },

    #[error("duplicated bind parameter {bind:?} in position {offset}")]
    DuplicatedBind { bind: String, offset: usize },

    #[error("duplicated match all bind parameter in position {offset}")]
    DuplicatedMatchAll { offset: usize },

    #[error("duplicated match all style in position {offset}")]
    DuplicatedMatchAllStyle { offset: usize },

    #[error("only the last segment can be optional")]
    OptionalNotTerminal,

    #[error("empty segment in position {offset}")]
    EmptySegment { offset: usize },

    #[error("segment has non-regex literal in position {offset}")]
    NonRegexLiteral { offset: usize },

    #[error("compile regexp near position {offset}: {source}")]
    InvalidRegex {
        offset: usize,
        #[source]
        source: regex::Error,
    },
}

/// Ancestor information threaded through route registration, standing in for
/// parent back-pointers: the bind names used so far, whether every ancestor
/// is static, and whether a match-all node already sits on the chain.
#[derive(Clone)]
struct Ancestry {
    binds: BTreeSet<String>,
    all_static: bool,
    has_match_all: bool,
}

impl Ancestry {
    fn root() -> Self {
        Self { binds: BTreeSet::new(), all_static: true, has_match_all: false }
    }

    fn descend(&self, kind: &MatchKind) -> Self {
        let mut next = self.clone();
        next.binds.extend(kind.binds().iter().map(|b| b.to_string()));
        next.all_static = next.all_static && kind.style() == MatchStyle::Static;
        next.has_match_all = next.has_match_all || kind.style() == MatchStyle::All;
        next
    }
}

/// An interior node derived from one non-terminal segment.
#[derive(Debug)]
struct Node<H> {
    segment: Segment,
    kind: MatchKind,
    /// Direct subtrees, ordered by matching priority.
    subtrees: Vec<Node<H>>,
    /// Direct leaves, ordered by matching priority.
    leaves: Vec<Arc<Leaf<H>>>,
}

impl<H> Node<H> {
    fn style(&self) -> MatchStyle {
        self.kind.style()
    }

    /// At most one match-all child can exist per list, and ordering
    /// guarantees it is the last element.
    fn has_match_all_subtree(&self) -> bool {
        self.subtrees.last().is_some_and(|t| t.style() == MatchStyle::All)
    }

    fn has_match_all_leaf(&self) -> bool {
        self.leaves.last().is_some_and(|l| l.style() == MatchStyle::All)
    }
}

/// A matching tree generic over the handler payload bound to its leaves.
#[derive(Debug)]
pub struct Tree<H> {
    root: Node<H>,
}

impl<H> Default for Tree<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Tree<H> {
    pub fn new() -> Self {
        Self {
            root: Node {
                segment: Segment::empty(),
                kind: MatchKind::Static { literal: String::new() },
                subtrees: Vec::new(),
                leaves: Vec::new(),
            },
        }
    }
}

impl<H: Clone> Tree<H> {
    /// Adds a route and its handler payload, returning the created leaf.
    ///
    /// When the terminal segment is optional the same payload is also
    /// installed one level up, so the route matches with and without the
    /// optional tail.
    pub fn add_route(&mut self, route: &Route, handler: H) -> Result<Arc<Leaf<H>>, RouteError> {
        let count = route.segments.len();
        if count == 0 {
            return Err(RouteError::EmptyRoute);
        }
        if route.segments[..count - 1].iter().any(|s| s.optional) {
            return Err(RouteError::OptionalNotTerminal);
        }

        let leaf = add_segments(&mut self.root, &Ancestry::root(), route, 0, count - 1, handler.clone())?;

        if route.segments[count - 1].optional {
            if count == 1 {
                // A single optional segment also answers the bare root path.
                add_leaf(&mut self.root, &Ancestry::root(), route, &Segment::empty(), handler)?;
            } else {
                add_segments(&mut self.root, &Ancestry::root(), route, 0, count - 2, handler)?;
            }
        }
        Ok(leaf)
    }

    /// Matches a request path against the tree.
    ///
    /// Returns the matched leaf and the percent-decoded bind parameters. Due
    /// to backtracking, the parameters may contain extra values bound by
    /// candidates that were probed before the final leaf.
    pub fn match_route(&self, path: &str, headers: &http::HeaderMap) -> Option<(Arc<Leaf<H>>, Params)> {
        let path = path.trim_start_matches('/');
        let mut params = Params::new();
        let leaf = match_next_segment(&self.root, path, 0, &mut params, headers)?;

        for value in params.values_mut() {
            if let Ok(decoded) = percent_decode_str(value).decode_utf8() {
                *value = decoded.into_owned();
            }
        }
        Some((leaf, params))
    }
}

/// Adds the segment at `next` to the node, recursing until `terminal` where
/// a leaf is installed instead of a subtree.
fn add_segments<H: Clone>(
    node: &mut Node<H>,
    ancestry: &Ancestry,
    route: &Route,
    next: usize,
    terminal: usize,
    handler: H,
) -> Result<Arc<Leaf<H>>, RouteError> {
    if next == terminal {
        return add_leaf(node, ancestry, route, &route.segments[next], handler);
    }
    add_subtree(node, ancestry, route, next, terminal, handler)
}

fn add_leaf<H>(
    node: &mut Node<H>,
    ancestry: &Ancestry,
    route: &Route,
    segment: &Segment,
    handler: H,
) -> Result<Arc<Leaf<H>>, RouteError> {
    let segment_str = segment.to_string();
    if node.leaves.iter().any(|l| l.segment_string() == segment_str) {
        return Err(RouteError::DuplicatedRoute { route: route.to_string() });
    }

    let leaf = Arc::new(Leaf::new(
        route.clone(),
        segment.clone(),
        handler,
        &ancestry.binds,
        ancestry.all_static,
    )?);

    if leaf.style() == MatchStyle::All && node.has_match_all_leaf() {
        return Err(RouteError::DuplicatedMatchAll { offset: segment.pos.offset });
    }

    let at = insert_position(node.leaves.iter().map(|l| l.style()), leaf.style());
    node.leaves.insert(at, leaf.clone());
    Ok(leaf)
}

fn add_subtree<H: Clone>(
    node: &mut Node<H>,
    ancestry: &Ancestry,
    route: &Route,
    next: usize,
    terminal: usize,
    handler: H,
) -> Result<Arc<Leaf<H>>, RouteError> {
    let segment = &route.segments[next];
    let segment_str = segment.to_string();

    if let Some(i) = node.subtrees.iter().position(|t| t.segment.to_string() == segment_str) {
        let subtree = &mut node.subtrees[i];
        let descended = ancestry.descend(&subtree.kind);
        return add_segments(subtree, &descended, route, next + 1, terminal, handler);
    }

    if segment.elements.is_empty() {
        return Err(RouteError::EmptySegment { offset: segment.pos.offset });
    }

    let kind = MatchKind::classify(segment, &ancestry.binds)?;
    if kind.style() == MatchStyle::All {
        // One route-to-leaf chain can hold at most one match-all node.
        if ancestry.has_match_all {
            return Err(RouteError::DuplicatedMatchAllStyle { offset: segment.pos.offset });
        }
        if node.has_match_all_subtree() {
            return Err(RouteError::DuplicatedMatchAll { offset: segment.pos.offset });
        }
    }

    let descended = ancestry.descend(&kind);
    let subtree = Node { segment: segment.clone(), kind, subtrees: Vec::new(), leaves: Vec::new() };

    let at = insert_position(node.subtrees.iter().map(|t| t.style()), subtree.style());
    node.subtrees.insert(at, subtree);
    add_segments(&mut node.subtrees[at], &descended, route, next + 1, terminal, handler)
}

/// Position preserving ascending match-style order; equal styles keep
/// insertion order.
fn insert_position(styles: impl Iterator<Item = MatchStyle>, style: MatchStyle) -> usize {
    let mut at = 0;
    for existing in styles {
        if style < existing {
            break;
        }
        at += 1;
    }
    at
}

fn match_next_segment<H>(
    node: &Node<H>,
    path: &str,
    next: usize,
    params: &mut Params,
    headers: &http::HeaderMap,
) -> Option<Arc<Leaf<H>>> {
    match path[next..].find('/') {
        None => match_leaf(node, &path[next..], params, headers),
        Some(i) => match_subtree(node, path, &path[next..next + i], next + i + 1, params, headers),
    }
}

fn match_leaf<H>(
    node: &Node<H>,
    segment: &str,
    params: &mut Params,
    headers: &http::HeaderMap,
) -> Option<Arc<Leaf<H>>> {
    node.leaves
        .iter()
        .find(|l| l.match_segment(segment, params, headers))
        .cloned()
}

fn match_subtree<H>(
    node: &Node<H>,
    path: &str,
    segment: &str,
    next: usize,
    params: &mut Params,
    headers: &http::HeaderMap,
) -> Option<Arc<Leaf<H>>> {
    for subtree in &node.subtrees {
        if subtree.style() == MatchStyle::All {
            if let Some(leaf) = match_all_subtree(subtree, path, segment, next, params, headers) {
                return Some(leaf);
            }
            // Ordering guarantees a match-all subtree is the last element,
            // so nothing else is left to try.
            break;
        }

        if !subtree.kind.match_segment(segment, params, false) {
            continue;
        }
        if let Some(leaf) = match_next_segment(subtree, path, next, params, headers) {
            return Some(leaf);
        }
    }

    // Fall back to a trailing match-all leaf absorbing the remainder.
    let leaf = node.leaves.last()?;
    if leaf.style() != MatchStyle::All {
        return None;
    }
    if leaf.match_all(path, segment, next, params, headers) {
        return Some(leaf.clone());
    }
    None
}

/// Greedy backtracking match for a match-all subtree: absorb one segment,
/// then try to match the rest of the tree; on failure absorb one more, up to
/// the capture limit or the second-to-last segment of the path.
fn match_all_subtree<H>(
    subtree: &Node<H>,
    path: &str,
    segment: &str,
    next: usize,
    params: &mut Params,
    headers: &http::HeaderMap,
) -> Option<Arc<Leaf<H>>> {
    let MatchKind::All { bind, capture } = &subtree.kind else {
        return None;
    };

    let mut absorbed = segment.to_owned();
    let mut next = next;
    let mut captured = 1;
    while *capture == 0 || *capture >= captured {
        if let Some(leaf) = match_next_segment(subtree, path, next, params, headers) {
            params.insert(bind.clone(), absorbed);
            return Some(leaf);
        }

        // The last segment of the path must be matched by a leaf, not by
        // this subtree, so stop one segment short of the end.
        let i = path[next..].find('/')?;
        absorbed.push('/');
        absorbed.push_str(&path[next..next + i]);
        next += i + 1;
        captured += 1;
    }
    None
}
