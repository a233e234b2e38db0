//! Leaves of the matching tree and segment classification.
//!
//! A leaf is the terminal node a request path resolves to; it owns the
//! originating route (for reverse URL building), the registered handler
//! payload and an optional header matcher.

use crate::ast::{BindParameterValue, Route, Segment, SegmentElement};
use crate::header_matcher::HeaderMatcher;
use crate::tree::{Params, RouteError};
use http::HeaderMap;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::RwLock;

/// The match style of a tree node or leaf.
///
/// The order of variants matters: it is the matching priority, most specific
/// first. Children lists are kept sorted by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchStyle {
    /// e.g. `/settings`
    Static,
    /// e.g. `/{name: /[0-9]+/}`
    Regex,
    /// e.g. `/{name}`
    Placeholder,
    /// e.g. `/{name: **}`, `/{**}`
    All,
}

/// Style-specific matching data, shared between tree nodes and leaves.
#[derive(Debug)]
pub(crate) enum MatchKind {
    Static {
        /// The segment's literal form without the leading `/` (and without
        /// the `?` marker for optional leaves).
        literal: String,
    },
    Regex {
        regex: Regex,
        binds: Vec<String>,
    },
    Placeholder {
        bind: String,
    },
    All {
        bind: String,
        /// Maximum number of segments to capture. Zero means unlimited.
        capture: usize,
    },
}

impl MatchKind {
    pub(crate) fn style(&self) -> MatchStyle {
        match self {
            Self::Static { .. } => MatchStyle::Static,
            Self::Regex { .. } => MatchStyle::Regex,
            Self::Placeholder { .. } => MatchStyle::Placeholder,
            Self::All { .. } => MatchStyle::All,
        }
    }

    pub(crate) fn binds(&self) -> Vec<&str> {
        match self {
            Self::Static { .. } => Vec::new(),
            Self::Regex { binds, .. } => binds.iter().map(String::as_str).collect(),
            Self::Placeholder { bind } | Self::All { bind, .. } => vec![bind.as_str()],
        }
    }

    /// Classifies a segment, validating bind names against those already
    /// used by ancestors.
    pub(crate) fn classify(segment: &Segment, ancestor_binds: &BTreeSet<String>) -> Result<Self, RouteError> {
        // The only case with no elements is the route "/", a static match of
        // the empty string.
        if segment.elements.is_empty() || is_match_style_static(segment) {
            let literal = segment.to_string();
            let literal = literal.trim_start_matches(['/', '?']).to_owned();
            return Ok(Self::Static { literal });
        }

        if let Some(bind) = check_match_style_placeholder(segment) {
            check_bind(bind, ancestor_binds, segment)?;
            return Ok(Self::Placeholder { bind: bind.to_owned() });
        }

        if let Some((bind, capture)) = check_match_style_all(segment) {
            check_bind(&bind, ancestor_binds, segment)?;
            return Ok(Self::All { bind, capture });
        }

        let (regex, binds) = construct_match_style_regex(segment)?;
        for bind in &binds {
            check_bind(bind, ancestor_binds, segment)?;
        }
        Ok(Self::Regex { regex, binds })
    }

    /// Returns true if the kind matches the given request path segment,
    /// storing bind values in `params`.
    ///
    /// For regex kinds, binds map positionally onto capture groups. Interior
    /// nodes require the group count to equal the bind count; leaves accept
    /// extra groups, so user regexes may contain their own nested groups in
    /// the terminal segment.
    pub(crate) fn match_segment(&self, segment: &str, params: &mut Params, allow_extra_captures: bool) -> bool {
        match self {
            Self::Static { literal } => literal == segment,
            Self::Regex { regex, binds } => {
                let Some(captures) = regex.captures(segment) else {
                    return false;
                };
                let exact = captures.len() == binds.len() + 1;
                if !exact && !(allow_extra_captures && captures.len() > binds.len() + 1) {
                    return false;
                }
                for (i, bind) in binds.iter().enumerate() {
                    let value = captures.get(i + 1).map_or("", |m| m.as_str());
                    params.insert(bind.clone(), value.to_owned());
                }
                true
            }
            Self::Placeholder { bind } => {
                params.insert(bind.clone(), segment.to_owned());
                true
            }
            Self::All { bind, .. } => {
                params.insert(bind.clone(), segment.to_owned());
                true
            }
        }
    }
}

fn check_bind(bind: &str, ancestor_binds: &BTreeSet<String>, segment: &Segment) -> Result<(), RouteError> {
    if ancestor_binds.contains(bind) {
        return Err(RouteError::DuplicatedBind { bind: bind.to_owned(), offset: segment.pos.offset });
    }
    Ok(())
}

/// Returns true if the segment is a single literal.
pub(crate) fn is_match_style_static(segment: &Segment) -> bool {
    matches!(segment.elements.as_slice(), [SegmentElement::Ident { .. }])
}

/// Returns the bind name if the segment is a single `{name}` bind. The bind
/// ident `**` is excluded here, being the shorthand of the match-all style.
pub(crate) fn check_match_style_placeholder(segment: &Segment) -> Option<&str> {
    match segment.elements.as_slice() {
        [SegmentElement::BindIdent { name, .. }] if name != "**" => Some(name),
        _ => None,
    }
}

/// Returns the bind name and capture limit if the segment is match-all
/// style. The capture is 0 when undefined. The bind ident `**` is treated as
/// the shorthand of `{**: **}`.
pub(crate) fn check_match_style_all(segment: &Segment) -> Option<(String, usize)> {
    if let [SegmentElement::BindIdent { name, .. }] = segment.elements.as_slice() {
        if name == "**" {
            return Some(("**".to_owned(), 0));
        }
    }

    let [SegmentElement::BindParameters { parameters, .. }] = segment.elements.as_slice() else {
        return None;
    };
    let parameters = &parameters.parameters;
    let first = parameters.first()?;
    if first.value != BindParameterValue::Literal("**".into()) {
        return None;
    }

    let mut capture = 0;
    if let Some(second) = parameters.get(1) {
        if second.ident == "capture" {
            if let BindParameterValue::Literal(v) = &second.value {
                capture = v.parse().unwrap_or(0);
            }
        }
    }
    Some((first.ident.clone(), capture))
}

/// Builds an anchored regex from a regex-style segment, along with the bind
/// names in submatch order.
pub(crate) fn construct_match_style_regex(segment: &Segment) -> Result<(Regex, Vec<String>), RouteError> {
    let mut binds = Vec::with_capacity(segment.elements.len());
    let mut pattern = String::from("^");
    for element in &segment.elements {
        match element {
            SegmentElement::Ident { value, .. } => {
                // Dots may appear as literals and need escaping in a regex.
                pattern.push_str(&value.replace('.', "\\."));
            }
            SegmentElement::BindIdent { name, .. } => {
                binds.push(name.clone());
                pattern.push_str("(.+)");
            }
            SegmentElement::BindParameters { parameters, pos } => {
                if parameters.parameters.is_empty() {
                    return Err(RouteError::EmptySegment { offset: pos.offset });
                }
                for p in &parameters.parameters {
                    let BindParameterValue::Regex(re) = &p.value else {
                        return Err(RouteError::NonRegexLiteral { offset: pos.offset });
                    };
                    binds.push(p.ident.clone());
                    pattern.push('(');
                    pattern.push_str(re);
                    pattern.push(')');
                }
            }
        }
    }
    pattern.push('$');

    let regex = Regex::new(&pattern)
        .map_err(|source| RouteError::InvalidRegex { offset: segment.pos.offset, source })?;
    Ok((regex, binds))
}

/// A terminal tree node bound to a handler payload.
#[derive(Debug)]
pub struct Leaf<H> {
    route: Route,
    segment: Segment,
    kind: MatchKind,
    handler: H,
    header_matcher: RwLock<Option<HeaderMatcher>>,
    is_static: bool,
}

impl<H> Leaf<H> {
    pub(crate) fn new(
        route: Route,
        segment: Segment,
        handler: H,
        ancestor_binds: &BTreeSet<String>,
        ancestors_static: bool,
    ) -> Result<Self, RouteError> {
        let kind = MatchKind::classify(&segment, ancestor_binds)?;
        let is_static = ancestors_static && kind.style() == MatchStyle::Static;
        Ok(Self {
            route,
            segment,
            kind,
            handler,
            header_matcher: RwLock::new(None),
            is_static,
        })
    }

    /// The match style of the leaf.
    pub fn style(&self) -> MatchStyle {
        self.kind.style()
    }

    /// The handler payload bound to the leaf.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// The string form of the originating route.
    pub fn route_string(&self) -> String {
        self.route.to_string()
    }

    /// The originating route.
    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Returns true if the leaf and all its ancestors are static, i.e. the
    /// route can be matched by plain string comparison of the full path.
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// Installs the header matcher. Replaces any previously set matcher.
    pub fn set_header_matcher(&self, matcher: HeaderMatcher) {
        *self.header_matcher.write().unwrap() = Some(matcher);
    }

    pub(crate) fn segment_string(&self) -> String {
        self.segment.to_string()
    }

    fn match_header(&self, headers: &HeaderMap) -> bool {
        match &*self.header_matcher.read().unwrap() {
            Some(matcher) => matcher.matches(headers),
            None => true,
        }
    }

    /// Returns true if the leaf matches the final path segment.
    pub(crate) fn match_segment(&self, segment: &str, params: &mut Params, headers: &HeaderMap) -> bool {
        if !self.match_header(headers) {
            return false;
        }
        self.kind.match_segment(segment, params, true)
    }

    /// Matches all remaining segments up to the capture limit (when defined).
    /// `segment` is the part already consumed by the caller, `next` the byte
    /// index right after its trailing `/` in `path`.
    pub(crate) fn match_all(
        &self,
        path: &str,
        segment: &str,
        next: usize,
        params: &mut Params,
        headers: &HeaderMap,
    ) -> bool {
        let MatchKind::All { bind, capture } = &self.kind else {
            return false;
        };
        // `next-1` points at the slash preceding the remainder, so counting
        // slashes from there counts the remaining segments; the one in
        // `segment` adds one more.
        if *capture > 0 && *capture < path[next - 1..].matches('/').count() + 1 {
            return false;
        }
        if !self.match_header(headers) {
            return false;
        }
        params.insert(bind.clone(), format!("{segment}/{}", &path[next..]));
        true
    }

    /// Fills bind parameters with the given values to build the path portion
    /// of a URL. When `with_optional` is false the rendering stops before a
    /// trailing optional segment. Binds without a value keep their literal
    /// `{name}` form, which surfaces the omission in the built URL.
    pub fn url_path(&self, values: &Params, with_optional: bool) -> String {
        let mut path = String::new();
        for segment in &self.route.segments {
            if segment.optional && !with_optional {
                break;
            }
            path.push('/');
            for element in &segment.elements {
                match element {
                    SegmentElement::Ident { value, .. } => path.push_str(value),
                    SegmentElement::BindIdent { name, .. } => {
                        path.push('{');
                        path.push_str(name);
                        path.push('}');
                    }
                    SegmentElement::BindParameters { parameters, .. } => {
                        if let Some(first) = parameters.parameters.first() {
                            path.push('{');
                            path.push_str(&first.ident);
                            path.push('}');
                        }
                    }
                }
            }
        }

        for (name, value) in values {
            path = path.replace(&format!("{{{name}}}"), value);
        }
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn new_leaf(route: &str) -> Leaf<()> {
        let parsed = parse(route).unwrap();
        let segment = parsed.segments.last().unwrap().clone();
        Leaf::new(parsed, segment, (), &BTreeSet::new(), true).unwrap()
    }

    #[test]
    fn test_styles() {
        assert_eq!(new_leaf("/settings").style(), MatchStyle::Static);
        assert_eq!(new_leaf("/{id: /[0-9]+/}").style(), MatchStyle::Regex);
        assert_eq!(new_leaf("/{year}-{month}").style(), MatchStyle::Regex);
        assert_eq!(new_leaf("/{name}").style(), MatchStyle::Placeholder);
        assert_eq!(new_leaf("/{path: **}").style(), MatchStyle::All);
        assert_eq!(new_leaf("/{path: **, capture: 2}").style(), MatchStyle::All);
        assert_eq!(new_leaf("/{**}").style(), MatchStyle::All);
    }

    #[test]
    fn test_url_path() {
        let mut values = Params::new();
        values.insert("name".to_owned(), "ember".to_owned());

        let leaf = new_leaf("/webapi/projects/{name}/hashes/{ids: **}");
        assert_eq!(leaf.url_path(&values, true), "/webapi/projects/ember/hashes/{ids}");

        let leaf = new_leaf("/webapi/projects/{name}/?{tab}");
        assert_eq!(leaf.url_path(&values, false), "/webapi/projects/ember");
        assert_eq!(leaf.url_path(&values, true), "/webapi/projects/ember/{tab}");
    }

    #[test]
    fn test_capture_limit() {
        let leaf = new_leaf("/files/{path: **, capture: 2}");
        let headers = HeaderMap::new();

        let mut params = Params::new();
        assert!(leaf.match_all("files/a/b", "a", 8, &mut params, &headers));
        assert_eq!(params.get("path").map(String::as_str), Some("a/b"));

        let mut params = Params::new();
        assert!(!leaf.match_all("files/a/b/c", "a", 8, &mut params, &headers));
    }

    #[test]
    fn test_duplicated_bind_is_rejected() {
        let parsed = parse("/{name}/{name}").unwrap();
        let segment = parsed.segments.last().unwrap().clone();
        let mut binds = BTreeSet::new();
        binds.insert("name".to_owned());
        let err = Leaf::new(parsed, segment, (), &binds, false).unwrap_err();
        assert!(matches!(err, RouteError::DuplicatedBind { .. }));
    }
}
