// Routing system for HTTP requests
//
// Patterns are compiled into segments once at registration. Matching is a
// linear scan in registration order: the first route whose method and
// segments both match wins.

use crate::parser::percent_decode;
use crate::{BoxedHandler, Error, HttpMethod, IntoHandler, MethodFilter, PatternError};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use tracing::{trace, warn};

/// One `/`-delimited unit of a compiled pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Must equal the path segment exactly, after decoding.
    Literal(String),
    /// `{name}`: binds exactly one non-empty path segment.
    Param(String),
    /// `{*name}`: binds the rest of the path, possibly empty.
    Wildcard(String),
}

/// A compiled route pattern such as `/users/{id}/files/{*path}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    source: String,
    segments: SmallVec<[Segment; 8]>,
}

impl Pattern {
    /// Compile a pattern string, rejecting misplaced or duplicate placeholders.
    pub fn parse(source: &str) -> Result<Self, PatternError> {
        let Some(rest) = source.strip_prefix('/') else {
            return Err(PatternError::MissingLeadingSlash(source.to_string()));
        };

        let mut segments: SmallVec<[Segment; 8]> = SmallVec::new();
        if !rest.is_empty() {
            for raw in rest.split('/') {
                segments.push(parse_segment(source, raw)?);
            }
        }

        let wildcards = segments
            .iter()
            .filter(|s| matches!(s, Segment::Wildcard(_)))
            .count();
        if wildcards > 1 {
            return Err(PatternError::MultipleWildcards(source.to_string()));
        }
        let wildcard = segments.iter().enumerate().find_map(|(pos, s)| match s {
            Segment::Wildcard(name) => Some((pos, name)),
            _ => None,
        });
        if let Some((pos, name)) = wildcard {
            if pos + 1 != segments.len() {
                return Err(PatternError::WildcardNotLast {
                    pattern: source.to_string(),
                    name: name.clone(),
                });
            }
        }

        {
            let mut seen: SmallVec<[&str; 8]> = SmallVec::new();
            for segment in &segments {
                if let Segment::Param(name) | Segment::Wildcard(name) = segment {
                    if seen.contains(&name.as_str()) {
                        return Err(PatternError::DuplicateParam {
                            pattern: source.to_string(),
                            name: name.clone(),
                        });
                    }
                    seen.push(name.as_str());
                }
            }
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Match already split and decoded path segments, returning the bindings.
    pub fn matches(&self, path: &[String]) -> Option<HashMap<String, String>> {
        let mut params = HashMap::new();

        for (idx, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(text) => {
                    if path.get(idx)? != text {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = path.get(idx)?;
                    if value.is_empty() {
                        return None;
                    }
                    params.insert(name.clone(), value.clone());
                }
                Segment::Wildcard(name) => {
                    params.insert(name.clone(), path[idx..].join("/"));
                    return Some(params);
                }
            }
        }

        (path.len() == self.segments.len()).then_some(params)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_segment(pattern: &str, raw: &str) -> Result<Segment, PatternError> {
    let malformed = || PatternError::MalformedSegment {
        pattern: pattern.to_string(),
        segment: raw.to_string(),
    };

    if let Some(inner) = raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        let (wildcard, name) = match inner.strip_prefix('*') {
            Some(name) => (true, name),
            None => (false, inner),
        };
        if name.is_empty() {
            return Err(PatternError::EmptyPlaceholder(pattern.to_string()));
        }
        if name.contains(['{', '}', '*']) {
            return Err(malformed());
        }
        return Ok(if wildcard {
            Segment::Wildcard(name.to_string())
        } else {
            Segment::Param(name.to_string())
        });
    }

    if raw.contains(['{', '}']) {
        return Err(malformed());
    }
    Ok(Segment::Literal(percent_decode(raw)))
}

/// Split a raw request path into percent-decoded segments.
///
/// `/` has no segments; `/a/` has two (`a` and an empty one). An encoded
/// `%2F` stays inside its segment.
pub fn split_path(raw_path: &str) -> SmallVec<[String; 8]> {
    let rest = raw_path.strip_prefix('/').unwrap_or(raw_path);
    if rest.is_empty() {
        return SmallVec::new();
    }
    rest.split('/').map(percent_decode).collect()
}

/// Route definition with handler
#[derive(Debug, Clone)]
pub struct Route {
    pub method: MethodFilter,
    pub pattern: Pattern,
    pub handler: BoxedHandler,
}

/// A successful lookup: the matched route and its extracted parameters.
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub params: HashMap<String, String>,
}

/// Ordered route table.
///
/// Mutable while the server is being configured, then frozen behind an
/// `Arc` and shared read-only by every connection.
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
    fallback: Option<BoxedHandler>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `pattern` and register `handler` for `method`.
    pub fn add<H, Args>(
        &mut self,
        method: impl Into<MethodFilter>,
        pattern: &str,
        handler: H,
    ) -> Result<&mut Self, Error>
    where
        H: IntoHandler<Args>,
    {
        let route = Route {
            method: method.into(),
            pattern: Pattern::parse(pattern)?,
            handler: handler.into_handler(),
        };
        self.add_route(route);
        Ok(self)
    }

    /// Add a route to the router
    pub fn add_route(&mut self, route: Route) {
        if self
            .routes
            .iter()
            .any(|r| r.method == route.method && r.pattern == route.pattern)
        {
            warn!(
                method = %route.method,
                pattern = %route.pattern,
                "Route registered twice; the later registration is unreachable"
            );
        }
        self.routes.push(route);
    }

    /// Handler used when no route matches, instead of the built-in 404.
    pub fn set_fallback<H, Args>(&mut self, handler: H)
    where
        H: IntoHandler<Args>,
    {
        self.fallback = Some(handler.into_handler());
    }

    pub fn fallback(&self) -> Option<&BoxedHandler> {
        self.fallback.as_ref()
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Find the first route matching `method` and `raw_path`.
    ///
    /// A HEAD request with no HEAD (or catch-all) route falls back to GET.
    pub fn find(&self, method: HttpMethod, raw_path: &str) -> Option<RouteMatch<'_>> {
        let segments = split_path(raw_path);
        self.scan(method, &segments).or_else(|| {
            if method == HttpMethod::HEAD {
                self.scan(HttpMethod::GET, &segments)
            } else {
                None
            }
        })
    }

    fn scan(&self, method: HttpMethod, segments: &[String]) -> Option<RouteMatch<'_>> {
        self.routes
            .iter()
            .filter(|route| route.method.matches(method))
            .find_map(|route| {
                let params = route.pattern.matches(segments)?;
                trace!(pattern = %route.pattern, "Route matched");
                Some(RouteMatch { route, params })
            })
    }
}
