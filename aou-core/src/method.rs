// HTTP methods and route method filters

use crate::ParseError;
use std::fmt;
use std::str::FromStr;

/// HTTP methods
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    GET,
    HEAD,
    POST,
    PUT,
    DELETE,
    CONNECT,
    OPTIONS,
    TRACE,
    PATCH,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 9] = [
        HttpMethod::GET,
        HttpMethod::HEAD,
        HttpMethod::POST,
        HttpMethod::PUT,
        HttpMethod::DELETE,
        HttpMethod::CONNECT,
        HttpMethod::OPTIONS,
        HttpMethod::TRACE,
        HttpMethod::PATCH,
    ];

    /// Method tokens are case-sensitive on the wire.
    pub fn from_bytes(token: &[u8]) -> Option<Self> {
        match token {
            b"GET" => Some(HttpMethod::GET),
            b"HEAD" => Some(HttpMethod::HEAD),
            b"POST" => Some(HttpMethod::POST),
            b"PUT" => Some(HttpMethod::PUT),
            b"DELETE" => Some(HttpMethod::DELETE),
            b"CONNECT" => Some(HttpMethod::CONNECT),
            b"OPTIONS" => Some(HttpMethod::OPTIONS),
            b"TRACE" => Some(HttpMethod::TRACE),
            b"PATCH" => Some(HttpMethod::PATCH),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::HEAD => "HEAD",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::CONNECT => "CONNECT",
            HttpMethod::OPTIONS => "OPTIONS",
            HttpMethod::TRACE => "TRACE",
            HttpMethod::PATCH => "PATCH",
        }
    }
}

impl FromStr for HttpMethod {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bytes(s.as_bytes()).ok_or_else(|| ParseError::UnknownMethod(s.to_string()))
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which requests a route accepts: a single verb or any verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodFilter {
    Only(HttpMethod),
    All,
}

impl MethodFilter {
    pub fn matches(&self, method: HttpMethod) -> bool {
        match self {
            MethodFilter::Only(expected) => *expected == method,
            MethodFilter::All => true,
        }
    }
}

impl From<HttpMethod> for MethodFilter {
    fn from(method: HttpMethod) -> Self {
        MethodFilter::Only(method)
    }
}

impl fmt::Display for MethodFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodFilter::Only(method) => method.fmt(f),
            MethodFilter::All => f.write_str("ALL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_method_round_trips() {
        for method in HttpMethod::ALL {
            assert_eq!(method.as_str().parse::<HttpMethod>(), Ok(method));
        }
    }

    #[test]
    fn test_methods_are_case_sensitive() {
        assert!(HttpMethod::from_bytes(b"get").is_none());
        assert_eq!(
            "BREW".parse::<HttpMethod>(),
            Err(ParseError::UnknownMethod("BREW".into()))
        );
    }

    #[test]
    fn test_method_filter() {
        assert!(MethodFilter::All.matches(HttpMethod::PATCH));
        assert!(MethodFilter::Only(HttpMethod::GET).matches(HttpMethod::GET));
        assert!(!MethodFilter::Only(HttpMethod::GET).matches(HttpMethod::POST));
        assert_eq!(MethodFilter::All.to_string(), "ALL");
    }
}
