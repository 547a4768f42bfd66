//! Path matching logic.
//!
//! # Responsibilities
//! - Normalize request and route paths
//! - Compile route paths into literal segments plus at most one `{param}`
//! - Match a normalized request path and capture the parameter
//!
//! # Design Decisions
//! - Path matching is exact and case-sensitive; no prefix matching
//! - A parameter binds exactly one non-empty path component
//! - No regex to guarantee O(n) matching

use std::fmt;

/// Collapse repeated slashes, drop a trailing slash and ensure a leading one.
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// A parameter value captured from a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathParam {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A compiled route path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathPattern {
    normalized: String,
    segments: Vec<Segment>,
}

/// Why a route path failed to compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    NotAbsolute,
    MalformedParam(String),
    MultipleParams,
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternError::NotAbsolute => write!(f, "must start with '/'"),
            PatternError::MalformedParam(s) => write!(f, "malformed path parameter segment: {}", s),
            PatternError::MultipleParams => write!(f, "at most one path parameter is allowed"),
        }
    }
}

impl PathPattern {
    /// Compile a route path such as `/v1/responses/{response_id}`.
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        if !raw.starts_with('/') {
            return Err(PatternError::NotAbsolute);
        }
        let normalized = normalize_path(raw);

        let mut segments = Vec::new();
        let mut params = 0;
        for part in normalized.split('/').filter(|s| !s.is_empty()) {
            if part.contains(['{', '}']) {
                let name = part
                    .strip_prefix('{')
                    .and_then(|p| p.strip_suffix('}'))
                    .filter(|n| is_param_name(n))
                    .ok_or_else(|| PatternError::MalformedParam(part.to_string()))?;
                params += 1;
                if params > 1 {
                    return Err(PatternError::MultipleParams);
                }
                segments.push(Segment::Param(name.to_string()));
            } else {
                segments.push(Segment::Literal(part.to_string()));
            }
        }

        Ok(Self {
            normalized,
            segments,
        })
    }

    /// The normalized route path, template included.
    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    /// Name of the parameter segment, if the pattern has one.
    pub fn param_name(&self) -> Option<&str> {
        self.segments.iter().find_map(|s| match s {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Match a normalized request path.
    ///
    /// Returns `None` on mismatch, otherwise the captured parameter (if the
    /// pattern has one).
    pub fn matches(&self, path: &str) -> Option<Option<PathParam>> {
        let mut parts = path.split('/').filter(|s| !s.is_empty());
        let mut captured = None;

        for segment in &self.segments {
            let part = parts.next()?;
            match segment {
                Segment::Literal(lit) => {
                    if lit != part {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    if !is_single_component(part) {
                        return None;
                    }
                    captured = Some(PathParam {
                        name: name.clone(),
                        value: part.to_string(),
                    });
                }
            }
        }

        if parts.next().is_some() {
            return None;
        }
        Some(captured)
    }
}

/// A captured value must stay one component once substituted into the
/// upstream URL: no encoded separators, and no `.`/`..` that URL parsing
/// would resolve against the neighbouring segments.
fn is_single_component(part: &str) -> bool {
    let lower = part.to_ascii_lowercase();
    if lower.contains("%2f") || lower.contains("%5c") || lower.contains('\\') {
        return false;
    }
    let decoded = lower.replace("%2e", ".");
    decoded != "." && decoded != ".."
}

fn is_param_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
