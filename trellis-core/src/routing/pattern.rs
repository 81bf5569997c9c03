//! Route patterns.
//!
//! A pattern is a URL path whose segments are either literal or a dynamic
//! capture written `[name]`. It compiles to an anchored regex in which
//! literals are escaped and every capture matches exactly one non-empty
//! path segment.

use indexmap::IndexMap;
use regex::Regex;
use smallvec::SmallVec;

use super::RouteError;

/// Captured parameter values, in declaration order.
pub type Params = IndexMap<String, String>;

#[derive(Debug, Clone)]
pub struct RoutePattern {
    source: String,
    matcher: Regex,
    params: SmallVec<[String; 4]>,
}

impl RoutePattern {
    /// Compile a pattern such as `/users/[id]`.
    pub fn parse(pattern: &str) -> Result<Self, RouteError> {
        let source = if pattern.starts_with('/') {
            pattern.to_string()
        } else {
            format!("/{pattern}")
        };

        let mut params: SmallVec<[String; 4]> = SmallVec::new();
        let mut expr = String::from("^");
        let segments: Vec<&str> = match source.as_str() {
            "/" => Vec::new(),
            path => path[1..].split('/').collect(),
        };

        if segments.is_empty() {
            expr.push('/');
        }

        for segment in segments {
            expr.push('/');

            match capture_name(segment) {
                Some(name) => {
                    if name.is_empty() || name.contains(['[', ']']) {
                        return Err(invalid(&source, segment));
                    }
                    if params.iter().any(|p| p == name) {
                        return Err(RouteError::DuplicateParam {
                            pattern: source.clone(),
                            name: name.to_string(),
                        });
                    }
                    params.push(name.to_string());
                    expr.push_str("([^/]+)");
                }
                None if segment.contains(['[', ']']) || segment.is_empty() => {
                    return Err(invalid(&source, segment));
                }
                None => expr.push_str(&regex::escape(segment)),
            }
        }

        expr.push('$');

        Ok(Self {
            matcher: Regex::new(&expr)?,
            source,
            params,
        })
    }

    /// The pattern as written, always with a leading slash.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Parameter names in declaration order.
    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Match an already normalized path, zipping captures with names.
    pub fn captures(&self, path: &str) -> Option<Params> {
        let caps = self.matcher.captures(path)?;
        Some(
            self.params
                .iter()
                .zip(caps.iter().skip(1))
                .map(|(name, value)| {
                    let value = value.map(|m| m.as_str()).unwrap_or_default();
                    (name.clone(), value.to_string())
                })
                .collect(),
        )
    }
}

fn capture_name(segment: &str) -> Option<&str> {
    segment.strip_prefix('[')?.strip_suffix(']')
}

fn invalid(pattern: &str, segment: &str) -> RouteError {
    RouteError::InvalidSegment {
        pattern: pattern.to_string(),
        segment: segment.to_string(),
    }
}
