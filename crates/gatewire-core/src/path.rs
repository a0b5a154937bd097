//! Path and host glob matching (C1).
//!
//! `PathMatcher` compiles a route's declared path pattern into an anchored,
//! case-insensitive regex once, at route-construction time, and is shared
//! across requests via `Arc`. Pattern grammar: `^((/[^/*]*)*)(/(\*{1,2}))?$`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("invalid path pattern: {0}")]
    InvalidPattern(String),
}

/// Accepts a leading-slash path, `/*` (one more segment, optional), or
/// `/**` (any suffix, optional). Rejects embedded globs like `/*/app`.
static PATTERN_GRAMMAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^((/[^/*]*)*)(/(\*{1,2}))?$").expect("static grammar regex"));

#[derive(Debug, Clone)]
pub struct PathMatcher {
    raw: String,
    app_path: String,
    regex: Arc<Regex>,
}

impl PathMatcher {
    /// Compiles `pattern` into a matcher, rejecting anything that doesn't
    /// conform to the path grammar.
    pub fn new(pattern: &str) -> Result<Self, PathError> {
        let caps = PATTERN_GRAMMAR
            .captures(pattern)
            .ok_or_else(|| PathError::InvalidPattern(pattern.to_string()))?;

        let app_path = caps.get(1).map(|m| m.as_str()).unwrap_or("").to_string();
        let glob = caps.get(4).map(|m| m.as_str());

        let literal = regex::escape(&app_path);
        let body = match glob {
            None => literal,
            Some("*") => format!("{literal}(/[^/]*)?"),
            Some("**") => format!("{literal}(/.*)?"),
            Some(other) => {
                return Err(PathError::InvalidPattern(format!(
                    "unsupported glob suffix '{other}' in {pattern}"
                )))
            }
        };

        let anchored = format!("(?i)^{body}$");
        let regex = Regex::new(&anchored)
            .map_err(|e| PathError::InvalidPattern(format!("{pattern}: {e}")))?;

        Ok(Self {
            raw: pattern.to_string(),
            app_path,
            regex: Arc::new(regex),
        })
    }

    /// The literal prefix of the pattern, before any glob suffix. Used to
    /// mount nested routers and to compute request rest-paths.
    pub fn app_path(&self) -> &str {
        &self.app_path
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Tests `path`, returning the rest-path capture (possibly empty) on a
    /// match. `None` means the path does not match this route at all.
    pub fn matches<'a>(&self, path: &'a str) -> Option<&'a str> {
        let caps = self.regex.captures(path)?;
        match caps.get(1) {
            Some(rest) => Some(rest.as_str().trim_start_matches('/')),
            None => Some(""),
        }
    }
}

/// Host glob matching: `*.a.b` matches exactly one dot-separated label,
/// never zero and never more than one.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    regex: Arc<Regex>,
}

impl HostMatcher {
    pub fn new(pattern: &str) -> Result<Self, PathError> {
        let labels: Vec<String> = pattern
            .split('.')
            .map(|label| {
                if label == "*" {
                    r"[^.]+".to_string()
                } else {
                    regex::escape(label)
                }
            })
            .collect();
        let body = labels.join(r"\.");
        let anchored = format!("(?i)^{body}$");
        let regex = Regex::new(&anchored)
            .map_err(|e| PathError::InvalidPattern(format!("{pattern}: {e}")))?;
        Ok(Self {
            regex: Arc::new(regex),
        })
    }

    pub fn matches(&self, host: &str) -> bool {
        self.regex.is_match(host)
    }
}

/// An ordered set of host globs; matches if any member matches.
#[derive(Debug, Clone, Default)]
pub struct HostMatchers(Vec<HostMatcher>);

impl HostMatchers {
    pub fn new(patterns: &[String]) -> Result<Self, PathError> {
        let matchers = patterns
            .iter()
            .map(|p| HostMatcher::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(matchers))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, host: &str) -> bool {
        self.0.iter().any(|m| m.matches(host))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_path_matches_only_itself() {
        let m = PathMatcher::new("/app").unwrap();
        assert_eq!(m.matches("/app"), Some(""));
        assert_eq!(m.matches("/app/x"), None);
        assert_eq!(m.app_path(), "/app");
    }

    #[test]
    fn single_glob_allows_one_extra_segment() {
        let m = PathMatcher::new("/app/*").unwrap();
        assert_eq!(m.matches("/app"), Some(""));
        assert_eq!(m.matches("/app/x"), Some("x"));
        assert_eq!(m.matches("/app/x/y"), None);
    }

    #[test]
    fn double_glob_allows_any_depth() {
        let m = PathMatcher::new("/app/**").unwrap();
        assert_eq!(m.matches("/app/x/y"), Some("x/y"));
        assert_eq!(m.matches("/app"), Some(""));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let m = PathMatcher::new("/App/**").unwrap();
        assert!(m.matches("/app/X").is_some());
    }

    #[test]
    fn embedded_glob_rejected() {
        assert!(PathMatcher::new("/*/app").is_err());
        assert!(PathMatcher::new("/app/***").is_err());
    }

    #[test]
    fn host_glob_matches_single_label() {
        let m = HostMatcher::new("*.example.com").unwrap();
        assert!(m.matches("api.example.com"));
        assert!(!m.matches("a.b.example.com"));
        assert!(!m.matches("example.com"));
    }
}
