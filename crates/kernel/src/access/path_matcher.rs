//! Ant-style path matching.
//!
//! Patterns are split on `/` into segments and compared against the
//! request path segment by segment:
//!
//! - `?` matches one character
//! - `*` matches zero or more characters within a segment
//! - `**` matches zero or more whole segments
//! - `{name}` matches a segment value, `{name:regex}` one matching `regex`
//!
//! The pattern is always the template and the request path the candidate.
//! A pattern that cannot be compiled never matches.

use std::sync::Arc;

use dashmap::DashMap;
use regex::Regex;

/// Upper bound on the compiled segment cache.
///
/// Rule tables are small; a pattern set large enough to hit this is almost
/// certainly generated, and compiling on demand is then cheaper than growing
/// the map forever.
const SEGMENT_CACHE_LIMIT: usize = 65_536;

/// Ant-style path matcher with a shared cache of compiled segment patterns.
///
/// Cloning is cheap and clones share the cache.
#[derive(Clone, Default)]
pub struct PathMatcher {
    segments: Arc<DashMap<String, Option<Regex>>>,
}

impl PathMatcher {
    /// Create a matcher with an empty segment cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Test whether `path` matches `pattern`.
    pub fn matches(&self, pattern: &str, path: &str) -> bool {
        if path.starts_with('/') != pattern.starts_with('/') {
            return false;
        }

        let patt: Vec<&str> = tokenize(pattern);
        let dirs: Vec<&str> = tokenize(path);

        // Half-open windows over the unmatched parts of each side.
        let (mut ps, mut pe) = (0, patt.len());
        let (mut qs, mut qe) = (0, dirs.len());

        // Leading segments, up to the first `**`.
        while ps < pe && qs < qe {
            let seg = patt[ps];
            if seg == "**" {
                break;
            }
            if !self.match_segment(seg, dirs[qs]) {
                return false;
            }
            ps += 1;
            qs += 1;
        }

        if qs == qe {
            if ps == pe {
                return pattern.ends_with('/') == path.ends_with('/');
            }
            if ps + 1 == pe && patt[ps] == "*" && path.ends_with('/') {
                return true;
            }
            return only_double_stars(&patt[ps..pe]);
        }
        if ps == pe {
            return false;
        }

        // Trailing segments, back to the last `**`.
        while ps < pe && qs < qe {
            let seg = patt[pe - 1];
            if seg == "**" {
                break;
            }
            if !self.match_segment(seg, dirs[qe - 1]) {
                return false;
            }
            pe -= 1;
            qe -= 1;
        }

        if qs == qe {
            return only_double_stars(&patt[ps..pe]);
        }

        // Both window ends now sit on `**`. Each run of plain segments
        // between two `**` must appear, in order, somewhere in the path.
        while ps + 1 < pe && qs < qe {
            let Some(next) = (ps + 1..pe).find(|&i| patt[i] == "**") else {
                return false;
            };
            if next == ps + 1 {
                // `**/**`
                ps += 1;
                continue;
            }

            let run = &patt[ps + 1..next];
            let window = qe - qs;
            if run.len() > window {
                return false;
            }

            let found = (0..=window - run.len()).find(|&offset| {
                run.iter()
                    .zip(&dirs[qs + offset..])
                    .all(|(seg, dir)| self.match_segment(seg, dir))
            });
            let Some(offset) = found else {
                return false;
            };

            ps = next;
            qs += offset + run.len();
        }

        only_double_stars(&patt[ps..pe])
    }

    /// Test whether a pattern contains any wildcard or variable syntax.
    pub fn is_pattern(pattern: &str) -> bool {
        pattern.contains(['*', '?', '{'])
    }

    fn match_segment(&self, pattern: &str, segment: &str) -> bool {
        if !Self::is_pattern(pattern) {
            return pattern == segment;
        }
        if pattern == "*" {
            return true;
        }

        if let Some(compiled) = self.segments.get(pattern) {
            return compiled.as_ref().is_some_and(|re| re.is_match(segment));
        }

        let compiled = compile_segment(pattern);
        let matched = compiled.as_ref().is_some_and(|re| re.is_match(segment));
        if self.segments.len() < SEGMENT_CACHE_LIMIT {
            self.segments.insert(pattern.to_string(), compiled);
        }
        matched
    }
}

impl std::fmt::Debug for PathMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathMatcher")
            .field("cached_segments", &self.segments.len())
            .finish()
    }
}

fn tokenize(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn only_double_stars(segments: &[&str]) -> bool {
    segments.iter().all(|s| *s == "**")
}

/// Translate one segment pattern into an anchored regex.
///
/// Returns `None` for unbalanced braces or an invalid custom regex.
fn compile_segment(pattern: &str) -> Option<Regex> {
    let mut expr = String::from("(?s)^");
    let mut literal = String::new();
    let mut chars = pattern.chars();

    while let Some(c) = chars.next() {
        match c {
            '*' | '?' | '{' => {
                expr.push_str(&regex::escape(&literal));
                literal.clear();
            }
            _ => {
                literal.push(c);
                continue;
            }
        }

        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            _ => {
                let mut depth = 1;
                let mut body = String::new();
                for inner in chars.by_ref() {
                    match inner {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    body.push(inner);
                }
                if depth != 0 {
                    return None;
                }

                match body.split_once(':') {
                    Some((_, custom)) => {
                        expr.push('(');
                        expr.push_str(custom);
                        expr.push(')');
                    }
                    None => expr.push_str("(.*)"),
                }
            }
        }
    }

    expr.push_str(&regex::escape(&literal));
    expr.push('$');
    Regex::new(&expr).ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn m(pattern: &str, path: &str) -> bool {
        PathMatcher::new().matches(pattern, path)
    }

    #[test]
    fn literal_paths() {
        assert!(m("/test", "/test"));
        assert!(m("test", "test"));
        assert!(!m("/test.jpg", "test.jpg"));
        assert!(!m("test", "/test"));
        assert!(!m("/test", "/testing"));
        assert!(!m("/admin", "/admin/"));
    }

    #[test]
    fn single_character_and_segment_wildcards() {
        assert!(m("t?st", "test"));
        assert!(m("??st", "test"));
        assert!(!m("tes?", "tes"));
        assert!(m("*", "test"));
        assert!(m("test*", "test"));
        assert!(m("test*", "testTest"));
        assert!(m("*test*", "AnothertestTest"));
        assert!(m("*.*", "test."));
        assert!(m("*.*", "test.test.test"));
        assert!(!m("test*aaa", "testblaaab"));
        assert!(!m("/????", "/bala/bla"));
    }

    #[test]
    fn single_star_stays_within_one_segment() {
        assert!(m("test/*", "test/Test"));
        assert!(m("test/*", "test/t"));
        assert!(m("test/*", "test/"));
        assert!(!m("test/*", "test"));
        assert!(!m("/public/*", "/public/a/b"));
        assert!(m("/*bla/test", "/XXXbla/test"));
        assert!(!m("/*bla/test", "XXXblab/test"));
        assert!(!m("/bla*bla/test", "/blaXXXbl/test"));
    }

    #[test]
    fn double_star_spans_segments() {
        assert!(m("/**", "/"));
        assert!(m("/**", "/anything/at/all"));
        assert!(m("/bla/**/bla", "/bla/bla"));
        assert!(m("/bla/**/bla", "/bla/testing/testing/bla"));
        assert!(m("/**/test", "/bla/bla/test"));
        assert!(m("/*/bla/**/bla", "/x/bla/testing/testing/bla"));
        assert!(m("/foo/bar/**", "/foo/bar"));
        assert!(m(
            "/*bla*/**/bla/**",
            "/XXXblaXXXX/testing/testing/bla/testing/testing/"
        ));
        assert!(!m("/**/*bla", "/bla/bla/bla/bbb"));
        assert!(!m("/x/x/**/bla", "/x/x/x/"));
        assert!(!m("/admin/**", "/administrator"));
    }

    #[test]
    fn path_variables() {
        assert!(m("/users/{id}", "/users/42"));
        assert!(!m("/users/{id}", "/users/42/edit"));
        assert!(m("/users/{id:\\d+}", "/users/42"));
        assert!(!m("/users/{id:\\d+}", "/users/abc"));
        assert!(m("/{bla}.*", "/testing.html"));
        assert!(m("/files/{name:[a-z]{2,4}}", "/files/abc"));
    }

    #[test]
    fn malformed_patterns_never_match() {
        assert!(!m("/users/{id", "/users/1"));
        assert!(!m("/users/{id:[}", "/users/1"));
        assert!(!m("/users/{id:(}", "/users/("));
    }

    #[test]
    fn compiled_segments_are_cached() {
        let matcher = PathMatcher::new();
        assert!(matcher.matches("/api/v*/users", "/api/v1/users"));
        assert!(matcher.matches("/api/v*/users", "/api/v2/users"));
        assert_eq!(matcher.segments.len(), 1);
    }

    #[test]
    fn is_pattern_detects_syntax() {
        assert!(PathMatcher::is_pattern("/admin/**"));
        assert!(PathMatcher::is_pattern("/users/{id}"));
        assert!(PathMatcher::is_pattern("/a?c"));
        assert!(!PathMatcher::is_pattern("/plain/path"));
    }
}
