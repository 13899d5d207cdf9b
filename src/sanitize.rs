//! Metric key sanitization (spec §4.1).
//!
//! Applied once per incoming line, to the raw key portion before the
//! first `:`. The result is guaranteed to be idempotent:
//! `sanitize(sanitize(x).as_str()) == sanitize(x)`.

use derive_more::{Deref, Display};

/// A metric name that has already passed through [`sanitize`]. Kept as a
/// distinct type so call sites can't accidentally key the aggregation maps
/// off an un-sanitized string.
#[derive(Clone, Debug, Display, Deref, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SanitizedKey(String);

impl SanitizedKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Collapses whitespace runs to `_`, maps `/` to `-`, and drops any
/// character outside `[A-Za-z_\-0-9.]`.
pub fn sanitize(raw: &str) -> SanitizedKey {
    let mut collapsed = String::with_capacity(raw.len());
    let mut in_whitespace_run = false;
    for ch in raw.chars() {
        if ch.is_whitespace() {
            if !in_whitespace_run {
                collapsed.push('_');
            }
            in_whitespace_run = true;
        } else {
            collapsed.push(ch);
            in_whitespace_run = false;
        }
    }

    let mut out = String::with_capacity(collapsed.len());
    for ch in collapsed.chars() {
        match ch {
            '/' => out.push('-'),
            c if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' => out.push(c),
            _ => {}
        }
    }
    SanitizedKey(out)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn collapses_whitespace() {
        assert_eq!(sanitize("foo   bar\tbaz").as_str(), "foo_bar_baz");
    }

    #[test]
    fn slash_becomes_hyphen() {
        assert_eq!(sanitize("a/b/c").as_str(), "a-b-c");
    }

    #[test]
    fn strips_disallowed_characters() {
        assert_eq!(sanitize("foo!@#bar$%^").as_str(), "foobar");
    }

    #[test]
    fn keeps_allowed_characters() {
        assert_eq!(sanitize("foo.Bar-Baz_42").as_str(), "foo.Bar-Baz_42");
    }

    #[test]
    fn idempotent() {
        let raw = "weird /key with\t\tspaces!!";
        let once = sanitize(raw);
        let twice = sanitize(once.as_str());
        assert_eq!(once, twice);
    }
}
