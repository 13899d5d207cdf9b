//! DogStatsD tag parsing and coalescing (spec §4.2).
//!
//! A tag is either `key=value`, `key:value`, or a bare `key` (value `None`).
//! Order within a comma-separated list matters only in that later
//! duplicates win — this is a plain insertion into a `BTreeMap`, so later
//! wins for free.

use std::collections::BTreeMap;

/// Coalesced or raw per-sample tag mapping. `None` values mean "tag present,
/// no value" (e.g. `#beta` rather than `#region:us`).
pub type Tags = BTreeMap<String, Option<String>>;

/// Splits a line's tag annotation off, mirroring the reference
/// implementation's `line.split("#")`: only the first two pieces of the
/// `#`-split line matter, so a line with more than one `#` silently drops
/// everything after the second occurrence.
///
/// The wire grammar terminates a tag element's value — and with it the
/// whole tag list — at the first `:` that isn't consumed as that
/// element's own `key:value` separator (spec §6's grammar: the tag block
/// is immediately followed by `:<val>|<type>`). Each comma-separated
/// element consumes at most one `=` or `:` as its own separator; if
/// whatever follows still contains a `:`, that's where the sample list
/// actually begins, and everything from that `:` onward is reattached to
/// the returned remainder instead of being swallowed into the tag value.
///
/// Returns `(remainder, tags)`. `tags` is `None` when the line carries no
/// `#` at all.
pub fn split_tags(line: &str) -> (String, Option<Tags>) {
    let mut parts = line.splitn(3, '#');
    let prefix = parts.next().unwrap_or(line);
    let Some(tags_section) = parts.next() else {
        return (prefix.to_string(), None);
    };
    let (tags, leftover) = parse_tag_section(tags_section);
    let mut remainder = prefix.to_string();
    if let Some(leftover) = leftover {
        remainder.push_str(leftover);
    }
    (remainder, Some(tags))
}

/// Parses every comma-separated element of a tag section, stopping as
/// soon as one element reports a leftover suffix (the boundary between
/// tags and the sample list). Returns that leftover so the caller can
/// reattach it to the line's remainder.
fn parse_tag_section(section: &str) -> (Tags, Option<&str>) {
    let mut tags = Tags::new();
    let mut leftover = None;
    for element in section.split(',') {
        let (key, value, element_leftover) = parse_tag_element(element);
        tags.insert(key, value);
        if element_leftover.is_some() {
            leftover = element_leftover;
            break;
        }
    }
    (tags, leftover)
}

/// Parses one `key=value`, `key:value`, or bare `key` element, consuming
/// at most one `=`/`:` separator. If the value still contains a further
/// `:`, that's the tags/samples boundary: the value is truncated there
/// and the remainder (starting with that `:`) is returned as leftover.
fn parse_tag_element(element: &str) -> (String, Option<String>, Option<&str>) {
    if let Some(eq_pos) = element.find('=') {
        let key = element[..eq_pos].to_string();
        let rest = &element[eq_pos + 1..];
        return match rest.find(':') {
            Some(colon_pos) => (key, Some(rest[..colon_pos].to_string()), Some(&rest[colon_pos..])),
            None => (key, Some(rest.to_string()), None),
        };
    }
    if let Some(colon_pos) = element.find(':') {
        let key = element[..colon_pos].to_string();
        let rest = &element[colon_pos + 1..];
        return match rest.find(':') {
            Some(colon_pos2) => (key, Some(rest[..colon_pos2].to_string()), Some(&rest[colon_pos2..])),
            None => (key, Some(rest.to_string()), None),
        };
    }
    (element.to_string(), None, None)
}

/// Returns `true` for `Some(map)` where `map` is non-empty. An empty tag
/// map behaves like Python's falsy `{}`: the engine treats it the same as
/// `None` when deciding whether to attach a metadata tail to an emission.
pub fn is_present(tags: &Option<Tags>) -> bool {
    matches!(tags, Some(m) if !m.is_empty())
}

/// Merges a sample's own tags with the engine's configured default tags.
/// Default keys win on conflict. When the sample has no tags at all, the
/// coalesced value is exactly the configured defaults (spec §4.2).
pub fn coalesce(sample_tags: Option<Tags>, default_tags: &Option<Tags>) -> Option<Tags> {
    match sample_tags {
        Some(mut tags) => {
            if let Some(defaults) = default_tags {
                for (k, v) in defaults {
                    tags.insert(k.clone(), v.clone());
                }
            }
            Some(tags)
        }
        None => default_tags.clone(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn no_tags() {
        let (remainder, tags) = split_tags("foo:1|c");
        assert_eq!(remainder, "foo:1|c");
        assert!(tags.is_none());
    }

    #[test]
    fn equals_form() {
        let (remainder, tags) = split_tags("latency#region=us,ver=1:23|ms");
        assert_eq!(remainder, "latency:23|ms");
        let tags = tags.unwrap();
        assert_eq!(tags.get("region").unwrap().as_deref(), Some("us"));
        assert_eq!(tags.get("ver").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn colon_form() {
        let (remainder, tags) = split_tags("latency#region:us:23|ms");
        assert_eq!(remainder, "latency:23|ms");
        let tags = tags.unwrap();
        assert_eq!(tags.get("region").unwrap().as_deref(), Some("us"));
    }

    #[test]
    fn bare_key_form() {
        let (remainder, tags) = split_tags("latency#beta,region=us:23|ms");
        assert_eq!(remainder, "latency:23|ms");
        let tags = tags.unwrap();
        assert_eq!(tags.get("beta"), Some(&None));
        assert_eq!(tags.get("region").unwrap().as_deref(), Some("us"));
    }

    #[test]
    fn extra_hash_is_dropped() {
        let (remainder, tags) = split_tags("foo#a=1#b=2:1|c");
        assert_eq!(remainder, "foo");
        let tags = tags.unwrap();
        assert_eq!(tags.get("a").unwrap().as_deref(), Some("1"));
        assert!(!tags.contains_key("b"));
    }

    #[test]
    fn coalesce_no_sample_tags_uses_defaults() {
        let mut defaults = Tags::new();
        defaults.insert("env".to_string(), Some("prod".to_string()));
        let coalesced = coalesce(None, &Some(defaults.clone()));
        assert_eq!(coalesced, Some(defaults));
    }

    #[test]
    fn coalesce_defaults_win_on_conflict() {
        let mut sample = Tags::new();
        sample.insert("env".to_string(), Some("staging".to_string()));
        sample.insert("region".to_string(), Some("eu".to_string()));
        let mut defaults = Tags::new();
        defaults.insert("env".to_string(), Some("prod".to_string()));
        let coalesced = coalesce(Some(sample), &Some(defaults)).unwrap();
        assert_eq!(coalesced.get("env").unwrap().as_deref(), Some("prod"));
        assert_eq!(coalesced.get("region").unwrap().as_deref(), Some("eu"));
    }

    #[test]
    fn empty_tag_map_is_not_present() {
        assert!(!is_present(&Some(Tags::new())));
        assert!(!is_present(&None));
        let mut tags = Tags::new();
        tags.insert("a".to_string(), None);
        assert!(is_present(&Some(tags)));
    }
}
