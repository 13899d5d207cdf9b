//! Datagram → line → sample parsing (spec §4.3, §4.4).
//!
//! Everything here is pure: no locking, no aggregation state. [`crate::aggregator::Aggregator`]
//! drives this module and only takes its mutex once it has a fully parsed
//! sample ready to apply.

use crate::sanitize::{self, SanitizedKey};
use crate::tags::{self, Tags};

/// A line failed to parse into at least one valid sample. Never escapes
/// `Aggregator::handle` — the caller just logs the offending line and
/// moves on, matching the reference implementation's `bad_line()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadLine;

/// One non-blank line of a datagram, with tags stripped and the key
/// sanitized, but samples still in raw `value|type[|@rate]` form.
///
/// Owns its fields rather than borrowing from the input line: tag
/// parsing may need to reattach a leftover suffix that isn't a
/// contiguous slice of the original line (spec §4.2's tags/sample-list
/// boundary), so there's no single input lifetime left to borrow from.
pub struct ParsedLine {
    pub key: SanitizedKey,
    pub tags: Option<Tags>,
    pub samples: Vec<String>,
}

/// Splits a line into its sanitized key, tags, and raw sample fields.
/// Returns `None` for blank/whitespace-only lines, which are silently
/// skipped per spec (not a bad line).
pub fn parse_line(line: &str) -> Option<ParsedLine> {
    if line.trim().is_empty() {
        return None;
    }
    let (stripped, tags) = tags::split_tags(line);
    let mut fields = stripped.split(':');
    let raw_key = fields.next().unwrap_or("");
    let key = sanitize::sanitize(raw_key);
    let samples: Vec<String> = fields.map(String::from).collect();
    Some(ParsedLine { key, tags, samples })
}

/// The dispatch-by-type-code closed enum (spec §9's "type dispatch by
/// string code → a closed enum of sample kinds built once during parse").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    Timer,
    Gauge,
    Set,
    Counter,
}

pub fn classify(type_code: &str) -> SampleKind {
    match type_code {
        "ms" => SampleKind::Timer,
        "g" => SampleKind::Gauge,
        "s" => SampleKind::Set,
        _ => SampleKind::Counter,
    }
}

/// A single `value|type[|@rate]` sample, fully parsed and ready to apply
/// to the aggregator's state under lock.
pub enum ParsedSample {
    Timer(f64),
    Gauge { value: f64, is_delta: bool },
    Set(String),
    Counter(i64),
}

/// Splits one `|`-delimited sample into fields, then parses it by type.
/// Returns `Err(BadLine)` if there's no `|` at all, or if the numeric
/// fields don't parse — the caller drops just this sample and continues
/// with the rest of the datagram.
pub fn parse_sample(raw: &str) -> Result<ParsedSample, BadLine> {
    if !raw.contains('|') {
        return Err(BadLine);
    }
    let fields: Vec<&str> = raw.split('|').collect();
    match classify(fields[1]) {
        SampleKind::Timer => parse_timer(&fields).map(ParsedSample::Timer),
        SampleKind::Gauge => parse_gauge(&fields).map(|(value, is_delta)| ParsedSample::Gauge {
            value,
            is_delta,
        }),
        SampleKind::Set => Ok(ParsedSample::Set(parse_set(&fields))),
        SampleKind::Counter => parse_counter(&fields).map(ParsedSample::Counter),
    }
}

fn field_or_zero(fields: &[&str]) -> &str {
    match fields.first() {
        Some(&"") | None => "0",
        Some(f) => f,
    }
}

fn parse_timer(fields: &[&str]) -> Result<f64, BadLine> {
    field_or_zero(fields).parse::<f64>().map_err(|_| BadLine)
}

fn parse_gauge(fields: &[&str]) -> Result<(f64, bool), BadLine> {
    let raw = field_or_zero(fields);
    let value = raw.parse::<f64>().map_err(|_| BadLine)?;
    let is_delta = matches!(raw.as_bytes().first(), Some(b'+') | Some(b'-'));
    Ok((value, is_delta))
}

fn parse_set(fields: &[&str]) -> String {
    field_or_zero(fields).to_string()
}

/// Non-positive or unparseable sampling rates are treated as invalid and
/// fall back to `1.0` (spec §9 Open Questions: the reference implementation
/// divides by whatever it parses, including zero or negative; we don't).
fn parse_counter(fields: &[&str]) -> Result<i64, BadLine> {
    let rate = fields
        .get(2)
        .and_then(|f| f.strip_prefix('@'))
        .and_then(|f| f.trim().parse::<f64>().ok())
        .filter(|r| *r > 0.0)
        .unwrap_or(1.0);
    let value = field_or_zero(fields).parse::<f64>().map_err(|_| BadLine)?;
    Ok((value / rate) as i64)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_multi_sample_line() {
        let parsed = parse_line("m:1|c:2|ms:3|g").unwrap();
        assert_eq!(parsed.key.as_str(), "m");
        assert_eq!(parsed.samples, vec!["1|c", "2|ms", "3|g"]);
    }

    #[test]
    fn blank_line_is_none() {
        assert!(parse_line("   ").is_none());
        assert!(parse_line("").is_none());
    }

    #[test]
    fn sample_missing_pipe_is_bad_line() {
        assert_eq!(parse_sample("123"), Err(BadLine));
    }

    #[test]
    fn counter_default_type_code() {
        match parse_sample("5|c").unwrap() {
            ParsedSample::Counter(v) => assert_eq!(v, 5),
            _ => panic!("expected counter"),
        }
    }

    #[test]
    fn counter_unknown_type_code_falls_back_to_counter() {
        match parse_sample("5|whatever").unwrap() {
            ParsedSample::Counter(v) => assert_eq!(v, 5),
            _ => panic!("expected counter"),
        }
    }

    #[test]
    fn counter_applies_sampling_rate() {
        match parse_sample("5|c|@0.5").unwrap() {
            ParsedSample::Counter(v) => assert_eq!(v, 10),
            _ => panic!("expected counter"),
        }
    }

    #[test]
    fn counter_non_positive_rate_falls_back_to_one() {
        match parse_sample("5|c|@0").unwrap() {
            ParsedSample::Counter(v) => assert_eq!(v, 5),
            _ => panic!("expected counter"),
        }
        match parse_sample("5|c|@-2").unwrap() {
            ParsedSample::Counter(v) => assert_eq!(v, 5),
            _ => panic!("expected counter"),
        }
    }

    #[test]
    fn gauge_delta_detection() {
        match parse_sample("+5|g").unwrap() {
            ParsedSample::Gauge { value, is_delta } => {
                assert_eq!(value, 5.0);
                assert!(is_delta);
            }
            _ => panic!("expected gauge"),
        }
        match parse_sample("5|g").unwrap() {
            ParsedSample::Gauge { value, is_delta } => {
                assert_eq!(value, 5.0);
                assert!(!is_delta);
            }
            _ => panic!("expected gauge"),
        }
    }

    #[test]
    fn set_empty_value_is_literal_zero() {
        match parse_sample("|s").unwrap() {
            ParsedSample::Set(v) => assert_eq!(v, "0"),
            _ => panic!("expected set"),
        }
    }

    #[test]
    fn timer_bad_numeric_value() {
        assert_eq!(parse_sample("abc|ms"), Err(BadLine));
    }
}
