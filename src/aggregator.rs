//! Typed aggregation state (spec §3, §4.4) behind one mutex (spec §5).
//!
//! `Aggregator` is the ingestion half of the engine: [`Aggregator::handle`]
//! is what a UDP receive loop calls per datagram. The flush half lives in
//! [`crate::flush::FlushEngine`], which takes the same lock to read and
//! reset this state every tick.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::parse::{self, ParsedSample};
use crate::sanitize::{sanitize, SanitizedKey};
use crate::tags::{self, Tags};

/// The five maps from spec §3, plus `keys_seen`. Kept as one struct behind
/// one [`Mutex`] rather than five independently-locked maps, so a flush
/// tick sees a consistent snapshot across all of them.
#[derive(Default)]
pub(crate) struct AggregatorState {
    pub(crate) counters: HashMap<SanitizedKey, i64>,
    pub(crate) gauges: HashMap<SanitizedKey, f64>,
    pub(crate) timers: HashMap<SanitizedKey, Vec<f64>>,
    pub(crate) sets: HashMap<SanitizedKey, HashSet<String>>,
    pub(crate) keys_seen: HashMap<SanitizedKey, Option<Tags>>,
}

pub struct Aggregator {
    state: Mutex<AggregatorState>,
    default_tags: Option<Tags>,
}

impl Aggregator {
    pub fn new(default_tags: Option<Tags>) -> Self {
        Self {
            state: Mutex::new(AggregatorState::default()),
            default_tags,
        }
    }

    /// Parses a complete UDP datagram payload and applies every sample it
    /// contains. Never returns an error: malformed lines/samples are
    /// logged and dropped, the rest of the datagram is still processed
    /// (spec §7, §9).
    pub fn handle(&self, data: &[u8]) {
        let text = String::from_utf8_lossy(data);
        for line in text.split('\n') {
            let Some(parsed) = parse::parse_line(line) else {
                continue;
            };
            if parsed.samples.is_empty() {
                bad_line(line);
                continue;
            }
            for raw_sample in &parsed.samples {
                match parse::parse_sample(raw_sample) {
                    Ok(sample) => self.apply_sample(&parsed.key, &parsed.tags, sample),
                    Err(_) => bad_line(line),
                }
            }
        }
    }

    fn apply_sample(&self, key: &SanitizedKey, sample_tags: &Option<Tags>, sample: ParsedSample) {
        let coalesced = tags::coalesce(sample_tags.clone(), &self.default_tags);
        let mut state = self.state.lock().expect("aggregator mutex poisoned");
        match sample {
            ParsedSample::Timer(value) => {
                state.timers.entry(key.clone()).or_default().push(value);
            }
            ParsedSample::Gauge { value, is_delta } => {
                if is_delta {
                    if let Some(existing) = state.gauges.get_mut(key) {
                        *existing += value;
                    } else {
                        // A signed value on a previously-unseen key is
                        // absolute, not a delta against an implicit zero.
                        state.gauges.insert(key.clone(), value);
                    }
                } else {
                    state.gauges.insert(key.clone(), value);
                }
            }
            ParsedSample::Set(value) => {
                state.sets.entry(key.clone()).or_default().insert(value);
            }
            ParsedSample::Counter(value) => {
                *state.counters.entry(key.clone()).or_insert(0) += value;
            }
        }
        state.keys_seen.insert(key.clone(), coalesced);
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, AggregatorState> {
        self.state.lock().expect("aggregator mutex poisoned")
    }
}

fn bad_line(line: &str) {
    tracing::error!("StatsD: invalid line: '{}'", line.trim());
}
