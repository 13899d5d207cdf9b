//! The periodic flush tick (spec §4.5–§4.10): idle reaping, derived-metric
//! computation, and percentile math over timer samples.
//!
//! `FlushEngine::tick` takes the aggregator's lock once and holds it for
//! the entire tick, so every emission in the tick is consistent with every
//! other (spec §5). Percentile lookups are O(1) after one `O(n log n)`
//! sort via the cumulative-sum-array trick spec §9 calls out to keep.

use std::collections::HashSet;
use std::sync::Arc;

use crate::aggregator::{Aggregator, AggregatorState};
use crate::config::StatsdConfig;
use crate::queue::{EgressPoint, EgressSink};
use crate::sanitize::SanitizedKey;
use crate::tags::{self, Tags};

pub struct FlushEngine {
    aggregator: Arc<Aggregator>,
    config: StatsdConfig,
    sink: Arc<dyn EgressSink>,
}

impl FlushEngine {
    pub fn new(aggregator: Arc<Aggregator>, config: StatsdConfig, sink: Arc<dyn EgressSink>) -> Self {
        Self {
            aggregator,
            config,
            sink,
        }
    }

    /// Runs one tick at the given timestamp (integer seconds since epoch,
    /// captured once by the caller at tick start per spec §4.5).
    pub fn tick(&self, timestamp: i64) {
        let ns = Namespace::from_config(&self.config);
        let mut state = self.aggregator.lock();

        if self.config.delete_timers_effective() {
            reap_idle(&mut state.timers, &state.keys_seen);
        }
        if self.config.delete_counters_effective() {
            reap_idle(&mut state.counters, &state.keys_seen);
        }
        if self.config.delete_sets_effective() {
            reap_idle(&mut state.sets, &state.keys_seen);
        }

        let mut num_stats = 0usize;
        num_stats += self.emit_timers(&mut state, &ns, timestamp);
        let mut kept: HashSet<SanitizedKey> = state.timers.keys().cloned().collect();

        num_stats += self.emit_counters(&mut state, &ns, timestamp);
        kept.extend(state.counters.keys().cloned());

        num_stats += self.emit_gauges(&mut state, &ns, timestamp);
        kept.extend(state.gauges.keys().cloned());

        num_stats += self.emit_sets(&mut state, &ns, timestamp);
        kept.extend(state.sets.keys().cloned());

        self.enqueue(
            format!("{}numStats", ns.global),
            num_stats as f64,
            timestamp,
            self.config.metadata.clone(),
        );

        state.keys_seen.retain(|k, _| kept.contains(k));
    }

    fn enqueue(&self, name: String, value: f64, timestamp: i64, metadata: Option<Tags>) {
        let metadata = if tags::is_present(&metadata) { metadata } else { None };
        self.sink.send(EgressPoint::new(name, value, timestamp, metadata));
    }

    fn metadata_for(state: &AggregatorState, key: &SanitizedKey) -> Option<Tags> {
        state.keys_seen.get(key).cloned().flatten()
    }

    fn emit_timers(&self, state: &mut AggregatorState, ns: &Namespace, timestamp: i64) -> usize {
        let keys: Vec<SanitizedKey> = state.timers.keys().cloned().collect();
        let mut count = 0;
        for k in keys {
            let metadata = Self::metadata_for(state, &k);
            let samples = state.timers.get_mut(&k).expect("key just listed");

            if samples.is_empty() {
                self.enqueue(format!("{}{}.count", ns.timer, k), 0.0, timestamp, metadata.clone());
                self.enqueue(format!("{}{}.count_ps", ns.timer, k), 0.0, timestamp, metadata);
            } else {
                self.emit_timer_summary(samples, &k, ns, timestamp, metadata);
                samples.clear();
            }
            count += 1;
        }
        count
    }

    #[allow(clippy::too_many_lines)]
    fn emit_timer_summary(
        &self,
        samples: &mut [f64],
        key: &SanitizedKey,
        ns: &Namespace,
        timestamp: i64,
        metadata: Option<Tags>,
    ) {
        samples.sort_by(|a, b| a.partial_cmp(b).expect("statsd timer samples must not be NaN"));
        let count = samples.len();
        let vmin = samples[0];
        let vmax = samples[count - 1];

        let mut cumulative = Vec::with_capacity(count);
        let mut cumulative_sq = Vec::with_capacity(count);
        let mut running = 0.0;
        let mut running_sq = 0.0;
        for &value in samples.iter() {
            running += value;
            running_sq += value * value;
            cumulative.push(running);
            cumulative_sq.push(running_sq);
        }

        let cfg = &self.config;
        for &pct in &cfg.percentile_thresholds {
            let idx = (pct / 100.0 * count as f64).floor() as usize;
            if idx == 0 {
                continue;
            }
            let vsum = cumulative[idx - 1];
            let t = pct.trunc() as i64;

            if cfg.timer_mean {
                self.enqueue(
                    format!("{}{}.mean_{}", ns.timer, key, t),
                    vsum / idx as f64,
                    timestamp,
                    metadata.clone(),
                );
            }
            if cfg.timer_upper {
                self.enqueue(
                    format!("{}{}.upper_{}", ns.timer, key, t),
                    samples[idx - 1],
                    timestamp,
                    metadata.clone(),
                );
            }
            if cfg.timer_count {
                self.enqueue(
                    format!("{}{}.count_{}", ns.timer, key, t),
                    idx as f64,
                    timestamp,
                    metadata.clone(),
                );
            }
            if cfg.timer_sum {
                self.enqueue(
                    format!("{}{}.sum_{}", ns.timer, key, t),
                    vsum,
                    timestamp,
                    metadata.clone(),
                );
            }
            if cfg.timer_sum_squares {
                self.enqueue(
                    format!("{}{}.sum_squares_{}", ns.timer, key, t),
                    cumulative_sq[idx - 1],
                    timestamp,
                    metadata.clone(),
                );
            }
        }

        let vsum = cumulative[count - 1];
        let mean = vsum / count as f64;

        if cfg.timer_mean {
            self.enqueue(format!("{}{}.mean", ns.timer, key), mean, timestamp, metadata.clone());
        }
        if cfg.timer_upper {
            self.enqueue(format!("{}{}.upper", ns.timer, key), vmax, timestamp, metadata.clone());
        }
        if cfg.timer_lower {
            self.enqueue(format!("{}{}.lower", ns.timer, key), vmin, timestamp, metadata.clone());
        }
        if cfg.timer_count {
            self.enqueue(
                format!("{}{}.count", ns.timer, key),
                count as f64,
                timestamp,
                metadata.clone(),
            );
        }
        if cfg.timer_count_ps {
            self.enqueue(
                format!("{}{}.count_ps", ns.timer, key),
                count as f64 / cfg.flush_time as f64,
                timestamp,
                metadata.clone(),
            );
        }
        if cfg.timer_median {
            let mid = count / 2;
            let median = if count % 2 == 0 {
                (samples[mid - 1] + samples[mid]) / 2.0
            } else {
                samples[mid]
            };
            self.enqueue(format!("{}{}.median", ns.timer, key), median, timestamp, metadata.clone());
        }
        if cfg.timer_sum {
            self.enqueue(format!("{}{}.sum", ns.timer, key), vsum, timestamp, metadata.clone());
        }
        if cfg.timer_sum_squares {
            self.enqueue(
                format!("{}{}.sum_squares", ns.timer, key),
                cumulative_sq[count - 1],
                timestamp,
                metadata.clone(),
            );
        }
        if cfg.timer_std {
            let sum_of_diffs: f64 = samples.iter().map(|v| (v - mean).powi(2)).sum();
            let stddev = (sum_of_diffs / count as f64).sqrt();
            self.enqueue(format!("{}{}.std", ns.timer, key), stddev, timestamp, metadata);
        }
    }

    fn emit_counters(&self, state: &mut AggregatorState, ns: &Namespace, timestamp: i64) -> usize {
        let keys: Vec<SanitizedKey> = state.counters.keys().cloned().collect();
        for k in &keys {
            let value = *state.counters.get(k).expect("key just listed");
            let metadata = Self::metadata_for(state, k);
            let rate = value as f64 / self.config.flush_time as f64;

            if self.config.legacy_namespace {
                self.enqueue(format!("{}{}", ns.counter_rate, k), rate, timestamp, metadata.clone());
                self.enqueue(format!("{}{}", ns.counter_count, k), value as f64, timestamp, metadata);
            } else {
                self.enqueue(format!("{}{}.rate", ns.counter_rate, k), rate, timestamp, metadata.clone());
                self.enqueue(
                    format!("{}{}.count", ns.counter_count, k),
                    value as f64,
                    timestamp,
                    metadata,
                );
            }
            state.counters.insert(k.clone(), 0);
        }
        keys.len()
    }

    fn emit_gauges(&self, state: &AggregatorState, ns: &Namespace, timestamp: i64) -> usize {
        let mut count = 0;
        for (k, v) in state.gauges.iter() {
            if self.config.onlychanged_gauges_effective() && !state.keys_seen.contains_key(k) {
                continue;
            }
            let metadata = Self::metadata_for(state, k);
            self.enqueue(format!("{}{}", ns.gauge, k), *v, timestamp, metadata);
            count += 1;
        }
        count
    }

    fn emit_sets(&self, state: &mut AggregatorState, ns: &Namespace, timestamp: i64) -> usize {
        let keys: Vec<SanitizedKey> = state.sets.keys().cloned().collect();
        for k in &keys {
            let len = state.sets.get(k).expect("key just listed").len();
            let metadata = Self::metadata_for(state, k);
            self.enqueue(format!("{}{}.count", ns.set, k), len as f64, timestamp, metadata);
            state.sets.insert(k.clone(), Default::default());
        }
        keys.len()
    }
}

/// Prunes a map down to the keys still present in `keys_seen`, per the
/// idle-reap step (spec §4.5, gated per-type behind `delete_idlestats`).
fn reap_idle<V>(
    map: &mut std::collections::HashMap<SanitizedKey, V>,
    keys_seen: &std::collections::HashMap<SanitizedKey, Option<Tags>>,
) {
    map.retain(|k, _| keys_seen.contains_key(k));
}

/// Resolved metric-name prefixes for one tick (spec §4.10).
struct Namespace {
    global: String,
    counter_rate: String,
    counter_count: String,
    timer: String,
    gauge: String,
    set: String,
}

impl Namespace {
    fn from_config(config: &StatsdConfig) -> Self {
        if config.legacy_namespace {
            Self {
                global: "stats.".to_string(),
                counter_rate: "stats.".to_string(),
                counter_count: "stats_counts.".to_string(),
                timer: "stats.timers.".to_string(),
                gauge: "stats.gauges.".to_string(),
                set: "stats.sets.".to_string(),
            }
        } else {
            let counter = make_name(&[&config.global_prefix, &config.prefix_counter]);
            Self {
                global: make_name(&[&config.global_prefix]),
                counter_rate: counter.clone(),
                counter_count: counter,
                timer: make_name(&[&config.global_prefix, &config.prefix_timer]),
                gauge: make_name(&[&config.global_prefix, &config.prefix_gauge]),
                set: make_name(&[&config.global_prefix, &config.prefix_set]),
            }
        }
    }
}

/// Dot-joins the non-empty parts, with a trailing dot, dropping empty
/// components (spec §4.10's "modern" prefix composition).
fn make_name(parts: &[&str]) -> String {
    let mut name = String::new();
    for part in parts {
        if !part.is_empty() {
            name.push_str(part);
            name.push('.');
        }
    }
    name
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::queue::ChannelSink;
    use approx::assert_relative_eq;

    fn engine_with(config: StatsdConfig) -> (Arc<Aggregator>, FlushEngine, crossbeam_channel::Receiver<EgressPoint>) {
        let aggregator = Arc::new(Aggregator::new(config.metadata.clone()));
        let (sink, rx) = ChannelSink::unbounded();
        let engine = FlushEngine::new(Arc::clone(&aggregator), config, Arc::new(sink));
        (aggregator, engine, rx)
    }

    fn drain(rx: &crossbeam_channel::Receiver<EgressPoint>) -> Vec<EgressPoint> {
        let mut points = vec![];
        while let Ok(p) = rx.try_recv() {
            points.push(p);
        }
        points
    }

    #[test]
    fn counter_rate_scenario() {
        let (aggregator, engine, rx) = engine_with(StatsdConfig {
            flush_time: 10,
            ..StatsdConfig::default()
        });
        aggregator.handle(b"foo:5|c");
        aggregator.handle(b"foo:3|c");
        engine.tick(1000);
        let points = drain(&rx);
        let count = points.iter().find(|p| p.name == "counters.foo.count").unwrap();
        let rate = points.iter().find(|p| p.name == "counters.foo.rate").unwrap();
        assert_eq!(count.value, 8.0);
        assert_eq!(rate.value, 0.8);

        engine.tick(1010);
        let points = drain(&rx);
        let count = points.iter().find(|p| p.name == "counters.foo.count").unwrap();
        let rate = points.iter().find(|p| p.name == "counters.foo.rate").unwrap();
        assert_eq!(count.value, 0.0);
        assert_eq!(rate.value, 0.0);
    }

    #[test]
    fn timer_summary_scenario() {
        let (aggregator, engine, rx) = engine_with(StatsdConfig {
            flush_time: 1,
            percentile_thresholds: vec![90.0],
            ..StatsdConfig::default()
        });
        for v in 1..=10 {
            aggregator.handle(format!("t:{}|ms", v).as_bytes());
        }
        engine.tick(1000);
        let points = drain(&rx);
        let get = |name: &str| points.iter().find(|p| p.name == name).unwrap().value;

        assert_eq!(get("timers.t.upper_90"), 9.0);
        assert_eq!(get("timers.t.sum_90"), 45.0);
        assert_eq!(get("timers.t.mean_90"), 5.0);
        assert_eq!(get("timers.t.count_90"), 9.0);
        assert_eq!(get("timers.t.sum_squares_90"), 285.0);

        assert_eq!(get("timers.t.upper"), 10.0);
        assert_eq!(get("timers.t.lower"), 1.0);
        assert_eq!(get("timers.t.mean"), 5.5);
        assert_eq!(get("timers.t.count"), 10.0);
        assert_eq!(get("timers.t.count_ps"), 10.0);
        assert_eq!(get("timers.t.median"), 5.5);
        assert_eq!(get("timers.t.sum"), 55.0);
        assert_eq!(get("timers.t.sum_squares"), 385.0);
        assert_relative_eq!(get("timers.t.std"), 2.8723, epsilon = 0.001);
    }

    #[test]
    fn empty_timer_emits_zero_count() {
        let (aggregator, engine, rx) = engine_with(StatsdConfig::default());
        // Register the key via a first tick with one sample, then let the
        // second tick see an emptied-out sample list.
        aggregator.handle(b"idle:1|ms");
        engine.tick(1000);
        drain(&rx);
        engine.tick(1010);
        let points = drain(&rx);
        assert_eq!(points.iter().find(|p| p.name == "timers.idle.count").unwrap().value, 0.0);
        assert_eq!(
            points.iter().find(|p| p.name == "timers.idle.count_ps").unwrap().value,
            0.0
        );
    }

    #[test]
    fn set_cardinality_scenario() {
        let (aggregator, engine, rx) = engine_with(StatsdConfig::default());
        aggregator.handle(b"users:alice|s");
        aggregator.handle(b"users:bob|s");
        aggregator.handle(b"users:alice|s");
        engine.tick(1000);
        let points = drain(&rx);
        assert_eq!(points.iter().find(|p| p.name == "sets.users.count").unwrap().value, 2.0);

        // state resets
        engine.tick(1010);
        let points = drain(&rx);
        assert!(!points.iter().any(|p| p.name == "sets.users.count"));
    }

    #[test]
    fn gauge_onlychanged_skips_unseen() {
        let (aggregator, engine, rx) = engine_with(StatsdConfig {
            delete_idlestats: true,
            onlychanged_gauges: true,
            ..StatsdConfig::default()
        });
        aggregator.handle(b"g:5|g");
        engine.tick(1000);
        let points = drain(&rx);
        assert_eq!(points.iter().find(|p| p.name == "gauges.g").unwrap().value, 5.0);

        // no new sample this interval: keys_seen was pruned, so it's skipped
        engine.tick(1010);
        let points = drain(&rx);
        assert!(!points.iter().any(|p| p.name == "gauges.g"));
    }

    #[test]
    fn legacy_namespace_prefixes() {
        let (aggregator, engine, rx) = engine_with(StatsdConfig {
            legacy_namespace: true,
            ..StatsdConfig::default()
        });
        aggregator.handle(b"foo:1|c");
        engine.tick(1000);
        let points = drain(&rx);
        assert!(points.iter().any(|p| p.name == "stats.foo"));
        assert!(points.iter().any(|p| p.name == "stats_counts.foo"));
        assert!(points.iter().any(|p| p.name == "stats.numStats"));
    }

    #[test]
    fn num_stats_meta_metric() {
        let (aggregator, engine, rx) = engine_with(StatsdConfig::default());
        aggregator.handle(b"foo:1|c");
        aggregator.handle(b"bar:2|g");
        engine.tick(1000);
        let points = drain(&rx);
        let num_stats = points.iter().find(|p| p.name == "numStats").unwrap();
        assert_eq!(num_stats.value, 2.0);
    }

    #[test]
    fn idle_reap_removes_untouched_counter() {
        let (aggregator, engine, rx) = engine_with(StatsdConfig {
            delete_idlestats: true,
            delete_counters: true,
            ..StatsdConfig::default()
        });
        aggregator.handle(b"foo:1|c");
        engine.tick(1000);
        drain(&rx);
        // no samples this interval -- foo should be reaped, not re-emitted
        engine.tick(1010);
        let points = drain(&rx);
        assert!(!points.iter().any(|p| p.name.contains("foo")));
    }
}
