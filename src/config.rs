//! Typed configuration surface (spec §6), ambient per SPEC_FULL §10.
//!
//! Mirrors the teacher's `RegistryConfig` + its module-level
//! `get_env_or_fallback` helper: a plain struct with a sensible
//! `Default`, plus an `from_env` constructor that never panics and logs
//! at `debug` on a parse failure instead.

use crate::tags::Tags;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct StatsdConfig {
    /// Seconds between flush ticks.
    pub flush_time: u64,

    /// Selects the fixed legacy prefix scheme (`stats.`, `stats_counts.`,
    /// `stats.timers.`, ...) instead of the modern prefix-composition one.
    pub legacy_namespace: bool,
    pub global_prefix: String,
    pub prefix_counter: String,
    pub prefix_timer: String,
    pub prefix_gauge: String,
    pub prefix_set: String,

    /// Default tags merged into every sample's coalesced metadata.
    pub metadata: Option<Tags>,

    pub persistent_gauges: bool,
    pub gauges_savefile: String,
    pub directory: String,

    pub percentile_thresholds: Vec<f64>,

    pub delete_idlestats: bool,
    pub delete_counters: bool,
    pub delete_timers: bool,
    pub delete_sets: bool,
    pub onlychanged_gauges: bool,

    pub timer_mean: bool,
    pub timer_upper: bool,
    pub timer_lower: bool,
    pub timer_count: bool,
    pub timer_count_ps: bool,
    pub timer_sum: bool,
    pub timer_sum_squares: bool,
    pub timer_median: bool,
    pub timer_std: bool,
}

impl Default for StatsdConfig {
    fn default() -> Self {
        Self {
            flush_time: 10,
            legacy_namespace: false,
            global_prefix: String::new(),
            prefix_counter: "counters".to_string(),
            prefix_timer: "timers".to_string(),
            prefix_gauge: "gauges".to_string(),
            prefix_set: "sets".to_string(),
            metadata: None,
            persistent_gauges: false,
            gauges_savefile: "statsd_gauges.json".to_string(),
            directory: ".".to_string(),
            percentile_thresholds: vec![90.0],
            delete_idlestats: false,
            delete_counters: false,
            delete_timers: false,
            delete_sets: false,
            onlychanged_gauges: false,
            timer_mean: true,
            timer_upper: true,
            timer_lower: true,
            timer_count: true,
            timer_count_ps: true,
            timer_sum: true,
            timer_sum_squares: true,
            timer_median: true,
            timer_std: true,
        }
    }
}

impl StatsdConfig {
    /// Per-type idle-reap flags are only honored when `delete_idlestats`
    /// is enabled, matching the reference implementation gating each of
    /// `delete_counters`/`delete_timers`/`delete_sets`/`onlychanged_gauges`
    /// behind the master switch.
    pub fn delete_counters_effective(&self) -> bool {
        self.delete_idlestats && self.delete_counters
    }
    pub fn delete_timers_effective(&self) -> bool {
        self.delete_idlestats && self.delete_timers
    }
    pub fn delete_sets_effective(&self) -> bool {
        self.delete_idlestats && self.delete_sets
    }
    pub fn onlychanged_gauges_effective(&self) -> bool {
        self.delete_idlestats && self.onlychanged_gauges
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_time)
    }

    /// Reads overrides from the environment, falling back to [`Default`]
    /// on anything missing or unparseable. Never panics.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.flush_time = env_u64("STATSD_FLUSH_TIME", cfg.flush_time);
        cfg.legacy_namespace = env_bool("STATSD_LEGACY_NAMESPACE", cfg.legacy_namespace);
        cfg.persistent_gauges = env_bool("STATSD_PERSISTENT_GAUGES", cfg.persistent_gauges);
        cfg.delete_idlestats = env_bool("STATSD_DELETE_IDLESTATS", cfg.delete_idlestats);
        if let Ok(dir) = std::env::var("STATSD_DIRECTORY") {
            cfg.directory = dir;
        }
        cfg
    }
}

fn env_u64(name: &str, fallback: u64) -> u64 {
    match std::env::var(name) {
        Err(_) => fallback,
        Ok(raw) => raw.parse::<u64>().unwrap_or_else(|_| {
            tracing::debug!("{name} set but not a valid u64, falling back to {fallback}");
            fallback
        }),
    }
}

fn env_bool(name: &str, fallback: bool) -> bool {
    match std::env::var(name) {
        Err(_) => fallback,
        Ok(raw) => raw.parse::<bool>().unwrap_or_else(|_| {
            tracing::debug!("{name} set but not a valid bool, falling back to {fallback}");
            fallback
        }),
    }
}
