//! Gauge persistence across restarts (spec §4.11).
//!
//! Grounded on `bucky`'s `StatsDHandler.load_gauges`/`save_gauges`: a JSON
//! object mapping metric name to a two-element `[value, metadata]` array.
//! IO and (de)serialization errors are logged and the operation becomes a
//! no-op, matching spec §7's "IO error on gauge load/save: logged;
//! ignored."

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::aggregator::Aggregator;
use crate::config::StatsdConfig;
use crate::error::GaugePersistError;
use crate::sanitize::{sanitize, SanitizedKey};
use crate::tags::Tags;

#[derive(Serialize, Deserialize)]
struct SavedGauge(f64, Option<Tags>);

pub struct GaugePersister {
    path: PathBuf,
    enabled: bool,
}

impl GaugePersister {
    pub fn new(config: &StatsdConfig) -> Self {
        Self {
            path: Path::new(&config.directory).join(&config.gauges_savefile),
            enabled: config.persistent_gauges,
        }
    }

    /// Loads saved gauges into `aggregator`, once at startup. A missing
    /// file is not an error — it just means there's nothing to restore
    /// yet (matches `bucky`'s `os.path.isfile` guard).
    pub fn load(&self, aggregator: &Aggregator) {
        if !self.enabled || !self.path.is_file() {
            return;
        }
        match self.read() {
            Ok(saved) => {
                let mut state = aggregator.lock();
                for (k, SavedGauge(value, metadata)) in saved {
                    let key = sanitize(&k);
                    state.gauges.insert(key.clone(), value);
                    state.keys_seen.insert(key, metadata);
                }
                tracing::info!("StatsD: loaded saved gauges from {}", self.path.display());
            }
            Err(err) => {
                tracing::warn!("StatsD: failed to load saved gauges: {err}");
            }
        }
    }

    fn read(&self) -> Result<HashMap<String, SavedGauge>, GaugePersistError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|source| GaugePersistError::Io {
            path: self.path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| GaugePersistError::Json {
            path: self.path.display().to_string(),
            source,
        })
    }

    /// Saves the current gauges (with their coalesced metadata, if any) as
    /// JSON. Called once from the orchestrator's shutdown path.
    pub fn save(&self, aggregator: &Aggregator) {
        if !self.enabled {
            return;
        }
        let to_save: HashMap<String, SavedGauge> = {
            let state = aggregator.lock();
            state
                .gauges
                .iter()
                .map(|(k, &v): (&SanitizedKey, &f64)| {
                    let metadata = state.keys_seen.get(k).cloned().flatten();
                    (k.as_str().to_string(), SavedGauge(v, metadata))
                })
                .collect()
        };
        if let Err(err) = self.write(&to_save) {
            tracing::warn!("StatsD: failed to save gauges: {err}");
        }
    }

    fn write(&self, gauges: &HashMap<String, SavedGauge>) -> Result<(), GaugePersistError> {
        let json = serde_json::to_string(gauges).map_err(|source| GaugePersistError::Json {
            path: self.path.display().to_string(),
            source,
        })?;
        std::fs::write(&self.path, json).map_err(|source| GaugePersistError::Io {
            path: self.path.display().to_string(),
            source,
        })
    }
}
