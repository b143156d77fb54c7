//! Configuration for the sync engine and the mock remote store.
//!
//! Values come from `<data-dir>/config.yaml` when it exists, then from the
//! `TEMPO_FAILURE_RATE` and `TEMPO_LATENCY_MS` environment variables.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{NotesError, Result};
use crate::storage::NOTES_KEY;

pub const CONFIG_FILE: &str = "config.yaml";

/// Key the mock remote persists its collection under.
pub const REMOTE_KEY: &str = "service-worker-storage";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub remote: RemoteConfig,
}

/// Timing of the reconciliation engine's deferred writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Quiet period before a single-note update goes out
    pub update_debounce_ms: u64,
    /// Quiet period before accumulated bulk saves go out
    pub batch_delay_ms: u64,
    /// Local storage key for the note collection
    pub storage_key: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            update_debounce_ms: 500,
            batch_delay_ms: 300,
            storage_key: NOTES_KEY.to_string(),
        }
    }
}

impl SyncConfig {
    pub fn update_debounce(&self) -> Duration {
        Duration::from_millis(self.update_debounce_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

/// Behaviour of the simulated backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub latency_min_ms: u64,
    pub latency_max_ms: u64,
    /// Independent chance that any call fails with a network error
    pub failure_probability: f64,
    /// Key used when the mock store persists itself, `None` keeps it in memory
    pub persist_key: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            latency_min_ms: 100,
            latency_max_ms: 300,
            failure_probability: 0.05,
            persist_key: Some(REMOTE_KEY.to_string()),
        }
    }
}

impl RemoteConfig {
    /// A store that answers immediately and never fails.
    pub fn reliable() -> Self {
        Self {
            latency_min_ms: 0,
            latency_max_ms: 0,
            failure_probability: 0.0,
            persist_key: None,
        }
    }

    pub fn latency_range(&self) -> (Duration, Duration) {
        let min = Duration::from_millis(self.latency_min_ms);
        let max = Duration::from_millis(self.latency_max_ms.max(self.latency_min_ms));
        (min, max)
    }

    pub fn set_fixed_latency(&mut self, ms: u64) {
        self.latency_min_ms = ms;
        self.latency_max_ms = ms;
    }
}

impl Config {
    /// Load `config.yaml` from `data_dir` (defaults when absent) and apply
    /// environment overrides.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_yaml::from_str(&raw)?
        } else {
            Config::default()
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(raw) = std::env::var("TEMPO_FAILURE_RATE") {
            self.remote.failure_probability = raw.trim().parse().map_err(|_| {
                NotesError::InvalidConfig(format!("TEMPO_FAILURE_RATE is not a number: {}", raw))
            })?;
        }
        if let Ok(raw) = std::env::var("TEMPO_LATENCY_MS") {
            let ms = raw.trim().parse().map_err(|_| {
                NotesError::InvalidConfig(format!("TEMPO_LATENCY_MS is not an integer: {}", raw))
            })?;
            self.remote.set_fixed_latency(ms);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let p = self.remote.failure_probability;
        if !(0.0..=1.0).contains(&p) {
            return Err(NotesError::InvalidConfig(format!(
                "failure probability must be within 0..=1, got {}",
                p
            )));
        }
        if self.sync.storage_key.trim().is_empty() {
            return Err(NotesError::InvalidConfig(
                "storage key must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
