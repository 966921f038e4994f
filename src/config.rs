use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::session::SessionMode;

const CONSULTA_DIR: &str = ".consulta";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub endpoint: String,
    pub user: String,
    pub mode: SessionMode,
    #[serde(default)]
    pub timing: TimingConfig,
}

/// Timing knobs for the background machinery. All values are plain
/// millisecond counts so the file stays hand-editable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Wait before the single reconciliation re-fetch, giving the server
    /// time to become consistent. Fixed constant, no backoff.
    pub reconcile_delay_ms: u64,
    /// Bounds for the animator's randomized pre-output latency.
    pub reveal_initial_delay_min_ms: u64,
    pub reveal_initial_delay_max_ms: u64,
    pub reveal_tick_ms: u64,
    /// Characters of reasoning revealed per tick.
    pub reveal_chars_per_tick: usize,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            reconcile_delay_ms: 2_500,
            reveal_initial_delay_min_ms: 1_500,
            reveal_initial_delay_max_ms: 4_000,
            reveal_tick_ms: 80,
            reveal_chars_per_tick: 3,
        }
    }
}

impl TimingConfig {
    pub fn reconcile_delay(&self) -> Duration {
        Duration::from_millis(self.reconcile_delay_ms)
    }

    pub fn reveal_tick(&self) -> Duration {
        Duration::from_millis(self.reveal_tick_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080".to_string(),
            user: "anonimo".to_string(),
            mode: SessionMode::General,
            timing: TimingConfig::default(),
        }
    }
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("could not find home directory"))?;
        Ok(home.join(CONSULTA_DIR).join(CONFIG_FILE))
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Loads the config file if present, otherwise falls back to defaults.
    pub fn load_or_default() -> Self {
        match Self::default_path() {
            Ok(path) if path.exists() => Self::load_from_file(&path).unwrap_or_default(),
            _ => Self::default(),
        }
    }
}
