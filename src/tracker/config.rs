use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::window_api::identity::ApplicationRegistry;

pub const MIN_IDLE_TIMEOUT_SECS: u64 = 60;
pub const MAX_IDLE_TIMEOUT_SECS: u64 = 300;

const CONFIG_FILE: &str = "config.json";

/// Persisted tracker settings, stored as `config.json` in the application directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Seconds without input after which recording pauses.
    pub idle_timeout_secs: u64,
    /// Length of one sampler tick. Each accepted sample adds exactly this much time.
    pub tracking_interval_secs: u64,
    pub idle_poll_interval_secs: u64,
    /// Sessions with less active time are discarded when tracking stops.
    pub min_session_secs: u64,
    /// How long to wait for the session title. `None` waits until the prompt is answered.
    pub session_prompt_timeout_secs: Option<u64>,
    pub registry: ApplicationRegistry,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: MIN_IDLE_TIMEOUT_SECS,
            tracking_interval_secs: 10,
            idle_poll_interval_secs: 2,
            min_session_secs: 10,
            session_prompt_timeout_secs: None,
            registry: ApplicationRegistry::default(),
        }
    }
}

impl TrackerConfig {
    pub fn path(app_dir: &Path) -> PathBuf {
        app_dir.join(CONFIG_FILE)
    }

    /// Loads the configuration, falling back to defaults when no file was saved yet.
    pub fn load(app_dir: &Path) -> Result<Self> {
        let path = Self::path(app_dir);
        let config = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str::<TrackerConfig>(&content)
                .map_err(|e| anyhow!("Invalid configuration in {path:?}: {e}"))?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No configuration at {path:?}, using defaults");
                Self::default()
            }
            Err(e) => Err(e)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, app_dir: &Path) -> Result<()> {
        self.validate()?;
        std::fs::write(Self::path(app_dir), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        validate_idle_timeout(self.idle_timeout_secs)?;
        if self.tracking_interval_secs == 0 {
            return Err(anyhow!("Tracking interval must be at least 1 second"));
        }
        if self.idle_poll_interval_secs == 0 {
            return Err(anyhow!("Idle poll interval must be at least 1 second"));
        }
        Ok(())
    }

    pub fn set_idle_timeout(&mut self, seconds: u64) -> Result<()> {
        validate_idle_timeout(seconds)?;
        self.idle_timeout_secs = seconds;
        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn tracking_interval(&self) -> Duration {
        Duration::from_secs(self.tracking_interval_secs)
    }

    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_secs(self.idle_poll_interval_secs)
    }

    pub fn min_session(&self) -> Duration {
        Duration::from_secs(self.min_session_secs)
    }

    pub fn session_prompt_timeout(&self) -> Option<Duration> {
        self.session_prompt_timeout_secs.map(Duration::from_secs)
    }
}

fn validate_idle_timeout(seconds: u64) -> Result<()> {
    if !(MIN_IDLE_TIMEOUT_SECS..=MAX_IDLE_TIMEOUT_SECS).contains(&seconds) {
        return Err(anyhow!(
            "Idle timeout must be between {MIN_IDLE_TIMEOUT_SECS} and {MAX_IDLE_TIMEOUT_SECS} seconds, got {seconds}"
        ));
    }
    Ok(())
}
