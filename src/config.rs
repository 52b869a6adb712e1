//! Application-level configuration loading: game length, cadences and the master credential.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::DurationMilliSeconds;
use tracing::{info, warn};

use crate::state::clock::DEFAULT_GAME_SECONDS;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "PICKUP_QUEUE_CONFIG_PATH";
/// Environment variable that overrides the configured master credential.
const MASTER_KEY_ENV: &str = "MASTER_KEY";
const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;
const DEFAULT_DISPLAY_POLL_INTERVAL_MS: u64 = 1_000;
const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Seconds on the clock when a game starts.
    pub game_duration_secs: u32,
    /// Delay between two clock ticks.
    pub tick_interval: Duration,
    /// Delay between two reconciliation polls of the display mirror.
    pub display_poll_interval: Duration,
    /// Credential allowing staff to remove any team. `None` disables the override.
    pub master_key: Option<String>,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let config = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        game_duration_secs = app_config.game_duration_secs,
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };

        config.with_env_master_key()
    }

    fn with_env_master_key(mut self) -> Self {
        if let Some(key) = env::var(MASTER_KEY_ENV).ok().filter(|key| !key.is_empty()) {
            self.master_key = Some(key);
        }
        self
    }

    /// Whether `candidate` matches the configured master credential.
    pub fn is_master_key(&self, candidate: &str) -> bool {
        self.master_key
            .as_deref()
            .is_some_and(|key| !key.is_empty() && key == candidate)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            game_duration_secs: DEFAULT_GAME_SECONDS,
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
            display_poll_interval: Duration::from_millis(DEFAULT_DISPLAY_POLL_INTERVAL_MS),
            master_key: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    game_duration_secs: u32,
    #[serde(with = "serde_with::As::<DurationMilliSeconds<u64>>")]
    tick_interval_ms: Duration,
    #[serde(with = "serde_with::As::<DurationMilliSeconds<u64>>")]
    display_poll_interval_ms: Duration,
    master_key: Option<String>,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            game_duration_secs: DEFAULT_GAME_SECONDS,
            tick_interval_ms: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
            display_poll_interval_ms: Duration::from_millis(DEFAULT_DISPLAY_POLL_INTERVAL_MS),
            master_key: None,
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            game_duration_secs: value.game_duration_secs.max(1),
            tick_interval: value.tick_interval_ms.max(MIN_INTERVAL),
            display_poll_interval: value.display_poll_interval_ms.max(MIN_INTERVAL),
            master_key: value.master_key,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
