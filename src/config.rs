//! Application-level configuration loading.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "SHOCKHUB_BACK_CONFIG_PATH";

const DEFAULT_ENVIRONMENT: &str = "production";
const DEFAULT_CONTROL_CHANNEL: &str = "device-control";
const DEFAULT_BATCH_FLUSH_INTERVAL_MS: u64 = 10_000;
const DEFAULT_HUB_IDENT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_COUNTRY_HEADER: &str = "cf-ipcountry";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Deployment environment tag used for gateway selection.
    pub environment: String,
    /// Pub/sub channel name carrying control messages.
    pub control_channel: String,
    /// Interval between last-used flush cycles.
    pub batch_flush_interval: Duration,
    /// How long a hub socket may stay silent before identification.
    pub hub_ident_timeout: Duration,
    /// Request header carrying the client's resolved country code.
    pub country_header: String,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in
    /// defaults when the file is missing or unreadable.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        environment = %config.environment,
                        "loaded configuration"
                    );
                    config
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
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: DEFAULT_ENVIRONMENT.into(),
            control_channel: DEFAULT_CONTROL_CHANNEL.into(),
            batch_flush_interval: Duration::from_millis(DEFAULT_BATCH_FLUSH_INTERVAL_MS),
            hub_ident_timeout: Duration::from_millis(DEFAULT_HUB_IDENT_TIMEOUT_MS),
            country_header: DEFAULT_COUNTRY_HEADER.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at
/// [`DEFAULT_CONFIG_PATH`]. Missing fields keep their defaults.
struct RawConfig {
    environment: Option<String>,
    control_channel: Option<String>,
    batch_flush_interval_ms: Option<u64>,
    hub_ident_timeout_ms: Option<u64>,
    country_header: Option<String>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            environment: raw.environment.unwrap_or(defaults.environment),
            control_channel: raw.control_channel.unwrap_or(defaults.control_channel),
            batch_flush_interval: raw
                .batch_flush_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.batch_flush_interval),
            hub_ident_timeout: raw
                .hub_ident_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.hub_ident_timeout),
            country_header: raw.country_header.unwrap_or(defaults.country_header),
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
