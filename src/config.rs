//! Application-level configuration loading: links, timings, nickname filter and
//! defaults for newly created sessions.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::dao::models::{Language, SessionSettings};

/// Default location on disk where the device looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/party-lobby.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "PARTY_LOBBY_CONFIG_PATH";
const DEFAULT_CREDENTIALS_PATH: &str = "party-lobby.credentials.json";

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Origin players open, used to build join links.
    pub public_origin: String,
    /// QR image service endpoint.
    pub qr_endpoint: String,
    /// Side length in pixels of the QR image.
    pub qr_size: u32,
    /// Delay between two liveness writes.
    pub heartbeat_interval: Duration,
    /// A player seen within this window counts as fresh.
    pub reconnect_window: Duration,
    /// Length of a naming round.
    pub round_duration: Duration,
    /// Lifetime of a newly created session.
    pub session_ttl: Duration,
    /// First delay before reopening a closed change feed; doubles per attempt.
    pub resync_backoff: Duration,
    /// Reopen attempts before the device gives up on the session.
    pub resync_attempts: u32,
    /// Words masked out of nicknames.
    pub banned_words: Vec<String>,
    /// Replacement for a banned word.
    pub mask: String,
    /// Language of new sessions.
    pub default_language: Language,
    /// Capacity of new sessions.
    pub default_max_players: u8,
    /// Switches of new sessions.
    pub default_settings: SessionSettings,
    /// File holding this device's capability credentials.
    pub credentials_path: PathBuf,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        origin = %config.public_origin,
                        banned_words = config.banned_words.len(),
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
        RawConfig::default().into()
    }
}

/// JSON representation of the configuration file. Every key is optional.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawConfig {
    public_origin: String,
    qr_endpoint: String,
    qr_size: u32,
    heartbeat_interval_secs: u64,
    reconnect_window_secs: u64,
    round_duration_secs: u64,
    session_ttl_secs: u64,
    resync_backoff_ms: u64,
    resync_attempts: u32,
    banned_words: Vec<String>,
    mask: String,
    default_language: Language,
    default_max_players: u8,
    default_settings: SessionSettings,
    credentials_path: PathBuf,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            public_origin: "http://localhost:5173".into(),
            qr_endpoint: "https://api.qrserver.com/v1/create-qr-code/".into(),
            qr_size: 300,
            heartbeat_interval_secs: 5,
            reconnect_window_secs: 60,
            round_duration_secs: 60,
            session_ttl_secs: 4 * 60 * 60,
            resync_backoff_ms: 500,
            resync_attempts: 5,
            banned_words: vec!["placeholder".into()],
            mask: "***".into(),
            default_language: Language::Fa,
            default_max_players: 12,
            default_settings: SessionSettings::default(),
            credentials_path: PathBuf::from(DEFAULT_CREDENTIALS_PATH),
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            public_origin: value.public_origin.trim_end_matches('/').to_string(),
            qr_endpoint: value.qr_endpoint,
            qr_size: value.qr_size,
            heartbeat_interval: Duration::from_secs(value.heartbeat_interval_secs.max(1)),
            reconnect_window: Duration::from_secs(value.reconnect_window_secs),
            round_duration: Duration::from_secs(value.round_duration_secs),
            session_ttl: Duration::from_secs(value.session_ttl_secs),
            resync_backoff: Duration::from_millis(value.resync_backoff_ms),
            resync_attempts: value.resync_attempts,
            banned_words: value.banned_words,
            mask: value.mask,
            default_language: value.default_language,
            default_max_players: value.default_max_players.clamp(2, 12),
            default_settings: value.default_settings,
            credentials_path: value.credentials_path,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_other_defaults() {
        let raw: RawConfig = serde_json::from_str(
            r#"{"public_origin": "https://party.example/", "default_max_players": 40}"#,
        )
        .unwrap();
        let config = AppConfig::from(raw);

        assert_eq!(config.public_origin, "https://party.example");
        assert_eq!(config.default_max_players, 12);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.banned_words, vec!["placeholder".to_string()]);
    }
}
