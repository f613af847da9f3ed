//! The explicit configuration surface every constructor takes — no ambient
//! global state, generalizing `original_source/bot_config.py`'s
//! `fenix.ini`/`configparser` setup to a typed struct loaded from TOML.

use std::path::Path;

/// All tunables named in the crate's configuration surface, with the same
/// defaults.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fraction of the quota the adaptive pacer aims to use per reset
    /// window.
    pub safety_factor: f64,
    pub min_wait_secs: f64,
    pub max_wait_secs: f64,
    /// How many times `SubredditStream` retries a refresh on the edited
    /// listing before giving up and emitting the item as observed.
    pub edit_fetch_attempts: u32,
    /// How long to pause after a transient transport error before
    /// `MultiStream` rebuilds its streams.
    pub exception_pause_secs: u64,
    /// Below this many remaining calls, the exponential pacer sleeps until
    /// the next reset rather than continuing to back off.
    pub ratelimit_exhaustion: u32,
    pub log_streams: bool,
    pub show_delay: bool,
    pub quota_requests: u32,
    pub quota_cooldown_secs: u64,
    /// If a listing hasn't yielded anything in this long, the next round
    /// does a full fetch (`before = None`) to recover from a deleted
    /// cursor anchor.
    pub max_time_before_full_fetch_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            safety_factor: 0.9,
            min_wait_secs: 1.0,
            max_wait_secs: 16.0,
            edit_fetch_attempts: 3,
            exception_pause_secs: 60,
            ratelimit_exhaustion: 30,
            log_streams: true,
            show_delay: false,
            quota_requests: 1000,
            quota_cooldown_secs: 600,
            max_time_before_full_fetch_secs: 60,
        }
    }
}

/// An error loading or parsing a [`Config`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl Config {
    /// Parses a TOML document into a `Config`, falling back to the default
    /// for any field the document omits.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    /// Reads and parses a TOML config file from disk.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::from_toml_str(&text)
    }
}
