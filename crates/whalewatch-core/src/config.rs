//! Configuration management for whalewatch.
//!
//! Loads configuration from ${WHALEWATCH_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use whalewatch_types::{SeverityTier, TierError, TierTable};

use crate::feed::StreamKind;

/// Returns the default config template with comments.
///
/// This is embedded from default_config.toml at compile time.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

pub mod paths {
    //! Path resolution for whalewatch configuration and data directories.
    //!
    //! WHALEWATCH_HOME resolution order:
    //! 1. WHALEWATCH_HOME environment variable (if set)
    //! 2. ~/.config/whalewatch (default)
    //! 3. ./.whalewatch when no home directory can be determined

    use std::path::PathBuf;

    pub fn whalewatch_home() -> PathBuf {
        if let Ok(home) = std::env::var("WHALEWATCH_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".whalewatch"),
            |h| h.join(".config").join("whalewatch"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        whalewatch_home().join("config.toml")
    }

    /// Returns the default log directory.
    pub fn log_dir() -> PathBuf {
        whalewatch_home().join("logs")
    }
}

/// Reconnect policy for the feed consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
        }
    }
}

impl FeedConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms.max(1))
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms.max(self.initial_backoff_ms).max(1))
    }
}

/// Terminal view settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Tiers with a threshold at or above this value blink.
    pub blink_threshold: f64,
    pub blink_interval_ms: u64,
    /// Width used when the terminal size cannot be queried.
    pub fallback_width: u16,
    /// Height used when the terminal size cannot be queried.
    pub fallback_height: u16,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            blink_threshold: 1_000_000.0,
            blink_interval_ms: 500,
            fallback_width: 120,
            fallback_height: 30,
        }
    }
}

impl DisplayConfig {
    pub fn blink_interval(&self) -> Duration {
        Duration::from_millis(self.blink_interval_ms.max(1))
    }
}

/// Audio alert settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub enabled: bool,
    pub queue_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: 100,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    pub filter: String,
    /// Directory for log files (defaults to `$WHALEWATCH_HOME/logs`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            directory: None,
        }
    }
}

impl LogConfig {
    pub fn directory(&self) -> PathBuf {
        self.directory
            .as_deref()
            .map_or_else(paths::log_dir, PathBuf::from)
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Websocket endpoint for trade streams
    pub endpoint: String,

    /// Websocket endpoint for liquidation streams (futures market)
    pub liquidation_endpoint: String,

    /// Trading pairs to subscribe to
    pub pairs: Vec<String>,

    /// Events below this notional value are not displayed
    pub min_value: f64,

    #[serde(default)]
    pub feed: FeedConfig,

    #[serde(default)]
    pub display: DisplayConfig,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub log: LogConfig,

    /// Tier overrides; empty means the built-in table
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tiers: Vec<SeverityTier>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: Self::DEFAULT_ENDPOINT.to_string(),
            liquidation_endpoint: Self::DEFAULT_LIQUIDATION_ENDPOINT.to_string(),
            pairs: Self::DEFAULT_PAIRS.iter().map(ToString::to_string).collect(),
            min_value: 0.0,
            feed: FeedConfig::default(),
            display: DisplayConfig::default(),
            audio: AudioConfig::default(),
            log: LogConfig::default(),
            tiers: Vec::new(),
        }
    }
}

impl Config {
    pub const DEFAULT_ENDPOINT: &str = "wss://stream.binance.com:9443/ws";
    /// `forceOrder` is only published on the USD-M futures stream.
    pub const DEFAULT_LIQUIDATION_ENDPOINT: &str = "wss://fstream.binance.com/ws";
    pub const DEFAULT_PAIRS: &[&str] = &[
        "btcusdt", "ethusdt", "bnbusdt", "solusdt", "dogeusdt", "xrpusdt",
    ];

    /// Loads configuration from the default config path.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Creates a default config file at the given path.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    /// Endpoint serving the given stream family.
    pub fn endpoint_for(&self, kind: StreamKind) -> &str {
        match kind {
            StreamKind::Trades => &self.endpoint,
            StreamKind::Liquidations => &self.liquidation_endpoint,
        }
    }

    /// Builds the validated tier table, falling back to the built-in tiers.
    ///
    /// # Errors
    /// Returns an error if configured tiers are inconsistent.
    pub fn tier_table(&self) -> Result<TierTable, TierError> {
        if self.tiers.is_empty() {
            Ok(TierTable::default())
        } else {
            TierTable::new(self.tiers.clone())
        }
    }

    fn write_config(path: &Path, contents: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config dir {}", parent.display()))?;
        }
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("nonexistent.toml");

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.pairs.len(), 6);
        assert_eq!(config.feed.initial_backoff(), Duration::from_secs(1));
        assert_eq!(config.feed.max_backoff(), Duration::from_secs(30));
    }

    #[test]
    fn test_load_partial_config_merges_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        fs::write(
            &config_path,
            "pairs = [\"btcusdt\"]\n\n[audio]\nqueue_capacity = 8\n",
        )
        .unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.pairs, vec!["btcusdt".to_string()]);
        assert_eq!(config.audio.queue_capacity, 8);
        assert!(config.audio.enabled);
        assert_eq!(config.display.blink_interval_ms, 500);
    }

    #[test]
    fn test_each_stream_kind_has_its_own_endpoint() {
        let config = Config::default();
        assert_eq!(
            config.endpoint_for(StreamKind::Trades),
            "wss://stream.binance.com:9443/ws"
        );
        assert_eq!(
            config.endpoint_for(StreamKind::Liquidations),
            "wss://fstream.binance.com/ws"
        );

        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "liquidation_endpoint = \"wss://localhost:9000/ws\"\n").unwrap();
        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(
            config.endpoint_for(StreamKind::Liquidations),
            "wss://localhost:9000/ws"
        );
        assert_eq!(config.endpoint_for(StreamKind::Trades), Config::DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_load_invalid_toml_fails() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "pairs = [").unwrap();

        assert!(Config::load_from(&config_path).is_err());
    }

    #[test]
    fn test_init_creates_config_with_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("subdir").join("config.toml");

        Config::init(&config_path).unwrap();

        let contents = fs::read_to_string(&config_path).unwrap();
        assert!(contents.contains("# [[tiers]]"));
        let parsed = Config::load_from(&config_path).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_init_fails_if_exists() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        fs::write(&config_path, "").unwrap();

        assert!(Config::init(&config_path).is_err());
    }

    #[test]
    fn test_tier_table_uses_overrides() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
[[tiers]]
name = "Big"
threshold = 1000.0
repeat = 2

[[tiers]]
name = "Rest"
threshold = 0.0
"#,
        )
        .unwrap();

        let config = Config::load_from(&config_path).unwrap();
        let table = config.tier_table().unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.classify(5000.0).name, "Big");
        assert_eq!(table.classify(5000.0).repeat, 2);
    }

    #[test]
    fn test_tier_table_rejects_missing_catch_all() {
        let config = Config {
            tiers: vec![SeverityTier {
                name: "Only".to_string(),
                threshold: 10.0,
                symbol: String::new(),
                style: whalewatch_types::DisplayStyle::default(),
                trade_sound: None,
                liquidation_sound: None,
                repeat: 1,
            }],
            ..Config::default()
        };
        assert_eq!(config.tier_table().unwrap_err(), TierError::MissingCatchAll);
    }

    #[test]
    fn test_log_directory_override() {
        let log = LogConfig {
            directory: Some("/tmp/ww".to_string()),
            ..LogConfig::default()
        };
        assert_eq!(log.directory(), PathBuf::from("/tmp/ww"));
    }
}
