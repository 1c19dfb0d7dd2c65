//! `trades` / `liquidations` command handler.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;
use whalewatch_core::config::Config;
use whalewatch_core::feed::StreamKind;
use whalewatch_core::logging;

use crate::modes;

pub struct MonitorOptions {
    pub config_path: PathBuf,
    pub kind: StreamKind,
    /// Overrides the configured pairs when non-empty.
    pub pairs: Vec<String>,
    pub min_value: Option<f64>,
    pub no_sound: bool,
}

pub async fn run(options: MonitorOptions) -> Result<()> {
    let mut config = Config::load_from(&options.config_path).context("load config")?;
    apply_overrides(&mut config, &options);

    let _log_guard = logging::init(&config.log).context("init logging")?;
    info!(
        kind = ?options.kind,
        pairs = %config.pairs.join(","),
        min_value = config.min_value,
        "starting monitor"
    );

    modes::monitor::run(&config, options.kind).await
}

fn apply_overrides(config: &mut Config, options: &MonitorOptions) {
    if !options.pairs.is_empty() {
        config.pairs = options
            .pairs
            .iter()
            .map(|pair| pair.trim().to_lowercase())
            .filter(|pair| !pair.is_empty())
            .collect();
    }
    if let Some(min_value) = options.min_value {
        config.min_value = min_value;
    }
    if options.no_sound {
        config.audio.enabled = false;
    }
}
