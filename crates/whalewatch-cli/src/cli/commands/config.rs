//! Config command handlers.

use std::path::Path;

use anyhow::{Context, Result};
use whalewatch_core::config;

pub fn path(path: &Path) {
    println!("{}", path.display());
}

pub fn init(path: &Path) -> Result<()> {
    config::Config::init(path).with_context(|| format!("init config at {}", path.display()))?;
    println!("Created config at {}", path.display());
    Ok(())
}
