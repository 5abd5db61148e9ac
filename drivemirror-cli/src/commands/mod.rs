//! CLI command implementations

pub mod check;
pub mod config;
pub mod history;
pub mod run;
pub mod status;

use std::path::PathBuf;

use anyhow::{Context, Result};
use drivemirror_core::ports::ConfigStore;
use drivemirror_core::{BackupConfiguration, DriveMirrorContext, UserId};

/// Get the data directory from environment or default
pub fn get_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("DRIVEMIRROR_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().context("Could not find home directory; set DRIVEMIRROR_DIR")?;
    Ok(home.join(".drivemirror"))
}

/// Get or create the DriveMirror context
pub fn get_context() -> Result<DriveMirrorContext> {
    let data_dir = get_data_dir()?;
    DriveMirrorContext::new(&data_dir).context("Failed to initialize DriveMirror")
}

/// Load a configuration owned by `user`; someone else's reads as missing
pub async fn owned_config(
    ctx: &DriveMirrorContext,
    user: &UserId,
    id: i64,
) -> Result<BackupConfiguration> {
    match ctx.store.get_config(id).await? {
        Some(config) if &config.user_id == user => Ok(config),
        _ => anyhow::bail!("Backup configuration {} not found", id),
    }
}
