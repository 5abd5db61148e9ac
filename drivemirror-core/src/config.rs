//! Configuration management
//!
//! `settings.json` in the data directory:
//! ```json
//! {
//!   "targetUser": "backup-owner@example.com",
//!   "recipients": ["ops@example.com"],
//!   "deadlineSecs": 3600,
//!   "maxDepth": 32,
//!   "chunkSize": 10485760,
//!   "spoolDir": "/var/tmp/drivemirror",
//!   "graphBaseUrl": "https://graph.microsoft.com/v1.0",
//!   "googleBaseUrl": "https://www.googleapis.com"
//! }
//! ```
//! Secrets never live here; they come from the environment.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::services::RunSettings;

pub const SETTINGS_FILE: &str = "settings.json";

pub const TARGET_USER_ENV: &str = "DRIVEMIRROR_TARGET_USER";
pub const RECIPIENTS_ENV: &str = "DRIVEMIRROR_RECIPIENTS";
pub const DEADLINE_ENV: &str = "DRIVEMIRROR_DEADLINE_SECS";

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    graph_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    google_base_url: Option<String>,
    #[serde(default)]
    recipients: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    deadline_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_depth: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    chunk_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    spool_dir: Option<PathBuf>,
    // Keys we don't manage survive a save
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// DriveMirror configuration (settings file plus environment overrides)
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// OneDrive user whose folders are backed up
    pub target_user: Option<String>,
    pub graph_base_url: Option<String>,
    pub google_base_url: Option<String>,
    pub recipients: Vec<String>,
    pub deadline: Option<Duration>,
    pub max_depth: Option<usize>,
    pub chunk_size: Option<usize>,
    pub spool_dir: Option<PathBuf>,
    _raw_settings: SettingsFile,
}

impl Config {
    /// Load config from the data directory; a missing file means defaults
    ///
    /// `DRIVEMIRROR_TARGET_USER`, `DRIVEMIRROR_RECIPIENTS` (comma separated)
    /// and `DRIVEMIRROR_DEADLINE_SECS` override the file.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut config = Self::load_file(dir)?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    fn load_file(dir: &Path) -> Result<Self> {
        let settings_path = dir.join(SETTINGS_FILE);

        let raw: SettingsFile = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)
                .with_context(|| format!("Failed to read {}", settings_path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid settings file {}", settings_path.display()))?
        } else {
            SettingsFile::default()
        };

        Ok(Self {
            target_user: raw.target_user.clone(),
            graph_base_url: raw.graph_base_url.clone(),
            google_base_url: raw.google_base_url.clone(),
            recipients: raw.recipients.clone(),
            deadline: raw.deadline_secs.map(Duration::from_secs),
            max_depth: raw.max_depth,
            chunk_size: raw.chunk_size,
            spool_dir: raw.spool_dir.clone(),
            _raw_settings: raw,
        })
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(user) = lookup(TARGET_USER_ENV).filter(|v| !v.trim().is_empty()) {
            self.target_user = Some(user.trim().to_string());
        }
        if let Some(list) = lookup(RECIPIENTS_ENV) {
            self.recipients = list
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(secs) = lookup(DEADLINE_ENV) {
            let secs: u64 = secs
                .trim()
                .parse()
                .with_context(|| format!("{} must be a number of seconds", DEADLINE_ENV))?;
            self.deadline = (secs > 0).then(|| Duration::from_secs(secs));
        }
        Ok(())
    }

    /// Save config to the data directory, preserving settings we don't manage
    pub fn save(&self, dir: &Path) -> Result<()> {
        let settings_path = dir.join(SETTINGS_FILE);

        let mut settings = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str::<SettingsFile>(&content).unwrap_or_default()
        } else {
            self._raw_settings.clone()
        };

        settings.target_user = self.target_user.clone();
        settings.graph_base_url = self.graph_base_url.clone();
        settings.google_base_url = self.google_base_url.clone();
        settings.recipients = self.recipients.clone();
        settings.deadline_secs = self.deadline.map(|d| d.as_secs());
        settings.max_depth = self.max_depth;
        settings.chunk_size = self.chunk_size;
        settings.spool_dir = self.spool_dir.clone();

        std::fs::create_dir_all(dir)?;
        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)
            .with_context(|| format!("Failed to write {}", settings_path.display()))?;
        Ok(())
    }

    /// Knobs for the orchestrator; requires a target user
    pub fn run_settings(&self) -> Result<RunSettings> {
        let principal = self.target_user.clone().with_context(|| {
            format!(
                "No target user configured. Set \"targetUser\" in {} or {}",
                SETTINGS_FILE, TARGET_USER_ENV
            )
        })?;

        let mut settings = RunSettings::new(principal);
        settings.deadline = self.deadline;
        if let Some(depth) = self.max_depth {
            settings.max_depth = depth;
        }
        if let Some(size) = self.chunk_size {
            settings.chunk_size = size;
        }
        settings.spool_dir = self.spool_dir.clone();
        Ok(settings)
    }
}
