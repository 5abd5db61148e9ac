//! Backup configuration domain model

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::result::{Error, Result};

pub type ConfigId = i64;

/// Authenticated caller identity. Issued by the auth collaborator; the core
/// only compares it against configuration ownership.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A OneDrive folder path to back up, owned by exactly one configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFolder {
    pub id: i64,
    pub config_id: ConfigId,
    pub path: String,
}

impl SourceFolder {
    /// Last path segment; names the folder's root inside the archive
    pub fn basename(&self) -> &str {
        basename(&self.path)
    }
}

/// Last non-empty segment of a `/`-separated path, or "folder" for the root
pub fn basename(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("folder")
}

/// How many historical backups to keep for a configuration
///
/// The legacy `retention_days` column is a retain-count in practice, so
/// `KeepLatest` is the default. `MaxAgeDays` is a real calendar window over
/// the backup date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RetentionPolicy {
    KeepLatest(u32),
    MaxAgeDays(u32),
}

impl RetentionPolicy {
    pub const DEFAULT_KEEP: u32 = 7;
    /// Upper bound for either policy's value (about 100 years of days)
    pub const MAX_VALUE: u32 = 36_500;

    pub fn kind(&self) -> &'static str {
        match self {
            RetentionPolicy::KeepLatest(_) => "keep_latest",
            RetentionPolicy::MaxAgeDays(_) => "max_age_days",
        }
    }

    pub fn value(&self) -> u32 {
        match self {
            RetentionPolicy::KeepLatest(n) | RetentionPolicy::MaxAgeDays(n) => *n,
        }
    }

    /// Rebuild a policy from its stored (kind, value) columns
    pub fn from_parts(kind: &str, value: u32) -> Result<Self> {
        match kind {
            "keep_latest" => Ok(RetentionPolicy::KeepLatest(value)),
            "max_age_days" => Ok(RetentionPolicy::MaxAgeDays(value)),
            other => Err(Error::validation(format!("Unknown retention kind: {}", other))),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.value() == 0 {
            return Err(Error::validation("Retention must keep at least one backup"));
        }
        if self.value() > Self::MAX_VALUE {
            return Err(Error::validation(format!(
                "Retention cannot exceed {}",
                Self::MAX_VALUE
            )));
        }
        Ok(())
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        RetentionPolicy::KeepLatest(Self::DEFAULT_KEEP)
    }
}

impl fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetentionPolicy::KeepLatest(n) => write!(f, "keep latest {}", n),
            RetentionPolicy::MaxAgeDays(n) => write!(f, "keep {} days", n),
        }
    }
}

/// A named backup job: sources on OneDrive, mirrored to two destinations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupConfiguration {
    pub id: ConfigId,
    pub user_id: UserId,
    pub name: String,
    pub sources: Vec<SourceFolder>,
    /// Destination folder path on OneDrive
    pub onedrive_path: String,
    /// Destination folder path on Google Drive
    pub gdrive_path: String,
    pub retention: RetentionPolicy,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BackupConfiguration {
    /// Check everything a run needs before touching the network
    pub fn validate_for_run(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(Error::config("no sources configured"));
        }
        if self.onedrive_path.trim().is_empty() {
            return Err(Error::config("missing OneDrive destination path"));
        }
        if self.gdrive_path.trim().is_empty() {
            return Err(Error::config("missing Google Drive destination path"));
        }
        Ok(())
    }

    pub fn source_paths(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.path.as_str()).collect()
    }
}

/// Fields for creating a configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBackupConfiguration {
    pub user_id: UserId,
    pub name: String,
    pub onedrive_path: String,
    pub gdrive_path: String,
    #[serde(default)]
    pub retention: RetentionPolicy,
    #[serde(default)]
    pub sources: Vec<String>,
}

impl NewBackupConfiguration {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("Configuration name cannot be empty"));
        }
        if self.onedrive_path.trim().is_empty() || self.gdrive_path.trim().is_empty() {
            return Err(Error::validation("Both destination paths are required"));
        }
        if self.sources.iter().any(|s| s.trim().is_empty()) {
            return Err(Error::validation("Source paths cannot be empty"));
        }
        self.retention.validate()
    }
}

/// Partial update of a configuration. `sources`, when present, replaces the
/// whole source set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigChanges {
    pub name: Option<String>,
    pub onedrive_path: Option<String>,
    pub gdrive_path: Option<String>,
    pub retention: Option<RetentionPolicy>,
    pub sources: Option<Vec<String>>,
}

impl ConfigChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.onedrive_path.is_none()
            && self.gdrive_path.is_none()
            && self.retention.is_none()
            && self.sources.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if matches!(&self.name, Some(n) if n.trim().is_empty()) {
            return Err(Error::validation("Configuration name cannot be empty"));
        }
        if matches!(&self.onedrive_path, Some(p) if p.trim().is_empty())
            || matches!(&self.gdrive_path, Some(p) if p.trim().is_empty())
        {
            return Err(Error::validation("Destination paths cannot be empty"));
        }
        if let Some(retention) = &self.retention {
            retention.validate()?;
        }
        Ok(())
    }
}
