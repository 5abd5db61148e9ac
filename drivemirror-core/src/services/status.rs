//! Status service - per-configuration backup overview

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::result::Result;
use crate::domain::{format_size, BackupRun, BackupStatus, ConfigId, RetentionPolicy, UserId};
use crate::ports::ConfigStore;

pub struct StatusService {
    store: Arc<dyn ConfigStore>,
}

impl StatusService {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    /// One entry per configuration the user owns
    pub async fn overview(&self, user: &UserId) -> Result<StatusSummary> {
        let configs = self.store.get_configs_by_user(user).await?;
        let mut entries = Vec::with_capacity(configs.len());

        for config in configs {
            let history = self.store.list_history(config.id).await?;
            entries.push(ConfigStatus {
                id: config.id,
                name: config.name,
                source_count: config.sources.len(),
                retention: config.retention,
                total_backups: history.len(),
                completed_backups: history
                    .iter()
                    .filter(|r| r.status == BackupStatus::Completed)
                    .count(),
                last_backup: history.first().map(LastBackup::from),
            });
        }

        Ok(StatusSummary {
            total_configs: entries.len(),
            failing_configs: entries
                .iter()
                .filter(|e| matches!(&e.last_backup, Some(l) if l.status == BackupStatus::Failed))
                .count(),
            configs: entries,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummary {
    pub total_configs: usize,
    /// Configurations whose most recent run failed
    pub failing_configs: usize,
    pub configs: Vec<ConfigStatus>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigStatus {
    pub id: ConfigId,
    pub name: String,
    pub source_count: usize,
    pub retention: RetentionPolicy,
    pub total_backups: usize,
    pub completed_backups: usize,
    pub last_backup: Option<LastBackup>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastBackup {
    pub date: NaiveDate,
    pub status: BackupStatus,
    pub file_name: String,
    pub file_size: u64,
    pub size_display: String,
    pub error: Option<String>,
}

impl From<&BackupRun> for LastBackup {
    fn from(run: &BackupRun) -> Self {
        Self {
            date: run.backup_date,
            status: run.status,
            file_name: run.file_name.clone(),
            file_size: run.file_size,
            size_display: format_size(run.file_size),
            error: run.error_message.clone(),
        }
    }
}
