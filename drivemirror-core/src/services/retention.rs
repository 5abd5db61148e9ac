//! Retention pruner
//!
//! History rows are authoritative: they are pruned first, atomically and
//! serialized per configuration. Remote files of pruned rows are then
//! deleted best-effort; a file that is already gone counts as deleted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::domain::config::basename;
use crate::domain::result::Result;
use crate::domain::{BackupConfiguration, BackupRun, ConfigId, Destination};
use crate::ports::{ConfigStore, DeleteOutcome, FolderDrive, PathDrive};
use crate::services::upload::DriveAccess;

/// Result of removing pruned backups from both drives
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub removed_runs: usize,
    pub deleted: usize,
    pub already_gone: usize,
    pub failures: Vec<String>,
}

pub struct RetentionPruner {
    store: Arc<dyn ConfigStore>,
    onedrive: Arc<dyn PathDrive>,
    gdrive: Arc<dyn FolderDrive>,
    locks: Mutex<HashMap<ConfigId, Arc<tokio::sync::Mutex<()>>>>,
}

impl RetentionPruner {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        onedrive: Arc<dyn PathDrive>,
        gdrive: Arc<dyn FolderDrive>,
    ) -> Self {
        Self {
            store,
            onedrive,
            gdrive,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, config_id: ConfigId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(config_id).or_default())
    }

    /// Delete expired history rows for `config` and return them
    pub async fn prune(&self, config: &BackupConfiguration, today: NaiveDate) -> Result<Vec<BackupRun>> {
        let lock = self.lock_for(config.id);
        let _guard = lock.lock().await;

        let removed = self
            .store
            .prune_history(config.id, &config.retention, today)
            .await?;
        info!(
            config = %config.name,
            policy = %config.retention,
            removed = removed.len(),
            "Pruned backup history"
        );
        Ok(removed)
    }

    /// Best-effort delete of pruned archives from both drives
    pub async fn remove_remote_files(
        &self,
        config: &BackupConfiguration,
        removed: &[BackupRun],
        access: &DriveAccess,
    ) -> PruneReport {
        let mut report = PruneReport {
            removed_runs: removed.len(),
            ..Default::default()
        };
        if removed.is_empty() {
            return report;
        }

        for run in removed {
            for destination in Destination::ALL {
                match self.delete_one(destination, config, &run.file_name, access).await {
                    Ok(DeleteOutcome::Deleted) => report.deleted += 1,
                    Ok(DeleteOutcome::NotFound) => {
                        debug!(destination = %destination, file = %run.file_name, "Old backup already gone");
                        report.already_gone += 1;
                    }
                    Err(e) if e.is_not_found() => report.already_gone += 1,
                    Err(e) => {
                        warn!(
                            destination = %destination,
                            file = %run.file_name,
                            error = %e,
                            "Failed to delete old backup"
                        );
                        report
                            .failures
                            .push(format!("{} {}: {}", destination, run.file_name, e));
                    }
                }
            }
        }
        report
    }

    async fn delete_one(
        &self,
        destination: Destination,
        config: &BackupConfiguration,
        file_name: &str,
        access: &DriveAccess,
    ) -> Result<DeleteOutcome> {
        match destination {
            Destination::OneDrive => {
                self.onedrive
                    .delete_file(
                        &access.onedrive_token,
                        &access.principal,
                        &config.onedrive_path,
                        file_name,
                    )
                    .await
            }
            Destination::GoogleDrive => {
                let folder_id = self
                    .gdrive
                    .find_or_create_folder(&access.gdrive_token, basename(&config.gdrive_path))
                    .await?;
                match self
                    .gdrive
                    .search_by_name(&access.gdrive_token, file_name, Some(&folder_id))
                    .await?
                {
                    Some(file_id) => self.gdrive.delete_file(&access.gdrive_token, &file_id).await,
                    None => Ok(DeleteOutcome::NotFound),
                }
            }
        }
    }
}
