//! Configuration store port - configs, sources and backup history

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::result::Result;
use crate::domain::{
    BackupConfiguration, BackupRun, ConfigChanges, ConfigId, HistoryUpdate,
    NewBackupConfiguration, NewBackupRun, RetentionPolicy, RunId, UserId,
};

/// Record store for backup configurations and their history
///
/// Configuration reads return a snapshot: a run works from the value it
/// fetched and never re-reads mid-run.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    // === Configurations ===

    /// Get a configuration with its sources
    async fn get_config(&self, id: ConfigId) -> Result<Option<BackupConfiguration>>;

    /// All configurations owned by a user, ordered by id
    async fn get_configs_by_user(&self, user: &UserId) -> Result<Vec<BackupConfiguration>>;

    /// Create a configuration and its source folders
    async fn create_config(&self, config: &NewBackupConfiguration) -> Result<BackupConfiguration>;

    /// Apply changes; a present `sources` list replaces the source set wholesale
    async fn update_config(
        &self,
        id: ConfigId,
        changes: &ConfigChanges,
    ) -> Result<BackupConfiguration>;

    /// Delete a configuration and its sources, and optionally its history
    async fn delete_config(&self, id: ConfigId, with_history: bool) -> Result<()>;

    // === History ===

    /// Insert a history row in status `processing`
    async fn create_history(&self, run: &NewBackupRun) -> Result<BackupRun>;

    /// Move a `processing` row to its terminal state. Any other starting
    /// state is rejected.
    async fn update_history(&self, id: RunId, update: &HistoryUpdate) -> Result<BackupRun>;

    /// Delete the rows a policy expires and return them
    ///
    /// Atomic per configuration. Never removes a `processing` row.
    async fn prune_history(
        &self,
        config_id: ConfigId,
        policy: &RetentionPolicy,
        today: NaiveDate,
    ) -> Result<Vec<BackupRun>>;

    /// History for a configuration, newest first
    async fn list_history(&self, config_id: ConfigId) -> Result<Vec<BackupRun>>;
}
