//! Backup run orchestrator
//!
//! Sequences one configuration's run:
//! history row → validate → credentials → walk + archive → dual upload →
//! complete → prune → remote cleanup → notify.
//!
//! Every run ends with exactly one terminal history update and exactly one
//! notification. Batches run configurations one after another and finish
//! with a single summary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{error, info, warn};

use crate::domain::result::{Error, Result};
use crate::domain::{
    archive_file_name, BackupConfiguration, BatchReport, ConfigId, ConfigRunResult,
    HistoryUpdate, NewBackupRun, RunId, UserId,
};
use crate::ports::{ConfigStore, CredentialProvider, FolderDrive, PathDrive};
use crate::services::archive::{ArchiveBuilder, FinishedArchive};
use crate::services::notification::NotificationEmitter;
use crate::services::retention::RetentionPruner;
use crate::services::upload::{DriveAccess, DualUploader, DEFAULT_CHUNK_SIZE};
use crate::services::walker::RemoteTreeWalker;

/// Per-deployment knobs for a run
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// OneDrive user (e-mail or UPN) whose folders are backed up
    pub principal: String,
    /// Overall limit for walk + archive + upload
    pub deadline: Option<Duration>,
    pub max_depth: usize,
    pub chunk_size: usize,
    /// Where archives are spooled; system temp dir when `None`
    pub spool_dir: Option<PathBuf>,
}

impl RunSettings {
    pub fn new(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            deadline: None,
            max_depth: RemoteTreeWalker::DEFAULT_MAX_DEPTH,
            chunk_size: DEFAULT_CHUNK_SIZE,
            spool_dir: None,
        }
    }
}

/// What a successful upload leaves behind for the post-upload steps
struct Produced {
    file_size: u64,
    access: DriveAccess,
    warnings: Vec<String>,
}

/// A failed run and which destinations had already accepted the archive
struct Failure {
    error: Error,
    onedrive_uploaded: bool,
    gdrive_uploaded: bool,
}

impl From<Error> for Failure {
    fn from(error: Error) -> Self {
        Self {
            error,
            onedrive_uploaded: false,
            gdrive_uploaded: false,
        }
    }
}

pub struct BackupOrchestrator {
    store: Arc<dyn ConfigStore>,
    credentials: Arc<dyn CredentialProvider>,
    onedrive: Arc<dyn PathDrive>,
    walker: RemoteTreeWalker,
    uploader: DualUploader,
    pruner: RetentionPruner,
    emitter: NotificationEmitter,
    settings: RunSettings,
}

impl BackupOrchestrator {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        credentials: Arc<dyn CredentialProvider>,
        onedrive: Arc<dyn PathDrive>,
        gdrive: Arc<dyn FolderDrive>,
        emitter: NotificationEmitter,
        settings: RunSettings,
    ) -> Self {
        let walker = RemoteTreeWalker::new(Arc::clone(&onedrive)).with_max_depth(settings.max_depth);
        let uploader = DualUploader::new(Arc::clone(&onedrive), Arc::clone(&gdrive))
            .with_chunk_size(settings.chunk_size);
        let pruner = RetentionPruner::new(Arc::clone(&store), Arc::clone(&onedrive), gdrive);
        Self {
            store,
            credentials,
            onedrive,
            walker,
            uploader,
            pruner,
            emitter,
            settings,
        }
    }

    /// Run every configuration of `user`, sequentially
    ///
    /// Only a store failure while listing configurations is an `Err`; each
    /// configuration's own failure is reported inside the batch result.
    pub async fn run_batch(&self, user: &UserId) -> Result<BatchReport> {
        let configs = self.store.get_configs_by_user(user).await?;
        info!(user = %user, configs = configs.len(), "Starting backup batch");

        let mut results = Vec::with_capacity(configs.len());
        for config in &configs {
            results.push(self.execute(config).await);
        }

        let report = BatchReport::from_results(results);
        info!(
            user = %user,
            success = report.summary.success_count,
            errors = report.summary.error_count,
            "Backup batch finished"
        );
        if !report.results.is_empty() {
            self.emitter.emit(&report.to_event()).await;
        }
        Ok(report)
    }

    /// Run one configuration owned by `user`
    pub async fn run_config(&self, user: &UserId, config_id: ConfigId) -> Result<ConfigRunResult> {
        let config = self
            .store
            .get_config(config_id)
            .await?
            .filter(|c| &c.user_id == user)
            .ok_or_else(|| Error::not_found(format!("Backup configuration {}", config_id)))?;
        Ok(self.execute(&config).await)
    }

    /// The full state machine for one configuration snapshot
    pub async fn execute(&self, config: &BackupConfiguration) -> ConfigRunResult {
        let started = Instant::now();
        let now = Utc::now();
        let file_name = archive_file_name(&config.name, now);
        info!(config = %config.name, id = config.id, file = %file_name, "Starting backup run");

        let mut result = ConfigRunResult {
            config_id: config.id,
            config_name: config.name.clone(),
            source_folders: config.sources.len(),
            success: false,
            error: None,
            file_name: None,
            file_size: None,
            deleted_old_backups: 0,
            processing_time_ms: 0,
            warnings: Vec::new(),
        };

        let run = match self
            .store
            .create_history(&NewBackupRun::new(config.id, &file_name, now))
            .await
        {
            Ok(run) => run,
            Err(e) => {
                error!(config = %config.name, error = %e, "Failed to create history entry");
                result.error = Some(e.to_string());
                return self.finish(result, started).await;
            }
        };

        let produced = match self.settings.deadline {
            Some(deadline) => {
                match tokio::time::timeout(deadline, self.produce(config, &file_name)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(Failure::from(Error::Timeout(format!(
                        "backup did not finish within {}s",
                        deadline.as_secs()
                    )))),
                }
            }
            None => self.produce(config, &file_name).await,
        };

        match produced {
            Ok(produced) => {
                result.warnings = produced.warnings.clone();
                match self.complete(config, run.id, &produced).await {
                    Ok(deleted) => {
                        result.success = true;
                        result.file_name = Some(file_name);
                        result.file_size = Some(produced.file_size);
                        result.deleted_old_backups = deleted;
                    }
                    Err(e) => {
                        error!(config = %config.name, error = %e, "Failed to record completed backup");
                        let message = format!("Backup uploaded but not recorded: {}", e);
                        let update = HistoryUpdate::failed(&message).with_uploads(true, true);
                        if let Err(e) = self.store.update_history(run.id, &update).await {
                            error!(config = %config.name, error = %e, "Failed to record failed backup");
                        }
                        result.error = Some(message);
                    }
                }
            }
            Err(failure) => {
                let message = failure.error.to_string();
                warn!(config = %config.name, error = %message, "Backup run failed");
                let update = HistoryUpdate::failed(&message)
                    .with_uploads(failure.onedrive_uploaded, failure.gdrive_uploaded);
                if let Err(e) = self.store.update_history(run.id, &update).await {
                    error!(config = %config.name, error = %e, "Failed to record failed backup");
                }
                result.error = Some(message);
            }
        }

        self.finish(result, started).await
    }

    async fn finish(&self, mut result: ConfigRunResult, started: Instant) -> ConfigRunResult {
        result.processing_time_ms = started.elapsed().as_millis() as u64;
        self.emitter.emit(&result.to_event()).await;
        result
    }

    /// Validate, fetch credentials, archive every source and upload
    async fn produce(
        &self,
        config: &BackupConfiguration,
        file_name: &str,
    ) -> std::result::Result<Produced, Failure> {
        config.validate_for_run()?;

        let onedrive_token = self.credentials.onedrive_token().await?;
        let gdrive_token = self.credentials.gdrive_token().await?;
        let principal = self
            .onedrive
            .resolve_principal(&onedrive_token, &self.settings.principal)
            .await?;
        let access = DriveAccess {
            onedrive_token,
            gdrive_token,
            principal,
        };

        let archive = self.build_archive(config, &access).await?;
        info!(
            config = %config.name,
            files = archive.stats.files,
            folders = archive.stats.folders,
            skipped = archive.stats.skipped,
            size = archive.source.size(),
            "Archive built"
        );

        let report = self
            .uploader
            .upload(
                &access,
                &archive.source,
                &config.onedrive_path,
                &config.gdrive_path,
                file_name,
            )
            .await;
        if let Some(message) = report.failure_message() {
            return Err(Failure {
                error: Error::Upload(message),
                onedrive_uploaded: report.onedrive.is_ok(),
                gdrive_uploaded: report.gdrive.is_ok(),
            });
        }

        Ok(Produced {
            file_size: report.archive_size,
            access,
            warnings: archive.warnings,
        })
    }

    async fn build_archive(
        &self,
        config: &BackupConfiguration,
        access: &DriveAccess,
    ) -> Result<FinishedArchive> {
        let mut builder = ArchiveBuilder::begin(self.settings.spool_dir.as_deref())?;
        for source in &config.sources {
            let mut walk = self
                .walker
                .walk(&access.onedrive_token, &access.principal, &source.path);
            builder.add_walk(&mut walk).await?;
        }
        builder.finish()
    }

    /// Mark the run completed, then prune. Returns how many old runs were removed.
    async fn complete(
        &self,
        config: &BackupConfiguration,
        run_id: RunId,
        produced: &Produced,
    ) -> Result<usize> {
        self.store
            .update_history(run_id, &HistoryUpdate::completed(produced.file_size))
            .await?;
        info!(config = %config.name, size = produced.file_size, "Backup completed");

        let removed = match self.pruner.prune(config, Utc::now().date_naive()).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(config = %config.name, error = %e, "Retention pruning failed");
                return Ok(0);
            }
        };
        let cleanup = self
            .pruner
            .remove_remote_files(config, &removed, &produced.access)
            .await;
        if !cleanup.failures.is_empty() {
            warn!(
                config = %config.name,
                failures = cleanup.failures.len(),
                "Some old backups could not be deleted remotely"
            );
        }
        Ok(removed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        FixedCredentials, MemoryFolderDrive, MemoryPathDrive, MemoryStore, RecordingSink,
    };
    use crate::domain::{
        BackupRun, BackupStatus, ConfigChanges, NewBackupConfiguration, RetentionPolicy,
    };
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Memory store whose first attempt to mark a run completed fails
    struct RejectingCompletion {
        inner: MemoryStore,
        rejected: AtomicBool,
    }

    #[async_trait]
    impl ConfigStore for RejectingCompletion {
        async fn get_config(&self, id: ConfigId) -> Result<Option<BackupConfiguration>> {
            self.inner.get_config(id).await
        }

        async fn get_configs_by_user(&self, user: &UserId) -> Result<Vec<BackupConfiguration>> {
            self.inner.get_configs_by_user(user).await
        }

        async fn create_config(&self, new: &NewBackupConfiguration) -> Result<BackupConfiguration> {
            self.inner.create_config(new).await
        }

        async fn update_config(
            &self,
            id: ConfigId,
            changes: &ConfigChanges,
        ) -> Result<BackupConfiguration> {
            self.inner.update_config(id, changes).await
        }

        async fn delete_config(&self, id: ConfigId, with_history: bool) -> Result<()> {
            self.inner.delete_config(id, with_history).await
        }

        async fn create_history(&self, run: &NewBackupRun) -> Result<BackupRun> {
            self.inner.create_history(run).await
        }

        async fn update_history(&self, id: RunId, update: &HistoryUpdate) -> Result<BackupRun> {
            if update.status == BackupStatus::Completed && !self.rejected.swap(true, Ordering::SeqCst) {
                return Err(Error::database("connection reset"));
            }
            self.inner.update_history(id, update).await
        }

        async fn prune_history(
            &self,
            config_id: ConfigId,
            policy: &RetentionPolicy,
            today: NaiveDate,
        ) -> Result<Vec<BackupRun>> {
            self.inner.prune_history(config_id, policy, today).await
        }

        async fn list_history(&self, config_id: ConfigId) -> Result<Vec<BackupRun>> {
            self.inner.list_history(config_id).await
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        onedrive: Arc<MemoryPathDrive>,
        gdrive: Arc<MemoryFolderDrive>,
        sink: Arc<RecordingSink>,
        orchestrator: BackupOrchestrator,
    }

    fn harness(onedrive: MemoryPathDrive, credentials: FixedCredentials) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let onedrive = Arc::new(onedrive);
        let gdrive = Arc::new(MemoryFolderDrive::new());
        let sink = Arc::new(RecordingSink::new());
        let orchestrator = BackupOrchestrator::new(
            store.clone(),
            Arc::new(credentials),
            onedrive.clone(),
            gdrive.clone(),
            NotificationEmitter::new(sink.clone(), vec!["ops@example.com".to_string()]),
            RunSettings::new("admin@example.com"),
        );
        Harness {
            store,
            onedrive,
            gdrive,
            sink,
            orchestrator,
        }
    }

    async fn add_config(store: &MemoryStore, name: &str, sources: &[&str]) -> BackupConfiguration {
        store
            .create_config(&NewBackupConfiguration {
                user_id: UserId::new("admin"),
                name: name.to_string(),
                onedrive_path: "/Backups".to_string(),
                gdrive_path: "/Backups".to_string(),
                retention: RetentionPolicy::KeepLatest(7),
                sources: sources.iter().map(|s| s.to_string()).collect(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_no_sources_fails_without_network() {
        let h = harness(MemoryPathDrive::new(), FixedCredentials::new());
        let config = add_config(&h.store, "Empty", &[]).await;

        let result = h.orchestrator.execute(&config).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("no sources configured"));
        assert_eq!(h.onedrive.calls(), 0);
        assert_eq!(h.gdrive.calls(), 0);
        let history = h.store.list_history(config.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, BackupStatus::Failed);
        assert_eq!(h.sink.kinds(), vec!["backup_error"]);
    }

    #[tokio::test]
    async fn test_credential_failure_short_circuits() {
        let h = harness(
            MemoryPathDrive::new().with_file("/Docs/a.txt", b"a".to_vec()),
            FixedCredentials::new().fail_gdrive("refresh token revoked"),
        );
        let config = add_config(&h.store, "Docs", &["/Docs"]).await;

        let result = h.orchestrator.execute(&config).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("refresh token revoked"));
        assert_eq!(h.onedrive.calls(), 0);
        let history = h.store.list_history(config.id).await.unwrap();
        assert_eq!(history[0].status, BackupStatus::Failed);
    }

    #[tokio::test]
    async fn test_successful_run_completes_history() {
        let h = harness(
            MemoryPathDrive::new().with_file("/Docs/a.txt", vec![1; 2048]),
            FixedCredentials::new(),
        );
        let config = add_config(&h.store, "Docs", &["/Docs"]).await;

        let result = h.orchestrator.execute(&config).await;

        assert!(result.success, "{:?}", result.error);
        let file_name = result.file_name.clone().unwrap();
        let size = result.file_size.unwrap();
        assert!(size > 0);
        assert_eq!(
            h.onedrive.file(&format!("/Backups/{}", file_name)).unwrap().len() as u64,
            size
        );
        assert_eq!(
            h.gdrive.file_in_folder("Backups", &file_name).unwrap().len() as u64,
            size
        );

        let history = h.store.list_history(config.id).await.unwrap();
        assert_eq!(history[0].status, BackupStatus::Completed);
        assert_eq!(history[0].file_size, size);
        assert!(history[0].onedrive_uploaded && history[0].gdrive_uploaded);
        assert_eq!(h.sink.kinds(), vec!["backup_success"]);
    }

    #[tokio::test]
    async fn test_unrecorded_completion_marks_run_failed() {
        let store = Arc::new(RejectingCompletion {
            inner: MemoryStore::new(),
            rejected: AtomicBool::new(false),
        });
        let onedrive = Arc::new(MemoryPathDrive::new().with_file("/Docs/a.txt", vec![1; 512]));
        let gdrive = Arc::new(MemoryFolderDrive::new());
        let sink = Arc::new(RecordingSink::new());
        let orchestrator = BackupOrchestrator::new(
            store.clone(),
            Arc::new(FixedCredentials::new()),
            onedrive,
            gdrive,
            NotificationEmitter::new(sink.clone(), vec!["ops@example.com".to_string()]),
            RunSettings::new("admin@example.com"),
        );
        let config = add_config(&store.inner, "Docs", &["/Docs"]).await;

        let result = orchestrator.execute(&config).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("connection reset"));
        let history = store.list_history(config.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, BackupStatus::Failed);
        assert!(history[0].onedrive_uploaded && history[0].gdrive_uploaded);
        assert_eq!(sink.kinds(), vec!["backup_error"]);
    }

    #[tokio::test]
    async fn test_run_config_checks_ownership() {
        let h = harness(MemoryPathDrive::new(), FixedCredentials::new());
        let config = add_config(&h.store, "Docs", &["/Docs"]).await;

        let err = h
            .orchestrator
            .run_config(&UserId::new("someone-else"), config.id)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(h.store.list_history(config.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch_emits_no_summary() {
        let h = harness(MemoryPathDrive::new(), FixedCredentials::new());
        let report = h.orchestrator.run_batch(&UserId::new("nobody")).await.unwrap();
        assert!(report.success);
        assert!(report.results.is_empty());
        assert!(h.sink.kinds().is_empty());
    }
}
