//! DriveMirror Core - scheduled cloud-to-cloud backups
//!
//! Walks OneDrive folders, packs them into one ZIP archive per
//! configuration, uploads it to OneDrive and Google Drive, and prunes old
//! backups. Follows hexagonal architecture:
//!
//! - **domain**: Core entities (BackupConfiguration, BackupRun, events)
//! - **ports**: Trait definitions for external dependencies (store, drives, credentials, mail)
//! - **services**: Business logic orchestration
//! - **adapters**: Concrete implementations (DuckDB, Graph, Google Drive, OAuth, in-memory)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use adapters::duckdb::DuckDbStore;
use adapters::gdrive::GoogleDriveClient;
use adapters::graph::GraphClient;
use adapters::oauth::{OAuthCredentials, StaticCredentials};
use config::Config;
use ports::CredentialProvider;
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::Error;
pub use domain::{
    BackupConfiguration, BackupRun, BackupStatus, BatchReport, ConfigChanges, ConfigRunResult,
    NewBackupConfiguration, RetentionPolicy, UserId,
};

pub const DATABASE_FILE: &str = "drivemirror.duckdb";

/// Main context for DriveMirror operations
///
/// Holds the store and configuration. Drive clients and credentials are
/// built on demand by [`DriveMirrorContext::orchestrator`], so commands that
/// only touch the store work without any secrets configured.
pub struct DriveMirrorContext {
    pub config: Config,
    pub store: Arc<DuckDbStore>,
    pub status_service: StatusService,
    data_dir: PathBuf,
}

impl DriveMirrorContext {
    /// Open the data directory, creating it and the database if needed
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create {}", data_dir.display()))?;
        let config = Config::load(data_dir)?;

        let db_path = data_dir.join(DATABASE_FILE);
        let store = Arc::new(
            DuckDbStore::new(&db_path)
                .with_context(|| format!("Failed to open {}", db_path.display()))?,
        );
        let status_service = StatusService::new(store.clone());

        Ok(Self {
            config,
            store,
            status_service,
            data_dir: data_dir.to_path_buf(),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Pre-issued tokens when both are set, otherwise OAuth app credentials
    pub fn credentials(&self) -> Result<Arc<dyn CredentialProvider>> {
        let tokens = StaticCredentials::from_env();
        if tokens.is_complete() {
            debug!("Using pre-issued access tokens");
            return Ok(Arc::new(tokens));
        }
        let oauth = OAuthCredentials::from_env().context(
            "No credentials configured. Set DRIVEMIRROR_ONEDRIVE_TOKEN and \
             DRIVEMIRROR_GDRIVE_TOKEN, or the Microsoft and Google OAuth variables",
        )?;
        Ok(Arc::new(oauth))
    }

    fn drive_clients(&self) -> Result<(Arc<GraphClient>, Arc<GoogleDriveClient>)> {
        let graph = match &self.config.graph_base_url {
            Some(url) => GraphClient::new_with_base_url(url)?,
            None => GraphClient::new()?,
        };
        let google = match &self.config.google_base_url {
            Some(url) => GoogleDriveClient::new_with_base_url(url)?,
            None => GoogleDriveClient::new()?,
        };
        Ok((Arc::new(graph), Arc::new(google)))
    }

    /// Wire a backup orchestrator against the real drives
    pub fn orchestrator(&self) -> Result<BackupOrchestrator> {
        let settings = self.config.run_settings()?;
        let (graph, google) = self.drive_clients()?;
        let emitter = NotificationEmitter::new(self.store.clone(), self.config.recipients.clone());

        Ok(BackupOrchestrator::new(
            self.store.clone(),
            self.credentials()?,
            graph,
            google,
            emitter,
            settings,
        ))
    }

    /// Wire a connection checker; a missing target user fails only the OneDrive check
    pub fn connection_checker(&self) -> Result<ConnectionChecker> {
        let (graph, google) = self.drive_clients()?;
        Ok(ConnectionChecker::new(
            self.credentials()?,
            graph,
            google,
            self.config.target_user.clone(),
        ))
    }
}
