//! In-memory implementations of every port
//!
//! Used by service tests and the integration suite.
//! The drives keep whole files in memory and can be told to fail specific
//! operations.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use crate::domain::remote::join_remote_path;
use crate::domain::result::{Error, Result};
use crate::domain::{
    expired_runs, sort_newest_first, AccessToken, BackupConfiguration, BackupRun, BackupStatus,
    ConfigChanges, ConfigId, DownloadHandle, DriveQuota, HistoryUpdate, NewBackupConfiguration, NewBackupRun,
    PrincipalId, RemoteItem, RetentionPolicy, RunId, SourceFolder, UserId,
};
use crate::ports::{
    ByteSink, ChunkAck, ConfigStore, CredentialProvider, DeleteOutcome, EmailRequest, FolderDrive,
    NotificationSink, PathDrive,
};

fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn get_mut<T>(mutex: &mut Mutex<T>) -> &mut T {
    mutex.get_mut().unwrap_or_else(|e| e.into_inner())
}

// =============================================================================
// Store
// =============================================================================

#[derive(Default)]
struct StoreState {
    next_id: i64,
    configs: BTreeMap<ConfigId, BackupConfiguration>,
    history: BTreeMap<RunId, BackupRun>,
}

impl StoreState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn sources(&mut self, config_id: ConfigId, paths: &[String]) -> Vec<SourceFolder> {
        paths
            .iter()
            .map(|path| SourceFolder {
                id: self.next_id(),
                config_id,
                path: path.trim().to_string(),
            })
            .collect()
    }
}

/// `ConfigStore` over plain maps
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn get_config(&self, id: ConfigId) -> Result<Option<BackupConfiguration>> {
        Ok(relock(&self.state).configs.get(&id).cloned())
    }

    async fn get_configs_by_user(&self, user: &UserId) -> Result<Vec<BackupConfiguration>> {
        Ok(relock(&self.state)
            .configs
            .values()
            .filter(|c| &c.user_id == user)
            .cloned()
            .collect())
    }

    async fn create_config(&self, new: &NewBackupConfiguration) -> Result<BackupConfiguration> {
        new.validate()?;
        let mut state = relock(&self.state);
        let id = state.next_id();
        let now = Utc::now();
        let config = BackupConfiguration {
            id,
            user_id: new.user_id.clone(),
            name: new.name.trim().to_string(),
            sources: state.sources(id, &new.sources),
            onedrive_path: new.onedrive_path.clone(),
            gdrive_path: new.gdrive_path.clone(),
            retention: new.retention,
            created_at: now,
            updated_at: now,
        };
        state.configs.insert(id, config.clone());
        Ok(config)
    }

    async fn update_config(
        &self,
        id: ConfigId,
        changes: &ConfigChanges,
    ) -> Result<BackupConfiguration> {
        changes.validate()?;
        let mut state = relock(&self.state);
        let mut config = state
            .configs
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("Backup configuration {}", id)))?;

        if let Some(name) = &changes.name {
            config.name = name.trim().to_string();
        }
        if let Some(path) = &changes.onedrive_path {
            config.onedrive_path = path.clone();
        }
        if let Some(path) = &changes.gdrive_path {
            config.gdrive_path = path.clone();
        }
        if let Some(retention) = changes.retention {
            config.retention = retention;
        }
        if let Some(paths) = &changes.sources {
            config.sources = state.sources(id, paths);
        }
        config.updated_at = Utc::now();
        state.configs.insert(id, config.clone());
        Ok(config)
    }

    async fn delete_config(&self, id: ConfigId, with_history: bool) -> Result<()> {
        let mut state = relock(&self.state);
        if state.configs.remove(&id).is_none() {
            return Err(Error::not_found(format!("Backup configuration {}", id)));
        }
        if with_history {
            state.history.retain(|_, run| run.config_id != id);
        }
        Ok(())
    }

    async fn create_history(&self, new: &NewBackupRun) -> Result<BackupRun> {
        let mut state = relock(&self.state);
        let id = state.next_id();
        let run = BackupRun {
            id,
            config_id: new.config_id,
            backup_date: new.backup_date,
            file_name: new.file_name.clone(),
            file_size: 0,
            onedrive_uploaded: false,
            gdrive_uploaded: false,
            status: BackupStatus::Processing,
            error_message: None,
            created_at: new.created_at,
        };
        state.history.insert(id, run.clone());
        Ok(run)
    }

    async fn update_history(&self, id: RunId, update: &HistoryUpdate) -> Result<BackupRun> {
        let mut state = relock(&self.state);
        let run = state
            .history
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("Backup run {}", id)))?;
        run.apply(update)?;
        Ok(run.clone())
    }

    async fn prune_history(
        &self,
        config_id: ConfigId,
        policy: &RetentionPolicy,
        today: NaiveDate,
    ) -> Result<Vec<BackupRun>> {
        let mut state = relock(&self.state);
        let history: Vec<BackupRun> = state
            .history
            .values()
            .filter(|r| r.config_id == config_id)
            .cloned()
            .collect();
        let mut removed: Vec<BackupRun> = expired_runs(&history, policy, today)
            .into_iter()
            .filter_map(|id| state.history.remove(&id))
            .collect();
        sort_newest_first(&mut removed);
        Ok(removed)
    }

    async fn list_history(&self, config_id: ConfigId) -> Result<Vec<BackupRun>> {
        let mut runs: Vec<BackupRun> = relock(&self.state)
            .history
            .values()
            .filter(|r| r.config_id == config_id)
            .cloned()
            .collect();
        sort_newest_first(&mut runs);
        Ok(runs)
    }
}

// =============================================================================
// Path-addressed drive (OneDrive shape)
// =============================================================================

#[derive(Default)]
struct PathDriveState {
    files: BTreeMap<String, Vec<u8>>,
    folders: BTreeSet<String>,
    failing_listings: HashSet<String>,
    failing_downloads: HashSet<String>,
    upload_failure: Option<String>,
    delete_failure: Option<String>,
    quota_failure: Option<String>,
    sessions: HashMap<String, (String, Vec<u8>)>,
    sessions_opened: usize,
    chunk_sizes: Vec<usize>,
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    format!("/{}", trimmed)
}

/// `PathDrive` over a map of absolute paths to contents
#[derive(Default)]
pub struct MemoryPathDrive {
    state: Mutex<PathDriveState>,
    calls: AtomicUsize,
}

impl MemoryPathDrive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, bytes: Vec<u8>) -> Self {
        get_mut(&mut self.state).files.insert(normalize(path), bytes);
        self
    }

    pub fn with_folder(mut self, path: &str) -> Self {
        get_mut(&mut self.state).folders.insert(normalize(path));
        self
    }

    pub fn fail_listing(mut self, path: &str) -> Self {
        get_mut(&mut self.state)
            .failing_listings
            .insert(normalize(path));
        self
    }

    pub fn fail_download(mut self, path: &str) -> Self {
        get_mut(&mut self.state)
            .failing_downloads
            .insert(normalize(path));
        self
    }

    /// Every upload (simple or session) fails with `message`
    pub fn fail_uploads(mut self, message: &str) -> Self {
        get_mut(&mut self.state).upload_failure = Some(message.to_string());
        self
    }

    pub fn fail_deletes(mut self, message: &str) -> Self {
        get_mut(&mut self.state).delete_failure = Some(message.to_string());
        self
    }

    pub fn fail_quota(mut self, message: &str) -> Self {
        get_mut(&mut self.state).quota_failure = Some(message.to_string());
        self
    }

    /// Number of port calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        relock(&self.state).files.get(&normalize(path)).cloned()
    }

    pub fn sessions_opened(&self) -> usize {
        relock(&self.state).sessions_opened
    }

    pub fn chunk_sizes(&self) -> Vec<usize> {
        relock(&self.state).chunk_sizes.clone()
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn err(status: u16, message: impl Into<String>) -> Error {
        Error::drive("OneDrive", Some(status), message)
    }
}

#[async_trait]
impl PathDrive for MemoryPathDrive {
    async fn resolve_principal(&self, _token: &AccessToken, identifier: &str) -> Result<PrincipalId> {
        self.touch();
        Ok(PrincipalId::new(format!("principal:{}", identifier)))
    }

    async fn drive_quota(
        &self,
        _token: &AccessToken,
        principal: &PrincipalId,
    ) -> Result<DriveQuota> {
        self.touch();
        let state = relock(&self.state);
        if let Some(message) = &state.quota_failure {
            return Err(Self::err(403, message.clone()));
        }
        Ok(DriveQuota {
            owner: Some(principal.to_string()),
            drive_type: Some("business".to_string()),
            used_bytes: Some(state.files.values().map(|b| b.len() as u64).sum()),
            total_bytes: None,
        })
    }

    async fn list_children(
        &self,
        _token: &AccessToken,
        _principal: &PrincipalId,
        path: &str,
    ) -> Result<Vec<RemoteItem>> {
        self.touch();
        let state = relock(&self.state);
        let path = normalize(path);
        if state.failing_listings.contains(&path) {
            return Err(Self::err(403, "Access denied"));
        }

        let prefix = if path == "/" { "/".to_string() } else { format!("{}/", path) };
        let mut children: BTreeMap<String, RemoteItem> = BTreeMap::new();
        let mut found = state.folders.contains(&path);

        for (key, bytes) in &state.files {
            let Some(rest) = key.strip_prefix(&prefix) else { continue };
            found = true;
            match rest.split_once('/') {
                Some((folder, _)) => {
                    children
                        .entry(folder.to_string())
                        .or_insert_with(|| RemoteItem::Folder {
                            name: folder.to_string(),
                            child_count: 0,
                        });
                }
                None => {
                    children.insert(
                        rest.to_string(),
                        RemoteItem::File {
                            name: rest.to_string(),
                            size: bytes.len() as u64,
                            last_modified: None,
                            download: DownloadHandle::by_id(key.clone()),
                        },
                    );
                }
            }
        }
        for folder in &state.folders {
            let Some(rest) = folder.strip_prefix(&prefix) else { continue };
            found = true;
            let name = rest.split('/').next().unwrap_or(rest);
            children
                .entry(name.to_string())
                .or_insert_with(|| RemoteItem::Folder {
                    name: name.to_string(),
                    child_count: 0,
                });
        }

        if !found {
            return Err(Self::err(404, format!("Item not found: {}", path)));
        }
        Ok(children.into_values().collect())
    }

    async fn download(
        &self,
        _token: &AccessToken,
        handle: &DownloadHandle,
        sink: &mut dyn ByteSink,
    ) -> Result<u64> {
        self.touch();
        let bytes = {
            let state = relock(&self.state);
            if state.failing_downloads.contains(&handle.item_id) {
                return Err(Self::err(500, "Download failed"));
            }
            state
                .files
                .get(&handle.item_id)
                .cloned()
                .ok_or_else(|| Self::err(404, "Item not found"))?
        };
        let (head, tail) = bytes.split_at(bytes.len() / 2);
        sink.write_chunk(head)?;
        sink.write_chunk(tail)?;
        Ok(bytes.len() as u64)
    }

    async fn put_content(
        &self,
        _token: &AccessToken,
        _principal: &PrincipalId,
        folder: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<u64> {
        self.touch();
        let mut state = relock(&self.state);
        if let Some(message) = &state.upload_failure {
            return Err(Self::err(503, message.clone()));
        }
        let size = bytes.len() as u64;
        state
            .files
            .insert(normalize(&join_remote_path(folder, file_name)), bytes);
        Ok(size)
    }

    async fn create_upload_session(
        &self,
        _token: &AccessToken,
        _principal: &PrincipalId,
        folder: &str,
        file_name: &str,
    ) -> Result<String> {
        self.touch();
        let mut state = relock(&self.state);
        if let Some(message) = &state.upload_failure {
            return Err(Self::err(503, message.clone()));
        }
        state.sessions_opened += 1;
        let url = format!("memory://onedrive/session/{}", state.sessions_opened);
        state.sessions.insert(
            url.clone(),
            (normalize(&join_remote_path(folder, file_name)), Vec::new()),
        );
        Ok(url)
    }

    async fn put_session_chunk(
        &self,
        session_url: &str,
        offset: u64,
        total: u64,
        bytes: Vec<u8>,
    ) -> Result<ChunkAck> {
        self.touch();
        let mut state = relock(&self.state);
        state.chunk_sizes.push(bytes.len());
        let (target, buffer) = state
            .sessions
            .get_mut(session_url)
            .ok_or_else(|| Self::err(404, "Upload session not found"))?;
        if offset != buffer.len() as u64 {
            return Err(Self::err(416, format!("Expected offset {}, got {}", buffer.len(), offset)));
        }
        buffer.extend_from_slice(&bytes);
        if (buffer.len() as u64) < total {
            return Ok(ChunkAck::Continue);
        }
        let target = target.clone();
        let content = std::mem::take(buffer);
        let size = content.len() as u64;
        state.sessions.remove(session_url);
        state.files.insert(target, content);
        Ok(ChunkAck::Complete { size })
    }

    async fn delete_file(
        &self,
        _token: &AccessToken,
        _principal: &PrincipalId,
        folder: &str,
        file_name: &str,
    ) -> Result<DeleteOutcome> {
        self.touch();
        let mut state = relock(&self.state);
        if let Some(message) = &state.delete_failure {
            return Err(Self::err(503, message.clone()));
        }
        let path = normalize(&join_remote_path(folder, file_name));
        Ok(match state.files.remove(&path) {
            Some(_) => DeleteOutcome::Deleted,
            None => DeleteOutcome::NotFound,
        })
    }
}

// =============================================================================
// Folder/id-addressed drive (Google Drive shape)
// =============================================================================

struct StoredFile {
    name: String,
    parent: String,
    bytes: Vec<u8>,
}

struct PendingUpload {
    name: String,
    parent: String,
    buffer: Vec<u8>,
}

#[derive(Default)]
struct FolderDriveState {
    next_id: usize,
    folders: BTreeMap<String, String>,
    files: BTreeMap<String, StoredFile>,
    sessions: HashMap<String, PendingUpload>,
    upload_failure: Option<String>,
    quota_failure: Option<String>,
}

impl FolderDriveState {
    fn next_id(&mut self, kind: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", kind, self.next_id)
    }

    fn folder_id(&self, name: &str) -> Option<String> {
        self.folders
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(id, _)| id.clone())
    }

    fn ensure_folder(&mut self, name: &str) -> String {
        if let Some(id) = self.folder_id(name) {
            return id;
        }
        let id = self.next_id("folder");
        self.folders.insert(id.clone(), name.to_string());
        id
    }
}

/// `FolderDrive` keeping files by id under named folders
#[derive(Default)]
pub struct MemoryFolderDrive {
    state: Mutex<FolderDriveState>,
    calls: AtomicUsize,
}

impl MemoryFolderDrive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_uploads(mut self, message: &str) -> Self {
        get_mut(&mut self.state).upload_failure = Some(message.to_string());
        self
    }

    pub fn fail_quota(mut self, message: &str) -> Self {
        get_mut(&mut self.state).quota_failure = Some(message.to_string());
        self
    }

    /// Place a file directly, creating its folder if needed
    pub fn seed_file(&self, folder: &str, name: &str, bytes: Vec<u8>) {
        let mut state = relock(&self.state);
        let parent = state.ensure_folder(folder);
        let id = state.next_id("file");
        state.files.insert(
            id,
            StoredFile {
                name: name.to_string(),
                parent,
                bytes,
            },
        );
    }

    pub fn file_in_folder(&self, folder: &str, name: &str) -> Option<Vec<u8>> {
        let state = relock(&self.state);
        let parent = state.folder_id(folder)?;
        state
            .files
            .values()
            .find(|f| f.parent == parent && f.name == name)
            .map(|f| f.bytes.clone())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn err(status: u16, message: impl Into<String>) -> Error {
        Error::drive("Google Drive", Some(status), message)
    }
}

#[async_trait]
impl FolderDrive for MemoryFolderDrive {
    async fn find_or_create_folder(&self, _token: &AccessToken, name: &str) -> Result<String> {
        self.touch();
        Ok(relock(&self.state).ensure_folder(name))
    }

    async fn drive_quota(&self, _token: &AccessToken) -> Result<DriveQuota> {
        self.touch();
        let state = relock(&self.state);
        if let Some(message) = &state.quota_failure {
            return Err(Self::err(401, message.clone()));
        }
        Ok(DriveQuota {
            owner: Some("memory".to_string()),
            drive_type: None,
            used_bytes: Some(state.files.values().map(|f| f.bytes.len() as u64).sum()),
            total_bytes: None,
        })
    }

    async fn create_resumable_upload(
        &self,
        _token: &AccessToken,
        file_name: &str,
        parent_id: &str,
        _total: u64,
    ) -> Result<String> {
        self.touch();
        let mut state = relock(&self.state);
        if let Some(message) = &state.upload_failure {
            return Err(Self::err(503, message.clone()));
        }
        let url = format!("memory://gdrive/{}", state.next_id("session"));
        state.sessions.insert(
            url.clone(),
            PendingUpload {
                name: file_name.to_string(),
                parent: parent_id.to_string(),
                buffer: Vec::new(),
            },
        );
        Ok(url)
    }

    async fn put_session_chunk(
        &self,
        session_url: &str,
        offset: u64,
        total: u64,
        bytes: Vec<u8>,
    ) -> Result<ChunkAck> {
        self.touch();
        let mut state = relock(&self.state);
        let pending = state
            .sessions
            .get_mut(session_url)
            .ok_or_else(|| Self::err(404, "Upload session not found"))?;
        if offset != pending.buffer.len() as u64 {
            return Err(Self::err(400, "Chunk offset mismatch"));
        }
        pending.buffer.extend_from_slice(&bytes);
        if (pending.buffer.len() as u64) < total {
            return Ok(ChunkAck::Continue);
        }
        let Some(done) = state.sessions.remove(session_url) else {
            return Err(Self::err(404, "Upload session not found"));
        };
        let size = done.buffer.len() as u64;
        let id = state.next_id("file");
        state.files.insert(
            id,
            StoredFile {
                name: done.name,
                parent: done.parent,
                bytes: done.buffer,
            },
        );
        Ok(ChunkAck::Complete { size })
    }

    async fn search_by_name(
        &self,
        _token: &AccessToken,
        name: &str,
        parent: Option<&str>,
    ) -> Result<Option<String>> {
        self.touch();
        Ok(relock(&self.state)
            .files
            .iter()
            .find(|(_, f)| f.name == name && parent.map_or(true, |p| f.parent == p))
            .map(|(id, _)| id.clone()))
    }

    async fn delete_file(&self, _token: &AccessToken, file_id: &str) -> Result<DeleteOutcome> {
        self.touch();
        Ok(match relock(&self.state).files.remove(file_id) {
            Some(_) => DeleteOutcome::Deleted,
            None => DeleteOutcome::NotFound,
        })
    }
}

// =============================================================================
// Credentials and notifications
// =============================================================================

/// Hands out fixed tokens, or a configured failure per provider
#[derive(Debug, Default)]
pub struct FixedCredentials {
    onedrive_failure: Option<String>,
    gdrive_failure: Option<String>,
}

impl FixedCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_onedrive(mut self, message: &str) -> Self {
        self.onedrive_failure = Some(message.to_string());
        self
    }

    pub fn fail_gdrive(mut self, message: &str) -> Self {
        self.gdrive_failure = Some(message.to_string());
        self
    }
}

#[async_trait]
impl CredentialProvider for FixedCredentials {
    async fn onedrive_token(&self) -> Result<AccessToken> {
        match &self.onedrive_failure {
            Some(message) => Err(Error::credential("OneDrive", message.clone())),
            None => Ok(AccessToken::new("memory-onedrive-token")),
        }
    }

    async fn gdrive_token(&self) -> Result<AccessToken> {
        match &self.gdrive_failure {
            Some(message) => Err(Error::credential("Google Drive", message.clone())),
            None => Ok(AccessToken::new("memory-gdrive-token")),
        }
    }
}

/// Keeps every delivered e-mail
#[derive(Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<EmailRequest>>,
    failure: Option<String>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            failure: Some(message.to_string()),
        }
    }

    pub fn delivered(&self) -> Vec<EmailRequest> {
        relock(&self.delivered).clone()
    }

    /// Notification types in delivery order
    pub fn kinds(&self) -> Vec<String> {
        relock(&self.delivered)
            .iter()
            .map(|e| e.notification_type.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, email: &EmailRequest) -> Result<()> {
        if let Some(message) = &self.failure {
            return Err(Error::Other(message.clone()));
        }
        relock(&self.delivered).push(email.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_rejects_second_terminal_update() {
        let store = MemoryStore::new();
        let run = store
            .create_history(&NewBackupRun::new(1, "a.zip", Utc::now()))
            .await
            .unwrap();
        store
            .update_history(run.id, &HistoryUpdate::completed(10))
            .await
            .unwrap();
        let err = store
            .update_history(run.id, &HistoryUpdate::failed("late"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_config_replaces_sources() {
        let store = MemoryStore::new();
        let config = store
            .create_config(&NewBackupConfiguration {
                user_id: UserId::new("admin"),
                name: "Docs".to_string(),
                onedrive_path: "/Backups".to_string(),
                gdrive_path: "/Backups".to_string(),
                retention: RetentionPolicy::default(),
                sources: vec!["/A".to_string(), "/B".to_string()],
            })
            .await
            .unwrap();

        let updated = store
            .update_config(
                config.id,
                &ConfigChanges {
                    sources: Some(vec!["/C".to_string()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.source_paths(), vec!["/C"]);
        assert_eq!(updated.name, "Docs");
    }

    #[tokio::test]
    async fn test_path_drive_session_enforces_offsets() {
        let drive = MemoryPathDrive::new();
        let token = AccessToken::new("t");
        let principal = PrincipalId::new("p");
        let url = drive
            .create_upload_session(&token, &principal, "/Backups", "x.zip")
            .await
            .unwrap();

        let ack = drive.put_session_chunk(&url, 0, 6, b"abc".to_vec()).await.unwrap();
        assert_eq!(ack, ChunkAck::Continue);
        assert!(drive.put_session_chunk(&url, 0, 6, b"abc".to_vec()).await.is_err());
        let ack = drive.put_session_chunk(&url, 3, 6, b"def".to_vec()).await.unwrap();
        assert_eq!(ack, ChunkAck::Complete { size: 6 });
        assert_eq!(drive.file("/Backups/x.zip").unwrap(), b"abcdef".to_vec());
    }
}
