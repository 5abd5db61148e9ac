//! Drive client ports
//!
//! Two shapes of cloud drive:
//! - `PathDrive` addresses items by folder path under a principal (OneDrive)
//! - `FolderDrive` addresses items by id inside named folders (Google Drive)

use async_trait::async_trait;

use crate::domain::result::Result;
use crate::domain::{AccessToken, DownloadHandle, DriveQuota, PrincipalId, RemoteItem};

/// Receives downloaded bytes as they arrive
pub trait ByteSink: Send {
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<()>;
}

impl ByteSink for Vec<u8> {
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.extend_from_slice(chunk);
        Ok(())
    }
}

/// Provider answer to one chunk PUT into a resumable session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkAck {
    /// More bytes expected
    Continue,
    /// Upload finished; `size` is what the provider stored
    Complete { size: u64 },
}

/// Outcome of a delete. A missing file is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Path-addressed drive with a principal (Provider A)
#[async_trait]
pub trait PathDrive: Send + Sync {
    /// Resolve a configured identifier (e-mail or UPN) to a principal id
    async fn resolve_principal(&self, token: &AccessToken, identifier: &str)
        -> Result<PrincipalId>;

    /// The principal's default drive, with owner and storage usage
    async fn drive_quota(&self, token: &AccessToken, principal: &PrincipalId)
        -> Result<DriveQuota>;

    /// Immediate children of the folder at `path`, following pagination
    async fn list_children(
        &self,
        token: &AccessToken,
        principal: &PrincipalId,
        path: &str,
    ) -> Result<Vec<RemoteItem>>;

    /// Stream a file's bytes into `sink`, returning the byte count
    async fn download(
        &self,
        token: &AccessToken,
        handle: &DownloadHandle,
        sink: &mut dyn ByteSink,
    ) -> Result<u64>;

    /// Single-request upload with replace-on-conflict
    async fn put_content(
        &self,
        token: &AccessToken,
        principal: &PrincipalId,
        folder: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<u64>;

    /// Open a resumable upload session with replace-on-conflict
    async fn create_upload_session(
        &self,
        token: &AccessToken,
        principal: &PrincipalId,
        folder: &str,
        file_name: &str,
    ) -> Result<String>;

    /// PUT `bytes` at `offset` of a `total`-byte upload
    async fn put_session_chunk(
        &self,
        session_url: &str,
        offset: u64,
        total: u64,
        bytes: Vec<u8>,
    ) -> Result<ChunkAck>;

    async fn delete_file(
        &self,
        token: &AccessToken,
        principal: &PrincipalId,
        folder: &str,
        file_name: &str,
    ) -> Result<DeleteOutcome>;
}

/// Id-addressed drive with named folders (Provider B)
#[async_trait]
pub trait FolderDrive: Send + Sync {
    /// Id of the folder named `name`, creating it when absent
    async fn find_or_create_folder(&self, token: &AccessToken, name: &str) -> Result<String>;

    /// Owner and storage usage of the account behind `token`
    async fn drive_quota(&self, token: &AccessToken) -> Result<DriveQuota>;

    /// Open a resumable upload session for a new file in `parent_id`
    async fn create_resumable_upload(
        &self,
        token: &AccessToken,
        file_name: &str,
        parent_id: &str,
        total: u64,
    ) -> Result<String>;

    /// PUT `bytes` at `offset` of a `total`-byte upload
    async fn put_session_chunk(
        &self,
        session_url: &str,
        offset: u64,
        total: u64,
        bytes: Vec<u8>,
    ) -> Result<ChunkAck>;

    /// Id of a non-trashed file with this exact name, optionally inside `parent`
    async fn search_by_name(
        &self,
        token: &AccessToken,
        name: &str,
        parent: Option<&str>,
    ) -> Result<Option<String>>;

    async fn delete_file(&self, token: &AccessToken, file_id: &str) -> Result<DeleteOutcome>;
}
