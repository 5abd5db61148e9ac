//! Dual-destination uploader
//!
//! Pushes one finished archive to OneDrive and Google Drive concurrently.
//! Each destination reads its own `ArchiveView`, so neither upload can
//! starve or consume the other's bytes.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::config::basename;
use crate::domain::result::{Error, Result};
use crate::domain::{AccessToken, Destination, PrincipalId};
use crate::ports::{ChunkAck, FolderDrive, PathDrive};
use crate::services::archive::{ArchiveSource, ArchiveView};

/// Largest archive OneDrive accepts in a single PUT
pub const SIMPLE_UPLOAD_LIMIT: u64 = 4 * 1024 * 1024;

/// Session chunks must be multiples of 320 KiB (Graph) and 256 KiB (Google)
pub const CHUNK_ALIGNMENT: usize = 1280 * 1024;

pub const DEFAULT_CHUNK_SIZE: usize = 8 * CHUNK_ALIGNMENT;

/// Everything needed to talk to both drives for one run
#[derive(Debug, Clone)]
pub struct DriveAccess {
    pub onedrive_token: AccessToken,
    pub gdrive_token: AccessToken,
    pub principal: PrincipalId,
}

/// Per-destination outcome of an upload
#[derive(Debug)]
pub struct UploadReport {
    pub archive_size: u64,
    pub onedrive: Result<u64>,
    pub gdrive: Result<u64>,
}

impl UploadReport {
    /// Both destinations hold the archive
    pub fn is_complete(&self) -> bool {
        self.onedrive.is_ok() && self.gdrive.is_ok()
    }

    pub fn succeeded(&self, destination: Destination) -> bool {
        match destination {
            Destination::OneDrive => self.onedrive.is_ok(),
            Destination::GoogleDrive => self.gdrive.is_ok(),
        }
    }

    /// Names each failed destination with its error
    pub fn failure_message(&self) -> Option<String> {
        let failures: Vec<String> = [
            (Destination::OneDrive, &self.onedrive),
            (Destination::GoogleDrive, &self.gdrive),
        ]
        .into_iter()
        .filter_map(|(dest, result)| {
            result
                .as_ref()
                .err()
                .map(|e| format!("Upload to {} failed: {}", dest, e))
        })
        .collect();

        if failures.is_empty() {
            None
        } else {
            Some(failures.join("; "))
        }
    }
}

pub struct DualUploader {
    onedrive: Arc<dyn PathDrive>,
    gdrive: Arc<dyn FolderDrive>,
    chunk_size: usize,
}

impl DualUploader {
    pub fn new(onedrive: Arc<dyn PathDrive>, gdrive: Arc<dyn FolderDrive>) -> Self {
        Self {
            onedrive,
            gdrive,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Chunk size is rounded down to `CHUNK_ALIGNMENT`, minimum one unit
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = (chunk_size / CHUNK_ALIGNMENT).max(1) * CHUNK_ALIGNMENT;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Upload `source` as `file_name` to both destinations at once
    pub async fn upload(
        &self,
        access: &DriveAccess,
        source: &ArchiveSource,
        onedrive_path: &str,
        gdrive_path: &str,
        file_name: &str,
    ) -> UploadReport {
        let size = source.size();
        info!(file = %file_name, size, "Uploading archive to both destinations");

        let (onedrive, gdrive) = tokio::join!(
            self.upload_onedrive(access, source, onedrive_path, file_name),
            self.upload_gdrive(access, source, gdrive_path, file_name),
        );

        let onedrive = onedrive.and_then(|stored| verify_size(Destination::OneDrive, size, stored));
        let gdrive = gdrive.and_then(|stored| verify_size(Destination::GoogleDrive, size, stored));
        for (dest, result) in [(Destination::OneDrive, &onedrive), (Destination::GoogleDrive, &gdrive)] {
            match result {
                Ok(stored) => debug!(destination = %dest, stored, "Upload finished"),
                Err(e) => warn!(destination = %dest, error = %e, "Upload failed"),
            }
        }

        UploadReport {
            archive_size: size,
            onedrive,
            gdrive,
        }
    }

    async fn upload_onedrive(
        &self,
        access: &DriveAccess,
        source: &ArchiveSource,
        folder: &str,
        file_name: &str,
    ) -> Result<u64> {
        let mut view = source.view()?;
        let total = view.size();

        if total <= SIMPLE_UPLOAD_LIMIT {
            let bytes = view.read_all().await?;
            return self
                .onedrive
                .put_content(&access.onedrive_token, &access.principal, folder, file_name, bytes)
                .await;
        }

        let session = self
            .onedrive
            .create_upload_session(&access.onedrive_token, &access.principal, folder, file_name)
            .await?;
        send_chunks(&mut view, self.chunk_size, |offset, chunk| {
            self.onedrive.put_session_chunk(&session, offset, total, chunk)
        })
        .await
    }

    async fn upload_gdrive(
        &self,
        access: &DriveAccess,
        source: &ArchiveSource,
        folder_path: &str,
        file_name: &str,
    ) -> Result<u64> {
        let mut view = source.view()?;
        let total = view.size();

        let folder_id = self
            .gdrive
            .find_or_create_folder(&access.gdrive_token, basename(folder_path))
            .await?;
        let session = self
            .gdrive
            .create_resumable_upload(&access.gdrive_token, file_name, &folder_id, total)
            .await?;
        send_chunks(&mut view, self.chunk_size, |offset, chunk| {
            self.gdrive.put_session_chunk(&session, offset, total, chunk)
        })
        .await
    }
}

/// Feed a view into a resumable session chunk by chunk
async fn send_chunks<F, Fut>(view: &mut ArchiveView, chunk_size: usize, mut put: F) -> Result<u64>
where
    F: FnMut(u64, Vec<u8>) -> Fut,
    Fut: Future<Output = Result<ChunkAck>>,
{
    let total = view.size();
    while let Some(chunk) = view.next_chunk(chunk_size).await? {
        let offset = view.position() - chunk.len() as u64;
        match put(offset, chunk).await? {
            ChunkAck::Continue => {}
            ChunkAck::Complete { size } => {
                if view.position() != total {
                    return Err(Error::Upload(format!(
                        "session closed after {} of {} bytes",
                        view.position(),
                        total
                    )));
                }
                return Ok(size);
            }
        }
    }
    Err(Error::Upload(format!(
        "session still open after sending all {} bytes",
        total
    )))
}

fn verify_size(destination: Destination, expected: u64, stored: u64) -> Result<u64> {
    if stored != expected {
        return Err(Error::Upload(format!(
            "{} stored {} bytes, expected {}",
            destination, stored, expected
        )));
    }
    Ok(stored)
}
