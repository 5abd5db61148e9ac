//! Google Drive v3 client
//!
//! Files live in flat named folders at the top of the drive. Uploads use
//! the resumable protocol: a session is opened with the file metadata and
//! the bytes follow in `Content-Range` chunks answered by 308 until the last.
//!
//! API Documentation: https://developers.google.com/drive/api/reference/rest/v3

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use url::Url;

use super::http::{
    build_client, check_response_status, content_range, endpoint, map_request_error,
    parse_base_url,
};
use crate::domain::result::{Error, Result};
use crate::domain::{AccessToken, DriveQuota};
use crate::ports::{ChunkAck, DeleteOutcome, FolderDrive};

const PROVIDER: &str = "Google Drive";

/// Default production API URL
const GOOGLE_PRODUCTION_URL: &str = "https://www.googleapis.com";

/// Environment variable to override the Google API base URL
pub const GOOGLE_BASE_URL_ENV: &str = "DRIVEMIRROR_GOOGLE_BASE_URL";

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Get the Google base URL, checking environment variable first
pub fn get_base_url() -> String {
    std::env::var(GOOGLE_BASE_URL_ENV).unwrap_or_else(|_| GOOGLE_PRODUCTION_URL.to_string())
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<FileRef>,
}

#[derive(Debug, Deserialize)]
struct FileRef {
    id: String,
    /// int64 fields arrive as JSON strings
    #[serde(default)]
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct About {
    #[serde(default)]
    user: Option<AboutUser>,
    #[serde(default)]
    storage_quota: Option<StorageQuota>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AboutUser {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    email_address: Option<String>,
}

/// `limit` is absent for unlimited accounts
#[derive(Debug, Deserialize)]
struct StorageQuota {
    #[serde(default)]
    limit: Option<String>,
    #[serde(default)]
    usage: Option<String>,
}

/// Quote a value for a Drive search query
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Google Drive client
#[derive(Debug)]
pub struct GoogleDriveClient {
    client: Client,
    base_url: Url,
}

impl GoogleDriveClient {
    /// Uses `DRIVEMIRROR_GOOGLE_BASE_URL` if set, otherwise the production API
    pub fn new() -> Result<Self> {
        Self::new_with_base_url(&get_base_url())
    }

    pub fn new_with_base_url(base_url: &str) -> Result<Self> {
        Ok(Self {
            // 308 means "resume incomplete" here, never a redirect
            client: build_client(PROVIDER, false)?,
            base_url: parse_base_url(PROVIDER, base_url)?,
        })
    }

    fn files_url(&self) -> Url {
        endpoint(&self.base_url, ["drive", "v3", "files"])
    }

    async fn search(&self, token: &AccessToken, query: &str) -> Result<Option<FileRef>> {
        let response = self
            .client
            .get(self.files_url())
            .bearer_auth(token.secret())
            .query(&[
                ("q", query),
                ("fields", "files(id,size)"),
                ("spaces", "drive"),
                ("pageSize", "1"),
            ])
            .send()
            .await
            .map_err(|e| map_request_error(PROVIDER, e))?;
        let response = check_response_status(PROVIDER, response).await?;
        let list: FileList = response
            .json()
            .await
            .map_err(|e| Error::drive(PROVIDER, None, format!("Failed to parse file list: {}", e)))?;
        Ok(list.files.into_iter().next())
    }
}

#[async_trait]
impl FolderDrive for GoogleDriveClient {
    async fn find_or_create_folder(&self, token: &AccessToken, name: &str) -> Result<String> {
        let query = format!(
            "name={} and mimeType='{}' and trashed=false",
            quote(name),
            FOLDER_MIME_TYPE
        );
        if let Some(folder) = self.search(token, &query).await? {
            return Ok(folder.id);
        }

        let response = self
            .client
            .post(self.files_url())
            .bearer_auth(token.secret())
            .query(&[("fields", "id")])
            .json(&json!({ "name": name, "mimeType": FOLDER_MIME_TYPE }))
            .send()
            .await
            .map_err(|e| map_request_error(PROVIDER, e))?;
        let response = check_response_status(PROVIDER, response).await?;
        let folder: FileRef = response
            .json()
            .await
            .map_err(|e| Error::drive(PROVIDER, None, format!("Failed to parse folder: {}", e)))?;
        debug!(name, id = %folder.id, "Created Google Drive folder");
        Ok(folder.id)
    }

    async fn drive_quota(&self, token: &AccessToken) -> Result<DriveQuota> {
        let response = self
            .client
            .get(endpoint(&self.base_url, ["drive", "v3", "about"]))
            .bearer_auth(token.secret())
            .query(&[("fields", "user,storageQuota")])
            .send()
            .await
            .map_err(|e| map_request_error(PROVIDER, e))?;
        let response = check_response_status(PROVIDER, response).await?;
        let about: About = response
            .json()
            .await
            .map_err(|e| Error::drive(PROVIDER, None, format!("Failed to parse about: {}", e)))?;

        let quota = about.storage_quota;
        Ok(DriveQuota {
            owner: about.user.and_then(|u| u.email_address.or(u.display_name)),
            drive_type: None,
            used_bytes: quota
                .as_ref()
                .and_then(|q| q.usage.as_deref())
                .and_then(|v| v.parse().ok()),
            total_bytes: quota
                .as_ref()
                .and_then(|q| q.limit.as_deref())
                .and_then(|v| v.parse().ok()),
        })
    }

    async fn create_resumable_upload(
        &self,
        token: &AccessToken,
        file_name: &str,
        parent_id: &str,
        total: u64,
    ) -> Result<String> {
        let url = endpoint(&self.base_url, ["upload", "drive", "v3", "files"]);
        let response = self
            .client
            .post(url)
            .bearer_auth(token.secret())
            .query(&[("uploadType", "resumable")])
            .header("X-Upload-Content-Type", "application/zip")
            .header("X-Upload-Content-Length", total.to_string())
            .json(&json!({ "name": file_name, "parents": [parent_id] }))
            .send()
            .await
            .map_err(|e| map_request_error(PROVIDER, e))?;
        let response = check_response_status(PROVIDER, response).await?;

        response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                Error::drive(PROVIDER, None, "Resumable upload response had no Location header")
            })
    }

    async fn put_session_chunk(
        &self,
        session_url: &str,
        offset: u64,
        total: u64,
        bytes: Vec<u8>,
    ) -> Result<ChunkAck> {
        let range = content_range(offset, bytes.len(), total);
        let response = self
            .client
            .put(session_url)
            .header("Content-Range", range)
            .body(bytes)
            .send()
            .await
            .map_err(|e| map_request_error(PROVIDER, e))?;

        if response.status() == StatusCode::PERMANENT_REDIRECT {
            return Ok(ChunkAck::Continue);
        }
        let response = check_response_status(PROVIDER, response).await?;
        let file: FileRef = response.json().await.map_err(|e| {
            Error::drive(PROVIDER, None, format!("Failed to parse completed upload: {}", e))
        })?;
        let size = file
            .size
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(total);
        Ok(ChunkAck::Complete { size })
    }

    async fn search_by_name(
        &self,
        token: &AccessToken,
        name: &str,
        parent: Option<&str>,
    ) -> Result<Option<String>> {
        let mut query = format!("name={} and trashed=false", quote(name));
        if let Some(parent) = parent {
            query.push_str(&format!(" and {} in parents", quote(parent)));
        }
        Ok(self.search(token, &query).await?.map(|f| f.id))
    }

    async fn delete_file(&self, token: &AccessToken, file_id: &str) -> Result<DeleteOutcome> {
        let url = endpoint(&self.base_url, ["drive", "v3", "files", file_id]);
        let response = self
            .client
            .delete(url)
            .bearer_auth(token.secret())
            .send()
            .await
            .map_err(|e| map_request_error(PROVIDER, e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(DeleteOutcome::NotFound);
        }
        check_response_status(PROVIDER, response).await?;
        Ok(DeleteOutcome::Deleted)
    }
}
