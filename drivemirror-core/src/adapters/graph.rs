//! Microsoft Graph (OneDrive) client
//!
//! Addresses everything through `/users/{id}/drive`, so it works with
//! application tokens that have no signed-in user. Folder paths use Graph's
//! `root:{path}:` syntax.
//!
//! API Documentation: https://learn.microsoft.com/graph/api/resources/onedrive

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use url::Url;

use super::http::{
    build_client, check_response_status, content_range, endpoint, map_request_error,
    parse_base_url,
};
use crate::domain::remote::join_remote_path;
use crate::domain::result::{Error, Result};
use crate::domain::{AccessToken, DownloadHandle, DriveQuota, PrincipalId, RemoteItem};
use crate::ports::{ByteSink, ChunkAck, DeleteOutcome, PathDrive};

const PROVIDER: &str = "OneDrive";

/// Default production API URL
const GRAPH_PRODUCTION_URL: &str = "https://graph.microsoft.com/v1.0";

/// Environment variable to override the Graph API base URL
pub const GRAPH_BASE_URL_ENV: &str = "DRIVEMIRROR_GRAPH_BASE_URL";

/// Get the Graph base URL, checking environment variable first
pub fn get_base_url() -> String {
    std::env::var(GRAPH_BASE_URL_ENV).unwrap_or_else(|_| GRAPH_PRODUCTION_URL.to_string())
}

// =============================================================================
// API Response Models
// =============================================================================

#[derive(Debug, Deserialize)]
struct GraphUser {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphDrive {
    #[serde(default)]
    drive_type: Option<String>,
    #[serde(default)]
    owner: Option<IdentitySet>,
    #[serde(default)]
    quota: Option<Quota>,
}

#[derive(Debug, Deserialize)]
struct IdentitySet {
    #[serde(default)]
    user: Option<Identity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Identity {
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Quota {
    #[serde(default)]
    used: Option<u64>,
    #[serde(default)]
    total: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ChildrenPage {
    value: Vec<DriveItem>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveItem {
    id: String,
    name: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    last_modified_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    folder: Option<FolderFacet>,
    #[serde(default, rename = "@microsoft.graph.downloadUrl")]
    download_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FolderFacet {
    #[serde(default)]
    child_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadSession {
    upload_url: String,
}

// =============================================================================
// Graph HTTP Client
// =============================================================================

/// OneDrive client over Microsoft Graph
#[derive(Debug)]
pub struct GraphClient {
    client: Client,
    base_url: Url,
}

impl GraphClient {
    /// Uses `DRIVEMIRROR_GRAPH_BASE_URL` if set, otherwise the production API
    pub fn new() -> Result<Self> {
        Self::new_with_base_url(&get_base_url())
    }

    pub fn new_with_base_url(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: build_client(PROVIDER, true)?,
            base_url: parse_base_url(PROVIDER, base_url)?,
        })
    }

    /// `/users/{principal}/drive/root:{path}:` plus `suffix`, or `.../root` for the root itself
    fn item_url(&self, principal: &PrincipalId, path: &str, suffix: &[&str]) -> Url {
        let mut segments = vec!["users".to_string(), principal.as_str().to_string()];
        segments.push("drive".to_string());

        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if parts.is_empty() {
            segments.push("root".to_string());
        } else {
            segments.push("root:".to_string());
            let last = parts.len() - 1;
            for (i, part) in parts.iter().enumerate() {
                if i == last {
                    segments.push(format!("{}:", part));
                } else {
                    segments.push(part.to_string());
                }
            }
        }
        segments.extend(suffix.iter().map(|s| s.to_string()));
        endpoint(&self.base_url, segments.iter().map(String::as_str))
    }

    fn content_url(&self, item_id: &str) -> Url {
        let mut segments: Vec<&str> = item_id.split('/').collect();
        segments.push("content");
        endpoint(&self.base_url, segments)
    }

    async fn fetch_page(&self, token: &AccessToken, url: Url) -> Result<ChildrenPage> {
        let response = self
            .client
            .get(url)
            .bearer_auth(token.secret())
            .send()
            .await
            .map_err(|e| map_request_error(PROVIDER, e))?;
        let response = check_response_status(PROVIDER, response).await?;
        response
            .json()
            .await
            .map_err(|e| Error::drive(PROVIDER, None, format!("Failed to parse children: {}", e)))
    }
}

fn into_remote_item(principal: &PrincipalId, item: DriveItem) -> RemoteItem {
    match item.folder {
        Some(folder) => RemoteItem::Folder {
            name: item.name,
            child_count: folder.child_count,
        },
        None => RemoteItem::File {
            name: item.name,
            size: item.size.unwrap_or(0),
            last_modified: item.last_modified_date_time,
            // Principal-qualified so the content endpoint can be rebuilt without a listing
            download: DownloadHandle {
                item_id: format!("users/{}/drive/items/{}", principal.as_str(), item.id),
                url: item.download_url,
            },
        },
    }
}

#[async_trait]
impl PathDrive for GraphClient {
    async fn resolve_principal(
        &self,
        token: &AccessToken,
        identifier: &str,
    ) -> Result<PrincipalId> {
        let url = endpoint(&self.base_url, ["users", identifier]);
        let response = self
            .client
            .get(url)
            .bearer_auth(token.secret())
            .send()
            .await
            .map_err(|e| map_request_error(PROVIDER, e))?;
        let response = check_response_status(PROVIDER, response).await?;
        let user: GraphUser = response
            .json()
            .await
            .map_err(|e| Error::drive(PROVIDER, None, format!("Failed to parse user: {}", e)))?;
        debug!(identifier, principal = %user.id, "Resolved OneDrive principal");
        Ok(PrincipalId::new(user.id))
    }

    async fn drive_quota(
        &self,
        token: &AccessToken,
        principal: &PrincipalId,
    ) -> Result<DriveQuota> {
        let url = endpoint(&self.base_url, ["users", principal.as_str(), "drive"]);
        let response = self
            .client
            .get(url)
            .bearer_auth(token.secret())
            .send()
            .await
            .map_err(|e| map_request_error(PROVIDER, e))?;
        let response = check_response_status(PROVIDER, response).await?;
        let drive: GraphDrive = response
            .json()
            .await
            .map_err(|e| Error::drive(PROVIDER, None, format!("Failed to parse drive: {}", e)))?;

        Ok(DriveQuota {
            owner: drive.owner.and_then(|o| o.user).and_then(|u| u.display_name),
            drive_type: drive.drive_type,
            used_bytes: drive.quota.as_ref().and_then(|q| q.used),
            total_bytes: drive.quota.as_ref().and_then(|q| q.total),
        })
    }

    async fn list_children(
        &self,
        token: &AccessToken,
        principal: &PrincipalId,
        path: &str,
    ) -> Result<Vec<RemoteItem>> {
        let mut items = Vec::new();
        let mut next = Some(self.item_url(principal, path, &["children"]));

        while let Some(url) = next.take() {
            let page = self.fetch_page(token, url).await?;
            items.extend(page.value.into_iter().map(|i| into_remote_item(principal, i)));
            if let Some(link) = page.next_link {
                next = Some(Url::parse(&link).map_err(|e| {
                    Error::drive(PROVIDER, None, format!("Invalid next page link: {}", e))
                })?);
            }
        }

        debug!(path, count = items.len(), "Listed OneDrive folder");
        Ok(items)
    }

    async fn download(
        &self,
        token: &AccessToken,
        handle: &DownloadHandle,
        sink: &mut dyn ByteSink,
    ) -> Result<u64> {
        // Pre-authenticated links must not carry the bearer token
        let request = match &handle.url {
            Some(url) => self.client.get(url.as_str()),
            None => self
                .client
                .get(self.content_url(&handle.item_id))
                .bearer_auth(token.secret()),
        };
        let response = request
            .send()
            .await
            .map_err(|e| map_request_error(PROVIDER, e))?;
        let mut response = check_response_status(PROVIDER, response).await?;

        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| map_request_error(PROVIDER, e))?
        {
            sink.write_chunk(&chunk)?;
            written += chunk.len() as u64;
        }
        Ok(written)
    }

    async fn put_content(
        &self,
        token: &AccessToken,
        principal: &PrincipalId,
        folder: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<u64> {
        let sent = bytes.len() as u64;
        let mut url = self.item_url(principal, &join_remote_path(folder, file_name), &["content"]);
        url.query_pairs_mut()
            .append_pair("@microsoft.graph.conflictBehavior", "replace");

        let response = self
            .client
            .put(url)
            .bearer_auth(token.secret())
            .header("Content-Type", "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(|e| map_request_error(PROVIDER, e))?;
        let response = check_response_status(PROVIDER, response).await?;
        let item: DriveItem = response
            .json()
            .await
            .map_err(|e| Error::drive(PROVIDER, None, format!("Failed to parse upload: {}", e)))?;
        Ok(item.size.unwrap_or(sent))
    }

    async fn create_upload_session(
        &self,
        token: &AccessToken,
        principal: &PrincipalId,
        folder: &str,
        file_name: &str,
    ) -> Result<String> {
        let url = self.item_url(
            principal,
            &join_remote_path(folder, file_name),
            &["createUploadSession"],
        );
        let body = json!({
            "item": { "@microsoft.graph.conflictBehavior": "replace" }
        });

        let response = self
            .client
            .post(url)
            .bearer_auth(token.secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| map_request_error(PROVIDER, e))?;
        let response = check_response_status(PROVIDER, response).await?;
        let session: UploadSession = response.json().await.map_err(|e| {
            Error::drive(PROVIDER, None, format!("Failed to parse upload session: {}", e))
        })?;
        Ok(session.upload_url)
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

        if response.status() == StatusCode::ACCEPTED {
            return Ok(ChunkAck::Continue);
        }
        let response = check_response_status(PROVIDER, response).await?;
        let item: DriveItem = response.json().await.map_err(|e| {
            Error::drive(PROVIDER, None, format!("Failed to parse completed upload: {}", e))
        })?;
        Ok(ChunkAck::Complete {
            size: item.size.unwrap_or(total),
        })
    }

    async fn delete_file(
        &self,
        token: &AccessToken,
        principal: &PrincipalId,
        folder: &str,
        file_name: &str,
    ) -> Result<DeleteOutcome> {
        let url = self.item_url(principal, &join_remote_path(folder, file_name), &[]);
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
