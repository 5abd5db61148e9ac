//! Transient remote-drive types: tree items, handles, identities and tokens

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two independent destinations every archive is mirrored to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    OneDrive,
    GoogleDrive,
}

impl Destination {
    pub const ALL: [Destination; 2] = [Destination::OneDrive, Destination::GoogleDrive];
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::OneDrive => f.write_str("OneDrive"),
            Destination::GoogleDrive => f.write_str("Google Drive"),
        }
    }
}

/// Resolved remote identity (user/drive) whose tree is walked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(pub String);

impl PrincipalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque short-lived bearer credential. Never persisted or logged.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// How to fetch one file's content
///
/// `item_id` always works with a bearer token. `url` is a pre-authenticated
/// download link when the provider hands one out with the listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadHandle {
    pub item_id: String,
    pub url: Option<String>,
}

impl DownloadHandle {
    pub fn by_id(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            url: None,
        }
    }
}

/// A node of the provider's folder tree, produced lazily during a walk
#[derive(Debug, Clone)]
pub enum RemoteItem {
    File {
        name: String,
        size: u64,
        last_modified: Option<DateTime<Utc>>,
        download: DownloadHandle,
    },
    Folder {
        name: String,
        child_count: u64,
    },
}

impl RemoteItem {
    pub fn name(&self) -> &str {
        match self {
            RemoteItem::File { name, .. } | RemoteItem::Folder { name, .. } => name,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, RemoteItem::Folder { .. })
    }
}

/// Account and storage facts a drive reports about itself
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveQuota {
    /// Display name or address of the account owning the drive
    pub owner: Option<String>,
    pub drive_type: Option<String>,
    pub used_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
}

/// Join a drive folder path and a child name with exactly one `/`
pub fn join_remote_path(parent: &str, child: &str) -> String {
    let parent = parent.trim_end_matches('/');
    let child = child.trim_start_matches('/');
    if parent.is_empty() {
        format!("/{}", child)
    } else {
        format!("{}/{}", parent, child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_token_debug_is_redacted() {
        let token = AccessToken::new("eyJ0eXAiOiJKV1Qi");
        assert_eq!(format!("{:?}", token), "AccessToken(***)");
        assert_eq!(token.secret(), "eyJ0eXAiOiJKV1Qi");
    }

    #[test]
    fn test_join_remote_path() {
        assert_eq!(join_remote_path("/Docs", "a.txt"), "/Docs/a.txt");
        assert_eq!(join_remote_path("/Docs/", "/a.txt"), "/Docs/a.txt");
        assert_eq!(join_remote_path("", "Docs"), "/Docs");
        assert_eq!(join_remote_path("/", "Docs"), "/Docs");
    }

    #[test]
    fn test_destination_display() {
        assert_eq!(Destination::OneDrive.to_string(), "OneDrive");
        assert_eq!(Destination::GoogleDrive.to_string(), "Google Drive");
    }
}
