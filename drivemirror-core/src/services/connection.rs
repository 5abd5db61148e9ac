//! Connection check - can both drives be reached with the configured credentials

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::domain::result::{Error, Result};
use crate::domain::{format_size, Destination, DriveQuota};
use crate::ports::{CredentialProvider, FolderDrive, PathDrive};

/// Outcome for one destination
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCheck {
    pub destination: Destination,
    pub connected: bool,
    pub error: Option<String>,
    pub details: Option<DriveQuota>,
}

impl ProviderCheck {
    fn from_result(destination: Destination, result: Result<DriveQuota>) -> Self {
        match result {
            Ok(quota) => {
                info!(%destination, "Connection check passed");
                Self {
                    destination,
                    connected: true,
                    error: None,
                    details: Some(quota),
                }
            }
            Err(e) => {
                warn!(%destination, error = %e, "Connection check failed");
                Self {
                    destination,
                    connected: false,
                    error: Some(e.to_string()),
                    details: None,
                }
            }
        }
    }

    /// One-line description for tables
    pub fn message(&self) -> String {
        if let Some(error) = &self.error {
            return error.clone();
        }
        let Some(quota) = &self.details else {
            return "Connected".to_string();
        };
        let owner = quota.owner.as_deref().unwrap_or("unknown owner");
        match (quota.used_bytes, quota.total_bytes) {
            (Some(used), Some(total)) => format!(
                "Connected as {} ({} of {} used)",
                owner,
                format_size(used),
                format_size(total)
            ),
            (Some(used), None) => format!("Connected as {} ({} used)", owner, format_size(used)),
            _ => format!("Connected as {}", owner),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionReport {
    pub onedrive: ProviderCheck,
    pub gdrive: ProviderCheck,
}

impl ConnectionReport {
    pub fn all_connected(&self) -> bool {
        self.onedrive.connected && self.gdrive.connected
    }

    pub fn checks(&self) -> [&ProviderCheck; 2] {
        [&self.onedrive, &self.gdrive]
    }
}

/// Checks both destinations independently; one failing never hides the other
pub struct ConnectionChecker {
    credentials: Arc<dyn CredentialProvider>,
    onedrive: Arc<dyn PathDrive>,
    gdrive: Arc<dyn FolderDrive>,
    target_user: Option<String>,
}

impl ConnectionChecker {
    pub fn new(
        credentials: Arc<dyn CredentialProvider>,
        onedrive: Arc<dyn PathDrive>,
        gdrive: Arc<dyn FolderDrive>,
        target_user: Option<String>,
    ) -> Self {
        Self {
            credentials,
            onedrive,
            gdrive,
            target_user,
        }
    }

    pub async fn check(&self) -> ConnectionReport {
        let (onedrive, gdrive) = tokio::join!(self.check_onedrive(), self.check_gdrive());
        ConnectionReport {
            onedrive: ProviderCheck::from_result(Destination::OneDrive, onedrive),
            gdrive: ProviderCheck::from_result(Destination::GoogleDrive, gdrive),
        }
    }

    async fn check_onedrive(&self) -> Result<DriveQuota> {
        let identifier = self
            .target_user
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::config("No target user configured"))?;
        let token = self.credentials.onedrive_token().await?;
        let principal = self.onedrive.resolve_principal(&token, identifier).await?;
        let mut quota = self.onedrive.drive_quota(&token, &principal).await?;
        if quota.owner.is_none() {
            quota.owner = Some(identifier.to_string());
        }
        Ok(quota)
    }

    async fn check_gdrive(&self) -> Result<DriveQuota> {
        let token = self.credentials.gdrive_token().await?;
        self.gdrive.drive_quota(&token).await
    }
}
