//! Credential provider port

use async_trait::async_trait;

use crate::domain::result::Result;
use crate::domain::AccessToken;

pub use crate::domain::Destination;

/// Hands out short-lived bearer tokens for both drives
///
/// Refresh and expiry are the provider's concern; callers ask again per run.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn onedrive_token(&self) -> Result<AccessToken>;

    async fn gdrive_token(&self) -> Result<AccessToken>;

    async fn token_for(&self, destination: Destination) -> Result<AccessToken> {
        match destination {
            Destination::OneDrive => self.onedrive_token().await,
            Destination::GoogleDrive => self.gdrive_token().await,
        }
    }
}
