//! Credential providers
//!
//! `OAuthCredentials` exchanges application secrets for bearer tokens:
//! Microsoft via the client-credentials grant, Google via a stored refresh
//! token. Tokens are cached until shortly before they expire.
//! `StaticCredentials` hands out tokens taken verbatim from the environment.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use super::http::{build_client, check_response_status, map_request_error};
use crate::domain::result::{Error, Result};
use crate::domain::AccessToken;
use crate::ports::CredentialProvider;

pub const MS_TENANT_ID_ENV: &str = "MICROSOFT_TENANT_ID";
pub const MS_CLIENT_ID_ENV: &str = "MICROSOFT_CLIENT_ID";
pub const MS_CLIENT_SECRET_ENV: &str = "MICROSOFT_CLIENT_SECRET";
pub const MS_TOKEN_URL_ENV: &str = "DRIVEMIRROR_MS_TOKEN_URL";
pub const GOOGLE_CLIENT_ID_ENV: &str = "GOOGLE_CLIENT_ID";
pub const GOOGLE_CLIENT_SECRET_ENV: &str = "GOOGLE_CLIENT_SECRET";
pub const GOOGLE_REFRESH_TOKEN_ENV: &str = "GOOGLE_REFRESH_TOKEN";
pub const GOOGLE_TOKEN_URL_ENV: &str = "DRIVEMIRROR_GOOGLE_TOKEN_URL";

pub const ONEDRIVE_TOKEN_ENV: &str = "DRIVEMIRROR_ONEDRIVE_TOKEN";
pub const GDRIVE_TOKEN_ENV: &str = "DRIVEMIRROR_GDRIVE_TOKEN";

const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Refresh this long before the provider's stated expiry
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

fn microsoft_token_url(tenant_id: &str) -> String {
    format!(
        "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
        tenant_id
    )
}

fn required_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(Error::config(format!("{} is not set", name))),
    }
}

/// Azure AD application used for app-only Graph access
#[derive(Debug, Clone)]
pub struct MicrosoftApp {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
}

impl MicrosoftApp {
    pub fn new(tenant_id: &str, client_id: &str, client_secret: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            token_url: microsoft_token_url(tenant_id),
        }
    }

    pub fn from_env() -> Result<Self> {
        let mut app = Self::new(
            &required_env(MS_TENANT_ID_ENV)?,
            &required_env(MS_CLIENT_ID_ENV)?,
            &required_env(MS_CLIENT_SECRET_ENV)?,
        );
        if let Ok(url) = std::env::var(MS_TOKEN_URL_ENV) {
            app.token_url = url;
        }
        Ok(app)
    }
}

/// Google OAuth client plus the refresh token granted to it
#[derive(Debug, Clone)]
pub struct GoogleApp {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub token_url: String,
}

impl GoogleApp {
    pub fn new(client_id: &str, client_secret: &str, refresh_token: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            refresh_token: refresh_token.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
        }
    }

    pub fn from_env() -> Result<Self> {
        let mut app = Self::new(
            &required_env(GOOGLE_CLIENT_ID_ENV)?,
            &required_env(GOOGLE_CLIENT_SECRET_ENV)?,
            &required_env(GOOGLE_REFRESH_TOKEN_ENV)?,
        );
        if let Ok(url) = std::env::var(GOOGLE_TOKEN_URL_ENV) {
            app.token_url = url;
        }
        Ok(app)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    token: AccessToken,
    valid_until: Instant,
}

/// OAuth-backed credential provider with per-provider token caching
pub struct OAuthCredentials {
    client: Client,
    microsoft: MicrosoftApp,
    google: GoogleApp,
    onedrive_cache: Mutex<Option<CachedToken>>,
    gdrive_cache: Mutex<Option<CachedToken>>,
}

impl OAuthCredentials {
    pub fn new(microsoft: MicrosoftApp, google: GoogleApp) -> Result<Self> {
        Ok(Self {
            client: build_client("OAuth", true)?,
            microsoft,
            google,
            onedrive_cache: Mutex::new(None),
            gdrive_cache: Mutex::new(None),
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(MicrosoftApp::from_env()?, GoogleApp::from_env()?)
    }

    async fn request_token(
        &self,
        provider: &str,
        url: &str,
        form: Vec<(&'static str, String)>,
    ) -> Result<CachedToken> {
        let response = self
            .client
            .post(url)
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::credential(provider, map_request_error(provider, e).to_string()))?;

        let response = match check_response_status(provider, response).await {
            Ok(response) => response,
            Err(e) => return Err(Error::credential(provider, e.to_string())),
        };
        let body: TokenResponse = response.json().await.map_err(|e| {
            Error::credential(provider, format!("Failed to parse token response: {}", e))
        })?;

        let lifetime = Duration::from_secs(body.expires_in.unwrap_or(3600));
        debug!(provider, expires_in = lifetime.as_secs(), "Obtained access token");
        Ok(CachedToken {
            token: AccessToken::new(body.access_token),
            valid_until: Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN),
        })
    }
}

async fn cached_or<F, Fut>(cache: &Mutex<Option<CachedToken>>, fetch: F) -> Result<AccessToken>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<CachedToken>>,
{
    let mut slot = cache.lock().await;
    if let Some(cached) = slot.as_ref() {
        if Instant::now() < cached.valid_until {
            return Ok(cached.token.clone());
        }
    }
    let fresh = fetch().await?;
    let token = fresh.token.clone();
    *slot = Some(fresh);
    Ok(token)
}

#[async_trait]
impl CredentialProvider for OAuthCredentials {
    async fn onedrive_token(&self) -> Result<AccessToken> {
        cached_or(&self.onedrive_cache, || {
            self.request_token(
                "OneDrive",
                &self.microsoft.token_url,
                vec![
                    ("grant_type", "client_credentials".to_string()),
                    ("client_id", self.microsoft.client_id.clone()),
                    ("client_secret", self.microsoft.client_secret.clone()),
                    ("scope", GRAPH_SCOPE.to_string()),
                ],
            )
        })
        .await
    }

    async fn gdrive_token(&self) -> Result<AccessToken> {
        cached_or(&self.gdrive_cache, || {
            self.request_token(
                "Google Drive",
                &self.google.token_url,
                vec![
                    ("grant_type", "refresh_token".to_string()),
                    ("client_id", self.google.client_id.clone()),
                    ("client_secret", self.google.client_secret.clone()),
                    ("refresh_token", self.google.refresh_token.clone()),
                ],
            )
        })
        .await
    }
}

/// Pre-issued tokens, typically from `DRIVEMIRROR_ONEDRIVE_TOKEN` and `DRIVEMIRROR_GDRIVE_TOKEN`
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    onedrive: Option<AccessToken>,
    gdrive: Option<AccessToken>,
}

impl StaticCredentials {
    pub fn new(onedrive: Option<String>, gdrive: Option<String>) -> Self {
        Self {
            onedrive: onedrive.map(AccessToken::new),
            gdrive: gdrive.map(AccessToken::new),
        }
    }

    pub fn from_env() -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self::new(read(ONEDRIVE_TOKEN_ENV), read(GDRIVE_TOKEN_ENV))
    }

    /// True when both tokens are present
    pub fn is_complete(&self) -> bool {
        self.onedrive.is_some() && self.gdrive.is_some()
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn onedrive_token(&self) -> Result<AccessToken> {
        self.onedrive.clone().ok_or_else(|| {
            Error::credential("OneDrive", format!("{} is not set", ONEDRIVE_TOKEN_ENV))
        })
    }

    async fn gdrive_token(&self) -> Result<AccessToken> {
        self.gdrive.clone().ok_or_else(|| {
            Error::credential("Google Drive", format!("{} is not set", GDRIVE_TOKEN_ENV))
        })
    }
}
