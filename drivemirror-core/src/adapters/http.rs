//! Shared plumbing for the drive HTTP clients

use std::time::Duration;

use reqwest::{Client, Response};
use serde::Deserialize;
use url::Url;

use crate::domain::result::{Error, Result};

/// Per-request timeout. Chunk PUTs are bounded by the chunk size, so this holds for them too.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub(crate) fn build_client(provider: &str, follow_redirects: bool) -> Result<Client> {
    let mut builder = Client::builder().timeout(REQUEST_TIMEOUT);
    if !follow_redirects {
        builder = builder.redirect(reqwest::redirect::Policy::none());
    }
    builder
        .build()
        .map_err(|e| Error::config(format!("Failed to create {} HTTP client: {}", provider, e)))
}

pub(crate) fn parse_base_url(provider: &str, base_url: &str) -> Result<Url> {
    let url = Url::parse(base_url.trim_end_matches('/'))
        .map_err(|e| Error::config(format!("Invalid {} base URL '{}': {}", provider, base_url, e)))?;
    if url.cannot_be_a_base() {
        return Err(Error::config(format!(
            "Invalid {} base URL '{}'",
            provider, base_url
        )));
    }
    Ok(url)
}

/// Append percent-encoded path segments to `base`
pub(crate) fn endpoint<'a>(base: &Url, segments: impl IntoIterator<Item = &'a str>) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// Map transport errors to user-facing messages
pub(crate) fn map_request_error(provider: &str, error: reqwest::Error) -> Error {
    if error.is_timeout() {
        Error::drive(
            provider,
            None,
            format!("Connection timed out after {} seconds", REQUEST_TIMEOUT.as_secs()),
        )
    } else if error.is_connect() {
        Error::drive(provider, None, format!("Unable to connect to {} servers", provider))
    } else {
        Error::drive(provider, None, format!("Request failed: {}", error))
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: serde_json::Value,
    #[serde(default)]
    message: String,
}

/// Pass successful responses through; turn the rest into `Error::Drive`
///
/// Both providers wrap failures as `{"error": {"code": .., "message": ..}}`;
/// the provider's message is appended when present.
pub(crate) async fn check_response_status(provider: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let summary = match status.as_u16() {
        401 => "Authentication failed. The access token may be expired or revoked.".to_string(),
        403 => "Access denied. Check the application's permissions.".to_string(),
        404 => "Resource not found.".to_string(),
        429 => "Rate limit exceeded. Please wait a moment and try again.".to_string(),
        code => format!("API error: HTTP {}", code),
    };

    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) if !envelope.error.message.is_empty() => {
            let code = match &envelope.error.code {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            if code.is_empty() {
                format!("{} ({})", summary, envelope.error.message)
            } else {
                format!("{} ({}: {})", summary, code, envelope.error.message)
            }
        }
        _ => summary,
    };

    Err(Error::drive(provider, Some(status.as_u16()), message))
}

/// `Content-Range` value for one chunk of a resumable upload
pub(crate) fn content_range(offset: u64, len: usize, total: u64) -> String {
    if len == 0 {
        format!("bytes */{}", total)
    } else {
        format!("bytes {}-{}/{}", offset, offset + len as u64 - 1, total)
    }
}
