//! Notification sink port - the hand-off to the mail subsystem

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::result::Result;

/// A rendered e-mail, ready for delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailRequest {
    pub id: Uuid,
    /// `backup_success`, `backup_error` or `backup_summary`
    pub notification_type: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub text: String,
    pub html: String,
    /// The structured event the mail was rendered from
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, email: &EmailRequest) -> Result<()>;
}
