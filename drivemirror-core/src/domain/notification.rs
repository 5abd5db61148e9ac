//! Notification events and run results
//!
//! The event payloads are a wire contract with the mail subsystem, so field
//! names are camelCase and stable.

use serde::{Deserialize, Serialize};

use super::config::ConfigId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSuccessPayload {
    pub config_name: String,
    pub file_name: String,
    pub file_size: u64,
    pub source_folders: usize,
    pub processing_time_ms: u64,
    pub deleted_old_backups: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupErrorPayload {
    pub config_name: String,
    pub error: String,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSummaryPayload {
    pub total_configs: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub total_processing_time_ms: u64,
    pub results: Vec<ConfigRunResult>,
}

/// Structured event handed to the notification emitter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum NotificationEvent {
    BackupSuccess(BackupSuccessPayload),
    BackupError(BackupErrorPayload),
    BackupSummary(BackupSummaryPayload),
}

impl NotificationEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationEvent::BackupSuccess(_) => "backup_success",
            NotificationEvent::BackupError(_) => "backup_error",
            NotificationEvent::BackupSummary(_) => "backup_summary",
        }
    }
}

/// Outcome of one configuration's run, as reported to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigRunResult {
    pub config_id: ConfigId,
    pub config_name: String,
    pub source_folders: usize,
    pub success: bool,
    pub error: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
    pub deleted_old_backups: usize,
    pub processing_time_ms: u64,
    /// Skipped subtrees and files; the run still completed without them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ConfigRunResult {
    /// The per-run event for this result
    pub fn to_event(&self) -> NotificationEvent {
        if self.success {
            NotificationEvent::BackupSuccess(BackupSuccessPayload {
                config_name: self.config_name.clone(),
                file_name: self.file_name.clone().unwrap_or_default(),
                file_size: self.file_size.unwrap_or(0),
                source_folders: self.source_folders,
                processing_time_ms: self.processing_time_ms,
                deleted_old_backups: self.deleted_old_backups,
            })
        } else {
            NotificationEvent::BackupError(BackupErrorPayload {
                config_name: self.config_name.clone(),
                error: self
                    .error
                    .clone()
                    .unwrap_or_else(|| "Unknown error".to_string()),
                processing_time_ms: self.processing_time_ms,
            })
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total_configs: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub total_processing_time_ms: u64,
}

/// Batch entry result. Always produced, even when every configuration failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub success: bool,
    pub message: String,
    pub results: Vec<ConfigRunResult>,
    pub summary: BatchSummary,
}

impl BatchReport {
    pub fn from_results(results: Vec<ConfigRunResult>) -> Self {
        let success_count = results.iter().filter(|r| r.success).count();
        let summary = BatchSummary {
            total_configs: results.len(),
            success_count,
            error_count: results.len() - success_count,
            total_processing_time_ms: results.iter().map(|r| r.processing_time_ms).sum(),
        };
        let message = if results.is_empty() {
            "No backup configurations found".to_string()
        } else {
            format!(
                "Processed {} configurations. Success: {}, Errors: {}",
                summary.total_configs, summary.success_count, summary.error_count
            )
        };
        Self {
            success: summary.error_count == 0,
            message,
            results,
            summary,
        }
    }

    /// Summary event listing every result
    pub fn to_event(&self) -> NotificationEvent {
        NotificationEvent::BackupSummary(BackupSummaryPayload {
            total_configs: self.summary.total_configs,
            success_count: self.summary.success_count,
            error_count: self.summary.error_count,
            total_processing_time_ms: self.summary.total_processing_time_ms,
            results: self.results.clone(),
        })
    }
}
