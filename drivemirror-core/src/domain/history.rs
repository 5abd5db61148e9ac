//! Backup history domain model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::config::{ConfigId, RetentionPolicy};
use super::result::{Error, Result};

pub type RunId = i64;

/// Lifecycle of a backup run. Rows are created as `Processing` and move
/// exactly once to `Completed` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl BackupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupStatus::Pending => "pending",
            BackupStatus::Processing => "processing",
            BackupStatus::Completed => "completed",
            BackupStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BackupStatus::Completed | BackupStatus::Failed)
    }

    /// Whether a row in `self` may be moved to `next`
    pub fn can_transition_to(&self, next: BackupStatus) -> bool {
        *self == BackupStatus::Processing && next.is_terminal()
    }
}

impl fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(BackupStatus::Pending),
            "processing" => Ok(BackupStatus::Processing),
            "completed" => Ok(BackupStatus::Completed),
            "failed" => Ok(BackupStatus::Failed),
            other => Err(Error::validation(format!("Unknown backup status: {}", other))),
        }
    }
}

/// One history row. Immutable once terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRun {
    pub id: RunId,
    pub config_id: ConfigId,
    pub backup_date: NaiveDate,
    pub file_name: String,
    pub file_size: u64,
    pub onedrive_uploaded: bool,
    pub gdrive_uploaded: bool,
    pub status: BackupStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl BackupRun {
    /// Format size for human display
    pub fn size_display(&self) -> String {
        format_size(self.file_size)
    }

    /// Apply a terminal update, enforcing the one-way status transition
    pub fn apply(&mut self, update: &HistoryUpdate) -> Result<()> {
        if !self.status.can_transition_to(update.status) {
            return Err(Error::validation(format!(
                "Backup run {} cannot move from {} to {}",
                self.id, self.status, update.status
            )));
        }
        self.status = update.status;
        if let Some(size) = update.file_size {
            self.file_size = size;
        }
        if let Some(flag) = update.onedrive_uploaded {
            self.onedrive_uploaded = flag;
        }
        if let Some(flag) = update.gdrive_uploaded {
            self.gdrive_uploaded = flag;
        }
        if update.error_message.is_some() {
            self.error_message = update.error_message.clone();
        }
        Ok(())
    }
}

/// Fields for a new history row; always starts as `Processing`
#[derive(Debug, Clone)]
pub struct NewBackupRun {
    pub config_id: ConfigId,
    pub backup_date: NaiveDate,
    pub file_name: String,
    pub created_at: DateTime<Utc>,
}

impl NewBackupRun {
    pub fn new(config_id: ConfigId, file_name: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            config_id,
            backup_date: at.date_naive(),
            file_name: file_name.into(),
            created_at: at,
        }
    }
}

/// Terminal update of a history row
#[derive(Debug, Clone)]
pub struct HistoryUpdate {
    pub status: BackupStatus,
    pub file_size: Option<u64>,
    pub onedrive_uploaded: Option<bool>,
    pub gdrive_uploaded: Option<bool>,
    pub error_message: Option<String>,
}

impl HistoryUpdate {
    pub fn completed(file_size: u64) -> Self {
        Self {
            status: BackupStatus::Completed,
            file_size: Some(file_size),
            onedrive_uploaded: Some(true),
            gdrive_uploaded: Some(true),
            error_message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: BackupStatus::Failed,
            file_size: None,
            onedrive_uploaded: None,
            gdrive_uploaded: None,
            error_message: Some(message.into()),
        }
    }

    /// Record which destinations accepted the archive before the failure
    pub fn with_uploads(mut self, onedrive: bool, gdrive: bool) -> Self {
        self.onedrive_uploaded = Some(onedrive);
        self.gdrive_uploaded = Some(gdrive);
        self
    }
}

/// Sort newest first: backup date, then creation time, then id
pub fn sort_newest_first(runs: &mut [BackupRun]) {
    runs.sort_by(|a, b| {
        b.backup_date
            .cmp(&a.backup_date)
            .then(b.created_at.cmp(&a.created_at))
            .then(b.id.cmp(&a.id))
    });
}

/// Ids of the runs a policy expires, given one configuration's history
///
/// Rows still `Processing` are never selected. They do count toward the
/// retained total under `KeepLatest`.
pub fn expired_runs(history: &[BackupRun], policy: &RetentionPolicy, today: NaiveDate) -> Vec<RunId> {
    let mut ordered = history.to_vec();
    sort_newest_first(&mut ordered);

    match *policy {
        RetentionPolicy::KeepLatest(keep) => ordered
            .iter()
            .skip(keep as usize)
            .filter(|run| run.status != BackupStatus::Processing)
            .map(|run| run.id)
            .collect(),
        RetentionPolicy::MaxAgeDays(days) => {
            // A window reaching past the calendar's start expires nothing
            let Some(cutoff) = today.checked_sub_signed(chrono::Duration::days(i64::from(days)))
            else {
                return Vec::new();
            };
            ordered
                .iter()
                .filter(|run| run.backup_date < cutoff)
                .filter(|run| run.status != BackupStatus::Processing)
                .map(|run| run.id)
                .collect()
        }
    }
}

/// Archive file name for a run: `backup_<name>_<YYYY-MM-DD>_<HH-MM-SS>.zip` (UTC)
///
/// Path separators in the configuration name become `-` so the result is a
/// single path segment on both drives.
pub fn archive_file_name(config_name: &str, at: DateTime<Utc>) -> String {
    let safe_name: String = config_name
        .trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '-' } else { c })
        .collect();
    format!(
        "backup_{}_{}_{}.zip",
        safe_name,
        at.format("%Y-%m-%d"),
        at.format("%H-%M-%S")
    )
}

/// Format bytes as human-readable size
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn processing_run() -> BackupRun {
        BackupRun {
            id: 7,
            config_id: 1,
            backup_date: NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
            file_name: "backup_Docs_2024-03-09_04-05-06.zip".to_string(),
            file_size: 0,
            onedrive_uploaded: false,
            gdrive_uploaded: false,
            status: BackupStatus::Processing,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_max_age_window_past_calendar_start_expires_nothing() {
        let mut old = processing_run();
        old.status = BackupStatus::Completed;
        old.backup_date = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 5, 5).unwrap();

        assert!(expired_runs(&[], &RetentionPolicy::MaxAgeDays(u32::MAX), today).is_empty());
        assert!(expired_runs(&[old], &RetentionPolicy::MaxAgeDays(100_000_000), today).is_empty());
    }

    #[test]
    fn test_archive_file_name_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 4, 5, 6).unwrap();
        assert_eq!(
            archive_file_name("Docs", at),
            "backup_Docs_2024-03-09_04-05-06.zip"
        );
    }

    #[test]
    fn test_archive_file_name_same_second_is_deterministic() {
        let at = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap();
        let later_same_second = at + chrono::Duration::milliseconds(900);
        assert_eq!(
            archive_file_name("Photos", at),
            archive_file_name("Photos", later_same_second)
        );
    }

    #[test]
    fn test_archive_file_name_strips_separators() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let name = archive_file_name("Team/Finance", at);
        assert_eq!(name, "backup_Team-Finance_2024-01-01_00-00-00.zip");
        assert!(!name.contains(':'));
    }

    #[test]
    fn test_status_transitions() {
        assert!(BackupStatus::Processing.can_transition_to(BackupStatus::Completed));
        assert!(BackupStatus::Processing.can_transition_to(BackupStatus::Failed));
        assert!(!BackupStatus::Completed.can_transition_to(BackupStatus::Failed));
        assert!(!BackupStatus::Failed.can_transition_to(BackupStatus::Completed));
        assert!(!BackupStatus::Processing.can_transition_to(BackupStatus::Pending));
    }

    #[test]
    fn test_apply_is_one_shot() {
        let mut run = processing_run();
        run.apply(&HistoryUpdate::completed(2048)).unwrap();
        assert_eq!(run.status, BackupStatus::Completed);
        assert_eq!(run.file_size, 2048);
        assert!(run.onedrive_uploaded && run.gdrive_uploaded);

        let err = run.apply(&HistoryUpdate::failed("late failure")).unwrap_err();
        assert!(err.to_string().contains("cannot move"));
        assert_eq!(run.status, BackupStatus::Completed);
    }

    #[test]
    fn test_failed_update_keeps_partial_flags() {
        let mut run = processing_run();
        run.apply(&HistoryUpdate::failed("upload to OneDrive failed").with_uploads(false, true))
            .unwrap();
        assert_eq!(run.status, BackupStatus::Failed);
        assert!(!run.onedrive_uploaded);
        assert!(run.gdrive_uploaded);
        assert_eq!(run.file_size, 0);
    }

    fn run_on(id: RunId, day: u32, status: BackupStatus) -> BackupRun {
        let mut run = processing_run();
        run.id = id;
        run.backup_date = NaiveDate::from_ymd_opt(2024, 3, day).unwrap();
        run.created_at = Utc.with_ymd_and_hms(2024, 3, day, 2, 0, 0).unwrap();
        run.status = status;
        run
    }

    #[test]
    fn test_keep_latest_removes_l_minus_n_oldest() {
        let history: Vec<BackupRun> = (1..=5)
            .map(|d| run_on(d as i64, d, BackupStatus::Completed))
            .collect();
        let today = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let mut expired = expired_runs(&history, &RetentionPolicy::KeepLatest(2), today);
        expired.sort();
        assert_eq!(expired, vec![1, 2, 3]);
    }

    #[test]
    fn test_keep_latest_never_selects_processing() {
        let history = vec![
            run_on(1, 1, BackupStatus::Processing),
            run_on(2, 2, BackupStatus::Failed),
            run_on(3, 3, BackupStatus::Completed),
        ];
        let today = NaiveDate::from_ymd_opt(2024, 3, 3).unwrap();
        let expired = expired_runs(&history, &RetentionPolicy::KeepLatest(1), today);
        assert_eq!(expired, vec![2]);
    }

    #[test]
    fn test_keep_latest_same_day_breaks_ties_by_creation() {
        let mut older = run_on(10, 4, BackupStatus::Completed);
        older.created_at = Utc.with_ymd_and_hms(2024, 3, 4, 1, 0, 0).unwrap();
        let newer = run_on(11, 4, BackupStatus::Completed);
        let today = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let expired = expired_runs(&[newer, older], &RetentionPolicy::KeepLatest(1), today);
        assert_eq!(expired, vec![10]);
    }

    #[test]
    fn test_max_age_days_uses_calendar_window() {
        let history: Vec<BackupRun> = (1..=9)
            .map(|d| run_on(d as i64, d, BackupStatus::Completed))
            .collect();
        let today = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let mut expired = expired_runs(&history, &RetentionPolicy::MaxAgeDays(3), today);
        expired.sort();
        assert_eq!(expired, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_size_display() {
        let mut run = processing_run();
        run.file_size = 1536;
        assert_eq!(run.size_display(), "1.5 KB");
        run.file_size = 2 * 1024 * 1024;
        assert_eq!(run.size_display(), "2.0 MB");
    }
}
