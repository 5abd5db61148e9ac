//! Core domain entities
//!
//! Pure data structures with validation logic. No I/O.

pub mod config;
pub mod history;
pub mod notification;
pub mod remote;
pub mod result;

pub use config::{
    BackupConfiguration, ConfigChanges, ConfigId, NewBackupConfiguration, RetentionPolicy,
    SourceFolder, UserId,
};
pub use history::{
    archive_file_name, expired_runs, format_size, sort_newest_first, BackupRun, BackupStatus,
    HistoryUpdate, NewBackupRun, RunId,
};
pub use notification::{
    BackupErrorPayload, BackupSuccessPayload, BackupSummaryPayload, BatchReport, BatchSummary,
    ConfigRunResult, NotificationEvent,
};
pub use remote::{
    AccessToken, Destination, DownloadHandle, DriveQuota, PrincipalId, RemoteItem,
};
