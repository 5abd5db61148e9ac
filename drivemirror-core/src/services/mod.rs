//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. The backup
//! pipeline is walker → archive → upload → retention, sequenced by the
//! orchestrator.

pub mod archive;
pub mod connection;
pub mod migration;
pub mod notification;
pub mod orchestrator;
pub mod retention;
mod status;
pub mod upload;
pub mod walker;

pub use archive::{ArchiveBuilder, ArchiveSource, ArchiveStats, ArchiveView, FinishedArchive};
pub use connection::{ConnectionChecker, ConnectionReport, ProviderCheck};
pub use migration::{MigrationResult, MigrationService};
pub use notification::{NotificationEmitter, RenderedEmail};
pub use orchestrator::{BackupOrchestrator, RunSettings};
pub use retention::{PruneReport, RetentionPruner};
pub use status::{ConfigStatus, LastBackup, StatusService, StatusSummary};
pub use upload::{DriveAccess, DualUploader, UploadReport};
pub use walker::{RemoteTreeWalker, Walk, WalkEntry, WalkWarning};
