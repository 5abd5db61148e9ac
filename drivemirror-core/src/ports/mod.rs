//! Port definitions (hexagonal architecture)
//!
//! Every collaborator the backup pipeline talks to is a trait here. Services
//! depend only on these; adapters provide DuckDB, HTTP and in-memory versions.

mod credentials;
mod drive;
mod notifier;
mod store;

pub use credentials::{CredentialProvider, Destination};
pub use drive::{ByteSink, ChunkAck, DeleteOutcome, FolderDrive, PathDrive};
pub use notifier::{EmailRequest, NotificationSink};
pub use store::ConfigStore;
