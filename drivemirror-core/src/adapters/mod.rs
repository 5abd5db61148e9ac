//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the ConfigStore port and the e-mail outbox
//! - Microsoft Graph HTTP client for PathDrive (OneDrive)
//! - Google Drive HTTP client for FolderDrive
//! - OAuth and static-token CredentialProviders
//! - In-memory implementations of every port for tests

pub mod duckdb;
pub mod gdrive;
pub mod graph;
mod http;
pub mod memory;
pub mod oauth;

#[cfg(test)]
pub mod drive_mock;
