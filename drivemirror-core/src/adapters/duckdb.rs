//! DuckDB store implementation

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use duckdb::{params, Connection};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{
    expired_runs, sort_newest_first, BackupConfiguration, BackupRun, BackupStatus, ConfigChanges,
    ConfigId, HistoryUpdate, NewBackupConfiguration, NewBackupRun, RetentionPolicy, RunId,
    SourceFolder, UserId,
};
use crate::ports::{ConfigStore, EmailRequest, NotificationSink};
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

const CONFIG_COLUMNS: &str = "id, user_id, name, onedrive_path, gdrive_path, \
     retention_kind, retention_value, created_at, updated_at";

const HISTORY_COLUMNS: &str = "id, config_id, backup_date, file_name, file_size, \
     onedrive_uploaded, gdrive_uploaded, status, error_message, created_at";

/// DuckDB-backed configuration store and e-mail outbox
pub struct DuckDbStore {
    conn: Mutex<Connection>,
}

impl DuckDbStore {
    /// Open (or create) the database file and apply pending migrations
    ///
    /// Retries with exponential backoff while another process holds the
    /// file lock.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => return Self::from_connection(conn),
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        warn!(
                            delay_ms = delay.as_millis() as u64,
                            attempt = attempt + 1,
                            max = MAX_RETRIES,
                            error = %err_msg,
                            "Database busy, retrying"
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::database(format!("Failed to open database after {} retries", MAX_RETRIES))
        }))
    }

    /// Fresh in-memory database with the schema applied
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // Extension autoloading stays off; JSON is linked in through the cargo feature
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.conn()?;
        MigrationService::new(&conn).run_pending()
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::database("Database connection lock poisoned"))
    }

    // === E-mail outbox ===

    /// Queued e-mails not yet handed to the mailer, oldest first
    pub fn pending_emails(&self) -> Result<Vec<EmailRequest>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, notification_type, recipients, subject, text_body, html_body,
                    payload, created_at
             FROM email_outbox WHERE sent_at IS NULL ORDER BY created_at, id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(OutboxRow {
                    id: row.get(0)?,
                    notification_type: row.get(1)?,
                    recipients: row.get(2)?,
                    subject: row.get(3)?,
                    text: row.get(4)?,
                    html: row.get(5)?,
                    payload: row.get(6)?,
                    created_at: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter().map(OutboxRow::into_request).collect()
    }

    /// Mark an e-mail as handed off. Returns false if it was unknown or already sent.
    pub fn mark_sent(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE email_outbox SET sent_at = ? WHERE id = ? AND sent_at IS NULL",
            params![timestamp(Utc::now()), id.to_string()],
        )?;
        Ok(changed > 0)
    }
}

// === Row helpers ===

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::database(format!("Invalid timestamp '{}': {}", s, e)))
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| Error::database(format!("Invalid date '{}': {}", s, e)))
}

struct ConfigRow {
    id: i64,
    user_id: String,
    name: String,
    onedrive_path: String,
    gdrive_path: String,
    retention_kind: String,
    retention_value: i64,
    created_at: String,
    updated_at: String,
}

impl ConfigRow {
    fn read(row: &duckdb::Row) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            onedrive_path: row.get(3)?,
            gdrive_path: row.get(4)?,
            retention_kind: row.get(5)?,
            retention_value: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_config(self, sources: Vec<SourceFolder>) -> Result<BackupConfiguration> {
        let value = u32::try_from(self.retention_value).map_err(|_| {
            Error::database(format!("Invalid retention value {}", self.retention_value))
        })?;
        Ok(BackupConfiguration {
            id: self.id,
            user_id: UserId::new(self.user_id),
            name: self.name,
            sources,
            onedrive_path: self.onedrive_path,
            gdrive_path: self.gdrive_path,
            retention: RetentionPolicy::from_parts(&self.retention_kind, value)?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

struct HistoryRow {
    id: i64,
    config_id: i64,
    backup_date: String,
    file_name: String,
    file_size: i64,
    onedrive_uploaded: bool,
    gdrive_uploaded: bool,
    status: String,
    error_message: Option<String>,
    created_at: String,
}

impl HistoryRow {
    fn read(row: &duckdb::Row) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            config_id: row.get(1)?,
            backup_date: row.get(2)?,
            file_name: row.get(3)?,
            file_size: row.get(4)?,
            onedrive_uploaded: row.get(5)?,
            gdrive_uploaded: row.get(6)?,
            status: row.get(7)?,
            error_message: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn into_run(self) -> Result<BackupRun> {
        Ok(BackupRun {
            id: self.id,
            config_id: self.config_id,
            backup_date: parse_date(&self.backup_date)?,
            file_name: self.file_name,
            file_size: self.file_size.max(0) as u64,
            onedrive_uploaded: self.onedrive_uploaded,
            gdrive_uploaded: self.gdrive_uploaded,
            status: self.status.parse::<BackupStatus>()?,
            error_message: self.error_message,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

struct OutboxRow {
    id: String,
    notification_type: String,
    recipients: String,
    subject: String,
    text: String,
    html: String,
    payload: String,
    created_at: String,
}

impl OutboxRow {
    fn into_request(self) -> Result<EmailRequest> {
        Ok(EmailRequest {
            id: Uuid::parse_str(&self.id)
                .map_err(|e| Error::database(format!("Invalid outbox id '{}': {}", self.id, e)))?,
            notification_type: self.notification_type,
            recipients: serde_json::from_str(&self.recipients)?,
            subject: self.subject,
            text: self.text,
            html: self.html,
            payload: serde_json::from_str(&self.payload)?,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

fn load_sources(conn: &Connection, config_id: ConfigId) -> Result<Vec<SourceFolder>> {
    let mut stmt = conn.prepare(
        "SELECT id, config_id, source_path FROM backup_sources
         WHERE config_id = ? ORDER BY position, id",
    )?;
    let sources = stmt
        .query_map([config_id], |row| {
            Ok(SourceFolder {
                id: row.get(0)?,
                config_id: row.get(1)?,
                path: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(sources)
}

fn insert_sources(conn: &Connection, config_id: ConfigId, paths: &[String]) -> Result<()> {
    for (position, path) in paths.iter().enumerate() {
        conn.execute(
            "INSERT INTO backup_sources (config_id, source_path, position) VALUES (?, ?, ?)",
            params![config_id, path.trim(), position as i64],
        )?;
    }
    Ok(())
}

fn load_config(conn: &Connection, id: ConfigId) -> Result<Option<BackupConfiguration>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM backup_configs WHERE id = ?",
        CONFIG_COLUMNS
    ))?;
    let row = stmt
        .query_map([id], ConfigRow::read)?
        .next()
        .transpose()?;
    match row {
        Some(row) => {
            let sources = load_sources(conn, id)?;
            Ok(Some(row.into_config(sources)?))
        }
        None => Ok(None),
    }
}

fn load_history(conn: &Connection, config_id: ConfigId) -> Result<Vec<BackupRun>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM backup_history WHERE config_id = ?",
        HISTORY_COLUMNS
    ))?;
    let rows = stmt
        .query_map([config_id], HistoryRow::read)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let mut runs = rows
        .into_iter()
        .map(HistoryRow::into_run)
        .collect::<Result<Vec<_>>>()?;
    sort_newest_first(&mut runs);
    Ok(runs)
}

fn load_run(conn: &Connection, id: RunId) -> Result<Option<BackupRun>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM backup_history WHERE id = ?",
        HISTORY_COLUMNS
    ))?;
    let row = stmt.query_map([id], HistoryRow::read)?.next().transpose()?;
    row.map(HistoryRow::into_run).transpose()
}

#[async_trait]
impl ConfigStore for DuckDbStore {
    async fn get_config(&self, id: ConfigId) -> Result<Option<BackupConfiguration>> {
        let conn = self.conn()?;
        load_config(&conn, id)
    }

    async fn get_configs_by_user(&self, user: &UserId) -> Result<Vec<BackupConfiguration>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM backup_configs WHERE user_id = ? ORDER BY id",
            CONFIG_COLUMNS
        ))?;
        let rows = stmt
            .query_map([user.as_str()], ConfigRow::read)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|row| {
                let sources = load_sources(&conn, row.id)?;
                row.into_config(sources)
            })
            .collect()
    }

    async fn create_config(&self, new: &NewBackupConfiguration) -> Result<BackupConfiguration> {
        new.validate()?;
        let mut conn = self.conn()?;
        let now = timestamp(Utc::now());

        let tx = conn.transaction()?;
        let id: i64 = tx.query_row(
            "INSERT INTO backup_configs
                (user_id, name, onedrive_path, gdrive_path, retention_kind, retention_value,
                 created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
            params![
                new.user_id.as_str(),
                new.name.trim(),
                new.onedrive_path,
                new.gdrive_path,
                new.retention.kind(),
                new.retention.value() as i64,
                now,
                now,
            ],
            |row| row.get(0),
        )?;
        insert_sources(&tx, id, &new.sources)?;
        tx.commit()?;

        debug!(config_id = id, name = %new.name, "Created backup configuration");
        load_config(&conn, id)?
            .ok_or_else(|| Error::database(format!("Configuration {} vanished after insert", id)))
    }

    async fn update_config(
        &self,
        id: ConfigId,
        changes: &ConfigChanges,
    ) -> Result<BackupConfiguration> {
        changes.validate()?;
        let mut conn = self.conn()?;
        let current = load_config(&conn, id)?
            .ok_or_else(|| Error::not_found(format!("Backup configuration {}", id)))?;

        let name = changes
            .name
            .as_deref()
            .map(str::trim)
            .unwrap_or(&current.name)
            .to_string();
        let onedrive_path = changes.onedrive_path.as_ref().unwrap_or(&current.onedrive_path);
        let gdrive_path = changes.gdrive_path.as_ref().unwrap_or(&current.gdrive_path);
        let retention = changes.retention.unwrap_or(current.retention);

        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE backup_configs
             SET name = ?, onedrive_path = ?, gdrive_path = ?, retention_kind = ?,
                 retention_value = ?, updated_at = ?
             WHERE id = ?",
            params![
                name,
                onedrive_path,
                gdrive_path,
                retention.kind(),
                retention.value() as i64,
                timestamp(Utc::now()),
                id,
            ],
        )?;
        if let Some(paths) = &changes.sources {
            tx.execute("DELETE FROM backup_sources WHERE config_id = ?", [id])?;
            insert_sources(&tx, id, paths)?;
        }
        tx.commit()?;

        load_config(&conn, id)?
            .ok_or_else(|| Error::not_found(format!("Backup configuration {}", id)))
    }

    async fn delete_config(&self, id: ConfigId, with_history: bool) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let deleted = tx.execute("DELETE FROM backup_configs WHERE id = ?", [id])?;
        if deleted == 0 {
            return Err(Error::not_found(format!("Backup configuration {}", id)));
        }
        tx.execute("DELETE FROM backup_sources WHERE config_id = ?", [id])?;
        if with_history {
            tx.execute("DELETE FROM backup_history WHERE config_id = ?", [id])?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn create_history(&self, new: &NewBackupRun) -> Result<BackupRun> {
        let conn = self.conn()?;
        let id: i64 = conn.query_row(
            "INSERT INTO backup_history (config_id, backup_date, file_name, status, created_at)
             VALUES (?, ?, ?, ?, ?)
             RETURNING id",
            params![
                new.config_id,
                new.backup_date.format("%Y-%m-%d").to_string(),
                new.file_name,
                BackupStatus::Processing.as_str(),
                timestamp(new.created_at),
            ],
            |row| row.get(0),
        )?;
        load_run(&conn, id)?
            .ok_or_else(|| Error::database(format!("Backup run {} vanished after insert", id)))
    }

    async fn update_history(&self, id: RunId, update: &HistoryUpdate) -> Result<BackupRun> {
        let conn = self.conn()?;
        let mut run = load_run(&conn, id)?
            .ok_or_else(|| Error::not_found(format!("Backup run {}", id)))?;
        run.apply(update)?;

        // The status guard keeps the row single-transition even if it changed underneath us
        let changed = conn.execute(
            "UPDATE backup_history
             SET status = ?, file_size = ?, onedrive_uploaded = ?, gdrive_uploaded = ?,
                 error_message = ?
             WHERE id = ? AND status = ?",
            params![
                run.status.as_str(),
                run.file_size as i64,
                run.onedrive_uploaded,
                run.gdrive_uploaded,
                run.error_message,
                id,
                BackupStatus::Processing.as_str(),
            ],
        )?;
        if changed == 0 {
            return Err(Error::validation(format!(
                "Backup run {} is no longer processing",
                id
            )));
        }
        Ok(run)
    }

    async fn prune_history(
        &self,
        config_id: ConfigId,
        policy: &RetentionPolicy,
        today: NaiveDate,
    ) -> Result<Vec<BackupRun>> {
        let mut conn = self.conn()?;
        let history = load_history(&conn, config_id)?;
        let expired = expired_runs(&history, policy, today);
        if expired.is_empty() {
            return Ok(Vec::new());
        }

        let tx = conn.transaction()?;
        for id in &expired {
            tx.execute(
                "DELETE FROM backup_history WHERE id = ? AND status <> ?",
                params![id, BackupStatus::Processing.as_str()],
            )?;
        }
        tx.commit()?;

        Ok(history
            .into_iter()
            .filter(|run| expired.contains(&run.id))
            .collect())
    }

    async fn list_history(&self, config_id: ConfigId) -> Result<Vec<BackupRun>> {
        let conn = self.conn()?;
        load_history(&conn, config_id)
    }
}

#[async_trait]
impl NotificationSink for DuckDbStore {
    /// Queue the e-mail in the outbox for the mail subsystem
    async fn deliver(&self, email: &EmailRequest) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO email_outbox
                (id, notification_type, recipients, subject, text_body, html_body, payload,
                 created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                email.id.to_string(),
                email.notification_type,
                serde_json::to_string(&email.recipients)?,
                email.subject,
                email.text,
                email.html,
                email.payload.to_string(),
                timestamp(email.created_at),
            ],
        )?;
        debug!(id = %email.id, kind = %email.notification_type, "Queued notification e-mail");
        Ok(())
    }
}
