//! Migration service - applies embedded schema migrations
//!
//! Each migration runs in its own transaction together with its
//! `sys_migrations` record, so a failed migration leaves no partial schema.

use std::collections::HashSet;

use duckdb::Connection;
use tracing::info;

use crate::domain::result::Result;
use crate::migrations::{BOOTSTRAP, MIGRATIONS};

#[derive(Debug)]
pub struct MigrationResult {
    /// Names of newly applied migrations
    pub applied: Vec<String>,
    /// Migrations that were already in place
    pub already_applied: usize,
}

pub struct MigrationService<'a> {
    conn: &'a Connection,
}

impl<'a> MigrationService<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Apply every pending migration in order
    pub fn run_pending(&self) -> Result<MigrationResult> {
        let mut applied_now = Vec::new();

        if !self.tracking_table_exists()? {
            if let Some((name, sql)) = MIGRATIONS.iter().find(|(n, _)| *n == BOOTSTRAP) {
                self.apply(name, sql)?;
                applied_now.push(name.to_string());
            }
        }

        let done = self.get_applied()?;
        let already_applied = done.len() - applied_now.len();

        for (name, sql) in MIGRATIONS.iter() {
            if !done.contains(*name) {
                self.apply(name, sql)?;
                applied_now.push(name.to_string());
            }
        }

        if !applied_now.is_empty() {
            info!(applied = ?applied_now, "Applied database migrations");
        }
        Ok(MigrationResult {
            applied: applied_now,
            already_applied,
        })
    }

    fn tracking_table_exists(&self) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = 'sys_migrations'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn get_applied(&self) -> Result<HashSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT migration_name FROM sys_migrations")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<HashSet<_>, _>>()?;
        Ok(names)
    }

    /// Names of migrations not yet applied, in order
    pub fn get_pending(&self) -> Result<Vec<String>> {
        let applied = if self.tracking_table_exists()? {
            self.get_applied()?
        } else {
            HashSet::new()
        };
        Ok(MIGRATIONS
            .iter()
            .filter(|(name, _)| !applied.contains(*name))
            .map(|(name, _)| name.to_string())
            .collect())
    }

    fn apply(&self, name: &str, sql: &str) -> Result<()> {
        self.conn.execute_batch("BEGIN TRANSACTION")?;
        let outcome = self.conn.execute_batch(sql).and_then(|_| {
            self.conn
                .execute("INSERT INTO sys_migrations (migration_name) VALUES (?)", [name])
                .map(|_| ())
        });
        match outcome {
            Ok(()) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(())
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_run_on_fresh_db() {
        let conn = Connection::open_in_memory().unwrap();
        let service = MigrationService::new(&conn);

        let result = service.run_pending().unwrap();
        assert_eq!(result.applied.len(), MIGRATIONS.len());
        assert_eq!(result.already_applied, 0);

        let again = service.run_pending().unwrap();
        assert!(again.applied.is_empty());
        assert_eq!(again.already_applied, MIGRATIONS.len());
    }

    #[test]
    fn test_pending_before_and_after() {
        let conn = Connection::open_in_memory().unwrap();
        let service = MigrationService::new(&conn);
        assert_eq!(service.get_pending().unwrap().len(), MIGRATIONS.len());

        service.run_pending().unwrap();
        assert!(service.get_pending().unwrap().is_empty());
    }

    #[test]
    fn test_schema_tables_exist() {
        let conn = Connection::open_in_memory().unwrap();
        MigrationService::new(&conn).run_pending().unwrap();

        for table in ["backup_configs", "backup_sources", "backup_history", "email_outbox"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = ?",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {}", table);
        }
    }
}
