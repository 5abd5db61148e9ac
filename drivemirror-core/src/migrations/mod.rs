//! Database migrations - embedded SQL files
//!
//! Compiled in with `include_str!` and applied in name order.

/// (file name, SQL). Append new migrations at the end; never edit applied ones.
pub const MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_initial_schema.sql", include_str!("001_initial_schema.sql")),
    ("002_email_outbox.sql", include_str!("002_email_outbox.sql")),
];

/// The migration that creates the tracking table itself
pub const BOOTSTRAP: &str = "000_migrations.sql";
