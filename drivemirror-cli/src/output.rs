//! Output formatting utilities

use colored::{ColoredString, Colorize};
use comfy_table::{presets::UTF8_FULL_CONDENSED, ContentArrangement, Table};
use drivemirror_core::BackupStatus;

/// Print a success message
pub fn success(msg: &str) {
    println!("{}", msg.green());
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{}", msg.red());
}

/// Print a warning message
pub fn warning(msg: &str) {
    println!("{}", msg.yellow());
}

/// Create a styled table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn status_label(status: BackupStatus) -> ColoredString {
    match status {
        BackupStatus::Completed => status.as_str().green(),
        BackupStatus::Failed => status.as_str().red(),
        BackupStatus::Processing | BackupStatus::Pending => status.as_str().yellow(),
    }
}

pub fn check_mark(done: bool) -> &'static str {
    if done {
        "✓"
    } else {
        "✗"
    }
}

/// Milliseconds as seconds with one decimal
pub fn format_duration_ms(ms: u64) -> String {
    format!("{:.1}s", ms as f64 / 1000.0)
}
