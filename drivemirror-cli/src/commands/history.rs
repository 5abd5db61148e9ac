//! History command - past runs of a configuration

use anyhow::Result;
use colored::Colorize;
use comfy_table::Cell;
use drivemirror_core::ports::ConfigStore;
use drivemirror_core::UserId;

use super::{get_context, owned_config};
use crate::output::{check_mark, create_table, status_label};

pub async fn run(user: &UserId, config_id: i64, limit: Option<usize>, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let config = owned_config(&ctx, user, config_id).await?;

    let mut runs = ctx.store.list_history(config.id).await?;
    if let Some(limit) = limit {
        runs.truncate(limit);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!("{}", format!("No backups yet for '{}'", config.name).dimmed());
        return Ok(());
    }

    println!("\n{} {}\n", "History of".bold(), config.name.bold());

    let mut table = create_table();
    table.set_header(vec!["Run", "Date", "File", "Size", "OneDrive", "Google", "Status", "Error"]);
    for run in &runs {
        table.add_row(vec![
            Cell::new(run.id),
            Cell::new(run.backup_date),
            Cell::new(&run.file_name),
            Cell::new(run.size_display()),
            Cell::new(check_mark(run.onedrive_uploaded)),
            Cell::new(check_mark(run.gdrive_uploaded)),
            Cell::new(status_label(run.status)),
            Cell::new(run.error_message.as_deref().unwrap_or("")),
        ]);
    }
    println!("{table}");
    Ok(())
}
