//! Run backups now

use anyhow::{Context, Result};
use colored::Colorize;
use comfy_table::Cell;
use drivemirror_core::domain::format_size;
use drivemirror_core::{ConfigRunResult, UserId};

use super::get_context;
use crate::output::{self, check_mark, create_table, format_duration_ms};

/// Run every configuration of the user
pub async fn run_all(user: &UserId, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let orchestrator = ctx.orchestrator()?;

    let report = orchestrator
        .run_batch(user)
        .await
        .context("Failed to list backup configurations")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if report.results.is_empty() {
        output::warning(&format!("No backup configurations for {}", user));
        return Ok(());
    } else {
        print_results(&report.results);
        println!();
        let line = format!(
            "{} of {} backups succeeded in {}",
            report.summary.success_count,
            report.summary.total_configs,
            format_duration_ms(report.summary.total_processing_time_ms)
        );
        if report.success {
            output::success(&line);
        } else {
            output::warning(&line);
        }
    }

    if !report.success {
        anyhow::bail!("{} backup(s) failed", report.summary.error_count);
    }
    Ok(())
}

/// Run one configuration
pub async fn run_one(user: &UserId, id: i64, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let orchestrator = ctx.orchestrator()?;

    let result = orchestrator.run_config(user, id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_results(std::slice::from_ref(&result));
        if result.success {
            println!();
            println!(
                "{} Backup {} uploaded to both destinations",
                "✓".green(),
                result.file_name.as_deref().unwrap_or_default().bold()
            );
        }
    }

    if !result.success {
        anyhow::bail!(
            "Backup of {} failed: {}",
            result.config_name,
            result.error.unwrap_or_default()
        );
    }
    Ok(())
}

fn print_results(results: &[ConfigRunResult]) {
    let mut table = create_table();
    table.set_header(vec!["ID", "Name", "OK", "File", "Size", "Pruned", "Time", "Error"]);

    for r in results {
        table.add_row(vec![
            Cell::new(r.config_id),
            Cell::new(&r.config_name),
            Cell::new(check_mark(r.success)),
            Cell::new(r.file_name.as_deref().unwrap_or("-")),
            Cell::new(r.file_size.map(format_size).unwrap_or_else(|| "-".to_string())),
            Cell::new(r.deleted_old_backups),
            Cell::new(format_duration_ms(r.processing_time_ms)),
            Cell::new(r.error.as_deref().unwrap_or("")),
        ]);
    }
    println!("{table}");

    for r in results {
        for warning in &r.warnings {
            output::warning(&format!("{}: {}", r.config_name, warning));
        }
    }
}
