//! Config command - manage backup configurations

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use comfy_table::Cell;
use dialoguer::Confirm;
use drivemirror_core::ports::ConfigStore;
use drivemirror_core::{
    BackupConfiguration, ConfigChanges, NewBackupConfiguration, RetentionPolicy, UserId,
};

use super::{get_context, owned_config};
use crate::output::create_table;

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Create a backup configuration
    Add {
        /// Configuration name (also the archive name prefix)
        name: String,
        /// OneDrive folder to back up (repeatable)
        #[arg(long = "source", short = 's')]
        sources: Vec<String>,
        /// Destination folder on OneDrive
        #[arg(long)]
        onedrive_path: String,
        /// Destination folder on Google Drive
        #[arg(long)]
        gdrive_path: String,
        #[command(flatten)]
        retention: RetentionArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List backup configurations
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Change a backup configuration
    Update {
        /// Configuration ID
        id: i64,
        #[arg(long)]
        name: Option<String>,
        /// Replace the source folders (repeatable)
        #[arg(long = "source", short = 's')]
        sources: Vec<String>,
        #[arg(long)]
        onedrive_path: Option<String>,
        #[arg(long)]
        gdrive_path: Option<String>,
        #[command(flatten)]
        retention: RetentionArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete a backup configuration
    Remove {
        /// Configuration ID
        id: i64,
        /// Also delete its backup history
        #[arg(long)]
        with_history: bool,
        /// Skip confirmation
        #[arg(long, short)]
        force: bool,
    },
}

#[derive(Args)]
pub struct RetentionArgs {
    /// Keep this many most recent backups
    #[arg(long, conflicts_with = "max_age_days")]
    keep: Option<u32>,
    /// Keep backups from the last N days
    #[arg(long)]
    max_age_days: Option<u32>,
}

impl RetentionArgs {
    fn policy(&self) -> Option<RetentionPolicy> {
        match (self.keep, self.max_age_days) {
            (Some(n), _) => Some(RetentionPolicy::KeepLatest(n)),
            (None, Some(days)) => Some(RetentionPolicy::MaxAgeDays(days)),
            (None, None) => None,
        }
    }
}

pub async fn run(user: &UserId, command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Add {
            name,
            sources,
            onedrive_path,
            gdrive_path,
            retention,
            json,
        } => {
            let new = NewBackupConfiguration {
                user_id: user.clone(),
                name,
                onedrive_path,
                gdrive_path,
                retention: retention.policy().unwrap_or_default(),
                sources,
            };
            add(new, json).await
        }
        ConfigCommands::List { json } => list(user, json).await,
        ConfigCommands::Update {
            id,
            name,
            sources,
            onedrive_path,
            gdrive_path,
            retention,
            json,
        } => {
            let changes = ConfigChanges {
                name,
                onedrive_path,
                gdrive_path,
                retention: retention.policy(),
                sources: (!sources.is_empty()).then_some(sources),
            };
            update(user, id, changes, json).await
        }
        ConfigCommands::Remove {
            id,
            with_history,
            force,
        } => remove(user, id, with_history, force).await,
    }
}

async fn add(new: NewBackupConfiguration, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let config = ctx
        .store
        .create_config(&new)
        .await
        .context("Failed to create backup configuration")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    println!(
        "\n{} Created backup configuration {} (id {})",
        "✓".green(),
        config.name.bold(),
        config.id
    );
    if config.sources.is_empty() {
        println!(
            "{}\n",
            "No source folders yet; runs will fail until one is added with `dm config update --source`"
                .dimmed()
        );
    } else {
        println!();
    }
    Ok(())
}

async fn list(user: &UserId, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let configs = ctx.store.get_configs_by_user(user).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&configs)?);
        return Ok(());
    }

    if configs.is_empty() {
        println!("{}", "No backup configurations".dimmed());
        println!("Create one with: dm config add <NAME> --source <PATH> --onedrive-path <PATH> --gdrive-path <PATH>");
        return Ok(());
    }

    print_configs(&configs);
    Ok(())
}

async fn update(user: &UserId, id: i64, changes: ConfigChanges, json: bool) -> Result<()> {
    if changes.is_empty() {
        anyhow::bail!("Nothing to update");
    }

    let ctx = get_context()?;
    owned_config(&ctx, user, id).await?;
    let config = ctx
        .store
        .update_config(id, &changes)
        .await
        .context("Failed to update backup configuration")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        println!("\n{} Updated {}\n", "✓".green(), config.name.bold());
        print_configs(std::slice::from_ref(&config));
    }
    Ok(())
}

async fn remove(user: &UserId, id: i64, with_history: bool, force: bool) -> Result<()> {
    let ctx = get_context()?;
    let config = owned_config(&ctx, user, id).await?;

    if !force {
        println!(
            "\n{}",
            format!("This will remove the '{}' backup configuration.", config.name).yellow()
        );
        if with_history {
            println!("{}\n", "Its backup history will be deleted too.".dimmed());
        } else {
            println!("{}\n", "Its backup history will remain in the database.".dimmed());
        }

        if !Confirm::new()
            .with_prompt("Are you sure?")
            .default(false)
            .interact()?
        {
            println!("{}\n", "Cancelled".dimmed());
            return Ok(());
        }
    }

    ctx.store.delete_config(id, with_history).await?;
    println!("\n{} Backup configuration '{}' removed\n", "✓".green(), config.name);
    Ok(())
}

fn print_configs(configs: &[BackupConfiguration]) {
    let mut table = create_table();
    table.set_header(vec!["ID", "Name", "Sources", "OneDrive", "Google Drive", "Retention"]);

    for config in configs {
        table.add_row(vec![
            Cell::new(config.id),
            Cell::new(&config.name),
            Cell::new(config.source_paths().join("\n")),
            Cell::new(&config.onedrive_path),
            Cell::new(&config.gdrive_path),
            Cell::new(config.retention),
        ]);
    }
    println!("{table}");
}
