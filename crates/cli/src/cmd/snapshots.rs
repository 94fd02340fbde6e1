//! List restic snapshots, or the files inside one

use adapters::history::{children_of, EntryKind};
use adapters::ResticRepo;
use anyhow::Result;
use chrono::Utc;
use cli_lib::util;
use owo_colors::OwoColorize;
use vault_core::Config;

pub async fn run(config: &Config, snapshot: Option<&str>, dir: Option<&str>, json: bool) -> Result<()> {
    let restic = ResticRepo::new(
        &config.vault_path,
        &config.backup.tags,
        config.command_timeout(),
        false,
    );

    let Some(snapshot) = snapshot else {
        let snapshots = restic.snapshots().await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&snapshots)?);
            return Ok(());
        }
        if snapshots.is_empty() {
            println!("{}", "No snapshots yet".dimmed());
            return Ok(());
        }
        let now = Utc::now();
        for snapshot in &snapshots {
            println!(
                "{}  {}  {}",
                snapshot.short_id.yellow(),
                util::format_timestamp(Some(snapshot.time), now),
                snapshot.tags.join(",").dimmed()
            );
        }
        return Ok(());
    };

    let prefix = restic.snapshot_dir(dir)?;
    let entries = children_of(&restic.ls(snapshot).await?, &prefix);
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    let vault = restic.snapshot_dir(None)?;
    println!("{} {}:{}\n", "snapshot".yellow().bold(), snapshot.cyan(), dir.unwrap_or("/"));
    if entries.is_empty() {
        println!("{}", "(empty)".dimmed());
    }
    for entry in &entries {
        let shown = entry
            .path
            .strip_prefix(&vault)
            .unwrap_or(&entry.path)
            .trim_start_matches('/');
        match entry.kind {
            EntryKind::Dir => println!("  {}", format!("{shown}/").blue().bold()),
            _ => println!("  {}  {}", shown, util::format_bytes(entry.size).dimmed()),
        }
    }
    Ok(())
}
