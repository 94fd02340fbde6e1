//! Show backup health from the state directory
//!
//! Reads the persisted state files directly; the daemon is never contacted.

use adapters::GitRepo;
use anyhow::Result;
use chrono::Utc;
use cli_lib::{util, DaemonLock, HealthContext};
use owo_colors::OwoColorize;
use std::sync::Arc;
use vault_core::{Config, HealthTracker, StateStore, VersionControl};

pub async fn run(config: &Config, json: bool) -> Result<()> {
    let now = Utc::now();
    let holder = DaemonLock::holder(&config.state_dir);

    let tracker = Arc::new(HealthTracker::with_store(StateStore::new(&config.state_dir)));
    let vcs = config.vault_path.join(".git").exists().then(|| {
        Arc::new(GitRepo::new(
            &config.vault_path,
            &config.git,
            config.command_timeout(),
            false,
        )) as Arc<dyn VersionControl>
    });
    let ctx = HealthContext::new(tracker, vcs, &config.vault_path, config.unhealthy_threshold());

    let mut report = ctx.report(now).await;
    report.uptime_seconds = holder
        .as_ref()
        .and_then(|h| (now - h.started_at).to_std().ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "Vault Backup Status".bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    println!("Vault:         {}", config.vault_path.display().to_string().cyan());
    println!("State:         {}", config.state_dir.display());
    println!();

    print!("Daemon:        ");
    match &holder {
        Some(holder) => {
            println!("{}", "Running ✓".green());
            println!("  PID:         {}", holder.pid);
            println!("  Uptime:      {}", util::format_duration(report.uptime_seconds));
        }
        None => {
            println!("{}", "Not running".yellow());
            println!("  {}", "Tip: Start with 'vault-backup run'".dimmed());
        }
    }
    println!();

    println!("Health:        {}", util::format_status(report.status));
    println!("Last change:   {}", util::format_timestamp(report.last_change, now));
    println!("Last commit:   {}", util::format_timestamp(report.last_commit, now));
    println!("Last backup:   {}", util::format_timestamp(report.last_backup, now));
    println!(
        "Pending:       {}",
        if report.pending_changes {
            "yes".yellow().to_string()
        } else {
            "no".to_string()
        }
    );
    if report.commits_since_backup > 0 {
        println!("Unarchived:    {} commits", report.commits_since_backup);
    }
    if report.sync_state.is_some() {
        println!("Obsidian sync: {}", "present".cyan());
    }
    println!();

    if report.pending_changes && holder.is_none() {
        println!(
            "{}",
            "Note: Changes are pending and no daemon is running. Run 'vault-backup backup' to flush them."
                .dimmed()
        );
    }

    Ok(())
}
