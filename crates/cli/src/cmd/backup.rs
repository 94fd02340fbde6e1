//! Run one backup cycle now

use anyhow::{Context, Result};
use cli_lib::{daemon, DaemonLock};
use cycle::{CycleOutcome, CycleRun};
use owo_colors::OwoColorize;
use vault_core::Config;

pub async fn run(config: &Config) -> Result<()> {
    let _lock = DaemonLock::acquire(&config.state_dir)
        .context("Cannot back up manually while the daemon holds the state directory")?;

    let collaborators = daemon::connect(config).await?;
    let run = daemon::run_once(config, collaborators).await;
    print_run(&run);

    if run.outcome.is_settled() {
        Ok(())
    } else {
        anyhow::bail!(
            "Backup cycle failed: {}",
            run.error.as_deref().unwrap_or("unknown error")
        )
    }
}

fn print_run(run: &CycleRun) {
    let outcome = match run.outcome {
        CycleOutcome::Success if run.backup_skipped => "committed, backup skipped".yellow().to_string(),
        CycleOutcome::Success => "success ✓".green().to_string(),
        CycleOutcome::NoOp => "nothing to back up".dimmed().to_string(),
        CycleOutcome::CommitFailed => "commit failed ✗".red().to_string(),
        CycleOutcome::BackupFailed => "backup failed ✗".red().to_string(),
    };

    println!("{}", "Backup Cycle".bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Outcome:       {}", outcome);

    if !run.staged_files.is_empty() {
        println!("Files:         {}", run.staged_files.len());
        for path in run.staged_files.iter().take(5) {
            println!("    - {}", path);
        }
        if run.staged_files.len() > 5 {
            println!("    ... and {} more", run.staged_files.len() - 5);
        }
    }
    if let Some(message) = run.message.as_deref().and_then(|m| m.lines().next()) {
        println!("Message:       {}", message);
    }
    if let Some(commit) = &run.commit_id {
        println!("Commit:        {}", commit.to_string().yellow());
    }
    if let Some(snapshot) = &run.backup_id {
        println!("Snapshot:      {}", snapshot.to_string().yellow());
    }
    if let Some(error) = &run.error {
        println!("Error:         {}", error.red());
    }
}
