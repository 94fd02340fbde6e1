//! Browse the vault's git history

use adapters::{CommitEntry, GitRepo};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use cli_lib::util;
use owo_colors::OwoColorize;
use serde_json::json;
use vault_core::Config;

pub async fn run(
    config: &Config,
    path: Option<&str>,
    commit: Option<&str>,
    count: usize,
    json: bool,
) -> Result<()> {
    let git = GitRepo::new(&config.vault_path, &config.git, config.command_timeout(), false);
    let now = Utc::now();

    match (commit, path) {
        (Some(commit), Some(path)) => {
            let diff = git.diff_file(commit, path).await?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({"commit": commit, "path": path, "diff": diff}))?
                );
            } else if diff.is_empty() {
                println!("{}", format!("{path} did not change in {commit}").dimmed());
            } else {
                print_diff(&diff);
            }
        }
        (Some(commit), None) => {
            let entry = git
                .commit_entry(commit)
                .await?
                .ok_or_else(|| anyhow!("Commit not found: {commit}"))?;
            let files = git.changed_files(&entry.id).await?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({"commit": entry, "files": files}))?
                );
                return Ok(());
            }

            println!("{} {}", "commit".yellow().bold(), entry.id.cyan());
            println!("{} {}", "Date:    ".dimmed(), describe_date(entry.date, now));
            println!("{} {}", "Message: ".dimmed(), entry.subject);
            println!("\n{} ({} files)", "Changed files:".bold(), files.len());
            for change in &files {
                let code = change.status.code().to_string();
                let code = match change.status.code() {
                    'A' => code.green().to_string(),
                    'D' => code.red().to_string(),
                    _ => code.yellow().to_string(),
                };
                println!("  {}  {}", code, change.path.cyan());
            }
        }
        (None, path) => {
            let commits = match path {
                Some(path) => git.file_history(path, count).await?,
                None => git.log(count).await?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&commits)?);
                return Ok(());
            }
            if commits.is_empty() {
                println!("{}", "No commits yet".dimmed());
                return Ok(());
            }
            if let Some(path) = path {
                println!("{} {}\n", "History of".bold(), path.cyan());
            }
            for entry in &commits {
                print_entry(entry, now);
            }
        }
    }

    Ok(())
}

fn print_entry(entry: &CommitEntry, now: DateTime<Utc>) {
    println!(
        "{}  {}  {}",
        entry.short_id.yellow(),
        entry.subject,
        util::format_relative_time(entry.date, now).dimmed()
    );
}

fn describe_date(date: DateTime<Utc>, now: DateTime<Utc>) -> String {
    format!(
        "{} ({})",
        date.format("%Y-%m-%d %H:%M:%S UTC"),
        util::format_relative_time(date, now).dimmed()
    )
}

fn print_diff(diff: &str) {
    for line in diff.lines() {
        if line.starts_with("+++") || line.starts_with("---") {
            println!("{}", line.bold());
        } else if line.starts_with('+') {
            println!("{}", line.green());
        } else if line.starts_with('-') {
            println!("{}", line.red());
        } else if line.starts_with("@@") {
            println!("{}", line.cyan());
        } else {
            println!("{line}");
        }
    }
}
