//! Vault backup sidecar - vault-backup command

use anyhow::Result;
use clap::{Parser, Subcommand};
use cli_lib::logging::{self, LogFormat, LogOptions};
use std::path::PathBuf;
use vault_core::Config;

mod cmd;

/// Vault Backup - commit and snapshot an Obsidian vault after every burst of edits
#[derive(Parser)]
#[command(name = "vault-backup")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file (environment variables override it)
    #[arg(long, global = true, env = "VAULT_BACKUP_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "info,watcher=trace" (default: RUST_LOG)
    #[arg(long, global = true, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "pretty", env = "LOG_FORMAT")]
    log_format: LogFormat,

    /// Also write daily-rotated JSON logs to <state_dir>/logs
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the vault and back it up after each quiet period
    Run {
        /// Log commits and snapshots instead of making them
        #[arg(long)]
        dry_run: bool,
    },
    /// Run one backup cycle now
    Backup {
        /// Log the commit and snapshot instead of making them
        #[arg(long)]
        dry_run: bool,
    },
    /// Show backup health from the state directory
    Status {
        /// Print the health report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List commits, a file's history, or what one commit changed
    History {
        /// Vault-relative file to follow
        path: Option<String>,
        /// Show the files this commit changed, or with PATH its diff
        #[arg(long)]
        commit: Option<String>,
        /// Number of commits to list
        #[arg(short = 'n', long, default_value_t = 20)]
        count: usize,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// List restic snapshots, or the files inside one
    Snapshots {
        /// Snapshot id to look inside
        snapshot: Option<String>,
        /// Vault-relative folder within the snapshot
        dir: Option<String>,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Restore a file from a git commit or restic snapshot
    Restore {
        /// Commit or snapshot id
        source: String,
        /// Vault-relative file
        path: String,
        /// Write here instead of over the file in the vault
        #[arg(long)]
        to: Option<PathBuf>,
        /// Print the contents instead of writing them
        #[arg(long, conflicts_with = "to")]
        print: bool,
    },
    /// Print the effective configuration
    Config {
        /// Print the built-in defaults instead
        #[arg(long)]
        example: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { example: true } = cli.command {
        return cmd::config::example();
    }

    let mut config = Config::load(cli.config.as_deref())?;
    if let Commands::Run { dry_run: true } | Commands::Backup { dry_run: true } = cli.command {
        config.dry_run = true;
    }

    // Cycle commands log progress; the rest keep stderr quiet
    let default_level = match cli.command {
        Commands::Run { .. } | Commands::Backup { .. } => "info",
        _ => "warn",
    };
    let _log_guard = logging::init(
        &LogOptions {
            level: cli.log_level.clone(),
            format: cli.log_format,
            file_dir: cli.log_file.then(|| config.state_dir.join("logs")),
        },
        default_level,
    )?;

    match cli.command {
        Commands::Run { .. } => cmd::run::run(config).await,
        Commands::Backup { .. } => cmd::backup::run(&config).await,
        Commands::Status { json } => cmd::status::run(&config, json).await,
        Commands::History {
            path,
            commit,
            count,
            json,
        } => cmd::history::run(&config, path.as_deref(), commit.as_deref(), count, json).await,
        Commands::Snapshots {
            snapshot,
            dir,
            json,
        } => cmd::snapshots::run(&config, snapshot.as_deref(), dir.as_deref(), json).await,
        Commands::Restore {
            source,
            path,
            to,
            print,
        } => cmd::restore::run(&config, &source, &path, to, print).await,
        Commands::Config { .. } => cmd::config::show(&config),
    }
}
