//! Restore a file from a commit or snapshot

use anyhow::Result;
use cli_lib::{DaemonLock, Recovery};
use owo_colors::OwoColorize;
use std::io::Write;
use std::path::PathBuf;
use vault_core::Config;

pub async fn run(
    config: &Config,
    source: &str,
    path: &str,
    to: Option<PathBuf>,
    print: bool,
) -> Result<()> {
    let recovery = Recovery::from_config(config);

    if print {
        let (_, contents) = recovery.contents(source, path).await?;
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(&contents)?;
        stdout.flush()?;
        return Ok(());
    }

    let in_vault = to.is_none();
    let target = match to {
        Some(target) => target,
        None => recovery.vault_target(path)?,
    };
    let origin = recovery.restore(source, path, &target).await?;

    println!(
        "{} {} from {} {} to {}",
        "Restored".green(),
        path.cyan(),
        origin,
        source.yellow(),
        target.display()
    );
    if in_vault && DaemonLock::holder(&config.state_dir).is_some() {
        println!(
            "{}",
            "Note: The daemon will commit the restored file after the quiet period.".dimmed()
        );
    }
    Ok(())
}
