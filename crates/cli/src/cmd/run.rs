//! Run the backup daemon in the foreground

use anyhow::Result;
use cli_lib::{daemon, server, Daemon, DaemonLock, Exit};
use vault_core::Config;

pub async fn run(config: Config) -> Result<()> {
    let lock = DaemonLock::acquire(&config.state_dir)?;

    let collaborators = daemon::connect(&config).await?;
    let listener = server::bind(&config).await?;
    let daemon = Daemon::new(config, collaborators)?;

    match daemon.run(listener, daemon::shutdown_signal()).await? {
        Exit::Shutdown => lock.release(),
        Exit::WatchLost(e) => Err(e.into()),
    }
}
