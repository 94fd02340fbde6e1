//! Print configuration as TOML

use anyhow::Result;
use vault_core::Config;

/// Effective configuration, API keys and webhook tokens masked
pub fn show(config: &Config) -> Result<()> {
    print!("{}", config.redacted().to_toml()?);
    Ok(())
}

/// Built-in defaults, usable as a starting config file
pub fn example() -> Result<()> {
    print!("{}", Config::default().to_toml()?);
    Ok(())
}
