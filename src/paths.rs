//! Path resolution for provision
//!
//! # Environment Variables
//!
//! - `PROVISION_CONFIG_DIR` - Override config directory
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `PROVISION_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/provision` (if set)
//! 3. Platform default:
//!    - Windows: `%APPDATA%\provision`
//!    - macOS/Linux: `~/.config/provision`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "PROVISION_CONFIG_DIR";

/// Get the provision config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("provision");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            let path = app_data.join("provision");
            log::debug!("Using Windows config dir: {}", path.display());
            return Ok(path);
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("provision");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Default node config file
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Expand ~ and environment variables in a path string
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
