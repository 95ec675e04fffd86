//! Node configuration
//!
//! ```toml
//! recipe = "~/recipes/web.toml"
//!
//! [engine]
//! docroot = 'C:\inetpub\wwwroot'
//! conflict_policy = "fail"
//! ```

use anyhow::{Context, Result};
use declarative::EngineConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;

/// Settings for this node, shared by every run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    /// Recipe used when none is given on the command line
    pub recipe: Option<String>,
    pub engine: EngineConfig,
}

impl NodeConfig {
    /// Load the node config
    ///
    /// An explicitly requested file must exist; the default location is
    /// optional and falls back to built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let (path, required) = match explicit {
            Some(path) => (path.to_path_buf(), true),
            None => (paths::config_file()?, false),
        };

        if !path.exists() {
            if required {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            log::debug!("No node config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Invalid config in {}", path.display()))?;
        log::debug!("Loaded node config from {}", path.display());
        Ok(config)
    }

    /// Parse a config document, expanding `~` and variables in paths
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content)?;
        let docroot = config.engine.docroot.to_string_lossy().into_owned();
        config.engine.docroot = paths::expand(&docroot);
        Ok(config)
    }

    /// Recipe to run when the command line names none
    pub fn recipe_path(&self) -> Option<PathBuf> {
        self.recipe.as_deref().map(paths::expand)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::ConflictPolicy;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = NodeConfig::from_toml("").unwrap();
        assert_eq!(config, NodeConfig::default());
        assert!(config.recipe_path().is_none());
    }

    #[test]
    fn test_engine_section() {
        let config = NodeConfig::from_toml(
            r#"
            recipe = "/etc/provision/web.toml"

            [engine]
            docroot = "/srv/www"
            conflict_policy = "update_in_place"
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.docroot, PathBuf::from("/srv/www"));
        assert_eq!(config.engine.conflict_policy, ConflictPolicy::UpdateInPlace);
        assert!(!config.engine.why_run);
        assert_eq!(
            config.recipe_path(),
            Some(PathBuf::from("/etc/provision/web.toml"))
        );
    }

    #[test]
    fn test_docroot_tilde_is_expanded() {
        let config = NodeConfig::from_toml("[engine]\ndocroot = \"~/www\"\n").unwrap();
        let home = dirs::home_dir().unwrap();
        assert_eq!(config.engine.docroot, home.join("www"));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(NodeConfig::from_toml("docroot = \"/srv\"\n").is_err());
        assert!(NodeConfig::from_toml("[engine]\nconflict_policy = \"merge\"\n").is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[engine]\ndocroot = \"/srv/www\"").unwrap();
        let config = NodeConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.engine.docroot, PathBuf::from("/srv/www"));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("config.toml");
        assert!(NodeConfig::load(Some(&missing)).is_err());
    }
}
