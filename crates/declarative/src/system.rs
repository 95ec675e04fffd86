//! System control surface
//!
//! The engine never touches the host directly. Everything it needs to know
//! or change goes through [`SystemControl`], so a platform backend, an
//! in-memory fake, or a remote agent can stand behind the same engine.
//! Query methods must be read-only; mutating methods must only affect the
//! object they name.

use crate::resource::{Attributes, Value};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Run state of an OS service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    /// Starts automatically at boot
    pub enabled: bool,
    /// Currently running
    pub running: bool,
}

/// What currently occupies a filesystem path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathKind {
    Directory,
    File,
}

impl PathKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Directory => "directory",
            Self::File => "file",
        }
    }
}

/// A site as reported by the web server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteStatus {
    /// Binding and placement settings, using site attribute keys
    pub settings: Attributes,
    /// Whether the site is started
    pub running: bool,
}

/// Capability interface over the host being converged
///
/// Every method returns `Ok` for "does not exist" cases (via `Option`) and
/// reserves `Err` for failures to query or mutate.
pub trait SystemControl: Send + Sync {
    // Services

    /// Status of a service, or `None` if the host has no such service
    fn service_status(&self, name: &str) -> Result<Option<ServiceStatus>>;

    /// Set whether a service starts at boot
    fn service_set_enabled(&self, name: &str, enabled: bool) -> Result<()>;

    fn service_start(&self, name: &str) -> Result<()>;

    fn service_stop(&self, name: &str) -> Result<()>;

    // Filesystem

    /// What is at `path`, or `None` if nothing is
    fn path_kind(&self, path: &Path) -> Result<Option<PathKind>>;

    /// Create a directory, including missing parents when `recursive` is set
    fn create_dir(&self, path: &Path, recursive: bool) -> Result<()>;

    /// Contents of a file, or `None` if it does not exist
    fn read_file(&self, path: &Path) -> Result<Option<Vec<u8>>>;

    /// Replace a file's contents so readers never observe a partial write
    fn write_file_atomic(&self, path: &Path, content: &[u8]) -> Result<()>;

    // Registry

    /// Values under a registry key as `{name, type, data}` tables, or `None`
    /// if the key does not exist
    fn registry_read(&self, key: &str) -> Result<Option<Vec<Value>>>;

    /// Create a key (if needed) and write the given values to it
    fn registry_write(&self, key: &str, values: &[Value], recursive: bool) -> Result<()>;

    fn registry_delete(&self, key: &str, recursive: bool) -> Result<()>;

    // Application pools

    /// Settings of a pool, using pool attribute keys, or `None`
    fn pool_query(&self, name: &str) -> Result<Option<Attributes>>;

    fn pool_add(&self, name: &str, settings: &Attributes) -> Result<()>;

    /// Overwrite the given settings on an existing pool
    fn pool_update(&self, name: &str, settings: &Attributes) -> Result<()>;

    // Sites

    fn site_query(&self, name: &str) -> Result<Option<SiteStatus>>;

    fn site_add(&self, name: &str, settings: &Attributes) -> Result<()>;

    /// Overwrite the given settings on an existing site
    fn site_update(&self, name: &str, settings: &Attributes) -> Result<()>;

    fn site_start(&self, name: &str) -> Result<()>;

    fn site_stop(&self, name: &str) -> Result<()>;

    // Products

    /// Installed version of a product, or `None` if not installed
    fn product_version(&self, product: &str) -> Result<Option<String>>;

    /// Install a product, optionally pinned to a version
    ///
    /// `accept_eula` records that the declaration explicitly accepted the
    /// product's license; implementations must not accept it otherwise.
    fn product_install(
        &self,
        product: &str,
        version: Option<&str>,
        accept_eula: bool,
    ) -> Result<()>;
}
