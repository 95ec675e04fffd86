//! In-memory system for tests and simulated runs
//!
//! `MemorySystem` behaves like a small host: services, a filesystem tree,
//! a registry, pools, sites and installed products. Every mutating call is
//! recorded so callers can assert on what the engine actually did, and
//! individual primitives can be made to fail on demand.

use crate::resource::{Attributes, Value};
use crate::system::{PathKind, ServiceStatus, SiteStatus, SystemControl};
use anyhow::{Result, bail};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
enum Entry {
    Directory,
    File(Vec<u8>),
}

#[derive(Debug, Default)]
struct State {
    services: BTreeMap<String, ServiceStatus>,
    paths: BTreeMap<PathBuf, Entry>,
    registry: BTreeMap<String, Vec<Value>>,
    pools: BTreeMap<String, Attributes>,
    sites: BTreeMap<String, SiteStatus>,
    products: BTreeMap<String, String>,
    calls: Vec<String>,
    failures: BTreeSet<String>,
}

impl State {
    /// Fail if `op` (or `op:name`) was registered with `fail_on`
    fn check(&self, op: &str, name: &str) -> Result<()> {
        if self.failures.contains(op) || self.failures.contains(&format!("{op}:{name}")) {
            bail!("{op} failed for '{name}' (injected)");
        }
        Ok(())
    }

    /// Record a mutating call after checking for injected failures
    fn record(&mut self, op: &str, name: &str) -> Result<()> {
        self.check(op, name)?;
        self.calls.push(format!("{op}:{name}"));
        Ok(())
    }

    fn parent_is_directory(&self, path: &Path) -> bool {
        match path.parent() {
            None => true,
            Some(parent) if parent.as_os_str().is_empty() || parent.parent().is_none() => true,
            Some(parent) => matches!(self.paths.get(parent), Some(Entry::Directory)),
        }
    }
}

/// Registry keys compare case-insensitively
fn registry_id(key: &str) -> String {
    key.to_ascii_uppercase()
}

fn value_name(value: &Value) -> Option<&str> {
    value.as_map()?.get("name")?.as_str()
}

/// In-memory [`SystemControl`] implementation
#[derive(Debug, Default)]
pub struct MemorySystem {
    state: Mutex<State>,
}

impl MemorySystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // ========================================================================
    // Seeding
    // ========================================================================

    pub fn with_service(self, name: &str, enabled: bool, running: bool) -> Self {
        self.state()
            .services
            .insert(name.to_string(), ServiceStatus { enabled, running });
        self
    }

    /// Add a directory and all of its ancestors
    pub fn with_directory(self, path: impl AsRef<Path>) -> Self {
        {
            let mut state = self.state();
            for ancestor in path.as_ref().ancestors() {
                if ancestor.as_os_str().is_empty() || ancestor.parent().is_none() {
                    continue;
                }
                state
                    .paths
                    .entry(ancestor.to_path_buf())
                    .or_insert(Entry::Directory);
            }
        }
        self
    }

    pub fn with_file(self, path: impl AsRef<Path>, content: &[u8]) -> Self {
        let path = path.as_ref().to_path_buf();
        let this = match path.parent() {
            Some(parent) => self.with_directory(parent),
            None => self,
        };
        this.state().paths.insert(path, Entry::File(content.to_vec()));
        this
    }

    pub fn with_registry_key(self, key: &str, values: Vec<Value>) -> Self {
        self.state().registry.insert(registry_id(key), values);
        self
    }

    pub fn with_pool(self, name: &str, settings: Attributes) -> Self {
        self.state().pools.insert(name.to_string(), settings);
        self
    }

    pub fn with_site(self, name: &str, settings: Attributes, running: bool) -> Self {
        self.state()
            .sites
            .insert(name.to_string(), SiteStatus { settings, running });
        self
    }

    pub fn with_product(self, product: &str, version: &str) -> Self {
        self.state()
            .products
            .insert(product.to_string(), version.to_string());
        self
    }

    /// Make a primitive fail, either for every name (`"site_start"`) or for
    /// one name (`"site_start:WebApplication1"`)
    pub fn fail_on(self, op: &str) -> Self {
        self.state().failures.insert(op.to_string());
        self
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Mutating calls made so far, as `op:name`
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn service(&self, name: &str) -> Option<ServiceStatus> {
        self.state().services.get(name).copied()
    }

    pub fn file_content(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        match self.state().paths.get(path.as_ref()) {
            Some(Entry::File(content)) => Some(content.clone()),
            _ => None,
        }
    }

    pub fn is_directory(&self, path: impl AsRef<Path>) -> bool {
        matches!(self.state().paths.get(path.as_ref()), Some(Entry::Directory))
    }

    pub fn pool(&self, name: &str) -> Option<Attributes> {
        self.state().pools.get(name).cloned()
    }

    pub fn site(&self, name: &str) -> Option<SiteStatus> {
        self.state().sites.get(name).cloned()
    }
}

impl SystemControl for MemorySystem {
    fn service_status(&self, name: &str) -> Result<Option<ServiceStatus>> {
        let state = self.state();
        state.check("service_status", name)?;
        Ok(state.services.get(name).copied())
    }

    fn service_set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let mut state = self.state();
        state.record(if enabled { "service_enable" } else { "service_disable" }, name)?;
        match state.services.get_mut(name) {
            Some(status) => status.enabled = enabled,
            None => bail!("service '{name}' does not exist"),
        }
        Ok(())
    }

    fn service_start(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        state.record("service_start", name)?;
        match state.services.get_mut(name) {
            Some(status) => status.running = true,
            None => bail!("service '{name}' does not exist"),
        }
        Ok(())
    }

    fn service_stop(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        state.record("service_stop", name)?;
        match state.services.get_mut(name) {
            Some(status) => status.running = false,
            None => bail!("service '{name}' does not exist"),
        }
        Ok(())
    }

    fn path_kind(&self, path: &Path) -> Result<Option<PathKind>> {
        let state = self.state();
        state.check("path_kind", &path.display().to_string())?;
        Ok(state.paths.get(path).map(|entry| match entry {
            Entry::Directory => PathKind::Directory,
            Entry::File(_) => PathKind::File,
        }))
    }

    fn create_dir(&self, path: &Path, recursive: bool) -> Result<()> {
        let mut state = self.state();
        state.record("create_dir", &path.display().to_string())?;

        if !recursive && !state.parent_is_directory(path) {
            bail!("parent directory of {} does not exist", path.display());
        }

        let mut missing: Vec<PathBuf> = Vec::new();
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() || ancestor.parent().is_none() {
                break;
            }
            match state.paths.get(ancestor) {
                Some(Entry::Directory) => break,
                Some(Entry::File(_)) => bail!("{} is a file", ancestor.display()),
                None => missing.push(ancestor.to_path_buf()),
            }
        }
        for dir in missing {
            state.paths.insert(dir, Entry::Directory);
        }
        Ok(())
    }

    fn read_file(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        let state = self.state();
        state.check("read_file", &path.display().to_string())?;
        match state.paths.get(path) {
            Some(Entry::File(content)) => Ok(Some(content.clone())),
            Some(Entry::Directory) => bail!("{} is a directory", path.display()),
            None => Ok(None),
        }
    }

    fn write_file_atomic(&self, path: &Path, content: &[u8]) -> Result<()> {
        let mut state = self.state();
        state.record("write_file", &path.display().to_string())?;
        if matches!(state.paths.get(path), Some(Entry::Directory)) {
            bail!("{} is a directory", path.display());
        }
        if !state.parent_is_directory(path) {
            bail!("parent directory of {} does not exist", path.display());
        }
        state
            .paths
            .insert(path.to_path_buf(), Entry::File(content.to_vec()));
        Ok(())
    }

    fn registry_read(&self, key: &str) -> Result<Option<Vec<Value>>> {
        let state = self.state();
        state.check("registry_read", key)?;
        Ok(state.registry.get(&registry_id(key)).cloned())
    }

    fn registry_write(&self, key: &str, values: &[Value], _recursive: bool) -> Result<()> {
        let mut state = self.state();
        state.record("registry_write", key)?;
        let existing = state.registry.entry(registry_id(key)).or_default();
        for value in values {
            let name = value_name(value);
            match existing.iter_mut().find(|v| value_name(v) == name) {
                Some(slot) => *slot = value.clone(),
                None => existing.push(value.clone()),
            }
        }
        Ok(())
    }

    fn registry_delete(&self, key: &str, recursive: bool) -> Result<()> {
        let mut state = self.state();
        state.record("registry_delete", key)?;
        let id = registry_id(key);
        let prefix = format!("{id}\\");
        let subkeys: Vec<String> = state
            .registry
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect();
        if !subkeys.is_empty() && !recursive {
            bail!("{key} has subkeys; set recursive = true to delete them");
        }
        for subkey in subkeys {
            state.registry.remove(&subkey);
        }
        state.registry.remove(&id);
        Ok(())
    }

    fn pool_query(&self, name: &str) -> Result<Option<Attributes>> {
        let state = self.state();
        state.check("pool_query", name)?;
        Ok(state.pools.get(name).cloned())
    }

    fn pool_add(&self, name: &str, settings: &Attributes) -> Result<()> {
        let mut state = self.state();
        state.record("pool_add", name)?;
        if state.pools.contains_key(name) {
            bail!("application pool '{name}' already exists");
        }
        state.pools.insert(name.to_string(), settings.clone());
        Ok(())
    }

    fn pool_update(&self, name: &str, settings: &Attributes) -> Result<()> {
        let mut state = self.state();
        state.record("pool_update", name)?;
        match state.pools.get_mut(name) {
            Some(existing) => existing.extend(settings.clone()),
            None => bail!("application pool '{name}' does not exist"),
        }
        Ok(())
    }

    fn site_query(&self, name: &str) -> Result<Option<SiteStatus>> {
        let state = self.state();
        state.check("site_query", name)?;
        Ok(state.sites.get(name).cloned())
    }

    fn site_add(&self, name: &str, settings: &Attributes) -> Result<()> {
        let mut state = self.state();
        state.record("site_add", name)?;
        if state.sites.contains_key(name) {
            bail!("site '{name}' already exists");
        }
        state.sites.insert(
            name.to_string(),
            SiteStatus {
                settings: settings.clone(),
                running: false,
            },
        );
        Ok(())
    }

    fn site_update(&self, name: &str, settings: &Attributes) -> Result<()> {
        let mut state = self.state();
        state.record("site_update", name)?;
        match state.sites.get_mut(name) {
            Some(site) => site.settings.extend(settings.clone()),
            None => bail!("site '{name}' does not exist"),
        }
        Ok(())
    }

    fn site_start(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        state.record("site_start", name)?;
        match state.sites.get_mut(name) {
            Some(site) => site.running = true,
            None => bail!("site '{name}' does not exist"),
        }
        Ok(())
    }

    fn site_stop(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        state.record("site_stop", name)?;
        match state.sites.get_mut(name) {
            Some(site) => site.running = false,
            None => bail!("site '{name}' does not exist"),
        }
        Ok(())
    }

    fn product_version(&self, product: &str) -> Result<Option<String>> {
        let state = self.state();
        state.check("product_version", product)?;
        Ok(state.products.get(product).cloned())
    }

    fn product_install(
        &self,
        product: &str,
        version: Option<&str>,
        accept_eula: bool,
    ) -> Result<()> {
        let mut state = self.state();
        state.record("product_install", product)?;
        if !accept_eula {
            bail!("license for '{product}' was not accepted");
        }
        state.products.insert(
            product.to_string(),
            version.unwrap_or("latest").to_string(),
        );
        Ok(())
    }
}
