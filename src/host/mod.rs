//! This machine as a [`SystemControl`]
//!
//! Files and directories go through `std::fs` on every platform. Services
//! use systemd on Unix and the service control manager on Windows. The
//! registry, IIS and Web Platform Installer exist only on Windows;
//! elsewhere their queries fail, which the engine reports as a probe error.

mod iis;
mod registry;
mod service;
mod webpi;

use anyhow::{Context, Result, bail};
use declarative::{Attributes, PathKind, ServiceStatus, SiteStatus, SystemControl, Value};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

/// The local host
#[derive(Debug, Default, Clone, Copy)]
pub struct HostSystem;

impl HostSystem {
    pub fn new() -> Self {
        Self
    }
}

impl SystemControl for HostSystem {
    fn service_status(&self, name: &str) -> Result<Option<ServiceStatus>> {
        service::status(name)
    }

    fn service_set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        service::set_enabled(name, enabled)
    }

    fn service_start(&self, name: &str) -> Result<()> {
        service::start(name)
    }

    fn service_stop(&self, name: &str) -> Result<()> {
        service::stop(name)
    }

    fn path_kind(&self, path: &Path) -> Result<Option<PathKind>> {
        match fs::metadata(path) {
            Ok(meta) if meta.is_dir() => Ok(Some(PathKind::Directory)),
            Ok(_) => Ok(Some(PathKind::File)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Could not stat {}", path.display())),
        }
    }

    fn create_dir(&self, path: &Path, recursive: bool) -> Result<()> {
        let result = if recursive {
            fs::create_dir_all(path)
        } else {
            fs::create_dir(path)
        };
        result.with_context(|| format!("Could not create {}", path.display()))
    }

    fn read_file(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Could not read {}", path.display())),
        }
    }

    fn write_file_atomic(&self, path: &Path, content: &[u8]) -> Result<()> {
        let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
            bail!("{} has no parent directory", path.display());
        };
        // Temp file in the same directory so the rename stays on one filesystem
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Could not create temp file in {}", dir.display()))?;
        tmp.write_all(content)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)
            .with_context(|| format!("Could not replace {}", path.display()))?;
        Ok(())
    }

    fn registry_read(&self, key: &str) -> Result<Option<Vec<Value>>> {
        registry::read(key)
    }

    fn registry_write(&self, key: &str, values: &[Value], _recursive: bool) -> Result<()> {
        // reg.exe creates missing parent keys on its own
        registry::write(key, values)
    }

    fn registry_delete(&self, key: &str, recursive: bool) -> Result<()> {
        registry::delete(key, recursive)
    }

    fn pool_query(&self, name: &str) -> Result<Option<Attributes>> {
        iis::pool_query(name)
    }

    fn pool_add(&self, name: &str, settings: &Attributes) -> Result<()> {
        iis::pool_add(name, settings)
    }

    fn pool_update(&self, name: &str, settings: &Attributes) -> Result<()> {
        iis::pool_update(name, settings)
    }

    fn site_query(&self, name: &str) -> Result<Option<SiteStatus>> {
        iis::site_query(name)
    }

    fn site_add(&self, name: &str, settings: &Attributes) -> Result<()> {
        iis::site_add(name, settings)
    }

    fn site_update(&self, name: &str, settings: &Attributes) -> Result<()> {
        iis::site_update(name, settings)
    }

    fn site_start(&self, name: &str) -> Result<()> {
        iis::site_start(name)
    }

    fn site_stop(&self, name: &str) -> Result<()> {
        iis::site_stop(name)
    }

    fn product_version(&self, product: &str) -> Result<Option<String>> {
        webpi::version(product)
    }

    fn product_install(
        &self,
        product: &str,
        version: Option<&str>,
        accept_eula: bool,
    ) -> Result<()> {
        webpi::install(product, version, accept_eula)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{Action, Engine, EngineConfig, ResourceDeclaration, ResourceKind, RunStatus};

    #[test]
    fn test_filesystem_primitives() {
        let dir = tempfile::tempdir().unwrap();
        let host = HostSystem::new();
        let nested = dir.path().join("a").join("b");

        assert_eq!(host.path_kind(&nested).unwrap(), None);
        assert!(host.create_dir(&nested, false).is_err());
        host.create_dir(&nested, true).unwrap();
        assert_eq!(host.path_kind(&nested).unwrap(), Some(PathKind::Directory));

        let file = nested.join("data.txt");
        assert_eq!(host.read_file(&file).unwrap(), None);
        host.write_file_atomic(&file, b"one").unwrap();
        host.write_file_atomic(&file, b"two").unwrap();
        assert_eq!(host.read_file(&file).unwrap(), Some(b"two".to_vec()));
        assert_eq!(host.path_kind(&file).unwrap(), Some(PathKind::File));
    }

    #[test]
    fn test_engine_converges_real_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            docroot: dir.path().to_path_buf(),
            ..EngineConfig::default()
        };
        let declarations = vec![
            ResourceDeclaration::builder(ResourceKind::Directory, "WebApplication1")
                .action(Action::Create)
                .build()
                .unwrap(),
            ResourceDeclaration::builder(ResourceKind::File, "WebApplication1/data.txt")
                .attr("content", "hello")
                .build()
                .unwrap(),
        ];
        let host = HostSystem::new();
        let engine = Engine::new(&host, config);

        let first = engine.run(&declarations);
        assert_eq!(first.status(), RunStatus::Completed);
        assert_eq!(first.summary().applied, 2);
        assert_eq!(
            fs::read_to_string(dir.path().join("WebApplication1/data.txt")).unwrap(),
            "hello"
        );

        let second = engine.run(&declarations);
        assert_eq!(second.summary().unchanged, 2);
    }
}
