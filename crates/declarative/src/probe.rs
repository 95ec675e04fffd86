//! State prober - read-only queries of current resource state
//!
//! The prober answers "what does this resource look like right now" in the
//! same attribute vocabulary declarations use. A missing resource is a
//! normal answer (`Absent`); only a failure to ask is an error.

use crate::context::EngineConfig;
use crate::error::{Error, Result};
use crate::resource::{Attributes, ResourceKind, Value};
use crate::system::{PathKind, SystemControl};
use crate::types::ObservedState;
use std::path::Path;

/// BLAKE3 hex digest used to compare file contents
pub fn digest(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}

/// Query the current state of a resource
pub fn probe(
    system: &dyn SystemControl,
    config: &EngineConfig,
    kind: ResourceKind,
    name: &str,
) -> Result<ObservedState> {
    let observed = match kind {
        ResourceKind::Service => probe_service(system, name),
        ResourceKind::Directory => probe_directory(system, &config.resolve_path(name)),
        ResourceKind::File => probe_file(system, &config.resolve_path(name)),
        ResourceKind::RegistryKey => probe_registry_key(system, name),
        ResourceKind::Site => probe_site(system, name),
        ResourceKind::ApplicationPool => probe_pool(system, name),
        ResourceKind::InstallableProduct => probe_product(system, name),
    };

    let observed = observed.map_err(|source| Error::Probe {
        kind,
        name: name.to_string(),
        source,
    })?;
    log::trace!("probed {kind}[{name}]: {observed:?}");
    Ok(observed)
}

fn present(pairs: impl IntoIterator<Item = (&'static str, Value)>) -> ObservedState {
    ObservedState::Present(
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
    )
}

fn probe_service(system: &dyn SystemControl, name: &str) -> anyhow::Result<ObservedState> {
    Ok(match system.service_status(name)? {
        None => ObservedState::Absent,
        Some(status) => present([
            ("enabled", Value::Bool(status.enabled)),
            ("running", Value::Bool(status.running)),
        ]),
    })
}

fn probe_directory(system: &dyn SystemControl, path: &Path) -> anyhow::Result<ObservedState> {
    Ok(match system.path_kind(path)? {
        None => ObservedState::Absent,
        Some(kind) => present([("type", Value::from(kind.as_str()))]),
    })
}

fn probe_file(system: &dyn SystemControl, path: &Path) -> anyhow::Result<ObservedState> {
    match system.path_kind(path)? {
        None => Ok(ObservedState::Absent),
        Some(PathKind::Directory) => Ok(present([("type", Value::from("directory"))])),
        Some(PathKind::File) => {
            let Some(content) = system.read_file(path)? else {
                // Removed between the two queries
                return Ok(ObservedState::Absent);
            };
            let size = i64::try_from(content.len()).unwrap_or(i64::MAX);
            Ok(present([
                ("type", Value::from("file")),
                ("digest", Value::Str(digest(&content))),
                ("size", Value::Int(size)),
            ]))
        }
    }
}

fn probe_registry_key(system: &dyn SystemControl, key: &str) -> anyhow::Result<ObservedState> {
    Ok(match system.registry_read(key)? {
        None => ObservedState::Absent,
        Some(values) => present([("values", Value::List(values))]),
    })
}

fn probe_site(system: &dyn SystemControl, name: &str) -> anyhow::Result<ObservedState> {
    Ok(match system.site_query(name)? {
        None => ObservedState::Absent,
        Some(site) => {
            let mut attributes: Attributes = site.settings;
            attributes.insert("running".to_string(), Value::Bool(site.running));
            ObservedState::Present(attributes)
        }
    })
}

fn probe_pool(system: &dyn SystemControl, name: &str) -> anyhow::Result<ObservedState> {
    Ok(match system.pool_query(name)? {
        None => ObservedState::Absent,
        Some(settings) => ObservedState::Present(settings),
    })
}

fn probe_product(system: &dyn SystemControl, name: &str) -> anyhow::Result<ObservedState> {
    Ok(match system.product_version(name)? {
        None => ObservedState::Absent,
        Some(version) => present([("version", Value::Str(version))]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySystem;

    fn config() -> EngineConfig {
        EngineConfig {
            docroot: "/srv/www".into(),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_absent_resources_are_not_errors() {
        let system = MemorySystem::new();
        for kind in ResourceKind::ALL {
            let name = if kind == ResourceKind::RegistryKey {
                r"HKLM\SOFTWARE\DEMO"
            } else {
                "missing"
            };
            assert_eq!(
                probe(&system, &config(), kind, name).unwrap(),
                ObservedState::Absent
            );
        }
    }

    #[test]
    fn test_file_probe_reports_digest_relative_to_docroot() {
        let system = MemorySystem::new().with_file("/srv/www/app/data.txt", b"hello");
        let observed = probe(&system, &config(), ResourceKind::File, "app/data.txt").unwrap();
        assert_eq!(observed.str("digest"), Some(digest(b"hello").as_str()));
        assert_eq!(observed.get("size"), Some(&Value::Int(5)));
    }

    #[test]
    fn test_probe_does_not_mutate() {
        let system = MemorySystem::new()
            .with_service("w3svc", true, false)
            .with_site("S", Attributes::new(), true);
        for _ in 0..3 {
            probe(&system, &config(), ResourceKind::Service, "w3svc").unwrap();
            let site = probe(&system, &config(), ResourceKind::Site, "S").unwrap();
            assert_eq!(site.bool("running"), Some(true));
        }
        assert!(system.calls().is_empty());
    }

    #[test]
    fn test_query_failure_is_probe_error() {
        let system = MemorySystem::new().fail_on("service_status");
        let err = probe(&system, &config(), ResourceKind::Service, "w3svc").unwrap_err();
        assert!(matches!(err, Error::Probe { .. }));
    }
}
