//! Action executor - idempotent handlers behind a single dispatch table
//!
//! Each `(kind, action)` pair maps to exactly one handler. A handler gets
//! the declaration and the state probed just before it runs, decides
//! whether anything needs to change, and performs the smallest mutation
//! that gets there. Handlers only touch the resource they were called for.

use crate::context::{ApplyContext, ConflictPolicy};
use crate::error::{Error, Result};
use crate::probe::digest;
use crate::resource::{Action, Attributes, ResourceDeclaration, ResourceKind, Value};
use crate::system::PathKind;
use crate::types::{ActionOutcome, ObservedState};
use std::path::Path;

/// Signature shared by every action handler
pub type Handler =
    fn(&ApplyContext<'_>, &ResourceDeclaration, &ObservedState) -> Result<ActionOutcome>;

struct Route {
    kind: ResourceKind,
    action: Action,
    handler: Handler,
}

const ROUTES: &[Route] = &[
    Route {
        kind: ResourceKind::Service,
        action: Action::Enable,
        handler: service_enable,
    },
    Route {
        kind: ResourceKind::Service,
        action: Action::Disable,
        handler: service_disable,
    },
    Route {
        kind: ResourceKind::Service,
        action: Action::Start,
        handler: service_start,
    },
    Route {
        kind: ResourceKind::Service,
        action: Action::Stop,
        handler: service_stop,
    },
    Route {
        kind: ResourceKind::Directory,
        action: Action::Create,
        handler: directory_create,
    },
    Route {
        kind: ResourceKind::File,
        action: Action::Create,
        handler: file_create,
    },
    Route {
        kind: ResourceKind::RegistryKey,
        action: Action::Create,
        handler: registry_create,
    },
    Route {
        kind: ResourceKind::RegistryKey,
        action: Action::Delete,
        handler: registry_delete,
    },
    Route {
        kind: ResourceKind::ApplicationPool,
        action: Action::Add,
        handler: pool_add,
    },
    Route {
        kind: ResourceKind::Site,
        action: Action::Add,
        handler: site_add,
    },
    Route {
        kind: ResourceKind::Site,
        action: Action::Start,
        handler: site_start,
    },
    Route {
        kind: ResourceKind::Site,
        action: Action::Stop,
        handler: site_stop,
    },
    Route {
        kind: ResourceKind::InstallableProduct,
        action: Action::Install,
        handler: product_install,
    },
];

/// Look up the handler for a kind/action pair
pub fn handler(kind: ResourceKind, action: Action) -> Option<Handler> {
    ROUTES
        .iter()
        .find(|route| route.kind == kind && route.action == action)
        .map(|route| route.handler)
}

/// Run one action against a declaration given freshly probed state
pub fn apply(
    ctx: &ApplyContext<'_>,
    declaration: &ResourceDeclaration,
    action: Action,
    observed: &ObservedState,
) -> Result<ActionOutcome> {
    let handler = handler(declaration.kind(), action).ok_or_else(|| {
        apply_error(
            declaration,
            anyhow::anyhow!("no handler for action '{action}'"),
        )
    })?;
    handler(ctx, declaration, observed)
}

// ============================================================================
// Helpers
// ============================================================================

fn apply_error(declaration: &ResourceDeclaration, source: anyhow::Error) -> Error {
    Error::Apply {
        kind: declaration.kind(),
        name: declaration.name().to_string(),
        source,
    }
}

fn missing(declaration: &ResourceDeclaration) -> Error {
    apply_error(
        declaration,
        anyhow::anyhow!("{} does not exist", declaration.kind()),
    )
}

/// Perform a change, or describe it when running in why-run mode
fn mutate(
    ctx: &ApplyContext<'_>,
    declaration: &ResourceDeclaration,
    change: String,
    op: impl FnOnce() -> anyhow::Result<()>,
) -> Result<ActionOutcome> {
    if ctx.config.why_run {
        return Ok(ActionOutcome::skipped(format!("would {change}")));
    }
    op().map_err(|source| apply_error(declaration, source))?;
    log::info!("{declaration}: {change}");
    Ok(ActionOutcome::applied(change))
}

/// Shared logic for boolean run-state actions (enable/disable, start/stop)
fn set_flag(
    ctx: &ApplyContext<'_>,
    declaration: &ResourceDeclaration,
    observed: &ObservedState,
    key: &str,
    desired: bool,
    change: &str,
    op: impl FnOnce() -> anyhow::Result<()>,
) -> Result<ActionOutcome> {
    if observed.is_absent() {
        return Err(missing(declaration));
    }
    if observed.bool(key) == Some(desired) {
        return Ok(ActionOutcome::Unchanged);
    }
    mutate(ctx, declaration, change.to_string(), op)
}

/// Declared attributes whose observed value differs
fn drift(desired: &Attributes, observed: &ObservedState) -> Attributes {
    desired
        .iter()
        .filter(|(key, value)| observed.get(key) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn describe_drift(drifted: &Attributes, observed: &ObservedState) -> String {
    drifted
        .iter()
        .map(|(key, desired)| match observed.get(key) {
            Some(current) => format!("{key} is {current}, want {desired}"),
            None => format!("{key} is unset, want {desired}"),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Handle an `add` on something that already exists
fn reconcile_existing(
    ctx: &ApplyContext<'_>,
    declaration: &ResourceDeclaration,
    desired: &Attributes,
    observed: &ObservedState,
    update: impl FnOnce(&Attributes) -> anyhow::Result<()>,
) -> Result<ActionOutcome> {
    let drifted = drift(desired, observed);
    if drifted.is_empty() {
        return Ok(ActionOutcome::Unchanged);
    }

    match ctx.config.conflict_policy {
        ConflictPolicy::Fail => Err(Error::Conflict {
            kind: declaration.kind(),
            name: declaration.name().to_string(),
            details: describe_drift(&drifted, observed),
        }),
        ConflictPolicy::UpdateInPlace => {
            let keys: Vec<&str> = drifted.keys().map(String::as_str).collect();
            let change = format!("update {} ({})", declaration.kind(), keys.join(", "));
            mutate(ctx, declaration, change, || update(&drifted))
        }
    }
}

// ============================================================================
// Services
// ============================================================================

fn service_enable(
    ctx: &ApplyContext<'_>,
    declaration: &ResourceDeclaration,
    observed: &ObservedState,
) -> Result<ActionOutcome> {
    set_flag(ctx, declaration, observed, "enabled", true, "enable service", || {
        ctx.system.service_set_enabled(declaration.name(), true)
    })
}

fn service_disable(
    ctx: &ApplyContext<'_>,
    declaration: &ResourceDeclaration,
    observed: &ObservedState,
) -> Result<ActionOutcome> {
    set_flag(ctx, declaration, observed, "enabled", false, "disable service", || {
        ctx.system.service_set_enabled(declaration.name(), false)
    })
}

fn service_start(
    ctx: &ApplyContext<'_>,
    declaration: &ResourceDeclaration,
    observed: &ObservedState,
) -> Result<ActionOutcome> {
    set_flag(ctx, declaration, observed, "running", true, "start service", || {
        ctx.system.service_start(declaration.name())
    })
}

fn service_stop(
    ctx: &ApplyContext<'_>,
    declaration: &ResourceDeclaration,
    observed: &ObservedState,
) -> Result<ActionOutcome> {
    // Nothing to stop
    if observed.is_absent() {
        return Ok(ActionOutcome::Unchanged);
    }
    set_flag(ctx, declaration, observed, "running", false, "stop service", || {
        ctx.system.service_stop(declaration.name())
    })
}

// ============================================================================
// Filesystem
// ============================================================================

fn directory_create(
    ctx: &ApplyContext<'_>,
    declaration: &ResourceDeclaration,
    observed: &ObservedState,
) -> Result<ActionOutcome> {
    let path = ctx.config.resolve_path(declaration.name());
    match observed.str("type") {
        Some("directory") => Ok(ActionOutcome::Unchanged),
        Some(other) => Err(Error::Conflict {
            kind: declaration.kind(),
            name: declaration.name().to_string(),
            details: format!("a {other} exists at {}", path.display()),
        }),
        None => {
            let recursive = declaration.bool_attr("recursive").unwrap_or(false);
            let change = format!("create directory {}", path.display());
            mutate(ctx, declaration, change, || {
                ctx.system.create_dir(&path, recursive)
            })
        }
    }
}

fn file_create(
    ctx: &ApplyContext<'_>,
    declaration: &ResourceDeclaration,
    observed: &ObservedState,
) -> Result<ActionOutcome> {
    let path = ctx.config.resolve_path(declaration.name());
    let content = declaration
        .str_attr("content")
        .ok_or_else(|| apply_error(declaration, anyhow::anyhow!("no content declared")))?;

    if observed.str("type") == Some(PathKind::Directory.as_str()) {
        return Err(Error::Conflict {
            kind: declaration.kind(),
            name: declaration.name().to_string(),
            details: format!("a directory exists at {}", path.display()),
        });
    }
    if observed.str("digest") == Some(digest(content.as_bytes()).as_str()) {
        return Ok(ActionOutcome::Unchanged);
    }

    let change = if observed.is_absent() {
        format!("create file {}", path.display())
    } else {
        format!("update content of {}", path.display())
    };
    mutate(ctx, declaration, change, || {
        ctx.system.write_file_atomic(&path, content.as_bytes())
    })
}

// ============================================================================
// Registry
// ============================================================================

fn registry_field<'a>(value: &'a Value, field: &str) -> Option<&'a Value> {
    value.as_map()?.get(field)
}

/// Registry data normalized for comparison (dword 1 == "1" == "0x1")
fn registry_data(kind: Option<&str>, value: Option<&Value>) -> Option<String> {
    let data = match value? {
        Value::Str(s) => s.clone(),
        Value::Int(i) => i.to_string(),
        Value::List(parts) => parts
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("\n"),
        _ => return None,
    };
    match kind {
        Some("dword" | "qword") => Some(numeric_data(&data)),
        _ => Some(data),
    }
}

/// Hex (`0x1a`) and decimal spellings of a number compare as decimal
fn numeric_data(data: &str) -> String {
    let trimmed = data.trim();
    let parsed = match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => trimmed.parse::<u64>().ok(),
    };
    parsed.map_or_else(|| data.to_string(), |n| n.to_string())
}

fn registry_value_matches(desired: &Value, current: &Value) -> bool {
    let kind = registry_field(desired, "type");
    kind == registry_field(current, "type")
        && registry_data(kind.and_then(Value::as_str), registry_field(desired, "data"))
            == registry_data(kind.and_then(Value::as_str), registry_field(current, "data"))
}

fn registry_create(
    ctx: &ApplyContext<'_>,
    declaration: &ResourceDeclaration,
    observed: &ObservedState,
) -> Result<ActionOutcome> {
    let desired = declaration
        .attr("values")
        .and_then(Value::as_list)
        .unwrap_or_default();
    let recursive = declaration.bool_attr("recursive").unwrap_or(false);

    if observed.is_absent() {
        let change = format!("create key with {} value(s)", desired.len());
        return mutate(ctx, declaration, change, || {
            ctx.system
                .registry_write(declaration.name(), desired, recursive)
        });
    }

    let current = observed
        .get("values")
        .and_then(Value::as_list)
        .unwrap_or_default();
    let stale: Vec<Value> = desired
        .iter()
        .filter(|want| {
            let name = registry_field(want, "name").and_then(Value::as_str);
            !current.iter().any(|have| {
                let have_name = registry_field(have, "name").and_then(Value::as_str);
                matches!((name, have_name), (Some(a), Some(b)) if a.eq_ignore_ascii_case(b))
                    && registry_value_matches(want, have)
            })
        })
        .cloned()
        .collect();

    if stale.is_empty() {
        return Ok(ActionOutcome::Unchanged);
    }

    let names: Vec<&str> = stale
        .iter()
        .filter_map(|v| registry_field(v, "name").and_then(Value::as_str))
        .collect();
    let change = format!("set value(s) {}", names.join(", "));
    mutate(ctx, declaration, change, || {
        ctx.system
            .registry_write(declaration.name(), &stale, recursive)
    })
}

fn registry_delete(
    ctx: &ApplyContext<'_>,
    declaration: &ResourceDeclaration,
    observed: &ObservedState,
) -> Result<ActionOutcome> {
    if observed.is_absent() {
        return Ok(ActionOutcome::Unchanged);
    }
    let recursive = declaration.bool_attr("recursive").unwrap_or(false);
    mutate(ctx, declaration, "delete key".to_string(), || {
        ctx.system.registry_delete(declaration.name(), recursive)
    })
}

// ============================================================================
// Application Pools and Sites
// ============================================================================

fn pool_add(
    ctx: &ApplyContext<'_>,
    declaration: &ResourceDeclaration,
    observed: &ObservedState,
) -> Result<ActionOutcome> {
    let desired = declaration.attributes();
    if observed.is_present() {
        return reconcile_existing(ctx, declaration, desired, observed, |drifted| {
            ctx.system.pool_update(declaration.name(), drifted)
        });
    }
    mutate(ctx, declaration, "add application pool".to_string(), || {
        ctx.system.pool_add(declaration.name(), desired)
    })
}

/// Site settings as handed to the system: path resolved, protocol defaulted
fn site_settings(ctx: &ApplyContext<'_>, declaration: &ResourceDeclaration) -> Attributes {
    let mut settings = declaration.attributes().clone();
    if let Some(path) = declaration.str_attr("path") {
        let resolved = ctx.config.resolve_path(path);
        settings.insert(
            "path".to_string(),
            Value::Str(resolved.display().to_string()),
        );
    }
    settings
        .entry("protocol".to_string())
        .or_insert_with(|| Value::from("http"));
    settings
}

fn site_add(
    ctx: &ApplyContext<'_>,
    declaration: &ResourceDeclaration,
    observed: &ObservedState,
) -> Result<ActionOutcome> {
    let settings = site_settings(ctx, declaration);
    if observed.is_present() {
        return reconcile_existing(ctx, declaration, &settings, observed, |drifted| {
            ctx.system.site_update(declaration.name(), drifted)
        });
    }

    if let Some(path) = settings.get("path").and_then(Value::as_str) {
        let kind = ctx
            .system
            .path_kind(Path::new(path))
            .map_err(|source| apply_error(declaration, source))?;
        if kind != Some(PathKind::Directory) {
            return Err(apply_error(
                declaration,
                anyhow::anyhow!("physical path {path} is not an existing directory"),
            ));
        }
    }
    if let Some(pool) = declaration.str_attr("application_pool") {
        let exists = ctx
            .system
            .pool_query(pool)
            .map_err(|source| apply_error(declaration, source))?
            .is_some();
        if !exists {
            return Err(apply_error(
                declaration,
                anyhow::anyhow!("application pool '{pool}' does not exist"),
            ));
        }
    }

    mutate(ctx, declaration, "add site".to_string(), || {
        ctx.system.site_add(declaration.name(), &settings)
    })
}

fn site_start(
    ctx: &ApplyContext<'_>,
    declaration: &ResourceDeclaration,
    observed: &ObservedState,
) -> Result<ActionOutcome> {
    set_flag(ctx, declaration, observed, "running", true, "start site", || {
        ctx.system.site_start(declaration.name())
    })
}

fn site_stop(
    ctx: &ApplyContext<'_>,
    declaration: &ResourceDeclaration,
    observed: &ObservedState,
) -> Result<ActionOutcome> {
    if observed.is_absent() {
        return Ok(ActionOutcome::Unchanged);
    }
    set_flag(ctx, declaration, observed, "running", false, "stop site", || {
        ctx.system.site_stop(declaration.name())
    })
}

// ============================================================================
// Products
// ============================================================================

fn product_install(
    ctx: &ApplyContext<'_>,
    declaration: &ResourceDeclaration,
    observed: &ObservedState,
) -> Result<ActionOutcome> {
    let version = declaration.str_attr("version");
    let installed = observed.str("version");

    match (installed, version) {
        (Some(have), Some(want)) if have == want => return Ok(ActionOutcome::Unchanged),
        (Some(_), None) => return Ok(ActionOutcome::Unchanged),
        _ => {}
    }

    // Every install is license-gated
    let accepted = declaration.bool_attr("accept_eula") == Some(true);
    if !accepted {
        return Err(Error::LicenseNotAccepted {
            product: declaration.name().to_string(),
        });
    }

    let change = match (installed, version) {
        (Some(have), Some(want)) => format!("upgrade from {have} to {want}"),
        (None, Some(want)) => format!("install version {want}"),
        _ => "install".to_string(),
    };
    mutate(ctx, declaration, change, || {
        ctx.system.product_install(declaration.name(), version, accepted)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EngineConfig;
    use crate::memory::MemorySystem;
    use crate::probe::probe;
    use crate::types::FailureClass;
    use std::collections::BTreeMap;

    fn config() -> EngineConfig {
        EngineConfig {
            docroot: "/srv/www".into(),
            ..EngineConfig::default()
        }
    }

    fn run(
        system: &MemorySystem,
        config: &EngineConfig,
        declaration: &ResourceDeclaration,
        action: Action,
    ) -> Result<ActionOutcome> {
        let ctx = ApplyContext::new(system, config);
        let observed = probe(system, config, declaration.kind(), declaration.name())?;
        apply(&ctx, declaration, action, &observed)
    }

    fn pool_decl(runtime: &str) -> ResourceDeclaration {
        ResourceDeclaration::builder(ResourceKind::ApplicationPool, "P")
            .attr("runtime_version", runtime)
            .attr("pipeline_mode", "Integrated")
            .action(Action::Add)
            .build()
            .unwrap()
    }

    #[test]
    fn test_every_legal_pair_has_a_handler() {
        for kind in ResourceKind::ALL {
            for action in kind.actions() {
                assert!(handler(kind, *action).is_some(), "{kind}/{action}");
            }
        }
        assert!(handler(ResourceKind::Directory, Action::Start).is_none());
    }

    #[test]
    fn test_service_actions_are_idempotent() {
        let system = MemorySystem::new().with_service("w32time", false, false);
        let cfg = config();
        let decl = ResourceDeclaration::builder(ResourceKind::Service, "w32time")
            .actions([Action::Enable, Action::Start])
            .build()
            .unwrap();

        assert!(run(&system, &cfg, &decl, Action::Enable).unwrap().is_change());
        assert!(run(&system, &cfg, &decl, Action::Start).unwrap().is_change());
        assert_eq!(run(&system, &cfg, &decl, Action::Enable).unwrap(), ActionOutcome::Unchanged);
        assert_eq!(run(&system, &cfg, &decl, Action::Start).unwrap(), ActionOutcome::Unchanged);
        assert_eq!(
            system.calls(),
            vec!["service_enable:w32time", "service_start:w32time"]
        );
    }

    #[test]
    fn test_service_missing_is_apply_failure() {
        let system = MemorySystem::new();
        let decl = ResourceDeclaration::builder(ResourceKind::Service, "nope")
            .action(Action::Start)
            .build()
            .unwrap();
        let err = run(&system, &config(), &decl, Action::Start).unwrap_err();
        assert!(matches!(err, Error::Apply { .. }));
    }

    #[test]
    fn test_stopping_something_absent_is_unchanged() {
        let system = MemorySystem::new();
        for kind in [ResourceKind::Service, ResourceKind::Site] {
            let decl = ResourceDeclaration::builder(kind, "Default Web Site")
                .action(Action::Stop)
                .build()
                .unwrap();
            let outcome = run(&system, &config(), &decl, Action::Stop).unwrap();
            assert_eq!(outcome, ActionOutcome::Unchanged);
        }
        assert!(system.calls().is_empty());
    }

    #[test]
    fn test_file_rewritten_only_when_content_differs() {
        let system = MemorySystem::new().with_file("/srv/www/logs/test.txt", b"old");
        let cfg = config();
        let decl = ResourceDeclaration::builder(ResourceKind::File, "logs/test.txt")
            .attr("content", "Here is some test text")
            .build()
            .unwrap();

        let first = run(&system, &cfg, &decl, Action::Create).unwrap();
        assert!(
            matches!(first, ActionOutcome::Applied { ref change } if change.starts_with("update"))
        );
        assert_eq!(
            system.file_content("/srv/www/logs/test.txt").unwrap(),
            b"Here is some test text"
        );
        assert_eq!(run(&system, &cfg, &decl, Action::Create).unwrap(), ActionOutcome::Unchanged);
    }

    #[test]
    fn test_directory_over_file_is_conflict() {
        let system = MemorySystem::new().with_file("/srv/www/X", b"");
        let decl = ResourceDeclaration::builder(ResourceKind::Directory, "X")
            .build()
            .unwrap();
        let err = run(&system, &config(), &decl, Action::Create).unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[test]
    fn test_registry_create_then_delete() {
        let system = MemorySystem::new();
        let cfg = config();
        let value = Value::Map(BTreeMap::from([
            ("name".to_string(), Value::from("HELLO")),
            ("type".to_string(), Value::from("expand_string")),
            ("data".to_string(), Value::from("OMG")),
        ]));
        let key = r"HKEY_LOCAL_MACHINE\SOFTWARE\CHEF_WINDOWS_DEMO";
        let create = ResourceDeclaration::builder(ResourceKind::RegistryKey, key)
            .attr("values", vec![value])
            .action(Action::Create)
            .build()
            .unwrap();
        let delete = ResourceDeclaration::builder(ResourceKind::RegistryKey, key)
            .action(Action::Delete)
            .build()
            .unwrap();

        assert!(run(&system, &cfg, &create, Action::Create).unwrap().is_change());
        assert_eq!(run(&system, &cfg, &create, Action::Create).unwrap(), ActionOutcome::Unchanged);
        assert!(run(&system, &cfg, &delete, Action::Delete).unwrap().is_change());
        assert_eq!(run(&system, &cfg, &delete, Action::Delete).unwrap(), ActionOutcome::Unchanged);
    }

    #[test]
    fn test_hex_dword_matches_decimal_reading() {
        let key = r"HKEY_LOCAL_MACHINE\SOFTWARE\CHEF_WINDOWS_DEMO";
        let dword = |data: &str| {
            Value::Map(BTreeMap::from([
                ("name".to_string(), Value::from("RETRIES")),
                ("type".to_string(), Value::from("dword")),
                ("data".to_string(), Value::from(data)),
            ]))
        };
        // reg.exe readings come back in decimal
        let system = MemorySystem::new().with_registry_key(key, vec![dword("26")]);
        let create = ResourceDeclaration::builder(ResourceKind::RegistryKey, key)
            .attr("values", vec![dword("0x1a")])
            .action(Action::Create)
            .build()
            .unwrap();

        let outcome = run(&system, &config(), &create, Action::Create).unwrap();
        assert_eq!(outcome, ActionOutcome::Unchanged);
        assert!(system.calls().is_empty());

        assert_eq!(numeric_data("0x1A"), "26");
        assert_eq!(numeric_data(" 26 "), "26");
        assert_eq!(numeric_data("lots"), "lots");
    }

    #[test]
    fn test_pool_conflict_policy() {
        let system = MemorySystem::new();
        let mut cfg = config();
        assert!(run(&system, &cfg, &pool_decl("2.0"), Action::Add).unwrap().is_change());

        let err = run(&system, &cfg, &pool_decl("4.0"), Action::Add).unwrap_err();
        let outcome = ActionOutcome::from(err);
        assert_eq!(outcome.failure().unwrap().class, FailureClass::Conflict);
        assert!(outcome.failure().unwrap().message.contains("runtime_version"));

        cfg.conflict_policy = ConflictPolicy::UpdateInPlace;
        assert!(run(&system, &cfg, &pool_decl("4.0"), Action::Add).unwrap().is_change());
        assert_eq!(
            system.pool("P").unwrap().get("runtime_version"),
            Some(&Value::from("4.0"))
        );
        assert_eq!(
            run(&system, &cfg, &pool_decl("4.0"), Action::Add).unwrap(),
            ActionOutcome::Unchanged
        );
    }

    #[test]
    fn test_site_add_requires_existing_path_and_pool() {
        let system = MemorySystem::new();
        let cfg = config();
        let decl = ResourceDeclaration::builder(ResourceKind::Site, "S")
            .attr("port", 80)
            .attr("path", "X")
            .attr("application_pool", "P")
            .action(Action::Add)
            .build()
            .unwrap();

        let err = run(&system, &cfg, &decl, Action::Add).unwrap_err();
        assert!(err.to_string().contains("/srv/www/X"));

        let system = MemorySystem::new().with_directory("/srv/www/X");
        let err = run(&system, &cfg, &decl, Action::Add).unwrap_err();
        assert!(err.to_string().contains("application pool 'P'"));
        assert!(system.calls().is_empty());
    }

    #[test]
    fn test_license_gate_blocks_install_primitive() {
        let system = MemorySystem::new();
        let decl = ResourceDeclaration::builder(ResourceKind::InstallableProduct, "WDeployPS")
            .build()
            .unwrap();
        let err = run(&system, &config(), &decl, Action::Install).unwrap_err();
        assert!(matches!(err, Error::LicenseNotAccepted { .. }));
        assert!(system.calls().is_empty());

        let declined = ResourceDeclaration::builder(ResourceKind::InstallableProduct, "WDeployPS")
            .attr("accept_eula", false)
            .build()
            .unwrap();
        let err = run(&system, &config(), &declined, Action::Install).unwrap_err();
        assert!(matches!(err, Error::LicenseNotAccepted { .. }));
        assert!(system.calls().is_empty());

        let accepted = ResourceDeclaration::builder(ResourceKind::InstallableProduct, "WDeployPS")
            .attr("accept_eula", true)
            .build()
            .unwrap();
        assert!(run(&system, &config(), &accepted, Action::Install).unwrap().is_change());
        assert_eq!(system.calls(), vec!["product_install:WDeployPS"]);
    }

    #[test]
    fn test_product_version_pin() {
        let system = MemorySystem::new().with_product("WDeployPS", "3.5");
        let cfg = config();
        let pinned = |v: &str| {
            ResourceDeclaration::builder(ResourceKind::InstallableProduct, "WDeployPS")
                .attr("version", v)
                .attr("accept_eula", true)
                .build()
                .unwrap()
        };
        assert_eq!(
            run(&system, &cfg, &pinned("3.5"), Action::Install).unwrap(),
            ActionOutcome::Unchanged
        );
        let upgrade = run(&system, &cfg, &pinned("3.6"), Action::Install).unwrap();
        assert_eq!(upgrade, ActionOutcome::applied("upgrade from 3.5 to 3.6"));
    }

    #[test]
    fn test_why_run_describes_without_mutating() {
        let system = MemorySystem::new().with_directory("/srv/www");
        let cfg = EngineConfig {
            why_run: true,
            ..config()
        };
        let decl = ResourceDeclaration::builder(ResourceKind::Directory, "WebApplication1")
            .build()
            .unwrap();
        let outcome = run(&system, &cfg, &decl, Action::Create).unwrap();
        assert_eq!(
            outcome,
            ActionOutcome::skipped("would create directory /srv/www/WebApplication1")
        );
        assert!(system.calls().is_empty());
    }
}
