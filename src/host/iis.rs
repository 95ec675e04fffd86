//! IIS application pools and sites through `appcmd.exe`

use anyhow::{Result, bail};
use declarative::{Attributes, SiteStatus, Value};
use regex::Regex;
use std::sync::LazyLock;

use crate::runner;

/// `key:"value"` lines of `appcmd ... /text:*`
static FIELD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*([\w.]+):"(.*)"\s*$"#).expect("static regex"));

/// Pool attribute -> (appcmd property path, is boolean)
const POOL_FIELDS: &[(&str, &str, bool)] = &[
    ("runtime_version", "managedRuntimeVersion", false),
    ("pipeline_mode", "managedPipelineMode", false),
    ("pool_identity", "processModel.identityType", false),
    ("start_mode", "startMode", false),
    ("auto_start", "autoStart", true),
    ("load_user_profile", "processModel.loadUserProfile", true),
];

fn appcmd() -> Result<String> {
    if !cfg!(windows) {
        bail!("IIS sites and application pools are only supported on Windows");
    }
    let windir = std::env::var("windir").unwrap_or_else(|_| r"C:\Windows".to_string());
    Ok(format!(r"{windir}\system32\inetsrv\appcmd.exe"))
}

/// Run an `appcmd list` query, returning `None` when the object is missing
fn list(args: &[&str]) -> Result<Option<String>> {
    let appcmd = appcmd()?;
    let output = runner::run_output(&appcmd, args)?;
    if output.success() {
        return Ok(Some(output.stdout));
    }
    if output.message().contains("Cannot find") || output.message().is_empty() {
        return Ok(None);
    }
    bail!("appcmd {} failed: {}", args.join(" "), output.message())
}

fn run(args: &[String]) -> Result<()> {
    let appcmd = appcmd()?;
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    runner::run_checked(&appcmd, &args)
}

/// Fields of `/text:*` output keyed by their last name segment, first wins
fn fields(text: &str) -> Vec<(String, String)> {
    text.lines()
        .filter_map(|line| FIELD_RE.captures(line))
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .collect()
}

fn field<'a>(fields: &'a [(String, String)], name: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(key, _)| {
            key.eq_ignore_ascii_case(name)
                || key
                    .rsplit('.')
                    .next()
                    .is_some_and(|last| last.eq_ignore_ascii_case(name))
        })
        .map(|(_, value)| value.as_str())
}

// ============================================================================
// Application pools
// ============================================================================

pub fn pool_query(name: &str) -> Result<Option<Attributes>> {
    let pool_arg = format!("/apppool.name:{name}");
    let Some(text) = list(&["list", "apppool", &pool_arg, "/text:*"])? else {
        return Ok(None);
    };
    Ok(parse_pool(&text))
}

pub fn pool_add(name: &str, settings: &Attributes) -> Result<()> {
    let mut args = vec!["add".to_string(), "apppool".to_string(), format!("/name:{name}")];
    args.extend(pool_args(settings));
    run(&args)
}

pub fn pool_update(name: &str, settings: &Attributes) -> Result<()> {
    let mut args = vec![
        "set".to_string(),
        "apppool".to_string(),
        format!("/apppool.name:{name}"),
    ];
    args.extend(pool_args(settings));
    run(&args)
}

/// Pool settings in declaration vocabulary
pub(super) fn parse_pool(text: &str) -> Option<Attributes> {
    let fields = fields(text);
    field(&fields, "APPPOOL.NAME")?;

    let mut settings = Attributes::new();
    for (attr, property, boolean) in POOL_FIELDS {
        let last = property.rsplit('.').next().unwrap_or(*property);
        let Some(raw) = field(&fields, last) else {
            continue;
        };
        let value = if *boolean {
            Value::Bool(raw.eq_ignore_ascii_case("true"))
        } else if *attr == "runtime_version" {
            Value::from(raw.trim_start_matches('v'))
        } else {
            Value::from(raw)
        };
        settings.insert((*attr).to_string(), value);
    }
    Some(settings)
}

pub(super) fn pool_args(settings: &Attributes) -> Vec<String> {
    POOL_FIELDS
        .iter()
        .filter_map(|(attr, property, _)| {
            let value = settings.get(*attr)?;
            let raw = match (*attr, value) {
                ("runtime_version", Value::Str(v)) if !v.is_empty() => format!("v{v}"),
                (_, Value::Str(v)) => v.clone(),
                (_, other) => other.to_string(),
            };
            Some(format!("/{property}:{raw}"))
        })
        .collect()
}

// ============================================================================
// Sites
// ============================================================================

pub fn site_query(name: &str) -> Result<Option<SiteStatus>> {
    let site_arg = format!("/site.name:{name}");
    let Some(text) = list(&["list", "site", &site_arg, "/text:*"])? else {
        return Ok(None);
    };
    Ok(parse_site(&text))
}

pub fn site_add(name: &str, settings: &Attributes) -> Result<()> {
    let mut args = vec![
        "add".to_string(),
        "site".to_string(),
        format!("/name:{name}"),
        format!("/bindings:{}", binding(settings)),
    ];
    if let Some(path) = settings.get("path").and_then(Value::as_str) {
        args.push(format!("/physicalPath:{path}"));
    }
    run(&args)?;

    if let Some(pool) = settings.get("application_pool").and_then(Value::as_str) {
        set_app_pool(name, pool)?;
    }
    Ok(())
}

pub fn site_update(name: &str, settings: &Attributes) -> Result<()> {
    let Some(current) = site_query(name)? else {
        bail!("site '{name}' does not exist");
    };
    let mut merged = current.settings;
    merged.extend(settings.clone());

    if ["protocol", "port", "host_header"]
        .iter()
        .any(|key| settings.contains_key(*key))
    {
        run(&[
            "set".to_string(),
            "site".to_string(),
            format!("/site.name:{name}"),
            format!("/bindings:{}", binding(&merged)),
        ])?;
    }
    if let Some(path) = settings.get("path").and_then(Value::as_str) {
        run(&[
            "set".to_string(),
            "vdir".to_string(),
            format!("/vdir.name:{name}/"),
            format!("/physicalPath:{path}"),
        ])?;
    }
    if let Some(pool) = settings.get("application_pool").and_then(Value::as_str) {
        set_app_pool(name, pool)?;
    }
    Ok(())
}

pub fn site_start(name: &str) -> Result<()> {
    run(&["start".to_string(), "site".to_string(), format!("/site.name:{name}")])
}

pub fn site_stop(name: &str) -> Result<()> {
    run(&["stop".to_string(), "site".to_string(), format!("/site.name:{name}")])
}

fn set_app_pool(site: &str, pool: &str) -> Result<()> {
    run(&[
        "set".to_string(),
        "app".to_string(),
        format!("/app.name:{site}/"),
        format!("/applicationPool:{pool}"),
    ])
}

/// `protocol/ip:port:host` binding string for a site
pub(super) fn binding(settings: &Attributes) -> String {
    let protocol = settings
        .get("protocol")
        .and_then(Value::as_str)
        .unwrap_or("http");
    let port = settings
        .get("port")
        .and_then(Value::as_int)
        .unwrap_or(80);
    let host = settings
        .get("host_header")
        .and_then(Value::as_str)
        .unwrap_or_default();
    format!("{protocol}/*:{port}:{host}")
}

/// Site settings and run state in declaration vocabulary
pub(super) fn parse_site(text: &str) -> Option<SiteStatus> {
    let fields = fields(text);
    field(&fields, "SITE.NAME")?;

    let mut settings = Attributes::new();
    if let Some(first) = field(&fields, "bindings").and_then(|b| b.split(',').next())
        && let Some((protocol, info)) = first.split_once('/')
    {
        settings.insert("protocol".to_string(), Value::from(protocol));
        let mut parts = info.splitn(3, ':');
        let _ip = parts.next();
        if let Some(port) = parts.next().and_then(|p| p.parse::<i64>().ok()) {
            settings.insert("port".to_string(), Value::Int(port));
        }
        // No host header reads as "", the same as declaring one empty
        let host = parts.next().unwrap_or_default();
        settings.insert("host_header".to_string(), Value::from(host));
    }
    if let Some(path) = field(&fields, "physicalPath") {
        settings.insert("path".to_string(), Value::from(path));
    }
    if let Some(pool) = field(&fields, "applicationPool") {
        settings.insert("application_pool".to_string(), Value::from(pool));
    }

    let running = field(&fields, "state").is_some_and(|s| s.eq_ignore_ascii_case("Started"));
    Some(SiteStatus { settings, running })
}

#[cfg(test)]
mod tests {
    use super::*;

    const POOL: &str = r#"APPPOOL
  APPPOOL.NAME:"WebApplication1"
  PipelineMode:"Integrated"
  RuntimeVersion:"v4.0"
  state:"Started"
  [add]
    name:"WebApplication1"
    managedRuntimeVersion:"v4.0"
    managedPipelineMode:"Integrated"
    autoStart:"true"
    startMode:"AlwaysRunning"
    [processModel]
      identityType:"ApplicationPoolIdentity"
      loadUserProfile:"true"
"#;

    const SITE: &str = r#"SITE
  SITE.NAME:"WebApplication1"
  SITE.ID:"2"
  bindings:"http/*:80:"
  state:"Stopped"
  [site]
    name:"WebApplication1"
    [application]
      path:"/"
      applicationPool:"WebApplication1"
      [virtualDirectory]
        path:"/"
        physicalPath:"C:\inetpub\wwwroot\WebApplication1"
"#;

    #[test]
    fn test_parse_pool() {
        let settings = parse_pool(POOL).unwrap();
        assert_eq!(settings.get("runtime_version"), Some(&Value::from("4.0")));
        assert_eq!(settings.get("pipeline_mode"), Some(&Value::from("Integrated")));
        assert_eq!(
            settings.get("pool_identity"),
            Some(&Value::from("ApplicationPoolIdentity"))
        );
        assert_eq!(settings.get("start_mode"), Some(&Value::from("AlwaysRunning")));
        assert_eq!(settings.get("auto_start"), Some(&Value::Bool(true)));
        assert_eq!(settings.get("load_user_profile"), Some(&Value::Bool(true)));
        assert_eq!(parse_pool(""), None);
    }

    #[test]
    fn test_pool_args_round_trip_declared_keys() {
        let settings = parse_pool(POOL).unwrap();
        let args = pool_args(&settings);
        assert!(args.contains(&"/managedRuntimeVersion:v4.0".to_string()));
        assert!(args.contains(&"/processModel.identityType:ApplicationPoolIdentity".to_string()));
        assert!(args.contains(&"/autoStart:true".to_string()));
        assert_eq!(args.len(), POOL_FIELDS.len());
    }

    #[test]
    fn test_parse_site() {
        let site = parse_site(SITE).unwrap();
        assert!(!site.running);
        assert_eq!(site.settings.get("protocol"), Some(&Value::from("http")));
        assert_eq!(site.settings.get("port"), Some(&Value::Int(80)));
        assert_eq!(site.settings.get("host_header"), Some(&Value::from("")));
        assert_eq!(
            site.settings.get("path"),
            Some(&Value::from(r"C:\inetpub\wwwroot\WebApplication1"))
        );
        assert_eq!(
            site.settings.get("application_pool"),
            Some(&Value::from("WebApplication1"))
        );
        assert_eq!(binding(&site.settings), "http/*:80:");
    }

    #[cfg(unix)]
    #[test]
    fn test_empty_host_header_converges() {
        use declarative::{
            Action, ActionOutcome, Engine, EngineConfig, MemorySystem, ResourceDeclaration,
            ResourceKind,
        };

        let listing = SITE.replace(
            r"C:\inetpub\wwwroot\WebApplication1",
            "/srv/www/WebApplication1",
        );
        let site = parse_site(&listing).unwrap();
        let system = MemorySystem::new().with_site("WebApplication1", site.settings, false);
        let config = EngineConfig {
            docroot: "/srv/www".into(),
            ..EngineConfig::default()
        };
        let declaration = ResourceDeclaration::builder(ResourceKind::Site, "WebApplication1")
            .attr("port", 80)
            .attr("path", "WebApplication1")
            .attr("application_pool", "WebApplication1")
            .attr("host_header", "")
            .action(Action::Add)
            .build()
            .unwrap();

        let report = Engine::new(&system, config).run(&[declaration]);
        assert_eq!(report.entries()[0].outcome, ActionOutcome::Unchanged);
        assert!(system.calls().is_empty());
    }

    #[test]
    fn test_binding_with_host_header() {
        let mut settings = Attributes::new();
        settings.insert("protocol".to_string(), Value::from("https"));
        settings.insert("port".to_string(), Value::Int(443));
        settings.insert("host_header".to_string(), Value::from("example.org"));
        assert_eq!(binding(&settings), "https/*:443:example.org");
    }
}
