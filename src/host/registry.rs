//! Windows registry through `reg.exe`

use anyhow::{Result, bail};
use declarative::Value;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::runner;

/// `    NAME    REG_TYPE    DATA` value lines of `reg query`
static VALUE_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s{2,}(.+?)\s{2,}(REG_[A-Z_]+)(?:\s{2,}(.*))?$").expect("static regex")
});

/// Value types as written in declarations and as `reg.exe` spells them
const TYPES: &[(&str, &str)] = &[
    ("string", "REG_SZ"),
    ("expand_string", "REG_EXPAND_SZ"),
    ("multi_string", "REG_MULTI_SZ"),
    ("dword", "REG_DWORD"),
    ("qword", "REG_QWORD"),
    ("binary", "REG_BINARY"),
];

fn require_windows() -> Result<()> {
    if !cfg!(windows) {
        bail!("registry keys are only supported on Windows");
    }
    Ok(())
}

pub fn read(key: &str) -> Result<Option<Vec<Value>>> {
    require_windows()?;
    let output = runner::run_output("reg.exe", &["query", key])?;
    if !output.success() {
        // reg.exe exits 1 for a missing key and also for access errors
        if output.message().contains("unable to find") {
            return Ok(None);
        }
        bail!("reg query {key} failed: {}", output.message());
    }
    Ok(Some(parse_query(&output.stdout).values))
}

pub fn write(key: &str, values: &[Value]) -> Result<()> {
    require_windows()?;
    if values.is_empty() {
        return runner::run_checked("reg.exe", &["add", key, "/f"]);
    }
    for value in values {
        let (name, reg_type, data) = to_reg_args(value)?;
        runner::run_checked(
            "reg.exe",
            &["add", key, "/v", &name, "/t", reg_type, "/d", &data, "/f"],
        )?;
    }
    Ok(())
}

pub fn delete(key: &str, recursive: bool) -> Result<()> {
    require_windows()?;
    if !recursive {
        let listing = runner::run_capture("reg.exe", &["query", key])?;
        let subkeys = parse_query(&listing).subkeys;
        if !subkeys.is_empty() {
            bail!(
                "{key} has {} subkey(s); set recursive = true to delete them",
                subkeys.len()
            );
        }
    }
    runner::run_checked("reg.exe", &["delete", key, "/f"])
}

#[derive(Debug, Default, PartialEq)]
pub(super) struct QueryListing {
    pub values: Vec<Value>,
    pub subkeys: Vec<String>,
}

/// Parse `reg query <key>` output into `{name, type, data}` values and subkeys
pub(super) fn parse_query(text: &str) -> QueryListing {
    let mut listing = QueryListing::default();
    let mut header_seen = false;

    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("HKEY_") {
            // First key line is the queried key itself
            if header_seen {
                listing.subkeys.push(line.to_string());
            }
            header_seen = true;
            continue;
        }
        let Some(caps) = VALUE_LINE_RE.captures(line) else {
            continue;
        };
        let reg_type = &caps[2];
        let Some(kind) = TYPES.iter().find(|(_, r)| *r == reg_type).map(|(k, _)| *k) else {
            log::debug!("skipping registry value of unsupported type {reg_type}");
            continue;
        };
        let raw = caps.get(3).map_or("", |m| m.as_str());

        let mut entry = BTreeMap::new();
        entry.insert("name".to_string(), Value::from(caps[1].to_string()));
        entry.insert("type".to_string(), Value::from(kind));
        entry.insert("data".to_string(), Value::from(normalize_data(kind, raw)));
        listing.values.push(Value::Map(entry));
    }

    listing
}

/// Bring `reg.exe` data into the form declarations use
fn normalize_data(kind: &str, raw: &str) -> String {
    match kind {
        "dword" | "qword" => raw
            .strip_prefix("0x")
            .and_then(|hex| u64::from_str_radix(hex, 16).ok())
            .map_or_else(|| raw.to_string(), |n| n.to_string()),
        "multi_string" => raw.split("\\0").collect::<Vec<_>>().join("\n"),
        _ => raw.to_string(),
    }
}

fn to_reg_args(value: &Value) -> Result<(String, &'static str, String)> {
    let Some(fields) = value.as_map() else {
        bail!("registry value must be a table, got {}", value.type_name());
    };
    let field = |key: &str| fields.get(key).and_then(Value::as_str).unwrap_or_default();

    let kind = field("type");
    let Some(reg_type) = TYPES.iter().find(|(k, _)| *k == kind).map(|(_, r)| *r) else {
        bail!("unsupported registry value type '{kind}'");
    };
    let data = match kind {
        "multi_string" => field("data").replace('\n', "\\0"),
        _ => field("data").to_string(),
    };
    Ok((field("name").to_string(), reg_type, data))
}
