//! OS services: systemd on Unix, the service control manager on Windows

use anyhow::{Result, bail};
use declarative::ServiceStatus;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::runner;

/// `sc.exe` exit code for ERROR_SERVICE_DOES_NOT_EXIST
const SC_NO_SUCH_SERVICE: i32 = 1060;

static SC_STATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*STATE\s*:\s*\d+\s+(\w+)").expect("static regex"));

static SC_START_TYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*START_TYPE\s*:\s*\d+\s+(\w+)").expect("static regex"));

pub fn status(name: &str) -> Result<Option<ServiceStatus>> {
    if cfg!(windows) {
        sc_status(name)
    } else {
        let out = runner::run_capture(
            "systemctl",
            &[
                "show",
                name,
                "--property=LoadState,ActiveState,UnitFileState",
            ],
        )?;
        Ok(parse_systemctl_show(&out))
    }
}

pub fn set_enabled(name: &str, enabled: bool) -> Result<()> {
    if cfg!(windows) {
        let mode = if enabled { "auto" } else { "disabled" };
        runner::run_checked("sc.exe", &["config", name, "start=", mode])
    } else {
        let verb = if enabled { "enable" } else { "disable" };
        runner::run_checked("systemctl", &[verb, name])
    }
}

pub fn start(name: &str) -> Result<()> {
    if cfg!(windows) {
        runner::run_checked("sc.exe", &["start", name])
    } else {
        runner::run_checked("systemctl", &["start", name])
    }
}

pub fn stop(name: &str) -> Result<()> {
    if cfg!(windows) {
        runner::run_checked("sc.exe", &["stop", name])
    } else {
        runner::run_checked("systemctl", &["stop", name])
    }
}

fn sc_status(name: &str) -> Result<Option<ServiceStatus>> {
    let query = runner::run_output("sc.exe", &["query", name])?;
    if !query.success() {
        if query.code == Some(SC_NO_SUCH_SERVICE)
            || query.stdout.contains(&SC_NO_SUCH_SERVICE.to_string())
        {
            return Ok(None);
        }
        bail!("sc.exe query {name} failed: {}", query.message());
    }
    let config = runner::run_capture("sc.exe", &["qc", name])?;
    Ok(Some(parse_sc(&query.stdout, &config)))
}

/// Status from `systemctl show` key=value output, `None` if the unit is unknown
pub(super) fn parse_systemctl_show(text: &str) -> Option<ServiceStatus> {
    let props: HashMap<&str, &str> = text
        .lines()
        .filter_map(|line| line.trim().split_once('='))
        .collect();

    match props.get("LoadState") {
        None | Some(&"not-found") => return None,
        _ => {}
    }

    Some(ServiceStatus {
        enabled: matches!(
            props.get("UnitFileState"),
            Some(&("enabled" | "enabled-runtime"))
        ),
        running: props.get("ActiveState") == Some(&"active"),
    })
}

/// Status from `sc query` and `sc qc` output
pub(super) fn parse_sc(query: &str, config: &str) -> ServiceStatus {
    let state = SC_STATE_RE
        .captures(query)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str());
    let start_type = SC_START_TYPE_RE
        .captures(config)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str());

    ServiceStatus {
        enabled: start_type == Some("AUTO_START"),
        running: state == Some("RUNNING"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_systemctl_show() {
        let text = "LoadState=loaded\nActiveState=active\nUnitFileState=enabled\n";
        assert_eq!(
            parse_systemctl_show(text),
            Some(ServiceStatus {
                enabled: true,
                running: true
            })
        );

        let stopped = "LoadState=loaded\nActiveState=inactive\nUnitFileState=disabled\n";
        assert_eq!(
            parse_systemctl_show(stopped),
            Some(ServiceStatus {
                enabled: false,
                running: false
            })
        );
    }

    #[test]
    fn test_parse_systemctl_show_unknown_unit() {
        let text = "LoadState=not-found\nActiveState=inactive\nUnitFileState=\n";
        assert_eq!(parse_systemctl_show(text), None);
        assert_eq!(parse_systemctl_show(""), None);
    }

    #[test]
    fn test_parse_sc() {
        let query = "\r\nSERVICE_NAME: w3svc\r\n        TYPE               : 20  WIN32_SHARE_PROCESS\r\n        STATE              : 4  RUNNING\r\n                                (STOPPABLE, PAUSABLE, ACCEPTS_SHUTDOWN)\r\n";
        let config = "[SC] QueryServiceConfig SUCCESS\r\n\r\nSERVICE_NAME: w3svc\r\n        TYPE               : 20  WIN32_SHARE_PROCESS\r\n        START_TYPE         : 3   DEMAND_START\r\n";
        assert_eq!(
            parse_sc(query, config),
            ServiceStatus {
                enabled: false,
                running: true
            }
        );

        let auto = config.replace("3   DEMAND_START", "2   AUTO_START");
        let stopped = query.replace("4  RUNNING", "1  STOPPED");
        assert_eq!(
            parse_sc(&stopped, &auto),
            ServiceStatus {
                enabled: true,
                running: false
            }
        );
    }
}
