//! Installable products through the Web Platform Installer command line

use anyhow::{Result, bail};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::runner;

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d+(?:\.\d+)+)\b").expect("static regex"));

/// Reported for installed products whose title carries no version
const UNKNOWN_VERSION: &str = "installed";

fn webpi() -> Result<String> {
    if !cfg!(windows) {
        bail!("installable products are only supported on Windows");
    }
    let program_files =
        std::env::var("ProgramFiles").unwrap_or_else(|_| r"C:\Program Files".to_string());
    Ok(format!(
        r"{program_files}\Microsoft\Web Platform Installer\WebpiCmd.exe"
    ))
}

pub fn version(product: &str) -> Result<Option<String>> {
    let webpi = webpi()?;
    let listing = runner::run_capture(&webpi, &["/List", "/ListOption:Installed"])?;
    Ok(parse_installed(&listing).remove(product))
}

pub fn install(product: &str, version: Option<&str>, accept_eula: bool) -> Result<()> {
    let webpi = webpi()?;
    if let Some(version) = version {
        log::warn!("WebPI installs the feed's current {product}; requested version {version}");
    }
    let args = install_args(product, accept_eula);
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    runner::run_checked(&webpi, &args)
}

/// `/AcceptEula` is only passed when the declaration accepted the license
fn install_args(product: &str, accept_eula: bool) -> Vec<String> {
    let mut args = vec!["/Install".to_string(), format!("/Products:{product}")];
    if accept_eula {
        args.push("/AcceptEula".to_string());
    }
    args
}

/// Installed product ids mapped to the version found in their title
pub(super) fn parse_installed(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .skip_while(|line| !line.trim_start().starts_with("---"))
        .skip(1)
        .filter_map(|line| {
            let line = line.trim();
            let (id, title) = line.split_once(char::is_whitespace)?;
            let version = VERSION_RE
                .captures(title)
                .map_or(UNKNOWN_VERSION.to_string(), |c| c[1].to_string());
            Some((id.to_string(), version))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_installed() {
        let text = "\
Successfully loaded primary feed: https://www.microsoft.com/web/webpi/5.1/webproductlist.xml

The software that you currently have installed is:

ID                                      Title
--------------------------------------------------------------------------------
WDeployPS                               Web Deploy 3.6 for Hosting Servers
IIS7                                    IIS 7 Recommended Configuration
UrlRewrite2                             URL Rewrite

";
        let installed = parse_installed(text);
        assert_eq!(installed.len(), 3);
        assert_eq!(installed.get("WDeployPS").map(String::as_str), Some("3.6"));
        assert_eq!(installed.get("UrlRewrite2").map(String::as_str), Some("installed"));
        assert!(!installed.contains_key("Successfully"));
    }

    #[test]
    fn test_license_is_accepted_only_when_declared() {
        assert_eq!(
            install_args("WDeployPS", true),
            vec!["/Install", "/Products:WDeployPS", "/AcceptEula"]
        );
        assert!(
            !install_args("WDeployPS", false)
                .iter()
                .any(|arg| arg == "/AcceptEula")
        );
    }

    #[test]
    fn test_parse_installed_without_table() {
        assert!(parse_installed("No products installed.\n").is_empty());
    }
}
