use anyhow::{Context, Result};
use std::process::Command;

/// Captured result of a host tool invocation
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stderr if present, otherwise stdout (some Windows tools report errors on stdout)
    pub fn message(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

/// Run a command and capture its output, whatever the exit status
pub fn run_output(cmd: &str, args: &[&str]) -> Result<CommandOutput> {
    log::trace!("exec: {} {}", cmd, args.join(" "));
    let output = Command::new(cmd)
        .args(args)
        .output()
        .with_context(|| format!("Failed to execute: {} {}", cmd, args.join(" ")))?;

    Ok(CommandOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run a command and capture output, failing on a non-zero exit
pub fn run_capture(cmd: &str, args: &[&str]) -> Result<String> {
    let output = run_output(cmd, args)?;
    if output.success() {
        Ok(output.stdout.trim().to_string())
    } else {
        anyhow::bail!("{} failed: {}", cmd, output.message())
    }
}

/// Run a command for its effect, failing on a non-zero exit
pub fn run_checked(cmd: &str, args: &[&str]) -> Result<()> {
    run_capture(cmd, args).map(|_| ())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_run_capture_trims_stdout() {
        assert_eq!(run_capture("echo", &["  hello  "]).unwrap(), "hello");
    }

    #[test]
    fn test_nonzero_exit_is_reported() {
        let output = run_output("sh", &["-c", "echo oops >&2; exit 3"]).unwrap();
        assert!(!output.success());
        assert_eq!(output.code, Some(3));
        assert_eq!(output.message(), "oops");
        assert!(run_checked("sh", &["-c", "exit 1"]).is_err());
    }

    #[test]
    fn test_missing_command_is_an_error() {
        assert!(run_output("provision-no-such-tool", &[]).is_err());
    }
}
