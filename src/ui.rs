use colored::{ColoredString, Colorize};
use declarative::{ActionOutcome, RunReport, RunStatus};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Run rendering
// ============================================================================

/// Symbol for an action outcome
pub fn outcome_symbol(outcome: &ActionOutcome) -> ColoredString {
    match outcome {
        ActionOutcome::Unchanged => "○".dimmed(),
        ActionOutcome::Applied { .. } => "✓".green(),
        ActionOutcome::Skipped { .. } => "⊘".yellow(),
        ActionOutcome::Failed(_) => "✗".red(),
    }
}

/// Short description of an outcome
pub fn outcome_detail(outcome: &ActionOutcome) -> String {
    match outcome {
        ActionOutcome::Unchanged => "up to date".to_string(),
        ActionOutcome::Applied { change } => change.clone(),
        ActionOutcome::Skipped { reason } => reason.clone(),
        ActionOutcome::Failed(failure) => failure.message.clone(),
    }
}

/// Format a run duration as seconds with millisecond precision
pub fn format_elapsed(elapsed: chrono::Duration) -> String {
    let millis = elapsed.num_milliseconds().max(0);
    format!("{}.{:03}s", millis / 1000, millis % 1000)
}

/// Print final summary
pub fn print_summary(report: &RunReport) {
    let summary = report.summary();
    let elapsed = report
        .elapsed()
        .map(|d| format!(" in {}", format_elapsed(d)))
        .unwrap_or_default();

    println!();
    match report.status() {
        RunStatus::Completed if report.is_why_run() => println!(
            "  {} Why-run complete{} - no changes made",
            "ℹ".blue().bold(),
            elapsed
        ),
        RunStatus::Completed => println!(
            "  {} Converged {} declaration(s){}",
            "✓".green().bold(),
            report.declaration_count(),
            elapsed
        ),
        _ => println!("  {} Run aborted{}", "✗".red().bold(), elapsed),
    }

    if summary.applied > 0 {
        println!("    • {} action(s) applied", summary.applied);
    }
    if summary.unchanged > 0 {
        println!("    • {} action(s) already up to date", summary.unchanged);
    }
    if summary.skipped > 0 {
        println!("    • {} action(s) skipped", summary.skipped);
    }
    if let Some(entry) = report.failure() {
        println!(
            "    • {} {}: {}",
            entry.declaration.to_string().bold(),
            entry.action,
            outcome_detail(&entry.outcome).red()
        );
        let unreached = report.unreached();
        if unreached > 0 {
            println!("    • {unreached} declaration(s) not reached");
        }
    }
}

/// Truncate a string for display, keeping the end
pub fn truncate_end(text: &str, max_len: usize) -> String {
    let len = text.chars().count();
    if len <= max_len {
        text.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let tail: String = text.chars().skip(len - (max_len - 3)).collect();
        format!("...{tail}")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{Failure, FailureClass};

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(chrono::Duration::milliseconds(0)), "0.000s");
        assert_eq!(format_elapsed(chrono::Duration::milliseconds(1234)), "1.234s");
        assert_eq!(format_elapsed(chrono::Duration::milliseconds(-5)), "0.000s");
    }

    #[test]
    fn test_outcome_detail() {
        assert_eq!(outcome_detail(&ActionOutcome::Unchanged), "up to date");
        assert_eq!(
            outcome_detail(&ActionOutcome::skipped("would start site")),
            "would start site"
        );
        let failed = ActionOutcome::Failed(Failure {
            class: FailureClass::License,
            message: "license not accepted".to_string(),
        });
        assert_eq!(outcome_detail(&failed), "license not accepted");
    }

    #[test]
    fn test_truncate_end() {
        assert_eq!(truncate_end("short", 20), "short");
        assert_eq!(
            truncate_end(r"C:\inetpub\wwwroot\WebApplication1", 18),
            "...WebApplication1"
        );
        assert_eq!(truncate_end("test", 3), "...");
    }
}
