//! `provision apply` - converge the host to a recipe

use anyhow::{Context as AnyhowContext, Result, bail};
use colored::Colorize;
use declarative::{
    ActionOutcome, Engine, EngineConfig, MemorySystem, NoProgress, ReportEntry,
    ResourceDeclaration, ResourceKind, RunReport, SystemControl,
};

use crate::Context;
use crate::cli::{ApplyArgs, OutputFormat};
use crate::config::NodeConfig;
use crate::host::HostSystem;
use crate::paths;
use crate::progress::TerminalProgress;
use crate::ui;

pub fn run(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    let node = NodeConfig::load(ctx.config.as_deref())?;
    let recipe = super::recipe_path(args.recipe.as_deref(), &node)?;
    let declarations = super::load_recipe(&recipe)?;
    let config = engine_config(node.engine, args);

    let host = HostSystem::new();
    let simulated;
    let system: &dyn SystemControl = if args.simulate {
        simulated = simulated_host(&config, &declarations);
        &simulated
    } else {
        &host
    };

    let report = match args.format {
        OutputFormat::Json => {
            let report = Engine::new(system, config).run(&declarations);
            let json = serde_json::to_string_pretty(&report)
                .context("Failed to serialize run report")?;
            println!("{json}");
            report
        }
        OutputFormat::Text => {
            let title = if args.simulate {
                format!("Applying {} (simulated)", recipe.display())
            } else {
                format!("Applying {}", recipe.display())
            };
            ui::header(&title);
            ui::kv("Docroot", &config.docroot.display().to_string());

            if needs_confirmation(args, &config, console::Term::stdout().is_term()) {
                let Some(report) = preview(ctx, system, &config, &declarations)? else {
                    return Ok(());
                };
                if !report.is_success() {
                    ui::print_summary(&report);
                    return abort(&report);
                }
                if !confirm_proceed()? {
                    println!();
                    println!("  {} Aborted", "✗".red());
                    return Ok(());
                }
                println!();
            }

            if config.why_run {
                ui::warn("Why-run - no changes will be made");
            }
            let mut progress = TerminalProgress::new(ctx.quiet);
            let report = Engine::new(system, config).run_with(&declarations, &mut progress);
            ui::print_summary(&report);
            report
        }
    };

    if report.is_success() {
        Ok(())
    } else {
        abort(&report)
    }
}

/// Fresh in-memory host: the docroot and declared services exist, nothing else
fn simulated_host(config: &EngineConfig, declarations: &[ResourceDeclaration]) -> MemorySystem {
    declarations
        .iter()
        .filter(|d| d.kind() == ResourceKind::Service)
        .fold(
            MemorySystem::new().with_directory(&config.docroot),
            |system, service| system.with_service(service.name(), false, false),
        )
}

/// Node settings with command line overrides applied
fn engine_config(mut config: EngineConfig, args: &ApplyArgs) -> EngineConfig {
    if let Some(docroot) = &args.docroot {
        config.docroot = paths::expand(&docroot.to_string_lossy());
    }
    if let Some(policy) = args.on_conflict {
        config.conflict_policy = policy.into();
    }
    config.why_run = config.why_run || args.why_run;
    config
}

/// Ask before mutating unless told not to, or nobody is there to ask
///
/// `--quiet` only trims output; it never answers the prompt.
fn needs_confirmation(args: &ApplyArgs, config: &EngineConfig, interactive: bool) -> bool {
    !args.yes && !config.why_run && interactive
}

/// Why-run the recipe to show what would change
///
/// Returns `None` when nothing would change.
fn preview(
    ctx: &Context,
    system: &dyn SystemControl,
    config: &EngineConfig,
    declarations: &[ResourceDeclaration],
) -> Result<Option<RunReport>> {
    let config = EngineConfig {
        why_run: true,
        ..config.clone()
    };
    let report = if ctx.verbose > 0 {
        Engine::new(system, config).run_with(declarations, &mut TerminalProgress::new(true))
    } else {
        Engine::new(system, config).run_with(declarations, &mut NoProgress)
    };

    let pending: Vec<_> = report
        .entries()
        .iter()
        .filter(|e| is_pending(e))
        .collect();

    if report.is_success() && pending.is_empty() {
        println!();
        ui::success("Already converged - nothing to do");
        return Ok(None);
    }

    if report.is_success() {
        println!();
        ui::info(&format!("{} action(s) would change:", pending.len()));
        for entry in pending {
            ui::dim(&format!(
                "{} {} - {}",
                entry.declaration,
                entry.action,
                ui::outcome_detail(&entry.outcome)
            ));
        }
        println!();
    }
    Ok(Some(report))
}

/// A why-run entry for an enabled declaration that would change something
fn is_pending(entry: &ReportEntry) -> bool {
    entry.declaration.is_enabled() && matches!(entry.outcome, ActionOutcome::Skipped { .. })
}

fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}

fn abort(report: &RunReport) -> Result<()> {
    match report.failure() {
        Some(entry) => bail!(
            "Run aborted at {} {}: {}",
            entry.declaration,
            entry.action,
            ui::outcome_detail(&entry.outcome)
        ),
        None => bail!("Run aborted"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};
    use clap::Parser;

    fn apply_args(argv: &[&str]) -> ApplyArgs {
        match Cli::parse_from(argv.iter().copied()).command {
            Command::Apply(args) => args,
            _ => panic!("expected apply"),
        }
    }

    #[test]
    fn test_quiet_still_confirms() {
        let config = EngineConfig::default();
        let quiet = apply_args(&["provision", "-q", "apply", "site.toml"]);
        assert!(needs_confirmation(&quiet, &config, true));

        let yes = apply_args(&["provision", "-q", "apply", "site.toml", "--yes"]);
        assert!(!needs_confirmation(&yes, &config, true));
        assert!(!needs_confirmation(&quiet, &config, false));

        let why_run = EngineConfig {
            why_run: true,
            ..EngineConfig::default()
        };
        assert!(!needs_confirmation(&quiet, &why_run, true));
    }
}
