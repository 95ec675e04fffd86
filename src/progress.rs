//! Terminal progress for a run: one spinner per action, one line per outcome

use colored::Colorize;
use declarative::{Action, ActionOutcome, ProgressCallback, ResourceDeclaration, RunReport};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::ui;

/// Longest declaration label shown before truncation
const LABEL_WIDTH: usize = 60;

pub struct TerminalProgress {
    quiet: bool,
    position: String,
    spinner: Option<ProgressBar>,
}

impl TerminalProgress {
    /// With `quiet`, actions that were already up to date are not printed
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            position: String::new(),
            spinner: None,
        }
    }

    fn spinner(message: String) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("  {spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_declaration_start(
        &mut self,
        index: usize,
        total: usize,
        _declaration: &ResourceDeclaration,
    ) {
        self.position = format!("[{}/{}]", index + 1, total);
    }

    fn on_action_start(&mut self, declaration: &ResourceDeclaration, action: Action) {
        let label = ui::truncate_end(&declaration.to_string(), LABEL_WIDTH);
        self.spinner = Some(Self::spinner(format!("{label} {action}")));
    }

    fn on_action_complete(
        &mut self,
        declaration: &ResourceDeclaration,
        action: Action,
        outcome: &ActionOutcome,
    ) {
        if let Some(pb) = self.spinner.take() {
            pb.finish_and_clear();
        }
        if self.quiet && *outcome == ActionOutcome::Unchanged {
            return;
        }
        let label = ui::truncate_end(&declaration.to_string(), LABEL_WIDTH);
        println!(
            "  {} {} {} {} {}",
            ui::outcome_symbol(outcome),
            self.position.blue(),
            label,
            action.to_string().dimmed(),
            ui::outcome_detail(outcome).dimmed()
        );
    }

    fn on_run_complete(&mut self, _report: &RunReport) {
        if let Some(pb) = self.spinner.take() {
            pb.finish_and_clear();
        }
    }
}
