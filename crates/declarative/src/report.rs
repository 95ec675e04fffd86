//! Run report - append-only record of a convergence run

use crate::resource::{Action, ResourceDeclaration};
use crate::types::{ActionOutcome, ObservedState};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    /// Every declaration was processed without a failure
    Completed,
    /// Stopped at the first failed action
    Aborted,
}

/// One `(declaration, action)` outcome
#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
    /// Position of the declaration in the run
    pub index: usize,
    pub declaration: ResourceDeclaration,
    pub action: Action,
    /// State probed right before the action (`None` if not probed)
    pub observed: Option<ObservedState>,
    pub outcome: ActionOutcome,
}

/// Counts of outcomes in a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub unchanged: usize,
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    /// Add an outcome to the summary
    pub fn add_outcome(&mut self, outcome: &ActionOutcome) {
        match outcome {
            ActionOutcome::Unchanged => self.unchanged += 1,
            ActionOutcome::Applied { .. } => self.applied += 1,
            ActionOutcome::Skipped { .. } => self.skipped += 1,
            ActionOutcome::Failed(_) => self.failed += 1,
        }
    }

    /// Total number of actions recorded
    pub fn total(&self) -> usize {
        self.unchanged + self.applied + self.skipped + self.failed
    }
}

/// Structured record of what a run probed, changed and where it stopped
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    status: RunStatus,
    why_run: bool,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    declarations: usize,
    entries: Vec<ReportEntry>,
    summary: RunSummary,
}

impl RunReport {
    pub fn new(declarations: usize, why_run: bool) -> Self {
        Self {
            status: RunStatus::Pending,
            why_run,
            started_at: None,
            finished_at: None,
            declarations,
            entries: Vec::new(),
            summary: RunSummary::default(),
        }
    }

    pub(crate) fn start(&mut self) {
        self.status = RunStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub(crate) fn push(&mut self, entry: ReportEntry) {
        debug_assert_eq!(self.status, RunStatus::Running);
        self.summary.add_outcome(&entry.outcome);
        self.entries.push(entry);
    }

    pub(crate) fn finish(&mut self) {
        self.status = if self.summary.failed == 0 {
            RunStatus::Completed
        } else {
            RunStatus::Aborted
        };
        self.finished_at = Some(Utc::now());
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn is_why_run(&self) -> bool {
        self.why_run
    }

    /// Check if the run completed without failures
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Number of declarations the run was given
    pub fn declaration_count(&self) -> usize {
        self.declarations
    }

    /// The action that stopped the run, if any
    pub fn failure(&self) -> Option<&ReportEntry> {
        self.entries.iter().find(|e| !e.outcome.is_success())
    }

    /// Declarations that were never reached because the run aborted
    pub fn unreached(&self) -> usize {
        match self.failure() {
            Some(entry) => self.declarations.saturating_sub(entry.index + 1),
            None => 0,
        }
    }

    pub fn elapsed(&self) -> Option<chrono::Duration> {
        Some(self.finished_at? - self.started_at?)
    }
}
