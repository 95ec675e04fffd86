//! Engine configuration, apply context and progress callbacks
//!
//! Node-wide settings live in [`EngineConfig`] and are handed to the engine
//! when it is built, so nothing reads ambient global state mid-run.

use crate::report::RunReport;
use crate::resource::{Action, ResourceDeclaration};
use crate::system::SystemControl;
use crate::types::ActionOutcome;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What to do when an `add` finds the object already configured differently
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Report a conflict and abort the run
    #[default]
    Fail,
    /// Rewrite the declared attributes on the existing object
    UpdateInPlace,
}

/// Node-wide engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base directory for relative directory, file and site paths
    pub docroot: PathBuf,
    /// Handling of pools and sites that exist with different settings
    pub conflict_policy: ConflictPolicy,
    /// Decide what would change without changing anything
    pub why_run: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let docroot = if cfg!(windows) {
            r"C:\inetpub\wwwroot"
        } else {
            "/var/www"
        };
        Self {
            docroot: PathBuf::from(docroot),
            conflict_policy: ConflictPolicy::default(),
            why_run: false,
        }
    }
}

impl EngineConfig {
    /// Resolve a declared path against the docroot
    pub fn resolve_path(&self, raw: &str) -> PathBuf {
        let path = Path::new(raw);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.docroot.join(path)
        }
    }
}

/// Context passed to action handlers
pub struct ApplyContext<'a> {
    pub system: &'a dyn SystemControl,
    /// Engine settings, including whether this is a why-run
    pub config: &'a EngineConfig,
}

impl<'a> ApplyContext<'a> {
    pub fn new(system: &'a dyn SystemControl, config: &'a EngineConfig) -> Self {
        Self { system, config }
    }
}

/// Progress callback for a convergence run
///
/// Implement this trait to render progress; the engine calls it from the
/// single thread that drives the run.
pub trait ProgressCallback {
    /// Called before the first action of a declaration
    fn on_declaration_start(
        &mut self,
        index: usize,
        total: usize,
        declaration: &ResourceDeclaration,
    );

    /// Called right before an action is probed and applied
    fn on_action_start(&mut self, declaration: &ResourceDeclaration, action: Action);

    /// Called once an action has an outcome
    fn on_action_complete(
        &mut self,
        declaration: &ResourceDeclaration,
        action: Action,
        outcome: &ActionOutcome,
    );

    /// Called with the finalized report
    fn on_run_complete(&mut self, report: &RunReport);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_declaration_start(
        &mut self,
        _index: usize,
        _total: usize,
        _declaration: &ResourceDeclaration,
    ) {
    }
    fn on_action_start(&mut self, _declaration: &ResourceDeclaration, _action: Action) {}
    fn on_action_complete(
        &mut self,
        _declaration: &ResourceDeclaration,
        _action: Action,
        _outcome: &ActionOutcome,
    ) {
    }
    fn on_run_complete(&mut self, _report: &RunReport) {}
}
