//! Convergence engine - ordered, sequential probe/apply loop
//!
//! Declarations run strictly in the order given, and actions within a
//! declaration run left to right. State is probed fresh before every
//! action because the previous one may have changed it. The first failed
//! action stops the run; nothing after it is probed or applied.

use crate::context::{ApplyContext, EngineConfig, NoProgress, ProgressCallback};
use crate::executor;
use crate::probe::probe;
use crate::report::{ReportEntry, RunReport};
use crate::resource::{Action, ResourceDeclaration};
use crate::system::SystemControl;
use crate::types::{ActionOutcome, FailureClass, ObservedState};

/// Drives a list of declarations against a system
pub struct Engine<'a> {
    system: &'a dyn SystemControl,
    config: EngineConfig,
}

impl<'a> Engine<'a> {
    pub fn new(system: &'a dyn SystemControl, config: EngineConfig) -> Self {
        Self { system, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Converge without progress reporting
    pub fn run(&self, declarations: &[ResourceDeclaration]) -> RunReport {
        self.run_with(declarations, &mut NoProgress)
    }

    /// Converge, reporting progress to the given callback
    pub fn run_with<P: ProgressCallback>(
        &self,
        declarations: &[ResourceDeclaration],
        progress: &mut P,
    ) -> RunReport {
        let ctx = ApplyContext::new(self.system, &self.config);
        let total = declarations.len();
        let mut report = RunReport::new(total, self.config.why_run);
        // Set once a why-run has decided something would change
        let mut pending_changes = false;

        report.start();
        log::debug!("converging {total} declaration(s)");

        'declarations: for (index, declaration) in declarations.iter().enumerate() {
            progress.on_declaration_start(index, total, declaration);

            if !declaration.is_enabled() {
                log::debug!("{declaration}: disabled, skipping");
                for &action in declaration.actions() {
                    let outcome = ActionOutcome::skipped("declaration is disabled");
                    progress.on_action_complete(declaration, action, &outcome);
                    report.push(ReportEntry {
                        index,
                        declaration: declaration.clone(),
                        action,
                        observed: None,
                        outcome,
                    });
                }
                continue;
            }

            for &action in declaration.actions() {
                progress.on_action_start(declaration, action);
                let (observed, mut outcome) = self.converge_action(&ctx, declaration, action);

                if ctx.config.why_run {
                    outcome = Self::soften_why_run(outcome, &mut pending_changes);
                }

                progress.on_action_complete(declaration, action, &outcome);
                let failed = !outcome.is_success();
                if let Some(failure) = outcome.failure() {
                    log::warn!(
                        "{declaration}: {action} failed, aborting run: {}",
                        failure.message
                    );
                }

                report.push(ReportEntry {
                    index,
                    declaration: declaration.clone(),
                    action,
                    observed,
                    outcome,
                });

                if failed {
                    break 'declarations;
                }
            }
        }

        report.finish();
        log::debug!("run finished: {:?}", report.status());
        progress.on_run_complete(&report);
        report
    }

    /// Probe then apply a single action
    fn converge_action(
        &self,
        ctx: &ApplyContext<'_>,
        declaration: &ResourceDeclaration,
        action: Action,
    ) -> (Option<ObservedState>, ActionOutcome) {
        let observed = match probe(
            self.system,
            &self.config,
            declaration.kind(),
            declaration.name(),
        ) {
            Ok(observed) => observed,
            Err(e) => return (None, ActionOutcome::from(e)),
        };

        let outcome = match executor::apply(ctx, declaration, action, &observed) {
            Ok(outcome) => outcome,
            Err(e) => ActionOutcome::from(e),
        };
        log::debug!("{declaration}: {action} -> {outcome:?}");
        (Some(observed), outcome)
    }

    /// In a why-run, nothing earlier was really changed, so an apply failure
    /// after a pending change may just be a consequence of that change not
    /// having happened yet (e.g. starting a site that would have been added).
    fn soften_why_run(outcome: ActionOutcome, pending_changes: &mut bool) -> ActionOutcome {
        match outcome {
            ActionOutcome::Skipped { .. } => {
                *pending_changes = true;
                outcome
            }
            ActionOutcome::Failed(failure)
                if *pending_changes && failure.class == FailureClass::Apply =>
            {
                ActionOutcome::skipped(format!(
                    "depends on earlier changes: {}",
                    failure.message
                ))
            }
            other => other,
        }
    }
}
